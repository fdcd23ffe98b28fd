//! Typed parameter values bound to abstract processes.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, SaliencyError};
use crate::stream::{Stream, StreamName};
use crate::types::Tensor;

/// A statically bound process parameter.
///
/// Everything that is fixed for a whole run (shapes, thresholds, the image,
/// the scoring function) is a `Param`; only the random key varies per call.
#[derive(Clone)]
pub enum Param {
    /// Floating point scalar.
    Float(f64),
    /// Signed integer scalar.
    Int(i64),
    /// Boolean flag.
    Bool(bool),
    /// Tensor shape.
    Shape(Vec<usize>),
    /// Dense tensor, shared between all concretized copies.
    Tensor(Arc<Tensor>),
    /// Reference to another stream by name.
    Name(StreamName),
    /// A set of named tensors (e.g. the base stream of a chain).
    Stream(Arc<Stream>),
    /// Any other shared collaborator, recovered with [`Params::opaque`].
    Opaque(Arc<dyn Any + Send + Sync>),
}

impl Param {
    /// Wrap an arbitrary shared value.
    pub fn opaque<T: Any + Send + Sync>(value: T) -> Self {
        Param::Opaque(Arc::new(value))
    }

    fn kind(&self) -> &'static str {
        match self {
            Param::Float(_) => "float",
            Param::Int(_) => "int",
            Param::Bool(_) => "bool",
            Param::Shape(_) => "shape",
            Param::Tensor(_) => "tensor",
            Param::Name(_) => "stream name",
            Param::Stream(_) => "stream",
            Param::Opaque(_) => "opaque",
        }
    }
}

impl fmt::Debug for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Param::Float(v) => write!(f, "Float({v})"),
            Param::Int(v) => write!(f, "Int({v})"),
            Param::Bool(v) => write!(f, "Bool({v})"),
            Param::Shape(s) => write!(f, "Shape({s:?})"),
            Param::Tensor(t) => write!(f, "Tensor(shape={:?})", t.shape()),
            Param::Name(n) => write!(f, "Name({n})"),
            Param::Stream(s) => write!(f, "Stream({:?})", s.keys().collect::<Vec<_>>()),
            Param::Opaque(_) => f.write_str("Opaque(..)"),
        }
    }
}

impl From<f64> for Param {
    fn from(v: f64) -> Self {
        Param::Float(v)
    }
}

impl From<f32> for Param {
    fn from(v: f32) -> Self {
        Param::Float(f64::from(v))
    }
}

impl From<i64> for Param {
    fn from(v: i64) -> Self {
        Param::Int(v)
    }
}

impl From<usize> for Param {
    fn from(v: usize) -> Self {
        Param::Int(v as i64)
    }
}

impl From<bool> for Param {
    fn from(v: bool) -> Self {
        Param::Bool(v)
    }
}

impl From<Vec<usize>> for Param {
    fn from(v: Vec<usize>) -> Self {
        Param::Shape(v)
    }
}

impl From<&[usize]> for Param {
    fn from(v: &[usize]) -> Self {
        Param::Shape(v.to_vec())
    }
}

impl From<Tensor> for Param {
    fn from(v: Tensor) -> Self {
        Param::Tensor(Arc::new(v))
    }
}

impl From<Arc<Tensor>> for Param {
    fn from(v: Arc<Tensor>) -> Self {
        Param::Tensor(v)
    }
}

impl From<StreamName> for Param {
    fn from(v: StreamName) -> Self {
        Param::Name(v)
    }
}

impl From<Stream> for Param {
    fn from(v: Stream) -> Self {
        Param::Stream(Arc::new(v))
    }
}

/// Parameter map of an abstract process. Later inserts overwrite earlier ones.
#[derive(Debug, Clone, Default)]
pub struct Params {
    values: BTreeMap<String, Param>,
}

impl Params {
    /// Empty parameter map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a parameter.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Param>) {
        self.values.insert(name.into(), value.into());
    }

    /// Whether a parameter is bound.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Bound parameter names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Raw parameter lookup.
    pub fn get(&self, name: &str) -> Result<&Param> {
        self.values
            .get(name)
            .ok_or_else(|| SaliencyError::MissingParameter {
                process: String::from("<call>"),
                parameter: name.to_string(),
            })
    }

    /// Float parameter; integers are widened.
    pub fn float(&self, name: &str) -> Result<f64> {
        match self.get(name)? {
            Param::Float(v) => Ok(*v),
            Param::Int(v) => Ok(*v as f64),
            other => Err(type_error(name, "float", other)),
        }
    }

    /// Non-negative integer parameter.
    pub fn usize(&self, name: &str) -> Result<usize> {
        match self.get(name)? {
            Param::Int(v) if *v >= 0 => Ok(*v as usize),
            other => Err(type_error(name, "non-negative int", other)),
        }
    }

    /// Boolean parameter.
    pub fn bool(&self, name: &str) -> Result<bool> {
        match self.get(name)? {
            Param::Bool(v) => Ok(*v),
            other => Err(type_error(name, "bool", other)),
        }
    }

    /// Shape parameter.
    pub fn shape(&self, name: &str) -> Result<&[usize]> {
        match self.get(name)? {
            Param::Shape(s) => Ok(s),
            other => Err(type_error(name, "shape", other)),
        }
    }

    /// Tensor parameter.
    pub fn tensor(&self, name: &str) -> Result<&Tensor> {
        match self.get(name)? {
            Param::Tensor(t) => Ok(t),
            other => Err(type_error(name, "tensor", other)),
        }
    }

    /// Stream-name parameter.
    pub fn name(&self, name: &str) -> Result<&StreamName> {
        match self.get(name)? {
            Param::Name(n) => Ok(n),
            other => Err(type_error(name, "stream name", other)),
        }
    }

    /// Stream parameter.
    pub fn stream(&self, name: &str) -> Result<&Stream> {
        match self.get(name)? {
            Param::Stream(s) => Ok(s),
            other => Err(type_error(name, "stream", other)),
        }
    }

    /// Opaque parameter downcast to `T`.
    pub fn opaque<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>> {
        match self.get(name)? {
            Param::Opaque(v) => Arc::clone(v).downcast::<T>().map_err(|_| {
                SaliencyError::ParameterType {
                    parameter: name.to_string(),
                    expected: std::any::type_name::<T>(),
                }
            }),
            other => Err(type_error(name, "opaque", other)),
        }
    }
}

fn type_error(name: &str, expected: &'static str, found: &Param) -> SaliencyError {
    tracing::debug!(parameter = name, found = found.kind(), "parameter type mismatch");
    SaliencyError::ParameterType {
        parameter: name.to_string(),
        expected,
    }
}
