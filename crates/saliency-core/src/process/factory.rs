//! Two-phase process factory: bind static parameters, then concretize.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, SaliencyError};
use crate::stream::Stream;
use crate::types::Key;

use super::params::{Param, Params};

/// Body of a process: reads its parameters, draws from the key, and writes
/// named outputs into the stream it is given.
pub type ProcessBody = dyn Fn(&Key, &Params, &mut Stream) -> Result<()> + Send + Sync;

/// Parameter name reserved for the per-call random key.
pub const RESERVED_KEY: &str = "key";

/// A process in its builder phase.
///
/// Parameters accumulate through [`bind`](Self::bind); nothing runs until
/// [`concretize`](Self::concretize) returns a [`ConcreteProcess`]. Once
/// concretized, the abstract process is frozen and rejects further binds.
#[derive(Clone)]
pub struct AbstractProcess {
    name: Cow<'static, str>,
    required: Vec<&'static str>,
    params: Params,
    body: Arc<ProcessBody>,
    frozen: bool,
}

impl AbstractProcess {
    /// Declare a process with its required parameter names.
    pub fn new<F>(name: impl Into<Cow<'static, str>>, required: &[&'static str], body: F) -> Self
    where
        F: Fn(&Key, &Params, &mut Stream) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            required: required.to_vec(),
            params: Params::new(),
            body: Arc::new(body),
            frozen: false,
        }
    }

    /// Declare a default value. Defaulted parameters count as bound.
    pub fn with_default(mut self, name: &'static str, value: impl Into<Param>) -> Self {
        self.params.set(name, value);
        self
    }

    /// Process name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Currently bound parameter names.
    pub fn bound_parameters(&self) -> Vec<&str> {
        self.params.names().collect()
    }

    /// Whether [`concretize`](Self::concretize) has been called.
    pub fn is_concretized(&self) -> bool {
        self.frozen
    }

    /// Bind one parameter, overwriting any earlier value of the same name.
    ///
    /// # Errors
    ///
    /// `ReservedParameter` for `"key"`, `ProcessFrozen` after concretization.
    pub fn bind(&mut self, name: &str, value: impl Into<Param>) -> Result<&mut Self> {
        if name == RESERVED_KEY {
            return Err(SaliencyError::ReservedParameter(name.to_string()));
        }
        if self.frozen {
            return Err(SaliencyError::ProcessFrozen(self.name.to_string()));
        }
        self.params.set(name, value);
        Ok(self)
    }

    /// Bind several parameters at once.
    pub fn bind_many<I, S>(&mut self, params: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = (S, Param)>,
        S: AsRef<str>,
    {
        for (name, value) in params {
            self.bind(name.as_ref(), value)?;
        }
        Ok(self)
    }

    /// Fix all bound parameters and return the executable process.
    ///
    /// May be called repeatedly; every returned process behaves identically.
    ///
    /// # Errors
    ///
    /// `MissingParameter` naming the first required parameter left unbound.
    pub fn concretize(&mut self) -> Result<ConcreteProcess> {
        if let Some(missing) = self.required.iter().find(|p| !self.params.contains(p)) {
            return Err(SaliencyError::MissingParameter {
                process: self.name.to_string(),
                parameter: missing.to_string(),
            });
        }
        self.frozen = true;
        Ok(ConcreteProcess {
            name: self.name.clone(),
            params: Arc::new(self.params.clone()),
            body: Arc::clone(&self.body),
        })
    }
}

impl fmt::Debug for AbstractProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbstractProcess")
            .field("name", &self.name)
            .field("required", &self.required)
            .field("params", &self.params)
            .field("frozen", &self.frozen)
            .finish()
    }
}

impl fmt::Display for AbstractProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "abstract {}(static_args={:?})",
            self.name,
            self.bound_parameters()
        )
    }
}

/// A fully bound process: a pure function of the random key.
#[derive(Clone)]
pub struct ConcreteProcess {
    name: Cow<'static, str>,
    params: Arc<Params>,
    body: Arc<ProcessBody>,
}

impl ConcreteProcess {
    /// Process name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run on `key`, returning a fresh stream of outputs.
    pub fn call(&self, key: &Key) -> Result<Stream> {
        let mut stream = Stream::new();
        self.call_with(key, &mut stream)?;
        Ok(stream)
    }

    /// Run on `key`, reading inputs from and writing outputs to `stream`.
    pub fn call_with(&self, key: &Key, stream: &mut Stream) -> Result<()> {
        (self.body)(key, &self.params, stream).map_err(|err| match err {
            SaliencyError::MissingParameter { parameter, .. } => SaliencyError::MissingParameter {
                process: self.name.to_string(),
                parameter,
            },
            other => other,
        })
    }
}

impl fmt::Debug for ConcreteProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcreteProcess")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish()
    }
}
