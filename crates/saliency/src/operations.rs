//! Mask arithmetic and resampling.
//!
//! Combinations broadcast their operands with the usual trailing-axis rules
//! and fail on incompatible shapes. [`resize_linear`] follows the linear
//! (triangle kernel) image resize with half-pixel centers, antialiased when
//! an axis shrinks.

use ndarray::{ArrayViewD, Axis, IxDyn, Zip};

use saliency_core::{AbstractProcess, Result, SaliencyError, Stream, StreamName, Tensor};

/// Broadcast shape of two operands, or `None` if they are incompatible.
pub fn broadcast_shape(a: &[usize], b: &[usize]) -> Option<Vec<usize>> {
    let rank = a.len().max(b.len());
    let dim = |s: &[usize], i: usize| {
        let offset = rank - s.len();
        if i < offset {
            1
        } else {
            s[i - offset]
        }
    };
    (0..rank)
        .map(|i| match (dim(a, i), dim(b, i)) {
            (x, y) if x == y => Some(x),
            (1, y) => Some(y),
            (x, 1) => Some(x),
            _ => None,
        })
        .collect()
}

fn common_shape(op: &str, operands: &[&Tensor]) -> Result<Vec<usize>> {
    let mut shape: Vec<usize> = Vec::new();
    for operand in operands {
        shape = broadcast_shape(&shape, operand.shape()).ok_or_else(|| {
            SaliencyError::ShapeMismatch {
                stream: op.to_string(),
                expected: shape.clone(),
                found: operand.shape().to_vec(),
            }
        })?;
    }
    Ok(shape)
}

fn broadcast_to<'a>(op: &str, t: &'a Tensor, shape: &[usize]) -> Result<ArrayViewD<'a, f32>> {
    t.broadcast(IxDyn(shape))
        .ok_or_else(|| SaliencyError::ShapeMismatch {
            stream: op.to_string(),
            expected: shape.to_vec(),
            found: t.shape().to_vec(),
        })
}

/// `(1 - alpha) * source + alpha * target`.
pub fn convex_combination(source: &Tensor, target: &Tensor, alpha: &Tensor) -> Result<Tensor> {
    const OP: &str = "convex_combination";
    let shape = common_shape(OP, &[source, target, alpha])?;
    Ok(Zip::from(broadcast_to(OP, source, &shape)?)
        .and(broadcast_to(OP, target, &shape)?)
        .and(broadcast_to(OP, alpha, &shape)?)
        .map_collect(|&s, &t, &a| (1.0 - a) * s + a * t))
}

/// `alpha_source * source + alpha_target * target`.
pub fn linear_combination(
    source: &Tensor,
    alpha_source: &Tensor,
    target: &Tensor,
    alpha_target: &Tensor,
) -> Result<Tensor> {
    const OP: &str = "linear_combination";
    let shape = common_shape(OP, &[source, alpha_source, target, alpha_target])?;
    Ok(Zip::from(broadcast_to(OP, source, &shape)?)
        .and(broadcast_to(OP, alpha_source, &shape)?)
        .and(broadcast_to(OP, target, &shape)?)
        .and(broadcast_to(OP, alpha_target, &shape)?)
        .map_collect(|&s, &a_s, &t, &a_t| a_s * s + a_t * t))
}

/// Elementwise product with broadcasting.
pub fn multiply(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    const OP: &str = "multiply";
    let shape = common_shape(OP, &[a, b])?;
    Ok(Zip::from(broadcast_to(OP, a, &shape)?)
        .and(broadcast_to(OP, b, &shape)?)
        .map_collect(|&x, &y| x * y))
}

/// Per output index, the input taps and their normalized weights.
fn linear_weights(in_len: usize, out_len: usize) -> Vec<Vec<(usize, f32)>> {
    let inv_scale = in_len as f64 / out_len as f64;
    let kernel_scale = inv_scale.max(1.0);
    let upper = in_len as f64 - 0.5;

    (0..out_len)
        .map(|o| {
            let sample = (o as f64 + 0.5) * inv_scale - 0.5;
            if !(-0.5..=upper).contains(&sample) {
                return Vec::new();
            }
            let taps: Vec<(usize, f64)> = (0..in_len)
                .filter_map(|j| {
                    let x = (sample - j as f64).abs() / kernel_scale;
                    let w = (1.0 - x).max(0.0);
                    (w > 0.0).then_some((j, w))
                })
                .collect();
            let total: f64 = taps.iter().map(|&(_, w)| w).sum();
            if total <= 1000.0 * f64::from(f32::EPSILON) {
                return Vec::new();
            }
            taps.into_iter()
                .map(|(j, w)| (j, (w / total) as f32))
                .collect()
        })
        .collect()
}

/// Resize every axis of `input` to `shape` with linear interpolation.
///
/// Axes whose size is unchanged are left untouched. The rank must match.
pub fn resize_linear(input: &Tensor, shape: &[usize]) -> Result<Tensor> {
    if input.ndim() != shape.len() {
        return Err(SaliencyError::ShapeMismatch {
            stream: "resize".to_string(),
            expected: shape.to_vec(),
            found: input.shape().to_vec(),
        });
    }
    if input.is_empty() || shape.contains(&0) {
        return Err(SaliencyError::InvalidConfig(
            "cannot resize to or from an empty tensor".to_string(),
        ));
    }

    let mut current = input.clone();
    for (axis, &out_len) in shape.iter().enumerate() {
        let in_len = current.shape()[axis];
        if in_len == out_len {
            continue;
        }
        let mut out_shape = current.shape().to_vec();
        out_shape[axis] = out_len;
        let mut next = Tensor::zeros(IxDyn(&out_shape));
        for (o, taps) in linear_weights(in_len, out_len).iter().enumerate() {
            let mut lane = next.index_axis_mut(Axis(axis), o);
            for &(j, w) in taps {
                lane.scaled_add(w, &current.index_axis(Axis(axis), j));
            }
        }
        current = next;
    }
    Ok(current)
}

fn read<'a>(stream: &'a Stream, name: &StreamName) -> Result<&'a Tensor> {
    stream
        .get(name)
        .ok_or_else(|| SaliencyError::MissingOutput(name.clone()))
}

/// Stream process writing `convex_combination` of three named inputs.
///
/// Required: `name`, `source_name`, `target_name`, `alpha_name`.
pub fn convex_combination_mask() -> AbstractProcess {
    AbstractProcess::new(
        "convex_combination_mask",
        &["name", "source_name", "target_name", "alpha_name"],
        |_, params, stream| {
            let mask = convex_combination(
                read(stream, params.name("source_name")?)?,
                read(stream, params.name("target_name")?)?,
                read(stream, params.name("alpha_name")?)?,
            )?;
            stream.insert(params.name("name")?.clone(), mask);
            Ok(())
        },
    )
}

/// Stream process writing `linear_combination` of four named inputs.
///
/// Required: `name`, `source_name`, `target_name`, `alpha_source_name`,
/// `alpha_target_name`.
pub fn linear_combination_mask() -> AbstractProcess {
    AbstractProcess::new(
        "linear_combination_mask",
        &[
            "name",
            "source_name",
            "target_name",
            "alpha_source_name",
            "alpha_target_name",
        ],
        |_, params, stream| {
            let mask = linear_combination(
                read(stream, params.name("source_name")?)?,
                read(stream, params.name("alpha_source_name")?)?,
                read(stream, params.name("target_name")?)?,
                read(stream, params.name("alpha_target_name")?)?,
            )?;
            stream.insert(params.name("name")?.clone(), mask);
            Ok(())
        },
    )
}

/// Stream process resizing the `source_name` tensor to `shape`.
pub fn resize_mask() -> AbstractProcess {
    AbstractProcess::new(
        "resize_mask",
        &["name", "source_name", "shape"],
        |_, params, stream| {
            let resized = resize_linear(
                read(stream, params.name("source_name")?)?,
                params.shape("shape")?,
            )?;
            stream.insert(params.name("name")?.clone(), resized);
            Ok(())
        },
    )
}
