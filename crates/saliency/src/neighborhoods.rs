//! Random mask neighborhoods.
//!
//! Each mask comes in two forms: a plain function of a key and a shape, used
//! directly by the explanation methods, and an abstract process that writes
//! the mask into the stream under its bound `name`.
//!
//! | Process | Required | Defaults |
//! |---------|----------|----------|
//! | [`deterministic_mask`] | `name`, `mask` | |
//! | [`uniform_mask`] | `name`, `shape` | |
//! | [`bernoulli_mask`] | `name`, `shape` | `p = 0.5` |
//! | [`normal_mask`] | `name`, `shape` | `mean = 0`, `std = 1` |

use ndarray::IxDyn;
use rand::Rng;
use rand_distr::{Bernoulli, Distribution, Normal};

use saliency_core::{AbstractProcess, Key, Result, SaliencyError, Tensor};

/// Uniform `[0, 1)` noise.
pub fn uniform_tensor(key: &Key, shape: &[usize]) -> Tensor {
    let mut rng = key.rng();
    Tensor::from_shape_simple_fn(IxDyn(shape), || rng.random::<f32>())
}

/// Independent Bernoulli(p) draws as `0.0` / `1.0`.
pub fn bernoulli_tensor(key: &Key, shape: &[usize], p: f64) -> Result<Tensor> {
    let dist = Bernoulli::new(p)
        .map_err(|e| SaliencyError::InvalidConfig(format!("bernoulli p={p}: {e}")))?;
    let mut rng = key.rng();
    Ok(Tensor::from_shape_simple_fn(IxDyn(shape), || {
        if dist.sample(&mut rng) {
            1.0
        } else {
            0.0
        }
    }))
}

/// Gaussian noise with the given mean and standard deviation.
pub fn normal_tensor(key: &Key, shape: &[usize], mean: f32, std: f32) -> Result<Tensor> {
    let dist = Normal::new(mean, std)
        .map_err(|e| SaliencyError::InvalidConfig(format!("normal std={std}: {e}")))?;
    let mut rng = key.rng();
    Ok(Tensor::from_shape_simple_fn(IxDyn(shape), || dist.sample(&mut rng)))
}

/// Writes the bound `mask` tensor, ignoring the key.
pub fn deterministic_mask() -> AbstractProcess {
    AbstractProcess::new("deterministic_mask", &["name", "mask"], |_, params, stream| {
        stream.insert(params.name("name")?.clone(), params.tensor("mask")?.clone());
        Ok(())
    })
}

/// Writes uniform `[0, 1)` noise of the bound `shape`.
pub fn uniform_mask() -> AbstractProcess {
    AbstractProcess::new("uniform_mask", &["name", "shape"], |key, params, stream| {
        let mask = uniform_tensor(key, params.shape("shape")?);
        stream.insert(params.name("name")?.clone(), mask);
        Ok(())
    })
}

/// Writes Bernoulli(`p`) draws of the bound `shape`.
pub fn bernoulli_mask() -> AbstractProcess {
    AbstractProcess::new("bernoulli_mask", &["name", "shape"], |key, params, stream| {
        let mask = bernoulli_tensor(key, params.shape("shape")?, params.float("p")?)?;
        stream.insert(params.name("name")?.clone(), mask);
        Ok(())
    })
    .with_default("p", 0.5)
}

/// Writes Gaussian noise of the bound `shape`.
pub fn normal_mask() -> AbstractProcess {
    AbstractProcess::new("normal_mask", &["name", "shape"], |key, params, stream| {
        let mask = normal_tensor(
            key,
            params.shape("shape")?,
            params.float("mean")? as f32,
            params.float("std")? as f32,
        )?;
        stream.insert(params.name("name")?.clone(), mask);
        Ok(())
    })
    .with_default("mean", 0.0)
    .with_default("std", 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use saliency_core::StreamName;

    #[test]
    fn test_uniform_range() {
        let t = uniform_tensor(&Key::new(1), &[1, 8, 8, 3]);
        assert!(t.iter().all(|&x| (0.0..1.0).contains(&x)));
    }

    #[test]
    fn test_bernoulli_values() {
        let t = bernoulli_tensor(&Key::new(2), &[1, 10, 10, 1], 0.5).unwrap();
        assert!(t.iter().all(|&x| x == 0.0 || x == 1.0));
        assert!(t.iter().any(|&x| x == 1.0));
        assert!(bernoulli_tensor(&Key::new(2), &[1], 1.5).is_err());
    }

    #[test]
    fn test_normal_moments() {
        let t = normal_tensor(&Key::new(3), &[20_000], 2.0, 0.5).unwrap();
        let mean = t.mean().unwrap();
        let var = t.mapv(|x| (x - mean).powi(2)).mean().unwrap();
        assert!((mean - 2.0).abs() < 0.02, "mean {mean}");
        assert!((var - 0.25).abs() < 0.02, "var {var}");
    }

    #[test]
    fn test_mask_processes_write_named_outputs() {
        let mut uniform = uniform_mask();
        uniform
            .bind("name", StreamName::new("uniform_mask"))
            .unwrap()
            .bind("shape", vec![1usize, 4, 4, 3])
            .unwrap();
        let out = uniform.concretize().unwrap().call(&Key::new(0)).unwrap();
        assert_eq!(out[&StreamName::new("uniform_mask")].shape(), &[1, 4, 4, 3]);

        let mut det = deterministic_mask();
        det.bind("name", StreamName::new("alpha_mask"))
            .unwrap()
            .bind("mask", Tensor::from_elem(IxDyn(&[1, 1, 1, 1]), 0.5))
            .unwrap();
        let a = det.concretize().unwrap();
        assert_eq!(a.call(&Key::new(0)).unwrap(), a.call(&Key::new(9)).unwrap());
    }

    #[test]
    fn test_normal_mask_defaults() {
        let mut normal = normal_mask();
        normal
            .bind("name", StreamName::new("noise"))
            .unwrap()
            .bind("shape", vec![4usize])
            .unwrap();
        let concrete = normal.concretize().unwrap();
        let out = concrete.call(&Key::new(5)).unwrap();
        let expected = normal_tensor(&Key::new(5), &[4], 0.0, 1.0).unwrap();
        assert_eq!(out[&StreamName::new("noise")], expected);
    }
}
