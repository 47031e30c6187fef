//! Layer Normalization
//!
//! Layer normalization normalizes each example across its feature dimension
//! to zero mean and unit variance, then applies learnable scale (gamma) and
//! shift (beta) parameters. It is batch normalization with the reduction
//! axis transposed: statistics come from each row rather than each column,
//! so nothing depends on the batch, there are no running statistics, and
//! training and inference behave identically.
//!
//! ## Forward Pass
//!
//! ```text
//! 1. mu = mean(x)        per example, over features
//! 2. var = E[(x - mu)²]  biased, divide by D
//! 3. x_hat = (x - mu) / √(var + ε)
//! 4. y = γ * x_hat + β
//! ```
//!
//! ## Backward Pass
//!
//! Same closed form as batch normalization with row sums in place of column
//! sums:
//!
//! ```text
//! grad_γ = Σ grad_y * x_hat        (column sum)
//! grad_β = Σ grad_y                (column sum)
//! grad_x = (1/D) * ivar * (D*grad_x_hat - Σrow grad_x_hat
//!                          - x_hat * Σrow(grad_x_hat * x_hat))
//! ```
//!
//! The two Σrow terms account for each element's influence on its row's mean
//! and variance.

use crate::layers::NormGradients;
use crate::tensor::Tensor;

/// Layer normalization layer
///
/// Normalizes activations across the feature dimension and applies learnable
/// scale and shift.
#[derive(Clone)]
pub struct LayerNorm {
    pub gamma: Tensor, // Scale parameter [features]
    pub beta: Tensor,  // Shift parameter [features]
    pub eps: f64,
}

impl LayerNorm {
    /// Create a new layer normalization layer
    ///
    /// # Initialization
    ///
    /// - gamma initialized to 1.0 (no scaling initially)
    /// - beta initialized to 0.0 (no shift initially)
    /// - eps = 1e-5 (standard value)
    pub fn new(num_features: usize) -> Self {
        Self {
            gamma: Tensor::ones(vec![num_features]),
            beta: Tensor::zeros(vec![num_features]),
            eps: 1e-5,
        }
    }

    /// Forward pass
    ///
    /// Normalizes each row to zero mean and unit variance, then applies
    /// scale/shift. Identical in train and test mode.
    ///
    /// # Arguments
    ///
    /// * `x` - Input tensor [N, features]
    ///
    /// # Returns
    ///
    /// Tuple of (output, cache) where the cache stores every intermediate
    /// the backward pass reads.
    pub fn forward(&self, x: &Tensor) -> (Tensor, LayerNormCache) {
        let (n, d) = self.check_input(x);
        let d_f = d as f64;

        let mut x_centered = vec![0.0; n * d];
        let mut x_hat = vec![0.0; n * d];
        let mut out = vec![0.0; n * d];
        let mut var = vec![0.0; n];
        let mut std = vec![0.0; n];
        let mut inv_std = vec![0.0; n];

        for i in 0..n {
            let row = &x.data[i * d..(i + 1) * d];
            let mu: f64 = row.iter().sum::<f64>() / d_f;

            let mut v = 0.0;
            for j in 0..d {
                let c = row[j] - mu;
                x_centered[i * d + j] = c;
                v += c * c;
            }
            v /= d_f;
            var[i] = v;
            std[i] = (v + self.eps).sqrt();
            inv_std[i] = 1.0 / std[i];

            for j in 0..d {
                let idx = i * d + j;
                x_hat[idx] = x_centered[idx] * inv_std[i];
                out[idx] = self.gamma.data[j] * x_hat[idx] + self.beta.data[j];
            }
        }

        let cache = LayerNormCache {
            x_hat: Tensor::new(x_hat, x.shape.clone()),
            x_centered: Tensor::new(x_centered, x.shape.clone()),
            inv_std: Tensor::new(inv_std, vec![n]),
            std: Tensor::new(std, vec![n]),
            var: Tensor::new(var, vec![n]),
            eps: self.eps,
        };

        (Tensor::new(out, x.shape.clone()), cache)
    }

    /// Backward pass
    ///
    /// Computes gradients for gamma, beta, and the input. The input gradient
    /// is the batch-norm closed form with the reduction taken along each row.
    ///
    /// # Arguments
    ///
    /// * `grad_out` - Gradient from next layer [N, features]
    /// * `cache` - Cached values from forward pass
    pub fn backward(&self, grad_out: &Tensor, cache: &LayerNormCache) -> NormGradients {
        let n = grad_out.shape[0];
        let d = grad_out.shape[1];
        let d_f = d as f64;

        // Parameter gradients accumulate over the batch, per feature
        let mut grad_gamma = vec![0.0; d];
        let mut grad_beta = vec![0.0; d];
        for i in 0..n {
            for j in 0..d {
                let idx = i * d + j;
                grad_gamma[j] += grad_out.data[idx] * cache.x_hat.data[idx];
                grad_beta[j] += grad_out.data[idx];
            }
        }

        // Input gradient: per-row reductions of grad_x_hat
        let mut grad_x = vec![0.0; n * d];
        for i in 0..n {
            let mut sum_gxh = 0.0;
            let mut sum_gxh_xhat = 0.0;
            for j in 0..d {
                let idx = i * d + j;
                let g = grad_out.data[idx] * self.gamma.data[j];
                sum_gxh += g;
                sum_gxh_xhat += g * cache.x_hat.data[idx];
            }

            for j in 0..d {
                let idx = i * d + j;
                let g = grad_out.data[idx] * self.gamma.data[j];
                grad_x[idx] = (1.0 / d_f)
                    * cache.inv_std.data[i]
                    * (d_f * g - sum_gxh - cache.x_hat.data[idx] * sum_gxh_xhat);
            }
        }

        NormGradients {
            gamma: Tensor::new(grad_gamma, vec![d]),
            beta: Tensor::new(grad_beta, vec![d]),
            x: Tensor::new(grad_x, grad_out.shape.clone()),
        }
    }

    fn check_input(&self, x: &Tensor) -> (usize, usize) {
        assert_eq!(
            x.shape.len(),
            2,
            "layer norm expects a 2D input, got {:?}",
            x.shape
        );
        assert_eq!(
            x.shape[1],
            self.gamma.data.len(),
            "layer norm sized for {} features but input has {}",
            self.gamma.data.len(),
            x.shape[1]
        );
        (x.shape[0], x.shape[1])
    }
}

/// Cache for layer norm backward pass
///
/// Same layout as the batch-norm cache, with per-row statistics.
pub struct LayerNormCache {
    pub x_hat: Tensor,
    pub x_centered: Tensor,
    pub inv_std: Tensor,
    pub std: Tensor,
    pub var: Tensor,
    pub eps: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_forward_normalizes_each_row() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut ln = LayerNorm::new(8);
        ln.eps = 1e-12;
        let x = Tensor::randn(vec![5, 8], 4.0, &mut rng).add_scalar(2.0);

        let (y, _) = ln.forward(&x);
        for i in 0..5 {
            let row = &y.data[i * 8..(i + 1) * 8];
            let mean: f64 = row.iter().sum::<f64>() / 8.0;
            let var: f64 = row.iter().map(|&v| (v - mean) * (v - mean)).sum::<f64>() / 8.0;
            assert!(mean.abs() < 1e-8);
            assert!((var - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_forward_is_batch_independent() {
        // Row 0's output must not change when other rows do
        let mut rng = StdRng::seed_from_u64(10);
        let ln = LayerNorm::new(4);
        let a = Tensor::randn(vec![3, 4], 1.0, &mut rng);
        let mut b = a.clone();
        for v in b.data[4..].iter_mut() {
            *v += 100.0;
        }

        let (ya, _) = ln.forward(&a);
        let (yb, _) = ln.forward(&b);
        assert_eq!(&ya.data[..4], &yb.data[..4]);
    }

    #[test]
    fn test_backward_shapes() {
        let mut rng = StdRng::seed_from_u64(11);
        let ln = LayerNorm::new(6);
        let x = Tensor::randn(vec![4, 6], 1.0, &mut rng);
        let (_, cache) = ln.forward(&x);
        let grads = ln.backward(&Tensor::ones(vec![4, 6]), &cache);
        assert_eq!(grads.x.shape, vec![4, 6]);
        assert_eq!(grads.gamma.shape, vec![6]);
        assert_eq!(grads.beta.shape, vec![6]);
        // grad_beta with all-ones upstream is the batch size per feature
        for v in grads.beta.data {
            assert!((v - 4.0).abs() < 1e-12);
        }
    }
}
