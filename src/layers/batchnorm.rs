//! Batch Normalization
//!
//! Batch normalization normalizes each feature across the minibatch to zero
//! mean and unit variance, then applies learnable scale (gamma) and shift
//! (beta) parameters.
//!
//! ## Forward Pass (training)
//!
//! ```text
//! 1. mu = E[x]                       per feature, over the batch
//! 2. var = E[(x - mu)²]              biased, divide by N
//! 3. x_hat = (x - mu) / √(var + ε)
//! 4. y = γ * x_hat + β
//! ```
//!
//! Training also maintains exponentially decaying running statistics for use
//! at test time:
//!
//! ```text
//! running_mean = momentum * running_mean + (1 - momentum) * mu
//! running_var  = momentum * running_var  + (1 - momentum) * var
//! ```
//!
//! At test time the stored running statistics normalize the data instead of
//! batch statistics, and nothing is updated. This is the only layer in the
//! crate with cross-call mutable state.
//!
//! ## The Tricky Part: Backward Pass
//!
//! The mean and variance depend on every element in the batch, so each
//! element's gradient picks up contributions through both statistics. Two
//! derivations are provided:
//!
//! - [`BatchNorm::backward`] — the algebraically simplified closed form,
//!   used as the production path:
//!
//! ```text
//! grad_x = (1/N) * ivar * (N*grad_x_hat - Σ grad_x_hat
//!                          - x_hat * Σ(grad_x_hat * x_hat))
//! ```
//!
//! - [`BatchNorm::backward_stepwise`] — the step-by-step walk back through
//!   the forward computation graph, one intermediate at a time.
//!
//! Both produce the same numbers; the stepwise form exists because it is the
//! one you can check line-by-line against the forward pass.
//!
//! ## Spatial Variant
//!
//! [`BatchNorm::forward_spatial`] normalizes a 4D `[N, C, H, W]` tensor per
//! channel by reinterpreting it as a 2D matrix whose rows are all positions
//! across the batch and spatial extent, delegating to the 2D path, and
//! mapping back.

use crate::layers::{Mode, NormGradients};
use crate::tensor::Tensor;

/// Batch normalization layer
///
/// Owns the learnable per-feature scale and shift plus the running
/// statistics that accumulate during training.
#[derive(Clone)]
pub struct BatchNorm {
    pub gamma: Tensor, // Scale parameter [features]
    pub beta: Tensor,  // Shift parameter [features]
    pub eps: f64,
    pub momentum: f64,
    pub running_mean: Tensor,
    pub running_var: Tensor,
    pub mode: Mode,
}

impl BatchNorm {
    /// Create a new batch normalization layer
    ///
    /// # Initialization
    ///
    /// - gamma = 1.0 (no scaling initially), beta = 0.0 (no shift)
    /// - running mean/var = 0.0
    /// - eps = 1e-5, momentum = 0.9 (standard defaults; both are public
    ///   fields for callers that need different values)
    /// - mode = Train
    pub fn new(num_features: usize) -> Self {
        Self {
            gamma: Tensor::ones(vec![num_features]),
            beta: Tensor::zeros(vec![num_features]),
            eps: 1e-5,
            momentum: 0.9,
            running_mean: Tensor::zeros(vec![num_features]),
            running_var: Tensor::zeros(vec![num_features]),
            mode: Mode::Train,
        }
    }

    /// Switch between the training and inference paths
    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    /// Forward pass, dispatching on the layer's current mode
    ///
    /// Training mode returns the cache the backward pass needs; test mode
    /// returns `None` since there is nothing to backpropagate through.
    pub fn forward(&mut self, x: &Tensor) -> (Tensor, Option<BatchNormCache>) {
        match self.mode {
            Mode::Train => {
                let (y, cache) = self.forward_train(x);
                (y, Some(cache))
            }
            Mode::Test => (self.forward_test(x), None),
        }
    }

    /// Training-mode forward pass
    ///
    /// Normalizes with batch statistics, updates the running statistics, and
    /// caches every intermediate the backward pass reads.
    ///
    /// # Arguments
    ///
    /// * `x` - Input tensor [N, features]
    pub fn forward_train(&mut self, x: &Tensor) -> (Tensor, BatchNormCache) {
        let (n, d) = self.check_input(x);
        let n_f = n as f64;

        // Per-feature batch mean
        let mut mu = vec![0.0; d];
        for i in 0..n {
            for (j, m) in mu.iter_mut().enumerate() {
                *m += x.data[i * d + j];
            }
        }
        for m in mu.iter_mut() {
            *m /= n_f;
        }

        // Centered input and biased variance
        let mut x_centered = vec![0.0; n * d];
        let mut var = vec![0.0; d];
        for i in 0..n {
            for j in 0..d {
                let c = x.data[i * d + j] - mu[j];
                x_centered[i * d + j] = c;
                var[j] += c * c;
            }
        }
        for v in var.iter_mut() {
            *v /= n_f;
        }

        let std: Vec<f64> = var.iter().map(|&v| (v + self.eps).sqrt()).collect();
        let inv_std: Vec<f64> = std.iter().map(|&s| 1.0 / s).collect();

        // Normalize, then scale and shift
        let mut x_hat = vec![0.0; n * d];
        let mut out = vec![0.0; n * d];
        for i in 0..n {
            for j in 0..d {
                let idx = i * d + j;
                x_hat[idx] = x_centered[idx] * inv_std[j];
                out[idx] = self.gamma.data[j] * x_hat[idx] + self.beta.data[j];
            }
        }

        // Exponential moving average of the batch statistics
        for j in 0..d {
            self.running_mean.data[j] =
                self.momentum * self.running_mean.data[j] + (1.0 - self.momentum) * mu[j];
            self.running_var.data[j] =
                self.momentum * self.running_var.data[j] + (1.0 - self.momentum) * var[j];
        }

        let cache = BatchNormCache {
            x_hat: Tensor::new(x_hat, x.shape.clone()),
            x_centered: Tensor::new(x_centered, x.shape.clone()),
            inv_std: Tensor::new(inv_std, vec![d]),
            std: Tensor::new(std, vec![d]),
            var: Tensor::new(var, vec![d]),
            eps: self.eps,
        };

        (Tensor::new(out, x.shape.clone()), cache)
    }

    /// Test-mode forward pass
    ///
    /// Normalizes with the stored running statistics; updates nothing.
    ///
    /// The normalizer here is `sqrt(running_var) + eps`, not the training
    /// path's `sqrt(var + eps)`. The two disagree by O(eps); kept as-is so
    /// train-then-infer results stay reproducible against prior runs.
    pub fn forward_test(&self, x: &Tensor) -> Tensor {
        let (n, d) = self.check_input(x);

        let mut out = vec![0.0; n * d];
        for i in 0..n {
            for j in 0..d {
                let idx = i * d + j;
                let x_norm = (x.data[idx] - self.running_mean.data[j])
                    / (self.running_var.data[j].sqrt() + self.eps);
                out[idx] = self.gamma.data[j] * x_norm + self.beta.data[j];
            }
        }

        Tensor::new(out, x.shape.clone())
    }

    /// Backward pass (simplified closed form, production path)
    ///
    /// # Arguments
    ///
    /// * `grad_out` - Gradient from next layer [N, features]
    /// * `cache` - Cache from the matching training-mode forward call
    ///
    /// # Returns
    ///
    /// Gradients for gamma and beta (per feature, summed over the batch)
    /// and for the input.
    pub fn backward(&self, grad_out: &Tensor, cache: &BatchNormCache) -> NormGradients {
        let n = grad_out.shape[0];
        let d = grad_out.shape[1];
        let n_f = n as f64;

        // grad_gamma = Σ grad_out * x_hat,  grad_beta = Σ grad_out
        let mut grad_gamma = vec![0.0; d];
        let mut grad_beta = vec![0.0; d];
        for i in 0..n {
            for j in 0..d {
                let idx = i * d + j;
                grad_gamma[j] += grad_out.data[idx] * cache.x_hat.data[idx];
                grad_beta[j] += grad_out.data[idx];
            }
        }

        // grad_x_hat = grad_out * gamma, plus its two column reductions
        let mut sum_gxh = vec![0.0; d];
        let mut sum_gxh_xhat = vec![0.0; d];
        let mut grad_x_hat = vec![0.0; n * d];
        for i in 0..n {
            for j in 0..d {
                let idx = i * d + j;
                let g = grad_out.data[idx] * self.gamma.data[j];
                grad_x_hat[idx] = g;
                sum_gxh[j] += g;
                sum_gxh_xhat[j] += g * cache.x_hat.data[idx];
            }
        }

        // grad_x = (1/N) * ivar * (N*gxh - Σgxh - x_hat * Σ(gxh*x_hat))
        let mut grad_x = vec![0.0; n * d];
        for i in 0..n {
            for j in 0..d {
                let idx = i * d + j;
                grad_x[idx] = (1.0 / n_f)
                    * cache.inv_std.data[j]
                    * (n_f * grad_x_hat[idx]
                        - sum_gxh[j]
                        - cache.x_hat.data[idx] * sum_gxh_xhat[j]);
            }
        }

        NormGradients {
            gamma: Tensor::new(grad_gamma, vec![d]),
            beta: Tensor::new(grad_beta, vec![d]),
            x: Tensor::new(grad_x, grad_out.shape.clone()),
        }
    }

    /// Backward pass, unrolled one forward step at a time
    ///
    /// Walks the forward computation graph in reverse: scale/shift, then the
    /// normalization, then the variance and mean reductions. Matches
    /// [`BatchNorm::backward`] to floating-point roundoff on any input;
    /// slower but auditable against the forward pass line-by-line.
    pub fn backward_stepwise(&self, grad_out: &Tensor, cache: &BatchNormCache) -> NormGradients {
        let n = grad_out.shape[0];
        let d = grad_out.shape[1];
        let n_f = n as f64;

        // out = gamma * x_hat + beta
        let mut grad_gamma = vec![0.0; d];
        let mut grad_beta = vec![0.0; d];
        let mut grad_x_hat = vec![0.0; n * d];
        for i in 0..n {
            for j in 0..d {
                let idx = i * d + j;
                grad_beta[j] += grad_out.data[idx];
                grad_gamma[j] += grad_out.data[idx] * cache.x_hat.data[idx];
                grad_x_hat[idx] = grad_out.data[idx] * self.gamma.data[j];
            }
        }

        // x_hat = x_centered * inv_std
        let mut grad_xc_direct = vec![0.0; n * d];
        let mut grad_inv_std = vec![0.0; d];
        for i in 0..n {
            for j in 0..d {
                let idx = i * d + j;
                grad_xc_direct[idx] = grad_x_hat[idx] * cache.inv_std.data[j];
                grad_inv_std[j] += grad_x_hat[idx] * cache.x_centered.data[idx];
            }
        }

        // inv_std = 1 / std
        let grad_std: Vec<f64> = (0..d)
            .map(|j| -grad_inv_std[j] / (cache.std.data[j] * cache.std.data[j]))
            .collect();

        // std = sqrt(var + eps)
        let grad_var: Vec<f64> = (0..d)
            .map(|j| 0.5 * grad_std[j] / (cache.var.data[j] + cache.eps).sqrt())
            .collect();

        // var = (1/N) Σ x_centered², then sq = x_centered²
        let mut grad_xc = grad_xc_direct;
        for i in 0..n {
            for j in 0..d {
                let idx = i * d + j;
                grad_xc[idx] += 2.0 * cache.x_centered.data[idx] * grad_var[j] / n_f;
            }
        }

        // x_centered = x - mu; mu collects the negated column sums
        let mut grad_mu = vec![0.0; d];
        for i in 0..n {
            for j in 0..d {
                grad_mu[j] -= grad_xc[i * d + j];
            }
        }

        // mu = (1/N) Σ x
        let mut grad_x = grad_xc;
        for i in 0..n {
            for j in 0..d {
                grad_x[i * d + j] += grad_mu[j] / n_f;
            }
        }

        NormGradients {
            gamma: Tensor::new(grad_gamma, vec![d]),
            beta: Tensor::new(grad_beta, vec![d]),
            x: Tensor::new(grad_x, grad_out.shape.clone()),
        }
    }

    /// Spatial forward pass over a 4D `[N, C, H, W]` tensor
    ///
    /// Rows become all `(n, h, w)` positions, columns become channels, and
    /// the 2D path does the rest. Running statistics are per channel.
    pub fn forward_spatial(&mut self, x: &Tensor) -> (Tensor, Option<BatchNormCache>) {
        let (n, c, h, w) = dims4(x);
        let rows = to_channel_rows(x);
        let (out_rows, cache) = self.forward(&rows);
        (from_channel_rows(&out_rows, n, c, h, w), cache)
    }

    /// Spatial backward pass mirroring [`BatchNorm::forward_spatial`]
    pub fn backward_spatial(&self, grad_out: &Tensor, cache: &BatchNormCache) -> NormGradients {
        let (n, c, h, w) = dims4(grad_out);
        let grad_rows = to_channel_rows(grad_out);
        let mut grads = self.backward(&grad_rows, cache);
        grads.x = from_channel_rows(&grads.x, n, c, h, w);
        grads
    }

    fn check_input(&self, x: &Tensor) -> (usize, usize) {
        assert_eq!(
            x.shape.len(),
            2,
            "batch norm expects a 2D input, got {:?}",
            x.shape
        );
        assert_eq!(
            x.shape[1],
            self.gamma.data.len(),
            "batch norm sized for {} features but input has {}",
            self.gamma.data.len(),
            x.shape[1]
        );
        (x.shape[0], x.shape[1])
    }
}

/// Cache for batch norm backward pass
///
/// Every intermediate of the training-time forward computation; the layer
/// itself holds gamma and eps, the cache holds the per-batch quantities.
pub struct BatchNormCache {
    pub x_hat: Tensor,
    pub x_centered: Tensor,
    pub inv_std: Tensor,
    pub std: Tensor,
    pub var: Tensor,
    pub eps: f64,
}

pub(crate) fn dims4(x: &Tensor) -> (usize, usize, usize, usize) {
    assert_eq!(x.shape.len(), 4, "expected a 4D tensor, got {:?}", x.shape);
    (x.shape[0], x.shape[1], x.shape[2], x.shape[3])
}

/// Reinterpret `[N, C, H, W]` as `[N*H*W, C]`: one row per spatial position
/// per example, one column per channel.
pub(crate) fn to_channel_rows(x: &Tensor) -> Tensor {
    let (n, c, h, w) = dims4(x);
    let mut rows = vec![0.0; n * h * w * c];
    for ni in 0..n {
        for ci in 0..c {
            for hi in 0..h {
                for wi in 0..w {
                    let row = (ni * h + hi) * w + wi;
                    rows[row * c + ci] = x.data[x.offset4(ni, ci, hi, wi)];
                }
            }
        }
    }
    Tensor::new(rows, vec![n * h * w, c])
}

/// Inverse of [`to_channel_rows`]
pub(crate) fn from_channel_rows(rows: &Tensor, n: usize, c: usize, h: usize, w: usize) -> Tensor {
    assert_eq!(
        rows.shape,
        vec![n * h * w, c],
        "channel-rows shape mismatch: {:?} for target [{}, {}, {}, {}]",
        rows.shape,
        n,
        c,
        h,
        w
    );
    let mut out = Tensor::zeros(vec![n, c, h, w]);
    for ni in 0..n {
        for ci in 0..c {
            for hi in 0..h {
                for wi in 0..w {
                    let row = (ni * h + hi) * w + wi;
                    let idx = out.offset4(ni, ci, hi, wi);
                    out.data[idx] = rows.data[row * c + ci];
                }
            }
        }
    }
    out
}
