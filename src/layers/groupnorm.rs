//! Spatial Group Normalization
//!
//! Group normalization splits the channels of a 4D `[N, C, H, W]` tensor
//! into G contiguous groups and normalizes each (example, group) pair over
//! its channels and spatial extent. Statistics never cross examples, so like
//! layer norm it works at any batch size and keeps no running state; unlike
//! layer norm the normalization granularity sits between per-channel and
//! per-example.
//!
//! After normalizing within groups, the usual per-channel scale γ and shift
//! β (both of shape `[C]`) are applied.
//!
//! ## Forward Pass
//!
//! For each example n and group g over m = (C/G)·H·W elements:
//!
//! ```text
//! mu = mean over the group
//! var = E[(x - mu)²]          biased, divide by m
//! x_hat = (x - mu) / √(var + ε)
//! y[n,c,h,w] = γ[c] * x_hat[n,c,h,w] + β[c]
//! ```
//!
//! ## Backward Pass
//!
//! The batch/layer-norm closed form with the reduction taken over each
//! group's channel-and-spatial axes; γ/β gradients reduce over batch and
//! space per channel.

use crate::error::ViolaError;
use crate::layers::batchnorm::dims4;
use crate::layers::NormGradients;
use crate::tensor::Tensor;

/// Spatial group normalization layer
#[derive(Clone, Debug)]
pub struct GroupNorm {
    pub gamma: Tensor, // Scale parameter [channels]
    pub beta: Tensor,  // Shift parameter [channels]
    pub eps: f64,
    pub groups: usize,
}

impl GroupNorm {
    /// Create a new group normalization layer
    ///
    /// # Arguments
    ///
    /// * `num_channels` - Channel count C of the 4D inputs
    /// * `groups` - Number of contiguous channel groups G
    ///
    /// # Errors
    ///
    /// Returns [`ViolaError::InvalidConfiguration`] unless G divides C.
    pub fn new(num_channels: usize, groups: usize) -> Result<Self, ViolaError> {
        if groups == 0 || num_channels % groups != 0 {
            return Err(ViolaError::InvalidConfiguration(format!(
                "group norm needs groups to divide channels, got {} channels / {} groups",
                num_channels, groups
            )));
        }
        Ok(Self {
            gamma: Tensor::ones(vec![num_channels]),
            beta: Tensor::zeros(vec![num_channels]),
            eps: 1e-5,
            groups,
        })
    }

    /// Forward pass
    ///
    /// # Arguments
    ///
    /// * `x` - Input tensor [N, C, H, W]
    pub fn forward(&self, x: &Tensor) -> (Tensor, GroupNormCache) {
        let (n, c, h, w) = dims4(x);
        assert_eq!(
            c,
            self.gamma.data.len(),
            "group norm sized for {} channels but input has {}",
            self.gamma.data.len(),
            c
        );
        let g = self.groups;
        let group_size = c / g;
        let m = (group_size * h * w) as f64;

        let mut x_centered = vec![0.0; x.data.len()];
        let mut x_hat = vec![0.0; x.data.len()];
        let mut out = vec![0.0; x.data.len()];
        let mut inv_std = vec![0.0; n * g];
        let mut var = vec![0.0; n * g];

        for ni in 0..n {
            for gi in 0..g {
                let channels = gi * group_size..(gi + 1) * group_size;

                let mut mu = 0.0;
                for ci in channels.clone() {
                    for hi in 0..h {
                        for wi in 0..w {
                            mu += x.data[x.offset4(ni, ci, hi, wi)];
                        }
                    }
                }
                mu /= m;

                let mut v = 0.0;
                for ci in channels.clone() {
                    for hi in 0..h {
                        for wi in 0..w {
                            let idx = x.offset4(ni, ci, hi, wi);
                            let centered = x.data[idx] - mu;
                            x_centered[idx] = centered;
                            v += centered * centered;
                        }
                    }
                }
                v /= m;

                let ivar = 1.0 / (v + self.eps).sqrt();
                var[ni * g + gi] = v;
                inv_std[ni * g + gi] = ivar;

                for ci in channels {
                    for hi in 0..h {
                        for wi in 0..w {
                            let idx = x.offset4(ni, ci, hi, wi);
                            x_hat[idx] = x_centered[idx] * ivar;
                            out[idx] = self.gamma.data[ci] * x_hat[idx] + self.beta.data[ci];
                        }
                    }
                }
            }
        }

        let cache = GroupNormCache {
            x_hat: Tensor::new(x_hat, x.shape.clone()),
            x_centered: Tensor::new(x_centered, x.shape.clone()),
            inv_std: Tensor::new(inv_std, vec![n, g]),
            var: Tensor::new(var, vec![n, g]),
            eps: self.eps,
        };

        (Tensor::new(out, x.shape.clone()), cache)
    }

    /// Backward pass
    ///
    /// # Arguments
    ///
    /// * `grad_out` - Gradient from next layer [N, C, H, W]
    /// * `cache` - Cached values from forward pass
    pub fn backward(&self, grad_out: &Tensor, cache: &GroupNormCache) -> NormGradients {
        let (n, c, h, w) = dims4(grad_out);
        let g = self.groups;
        let group_size = c / g;
        let m = (group_size * h * w) as f64;

        // Per-channel parameter gradients, reduced over batch and space
        let mut grad_gamma = vec![0.0; c];
        let mut grad_beta = vec![0.0; c];
        for ni in 0..n {
            for ci in 0..c {
                for hi in 0..h {
                    for wi in 0..w {
                        let idx = grad_out.offset4(ni, ci, hi, wi);
                        grad_gamma[ci] += grad_out.data[idx] * cache.x_hat.data[idx];
                        grad_beta[ci] += grad_out.data[idx];
                    }
                }
            }
        }

        // Input gradient: closed form per (example, group)
        let mut grad_x = vec![0.0; grad_out.data.len()];
        for ni in 0..n {
            for gi in 0..g {
                let channels = gi * group_size..(gi + 1) * group_size;

                let mut sum_gxh = 0.0;
                let mut sum_gxh_xhat = 0.0;
                for ci in channels.clone() {
                    for hi in 0..h {
                        for wi in 0..w {
                            let idx = grad_out.offset4(ni, ci, hi, wi);
                            let gxh = grad_out.data[idx] * self.gamma.data[ci];
                            sum_gxh += gxh;
                            sum_gxh_xhat += gxh * cache.x_hat.data[idx];
                        }
                    }
                }

                let ivar = cache.inv_std.data[ni * g + gi];
                for ci in channels {
                    for hi in 0..h {
                        for wi in 0..w {
                            let idx = grad_out.offset4(ni, ci, hi, wi);
                            let gxh = grad_out.data[idx] * self.gamma.data[ci];
                            grad_x[idx] = (1.0 / m)
                                * ivar
                                * (m * gxh - sum_gxh - cache.x_hat.data[idx] * sum_gxh_xhat);
                        }
                    }
                }
            }
        }

        NormGradients {
            gamma: Tensor::new(grad_gamma, vec![c]),
            beta: Tensor::new(grad_beta, vec![c]),
            x: Tensor::new(grad_x, grad_out.shape.clone()),
        }
    }
}

/// Cache for group norm backward pass
///
/// Per-(example, group) statistics plus the element-wise intermediates.
pub struct GroupNormCache {
    pub x_hat: Tensor,
    pub x_centered: Tensor,
    pub inv_std: Tensor,
    pub var: Tensor,
    pub eps: f64,
}
