//! 2D Convolution (naive reference implementation)
//!
//! Convolves a batch of multi-channel images with a bank of learned filters.
//! The loops here mirror the mathematical definition window by window —
//! correctness and auditability over throughput. A vectorized variant (e.g.
//! im2col) must reproduce these results exactly.
//!
//! ## Forward Pass
//!
//! ```text
//! Input:   x [N, C, H, W]
//! Filters: w [F, C, HH, WW]
//! Bias:    b [F]
//!
//! out[n, f, i, j] = Σ_{c,a,b} x_padded[n, c, i*stride + a, j*stride + b]
//!                            * w[f, c, a, b]   + bias[f]
//! ```
//!
//! The input is zero-padded symmetrically by `pad` rows/columns on each
//! side. Output spatial dimensions:
//!
//! ```text
//! H' = 1 + (H + 2*pad - HH) / stride
//! W' = 1 + (W + 2*pad - WW) / stride
//! ```
//!
//! Configurations where these are not integers are rejected.
//!
//! ## Backward Pass
//!
//! - `grad_b[f]` sums the upstream gradient over batch and both spatial axes
//! - `grad_w` and `grad_x` re-walk every (example, filter, output position)
//!   window, adding the outer-product contribution of the upstream gradient
//!   at that position into the filter and (through the padded buffer, later
//!   cropped) the input
//!
//! Examples write disjoint output rows in the forward pass, so it runs in
//! parallel over examples. The backward pass accumulates into shared `grad_w`
//! across examples and stays sequential.

use rayon::prelude::*;

use crate::layers::batchnorm::dims4;
use crate::tensor::Tensor;

/// 2D convolution layer
#[derive(Clone)]
pub struct Conv2d {
    /// Filter bank [num_filters, in_channels, filter_height, filter_width]
    pub weight: Tensor,
    /// Per-filter bias [num_filters]
    pub bias: Tensor,
    pub stride: usize,
    pub pad: usize,
}

impl Conv2d {
    /// Create a new convolution layer
    ///
    /// # Arguments
    ///
    /// * `num_filters` - Number of output channels F
    /// * `in_channels` - Input channel count C each filter spans
    /// * `filter_height`, `filter_width` - Spatial extent of each filter
    /// * `stride`, `pad` - Window step and symmetric zero padding
    /// * `weight_scale` - Std of the zero-mean Gaussian weight draw
    /// * `rng` - Generator for the weight draw; bias starts at zero
    #[allow(clippy::too_many_arguments)]
    pub fn new<R: rand::Rng>(
        num_filters: usize,
        in_channels: usize,
        filter_height: usize,
        filter_width: usize,
        stride: usize,
        pad: usize,
        weight_scale: f64,
        rng: &mut R,
    ) -> Self {
        Self {
            weight: Tensor::randn(
                vec![num_filters, in_channels, filter_height, filter_width],
                weight_scale,
                rng,
            ),
            bias: Tensor::zeros(vec![num_filters]),
            stride,
            pad,
        }
    }

    /// Output spatial dimensions for an input of `h` × `w`
    ///
    /// # Panics
    ///
    /// Panics when stride/padding do not yield integer output sizes.
    fn output_dims(&self, h: usize, w: usize) -> (usize, usize) {
        let hh = self.weight.shape[2];
        let ww = self.weight.shape[3];
        assert_eq!(
            (h + 2 * self.pad - hh) % self.stride,
            0,
            "conv height {} with filter {}, pad {}, stride {} has no integer output size",
            h,
            hh,
            self.pad,
            self.stride
        );
        assert_eq!(
            (w + 2 * self.pad - ww) % self.stride,
            0,
            "conv width {} with filter {}, pad {}, stride {} has no integer output size",
            w,
            ww,
            self.pad,
            self.stride
        );
        (
            1 + (h + 2 * self.pad - hh) / self.stride,
            1 + (w + 2 * self.pad - ww) / self.stride,
        )
    }

    /// Zero-pad H and W symmetrically by `self.pad`
    fn pad_input(&self, x: &Tensor) -> Tensor {
        let (n, c, h, w) = dims4(x);
        if self.pad == 0 {
            return x.clone();
        }
        let mut padded = Tensor::zeros(vec![n, c, h + 2 * self.pad, w + 2 * self.pad]);
        for ni in 0..n {
            for ci in 0..c {
                for hi in 0..h {
                    for wi in 0..w {
                        let idx = padded.offset4(ni, ci, hi + self.pad, wi + self.pad);
                        padded.data[idx] = x.data[x.offset4(ni, ci, hi, wi)];
                    }
                }
            }
        }
        padded
    }

    /// Forward pass
    ///
    /// # Arguments
    ///
    /// * `x` - Input tensor [N, C, H, W]
    ///
    /// # Returns
    ///
    /// Tuple of (output [N, F, H', W'], cache)
    pub fn forward(&self, x: &Tensor) -> (Tensor, Conv2dCache) {
        let (n, c, h, w) = dims4(x);
        let f = self.weight.shape[0];
        assert_eq!(
            c, self.weight.shape[1],
            "conv filters span {} channels but input has {}",
            self.weight.shape[1], c
        );
        let hh = self.weight.shape[2];
        let ww = self.weight.shape[3];
        let (h_out, w_out) = self.output_dims(h, w);

        let padded = self.pad_input(x);

        let mut out = vec![0.0; n * f * h_out * w_out];
        // One chunk per example: outputs are disjoint, inputs are shared
        out.par_chunks_mut(f * h_out * w_out)
            .enumerate()
            .for_each(|(ni, out_n)| {
                for fi in 0..f {
                    let w_f = &self.weight.data
                        [fi * self.weight.strides[0]..(fi + 1) * self.weight.strides[0]];
                    let b_f = self.bias.data[fi];
                    for oi in 0..h_out {
                        for oj in 0..w_out {
                            let mut sum = b_f;
                            for ci in 0..c {
                                for a in 0..hh {
                                    let row =
                                        padded.offset4(ni, ci, oi * self.stride + a, oj * self.stride);
                                    let w_row = ci * hh * ww + a * ww;
                                    for b in 0..ww {
                                        sum += padded.data[row + b] * w_f[w_row + b];
                                    }
                                }
                            }
                            out_n[(fi * h_out + oi) * w_out + oj] = sum;
                        }
                    }
                }
            });

        let cache = Conv2dCache { x: x.clone() };
        (Tensor::new(out, vec![n, f, h_out, w_out]), cache)
    }

    /// Backward pass
    ///
    /// # Arguments
    ///
    /// * `grad_out` - Upstream gradient [N, F, H', W']
    /// * `cache` - Cache from the matching forward call
    ///
    /// # Returns
    ///
    /// Gradients for the filter bank, the bias, and the input.
    pub fn backward(&self, grad_out: &Tensor, cache: &Conv2dCache) -> Conv2dGradients {
        let (n, c, h, w) = dims4(&cache.x);
        let (_, f, h_out, w_out) = dims4(grad_out);
        let hh = self.weight.shape[2];
        let ww = self.weight.shape[3];

        let padded = self.pad_input(&cache.x);

        // grad_b: sum over batch and spatial axes per filter
        let mut grad_bias = vec![0.0; f];
        for ni in 0..n {
            for fi in 0..f {
                for oi in 0..h_out {
                    for oj in 0..w_out {
                        grad_bias[fi] += grad_out.data[grad_out.offset4(ni, fi, oi, oj)];
                    }
                }
            }
        }

        // grad_w and grad_x: every window adds its outer-product contribution,
        // scaled by the upstream gradient at that output position
        let mut grad_weight = self.weight.zeros_like();
        let mut grad_padded = padded.zeros_like();
        for ni in 0..n {
            for fi in 0..f {
                for oi in 0..h_out {
                    for oj in 0..w_out {
                        let g = grad_out.data[grad_out.offset4(ni, fi, oi, oj)];
                        for ci in 0..c {
                            for a in 0..hh {
                                let p_row =
                                    padded.offset4(ni, ci, oi * self.stride + a, oj * self.stride);
                                let w_row = grad_weight.offset4(fi, ci, a, 0);
                                for b in 0..ww {
                                    grad_weight.data[w_row + b] += padded.data[p_row + b] * g;
                                    grad_padded.data[p_row + b] += self.weight.data[w_row + b] * g;
                                }
                            }
                        }
                    }
                }
            }
        }

        // Crop the padding halo off the input gradient
        let mut grad_x = Tensor::zeros(vec![n, c, h, w]);
        for ni in 0..n {
            for ci in 0..c {
                for hi in 0..h {
                    for wi in 0..w {
                        let idx = grad_x.offset4(ni, ci, hi, wi);
                        grad_x.data[idx] = grad_padded.data[grad_padded.offset4(
                            ni,
                            ci,
                            hi + self.pad,
                            wi + self.pad,
                        )];
                    }
                }
            }
        }

        Conv2dGradients {
            weight: grad_weight,
            bias: Tensor::new(grad_bias, vec![f]),
            x: grad_x,
        }
    }
}

/// Cache for convolution backward pass
pub struct Conv2dCache {
    pub x: Tensor,
}

/// Gradients for convolution layer
pub struct Conv2dGradients {
    pub weight: Tensor,
    pub bias: Tensor,
    pub x: Tensor,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_output_shape() {
        let mut rng = StdRng::seed_from_u64(20);
        let conv = Conv2d::new(3, 2, 3, 3, 2, 1, 1e-2, &mut rng);
        let x = Tensor::randn(vec![4, 2, 5, 5], 1.0, &mut rng);
        let (y, _) = conv.forward(&x);
        // H' = 1 + (5 + 2 - 3)/2 = 3
        assert_eq!(y.shape, vec![4, 3, 3, 3]);
    }

    #[test]
    #[should_panic(expected = "no integer output size")]
    fn test_rejects_fractional_output() {
        let mut rng = StdRng::seed_from_u64(21);
        let conv = Conv2d::new(1, 1, 3, 3, 2, 0, 1e-2, &mut rng);
        let x = Tensor::zeros(vec![1, 1, 6, 6]);
        conv.forward(&x);
    }

    #[test]
    fn test_known_single_window() {
        // One 2x2 filter over a 2x2 input: output is the full dot product
        let mut conv = Conv2d {
            weight: Tensor::new(vec![1.0, 2.0, 3.0, 4.0], vec![1, 1, 2, 2]),
            bias: Tensor::new(vec![0.5], vec![1]),
            stride: 1,
            pad: 0,
        };
        let x = Tensor::new(vec![1.0, 1.0, 1.0, 1.0], vec![1, 1, 2, 2]);
        let (y, _) = conv.forward(&x);
        assert_eq!(y.shape, vec![1, 1, 1, 1]);
        assert_eq!(y.data, vec![10.5]);

        conv.bias = Tensor::new(vec![0.0], vec![1]);
        let (y2, _) = conv.forward(&x);
        assert_eq!(y2.data, vec![10.0]);
    }

    #[test]
    fn test_padding_sees_zero_border() {
        // A 1x1 input padded by 1, filter 3x3 of ones: only the center
        // contributes
        let conv = Conv2d {
            weight: Tensor::ones(vec![1, 1, 3, 3]),
            bias: Tensor::zeros(vec![1]),
            stride: 1,
            pad: 1,
        };
        let x = Tensor::new(vec![7.0], vec![1, 1, 1, 1]);
        let (y, _) = conv.forward(&x);
        assert_eq!(y.shape, vec![1, 1, 1, 1]);
        assert_eq!(y.data, vec![7.0]);
    }

    #[test]
    fn test_backward_bias_sums_upstream() {
        let mut rng = StdRng::seed_from_u64(22);
        let conv = Conv2d::new(2, 1, 3, 3, 1, 1, 1e-2, &mut rng);
        let x = Tensor::randn(vec![2, 1, 4, 4], 1.0, &mut rng);
        let (y, cache) = conv.forward(&x);
        let grads = conv.backward(&Tensor::ones(y.shape.clone()), &cache);
        // Upstream all-ones: db[f] = N * H' * W'
        let expected = (2 * 4 * 4) as f64;
        assert!((grads.bias.data[0] - expected).abs() < 1e-12);
        assert!((grads.bias.data[1] - expected).abs() < 1e-12);
    }

    #[test]
    fn test_backward_shapes() {
        let mut rng = StdRng::seed_from_u64(23);
        let conv = Conv2d::new(3, 2, 3, 3, 2, 1, 1e-2, &mut rng);
        let x = Tensor::randn(vec![2, 2, 5, 5], 1.0, &mut rng);
        let (y, cache) = conv.forward(&x);
        let grads = conv.backward(&Tensor::ones(y.shape.clone()), &cache);
        assert_eq!(grads.x.shape, x.shape);
        assert_eq!(grads.weight.shape, conv.weight.shape);
        assert_eq!(grads.bias.shape, conv.bias.shape);
    }
}
