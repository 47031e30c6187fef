//! 2D Max Pooling (naive reference implementation)
//!
//! Downsamples each channel of a 4D `[N, C, H, W]` tensor by taking the
//! maximum over non-padded windows.
//!
//! ## Forward Pass
//!
//! ```text
//! out[n, c, i, j] = max over the (pool_height × pool_width) window
//!                   starting at (i*stride, j*stride)
//!
//! H' = 1 + (H - pool_height) / stride
//! W' = 1 + (W - pool_width) / stride
//! ```
//!
//! ## Backward Pass
//!
//! The upstream gradient at an output position is routed to every input
//! position in its window that attains the window maximum. Ties are
//! additive, not winner-take-one: each tied maximum receives the FULL
//! upstream gradient, accumulated with +=. Total gradient mass leaving a
//! window therefore equals the upstream value times the number of tied
//! maxima.

use crate::layers::batchnorm::dims4;
use crate::tensor::Tensor;

/// Max pooling layer
///
/// Holds only the window configuration; there are no learnable parameters
/// and no state.
#[derive(Clone)]
pub struct MaxPool2d {
    pub pool_height: usize,
    pub pool_width: usize,
    pub stride: usize,
}

impl MaxPool2d {
    /// Create a new max pooling layer
    pub fn new(pool_height: usize, pool_width: usize, stride: usize) -> Self {
        Self {
            pool_height,
            pool_width,
            stride,
        }
    }

    /// Output spatial dimensions for an input of `h` × `w`
    ///
    /// # Panics
    ///
    /// Panics when the stride does not yield integer output sizes.
    fn output_dims(&self, h: usize, w: usize) -> (usize, usize) {
        assert_eq!(
            (h - self.pool_height) % self.stride,
            0,
            "pool height {} with window {} and stride {} has no integer output size",
            h,
            self.pool_height,
            self.stride
        );
        assert_eq!(
            (w - self.pool_width) % self.stride,
            0,
            "pool width {} with window {} and stride {} has no integer output size",
            w,
            self.pool_width,
            self.stride
        );
        (
            1 + (h - self.pool_height) / self.stride,
            1 + (w - self.pool_width) / self.stride,
        )
    }

    /// Forward pass
    ///
    /// # Arguments
    ///
    /// * `x` - Input tensor [N, C, H, W]
    ///
    /// # Returns
    ///
    /// Tuple of (output [N, C, H', W'], cache)
    pub fn forward(&self, x: &Tensor) -> (Tensor, MaxPool2dCache) {
        let (n, c, h, w) = dims4(x);
        let (h_out, w_out) = self.output_dims(h, w);

        let mut out = Tensor::zeros(vec![n, c, h_out, w_out]);
        for ni in 0..n {
            for ci in 0..c {
                for oi in 0..h_out {
                    for oj in 0..w_out {
                        let mut max = f64::NEG_INFINITY;
                        for a in 0..self.pool_height {
                            for b in 0..self.pool_width {
                                let v = x.data[x.offset4(
                                    ni,
                                    ci,
                                    oi * self.stride + a,
                                    oj * self.stride + b,
                                )];
                                if v > max {
                                    max = v;
                                }
                            }
                        }
                        let idx = out.offset4(ni, ci, oi, oj);
                        out.data[idx] = max;
                    }
                }
            }
        }

        let cache = MaxPool2dCache { x: x.clone() };
        (out, cache)
    }

    /// Backward pass
    ///
    /// Routes each upstream gradient value to the maximal position(s) of its
    /// window; see the module docs for the tie rule.
    ///
    /// # Arguments
    ///
    /// * `grad_out` - Upstream gradient [N, C, H', W']
    /// * `cache` - Cache from the matching forward call
    pub fn backward(&self, grad_out: &Tensor, cache: &MaxPool2dCache) -> Tensor {
        let (n, c, h, w) = dims4(&cache.x);
        let (h_out, w_out) = self.output_dims(h, w);

        let mut grad_x = Tensor::zeros(vec![n, c, h, w]);
        for ni in 0..n {
            for ci in 0..c {
                for oi in 0..h_out {
                    for oj in 0..w_out {
                        // Recompute the window max, then credit every
                        // position that attains it
                        let mut max = f64::NEG_INFINITY;
                        for a in 0..self.pool_height {
                            for b in 0..self.pool_width {
                                let v = cache.x.data[cache.x.offset4(
                                    ni,
                                    ci,
                                    oi * self.stride + a,
                                    oj * self.stride + b,
                                )];
                                if v > max {
                                    max = v;
                                }
                            }
                        }

                        let g = grad_out.data[grad_out.offset4(ni, ci, oi, oj)];
                        for a in 0..self.pool_height {
                            for b in 0..self.pool_width {
                                let idx = grad_x.offset4(
                                    ni,
                                    ci,
                                    oi * self.stride + a,
                                    oj * self.stride + b,
                                );
                                if cache.x.data[idx] == max {
                                    grad_x.data[idx] += g;
                                }
                            }
                        }
                    }
                }
            }
        }

        grad_x
    }
}

/// Cache for max pooling backward pass
pub struct MaxPool2dCache {
    pub x: Tensor,
}
