//! Fused Affine → ReLU
//!
//! Every hidden stage of a fully-connected network performs an affine
//! transform followed by a ReLU. This module chains the two primitives into
//! one forward/backward pair so network code stays readable; there is no
//! mathematical difference from calling them separately.

use super::affine::{Affine, AffineCache, AffineGradients};
use super::relu::{relu_backward, relu_forward};
use crate::tensor::Tensor;

/// Cache for the fused pair: the affine cache plus the ReLU pre-activation.
pub struct AffineReluCache {
    pub affine: AffineCache,
    /// Affine output before the nonlinearity (the ReLU's own cache)
    pub pre_activation: Tensor,
}

/// Forward pass: x → affine → ReLU
///
/// # Returns
///
/// Tuple of (output, cache); the cache bundles both sub-caches so the
/// backward pass can retrace the chain.
pub fn affine_relu_forward(affine: &Affine, x: &Tensor) -> (Tensor, AffineReluCache) {
    let (a, affine_cache) = affine.forward(x);
    let out = relu_forward(&a);
    let cache = AffineReluCache {
        affine: affine_cache,
        pre_activation: a,
    };
    (out, cache)
}

/// Backward pass: grad → ReLU backward → affine backward
///
/// Returns the affine layer's gradients; `x` inside them is the gradient
/// flowing to the previous layer.
pub fn affine_relu_backward(
    affine: &Affine,
    grad_out: &Tensor,
    cache: &AffineReluCache,
) -> AffineGradients {
    let grad_pre = relu_backward(grad_out, &cache.pre_activation);
    affine.backward(&grad_pre, &cache.affine)
}
