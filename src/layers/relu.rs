//! ReLU Activation
//!
//! This module provides the rectified linear unit and its derivative for
//! backpropagation.
//!
//! ### Formula
//!
//! ```text
//! ReLU(x) = max(0, x)
//! ```
//!
//! ### Gradient
//!
//! ```text
//! dReLU/dx = 1 if x > 0, else 0
//! ```
//!
//! The boundary x == 0 counts as inactive: its gradient is zero. The
//! tie-break is fixed so that analytic and numerical gradients agree exactly
//! during gradient checking.

use crate::tensor::Tensor;
use rayon::prelude::*;

/// ReLU activation (forward pass)
///
/// Applies `max(0, x)` element-wise. Works on tensors of any shape.
///
/// The backward pass needs the original input, so callers keep `x` around as
/// the cache for [`relu_backward`].
pub fn relu_forward(x: &Tensor) -> Tensor {
    let result = x.data.par_iter().map(|&val| val.max(0.0)).collect();
    Tensor::new(result, x.shape.clone())
}

/// ReLU derivative (backward pass)
///
/// Passes the upstream gradient through where the input was strictly
/// positive and zeroes it elsewhere.
///
/// # Arguments
///
/// * `grad_out` - Gradient from the next layer, same shape as `x`
/// * `x` - Original input to [`relu_forward`]
pub fn relu_backward(grad_out: &Tensor, x: &Tensor) -> Tensor {
    assert_eq!(
        grad_out.shape, x.shape,
        "relu_backward shape mismatch: grad {:?} vs input {:?}",
        grad_out.shape, x.shape
    );
    let grad_data: Vec<f64> = x
        .data
        .par_iter()
        .zip(&grad_out.data)
        .map(|(&x_val, &grad_val)| if x_val > 0.0 { grad_val } else { 0.0 })
        .collect();
    Tensor::new(grad_data, x.shape.clone())
}
