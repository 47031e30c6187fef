//! Numerical Gradient Checking
//!
//! Every backward pass in this crate is a hand-derived closed form, and a
//! hand derivation is only trustworthy once it has been checked against a
//! derivative the computer worked out by brute force. This module provides
//! that brute force: centered finite differences.
//!
//! ## Algorithm
//!
//! For a scalar-valued function f and each coordinate x_i:
//!
//! ```text
//! df/dx_i ≈ (f(x + h·e_i) - f(x - h·e_i)) / (2h)
//! ```
//!
//! The centered form has O(h²) truncation error, against O(h) for the
//! one-sided form, which is the difference between relative errors around
//! 1e-9 and around 1e-4 at the usual h = 1e-5.
//!
//! For a tensor-valued function the same perturbation is contracted with an
//! upstream gradient `dout`, giving the numerical version of whatever a
//! backward pass computes for its input:
//!
//! ```text
//! d(Σ f(x)·dout)/dx_i ≈ Σ (f(x + h·e_i) - f(x - h·e_i)) · dout / (2h)
//! ```
//!
//! ## Reading the Numbers
//!
//! Relative errors near 1e-8 or below mean the analytic gradient is right;
//! 1e-5 is acceptable for formulas that divide by batch statistics; anything
//! above 1e-2 means a wrong derivation, not roundoff.

use crate::tensor::Tensor;

/// Maximum relative error between two tensors
///
/// ```text
/// rel = max_i |a_i - b_i| / max(|a_i| + |b_i|, 1e-8)
/// ```
///
/// The floor on the denominator keeps positions where both gradients are
/// (near) zero from dominating the comparison.
///
/// # Panics
///
/// Panics if the shapes differ.
pub fn rel_error(a: &Tensor, b: &Tensor) -> f64 {
    assert_eq!(
        a.shape, b.shape,
        "rel_error shape mismatch: {:?} vs {:?}",
        a.shape, b.shape
    );
    a.data
        .iter()
        .zip(&b.data)
        .map(|(&x, &y)| (x - y).abs() / (x.abs() + y.abs()).max(1e-8))
        .fold(0.0, f64::max)
}

/// Numerical gradient of a scalar-valued function
///
/// Evaluates `f` twice per coordinate of `x` with a centered difference.
///
/// # Arguments
///
/// * `f` - Scalar function of the tensor (e.g. a full-network loss)
/// * `x` - Point to differentiate at
/// * `h` - Step size; 1e-5 suits f64 losses
pub fn eval_numerical_gradient<F>(mut f: F, x: &Tensor, h: f64) -> Tensor
where
    F: FnMut(&Tensor) -> f64,
{
    let mut grad = x.zeros_like();
    let mut probe = x.clone();

    for i in 0..x.data.len() {
        let orig = probe.data[i];

        probe.data[i] = orig + h;
        let pos = f(&probe);
        probe.data[i] = orig - h;
        let neg = f(&probe);
        probe.data[i] = orig;

        grad.data[i] = (pos - neg) / (2.0 * h);
    }

    grad
}

/// Numerical gradient of a tensor-valued function contracted with `dout`
///
/// This is the finite-difference analogue of a layer's backward pass: if
/// `f` is the layer's forward and `dout` the upstream gradient, the result
/// approximates the layer's input (or parameter) gradient.
///
/// # Arguments
///
/// * `f` - Tensor-valued function of the tensor (e.g. a layer forward)
/// * `x` - Point to differentiate at
/// * `dout` - Upstream gradient, same shape as `f(x)`
/// * `h` - Step size
pub fn eval_numerical_gradient_array<F>(mut f: F, x: &Tensor, dout: &Tensor, h: f64) -> Tensor
where
    F: FnMut(&Tensor) -> Tensor,
{
    let mut grad = x.zeros_like();
    let mut probe = x.clone();

    for i in 0..x.data.len() {
        let orig = probe.data[i];

        probe.data[i] = orig + h;
        let pos = f(&probe);
        probe.data[i] = orig - h;
        let neg = f(&probe);
        probe.data[i] = orig;

        assert_eq!(
            pos.shape, dout.shape,
            "function output {:?} does not match dout {:?}",
            pos.shape, dout.shape
        );
        grad.data[i] = pos
            .data
            .iter()
            .zip(&neg.data)
            .zip(&dout.data)
            .map(|((&p, &n), &d)| (p - n) * d)
            .sum::<f64>()
            / (2.0 * h);
    }

    grad
}
