//! Affine Layer (Fully Connected)
//!
//! The affine layer is the fundamental building block of fully-connected
//! networks. It performs an affine transformation: y = x @ W + b
//!
//! ## Forward Pass
//!
//! ```text
//! Input:  x [N, d_1, ..., d_k]   (trailing dims flattened to D = d_1*...*d_k)
//! Weight: W [D, M]
//! Bias:   b [M]
//! Output: y = x_flat @ W + b   [N, M]
//! ```
//!
//! A minibatch example may be any shape — an image of shape `[C, H, W]`, a
//! plain feature vector — and is flattened row-wise before the product.
//!
//! ## Backward Pass
//!
//! Using the chain rule:
//! ```text
//! grad_W = x_flat^T @ grad_y
//! grad_b = sum(grad_y, axis=0)
//! grad_x = (grad_y @ W^T) reshaped back to x's original shape
//! ```
//!
//! ## Why These Gradients?
//!
//! - **grad_W**: Each weight W[i,j] affects output y[*,j] through input x[*,i]
//! - **grad_b**: Each bias b[j] affects all outputs y[*,j] equally
//! - **grad_x**: Needed to backprop to previous layer

use crate::tensor::Tensor;

/// Affine layer (fully connected)
///
/// Performs y = x_flat @ W + b where:
/// - W: weight matrix [in_features, out_features]
/// - b: bias vector [out_features]
#[derive(Clone)]
pub struct Affine {
    pub weight: Tensor,
    pub bias: Tensor,
}

impl Affine {
    /// Create a new affine layer
    ///
    /// # Arguments
    ///
    /// * `in_features` - Input dimension after flattening
    /// * `out_features` - Output dimension
    /// * `weight_scale` - Standard deviation of the zero-mean Gaussian the
    ///   weights are drawn from
    /// * `rng` - Generator for the weight draw; bias starts at zero
    pub fn new<R: rand::Rng>(
        in_features: usize,
        out_features: usize,
        weight_scale: f64,
        rng: &mut R,
    ) -> Self {
        Self {
            weight: Tensor::randn(vec![in_features, out_features], weight_scale, rng),
            bias: Tensor::zeros(vec![out_features]),
        }
    }

    /// Forward pass
    ///
    /// Flattens each example, computes y = x_flat @ W + b, and caches x for
    /// the backward pass.
    ///
    /// # Arguments
    ///
    /// * `x` - Input tensor [N, d_1, ..., d_k]
    ///
    /// # Returns
    ///
    /// Tuple of (output, cache) where:
    /// - output: [N, out_features]
    /// - cache: stores x (with its original shape) for the backward pass
    pub fn forward(&self, x: &Tensor) -> (Tensor, AffineCache) {
        let n = x.shape[0];
        let d: usize = x.shape[1..].iter().product();
        assert_eq!(
            d, self.weight.shape[0],
            "affine forward: input flattens to {} features but weight expects {}",
            d, self.weight.shape[0]
        );

        let x_flat = x.reshape(&[n, d]);
        let y = x_flat.matmul(&self.weight).add(&self.bias);
        let cache = AffineCache { x: x.clone() };
        (y, cache)
    }

    /// Backward pass
    ///
    /// Computes gradients for weights, bias, and input.
    ///
    /// # Arguments
    ///
    /// * `grad_out` - Gradient from next layer [N, out_features]
    /// * `cache` - Cached values from forward pass
    ///
    /// # Returns
    ///
    /// Gradients for weight, bias, and input; `x` is reshaped to match the
    /// original input shape exactly.
    pub fn backward(&self, grad_out: &Tensor, cache: &AffineCache) -> AffineGradients {
        let n = cache.x.shape[0];
        let d: usize = cache.x.shape[1..].iter().product();
        let x_flat = cache.x.reshape(&[n, d]);

        // grad_W = x_flat^T @ grad_out
        let grad_weight = x_flat.transpose().matmul(grad_out);

        // grad_b = column sums of grad_out
        let grad_bias = grad_out.sum_axis0();

        // grad_x = grad_out @ W^T, restored to the caller's input shape
        let grad_x = grad_out
            .matmul(&self.weight.transpose())
            .reshape(&cache.x.shape);

        AffineGradients {
            weight: grad_weight,
            bias: grad_bias,
            x: grad_x,
        }
    }
}

/// Cache for affine layer backward pass
pub struct AffineCache {
    pub x: Tensor,
}

/// Gradients for affine layer
pub struct AffineGradients {
    pub weight: Tensor,
    pub bias: Tensor,
    pub x: Tensor, // Gradient to pass to previous layer
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_forward_flattens_trailing_dims() {
        // Two examples of shape [2, 3] flatten to 6 features each
        let mut rng = StdRng::seed_from_u64(0);
        let layer = Affine::new(6, 4, 1e-2, &mut rng);
        let x = Tensor::ones(vec![2, 2, 3]);
        let (y, cache) = layer.forward(&x);
        assert_eq!(y.shape, vec![2, 4]);
        assert_eq!(cache.x.shape, vec![2, 2, 3]);
    }

    #[test]
    fn test_forward_known_values() {
        let mut layer = Affine {
            weight: Tensor::new(vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0], vec![3, 2]),
            bias: Tensor::new(vec![0.5, -0.5], vec![2]),
        };
        let x = Tensor::new(vec![1.0, 2.0, 3.0], vec![1, 3]);
        let (y, _) = layer.forward(&x);
        // [1*1 + 2*0 + 3*1 + 0.5, 1*0 + 2*1 + 3*1 - 0.5]
        assert_eq!(y.data, vec![4.5, 4.5]);

        // Shifting the bias shifts the output directly
        layer.bias = Tensor::new(vec![0.0, 0.0], vec![2]);
        let (y2, _) = layer.forward(&x);
        assert_eq!(y2.data, vec![4.0, 5.0]);
    }

    #[test]
    fn test_backward_restores_input_shape() {
        let mut rng = StdRng::seed_from_u64(1);
        let layer = Affine::new(12, 5, 1e-2, &mut rng);
        let x = Tensor::randn(vec![3, 2, 2, 3], 1.0, &mut rng);
        let (y, cache) = layer.forward(&x);
        let grads = layer.backward(&y.zeros_like().add_scalar(1.0), &cache);
        assert_eq!(grads.x.shape, x.shape);
        assert_eq!(grads.weight.shape, layer.weight.shape);
        assert_eq!(grads.bias.shape, layer.bias.shape);
    }

    #[test]
    fn test_backward_bias_is_column_sum() {
        let mut rng = StdRng::seed_from_u64(2);
        let layer = Affine::new(3, 2, 1e-2, &mut rng);
        let x = Tensor::randn(vec![4, 3], 1.0, &mut rng);
        let (_, cache) = layer.forward(&x);
        let grad_out = Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0], vec![4, 2]);
        let grads = layer.backward(&grad_out, &cache);
        assert_eq!(grads.bias.data, vec![16.0, 20.0]);
    }
}
