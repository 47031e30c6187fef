//! Two-Layer Network
//!
//! The smallest end-to-end classifier: affine → ReLU → affine → softmax.
//! With an input dimension D, hidden dimension H, and C classes, the model
//! holds two weight matrices and two bias vectors.
//!
//! Useful as the reference composition: every behavior of the bigger
//! configurable network — caching per stage, mirrored backward order, L2
//! bookkeeping — exists here in its simplest form.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::layers::{
    affine_relu_backward, affine_relu_forward, Affine, AffineGradients,
};
use crate::loss::softmax_loss;
use crate::tensor::Tensor;

/// Fixed-architecture two-layer classifier
///
/// Parameters are public: an external optimizer reads gradients from
/// [`TwoLayerNet::loss`] and updates the tensors in place between steps. The
/// network itself never mutates them.
#[derive(Clone)]
pub struct TwoLayerNet {
    pub first: Affine,
    pub second: Affine,
    /// L2 regularization strength on the two weight matrices
    pub reg: f64,
}

impl TwoLayerNet {
    /// Create a new two-layer network
    ///
    /// Weights are drawn i.i.d. from a zero-mean Gaussian with std
    /// `weight_scale`; biases start at zero.
    ///
    /// # Arguments
    ///
    /// * `input_dim` - Flattened input size D
    /// * `hidden_dim` - Hidden layer width H
    /// * `num_classes` - Output size C
    /// * `weight_scale` - Std of the weight initialization
    /// * `reg` - L2 regularization strength
    /// * `seed` - Seeds the weight draw; `None` uses the thread generator
    pub fn new(
        input_dim: usize,
        hidden_dim: usize,
        num_classes: usize,
        weight_scale: f64,
        reg: f64,
        seed: Option<u64>,
    ) -> Self {
        let mut rng: StdRng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        Self {
            first: Affine::new(input_dim, hidden_dim, weight_scale, &mut rng),
            second: Affine::new(hidden_dim, num_classes, weight_scale, &mut rng),
            reg,
        }
    }

    /// Inference pass: raw classification scores, no loss, no gradients
    ///
    /// # Arguments
    ///
    /// * `x` - Minibatch [N, d_1, ..., d_k]; trailing dims flatten to D
    ///
    /// # Returns
    ///
    /// Scores [N, num_classes]
    pub fn scores(&self, x: &Tensor) -> Tensor {
        let (h, _) = affine_relu_forward(&self.first, x);
        let (scores, _) = self.second.forward(&h);
        scores
    }

    /// Training pass: softmax loss and gradients for every parameter
    ///
    /// Runs the forward pass retaining both stage caches, seeds the backward
    /// walk with the softmax score gradient, and adds the L2 term
    /// `0.5 · reg · ΣW²` to the loss and `reg · W` to each weight gradient.
    /// Biases are never regularized.
    ///
    /// # Arguments
    ///
    /// * `x` - Minibatch [N, d_1, ..., d_k]
    /// * `y` - True class index per example
    ///
    /// # Returns
    ///
    /// Tuple of (loss, gradients)
    pub fn loss(&self, x: &Tensor, y: &[usize]) -> (f64, TwoLayerGradients) {
        let (h, first_cache) = affine_relu_forward(&self.first, x);
        let (scores, second_cache) = self.second.forward(&h);

        let (data_loss, dscores) = softmax_loss(&scores, y);
        let reg_loss =
            0.5 * self.reg * (self.first.weight.sum_squares() + self.second.weight.sum_squares());
        let loss = data_loss + reg_loss;

        let mut second_grads = self.second.backward(&dscores, &second_cache);
        let mut first_grads = affine_relu_backward(&self.first, &second_grads.x, &first_cache);

        first_grads.weight = first_grads.weight.add(&self.first.weight.mul_scalar(self.reg));
        second_grads.weight = second_grads
            .weight
            .add(&self.second.weight.mul_scalar(self.reg));

        (
            loss,
            TwoLayerGradients {
                first: first_grads,
                second: second_grads,
            },
        )
    }
}

/// Gradients for every parameter of [`TwoLayerNet`]
///
/// `first.x` carries the gradient with respect to the minibatch itself.
pub struct TwoLayerGradients {
    pub first: AffineGradients,
    pub second: AffineGradients,
}
