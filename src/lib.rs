//! Viola: Neural Network Layers From Scratch
//!
//! The forward and backward passes of a fully-connected and convolutional
//! neural network, implemented from first principles in Rust. Every layer's
//! backward pass is a hand-derived closed form tied to its forward pass and
//! cache — there is no autodiff graph or tape — and every derivation is
//! validated against centered-difference numerical gradients. Named after
//! the resourceful heroine of *Twelfth Night*.
//!
//! # Modules
//!
//! - [`tensor`] - Flat-storage f64 tensor with the operations layers need
//! - [`layers`] - Layer primitives: affine, ReLU, batch/layer/group norm,
//!   dropout, convolution, max pooling
//! - [`loss`] - SVM hinge and softmax cross-entropy losses
//! - [`net`] - Network containers composing the primitives end to end
//! - [`gradcheck`] - Finite-difference gradient checking utilities
//! - [`error`] - Configuration error taxonomy
//!
//! # Example
//!
//! ```rust
//! use viola::{softmax_loss, Tensor, TwoLayerNet};
//!
//! // A small classifier: 20 inputs, 30 hidden units, 5 classes
//! let net = TwoLayerNet::new(20, 30, 5, 1e-2, 0.0, Some(42));
//!
//! let x = Tensor::zeros(vec![4, 20]);
//! let y = vec![0, 1, 2, 3];
//!
//! // Inference: scores only
//! let scores = net.scores(&x);
//! assert_eq!(scores.shape, vec![4, 5]);
//!
//! // Training: loss plus a gradient for every parameter
//! let (loss, grads) = net.loss(&x, &y);
//! assert!(loss.is_finite());
//! assert_eq!(grads.first.weight.shape, net.first.weight.shape);
//! # let _ = softmax_loss(&scores, &y);
//! ```

pub mod error;
pub mod gradcheck;
pub mod layers;
pub mod loss;
pub mod net;
pub mod tensor;

// Re-export main types for convenience
pub use error::ViolaError;
pub use layers::{
    affine_relu_backward, affine_relu_forward, relu_backward, relu_forward, Affine, BatchNorm,
    Conv2d, Dropout, GroupNorm, LayerNorm, MaxPool2d, Mode,
};
pub use loss::{softmax_loss, svm_loss};
pub use net::{FullyConnectedConfig, FullyConnectedNet, Normalization, TwoLayerNet};
pub use tensor::Tensor;
