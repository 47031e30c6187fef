//! Neural Network Layers
//!
//! This module contains the differentiable layer primitives. Each layer
//! provides both a forward and a backward pass.
//!
//! ## Layers
//!
//! - **affine**: Fully connected layer (flattens trailing input dimensions)
//! - **relu**: ReLU activation function (forward and backward)
//! - **affine_relu**: Fused affine → ReLU convenience pair
//! - **batchnorm**: Batch normalization, including the spatial 4D variant
//! - **layernorm**: Layer normalization
//! - **groupnorm**: Spatial group normalization
//! - **dropout**: Inverted dropout regularization
//! - **conv**: Naive 2D convolution
//! - **pool**: Naive 2D max pooling
//!
//! ## Design Pattern
//!
//! Each parameterized layer follows a consistent pattern:
//!
//! ```rust,ignore
//! pub struct Layer {
//!     // Parameters (weights, biases, etc.)
//! }
//!
//! impl Layer {
//!     pub fn new(...) -> Self { }
//!     pub fn forward(&self, x: &Tensor) -> (Tensor, Cache) { }
//!     pub fn backward(&self, grad: &Tensor, cache: &Cache) -> Gradients { }
//! }
//!
//! pub struct Cache {
//!     // Values needed for backward pass
//! }
//!
//! pub struct Gradients {
//!     // Gradients for parameters and input
//! }
//! ```
//!
//! The cache type is specific to its layer kind, so the compiler rejects
//! feeding one layer's cache to another layer's backward. A cache is valid
//! for exactly one forward/backward pair; it is never shared across
//! minibatches or layers.

pub mod affine;
pub mod affine_relu;
pub mod batchnorm;
pub mod conv;
pub mod dropout;
pub mod groupnorm;
pub mod layernorm;
pub mod pool;
pub mod relu;

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ViolaError;
use crate::tensor::Tensor;

// Re-export main types for convenience
pub use affine::{Affine, AffineCache, AffineGradients};
pub use affine_relu::{affine_relu_backward, affine_relu_forward, AffineReluCache};
pub use batchnorm::{BatchNorm, BatchNormCache};
pub use conv::{Conv2d, Conv2dCache, Conv2dGradients};
pub use dropout::{Dropout, DropoutCache};
pub use groupnorm::{GroupNorm, GroupNormCache};
pub use layernorm::{LayerNorm, LayerNormCache};
pub use pool::{MaxPool2d, MaxPool2dCache};
pub use relu::{relu_backward, relu_forward};

/// Gradients for a normalization layer (scale, shift, input).
///
/// Shared by batch, layer, and group normalization: all three learn a
/// per-feature scale γ and shift β on top of their normalized activations.
pub struct NormGradients {
    pub gamma: Tensor,
    pub beta: Tensor,
    pub x: Tensor,
}

/// Whether a stateful layer runs its training or inference path.
///
/// Batch normalization and dropout behave differently between the two:
/// training computes batch statistics / samples a mask, inference uses
/// running statistics / the identity. All other layers ignore the mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Train,
    Test,
}

impl FromStr for Mode {
    type Err = ViolaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "train" => Ok(Mode::Train),
            "test" => Ok(Mode::Test),
            other => Err(ViolaError::InvalidMode(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parses_known_strings() {
        assert_eq!("train".parse::<Mode>().unwrap(), Mode::Train);
        assert_eq!("test".parse::<Mode>().unwrap(), Mode::Test);
    }

    #[test]
    fn test_mode_rejects_unknown_string() {
        let err = "eval".parse::<Mode>().unwrap_err();
        assert_eq!(err, ViolaError::InvalidMode("eval".to_string()));
    }
}
