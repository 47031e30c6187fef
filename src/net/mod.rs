//! Network Containers
//!
//! The layer primitives compose into end-to-end classifiers here. A
//! container owns its parameters as structured per-layer records, runs the
//! forward pass while retaining each stage's cache, feeds the final scores
//! into a loss function, and walks the stages in reverse to produce a
//! typed gradient record per parameter record.
//!
//! Containers never update their own parameters: an external optimizer reads
//! the returned gradients and writes the (public) parameter tensors between
//! steps.
//!
//! ## Containers
//!
//! - [`TwoLayerNet`] — fixed affine → ReLU → affine → softmax
//! - [`FullyConnectedNet`] — `(affine → [norm] → relu → [dropout]) × (L-1)
//!   → affine`, depth and options fixed at construction

pub mod fully_connected;
pub mod two_layer;

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ViolaError;

pub use fully_connected::{
    FullyConnectedGradients, FullyConnectedNet, HiddenStage, NormStage, NormStageCache,
    StageGradients,
};
pub use two_layer::{TwoLayerGradients, TwoLayerNet};

/// Which normalization the hidden stages of a network apply, if any.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Normalization {
    BatchNorm,
    LayerNorm,
}

impl FromStr for Normalization {
    type Err = ViolaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "batchnorm" => Ok(Normalization::BatchNorm),
            "layernorm" => Ok(Normalization::LayerNorm),
            other => Err(ViolaError::InvalidNormalization(other.to_string())),
        }
    }
}

/// Configuration for [`FullyConnectedNet`]
///
/// # Fields
///
/// - `hidden_dims`: width of each hidden stage; the length fixes the depth
/// - `input_dim`: flattened input size (default 3·32·32)
/// - `num_classes`: classification output size (default 10)
/// - `keep_prob`: dropout keep probability; `None` disables dropout
/// - `normalization`: normalization applied after each hidden affine, if any
/// - `reg`: L2 regularization strength on the weight matrices
/// - `weight_scale`: std of the zero-mean Gaussian weight initialization
/// - `seed`: seeds both the weight draw and the dropout masks; `None` uses
///   the thread generator (set it when gradient checking)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FullyConnectedConfig {
    pub hidden_dims: Vec<usize>,
    pub input_dim: usize,
    pub num_classes: usize,
    pub keep_prob: Option<f64>,
    pub normalization: Option<Normalization>,
    pub reg: f64,
    pub weight_scale: f64,
    pub seed: Option<u64>,
}

impl Default for FullyConnectedConfig {
    fn default() -> Self {
        Self {
            hidden_dims: vec![100],
            input_dim: 3 * 32 * 32,
            num_classes: 10,
            keep_prob: None,
            normalization: None,
            reg: 0.0,
            weight_scale: 1e-2,
            seed: None,
        }
    }
}
