//! Inverted Dropout
//!
//! Dropout randomly zeroes activations during training to prevent
//! overfitting. This is the *inverted* variant: surviving activations are
//! scaled up by 1/p at training time, so inference is a plain identity and
//! needs no compensation.
//!
//! ## Forward Pass (training)
//!
//! ```text
//! mask[i] = 1/p  with probability p (the KEEP probability), else 0
//! out = x ⊙ mask
//! ```
//!
//! ## Backward Pass (training)
//!
//! ```text
//! grad_x = grad_out ⊙ mask
//! ```
//!
//! Test mode passes values and gradients through unchanged.
//!
//! ## Determinism
//!
//! An explicit seed makes every forward call draw its mask from a freshly
//! seeded generator, so identical calls produce identical masks. Gradient
//! checking needs this; normal training should leave the seed unset and use
//! the thread generator.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::ViolaError;
use crate::layers::Mode;
use crate::tensor::Tensor;

/// Inverted dropout layer
#[derive(Clone)]
pub struct Dropout {
    /// Probability of KEEPING an activation (not of dropping it)
    pub p: f64,
    pub mode: Mode,
    /// Optional seed for reproducible masks
    pub seed: Option<u64>,
}

impl Dropout {
    /// Create a new dropout layer
    ///
    /// # Arguments
    ///
    /// * `p` - Keep probability; p = 1.0 makes the layer an identity
    /// * `seed` - Optional seed for deterministic masks
    ///
    /// # Errors
    ///
    /// Returns [`ViolaError::InvalidConfiguration`] unless 0 < p <= 1.
    pub fn new(p: f64, seed: Option<u64>) -> Result<Self, ViolaError> {
        if !(p > 0.0 && p <= 1.0) {
            return Err(ViolaError::InvalidConfiguration(format!(
                "dropout keep probability must be in (0, 1], got {}",
                p
            )));
        }
        Ok(Self {
            p,
            mode: Mode::Train,
            seed,
        })
    }

    /// Switch between the training and inference paths
    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    /// Forward pass
    ///
    /// # Arguments
    ///
    /// * `x` - Input tensor of any shape
    ///
    /// # Returns
    ///
    /// Tuple of (output, cache); the cache stores the sampled mask in train
    /// mode and `None` in test mode.
    pub fn forward(&self, x: &Tensor) -> (Tensor, DropoutCache) {
        if self.mode == Mode::Test {
            return (x.clone(), DropoutCache { mask: None });
        }

        let mut rng: StdRng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };

        // Inverted dropout: the 1/p rescale is baked into the mask, so the
        // backward pass is a single element-wise product
        let scale = 1.0 / self.p;
        let mask_data: Vec<f64> = (0..x.data.len())
            .map(|_| if rng.random::<f64>() < self.p { scale } else { 0.0 })
            .collect();
        let mask = Tensor::new(mask_data, x.shape.clone());

        let out = x.mul(&mask);
        (out, DropoutCache { mask: Some(mask) })
    }

    /// Backward pass
    ///
    /// Applies the stored mask to the upstream gradient in train mode,
    /// passes it through unchanged in test mode.
    pub fn backward(&self, grad_out: &Tensor, cache: &DropoutCache) -> Tensor {
        match &cache.mask {
            Some(mask) => grad_out.mul(mask),
            None => grad_out.clone(),
        }
    }
}

/// Cache for dropout backward pass
pub struct DropoutCache {
    /// Sampled mask with the 1/p scale baked in; `None` when the forward
    /// call ran in test mode
    pub mask: Option<Tensor>,
}
