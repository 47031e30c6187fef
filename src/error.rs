//! Error Types
//!
//! Configuration errors surfaced by this crate. These are the failures a
//! caller can trigger by handing a layer an unusable configuration; they are
//! raised once, at parse or construction time, and never retried.
//!
//! Shape violations are a different class entirely: operand dimensions that
//! break a layer's declared contract are programming errors on the caller's
//! side and panic immediately with a message naming both shapes, in the same
//! way an out-of-bounds index would.

use thiserror::Error;

/// Errors produced when validating layer and network configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ViolaError {
    /// A mode string outside {"train", "test"}.
    #[error("invalid mode \"{0}\", expected \"train\" or \"test\"")]
    InvalidMode(String),

    /// A normalization name outside {"batchnorm", "layernorm"}.
    #[error("invalid normalization \"{0}\", expected \"batchnorm\" or \"layernorm\"")]
    InvalidNormalization(String),

    /// A hyperparameter that fails its documented constraint.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}
