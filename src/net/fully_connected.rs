//! Configurable Fully-Connected Network
//!
//! A classifier of arbitrary depth with optional normalization and dropout:
//!
//! ```text
//! (affine → [batch/layer norm] → ReLU → [dropout]) × (L-1) → affine → softmax
//! ```
//!
//! Depth and options are fixed at construction from a
//! [`FullyConnectedConfig`](crate::net::FullyConnectedConfig) and immutable
//! afterwards. Each hidden stage is a structured record owning its affine
//! parameters and, when configured, its normalization parameters — gradients
//! come back as a parallel record per stage, so there is no string-keyed
//! lookup anywhere.
//!
//! The forward pass inside [`FullyConnectedNet::loss`] retains one cache per
//! stage in construction order; the backward pass consumes them in reverse,
//! so stage i's cache meets stage i's backward and nothing else.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::ViolaError;
use crate::layers::{
    relu_backward, relu_forward, Affine, AffineCache, AffineGradients, BatchNorm, BatchNormCache,
    Dropout, DropoutCache, LayerNorm, LayerNormCache, NormGradients,
};
use crate::loss::softmax_loss;
use crate::net::{FullyConnectedConfig, Normalization};
use crate::tensor::Tensor;

/// A hidden stage's normalization layer, when configured.
#[derive(Clone)]
pub enum NormStage {
    Batch(BatchNorm),
    Layer(LayerNorm),
}

impl NormStage {
    fn forward_train(&mut self, x: &Tensor) -> (Tensor, NormStageCache) {
        match self {
            NormStage::Batch(bn) => {
                let (y, cache) = bn.forward_train(x);
                (y, NormStageCache::Batch(cache))
            }
            NormStage::Layer(ln) => {
                let (y, cache) = ln.forward(x);
                (y, NormStageCache::Layer(cache))
            }
        }
    }

    fn forward_test(&self, x: &Tensor) -> Tensor {
        match self {
            NormStage::Batch(bn) => bn.forward_test(x),
            NormStage::Layer(ln) => ln.forward(x).0,
        }
    }

    fn backward(&self, grad_out: &Tensor, cache: &NormStageCache) -> NormGradients {
        match (self, cache) {
            (NormStage::Batch(bn), NormStageCache::Batch(c)) => bn.backward(grad_out, c),
            (NormStage::Layer(ln), NormStageCache::Layer(c)) => ln.backward(grad_out, c),
            _ => panic!("normalization cache does not match the stage that produced it"),
        }
    }
}

/// Cache variant matching [`NormStage`]
pub enum NormStageCache {
    Batch(BatchNormCache),
    Layer(LayerNormCache),
}

/// One hidden stage: affine plus its optional normalization and dropout.
#[derive(Clone)]
pub struct HiddenStage {
    pub affine: Affine,
    pub norm: Option<NormStage>,
    pub dropout: Option<Dropout>,
}

/// Everything a hidden stage's backward pass needs, in forward order.
struct StageCache {
    affine: AffineCache,
    norm: Option<NormStageCache>,
    /// Input to the ReLU (the ReLU's own cache)
    relu_input: Tensor,
    dropout: Option<DropoutCache>,
}

/// Configurable-depth fully-connected classifier
#[derive(Clone)]
pub struct FullyConnectedNet {
    pub hidden: Vec<HiddenStage>,
    pub last: Affine,
    /// L2 regularization strength on every weight matrix
    pub reg: f64,
}

impl FullyConnectedNet {
    /// Build a network from its configuration
    ///
    /// Weights are drawn i.i.d. from a zero-mean Gaussian with std
    /// `weight_scale`; biases and shifts (β) start at zero, scales (γ) at
    /// one.
    ///
    /// # Errors
    ///
    /// Returns [`ViolaError::InvalidConfiguration`] when the dropout keep
    /// probability is outside (0, 1].
    pub fn new(config: &FullyConnectedConfig) -> Result<Self, ViolaError> {
        let mut rng: StdRng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };

        let mut dims = Vec::with_capacity(config.hidden_dims.len() + 2);
        dims.push(config.input_dim);
        dims.extend_from_slice(&config.hidden_dims);
        dims.push(config.num_classes);

        let mut hidden = Vec::with_capacity(config.hidden_dims.len());
        for i in 0..config.hidden_dims.len() {
            let width = dims[i + 1];
            let norm = config.normalization.map(|kind| match kind {
                Normalization::BatchNorm => NormStage::Batch(BatchNorm::new(width)),
                Normalization::LayerNorm => NormStage::Layer(LayerNorm::new(width)),
            });
            let dropout = match config.keep_prob {
                Some(p) => Some(Dropout::new(p, config.seed)?),
                None => None,
            };
            hidden.push(HiddenStage {
                affine: Affine::new(dims[i], width, config.weight_scale, &mut rng),
                norm,
                dropout,
            });
        }

        let last_in = dims[dims.len() - 2];
        Ok(Self {
            hidden,
            last: Affine::new(last_in, config.num_classes, config.weight_scale, &mut rng),
            reg: config.reg,
        })
    }

    /// Number of affine layers, hidden and final
    pub fn num_layers(&self) -> usize {
        self.hidden.len() + 1
    }

    /// Inference pass: raw classification scores, no loss, no gradients
    ///
    /// Runs every stateful layer on its test path — batch norm normalizes
    /// with running statistics, dropout is the identity — and retains no
    /// caches.
    ///
    /// # Arguments
    ///
    /// * `x` - Minibatch [N, d_1, ..., d_k]
    ///
    /// # Returns
    ///
    /// Scores [N, num_classes]
    pub fn scores(&self, x: &Tensor) -> Tensor {
        let mut h = x.clone();
        for stage in &self.hidden {
            let (a, _) = stage.affine.forward(&h);
            let normed = match &stage.norm {
                Some(norm) => norm.forward_test(&a),
                None => a,
            };
            h = relu_forward(&normed);
            // Inverted dropout: inference needs no mask and no rescale
        }
        let (scores, _) = self.last.forward(&h);
        scores
    }

    /// Training pass: softmax loss and gradients for every parameter
    ///
    /// Runs the training-mode forward pass (batch statistics, fresh dropout
    /// masks, running-stat updates) retaining one cache per stage, then
    /// walks the stages in reverse. The L2 term `0.5 · reg · ΣW²` covers
    /// every weight matrix; `reg · W` lands on each weight gradient. Biases
    /// and normalization scale/shift parameters are never regularized.
    ///
    /// # Arguments
    ///
    /// * `x` - Minibatch [N, d_1, ..., d_k]
    /// * `y` - True class index per example
    ///
    /// # Returns
    ///
    /// Tuple of (loss, gradients), one gradient record per hidden stage plus
    /// the final affine.
    pub fn loss(&mut self, x: &Tensor, y: &[usize]) -> (f64, FullyConnectedGradients) {
        // Forward, keeping each stage's cache in construction order
        let mut caches: Vec<StageCache> = Vec::with_capacity(self.hidden.len());
        let mut h = x.clone();
        for stage in &mut self.hidden {
            let (mut cur, affine_cache) = stage.affine.forward(&h);

            let norm_cache = match &mut stage.norm {
                Some(norm) => {
                    let (normed, cache) = norm.forward_train(&cur);
                    cur = normed;
                    Some(cache)
                }
                None => None,
            };

            let relu_input = cur;
            let mut cur = relu_forward(&relu_input);

            let dropout_cache = match &stage.dropout {
                Some(dropout) => {
                    let (dropped, cache) = dropout.forward(&cur);
                    cur = dropped;
                    Some(cache)
                }
                None => None,
            };

            caches.push(StageCache {
                affine: affine_cache,
                norm: norm_cache,
                relu_input,
                dropout: dropout_cache,
            });
            h = cur;
        }
        let (scores, last_cache) = self.last.forward(&h);

        // Data loss plus the L2 term over every weight matrix
        let (data_loss, dscores) = softmax_loss(&scores, y);
        let mut reg_loss = 0.5 * self.reg * self.last.weight.sum_squares();
        for stage in &self.hidden {
            reg_loss += 0.5 * self.reg * stage.affine.weight.sum_squares();
        }
        let loss = data_loss + reg_loss;

        // Backward through the final affine
        let mut last_grads = self.last.backward(&dscores, &last_cache);
        last_grads.weight = last_grads.weight.add(&self.last.weight.mul_scalar(self.reg));
        let mut dx = last_grads.x.clone();

        // Backward through the hidden stages in reverse order, mirroring the
        // cache order exactly
        let mut hidden_grads: Vec<StageGradients> = Vec::with_capacity(self.hidden.len());
        for (stage, cache) in self.hidden.iter().zip(caches.iter()).rev() {
            if let (Some(dropout), Some(dropout_cache)) = (&stage.dropout, &cache.dropout) {
                dx = dropout.backward(&dx, dropout_cache);
            }

            dx = relu_backward(&dx, &cache.relu_input);

            let mut gamma = None;
            let mut beta = None;
            if let (Some(norm), Some(norm_cache)) = (&stage.norm, &cache.norm) {
                let norm_grads = norm.backward(&dx, norm_cache);
                gamma = Some(norm_grads.gamma);
                beta = Some(norm_grads.beta);
                dx = norm_grads.x;
            }

            let mut affine_grads = stage.affine.backward(&dx, &cache.affine);
            affine_grads.weight = affine_grads
                .weight
                .add(&stage.affine.weight.mul_scalar(self.reg));
            dx = affine_grads.x;

            hidden_grads.push(StageGradients {
                weight: affine_grads.weight,
                bias: affine_grads.bias,
                gamma,
                beta,
            });
        }
        hidden_grads.reverse(); // Put back in forward order

        (
            loss,
            FullyConnectedGradients {
                hidden: hidden_grads,
                last: last_grads,
            },
        )
    }
}

/// Gradients for one hidden stage
///
/// `gamma`/`beta` are present exactly when the stage has a normalization
/// layer.
pub struct StageGradients {
    pub weight: Tensor,
    pub bias: Tensor,
    pub gamma: Option<Tensor>,
    pub beta: Option<Tensor>,
}

/// Gradients for every parameter of [`FullyConnectedNet`]
pub struct FullyConnectedGradients {
    pub hidden: Vec<StageGradients>,
    pub last: AffineGradients,
}
