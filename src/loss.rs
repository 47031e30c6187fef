//! Classification Losses
//!
//! Both losses map a matrix of raw class scores and a slice of integer
//! labels to a scalar loss and the gradient of that loss with respect to the
//! scores. They are the roots of every backward pass in this crate: the
//! score gradient they return seeds the reverse walk through the layers.
//!
//! ## Multiclass SVM (hinge) loss
//!
//! Per example, every wrong class pays the margin by which it comes within
//! 1.0 of the true class score:
//!
//! ```text
//! margin_j = max(0, s_j - s_y + 1)    for j ≠ y, zero at j = y
//! loss = (1/N) Σ margins
//! ```
//!
//! ## Softmax cross-entropy loss
//!
//! ```text
//! loss = -(1/N) Σ log softmax(s)_y
//! grad = (softmax(s) - onehot(y)) / N
//! ```
//!
//! The log-softmax subtracts each row's maximum before exponentiating;
//! shifting changes nothing mathematically and keeps exp() in range.

use crate::tensor::Tensor;

fn check_scores(scores: &Tensor, labels: &[usize]) -> (usize, usize) {
    assert_eq!(
        scores.shape.len(),
        2,
        "loss expects 2D scores, got {:?}",
        scores.shape
    );
    let (n, c) = (scores.shape[0], scores.shape[1]);
    assert_eq!(
        labels.len(),
        n,
        "loss got {} scores rows but {} labels",
        n,
        labels.len()
    );
    for &y in labels {
        assert!(y < c, "label {} out of range for {} classes", y, c);
    }
    (n, c)
}

/// Multiclass SVM loss and its score gradient
///
/// # Arguments
///
/// * `scores` - Raw class scores [N, C]
/// * `labels` - True class index per example, each in 0..C
///
/// # Returns
///
/// Tuple of (mean hinge loss, gradient with respect to scores [N, C]).
/// Strictly positive margins count as active: an active column gets +1, the
/// label column gets -1 per active margin, everything divided by N.
pub fn svm_loss(scores: &Tensor, labels: &[usize]) -> (f64, Tensor) {
    let (n, c) = check_scores(scores, labels);
    let n_f = n as f64;

    let mut loss = 0.0;
    let mut grad = Tensor::zeros(vec![n, c]);

    for (i, &y) in labels.iter().enumerate() {
        let row = &scores.data[i * c..(i + 1) * c];
        let correct = row[y];

        let mut active = 0;
        for j in 0..c {
            if j == y {
                continue;
            }
            let margin = row[j] - correct + 1.0;
            if margin > 0.0 {
                loss += margin;
                grad.data[i * c + j] = 1.0;
                active += 1;
            }
        }
        grad.data[i * c + y] = -(active as f64);
    }

    loss /= n_f;
    for g in grad.data.iter_mut() {
        *g /= n_f;
    }

    (loss, grad)
}

/// Softmax cross-entropy loss and its score gradient
///
/// # Arguments
///
/// * `scores` - Raw class scores (logits) [N, C]
/// * `labels` - True class index per example, each in 0..C
///
/// # Returns
///
/// Tuple of (mean negative log-likelihood, gradient with respect to scores
/// [N, C]), where the gradient is `(probs - onehot) / N`.
pub fn softmax_loss(scores: &Tensor, labels: &[usize]) -> (f64, Tensor) {
    let (n, c) = check_scores(scores, labels);
    let n_f = n as f64;

    let mut loss = 0.0;
    let mut grad = Tensor::zeros(vec![n, c]);

    for (i, &y) in labels.iter().enumerate() {
        let row = &scores.data[i * c..(i + 1) * c];

        // Shift by the row max for numerical stability
        let max = row.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
        let exp_sum: f64 = row.iter().map(|&s| (s - max).exp()).sum();
        let log_sum = exp_sum.ln();

        loss -= row[y] - max - log_sum;

        for j in 0..c {
            let prob = (row[j] - max).exp() / exp_sum;
            grad.data[i * c + j] = (prob - if j == y { 1.0 } else { 0.0 }) / n_f;
        }
    }

    (loss / n_f, grad)
}
