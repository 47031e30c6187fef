// Numerical gradient checks for every layer primitive and loss function.
// Each analytic backward pass is compared against centered finite
// differences of its own forward pass, contracted with a random upstream
// gradient. In f64 with h = 1e-5 a correct derivation lands around 1e-9
// relative error; the thresholds below leave headroom for layers whose
// forward divides by batch statistics.

use rand::{rngs::StdRng, SeedableRng};
use viola::gradcheck::{eval_numerical_gradient, eval_numerical_gradient_array, rel_error};
use viola::layers::{
    affine_relu_backward, affine_relu_forward, relu_backward, relu_forward, Affine, BatchNorm,
    Conv2d, Dropout, GroupNorm, LayerNorm, MaxPool2d,
};
use viola::loss::{softmax_loss, svm_loss};
use viola::Tensor;

const H: f64 = 1e-5;

#[test]
fn affine_gradients_match_numerical() {
    let mut rng = StdRng::seed_from_u64(100);
    let layer = Affine::new(6, 4, 5e-1, &mut rng);
    // Input with trailing dims [2, 3] to exercise the flattening path
    let x = Tensor::randn(vec![3, 2, 3], 1.0, &mut rng);
    let dout = Tensor::randn(vec![3, 4], 1.0, &mut rng);

    let (_, cache) = layer.forward(&x);
    let grads = layer.backward(&dout, &cache);

    let num_dx = eval_numerical_gradient_array(|t| layer.forward(t).0, &x, &dout, H);
    assert!(rel_error(&grads.x, &num_dx) < 1e-7);
    assert_eq!(grads.x.shape, x.shape);

    let num_dw = eval_numerical_gradient_array(
        |w| {
            let mut l = layer.clone();
            l.weight = w.clone();
            l.forward(&x).0
        },
        &layer.weight,
        &dout,
        H,
    );
    assert!(rel_error(&grads.weight, &num_dw) < 1e-7);

    let num_db = eval_numerical_gradient_array(
        |b| {
            let mut l = layer.clone();
            l.bias = b.clone();
            l.forward(&x).0
        },
        &layer.bias,
        &dout,
        H,
    );
    assert!(rel_error(&grads.bias, &num_db) < 1e-7);
}

#[test]
fn relu_gradient_matches_numerical() {
    let mut rng = StdRng::seed_from_u64(101);
    let x = Tensor::randn(vec![4, 5], 1.0, &mut rng);
    let dout = Tensor::randn(vec![4, 5], 1.0, &mut rng);

    let dx = relu_backward(&dout, &x);
    let num_dx = eval_numerical_gradient_array(relu_forward, &x, &dout, H);
    assert!(rel_error(&dx, &num_dx) < 1e-9);
}

#[test]
fn affine_relu_gradients_match_numerical() {
    let mut rng = StdRng::seed_from_u64(102);
    let layer = Affine::new(8, 5, 5e-1, &mut rng);
    let x = Tensor::randn(vec![4, 8], 1.0, &mut rng);
    let dout = Tensor::randn(vec![4, 5], 1.0, &mut rng);

    let (_, cache) = affine_relu_forward(&layer, &x);
    let grads = affine_relu_backward(&layer, &dout, &cache);

    let num_dx = eval_numerical_gradient_array(|t| affine_relu_forward(&layer, t).0, &x, &dout, H);
    assert!(rel_error(&grads.x, &num_dx) < 1e-7);

    let num_dw = eval_numerical_gradient_array(
        |w| {
            let mut l = layer.clone();
            l.weight = w.clone();
            affine_relu_forward(&l, &x).0
        },
        &layer.weight,
        &dout,
        H,
    );
    assert!(rel_error(&grads.weight, &num_dw) < 1e-7);
}

#[test]
fn batchnorm_gradients_match_numerical() {
    let mut rng = StdRng::seed_from_u64(103);
    let mut bn = BatchNorm::new(5);
    bn.gamma = Tensor::randn(vec![5], 1.0, &mut rng);
    bn.beta = Tensor::randn(vec![5], 1.0, &mut rng);
    let x = Tensor::randn(vec![8, 5], 2.0, &mut rng);
    let dout = Tensor::randn(vec![8, 5], 1.0, &mut rng);

    let (_, cache) = bn.clone().forward_train(&x);
    let grads = bn.backward(&dout, &cache);

    let num_dx = eval_numerical_gradient_array(
        |t| {
            let mut b = bn.clone();
            b.forward_train(t).0
        },
        &x,
        &dout,
        H,
    );
    assert!(rel_error(&grads.x, &num_dx) < 1e-6);

    let num_dgamma = eval_numerical_gradient_array(
        |g| {
            let mut b = bn.clone();
            b.gamma = g.clone();
            b.forward_train(&x).0
        },
        &bn.gamma,
        &dout,
        H,
    );
    assert!(rel_error(&grads.gamma, &num_dgamma) < 1e-7);

    let num_dbeta = eval_numerical_gradient_array(
        |be| {
            let mut b = bn.clone();
            b.beta = be.clone();
            b.forward_train(&x).0
        },
        &bn.beta,
        &dout,
        H,
    );
    assert!(rel_error(&grads.beta, &num_dbeta) < 1e-7);
}

#[test]
fn batchnorm_stepwise_matches_numerical() {
    let mut rng = StdRng::seed_from_u64(104);
    let bn = BatchNorm::new(4);
    let x = Tensor::randn(vec![6, 4], 1.5, &mut rng);
    let dout = Tensor::randn(vec![6, 4], 1.0, &mut rng);

    let (_, cache) = bn.clone().forward_train(&x);
    let grads = bn.backward_stepwise(&dout, &cache);

    let num_dx = eval_numerical_gradient_array(
        |t| {
            let mut b = bn.clone();
            b.forward_train(t).0
        },
        &x,
        &dout,
        H,
    );
    assert!(rel_error(&grads.x, &num_dx) < 1e-6);
}

#[test]
fn spatial_batchnorm_gradients_match_numerical() {
    let mut rng = StdRng::seed_from_u64(105);
    let mut bn = BatchNorm::new(3);
    bn.gamma = Tensor::randn(vec![3], 1.0, &mut rng);
    bn.beta = Tensor::randn(vec![3], 1.0, &mut rng);
    let x = Tensor::randn(vec![2, 3, 4, 4], 1.5, &mut rng);
    let dout = Tensor::randn(vec![2, 3, 4, 4], 1.0, &mut rng);

    let (_, cache) = bn.clone().forward_spatial(&x);
    let cache = cache.unwrap();
    let grads = bn.backward_spatial(&dout, &cache);
    assert_eq!(grads.x.shape, x.shape);

    let num_dx = eval_numerical_gradient_array(
        |t| {
            let mut b = bn.clone();
            b.forward_spatial(t).0
        },
        &x,
        &dout,
        H,
    );
    assert!(rel_error(&grads.x, &num_dx) < 1e-6);

    let num_dgamma = eval_numerical_gradient_array(
        |g| {
            let mut b = bn.clone();
            b.gamma = g.clone();
            b.forward_spatial(&x).0
        },
        &bn.gamma,
        &dout,
        H,
    );
    assert!(rel_error(&grads.gamma, &num_dgamma) < 1e-7);
}

#[test]
fn layernorm_gradients_match_numerical() {
    let mut rng = StdRng::seed_from_u64(106);
    let mut ln = LayerNorm::new(6);
    ln.gamma = Tensor::randn(vec![6], 1.0, &mut rng);
    ln.beta = Tensor::randn(vec![6], 1.0, &mut rng);
    let x = Tensor::randn(vec![5, 6], 2.0, &mut rng);
    let dout = Tensor::randn(vec![5, 6], 1.0, &mut rng);

    let (_, cache) = ln.forward(&x);
    let grads = ln.backward(&dout, &cache);

    let num_dx = eval_numerical_gradient_array(|t| ln.forward(t).0, &x, &dout, H);
    assert!(rel_error(&grads.x, &num_dx) < 1e-6);

    let num_dgamma = eval_numerical_gradient_array(
        |g| {
            let mut l = ln.clone();
            l.gamma = g.clone();
            l.forward(&x).0
        },
        &ln.gamma,
        &dout,
        H,
    );
    assert!(rel_error(&grads.gamma, &num_dgamma) < 1e-7);

    let num_dbeta = eval_numerical_gradient_array(
        |b| {
            let mut l = ln.clone();
            l.beta = b.clone();
            l.forward(&x).0
        },
        &ln.beta,
        &dout,
        H,
    );
    assert!(rel_error(&grads.beta, &num_dbeta) < 1e-7);
}

#[test]
fn groupnorm_gradients_match_numerical() {
    let mut rng = StdRng::seed_from_u64(107);
    let mut gn = GroupNorm::new(4, 2).unwrap();
    gn.gamma = Tensor::randn(vec![4], 1.0, &mut rng);
    gn.beta = Tensor::randn(vec![4], 1.0, &mut rng);
    let x = Tensor::randn(vec![2, 4, 3, 3], 1.5, &mut rng);
    let dout = Tensor::randn(vec![2, 4, 3, 3], 1.0, &mut rng);

    let (_, cache) = gn.forward(&x);
    let grads = gn.backward(&dout, &cache);

    let num_dx = eval_numerical_gradient_array(|t| gn.forward(t).0, &x, &dout, H);
    assert!(rel_error(&grads.x, &num_dx) < 1e-6);

    let num_dgamma = eval_numerical_gradient_array(
        |g| {
            let mut l = gn.clone();
            l.gamma = g.clone();
            l.forward(&x).0
        },
        &gn.gamma,
        &dout,
        H,
    );
    assert!(rel_error(&grads.gamma, &num_dgamma) < 1e-7);

    let num_dbeta = eval_numerical_gradient_array(
        |b| {
            let mut l = gn.clone();
            l.beta = b.clone();
            l.forward(&x).0
        },
        &gn.beta,
        &dout,
        H,
    );
    assert!(rel_error(&grads.beta, &num_dbeta) < 1e-7);
}

#[test]
fn dropout_gradient_matches_numerical_with_seed() {
    // The seed pins the mask, making the forward pass a fixed linear map
    let mut rng = StdRng::seed_from_u64(108);
    let layer = Dropout::new(0.7, Some(77)).unwrap();
    let x = Tensor::randn(vec![6, 5], 1.0, &mut rng);
    let dout = Tensor::randn(vec![6, 5], 1.0, &mut rng);

    let (_, cache) = layer.forward(&x);
    let dx = layer.backward(&dout, &cache);

    let num_dx = eval_numerical_gradient_array(|t| layer.forward(t).0, &x, &dout, H);
    assert!(rel_error(&dx, &num_dx) < 1e-9);
}

#[test]
fn conv_gradients_match_numerical() {
    let mut rng = StdRng::seed_from_u64(109);
    let conv = Conv2d::new(2, 2, 3, 3, 1, 1, 5e-1, &mut rng);
    let x = Tensor::randn(vec![2, 2, 4, 4], 1.0, &mut rng);
    let dout = Tensor::randn(vec![2, 2, 4, 4], 1.0, &mut rng);

    let (_, cache) = conv.forward(&x);
    let grads = conv.backward(&dout, &cache);

    let num_dx = eval_numerical_gradient_array(|t| conv.forward(t).0, &x, &dout, H);
    assert!(rel_error(&grads.x, &num_dx) < 1e-7);

    let num_dw = eval_numerical_gradient_array(
        |w| {
            let mut c = conv.clone();
            c.weight = w.clone();
            c.forward(&x).0
        },
        &conv.weight,
        &dout,
        H,
    );
    assert!(rel_error(&grads.weight, &num_dw) < 1e-7);

    let num_db = eval_numerical_gradient_array(
        |b| {
            let mut c = conv.clone();
            c.bias = b.clone();
            c.forward(&x).0
        },
        &conv.bias,
        &dout,
        H,
    );
    assert!(rel_error(&grads.bias, &num_db) < 1e-7);
}

#[test]
fn strided_conv_gradients_match_numerical() {
    let mut rng = StdRng::seed_from_u64(110);
    let conv = Conv2d::new(3, 1, 3, 3, 2, 1, 5e-1, &mut rng);
    let x = Tensor::randn(vec![2, 1, 5, 5], 1.0, &mut rng);
    let (y, cache) = conv.forward(&x);
    assert_eq!(y.shape, vec![2, 3, 3, 3]);
    let dout = Tensor::randn(y.shape.clone(), 1.0, &mut rng);

    let grads = conv.backward(&dout, &cache);
    let num_dx = eval_numerical_gradient_array(|t| conv.forward(t).0, &x, &dout, H);
    assert!(rel_error(&grads.x, &num_dx) < 1e-7);
}

#[test]
fn one_by_one_conv_is_a_per_pixel_affine() {
    // A 1x1 filter with stride 1 and no padding mixes channels exactly like
    // an affine layer applied to each pixel's channel vector
    let mut rng = StdRng::seed_from_u64(111);
    let conv = Conv2d::new(4, 3, 1, 1, 1, 0, 5e-1, &mut rng);
    let x = Tensor::randn(vec![2, 3, 1, 1], 1.0, &mut rng);

    let affine = Affine {
        // Conv weight [F, C, 1, 1] transposes to the affine's [C, F]
        weight: conv.weight.reshape(&[4, 3]).transpose(),
        bias: conv.bias.clone(),
    };

    let (conv_out, _) = conv.forward(&x);
    let (affine_out, _) = affine.forward(&x.reshape(&[2, 3]));

    assert_eq!(conv_out.shape, vec![2, 4, 1, 1]);
    for i in 0..conv_out.data.len() {
        assert!((conv_out.data[i] - affine_out.data[i]).abs() < 1e-12);
    }
}

#[test]
fn maxpool_gradient_matches_numerical() {
    // Gaussian inputs are tie-free almost surely, so the argmax routing is
    // locally linear and the finite-difference check is valid
    let mut rng = StdRng::seed_from_u64(112);
    let pool = MaxPool2d::new(2, 2, 2);
    let x = Tensor::randn(vec![2, 2, 4, 4], 1.0, &mut rng);
    let dout = Tensor::randn(vec![2, 2, 2, 2], 1.0, &mut rng);

    let (_, cache) = pool.forward(&x);
    let dx = pool.backward(&dout, &cache);

    let num_dx = eval_numerical_gradient_array(|t| pool.forward(t).0, &x, &dout, H);
    assert!(rel_error(&dx, &num_dx) < 1e-7);
}

#[test]
fn maxpool_backward_conserves_gradient_mass() {
    let mut rng = StdRng::seed_from_u64(113);
    let pool = MaxPool2d::new(2, 2, 2);
    let x = Tensor::randn(vec![1, 1, 4, 4], 1.0, &mut rng);
    let dout = Tensor::randn(vec![1, 1, 2, 2], 1.0, &mut rng);

    let (_, cache) = pool.forward(&x);
    let dx = pool.backward(&dout, &cache);

    // Windows are disjoint at stride 2, so the gradient mass entering each
    // window equals the upstream value at that output position
    let upstream_total: f64 = dout.data.iter().sum();
    let routed_total: f64 = dx.data.iter().sum();
    assert!((upstream_total - routed_total).abs() < 1e-12);
}

#[test]
fn svm_loss_gradient_matches_numerical() {
    let mut rng = StdRng::seed_from_u64(114);
    let scores = Tensor::randn(vec![6, 4], 1.0, &mut rng);
    let y = vec![0, 1, 2, 3, 0, 1];

    let (_, grad) = svm_loss(&scores, &y);
    let num_grad = eval_numerical_gradient(|s| svm_loss(s, &y).0, &scores, H);
    assert!(rel_error(&grad, &num_grad) < 1e-6);
}

#[test]
fn softmax_loss_gradient_matches_numerical() {
    let mut rng = StdRng::seed_from_u64(115);
    let scores = Tensor::randn(vec![6, 4], 1.0, &mut rng);
    let y = vec![3, 2, 1, 0, 2, 3];

    let (_, grad) = softmax_loss(&scores, &y);
    let num_grad = eval_numerical_gradient(|s| softmax_loss(s, &y).0, &scores, H);
    assert!(rel_error(&grad, &num_grad) < 1e-7);
}
