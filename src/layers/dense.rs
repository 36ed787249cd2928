use rand::Rng;

use crate::activation::activation::ActivationFunction;
use crate::error::{Result, TrainError};
use crate::math::matrix::Matrix;

/// Fully connected layer applied independently to every row of a batch.
///
/// `weights` is `input_size x size`, `biases` is `1 x size`. Gradients are
/// accumulated in `weights_grad`/`biases_grad` until `zero_grad`.
#[derive(Debug, Clone)]
pub struct Layer {
    pub size: usize,
    pub weights: Matrix,
    pub biases: Matrix,
    pub weights_grad: Matrix,
    pub biases_grad: Matrix,
    pub activator: ActivationFunction,
    cache: Option<ForwardCache>,
}

// Inputs and pre-activations (z = xW + b) of the last training forward.
#[derive(Debug, Clone)]
struct ForwardCache {
    inputs: Matrix,
    pre_activation: Matrix,
}

impl Layer {
    pub fn new<R: Rng + ?Sized>(
        input_size: usize,
        size: usize,
        activation: ActivationFunction,
        rng: &mut R,
    ) -> Layer {
        let weights = if activation.prefers_he_init() {
            Matrix::he(input_size, size, rng)
        } else {
            Matrix::xavier(input_size, size, rng)
        };

        Layer {
            size,
            weights_grad: Matrix::zeros(input_size, size),
            biases_grad: Matrix::zeros(1, size),
            weights,
            biases: Matrix::zeros(1, size),
            activator: activation,
            cache: None,
        }
    }

    pub fn input_size(&self) -> usize {
        self.weights.rows()
    }

    /// Forward pass over a batch. With `keep_cache` the inputs and
    /// pre-activations are retained for `backward`; otherwise any stale cache
    /// is dropped.
    pub fn feed_from(&mut self, inputs: &Matrix, keep_cache: bool) -> Result<Matrix> {
        if inputs.cols() != self.input_size() {
            return Err(TrainError::shape(format!(
                "layer expects {} input features, got {}",
                self.input_size(),
                inputs.cols()
            )));
        }
        let z = inputs.matmul(&self.weights)?.add_row(&self.biases)?;
        let activator = self.activator;
        let a = z.map(|x| activator.function(x));

        self.cache = keep_cache.then(|| ForwardCache {
            inputs: inputs.clone(),
            pre_activation: z,
        });
        Ok(a)
    }

    /// Accumulates gradients for this layer and returns `d loss / d inputs`.
    /// `grad_output` is `d loss / d a` for this layer's activations.
    pub fn backward(&mut self, grad_output: &Matrix) -> Result<Matrix> {
        let cache = self.cache.as_ref().ok_or_else(|| {
            TrainError::model("backward called without a training-mode forward pass")
        })?;

        let activator = self.activator;
        let act_derivative = cache.pre_activation.map(|x| activator.derivative(x));
        // δ = error ⊙ σ'(z)
        let delta = grad_output.hadamard(&act_derivative)?;

        self.weights_grad.add_assign(&cache.inputs.transpose().matmul(&delta)?)?;
        self.biases_grad.add_assign(&delta.column_sums())?;

        delta.matmul(&self.weights.transpose())
    }

    pub fn zero_grad(&mut self) {
        self.weights_grad.fill(0.0);
        self.biases_grad.fill(0.0);
    }

    pub fn clear_cache(&mut self) {
        self.cache = None;
    }
}
