//! The contract between the training loop and whatever model it trains.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::math::matrix::Matrix;

/// Whether the model is being fitted or only evaluated.
///
/// In `Evaluation` a model must not keep whatever state it needs for a
/// backward pass; this is the "no gradient tracking" half of the switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Training,
    Evaluation,
}

/// One trainable tensor together with the gradient accumulated for it.
pub struct ParamMut<'a> {
    pub name: String,
    pub value: &'a mut Matrix,
    pub grad: &'a Matrix,
}

/// Named snapshot of every trainable tensor; what a checkpoint stores.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelState {
    pub tensors: BTreeMap<String, Matrix>,
}

impl ModelState {
    pub fn parameter_count(&self) -> usize {
        self.tensors.values().map(|m| m.data().len()).sum()
    }
}

/// A stateful differentiable function from a batch of voxel rows to
/// per-voxel class logits.
pub trait Model {
    /// Switches between training and evaluation. Models without a
    /// distinction can ignore it.
    fn set_mode(&mut self, _mode: Mode) {}

    /// Maps `inputs` (one row per voxel) to logits (one row per voxel, one
    /// column per class).
    fn forward(&mut self, inputs: &Matrix) -> Result<Matrix>;

    /// Accumulates parameter gradients given `d loss / d logits` for the
    /// most recent training-mode forward pass.
    fn backward(&mut self, grad_output: &Matrix) -> Result<()>;

    /// Trainable tensors paired with their accumulated gradients.
    fn parameters(&mut self) -> Vec<ParamMut<'_>>;

    fn zero_grad(&mut self);

    fn state_dict(&self) -> ModelState;

    fn load_state_dict(&mut self, state: &ModelState) -> Result<()>;
}
