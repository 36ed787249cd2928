use serde::{Serialize, Deserialize};

/// Selects which loss function a run trains with.
///
/// - `CrossEntropy`: softmax cross-entropy over class logits (default).
/// - `Mse`: mean-squared error against one-hot targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossType {
    #[default]
    CrossEntropy,
    Mse,
}
