use serde::{Serialize, Deserialize};

/// Validation results of one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationStats {
    /// Mean loss over validation batches.
    pub loss: f64,
    /// Correct voxels / labelled voxels over the whole validation pass.
    pub accuracy: f64,
}

/// One completed epoch of a run.
///
/// Appended to the run history once per epoch and never changed afterwards.
/// `validation` is `None` only for the epoch on which early stopping fired:
/// the loop stops before evaluating it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    /// 0-based epoch index.
    pub epoch: usize,
    /// Mean training loss over the epoch's training batches.
    pub train_loss: f64,
    pub validation: Option<ValidationStats>,
    /// Wall-clock duration of the epoch in milliseconds.
    pub elapsed_ms: u64,
}
