use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::error::TrainError;
use crate::train::epoch_stats::{EpochRecord, ValidationStats};

/// How a run that did not abort came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Still inside the epoch loop.
    Running,
    /// Every epoch of the budget was executed.
    Completed,
    /// The early-stopping rule fired after training epoch `epoch`.
    EarlyStopped { epoch: usize },
}

/// Everything a run has produced so far.
///
/// Only the training loop appends to it; callers get read-only access.
#[derive(Debug, Clone)]
pub struct RunState {
    epoch: usize,
    records: Vec<EpochRecord>,
    train_losses: Vec<f64>,
    termination: Termination,
    checkpoint: Option<PathBuf>,
}

impl RunState {
    pub(crate) fn new() -> Self {
        RunState {
            epoch: 0,
            records: Vec::new(),
            train_losses: Vec::new(),
            termination: Termination::Running,
            checkpoint: None,
        }
    }

    /// Index of the epoch in progress, or the number of epochs executed once
    /// the loop has ended.
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    pub fn history(&self) -> &[EpochRecord] {
        &self.records
    }

    /// Mean training loss of every executed epoch, oldest first.
    pub fn train_losses(&self) -> &[f64] {
        &self.train_losses
    }

    pub fn epochs_executed(&self) -> usize {
        self.train_losses.len()
    }

    pub fn termination(&self) -> Termination {
        self.termination
    }

    pub fn stopped_early(&self) -> bool {
        matches!(self.termination, Termination::EarlyStopped { .. })
    }

    pub fn checkpoint(&self) -> Option<&Path> {
        self.checkpoint.as_deref()
    }

    pub fn last(&self) -> Option<&EpochRecord> {
        self.records.last()
    }

    pub(crate) fn begin_epoch(&mut self, epoch: usize) {
        self.epoch = epoch;
    }

    /// Appends the training loss of the current epoch.
    pub(crate) fn push_train_loss(&mut self, loss: f64) {
        self.train_losses.push(loss);
    }

    /// Closes the current epoch with its record. Must follow exactly one
    /// `push_train_loss` for the same epoch.
    pub(crate) fn finish_epoch(&mut self, validation: Option<ValidationStats>, elapsed_ms: u64) {
        debug_assert_eq!(self.train_losses.len(), self.records.len() + 1);
        let train_loss = self.train_losses.last().copied().unwrap_or(f64::NAN);
        self.records.push(EpochRecord { epoch: self.epoch, train_loss, validation, elapsed_ms });
    }

    pub(crate) fn terminate(&mut self, termination: Termination) {
        self.epoch = self.train_losses.len();
        self.termination = termination;
    }

    pub(crate) fn set_checkpoint(&mut self, path: PathBuf) {
        self.checkpoint = Some(path);
    }
}

/// A run that ended with an error. `state` holds the progress made before
/// the failure.
#[derive(Debug, Error)]
#[error("run aborted during epoch {}: {error}", .state.epoch())]
pub struct RunAborted {
    #[source]
    pub error: TrainError,
    pub state: RunState,
}
