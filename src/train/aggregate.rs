//! Per-epoch accumulation of batch metrics.
//!
//! A fresh aggregator is created for every metric stream at the start of
//! every epoch; nothing carries over between epochs.

use crate::error::{Result, TrainError};

/// Running mean of one scalar stream (e.g. batch losses).
#[derive(Debug, Clone)]
pub struct MeanAggregator {
    metric: &'static str,
    sum: f64,
    count: usize,
}

impl MeanAggregator {
    pub fn new(metric: &'static str) -> Self {
        Self { metric, sum: 0.0, count: 0 }
    }

    pub fn record(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Mean of the recorded values. Errors when nothing was recorded.
    pub fn mean(&self) -> Result<f64> {
        if self.count == 0 {
            return Err(TrainError::EmptyAggregate { metric: self.metric });
        }
        Ok(self.sum / self.count as f64)
    }
}

/// Pooled hit ratio, `Σ correct / Σ total`.
///
/// Pooling keeps a short final batch from weighing as much as a full one,
/// which averaging per-batch ratios would not.
#[derive(Debug, Clone)]
pub struct RatioAggregator {
    metric: &'static str,
    correct: usize,
    total: usize,
}

impl RatioAggregator {
    pub fn new(metric: &'static str) -> Self {
        Self { metric, correct: 0, total: 0 }
    }

    pub fn record(&mut self, correct: usize, total: usize) {
        self.correct += correct;
        self.total += total;
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn ratio(&self) -> Result<f64> {
        if self.total == 0 {
            return Err(TrainError::EmptyAggregate { metric: self.metric });
        }
        Ok(self.correct as f64 / self.total as f64)
    }
}
