//! Error types for the training driver.

use std::path::PathBuf;

use thiserror::Error;

/// Everything that can abort a run.
#[derive(Debug, Error)]
pub enum TrainError {
    /// A required setting is missing or malformed. Raised before the first epoch.
    #[error("configuration error: {0}")]
    Config(String),

    /// A batch, prediction or target has a shape the next step cannot consume.
    #[error("shape error: {0}")]
    Shape(String),

    /// A mean or ratio was requested over zero recorded values.
    #[error("no values recorded for metric `{metric}`")]
    EmptyAggregate { metric: &'static str },

    /// Creating the checkpoint directory or writing the checkpoint failed.
    #[error("checkpoint error at {}: {source}", .path.display())]
    Checkpoint {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The model was driven in a way it does not support.
    #[error("model error: {0}")]
    Model(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TrainError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn shape(msg: impl Into<String>) -> Self {
        Self::Shape(msg.into())
    }

    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }
}

pub type Result<T, E = TrainError> = std::result::Result<T, E>;
