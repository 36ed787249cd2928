use std::path::{Component, Path, PathBuf};

use serde::{Serialize, Deserialize};

use crate::data::dataset::SplitOptions;
use crate::error::{Result, TrainError};
use crate::loss::loss_type::LossType;
use crate::optim::OptimizerKind;

/// Settings of one training run. Immutable once the run starts.
///
/// Required keys:
/// - `dataset`: identifier; also namespaces the checkpoint directory
/// - `batch_size`: samples per batch
/// - `learning_rate`: optimizer step size
/// - `max_epochs`: epoch budget
/// - `early_stopping_epochs`: window of the early-stopping rule
/// - `save_model`: write a checkpoint when the run ends
/// - `model_settings`: model sub-configuration, opaque to the loop
///
/// Everything else has a default. Unknown keys are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub dataset: String,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub max_epochs: usize,
    pub early_stopping_epochs: usize,
    #[serde(alias = "save_on_completion")]
    pub save_model: bool,
    pub model_settings: serde_json::Value,

    #[serde(default = "default_validation_split")]
    pub validation_split: f64,
    #[serde(default = "default_weight_decay")]
    pub weight_decay: f64,
    #[serde(default)]
    pub optimizer: OptimizerKind,
    #[serde(default)]
    pub loss: LossType,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,
    /// Logs every batch's shape at debug level.
    #[serde(default)]
    pub print_debug: bool,
}

fn default_validation_split() -> f64 {
    0.2
}

fn default_weight_decay() -> f64 {
    1e-3
}

fn default_models_dir() -> PathBuf {
    PathBuf::from("models/saved_models")
}

impl RunConfig {
    /// Creates a config with the given required values and every optional
    /// key at its default.
    pub fn new(
        dataset: impl Into<String>,
        batch_size: usize,
        learning_rate: f64,
        max_epochs: usize,
        early_stopping_epochs: usize,
        save_model: bool,
    ) -> Self {
        RunConfig {
            dataset: dataset.into(),
            batch_size,
            learning_rate,
            max_epochs,
            early_stopping_epochs,
            save_model,
            model_settings: serde_json::Value::Object(Default::default()),
            validation_split: default_validation_split(),
            weight_decay: default_weight_decay(),
            optimizer: OptimizerKind::default(),
            loss: LossType::default(),
            seed: None,
            models_dir: default_models_dir(),
            print_debug: false,
        }
    }

    /// Parses and validates settings from JSON text.
    pub fn from_json_str(text: &str) -> Result<RunConfig> {
        let config: RunConfig = serde_json::from_str(text)
            .map_err(|e| TrainError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON settings file.
    pub fn load_json(path: impl AsRef<Path>) -> Result<RunConfig> {
        let text = std::fs::read_to_string(path)?;
        RunConfig::from_json_str(&text)
    }

    /// Checks every value the run depends on; called before the first epoch.
    pub fn validate(&self) -> Result<()> {
        if self.dataset.is_empty() {
            return Err(TrainError::config("dataset must not be empty"));
        }
        let mut components = Path::new(&self.dataset).components();
        if !matches!((components.next(), components.next()), (Some(Component::Normal(_)), None)) {
            return Err(TrainError::config(format!(
                "dataset `{}` must be a single path segment",
                self.dataset
            )));
        }
        if self.batch_size == 0 {
            return Err(TrainError::config("batch_size must be at least 1"));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(TrainError::config(format!(
                "learning_rate must be a positive number, got {}",
                self.learning_rate
            )));
        }
        if self.early_stopping_epochs == 0 {
            return Err(TrainError::config("early_stopping_epochs must be at least 1"));
        }
        if !(self.validation_split > 0.0 && self.validation_split < 1.0) {
            return Err(TrainError::config(format!(
                "validation_split must be in (0, 1), got {}",
                self.validation_split
            )));
        }
        if !(self.weight_decay.is_finite() && self.weight_decay >= 0.0) {
            return Err(TrainError::config(format!(
                "weight_decay must be non-negative, got {}",
                self.weight_decay
            )));
        }
        Ok(())
    }

    /// Batching and split options for an in-memory dataset.
    pub fn split_options(&self) -> SplitOptions {
        SplitOptions {
            batch_size: self.batch_size,
            validation_split: self.validation_split,
            seed: self.seed,
        }
    }
}
