use serde::{Serialize, Deserialize};

use crate::activation::activation::ActivationFunction;
use crate::error::{Result, TrainError};

/// Architecture of the point-wise segmentation network.
///
/// Parsed from the run's opaque `model_settings` value. Unknown keys are
/// ignored so settings files written for other models still load.
///
/// Fields:
/// - `in_channels`: features per voxel; taken from the data when absent
/// - `num_classes`: segmentation classes, one logit each
/// - `hidden`: sizes of the hidden layers, input → output
/// - `activation`: activation of every hidden layer
/// - `seed`: weight initialization seed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpec {
    #[serde(default, alias = "num_channels")]
    pub in_channels: Option<usize>,
    #[serde(alias = "classes")]
    pub num_classes: usize,
    #[serde(default)]
    pub hidden: Vec<usize>,
    #[serde(default)]
    pub activation: ActivationFunction,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl NetworkSpec {
    /// Reads the spec out of `model_settings`, filling `in_channels` from
    /// the dataset's channel count.
    pub fn from_settings(settings: &serde_json::Value, data_channels: usize) -> Result<NetworkSpec> {
        let mut spec: NetworkSpec = serde_json::from_value(settings.clone())
            .map_err(|e| TrainError::config(format!("model_settings: {e}")))?;

        match spec.in_channels {
            Some(c) if c != data_channels => {
                return Err(TrainError::config(format!(
                    "model_settings.in_channels is {c} but the data has {data_channels} channels"
                )));
            }
            _ => spec.in_channels = Some(data_channels),
        }
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> Result<()> {
        if self.in_channels == Some(0) {
            return Err(TrainError::config("model_settings.in_channels must be at least 1"));
        }
        if self.num_classes < 2 {
            return Err(TrainError::config("model_settings.num_classes must be at least 2"));
        }
        if self.hidden.iter().any(|&h| h == 0) {
            return Err(TrainError::config("model_settings.hidden layers must be non-empty"));
        }
        Ok(())
    }

    /// `(input_size, size, activation)` for every layer, output layer last.
    pub fn layer_shapes(&self) -> Result<Vec<(usize, usize, ActivationFunction)>> {
        let in_channels = self
            .in_channels
            .ok_or_else(|| TrainError::config("model_settings.in_channels is not set"))?;

        let mut shapes = Vec::with_capacity(self.hidden.len() + 1);
        let mut prev = in_channels;
        for &size in &self.hidden {
            shapes.push((prev, size, self.activation));
            prev = size;
        }
        shapes.push((prev, self.num_classes, ActivationFunction::Identity));
        Ok(shapes)
    }
}
