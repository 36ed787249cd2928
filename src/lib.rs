pub mod error;
pub mod math;
pub mod activation;
pub mod layers;
pub mod network;
pub mod loss;
pub mod optim;
pub mod data;
pub mod train;

// Convenience re-exports
pub use error::{Result, TrainError};
pub use math::matrix::Matrix;
pub use activation::activation::ActivationFunction;
pub use layers::dense::Layer;
pub use network::{Mode, Model, ModelState, Network, NetworkSpec};
pub use loss::{CrossEntropyLoss, LossFunction, LossType, MseLoss};
pub use optim::{Adam, Optimizer, OptimizerKind, Sgd};
pub use data::{Batch, DatasetProvider, Sample, SplitDataset, SyntheticVolumes};
pub use train::{run, CheckpointManager, EpochRecord, RunAborted, RunConfig, RunState, Termination, Trainer};
