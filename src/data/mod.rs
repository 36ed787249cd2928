pub mod batch;
pub mod dataset;
pub mod synthetic;

pub use batch::{Batch, Sample};
pub use dataset::{DatasetProvider, SplitDataset, SplitOptions};
pub use synthetic::SyntheticVolumes;
