pub mod aggregate;
pub mod checkpoint;
pub mod early_stop;
pub mod epoch_stats;
pub mod loop_fn;
pub mod run_config;
pub mod run_state;
pub mod sink;

pub use aggregate::{MeanAggregator, RatioAggregator};
pub use checkpoint::CheckpointManager;
pub use early_stop::{should_stop, EarlyStopping};
pub use epoch_stats::{EpochRecord, ValidationStats};
pub use loop_fn::{run, Trainer};
pub use run_config::RunConfig;
pub use run_state::{RunAborted, RunState, Termination};
pub use sink::{JsonlSink, MemorySink, MetricsSink};
