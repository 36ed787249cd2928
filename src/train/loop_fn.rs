use std::time::Instant;

use tracing::{debug, error, info};

use crate::data::dataset::DatasetProvider;
use crate::error::{Result, TrainError};
use crate::loss::LossFunction;
use crate::math::matrix::Matrix;
use crate::network::model::{Mode, Model};
use crate::optim::Optimizer;
use crate::train::aggregate::{MeanAggregator, RatioAggregator};
use crate::train::checkpoint::CheckpointManager;
use crate::train::early_stop::EarlyStopping;
use crate::train::epoch_stats::ValidationStats;
use crate::train::run_config::RunConfig;
use crate::train::run_state::{RunAborted, RunState, Termination};
use crate::train::sink::{MetricsSink, TAG_TRAIN_LOSS, TAG_VAL_ACCURACY, TAG_VAL_LOSS};

// ---------------------------------------------------------------------------
// Public entry points
// ---------------------------------------------------------------------------

/// Runs a full training session with the default collaborators: no metric
/// sink and checkpoints under `config.models_dir`.
///
/// See [`Trainer::run`].
pub fn run<D, M, O, L>(
    config: &RunConfig,
    dataset: &mut D,
    model: &mut M,
    optimizer: &mut O,
    loss_fn: &L,
) -> Result<RunState, RunAborted>
where
    D: DatasetProvider + ?Sized,
    M: Model + ?Sized,
    O: Optimizer + ?Sized,
    L: LossFunction + ?Sized,
{
    let mut trainer = Trainer::new(config).map_err(|error| RunAborted { error, state: RunState::new() })?;
    trainer.run(dataset, model, optimizer, loss_fn)
}

/// The epoch loop together with the policies it consults.
///
/// The trainer owns the run's `RunState` while the loop runs; model,
/// optimizer and dataset are borrowed from the caller for the duration of
/// the run and handed back untouched apart from training.
pub struct Trainer<'a> {
    config: &'a RunConfig,
    early_stopping: EarlyStopping,
    checkpoints: CheckpointManager,
    sink: Box<dyn MetricsSink + 'a>,
}

impl<'a> Trainer<'a> {
    /// Validates `config` and builds a trainer for it.
    pub fn new(config: &'a RunConfig) -> Result<Trainer<'a>> {
        config.validate()?;
        Ok(Trainer {
            config,
            early_stopping: EarlyStopping::new(config.early_stopping_epochs),
            checkpoints: CheckpointManager::new(config.models_dir.clone()),
            sink: Box::new(()),
        })
    }

    /// Reports the three per-epoch series to `sink`.
    pub fn with_sink(mut self, sink: impl MetricsSink + 'a) -> Self {
        self.sink = Box::new(sink);
        self
    }

    pub fn with_checkpoints(mut self, checkpoints: CheckpointManager) -> Self {
        self.checkpoints = checkpoints;
        self
    }

    /// Trains for at most `config.max_epochs` epochs, then saves a
    /// checkpoint if `config.save_model` is set.
    ///
    /// Every epoch runs all training batches, records the mean training
    /// loss, asks the early-stopping rule whether to stop (in which case the
    /// epoch is not evaluated) and otherwise evaluates the validation
    /// batches. Any failing step aborts the run; the returned `RunAborted`
    /// still carries the history gathered until then.
    pub fn run<D, M, O, L>(
        &mut self,
        dataset: &mut D,
        model: &mut M,
        optimizer: &mut O,
        loss_fn: &L,
    ) -> Result<RunState, RunAborted>
    where
        D: DatasetProvider + ?Sized,
        M: Model + ?Sized,
        O: Optimizer + ?Sized,
        L: LossFunction + ?Sized,
    {
        let mut state = RunState::new();
        let outcome = self.drive(&mut state, dataset, model, optimizer, loss_fn);
        self.sink.flush();

        match outcome {
            Ok(()) => Ok(state),
            Err(error) => {
                error!(epoch = state.epoch(), error = %error, "run aborted");
                Err(RunAborted { error, state })
            }
        }
    }

    fn drive<D, M, O, L>(
        &mut self,
        state: &mut RunState,
        dataset: &mut D,
        model: &mut M,
        optimizer: &mut O,
        loss_fn: &L,
    ) -> Result<()>
    where
        D: DatasetProvider + ?Sized,
        M: Model + ?Sized,
        O: Optimizer + ?Sized,
        L: LossFunction + ?Sized,
    {
        let config = self.config;
        info!(
            dataset = %config.dataset,
            batch_size = config.batch_size,
            learning_rate = optimizer.learning_rate(),
            max_epochs = config.max_epochs,
            early_stopping_epochs = config.early_stopping_epochs,
            device = "cpu",
            "starting run"
        );

        for epoch in 0..config.max_epochs {
            state.begin_epoch(epoch);
            let t_start = Instant::now();
            info!(epoch, max_epochs = config.max_epochs, "epoch started");

            // ── Training ───────────────────────────────────────────────────
            let train_loss = self.train_epoch(epoch, dataset, model, optimizer, loss_fn)?;
            state.push_train_loss(train_loss);
            info!(epoch, train_loss, "training pass finished");
            self.sink.add_scalar(TAG_TRAIN_LOSS, train_loss, epoch);

            // ── Early stopping ─────────────────────────────────────────────
            if self.early_stopping.should_stop(state.train_losses()) {
                info!(epoch, window = self.early_stopping.window, train_loss, "early stopping");
                state.finish_epoch(None, t_start.elapsed().as_millis() as u64);
                state.terminate(Termination::EarlyStopped { epoch });
                break;
            }

            // ── Evaluation ─────────────────────────────────────────────────
            let validation = self.validate_epoch(epoch, dataset, model, loss_fn)?;
            info!(epoch, val_loss = validation.loss, val_accuracy = validation.accuracy, "validation pass finished");
            self.sink.add_scalar(TAG_VAL_LOSS, validation.loss, epoch);
            self.sink.add_scalar(TAG_VAL_ACCURACY, validation.accuracy, epoch);

            state.finish_epoch(Some(validation), t_start.elapsed().as_millis() as u64);
        }

        if !state.stopped_early() {
            state.terminate(Termination::Completed);
        }

        // ── Checkpoint ─────────────────────────────────────────────────────
        if config.save_model {
            let path = self.checkpoints.save(&model.state_dict(), &config.dataset)?;
            state.set_checkpoint(path);
        }
        Ok(())
    }

    /// One pass over the training batches; returns the mean batch loss.
    fn train_epoch<D, M, O, L>(
        &self,
        epoch: usize,
        dataset: &mut D,
        model: &mut M,
        optimizer: &mut O,
        loss_fn: &L,
    ) -> Result<f64>
    where
        D: DatasetProvider + ?Sized,
        M: Model + ?Sized,
        O: Optimizer + ?Sized,
        L: LossFunction + ?Sized,
    {
        model.set_mode(Mode::Training);
        let mut losses = MeanAggregator::new("train_loss");

        for (batch_i, batch) in dataset.train_batches().enumerate() {
            let batch = batch?;
            if self.config.print_debug {
                debug!(epoch, batch = batch_i, inputs = ?batch.inputs.shape(), samples = batch.samples, "training batch");
            }

            let logits = model.forward(&batch.inputs)?;
            let loss = loss_fn.forward(&logits, &batch.targets)?;
            model.backward(&loss.grad)?;
            optimizer.step(&mut model.parameters())?;
            model.zero_grad();

            losses.record(loss.value);
        }

        losses.mean()
    }

    /// One pass over the validation batches without gradient bookkeeping.
    fn validate_epoch<D, M, L>(
        &self,
        epoch: usize,
        dataset: &mut D,
        model: &mut M,
        loss_fn: &L,
    ) -> Result<ValidationStats>
    where
        D: DatasetProvider + ?Sized,
        M: Model + ?Sized,
        L: LossFunction + ?Sized,
    {
        model.set_mode(Mode::Evaluation);
        let mut losses = MeanAggregator::new("val_loss");
        let mut accuracy = RatioAggregator::new("val_accuracy");

        for (batch_i, batch) in dataset.val_batches().enumerate() {
            let batch = batch?;
            if self.config.print_debug {
                debug!(epoch, batch = batch_i, inputs = ?batch.inputs.shape(), samples = batch.samples, "validation batch");
            }

            let logits = model.forward(&batch.inputs)?;
            losses.record(loss_fn.value(&logits, &batch.targets)?);
            accuracy.record(count_correct(&logits, &batch.targets)?, batch.len());
        }

        Ok(ValidationStats { loss: losses.mean()?, accuracy: accuracy.ratio()? })
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

/// Rows whose highest logit is the target class.
fn count_correct(logits: &Matrix, targets: &[usize]) -> Result<usize> {
    if logits.rows() != targets.len() {
        return Err(TrainError::shape(format!(
            "{} prediction rows but {} targets",
            logits.rows(),
            targets.len()
        )));
    }
    Ok(logits
        .argmax_rows()
        .iter()
        .zip(targets)
        .filter(|(pred, target)| pred == target)
        .count())
}
