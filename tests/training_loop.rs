use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::path::Path;
use std::rc::Rc;

use ferrite_seg::loss::LossOutput;
use ferrite_seg::network::ParamMut;
use ferrite_seg::train::sink::{MemorySink, TAG_TRAIN_LOSS, TAG_VAL_ACCURACY, TAG_VAL_LOSS};
use ferrite_seg::train::CheckpointManager;
use ferrite_seg::{
    run, Batch, DatasetProvider, LossFunction, Matrix, Mode, Model, ModelState, Optimizer,
    RunConfig, Termination, Trainer, TrainError,
};

// ---------------------------------------------------------------------------
// Scripted collaborators
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Event {
    SetMode(Mode),
    Forward(Mode),
    Backward,
    Step,
    ZeroGrad,
}

type Log = Rc<RefCell<Vec<Event>>>;

/// Predicts class 0 for every row and counts optimizer steps in its weight.
struct ScriptedModel {
    log: Log,
    mode: Mode,
    weight: Matrix,
    grad: Matrix,
}

impl ScriptedModel {
    fn new(log: &Log) -> Self {
        ScriptedModel {
            log: log.clone(),
            mode: Mode::Training,
            weight: Matrix::zeros(1, 1),
            grad: Matrix::zeros(1, 1),
        }
    }
}

impl Model for ScriptedModel {
    fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
        self.log.borrow_mut().push(Event::SetMode(mode));
    }

    fn forward(&mut self, inputs: &Matrix) -> ferrite_seg::Result<Matrix> {
        self.log.borrow_mut().push(Event::Forward(self.mode));
        let mut logits = Matrix::zeros(inputs.rows(), 2);
        for r in 0..inputs.rows() {
            logits.set(r, 0, 1.0);
        }
        Ok(logits)
    }

    fn backward(&mut self, _grad_output: &Matrix) -> ferrite_seg::Result<()> {
        self.log.borrow_mut().push(Event::Backward);
        Ok(())
    }

    fn parameters(&mut self) -> Vec<ParamMut<'_>> {
        vec![ParamMut { name: "w".into(), value: &mut self.weight, grad: &self.grad }]
    }

    fn zero_grad(&mut self) {
        self.log.borrow_mut().push(Event::ZeroGrad);
    }

    fn state_dict(&self) -> ModelState {
        let mut state = ModelState::default();
        state.tensors.insert("w".into(), self.weight.clone());
        state
    }

    fn load_state_dict(&mut self, state: &ModelState) -> ferrite_seg::Result<()> {
        self.weight = state.tensors["w"].clone();
        Ok(())
    }
}

struct CountingOptimizer {
    log: Log,
}

impl Optimizer for CountingOptimizer {
    fn step(&mut self, params: &mut [ParamMut<'_>]) -> ferrite_seg::Result<()> {
        self.log.borrow_mut().push(Event::Step);
        for p in params.iter_mut() {
            p.value.data_mut()[0] += 1.0;
        }
        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        0.1
    }
}

/// Training batches get the next scripted loss; validation batches a constant.
struct ScriptedLoss {
    train: RefCell<VecDeque<f64>>,
    val: f64,
}

impl ScriptedLoss {
    fn new(train: &[f64]) -> Self {
        ScriptedLoss { train: RefCell::new(train.iter().copied().collect()), val: 0.25 }
    }
}

impl LossFunction for ScriptedLoss {
    fn forward(&self, logits: &Matrix, _targets: &[usize]) -> ferrite_seg::Result<LossOutput> {
        let value = self.train.borrow_mut().pop_front().expect("loss script exhausted");
        Ok(LossOutput { value, grad: Matrix::zeros(logits.rows(), logits.cols()) })
    }

    fn value(&self, _logits: &Matrix, _targets: &[usize]) -> ferrite_seg::Result<f64> {
        Ok(self.val)
    }
}

/// Fixed batches; optionally fails on the training pass of epoch `fail_on`.
struct ListDataset {
    train: Vec<Batch>,
    val: Vec<Batch>,
    fail_on: Option<usize>,
    passes: Cell<usize>,
}

impl ListDataset {
    fn new(train: Vec<Batch>, val: Vec<Batch>) -> Self {
        ListDataset { train, val, fail_on: None, passes: Cell::new(0) }
    }
}

impl DatasetProvider for ListDataset {
    fn train_batches(&mut self) -> Box<dyn Iterator<Item = ferrite_seg::Result<Batch>> + '_> {
        let pass = self.passes.get();
        self.passes.set(pass + 1);
        if self.fail_on == Some(pass) {
            return Box::new(std::iter::once(Err(TrainError::shape("volume has 3 channels, expected 4"))));
        }
        Box::new(self.train.clone().into_iter().map(Ok))
    }

    fn val_batches(&mut self) -> Box<dyn Iterator<Item = ferrite_seg::Result<Batch>> + '_> {
        Box::new(self.val.clone().into_iter().map(Ok))
    }
}

fn batch(targets: Vec<usize>) -> Batch {
    let rows = targets.len();
    Batch::new(Matrix::zeros(rows, 1), targets, 1).unwrap()
}

fn config(models_dir: &Path, max_epochs: usize, window: usize, save_model: bool) -> RunConfig {
    let mut config = RunConfig::new("X", 1, 1e-3, max_epochs, window, save_model);
    config.models_dir = models_dir.to_path_buf();
    config
}

struct Harness {
    log: Log,
    model: ScriptedModel,
    optimizer: CountingOptimizer,
    sink: MemorySink,
}

impl Harness {
    fn new() -> Self {
        let log: Log = Rc::default();
        Harness {
            model: ScriptedModel::new(&log),
            optimizer: CountingOptimizer { log: log.clone() },
            sink: MemorySink::default(),
            log,
        }
    }

    fn count(&self, event: &Event) -> usize {
        self.log.borrow().iter().filter(|e| *e == event).count()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn full_budget_runs_every_epoch_and_evaluates_each() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config(tmp.path(), 5, 3, false);
    let mut h = Harness::new();
    let mut data = ListDataset::new(vec![batch(vec![0, 1])], vec![batch(vec![0])]);
    let loss = ScriptedLoss::new(&[1.0, 0.9, 0.8, 0.7, 0.6]);

    let state = Trainer::new(&config)
        .unwrap()
        .with_sink(&mut h.sink)
        .run(&mut data, &mut h.model, &mut h.optimizer, &loss)
        .unwrap();

    assert_eq!(state.termination(), Termination::Completed);
    assert_eq!(state.epochs_executed(), 5);
    assert_eq!(state.train_losses(), &[1.0, 0.9, 0.8, 0.7, 0.6]);
    assert_eq!(state.history().len(), 5);
    assert!(state.history().iter().enumerate().all(|(i, r)| r.epoch == i && r.validation.is_some()));
    assert!(state.checkpoint().is_none());

    assert_eq!(h.sink.series(TAG_TRAIN_LOSS).len(), 5);
    assert_eq!(h.sink.series(TAG_VAL_LOSS), vec![(0, 0.25), (1, 0.25), (2, 0.25), (3, 0.25), (4, 0.25)]);
    assert_eq!(h.sink.series(TAG_VAL_ACCURACY).len(), 5);
}

#[test]
fn regression_stops_before_evaluating_that_epoch() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config(tmp.path(), 10, 3, false);
    let mut h = Harness::new();
    let mut data = ListDataset::new(vec![batch(vec![0])], vec![batch(vec![0]), batch(vec![1])]);
    let loss = ScriptedLoss::new(&[0.5, 0.6, 0.7, 0.8, 0.9, 1.0, 1.1, 1.2, 1.3, 1.4]);

    let state = Trainer::new(&config)
        .unwrap()
        .with_sink(&mut h.sink)
        .run(&mut data, &mut h.model, &mut h.optimizer, &loss)
        .unwrap();

    assert_eq!(state.termination(), Termination::EarlyStopped { epoch: 3 });
    assert!(state.stopped_early());
    assert_eq!(state.train_losses(), &[0.5, 0.6, 0.7, 0.8]);
    assert_eq!(state.epoch(), 4);

    let history = state.history();
    assert_eq!(history.len(), 4);
    assert!(history[..3].iter().all(|r| r.validation.is_some()));
    assert_eq!(history[3].validation, None);

    // Two validation batches for each of the three evaluated epochs, none after.
    assert_eq!(h.count(&Event::Forward(Mode::Evaluation)), 6);
    assert_eq!(h.count(&Event::Forward(Mode::Training)), 4);
    assert_eq!(h.sink.series(TAG_TRAIN_LOSS).len(), 4);
    assert_eq!(h.sink.series(TAG_VAL_LOSS).len(), 3);
    assert_eq!(h.sink.series(TAG_VAL_ACCURACY).last().map(|s| s.0), Some(2));
}

#[test]
fn rebound_inside_the_window_keeps_training() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config(tmp.path(), 4, 3, false);
    let mut h = Harness::new();
    let mut data = ListDataset::new(vec![batch(vec![0])], vec![batch(vec![0])]);
    let loss = ScriptedLoss::new(&[1.0, 0.9, 0.8, 0.95]);

    let state = run(&config, &mut data, &mut h.model, &mut h.optimizer, &loss).unwrap();

    assert_eq!(state.termination(), Termination::Completed);
    assert_eq!(state.history().len(), 4);
    assert!(state.history()[3].validation.is_some());
}

#[test]
fn batches_are_trained_in_order_before_evaluation() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config(tmp.path(), 1, 3, false);
    let mut h = Harness::new();
    let mut data = ListDataset::new(vec![batch(vec![0]), batch(vec![1])], vec![batch(vec![0])]);
    let loss = ScriptedLoss::new(&[0.4, 0.2]);

    let state = run(&config, &mut data, &mut h.model, &mut h.optimizer, &loss).unwrap();

    use Event::*;
    assert_eq!(
        *h.log.borrow(),
        vec![
            SetMode(Mode::Training),
            Forward(Mode::Training),
            Backward,
            Step,
            ZeroGrad,
            Forward(Mode::Training),
            Backward,
            Step,
            ZeroGrad,
            SetMode(Mode::Evaluation),
            Forward(Mode::Evaluation),
        ]
    );
    // Mean over the two batch losses.
    assert!((state.train_losses()[0] - 0.3).abs() < 1e-12);
}

#[test]
fn accuracy_pools_counts_over_uneven_batches() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config(tmp.path(), 1, 3, false);
    let mut h = Harness::new();
    // The model always predicts class 0: 2 of 3 right, then 1 of 1 right.
    let mut data = ListDataset::new(vec![batch(vec![0])], vec![batch(vec![0, 0, 1]), batch(vec![0])]);
    let loss = ScriptedLoss::new(&[1.0]);

    let state = run(&config, &mut data, &mut h.model, &mut h.optimizer, &loss).unwrap();

    let validation = state.history()[0].validation.unwrap();
    assert_eq!(validation.accuracy, 0.75);
    assert_eq!(validation.loss, 0.25);
}

#[test]
fn zero_epochs_still_checkpoints_the_untrained_model() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config(tmp.path(), 0, 3, true);
    let mut h = Harness::new();
    let mut data = ListDataset::new(vec![batch(vec![0])], vec![batch(vec![0])]);
    let loss = ScriptedLoss::new(&[]);

    let state = run(&config, &mut data, &mut h.model, &mut h.optimizer, &loss).unwrap();

    assert!(state.history().is_empty());
    assert!(state.train_losses().is_empty());
    assert_eq!(state.termination(), Termination::Completed);
    assert!(h.log.borrow().is_empty());

    let path = state.checkpoint().expect("checkpoint written");
    assert_eq!(path, tmp.path().join("X").join("model.json"));
    let saved = CheckpointManager::new(tmp.path()).load("X").unwrap();
    assert_eq!(saved.tensors["w"].get(0, 0), 0.0);
}

#[test]
fn nothing_is_written_without_save_flag() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config(tmp.path(), 1, 3, false);
    let mut h = Harness::new();
    let mut data = ListDataset::new(vec![batch(vec![0])], vec![batch(vec![0])]);
    let loss = ScriptedLoss::new(&[1.0]);

    run(&config, &mut data, &mut h.model, &mut h.optimizer, &loss).unwrap();
    assert!(!tmp.path().join("X").exists());
}

#[test]
fn second_run_overwrites_the_checkpoint() {
    let tmp = tempfile::tempdir().unwrap();
    let manager = CheckpointManager::new(tmp.path());

    // First run: two optimizer steps.
    let config_a = config(tmp.path(), 1, 3, true);
    let mut h = Harness::new();
    let mut data = ListDataset::new(vec![batch(vec![0]), batch(vec![0])], vec![batch(vec![0])]);
    run(&config_a, &mut data, &mut h.model, &mut h.optimizer, &ScriptedLoss::new(&[1.0, 1.0])).unwrap();
    assert_eq!(manager.load("X").unwrap().tensors["w"].get(0, 0), 2.0);

    // Second run: one step on a fresh model.
    let mut h = Harness::new();
    let mut data = ListDataset::new(vec![batch(vec![0])], vec![batch(vec![0])]);
    let state = run(&config_a, &mut data, &mut h.model, &mut h.optimizer, &ScriptedLoss::new(&[1.0])).unwrap();
    assert_eq!(state.checkpoint(), Some(manager.path_for("X").as_path()));
    assert_eq!(manager.load("X").unwrap().tensors["w"].get(0, 0), 1.0);
}

#[test]
fn empty_validation_set_aborts_with_partial_history() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config(tmp.path(), 3, 3, true);
    let mut h = Harness::new();
    let mut data = ListDataset::new(vec![batch(vec![0])], vec![]);
    let loss = ScriptedLoss::new(&[0.7, 0.6, 0.5]);

    let aborted = run(&config, &mut data, &mut h.model, &mut h.optimizer, &loss).unwrap_err();

    assert!(matches!(aborted.error, TrainError::EmptyAggregate { metric: "val_loss" }));
    assert_eq!(aborted.state.train_losses(), &[0.7]);
    assert!(aborted.state.history().is_empty());
    assert_eq!(aborted.state.termination(), Termination::Running);
    assert!(aborted.state.checkpoint().is_none());
    assert!(!tmp.path().join("X").exists());
}

#[test]
fn empty_training_pass_is_an_error_not_a_zero_loss() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config(tmp.path(), 2, 3, false);
    let mut h = Harness::new();
    let mut data = ListDataset::new(vec![], vec![batch(vec![0])]);

    let aborted = run(&config, &mut data, &mut h.model, &mut h.optimizer, &ScriptedLoss::new(&[])).unwrap_err();
    assert!(matches!(aborted.error, TrainError::EmptyAggregate { metric: "train_loss" }));
    assert!(aborted.state.train_losses().is_empty());
}

#[test]
fn failing_batch_aborts_and_keeps_earlier_epochs() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config(tmp.path(), 5, 3, true);
    let mut h = Harness::new();
    let mut data = ListDataset::new(vec![batch(vec![0])], vec![batch(vec![0])]);
    data.fail_on = Some(1);
    let loss = ScriptedLoss::new(&[0.9, 0.8, 0.7, 0.6, 0.5]);

    let aborted = run(&config, &mut data, &mut h.model, &mut h.optimizer, &loss).unwrap_err();

    assert!(matches!(aborted.error, TrainError::Shape(_)));
    assert_eq!(aborted.state.epoch(), 1);
    assert_eq!(aborted.state.history().len(), 1);
    assert_eq!(aborted.state.train_losses(), &[0.9]);
    assert!(aborted.to_string().contains("epoch 1"));
    assert!(!tmp.path().join("X").exists());
}

#[test]
fn checkpoint_failure_fails_the_run() {
    let tmp = tempfile::tempdir().unwrap();
    let blocker = tmp.path().join("models");
    std::fs::write(&blocker, b"not a directory").unwrap();

    let config = config(&blocker, 2, 3, true);
    let mut h = Harness::new();
    let mut data = ListDataset::new(vec![batch(vec![0])], vec![batch(vec![0])]);
    let loss = ScriptedLoss::new(&[0.9, 0.8]);

    let aborted = run(&config, &mut data, &mut h.model, &mut h.optimizer, &loss).unwrap_err();

    assert!(matches!(aborted.error, TrainError::Checkpoint { .. }));
    assert_eq!(aborted.state.history().len(), 2);
    assert_eq!(aborted.state.termination(), Termination::Completed);
}

#[test]
fn invalid_config_fails_before_the_first_epoch() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = config(tmp.path(), 3, 3, false);
    config.batch_size = 0;
    let mut h = Harness::new();
    let mut data = ListDataset::new(vec![batch(vec![0])], vec![batch(vec![0])]);

    let aborted = run(&config, &mut data, &mut h.model, &mut h.optimizer, &ScriptedLoss::new(&[])).unwrap_err();

    assert!(matches!(aborted.error, TrainError::Config(_)));
    assert!(h.log.borrow().is_empty());
    assert!(matches!(Trainer::new(&config), Err(TrainError::Config(_))));
}

#[test]
fn injected_checkpoint_manager_overrides_models_dir() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config(&tmp.path().join("unused"), 1, 3, true);
    let manager = CheckpointManager::new(tmp.path().join("elsewhere"));
    let mut h = Harness::new();
    let mut data = ListDataset::new(vec![batch(vec![0])], vec![batch(vec![0])]);

    let state = Trainer::new(&config)
        .unwrap()
        .with_checkpoints(manager.clone())
        .run(&mut data, &mut h.model, &mut h.optimizer, &ScriptedLoss::new(&[1.0]))
        .unwrap();

    assert!(state.checkpoint().unwrap().starts_with(manager.root()));
    assert!(!tmp.path().join("unused").exists());
}

#[test]
fn gradient_shape_mismatch_aborts_the_run() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config(tmp.path(), 2, 3, false);
    let mut h = Harness::new();
    h.model.grad = Matrix::zeros(1, 2);
    let mut data = ListDataset::new(vec![batch(vec![0])], vec![batch(vec![0])]);
    let mut sgd = ferrite_seg::Sgd::new(0.1);

    let aborted = run(&config, &mut data, &mut h.model, &mut sgd, &ScriptedLoss::new(&[1.0])).unwrap_err();

    assert!(matches!(aborted.error, TrainError::Shape(_)));
    assert!(aborted.state.train_losses().is_empty());
    assert_eq!(h.model.weight.get(0, 0), 0.0);
}
