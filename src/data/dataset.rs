use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::data::batch::{Batch, Sample};
use crate::error::{Result, TrainError};

/// Source of training and validation batches for a run.
///
/// Each call starts a fresh pass; batches are produced lazily and may fail
/// individually (e.g. a sample with an unexpected shape).
pub trait DatasetProvider {
    fn train_batches(&mut self) -> Box<dyn Iterator<Item = Result<Batch>> + '_>;

    fn val_batches(&mut self) -> Box<dyn Iterator<Item = Result<Batch>> + '_>;
}

/// How `SplitDataset` splits and batches its samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitOptions {
    pub batch_size: usize,
    /// Fraction of samples held out for validation, in `[0, 1)`.
    pub validation_split: f64,
    pub seed: Option<u64>,
}

/// In-memory samples randomly split into a training and a validation subset.
///
/// The training pass reshuffles every epoch and drops the last incomplete
/// batch; the validation pass keeps sample order and keeps the last batch.
pub struct SplitDataset {
    samples: Vec<Sample>,
    train_idx: Vec<usize>,
    val_idx: Vec<usize>,
    batch_size: usize,
    rng: StdRng,
}

impl SplitDataset {
    pub fn new(samples: Vec<Sample>, options: SplitOptions) -> Result<SplitDataset> {
        if options.batch_size == 0 {
            return Err(TrainError::config("batch_size must be at least 1"));
        }
        if !(options.validation_split > 0.0 && options.validation_split < 1.0) {
            return Err(TrainError::config(format!(
                "validation_split must be in (0, 1), got {}",
                options.validation_split
            )));
        }
        if let Some(first) = samples.first() {
            let shape = first.inputs.shape();
            if let Some((i, s)) = samples.iter().enumerate().find(|(_, s)| s.inputs.shape() != shape) {
                return Err(TrainError::shape(format!(
                    "sample {i} has shape {:?}, sample 0 has {shape:?}",
                    s.inputs.shape()
                )));
            }
        }

        let mut rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut indices: Vec<usize> = (0..samples.len()).collect();
        indices.shuffle(&mut rng);

        let val_count = (samples.len() as f64 * options.validation_split).floor() as usize;
        if val_count == 0 {
            return Err(TrainError::config(format!(
                "validation_split {} of {} samples leaves no validation samples",
                options.validation_split,
                samples.len()
            )));
        }
        let val_idx = indices.split_off(samples.len() - val_count);
        if indices.len() < options.batch_size {
            return Err(TrainError::config(format!(
                "{} training samples cannot fill one batch of {}",
                indices.len(),
                options.batch_size
            )));
        }

        Ok(SplitDataset {
            samples,
            train_idx: indices,
            val_idx,
            batch_size: options.batch_size,
            rng,
        })
    }

    pub fn train_len(&self) -> usize {
        self.train_idx.len()
    }

    pub fn val_len(&self) -> usize {
        self.val_idx.len()
    }

    /// `(voxels, channels)` of every sample, if there are any.
    pub fn sample_shape(&self) -> Option<(usize, usize)> {
        self.samples.first().map(|s| s.inputs.shape())
    }
}

impl DatasetProvider for SplitDataset {
    fn train_batches(&mut self) -> Box<dyn Iterator<Item = Result<Batch>> + '_> {
        self.train_idx.shuffle(&mut self.rng);
        let samples = &self.samples;
        Box::new(
            self.train_idx
                .chunks_exact(self.batch_size)
                .map(move |chunk| Batch::collate(chunk.iter().map(|&i| &samples[i]))),
        )
    }

    fn val_batches(&mut self) -> Box<dyn Iterator<Item = Result<Batch>> + '_> {
        let samples = &self.samples;
        Box::new(
            self.val_idx
                .chunks(self.batch_size)
                .map(move |chunk| Batch::collate(chunk.iter().map(|&i| &samples[i]))),
        )
    }
}
