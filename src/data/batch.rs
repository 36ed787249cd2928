use crate::error::{Result, TrainError};
use crate::math::matrix::Matrix;

/// One labelled volume: a channel vector per voxel and a class per voxel.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// `voxels x channels`
    pub inputs: Matrix,
    /// One class index per voxel.
    pub mask: Vec<usize>,
}

impl Sample {
    pub fn new(inputs: Matrix, mask: Vec<usize>) -> Result<Sample> {
        if inputs.rows() != mask.len() {
            return Err(TrainError::shape(format!(
                "sample has {} voxels but {} mask labels",
                inputs.rows(),
                mask.len()
            )));
        }
        Ok(Sample { inputs, mask })
    }

    pub fn voxels(&self) -> usize {
        self.inputs.rows()
    }

    pub fn channels(&self) -> usize {
        self.inputs.cols()
    }
}

/// Inputs and targets of several samples stacked voxel-wise.
///
/// `inputs.rows() == targets.len()` always holds.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub inputs: Matrix,
    pub targets: Vec<usize>,
    /// Number of samples the batch was collated from.
    pub samples: usize,
}

impl Batch {
    pub fn new(inputs: Matrix, targets: Vec<usize>, samples: usize) -> Result<Batch> {
        if inputs.rows() != targets.len() {
            return Err(TrainError::shape(format!(
                "batch has {} input rows but {} targets",
                inputs.rows(),
                targets.len()
            )));
        }
        Ok(Batch { inputs, targets, samples })
    }

    /// Stacks samples into one batch. All samples must share the shape of
    /// the first one.
    pub fn collate<'a, I>(samples: I) -> Result<Batch>
    where
        I: IntoIterator<Item = &'a Sample>,
    {
        let mut parts = Vec::new();
        let mut targets = Vec::new();
        let mut shape = None;
        for sample in samples {
            let this = sample.inputs.shape();
            match shape {
                None => shape = Some(this),
                Some(first) if first != this => {
                    return Err(TrainError::shape(format!(
                        "sample shape {this:?} differs from {first:?} earlier in the batch"
                    )));
                }
                Some(_) => {}
            }
            parts.push(sample.inputs.clone());
            targets.extend_from_slice(&sample.mask);
        }
        let count = parts.len();
        Batch::new(Matrix::vstack(&parts)?, targets, count)
    }

    /// Number of labelled voxels, i.e. the denominator of accuracy.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
