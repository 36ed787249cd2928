use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::data::batch::Sample;
use crate::error::{Result, TrainError};
use crate::math::matrix::Matrix;

/// Generator of multi-channel square volumes with disk-shaped regions.
///
/// Every voxel outside all disks is class 0; each disk paints one of the
/// remaining classes. Channel `c` reads high where the voxel's class is
/// `c % channels`, plus uniform noise, so classes are separable per voxel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticVolumes {
    pub samples: usize,
    pub side: usize,
    pub channels: usize,
    pub classes: usize,
    pub noise: f64,
    pub seed: Option<u64>,
}

impl Default for SyntheticVolumes {
    fn default() -> Self {
        SyntheticVolumes { samples: 64, side: 16, channels: 4, classes: 4, noise: 0.3, seed: None }
    }
}

impl SyntheticVolumes {
    pub fn generate(&self) -> Result<Vec<Sample>> {
        if self.side == 0 || self.channels == 0 || self.classes < 2 {
            return Err(TrainError::config(format!(
                "synthetic volumes need side >= 1, channels >= 1 and classes >= 2 (got {self:?})"
            )));
        }
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        (0..self.samples).map(|_| self.volume(&mut rng)).collect()
    }

    fn volume(&self, rng: &mut StdRng) -> Result<Sample> {
        let side = self.side as f64;
        let disks: Vec<(f64, f64, f64, usize)> = (1..self.classes)
            .map(|class| {
                let cx = rng.gen_range(0.0..side);
                let cy = rng.gen_range(0.0..side);
                let radius = rng.gen_range(side / 6.0..=side / 3.0);
                (cx, cy, radius, class)
            })
            .collect();

        let voxels = self.side * self.side;
        let mut mask = Vec::with_capacity(voxels);
        let mut data = Vec::with_capacity(voxels * self.channels);
        for y in 0..self.side {
            for x in 0..self.side {
                let (px, py) = (x as f64 + 0.5, y as f64 + 0.5);
                let label = disks
                    .iter()
                    .filter(|(cx, cy, r, _)| (px - cx).powi(2) + (py - cy).powi(2) <= r * r)
                    .last()
                    .map_or(0, |d| d.3);
                mask.push(label);
                for c in 0..self.channels {
                    let signal = if label % self.channels == c { 1.0 } else { 0.0 };
                    let jitter = if self.noise > 0.0 { rng.gen_range(-self.noise..self.noise) } else { 0.0 };
                    data.push(signal + jitter);
                }
            }
        }
        Sample::new(Matrix::from_vec(voxels, self.channels, data)?, mask)
    }
}
