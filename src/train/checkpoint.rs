//! Persisting trained parameters at the end of a run.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, TrainError};
use crate::network::model::ModelState;

/// File name of the checkpoint inside a dataset's directory.
pub const CHECKPOINT_FILE: &str = "model.json";

/// Writes one checkpoint per dataset under `<root>/<dataset_id>/`.
///
/// There is no versioning: saving again replaces the previous file.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    root: PathBuf,
}

impl CheckpointManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, dataset_id: &str) -> PathBuf {
        self.root.join(dataset_id).join(CHECKPOINT_FILE)
    }

    /// Serializes `state` to the dataset's checkpoint path, creating the
    /// directory first. The file is written beside the target and renamed
    /// over it, so a failed save leaves the previous checkpoint intact.
    pub fn save(&self, state: &ModelState, dataset_id: &str) -> Result<PathBuf> {
        let dir = self.root.join(dataset_id);
        std::fs::create_dir_all(&dir).map_err(|source| TrainError::Checkpoint {
            path: dir.clone(),
            source,
        })?;

        let path = dir.join(CHECKPOINT_FILE);
        write_json(&path, state).map_err(|source| TrainError::Checkpoint {
            path: path.clone(),
            source,
        })?;

        tracing::info!(
            path = %path.display(),
            tensors = state.tensors.len(),
            parameters = state.parameter_count(),
            "checkpoint saved"
        );
        Ok(path)
    }

    /// Reads back the checkpoint written by `save` for `dataset_id`.
    pub fn load(&self, dataset_id: &str) -> Result<ModelState> {
        let path = self.path_for(dataset_id);
        read_json(&path).map_err(|source| TrainError::Checkpoint { path, source })
    }
}

fn write_json(path: &Path, state: &ModelState) -> std::io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    let written = File::create(&tmp).and_then(|file| {
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, state)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        writer.flush()?;
        writer.get_ref().sync_all()
    });
    if let Err(e) = written {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }
    std::fs::rename(&tmp, path)
}

fn read_json(path: &Path) -> std::io::Result<ModelState> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}
