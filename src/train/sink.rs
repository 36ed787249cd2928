//! Scalar metric sinks: where the loop reports its per-epoch series.
//!
//! A sink must never fail or block the run; sinks that do I/O log their own
//! failures and carry on.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Serialize, Deserialize};

/// Mean training loss of an epoch.
pub const TAG_TRAIN_LOSS: &str = "Loss/train";
/// Mean validation loss of an epoch.
pub const TAG_VAL_LOSS: &str = "Loss/test";
/// Validation accuracy of an epoch.
pub const TAG_VAL_ACCURACY: &str = "ACC/test";

/// Receiver of `(tag, value, epoch)` scalars.
pub trait MetricsSink {
    fn add_scalar(&mut self, tag: &str, value: f64, step: usize);

    fn flush(&mut self) {}
}

/// Discards everything.
impl MetricsSink for () {
    fn add_scalar(&mut self, _tag: &str, _value: f64, _step: usize) {}
}

/// One reported scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scalar {
    pub tag: String,
    pub value: f64,
    pub step: usize,
}

/// Keeps every scalar in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub scalars: Vec<Scalar>,
}

impl MemorySink {
    /// `(step, value)` pairs reported under `tag`, in report order.
    pub fn series(&self, tag: &str) -> Vec<(usize, f64)> {
        self.scalars
            .iter()
            .filter(|s| s.tag == tag)
            .map(|s| (s.step, s.value))
            .collect()
    }
}

impl MetricsSink for MemorySink {
    fn add_scalar(&mut self, tag: &str, value: f64, step: usize) {
        self.scalars.push(Scalar { tag: tag.to_string(), value, step });
    }
}

impl<S: MetricsSink + ?Sized> MetricsSink for &mut S {
    fn add_scalar(&mut self, tag: &str, value: f64, step: usize) {
        (**self).add_scalar(tag, value, step);
    }

    fn flush(&mut self) {
        (**self).flush();
    }
}

impl<S: MetricsSink + ?Sized> MetricsSink for Box<S> {
    fn add_scalar(&mut self, tag: &str, value: f64, step: usize) {
        (**self).add_scalar(tag, value, step);
    }

    fn flush(&mut self) {
        (**self).flush();
    }
}

/// Appends scalars as JSON lines to `<dir>/scalars.jsonl`.
///
/// The file is opened lazily on the first scalar. After the first I/O
/// failure the sink logs a warning and drops further writes.
pub struct JsonlSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    failed: bool,
}

impl JsonlSink {
    pub const FILE_NAME: &'static str = "scalars.jsonl";

    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(Self::FILE_NAME),
            writer: None,
            failed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&mut self, scalar: &Scalar) -> std::io::Result<()> {
        if self.writer.is_none() {
            if let Some(dir) = self.path.parent() {
                std::fs::create_dir_all(dir)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
            self.writer = Some(BufWriter::new(file));
        }
        if let Some(writer) = self.writer.as_mut() {
            serde_json::to_writer(&mut *writer, scalar)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
            writer.write_all(b"\n")?;
        }
        Ok(())
    }
}

impl MetricsSink for JsonlSink {
    fn add_scalar(&mut self, tag: &str, value: f64, step: usize) {
        if self.failed {
            return;
        }
        let scalar = Scalar { tag: tag.to_string(), value, step };
        if let Err(e) = self.write(&scalar) {
            tracing::warn!(path = %self.path.display(), error = %e, "metrics sink disabled");
            self.failed = true;
            self.writer = None;
        }
    }

    fn flush(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writer.flush() {
                tracing::warn!(path = %self.path.display(), error = %e, "metrics flush failed");
            }
        }
    }
}

impl Drop for JsonlSink {
    fn drop(&mut self) {
        self.flush();
    }
}
