//! Where recordings come from.
//!
//! The feature builder only sees the [`SignalSource`] trait, so tests and
//! benchmarks can feed synthetic recordings without touching the disk.
use std::path::{Path, PathBuf};

use crate::config::PreprocessConfig;
use crate::error::{PipelineError, Result};
use crate::preprocess;
use crate::recording::Recording;

pub trait SignalSource {
    /// The preprocessed recording of one subject, with its trial metadata.
    ///
    /// A subject that cannot be read fails with
    /// [`PipelineError::DataUnavailable`].
    fn read_subject(&self, subject: u32, options: &PreprocessConfig) -> Result<Recording>;
}

/// Recordings stored as `<dir>/sub-<id>.safetensors`.
#[derive(Debug, Clone)]
pub struct SafetensorsSource {
    dir: PathBuf,
}

impl SafetensorsSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, subject: u32) -> PathBuf {
        self.dir.join(format!("sub-{subject}.safetensors"))
    }
}

impl SignalSource for SafetensorsSource {
    fn read_subject(&self, subject: u32, options: &PreprocessConfig) -> Result<Recording> {
        let path = self.path_for(subject);
        if !path.is_file() {
            return Err(PipelineError::unavailable(subject, format!("{} not found", path.display())));
        }
        log::info!("reading subject {subject} from {}", path.display());
        let mut rec = Recording::load(&path)
            .map_err(|e| PipelineError::unavailable(subject, format!("{}: {e}", path.display())))?;
        preprocess::apply(&mut rec, options)?;
        Ok(rec)
    }
}
