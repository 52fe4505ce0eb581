//! Error taxonomy for the pipeline.
//!
//! Adapter and cache failures terminate a run. [`PipelineError::DegenerateEpoch`]
//! never leaves a subject build: the offending trial is dropped instead.
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("subject {subject}: data unavailable: {reason}")]
    DataUnavailable { subject: u32, reason: String },

    #[error("trial {trial}: epoch [{start}, {start} + {len}) exceeds {available} samples")]
    DegenerateEpoch {
        trial: usize,
        start: i64,
        len: usize,
        available: usize,
    },

    #[error("missing column: {column}")]
    MissingFeature { column: String },

    #[error("subject {subject} failed during {step}: {source}")]
    Subject {
        subject: u32,
        step: &'static str,
        #[source]
        source: Box<PipelineError>,
    },

    #[error("cache entry {key}: {reason}")]
    Cache { key: String, reason: String },

    #[error("malformed data: {0}")]
    Format(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn missing(column: &str) -> Self {
        PipelineError::MissingFeature { column: column.to_string() }
    }

    pub fn unavailable(subject: u32, reason: impl Into<String>) -> Self {
        PipelineError::DataUnavailable { subject, reason: reason.into() }
    }

    /// Attach the subject and pipeline step to an error, unless it already
    /// names the subject.
    pub fn in_subject(self, subject: u32, step: &'static str) -> Self {
        match self {
            e @ (PipelineError::Subject { .. } | PipelineError::DataUnavailable { .. }) => e,
            e => PipelineError::Subject { subject, step, source: Box::new(e) },
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
