//! # ergpipe: ERG, EEG and pupil trial tables
//!
//! `ergpipe` turns per-subject recordings of a flash experiment (periocular
//! ERG electrodes, scalp EEG, eye-tracker pupil and gaze) into one
//! analysis-ready corpus table: one row per trial, scalar features and
//! fixed-length epoch series side by side, merged across subjects and
//! quality-filtered.
//!
//! ## Pipeline overview
//!
//! ```text
//! sub-<id>.safetensors
//!   │
//!   ├─ source::SafetensorsSource   load + preprocess (drop, reference,
//!   │                              EOG typing, band-pass, bad channels)
//!   ├─ blink::align_blinks         first blink after each flash
//!   ├─ epoch                       [-50, 150] ms EOG/EEG, [0, 1500] ms pupil
//!   ├─ features                    ERG derivations, pupil mm/mean/slope, gaze
//!   ├─ tfr                         Morlet power 4-30 Hz, per-band z-score
//!   │        │
//!   │        └─→ subject table
//!   │
//!   ├─ merge                       concatenate, corpus z, filter, recode
//!   └─ cache                       <cache>/<checkpoint>-<digest>.safetensors
//!            │
//!            └─→ corpus DataTable
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use ergpipe::{get_merged_data, Cache, PipelineConfig, SafetensorsSource};
//!
//! let source = SafetensorsSource::new("data");
//! let cache  = Cache::new(".cache").unwrap();
//! let cfg    = PipelineConfig { subjects: vec![31, 32], ..PipelineConfig::default() };
//!
//! let dm = get_merged_data(&source, &cache, &cfg).unwrap();
//! println!("{} trials", dm.len());
//! let z = dm.floats("z_pupil").unwrap();
//! ```
//!
//! ## Running individual steps
//!
//! ```no_run
//! use ergpipe::{build_subject_table, merge, PipelineConfig, SafetensorsSource};
//!
//! let source = SafetensorsSource::new("data");
//! let cfg = PipelineConfig::default();
//!
//! let mut sdm = build_subject_table(&source, 31, &cfg).unwrap();
//! merge::add_corpus_zscores(&mut sdm).unwrap();
//! merge::add_pupil_bins(&mut sdm, 3).unwrap();
//! let no_early_blinks = merge::filter_rows(&sdm, &[merge::blink_exclusion(0.5)]).unwrap();
//! ```

pub mod blink;
pub mod cache;
pub mod config;
pub mod epoch;
pub mod error;
pub mod features;
pub mod filter;
pub mod io;
pub mod merge;
pub mod normalize;
pub mod preprocess;
pub mod recording;
pub mod reference;
pub mod source;
pub mod subject;
pub mod table;
pub mod tfr;

// ── Crate-root re-exports ─────────────────────────────────────────────────

pub use cache::Cache;
pub use config::{EpochWindow, PipelineConfig, PreprocStep, PreprocessConfig, TfrConfig};
pub use error::{PipelineError, Result};
pub use merge::{get_merged_data, merge_and_filter, Predicate};
pub use recording::{Annotation, ChannelKind, Recording};
pub use source::{SafetensorsSource, SignalSource};
pub use subject::build_subject_table;
pub use table::{col, Column, DataTable};
