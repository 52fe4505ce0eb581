//! Pipeline configuration.
//!
//! [`PipelineConfig`] holds every tunable parameter of the ingestion and
//! feature pipeline. All fields have defaults matching the flash experiment
//! (1000 Hz recordings, six flash intensities, four periocular electrodes).
//!
//! A configuration is never mutated once a run starts. To try a different
//! setting, build a new value with struct-update syntax; its
//! [`cache_key`](PipelineConfig::cache_key) changes with it.
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{PipelineError, Result};

/// A trigger-relative time window in seconds, with optional baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochWindow {
    /// Start of the window relative to the trigger (s). May be negative.
    pub tmin: f64,
    /// End of the window relative to the trigger (s), inclusive.
    pub tmax: f64,
    /// Baseline interval `(start, end)` in seconds relative to the trigger.
    /// The per-channel mean over this interval is subtracted from the epoch.
    pub baseline: Option<(f64, f64)>,
}

impl EpochWindow {
    pub fn new(tmin: f64, tmax: f64) -> Self {
        Self { tmin, tmax, baseline: None }
    }

    pub fn with_baseline(mut self, start: f64, end: f64) -> Self {
        self.baseline = Some((start, end));
        self
    }

    /// Number of samples in the window: both endpoints are included.
    ///
    /// ```
    /// use ergpipe::config::EpochWindow;
    /// assert_eq!(EpochWindow::new(-0.05, 0.15).n_samples(1000.0), 201);
    /// ```
    pub fn n_samples(&self, sfreq: f64) -> usize {
        ((self.tmax - self.tmin) * sfreq).round() as usize + 1
    }

    /// Offset of the first sample relative to the trigger sample.
    pub fn start_offset(&self, sfreq: f64) -> i64 {
        (self.tmin * sfreq).round() as i64
    }

    /// Half-open sample range inside the epoch covering `[t0, t1)` seconds
    /// relative to the trigger, clamped to the epoch length.
    pub fn sample_range(&self, t0: f64, t1: f64, sfreq: f64) -> (usize, usize) {
        let n = self.n_samples(sfreq);
        let idx = |t: f64| (((t - self.tmin) * sfreq).round().max(0.0) as usize).min(n);
        (idx(t0), idx(t1))
    }

    /// The same window widened by `margin` seconds on each side, without
    /// baseline.
    pub fn padded(&self, margin: f64) -> Self {
        Self::new(self.tmin - margin, self.tmax + margin)
    }
}

/// Length of the initial pupil window used for mean size and slope.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PupilWindow {
    Millis(f64),
    Samples(usize),
}

impl PupilWindow {
    pub fn n_samples(&self, sfreq: f64) -> usize {
        match *self {
            PupilWindow::Millis(ms) => (ms / 1000.0 * sfreq).round() as usize,
            PupilWindow::Samples(n) => n,
        }
    }
}

/// Names of the four periocular electrodes.
///
/// The lateralised ERG is `mean(upper_left, lower_left) - mean(upper_right,
/// lower_right)`; swapping any pair flips its sign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EogLayout {
    pub upper_left: String,
    pub upper_right: String,
    pub lower_left: String,
    pub lower_right: String,
}

impl EogLayout {
    /// Channel names in the fixed order `[UL, UR, LL, LR]`.
    pub fn names(&self) -> [&str; 4] {
        [&self.upper_left, &self.upper_right, &self.lower_left, &self.lower_right]
    }
}

impl Default for EogLayout {
    fn default() -> Self {
        Self {
            upper_left: "VEOGB".into(),
            upper_right: "VEOGT".into(),
            lower_left: "HEOGL".into(),
            lower_right: "HEOGR".into(),
        }
    }
}

/// Preprocessing steps applied by the signal source, in declared order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreprocStep {
    DropUnusedChannels,
    RereferenceChannels,
    CreateEogChannels,
    BandPassFilter,
    AutodetectBadChannels,
    InterpolateBads,
}

/// Re-referencing target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Reference {
    /// Per-timepoint mean of all EEG channels.
    Average,
    /// Per-timepoint mean of the named channels (e.g. mastoids).
    Channels(Vec<String>),
}

/// Options handed to [`SignalSource::read_subject`](crate::source::SignalSource::read_subject).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessConfig {
    pub steps: Vec<PreprocStep>,
    /// Channels removed by [`PreprocStep::DropUnusedChannels`].
    pub unused_channels: Vec<String>,
    pub reference: Reference,
    /// Channels typed as EOG by [`PreprocStep::CreateEogChannels`].
    pub eog_layout: EogLayout,
    /// Band-pass corners in Hz.
    pub l_freq: f32,
    pub h_freq: f32,
    /// An EEG channel is bad when its std exceeds this multiple of the
    /// median EEG std.
    pub bad_channel_ratio: f32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            steps: vec![
                PreprocStep::DropUnusedChannels,
                PreprocStep::RereferenceChannels,
                PreprocStep::CreateEogChannels,
                PreprocStep::BandPassFilter,
                PreprocStep::AutodetectBadChannels,
                PreprocStep::InterpolateBads,
            ],
            unused_channels: vec!["EXG7".into(), "EXG8".into()],
            reference: Reference::Channels(vec!["A1".into(), "A2".into()]),
            eog_layout: EogLayout::default(),
            l_freq: 0.1,
            h_freq: 40.0,
            bad_channel_ratio: 5.0,
        }
    }
}

/// Time-frequency decomposition of the EOG channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfrConfig {
    pub enabled: bool,
    /// Lowest and highest frequency (Hz), inclusive, and the grid step.
    pub fmin: f64,
    pub fmax: f64,
    pub fstep: f64,
    /// Morlet cycles per frequency is `freq / cycles_divisor`.
    pub cycles_divisor: f64,
    /// Extra signal on each side of the EOG window, cropped after the
    /// transform to remove edge effects (s).
    pub margin: f64,
    /// Keep every `decim`-th sample after cropping.
    pub decim: usize,
}

impl TfrConfig {
    /// Frequency grid `fmin, fmin + fstep, ..., fmax`.
    pub fn freqs(&self) -> Vec<f64> {
        if self.fstep <= 0.0 || self.fmax < self.fmin {
            return vec![];
        }
        let n = ((self.fmax - self.fmin) / self.fstep + 1e-9).floor() as usize + 1;
        (0..n).map(|i| self.fmin + i as f64 * self.fstep).collect()
    }
}

impl Default for TfrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fmin: 4.0,
            fmax: 30.0,
            fstep: 1.0,
            cycles_divisor: 2.0,
            margin: 0.5,
            decim: 1,
        }
    }
}

/// Configuration for the full merge pipeline.
///
/// ```
/// use ergpipe::PipelineConfig;
///
/// let cfg = PipelineConfig {
///     subjects: vec![31, 32],
///     z_threshold: 2.5,
///     ..PipelineConfig::default()
/// };
/// assert_ne!(cfg.cache_key(), PipelineConfig::default().cache_key());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Subject codes, processed in this order.
    pub subjects: Vec<u32>,
    /// Checkpoint tag. Bump it when feature extraction code changes.
    pub checkpoint: String,
    /// When true a subject code `31` means subject 3, session 1.
    pub multi_session: bool,

    /// Annotation description of a stimulus trigger, e.g. `"1"`.
    pub stimulus_trigger: String,
    /// Annotation description of a blink.
    pub blink_label: String,

    /// Window for EOG and EEG epochs.
    pub eeg_window: EpochWindow,
    /// Window for pupil and gaze epochs.
    pub pupil_window: EpochWindow,
    /// Interval (s, trigger-relative) over which the ERG amplitude is averaged.
    pub erg_window: (f64, f64),
    /// Initial pupil interval for mean size and slope.
    pub pupil_feature_window: PupilWindow,
    /// Interval (s, trigger-relative) subtracted from the baselined pupil series.
    pub pupil_baseline: (f64, f64),
    /// Pupil calibration `diameter = a + b * sqrt(area)`.
    pub pupil_calibration: (f64, f64),

    /// Occipital EEG sites, left to right. Every subject must have all of
    /// them; an empty list disables the occipital columns.
    pub occipital_channels: Vec<String>,
    /// Horizontal and vertical gaze channels. Every subject must have both;
    /// `None` disables the gaze columns.
    pub gaze_channels: Option<(String, String)>,
    /// Samples over which gaze velocity is averaged.
    pub gaze_velocity_samples: usize,
    /// Hanning smoothing length applied to gaze before differencing.
    pub gaze_smooth_len: usize,

    pub tfr: TfrConfig,
    pub preprocess: PreprocessConfig,

    /// Outlier threshold in corpus standard deviations.
    pub z_threshold: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            subjects: vec![31, 32, 41, 42, 51, 52, 61, 62, 71, 72, 81, 82, 91, 92],
            checkpoint: "02022024".into(),
            multi_session: true,
            stimulus_trigger: "1".into(),
            blink_label: "BLINK".into(),
            eeg_window: EpochWindow::new(-0.05, 0.15).with_baseline(-0.05, 0.0),
            pupil_window: EpochWindow::new(0.0, 1.5),
            erg_window: (0.040, 0.060),
            pupil_feature_window: PupilWindow::Millis(150.0),
            pupil_baseline: (0.0, 0.05),
            pupil_calibration: (-0.9904, 0.1275),
            occipital_channels: vec!["O1".into(), "Oz".into(), "O2".into()],
            gaze_channels: Some(("GazeX".into(), "GazeY".into())),
            gaze_velocity_samples: 150,
            gaze_smooth_len: 11,
            tfr: TfrConfig::default(),
            preprocess: PreprocessConfig::default(),
            z_threshold: 3.0,
        }
    }
}

impl PipelineConfig {
    /// Load a configuration from a JSON file. Missing fields are an error;
    /// start from `serde_json::to_string(&PipelineConfig::default())`.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let cfg: Self = serde_json::from_str(&text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.subjects.is_empty() {
            return Err(PipelineError::Config("no subjects configured".into()));
        }
        for (name, w) in [("eeg_window", &self.eeg_window), ("pupil_window", &self.pupil_window)] {
            if w.tmax <= w.tmin {
                return Err(PipelineError::Config(format!("{name}: tmax must exceed tmin")));
            }
        }
        if self.z_threshold <= 0.0 {
            return Err(PipelineError::Config("z_threshold must be positive".into()));
        }
        if self.tfr.enabled {
            let t = &self.tfr;
            if !(t.fmin > 0.0 && t.fstep > 0.0 && t.fmax.is_finite() && t.fmax >= t.fmin) {
                return Err(PipelineError::Config(format!(
                    "time-frequency grid {}..={} step {} must be positive and finite",
                    t.fmin, t.fmax, t.fstep
                )));
            }
            if !(t.cycles_divisor > 0.0 && t.cycles_divisor.is_finite()) {
                return Err(PipelineError::Config("cycles_divisor must be positive".into()));
            }
            if !(t.margin >= 0.0) || t.decim == 0 {
                return Err(PipelineError::Config("margin must be non-negative and decim positive".into()));
            }
        }
        Ok(())
    }

    /// Cache key covering every parameter: `"{checkpoint}-{digest}"`, where
    /// the digest is the first 8 bytes of the SHA-256 of the JSON-serialised
    /// configuration.
    pub fn cache_key(&self) -> String {
        // Serialising a plain struct of numbers and strings cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        let digest = Sha256::digest(&json);
        format!("{}-{}", self.checkpoint, hex::encode(&digest[..8]))
    }
}
