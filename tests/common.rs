//! Shared helpers: synthetic recordings and in-memory sources.
#![allow(dead_code)]
use std::cell::Cell;
use std::collections::HashMap;

use ergpipe::{
    Annotation, ChannelKind, Column, DataTable, PipelineConfig, PipelineError, PreprocessConfig,
    Recording, Result, SignalSource, TfrConfig,
};
use ndarray::Array2;

pub const SFREQ: f64 = 1000.0;

pub const CHANNELS: [(&str, ChannelKind); 10] = [
    ("O1", ChannelKind::Eeg),
    ("Oz", ChannelKind::Eeg),
    ("O2", ChannelKind::Eeg),
    ("VEOGB", ChannelKind::Eog),
    ("VEOGT", ChannelKind::Eog),
    ("HEOGL", ChannelKind::Eog),
    ("HEOGR", ChannelKind::Eog),
    ("PupilSize", ChannelKind::Pupil),
    ("GazeX", ChannelKind::Gaze),
    ("GazeY", ChannelKind::Gaze),
];

/// Layout of one synthetic subject.
#[derive(Debug, Clone)]
pub struct Protocol {
    /// Flash onsets (s).
    pub onsets: Vec<f64>,
    /// Blink onsets (s).
    pub blinks: Vec<f64>,
    pub intensity: Vec<f64>,
    /// Pupil area held from each onset to the next.
    pub pupil_area: Vec<f32>,
    /// 200 ms step on the periocular channels right after each flash: left
    /// sites jump by `amp`, right sites by `amp / 2`.
    pub erg_amp: Vec<f32>,
    /// Recording length (s).
    pub duration: f64,
}

impl Protocol {
    /// `n` flashes two seconds apart, cycling through the six intensities.
    pub fn regular(n: usize) -> Self {
        let levels = [-1.0, -0.51, -0.17, 0.2, 0.59, 1.0];
        Self {
            onsets: (0..n).map(|i| 1.0 + 2.0 * i as f64).collect(),
            blinks: vec![],
            intensity: (0..n).map(|i| levels[i % levels.len()]).collect(),
            pupil_area: (0..n).map(|i| 400.0 + 10.0 * i as f32).collect(),
            erg_amp: (0..n).map(|i| 1.0 + 0.1 * (i % 5) as f32).collect(),
            duration: 2.0 * n as f64 + 1.0,
        }
    }
}

/// Index of the flash in effect at sample `t`, if any.
fn current_trial(onsets: &[usize], t: usize) -> Option<usize> {
    onsets.iter().rposition(|&o| o <= t)
}

pub fn recording(protocol: &Protocol) -> Recording {
    let n_times = (protocol.duration * SFREQ).round() as usize;
    let onsets: Vec<usize> = protocol.onsets.iter().map(|&t| (t * SFREQ).round() as usize).collect();
    let data = Array2::from_shape_fn((CHANNELS.len(), n_times), |(c, t)| {
        let trial = current_trial(&onsets, t);
        let step = match trial {
            Some(k) if t > onsets[k] && t <= onsets[k] + 200 => protocol.erg_amp[k],
            _ => 0.0,
        };
        match c {
            0..=2 => 0.1 * ((t as f32) * 0.05 + c as f32).sin(),
            3 | 5 => step,
            4 | 6 => step / 2.0,
            7 => protocol.pupil_area[trial.unwrap_or(0)],
            8 => t as f32 / SFREQ as f32,
            _ => 0.0,
        }
    });

    let mut annotations: Vec<Annotation> = protocol.onsets.iter().map(|&t| Annotation::new(t, "1")).collect();
    annotations.extend(protocol.blinks.iter().map(|&t| Annotation::new(t, "BLINK")));
    annotations.sort_by(|a, b| a.onset.total_cmp(&b.onset));

    let n = protocol.onsets.len();
    let mut trials = DataTable::new();
    trials.insert("intensity", Column::Float(protocol.intensity.clone())).unwrap();
    trials.insert("count_trial_sequence", Column::Int((1..=n as i64).collect())).unwrap();

    Recording {
        data,
        sfreq: SFREQ,
        ch_names: CHANNELS.iter().map(|(n, _)| n.to_string()).collect(),
        ch_kinds: CHANNELS.iter().map(|&(_, k)| k).collect(),
        bads: vec![],
        annotations,
        trials,
    }
}

/// Already preprocessed recordings keyed by subject code, with a call counter.
#[derive(Default)]
pub struct InMemorySource {
    pub subjects: HashMap<u32, Recording>,
    pub calls: Cell<usize>,
}

impl InMemorySource {
    pub fn with(subjects: impl IntoIterator<Item = (u32, Recording)>) -> Self {
        Self { subjects: subjects.into_iter().collect(), calls: Cell::new(0) }
    }
}

impl SignalSource for InMemorySource {
    fn read_subject(&self, subject: u32, _options: &PreprocessConfig) -> Result<Recording> {
        self.calls.set(self.calls.get() + 1);
        self.subjects
            .get(&subject)
            .cloned()
            .ok_or_else(|| PipelineError::unavailable(subject, "not in memory"))
    }
}

/// Defaults with the given subjects and no time-frequency step.
pub fn fast_config(subjects: &[u32]) -> PipelineConfig {
    PipelineConfig {
        subjects: subjects.to_vec(),
        tfr: TfrConfig { enabled: false, ..TfrConfig::default() },
        ..PipelineConfig::default()
    }
}

/// Column-by-column equality where NaN equals NaN.
pub fn assert_tables_eq(a: &DataTable, b: &DataTable) {
    let names_a: Vec<&str> = a.column_names().collect();
    let names_b: Vec<&str> = b.column_names().collect();
    assert_eq!(names_a, names_b);
    assert_eq!(a.len(), b.len());
    let same = |x: f64, y: f64| x == y || (x.is_nan() && y.is_nan());
    for ((name, ca), (_, cb)) in a.columns().zip(b.columns()) {
        match (ca, cb) {
            (Column::Float(x), Column::Float(y)) => {
                assert!(x.iter().zip(y).all(|(&p, &q)| same(p, q)), "column {name}")
            }
            (Column::Series(x), Column::Series(y)) => {
                assert_eq!(x.shape(), y.shape(), "column {name}");
                assert!(
                    x.iter().zip(y).all(|(&p, &q)| same(p as f64, q as f64)),
                    "column {name}"
                );
            }
            (x, y) => assert_eq!(x, y, "column {name}"),
        }
    }
}
