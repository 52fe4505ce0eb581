//! A subject's continuous recording as handed over by the signal source.
//!
//! On disk a recording is a safetensors file:
//!
//! | entry          | content                                        |
//! |----------------|------------------------------------------------|
//! | `data`         | `[C, T]` F32 signal                            |
//! | `sfreq`        | `[1]` F32 sampling rate (Hz)                   |
//! | `ch_names`     | metadata, JSON array of channel names          |
//! | `ch_kinds`     | metadata, JSON array of [`ChannelKind`]        |
//! | `annotations`  | metadata, JSON array of [`Annotation`]         |
//! | `trials`       | metadata, JSON object `{column: [values...]}`  |
use std::collections::BTreeMap;
use std::path::Path;

use ndarray::{Array2, Ix2};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PipelineError, Result};
use crate::io::{StReader, StWriter};
use crate::table::{Column, DataTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelKind {
    Eeg,
    Eog,
    Pupil,
    Gaze,
    Misc,
}

/// A point event on the recording's time axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// Seconds since the first sample.
    pub onset: f64,
    pub duration: f64,
    /// Trigger code (e.g. `"1"`) or label (e.g. `"BLINK"`).
    pub description: String,
}

impl Annotation {
    pub fn new(onset: f64, description: &str) -> Self {
        Self { onset, duration: 0.0, description: description.to_string() }
    }
}

#[derive(Debug, Clone)]
pub struct Recording {
    /// `[C, T]` signal.
    pub data: Array2<f32>,
    pub sfreq: f64,
    pub ch_names: Vec<String>,
    pub ch_kinds: Vec<ChannelKind>,
    /// Names of channels flagged bad by preprocessing.
    pub bads: Vec<String>,
    pub annotations: Vec<Annotation>,
    /// One row per presented trial, in presentation order.
    pub trials: DataTable,
}

impl Recording {
    pub fn n_times(&self) -> usize {
        self.data.ncols()
    }

    pub fn channel_index(&self, name: &str) -> Option<usize> {
        self.ch_names.iter().position(|n| n == name)
    }

    /// Indices of all channels of one kind, in recording order.
    pub fn picks(&self, kind: ChannelKind) -> Vec<usize> {
        self.ch_kinds
            .iter()
            .enumerate()
            .filter(|&(_, &k)| k == kind)
            .map(|(i, _)| i)
            .collect()
    }

    /// Sample indices of every annotation with the given description, in
    /// onset order.
    pub fn event_samples(&self, description: &str) -> Vec<i64> {
        let mut onsets: Vec<f64> = self
            .annotations
            .iter()
            .filter(|a| a.description == description)
            .map(|a| a.onset)
            .collect();
        onsets.sort_by(f64::total_cmp);
        onsets.iter().map(|&t| (t * self.sfreq).round() as i64).collect()
    }

    /// Keep only the channels at `keep`, in that order.
    pub fn retain_channels(&mut self, keep: &[usize]) {
        self.data = self.data.select(ndarray::Axis(0), keep);
        self.ch_names = keep.iter().map(|&i| self.ch_names[i].clone()).collect();
        self.ch_kinds = keep.iter().map(|&i| self.ch_kinds[i]).collect();
        let names = &self.ch_names;
        self.bads.retain(|b| names.contains(b));
    }

    pub fn validate(&self) -> Result<()> {
        let n_ch = self.data.nrows();
        if self.ch_names.len() != n_ch || self.ch_kinds.len() != n_ch {
            return Err(PipelineError::Format(format!(
                "{n_ch} data rows but {} names and {} kinds",
                self.ch_names.len(),
                self.ch_kinds.len()
            )));
        }
        if !(self.sfreq > 0.0) {
            return Err(PipelineError::Format(format!("bad sampling rate {}", self.sfreq)));
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let r = StReader::open(path)?;
        let data = r
            .f32("data")?
            .into_dimensionality::<Ix2>()
            .map_err(|e| PipelineError::Format(format!("data: {e}")))?;
        let sfreq = r
            .f32("sfreq")?
            .iter()
            .next()
            .copied()
            .ok_or_else(|| PipelineError::Format("empty sfreq".into()))? as f64;
        let trials: BTreeMap<String, Vec<Value>> = r.metadata_json("trials")?;
        let rec = Recording {
            data,
            sfreq,
            ch_names: r.metadata_json("ch_names")?,
            ch_kinds: r.metadata_json("ch_kinds")?,
            bads: vec![],
            annotations: r.metadata_json("annotations")?,
            trials: trials_from_json(trials)?,
        };
        rec.validate()?;
        Ok(rec)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut w = StWriter::new();
        w.add_f32_nd("data", &self.data.clone().into_dyn());
        w.add_f32("sfreq", &[self.sfreq as f32], &[1]);
        w.set_metadata_json("ch_names", &self.ch_names)?;
        w.set_metadata_json("ch_kinds", &self.ch_kinds)?;
        w.set_metadata_json("annotations", &self.annotations)?;
        w.set_metadata_json("trials", &trials_to_json(&self.trials)?)?;
        w.write(path)
    }
}

/// Column-oriented JSON into a table. A column of integers becomes `Int`,
/// any other numbers `Float`, strings `Text`; `null` is a missing float.
fn trials_from_json(columns: BTreeMap<String, Vec<Value>>) -> Result<DataTable> {
    let mut table = DataTable::new();
    for (name, values) in columns {
        let column = if values.iter().all(|v| v.is_i64()) {
            Column::Int(values.iter().filter_map(Value::as_i64).collect())
        } else if values.iter().all(|v| v.is_number() || v.is_null()) {
            Column::Float(values.iter().map(|v| v.as_f64().unwrap_or(f64::NAN)).collect())
        } else if values.iter().all(Value::is_string) {
            Column::Text(values.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        } else {
            return Err(PipelineError::Format(format!("trial column {name} has mixed types")));
        };
        table.insert(&name, column)?;
    }
    Ok(table)
}

fn trials_to_json(table: &DataTable) -> Result<BTreeMap<String, Vec<Value>>> {
    let mut out = BTreeMap::new();
    for (name, column) in table.columns() {
        let values: Vec<Value> = match column {
            Column::Int(v) => v.iter().map(|&x| Value::from(x)).collect(),
            Column::Float(v) => v
                .iter()
                .map(|&x| if x.is_nan() { Value::Null } else { Value::from(x) })
                .collect(),
            Column::Text(v) => v.iter().map(|s| Value::from(s.as_str())).collect(),
            Column::Series(_) => {
                return Err(PipelineError::Format(format!("trial column {name} is a series")))
            }
        };
        out.insert(name.to_string(), values);
    }
    Ok(out)
}
