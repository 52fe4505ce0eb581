//! Column-oriented trial table.
//!
//! One row per trial. Scalar columns hold integers, floats (NaN marks a
//! missing value) or text; series columns hold an `f32` array whose first
//! axis is the row, e.g. `[trials, channels, samples]` for EOG epochs.
//!
//! The column names in [`col`] form the schema that downstream analysis
//! depends on. Renaming a column, or changing its unit or sign, breaks every
//! consumer.
use ndarray::{concatenate, ArrayD, Axis};

use crate::error::{PipelineError, Result};

/// Column names of the subject and corpus tables.
pub mod col {
    pub const SUBJECT_NR: &str = "subject_nr";
    pub const SESSION_NR: &str = "session_nr";
    pub const BLINK_LATENCY: &str = "blink_latency";
    pub const HAS_BLINK: &str = "has_blink";

    pub const EOG: &str = "eog";
    pub const ERP: &str = "erp";
    pub const ERG: &str = "erg";
    pub const ERG_UPPER: &str = "erg_upper";
    pub const ERG_LOWER: &str = "erg_lower";
    pub const LATERG: &str = "laterg";
    pub const ERP_OCCIPITAL: &str = "erp_occipital";
    pub const LATERP_OCCIPITAL: &str = "laterp_occipital";
    pub const EOG_TFR: &str = "eog_tfr";
    pub const MEAN_ERG: &str = "mean_erg";
    pub const Z_ERG: &str = "z_erg";

    pub const PUPIL: &str = "pupil";
    pub const BL_PUPIL: &str = "bl_pupil";
    pub const MEAN_PUPIL: &str = "mean_pupil";
    pub const MEAN_PUPIL_AREA: &str = "mean_pupil_area";
    pub const PUPIL_SLOPE: &str = "pupil_slope";
    pub const PUPIL_DILATION: &str = "pupil_dilation";
    pub const Z_PUPIL: &str = "z_pupil";
    pub const Z_PUPIL_SLOPE: &str = "z_pupil_slope";
    pub const BIN_PUPIL: &str = "bin_pupil";
    pub const BIN_PUPIL_MM: &str = "bin_pupil_mm";

    pub const GAZE_X: &str = "gaze_x";
    pub const GAZE_Y: &str = "gaze_y";
    pub const MEAN_GAZE_VEL: &str = "mean_gaze_vel";

    pub const INTENSITY: &str = "intensity";
    pub const BACKGROUND_LEVEL: &str = "backgroundLevel";
    pub const INTENSITY_CDM2: &str = "intensity_cdm2";
    pub const INTENSITY_ORD: &str = "intensity_ord";
    pub const INFLUX_CDM2: &str = "influx_cdm2";
    pub const TARGET: &str = "target";
    pub const COUNT_TRIAL_SEQUENCE: &str = "count_trial_sequence";
    pub const PREVIOUS_INTENSITY_CDM2: &str = "previous_intensity_cdm2";
    pub const TRIAL_DIFF: &str = "trial_diff";
}

#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Int(Vec<i64>),
    Float(Vec<f64>),
    Text(Vec<String>),
    Series(ArrayD<f32>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Int(v) => v.len(),
            Column::Float(v) => v.len(),
            Column::Text(v) => v.len(),
            Column::Series(a) => a.shape().first().copied().unwrap_or(0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Column::Int(_) => "int",
            Column::Float(_) => "float",
            Column::Text(_) => "text",
            Column::Series(_) => "series",
        }
    }

    fn select(&self, rows: &[usize]) -> Column {
        match self {
            Column::Int(v) => Column::Int(rows.iter().map(|&r| v[r]).collect()),
            Column::Float(v) => Column::Float(rows.iter().map(|&r| v[r]).collect()),
            Column::Text(v) => Column::Text(rows.iter().map(|&r| v[r].clone()).collect()),
            Column::Series(a) => Column::Series(a.select(Axis(0), rows)),
        }
    }

    /// Extend with the rows of `other`. Mixing integers and floats yields a
    /// float column whichever side comes first.
    fn append(&mut self, other: &Column, name: &str) -> Result<()> {
        if let (Column::Int(a), Column::Float(_)) = (&*self, other) {
            let promoted = Column::Float(a.iter().map(|&v| v as f64).collect());
            *self = promoted;
        }
        match (self, other) {
            (Column::Int(a), Column::Int(b)) => a.extend_from_slice(b),
            (Column::Float(a), Column::Float(b)) => a.extend_from_slice(b),
            (Column::Float(a), Column::Int(b)) => a.extend(b.iter().map(|&v| v as f64)),
            (Column::Text(a), Column::Text(b)) => a.extend(b.iter().cloned()),
            (Column::Series(a), Column::Series(b)) => {
                if a.shape()[1..] != b.shape()[1..] {
                    return Err(PipelineError::Format(format!(
                        "column {name}: series shape {:?} cannot extend {:?}",
                        b.shape(),
                        a.shape()
                    )));
                }
                let joined = concatenate(Axis(0), &[a.view(), b.view()])
                    .map_err(|e| PipelineError::Format(format!("column {name}: {e}")))?;
                *a = joined;
            }
            (a, b) => {
                return Err(PipelineError::Format(format!(
                    "column {name}: cannot append {} to {}",
                    b.kind(),
                    a.kind()
                )))
            }
        }
        Ok(())
    }
}

/// An ordered set of equal-length columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataTable {
    columns: Vec<(String, Column)>,
    n_rows: usize,
}

impl DataTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.n_rows
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows == 0
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.columns.iter().map(|(n, c)| (n.as_str(), c))
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, c)| c)
    }

    /// Insert or replace a column. The first column fixes the row count.
    pub fn insert(&mut self, name: &str, column: Column) -> Result<()> {
        if self.columns.is_empty() {
            self.n_rows = column.len();
        } else if column.len() != self.n_rows {
            return Err(PipelineError::Format(format!(
                "column {name} has {} rows, table has {}",
                column.len(),
                self.n_rows
            )));
        }
        match self.columns.iter_mut().find(|(n, _)| n == name) {
            Some((_, c)) => *c = column,
            None => self.columns.push((name.to_string(), column)),
        }
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<Column> {
        let idx = self.columns.iter().position(|(n, _)| n == name)?;
        let (_, c) = self.columns.remove(idx);
        if self.columns.is_empty() {
            self.n_rows = 0;
        }
        Some(c)
    }

    fn require(&self, name: &str) -> Result<&Column> {
        self.get(name).ok_or_else(|| PipelineError::missing(name))
    }

    /// Numeric column as floats. Integer columns are converted.
    pub fn floats(&self, name: &str) -> Result<Vec<f64>> {
        match self.require(name)? {
            Column::Float(v) => Ok(v.clone()),
            Column::Int(v) => Ok(v.iter().map(|&x| x as f64).collect()),
            other => Err(PipelineError::Format(format!(
                "column {name} is {}, expected a number",
                other.kind()
            ))),
        }
    }

    pub fn ints(&self, name: &str) -> Result<&[i64]> {
        match self.require(name)? {
            Column::Int(v) => Ok(v),
            other => Err(PipelineError::Format(format!(
                "column {name} is {}, expected int",
                other.kind()
            ))),
        }
    }

    pub fn texts(&self, name: &str) -> Result<&[String]> {
        match self.require(name)? {
            Column::Text(v) => Ok(v),
            other => Err(PipelineError::Format(format!(
                "column {name} is {}, expected text",
                other.kind()
            ))),
        }
    }

    pub fn series(&self, name: &str) -> Result<&ArrayD<f32>> {
        match self.require(name)? {
            Column::Series(a) => Ok(a),
            other => Err(PipelineError::Format(format!(
                "column {name} is {}, expected series",
                other.kind()
            ))),
        }
    }

    /// New table with the given rows, in the given order.
    pub fn select(&self, rows: &[usize]) -> DataTable {
        DataTable {
            columns: self.columns.iter().map(|(n, c)| (n.clone(), c.select(rows))).collect(),
            n_rows: rows.len(),
        }
    }

    /// New table with the rows where `mask` is true.
    pub fn filter(&self, mask: &[bool]) -> Result<DataTable> {
        if mask.len() != self.n_rows {
            return Err(PipelineError::Format(format!(
                "mask has {} entries, table has {} rows",
                mask.len(),
                self.n_rows
            )));
        }
        let rows: Vec<usize> = mask.iter().enumerate().filter(|&(_, &m)| m).map(|(i, _)| i).collect();
        Ok(self.select(&rows))
    }

    /// Append the rows of `other`. Both tables must have the same column
    /// names; an empty table adopts `other` as is.
    pub fn append(&mut self, other: DataTable) -> Result<()> {
        if self.columns.is_empty() {
            *self = other;
            return Ok(());
        }
        let mine: Vec<&str> = self.column_names().collect();
        let theirs: Vec<&str> = other.column_names().collect();
        if mine.len() != theirs.len() || theirs.iter().any(|n| !self.has(n)) {
            return Err(PipelineError::Format(format!(
                "cannot append table with columns {theirs:?} to {mine:?}"
            )));
        }
        for (name, col) in self.columns.iter_mut() {
            if let Some(src) = other.get(name) {
                col.append(src, name)?;
            }
        }
        self.n_rows += other.n_rows;
        Ok(())
    }
}
