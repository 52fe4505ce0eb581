//! Corpus merge, outlier filter and condition recoding.
//!
//! ```text
//! subjects (config order) ─► build_subject_table ─► append
//!                                                     │
//!        z_erg, z_pupil, z_pupil_slope (corpus-wide) ◄┘
//!                        │
//!        one conjunctive pass over the corpus predicates
//!                        │
//!        intensity_cdm2 / intensity_ord, influx_cdm2, has_blink
//! ```
//!
//! Predicates are plain values evaluated independently against the same
//! table and combined with a logical AND, so their order never changes the
//! retained rows.
use crate::cache::Cache;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::normalize::{nanmean, zscore};
use crate::source::SignalSource;
use crate::subject::build_subject_table;
use crate::table::{col, Column, DataTable};

/// Symbolic intensity → (luminance in cd/m², ordinal rank).
pub const INTENSITY_LEVELS: [(f64, f64, i64); 6] = [
    (-1.0, 0.0, 0),
    (-0.51, 2.69, 1),
    (-0.17, 9.84, 2),
    (0.2, 24.24, 3),
    (0.59, 48.45, 4),
    (1.0, 85.0, 5),
];

/// Luminance and ordinal rank of a symbolic intensity code.
///
/// ```
/// use ergpipe::merge::intensity_lookup;
/// assert_eq!(intensity_lookup(-1.0), Some((0.0, 0)));
/// assert_eq!(intensity_lookup(1.0), Some((85.0, 5)));
/// assert_eq!(intensity_lookup(0.3), None);
/// ```
pub fn intensity_lookup(code: f64) -> Option<(f64, i64)> {
    INTENSITY_LEVELS
        .iter()
        .find(|(c, _, _)| (c - code).abs() < 1e-6)
        .map(|&(_, cdm2, ord)| (cdm2, ord))
}

/// A boolean condition on one column of a table.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// The value is not missing.
    NotMissing(String),
    /// `|value| <= limit`.
    Within { column: String, limit: f64 },
    /// Equal to `value`.
    Equals { column: String, value: f64 },
    /// `value < lo || value > hi`.
    Outside { column: String, lo: f64, hi: f64 },
}

impl Predicate {
    pub fn column(&self) -> &str {
        match self {
            Predicate::NotMissing(c) => c,
            Predicate::Within { column, .. }
            | Predicate::Equals { column, .. }
            | Predicate::Outside { column, .. } => column,
        }
    }

    /// Row mask. Missing values fail every predicate.
    pub fn evaluate(&self, table: &DataTable) -> Result<Vec<bool>> {
        let values = table.floats(self.column())?;
        let test = |v: f64| match *self {
            Predicate::NotMissing(_) => !v.is_nan(),
            Predicate::Within { limit, .. } => v.abs() <= limit,
            Predicate::Equals { value, .. } => v == value,
            Predicate::Outside { lo, hi, .. } => v < lo || v > hi,
        };
        Ok(values.into_iter().map(test).collect())
    }
}

/// Keep the rows that satisfy every predicate.
pub fn filter_rows(table: &DataTable, predicates: &[Predicate]) -> Result<DataTable> {
    let mut keep = vec![true; table.len()];
    for p in predicates {
        let mask = p.evaluate(table)?;
        let rejected = mask.iter().filter(|m| !**m).count();
        log::info!("{p:?} rejects {rejected} of {} rows", table.len());
        keep.iter_mut().zip(mask).for_each(|(k, m)| *k &= m);
    }
    table.filter(&keep)
}

/// The corpus quality filter: finite early ERG and pupil z-scores within
/// the threshold, and non-target trials when a target flag exists.
pub fn corpus_filters(cfg: &PipelineConfig, table: &DataTable) -> Vec<Predicate> {
    let mut predicates = vec![
        Predicate::NotMissing(col::Z_ERG.into()),
        Predicate::NotMissing(col::MEAN_PUPIL.into()),
        Predicate::Within { column: col::Z_ERG.into(), limit: cfg.z_threshold },
        Predicate::Within { column: col::Z_PUPIL.into(), limit: cfg.z_threshold },
    ];
    if table.has(col::TARGET) {
        predicates.push(Predicate::Equals { column: col::TARGET.into(), value: 0.0 });
    }
    predicates
}

/// Excludes trials with a blink in `[0, max_latency]` s after the flash.
pub fn blink_exclusion(max_latency: f64) -> Predicate {
    Predicate::Outside { column: col::BLINK_LATENCY.into(), lo: 0.0, hi: max_latency }
}

/// Build every configured subject, in order, and concatenate the tables.
/// The first failing subject aborts the merge.
pub fn merge_subjects<S: SignalSource + ?Sized>(source: &S, cfg: &PipelineConfig) -> Result<DataTable> {
    let mut corpus = DataTable::new();
    for &subject in &cfg.subjects {
        let table = build_subject_table(source, subject, cfg)?;
        corpus.append(table).map_err(|e| e.in_subject(subject, "merge"))?;
    }
    log::info!("merged {} subjects into {} trials", cfg.subjects.len(), corpus.len());
    Ok(corpus)
}

/// Corpus-wide z-scores of the early ERG amplitude and the pupil measures.
pub fn add_corpus_zscores(table: &mut DataTable) -> Result<()> {
    for (source, target) in [
        (col::MEAN_ERG, col::Z_ERG),
        (col::MEAN_PUPIL, col::Z_PUPIL),
        (col::PUPIL_SLOPE, col::Z_PUPIL_SLOPE),
    ] {
        let z = zscore(&table.floats(source)?);
        table.insert(target, Column::Float(z))?;
    }
    Ok(())
}

/// Recode the stimulus condition into luminance.
///
/// Variants that record `backgroundLevel` already carry luminance, which is
/// passed through unchanged. Otherwise the symbolic `intensity` is mapped to
/// `intensity_cdm2` and `intensity_ord`. Tables with neither column are left
/// alone.
pub fn recode_intensity(table: &mut DataTable) -> Result<()> {
    if table.has(col::BACKGROUND_LEVEL) {
        let level = table.floats(col::BACKGROUND_LEVEL)?;
        return table.insert(col::INTENSITY_CDM2, Column::Float(level));
    }
    let codes = match table.floats(col::INTENSITY) {
        Ok(codes) => codes,
        Err(PipelineError::MissingFeature { column }) => {
            log::warn!("no {column} or {} column; skipping recoding", col::BACKGROUND_LEVEL);
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    let mut cdm2 = Vec::with_capacity(codes.len());
    let mut ord = Vec::with_capacity(codes.len());
    for code in codes {
        match intensity_lookup(code) {
            Some((c, o)) => {
                cdm2.push(c);
                ord.push(o);
            }
            None => {
                log::warn!("unknown intensity code {code}");
                cdm2.push(f64::NAN);
                ord.push(-1);
            }
        }
    }
    table.insert(col::INTENSITY_CDM2, Column::Float(cdm2))?;
    table.insert(col::INTENSITY_ORD, Column::Int(ord))
}

/// `influx_cdm2 = intensity_cdm2 · mean_pupil²`.
pub fn add_influx(table: &mut DataTable) -> Result<()> {
    if !table.has(col::INTENSITY_CDM2) {
        log::warn!("no {} column; skipping influx", col::INTENSITY_CDM2);
        return Ok(());
    }
    let cdm2 = table.floats(col::INTENSITY_CDM2)?;
    let pupil = table.floats(col::MEAN_PUPIL)?;
    let influx = cdm2.iter().zip(&pupil).map(|(i, p)| i * p * p).collect();
    table.insert(col::INFLUX_CDM2, Column::Float(influx))
}

pub fn add_has_blink(table: &mut DataTable) -> Result<()> {
    let flags = table
        .floats(col::BLINK_LATENCY)?
        .into_iter()
        .map(|l| i64::from(l >= 0.0))
        .collect();
    table.insert(col::HAS_BLINK, Column::Int(flags))
}

/// Merge, standardise, filter and recode.
pub fn merge_and_filter<S: SignalSource + ?Sized>(source: &S, cfg: &PipelineConfig) -> Result<DataTable> {
    cfg.validate()?;
    let mut corpus = merge_subjects(source, cfg)?;
    add_corpus_zscores(&mut corpus)?;
    let predicates = corpus_filters(cfg, &corpus);
    let mut corpus = filter_rows(&corpus, &predicates)?;
    log::info!("{} trials after filtering", corpus.len());
    recode_intensity(&mut corpus)?;
    add_influx(&mut corpus)?;
    add_has_blink(&mut corpus)?;
    Ok(corpus)
}

/// [`merge_and_filter`] memoised under [`PipelineConfig::cache_key`].
pub fn get_merged_data<S: SignalSource + ?Sized>(
    source: &S,
    cache: &Cache,
    cfg: &PipelineConfig,
) -> Result<DataTable> {
    cache.get_or_compute(&cfg.cache_key(), || merge_and_filter(source, cfg))
}

/// Split rows into `n_bins` pupil-size bins of near-equal size.
///
/// Rows are ranked by `z_pupil`; the first `len % n_bins` bins hold one row
/// more than the rest. Adds `bin_pupil` (bin index) and `bin_pupil_mm`
/// (mean `mean_pupil` of the bin).
pub fn add_pupil_bins(table: &mut DataTable, n_bins: usize) -> Result<()> {
    if n_bins == 0 {
        return Err(PipelineError::Config("pupil bin count must be positive".into()));
    }
    let z = table.floats(col::Z_PUPIL)?;
    let pupil = table.floats(col::MEAN_PUPIL)?;
    let mut order: Vec<usize> = (0..z.len()).collect();
    order.sort_by(|&a, &b| z[a].total_cmp(&z[b]));

    let mut bins = vec![0_i64; z.len()];
    let mut bin_mm = vec![f64::NAN; z.len()];
    let (base, extra) = (z.len() / n_bins, z.len() % n_bins);
    let mut start = 0;
    for bin in 0..n_bins {
        let size = base + usize::from(bin < extra);
        let members = &order[start..start + size];
        let members_mm: Vec<f64> = members.iter().map(|&r| pupil[r]).collect();
        let mm = nanmean(&members_mm);
        for &r in members {
            bins[r] = bin as i64;
            bin_mm[r] = mm;
        }
        start += size;
    }
    table.insert(col::BIN_PUPIL, Column::Int(bins))?;
    table.insert(col::BIN_PUPIL_MM, Column::Float(bin_mm))
}

/// Intensity of the preceding trial and the trial-number gap to it, within
/// each run of rows from one subject session. Zero on the first row of a run.
pub fn add_previous_trial(table: &mut DataTable) -> Result<()> {
    let subject = table.floats(col::SUBJECT_NR)?;
    let session = table.floats(col::SESSION_NR)?;
    let cdm2 = table.floats(col::INTENSITY_CDM2)?;
    let count = table.floats(col::COUNT_TRIAL_SEQUENCE)?;
    let mut previous = vec![0.0; table.len()];
    let mut diff = vec![0.0; table.len()];
    for i in 1..table.len() {
        if subject[i] == subject[i - 1] && session[i] == session[i - 1] {
            previous[i] = cdm2[i - 1];
            diff[i] = count[i] - count[i - 1];
        }
    }
    table.insert(col::PREVIOUS_INTENSITY_CDM2, Column::Float(previous))?;
    table.insert(col::TRIAL_DIFF, Column::Float(diff))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(values: &[(&str, Vec<f64>)]) -> DataTable {
        let mut t = DataTable::new();
        for (name, v) in values {
            t.insert(name, Column::Float(v.clone())).unwrap();
        }
        t
    }

    #[test]
    fn missing_values_fail_every_predicate() {
        let t = table(&[("x", vec![f64::NAN, 0.5])]);
        for p in [
            Predicate::NotMissing("x".into()),
            Predicate::Within { column: "x".into(), limit: 1.0 },
            Predicate::Outside { column: "x".into(), lo: 0.0, hi: 0.2 },
        ] {
            assert_eq!(p.evaluate(&t).unwrap(), vec![false, true], "{p:?}");
        }
    }

    #[test]
    fn blink_window() {
        let t = table(&[(col::BLINK_LATENCY, vec![-1.0, 0.0, 0.3, 0.5, 0.8])]);
        let kept = blink_exclusion(0.5).evaluate(&t).unwrap();
        assert_eq!(kept, vec![true, false, false, false, true]);
    }

    #[test]
    fn unknown_predicate_column_is_missing_feature() {
        let t = table(&[("x", vec![1.0])]);
        let err = Predicate::NotMissing("y".into()).evaluate(&t).unwrap_err();
        assert!(matches!(err, PipelineError::MissingFeature { .. }));
    }

    #[test]
    fn unknown_intensity_is_flagged() {
        let mut t = table(&[(col::INTENSITY, vec![0.2, 0.3])]);
        recode_intensity(&mut t).unwrap();
        let cdm2 = t.floats(col::INTENSITY_CDM2).unwrap();
        assert_eq!(cdm2[0], 24.24);
        assert!(cdm2[1].is_nan());
        assert_eq!(t.ints(col::INTENSITY_ORD).unwrap(), &[3, -1]);
    }

    #[test]
    fn no_condition_column_is_not_an_error() {
        let mut t = table(&[(col::MEAN_PUPIL, vec![2.0])]);
        recode_intensity(&mut t).unwrap();
        add_influx(&mut t).unwrap();
        assert!(!t.has(col::INTENSITY_CDM2));
        assert!(!t.has(col::INFLUX_CDM2));
    }

    #[test]
    fn pupil_bins_split_like_array_split() {
        let mut t = table(&[
            (col::Z_PUPIL, vec![0.3, -1.0, 2.0, 0.0, 1.0]),
            (col::MEAN_PUPIL, vec![3.0, 1.0, 5.0, 2.0, 4.0]),
        ]);
        add_pupil_bins(&mut t, 2).unwrap();
        // Sorted: rows 1, 3, 0 | 4, 2.
        assert_eq!(t.ints(col::BIN_PUPIL).unwrap(), &[0, 0, 1, 0, 1]);
        assert_eq!(t.floats(col::BIN_PUPIL_MM).unwrap(), vec![2.0, 2.0, 4.5, 2.0, 4.5]);
        assert!(add_pupil_bins(&mut t, 0).is_err());
    }

    #[test]
    fn previous_trial_resets_per_session() {
        let mut t = table(&[
            (col::SUBJECT_NR, vec![3.0, 3.0, 3.0, 4.0]),
            (col::SESSION_NR, vec![1.0, 1.0, 2.0, 2.0]),
            (col::INTENSITY_CDM2, vec![48.45, 85.0, 9.84, 2.69]),
            (col::COUNT_TRIAL_SEQUENCE, vec![1.0, 3.0, 1.0, 1.0]),
        ]);
        add_previous_trial(&mut t).unwrap();
        assert_eq!(t.floats(col::PREVIOUS_INTENSITY_CDM2).unwrap(), vec![0.0, 48.45, 0.0, 0.0]);
        assert_eq!(t.floats(col::TRIAL_DIFF).unwrap(), vec![0.0, 2.0, 0.0, 0.0]);
    }
}
