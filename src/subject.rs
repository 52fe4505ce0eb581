//! Per-subject feature builder.
//!
//! ```text
//! SignalSource::read_subject
//!        │  preprocessed Recording
//!        ▼
//! stimulus triggers ── align_blinks ──► blink_latency
//!        │
//!        ├─ eeg_window    EOG [n,4,t]  EEG [n,C,t]
//!        ├─ pupil_window  pupil [n,t]  gaze [n,2,t]
//!        └─ eeg_window ± margin  EOG  ──► Morlet power [n,4,F,t']
//!        │
//!        ▼
//! trials that have every epoch ──► derived columns ──► subject table
//! ```
//!
//! A trial whose window leaves the recording in any modality is dropped from
//! every modality, so all columns of a row describe the same presentation.
use ndarray::{s, Array2, Array3, Axis};

use crate::blink::align_blinks;
use crate::config::PipelineConfig;
use crate::epoch::{extract_epochs, stack};
use crate::error::{PipelineError, Result};
use crate::features::{
    area_to_mm, channel_mean, erg_channels, mean, mean_gaze_velocity, ols_slope, window_means,
    PupilTrend,
};
use crate::normalize::baseline_correct_inplace;
use crate::recording::{ChannelKind, Recording};
use crate::source::SignalSource;
use crate::table::{col, Column, DataTable};
use crate::tfr;

/// Decode a subject code into `(subject_nr, session_nr)`.
///
/// ```
/// use ergpipe::subject::decode_subject;
/// assert_eq!(decode_subject(52, true), (5, 2));
/// assert_eq!(decode_subject(52, false), (52, 1));
/// ```
pub fn decode_subject(id: u32, multi_session: bool) -> (i64, i64) {
    if multi_session {
        ((id / 10) as i64, (id % 10) as i64)
    } else {
        (id as i64, 1)
    }
}

/// Read, epoch and featurise one subject.
pub fn build_subject_table<S: SignalSource + ?Sized>(
    source: &S,
    subject: u32,
    cfg: &PipelineConfig,
) -> Result<DataTable> {
    cfg.validate()?;
    let rec = source
        .read_subject(subject, &cfg.preprocess)
        .map_err(|e| e.in_subject(subject, "read"))?;
    rec.validate().map_err(|e| PipelineError::unavailable(subject, e.to_string()))?;
    table_from_recording(&rec, subject, cfg)
}

/// The feature table of an already loaded recording.
pub fn table_from_recording(rec: &Recording, subject: u32, cfg: &PipelineConfig) -> Result<DataTable> {
    let sfreq = rec.sfreq;
    let triggers = rec.event_samples(&cfg.stimulus_trigger);
    let n_trials = rec.trials.len();
    if triggers.is_empty() {
        return Err(PipelineError::unavailable(
            subject,
            format!("no stimulus trigger {:?}", cfg.stimulus_trigger),
        ));
    }
    if triggers.len() != n_trials {
        return Err(PipelineError::unavailable(
            subject,
            format!("{} stimulus triggers but {n_trials} trial rows", triggers.len()),
        ));
    }
    let blinks = align_blinks(&rec.annotations, &cfg.stimulus_trigger, &cfg.blink_label, n_trials);

    let eog_picks = cfg
        .preprocess
        .eog_layout
        .names()
        .iter()
        .map(|name| {
            rec.channel_index(name)
                .ok_or_else(|| PipelineError::unavailable(subject, format!("missing EOG channel {name}")))
        })
        .collect::<Result<Vec<usize>>>()?;
    let eeg_picks = rec.picks(ChannelKind::Eeg);
    let pupil_picks = rec.picks(ChannelKind::Pupil);
    if pupil_picks.is_empty() {
        return Err(PipelineError::unavailable(subject, "no pupil channel"));
    }
    // Optional modalities are switched by configuration, never by what a
    // recording happens to contain, so every subject table has one schema.
    let require = |name: &str| {
        rec.channel_index(name)
            .ok_or_else(|| PipelineError::unavailable(subject, format!("missing channel {name}")))
    };
    let gaze_picks = match &cfg.gaze_channels {
        Some((x, y)) => Some(vec![require(x.as_str())?, require(y.as_str())?]),
        None => None,
    };
    let occipital = cfg
        .occipital_channels
        .iter()
        .map(|name| {
            let c = require(name.as_str())?;
            eeg_picks.iter().position(|&e| e == c).ok_or_else(|| {
                PipelineError::unavailable(subject, format!("occipital channel {name} is not EEG"))
            })
        })
        .collect::<Result<Vec<usize>>>()?;

    let eog_ep = extract_epochs(&rec.data, sfreq, &triggers, &cfg.eeg_window, &eog_picks);
    let eeg_ep = extract_epochs(&rec.data, sfreq, &triggers, &cfg.eeg_window, &eeg_picks);
    let pupil_ep = extract_epochs(&rec.data, sfreq, &triggers, &cfg.pupil_window, &pupil_picks);
    let gaze_ep = gaze_picks
        .as_ref()
        .map(|p| extract_epochs(&rec.data, sfreq, &triggers, &cfg.pupil_window, p));
    let tfr_window = cfg.eeg_window.padded(cfg.tfr.margin);
    let tfr_ep = cfg
        .tfr
        .enabled
        .then(|| extract_epochs(&rec.data, sfreq, &triggers, &tfr_window, &eog_picks));

    let complete = |i: usize| {
        eog_ep[i].is_some()
            && eeg_ep[i].is_some()
            && pupil_ep[i].is_some()
            && gaze_ep.as_ref().map_or(true, |g| g[i].is_some())
            && tfr_ep.as_ref().map_or(true, |t| t[i].is_some())
    };
    let valid: Vec<usize> = (0..n_trials).filter(|&i| complete(i)).collect();
    if valid.is_empty() {
        return Err(PipelineError::unavailable(subject, "no trial fits inside the recording"));
    }
    if valid.len() < n_trials {
        log::warn!(
            "subject {subject}: dropping {} of {n_trials} trials whose epochs leave the recording",
            n_trials - valid.len()
        );
    }

    let eeg_len = cfg.eeg_window.n_samples(sfreq);
    let pupil_len = cfg.pupil_window.n_samples(sfreq);
    let epochs_err = |e: PipelineError| e.in_subject(subject, "epochs");
    let eog = stack(&eog_ep, &valid, eog_picks.len(), eeg_len).map_err(epochs_err)?;
    let eeg = stack(&eeg_ep, &valid, eeg_picks.len(), eeg_len).map_err(epochs_err)?;
    let pupil_raw = stack(&pupil_ep, &valid, pupil_picks.len(), pupil_len).map_err(epochs_err)?;
    let gaze = match &gaze_ep {
        Some(g) => Some(stack(g, &valid, 2, pupil_len).map_err(epochs_err)?),
        None => None,
    };

    let mut table = rec.trials.select(&valid);
    add_features(&mut table, subject, cfg, sfreq, &blinks, &valid, &eog, &eeg, &occipital, &pupil_raw, gaze.as_ref())
        .map_err(|e| e.in_subject(subject, "features"))?;

    if let Some(tfr_ep) = &tfr_ep {
        let tfr_len = tfr_window.n_samples(sfreq);
        let padded = stack(tfr_ep, &valid, eog_picks.len(), tfr_len).map_err(epochs_err)?;
        let power = tfr::epochs_power(&padded, sfreq, &cfg.tfr);
        table
            .insert(col::EOG_TFR, Column::Series(power.into_dyn()))
            .map_err(|e| e.in_subject(subject, "tfr"))?;
    }

    log::info!("subject {subject}: {} trials, {} columns", table.len(), table.column_names().count());
    Ok(table)
}

#[allow(clippy::too_many_arguments)]
fn add_features(
    table: &mut DataTable,
    subject: u32,
    cfg: &PipelineConfig,
    sfreq: f64,
    blinks: &[f64],
    valid: &[usize],
    eog: &Array3<f32>,
    eeg: &Array3<f32>,
    occipital: &[usize],
    pupil_raw: &Array3<f32>,
    gaze: Option<&Array3<f32>>,
) -> Result<()> {
    let n = valid.len();
    let (subject_nr, session_nr) = decode_subject(subject, cfg.multi_session);
    table.insert(col::SUBJECT_NR, Column::Int(vec![subject_nr; n]))?;
    table.insert(col::SESSION_NR, Column::Int(vec![session_nr; n]))?;
    table.insert(col::BLINK_LATENCY, Column::Float(valid.iter().map(|&i| blinks[i]).collect()))?;

    // Periocular channels.
    let erg = erg_channels(eog);
    let (a, b) = cfg.eeg_window.sample_range(cfg.erg_window.0, cfg.erg_window.1, sfreq);
    table.insert(col::MEAN_ERG, Column::Float(window_means(&erg.full, a, b)))?;
    table.insert(col::EOG, Column::Series(eog.clone().into_dyn()))?;
    table.insert(col::ERG, Column::Series(erg.full.into_dyn()))?;
    table.insert(col::ERG_UPPER, Column::Series(erg.upper.into_dyn()))?;
    table.insert(col::ERG_LOWER, Column::Series(erg.lower.into_dyn()))?;
    table.insert(col::LATERG, Column::Series(erg.lateral.into_dyn()))?;

    // Scalp channels.
    table.insert(col::ERP, Column::Series(eeg.clone().into_dyn()))?;
    if !occipital.is_empty() {
        table.insert(col::ERP_OCCIPITAL, Column::Series(channel_mean(eeg, occipital).into_dyn()))?;
        // Leftmost minus rightmost occipital site.
        let left = eeg.index_axis(Axis(1), occipital[0]);
        let right = eeg.index_axis(Axis(1), occipital[occipital.len() - 1]);
        table.insert(col::LATERP_OCCIPITAL, Column::Series((&left - &right).into_dyn()))?;
    }

    // Pupil.
    let area = channel_mean(pupil_raw, &(0..pupil_raw.dim().1).collect::<Vec<_>>());
    let pupil: Array2<f32> = area.mapv(|v| area_to_mm(v as f64, cfg.pupil_calibration) as f32);
    let n_feat = cfg.pupil_feature_window.n_samples(sfreq).min(pupil.ncols());
    let mut mean_pupil = Vec::with_capacity(n);
    let mut slope = Vec::with_capacity(n);
    for row in pupil.outer_iter() {
        let early = row.slice(s![..n_feat]);
        mean_pupil.push(mean(early));
        slope.push(ols_slope(early));
    }
    let dilation: Vec<String> = slope.iter().map(|&k| PupilTrend::classify(k).as_str().to_string()).collect();
    let mut bl_pupil = pupil.clone();
    let (b0, b1) = cfg.pupil_window.sample_range(cfg.pupil_baseline.0, cfg.pupil_baseline.1, sfreq);
    baseline_correct_inplace(&mut bl_pupil, b0, b1);

    table.insert(col::MEAN_PUPIL_AREA, Column::Float(mean_pupil.iter().map(|m| m * m).collect()))?;
    table.insert(col::MEAN_PUPIL, Column::Float(mean_pupil))?;
    table.insert(col::PUPIL_SLOPE, Column::Float(slope))?;
    table.insert(col::PUPIL_DILATION, Column::Text(dilation))?;
    table.insert(col::PUPIL, Column::Series(pupil.into_dyn()))?;
    table.insert(col::BL_PUPIL, Column::Series(bl_pupil.into_dyn()))?;

    // Gaze.
    if let Some(gaze) = gaze {
        let gx = gaze.index_axis(Axis(1), 0).to_owned();
        let gy = gaze.index_axis(Axis(1), 1).to_owned();
        let vel: Vec<f64> = gx
            .outer_iter()
            .zip(gy.outer_iter())
            .map(|(x, y)| mean_gaze_velocity(x, y, cfg.gaze_smooth_len, cfg.gaze_velocity_samples))
            .collect();
        table.insert(col::MEAN_GAZE_VEL, Column::Float(vel))?;
        table.insert(col::GAZE_X, Column::Series(gx.into_dyn()))?;
        table.insert(col::GAZE_Y, Column::Series(gy.into_dyn()))?;
    }
    Ok(())
}
