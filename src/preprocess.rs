//! Preprocessing applied by the signal source before a recording is handed
//! to the feature builder.
//!
//! Steps run in the order listed in [`PreprocessConfig::steps`]:
//!
//! ```text
//! DropUnusedChannels     remove `unused_channels`
//! RereferenceChannels    EEG + EOG minus the reference signal; reference
//!                        channels are dropped afterwards
//! CreateEogChannels      type the EOG layout's channels as `Eog`
//! BandPassFilter         zero-phase FIR band-pass on EEG + EOG
//! AutodetectBadChannels  flag flat or high-variance EEG channels
//! InterpolateBads        replace bad EEG channels by the good-channel mean
//! ```
use ndarray::Axis;

use crate::config::{PreprocStep, PreprocessConfig, Reference};
use crate::error::{PipelineError, Result};
use crate::filter::{design_bandpass, FirFilter};
use crate::recording::{ChannelKind, Recording};
use crate::reference::rereference_inplace;

/// Channel-name comparison ignoring case and spaces.
fn same_name(a: &str, b: &str) -> bool {
    let norm = |s: &str| s.replace(' ', "").to_lowercase();
    norm(a) == norm(b)
}

fn find(rec: &Recording, name: &str) -> Option<usize> {
    rec.ch_names.iter().position(|n| same_name(n, name))
}

fn signal_channels(rec: &Recording) -> Vec<usize> {
    rec.ch_kinds
        .iter()
        .enumerate()
        .filter(|(_, k)| matches!(k, ChannelKind::Eeg | ChannelKind::Eog))
        .map(|(i, _)| i)
        .collect()
}

pub fn apply(rec: &mut Recording, cfg: &PreprocessConfig) -> Result<()> {
    for &step in &cfg.steps {
        log::debug!("preprocessing step {step:?}");
        match step {
            PreprocStep::DropUnusedChannels => drop_unused_channels(rec, &cfg.unused_channels),
            PreprocStep::RereferenceChannels => rereference(rec, &cfg.reference)?,
            PreprocStep::CreateEogChannels => create_eog_channels(rec, &cfg.eog_layout.names()),
            PreprocStep::BandPassFilter => band_pass(rec, cfg.l_freq, cfg.h_freq)?,
            PreprocStep::AutodetectBadChannels => autodetect_bad_channels(rec, cfg.bad_channel_ratio),
            PreprocStep::InterpolateBads => interpolate_bads(rec),
        }
    }
    Ok(())
}

pub fn drop_unused_channels(rec: &mut Recording, unused: &[String]) {
    let keep: Vec<usize> = (0..rec.ch_names.len())
        .filter(|&i| !unused.iter().any(|u| same_name(u, &rec.ch_names[i])))
        .collect();
    rec.retain_channels(&keep);
}

pub fn rereference(rec: &mut Recording, reference: &Reference) -> Result<()> {
    let targets = signal_channels(rec);
    match reference {
        Reference::Average => {
            let eeg = rec.picks(ChannelKind::Eeg);
            rereference_inplace(&mut rec.data, &eeg, &targets);
        }
        Reference::Channels(names) => {
            let refs = names
                .iter()
                .map(|n| find(rec, n).ok_or_else(|| PipelineError::Format(format!("missing reference channel {n}"))))
                .collect::<Result<Vec<usize>>>()?;
            let targets: Vec<usize> = targets.into_iter().filter(|c| !refs.contains(c)).collect();
            rereference_inplace(&mut rec.data, &refs, &targets);
            let keep: Vec<usize> = (0..rec.ch_names.len()).filter(|c| !refs.contains(c)).collect();
            rec.retain_channels(&keep);
        }
    }
    Ok(())
}

/// Explicit channel typing: the named channels become EOG. Names that are
/// absent are skipped; the feature builder reports a truncated layout.
pub fn create_eog_channels(rec: &mut Recording, names: &[&str]) {
    for name in names {
        if let Some(i) = find(rec, name) {
            rec.ch_kinds[i] = ChannelKind::Eog;
        }
    }
}

pub fn band_pass(rec: &mut Recording, l_freq: f32, h_freq: f32) -> Result<()> {
    let sfreq = rec.sfreq as f32;
    if !(0.0 < l_freq && l_freq < h_freq && h_freq < sfreq / 2.0) {
        return Err(PipelineError::Format(format!(
            "band-pass {l_freq}-{h_freq} Hz invalid at {sfreq} Hz"
        )));
    }
    let h = design_bandpass(l_freq, h_freq, sfreq);
    let filter = FirFilter::new(&h, rec.n_times());
    let rows = signal_channels(rec);
    filter.apply_rows(&mut rec.data, &rows);
    Ok(())
}

/// Flag EEG channels that are flat or whose std exceeds `ratio` × the median
/// EEG std.
pub fn autodetect_bad_channels(rec: &mut Recording, ratio: f32) {
    let eeg = rec.picks(ChannelKind::Eeg);
    let stds: Vec<f32> = eeg.iter().map(|&c| rec.data.row(c).std(0.0)).collect();
    let mut sorted = stds.clone();
    sorted.sort_by(f32::total_cmp);
    let Some(&median) = sorted.get(sorted.len() / 2) else { return };
    for (&c, &sd) in eeg.iter().zip(&stds) {
        let name = &rec.ch_names[c];
        if (sd < 1e-12 || sd > ratio * median) && !rec.bads.contains(name) {
            log::info!("channel {name} flagged bad (std {sd:.3e}, median {median:.3e})");
            rec.bads.push(name.clone());
        }
    }
}

/// Replace each bad EEG channel by the per-timepoint mean of the good EEG
/// channels, then clear the bad list.
pub fn interpolate_bads(rec: &mut Recording) {
    if rec.bads.is_empty() {
        return;
    }
    let eeg = rec.picks(ChannelKind::Eeg);
    let (bad, good): (Vec<usize>, Vec<usize>) =
        eeg.into_iter().partition(|&c| rec.bads.contains(&rec.ch_names[c]));
    if good.is_empty() {
        log::warn!("all EEG channels are bad; leaving them as recorded");
        return;
    }
    let fill = rec.data.select(Axis(0), &good).mean_axis(Axis(0));
    if let Some(fill) = fill {
        for c in bad {
            rec.data.row_mut(c).assign(&fill);
        }
    }
    rec.bads.clear();
}
