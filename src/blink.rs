//! Blink-to-trial alignment.
//!
//! Annotations are scanned in onset order with a cursor on the current
//! trial. A stimulus trigger advances the cursor and arms it with the
//! trigger onset; the first blink after an armed trigger is attributed to
//! that trial as `blink_onset − trigger_onset` and disarms the cursor, so a
//! trial records at most one blink. A trial without a blink before the next
//! trigger (or the end of the recording) keeps [`NO_BLINK`].
//!
//! Known limitation: annotations before the first trigger are ignored, so a
//! spurious leading trigger shifts every attribution by one trial. One
//! subject's logbook records such an extraneous trigger.
//!
//! A blink that follows the *next* trial's trigger is attributed to that
//! next trial, even if it began as a late response to the previous flash.
use crate::recording::Annotation;

/// Latency recorded for a trial without a blink.
pub const NO_BLINK: f64 = -1.0;

/// Blink latency (s) per trial, for `n_trials` trials.
///
/// Triggers beyond `n_trials` are counted but never receive a blink.
pub fn align_blinks(
    annotations: &[Annotation],
    trigger: &str,
    blink: &str,
    n_trials: usize,
) -> Vec<f64> {
    let mut ordered: Vec<&Annotation> = annotations.iter().collect();
    // A trigger sorts before any other event at the same onset; otherwise
    // the recorded order decides.
    ordered.sort_by(|a, b| {
        a.onset
            .total_cmp(&b.onset)
            .then_with(|| (a.description != trigger).cmp(&(b.description != trigger)))
    });

    let mut latencies = vec![NO_BLINK; n_trials];
    let mut trial: Option<usize> = None;
    let mut armed: Option<f64> = None;

    for a in ordered {
        if a.description == trigger {
            let next = trial.map_or(0, |t| t + 1);
            trial = Some(next);
            armed = (next < n_trials).then_some(a.onset);
        } else if a.description == blink {
            if let (Some(t), Some(onset)) = (trial, armed.take()) {
                latencies[t] = a.onset - onset;
            }
        }
    }
    latencies
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ann(events: &[(f64, &str)]) -> Vec<Annotation> {
        events.iter().map(|&(t, d)| Annotation::new(t, d)).collect()
    }

    #[test]
    fn first_blink_only() {
        let a = ann(&[(1.0, "1"), (1.3, "BLINK"), (1.6, "BLINK"), (3.0, "1")]);
        let lat = align_blinks(&a, "1", "BLINK", 2);
        approx::assert_abs_diff_eq!(lat[0], 0.3, epsilon = 1e-12);
        assert_eq!(lat[1], NO_BLINK);
    }

    #[test]
    fn leading_events_are_ignored() {
        let a = ann(&[(0.2, "BLINK"), (1.0, "1"), (2.0, "1"), (2.5, "BLINK")]);
        let lat = align_blinks(&a, "1", "BLINK", 2);
        assert_eq!(lat[0], NO_BLINK);
        approx::assert_abs_diff_eq!(lat[1], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn unsorted_annotations_are_ordered_by_onset() {
        let a = ann(&[(3.0, "1"), (1.4, "BLINK"), (1.0, "1")]);
        let lat = align_blinks(&a, "1", "BLINK", 2);
        approx::assert_abs_diff_eq!(lat[0], 0.4, epsilon = 1e-12);
        assert_eq!(lat[1], NO_BLINK);
    }

    #[test]
    fn late_blink_belongs_to_the_next_trial() {
        // No blink after trial 0; the blink after trigger 1 goes to trial 1.
        let a = ann(&[(1.0, "1"), (2.0, "1"), (2.05, "BLINK")]);
        let lat = align_blinks(&a, "1", "BLINK", 2);
        assert_eq!(lat[0], NO_BLINK);
        approx::assert_abs_diff_eq!(lat[1], 0.05, epsilon = 1e-12);
    }

    #[test]
    fn blink_at_a_trigger_onset_belongs_to_that_trigger() {
        let a = ann(&[(1.0, "1"), (3.0, "BLINK"), (3.0, "1")]);
        let lat = align_blinks(&a, "1", "BLINK", 2);
        assert_eq!(lat[0], NO_BLINK);
        assert_eq!(lat[1], 0.0);
    }

    #[test]
    fn extra_triggers_do_not_overflow() {
        let a = ann(&[(1.0, "1"), (2.0, "1"), (2.1, "BLINK")]);
        let lat = align_blinks(&a, "1", "BLINK", 1);
        assert_eq!(lat, vec![NO_BLINK]);
    }

    #[test]
    fn other_annotations_are_skipped() {
        let a = ann(&[(1.0, "1"), (1.1, "BAD_EMG"), (1.2, "BLINK")]);
        let lat = align_blinks(&a, "1", "BLINK", 1);
        approx::assert_abs_diff_eq!(lat[0], 0.2, epsilon = 1e-12);
    }
}
