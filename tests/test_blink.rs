mod common;
use common::{fast_config, recording, InMemorySource, Protocol};
use ergpipe::blink::{align_blinks, NO_BLINK};
use ergpipe::merge::merge_subjects;
use ergpipe::{col, Annotation};

#[test]
fn last_trial_without_blink_is_minus_one() {
    // Two subjects, three flashes each; the last flash is followed by neither
    // a blink nor another trigger before the recording ends.
    let mut a = Protocol::regular(3);
    a.blinks = vec![1.2, 3.3];
    let mut b = Protocol::regular(3);
    b.blinks = vec![1.05, 3.4];
    let src = InMemorySource::with([(31, recording(&a)), (32, recording(&b))]);

    let dm = merge_subjects(&src, &fast_config(&[31, 32])).unwrap();
    let lat = dm.floats(col::BLINK_LATENCY).unwrap();
    assert_eq!(lat.len(), 6);
    for (got, want) in lat.iter().zip([0.2, 0.3, NO_BLINK, 0.05, 0.4, NO_BLINK]) {
        approx::assert_abs_diff_eq!(*got, want, epsilon = 1e-9);
    }
}

#[test]
fn latencies_are_sentinel_or_before_the_next_trigger() {
    let triggers = [0.5, 1.7, 2.1, 4.0, 4.2, 6.9];
    // The blink at 6.9 coincides with the last trigger, and the trial before
    // it has no blink of its own.
    let blinks = [0.1, 0.8, 0.9, 1.8, 2.15, 2.3, 4.19, 6.9, 7.5];
    let mut events: Vec<Annotation> = triggers.iter().map(|&t| Annotation::new(t, "1")).collect();
    events.extend(blinks.iter().map(|&t| Annotation::new(t, "BLINK")));
    events.reverse();

    let lat = align_blinks(&events, "1", "BLINK", triggers.len());
    for (i, &l) in lat.iter().enumerate() {
        if l == NO_BLINK {
            continue;
        }
        assert!(l >= 0.0, "trial {i}: {l}");
        if let Some(next) = triggers.get(i + 1) {
            assert!(l < next - triggers[i], "trial {i}: {l}");
        }
    }
    // Only the first blink after a flash counts.
    approx::assert_abs_diff_eq!(lat[0], 0.3, epsilon = 1e-9);
    approx::assert_abs_diff_eq!(lat[2], 0.05, epsilon = 1e-9);
    assert_eq!(lat[4], NO_BLINK);
    assert_eq!(lat[5], 0.0);
}

#[test]
fn blink_before_the_first_flash_is_ignored() {
    let mut protocol = Protocol::regular(2);
    protocol.blinks = vec![0.5];
    let src = InMemorySource::with([(31, recording(&protocol))]);
    let dm = merge_subjects(&src, &fast_config(&[31])).unwrap();
    assert_eq!(dm.floats(col::BLINK_LATENCY).unwrap(), vec![NO_BLINK, NO_BLINK]);
}
