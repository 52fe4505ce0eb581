mod common;
use common::{assert_tables_eq, fast_config, recording, InMemorySource, Protocol};
use ergpipe::{get_merged_data, merge_and_filter, Cache, EpochWindow, PipelineError};

fn source() -> InMemorySource {
    InMemorySource::with([
        (31, recording(&Protocol::regular(6))),
        (32, recording(&Protocol::regular(6))),
    ])
}

#[test]
fn cached_corpus_reloads_identically() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Cache::new(dir.path()).unwrap();
    let src = source();
    let cfg = fast_config(&[31, 32]);

    let computed = merge_and_filter(&src, &cfg).unwrap();
    let stored = cache.get_or_compute("corpus", || Ok(computed.clone())).unwrap();
    let reloaded = cache.get_or_compute("corpus", || unreachable!()).unwrap();
    assert_tables_eq(&computed, &stored);
    assert_tables_eq(&computed, &reloaded);
}

#[test]
fn second_run_does_not_recompute() {
    let dir = tempfile::tempdir().unwrap();
    let src = source();
    let cfg = fast_config(&[31, 32]);

    let first = get_merged_data(&src, &Cache::new(dir.path()).unwrap(), &cfg).unwrap();
    assert_eq!(src.calls.get(), 2);
    // A fresh handle on the same directory stands in for a process restart.
    let second = get_merged_data(&src, &Cache::new(dir.path()).unwrap(), &cfg).unwrap();
    assert_eq!(src.calls.get(), 2);
    assert_tables_eq(&first, &second);
}

#[test]
fn failed_run_caches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Cache::new(dir.path()).unwrap();
    let src = source();
    let cfg = fast_config(&[31, 77]);

    let err = get_merged_data(&src, &cache, &cfg).unwrap_err();
    assert!(matches!(err, PipelineError::DataUnavailable { subject: 77, .. }));
    assert!(!cache.contains(&cfg.cache_key()));

    // The next attempt computes again instead of returning a partial corpus.
    assert!(get_merged_data(&src, &cache, &cfg).is_err());
    assert_eq!(src.calls.get(), 4);
}

#[test]
fn changing_a_window_changes_the_entry() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Cache::new(dir.path()).unwrap();
    let src = source();
    let cfg = fast_config(&[31, 32]);
    let shorter = ergpipe::PipelineConfig { pupil_window: EpochWindow::new(0.0, 1.0), ..cfg.clone() };
    assert_ne!(cfg.cache_key(), shorter.cache_key());

    let long = get_merged_data(&src, &cache, &cfg).unwrap();
    let short = get_merged_data(&src, &cache, &shorter).unwrap();
    assert_eq!(src.calls.get(), 4);
    assert_eq!(long.series("pupil").unwrap().shape()[1], 1501);
    assert_eq!(short.series("pupil").unwrap().shape()[1], 1001);
}
