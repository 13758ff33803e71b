//! End-to-end archival runs over the in-memory fakes.
//!
//! Each test drives a full `LogArchiver::run` and asserts on the report,
//! the fake store's contents, and the fakes' call counters.

use dblog_archive::{
    ArchiveConfig, EncryptionPolicy, FileOutcome, InMemoryLogSource, InMemoryLogStore,
    LogArchiver, PageFaultKind, RunError, SourceLogFile, StoreFaultKind, SyncReason,
};

fn config() -> ArchiveConfig {
    ArchiveConfig::test()
}

fn archiver(
    source: &InMemoryLogSource,
    store: &InMemoryLogStore,
    config: ArchiveConfig,
) -> LogArchiver<InMemoryLogSource, InMemoryLogStore> {
    LogArchiver::new(source.clone(), store.clone(), config)
}

#[tokio::test]
async fn missing_file_is_paged_assembled_and_committed() {
    let source = InMemoryLogSource::new();
    let store = InMemoryLogStore::new();

    // Descriptor size and content length disagree on purpose: the source
    // reports both independently and the committed object must carry the
    // bytes actually read.
    let info = SourceLogFile {
        name: "error/mysql-error.log".to_string(),
        size_bytes: 1024,
        last_written_ms: 1000,
    };
    source.insert(info, &b"AAAABBBB"[..], 4);

    let mut config = config();
    config.prefix = "prefix".to_string();
    let report = archiver(&source, &store, config).run().await.unwrap();

    assert!(report.all_succeeded());
    assert_eq!(report.files.len(), 1);
    let entry = &report.files[0];
    assert_eq!(entry.key, "prefix/error/mysql-error.log");
    assert_eq!(entry.outcome, FileOutcome::Committed { size_bytes: 8 });
    assert_eq!(entry.reason, Some(SyncReason::Missing));

    assert_eq!(
        store.payload("prefix/error/mysql-error.log").unwrap(),
        b"AAAABBBB"
    );
    // Two content pages were needed to assemble the payload.
    assert_eq!(source.page_reads(), 2);
}

#[tokio::test]
async fn current_destination_copy_means_zero_reads_and_writes() {
    let source = InMemoryLogSource::new();
    let store = InMemoryLogStore::new();

    let info = SourceLogFile {
        name: "error/mysql-error.log".to_string(),
        size_bytes: 1024,
        last_written_ms: 1500,
    };
    source.insert(info, vec![b'x'; 1024], 256);
    store.seed("prefix/error/mysql-error.log", vec![b'x'; 1024], 2000);

    let mut config = config();
    config.prefix = "prefix".to_string();
    let report = archiver(&source, &store, config).run().await.unwrap();

    assert!(report.all_succeeded());
    assert_eq!(report.files[0].outcome, FileOutcome::Skipped);
    assert_eq!(report.files[0].reason, None);
    assert_eq!(source.page_reads(), 0);
    assert_eq!(store.write_count(), 0);
}

#[tokio::test]
async fn second_run_with_no_source_changes_writes_nothing() {
    let source = InMemoryLogSource::new();
    let store = InMemoryLogStore::new();
    // Stored copies get stamped after the source's write times.
    store.set_clock_ms(10_000);

    source.add_file("error/a.log", 1000, &b"first file body"[..]);
    source.add_file("slow/b.log", 2000, &b"second"[..]);
    source.add_file("general/c.log", 3000, &b"third one here"[..]);

    let archiver = archiver(&source, &store, config());

    let first = archiver.run().await.unwrap();
    assert_eq!(first.committed(), 3);
    assert_eq!(store.write_count(), 3);

    let second = archiver.run().await.unwrap();
    assert_eq!(second.skipped(), 3);
    assert_eq!(second.committed(), 0);
    assert_eq!(store.write_count(), 3, "second run must not write");
}

#[tokio::test]
async fn one_failing_file_never_halts_the_batch() {
    let source = InMemoryLogSource::new();
    let store = InMemoryLogStore::new();
    store.set_clock_ms(10_000);

    source.add_file("a.log", 100, &b"alpha"[..]);
    source.add_file("b.log", 200, &b"bravo"[..]);
    source.add_file("c.log", 300, &b"charlie"[..]);
    source.fail_read_after("b.log", 0, PageFaultKind::Unavailable);

    let report = archiver(&source, &store, config()).run().await.unwrap();

    assert!(!report.all_succeeded());
    assert_eq!(report.failed(), 1);
    assert_eq!(report.committed(), 2);

    let failed: Vec<_> = report.files.iter().filter(|f| f.is_failed()).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].name, "b.log");

    assert_eq!(store.payload("logs/a.log").unwrap(), b"alpha");
    assert_eq!(store.payload("logs/c.log").unwrap(), b"charlie");
    assert!(store.payload("logs/b.log").is_none());
}

#[tokio::test]
async fn file_rotated_away_mid_transfer_leaves_no_partial_object() {
    let source = InMemoryLogSource::new();
    let store = InMemoryLogStore::new();

    let info = SourceLogFile {
        name: "rotating.log".to_string(),
        size_bytes: 12,
        last_written_ms: 100,
    };
    source.insert(info, &b"AAAABBBBCCCC"[..], 4);
    source.fail_read_after("rotating.log", 2, PageFaultKind::NotFound);

    let report = archiver(&source, &store, config()).run().await.unwrap();

    assert_eq!(report.failed(), 1);
    assert!(store.is_empty());
    assert_eq!(store.write_count(), 0);
}

#[tokio::test]
async fn enumeration_failure_aborts_the_whole_run() {
    let source = InMemoryLogSource::new();
    let store = InMemoryLogStore::new();
    source.add_file("a.log", 100, &b"alpha"[..]);
    source.fail_listing("throttled");

    let err = archiver(&source, &store, config()).run().await.unwrap_err();
    assert!(matches!(err, RunError::Source(_)));
    assert_eq!(store.write_count(), 0);
    assert_eq!(source.page_reads(), 0);
}

#[tokio::test]
async fn destination_preflight_failure_aborts_before_any_file_work() {
    let source = InMemoryLogSource::new();
    let store = InMemoryLogStore::new();
    source.add_file("a.log", 100, &b"alpha"[..]);
    store.fail_access(StoreFaultKind::PermissionDenied);

    let err = archiver(&source, &store, config()).run().await.unwrap_err();
    assert!(matches!(err, RunError::Store(_)));
    assert_eq!(source.list_calls(), 0);
    assert_eq!(source.page_reads(), 0);
}

#[tokio::test]
async fn unreadable_destination_index_fails_toward_retransfer() {
    let source = InMemoryLogSource::new();
    let store = InMemoryLogStore::new();
    store.set_clock_ms(10_000);

    source.add_file("a.log", 100, &b"alpha"[..]);
    // The copy in the store is current, but listings fail, so staleness
    // cannot be determined. The safe default is to re-transfer.
    store.seed("logs/a.log", &b"alpha"[..], 9_000);
    store.fail_listings(StoreFaultKind::Unavailable);

    let report = archiver(&source, &store, config()).run().await.unwrap();

    assert!(report.all_succeeded());
    assert_eq!(report.committed(), 1);
    assert_eq!(report.files[0].reason, Some(SyncReason::Missing));
    assert_eq!(store.write_count(), 1);
}

#[tokio::test]
async fn size_change_triggers_retransfer() {
    let source = InMemoryLogSource::new();
    let store = InMemoryLogStore::new();
    store.set_clock_ms(10_000);

    source.add_file("grow.log", 100, &b"old+new"[..]);
    store.seed("logs/grow.log", &b"old"[..], 9_000);

    let report = archiver(&source, &store, config()).run().await.unwrap();

    assert_eq!(report.committed(), 1);
    assert_eq!(report.files[0].reason, Some(SyncReason::SizeMismatch));
    assert_eq!(store.payload("logs/grow.log").unwrap(), b"old+new");
}

#[tokio::test]
async fn newer_source_write_triggers_retransfer() {
    let source = InMemoryLogSource::new();
    let store = InMemoryLogStore::new();
    store.set_clock_ms(10_000);

    source.add_file("same-size.log", 5_000, &b"fresh"[..]);
    store.seed("logs/same-size.log", &b"stale"[..], 4_000);

    let report = archiver(&source, &store, config()).run().await.unwrap();

    assert_eq!(report.committed(), 1);
    assert_eq!(report.files[0].reason, Some(SyncReason::SourceNewer));
    assert_eq!(store.payload("logs/same-size.log").unwrap(), b"fresh");
}

#[tokio::test]
async fn write_failure_marks_only_that_file_failed() {
    let source = InMemoryLogSource::new();
    let store = InMemoryLogStore::new();
    source.add_file("a.log", 100, &b"alpha"[..]);
    store.fail_writes(StoreFaultKind::PermissionDenied);

    let report = archiver(&source, &store, config()).run().await.unwrap();

    assert_eq!(report.failed(), 1);
    assert!(matches!(
        report.files[0].outcome,
        FileOutcome::Failed { ref error } if error.contains("denial")
    ));
}

#[tokio::test]
async fn every_committed_object_carries_the_configured_encryption() {
    let source = InMemoryLogSource::new();
    let store = InMemoryLogStore::new();

    source.add_file("a.log", 100, &b"alpha"[..]);
    source.add_file("b.log", 200, &b"bravo"[..]);

    let mut config = config();
    config.encryption = EncryptionPolicy::Kms {
        key_id: Some("alias/log-archive".to_string()),
    };
    let expected = config.encryption.clone();

    let report = archiver(&source, &store, config).run().await.unwrap();
    assert_eq!(report.committed(), 2);

    for name in ["logs/a.log", "logs/b.log"] {
        assert_eq!(store.encryption_of(name), Some(expected.clone()));
    }
}

#[tokio::test]
async fn bounded_fan_out_commits_everything() {
    let source = InMemoryLogSource::new();
    let store = InMemoryLogStore::new();
    store.set_clock_ms(10_000);

    for i in 0..10 {
        source.add_file(
            &format!("file-{:02}.log", i),
            100 + i,
            format!("contents of file {}", i).into_bytes(),
        );
    }

    let mut config = config();
    config.max_in_flight = 4;
    let archiver = archiver(&source, &store, config);

    let first = archiver.run().await.unwrap();
    assert_eq!(first.committed(), 10);
    assert_eq!(store.write_count(), 10);

    // Reports come back name-sorted regardless of completion order.
    let names: Vec<_> = first.files.iter().map(|f| f.name.as_str()).collect();
    let mut sorted = names.clone();
    sorted.sort_unstable();
    assert_eq!(names, sorted);

    let second = archiver.run().await.unwrap();
    assert_eq!(second.skipped(), 10);
    assert_eq!(store.write_count(), 10);
}
