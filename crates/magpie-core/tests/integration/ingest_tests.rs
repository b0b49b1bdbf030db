//! Integration tests for the ingestion pipeline.
//!
//! Exercises `IngestionPipeline` end to end against in-memory mocks:
//! pagination, chunked resolution, merge-upsert semantics, dead-zone
//! handling, retries, and cancellation.

use std::time::Duration;

use magpie_core::{
    CandidateRef, IngestConfig, IngestStatus, IngestionPipeline, SilentReporter,
};
use tokio_util::sync::CancellationToken;

use super::common::{record, MockArchive, MockGateway, MockStore};

/// Millisecond waits keep retry-heavy tests fast.
fn fast_config() -> IngestConfig {
    IngestConfig {
        max_retries: 2,
        wait: Duration::from_millis(1),
        ..IngestConfig::default()
    }
}

fn candidate(id: &str, observed_utc: i64) -> CandidateRef {
    CandidateRef {
        id: id.to_string(),
        observed_utc,
    }
}

#[tokio::test]
async fn test_ingests_full_range() {
    // Arrange
    let archive = MockArchive::new(vec![
        candidate("a", 900),
        candidate("b", 500),
        candidate("c", 100),
    ]);
    let gateway = MockGateway::new(vec![
        record("a", 900),
        record("b", 500),
        record("c", 100),
    ]);
    let store = MockStore::new();
    let pipeline =
        IngestionPipeline::with_config(archive, gateway, store.clone(), fast_config());

    // Act
    let stats = pipeline
        .ingest_collection("test", None, 1000, 100)
        .await
        .unwrap();

    // Assert
    assert_eq!(stats.records_upserted, 3);
    assert_eq!(stats.pages_fetched, 1);
    assert_eq!(stats.chunks_resolved, 1);
    assert_eq!(store.len(), 3);
    assert!(store.get("test", "b").is_some());
}

#[tokio::test]
async fn test_double_ingest_is_idempotent() {
    // Arrange
    let archive = MockArchive::new(vec![candidate("a", 800), candidate("b", 100)]);
    let gateway = MockGateway::new(vec![record("a", 800), record("b", 100)]);
    let store = MockStore::new();
    let pipeline =
        IngestionPipeline::with_config(archive, gateway, store.clone(), fast_config());

    // Act
    pipeline
        .ingest_collection("test", None, 1000, 100)
        .await
        .unwrap();
    let first = store.snapshot();

    pipeline
        .ingest_collection("test", None, 1000, 100)
        .await
        .unwrap();
    let second = store.snapshot();

    // Assert: rerunning the same range leaves the store unchanged
    assert_eq!(first, second);
    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn test_page_of_250_resolves_in_three_chunks() {
    // Arrange: one search page of 250 candidates
    let candidates: Vec<CandidateRef> = (0..250)
        .map(|i| candidate(&format!("id{}", i), 100 + i))
        .collect();
    let records: Vec<_> = (0..250)
        .map(|i| record(&format!("id{}", i), 100 + i))
        .collect();

    let archive = MockArchive::new(candidates);
    let gateway = MockGateway::new(records);
    let store = MockStore::new();
    let pipeline =
        IngestionPipeline::with_config(archive, gateway.clone(), store.clone(), fast_config());

    // Act
    let stats = pipeline
        .ingest_collection("test", None, 400, 100)
        .await
        .unwrap();

    // Assert: the gateway's 100-id limit forces 100, 100, 50
    assert_eq!(gateway.chunk_sizes(), vec![100, 100, 50]);
    assert_eq!(stats.records_upserted, 250);
    assert_eq!(store.len(), 250);
}

#[tokio::test]
async fn test_empty_archive_exhausts_instead_of_spinning() {
    // Arrange
    let archive = MockArchive::empty();
    let gateway = MockGateway::new(Vec::new());
    let store = MockStore::new();
    let pipeline = IngestionPipeline::with_config(
        archive.clone(),
        gateway,
        store.clone(),
        fast_config(),
    );

    // Act
    let result = pipeline
        .ingest_collection_cancellable(
            "test",
            None,
            1000,
            100,
            &SilentReporter,
            CancellationToken::new(),
        )
        .await
        .unwrap();

    // Assert: one empty page, one skip past the start, clean termination
    assert_eq!(result.status, IngestStatus::Exhausted);
    assert_eq!(result.stats.dead_zone_skips, 1);
    assert_eq!(archive.call_count(), 1);
    assert_eq!(store.len(), 0);
}

#[tokio::test]
async fn test_mid_range_dead_zone_is_skipped() {
    // Arrange: activity stops at 900, nothing older
    let archive = MockArchive::new(vec![candidate("a", 900)]);
    let gateway = MockGateway::new(vec![record("a", 900)]);
    let store = MockStore::new();
    let pipeline = IngestionPipeline::with_config(
        archive.clone(),
        gateway,
        store.clone(),
        fast_config(),
    );

    // Act
    let result = pipeline
        .ingest_collection_cancellable(
            "test",
            None,
            1000,
            100,
            &SilentReporter,
            CancellationToken::new(),
        )
        .await
        .unwrap();

    // Assert: the record landed, then the empty page at before=900 skipped
    // the cursor past the start epoch
    assert_eq!(result.status, IngestStatus::Exhausted);
    assert_eq!(result.stats.records_upserted, 1);
    assert_eq!(result.stats.dead_zone_skips, 1);
    assert_eq!(archive.call_count(), 2);
}

#[tokio::test]
async fn test_sparse_record_with_small_skip_terminates() {
    // Arrange: one record far above end_epoch, and a skip_time much smaller
    // than the dead zone below it. Every page after the skip re-surfaces the
    // same record; the cursor must not oscillate back down to it.
    let config = IngestConfig {
        skip_time: 600,
        ..fast_config()
    };
    let archive = MockArchive::new(vec![candidate("a", 5000)]);
    let gateway = MockGateway::new(vec![record("a", 5000)]);
    let store = MockStore::new();
    let pipeline =
        IngestionPipeline::with_config(archive, gateway, store.clone(), config);

    // Act: bounded wait so a regression fails instead of hanging
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        pipeline.ingest_collection_cancellable(
            "test",
            None,
            10_000,
            0,
            &SilentReporter,
            CancellationToken::new(),
        ),
    )
    .await
    .expect("ingestion must terminate")
    .unwrap();

    // Assert: the record landed once, and repeated skips walked the cursor
    // past the start epoch
    assert_eq!(result.status, IngestStatus::Exhausted);
    assert_eq!(store.len(), 1);
    assert!(result.stats.records_upserted >= 1);
    assert!(result.stats.dead_zone_skips >= 2);
}

#[tokio::test]
async fn test_merge_keeps_creation_fields_immutable() {
    // Arrange
    let archive = MockArchive::new(vec![candidate("a", 500)]);
    let gateway = MockGateway::new(vec![record("a", 500)]);
    let store = MockStore::new();
    let pipeline = IngestionPipeline::with_config(
        archive,
        gateway.clone(),
        store.clone(),
        fast_config(),
    );

    pipeline
        .ingest_collection("test", None, 1000, 500)
        .await
        .unwrap();

    // A later corrupted re-fetch reports different creation timestamps
    let mut altered = record("a", 777);
    altered.ups = 42;
    altered.title = "edited".to_string();
    gateway.update_record(altered);

    // Act
    pipeline
        .ingest_collection("test", None, 1000, 500)
        .await
        .unwrap();

    // Assert: mutable fields overwritten, creation anchors untouched
    let stored = store.get("test", "a").unwrap();
    assert_eq!(stored.ups, 42);
    assert_eq!(stored.title, "edited");
    assert_eq!(stored.created, 500);
    assert_eq!(stored.created_utc, 500);
}

#[tokio::test]
async fn test_cancelled_token_stops_before_any_fetch() {
    // Arrange
    let archive = MockArchive::new(vec![candidate("a", 500)]);
    let gateway = MockGateway::new(vec![record("a", 500)]);
    let store = MockStore::new();
    let pipeline = IngestionPipeline::with_config(
        archive.clone(),
        gateway,
        store.clone(),
        fast_config(),
    );

    let token = CancellationToken::new();
    token.cancel();

    // Act
    let result = pipeline
        .ingest_collection_cancellable("test", None, 1000, 100, &SilentReporter, token)
        .await
        .unwrap();

    // Assert
    assert!(result.is_cancelled());
    assert_eq!(archive.call_count(), 0);
    assert_eq!(store.len(), 0);
}

#[tokio::test]
async fn test_transient_search_failure_is_retried() {
    // Arrange: the first search call fails, the retry succeeds
    let archive = MockArchive::new(vec![candidate("a", 100)]).with_failures(1);
    let gateway = MockGateway::new(vec![record("a", 100)]);
    let store = MockStore::new();
    let pipeline =
        IngestionPipeline::with_config(archive, gateway, store.clone(), fast_config());

    // Act
    let stats = pipeline
        .ingest_collection("test", None, 1000, 100)
        .await
        .unwrap();

    // Assert
    assert_eq!(stats.records_upserted, 1);
    assert_eq!(stats.pages_fetched, 1);
    assert_eq!(stats.pages_skipped, 0);
}

#[tokio::test]
async fn test_failed_resolve_chunk_is_skipped_not_fatal() {
    // Arrange: the gateway stays down longer than the retry budget
    let config = IngestConfig {
        max_retries: 0,
        wait: Duration::from_millis(1),
        ..IngestConfig::default()
    };
    let archive = MockArchive::new(vec![candidate("a", 500)]);
    let gateway = MockGateway::new(vec![record("a", 500)]).with_failures(10);
    let store = MockStore::new();
    let pipeline = IngestionPipeline::with_config(archive, gateway, store.clone(), config);

    // Act
    let result = pipeline
        .ingest_collection_cancellable(
            "test",
            None,
            1000,
            100,
            &SilentReporter,
            CancellationToken::new(),
        )
        .await
        .unwrap();

    // Assert: the chunk was dropped and the run still terminated cleanly
    assert!(result.stats.chunks_skipped >= 1);
    assert_eq!(result.stats.records_upserted, 0);
    assert_eq!(store.len(), 0);
    assert_eq!(result.status, IngestStatus::Exhausted);
}

#[tokio::test]
async fn test_select_orders_and_filters() {
    // Arrange
    let store = MockStore::new();
    let mut removed = record("gone", 300);
    removed.removed = true;

    use magpie_core::traits::RecordStore;
    store
        .upsert_many(
            "test",
            &[record("new", 900), record("old", 100), removed],
        )
        .await
        .unwrap();

    // Act
    let all = store.select("test", None, true).await.unwrap();
    let visible = store.select("test", None, false).await.unwrap();
    let ranged = store.select("test", Some((100, 900)), true).await.unwrap();

    // Assert
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].id, "old"); // ascending by created_utc
    assert_eq!(visible.len(), 2);
    assert_eq!(ranged.len(), 2); // end bound is exclusive
}
