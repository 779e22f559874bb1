use std::sync::Arc;

use articles::error::ErrorKind;
use articles::reconcile::Reconciler;
use articles::snapshot::{SNAPSHOT_CONTENT_TYPE, encode_snapshot};
use articles::store::BlobStore;
use articles::store::memory::{BlobOperation, MemoryBlobStore, MemoryTableStore};
use articles::sync::{SnapshotSource, SnapshotSync};
use articles::types::ArticleRecord;
use articles_telemetry::tracing::init_test_tracing;
use bytes::Bytes;

mod common;

use common::{record, row, sorted, target_table};

const BUCKET: &str = "rappler-snapshots";

struct TestSync {
    blobs: MemoryBlobStore,
    tables: MemoryTableStore,
    sync: SnapshotSync,
}

async fn test_sync() -> TestSync {
    let blobs = MemoryBlobStore::new();
    blobs.create_bucket(BUCKET).await;

    let tables = MemoryTableStore::new();
    tables.insert_table(target_table(), vec![]).await;

    let reconciler = Reconciler::new(Arc::new(tables.clone()), target_table());
    let sync = SnapshotSync::new(Arc::new(blobs.clone()), reconciler);

    TestSync {
        blobs,
        tables,
        sync,
    }
}

async fn put_snapshot(blobs: &MemoryBlobStore, object_name: &str, records: &[ArticleRecord]) {
    let content = encode_snapshot(records).unwrap();
    blobs
        .write_object(
            BUCKET,
            object_name,
            SNAPSHOT_CONTENT_TYPE,
            Bytes::from(content),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn reconciles_the_latest_snapshot() {
    init_test_tracing();

    let test = test_sync().await;
    put_snapshot(
        &test.blobs,
        "rappler_articles_2024-01-01_00-00-00.json",
        &[record("old", "from an old snapshot")],
    )
    .await;
    put_snapshot(
        &test.blobs,
        "rappler_articles_2024-03-05_10-00-00.json",
        &[record("a1", "T1")],
    )
    .await;
    put_snapshot(&test.blobs, "notes.txt", &[record("x", "ignored")]).await;

    let report = test.sync.run(&SnapshotSource::latest(BUCKET)).await.unwrap();

    assert_eq!(report.bucket, BUCKET);
    assert_eq!(
        report.object_name,
        "rappler_articles_2024-03-05_10-00-00.json"
    );
    assert_eq!(report.reconcile.records_merged, 1);
    assert_eq!(
        test.tables.table_rows(&target_table()).await.unwrap(),
        vec![row("a1", "T1")]
    );
}

#[tokio::test]
async fn reconciles_an_explicit_object() {
    init_test_tracing();

    let test = test_sync().await;
    put_snapshot(
        &test.blobs,
        "rappler_articles_2024-01-01_00-00-00.json",
        &[record("1", "one"), record("2", "two")],
    )
    .await;
    put_snapshot(
        &test.blobs,
        "rappler_articles_2024-03-05_10-00-00.json",
        &[record("3", "three")],
    )
    .await;

    let source = SnapshotSource::object(BUCKET, "rappler_articles_2024-01-01_00-00-00.json");
    let report = test.sync.run(&source).await.unwrap();

    assert_eq!(report.reconcile.records_merged, 2);
    assert_eq!(
        sorted(test.tables.table_rows(&target_table()).await.unwrap()),
        vec![row("1", "one"), row("2", "two")]
    );
}

#[tokio::test]
async fn bucket_without_snapshots_is_no_snapshot_found() {
    init_test_tracing();

    let test = test_sync().await;
    put_snapshot(&test.blobs, "articles.json", &[record("1", "t")]).await;

    let err = test
        .sync
        .run(&SnapshotSource::latest(BUCKET))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NoSnapshotFound);
    assert!(err.is_no_data());
    assert!(test.tables.operations().await.is_empty());
}

#[tokio::test]
async fn empty_snapshot_is_no_data() {
    init_test_tracing();

    let test = test_sync().await;
    put_snapshot(
        &test.blobs,
        "rappler_articles_2024-03-05_10-00-00.json",
        &[],
    )
    .await;

    let err = test
        .sync
        .run(&SnapshotSource::latest(BUCKET))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NoData);
    assert!(test.tables.operations().await.is_empty());
}

#[tokio::test]
async fn listing_failure_is_a_source_error() {
    init_test_tracing();

    let test = test_sync().await;
    test.blobs.fail_on(BlobOperation::ListObjects).await;

    let err = test
        .sync
        .run(&SnapshotSource::latest(BUCKET))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SourceIoError);
    assert!(test.tables.operations().await.is_empty());
}

#[tokio::test]
async fn missing_explicit_object_is_reported() {
    init_test_tracing();

    let test = test_sync().await;

    let source = SnapshotSource::object(BUCKET, "rappler_articles_2024-03-05_10-00-00.json");
    let err = test.sync.run(&source).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SourceObjectMissing);
}

#[tokio::test]
async fn malformed_snapshot_is_a_deserialization_error() {
    init_test_tracing();

    let test = test_sync().await;
    test.blobs
        .write_object(
            BUCKET,
            "rappler_articles_2024-03-05_10-00-00.json",
            SNAPSHOT_CONTENT_TYPE,
            Bytes::from_static(b"{\"not\": \"a list\"}"),
        )
        .await
        .unwrap();

    let err = test
        .sync
        .run(&SnapshotSource::latest(BUCKET))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DeserializationError);
    assert!(test.tables.operations().await.is_empty());
}

#[tokio::test]
async fn snapshot_timestamps_without_offset_are_utc() {
    init_test_tracing();

    let test = test_sync().await;
    test.blobs
        .write_object(
            BUCKET,
            "rappler_articles_2024-06-01_12-00-00.json",
            SNAPSHOT_CONTENT_TYPE,
            Bytes::from_static(
                br#"[
                    {"article_id": "a1", "datetime": "2024-06-01 12:00:00", "title": "T1", "link": "https://www.rappler.com/a1/"},
                    {"article_id": "a2", "datetime": "2024-06-01T12:00:00", "title": "T2", "link": "https://www.rappler.com/a2/"}
                ]"#,
            ),
        )
        .await
        .unwrap();

    let report = test.sync.run(&SnapshotSource::latest(BUCKET)).await.unwrap();

    assert_eq!(report.reconcile.records_merged, 2);
    assert_eq!(
        sorted(test.tables.table_rows(&target_table()).await.unwrap()),
        vec![row("a1", "T1"), row("a2", "T2")]
    );
}
