#![cfg(feature = "bigquery")]

use std::sync::Arc;

use articles::error::ErrorKind;
use articles::reconcile::{Reconciler, staging_table_id};
use articles::store::TableStore;
use articles::types::{ARTICLE_COLUMNS, ArticleRecord, TableRef};
use articles_destinations::bigquery::{BigQueryClient, BigQueryTableStore};
use articles_telemetry::tracing::init_test_tracing;
use chrono::{TimeZone, Utc};

/// Environment variable name for the BigQuery project id.
const BIGQUERY_PROJECT_ID_ENV_NAME: &str = "TESTS_BIGQUERY_PROJECT_ID";
/// Environment variable name for the BigQuery dataset id.
const BIGQUERY_DATASET_ID_ENV_NAME: &str = "TESTS_BIGQUERY_DATASET_ID";
/// Environment variable name for the BigQuery service account key path.
const BIGQUERY_SA_KEY_PATH_ENV_NAME: &str = "TESTS_BIGQUERY_SA_KEY_PATH";

/// Builds a store against a real BigQuery dataset, or `None` when the tests are not configured.
async fn bigquery_store() -> Option<(BigQueryTableStore, TableRef)> {
    let (Ok(project_id), Ok(dataset_id), Ok(sa_key_path)) = (
        std::env::var(BIGQUERY_PROJECT_ID_ENV_NAME),
        std::env::var(BIGQUERY_DATASET_ID_ENV_NAME),
        std::env::var(BIGQUERY_SA_KEY_PATH_ENV_NAME),
    ) else {
        eprintln!("skipping bigquery test, {BIGQUERY_PROJECT_ID_ENV_NAME} is not configured");
        return None;
    };

    let client = BigQueryClient::new_with_key_path(project_id.clone(), &sa_key_path, 60_000)
        .await
        .unwrap();
    let target = TableRef::new(project_id, dataset_id, staging_table_id("articles_test"));

    Some((BigQueryTableStore::new(client), target))
}

fn record(id: &str, title: &str) -> ArticleRecord {
    ArticleRecord {
        article_id: id.to_string(),
        published_at: Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap(),
        title: title.to_string(),
        link: format!("https://www.rappler.com/{id}/"),
        categories: vec!["nation".to_string()],
        tags: vec![],
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn reconciles_into_bigquery_table() {
    init_test_tracing();

    let Some((store, target)) = bigquery_store().await else {
        return;
    };
    store.create_table(&target, ARTICLE_COLUMNS).await.unwrap();

    let reconciler = Reconciler::new(Arc::new(store.clone()), target.clone());
    let first = reconciler
        .reconcile(vec![record("1", "old"), record("2", "x")])
        .await;
    let second = reconciler
        .reconcile(vec![record("1", "new"), record("3", "y")])
        .await;

    let staging_exists = match &second {
        Ok(report) => store
            .client()
            .table_exists(&report.staging_table)
            .await
            .unwrap(),
        Err(_) => false,
    };
    store.drop_table(&target).await.unwrap();

    assert_eq!(first.unwrap().affected_rows, Some(2));
    assert_eq!(second.unwrap().affected_rows, Some(2));
    assert!(!staging_exists);
}

#[tokio::test(flavor = "multi_thread")]
async fn dropping_a_missing_table_is_reported() {
    init_test_tracing();

    let Some((store, target)) = bigquery_store().await else {
        return;
    };

    let err = store.drop_table(&target).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DestinationTableMissing);
}
