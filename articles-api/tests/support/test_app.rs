#![allow(dead_code)]

use std::net::TcpListener;
use std::sync::Arc;

use articles::harvest::publish_snapshot;
use articles::reconcile::Reconciler;
use articles::store::memory::{MemoryBlobStore, MemoryTableStore};
use articles::sync::SnapshotSync;
use articles::types::{ArticleRecord, TableRef};
use articles_api::routes::sync::SyncSettings;
use articles_api::startup::run;
use chrono::{DateTime, TimeZone, Utc};

pub const BUCKET: &str = "rappler-snapshots";

pub struct TestApp {
    pub address: String,
    pub api_client: reqwest::Client,
    pub blobs: MemoryBlobStore,
    pub tables: MemoryTableStore,
    server_handle: tokio::task::JoinHandle<std::io::Result<()>>,
}

impl TestApp {
    pub fn target_table(&self) -> TableRef {
        target_table()
    }

    /// Publishes `records` as the snapshot taken at `created_at`.
    pub async fn publish(&self, records: &[ArticleRecord], created_at: DateTime<Utc>) -> String {
        publish_snapshot(&self.blobs, BUCKET, records, created_at)
            .await
            .expect("failed to publish snapshot")
            .object_name()
            .to_string()
    }

    pub async fn trigger_sync(&self) -> reqwest::Response {
        self.api_client
            .post(format!("{}/", &self.address))
            .send()
            .await
            .expect("failed to execute request")
    }

    pub async fn trigger_sync_with_body(&self, body: &str) -> reqwest::Response {
        self.api_client
            .post(format!("{}/", &self.address))
            .header("content-type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .expect("failed to execute request")
    }

    pub async fn health_check(&self) -> reqwest::Response {
        self.api_client
            .get(format!("{}/health_check", &self.address))
            .send()
            .await
            .expect("failed to execute request")
    }

    pub async fn openapi(&self) -> reqwest::Response {
        self.api_client
            .get(format!("{}/api-docs/openapi.json", &self.address))
            .send()
            .await
            .expect("failed to execute request")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.server_handle.abort();
    }
}

pub fn target_table() -> TableRef {
    TableRef::new("test-project", "news", "articles")
}

pub fn snapshot_time(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, 10, 0, 0).unwrap()
}

pub fn record(id: &str, title: &str) -> ArticleRecord {
    ArticleRecord {
        article_id: id.to_string(),
        published_at: snapshot_time(1),
        title: title.to_string(),
        link: format!("https://www.rappler.com/{id}/"),
        categories: vec!["nation".to_string()],
        tags: vec![],
    }
}

/// Spawns the API on a random port, backed by in-memory stores holding an empty target table.
pub async fn spawn_test_app() -> TestApp {
    let base_address = "127.0.0.1";
    let listener =
        TcpListener::bind(format!("{base_address}:0")).expect("failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    let blobs = MemoryBlobStore::new();
    blobs.create_bucket(BUCKET).await;

    let tables = MemoryTableStore::new();
    tables.insert_table(target_table(), vec![]).await;

    let snapshot_sync = SnapshotSync::new(
        Arc::new(blobs.clone()),
        Reconciler::new(Arc::new(tables.clone()), target_table()),
    );
    let settings = SyncSettings {
        bucket: BUCKET.to_string(),
    };

    let server = run(listener, snapshot_sync, settings).expect("failed to build server");
    let server_handle = tokio::spawn(server);

    TestApp {
        address: format!("http://{base_address}:{port}"),
        api_client: reqwest::Client::new(),
        blobs,
        tables,
        server_handle,
    }
}
