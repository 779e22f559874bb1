use std::net::TcpListener;
use std::sync::Arc;

use actix_web::{App, HttpServer, dev::Server, web};
use anyhow::Context;
use articles::reconcile::Reconciler;
use articles::store::{BlobStore, TableStore};
use articles::sync::SnapshotSync;
use articles::types::TableRef;
use articles_config::shared::{BigQueryCredentials, DestinationConfig, SourceConfig};
use articles_destinations::bigquery::{BigQueryClient, BigQueryTableStore};
use articles_destinations::gcs::GcsClient;
use secrecy::ExposeSecret;
use tracing::info;
use tracing_actix_web::TracingLogger;
use utoipa::OpenApi;

use crate::config::ApiConfig;
use crate::routes::ErrorMessage;
use crate::routes::health_check::health_check;
use crate::routes::sync::{SyncRequest, SyncResponse, SyncSettings, sync_snapshot};

/// Sync API application server wrapper.
pub struct Application {
    port: u16,
    server: Server,
}

impl Application {
    /// Builds the server from `config`.
    ///
    /// Creates the BigQuery and Cloud Storage clients once; every request shares them.
    pub async fn build(config: ApiConfig) -> anyhow::Result<Self> {
        let address = format!("{}:{}", config.application.host, config.application.port);
        let listener = TcpListener::bind(&address)
            .with_context(|| format!("binding the server to {address}"))?;
        let port = listener.local_addr()?.port();

        let table_store = build_table_store(&config.destination).await?;
        let blob_store = build_blob_store(&config.source, &config.destination).await?;

        let target = TableRef::new(
            config.destination.project_id.clone(),
            config.destination.dataset_id.clone(),
            config.destination.table_id.clone(),
        );
        let snapshot_sync = SnapshotSync::new(blob_store, Reconciler::new(table_store, target));
        let settings = SyncSettings {
            bucket: config.source.bucket_name.clone(),
        };

        let server = run(listener, snapshot_sync, settings)?;

        Ok(Self { port, server })
    }

    /// Returns the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Runs the server until it receives a shutdown signal.
    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        self.server.await
    }
}

async fn build_table_store(config: &DestinationConfig) -> anyhow::Result<Arc<dyn TableStore>> {
    let project_id = config.project_id.clone();
    let timeout = config.query_timeout_ms;

    let client = match config.credentials() {
        BigQueryCredentials::Key(key) => {
            BigQueryClient::new_with_key(project_id, key.expose_secret(), timeout).await
        }
        BigQueryCredentials::KeyPath(path) => {
            BigQueryClient::new_with_key_path(project_id, path, timeout).await
        }
        BigQueryCredentials::ApplicationDefault => {
            BigQueryClient::new_with_adc(project_id, timeout).await
        }
    }
    .context("creating the BigQuery client")?;

    Ok(Arc::new(BigQueryTableStore::new(client)))
}

async fn build_blob_store(
    source: &SourceConfig,
    destination: &DestinationConfig,
) -> anyhow::Result<Arc<dyn BlobStore>> {
    if let Some(endpoint) = &source.endpoint {
        info!(endpoint, "using custom cloud storage endpoint without credentials");
        return Ok(Arc::new(GcsClient::new_with_custom_url(endpoint.as_str())));
    }

    let client = match destination.credentials() {
        BigQueryCredentials::Key(key) => GcsClient::new_with_key(key.expose_secret()).await,
        BigQueryCredentials::KeyPath(path) => GcsClient::new_with_key_path(path).await,
        BigQueryCredentials::ApplicationDefault => GcsClient::new_with_adc().await,
    }
    .context("creating the Cloud Storage client")?;

    Ok(Arc::new(client))
}

/// Creates the HTTP server for an already built [`SnapshotSync`].
pub fn run(
    listener: TcpListener,
    snapshot_sync: SnapshotSync,
    settings: SyncSettings,
) -> Result<Server, anyhow::Error> {
    let snapshot_sync = web::Data::new(snapshot_sync);
    let settings = web::Data::new(settings);

    #[derive(OpenApi)]
    #[openapi(
        paths(
            crate::routes::health_check::health_check,
            crate::routes::sync::sync_snapshot,
        ),
        components(schemas(ErrorMessage, SyncRequest, SyncResponse))
    )]
    struct ApiDoc;

    let openapi = ApiDoc::openapi();

    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .service(health_check)
            .service(sync_snapshot)
            .route(
                "/api-docs/openapi.json",
                web::get().to({
                    let openapi = openapi.clone();
                    move || {
                        let openapi = openapi.clone();
                        async move { web::Json(openapi) }
                    }
                }),
            )
            .app_data(snapshot_sync.clone())
            .app_data(settings.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}
