use actix_web::{
    HttpResponse, Responder, ResponseError,
    http::{StatusCode, header::ContentType},
    post,
    web::{Bytes, Data, Json},
};
use articles::error::SyncError;
use articles::sync::{SnapshotSource, SnapshotSync};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};
use utoipa::ToSchema;

use crate::routes::ErrorMessage;

/// Settings applied when a request does not name its source.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Bucket used when the request carries no `bucket`.
    pub bucket: String,
}

#[derive(Debug, Error)]
pub enum SyncRequestError {
    #[error("Invalid request body: {0}")]
    InvalidBody(#[source] serde_json::Error),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

impl SyncRequestError {
    pub fn to_message(&self) -> String {
        match self {
            SyncRequestError::InvalidBody(_) => self.to_string(),
            SyncRequestError::Sync(err) if err.is_no_data() => err.description().to_string(),
            // Details may carry storage responses, only the stage is reported.
            SyncRequestError::Sync(err) => format!("Sync failed: {}", err.description()),
        }
    }
}

impl ResponseError for SyncRequestError {
    fn status_code(&self) -> StatusCode {
        match self {
            SyncRequestError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            SyncRequestError::Sync(err) if err.is_no_data() => StatusCode::NOT_FOUND,
            SyncRequestError::Sync(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let error_message = ErrorMessage {
            error: self.to_message(),
        };
        let body =
            serde_json::to_string(&error_message).expect("failed to serialize error message");
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(body)
    }
}

#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct SyncRequest {
    /// Bucket to read from instead of the configured one.
    #[schema(example = "rappler-articles")]
    #[serde(default)]
    pub bucket: Option<String>,
    /// Object to reconcile instead of the latest snapshot.
    #[schema(example = "rappler_articles_2024-03-05_10-00-00.json")]
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SyncResponse {
    #[schema(example = "Upsert completed successfully")]
    pub message: String,
    #[schema(example = "rappler_articles_2024-03-05_10-00-00.json")]
    pub object_name: String,
    #[schema(example = 42)]
    pub records_merged: usize,
}

/// Parses an optional JSON body. An empty body means "use the defaults".
fn parse_sync_request(body: &[u8]) -> Result<SyncRequest, SyncRequestError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(SyncRequest::default());
    }

    serde_json::from_slice(body).map_err(SyncRequestError::InvalidBody)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

#[utoipa::path(
    summary = "Reconcile a snapshot",
    description = "Upserts the latest snapshot of the bucket, or the named object, into the target table.",
    request_body(content = SyncRequest, description = "Optional source override, may be empty"),
    responses(
        (status = 200, description = "Snapshot reconciled", body = SyncResponse),
        (status = 400, description = "Bad request", body = ErrorMessage),
        (status = 404, description = "No data to reconcile", body = ErrorMessage),
        (status = 500, description = "Internal server error", body = ErrorMessage)
    ),
    tag = "Sync"
)]
#[post("/")]
pub async fn sync_snapshot(
    snapshot_sync: Data<SnapshotSync>,
    settings: Data<SyncSettings>,
    body: Bytes,
) -> Result<impl Responder, SyncRequestError> {
    let request = parse_sync_request(&body)?;

    let bucket = non_blank(request.bucket).unwrap_or_else(|| settings.bucket.clone());
    let source = match non_blank(request.name) {
        Some(object_name) => SnapshotSource::object(bucket, object_name),
        None => SnapshotSource::latest(bucket),
    };

    let report = snapshot_sync.run(&source).await.inspect_err(|err| {
        if err.is_no_data() {
            info!(bucket = %source.bucket, error = %err, "nothing to reconcile");
        } else {
            error!(bucket = %source.bucket, error = %err, "snapshot sync failed");
        }
    })?;

    let response = SyncResponse {
        message: "Upsert completed successfully".to_string(),
        object_name: report.object_name,
        records_merged: report.reconcile.records_merged,
    };

    Ok(Json(response))
}
