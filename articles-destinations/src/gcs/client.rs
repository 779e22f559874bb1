use std::fmt;

use articles::bail;
use articles::error::{ErrorKind, SyncError, SyncResult};
use articles::store::BlobStore;
use articles::sync_error;
use async_trait::async_trait;
use bytes::Bytes;
use gcp_bigquery_client::yup_oauth2::authenticator::{
    ApplicationDefaultCredentialsTypes, DefaultAuthenticator,
};
use gcp_bigquery_client::yup_oauth2::{
    ApplicationDefaultCredentialsAuthenticator, ApplicationDefaultCredentialsFlowOpts,
    ServiceAccountAuthenticator, ServiceAccountKey, parse_service_account_key,
    read_service_account_key,
};
use reqwest::{StatusCode, header};
use serde::Deserialize;
use tracing::debug;

/// Public Cloud Storage JSON API endpoint.
const GCS_BASE_URL: &str = "https://storage.googleapis.com";

/// OAuth scope for reading and writing objects.
const GCS_READ_WRITE_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";

/// Page of a `objects.list` response, restricted to the fields we request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListObjectsPage {
    #[serde(default)]
    items: Vec<ObjectItem>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectItem {
    name: String,
}

/// Converts a transport error into a source error.
fn reqwest_error_to_sync_error(err: reqwest::Error) -> SyncError {
    let description = if err.is_timeout() {
        "Cloud Storage request timed out"
    } else if err.is_decode() {
        "Cloud Storage response could not be decoded"
    } else {
        "Cloud Storage request failed"
    };

    sync_error!(ErrorKind::SourceIoError, description, err.to_string(), source: err)
}

/// Classifies a non-success Cloud Storage response.
fn status_to_sync_error(status: StatusCode, resource: &str, body: &str) -> SyncError {
    let (kind, description) = match status {
        StatusCode::NOT_FOUND => (ErrorKind::SourceObjectMissing, "Cloud Storage object not found"),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => (
            ErrorKind::AuthenticationError,
            "Cloud Storage denied access",
        ),
        _ => (ErrorKind::SourceIoError, "Cloud Storage request failed"),
    };

    sync_error!(kind, description, format!("{status} for {resource}: {body}"))
}

/// Client for the Cloud Storage JSON API.
///
/// Requests are authenticated with an OAuth token from a service account or the application
/// default credentials. A client built with [`GcsClient::new_with_custom_url`] sends requests
/// without credentials, which is what storage emulators expect.
#[derive(Clone)]
pub struct GcsClient {
    http: reqwest::Client,
    base_url: String,
    authenticator: Option<DefaultAuthenticator>,
}

impl GcsClient {
    /// Creates a new [`GcsClient`] from a service account key file.
    pub async fn new_with_key_path(sa_key_file: &str) -> SyncResult<GcsClient> {
        let sa_key = read_service_account_key(sa_key_file).await.map_err(|err| {
            sync_error!(
                ErrorKind::AuthenticationError,
                "Invalid Cloud Storage service account key file",
                err.to_string(),
                source: err
            )
        })?;

        Self::new_with_service_account_key(sa_key).await
    }

    /// Creates a new [`GcsClient`] from a service account key JSON string.
    pub async fn new_with_key(sa_key: &str) -> SyncResult<GcsClient> {
        let sa_key = parse_service_account_key(sa_key).map_err(|err| {
            sync_error!(
                ErrorKind::AuthenticationError,
                "Invalid Cloud Storage service account key",
                err.to_string(),
                source: err
            )
        })?;

        Self::new_with_service_account_key(sa_key).await
    }

    /// Creates a new [`GcsClient`] using Application Default Credentials.
    pub async fn new_with_adc() -> SyncResult<GcsClient> {
        let opts = ApplicationDefaultCredentialsFlowOpts::default();
        let authenticator = match ApplicationDefaultCredentialsAuthenticator::builder(opts).await {
            ApplicationDefaultCredentialsTypes::ServiceAccount(builder) => builder.build().await,
            ApplicationDefaultCredentialsTypes::InstanceMetadata(builder) => builder.build().await,
        }
        .map_err(|err| {
            sync_error!(
                ErrorKind::AuthenticationError,
                "Invalid Cloud Storage application default credentials",
                err.to_string(),
                source: err
            )
        })?;

        Ok(Self::with_authenticator(GCS_BASE_URL, Some(authenticator)))
    }

    /// Creates a new unauthenticated [`GcsClient`] talking to `base_url`.
    ///
    /// Intended for storage emulators and local development.
    pub fn new_with_custom_url(base_url: impl Into<String>) -> GcsClient {
        Self::with_authenticator(base_url, None)
    }

    async fn new_with_service_account_key(sa_key: ServiceAccountKey) -> SyncResult<GcsClient> {
        let authenticator = ServiceAccountAuthenticator::builder(sa_key)
            .build()
            .await
            .map_err(|err| {
                sync_error!(
                    ErrorKind::AuthenticationError,
                    "Invalid Cloud Storage service account authenticator",
                    err.to_string(),
                    source: err
                )
            })?;

        Ok(Self::with_authenticator(GCS_BASE_URL, Some(authenticator)))
    }

    fn with_authenticator(
        base_url: impl Into<String>,
        authenticator: Option<DefaultAuthenticator>,
    ) -> GcsClient {
        let base_url: String = base_url.into();

        GcsClient {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            authenticator,
        }
    }

    fn objects_url(&self, bucket: &str) -> String {
        format!(
            "{}/storage/v1/b/{}/o",
            self.base_url,
            urlencoding::encode(bucket)
        )
    }

    fn object_url(&self, bucket: &str, object_name: &str) -> String {
        format!(
            "{}/{}",
            self.objects_url(bucket),
            urlencoding::encode(object_name)
        )
    }

    fn upload_url(&self, bucket: &str) -> String {
        format!(
            "{}/upload/storage/v1/b/{}/o",
            self.base_url,
            urlencoding::encode(bucket)
        )
    }

    async fn bearer_token(&self) -> SyncResult<Option<String>> {
        let Some(authenticator) = &self.authenticator else {
            return Ok(None);
        };

        let token = authenticator
            .token(&[GCS_READ_WRITE_SCOPE])
            .await
            .map_err(|err| {
                sync_error!(
                    ErrorKind::AuthenticationError,
                    "Failed to obtain a Cloud Storage access token",
                    err.to_string(),
                    source: err
                )
            })?;

        match token.token() {
            Some(token) => Ok(Some(token.to_string())),
            None => bail!(
                ErrorKind::AuthenticationError,
                "Cloud Storage access token is empty"
            ),
        }
    }

    /// Sends `request` with credentials and fails on any non-success status.
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        resource: &str,
    ) -> SyncResult<reqwest::Response> {
        let request = match self.bearer_token().await? {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await.map_err(reqwest_error_to_sync_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_to_sync_error(status, resource, &body));
        }

        Ok(response)
    }
}

#[async_trait]
impl BlobStore for GcsClient {
    fn name(&self) -> &'static str {
        "gcs"
    }

    async fn list_objects(&self, bucket: &str) -> SyncResult<Vec<String>> {
        let url = self.objects_url(bucket);
        let resource = format!("gs://{bucket}");
        let mut object_names = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(&url)
                .query(&[("fields", "items(name),nextPageToken")]);
            if let Some(page_token) = &page_token {
                request = request.query(&[("pageToken", page_token)]);
            }

            let page: ListObjectsPage = self
                .send(request, &resource)
                .await?
                .json()
                .await
                .map_err(reqwest_error_to_sync_error)?;

            object_names.extend(page.items.into_iter().map(|item| item.name));

            match page.next_page_token {
                Some(next_page_token) => page_token = Some(next_page_token),
                None => break,
            }
        }

        debug!(bucket, objects = object_names.len(), "listed cloud storage objects");

        Ok(object_names)
    }

    async fn read_object(&self, bucket: &str, object_name: &str) -> SyncResult<Bytes> {
        let request = self
            .http
            .get(self.object_url(bucket, object_name))
            .query(&[("alt", "media")]);
        let resource = format!("gs://{bucket}/{object_name}");

        let content = self
            .send(request, &resource)
            .await?
            .bytes()
            .await
            .map_err(reqwest_error_to_sync_error)?;

        debug!(bucket, object_name, bytes = content.len(), "downloaded cloud storage object");

        Ok(content)
    }

    async fn write_object(
        &self,
        bucket: &str,
        object_name: &str,
        content_type: &str,
        content: Bytes,
    ) -> SyncResult<()> {
        let request = self
            .http
            .post(self.upload_url(bucket))
            .query(&[("uploadType", "media"), ("name", object_name)])
            .header(header::CONTENT_TYPE, content_type)
            .body(content);
        let resource = format!("gs://{bucket}/{object_name}");

        self.send(request, &resource).await?;

        debug!(bucket, object_name, "uploaded cloud storage object");

        Ok(())
    }
}

impl fmt::Debug for GcsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcsClient")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.authenticator.is_some())
            .finish()
    }
}
