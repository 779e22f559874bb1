use articles::bail;
use articles::error::{ErrorKind, SyncError, SyncResult};
use articles::sync_error;
use articles::types::{ArticleRow, ColumnSchema, ColumnType as ArticleColumnType, TableRef};
use gcp_bigquery_client::client_builder::ClientBuilder;
use gcp_bigquery_client::google::cloud::bigquery::storage::v1::RowError;
use gcp_bigquery_client::model::get_query_results_parameters::GetQueryResultsParameters;
use gcp_bigquery_client::yup_oauth2::parse_service_account_key;
use gcp_bigquery_client::{
    Client,
    error::BQError,
    model::query_request::QueryRequest,
    storage::{ColumnMode, ColumnType, FieldDescriptor, StreamName, TableBatch, TableDescriptor},
};
use std::fmt;
use tracing::{debug, info};

use crate::bigquery::encoding::BigQueryArticleRow;

/// Trace identifier attached to Storage Write API requests.
const ARTICLES_TRACE_ID: &str = "articles BigQueryClient";

/// Outcome of a completed query job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOutcome {
    /// Rows modified by a DML statement, when BigQuery reports it.
    pub affected_rows: Option<u64>,
}

/// Converts BigQuery errors to sync errors with appropriate classification.
pub(crate) fn bq_error_to_sync_error(err: BQError) -> SyncError {
    let (kind, description) = match &err {
        // Authentication related errors
        BQError::InvalidServiceAccountKey(_) => (
            ErrorKind::AuthenticationError,
            "Invalid BigQuery service account key",
        ),
        BQError::InvalidServiceAccountAuthenticator(_) => (
            ErrorKind::AuthenticationError,
            "Invalid BigQuery service account authenticator",
        ),
        BQError::InvalidInstalledFlowAuthenticator(_) => (
            ErrorKind::AuthenticationError,
            "Invalid BigQuery installed flow authenticator",
        ),
        BQError::InvalidApplicationDefaultCredentialsAuthenticator(_) => (
            ErrorKind::AuthenticationError,
            "Invalid BigQuery application default credentials",
        ),
        BQError::InvalidAuthorizedUserAuthenticator(_) => (
            ErrorKind::AuthenticationError,
            "Invalid BigQuery authorized user authenticator",
        ),
        BQError::AuthError(_) => (
            ErrorKind::AuthenticationError,
            "BigQuery authentication error",
        ),
        BQError::YupAuthError(_) => (
            ErrorKind::AuthenticationError,
            "BigQuery OAuth authentication error",
        ),
        BQError::NoToken => (
            ErrorKind::AuthenticationError,
            "BigQuery authentication token missing",
        ),

        // Network and transport errors
        BQError::RequestError(_) => (ErrorKind::DestinationIoError, "BigQuery request failed"),
        BQError::TonicTransportError(_) => {
            (ErrorKind::DestinationIoError, "BigQuery transport error")
        }

        // Query and data errors
        BQError::ResponseError { error } if error.error.code == 404 => (
            ErrorKind::DestinationTableMissing,
            "BigQuery entity not found",
        ),
        BQError::ResponseError { .. } => {
            (ErrorKind::DestinationQueryFailed, "BigQuery response error")
        }
        BQError::NoDataAvailable => (
            ErrorKind::InvalidData,
            "BigQuery result set positioning error",
        ),
        BQError::InvalidColumnIndex { .. } => {
            (ErrorKind::InvalidData, "BigQuery invalid column index")
        }
        BQError::InvalidColumnName { .. } => {
            (ErrorKind::InvalidData, "BigQuery invalid column name")
        }
        BQError::InvalidColumnType { .. } => {
            (ErrorKind::InvalidData, "BigQuery column type mismatch")
        }

        // Serialization errors
        BQError::SerializationError(_) => (
            ErrorKind::SerializationError,
            "BigQuery JSON serialization error",
        ),

        // gRPC errors
        BQError::TonicInvalidMetadataValueError(_) => {
            (ErrorKind::InvalidData, "BigQuery invalid metadata value")
        }
        BQError::TonicStatusError(_) => (
            ErrorKind::DestinationError,
            "BigQuery Storage Write API request failed",
        ),

        // Concurrency and task errors
        BQError::SemaphorePermitError(_) => (
            ErrorKind::DestinationError,
            "BigQuery semaphore permit error",
        ),
        BQError::TokioTaskError(_) => {
            (ErrorKind::DestinationError, "BigQuery task execution error")
        }
        BQError::ConnectionPoolError(_) => (
            ErrorKind::DestinationError,
            "BigQuery connection pool error",
        ),
    };

    sync_error!(kind, description, err.to_string())
}

/// Converts a BigQuery row error to a sync error.
fn row_error_to_sync_error(err: RowError) -> SyncError {
    sync_error!(
        ErrorKind::DestinationError,
        "BigQuery rejected a row",
        format!("{err:?}")
    )
}

/// Client for the BigQuery tables holding articles.
///
/// Statements run as query jobs in the client's project and are awaited until the job is
/// done. Rows are written through the Storage Write API default stream.
#[derive(Clone)]
pub struct BigQueryClient {
    project_id: String,
    client: Client,
    query_timeout_ms: u32,
}

impl BigQueryClient {
    /// Creates a new [`BigQueryClient`] from a service account key file.
    pub async fn new_with_key_path(
        project_id: String,
        sa_key_file: &str,
        query_timeout_ms: u32,
    ) -> SyncResult<BigQueryClient> {
        let client = ClientBuilder::new()
            .build_from_service_account_key_file(sa_key_file)
            .await
            .map_err(bq_error_to_sync_error)?;

        Ok(BigQueryClient {
            project_id,
            client,
            query_timeout_ms,
        })
    }

    /// Creates a new [`BigQueryClient`] from a service account key JSON string.
    pub async fn new_with_key(
        project_id: String,
        sa_key: &str,
        query_timeout_ms: u32,
    ) -> SyncResult<BigQueryClient> {
        let sa_key = parse_service_account_key(sa_key)
            .map_err(BQError::from)
            .map_err(bq_error_to_sync_error)?;
        let client = ClientBuilder::new()
            .build_from_service_account_key(sa_key, false)
            .await
            .map_err(bq_error_to_sync_error)?;

        Ok(BigQueryClient {
            project_id,
            client,
            query_timeout_ms,
        })
    }

    /// Creates a new [`BigQueryClient`] using Application Default Credentials.
    pub async fn new_with_adc(
        project_id: String,
        query_timeout_ms: u32,
    ) -> SyncResult<BigQueryClient> {
        let client = ClientBuilder::new()
            .build_from_application_default_credentials()
            .await
            .map_err(bq_error_to_sync_error)?;

        Ok(BigQueryClient {
            project_id,
            client,
            query_timeout_ms,
        })
    }

    /// Project the query jobs run in.
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Creates a table with the given columns.
    pub async fn create_table(&self, table: &TableRef, columns: &[ColumnSchema]) -> SyncResult<()> {
        let query = Self::create_table_statement(table, columns)?;

        info!(%table, "creating table in bigquery");

        self.query(query).await?;

        Ok(())
    }

    /// Removes all rows of a table, keeping its schema.
    pub async fn truncate_table(&self, table: &TableRef) -> SyncResult<()> {
        let full_table_name = Self::full_table_name(table)?;

        info!(%full_table_name, "truncating table in bigquery");

        self.query(format!("truncate table {full_table_name}"))
            .await?;

        Ok(())
    }

    /// Drops a table.
    ///
    /// Fails with [`ErrorKind::DestinationTableMissing`] when the table does not exist.
    pub async fn drop_table(&self, table: &TableRef) -> SyncResult<()> {
        if !self.table_exists(table).await? {
            bail!(
                ErrorKind::DestinationTableMissing,
                "BigQuery table not found",
                table.to_string()
            );
        }

        let full_table_name = Self::full_table_name(table)?;

        info!(%full_table_name, "dropping table from bigquery");

        self.query(format!("drop table if exists {full_table_name}"))
            .await?;

        Ok(())
    }

    /// Checks whether a table exists.
    pub async fn table_exists(&self, table: &TableRef) -> SyncResult<bool> {
        let result = self
            .client
            .table()
            .get(&table.project_id, &table.dataset_id, &table.table_id, None)
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(BQError::ResponseError { error }) if error.error.code == 404 => Ok(false),
            Err(e) => Err(bq_error_to_sync_error(e)),
        }
    }

    /// Upserts `staging` into `target` with a single `MERGE` statement.
    pub async fn merge_tables(
        &self,
        target: &TableRef,
        staging: &TableRef,
        columns: &[ColumnSchema],
    ) -> SyncResult<QueryOutcome> {
        let query = Self::merge_statement(target, staging, columns)?;

        info!(%target, %staging, "merging tables in bigquery");

        self.query(query).await
    }

    /// Streams rows into a table through the Storage Write API default stream.
    ///
    /// Returns the number of rows written. Any row rejected by BigQuery fails the whole call.
    pub async fn append_rows(
        &self,
        table: &TableRef,
        columns: &[ColumnSchema],
        rows: Vec<ArticleRow>,
    ) -> SyncResult<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let row_count = rows.len();
        let stream_name = StreamName::new_default(
            table.project_id.clone(),
            table.dataset_id.clone(),
            table.table_id.clone(),
        );
        let table_batch = TableBatch::new(
            stream_name,
            Self::column_schemas_to_table_descriptor(columns).into(),
            rows.into_iter().map(BigQueryArticleRow).collect(),
        );

        debug!(%table, rows = row_count, "streaming rows to bigquery");

        let batch_append_results = self
            .client
            .storage()
            .append_table_batches_concurrent(vec![table_batch], ARTICLES_TRACE_ID)
            .await
            .map_err(bq_error_to_sync_error)?;

        let mut bytes_sent = 0;
        for batch_append_result in batch_append_results {
            bytes_sent += batch_append_result.bytes_sent;

            for response in batch_append_result.responses {
                let response = response
                    .map_err(BQError::from)
                    .map_err(bq_error_to_sync_error)?;

                if let Some(row_error) = response.row_errors.into_iter().next() {
                    return Err(row_error_to_sync_error(row_error));
                }
            }
        }

        debug!(%table, rows = row_count, bytes_sent, "streamed rows to bigquery");

        Ok(row_count)
    }

    /// Runs a statement and waits for its job to complete.
    ///
    /// `jobs.query` returns early when the job outlives the request timeout; the job is then
    /// polled with `jobs.getQueryResults` until BigQuery reports it complete. The polling loop
    /// has no deadline of its own: each poll is bounded only by the server-side long-poll
    /// timeout (`query_timeout_ms`), and a job that never completes keeps the caller waiting.
    pub async fn query(&self, query: String) -> SyncResult<QueryOutcome> {
        let mut request = QueryRequest::new(query);
        request.timeout_ms = Some(self.request_timeout_ms());

        let query_response = self
            .client
            .job()
            .query(&self.project_id, request)
            .await
            .map_err(bq_error_to_sync_error)?;

        if query_response.job_complete.unwrap_or(true) {
            return Ok(QueryOutcome {
                affected_rows: parse_affected_rows(query_response.num_dml_affected_rows.as_deref()),
            });
        }

        let Some(job_reference) = query_response.job_reference else {
            bail!(
                ErrorKind::DestinationQueryFailed,
                "BigQuery returned an incomplete job without a reference"
            );
        };
        let Some(job_id) = job_reference.job_id else {
            bail!(
                ErrorKind::DestinationQueryFailed,
                "BigQuery returned an incomplete job without an id"
            );
        };

        loop {
            debug!(%job_id, "waiting for bigquery job to complete");

            let parameters = GetQueryResultsParameters {
                location: job_reference.location.clone(),
                timeout_ms: Some(self.request_timeout_ms()),
                ..Default::default()
            };
            let results = self
                .client
                .job()
                .get_query_results(&self.project_id, &job_id, parameters)
                .await
                .map_err(bq_error_to_sync_error)?;

            if results.job_complete.unwrap_or(false) {
                return Ok(QueryOutcome {
                    affected_rows: parse_affected_rows(results.num_dml_affected_rows.as_deref()),
                });
            }
        }
    }

    fn request_timeout_ms(&self) -> i32 {
        i32::try_from(self.query_timeout_ms).unwrap_or(i32::MAX)
    }

    /// Returns the fully qualified, quoted name of `table`.
    pub fn full_table_name(table: &TableRef) -> SyncResult<String> {
        let project_id = Self::sanitize_identifier(&table.project_id, "BigQuery project id")?;
        let dataset_id = Self::sanitize_identifier(&table.dataset_id, "BigQuery dataset id")?;
        let table_id = Self::sanitize_identifier(&table.table_id, "BigQuery table id")?;

        Ok(format!("`{project_id}.{dataset_id}.{table_id}`"))
    }

    /// Sanitizes a BigQuery identifier for safe backtick quoting.
    ///
    /// Rejects empty identifiers and identifiers containing control characters. Backticks and
    /// backslashes are escaped with a backslash.
    fn sanitize_identifier(identifier: &str, context: &str) -> SyncResult<String> {
        if identifier.is_empty() {
            bail!(
                ErrorKind::InvalidData,
                "Invalid BigQuery identifier",
                format!("{context} cannot be empty")
            );
        }

        if identifier.chars().any(char::is_control) {
            bail!(
                ErrorKind::InvalidData,
                "Invalid BigQuery identifier",
                format!("{context} contains control characters")
            );
        }

        let mut escaped = String::with_capacity(identifier.len());
        for ch in identifier.chars() {
            match ch {
                '`' => escaped.push_str("\\`"),
                '\\' => escaped.push_str("\\\\"),
                _ => escaped.push(ch),
            }
        }

        Ok(escaped)
    }

    fn quoted_column(column: &ColumnSchema) -> SyncResult<String> {
        Self::sanitize_identifier(column.name, "BigQuery column name").map(|name| format!("`{name}`"))
    }

    /// Generates SQL column specification for CREATE TABLE statements.
    fn column_spec(column_schema: &ColumnSchema) -> SyncResult<String> {
        let mut column_spec = format!(
            "{} {}",
            Self::quoted_column(column_schema)?,
            Self::bigquery_type(column_schema.typ)
        );

        if !column_schema.nullable {
            column_spec.push_str(" not null");
        }

        Ok(column_spec)
    }

    /// Creates a primary key clause for table creation.
    fn add_primary_key_clause(column_schemas: &[ColumnSchema]) -> SyncResult<String> {
        let identity_columns = column_schemas
            .iter()
            .filter(|s| s.primary)
            .map(Self::quoted_column)
            .collect::<SyncResult<Vec<_>>>()?;

        if identity_columns.is_empty() {
            return Ok("".to_string());
        }

        Ok(format!(
            ", primary key ({}) not enforced",
            identity_columns.join(",")
        ))
    }

    /// Builds complete column specifications for CREATE TABLE statements.
    fn create_columns_spec(column_schemas: &[ColumnSchema]) -> SyncResult<String> {
        let mut s = column_schemas
            .iter()
            .map(Self::column_spec)
            .collect::<SyncResult<Vec<_>>>()?
            .join(",");

        s.push_str(&Self::add_primary_key_clause(column_schemas)?);

        Ok(format!("({s})"))
    }

    /// Builds the `CREATE TABLE` statement for `table`.
    pub fn create_table_statement(table: &TableRef, columns: &[ColumnSchema]) -> SyncResult<String> {
        let full_table_name = Self::full_table_name(table)?;
        let columns_spec = Self::create_columns_spec(columns)?;

        Ok(format!("create table {full_table_name} {columns_spec}"))
    }

    /// Builds the `MERGE` statement upserting `staging` into `target`.
    ///
    /// Rows are matched on the primary columns. Matched rows get every other column from
    /// staging and unmatched staging rows are inserted with all columns. Target rows without a
    /// staging counterpart are not touched.
    pub fn merge_statement(
        target: &TableRef,
        staging: &TableRef,
        columns: &[ColumnSchema],
    ) -> SyncResult<String> {
        let target_name = Self::full_table_name(target)?;
        let staging_name = Self::full_table_name(staging)?;

        let mut key_conditions = Vec::new();
        let mut updates = Vec::new();
        let mut insert_columns = Vec::with_capacity(columns.len());
        let mut insert_values = Vec::with_capacity(columns.len());

        for column in columns {
            let name = Self::quoted_column(column)?;
            if column.primary {
                key_conditions.push(format!("target.{name} = source.{name}"));
            } else {
                updates.push(format!("{name} = source.{name}"));
            }
            insert_values.push(format!("source.{name}"));
            insert_columns.push(name);
        }

        if key_conditions.is_empty() {
            bail!(
                ErrorKind::InvalidData,
                "Cannot merge tables without a primary column",
                target.to_string()
            );
        }

        Ok(format!(
            "merge {target_name} as target using {staging_name} as source on {} \
             when matched then update set {} \
             when not matched then insert ({}) values ({})",
            key_conditions.join(" and "),
            updates.join(", "),
            insert_columns.join(", "),
            insert_values.join(", ")
        ))
    }

    fn bigquery_type(typ: ArticleColumnType) -> &'static str {
        match typ {
            ArticleColumnType::String => "string",
            ArticleColumnType::Timestamp => "timestamp",
        }
    }

    /// Converts article column schemas to a Storage Write API [`TableDescriptor`].
    ///
    /// Timestamps are streamed as strings.
    pub fn column_schemas_to_table_descriptor(column_schemas: &[ColumnSchema]) -> TableDescriptor {
        let field_descriptors = column_schemas
            .iter()
            .zip(1..)
            .map(|(column_schema, number)| FieldDescriptor {
                number,
                name: column_schema.name.to_string(),
                typ: ColumnType::String,
                mode: if column_schema.nullable {
                    ColumnMode::Nullable
                } else {
                    ColumnMode::Required
                },
            })
            .collect();

        TableDescriptor { field_descriptors }
    }
}

fn parse_affected_rows(value: Option<&str>) -> Option<u64> {
    value.and_then(|value| value.parse().ok())
}

impl fmt::Debug for BigQueryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BigQueryClient")
            .field("project_id", &self.project_id)
            .field("query_timeout_ms", &self.query_timeout_ms)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use articles::types::ARTICLE_COLUMNS;

    use super::*;

    fn target() -> TableRef {
        TableRef::new("project", "news", "articles")
    }

    #[test]
    fn create_table_statement_for_articles() {
        let staging = target().sibling("articles_temp_0a1b2c3d");

        let statement = BigQueryClient::create_table_statement(&staging, ARTICLE_COLUMNS).unwrap();

        insta::assert_snapshot!(statement, @"create table `project.news.articles_temp_0a1b2c3d` (`article_id` string not null,`datetime` timestamp,`title` string,`link` string,`categories` string,`tags` string, primary key (`article_id`) not enforced)");
    }

    #[test]
    fn merge_statement_for_articles() {
        let staging = target().sibling("articles_temp_0a1b2c3d");

        let statement =
            BigQueryClient::merge_statement(&target(), &staging, ARTICLE_COLUMNS).unwrap();

        insta::assert_snapshot!(statement, @"merge `project.news.articles` as target using `project.news.articles_temp_0a1b2c3d` as source on target.`article_id` = source.`article_id` when matched then update set `datetime` = source.`datetime`, `title` = source.`title`, `link` = source.`link`, `categories` = source.`categories`, `tags` = source.`tags` when not matched then insert (`article_id`, `datetime`, `title`, `link`, `categories`, `tags`) values (source.`article_id`, source.`datetime`, source.`title`, source.`link`, source.`categories`, source.`tags`)");
    }

    #[test]
    fn merge_requires_a_primary_column() {
        let columns: Vec<_> = ARTICLE_COLUMNS.iter().filter(|c| !c.primary).copied().collect();

        let err = BigQueryClient::merge_statement(&target(), &target().sibling("s"), &columns)
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn identifiers_are_escaped() {
        let table = TableRef::new("project", "news", "odd`name");

        assert_eq!(
            BigQueryClient::full_table_name(&table).unwrap(),
            "`project.news.odd\\`name`"
        );
    }

    #[test]
    fn empty_identifiers_are_rejected() {
        let table = TableRef::new("project", "", "articles");

        let err = BigQueryClient::full_table_name(&table).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn table_descriptor_follows_column_order() {
        let descriptor = BigQueryClient::column_schemas_to_table_descriptor(ARTICLE_COLUMNS);

        let fields: Vec<_> = descriptor
            .field_descriptors
            .iter()
            .map(|field| (field.number, field.name.as_str()))
            .collect();
        assert_eq!(
            fields,
            vec![
                (1, "article_id"),
                (2, "datetime"),
                (3, "title"),
                (4, "link"),
                (5, "categories"),
                (6, "tags"),
            ]
        );
        assert!(matches!(
            descriptor.field_descriptors[0].mode,
            ColumnMode::Required
        ));
    }

    #[test]
    fn affected_rows_are_parsed_when_present() {
        assert_eq!(parse_affected_rows(Some("42")), Some(42));
        assert_eq!(parse_affected_rows(None), None);
    }
}
