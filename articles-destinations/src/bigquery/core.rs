use articles::error::SyncResult;
use articles::store::{MergeStats, TableStore};
use articles::types::{ARTICLE_COLUMNS, ArticleRow, ColumnSchema, TableRef};
use async_trait::async_trait;
use tracing::info;

use crate::bigquery::client::BigQueryClient;

/// [`TableStore`] backed by BigQuery.
///
/// Loads truncate the table and then stream through the Storage Write API; merges and DDL run
/// as query jobs awaited until done.
#[derive(Debug, Clone)]
pub struct BigQueryTableStore {
    client: BigQueryClient,
}

impl BigQueryTableStore {
    pub fn new(client: BigQueryClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &BigQueryClient {
        &self.client
    }
}

#[async_trait]
impl TableStore for BigQueryTableStore {
    fn name(&self) -> &'static str {
        "bigquery"
    }

    async fn create_table(&self, table: &TableRef, columns: &[ColumnSchema]) -> SyncResult<()> {
        self.client.create_table(table, columns).await
    }

    async fn load_rows(&self, table: &TableRef, rows: Vec<ArticleRow>) -> SyncResult<usize> {
        self.client.truncate_table(table).await?;

        let written = self.client.append_rows(table, ARTICLE_COLUMNS, rows).await?;
        info!(%table, rows = written, "loaded rows into bigquery table");

        Ok(written)
    }

    async fn merge_tables(
        &self,
        target: &TableRef,
        staging: &TableRef,
        columns: &[ColumnSchema],
    ) -> SyncResult<MergeStats> {
        let outcome = self.client.merge_tables(target, staging, columns).await?;

        Ok(MergeStats {
            affected_rows: outcome.affected_rows,
        })
    }

    async fn drop_table(&self, table: &TableRef) -> SyncResult<()> {
        self.client.drop_table(table).await
    }
}
