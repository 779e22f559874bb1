//! Core data types shared by the harvester, the normalizer and the table stores.

mod article;
mod schema;
mod table;

pub use article::{ArticleRecord, ArticleRow};
pub use schema::{ARTICLE_COLUMNS, ARTICLE_KEY_COLUMN, ColumnSchema, ColumnType};
pub use table::TableRef;
