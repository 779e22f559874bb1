#![allow(dead_code)]

use articles::types::{ArticleRecord, ArticleRow, TableRef};
use chrono::{DateTime, TimeZone, Utc};

pub fn target_table() -> TableRef {
    TableRef::new("test-project", "news", "articles")
}

pub fn published_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

/// Builds a record without labels.
pub fn record(id: &str, title: &str) -> ArticleRecord {
    ArticleRecord {
        article_id: id.to_string(),
        published_at: published_at(),
        title: title.to_string(),
        link: format!("https://www.rappler.com/{id}/"),
        categories: vec![],
        tags: vec![],
    }
}

/// The flattened row [`record`] produces.
pub fn row(id: &str, title: &str) -> ArticleRow {
    ArticleRow {
        article_id: id.to_string(),
        published_at: published_at(),
        title: title.to_string(),
        link: format!("https://www.rappler.com/{id}/"),
        categories: String::new(),
        tags: String::new(),
    }
}

/// Sorts rows by id so assertions do not depend on insertion order.
pub fn sorted(mut rows: Vec<ArticleRow>) -> Vec<ArticleRow> {
    rows.sort_by(|a, b| a.article_id.cmp(&b.article_id));
    rows
}
