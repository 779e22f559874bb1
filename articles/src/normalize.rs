//! Converts harvested records into the flattened shape stored by the table store.

use std::collections::HashMap;

use crate::types::{ArticleRecord, ArticleRow};

/// Separator placed between labels when flattening `categories` and `tags`.
pub const LABEL_SEPARATOR: &str = ", ";

/// Joins labels into a single string, `[]` becomes `""`.
pub fn flatten_labels(labels: &[String]) -> String {
    labels.join(LABEL_SEPARATOR)
}

/// Flattens a single record, leaving identity, timestamp, title and link untouched.
pub fn normalize_record(record: ArticleRecord) -> ArticleRow {
    ArticleRow {
        categories: flatten_labels(&record.categories),
        tags: flatten_labels(&record.tags),
        article_id: record.article_id,
        published_at: record.published_at,
        title: record.title,
        link: record.link,
    }
}

/// Flattens a batch of records, preserving order.
pub fn normalize_records(records: Vec<ArticleRecord>) -> Vec<ArticleRow> {
    records.into_iter().map(normalize_record).collect()
}

/// Removes rows that share an `article_id` with a later row in the same batch.
///
/// The last occurrence wins and keeps its position relative to the other surviving rows.
/// Returns the surviving rows and the number of rows that were dropped.
pub fn deduplicate_by_key(rows: Vec<ArticleRow>) -> (Vec<ArticleRow>, usize) {
    let mut last_index: HashMap<&str, usize> = HashMap::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        last_index.insert(row.article_id.as_str(), index);
    }

    let keep: Vec<bool> = rows
        .iter()
        .enumerate()
        .map(|(index, row)| last_index[row.article_id.as_str()] == index)
        .collect();

    let total = rows.len();
    let deduplicated: Vec<ArticleRow> = rows
        .into_iter()
        .zip(keep)
        .filter_map(|(row, keep)| keep.then_some(row))
        .collect();
    let dropped = total - deduplicated.len();

    (deduplicated, dropped)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn record(id: &str, categories: &[&str], tags: &[&str]) -> ArticleRecord {
        ArticleRecord {
            article_id: id.to_string(),
            published_at: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
            title: format!("title {id}"),
            link: format!("https://example.com/{id}"),
            categories: categories.iter().map(|s| s.to_string()).collect(),
            tags: tags.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn row(id: &str, title: &str) -> ArticleRow {
        ArticleRow {
            article_id: id.to_string(),
            published_at: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
            title: title.to_string(),
            link: String::new(),
            categories: String::new(),
            tags: String::new(),
        }
    }

    #[test]
    fn empty_labels_become_empty_string() {
        let normalized = normalize_record(record("a", &[], &[]));

        assert_eq!(normalized.categories, "");
        assert_eq!(normalized.tags, "");
    }

    #[test]
    fn labels_are_joined_in_order() {
        let normalized = normalize_record(record("a", &["a", "b"], &["x", "y", "z"]));

        assert_eq!(normalized.categories, "a, b");
        assert_eq!(normalized.tags, "x, y, z");
    }

    #[test]
    fn other_fields_are_untouched() {
        let original = record("post-9", &["nation"], &[]);
        let normalized = normalize_record(original.clone());

        assert_eq!(normalized.article_id, original.article_id);
        assert_eq!(normalized.published_at, original.published_at);
        assert_eq!(normalized.title, original.title);
        assert_eq!(normalized.link, original.link);
    }

    #[test]
    fn batch_order_is_preserved() {
        let rows = normalize_records(vec![record("b", &[], &[]), record("a", &[], &[])]);

        let ids: Vec<_> = rows.iter().map(|r| r.article_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn deduplicate_keeps_last_occurrence() {
        let rows = vec![row("1", "first"), row("2", "x"), row("1", "second")];

        let (rows, dropped) = deduplicate_by_key(rows);

        assert_eq!(dropped, 1);
        assert_eq!(rows, vec![row("2", "x"), row("1", "second")]);
    }

    #[test]
    fn deduplicate_without_duplicates_is_identity() {
        let rows = vec![row("1", "a"), row("2", "b")];

        let (deduplicated, dropped) = deduplicate_by_key(rows.clone());

        assert_eq!(dropped, 0);
        assert_eq!(deduplicated, rows);
    }
}
