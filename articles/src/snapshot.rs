//! Snapshot naming, selection of the latest snapshot and snapshot decoding.
//!
//! Snapshots are named `rappler_articles_<YYYY-MM-DD_HH-MM-SS>.json`. The timestamp is fixed
//! width and zero padded, so comparing the timestamp text orders snapshots chronologically.

use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use tracing::debug;

use crate::bail;
use crate::error::{ErrorKind, SyncResult};
use crate::types::ArticleRecord;

/// Prefix shared by every snapshot object name.
pub const SNAPSHOT_PREFIX: &str = "rappler_articles_";

/// Extension of snapshot objects.
pub const SNAPSHOT_EXTENSION: &str = ".json";

/// Timestamp format embedded in snapshot names.
pub const SNAPSHOT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Content type used when writing snapshot objects.
pub const SNAPSHOT_CONTENT_TYPE: &str = "application/json";

static SNAPSHOT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"rappler_articles_(\d{4}-\d{2}-\d{2}_\d{2}-\d{2}-\d{2})\.json")
        .expect("snapshot pattern is a valid regex")
});

/// An object name that matched the snapshot naming pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotName {
    object_name: String,
    timestamp: String,
}

impl SnapshotName {
    /// Parses an object name, returning `None` when it is not a snapshot.
    ///
    /// The pattern may appear anywhere in the name, so objects stored under a prefix are
    /// still recognized. Names whose embedded timestamp is not a real date and time are
    /// rejected.
    pub fn parse(object_name: &str) -> Option<SnapshotName> {
        let captures = SNAPSHOT_PATTERN.captures(object_name)?;
        let timestamp = captures.get(1)?.as_str();

        if NaiveDateTime::parse_from_str(timestamp, SNAPSHOT_TIMESTAMP_FORMAT).is_err() {
            debug!(object_name, "ignoring snapshot name with invalid timestamp");
            return None;
        }

        Some(SnapshotName {
            object_name: object_name.to_string(),
            timestamp: timestamp.to_string(),
        })
    }

    /// Returns the canonical snapshot name for a creation time.
    pub fn for_timestamp(created_at: DateTime<Utc>) -> SnapshotName {
        let timestamp = created_at.format(SNAPSHOT_TIMESTAMP_FORMAT).to_string();
        let object_name = format!("{SNAPSHOT_PREFIX}{timestamp}{SNAPSHOT_EXTENSION}");

        SnapshotName {
            object_name,
            timestamp,
        }
    }

    /// The full object name in blob storage.
    pub fn object_name(&self) -> &str {
        &self.object_name
    }

    /// The embedded `YYYY-MM-DD_HH-MM-SS` timestamp.
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Sort key: timestamp first, then the full object name to break ties deterministically.
    fn ordering_key(&self) -> (&str, &str) {
        (&self.timestamp, &self.object_name)
    }
}

impl fmt::Display for SnapshotName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.object_name)
    }
}

/// Selects the most recent snapshot among a listing of object names.
///
/// Names that are not snapshots are ignored. When several snapshots carry the same
/// timestamp the lexicographically greatest object name is chosen.
pub fn select_latest<I, S>(object_names: I) -> SyncResult<SnapshotName>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let latest = object_names
        .into_iter()
        .filter_map(|name| SnapshotName::parse(name.as_ref()))
        .max_by(|a, b| a.ordering_key().cmp(&b.ordering_key()));

    match latest {
        Some(latest) => Ok(latest),
        None => bail!(
            ErrorKind::NoSnapshotFound,
            "No snapshot matches the naming pattern"
        ),
    }
}

/// Decodes the content of a snapshot object into article records.
pub fn decode_snapshot(content: &[u8]) -> SyncResult<Vec<ArticleRecord>> {
    let records = serde_json::from_slice(content)?;

    Ok(records)
}

/// Encodes article records into snapshot content.
pub fn encode_snapshot(records: &[ArticleRecord]) -> SyncResult<Vec<u8>> {
    let content = serde_json::to_vec(records)?;

    Ok(content)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn parse_extracts_timestamp() {
        let name = SnapshotName::parse("rappler_articles_2024-03-05_07-08-09.json").unwrap();

        assert_eq!(name.timestamp(), "2024-03-05_07-08-09");
        assert_eq!(name.object_name(), "rappler_articles_2024-03-05_07-08-09.json");
    }

    #[test]
    fn parse_accepts_prefixed_objects() {
        let name = SnapshotName::parse("daily/rappler_articles_2024-03-05_07-08-09.json");

        assert!(name.is_some());
    }

    #[test]
    fn parse_rejects_other_names() {
        assert!(SnapshotName::parse("rappler_articles_latest.json").is_none());
        assert!(SnapshotName::parse("rappler_articles_2024-03-05.json").is_none());
        assert!(SnapshotName::parse("other_2024-03-05_07-08-09.json").is_none());
        assert!(SnapshotName::parse("rappler_articles_2024-03-05_07-08-09.csv").is_none());
    }

    #[test]
    fn parse_rejects_impossible_timestamps() {
        assert!(SnapshotName::parse("rappler_articles_2024-13-05_07-08-09.json").is_none());
        assert!(SnapshotName::parse("rappler_articles_2024-02-30_07-08-09.json").is_none());
        assert!(SnapshotName::parse("rappler_articles_2024-02-01_25-08-09.json").is_none());
    }

    #[test]
    fn select_latest_picks_greatest_timestamp() {
        let names = [
            "rappler_articles_2024-03-05_07-08-09.json",
            "README.md",
            "rappler_articles_2024-12-31_23-59-59.json",
            "rappler_articles_2024-03-05_17-08-09.json",
        ];

        let latest = select_latest(names).unwrap();

        assert_eq!(
            latest.object_name(),
            "rappler_articles_2024-12-31_23-59-59.json"
        );
    }

    #[test]
    fn select_latest_ignores_non_matching_names_only() {
        let err = select_latest(["notes.txt", "rappler_articles_.json"]).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NoSnapshotFound);
    }

    #[test]
    fn select_latest_on_empty_listing_is_no_snapshot() {
        let err = select_latest(Vec::<String>::new()).unwrap_err();

        assert!(err.is_no_data());
    }

    #[test]
    fn select_latest_breaks_ties_on_full_name() {
        let names = [
            "b/rappler_articles_2024-03-05_07-08-09.json",
            "a/rappler_articles_2024-03-05_07-08-09.json",
        ];

        let latest = select_latest(names).unwrap();

        assert_eq!(
            latest.object_name(),
            "b/rappler_articles_2024-03-05_07-08-09.json"
        );
    }

    #[test]
    fn for_timestamp_round_trips_through_parse() {
        let created_at = Utc.with_ymd_and_hms(2025, 1, 9, 4, 5, 6).unwrap();

        let name = SnapshotName::for_timestamp(created_at);

        assert_eq!(name.object_name(), "rappler_articles_2025-01-09_04-05-06.json");
        assert_eq!(SnapshotName::parse(name.object_name()), Some(name));
    }

    #[test]
    fn decode_rejects_malformed_content() {
        let err = decode_snapshot(b"{\"not\": \"an array\"}").unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DeserializationError);
    }
}
