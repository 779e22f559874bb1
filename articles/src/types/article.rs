use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use serde::de::{self, Unexpected};
use serde::{Deserialize, Deserializer, Serialize};

/// Offset-less layouts accepted for `datetime`, read as UTC.
const NAIVE_TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// An article as produced by the harvester and stored in snapshots.
///
/// The JSON shape matches the snapshot files: the publication timestamp is stored under
/// `datetime` and labels are ordered string arrays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    /// Natural key of the article, stable across snapshots.
    pub article_id: String,
    /// When the article was published. Timestamps without an offset are UTC.
    #[serde(rename = "datetime", deserialize_with = "deserialize_published_at")]
    pub published_at: DateTime<Utc>,
    pub title: String,
    /// Canonical article URL.
    pub link: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// An article in the flattened shape stored by the table store.
///
/// `categories` and `tags` are comma-joined, see [`crate::normalize`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRow {
    pub article_id: String,
    #[serde(rename = "datetime")]
    pub published_at: DateTime<Utc>,
    pub title: String,
    pub link: String,
    pub categories: String,
    pub tags: String,
}

/// Parses an RFC 3339 timestamp, or a `YYYY-MM-DD[T ]HH:MM:SS[.f]` one as UTC.
fn parse_published_at(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(timestamp) = value.parse::<DateTime<FixedOffset>>() {
        return Some(timestamp.with_timezone(&Utc));
    }

    NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|timestamp| timestamp.and_utc())
}

fn deserialize_published_at<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;

    parse_published_at(&value).ok_or_else(|| {
        de::Error::invalid_value(
            Unexpected::Str(&value),
            &"an RFC 3339 timestamp or `YYYY-MM-DD HH:MM:SS`",
        )
    })
}
