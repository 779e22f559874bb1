use std::fmt;

/// Name of the column used to match staging rows to target rows.
pub const ARTICLE_KEY_COLUMN: &str = "article_id";

/// The fixed schema shared by the target and staging tables.
///
/// Column order matches the field order of [`crate::types::ArticleRow`], which the
/// destinations rely on when encoding rows.
pub const ARTICLE_COLUMNS: &[ColumnSchema] = &[
    ColumnSchema::new(ARTICLE_KEY_COLUMN, ColumnType::String, false, true),
    ColumnSchema::new("datetime", ColumnType::Timestamp, true, false),
    ColumnSchema::new("title", ColumnType::String, true, false),
    ColumnSchema::new("link", ColumnType::String, true, false),
    ColumnSchema::new("categories", ColumnType::String, true, false),
    ColumnSchema::new("tags", ColumnType::String, true, false),
];

/// Column types supported by the article tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    String,
    Timestamp,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::String => f.write_str("string"),
            ColumnType::Timestamp => f.write_str("timestamp"),
        }
    }
}

/// Describes a single column of an article table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSchema {
    pub name: &'static str,
    pub typ: ColumnType,
    pub nullable: bool,
    /// Whether the column is part of the identity key used by the merge.
    pub primary: bool,
}

impl ColumnSchema {
    pub const fn new(name: &'static str, typ: ColumnType, nullable: bool, primary: bool) -> Self {
        Self {
            name,
            typ,
            nullable,
            primary,
        }
    }
}
