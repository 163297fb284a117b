//! Diff results and errors for comparing two registry snapshots.
//!
//! - [`DiffResult`]: exact counts plus a size-bounded listing of row-level changes
//! - [`TableDiff`]: one modified table
//! - [`RowChange`]: one added, removed, modified or replaced row
//! - [`DiffError`]: failures that abort a diff

use crate::config::ConfigError;
use crate::error_codes;
use crate::registry::RegistryError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which snapshot an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Old,
    New,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Side::Old => "old",
            Side::New => "new",
        })
    }
}

/// Errors produced by diffing APIs. Any of these means no result was produced.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DiffError {
    #[error(
        "[SHADOW_DIFF_001] missing artifact for table '{key}' in the {side} snapshot: {detail}. Suggestion: rebuild the snapshot."
    )]
    MissingArtifact {
        key: String,
        side: Side,
        detail: String,
    },

    #[error("[SHADOW_DIFF_002] {side} registry failed integrity checks: {source}")]
    CorruptRegistry {
        side: Side,
        #[source]
        source: RegistryError,
    },

    #[error("[SHADOW_DIFF_004] invalid diff configuration: {0}")]
    Config(#[from] ConfigError),
}

impl DiffError {
    pub fn code(&self) -> &'static str {
        match self {
            DiffError::MissingArtifact { .. } => error_codes::DIFF_MISSING_ARTIFACT,
            DiffError::CorruptRegistry { .. } => error_codes::DIFF_CORRUPT_REGISTRY,
            DiffError::Config(_) => error_codes::DIFF_CONFIG,
        }
    }
}

/// A table present on one side only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    /// Composite key `{workbook_id}/{table_id}`.
    pub key: String,
    pub workbook_id: String,
    pub table_id: String,
    pub source_path: Option<String>,
    pub sheet_name: String,
    pub tag: String,
    pub row_count: usize,
}

/// How a row is identified in a change listing.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowKey {
    /// Primary-key values, in key-column order.
    Key(Vec<String>),
    /// Zero-based data-row index, for tables compared by position.
    Position(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub column: String,
    pub old: String,
    pub new: String,
}

/// Row values by column name, in header order.
pub type RowValues = IndexMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RowChange {
    Added {
        row: RowKey,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        values: Option<RowValues>,
    },
    Removed {
        row: RowKey,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        values: Option<RowValues>,
    },
    /// Same key on both sides, differing values in shared columns.
    Modified { row: RowKey, fields: Vec<FieldChange> },
    /// Positional tables only: the row at this index changed and is treated as replaced.
    Replaced {
        row: RowKey,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        old: Option<RowValues>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        new: Option<RowValues>,
    },
}

impl RowChange {
    pub fn row(&self) -> &RowKey {
        match self {
            RowChange::Added { row, .. }
            | RowChange::Removed { row, .. }
            | RowChange::Modified { row, .. }
            | RowChange::Replaced { row, .. } => row,
        }
    }
}

/// A table present on both sides with differing content hashes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDiff {
    /// Key the tables were matched on: composite key or `table_id`.
    pub key: String,
    pub old_key: String,
    pub new_key: String,
    pub table_id: String,
    pub tag_type: String,
    pub old_row_count: usize,
    pub new_row_count: usize,
    pub old_hash: String,
    pub new_hash: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns_added: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns_removed: Vec<String>,
    /// Rows were compared by position rather than by primary key.
    pub positional: bool,
    pub rows_added: usize,
    pub rows_removed: usize,
    /// Includes positional replacements.
    pub rows_modified: usize,
    pub changes: Vec<RowChange>,
    /// Row changes counted above but left out of `changes`.
    pub details_omitted: usize,
    /// False when an artifact could not be parsed; counts for this table are then unknown.
    pub complete: bool,
}

impl TableDiff {
    pub fn row_change_count(&self) -> usize {
        self.rows_added + self.rows_removed + self.rows_modified
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub tables_added: usize,
    pub tables_removed: usize,
    pub tables_modified: usize,
    pub tables_unchanged: usize,
    pub rows_added: usize,
    pub rows_removed: usize,
    pub rows_modified: usize,
    pub old_total_rows: usize,
    pub new_total_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResult {
    /// Schema version (currently "1").
    pub version: String,
    pub summary: DiffSummary,
    pub tables_added: Vec<TableRef>,
    pub tables_removed: Vec<TableRef>,
    pub tables_modified: Vec<TableDiff>,
    /// The row-detail budget ran out; see `details_omitted`.
    pub truncated: bool,
    pub details_omitted: usize,
    /// False when some table could not be compared.
    #[serde(default = "default_complete")]
    pub complete: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

fn default_complete() -> bool {
    true
}

impl DiffResult {
    pub const SCHEMA_VERSION: &'static str = "1";

    pub fn empty() -> DiffResult {
        DiffResult {
            version: Self::SCHEMA_VERSION.to_string(),
            summary: DiffSummary::default(),
            tables_added: Vec::new(),
            tables_removed: Vec::new(),
            tables_modified: Vec::new(),
            truncated: false,
            details_omitted: 0,
            complete: true,
            warnings: Vec::new(),
        }
    }

    /// Any table-level change at all.
    pub fn has_changes(&self) -> bool {
        self.summary.tables_added > 0
            || self.summary.tables_removed > 0
            || self.summary.tables_modified > 0
    }

    pub fn detail_count(&self) -> usize {
        self.tables_modified.iter().map(|t| t.changes.len()).sum()
    }
}
