//! The persisted table registry (`tables_index.json`).
//!
//! A `Registry` is an immutable value produced by one build pass; validation and diff only
//! read it. On disk it is pretty JSON with sorted keys, two-space indentation, LF newlines and
//! a trailing newline, written atomically.

use crate::error_codes;
use crate::ids::{TableId, WorkbookId, composite_key};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

pub const REGISTRY_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("[SHADOW_REG_001] registry I/O failed for '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("[SHADOW_REG_002] registry '{origin}' is not valid JSON: {message}")]
    Json { origin: String, message: String },

    #[error("[SHADOW_REG_003] corrupt registry at '{key}': {reason}")]
    Corrupt { key: String, reason: String },

    #[error("[SHADOW_REG_004] registry '{origin}' has unsupported version {version}")]
    UnsupportedVersion { origin: String, version: u32 },
}

impl RegistryError {
    pub fn code(&self) -> &'static str {
        match self {
            RegistryError::Io { .. } => error_codes::REG_IO,
            RegistryError::Json { .. } => error_codes::REG_JSON,
            RegistryError::Corrupt { .. } => error_codes::REG_CORRUPT,
            RegistryError::UnsupportedVersion { .. } => error_codes::REG_VERSION,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkbookMeta {
    pub workbook_id: WorkbookId,
    pub source_path: String,
    /// `sha256:<hex>` of the workbook file.
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMeta {
    pub table_id: TableId,
    pub workbook_id: WorkbookId,
    pub sheet_name: String,
    pub tag: String,
    pub tag_type: String,
    pub logical_name: Option<String>,
    pub tag_position: String,
    pub columns: Vec<String>,
    pub primary_keys: Vec<String>,
    pub row_count: usize,
    /// Relative to the shadow root, `/`-separated.
    pub csv_path: String,
    pub csv_sha256: String,
    pub extracted_at: String,
    pub schema_version: String,
}

impl TableMeta {
    pub fn composite_key(&self) -> String {
        composite_key(&self.workbook_id, &self.table_id)
    }

    /// True when `primary_keys` is an order-preserving subsequence of `columns`.
    pub fn keys_follow_columns(&self) -> bool {
        let mut cols = self.columns.iter();
        self.primary_keys
            .iter()
            .all(|pk| cols.by_ref().any(|c| c == pk))
    }
}

/// Artifact location relative to the shadow root.
pub fn csv_relative_path(workbook_id: &str, table_id: &str) -> String {
    format!("{workbook_id}/{table_id}.csv")
}

/// Current UTC time as RFC 3339 with seconds precision and a `Z` suffix.
pub fn utc_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    pub version: u32,
    pub generator: String,
    pub generated_at: String,
    #[serde(default)]
    pub workbooks: BTreeMap<WorkbookId, WorkbookMeta>,
    #[serde(default, deserialize_with = "tables_map_or_list")]
    pub tables: BTreeMap<String, TableMeta>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TablesRepr {
    Map(BTreeMap<String, TableMeta>),
    List(Vec<TableMeta>),
}

fn tables_map_or_list<'de, D>(deserializer: D) -> Result<BTreeMap<String, TableMeta>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match TablesRepr::deserialize(deserializer)? {
        TablesRepr::Map(map) => map,
        TablesRepr::List(list) => list
            .into_iter()
            .map(|t| (t.composite_key(), t))
            .collect(),
    })
}

impl Registry {
    pub fn new(generator: impl Into<String>) -> Self {
        Self {
            version: REGISTRY_VERSION,
            generator: generator.into(),
            generated_at: utc_timestamp(),
            workbooks: BTreeMap::new(),
            tables: BTreeMap::new(),
        }
    }

    pub fn table(&self, key: &str) -> Option<&TableMeta> {
        self.tables.get(key)
    }

    pub fn tables_for_workbook<'a>(
        &'a self,
        workbook_id: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a TableMeta)> + 'a {
        self.tables
            .iter()
            .filter(move |(_, t)| t.workbook_id == workbook_id)
    }

    pub fn total_rows(&self) -> usize {
        self.tables.values().map(|t| t.row_count).sum()
    }

    /// Referential integrity: tables point at known workbooks, map keys agree with the ids
    /// they index, key columns are a subsequence of columns.
    pub fn check_integrity(&self) -> Result<(), RegistryError> {
        for (key, wb) in &self.workbooks {
            if *key != wb.workbook_id {
                return Err(RegistryError::Corrupt {
                    key: key.clone(),
                    reason: format!("workbook entry carries workbook_id '{}'", wb.workbook_id),
                });
            }
        }

        for (key, table) in &self.tables {
            if !self.workbooks.contains_key(&table.workbook_id) {
                return Err(RegistryError::Corrupt {
                    key: key.clone(),
                    reason: format!("references unknown workbook_id '{}'", table.workbook_id),
                });
            }
            let expected = table.composite_key();
            if *key != expected {
                return Err(RegistryError::Corrupt {
                    key: key.clone(),
                    reason: format!("entry key does not match its ids ('{expected}')"),
                });
            }
            if !table.keys_follow_columns() {
                return Err(RegistryError::Corrupt {
                    key: key.clone(),
                    reason: format!(
                        "primary_keys {:?} are not an ordered subset of columns {:?}",
                        table.primary_keys, table.columns
                    ),
                });
            }
        }
        Ok(())
    }

    pub fn from_json_str(text: &str, origin: &str) -> Result<Self, RegistryError> {
        let registry: Registry =
            serde_json::from_str(text).map_err(|e| RegistryError::Json {
                origin: origin.to_string(),
                message: e.to_string(),
            })?;
        if registry.version != REGISTRY_VERSION {
            return Err(RegistryError::UnsupportedVersion {
                origin: origin.to_string(),
                version: registry.version,
            });
        }
        Ok(registry)
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text, &path.display().to_string())
    }

    /// Sorted-key pretty JSON with a trailing newline.
    pub fn to_json_string(&self) -> Result<String, RegistryError> {
        let to_json_err = |e: serde_json::Error| RegistryError::Json {
            origin: "<registry>".to_string(),
            message: e.to_string(),
        };
        // Round-trip through Value so every object, struct fields included, comes out sorted.
        let value = serde_json::to_value(self).map_err(to_json_err)?;
        let mut text = serde_json::to_string_pretty(&value).map_err(to_json_err)?;
        text.push('\n');
        Ok(text)
    }

    /// Write to `path` through a temp file in the same directory, then rename over it.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), RegistryError> {
        let path = path.as_ref();
        let io_err = |source: std::io::Error| RegistryError::Io {
            path: path.display().to_string(),
            source,
        };
        let text = self.to_json_string()?;

        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir).map_err(io_err)?;
        let mut tmp = tempfile::Builder::new()
            .prefix(".tables_index.")
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(io_err)?;
        tmp.write_all(text.as_bytes()).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}
