//! Configuration for the index builder and the diff engine.
//!
//! `BuildConfig` and `DiffConfig` hold every behavioral knob; nothing downstream hardcodes
//! a budget or a policy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_ROW_DETAIL_BUDGET: usize = 2000;
pub const DEFAULT_SCHEMA_VERSION: &str = "veda-tags-2024";

/// What the builder does when neither the record nor the schema declares a primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingKeyPolicy {
    /// Empty key: rows keep extraction order and diff positionally.
    #[default]
    PreserveOrder,
    /// Every column is part of the key.
    AllColumns,
}

/// How tables are paired between the old and new registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableMatch {
    /// `{workbook_id}/{table_id}`.
    #[default]
    CompositeKey,
    /// `table_id` alone, so workbook renames and moves are not table changes.
    TableId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffConfig {
    /// Row-level detail entries kept across the whole result. Counts are never truncated.
    pub row_detail_budget: usize,
    pub table_match: TableMatch,
    /// Markers stripped from the start of key values before rows are matched.
    pub key_ignore_prefixes: Vec<String>,
    /// Attach full row values to added and removed row details.
    pub include_row_values: bool,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            row_detail_budget: DEFAULT_ROW_DETAIL_BUDGET,
            table_match: TableMatch::CompositeKey,
            key_ignore_prefixes: Vec::new(),
            include_row_values: true,
        }
    }
}

impl DiffConfig {
    /// Exact counts, no row details.
    pub fn counts_only() -> Self {
        Self {
            row_detail_budget: 0,
            include_row_values: false,
            ..Default::default()
        }
    }

    pub fn builder() -> DiffConfigBuilder {
        DiffConfigBuilder {
            inner: DiffConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_no_blank_entries(&self.key_ignore_prefixes, "key_ignore_prefixes")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub generator: String,
    pub schema_version: String,
    pub missing_key_policy: MissingKeyPolicy,
    /// Reuse metadata and artifacts of workbooks whose path and hash are unchanged.
    pub reuse_unchanged: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            generator: default_generator(),
            schema_version: DEFAULT_SCHEMA_VERSION.to_string(),
            missing_key_policy: MissingKeyPolicy::PreserveOrder,
            reuse_unchanged: true,
        }
    }
}

pub fn default_generator() -> String {
    format!("shadow-tables/{}", env!("CARGO_PKG_VERSION"))
}

impl BuildConfig {
    pub fn builder() -> BuildConfigBuilder {
        BuildConfigBuilder {
            inner: BuildConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_not_blank(&self.generator, "generator")?;
        ensure_not_blank(&self.schema_version, "schema_version")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{field} must not be empty")]
    EmptyValue { field: &'static str },
    #[error("{field}[{index}] must not be empty")]
    BlankEntry { field: &'static str, index: usize },
}

fn ensure_not_blank(value: &str, field: &'static str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::EmptyValue { field });
    }
    Ok(())
}

fn ensure_no_blank_entries(values: &[String], field: &'static str) -> Result<(), ConfigError> {
    match values.iter().position(|v| v.is_empty()) {
        Some(index) => Err(ConfigError::BlankEntry { field, index }),
        None => Ok(()),
    }
}

#[derive(Debug, Clone)]
pub struct DiffConfigBuilder {
    inner: DiffConfig,
}

impl Default for DiffConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DiffConfigBuilder {
    pub fn new() -> Self {
        DiffConfig::builder()
    }

    pub fn row_detail_budget(mut self, value: usize) -> Self {
        self.inner.row_detail_budget = value;
        self
    }

    pub fn table_match(mut self, value: TableMatch) -> Self {
        self.inner.table_match = value;
        self
    }

    pub fn key_ignore_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.inner.key_ignore_prefixes.push(prefix.into());
        self
    }

    pub fn include_row_values(mut self, value: bool) -> Self {
        self.inner.include_row_values = value;
        self
    }

    pub fn build(self) -> Result<DiffConfig, ConfigError> {
        self.inner.validate()?;
        Ok(self.inner)
    }
}

#[derive(Debug, Clone)]
pub struct BuildConfigBuilder {
    inner: BuildConfig,
}

impl Default for BuildConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildConfigBuilder {
    pub fn new() -> Self {
        BuildConfig::builder()
    }

    pub fn generator(mut self, value: impl Into<String>) -> Self {
        self.inner.generator = value.into();
        self
    }

    pub fn schema_version(mut self, value: impl Into<String>) -> Self {
        self.inner.schema_version = value.into();
        self
    }

    pub fn missing_key_policy(mut self, value: MissingKeyPolicy) -> Self {
        self.inner.missing_key_policy = value;
        self
    }

    pub fn reuse_unchanged(mut self, value: bool) -> Self {
        self.inner.reuse_unchanged = value;
        self
    }

    pub fn build(self) -> Result<BuildConfig, ConfigError> {
        self.inner.validate()?;
        Ok(self.inner)
    }
}
