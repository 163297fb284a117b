//! Consistency checks over a committed shadow directory.
//!
//! Every table is checked independently and every finding is reported; nothing aborts early.

use crate::canonical::parse;
use crate::hashing::sha256_hex;
use crate::registry::{Registry, TableMeta};
use crate::schema::SchemaCatalog;
use crate::store::CsvLoader;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Registry,
    MissingArtifact,
    HashMismatch,
    MalformedArtifact,
    HeaderMismatch,
    RowCountMismatch,
    MissingKeyColumn,
    EmptyKeyValue,
    DuplicateKey,
    RowOrder,
    UnknownTagType,
    UnknownColumns,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Composite key; `None` for registry-wide findings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    pub kind: IssueKind,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{table}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub tables_checked: usize,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, table: &str, kind: IssueKind, message: String) {
        self.errors.push(ValidationIssue {
            table: Some(table.to_string()),
            kind,
            message,
        });
    }

    fn warning(&mut self, table: &str, kind: IssueKind, message: String) {
        self.warnings.push(ValidationIssue {
            table: Some(table.to_string()),
            kind,
            message,
        });
    }
}

/// Check a registry against its artifacts and, optionally, a tag-schema catalog.
pub fn validate(
    registry: &Registry,
    loader: &dyn CsvLoader,
    catalog: Option<&SchemaCatalog>,
) -> ValidationReport {
    let mut report = ValidationReport::default();
    if let Err(err) = registry.check_integrity() {
        report.errors.push(ValidationIssue {
            table: None,
            kind: IssueKind::Registry,
            message: err.to_string(),
        });
    }

    for (key, meta) in &registry.tables {
        report.tables_checked += 1;
        check_table(key, meta, loader, &mut report);
        if let Some(catalog) = catalog {
            check_schema(key, meta, catalog, &mut report);
        }
    }

    info!(
        tables = report.tables_checked,
        errors = report.errors.len(),
        warnings = report.warnings.len(),
        "validation finished"
    );
    report
}

fn check_table(key: &str, meta: &TableMeta, loader: &dyn CsvLoader, report: &mut ValidationReport) {
    let bytes = match loader.load(key, meta) {
        Ok(bytes) => bytes,
        Err(err) => {
            report.error(key, IssueKind::MissingArtifact, err.to_string());
            return;
        }
    };

    let actual = sha256_hex(&bytes);
    if actual != meta.csv_sha256 {
        report.error(
            key,
            IssueKind::HashMismatch,
            format!(
                "artifact hashes to {actual}, registry records {}",
                meta.csv_sha256
            ),
        );
    }

    let table = match parse(&bytes) {
        Ok(table) => table,
        Err(err) => {
            report.error(key, IssueKind::MalformedArtifact, format!("cannot parse artifact: {err}"));
            return;
        }
    };

    if table.header != meta.columns {
        report.error(
            key,
            IssueKind::HeaderMismatch,
            format!(
                "artifact header {:?} differs from registry columns {:?}",
                table.header, meta.columns
            ),
        );
    }
    if table.rows.len() != meta.row_count {
        report.error(
            key,
            IssueKind::RowCountMismatch,
            format!(
                "artifact has {} data rows, registry records {}",
                table.rows.len(),
                meta.row_count
            ),
        );
    }

    let mut key_idx = Vec::with_capacity(meta.primary_keys.len());
    for pk in &meta.primary_keys {
        match table.header.iter().position(|c| c == pk) {
            Some(idx) => key_idx.push(idx),
            None => report.error(
                key,
                IssueKind::MissingKeyColumn,
                format!("primary key column '{pk}' is not in the artifact header"),
            ),
        }
    }
    if key_idx.len() != meta.primary_keys.len() || key_idx.is_empty() {
        debug!(table = %key, "skipping key checks");
        return;
    }

    let tuples: Vec<Vec<&str>> = table
        .rows
        .iter()
        .map(|row| key_idx.iter().map(|&k| row[k].as_str()).collect())
        .collect();

    let empty_rows = tuples
        .iter()
        .filter(|t| t.iter().any(|v| v.is_empty()))
        .count();
    if empty_rows > 0 {
        report.error(
            key,
            IssueKind::EmptyKeyValue,
            format!("{empty_rows} row(s) have an empty primary-key value"),
        );
    }

    let mut seen = HashSet::with_capacity(tuples.len());
    if let Some(dup) = tuples.iter().find(|t| !seen.insert(*t)) {
        report.error(
            key,
            IssueKind::DuplicateKey,
            format!("duplicate primary key {dup:?}"),
        );
    }

    if let Some(pos) = tuples.windows(2).position(|w| w[0] > w[1]) {
        report.error(
            key,
            IssueKind::RowOrder,
            format!("data rows {} and {} are out of primary-key order", pos + 1, pos + 2),
        );
    }
}

fn check_schema(key: &str, meta: &TableMeta, catalog: &SchemaCatalog, report: &mut ValidationReport) {
    let Some(tag) = catalog.tag(&meta.tag_type) else {
        report.warning(
            key,
            IssueKind::UnknownTagType,
            format!("tag type '{}' is not in the schema catalog", meta.tag_type),
        );
        return;
    };
    let (_, unknown) = tag.order_columns(&meta.columns);
    if !unknown.is_empty() {
        report.warning(
            key,
            IssueKind::UnknownColumns,
            format!("columns not declared for '{}': {}", meta.tag_type, unknown.join(", ")),
        );
    }
}
