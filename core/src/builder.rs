//! The index builder: raw table records in, a registry plus canonical CSV artifacts out.
//!
//! One pass over a [`TableRecordSource`]:
//! 1. collect workbooks, assign workbook ids, detect id collisions, reuse unchanged workbooks;
//! 2. per table, independently: resolve identifiers, shape columns and keys, serialize;
//! 3. merge in source order, detecting duplicate composite keys.
//!
//! Per-table failures are collected in [`BuildOutcome::failures`] and never stop the build.
//! Workbook-id collisions and duplicate tables abort it. Nothing touches disk until the
//! outcome is committed to a [`ShadowStore`].

use crate::addressing::index_to_address;
use crate::canonical::{SerializeError, TableData, serialize};
use crate::config::{BuildConfig, ConfigError, MissingKeyPolicy};
use crate::error_codes;
use crate::hashing::sha256_hex;
use crate::ids::{
    IdentityError, WorkbookId, assign_table_id, assign_workbook_id, composite_key,
    normalize_source_path,
};
use crate::progress::{ProgressCallback, ProgressThrottle};
use crate::record::{TableRecord, TagPosition};
use crate::registry::{Registry, TableMeta, WorkbookMeta, csv_relative_path};
use crate::schema::SchemaCatalog;
use crate::source::{SourceError, TableRecordSource};
use crate::store::{Artifacts, CsvLoader, MemoryLoader, ShadowStore, StoreError};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Build-level failures. Any of these means no registry was produced.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("[SHADOW_BUILD_001] duplicate table '{key}': defined at {first} and at {second}")]
    DuplicateTable {
        key: String,
        first: String,
        second: String,
    },

    #[error(
        "[SHADOW_BUILD_002] workbook id '{workbook_id}' collides for '{first_path}' and '{second_path}'"
    )]
    WorkbookIdCollision {
        workbook_id: String,
        first_path: String,
        second_path: String,
    },

    #[error("[SHADOW_BUILD_003] record source failed: {0}")]
    Source(#[from] SourceError),

    #[error("[SHADOW_BUILD_004] {0}")]
    Store(#[from] StoreError),

    #[error("[SHADOW_BUILD_005] invalid build configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("[SHADOW_BUILD_006] workbook '{path}' appears more than once in the record source")]
    DuplicateWorkbook { path: String },
}

impl BuildError {
    pub fn code(&self) -> &'static str {
        match self {
            BuildError::DuplicateTable { .. } => error_codes::BUILD_DUPLICATE_TABLE,
            BuildError::WorkbookIdCollision { .. } => error_codes::BUILD_WORKBOOK_ID_COLLISION,
            BuildError::Source(_) => error_codes::BUILD_SOURCE,
            BuildError::Store(_) => error_codes::BUILD_STORE,
            BuildError::Config(_) => error_codes::BUILD_CONFIG,
            BuildError::DuplicateWorkbook { .. } => error_codes::BUILD_DUPLICATE_WORKBOOK,
        }
    }
}

/// Why a single table was left out of the registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Serialize(#[from] SerializeError),
}

impl TableError {
    pub fn code(&self) -> &'static str {
        match self {
            TableError::Identity(e) => e.code(),
            TableError::Serialize(e) => e.code(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableFailure {
    pub source_path: String,
    pub sheet_name: String,
    pub tag: String,
    /// Known once identifiers resolved.
    pub table_key: Option<String>,
    pub error: TableError,
}

impl fmt::Display for TableFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table_key {
            Some(key) => write!(f, "{key} ({}): {}", self.source_path, self.error),
            None => write!(
                f,
                "{} [{}] {}: {}",
                self.source_path, self.sheet_name, self.tag, self.error
            ),
        }
    }
}

/// Degradations recorded during a build. None of them drops data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BuildWarning {
    /// Column order or primary key had to be inferred.
    SchemaGap { table: String, detail: String },
    UnknownTagType { table: String, tag_type: String },
    UnknownColumns { table: String, columns: Vec<String> },
    /// An unchanged workbook was rebuilt because its previous artifacts could not be reused.
    ReuseSkipped { source_path: String, reason: String },
}

impl fmt::Display for BuildWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildWarning::SchemaGap { table, detail } => write!(f, "{table}: {detail}"),
            BuildWarning::UnknownTagType { table, tag_type } => {
                write!(f, "{table}: tag type '{tag_type}' is not in the schema catalog")
            }
            BuildWarning::UnknownColumns { table, columns } => {
                write!(f, "{table}: columns not in the schema catalog: {columns:?}")
            }
            BuildWarning::ReuseSkipped {
                source_path,
                reason,
            } => write!(f, "{source_path}: rebuilt instead of reused ({reason})"),
        }
    }
}

fn record_warning(warnings: &mut Vec<BuildWarning>, warning: BuildWarning) {
    warn!("{warning}");
    warnings.push(warning);
}

#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub registry: Registry,
    /// Canonical CSV bytes for every table in `registry`.
    pub artifacts: Artifacts,
    pub failures: Vec<TableFailure>,
    pub warnings: Vec<BuildWarning>,
    /// Workbooks carried over unchanged from the previous registry.
    pub reused_workbooks: Vec<WorkbookId>,
}

impl BuildOutcome {
    /// True when every record made it into the registry.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn commit(&self, store: &ShadowStore) -> Result<(), StoreError> {
        store.commit(&self.registry, &self.artifacts)
    }

    pub fn loader(&self) -> MemoryLoader {
        MemoryLoader::from(self.artifacts.clone())
    }
}

pub struct IndexBuilder<'a> {
    config: BuildConfig,
    catalog: Option<&'a SchemaCatalog>,
    previous: Option<(&'a Registry, &'a dyn CsvLoader)>,
    progress: Option<&'a dyn ProgressCallback>,
}

struct TableJob {
    workbook_id: WorkbookId,
    source_path: String,
    record: TableRecord,
}

struct Prepared {
    key: Option<String>,
    location: String,
    outcome: Result<(TableMeta, Vec<u8>), TableError>,
    warnings: Vec<BuildWarning>,
}

struct PrepareContext<'a> {
    config: &'a BuildConfig,
    catalog: Option<&'a SchemaCatalog>,
    extracted_at: &'a str,
}

impl<'a> IndexBuilder<'a> {
    pub fn new(config: BuildConfig) -> Self {
        Self {
            config,
            catalog: None,
            previous: None,
            progress: None,
        }
    }

    pub fn with_catalog(mut self, catalog: &'a SchemaCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Enable reuse of unchanged workbooks from a previous build.
    pub fn with_previous(mut self, registry: &'a Registry, loader: &'a dyn CsvLoader) -> Self {
        self.previous = Some((registry, loader));
        self
    }

    pub fn with_progress(mut self, progress: &'a dyn ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Build and commit in one step. The store is only written when the build succeeds.
    pub fn build_into<S: TableRecordSource>(
        &self,
        source: S,
        store: &ShadowStore,
    ) -> Result<BuildOutcome, BuildError> {
        let outcome = self.build(source)?;
        outcome.commit(store)?;
        Ok(outcome)
    }

    pub fn build<S: TableRecordSource>(&self, mut source: S) -> Result<BuildOutcome, BuildError> {
        self.config.validate()?;

        let mut throttle = ProgressThrottle::new(self.progress);
        let mut registry = Registry::new(self.config.generator.clone());
        let extracted_at = registry.generated_at.clone();
        let mut artifacts = Artifacts::new();
        let mut warnings = Vec::new();
        let mut failures = Vec::new();
        let mut reused_workbooks = Vec::new();
        let mut paths_by_id: HashMap<WorkbookId, String> = HashMap::new();
        let mut jobs = Vec::new();

        while let Some(next) = source.next_workbook() {
            let workbook = next?;
            let source_path = workbook.source.source_path.clone();

            let ids = normalize_source_path(&source_path)
                .and_then(|normalized| Ok((assign_workbook_id(&normalized)?, normalized)));
            let (workbook_id, normalized) = match ids {
                Ok(ids) => ids,
                Err(error) => {
                    warn!(path = %source_path, %error, "skipping workbook with invalid path");
                    failures.extend(workbook.tables.iter().map(|record| TableFailure {
                        source_path: source_path.clone(),
                        sheet_name: record.sheet_name.clone(),
                        tag: record.tag.clone(),
                        table_key: None,
                        error: error.clone().into(),
                    }));
                    continue;
                }
            };

            match paths_by_id.get(&workbook_id) {
                Some(existing) if *existing == normalized => {
                    return Err(BuildError::DuplicateWorkbook { path: source_path });
                }
                Some(existing) => {
                    return Err(BuildError::WorkbookIdCollision {
                        workbook_id,
                        first_path: existing.clone(),
                        second_path: normalized,
                    });
                }
                None => {
                    paths_by_id.insert(workbook_id.clone(), normalized.clone());
                }
            }

            registry.workbooks.insert(
                workbook_id.clone(),
                WorkbookMeta {
                    workbook_id: workbook_id.clone(),
                    source_path: source_path.clone(),
                    hash: workbook.source.hash.clone(),
                },
            );

            if let Some(carried) =
                self.reusable(&workbook_id, &normalized, &workbook.source.hash, &mut warnings)
            {
                debug!(workbook = %workbook_id, tables = carried.len(), "reusing unchanged workbook");
                for (key, meta, bytes) in carried {
                    artifacts.insert(key.clone(), bytes);
                    registry.tables.insert(key, meta);
                }
                reused_workbooks.push(workbook_id);
                continue;
            }

            jobs.extend(workbook.tables.into_iter().map(|record| TableJob {
                workbook_id: workbook_id.clone(),
                source_path: source_path.clone(),
                record,
            }));
        }

        info!(
            workbooks = registry.workbooks.len(),
            reused = reused_workbooks.len(),
            tables = jobs.len(),
            "collected table records"
        );

        let ctx = PrepareContext {
            config: &self.config,
            catalog: self.catalog,
            extracted_at: &extracted_at,
        };
        let prepared = prepare_all(&jobs, &ctx, &mut throttle);

        let mut seen: HashMap<String, String> = HashMap::new();
        for (job, item) in jobs.iter().zip(prepared) {
            warnings.extend(item.warnings);

            if let Some(key) = &item.key {
                if let Some(first) = seen.get(key) {
                    return Err(BuildError::DuplicateTable {
                        key: key.clone(),
                        first: first.clone(),
                        second: item.location,
                    });
                }
                seen.insert(key.clone(), item.location.clone());
            }

            match item.outcome {
                Ok((meta, bytes)) => {
                    let key = meta.composite_key();
                    artifacts.insert(key.clone(), bytes);
                    registry.tables.insert(key, meta);
                }
                Err(error) => {
                    warn!(table = %item.location, %error, "table skipped");
                    failures.push(TableFailure {
                        source_path: job.source_path.clone(),
                        sheet_name: job.record.sheet_name.clone(),
                        tag: job.record.tag.clone(),
                        table_key: item.key,
                        error,
                    });
                }
            }
        }

        info!(
            tables = registry.tables.len(),
            failures = failures.len(),
            warnings = warnings.len(),
            "registry built"
        );

        Ok(BuildOutcome {
            registry,
            artifacts,
            failures,
            warnings,
            reused_workbooks,
        })
    }

    /// Previous tables and bytes for a workbook whose normalized path and hash are unchanged
    /// and whose artifacts still verify.
    fn reusable(
        &self,
        workbook_id: &str,
        normalized_path: &str,
        hash: &str,
        warnings: &mut Vec<BuildWarning>,
    ) -> Option<Vec<(String, TableMeta, Vec<u8>)>> {
        if !self.config.reuse_unchanged {
            return None;
        }
        let (previous, loader) = self.previous?;
        let prev_wb = previous.workbooks.get(workbook_id)?;
        let same_path = normalize_source_path(&prev_wb.source_path)
            .map(|p| p == normalized_path)
            .unwrap_or(false);
        if !same_path || prev_wb.hash != hash {
            return None;
        }

        let mut skip = |reason: String| {
            record_warning(
                warnings,
                BuildWarning::ReuseSkipped {
                    source_path: prev_wb.source_path.clone(),
                    reason,
                },
            );
            None
        };

        let mut carried = Vec::new();
        for (key, meta) in previous.tables_for_workbook(workbook_id) {
            if meta.schema_version != self.config.schema_version {
                return skip(format!(
                    "schema version changed from '{}'",
                    meta.schema_version
                ));
            }
            let bytes = match loader.load(key, meta) {
                Ok(bytes) => bytes,
                Err(e) => return skip(e.to_string()),
            };
            if sha256_hex(&bytes) != meta.csv_sha256 {
                return skip(format!("artifact for '{key}' does not match its recorded hash"));
            }
            carried.push((key.clone(), meta.clone(), bytes));
        }
        Some(carried)
    }
}

#[cfg(feature = "parallel")]
fn prepare_all(
    jobs: &[TableJob],
    ctx: &PrepareContext<'_>,
    throttle: &mut ProgressThrottle<'_>,
) -> Vec<Prepared> {
    use rayon::prelude::*;

    throttle.report("serialize", 0.0);
    let prepared = jobs.par_iter().map(|job| prepare_table(job, ctx)).collect();
    throttle.report("serialize", 1.0);
    prepared
}

#[cfg(not(feature = "parallel"))]
fn prepare_all(
    jobs: &[TableJob],
    ctx: &PrepareContext<'_>,
    throttle: &mut ProgressThrottle<'_>,
) -> Vec<Prepared> {
    let mut prepared = Vec::with_capacity(jobs.len());
    for (idx, job) in jobs.iter().enumerate() {
        prepared.push(prepare_table(job, ctx));
        throttle.step("serialize", idx + 1, jobs.len());
    }
    prepared
}

fn position_label(position: &TagPosition) -> String {
    match position {
        TagPosition::A1(a1) => a1.clone(),
        TagPosition::Index { row, col } => index_to_address(*row, *col),
    }
}

fn prepare_table(job: &TableJob, ctx: &PrepareContext<'_>) -> Prepared {
    let record = &job.record;
    let location = format!(
        "{} [{}!{}]",
        job.source_path,
        record.sheet_name,
        position_label(&record.tag_position)
    );
    let mut warnings = Vec::new();

    let identity = record.resolved_tag().and_then(|tag| {
        let table_id = assign_table_id(&tag.tag_type, tag.logical_name.as_deref())?;
        let position = record.tag_position.to_a1()?;
        Ok((tag, table_id, position))
    });
    let (tag, table_id, tag_position) = match identity {
        Ok(parts) => parts,
        Err(error) => {
            return Prepared {
                key: None,
                location,
                outcome: Err(error.into()),
                warnings,
            };
        }
    };
    let key = composite_key(&job.workbook_id, &table_id);

    let shape = shape_table(record, &tag.tag_type, &key, ctx, &mut warnings);
    let data = TableData {
        rows: record
            .rows
            .iter()
            .map(|row| {
                shape
                    .sources
                    .iter()
                    .map(|name| row.get(name).cloned().unwrap_or_default())
                    .collect()
            })
            .collect(),
        columns: shape.columns,
        primary_keys: shape.primary_keys,
    };

    let outcome = serialize(&data, &key).map_err(TableError::from).map(|out| {
        debug!(table = %key, rows = out.row_count, hash = %out.content_hash, "serialized table");
        let meta = TableMeta {
            csv_path: csv_relative_path(&job.workbook_id, &table_id),
            table_id,
            workbook_id: job.workbook_id.clone(),
            sheet_name: record.sheet_name.clone(),
            tag: record.tag.clone(),
            tag_type: tag.tag_type,
            logical_name: tag.logical_name,
            tag_position,
            columns: data.columns,
            primary_keys: data.primary_keys,
            row_count: out.row_count,
            csv_sha256: out.content_hash,
            extracted_at: ctx.extracted_at.to_string(),
            schema_version: ctx.config.schema_version.clone(),
        };
        (meta, out.bytes)
    });

    Prepared {
        key: Some(key),
        location,
        outcome,
        warnings,
    }
}

/// Canonical columns, the record field each one reads from, and the primary key.
struct TableShape {
    columns: Vec<String>,
    sources: Vec<String>,
    primary_keys: Vec<String>,
}

fn shape_table(
    record: &TableRecord,
    tag_type: &str,
    key: &str,
    ctx: &PrepareContext<'_>,
    warnings: &mut Vec<BuildWarning>,
) -> TableShape {
    let mut header: Vec<String> = Vec::with_capacity(record.columns.len());
    for col in &record.columns {
        if !header.contains(col) {
            header.push(col.clone());
        }
    }
    let mut extra = Vec::new();
    for name in record.rows.iter().flat_map(|row| row.keys()) {
        if !header.contains(name) && !extra.contains(name) {
            extra.push(name.clone());
        }
    }
    if !extra.is_empty() {
        if header.is_empty() {
            schema_gap(warnings, key, "no column list; order derived from row data".to_string());
        } else {
            schema_gap(warnings, key, format!("row fields {extra:?} missing from the column list"));
        }
        header.extend(extra);
    }

    let schema = ctx.catalog.and_then(|c| c.tag(tag_type));
    if ctx.catalog.is_some() && schema.is_none() {
        record_warning(
            warnings,
            BuildWarning::UnknownTagType {
                table: key.to_string(),
                tag_type: tag_type.to_string(),
            },
        );
    }

    let Some(schema) = schema else {
        let primary_keys = match &record.primary_keys {
            Some(pks) => pks.clone(),
            None => missing_key_fallback(&header, ctx.config.missing_key_policy, |d| {
                schema_gap(warnings, key, d)
            }),
        };
        let primary_keys = conform_keys(primary_keys, &header, key, warnings);
        return TableShape {
            columns: header.clone(),
            sources: header,
            primary_keys,
        };
    };

    let mut pairs: Vec<(String, String)> = Vec::with_capacity(header.len());
    for source in header {
        let canonical = schema.canonical_column(&source).unwrap_or(&source).to_string();
        let name = if !pairs.iter().any(|(c, _)| *c == canonical) {
            canonical
        } else if !pairs.iter().any(|(c, _)| *c == source) {
            schema_gap(
                warnings,
                key,
                format!("'{source}' also resolves to '{canonical}'; kept under its own name"),
            );
            source.clone()
        } else {
            schema_gap(warnings, key, format!("dropped duplicate column '{source}'"));
            continue;
        };
        pairs.push((name, source));
    }

    let names: Vec<String> = pairs.iter().map(|(c, _)| c.clone()).collect();
    let (ordered, unknown) = schema.order_columns(&names);
    if !unknown.is_empty() {
        record_warning(
            warnings,
            BuildWarning::UnknownColumns {
                table: key.to_string(),
                columns: unknown,
            },
        );
    }
    let sources = ordered
        .iter()
        .filter_map(|c| pairs.iter().find(|(name, _)| name == c))
        .map(|(_, source)| source.clone())
        .collect();

    let primary_keys = match &record.primary_keys {
        Some(pks) => pks
            .iter()
            .map(|pk| schema.canonical_column(pk).unwrap_or(pk).to_string())
            .collect(),
        None => {
            let (present, absent): (Vec<String>, Vec<String>) = schema
                .primary_keys()
                .into_iter()
                .partition(|pk| ordered.contains(pk));
            if !absent.is_empty() && !present.is_empty() {
                schema_gap(warnings, key, format!("schema key columns {absent:?} are absent"));
            }
            if present.is_empty() {
                missing_key_fallback(&ordered, ctx.config.missing_key_policy, |d| {
                    schema_gap(warnings, key, d)
                })
            } else {
                present
            }
        }
    };

    let primary_keys = conform_keys(primary_keys, &ordered, key, warnings);
    TableShape {
        columns: ordered,
        sources,
        primary_keys,
    }
}

/// Put key columns in column order and drop repeats, so the key stays an ordered subset of
/// the header. Names that are not columns are kept at the end for the serializer to reject.
fn conform_keys(
    keys: Vec<String>,
    columns: &[String],
    table: &str,
    warnings: &mut Vec<BuildWarning>,
) -> Vec<String> {
    let mut conformed: Vec<String> = columns
        .iter()
        .filter(|c| keys.contains(c))
        .cloned()
        .collect();
    for k in &keys {
        if !columns.contains(k) && !conformed.contains(k) {
            conformed.push(k.clone());
        }
    }
    if conformed != keys {
        schema_gap(
            warnings,
            table,
            format!("primary key {keys:?} rewritten in column order as {conformed:?}"),
        );
    }
    conformed
}

fn schema_gap(warnings: &mut Vec<BuildWarning>, table: &str, detail: String) {
    record_warning(
        warnings,
        BuildWarning::SchemaGap {
            table: table.to_string(),
            detail,
        },
    );
}

fn missing_key_fallback(
    columns: &[String],
    policy: MissingKeyPolicy,
    mut report: impl FnMut(String),
) -> Vec<String> {
    match policy {
        MissingKeyPolicy::PreserveOrder => {
            report("no primary key declared; rows keep extraction order".to_string());
            Vec::new()
        }
        MissingKeyPolicy::AllColumns => {
            report("no primary key declared; all columns form the key".to_string());
            columns.to_vec()
        }
    }
}
