//! Shadow Tables: canonical CSV snapshots of the tagged tables in a TIMES/VEDA workbook deck.
//!
//! This crate provides functionality for:
//! - Assigning stable workbook and table identifiers
//! - Serializing each table to canonical CSV with a content hash
//! - Building and persisting a registry (`tables_index.json`) over all tables of a deck
//! - Diffing two registries down to row level with bounded detail
//! - Validating a committed shadow directory
//!
//! # Quick Start
//!
//! ```ignore
//! use shadow_tables::{BuildConfig, DiffConfig, IndexBuilder, JsonRecordSource, ShadowStore};
//!
//! let source = JsonRecordSource::open("records.jsonl")?;
//! let store = ShadowStore::new("shadow");
//! let outcome = IndexBuilder::new(BuildConfig::default()).build_into(source, &store)?;
//!
//! let old = ShadowStore::new("shadow-before");
//! let result = shadow_tables::diff_registries(
//!     &old.read_registry()?,
//!     &outcome.registry,
//!     &old,
//!     &store,
//!     &DiffConfig::default(),
//! )?;
//! println!("{} tables modified", result.summary.tables_modified);
//! ```

mod addressing;
mod builder;
mod canonical;
mod config;
mod diff;
mod engine;
pub mod error_codes;
pub(crate) mod hashing;
mod ids;
mod output;
mod progress;
mod record;
mod registry;
mod schema;
mod source;
mod store;
mod validate;

pub use addressing::{address_to_index, canonical_tag_position, index_to_address};
pub use builder::{
    BuildError, BuildOutcome, BuildWarning, IndexBuilder, TableError, TableFailure,
};
pub use canonical::{
    ParsedTable, SerializeError, SerializedTable, TableData, parse as parse_canonical_csv,
    serialize as serialize_table,
};
pub use config::{
    BuildConfig, BuildConfigBuilder, ConfigError, DEFAULT_ROW_DETAIL_BUDGET,
    DEFAULT_SCHEMA_VERSION, DiffConfig, DiffConfigBuilder, MissingKeyPolicy, TableMatch,
};
pub use diff::{
    DiffError, DiffResult, DiffSummary, FieldChange, RowChange, RowKey, RowValues, Side,
    TableDiff, TableRef,
};
pub use engine::{diff_registries, diff_registries_with_progress};
pub use hashing::{file_sha256_tagged, sha256_hex};
pub use ids::{
    IdentityError, ParsedTag, TableId, WorkbookId, assign_table_id, assign_workbook_id,
    composite_key, normalize_logical_name, normalize_source_path, parse_tag,
    split_composite_key,
};
pub use output::json::{
    serialize_diff_result, serialize_diff_result_pretty, serialize_validation_report,
};
pub use progress::{NoProgress, ProgressCallback};
pub use record::{CellValue, Row, TableRecord, TagPosition, WorkbookRecords, WorkbookSource};
pub use registry::{
    REGISTRY_VERSION, Registry, RegistryError, TableMeta, WorkbookMeta, csv_relative_path,
};
pub use schema::{FieldSchema, SchemaCatalog, SchemaError, TagSchema};
pub use source::{JsonRecordSource, SourceError, TableRecordSource, VecRecordSource};
pub use store::{
    Artifacts, CsvLoader, LoadError, MemoryLoader, REGISTRY_FILE_NAME, ShadowStore, StoreError,
};
pub use validate::{IssueKind, ValidationIssue, ValidationReport, validate};
