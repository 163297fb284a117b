//! Tag-schema catalog: canonical column names, aliases, schema primary keys.
//!
//! The catalog is a JSON list of tag definitions:
//!
//! ```json
//! [{"tag_name": "fi_t", "valid_fields": [
//!     {"name": "region", "use_name": "Region", "aliases": ["reg"], "query_field": true,
//!      "row_ignore_symbol": ["\\I:", "*"]}
//! ]}]
//! ```
//!
//! Lookups are case-insensitive on tag names, field names and aliases.

use crate::error_codes;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("[SHADOW_SCHEMA_001] failed to read schema catalog '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("[SHADOW_SCHEMA_002] schema catalog is malformed: {message}")]
    Format { message: String },
}

impl SchemaError {
    pub fn code(&self) -> &'static str {
        match self {
            SchemaError::Io { .. } => error_codes::SCHEMA_IO,
            SchemaError::Format { .. } => error_codes::SCHEMA_FORMAT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSchema {
    pub name: String,
    /// Canonical column name written to shadow tables.
    pub use_name: String,
    pub aliases: Vec<String>,
    /// Part of the schema primary key.
    pub query_field: bool,
    /// Markers that comment a row out when they prefix a key value, e.g. `\I:`.
    pub row_ignore_symbols: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TagSchema {
    pub tag_name: String,
    fields: Vec<FieldSchema>,
    lookup: HashMap<String, usize>,
}

impl TagSchema {
    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }

    fn field(&self, header: &str) -> Option<&FieldSchema> {
        self.lookup
            .get(&header.trim().to_lowercase())
            .map(|&idx| &self.fields[idx])
    }

    /// Resolve a header or alias to its canonical column name.
    pub fn canonical_column(&self, header: &str) -> Option<&str> {
        self.field(header).map(|f| f.use_name.as_str())
    }

    /// Canonical names of the fields flagged as query fields, in schema order.
    pub fn primary_keys(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| f.query_field)
            .map(|f| f.use_name.clone())
            .collect()
    }

    /// Schema fields first in schema order, then unknown columns in their given order.
    /// Returns the ordered columns and the unknown ones.
    pub fn order_columns(&self, columns: &[String]) -> (Vec<String>, Vec<String>) {
        let mut ordered = Vec::with_capacity(columns.len());
        for field in &self.fields {
            if let Some(col) = columns.iter().find(|c| **c == field.use_name) {
                if !ordered.contains(col) {
                    ordered.push(col.clone());
                }
            }
        }
        let unknown: Vec<String> = columns
            .iter()
            .filter(|c| !ordered.contains(c))
            .cloned()
            .collect();
        ordered.extend(unknown.iter().cloned());
        (ordered, unknown)
    }

    pub fn row_ignore_symbols(&self, column: &str) -> &[String] {
        self.field(column)
            .map(|f| f.row_ignore_symbols.as_slice())
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    tags: HashMap<String, TagSchema>,
}

fn strip_bom(s: &str) -> &str {
    s.strip_prefix('\u{FEFF}').unwrap_or(s)
}

impl SchemaCatalog {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| SchemaError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_bytes(&bytes)
    }

    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, SchemaError> {
        let text = std::str::from_utf8(bytes).map_err(|e| SchemaError::Format {
            message: format!("catalog is not UTF-8: {e}"),
        })?;
        let v: Value = serde_json::from_str(strip_bom(text)).map_err(|e| SchemaError::Format {
            message: format!("JSON parse error: {e}"),
        })?;
        let entries = v.as_array().ok_or_else(|| SchemaError::Format {
            message: "expected a top-level list of tag definitions".to_string(),
        })?;

        let mut tags = HashMap::new();
        for entry in entries {
            if let Some(tag) = parse_tag_obj(entry) {
                tags.insert(tag.tag_name.clone(), tag);
            }
        }
        Ok(Self { tags })
    }

    pub fn tag(&self, tag_type: &str) -> Option<&TagSchema> {
        self.tags.get(&tag_type.trim().to_lowercase())
    }

    /// Every row-ignore marker in the catalog, longest first so that a marker never shadows a
    /// longer one it prefixes.
    pub fn row_ignore_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self
            .tags
            .values()
            .flat_map(|tag| tag.fields.iter())
            .flat_map(|field| field.row_ignore_symbols.iter())
            .filter(|s| !s.trim().is_empty())
            .cloned()
            .collect();
        symbols.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        symbols.dedup();
        symbols
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

fn parse_tag_obj(v: &Value) -> Option<TagSchema> {
    let tag_name = v
        .get("tag_name")
        .and_then(|x| x.as_str())?
        .trim()
        .trim_start_matches('~')
        .to_lowercase();
    if tag_name.is_empty() {
        return None;
    }

    let mut schema = TagSchema {
        tag_name,
        ..TagSchema::default()
    };

    let fields = v
        .get("valid_fields")
        .and_then(|f| f.as_array())
        .map(Vec::as_slice)
        .unwrap_or(&[]);
    for f in fields {
        let Some(field) = parse_field_obj(f) else {
            continue;
        };
        let idx = schema.fields.len();
        for key in std::iter::once(&field.name)
            .chain(std::iter::once(&field.use_name))
            .chain(field.aliases.iter())
        {
            schema.lookup.entry(key.to_lowercase()).or_insert(idx);
        }
        schema.fields.push(field);
    }

    Some(schema)
}

fn parse_field_obj(v: &Value) -> Option<FieldSchema> {
    let name = v.get("name").and_then(|x| x.as_str())?.trim().to_string();
    if name.is_empty() {
        return None;
    }
    let use_name = v
        .get("use_name")
        .and_then(|x| x.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(&name)
        .to_string();

    Some(FieldSchema {
        aliases: string_list(v.get("aliases")),
        query_field: v.get("query_field").and_then(|x| x.as_bool()).unwrap_or(false),
        row_ignore_symbols: string_list(v.get("row_ignore_symbol")),
        name,
        use_name,
    })
}

fn string_list(v: Option<&Value>) -> Vec<String> {
    match v {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|x| x.as_str())
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}
