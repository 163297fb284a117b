//! Canonical CSV encoding of a table.
//!
//! The byte layout is a contract: UTF-8 without BOM, `\n` after every record including the
//! header, a field quoted only when it contains `,`, `"`, `\n` or `\r`, embedded quotes
//! doubled. Rows are sorted by the primary-key tuple (byte-wise on rendered strings); a table
//! without a primary key keeps extraction order. Equal logical tables always produce equal
//! bytes and therefore equal hashes.
//!
//! A record consisting of a single empty field is written as `""` so that it never appears as
//! a blank line, which CSV readers skip.

use crate::error_codes;
use crate::hashing::sha256_hex;
use crate::record::CellValue;
use std::borrow::Cow;
use thiserror::Error;

const DELIMITER: u8 = b',';
const QUOTE: u8 = b'"';
const TERMINATOR: u8 = b'\n';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SerializeError {
    #[error("[SHADOW_SER_001] duplicate primary key {key:?} in table '{table}'")]
    DuplicateKey { table: String, key: Vec<String> },

    #[error("[SHADOW_SER_002] primary key column '{column}' is not a column of table '{table}'")]
    UnknownKeyColumn { table: String, column: String },

    #[error(
        "[SHADOW_SER_003] row {row} of table '{table}' has {found} values, expected {expected}"
    )]
    RowWidth {
        table: String,
        row: usize,
        expected: usize,
        found: usize,
    },
}

impl SerializeError {
    pub fn code(&self) -> &'static str {
        match self {
            SerializeError::DuplicateKey { .. } => error_codes::SER_DUPLICATE_KEY,
            SerializeError::UnknownKeyColumn { .. } => error_codes::SER_UNKNOWN_KEY_COLUMN,
            SerializeError::RowWidth { .. } => error_codes::SER_ROW_WIDTH,
        }
    }
}

/// A table ready for serialization: canonical column order, key columns, row values aligned
/// with `columns`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableData {
    pub columns: Vec<String>,
    pub primary_keys: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedTable {
    pub bytes: Vec<u8>,
    /// SHA-256 of `bytes`, lower-case hex.
    pub content_hash: String,
    /// Data rows, header excluded.
    pub row_count: usize,
}

/// Serialize `table` into canonical CSV bytes. `table_key` only labels errors.
pub fn serialize(table: &TableData, table_key: &str) -> Result<SerializedTable, SerializeError> {
    let key_idx = key_indices(&table.columns, &table.primary_keys, table_key)?;

    let width = table.columns.len();
    let mut rendered: Vec<Vec<Cow<'_, str>>> = Vec::with_capacity(table.rows.len());
    for (row_idx, row) in table.rows.iter().enumerate() {
        if row.len() != width {
            return Err(SerializeError::RowWidth {
                table: table_key.to_string(),
                row: row_idx,
                expected: width,
                found: row.len(),
            });
        }
        rendered.push(row.iter().map(CellValue::render).collect());
    }

    let mut order: Vec<usize> = (0..rendered.len()).collect();
    if !key_idx.is_empty() {
        let (keys, cells) = (&key_idx, &rendered);
        let key_of = move |i: usize| keys.iter().map(move |&k| &*cells[i][k]);
        order.sort_by(|&a, &b| key_of(a).cmp(key_of(b)));

        if let Some(pair) = order.windows(2).find(|w| key_of(w[0]).eq(key_of(w[1]))) {
            return Err(SerializeError::DuplicateKey {
                table: table_key.to_string(),
                key: key_of(pair[0]).map(str::to_string).collect(),
            });
        }
    }

    let mut bytes = Vec::new();
    if width > 0 {
        write_record(&mut bytes, table.columns.iter().map(String::as_str));
        for &i in &order {
            write_record(&mut bytes, rendered[i].iter().map(|c| &**c));
        }
    }

    Ok(SerializedTable {
        content_hash: sha256_hex(&bytes),
        row_count: rendered.len(),
        bytes,
    })
}

/// Positions of `primary_keys` within `columns`.
pub fn key_indices(
    columns: &[String],
    primary_keys: &[String],
    table_key: &str,
) -> Result<Vec<usize>, SerializeError> {
    primary_keys
        .iter()
        .map(|pk| {
            columns
                .iter()
                .position(|c| c == pk)
                .ok_or_else(|| SerializeError::UnknownKeyColumn {
                    table: table_key.to_string(),
                    column: pk.clone(),
                })
        })
        .collect()
}

fn write_record<'a>(out: &mut Vec<u8>, fields: impl ExactSizeIterator<Item = &'a str>) {
    let single = fields.len() == 1;
    for (i, field) in fields.enumerate() {
        if i > 0 {
            out.push(DELIMITER);
        }
        if single && field.is_empty() {
            out.extend_from_slice(b"\"\"");
        } else {
            write_field(out, field);
        }
    }
    out.push(TERMINATOR);
}

fn write_field(out: &mut Vec<u8>, field: &str) {
    if !needs_quoting(field) {
        out.extend_from_slice(field.as_bytes());
        return;
    }
    out.push(QUOTE);
    for &b in field.as_bytes() {
        if b == QUOTE {
            out.push(QUOTE);
        }
        out.push(b);
    }
    out.push(QUOTE);
}

pub fn needs_quoting(field: &str) -> bool {
    field
        .bytes()
        .any(|b| matches!(b, DELIMITER | QUOTE | b'\n' | b'\r'))
}

/// A shadow table read back from its bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Parse canonical CSV bytes. Ragged records and invalid UTF-8 are errors.
pub fn parse(bytes: &[u8]) -> Result<ParsedTable, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(bytes);

    let header = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(ParsedTable { header, rows })
}
