//! Raw table records as handed over by the external extractor.

use crate::addressing::{canonical_tag_position, tag_position_from_index};
use crate::ids::{IdentityError, ParsedTag, parse_tag};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// A single extracted value. Nulls render as the empty string, so a null and an empty text
/// value are indistinguishable once serialized.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Null,
    Number(f64),
    Text(String),
}

impl CellValue {
    pub fn render(&self) -> Cow<'_, str> {
        match self {
            CellValue::Null => Cow::Borrowed(""),
            CellValue::Text(s) => Cow::Borrowed(s.as_str()),
            CellValue::Number(n) => Cow::Owned(render_number(*n)),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Number(value as f64)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(CellValue::Null)
    }
}

/// Shortest round-trip decimal form. `-0` collapses to `0` so both zeros hash the same.
fn render_number(n: f64) -> String {
    if n == 0.0 {
        "0".to_string()
    } else {
        n.to_string()
    }
}

/// One data row, keyed by column name. Insertion order is the order the extractor saw.
pub type Row = IndexMap<String, CellValue>;

/// Where the tag cell sits: either an A1 reference or zero-based indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagPosition {
    A1(String),
    Index { row: u32, col: u32 },
}

impl TagPosition {
    pub fn to_a1(&self) -> Result<String, IdentityError> {
        match self {
            TagPosition::A1(a1) => canonical_tag_position(a1),
            TagPosition::Index { row, col } => tag_position_from_index(*row, *col),
        }
    }
}

impl From<&str> for TagPosition {
    fn from(value: &str) -> Self {
        TagPosition::A1(value.to_string())
    }
}

/// A raw table as found in a workbook. Transient: consumed by the index builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRecord {
    pub sheet_name: String,
    /// Tag text as it appears in the sheet, e.g. `~FI_T: BaseParameters`.
    pub tag: String,
    /// Normalized tag keyword. Derived from `tag` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_type: Option<String>,
    #[serde(default)]
    pub logical_name: Option<String>,
    pub tag_position: TagPosition,
    /// Header order as extracted. Empty means unknown; the builder derives it from rows.
    #[serde(default)]
    pub columns: Vec<String>,
    /// `None` means the extractor could not say; `Some(vec![])` declares a non-tabular tag.
    #[serde(default)]
    pub primary_keys: Option<Vec<String>>,
    #[serde(default)]
    pub rows: Vec<Row>,
}

impl TableRecord {
    pub fn new(
        sheet_name: impl Into<String>,
        tag: impl Into<String>,
        tag_position: impl Into<TagPosition>,
    ) -> TableRecord {
        TableRecord {
            sheet_name: sheet_name.into(),
            tag: tag.into(),
            tag_type: None,
            logical_name: None,
            tag_position: tag_position.into(),
            columns: Vec::new(),
            primary_keys: None,
            rows: Vec::new(),
        }
    }

    pub fn with_columns<I, S>(mut self, columns: I) -> TableRecord
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_primary_keys<I, S>(mut self, keys: I) -> TableRecord
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    /// Append a row whose values line up with `columns`. Extra values are dropped.
    pub fn with_row<I, V>(mut self, values: I) -> TableRecord
    where
        I: IntoIterator<Item = V>,
        V: Into<CellValue>,
    {
        let row: Row = self
            .columns
            .iter()
            .cloned()
            .zip(values.into_iter().map(Into::into))
            .collect();
        self.rows.push(row);
        self
    }

    /// Tag keyword and logical name, preferring the extractor's explicit fields.
    pub fn resolved_tag(&self) -> Result<ParsedTag, IdentityError> {
        match self.tag_type.as_deref() {
            Some(tag_type) if !tag_type.trim().is_empty() => Ok(ParsedTag {
                tag_type: tag_type.trim().to_string(),
                logical_name: self
                    .logical_name
                    .as_deref()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(str::to_string),
            }),
            _ => {
                let mut parsed = parse_tag(&self.tag)?;
                if let Some(explicit) = self.logical_name.as_deref() {
                    let explicit = explicit.trim();
                    if !explicit.is_empty() {
                        parsed.logical_name = Some(explicit.to_string());
                    }
                }
                Ok(parsed)
            }
        }
    }
}

/// A workbook file as seen by the extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkbookSource {
    /// Path relative to the deck root.
    pub source_path: String,
    /// Full-file content hash, `sha256:<hex>`.
    pub hash: String,
}

/// All records for one workbook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkbookRecords {
    #[serde(flatten)]
    pub source: WorkbookSource,
    #[serde(default)]
    pub tables: Vec<TableRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_render_without_trailing_fraction() {
        assert_eq!(CellValue::Number(2020.0).render(), "2020");
        assert_eq!(CellValue::Number(100.5).render(), "100.5");
        assert_eq!(CellValue::Number(-0.0).render(), "0");
        assert_eq!(CellValue::Number(0.1).render(), "0.1");
        assert_eq!(CellValue::Null.render(), "");
        assert_eq!(CellValue::Text("ELC".into()).render(), "ELC");
    }

    #[test]
    fn cell_values_deserialize_untagged() {
        let row: Row =
            serde_json::from_str(r#"{"Region":"REG1","2020":0.35,"Note":null}"#).unwrap();
        assert_eq!(row["Region"], CellValue::Text("REG1".into()));
        assert_eq!(row["2020"], CellValue::Number(0.35));
        assert_eq!(row["Note"], CellValue::Null);
        let order: Vec<&str> = row.keys().map(String::as_str).collect();
        assert_eq!(order, ["Region", "2020", "Note"]);
    }

    #[test]
    fn tag_positions_accept_a1_or_indices() {
        let a1: TagPosition = serde_json::from_str(r#""b5""#).unwrap();
        assert_eq!(a1.to_a1().unwrap(), "B5");
        let idx: TagPosition = serde_json::from_str(r#"{"row":4,"col":1}"#).unwrap();
        assert_eq!(idx.to_a1().unwrap(), "B5");
        assert!(TagPosition::from("nope").to_a1().is_err());
    }

    #[test]
    fn explicit_tag_fields_win_over_tag_text() {
        let mut record = TableRecord::new("Sheet1", "~FI_T: Fallback", "B5");
        assert_eq!(record.resolved_tag().unwrap().tag_type, "fi_t");
        assert_eq!(
            record.resolved_tag().unwrap().logical_name.as_deref(),
            Some("Fallback")
        );

        record.logical_name = Some("BaseParameters".into());
        assert_eq!(
            record.resolved_tag().unwrap().logical_name.as_deref(),
            Some("BaseParameters")
        );

        record.tag_type = Some("uc_t".into());
        record.logical_name = None;
        let tag = record.resolved_tag().unwrap();
        assert_eq!(tag.tag_type, "uc_t");
        assert_eq!(tag.logical_name, None);
    }

    #[test]
    fn row_builder_aligns_values_with_columns() {
        let record = TableRecord::new("S", "~FI_Process", "A1")
            .with_columns(["TechName", "Comm-IN"])
            .with_row([CellValue::from("ELCCOA01"), CellValue::Null]);
        assert_eq!(record.rows.len(), 1);
        assert_eq!(record.rows[0]["TechName"], CellValue::Text("ELCCOA01".into()));
        assert_eq!(record.rows[0]["Comm-IN"], CellValue::Null);
    }
}
