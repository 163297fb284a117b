//! The boundary to the external spreadsheet extractor.
//!
//! The index builder never parses spreadsheets. It pulls records from a
//! [`TableRecordSource`], one workbook at a time.

use crate::error_codes;
use crate::record::WorkbookRecords;
use serde_json::de::IoRead;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("[SHADOW_SRC_001] failed to read records from '{origin}': {source}")]
    Io {
        origin: String,
        #[source]
        source: std::io::Error,
    },

    #[error("[SHADOW_SRC_002] malformed record in '{origin}' (workbook #{index}): {message}")]
    Json {
        origin: String,
        index: usize,
        message: String,
    },
}

impl SourceError {
    pub fn code(&self) -> &'static str {
        match self {
            SourceError::Io { .. } => error_codes::SRC_IO,
            SourceError::Json { .. } => error_codes::SRC_JSON,
        }
    }
}

/// A lazy, finite, non-restartable sequence of workbooks and their table records.
///
/// Each workbook is yielded at most once; once `next_workbook` returns `None` it keeps
/// returning `None`.
pub trait TableRecordSource {
    fn next_workbook(&mut self) -> Option<Result<WorkbookRecords, SourceError>>;
}

impl<S: TableRecordSource + ?Sized> TableRecordSource for &mut S {
    fn next_workbook(&mut self) -> Option<Result<WorkbookRecords, SourceError>> {
        (**self).next_workbook()
    }
}

/// Records already held in memory.
pub struct VecRecordSource {
    inner: std::vec::IntoIter<WorkbookRecords>,
}

impl VecRecordSource {
    pub fn new(workbooks: Vec<WorkbookRecords>) -> Self {
        Self {
            inner: workbooks.into_iter(),
        }
    }
}

impl From<Vec<WorkbookRecords>> for VecRecordSource {
    fn from(workbooks: Vec<WorkbookRecords>) -> Self {
        Self::new(workbooks)
    }
}

impl TableRecordSource for VecRecordSource {
    fn next_workbook(&mut self) -> Option<Result<WorkbookRecords, SourceError>> {
        self.inner.next().map(Ok)
    }
}

/// An extractor dump: a stream of JSON workbook objects (JSON Lines or concatenated JSON),
/// each `{"source_path", "hash", "tables": [...]}`. Parsed one workbook at a time.
pub struct JsonRecordSource<R: Read> {
    origin: String,
    stream: serde_json::StreamDeserializer<'static, IoRead<R>, WorkbookRecords>,
    index: usize,
    done: bool,
}

impl JsonRecordSource<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let origin = path.display().to_string();
        let file = File::open(path).map_err(|source| SourceError::Io {
            origin: origin.clone(),
            source,
        })?;
        Ok(Self::from_reader(BufReader::new(file), origin))
    }
}

impl<R: Read> JsonRecordSource<R> {
    pub fn from_reader(reader: R, origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            stream: serde_json::Deserializer::from_reader(reader).into_iter(),
            index: 0,
            done: false,
        }
    }
}

impl<R: Read> TableRecordSource for JsonRecordSource<R> {
    fn next_workbook(&mut self) -> Option<Result<WorkbookRecords, SourceError>> {
        if self.done {
            return None;
        }
        let item = match self.stream.next() {
            None => {
                self.done = true;
                return None;
            }
            Some(Ok(workbook)) => Ok(workbook),
            Some(Err(e)) => {
                // The stream cannot resynchronize after a syntax error.
                self.done = true;
                if e.is_io() {
                    Err(SourceError::Io {
                        origin: self.origin.clone(),
                        source: e.into(),
                    })
                } else {
                    Err(SourceError::Json {
                        origin: self.origin.clone(),
                        index: self.index,
                        message: e.to_string(),
                    })
                }
            }
        };
        self.index += 1;
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUMP: &str = r#"
{"source_path": "VT_BaseYear.xlsx", "hash": "sha256:aa", "tables": [
  {"sheet_name": "Pri_COA", "tag": "~FI_Process", "tag_position": "B5",
   "columns": ["TechName"], "primary_keys": ["TechName"],
   "rows": [{"TechName": "ELCCOA01"}]}
]}
{"source_path": "SuppXLS/Scen_Demand.xlsx", "hash": "sha256:bb", "tables": []}
"#;

    #[test]
    fn json_source_yields_each_workbook_once() {
        let mut source = JsonRecordSource::from_reader(DUMP.as_bytes(), "dump");
        let first = source.next_workbook().unwrap().unwrap();
        assert_eq!(first.source.source_path, "VT_BaseYear.xlsx");
        assert_eq!(first.tables.len(), 1);
        assert_eq!(first.tables[0].primary_keys, Some(vec!["TechName".to_string()]));

        let second = source.next_workbook().unwrap().unwrap();
        assert_eq!(second.source.hash, "sha256:bb");
        assert!(source.next_workbook().is_none());
        assert!(source.next_workbook().is_none());
    }

    #[test]
    fn malformed_json_reports_origin_and_stops() {
        let text = r#"{"source_path": "a.xlsx", "hash": "sha256:aa"} {"source_path": 5}"#;
        let mut source = JsonRecordSource::from_reader(text.as_bytes(), "dump.jsonl");
        assert!(source.next_workbook().unwrap().is_ok());
        let err = source.next_workbook().unwrap().expect_err("second record is malformed");
        assert_eq!(err.code(), error_codes::SRC_JSON);
        assert!(err.to_string().contains("dump.jsonl"));
        assert!(source.next_workbook().is_none());
    }

    #[test]
    fn vec_source_is_not_restartable() {
        let mut source = VecRecordSource::new(Vec::new());
        assert!(source.next_workbook().is_none());
        assert!(source.next_workbook().is_none());
    }
}
