//! Row-level comparison of two parsed shadow tables.
//!
//! Keyed tables are aligned by primary-key tuple through hash maps; tables without a key, or
//! whose key cannot be trusted on both sides, are compared position by position.

use crate::canonical::ParsedTable;
use crate::config::DiffConfig;
use crate::diff::{FieldChange, RowChange, RowKey, RowValues, Side};
use rustc_hash::FxHashMap;
use std::collections::hash_map::Entry;
use tracing::warn;

type KeyTuple = Vec<String>;

#[derive(Debug, Default)]
pub(super) struct RowDiff {
    pub(super) positional: bool,
    pub(super) rows_added: usize,
    pub(super) rows_removed: usize,
    pub(super) rows_modified: usize,
    /// Capped at the configured row-detail budget, ordered by key or position.
    pub(super) changes: Vec<RowChange>,
    pub(super) columns_added: Vec<String>,
    pub(super) columns_removed: Vec<String>,
    pub(super) warnings: Vec<String>,
}

/// Remove the first matching row-ignore marker and the whitespace after it.
fn strip_ignore_prefix<'v>(value: &'v str, prefixes: &[String]) -> &'v str {
    prefixes
        .iter()
        .find_map(|p| value.strip_prefix(p.as_str()))
        .map_or(value, str::trim_start)
}

/// Column positions shared by both headers, in new-header order.
struct SharedColumns<'a> {
    names: Vec<&'a str>,
    positions: Vec<(usize, usize)>,
}

impl<'a> SharedColumns<'a> {
    fn new(old: &'a [String], new: &'a [String]) -> Self {
        let mut names = Vec::new();
        let mut positions = Vec::new();
        for (ni, name) in new.iter().enumerate() {
            if let Some(oi) = old.iter().position(|c| c == name) {
                names.push(name.as_str());
                positions.push((oi, ni));
            }
        }
        Self { names, positions }
    }

    fn differs(&self, old: &[String], new: &[String]) -> bool {
        self.positions.iter().any(|&(o, n)| old[o] != new[n])
    }

    fn field_changes(&self, old: &[String], new: &[String]) -> Vec<FieldChange> {
        self.names
            .iter()
            .zip(&self.positions)
            .filter(|(_, pos)| old[pos.0] != new[pos.1])
            .map(|(name, &(o, n))| FieldChange {
                column: (*name).to_string(),
                old: old[o].clone(),
                new: new[n].clone(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
enum Pending {
    Added(usize),
    Removed(usize),
    Modified(usize, usize),
    Replaced(usize),
}

struct KeyedAlignment {
    old_idx: Vec<usize>,
    new_idx: Vec<usize>,
    old_keys: Vec<KeyTuple>,
    new_keys: Vec<KeyTuple>,
    matched: Vec<(usize, usize)>,
    left_only: Vec<usize>,
    right_only: Vec<usize>,
}

pub(super) fn diff_rows(
    table_key: &str,
    old: &ParsedTable,
    new: &ParsedTable,
    old_pk: &[String],
    new_pk: &[String],
    config: &DiffConfig,
) -> RowDiff {
    let shared = SharedColumns::new(&old.header, &new.header);
    let mut out = RowDiff {
        columns_added: new
            .header
            .iter()
            .filter(|c| !old.header.contains(c))
            .cloned()
            .collect(),
        columns_removed: old
            .header
            .iter()
            .filter(|c| !new.header.contains(c))
            .cloned()
            .collect(),
        ..RowDiff::default()
    };

    let alignment = if old_pk.is_empty() && new_pk.is_empty() {
        None
    } else {
        match align_by_key(old, new, old_pk, new_pk, &config.key_ignore_prefixes) {
            Ok(alignment) => Some(alignment),
            Err(reason) => {
                warn!(table = %table_key, %reason, "falling back to positional row comparison");
                out.warnings.push(format!(
                    "table '{table_key}': {reason}; rows compared by position"
                ));
                None
            }
        }
    };

    let detail = Detail {
        old,
        new,
        shared: &shared,
        include_values: config.include_row_values,
    };
    let cap = config.row_detail_budget;

    match alignment {
        Some(alignment) => {
            let mut pending: Vec<(&KeyTuple, Pending)> = Vec::new();
            for &(oi, ni) in &alignment.matched {
                if shared.differs(&old.rows[oi], &new.rows[ni]) {
                    out.rows_modified += 1;
                    pending.push((&alignment.old_keys[oi], Pending::Modified(oi, ni)));
                }
            }
            for &oi in &alignment.left_only {
                out.rows_removed += 1;
                pending.push((&alignment.old_keys[oi], Pending::Removed(oi)));
            }
            for &ni in &alignment.right_only {
                out.rows_added += 1;
                pending.push((&alignment.new_keys[ni], Pending::Added(ni)));
            }
            pending.sort_by(|a, b| a.0.cmp(b.0));
            pending.truncate(cap);

            let labels = (&alignment.old_idx[..], &alignment.new_idx[..]);
            out.changes = pending
                .into_iter()
                .map(|(_, p)| detail.materialize(p, Some(labels)))
                .collect();
        }
        None => {
            out.positional = true;
            let common = old.rows.len().min(new.rows.len());
            let mut pending = Vec::new();
            for i in 0..common {
                if shared.differs(&old.rows[i], &new.rows[i]) {
                    out.rows_modified += 1;
                    pending.push(Pending::Replaced(i));
                }
            }
            out.rows_removed = old.rows.len() - common;
            out.rows_added = new.rows.len() - common;
            pending.extend((common..old.rows.len()).map(Pending::Removed));
            pending.extend((common..new.rows.len()).map(Pending::Added));
            pending.truncate(cap);

            out.changes = pending
                .into_iter()
                .map(|p| detail.materialize(p, None))
                .collect();
        }
    }
    out
}

fn align_by_key(
    old: &ParsedTable,
    new: &ParsedTable,
    old_pk: &[String],
    new_pk: &[String],
    prefixes: &[String],
) -> Result<KeyedAlignment, String> {
    if old_pk != new_pk {
        return Err(format!(
            "primary key changed from {old_pk:?} to {new_pk:?}"
        ));
    }
    let old_idx = key_positions(&old.header, old_pk, Side::Old)?;
    let new_idx = key_positions(&new.header, new_pk, Side::New)?;

    let old_keys = normalized_keys(&old.rows, &old_idx, prefixes);
    let new_keys = normalized_keys(&new.rows, &new_idx, prefixes);
    let old_map = index_keys(&old_keys, Side::Old)?;
    let new_map = index_keys(&new_keys, Side::New)?;

    let mut matched = Vec::new();
    let mut left_only = Vec::new();
    for (oi, key) in old_keys.iter().enumerate() {
        match new_map.get(key.as_slice()) {
            Some(&ni) => matched.push((oi, ni)),
            None => left_only.push(oi),
        }
    }
    let right_only = new_keys
        .iter()
        .enumerate()
        .filter(|(_, key)| !old_map.contains_key(key.as_slice()))
        .map(|(ni, _)| ni)
        .collect();

    Ok(KeyedAlignment {
        old_idx,
        new_idx,
        old_keys,
        new_keys,
        matched,
        left_only,
        right_only,
    })
}

fn key_positions(header: &[String], pk: &[String], side: Side) -> Result<Vec<usize>, String> {
    pk.iter()
        .map(|column| {
            header
                .iter()
                .position(|c| c == column)
                .ok_or_else(|| format!("key column '{column}' missing from the {side} artifact"))
        })
        .collect()
}

fn normalized_keys(rows: &[Vec<String>], key_idx: &[usize], prefixes: &[String]) -> Vec<KeyTuple> {
    rows.iter()
        .map(|row| {
            key_idx
                .iter()
                .map(|&k| strip_ignore_prefix(&row[k], prefixes).to_string())
                .collect()
        })
        .collect()
}

fn index_keys(keys: &[KeyTuple], side: Side) -> Result<FxHashMap<&[String], usize>, String> {
    let mut map = FxHashMap::default();
    map.reserve(keys.len());
    for (i, key) in keys.iter().enumerate() {
        match map.entry(key.as_slice()) {
            Entry::Occupied(_) => {
                return Err(format!("duplicate key {key:?} in the {side} artifact"));
            }
            Entry::Vacant(slot) => {
                slot.insert(i);
            }
        }
    }
    Ok(map)
}

struct Detail<'a> {
    old: &'a ParsedTable,
    new: &'a ParsedTable,
    shared: &'a SharedColumns<'a>,
    include_values: bool,
}

impl Detail<'_> {
    fn values(&self, header: &[String], row: &[String]) -> Option<RowValues> {
        self.include_values
            .then(|| header.iter().cloned().zip(row.iter().cloned()).collect())
    }

    fn label(row: &[String], idx: usize, key_idx: Option<&[usize]>) -> RowKey {
        match key_idx {
            Some(cols) => RowKey::Key(cols.iter().map(|&k| row[k].clone()).collect()),
            None => RowKey::Position(idx),
        }
    }

    fn materialize(&self, pending: Pending, keys: Option<(&[usize], &[usize])>) -> RowChange {
        let old_cols = keys.map(|k| k.0);
        let new_cols = keys.map(|k| k.1);
        match pending {
            Pending::Added(ni) => {
                let row = &self.new.rows[ni];
                RowChange::Added {
                    row: Self::label(row, ni, new_cols),
                    values: self.values(&self.new.header, row),
                }
            }
            Pending::Removed(oi) => {
                let row = &self.old.rows[oi];
                RowChange::Removed {
                    row: Self::label(row, oi, old_cols),
                    values: self.values(&self.old.header, row),
                }
            }
            Pending::Modified(oi, ni) => {
                let (old_row, new_row) = (&self.old.rows[oi], &self.new.rows[ni]);
                RowChange::Modified {
                    row: Self::label(new_row, ni, new_cols),
                    fields: self.shared.field_changes(old_row, new_row),
                }
            }
            Pending::Replaced(i) => {
                let (old_row, new_row) = (&self.old.rows[i], &self.new.rows[i]);
                RowChange::Replaced {
                    row: RowKey::Position(i),
                    old: self.values(&self.old.header, old_row),
                    new: self.values(&self.new.header, new_row),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(header: &[&str], rows: &[&[&str]]) -> ParsedTable {
        ParsedTable {
            header: header.iter().map(|s| s.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }

    fn keys(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn keyed_diff_reports_added_removed_modified() {
        let old = table(
            &["Region", "Tech", "2020"],
            &[&["REG1", "A", "1"], &["REG1", "B", "2"], &["REG2", "A", "3"]],
        );
        let new = table(
            &["Region", "Tech", "2020"],
            &[&["REG1", "A", "1"], &["REG1", "B", "5"], &["REG3", "A", "3"]],
        );
        let pk = keys(&["Region", "Tech"]);
        let diff = diff_rows("wb/t", &old, &new, &pk, &pk, &DiffConfig::default());

        assert!(!diff.positional);
        assert_eq!((diff.rows_added, diff.rows_removed, diff.rows_modified), (1, 1, 1));
        assert_eq!(
            diff.changes[0],
            RowChange::Modified {
                row: RowKey::Key(keys(&["REG1", "B"])),
                fields: vec![FieldChange {
                    column: "2020".into(),
                    old: "2".into(),
                    new: "5".into(),
                }],
            }
        );
        assert!(matches!(&diff.changes[1], RowChange::Removed { row: RowKey::Key(k), .. } if k == &keys(&["REG2", "A"])));
        match &diff.changes[2] {
            RowChange::Added { row, values } => {
                assert_eq!(row, &RowKey::Key(keys(&["REG3", "A"])));
                assert_eq!(values.as_ref().unwrap()["2020"], "3");
            }
            other => panic!("unexpected change {other:?}"),
        }
    }

    #[test]
    fn only_shared_columns_are_compared() {
        let old = table(&["K", "Gone", "V"], &[&["a", "x", "1"]]);
        let new = table(&["K", "V", "Fresh"], &[&["a", "1", "y"]]);
        let pk = keys(&["K"]);
        let diff = diff_rows("t", &old, &new, &pk, &pk, &DiffConfig::default());
        assert_eq!(diff.columns_added, keys(&["Fresh"]));
        assert_eq!(diff.columns_removed, keys(&["Gone"]));
        assert_eq!(diff.rows_modified, 0);
        assert!(diff.changes.is_empty());
    }

    #[test]
    fn positional_without_keys_treats_changes_as_replacements() {
        let old = table(&["V"], &[&["a"], &["b"], &["c"]]);
        let new = table(&["V"], &[&["a"], &["B"]]);
        let diff = diff_rows("t", &old, &new, &[], &[], &DiffConfig::default());
        assert!(diff.positional);
        assert!(diff.warnings.is_empty());
        assert_eq!((diff.rows_added, diff.rows_removed, diff.rows_modified), (0, 1, 1));
        assert!(matches!(diff.changes[0], RowChange::Replaced { row: RowKey::Position(1), .. }));
        assert!(matches!(diff.changes[1], RowChange::Removed { row: RowKey::Position(2), .. }));
    }

    #[test]
    fn key_change_and_duplicates_fall_back_with_warning() {
        let old = table(&["K", "V"], &[&["a", "1"]]);
        let new = table(&["K", "V"], &[&["a", "2"]]);
        let diff = diff_rows("t", &old, &new, &keys(&["K"]), &keys(&["K", "V"]), &DiffConfig::default());
        assert!(diff.positional);
        assert!(diff.warnings[0].contains("primary key changed"));

        let dup = table(&["K", "V"], &[&["a", "1"], &["a", "2"]]);
        let pk = keys(&["K"]);
        let diff = diff_rows("t", &old, &dup, &pk, &pk, &DiffConfig::default());
        assert!(diff.positional);
        assert!(diff.warnings[0].contains("duplicate key"));
        assert_eq!((diff.rows_added, diff.rows_modified), (1, 0));
    }

    #[test]
    fn ignore_prefixes_match_commented_rows() {
        let old = table(&["Region", "V"], &[&["*REG1", "1"]]);
        let new = table(&["Region", "V"], &[&["REG1", "1"]]);
        let pk = keys(&["Region"]);
        let config = DiffConfig::builder().key_ignore_prefix("*").build().unwrap();
        let diff = diff_rows("t", &old, &new, &pk, &pk, &config);
        assert_eq!((diff.rows_added, diff.rows_removed, diff.rows_modified), (0, 0, 1));
        match &diff.changes[0] {
            RowChange::Modified { row, fields } => {
                assert_eq!(row, &RowKey::Key(keys(&["REG1"])));
                assert_eq!(fields[0].old, "*REG1");
            }
            other => panic!("unexpected change {other:?}"),
        }

        assert_eq!(strip_ignore_prefix("\\I: REG1", &keys(&["\\I:"])), "REG1");
        assert_eq!(strip_ignore_prefix("REG1", &keys(&["*"])), "REG1");
    }

    #[test]
    fn details_are_capped_but_counts_are_not() {
        let old = table(&["K"], &[]);
        let new = table(&["K"], &[&["a"], &["b"], &["c"]]);
        let pk = keys(&["K"]);
        let config = DiffConfig::builder()
            .row_detail_budget(2)
            .include_row_values(false)
            .build()
            .unwrap();
        let diff = diff_rows("t", &old, &new, &pk, &pk, &config);
        assert_eq!(diff.rows_added, 3);
        assert_eq!(diff.changes.len(), 2);
        assert!(matches!(&diff.changes[0], RowChange::Added { values: None, .. }));
    }
}
