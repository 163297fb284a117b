use crate::config::TableMatch;
use crate::registry::{Registry, TableMeta};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// A registry entry: composite key plus metadata.
pub(super) type Entry<'a> = (&'a str, &'a TableMeta);

pub(super) struct MatchedPair<'a> {
    pub(super) match_key: String,
    pub(super) old: Entry<'a>,
    pub(super) new: Entry<'a>,
}

#[derive(Default)]
pub(super) struct Pairing<'a> {
    pub(super) added: Vec<Entry<'a>>,
    pub(super) removed: Vec<Entry<'a>>,
    /// Sorted by match key.
    pub(super) matched: Vec<MatchedPair<'a>>,
}

pub(super) fn pair_tables<'a>(
    old: &'a Registry,
    new: &'a Registry,
    mode: TableMatch,
    warnings: &mut Vec<String>,
) -> Pairing<'a> {
    let ambiguous = match mode {
        TableMatch::CompositeKey => BTreeSet::new(),
        TableMatch::TableId => ambiguous_table_ids(old, new),
    };
    for table_id in &ambiguous {
        warn!(table_id = %table_id, "table id is not unique; matching by composite key");
        warnings.push(format!(
            "table id '{table_id}' occurs in more than one workbook; matched by composite key"
        ));
    }

    let by_match_key = |registry: &'a Registry| -> BTreeMap<String, Entry<'a>> {
        registry
            .tables
            .iter()
            .map(|(key, meta)| {
                let match_key = match mode {
                    TableMatch::TableId if !ambiguous.contains(&meta.table_id) => {
                        meta.table_id.clone()
                    }
                    _ => key.clone(),
                };
                (match_key, (key.as_str(), meta))
            })
            .collect()
    };
    let old_map = by_match_key(old);
    let mut new_map = by_match_key(new);

    let mut pairing = Pairing::default();
    for (match_key, old_entry) in old_map {
        match new_map.remove(&match_key) {
            Some(new_entry) => pairing.matched.push(MatchedPair {
                match_key,
                old: old_entry,
                new: new_entry,
            }),
            None => pairing.removed.push(old_entry),
        }
    }
    pairing.added.extend(new_map.into_values());

    pairing.added.sort_by_key(|(key, _)| *key);
    pairing.removed.sort_by_key(|(key, _)| *key);
    pairing
}

/// Table ids that appear under more than one workbook in either registry.
fn ambiguous_table_ids(old: &Registry, new: &Registry) -> BTreeSet<String> {
    let mut ambiguous = BTreeSet::new();
    for registry in [old, new] {
        let mut owners: BTreeMap<&str, &str> = BTreeMap::new();
        for meta in registry.tables.values() {
            match owners.get(meta.table_id.as_str()) {
                Some(owner) if *owner != meta.workbook_id.as_str() => {
                    ambiguous.insert(meta.table_id.clone());
                }
                Some(_) => {}
                None => {
                    owners.insert(&meta.table_id, &meta.workbook_id);
                }
            }
        }
    }
    ambiguous
}
