mod common;

use common::{build, key_for, sample_deck};
use shadow_tables::{
    BuildConfig, IndexBuilder, REGISTRY_FILE_NAME, Registry, ShadowStore, VecRecordSource,
    validate,
};

#[test]
fn registry_json_round_trips() {
    let outcome = build(sample_deck());
    let text = outcome.registry.to_json_string().unwrap();
    assert!(text.ends_with("}\n"));
    assert!(!text.contains('\r'));

    let back = Registry::from_json_str(&text, "memory").unwrap();
    assert_eq!(back, outcome.registry);
    back.check_integrity().unwrap();
    assert_eq!(back.to_json_string().unwrap(), text);
}

#[test]
fn committed_store_validates_and_reads_back() {
    let dir = tempfile::tempdir().unwrap();
    let store = ShadowStore::new(dir.path().join("shadow"));
    let outcome = IndexBuilder::new(BuildConfig::default())
        .build_into(VecRecordSource::new(sample_deck()), &store)
        .unwrap();

    assert!(dir.path().join("shadow").join(REGISTRY_FILE_NAME).is_file());
    let key = key_for(&outcome, "fi_process");
    let meta = &outcome.registry.tables[&key];
    let on_disk = std::fs::read(store.artifact_path(&meta.csv_path).unwrap()).unwrap();
    assert_eq!(on_disk, outcome.artifacts[&key]);

    let registry = store.read_registry().unwrap();
    assert_eq!(registry, outcome.registry);
    let report = validate(&registry, &store, None);
    assert!(report.is_valid(), "{:?}", report.errors);
    assert_eq!(report.tables_checked, 2);
}

#[test]
fn tampered_artifact_fails_validation() {
    let dir = tempfile::tempdir().unwrap();
    let store = ShadowStore::new(dir.path().join("shadow"));
    let outcome = IndexBuilder::new(BuildConfig::default())
        .build_into(VecRecordSource::new(sample_deck()), &store)
        .unwrap();

    let key = key_for(&outcome, "fi_process");
    let path = store
        .artifact_path(&outcome.registry.tables[&key].csv_path)
        .unwrap();
    let mut text = std::fs::read_to_string(&path).unwrap();
    text = text.replace("0.35", "0.99");
    std::fs::write(&path, text).unwrap();

    let report = validate(&store.read_registry().unwrap(), &store, None);
    assert!(!report.is_valid());
    assert!(report.errors.iter().all(|e| e.table.as_deref() == Some(key.as_str())));
}

#[test]
fn unchanged_deck_reuses_metadata_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    let store = ShadowStore::new(dir.path().join("shadow"));
    let first = IndexBuilder::new(BuildConfig::default())
        .build_into(VecRecordSource::new(sample_deck()), &store)
        .unwrap();

    let previous = store.read_registry().unwrap();
    let second = IndexBuilder::new(BuildConfig::default())
        .with_previous(&previous, &store)
        .build(VecRecordSource::new(sample_deck()))
        .unwrap();

    assert_eq!(second.reused_workbooks.len(), 2);
    assert_eq!(second.registry.tables, first.registry.tables);
    assert_eq!(second.registry.workbooks, first.registry.workbooks);
    assert_eq!(second.artifacts, first.artifacts);
}

#[test]
fn failed_build_leaves_previous_store_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let store = ShadowStore::new(dir.path().join("shadow"));
    IndexBuilder::new(BuildConfig::default())
        .build_into(VecRecordSource::new(sample_deck()), &store)
        .unwrap();
    let before = std::fs::read(store.registry_path()).unwrap();

    let mut deck = sample_deck();
    deck.push(deck[0].clone());
    let err = IndexBuilder::new(BuildConfig::default())
        .build_into(VecRecordSource::new(deck), &store)
        .unwrap_err();
    assert!(err.to_string().starts_with("[SHADOW_BUILD_"));
    assert_eq!(std::fs::read(store.registry_path()).unwrap(), before);
}
