//! Common test utilities shared across integration tests.

#![allow(dead_code)]

use shadow_tables::{
    BuildConfig, BuildOutcome, CellValue, DiffConfig, DiffResult, IndexBuilder, TableRecord,
    VecRecordSource, WorkbookRecords, WorkbookSource, diff_registries,
};

pub const FI_PROCESS_COLUMNS: [&str; 7] = [
    "Region", "TechName", "Attribute", "Commodity", "2020", "2025", "2030",
];
pub const FI_PROCESS_KEYS: [&str; 4] = ["Region", "TechName", "Attribute", "Commodity"];

pub fn workbook(path: &str, tables: Vec<TableRecord>) -> WorkbookRecords {
    WorkbookRecords {
        source: WorkbookSource {
            source_path: path.to_string(),
            hash: format!("sha256:{:0>64}", path.len()),
        },
        tables,
    }
}

/// `~FI_PROCESS` table; each row is `(region, tech, [2020, 2025, 2030])`.
pub fn fi_process(rows: &[(&str, &str, [f64; 3])]) -> TableRecord {
    let mut record = TableRecord::new("Processes", "~FI_PROCESS", "B3")
        .with_columns(FI_PROCESS_COLUMNS)
        .with_primary_keys(FI_PROCESS_KEYS);
    for (region, tech, values) in rows {
        let mut row: Vec<CellValue> = vec![
            (*region).into(),
            (*tech).into(),
            "EFF".into(),
            "ELC".into(),
        ];
        row.extend(values.iter().map(|v| CellValue::Number(*v)));
        record = record.with_row(row);
    }
    record
}

/// Keyless `~TFM_INS` table with one `(attribute, value)` pair per row.
pub fn tfm_ins(logical: &str, rows: &[(&str, f64)]) -> TableRecord {
    let mut record = TableRecord::new("Transforms", format!("~TFM_INS: {logical}"), "A1")
        .with_columns(["Attribute", "Value"])
        .with_primary_keys(Vec::<String>::new());
    for (attribute, value) in rows {
        record = record.with_row([CellValue::from(*attribute), CellValue::Number(*value)]);
    }
    record
}

pub fn base_rows() -> Vec<(&'static str, &'static str, [f64; 3])> {
    vec![
        ("REG1", "ELCCOA01", [0.35, 0.36, 0.37]),
        ("REG2", "ELCCOA01", [0.34, 0.35, 0.36]),
        ("REG1", "ELCGAS01", [0.5, 0.52, 0.55]),
    ]
}

/// A small two-workbook deck.
pub fn sample_deck() -> Vec<WorkbookRecords> {
    vec![
        workbook("VT_BaseYear.xlsx", vec![fi_process(&base_rows())]),
        workbook(
            "SuppXLS/Scen_Policy.xlsx",
            vec![tfm_ins("caps", &[("CAP_BND", 10.0), ("NCAP_COST", 1200.0)])],
        ),
    ]
}

pub fn build(workbooks: Vec<WorkbookRecords>) -> BuildOutcome {
    IndexBuilder::new(BuildConfig::default())
        .build(VecRecordSource::new(workbooks))
        .unwrap_or_else(|e| panic!("build failed: {e}"))
}

pub fn diff_outcomes(old: &BuildOutcome, new: &BuildOutcome, config: &DiffConfig) -> DiffResult {
    let old_loader = old.loader();
    let new_loader = new.loader();
    diff_registries(&old.registry, &new.registry, &old_loader, &new_loader, config)
        .unwrap_or_else(|e| panic!("diff failed: {e}"))
}

pub fn csv_text(outcome: &BuildOutcome, key: &str) -> String {
    let bytes = outcome
        .artifacts
        .get(key)
        .unwrap_or_else(|| panic!("no artifact for {key}"));
    String::from_utf8(bytes.clone()).expect("artifact is UTF-8")
}

/// The only key in `outcome` whose table id is `table_id`.
pub fn key_for(outcome: &BuildOutcome, table_id: &str) -> String {
    let mut keys = outcome
        .registry
        .tables
        .iter()
        .filter(|(_, meta)| meta.table_id == table_id)
        .map(|(key, _)| key.clone());
    let key = keys.next().unwrap_or_else(|| panic!("no table {table_id}"));
    assert!(keys.next().is_none(), "table id {table_id} is ambiguous");
    key
}
