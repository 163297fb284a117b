use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn shadow_tables_cmd() -> Command {
    Command::new(env!("CARGO_BIN_EXE_shadow-tables"))
}

fn workbook_line(path: &str, elc_2030: f64, extra_row: bool) -> String {
    let mut rows = vec![
        serde_json::json!({"Region": "REG1", "TechName": "ELCCOA01", "2020": 0.35, "2030": elc_2030}),
        serde_json::json!({"Region": "REG2", "TechName": "ELCCOA01", "2020": 0.34, "2030": 0.36}),
    ];
    if extra_row {
        rows.push(serde_json::json!({"Region": "REG1", "TechName": "ELCWIN02", "2020": 0.0, "2030": 0.2}));
    }
    serde_json::json!({
        "source_path": path,
        "hash": format!("sha256:{:0>64}", (elc_2030 * 100.0) as u64 + extra_row as u64),
        "tables": [{
            "sheet_name": "Processes",
            "tag": "~FI_PROCESS",
            "tag_position": "B3",
            "columns": ["Region", "TechName", "2020", "2030"],
            "primary_keys": ["Region", "TechName"],
            "rows": rows,
        }]
    })
    .to_string()
}

fn write_records(dir: &Path, name: &str, lines: &[String]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, lines.join("\n") + "\n").expect("write records");
    path
}

fn run(args: &[&str]) -> Output {
    shadow_tables_cmd()
        .args(args)
        .output()
        .expect("failed to run shadow-tables")
}

fn build(records: &Path, out: &Path) -> Output {
    let output = run(&[
        "build",
        "--records",
        records.to_str().unwrap(),
        "--out",
        out.to_str().unwrap(),
    ]);
    assert!(
        output.status.success(),
        "build should succeed: stderr={}",
        String::from_utf8_lossy(&output.stderr)
    );
    output
}

#[test]
fn build_writes_registry_and_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let records = write_records(dir.path(), "records.jsonl", &[workbook_line("VT_BaseYear.xlsx", 0.37, false)]);
    let out = dir.path().join("shadow");
    let output = build(&records, &out);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Built 1 tables from 1 workbooks"), "{stdout}");

    let registry: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out.join("tables_index.json")).unwrap())
            .unwrap();
    let tables = registry["tables"].as_object().unwrap();
    assert_eq!(tables.len(), 1);
    let (key, meta) = tables.iter().next().unwrap();
    assert!(key.ends_with("/fi_process"));
    assert_eq!(meta["row_count"], 2);

    let csv = std::fs::read_to_string(out.join(meta["csv_path"].as_str().unwrap())).unwrap();
    assert_eq!(
        csv,
        "Region,TechName,2020,2030\nREG1,ELCCOA01,0.35,0.37\nREG2,ELCCOA01,0.34,0.36\n"
    );
}

#[test]
fn identical_snapshots_exit_0() {
    let dir = tempfile::tempdir().unwrap();
    let records = write_records(dir.path(), "records.jsonl", &[workbook_line("VT_BaseYear.xlsx", 0.37, false)]);
    let a = dir.path().join("a");
    let b = dir.path().join("b");
    build(&records, &a);
    build(&records, &b);

    let output = run(&["diff", a.to_str().unwrap(), b.to_str().unwrap()]);
    assert!(
        output.status.success(),
        "identical snapshots should exit 0: {:?}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(String::from_utf8_lossy(&output.stdout).contains("No differences found."));
}

#[test]
fn changed_snapshots_exit_1_with_json_counts() {
    let dir = tempfile::tempdir().unwrap();
    let old_records = write_records(dir.path(), "old.jsonl", &[workbook_line("VT_BaseYear.xlsx", 0.37, false)]);
    let new_records = write_records(dir.path(), "new.jsonl", &[workbook_line("VT_BaseYear.xlsx", 0.40, true)]);
    let a = dir.path().join("a");
    let b = dir.path().join("b");
    build(&old_records, &a);
    build(&new_records, &b);

    let output = run(&["diff", "--format", "json", a.to_str().unwrap(), b.to_str().unwrap()]);
    assert_eq!(
        output.status.code(),
        Some(1),
        "changes should exit 1: stderr={}",
        String::from_utf8_lossy(&output.stderr)
    );
    let result: serde_json::Value = serde_json::from_slice(&output.stdout).expect("valid JSON");
    assert_eq!(result["summary"]["tables_modified"], 1);
    assert_eq!(result["summary"]["rows_added"], 1);
    assert_eq!(result["summary"]["rows_modified"], 1);
    assert_eq!(result["truncated"], false);

    let limited = run(&[
        "diff",
        "--format",
        "json",
        "--limit-rows",
        "1",
        a.to_str().unwrap(),
        b.to_str().unwrap(),
    ]);
    let limited: serde_json::Value = serde_json::from_slice(&limited.stdout).expect("valid JSON");
    assert_eq!(limited["summary"], result["summary"]);
    assert_eq!(limited["truncated"], true);
    assert_eq!(limited["details_omitted"], 1);
}

#[test]
fn renamed_workbook_matches_by_table_id() {
    let dir = tempfile::tempdir().unwrap();
    let old_records = write_records(dir.path(), "old.jsonl", &[workbook_line("VT_BaseYear.xlsx", 0.37, false)]);
    let new_records = write_records(dir.path(), "new.jsonl", &[workbook_line("VT_BaseYear_2025.xlsx", 0.37, false)]);
    let a = dir.path().join("a");
    let b = dir.path().join("b");
    build(&old_records, &a);
    build(&new_records, &b);

    let by_key = run(&["diff", a.to_str().unwrap(), b.to_str().unwrap()]);
    assert_eq!(by_key.status.code(), Some(1));

    let by_id = run(&["diff", "--by-table-id", a.to_str().unwrap(), b.to_str().unwrap()]);
    assert!(
        by_id.status.success(),
        "rename should be invisible by table id: {}",
        String::from_utf8_lossy(&by_id.stdout)
    );
}

#[test]
fn validate_reports_tampering() {
    let dir = tempfile::tempdir().unwrap();
    let records = write_records(dir.path(), "records.jsonl", &[workbook_line("VT_BaseYear.xlsx", 0.37, false)]);
    let out = dir.path().join("shadow");
    build(&records, &out);

    let ok = run(&["validate", out.to_str().unwrap()]);
    assert!(ok.status.success(), "{}", String::from_utf8_lossy(&ok.stdout));

    let csv_dir = std::fs::read_dir(&out)
        .unwrap()
        .map(|e| e.unwrap().path())
        .find(|p| p.is_dir())
        .expect("workbook directory");
    std::fs::write(csv_dir.join("fi_process.csv"), "Region,TechName,2020,2030\n").unwrap();

    let bad = run(&["validate", "--format", "json", out.to_str().unwrap()]);
    assert_eq!(bad.status.code(), Some(1));
    let report: serde_json::Value = serde_json::from_slice(&bad.stdout).expect("valid JSON");
    assert!(!report["errors"].as_array().unwrap().is_empty());
}

#[test]
fn duplicate_key_fails_table_with_exit_1() {
    let dir = tempfile::tempdir().unwrap();
    let line = serde_json::json!({
        "source_path": "VT_BaseYear.xlsx",
        "hash": "sha256:00",
        "tables": [{
            "sheet_name": "Processes",
            "tag": "~FI_PROCESS",
            "tag_position": "B3",
            "columns": ["Region", "TechName"],
            "primary_keys": ["Region"],
            "rows": [
                {"Region": "REG1", "TechName": "A"},
                {"Region": "REG1", "TechName": "B"}
            ],
        }]
    })
    .to_string();
    let records = write_records(dir.path(), "records.jsonl", &[line]);
    let out = dir.path().join("shadow");

    let output = run(&[
        "build",
        "--records",
        records.to_str().unwrap(),
        "--out",
        out.to_str().unwrap(),
    ]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("SHADOW_SER_001"), "{stderr}");
}

#[test]
fn missing_snapshot_exits_2() {
    let dir = tempfile::tempdir().unwrap();
    let output = run(&[
        "diff",
        dir.path().join("nope").to_str().unwrap(),
        dir.path().join("nada").to_str().unwrap(),
    ]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).starts_with("Error:"));
}

#[test]
fn schema_row_ignore_symbols_match_commented_rows() {
    let dir = tempfile::tempdir().unwrap();
    let line = |tech: &str| {
        serde_json::json!({
            "source_path": "VT_BaseYear.xlsx",
            "hash": format!("sha256:{tech}"),
            "tables": [{
                "sheet_name": "Processes",
                "tag": "~FI_PROCESS",
                "tag_position": "B3",
                "columns": ["Region", "TechName", "2020"],
                "primary_keys": ["Region", "TechName"],
                "rows": [{"Region": "REG1", "TechName": tech, "2020": 0.35}],
            }]
        })
        .to_string()
    };
    let old_records = write_records(dir.path(), "old.jsonl", &[line("ELCCOA01")]);
    let new_records = write_records(dir.path(), "new.jsonl", &[line("*ELCCOA01")]);
    let schema = dir.path().join("schema.json");
    std::fs::write(
        &schema,
        r#"[{"tag_name": "fi_process", "valid_fields": [
            {"name": "techname", "use_name": "TechName", "query_field": true,
             "row_ignore_symbol": ["\\I:", "*"]}
        ]}]"#,
    )
    .unwrap();
    let a = dir.path().join("a");
    let b = dir.path().join("b");
    build(&old_records, &a);
    build(&new_records, &b);

    let plain = run(&["diff", "--format", "json", a.to_str().unwrap(), b.to_str().unwrap()]);
    let plain: serde_json::Value = serde_json::from_slice(&plain.stdout).expect("valid JSON");
    assert_eq!(plain["summary"]["rows_added"], 1);
    assert_eq!(plain["summary"]["rows_removed"], 1);

    let with_schema = run(&[
        "diff",
        "--format",
        "json",
        "--schema",
        schema.to_str().unwrap(),
        a.to_str().unwrap(),
        b.to_str().unwrap(),
    ]);
    assert_eq!(with_schema.status.code(), Some(1));
    let result: serde_json::Value =
        serde_json::from_slice(&with_schema.stdout).expect("valid JSON");
    assert_eq!(result["summary"]["rows_added"], 0);
    assert_eq!(result["summary"]["rows_removed"], 0);
    assert_eq!(result["summary"]["rows_modified"], 1);
}
