use crate::commands::diff::Verbosity;
use anyhow::Result;
use shadow_tables::{DiffResult, RowChange, RowKey, TableDiff, TableRef, ValidationReport};
use std::io::Write;

pub fn write_diff_report<W: Write>(
    w: &mut W,
    result: &DiffResult,
    verbosity: Verbosity,
) -> Result<()> {
    if !result.has_changes() {
        writeln!(w, "No differences found.")?;
        write_summary(w, result, verbosity)?;
        return Ok(());
    }

    if verbosity != Verbosity::Quiet {
        if !result.tables_added.is_empty() {
            writeln!(w, "Added tables:")?;
            for table in &result.tables_added {
                writeln!(w, "  + {}", describe_table(table))?;
            }
            writeln!(w)?;
        }
        if !result.tables_removed.is_empty() {
            writeln!(w, "Removed tables:")?;
            for table in &result.tables_removed {
                writeln!(w, "  - {}", describe_table(table))?;
            }
            writeln!(w)?;
        }
        if !result.tables_modified.is_empty() {
            writeln!(w, "Modified tables:")?;
            for table in &result.tables_modified {
                write_table_diff(w, table)?;
            }
            writeln!(w)?;
        }
    }

    write_summary(w, result, verbosity)?;
    Ok(())
}

fn describe_table(table: &TableRef) -> String {
    let source = table.source_path.as_deref().unwrap_or("<unknown workbook>");
    format!(
        "{} ({} in {} [{}], {} rows)",
        table.key, table.tag, source, table.sheet_name, table.row_count
    )
}

fn write_table_diff<W: Write>(w: &mut W, table: &TableDiff) -> Result<()> {
    let mut header = format!(
        "  ~ {}: +{} -{} ~{} rows ({} -> {})",
        table.key,
        table.rows_added,
        table.rows_removed,
        table.rows_modified,
        table.old_row_count,
        table.new_row_count
    );
    if table.positional {
        header.push_str(", compared by position");
    }
    if !table.complete {
        header.push_str(", INCOMPLETE");
    }
    writeln!(w, "{header}")?;

    if !table.columns_added.is_empty() {
        writeln!(w, "      columns added: {}", table.columns_added.join(", "))?;
    }
    if !table.columns_removed.is_empty() {
        writeln!(w, "      columns removed: {}", table.columns_removed.join(", "))?;
    }
    for change in &table.changes {
        writeln!(w, "      {}", render_change(change))?;
    }
    if table.details_omitted > 0 {
        writeln!(w, "      ... {} more row changes not shown", table.details_omitted)?;
    }
    Ok(())
}

fn render_row_key(row: &RowKey) -> String {
    match row {
        RowKey::Key(values) => format!("[{}]", values.join(", ")),
        RowKey::Position(idx) => format!("row {}", idx + 1),
    }
}

fn render_change(change: &RowChange) -> String {
    match change {
        RowChange::Added { row, .. } => format!("+ {}", render_row_key(row)),
        RowChange::Removed { row, .. } => format!("- {}", render_row_key(row)),
        RowChange::Modified { row, fields } => {
            let edits: Vec<String> = fields
                .iter()
                .map(|f| format!("{}: \"{}\" -> \"{}\"", f.column, f.old, f.new))
                .collect();
            format!("~ {}: {}", render_row_key(row), edits.join("; "))
        }
        RowChange::Replaced { row, .. } => format!("~ {} replaced", render_row_key(row)),
    }
}

fn write_summary<W: Write>(w: &mut W, result: &DiffResult, verbosity: Verbosity) -> Result<()> {
    if verbosity == Verbosity::Quiet && !result.has_changes() {
        return Ok(());
    }

    let s = &result.summary;
    writeln!(w, "---")?;
    writeln!(w, "Summary:")?;
    writeln!(
        w,
        "  Tables: {} added, {} removed, {} modified, {} unchanged",
        s.tables_added, s.tables_removed, s.tables_modified, s.tables_unchanged
    )?;
    writeln!(
        w,
        "  Rows in modified tables: {} added, {} removed, {} modified",
        s.rows_added, s.rows_removed, s.rows_modified
    )?;
    writeln!(w, "  Total rows: {} -> {}", s.old_total_rows, s.new_total_rows)?;
    if result.truncated {
        writeln!(
            w,
            "  Row details truncated: {} not shown",
            result.details_omitted
        )?;
    }

    if !result.complete {
        writeln!(w, "  Status: INCOMPLETE (some tables could not be compared)")?;
    } else {
        writeln!(w, "  Status: complete")?;
    }

    Ok(())
}

pub fn write_validation_report<W: Write>(w: &mut W, report: &ValidationReport) -> Result<()> {
    for issue in &report.errors {
        writeln!(w, "error: {issue}")?;
    }
    for issue in &report.warnings {
        writeln!(w, "warning: {issue}")?;
    }
    writeln!(
        w,
        "Checked {} tables: {} errors, {} warnings",
        report.tables_checked,
        report.errors.len(),
        report.warnings.len()
    )?;
    writeln!(
        w,
        "Status: {}",
        if report.is_valid() { "valid" } else { "INVALID" }
    )?;
    Ok(())
}
