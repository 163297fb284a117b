use crate::OutputFormat;
use crate::output::{json, text};
use anyhow::{Context, Result};
use shadow_tables::{
    DiffConfig, DiffResult, SchemaCatalog, ShadowStore, TableMatch, diff_registries,
};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
}

pub struct DiffArgs {
    pub old: PathBuf,
    pub new: PathBuf,
    pub format: OutputFormat,
    pub limit_rows: Option<usize>,
    pub by_table_id: bool,
    pub ignore_key_prefix: Vec<String>,
    pub schema: Option<PathBuf>,
    pub quiet: bool,
}

pub fn run(args: DiffArgs) -> Result<ExitCode> {
    let mut config = DiffConfig::builder();
    if let Some(limit) = args.limit_rows {
        config = config.row_detail_budget(limit);
    }
    if args.by_table_id {
        config = config.table_match(TableMatch::TableId);
    }
    let mut prefixes = args.ignore_key_prefix;
    if let Some(path) = &args.schema {
        let catalog = SchemaCatalog::from_path(path)
            .with_context(|| format!("Failed to load schema catalog: {}", path.display()))?;
        for symbol in catalog.row_ignore_symbols() {
            if !prefixes.contains(&symbol) {
                prefixes.push(symbol);
            }
        }
    }
    for prefix in prefixes {
        config = config.key_ignore_prefix(prefix);
    }
    let config = config.build().context("Invalid diff options")?;

    let old_store = ShadowStore::new(&args.old);
    let new_store = ShadowStore::new(&args.new);
    let old = old_store
        .read_registry()
        .with_context(|| format!("Failed to read old snapshot: {}", args.old.display()))?;
    let new = new_store
        .read_registry()
        .with_context(|| format!("Failed to read new snapshot: {}", args.new.display()))?;

    let result = diff_registries(&old, &new, &old_store, &new_store, &config)
        .context("Diff failed")?;

    for warning in &result.warnings {
        eprintln!("Warning: {}", warning);
    }

    let verbosity = if args.quiet {
        Verbosity::Quiet
    } else {
        Verbosity::Normal
    };
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    match args.format {
        OutputFormat::Text => text::write_diff_report(&mut handle, &result, verbosity)?,
        OutputFormat::Json => json::write_json(&mut handle, &result)?,
    }

    Ok(exit_code_from_result(&result))
}

fn exit_code_from_result(result: &DiffResult) -> ExitCode {
    if !result.has_changes() && result.complete {
        ExitCode::from(0)
    } else {
        ExitCode::from(1)
    }
}
