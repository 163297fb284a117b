use crate::OutputFormat;
use crate::output::{json, text};
use anyhow::{Context, Result};
use shadow_tables::{SchemaCatalog, ShadowStore, validate};
use std::io;
use std::path::Path;
use std::process::ExitCode;

pub fn run(dir: &Path, schema: Option<&Path>, format: OutputFormat) -> Result<ExitCode> {
    let catalog = schema
        .map(|path| {
            SchemaCatalog::from_path(path)
                .with_context(|| format!("Failed to load schema catalog: {}", path.display()))
        })
        .transpose()?;

    let store = ShadowStore::new(dir);
    let registry = store
        .read_registry()
        .with_context(|| format!("Failed to read shadow directory: {}", dir.display()))?;
    let report = validate(&registry, &store, catalog.as_ref());

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    match format {
        OutputFormat::Text => text::write_validation_report(&mut handle, &report)?,
        OutputFormat::Json => json::write_json(&mut handle, &report)?,
    }

    if report.is_valid() {
        Ok(ExitCode::from(0))
    } else {
        Ok(ExitCode::from(1))
    }
}
