use anyhow::{Context, Result};
use shadow_tables::{
    BuildConfig, IndexBuilder, JsonRecordSource, MissingKeyPolicy, SchemaCatalog, ShadowStore,
};
use std::path::PathBuf;
use std::process::ExitCode;

pub struct BuildArgs {
    pub records: PathBuf,
    pub out: PathBuf,
    pub schema: Option<PathBuf>,
    pub fresh: bool,
    pub all_columns_key: bool,
    pub generator: Option<String>,
}

pub fn run(args: BuildArgs) -> Result<ExitCode> {
    let mut config = BuildConfig::builder();
    if args.all_columns_key {
        config = config.missing_key_policy(MissingKeyPolicy::AllColumns);
    }
    if let Some(generator) = args.generator {
        config = config.generator(generator);
    }
    let config = config.build().context("Invalid build options")?;

    let catalog = match &args.schema {
        Some(path) => Some(
            SchemaCatalog::from_path(path)
                .with_context(|| format!("Failed to load schema catalog: {}", path.display()))?,
        ),
        None => None,
    };
    let source = JsonRecordSource::open(&args.records)
        .with_context(|| format!("Failed to open records: {}", args.records.display()))?;

    let store = ShadowStore::new(&args.out);
    let previous = if !args.fresh && store.has_registry() {
        match store.read_registry() {
            Ok(registry) => Some(registry),
            Err(e) => {
                eprintln!("Warning: ignoring previous registry: {e}");
                None
            }
        }
    } else {
        None
    };

    let mut builder = IndexBuilder::new(config);
    if let Some(catalog) = &catalog {
        builder = builder.with_catalog(catalog);
    }
    if let Some(previous) = &previous {
        builder = builder.with_previous(previous, &store);
    }
    let outcome = builder
        .build_into(source, &store)
        .with_context(|| format!("Failed to build shadow directory: {}", args.out.display()))?;

    for warning in &outcome.warnings {
        eprintln!("Warning: {warning}");
    }
    for failure in &outcome.failures {
        eprintln!("Failed: {failure}");
    }

    println!(
        "Built {} tables from {} workbooks into {} ({} reused, {} failed)",
        outcome.registry.tables.len(),
        outcome.registry.workbooks.len(),
        args.out.display(),
        outcome.reused_workbooks.len(),
        outcome.failures.len()
    );

    if outcome.is_complete() {
        Ok(ExitCode::from(0))
    } else {
        Ok(ExitCode::from(1))
    }
}
