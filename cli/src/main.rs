mod commands;
mod output;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "shadow-tables")]
#[command(about = "Build, compare and check canonical CSV shadows of VEDA workbook tables")]
#[command(version)]
pub struct Cli {
    #[arg(
        short,
        long,
        action = ArgAction::Count,
        global = true,
        help = "Increase log verbosity (-v info, -vv debug)"
    )]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Build a shadow directory from extracted table records")]
    Build {
        #[arg(long, value_name = "FILE", help = "Extractor dump (JSON Lines of workbooks)")]
        records: PathBuf,
        #[arg(long, value_name = "DIR", help = "Shadow directory to write")]
        out: PathBuf,
        #[arg(long, value_name = "FILE", help = "Tag-schema catalog (JSON)")]
        schema: Option<PathBuf>,
        #[arg(long, help = "Ignore the existing shadow directory; re-serialize everything")]
        fresh: bool,
        #[arg(long, help = "Use all columns as the key when a table declares none")]
        all_columns_key: bool,
        #[arg(long, value_name = "NAME", help = "Generator string recorded in the registry")]
        generator: Option<String>,
    },
    #[command(about = "Compare two shadow directories")]
    Diff {
        #[arg(help = "Old/base shadow directory")]
        old: PathBuf,
        #[arg(help = "New shadow directory")]
        new: PathBuf,
        #[arg(long, short, value_enum, default_value = "text", help = "Output format")]
        format: OutputFormat,
        #[arg(long, value_name = "N", help = "Row-detail budget across the whole result")]
        limit_rows: Option<usize>,
        #[arg(long, help = "Match tables by table id, ignoring workbook renames")]
        by_table_id: bool,
        #[arg(
            long = "ignore-key-prefix",
            value_name = "PREFIX",
            help = "Row-ignore marker stripped from key values before matching (repeatable)"
        )]
        ignore_key_prefix: Vec<String>,
        #[arg(
            long,
            value_name = "FILE",
            help = "Tag-schema catalog whose row-ignore symbols are added to the key prefixes"
        )]
        schema: Option<PathBuf>,
        #[arg(long, short, help = "Quiet mode: only show summary")]
        quiet: bool,
    },
    #[command(about = "Check a shadow directory against its registry")]
    Validate {
        #[arg(help = "Shadow directory")]
        dir: PathBuf,
        #[arg(long, value_name = "FILE", help = "Tag-schema catalog (JSON)")]
        schema: Option<PathBuf>,
        #[arg(long, short, value_enum, default_value = "text", help = "Output format")]
        format: OutputFormat,
    },
}

#[derive(Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Build {
            records,
            out,
            schema,
            fresh,
            all_columns_key,
            generator,
        } => commands::build::run(commands::build::BuildArgs {
            records,
            out,
            schema,
            fresh,
            all_columns_key,
            generator,
        }),
        Commands::Diff {
            old,
            new,
            format,
            limit_rows,
            by_table_id,
            ignore_key_prefix,
            schema,
            quiet,
        } => commands::diff::run(commands::diff::DiffArgs {
            old,
            new,
            format,
            limit_rows,
            by_table_id,
            ignore_key_prefix,
            schema,
            quiet,
        }),
        Commands::Validate {
            dir,
            schema,
            format,
        } => commands::validate::run(&dir, schema.as_deref(), format),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "error",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}
