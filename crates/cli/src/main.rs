//! plunk-migrate - move legacy snippets and their history into the search index

use anyhow::Result;
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use plunk_migrate::cmd;
use plunk_migrate::cmd::run::RunArgs;
use plunk_migrate::config;
use plunk_pipeline::PipelineError;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Migrate legacy Plunker records into the search index
#[derive(Parser)]
#[command(name = "plunk-migrate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: ~/.config/plunk-migrate/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the migration, resuming from the last checkpoint (default)
    Run(RunArgs),
    /// Create the destination index if it does not exist
    InitIndex,
    /// Print the effective configuration
    ShowConfig {
        /// Print a commented default config instead
        #[arg(long)]
        example: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let last_record = err
                .downcast_ref::<PipelineError>()
                .and_then(PipelineError::last_record)
                .unwrap_or("-");
            tracing::error!(last_record, "Error during import: {:#}", err);
            eprintln!(
                "{} Error during import {} {:#}",
                "[ERR]".red(),
                last_record.yellow(),
                err
            );
            ExitCode::FAILURE
        }
    }
}

fn execute(cli: Cli) -> Result<()> {
    let mut config = config::load(cli.config.as_deref())?;
    config.apply_env();

    match cli.command.unwrap_or_else(|| Commands::Run(RunArgs::default())) {
        Commands::Run(args) => cmd::run::run(config, &args),
        Commands::InitIndex => cmd::init_index::run(&config),
        Commands::ShowConfig { example } => cmd::show_config::run(&config, example),
    }
}
