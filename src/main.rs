use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::error;

use paris_rentals_lib::pipeline::{LoadSummary, MergeOutcome};
use paris_rentals_lib::{init_tracing, InputSpec, Pipeline, PipelineConfig};

#[derive(Parser)]
#[command(name = "paris-rentals")]
#[command(about = "Merge, geocode and store scraped Paris rental listings")]
#[command(version)]
struct Cli {
    /// SQLite database to upsert into
    #[arg(long, global = true)]
    database: Option<PathBuf>,
    /// Merged JSON file written by `merge` and read by `load`
    #[arg(long, global = true)]
    merged: Option<PathBuf>,
    /// JSON file replacing the built-in arrondissement reference points
    #[arg(long, global = true)]
    reference_table: Option<PathBuf>,
    /// Disable the JSONL run journal
    #[arg(long, global = true)]
    no_journal: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize and deduplicate scraper exports into the merged file
    Merge {
        /// Input files as PATH=SOURCE, in priority order
        #[arg(long = "input", value_name = "PATH=SOURCE")]
        inputs: Vec<String>,
    },
    /// Geocode the merged file and upsert it into the database
    Load,
    /// Merge then load
    Run {
        /// Input files as PATH=SOURCE, in priority order
        #[arg(long = "input", value_name = "PATH=SOURCE")]
        inputs: Vec<String>,
    },
}

fn main() -> ExitCode {
    init_tracing();
    match run(Cli::parse()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!("{err:#}");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Returns `false` when some input batch was rejected.
fn run(cli: Cli) -> anyhow::Result<bool> {
    let mut config = PipelineConfig::from_env().context("invalid pipeline configuration")?;
    if let Some(database) = cli.database {
        config.database_path = database;
    }
    if let Some(merged) = cli.merged {
        config.merged_path = merged;
    }
    if let Some(table) = cli.reference_table {
        config.reference_table_path = Some(table);
    }
    if cli.no_journal {
        config.journal_enabled = false;
    }

    match cli.command {
        Commands::Merge { inputs } => {
            apply_inputs(&mut config, &inputs)?;
            let pipeline = Pipeline::new(config).context("failed to start pipeline")?;
            let merged = pipeline.config().merged_path.clone();
            let outcome = pipeline
                .merge()
                .with_context(|| format!("failed to write {}", merged.display()))?;
            print_merge(&outcome, &merged);
            Ok(outcome.failures.is_empty())
        }
        Commands::Load => {
            let pipeline = Pipeline::new(config).context("failed to start pipeline")?;
            let merged = pipeline.config().merged_path.clone();
            let summary = pipeline
                .load(&merged)
                .with_context(|| format!("failed to load {}", merged.display()))?;
            print_load(&summary, &pipeline.config().database_path);
            Ok(true)
        }
        Commands::Run { inputs } => {
            apply_inputs(&mut config, &inputs)?;
            let pipeline = Pipeline::new(config).context("failed to start pipeline")?;
            let (outcome, summary) = pipeline.run().context("pipeline run failed")?;
            print_merge(&outcome, &pipeline.config().merged_path);
            print_load(&summary, &pipeline.config().database_path);
            Ok(outcome.failures.is_empty())
        }
    }
}

fn apply_inputs(config: &mut PipelineConfig, inputs: &[String]) -> anyhow::Result<()> {
    if inputs.is_empty() {
        return Ok(());
    }
    config.inputs = inputs
        .iter()
        .map(|value| InputSpec::parse(value))
        .collect::<Result<_, _>>()
        .context("invalid --input")?;
    Ok(())
}

fn print_merge(outcome: &MergeOutcome, merged_path: &Path) {
    println!("Merge");
    for batch in &outcome.batches {
        println!(
            "  {} ({}): {} listings, {} kept, {} duplicates",
            batch.path.display(),
            batch.source,
            batch.listings,
            batch.kept,
            batch.duplicates
        );
    }
    for failure in &outcome.failures {
        println!("  REJECTED {failure}");
    }
    println!(
        "  total records: {} -> {}",
        outcome.records.len(),
        merged_path.display()
    );
}

fn print_load(summary: &LoadSummary, database_path: &Path) {
    println!("Load -> {}", database_path.display());
    println!(
        "  inserted: {}, skipped: {}, geo-resolved: {}",
        summary.write.inserted, summary.write.skipped, summary.enrich.geo_resolved
    );
    println!(
        "  resolved from text: {}, unresolved: {}, with price/m²: {}",
        summary.enrich.text_resolved, summary.enrich.unresolved, summary.enrich.priced
    );
    for failure in &summary.write.failures {
        println!("  SKIPPED {}: {}", failure.id, failure.reason);
    }
}
