//! Demora CLI binary.
//!
//! Runs the pipeline on a harmonized CSV table, validates configurations, and
//! generates synthetic tables.

mod logging;
mod table;

use clap::{Parser, Subcommand};
use demora::data::synthetic::{self, SyntheticConfig};
use demora::output::ExportFormat;
use demora::{Pipeline, PipelineConfig, PipelineOutput};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "demora")]
#[command(about = "Demora: municipal population-change forecasting and vulnerability scoring", long_about = None)]
#[command(version)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline and export every output
    Run {
        /// Harmonized input table (CSV)
        #[arg(long)]
        input: PathBuf,

        /// Pipeline configuration (JSON); the example configuration when omitted
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output directory
        #[arg(long)]
        output: PathBuf,

        /// Output format (csv, json, pretty-json)
        #[arg(long, default_value = "csv")]
        format: ExportFormat,

        /// Rows of the ranking printed to stdout
        #[arg(long, default_value = "10")]
        top: usize,
    },

    /// Validate a configuration file
    CheckConfig {
        /// Pipeline configuration (JSON)
        #[arg(long)]
        config: PathBuf,
    },

    /// Print the example configuration
    ExampleConfig,

    /// Write a synthetic harmonized table
    Synthetic {
        /// Number of municipalities
        #[arg(long, default_value = "20")]
        municipalities: usize,

        /// Number of periods
        #[arg(long, default_value = "6")]
        periods: usize,

        /// First period
        #[arg(long, default_value = "2010")]
        start_period: i32,

        /// Root seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Output CSV path
        #[arg(long)]
        output: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init_logging(cli.json_logs);

    if let Err(e) = run(cli.command) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Run {
            input,
            config,
            output,
            format,
            top,
        } => run_pipeline(&input, config.as_deref(), &output, format, top)?,
        Commands::CheckConfig { config } => check_config(&config)?,
        Commands::ExampleConfig => println!("{}", PipelineConfig::example().to_json()?),
        Commands::Synthetic {
            municipalities,
            periods,
            start_period,
            seed,
            output,
        } => write_synthetic(
            &SyntheticConfig {
                municipalities,
                periods,
                start_period,
                seed,
                ..Default::default()
            },
            &output,
        )?,
    }

    Ok(())
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(message.to_string());
    pb
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    Ok(match path {
        Some(path) => PipelineConfig::from_path(path)?,
        None => PipelineConfig::example(),
    })
}

fn run_pipeline(
    input: &Path,
    config: Option<&Path>,
    output: &Path,
    format: ExportFormat,
    top: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let pipeline = Pipeline::new(load_config(config)?)?;

    let pb = spinner("Reading harmonized table...");
    let inputs = match table::read_csv(input) {
        Ok(df) => {
            pb.finish_with_message(format!("Read {} rows x {} columns", df.height(), df.width()));
            df
        }
        Err(e) => {
            pb.finish_with_message("Failed!");
            return Err(e.into());
        }
    };

    let pb = spinner("Running pipeline...");
    let result = match pipeline.run(&inputs) {
        Ok(result) => {
            pb.finish_with_message(format!(
                "Scored {} municipalities for period {}",
                result.scores.len(),
                result.scoring_period
            ));
            result
        }
        Err(e) => {
            pb.finish_with_message("Failed!");
            return Err(e.into());
        }
    };

    let pb = spinner("Exporting outputs...");
    let exclusions = result.exclusions();
    let written = result.bundle(&exclusions).write_to_dir(output, format)?;
    let model_path = output.join("model.json");
    std::fs::write(&model_path, serde_json::to_string_pretty(&result.model)?)?;
    pb.finish_with_message(format!(
        "Wrote {} files to {}",
        written.len() + 1,
        output.display()
    ));

    print_summary(&result, top);
    Ok(())
}

fn print_summary(result: &PipelineOutput, top: usize) {
    println!("\n════════════════════════════════════════════════════════════════");
    println!("{:^64}", format!("DEMORA RUN: PERIOD {}", result.scoring_period));
    println!("════════════════════════════════════════════════════════════════\n");

    println!("Model comparison (held-out RMSE):");
    for ranked in &result.comparison.ranked {
        println!(
            "  {:>2}. {:45} {:>8.4} ± {:.4}",
            ranked.rank,
            ranked.variant.to_string(),
            ranked.result.rmse.mean,
            ranked.result.rmse.std
        );
    }
    for failure in &result.comparison.failures {
        println!("   -  {:45} failed: {}", failure.variant.to_string(), failure.reason);
    }

    println!("\nTop drivers (permutation importance):");
    for feature in result.importance.ranked().iter().take(5) {
        println!(
            "  {:30} {:>8.4} ± {:.4}",
            feature.feature, feature.mean, feature.std
        );
    }

    println!(
        "\nTypology: k = {}, {}",
        result.clusters.k, result.clusters.algorithm
    );
    match result.stability.mean {
        Some(mean) => println!(
            "  Stability ({:?}): mean {:.3} over {} perturbations{}",
            result.stability.metric,
            mean,
            result.stability.scores.len(),
            if result.stability.is_unstable() {
                " (UNSTABLE)"
            } else {
                ""
            }
        ),
        None => println!("  Stability: no perturbation could be scored"),
    }

    println!("\nMost vulnerable municipalities:");
    println!(
        "  {:>4}  {:16} {:>7} {:>9} {:>8} {:>9} {:>10}",
        "rank", "municipality", "score", "forecast", "cluster", "indicator", "predicted"
    );
    for (i, score) in result.scores.ranked().iter().take(top).enumerate() {
        println!(
            "  {:>4}  {:16} {:>7.3} {:>9.3} {:>8.3} {:>9.3} {:>9.2}%",
            i + 1,
            score.municipality_id,
            score.score,
            score.components.forecast,
            score.components.cluster,
            score.components.indicator,
            score.predicted_change
        );
    }

    if !result.warnings.is_empty() {
        println!("\nWarnings ({}):", result.warnings.len());
        for warning in &result.warnings {
            println!("  - {}", warning);
        }
    }
    println!();
}

fn check_config(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = PipelineConfig::from_path(path)?;
    config.validate()?;
    println!("✓ {} is valid", path.display());
    println!("  Variants:    {}", config.model_variants.len());
    println!("  Folds:       {} ({:?})", config.folds, config.split_strategy);
    println!(
        "  Typology:    k = {}, {} resamples ({:?})",
        config.k, config.resamples, config.stability_perturbation
    );
    println!(
        "  Weights:     forecast {}, cluster {}, indicator {}",
        config.scoring_weights.forecast,
        config.scoring_weights.cluster,
        config.scoring_weights.indicator
    );
    Ok(())
}

fn write_synthetic(config: &SyntheticConfig, output: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut df = synthetic::generate(config)?;
    table::write_csv(&mut df, output)?;
    println!(
        "Wrote {} municipalities x {} periods ({} rows) to {}",
        config.municipalities,
        config.periods,
        df.height(),
        output.display()
    );
    Ok(())
}
