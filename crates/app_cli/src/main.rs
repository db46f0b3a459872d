use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use flora_core::config::WorkflowConfig;
use flora_core::quality::{LaplacianScorer, QualityScorer};
use flora_core::vlm::ChatClient;
use flora_core::{report, sampler, screen};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser)]
#[command(
    name = "florasift",
    version,
    about = "Sampling, quality scoring and model screening for flower photo corpora"
)]
struct Cli {
    /// Workflow configuration file
    #[arg(long, global = true, default_value = "florasift.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Draw stratified samples for every configured seed
    Sample(SampleArgs),
    /// Score a corpus with the quality metric, splitting valid from corrupted
    Quality(QualityArgs),
    /// Put the screening question to the vision model for a sampled seed
    Screen(ScreenArgs),
    /// Ask per image whether taxa other than the named flower are present
    Taxa(TaxaArgs),
    /// Copy the files a results CSV lists into a new folder
    CopyFiltered(CopyFilteredArgs),
}

#[derive(Parser)]
struct SampleArgs {
    /// Re-run a single seed instead of the whole experiment
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Parser)]
struct QualityArgs {
    /// Corpus directory to score; defaults to the sampling source
    #[arg(long)]
    input: Option<PathBuf>,

    /// Valid-results CSV (default: valid_<metric>_results.csv)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Corrupted-results CSV (default: <metric>_corrupted_images.csv)
    #[arg(long)]
    corrupted_output: Option<PathBuf>,
}

#[derive(Parser)]
struct ScreenArgs {
    /// Seed folder to screen; prompts on stdin when omitted
    #[arg(long)]
    seed: Option<u64>,

    /// Screen a corpus directory instead of a sampled seed folder
    #[arg(long, conflicts_with = "seed")]
    input: Option<PathBuf>,

    /// Results CSV (default: screening_results_seed_<seed>.csv)
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Parser)]
struct TaxaArgs {
    /// Corpus directory to check; defaults to the sampling source
    #[arg(long)]
    input: Option<PathBuf>,

    /// Results CSV (default: taxa_results.csv)
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Parser)]
struct CopyFilteredArgs {
    /// Results CSV listing the files to keep
    #[arg(long)]
    csv: PathBuf,

    /// CSV column holding the file paths
    #[arg(long, default_value = "file_path")]
    column: String,

    /// Destination directory
    #[arg(long)]
    dest: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let Cli { config, command } = Cli::parse();
    let started = Instant::now();

    match command {
        Commands::Sample(args) => run_sample(&config, args),
        Commands::Quality(args) => run_quality(&config, args),
        Commands::Screen(args) => run_screen(&config, args),
        Commands::Taxa(args) => run_taxa(&config, args),
        Commands::CopyFiltered(args) => run_copy_filtered(args),
    }?;

    tracing::info!("finished in {:.4} seconds", started.elapsed().as_secs_f64());
    Ok(())
}

fn run_sample(config_path: &Path, args: SampleArgs) -> Result<()> {
    let config = WorkflowConfig::load(config_path)?;
    match args.seed {
        Some(seed) => {
            let record = sampler::run_seed(&config, seed)?;
            let total: usize = record.copied.values().sum();
            tracing::info!("seed {seed}: copied {total} files");
        }
        None => {
            let summary = sampler::run_experiment(&config)?;
            tracing::info!(
                "experiment complete: {} seed runs in {}",
                summary.runs.len(),
                config.sampling.dest_dir.display()
            );
        }
    }
    Ok(())
}

fn run_quality(config_path: &Path, args: QualityArgs) -> Result<()> {
    let config = WorkflowConfig::load(config_path)?;
    let input = args
        .input
        .unwrap_or_else(|| config.corpus.source_dir.clone());
    let scorer = build_scorer(&config)?;
    let batch = flora_core::score_folder(&input, scorer.as_ref())?;

    let metric = scorer.metric().to_string();
    let metric_lower = metric.to_lowercase();
    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(format!("valid_{metric_lower}_results.csv")));
    let corrupted_output = args
        .corrupted_output
        .unwrap_or_else(|| PathBuf::from(format!("{metric_lower}_corrupted_images.csv")));

    report::write_quality_csv(&batch.valid, &metric, &output)?;
    report::write_corrupted_csv(&batch.corrupted, &corrupted_output)?;
    tracing::info!("valid results saved to {}", output.display());
    tracing::info!("corrupted images logged to {}", corrupted_output.display());
    Ok(())
}

#[cfg(feature = "ort")]
fn build_scorer(config: &WorkflowConfig) -> Result<Box<dyn QualityScorer>> {
    use flora_core::quality::{OrtScorer, OrtScorerConfig};

    if let Some(model_path) = &config.quality.model_path {
        let scorer = OrtScorer::new(&OrtScorerConfig {
            model_path: model_path.clone(),
            metric: config.quality.metric.clone(),
            input_size: config.quality.input_size,
            ..Default::default()
        })?;
        return Ok(Box::new(scorer));
    }
    Ok(Box::new(LaplacianScorer))
}

#[cfg(not(feature = "ort"))]
fn build_scorer(config: &WorkflowConfig) -> Result<Box<dyn QualityScorer>> {
    if config.quality.model_path.is_some() {
        tracing::warn!(
            "quality.model_path is set but this build has no ONNX support; \
             using the Laplacian metric"
        );
    }
    Ok(Box::new(LaplacianScorer))
}

fn run_screen(config_path: &Path, args: ScreenArgs) -> Result<()> {
    let config = WorkflowConfig::load(config_path)?;
    let client = ChatClient::new(&config.model);

    if let Some(input) = args.input {
        let rows = screen::screen_folder(&input, &config.screening.prompt, &client)?;
        let output = args
            .output
            .unwrap_or_else(|| PathBuf::from("screening_results.csv"));
        report::write_screen_csv(&rows, &config.screening.answer_column, &output)?;
        tracing::info!("results saved to {}", output.display());
        return Ok(());
    }

    let seed = match args.seed {
        Some(seed) => seed,
        None => prompt_seed(&config.sampling.seeds)?,
    };
    let rows = screen::screen_seed_folder(
        &config.sampling.dest_dir,
        seed,
        &config.corpus.categories,
        &config.screening.prompt,
        &client,
    )?;
    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(format!("screening_results_seed_{seed}.csv")));
    report::write_screen_csv(&rows, &config.screening.answer_column, &output)?;
    tracing::info!("results saved to {}", output.display());
    Ok(())
}

fn run_taxa(config_path: &Path, args: TaxaArgs) -> Result<()> {
    let config = WorkflowConfig::load(config_path)?;
    let client = ChatClient::new(&config.model);
    let input = args
        .input
        .unwrap_or_else(|| config.corpus.source_dir.clone());
    let rows = screen::screen_taxa(&input, &config.taxa.prompt_template, &client)?;
    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from("taxa_results.csv"));
    report::write_taxa_csv(&rows, &output)?;
    tracing::info!("results saved to {}", output.display());
    Ok(())
}

fn run_copy_filtered(args: CopyFilteredArgs) -> Result<()> {
    let stats = report::copy_listed_files(&args.csv, &args.column, &args.dest)?;
    tracing::info!(
        "copied {} files to {} ({} missing)",
        stats.copied,
        args.dest.display(),
        stats.missing
    );
    Ok(())
}

fn prompt_seed(seeds: &[u64]) -> Result<u64> {
    let choices = seeds
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    print!("Enter seed folder to proceed ({choices}): ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    parse_seed(&line)
}

fn parse_seed(line: &str) -> Result<u64> {
    line.trim()
        .parse::<u64>()
        .context("seed must be an integer")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn sample_accepts_a_single_seed() {
        let cli = Cli::try_parse_from(["florasift", "sample", "--seed", "42"]).unwrap();
        let Commands::Sample(args) = cli.command else {
            panic!("expected sample subcommand");
        };
        assert_eq!(args.seed, Some(42));
    }

    #[test]
    fn copy_filtered_defaults_to_the_file_path_column() {
        let cli = Cli::try_parse_from([
            "florasift",
            "copy-filtered",
            "--csv",
            "filtered.csv",
            "--dest",
            "out",
        ])
        .unwrap();
        let Commands::CopyFiltered(args) = cli.command else {
            panic!("expected copy-filtered subcommand");
        };
        assert_eq!(args.column, "file_path");
    }

    #[test]
    fn screen_rejects_seed_and_input_together() {
        let result = Cli::try_parse_from([
            "florasift",
            "screen",
            "--seed",
            "42",
            "--input",
            "corpus",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn seed_input_is_trimmed_and_parsed() {
        assert_eq!(parse_seed("42\n").unwrap(), 42);
        assert_eq!(parse_seed("  123  ").unwrap(), 123);
        assert!(parse_seed("forty-two").is_err());
    }

    #[test]
    fn copy_filtered_runs_end_to_end() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let src = dir.path().join("Bellis_perennis_1.jpg");
        std::fs::write(&src, b"img")?;
        let csv_path = dir.path().join("filtered.csv");
        std::fs::write(&csv_path, format!("file_path\n{}\n", src.display()))?;

        let dest = dir.path().join("kept");
        run_copy_filtered(CopyFilteredArgs {
            csv: csv_path,
            column: "file_path".to_string(),
            dest: dest.clone(),
        })?;

        assert!(dest.join("Bellis_perennis_1.jpg").is_file());
        Ok(())
    }
}
