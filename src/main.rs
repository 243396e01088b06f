//! Potato leaf severity CLI
//!
//! Generates Grad-CAM severity pseudo-labels for a label-organised image
//! folder, or prints statistics about such a folder.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use potato_severity::backend::backend_name;
use potato_severity::dataset::LeafImageFolder;
use potato_severity::pipeline::{self, FailurePolicy, PipelineConfig};
use potato_severity::severity::CamInterpolation;
use potato_severity::utils::logging::{init_logging, LogConfig};

/// Grad-CAM severity pseudo-labels for potato leaf images
#[derive(Parser, Debug)]
#[command(name = "potato_severity")]
#[command(version)]
#[command(about = "Severity pseudo-labels from classifier attributions", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compute severity pseudo-labels for every image of a dataset
    Run(RunArgs),

    /// Show class counts of a dataset
    Stats {
        /// Path to the dataset directory
        #[arg(short, long, default_value = "PlantVillage")]
        data_dir: PathBuf,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// JSON configuration file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Label-organised image folder
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Classifier checkpoint (JSON mapping or .mpk record)
    #[arg(long)]
    checkpoint: Option<PathBuf>,

    /// Output CSV file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write a JSON run summary here
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Write CAM overlays under this directory
    #[arg(long)]
    heatmap_dir: Option<PathBuf>,

    /// CAM intensity threshold
    #[arg(long)]
    threshold: Option<f32>,

    /// Coverage calibration multiplier
    #[arg(long)]
    multiplier: Option<f32>,

    /// Side length of the grid coverage is measured on
    #[arg(long)]
    canonical_size: Option<usize>,

    /// Classifier input size
    #[arg(long)]
    image_size: Option<usize>,

    /// Classifier output count (defaults to the number of class folders)
    #[arg(long)]
    num_classes: Option<usize>,

    /// CAM resampling
    #[arg(long, value_enum)]
    interpolation: Option<CamInterpolation>,

    /// Behaviour when one image fails
    #[arg(long, value_enum)]
    on_error: Option<FailurePolicy>,

    /// Images between progress lines
    #[arg(long)]
    progress_every: Option<usize>,
}

impl RunArgs {
    fn into_config(self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)?,
            None => PipelineConfig::default(),
        };

        if let Some(v) = self.data_dir {
            config.data_dir = v;
        }
        if let Some(v) = self.checkpoint {
            config.checkpoint_path = v;
        }
        if let Some(v) = self.output {
            config.output_path = v;
        }
        if self.summary.is_some() {
            config.summary_path = self.summary;
        }
        if self.heatmap_dir.is_some() {
            config.heatmap_dir = self.heatmap_dir;
        }
        if let Some(v) = self.threshold {
            config.severity.threshold = v;
        }
        if let Some(v) = self.multiplier {
            config.severity.multiplier = v;
        }
        if let Some(v) = self.canonical_size {
            config.severity.canonical_size = v;
        }
        if let Some(v) = self.image_size {
            config.image_size = v;
        }
        if self.num_classes.is_some() {
            config.num_classes = self.num_classes;
        }
        if let Some(v) = self.interpolation {
            config.severity.interpolation = v;
        }
        if let Some(v) = self.on_error {
            config.failure_policy = v;
        }
        if let Some(v) = self.progress_every {
            config.progress_interval = v;
        }

        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else if cli.quiet {
        LogConfig::quiet()
    } else {
        LogConfig::default()
    };

    let _ = init_logging(&log_config);

    if !cli.quiet {
        print_banner();
    }

    match cli.command {
        Commands::Run(args) => cmd_run(args)?,
        Commands::Stats { data_dir } => cmd_stats(&data_dir)?,
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
 ╔═══════════════════════════════════════════════════════╗
 ║   🥔 Potato Leaf Severity                             ║
 ║   Grad-CAM pseudo-labels with Burn + Rust             ║
 ╚═══════════════════════════════════════════════════════╝
  "#
        .green()
    );
}

fn cmd_run(args: RunArgs) -> Result<()> {
    let config = args.into_config()?;

    println!("{}", "Configuration:".cyan().bold());
    println!("  Dataset:     {:?}", config.data_dir);
    println!("  Checkpoint:  {:?}", config.checkpoint_path);
    println!("  Output:      {:?}", config.output_path);
    println!(
        "  Threshold:   {}  Multiplier: {}  Interpolation: {}",
        config.severity.threshold, config.severity.multiplier, config.severity.interpolation
    );
    println!("  On error:    {}", config.failure_policy);
    println!("  Backend:     {}", backend_name());

    info!("Starting pseudo-label generation");
    let summary = pipeline::run(&config)
        .with_context(|| format!("Pseudo-label generation failed for {:?}", config.data_dir))?;

    summary.print();
    println!(
        "\n{} Pseudo-labels saved to {:?}",
        "Done!".green().bold(),
        config.output_path
    );

    Ok(())
}

fn cmd_stats(data_dir: &Path) -> Result<()> {
    info!("Computing dataset statistics for: {:?}", data_dir);

    let dataset = LeafImageFolder::open(data_dir)
        .with_context(|| format!("Cannot read dataset at {:?}", data_dir))?;
    dataset.get_stats().print();

    let unknown: Vec<_> = dataset
        .classes
        .iter()
        .filter(|c| !potato_severity::dataset::is_known_class(c))
        .collect();
    if !unknown.is_empty() {
        println!(
            "\n  {} classes outside the potato set: {:?}",
            "Note:".yellow(),
            unknown
        );
    }

    Ok(())
}
