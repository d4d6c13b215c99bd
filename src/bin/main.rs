//! SPARE Command Line Interface
//!
//! Train SPARE models from CSV cohorts, score new cohorts with a saved model
//! and inspect saved models.

use clap::{Args, Parser, Subcommand, ValueEnum};
use env_logger::Env;
use log::{error, info};
use spare_scores::core::{OptimizerConfig, Result};
use spare_scores::data::write_scores;
use spare_scores::pipeline::spare_test;
use spare_scores::{KernelType, SpareModelArtifact, SpareTrainer, TabularDataset};
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "spare")]
#[command(about = "Train and apply SPARE biomarker models")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = "spare-scores contributors")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a new SPARE model
    Train(TrainArgs),
    /// Compute SPARE scores with a trained model
    Test(TestArgs),
    /// Display model information
    Info(InfoArgs),
}

#[derive(Args)]
struct TrainArgs {
    /// Training data (CSV with PTID and Age columns)
    #[arg(long)]
    data: PathBuf,

    /// Predictor columns, comma separated
    #[arg(short, long, value_delimiter = ',', required = true)]
    predictors: Vec<String>,

    /// Column to predict
    #[arg(short = 't', long)]
    to_predict: String,

    /// Group assigned a positive score (classification)
    #[arg(long)]
    pos_group: Option<String>,

    /// Kernel family
    #[arg(short, long, default_value = "linear")]
    kernel: CliKernel,

    /// Directory to save the model into
    #[arg(short, long, default_value = "./Mdl")]
    output: PathBuf,

    /// Model name (default: SPARE_<type>_<to_predict>)
    #[arg(long)]
    model_name: Option<String>,

    /// Cross-validation folds per repeat
    #[arg(long, default_value = "5")]
    folds: usize,

    /// Cross-validation repeats
    #[arg(long, default_value = "5")]
    repeats: usize,

    /// Seed of fold assignment
    #[arg(long, default_value = "2022")]
    seed: u64,

    /// Maximum solver iterations per fit
    #[arg(long, default_value = "100000")]
    max_iterations: usize,

    /// Kernel cache size in MB
    #[arg(long, default_value = "100")]
    cache_size: usize,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CliKernel {
    /// Linear kernel
    #[value(name = "linear")]
    Linear,
    /// Radial basis function kernel
    #[value(name = "rbf")]
    Rbf,
}

impl From<CliKernel> for KernelType {
    fn from(kernel: CliKernel) -> Self {
        match kernel {
            CliKernel::Linear => KernelType::Linear,
            CliKernel::Rbf => KernelType::Rbf,
        }
    }
}

#[derive(Args)]
struct TestArgs {
    /// Data to score (CSV with PTID and Age columns)
    #[arg(long)]
    data: PathBuf,

    /// Trained model file
    #[arg(short, long)]
    model: PathBuf,

    /// Directory to write SPAREs_from_<model>.csv into (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct InfoArgs {
    /// Trained model file
    #[arg(short, long)]
    model: PathBuf,
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };

    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    let result = match cli.command {
        Commands::Train(args) => train_command(args),
        Commands::Test(args) => test_command(args),
        Commands::Info(args) => info_command(args),
    };

    if let Err(e) = result {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn train_command(args: TrainArgs) -> Result<()> {
    info!("Training SPARE model...");
    info!("Data file: {:?}", args.data);

    let table = TabularDataset::from_csv_path(&args.data)?;
    info!(
        "Loaded {} rows with {} columns",
        table.n_rows(),
        table.n_columns()
    );

    let mut trainer = SpareTrainer::new()
        .with_kernel(args.kernel.into())
        .with_folds(args.folds)
        .with_repeats(args.repeats)
        .with_seed(args.seed)
        .with_optimizer(OptimizerConfig {
            max_iterations: args.max_iterations,
            cache_size: args.cache_size * 1024 * 1024, // Convert MB to bytes
            ..OptimizerConfig::default()
        })
        .save_to(&args.output, args.model_name.as_deref());
    if let Some(group) = &args.pos_group {
        trainer = trainer.with_positive_group(group.as_str());
    }

    let outcome = trainer.train(&table, &args.predictors, &args.to_predict)?;
    let meta = &outcome.artifact.metadata;
    info!("Training completed successfully");
    println!(
        "Trained SPARE {} model on {} participants: {} = {:.3}",
        meta.spare_type,
        meta.n,
        meta.performance.label(),
        meta.performance.mean()
    );
    if let Some(path) = &outcome.saved_to {
        println!("Model saved to: {}", path.display());
    }
    Ok(())
}

fn test_command(args: TestArgs) -> Result<()> {
    info!("Loading data from: {:?}", args.data);
    let table = TabularDataset::from_csv_path(&args.data)?;

    let outcome = spare_test(&table, &args.model, args.output.as_deref())?;
    match &outcome.output_path {
        Some(path) => println!("SPARE scores saved to: {}", path.display()),
        None => write_scores(std::io::stdout().lock(), &outcome.scores)?,
    }
    Ok(())
}

fn info_command(args: InfoArgs) -> Result<()> {
    info!("Loading model from: {:?}", args.model);
    let artifact = SpareModelArtifact::load_from_file(&args.model)?;

    artifact.print_summary();

    let meta = &artifact.metadata;
    println!("\nPer-fold results:");
    let n_show = meta.params.len().min(10);
    for (i, ((params, perf), model)) in meta
        .params
        .iter()
        .zip(meta.performance.values())
        .zip(&artifact.model.models)
        .enumerate()
        .take(n_show)
    {
        println!(
            "  fold {i}: {params} ({} = {perf:.3}, {} support vectors)",
            meta.performance.label(),
            model.n_support_vectors()
        );
    }
    if meta.params.len() > n_show {
        println!("  ... ({} more)", meta.params.len() - n_show);
    }

    Ok(())
}
