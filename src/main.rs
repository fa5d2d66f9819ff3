use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use sylva_forest::{
    FeatureMatrix, ForestConfig, MTry, OobMode, RandomForest, Response, Sampling, SplitCriterion,
    jackknife,
};
use sylva_io::{DEFAULT_CATEGORICAL_MAX_LEVELS, LibSvmReader, MatrixReader, ModelStore, ReportWriter};

#[derive(Parser)]
#[command(name = "sylva")]
#[command(about = "Random forests with partial dependence and jackknife variance estimates")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// RNG seed for reproducibility
    #[arg(long, default_value_t = 42, global = true)]
    seed: u64,

    /// Enable verbose (debug-level) logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Number of threads for parallel computation (defaults to all cores)
    #[arg(long, global = true)]
    threads: Option<usize>,
}

/// Options for loading a libsvm data file.
#[derive(Args, Debug, Clone)]
struct DataArgs {
    /// Path to the libsvm data file
    #[arg(long)]
    data: PathBuf,

    /// Integer columns with at most this many distinct values are categorical (0 disables)
    #[arg(long, default_value_t = DEFAULT_CATEGORICAL_MAX_LEVELS)]
    categorical_max_levels: usize,
}

#[derive(Subcommand)]
enum Command {
    /// Grow a forest on a libsvm file and save it
    Grow {
        #[command(flatten)]
        data: DataArgs,

        /// Target column name ("0" is the libsvm label)
        #[arg(long, default_value = "0")]
        target: String,

        /// Number of trees
        #[arg(long, default_value_t = 100)]
        n_trees: usize,

        /// Candidate predictors per node: auto, sqrt, log2, all, a count, or a fraction in (0, 1]
        #[arg(long, default_value = "auto")]
        m_try: String,

        /// Minimum rows per leaf
        #[arg(long, default_value_t = 1)]
        leaf_size: usize,

        /// Rows drawn per tree (defaults to all rows)
        #[arg(long)]
        n_samples: Option<usize>,

        /// Draw rows without replacement instead of bootstrapping
        #[arg(long, default_value_t = false)]
        subsample: bool,

        /// Use entropy instead of Gini impurity for categorical targets
        #[arg(long, default_value_t = false)]
        entropy: bool,

        /// Compute out-of-bag error
        #[arg(long, default_value_t = false)]
        oob: bool,

        /// Output path for the model binary
        #[arg(long)]
        model: PathBuf,

        /// Optional path for a JSON growth summary
        #[arg(long)]
        summary: Option<PathBuf>,
    },

    /// Predict every row of a libsvm file with a saved forest
    Predict {
        /// Path to the model binary
        #[arg(long)]
        model: PathBuf,

        #[command(flatten)]
        data: DataArgs,

        /// Output CSV path
        #[arg(long)]
        output: PathBuf,
    },

    /// Partial dependence of a saved forest on one or two features
    Pdp {
        /// Path to the model binary
        #[arg(long)]
        model: PathBuf,

        #[command(flatten)]
        data: DataArgs,

        /// Feature name; give twice for a two-feature grid
        #[arg(long = "feature", required = true)]
        features: Vec<String>,

        /// Report the probability of this class label instead of the predicted value
        #[arg(long)]
        class: Option<String>,

        /// Output CSV path
        #[arg(long)]
        output: PathBuf,
    },

    /// Jackknife variance from per-tree predictions and in-bag counts
    Jackknife {
        /// Headerless CSV of per-tree predictions (one row per case)
        #[arg(long)]
        predictions: PathBuf,

        /// Headerless CSV of in-bag counts with the same shape
        #[arg(long)]
        in_bag: PathBuf,

        /// Output CSV path
        #[arg(long)]
        output: PathBuf,
    },
}

// --- JSON stdout output structs ---

#[derive(Serialize)]
struct GrowOutput {
    target: String,
    model: PathBuf,
    n_trees: usize,
    n_rows: usize,
    n_predictors: usize,
    n_classes: usize,
    m_try: usize,
    oob_error: Option<f64>,
    top_features: Vec<FeatureOutput>,
}

#[derive(Serialize)]
struct FeatureOutput {
    name: String,
    importance: f64,
}

#[derive(Serialize)]
struct PredictOutput {
    output: PathBuf,
    n_rows: usize,
    target: String,
    model_n_trees: usize,
    model_n_predictors: usize,
}

#[derive(Serialize)]
struct PdpOutput {
    output: PathBuf,
    features: Vec<String>,
    response: String,
    grid_size: usize,
}

#[derive(Serialize)]
struct JackknifeOutput {
    output: PathBuf,
    n_cases: usize,
    n_trees: usize,
    mean_variance: f64,
}

fn parse_m_try(s: &str) -> Result<MTry> {
    match s {
        "auto" => Ok(MTry::Auto),
        "sqrt" => Ok(MTry::Sqrt),
        "log2" => Ok(MTry::Log2),
        "all" => Ok(MTry::All),
        other => {
            if let Ok(count) = other.parse::<usize>() {
                return Ok(MTry::Fixed(count));
            }
            match other.parse::<f64>() {
                Ok(fraction) => Ok(MTry::Fraction(fraction)),
                Err(_) => anyhow::bail!(
                    "unknown m-try: {other} (expected auto, sqrt, log2, all, a count, or a fraction)"
                ),
            }
        }
    }
}

fn read_data(args: &DataArgs) -> Result<FeatureMatrix> {
    LibSvmReader::new(&args.data)
        .with_categorical_max_levels(args.categorical_max_levels)
        .read()
        .with_context(|| format!("failed to read data file {}", args.data.display()))
}

/// Read data with columns and their kinds pinned to the forest's training
/// schema. Schema columns the file never mentions read as 0.
fn read_data_for(args: &DataArgs, forest: &RandomForest) -> Result<FeatureMatrix> {
    let columns: Vec<_> = forest
        .predictors()
        .iter()
        .chain(std::iter::once(forest.target()))
        .collect();
    let min_index = columns
        .iter()
        .filter_map(|column| column.name.parse::<usize>().ok())
        .max()
        .unwrap_or_default();
    let reader = columns.into_iter().fold(
        LibSvmReader::new(&args.data)
            .with_categorical_max_levels(args.categorical_max_levels)
            .with_min_index(min_index),
        |reader, column| reader.with_column_kind(column.name.clone(), column.kind),
    );
    reader
        .read()
        .with_context(|| format!("failed to read data file {}", args.data.display()))
}

fn load_model(path: &Path) -> Result<RandomForest> {
    ModelStore::new(path)
        .load()
        .with_context(|| format!("failed to load model {}", path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match (cli.verbose, cli.quiet) {
        (true, _) => "debug",
        (_, true) => "error",
        _ => "info",
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("failed to configure thread pool")?;
        info!(threads, "thread pool configured");
    }

    match cli.command {
        Command::Grow {
            data,
            target,
            n_trees,
            m_try,
            leaf_size,
            n_samples,
            subsample,
            entropy,
            oob,
            model,
            summary,
        } => {
            let matrix = read_data(&data)?;

            let mut config = ForestConfig::new(n_trees)?
                .with_m_try(parse_m_try(&m_try)?)
                .with_leaf_size(leaf_size)
                .with_seed(cli.seed);
            if let Some(n) = n_samples {
                config = config.with_n_samples(n);
            }
            if subsample {
                config = config.with_sampling(Sampling::Subsample);
            }
            if entropy {
                config = config.with_criterion(SplitCriterion::Entropy);
            }
            if oob {
                config = config.with_oob_mode(OobMode::Enabled);
            }

            let result = config
                .fit(&matrix, &target)
                .context("forest growth failed")?;

            ModelStore::new(&model)
                .save(result.forest())
                .context("failed to save model")?;

            if let Some(summary) = summary {
                ReportWriter::new(&summary)?.write_summary(&result)?;
            }

            let metadata = result.metadata();
            let output = GrowOutput {
                target,
                model,
                n_trees: metadata.n_trees,
                n_rows: metadata.n_rows,
                n_predictors: metadata.n_predictors,
                n_classes: metadata.n_classes,
                m_try: metadata.m_try,
                oob_error: result.oob_score().map(|s| s.error()),
                top_features: result
                    .importances()
                    .iter()
                    .take(10)
                    .map(|f| FeatureOutput {
                        name: f.name.clone(),
                        importance: f.importance,
                    })
                    .collect(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Predict {
            model,
            data,
            output,
        } => {
            let forest = load_model(&model)?;
            let matrix = read_data_for(&data, &forest)?;

            let predictions = forest
                .predict_batch(&matrix)
                .context("prediction failed")?;

            ReportWriter::new(&output)?.write_predictions(&forest, &predictions)?;

            let summary = PredictOutput {
                output,
                n_rows: predictions.len(),
                target: forest.target().name.clone(),
                model_n_trees: forest.n_trees(),
                model_n_predictors: forest.predictors().len(),
            };
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        Command::Pdp {
            model,
            data,
            features,
            class,
            output,
        } => {
            let forest = load_model(&model)?;
            let matrix = read_data_for(&data, &forest)?;

            let response = match &class {
                Some(label) => {
                    let code = forest
                        .target()
                        .levels
                        .iter()
                        .position(|l| l == label)
                        .with_context(|| format!("unknown class label: {label}"))?;
                    Response::Probability(code)
                }
                None => Response::Value,
            };

            let names: Vec<&str> = features.iter().map(String::as_str).collect();
            let rows = forest
                .partial_dependence(&matrix, &names, response)
                .context("partial dependence failed")?;

            ReportWriter::new(&output)?.write_partial_dependence(&names, &rows)?;

            let summary = PdpOutput {
                output,
                grid_size: rows.len(),
                response: class.map_or_else(|| "value".to_string(), |c| format!("P({c})")),
                features,
            };
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        Command::Jackknife {
            predictions,
            in_bag,
            output,
        } => {
            let preds = MatrixReader::new(&predictions)
                .read()
                .context("failed to read per-tree predictions")?;
            let counts = MatrixReader::new(&in_bag)
                .read()
                .context("failed to read in-bag counts")?;

            let estimates = jackknife(&preds, &counts).context("jackknife failed")?;

            ReportWriter::new(&output)?.write_jackknife(&estimates)?;

            let mean_variance =
                estimates.iter().map(|p| p.variance).sum::<f64>() / estimates.len() as f64;
            let summary = JackknifeOutput {
                output,
                n_cases: estimates.len(),
                n_trees: preds.first().map_or(0, Vec::len),
                mean_variance,
            };
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}
