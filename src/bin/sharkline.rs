//! sharkline command line tool
//!
//! Assemble habitat training tables, train the presence classifier, predict,
//! and audit raw source directories.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use sharkline::config::SwathSourceConfig;
use sharkline::core::audit::list_swath_files;
use sharkline::core::{missing_dates, parse_feature_row, swath_validity, train, SwathVerdict};
use sharkline::io::{read_training_table, write_training_table};
use sharkline::{AssemblyConfig, DatasetAssembler, GdalBackend, HabitatModel, TrainerParams};

#[derive(Parser)]
#[command(name = "sharkline")]
#[command(about = "Match animal tracks against daily ocean rasters and model habitat", long_about = None)]
struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the labelled training table
    Assemble {
        /// JSON assembly configuration
        #[arg(long, conflicts_with = "base_dir")]
        config: Option<PathBuf>,

        /// Data directory with the conventional layout (shark_data/, chlorophyll/, phytoplankton/, SST/, SSH/)
        #[arg(long)]
        base_dir: Option<PathBuf>,

        /// Output CSV
        #[arg(short, long, default_value = "training_data.csv")]
        output: PathBuf,

        /// Seed for background sampling
        #[arg(long)]
        seed: Option<u64>,

        /// Write the data-quality report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Cross-validate and fit the presence classifier
    Train {
        /// Training table CSV
        table: PathBuf,

        /// Output model (JSON)
        #[arg(short, long, default_value = "habitat_model.json")]
        model: PathBuf,

        #[arg(long, default_value_t = 200)]
        n_trees: usize,

        #[arg(long, default_value_t = 5)]
        folds: usize,

        #[arg(long, default_value_t = 42)]
        seed: u64,

        #[arg(long)]
        max_depth: Option<usize>,

        /// Output metrics file (JSON)
        #[arg(long)]
        metrics: Option<PathBuf>,
    },

    /// Predict presence for one feature vector or a CSV of them
    Predict {
        /// Trained model (JSON)
        #[arg(short, long)]
        model: PathBuf,

        /// chlor_a carbon_phyto sst ssha_karin
        #[arg(long, num_args = 4, value_names = ["CHLOR_A", "CARBON_PHYTO", "SST", "SSHA_KARIN"], conflicts_with = "input")]
        values: Option<Vec<String>>,

        /// CSV with the four feature columns
        #[arg(long, requires = "output")]
        input: Option<PathBuf>,

        #[arg(long)]
        output: Option<PathBuf>,

        /// Override the model's decision threshold
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// List missing days in a directory of daily files
    AuditDates {
        dir: PathBuf,
    },

    /// Count valid samples in every swath file of a directory
    AuditSwath {
        dir: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    log::info!("sharkline v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Assemble { config, base_dir, output, seed, report } => {
            run_assemble(config, base_dir, output, seed, report)
        }
        Command::Train { table, model, n_trees, folds, seed, max_depth, metrics } => {
            let params = TrainerParams {
                n_trees,
                n_folds: folds,
                seed,
                max_depth,
                ..Default::default()
            };
            run_train(table, model, params, metrics)
        }
        Command::Predict { model, values, input, output, threshold } => {
            run_predict(model, values, input, output, threshold)
        }
        Command::AuditDates { dir } => {
            let report = missing_dates(&dir).with_context(|| format!("scanning {}", dir.display()))?;
            match (report.first, report.last) {
                (Some(first), Some(last)) => {
                    println!("{} day(s) present from {} to {}", report.days_present, first, last);
                    if report.missing.is_empty() {
                        println!("No missing dates");
                    } else {
                        println!("{} missing date(s):", report.missing.len());
                        for date in &report.missing {
                            println!("  {}", date);
                        }
                    }
                }
                _ => println!("No dated files in {}", dir.display()),
            }
            Ok(())
        }
        Command::AuditSwath { dir } => {
            let source = SwathSourceConfig::swot(&dir);
            let files = list_swath_files(&source).with_context(|| format!("listing {}", dir.display()))?;
            let report = swath_validity(&files, &source, &GdalBackend);

            for file in &report.files {
                println!("{}: {:?} ({} of {} valid)", file.path.display(), file.verdict, file.valid, file.total);
            }
            match report.valid_percentage() {
                Some(pct) => println!(
                    "{} valid of {} samples ({:.2}%) across {} file(s)",
                    report.valid_samples,
                    report.total_samples,
                    pct,
                    report.files.len()
                ),
                None => println!("No samples read from {} file(s)", report.files.len()),
            }
            let without = report.files_with(&SwathVerdict::VariableNotFound);
            if !without.is_empty() {
                println!("{} file(s) without a known SSH variable", without.len());
            }
            Ok(())
        }
    }
}

fn run_assemble(
    config: Option<PathBuf>,
    base_dir: Option<PathBuf>,
    output: PathBuf,
    seed: Option<u64>,
    report_path: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut config = match (config, base_dir) {
        (Some(path), _) => AssemblyConfig::from_json_file(&path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        (None, base) => {
            let base = base.unwrap_or_else(|| PathBuf::from("."));
            let mut config = AssemblyConfig::with_base_dir(&base);
            let tracks = base.join("shark_data");
            let found = config
                .discover_observations(&tracks)
                .with_context(|| format!("searching {}", tracks.display()))?;
            if found == 0 {
                bail!("no observation CSV files in {}", tracks.display());
            }
            config
        }
    };
    if seed.is_some() {
        config.seed = seed;
    }

    let backend = GdalBackend;
    let assembly = DatasetAssembler::new(&config, &backend)
        .assemble()
        .context("assembling training table")?;
    write_training_table(&assembly.table, &output)
        .with_context(|| format!("writing {}", output.display()))?;

    let report = &assembly.report;
    println!("Wrote {} row(s) to {}", assembly.table.len(), output.display());
    println!(
        "  {} presence, {} background, {} day(s)",
        report.presence_points, report.background_points, report.days_processed
    );
    for (feature, missing) in &report.missing_by_feature {
        println!("  {:<13} missing in {} row(s)", feature.name(), missing);
    }

    if let Some(path) = report_path {
        let file = std::fs::File::create(&path).with_context(|| format!("creating {}", path.display()))?;
        serde_json::to_writer_pretty(file, report)?;
    }
    Ok(())
}

fn run_train(
    table_path: PathBuf,
    model_path: PathBuf,
    params: TrainerParams,
    metrics: Option<PathBuf>,
) -> anyhow::Result<()> {
    let table = read_training_table(&table_path)
        .with_context(|| format!("reading {}", table_path.display()))?;
    let (report, model) = train(&table, &params).context("training classifier")?;

    println!("Rows used: {} ({} dropped with missing data)", report.rows_used, report.rows_dropped);
    for (i, auc) in report.fold_auc.iter().enumerate() {
        match auc {
            Some(a) => println!("  fold {}: AUC {:.4}", i + 1, a),
            None => println!("  fold {}: AUC undefined", i + 1),
        }
    }
    println!("Mean AUC: {:.4} (std {:.4})", report.mean_auc, report.std_auc);
    println!("Feature importance:");
    for (feature, value) in &report.feature_importance {
        println!("  {:<13} {:.4}", feature.name(), value);
    }

    model
        .save(&model_path)
        .with_context(|| format!("saving model to {}", model_path.display()))?;

    if let Some(path) = metrics {
        let file = std::fs::File::create(&path).with_context(|| format!("creating {}", path.display()))?;
        serde_json::to_writer_pretty(file, &report)?;
    }
    Ok(())
}

fn run_predict(
    model_path: PathBuf,
    values: Option<Vec<String>>,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    threshold: Option<f64>,
) -> anyhow::Result<()> {
    let mut model = HabitatModel::load(&model_path)
        .with_context(|| format!("loading model {}", model_path.display()))?;
    if let Some(t) = threshold {
        model.set_threshold(t);
    }

    match (values, input, output) {
        (Some(values), _, _) => {
            let fields: Vec<&str> = values.iter().map(|s| s.as_str()).collect();
            let row = parse_feature_row(&fields).context("invalid feature values")?;
            let prediction = model.predict(&row);
            println!("Predicted presence: {}", prediction.label);
            println!("Probability of presence: {:.4}", prediction.probability);
            Ok(())
        }
        (None, Some(input), Some(output)) => {
            let n = model
                .predict_csv(&input, &output)
                .with_context(|| format!("predicting {}", input.display()))?;
            println!("Predicted {} row(s) into {}", n, output.display());
            Ok(())
        }
        _ => bail!("give either --values or both --input and --output"),
    }
}
