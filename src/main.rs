//! # nmrquant CLI
//!
//! Command-line front end for the quantification pipeline.
//!
//! ```bash
//! # Generate an empty metadata template for a dataset
//! nmrquant template spectra.csv
//!
//! # Quantify with a dilution factor of 5, aggregating replicates
//! nmrquant quantify spectra.csv -t template.csv -d proton_db.csv -f 5.0 --mean
//! ```
//!
//! The `quantify` command writes one CSV per output table (merged, resolved,
//! concentrations and, with `--mean`, means and standard deviations) plus a
//! JSON run summary, all under a timestamped name.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use log::info;

use nmrquant::io::{
    load_metadata, load_proton_reference, load_spectral_data, write_group_table,
    write_metadata_template, write_sample_table, RunSummary,
};
use nmrquant::pipeline::{ExternalStandard, PipelineConfig, Quantifier};
use nmrquant::table::{GroupKey, SampleKey, Table};

/// Quantification of 1D proton NMR peak-integration data
#[derive(Parser)]
#[command(name = "nmrquant")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbosity level (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the quantification pipeline and export its tables
    Quantify {
        /// Spectral dataset (.csv/.tsv, one row per spectrum)
        #[arg(value_name = "DATA")]
        data: PathBuf,

        /// Filled-in metadata template
        #[arg(short = 't', long)]
        template: PathBuf,

        /// Proton reference table (Metabolite/Heq)
        #[arg(short = 'd', long)]
        database: PathBuf,

        /// Dilution factor applied to every intensity
        #[arg(short = 'f', long)]
        dilution_factor: f64,

        /// Also compute replicate means and standard deviations
        #[arg(short, long)]
        mean: bool,

        /// Calibrate against an external standard column instead of the
        /// internal reference
        #[arg(long)]
        external_standard: bool,

        /// Name of the external standard's intensity column
        #[arg(long, default_value = "Strd")]
        standard_column: String,

        /// Known concentration of the external standard
        #[arg(short = 'c', long)]
        standard_concentration: Option<f64>,

        /// Input columns to drop on load (may be repeated; e.g. TSP)
        #[arg(long = "ignore-column", value_name = "NAME")]
        ignore_columns: Vec<String>,

        /// Output directory (defaults to the data file's directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Base name for the exported files
        #[arg(short = 'e', long, default_value = "nmrquant")]
        export_name: String,
    },

    /// Generate an empty metadata template for a spectral dataset
    Template {
        /// Spectral dataset to read spectrum ids from
        #[arg(value_name = "DATA")]
        data: PathBuf,

        /// Template destination (defaults to template.csv next to the data)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match cli.command {
        Commands::Quantify {
            data,
            template,
            database,
            dilution_factor,
            mean,
            external_standard,
            standard_column,
            standard_concentration,
            ignore_columns,
            output,
            export_name,
        } => quantify(QuantifyArgs {
            data,
            template,
            database,
            dilution_factor,
            mean,
            external_standard,
            standard_column,
            standard_concentration,
            ignore_columns,
            output,
            export_name,
        }),
        Commands::Template { data, output } => generate_template(&data, output),
    }
}

struct QuantifyArgs {
    data: PathBuf,
    template: PathBuf,
    database: PathBuf,
    dilution_factor: f64,
    mean: bool,
    external_standard: bool,
    standard_column: String,
    standard_concentration: Option<f64>,
    ignore_columns: Vec<String>,
    output: Option<PathBuf>,
    export_name: String,
}

fn quantify(args: QuantifyArgs) -> Result<()> {
    let dataset = load_spectral_data(&args.data, &args.ignore_columns)
        .with_context(|| format!("loading spectral data from {}", args.data.display()))?;
    let metadata = load_metadata(&args.template)
        .with_context(|| format!("loading metadata from {}", args.template.display()))?;
    let reference = load_proton_reference(&args.database)
        .with_context(|| format!("loading proton reference from {}", args.database.display()))?;

    let config = PipelineConfig {
        dilution_factor: args.dilution_factor,
        external_standard: args.external_standard.then(|| ExternalStandard {
            column: args.standard_column.clone(),
            concentration: args.standard_concentration,
        }),
        compute_mean: args.mean,
    };
    let mut quantifier = Quantifier::new(config).context("invalid pipeline configuration")?;
    quantifier.load(dataset, metadata, reference);
    quantifier.run().context("quantification failed")?;

    let destination = match args.output {
        Some(dir) => dir,
        None => args
            .data
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    std::fs::create_dir_all(&destination)
        .with_context(|| format!("creating output directory {}", destination.display()))?;

    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let prefix = format!("{}_{stamp}", args.export_name);

    export_sample_table(&destination, &prefix, "raw", quantifier.merged())?;
    export_sample_table(&destination, &prefix, "resolved", quantifier.resolved())?;
    export_sample_table(
        &destination,
        &prefix,
        "concentrations",
        quantifier.concentrations(),
    )?;
    if args.mean {
        export_group_table(&destination, &prefix, "means", quantifier.means())?;
        export_group_table(&destination, &prefix, "stds", quantifier.stds())?;
    }

    // The input tables were consumed by the pipeline; recover the experiment
    // labels from the merged index for the summary.
    let merged = quantifier
        .merged()
        .context("pipeline finished without a merged table")?;
    let summary = RunSummary {
        spectra: merged.n_rows(),
        metabolites: quantifier.metabolites().unwrap_or_default(),
        conditions: distinct(merged.index().iter().map(|key| key.condition.clone())),
        time_points: distinct(merged.index().iter().map(|key| key.time_point.clone())),
        dilution_factor: args.dilution_factor,
        external_standard: args.external_standard.then_some(args.standard_column),
        aggregated: args.mean,
    };
    let summary_path = destination.join(format!("{prefix}_summary.json"));
    std::fs::write(&summary_path, summary.to_json()?)
        .with_context(|| format!("writing {}", summary_path.display()))?;

    info!("finished, exports are in {}", destination.display());
    println!("Exported results to {}", destination.display());
    Ok(())
}

fn distinct(values: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = Vec::new();
    for value in values {
        if !seen.contains(&value) {
            seen.push(value);
        }
    }
    seen
}

fn export_sample_table(
    destination: &Path,
    prefix: &str,
    tag: &str,
    table: Option<&Table<SampleKey>>,
) -> Result<()> {
    let Some(table) = table else {
        bail!("pipeline did not produce the {tag} table");
    };
    let path = destination.join(format!("{prefix}_{tag}.csv"));
    let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    write_sample_table(file, table).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

fn export_group_table(
    destination: &Path,
    prefix: &str,
    tag: &str,
    table: Option<&Table<GroupKey>>,
) -> Result<()> {
    let Some(table) = table else {
        bail!("pipeline did not produce the {tag} table");
    };
    let path = destination.join(format!("{prefix}_{tag}.csv"));
    let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    write_group_table(file, table).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

fn generate_template(data: &Path, output: Option<PathBuf>) -> Result<()> {
    let dataset = load_spectral_data(data, &[])
        .with_context(|| format!("loading spectral data from {}", data.display()))?;
    let destination = output.unwrap_or_else(|| {
        data.parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("template.csv")
    });
    let file = File::create(&destination)
        .with_context(|| format!("creating {}", destination.display()))?;
    write_metadata_template(file, dataset.spectrum_ids())
        .with_context(|| format!("writing {}", destination.display()))?;
    println!("Template written to {}", destination.display());
    Ok(())
}
