#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process;

use ilicast::config::PipelineConfig;
use ilicast::output::{TableFormat, write_combined, write_panel, write_report};
use ilicast::panel::data::load_source_table;
use ilicast::pipeline::{self, PipelineOutput};
use ilicast::sources::combine::combine_sources;
use ilicast::sources::fluview::load_fluview;
use ilicast::sources::trends::load_trends;

#[derive(Clone, Copy, ValueEnum)]
pub enum FormatCli {
    Tsv,
    Json,
}

impl From<FormatCli> for TableFormat {
    fn from(format: FormatCli) -> Self {
        match format {
            FormatCli::Tsv => TableFormat::Tsv,
            FormatCli::Json => TableFormat::Json,
        }
    }
}

#[derive(Args)]
pub struct RunArgs {
    /// Combined surveillance + trends table (CSV, or TSV by extension)
    #[arg(value_name = "COMBINED")]
    pub combined: PathBuf,

    /// Pipeline configuration (.toml); defaults are used when omitted
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory receiving the output tables
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub out_dir: PathBuf,

    /// Output format for the predictions and coefficients tables
    #[arg(long, value_enum, default_value_t = FormatCli::Tsv)]
    pub format: FormatCli,

    /// Write internal lag-rule tokens and feature names instead of display labels
    #[arg(long)]
    pub raw: bool,

    /// Fit the backtest matrix on one thread
    #[arg(long)]
    pub sequential: bool,
}

#[derive(Args)]
pub struct PanelArgs {
    /// Combined surveillance + trends table
    #[arg(value_name = "COMBINED")]
    pub combined: PathBuf,

    /// Pipeline configuration (.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Output path for the lag-aligned panel
    #[arg(long, value_name = "PATH")]
    pub out: PathBuf,
}

#[derive(Args)]
pub struct CombineArgs {
    /// FluView export with region, epiweek (or week_start), and target columns
    #[arg(long, value_name = "PATH")]
    pub fluview: PathBuf,

    /// State-level trends export with date, state, and one column per keyword
    #[arg(long, value_name = "PATH")]
    pub trends: PathBuf,

    /// Output path for the combined table
    #[arg(long, value_name = "PATH")]
    pub out: PathBuf,

    /// Pipeline configuration (.toml) naming the target and keywords
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Parser)]
#[command(
    name = "ilicast",
    version,
    about = "Backtest lagged search-interest forecasts of regional influenza-like illness."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the panel, run the (cutoff x lag rule) backtest, and write its tables
    #[command(about = "Run the backtest (outputs: predictions, coefficients, models.tsv)")]
    Run(RunArgs),

    /// Write the lag-aligned panel without fitting anything
    #[command(about = "Build and export the lag-aligned panel")]
    Panel(PanelArgs),

    /// Join surveillance and trends exports into the combined source table
    #[command(about = "Combine FluView and trends exports into one source table")]
    Combine(CombineArgs),

    /// Print the default configuration, or write it to a file
    #[command(about = "Print or save the default configuration as TOML")]
    Config {
        /// Write to this path instead of stdout
        #[arg(long, value_name = "PATH")]
        out: Option<PathBuf>,
    },
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            println!("Loading configuration from: {}", path.display());
            Ok(PipelineConfig::load(path)?)
        }
        None => Ok(PipelineConfig::default()),
    }
}

fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(args.config.as_deref())?;
    if args.sequential {
        config.parallel = false;
    }

    println!("Loading combined table from: {}", args.combined.display());
    let PipelineOutput { panel, report } = pipeline::run_file(&args.combined, &config)?;
    println!(
        "Panel: {} complete rows, {} lag features",
        panel.len(),
        panel.features.len()
    );
    println!(
        "Fitted {} of {} models ({} prediction rows, {} coefficient rows)",
        report.models.len(),
        report.jobs(),
        report.predictions.len(),
        report.coefficients.len()
    );

    if report.is_partial() {
        println!("Partial backtest: {} fits skipped", report.skipped.len());
        for skip in &report.skipped {
            println!(
                "  cutoff {} rule {}: {}",
                skip.season_cutoff, skip.lag_rule, skip.reason
            );
        }
    }

    let written = write_report(&report, &args.out_dir, args.format.into(), args.raw)?;
    for path in written {
        println!("Wrote: {}", path.display());
    }
    Ok(())
}

fn export_panel(args: PanelArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(args.config.as_deref())?;
    config.validate()?;
    println!("Loading combined table from: {}", args.combined.display());
    let source = load_source_table(&args.combined, &config)?;
    let panel = pipeline::build_panel(&source, &config)?;
    write_panel(&args.out, &panel)?;
    println!("Panel with {} rows saved to: {}", panel.len(), args.out.display());
    Ok(())
}

fn combine(args: CombineArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(args.config.as_deref())?;
    println!("Loading FluView export from: {}", args.fluview.display());
    let surveillance = load_fluview(&args.fluview, &config.target)?;
    println!("Loading trends export from: {}", args.trends.display());
    let trends = load_trends(&args.trends, &config.predictors)?;

    let combined = combine_sources(&trends, &surveillance);
    if combined.is_empty() {
        return Err("No trend row matched a surveillance region-week; nothing to write.".into());
    }
    write_combined(&args.out, &combined)?;
    println!(
        "Combined table with {} rows saved to: {}",
        combined.len(),
        args.out.display()
    );
    Ok(())
}

fn print_config(out: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config = PipelineConfig::default();
    match out {
        Some(path) => {
            config.save(&path)?;
            println!("Default configuration saved to: {}", path.display());
        }
        None => print!("{}", config.to_toml_string()?),
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Cli { command } = Cli::parse();

    let result = match command {
        Some(Commands::Run(args)) => run(args),
        Some(Commands::Panel(args)) => export_panel(args),
        Some(Commands::Combine(args)) => combine(args),
        Some(Commands::Config { out }) => print_config(out),
        None => Cli::command()
            .print_help()
            .map(|()| println!())
            .map_err(|e| e.into()),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
