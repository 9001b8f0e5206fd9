use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Station-level bike-share demand panels and model evaluation", long_about = None)]
pub struct Cli {
    /// Set the logging level
    #[arg(long, default_value = "info", global = true)]
    pub log_level: tracing::Level,

    /// Worker threads for panel building and model fits ("auto" = all cores)
    #[arg(long, default_value = "auto", global = true)]
    pub threads: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// The four collaborator files every data-driven command reads.
#[derive(Args, Debug, Clone)]
pub struct InputArgs {
    /// Station roster CSV (station_id,lat,lon,tract_id)
    #[arg(long)]
    pub stations: PathBuf,
    /// Tract demographics CSV
    #[arg(long)]
    pub demographics: PathBuf,
    /// Raw weather observations CSV
    #[arg(long)]
    pub weather: PathBuf,
    /// Trip log CSV
    #[arg(long)]
    pub trips: PathBuf,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum TableFormat {
    Csv,
    Parquet,
}

impl TableFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            TableFormat::Csv => "csv",
            TableFormat::Parquet => "parquet",
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the registered model specifications
    Models {
        /// Study configuration (TOML)
        #[arg(long)]
        config: PathBuf,
        /// Station roster used to count station indicator columns
        #[arg(long)]
        stations: Option<PathBuf>,
    },
    /// Build the station x interval panel and write it out
    Panel {
        #[arg(long)]
        config: PathBuf,
        #[command(flatten)]
        inputs: InputArgs,
        /// Output file (.parquet or .csv)
        #[arg(short, long)]
        out: PathBuf,
    },
    /// Train on earlier weeks, test on later weeks, report errors per week
    Holdout {
        #[arg(long)]
        config: PathBuf,
        #[command(flatten)]
        inputs: InputArgs,
        /// Directory for report tables and the run manifest
        #[arg(long)]
        out_dir: PathBuf,
        #[arg(long, value_enum, default_value = "csv")]
        format: TableFormat,
    },
    /// K-fold cross-validation of every registered model
    Cv {
        #[arg(long)]
        config: PathBuf,
        #[command(flatten)]
        inputs: InputArgs,
        #[arg(long)]
        out_dir: PathBuf,
        #[arg(long, value_enum, default_value = "csv")]
        format: TableFormat,
    },
}
