mod commands;
mod config;
pub mod serve;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use spatial_protocol::ReferenceFrame;

pub use config::{DEFAULT_CONFIG_FILE, SpatialIndexConfig};
pub use serve::{ReindexTarget, ServeEvent, ServeRequest, Server};

/// Index tissue samples in 3D reference frames and query them by proximity.
#[derive(Debug, Parser)]
#[command(name = "spatial-index", version)]
pub struct Cli {
    /// Path to the TOML configuration
    #[arg(
        short,
        long,
        global = true,
        value_name = "PATH",
        default_value = DEFAULT_CONFIG_FILE,
        env = "SPATIAL_INDEX_CONFIG"
    )]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the PostGIS extension and tables if missing
    Migrate,

    /// Bring the spatial store in line with the graph
    Reindex(ReindexArgs),

    /// Find samples within a radius of a point
    Search(SearchArgs),

    /// Find samples within a radius of an indexed sample
    SearchSample(SearchSampleArgs),

    /// Print the stored rui_location of a sample
    Location(LocationArgs),

    /// Store the cell-type counts of an extraction callback
    CompleteExtraction(CompleteExtractionArgs),

    /// Stay up, taking reindex requests and extraction callbacks as JSON
    /// lines on stdin
    Serve(ServeArgs),
}

#[derive(Debug, Args)]
#[group(multiple = false)]
pub struct ReindexArgs {
    /// Reindex every sample, changed or not
    #[arg(long)]
    pub all: bool,

    /// Reindex the samples of one organ code
    #[arg(long, value_name = "CODE")]
    pub organ: Option<String>,

    /// Reindex a single sample
    #[arg(long, value_name = "UUID")]
    pub sample: Option<String>,
}

impl From<&ReindexArgs> for ReindexTarget {
    fn from(args: &ReindexArgs) -> Self {
        if let Some(uuid) = &args.sample {
            ReindexTarget::Sample { uuid: uuid.clone() }
        } else if let Some(code) = &args.organ {
            ReindexTarget::Organ { code: code.clone() }
        } else if args.all {
            ReindexTarget::All
        } else {
            ReindexTarget::Changed
        }
    }
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Also reindex changed samples every SECS seconds
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    pub reindex_every: Option<u64>,
}

#[derive(Debug, Args)]
pub struct SearchArgs {
    /// Reference frame: VHMale, VHFemale or an organ code
    #[arg(long, value_name = "FRAME")]
    pub frame: ReferenceFrame,

    /// Search radius, in the frame's units
    #[arg(short, long)]
    pub radius: f64,

    #[arg(short, long, allow_negative_numbers = true)]
    pub x: f64,

    #[arg(short, long, allow_negative_numbers = true)]
    pub y: f64,

    #[arg(short, long, allow_negative_numbers = true)]
    pub z: f64,

    /// Only samples with a count for this cell type
    #[arg(long, value_name = "NAME")]
    pub cell_type: Option<String>,
}

#[derive(Debug, Args)]
pub struct SearchSampleArgs {
    #[arg(long, value_name = "FRAME")]
    pub frame: ReferenceFrame,

    #[arg(short, long)]
    pub radius: f64,

    /// HuBMAP id of the sample to search around
    #[arg(value_name = "HUBMAP_ID")]
    pub hubmap_id: String,
}

#[derive(Debug, Args)]
pub struct LocationArgs {
    #[arg(long, value_name = "FRAME")]
    pub frame: ReferenceFrame,

    #[arg(value_name = "HUBMAP_ID")]
    pub hubmap_id: String,
}

#[derive(Debug, Args)]
pub struct CompleteExtractionArgs {
    /// JSON file holding `{"sample_uuid": ..., "cell_type_counts": {...}}`
    #[arg(long, value_name = "PATH")]
    pub file: PathBuf,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let config = SpatialIndexConfig::load(&self.config)?;
        match self.command {
            Command::Migrate => commands::run_migrate(&config).await,
            Command::Reindex(args) => commands::run_reindex(&config, args).await,
            Command::Search(args) => commands::run_search(&config, args).await,
            Command::SearchSample(args) => commands::run_search_sample(&config, args).await,
            Command::Location(args) => commands::run_location(&config, args).await,
            Command::CompleteExtraction(args) => {
                commands::run_complete_extraction(&config, args).await
            }
            Command::Serve(args) => commands::run_serve(&config, args).await,
        }
    }
}
