use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mstseg")]
#[command(author, version, about = "MS tissue and lesion segmentation pipeline")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full pipeline over the raw input directory
    Run {
        /// Run every job in order on one thread
        #[arg(long)]
        serial: bool,

        /// Reuse previously extracted data instead of running the extraction tool
        #[arg(long)]
        no_extract: bool,

        /// Skip the quality control stage
        #[arg(long)]
        skip_qc: bool,

        /// Explicit worker count
        #[arg(short = 'j', long)]
        threads: Option<usize>,
    },

    /// Show the unit identifiers derived from raw media filenames
    Derive {
        /// Raw media files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Write the conversion config for one unit
    RenderConfig {
        /// Master conversion template
        template: PathBuf,

        /// Subject label (with or without the `sub-` prefix)
        subject: String,

        /// Session label (with or without the `ses-` prefix)
        session: String,

        /// Directory to write the config into
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        #[arg(value_name = "CONFIG")]
        file: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
