use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::discovery::DatasetKind;

#[derive(Parser, Debug)]
#[command(name = "neuroview")]
#[command(about = "Decode cortical surfaces, curvature, fiber tracks and connectomes", long_about = None)]
pub struct Args {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Decode one file and print a summary
    Info {
        /// Dataset file to inspect
        file: PathBuf,

        /// File kind, guessed from the file name when omitted
        #[arg(short, long, value_enum)]
        kind: Option<DatasetKind>,
    },

    /// Print a text histogram of a curvature map over its surface
    Histogram {
        /// Curvature file (lh.curv, rh.sulc, ...)
        curvature: PathBuf,

        /// Surface the curvature belongs to
        #[arg(short, long)]
        surface: PathBuf,

        /// Number of bins (defaults to the settings file, then 100)
        #[arg(short, long)]
        bins: Option<usize>,

        /// Lower end of the histogram range
        #[arg(long, requires = "max")]
        min: Option<f32>,

        /// Upper end of the histogram range
        #[arg(long, requires = "min")]
        max: Option<f32>,

        /// Remember the bins and range in neuroview.toml next to the curvature file
        #[arg(long)]
        save: bool,
    },

    /// Discover, decode and join every dataset file in a directory
    Scene {
        /// Dataset directory
        directory: PathBuf,

        /// Descend into subdirectories
        #[arg(short, long)]
        recursive: bool,

        /// Number of decode workers (defaults to the settings file, then all cores)
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Write decoded buffers as little-endian f32 .bin files plus a .json summary
    Export {
        /// Input file or directory
        input: PathBuf,

        /// Output directory (defaults to the input's directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// File pattern to match when processing directories
        #[arg(short = 'p', long, default_value = "*")]
        pattern: String,

        /// Process directory files in parallel
        #[arg(long)]
        parallel: bool,

        /// Number of threads to use (0 = all available)
        #[arg(short = 'j', long, default_value_t = 0)]
        threads: usize,
    },
}

impl Args {
    pub fn parse_args() -> Self {
        Args::parse()
    }
}
