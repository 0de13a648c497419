use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Verbose mode (-v, --verbose)
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a load test
    Run {
        /// Path to the run configuration
        #[arg(short, long, default_value = "rampart.toml")]
        config: PathBuf,

        /// Override the target mode: sync | async
        #[arg(short, long)]
        mode: Option<String>,

        /// Override the target base URL
        #[arg(short, long)]
        base_url: Option<String>,

        /// Write raw per-request records to this JSON-lines file
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Write an example rampart.toml to the current directory
    Init,
}

pub fn parse() -> Args {
    Args::parse()
}
