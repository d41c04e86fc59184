use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Interval time for extraction in seconds [default: 30]
    #[arg(long)]
    pub interval: Option<u64>,

    /// Set log level
    #[arg(long)]
    pub log_level: Option<String>,

    /// Set log format (text or json)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Increase verbosity
    #[arg(short, long)]
    pub verbose: bool,

    /// Stop the extraction loop after this many seconds
    #[arg(long)]
    pub max_runtime: Option<u64>,

    /// Fire this many concurrent user fetches to probe rate limiting, then exit
    #[arg(long)]
    pub burst: Option<usize>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize configuration file
    Init {
        /// Path to create the config file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Don't prompt for input, use defaults
        #[arg(long)]
        no_prompt: bool,

        /// Force overwrite if config file exists
        #[arg(long)]
        force: bool,
    },
}
