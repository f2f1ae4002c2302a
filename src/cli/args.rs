//! CLI argument definitions using clap
//!
//! Commands:
//! - querycraft explain --query <path> --schema <path> [--stats] [--runtime | --data] [--config] [--json]
//! - querycraft plan --query <path> --schema <path> [--config] [--json]
//! - querycraft validate --query <path> --schema <path> [--config]

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// querycraft - compile queries to costed physical plans
#[derive(Parser, Debug)]
#[command(name = "querycraft")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Inputs shared by every command
#[derive(Args, Debug, Clone)]
pub struct Inputs {
    /// Query JSON file
    #[arg(long)]
    pub query: PathBuf,

    /// Schema catalog file, or a directory of entity files
    #[arg(long)]
    pub schema: PathBuf,

    /// Compiler configuration JSON
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile a query and print its explain report
    Explain {
        #[command(flatten)]
        inputs: Inputs,

        /// Statistics JSON; without it every entity is uncosted
        #[arg(long)]
        stats: Option<PathBuf>,

        /// Recorded per-node row counts to compare against estimates
        #[arg(long, conflicts_with = "data")]
        runtime: Option<PathBuf>,

        /// Rows to run the plan against in memory (`{"tenant": {"entity": [rows]}}`)
        #[arg(long)]
        data: Option<PathBuf>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Print the logical plan only
    Plan {
        #[command(flatten)]
        inputs: Inputs,

        #[arg(long)]
        json: bool,
    },

    /// Check a query against the schema and list every error
    Validate {
        #[command(flatten)]
        inputs: Inputs,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
