//! `querycraft` command line
//!
//! - explain: compile a query and print the explain report
//! - plan: print the logical plan
//! - validate: list every validation error, or the resolved projection

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command, Inputs};
pub use commands::{explain, plan, run_command, validate};
pub use errors::{CliError, CliResult};

/// Parses process arguments and runs the selected command
pub fn run() -> CliResult<()> {
    run_command(Cli::parse_args().command)
}
