//! querycraft entry point
//!
//! All logic lives in `cli`; this only maps failures to an exit code.

use querycraft::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("{}: {}", e.code(), e);
        std::process::exit(1);
    }
}
