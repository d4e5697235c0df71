//! ## hearth-cli
//! **Command-line host for the hearth runtime**
//!
//! - `hearth run`: runs a headless application, installing plugins and
//!   exiting with the loop's exit code
//! - `hearth inspect`: reports which ABI symbols a library exports

use clap::Parser;

mod commands;

use commands::Cli;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let code = commands::run_command(cli)?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
