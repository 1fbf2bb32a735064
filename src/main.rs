use clap::Parser;
use std::process::ExitCode;

mod cli;
mod commands;

use cli::{Cli, Command};

fn main() -> ExitCode {
    // Load environment variables from .env if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    if let Some(mode) = cli.color {
        dblab_engine::set_color_mode(mode);
    }
    dblab_engine::logging::init(cli.verbose);

    match &cli.command {
        Command::Clone { cmd } => commands::run_clone(&cli, cmd),
        Command::Engine { cmd } => commands::run_engine(&cli, cmd),
    }
}
