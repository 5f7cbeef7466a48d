//! Main entry point for keydiff CLI

use clap::Parser;
use keydiff::cli::Cli;
use keydiff::commands::execute;

fn main() {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG still wins when set
    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    if let Err(e) = execute(&cli) {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}
