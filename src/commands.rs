//! Command implementation for the keydiff CLI

use crate::cancel::CancellationToken;
use crate::cli::Cli;
use crate::config::DiffConfig;
use crate::error::Result;
use crate::output::{JsonFormatter, PrettyPrinter};
use crate::pipeline::{Pipeline, RunSummary};

/// Merge the config file (if any) with command-line overrides.
///
/// Precedence: built-in defaults, then `--config`, then individual flags.
pub fn build_config(cli: &Cli) -> Result<DiffConfig> {
    let mut config = match &cli.config {
        Some(path) => DiffConfig::from_file(path)?,
        None => DiffConfig::default(),
    };

    if let Some(old) = &cli.old {
        config.old = Some(old.clone());
    }
    if let Some(new) = &cli.new {
        config.new = Some(new.clone());
    }
    if let Some(key) = &cli.key {
        config.key = Some(key.clone());
    }
    if let Some(delimiter) = cli.delimiter {
        config.delimiter = delimiter;
    }
    if let Some(batch_size) = cli.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(capacity) = cli.channel_capacity {
        config.channel_capacity = capacity;
    }
    if let Some(interval) = cli.flush_interval {
        config.flush_interval = interval;
    }
    if let Some(partitions) = cli.partitions {
        config.query_partitions = partitions;
    }
    if let Some(limit) = &cli.memory_limit {
        config.memory_limit = limit.clone();
    }
    if cli.threads.is_some() {
        config.threads = cli.threads;
    }
    if let Some(dir) = &cli.output_dir {
        config.output_dir = dir.clone();
    }
    if cli.scratch_dir.is_some() {
        config.scratch_dir = cli.scratch_dir.clone();
    }
    if let Some(policy) = cli.duplicates {
        config.duplicate_policy = policy;
    }
    if cli.no_header {
        config.write_header = false;
    }
    if cli.timeout.is_some() {
        config.timeout_secs = cli.timeout;
    }
    // JSON output goes to stdout, keep the terminal free of bars
    config.show_progress = !cli.no_progress && !cli.json;

    config.validate()?;
    Ok(config)
}

/// Run one diff and print its summary
pub fn execute(cli: &Cli) -> Result<RunSummary> {
    let config = build_config(cli)?;
    let pipeline = Pipeline::new(config);
    let summary = pipeline.run(&CancellationToken::new())?;

    if cli.json {
        println!("{}", JsonFormatter::format_summary(&summary)?);
    } else {
        PrettyPrinter::print_run_summary(&summary);
    }

    Ok(summary)
}
