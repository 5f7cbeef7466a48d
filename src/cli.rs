//! Command-line interface for keydiff

use crate::config::validate_delimiter;
use crate::loader::DuplicatePolicy;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "keydiff")]
#[command(about = "Find rows added and removed between two large delimited files, matched by a key column")]
#[command(version)]
pub struct Cli {
    /// Baseline file
    #[arg(long)]
    pub old: Option<PathBuf>,

    /// Updated file
    #[arg(long)]
    pub new: Option<PathBuf>,

    /// Name of the key column (must exist in both headers)
    #[arg(long)]
    pub key: Option<String>,

    /// Field delimiter for input and output; "tab" or "\t" for tabs
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<char>,

    /// Rows per bulk insert (must be > 0)
    #[arg(long, value_parser = validate_positive)]
    pub batch_size: Option<usize>,

    /// Rows queued between each anti-join and its writer (must be > 0)
    #[arg(long, value_parser = validate_positive)]
    pub channel_capacity: Option<usize>,

    /// Rows written between output flushes (must be > 0)
    #[arg(long, value_parser = validate_positive)]
    pub flush_interval: Option<usize>,

    /// Split each anti-join into N hash partitions of the key (must be > 0)
    #[arg(long, value_parser = validate_positive)]
    pub partitions: Option<usize>,

    /// Memory cap for the scratch store, e.g. "4GB" or "75%"
    #[arg(long)]
    pub memory_limit: Option<String>,

    /// Worker threads for the scratch store
    #[arg(long, value_parser = validate_positive)]
    pub threads: Option<usize>,

    /// Directory receiving one sub-directory per run
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Directory for the scratch store (defaults to the system temp dir)
    #[arg(long)]
    pub scratch_dir: Option<PathBuf>,

    /// Duplicate key handling: "keep" or "reject"
    #[arg(long, value_parser = DuplicatePolicy::parse)]
    pub duplicates: Option<DuplicatePolicy>,

    /// Do not write the header line to the output files
    #[arg(long)]
    pub no_header: bool,

    /// Cancel the run after this many seconds
    #[arg(long, value_parser = validate_timeout)]
    pub timeout: Option<u64>,

    /// JSON config file; command-line flags take precedence
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Disable progress bars
    #[arg(long)]
    pub no_progress: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Parse a delimiter argument into a single ASCII character
fn parse_delimiter(s: &str) -> Result<char, String> {
    let c = match s {
        "\\t" | "tab" | "TAB" => '\t',
        _ => {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => c,
                _ => return Err(format!("Invalid delimiter: '{}'. Must be a single character.", s)),
            }
        }
    };
    validate_delimiter(c)?;
    Ok(c)
}

/// Validate that a size argument is greater than 0
fn validate_positive(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("Invalid value: '{}'. Must be a positive integer.", s))?;

    if value == 0 {
        return Err("Value must be greater than 0".to_string());
    }

    Ok(value)
}

fn validate_timeout(s: &str) -> Result<u64, String> {
    let secs: u64 = s
        .parse()
        .map_err(|_| format!("Invalid timeout: '{}'. Must be a number of seconds.", s))?;
    if secs == 0 {
        return Err("Timeout must be greater than 0".to_string());
    }
    Ok(secs)
}
