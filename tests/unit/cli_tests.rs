//! Unit tests for CLI argument parsing and config merging

use clap::Parser;
use keydiff::cli::Cli;
use keydiff::commands::build_config;
use keydiff::loader::DuplicatePolicy;
use std::path::PathBuf;

#[test]
fn test_cli_required_inputs() {
    let cli = Cli::try_parse_from(["keydiff", "--old", "old.csv", "--new", "new.csv", "--key", "id"]).unwrap();
    assert_eq!(cli.old, Some(PathBuf::from("old.csv")));
    assert_eq!(cli.new, Some(PathBuf::from("new.csv")));
    assert_eq!(cli.key.as_deref(), Some("id"));
    assert!(!cli.json);
    assert!(!cli.verbose);
}

#[test]
fn test_cli_all_tuning_options() {
    let cli = Cli::try_parse_from([
        "keydiff",
        "--old", "a.tsv",
        "--new", "b.tsv",
        "--key", "ref",
        "--delimiter", "tab",
        "--batch-size", "5000",
        "--channel-capacity", "64",
        "--flush-interval", "100",
        "--partitions", "8",
        "--memory-limit", "512MB",
        "--threads", "2",
        "--output-dir", "out",
        "--scratch-dir", "/tmp/scratch",
        "--duplicates", "reject",
        "--no-header",
        "--timeout", "30",
    ])
    .unwrap();

    let config = build_config(&cli).unwrap();
    assert_eq!(config.delimiter, '\t');
    assert_eq!(config.batch_size, 5000);
    assert_eq!(config.channel_capacity, 64);
    assert_eq!(config.flush_interval, 100);
    assert_eq!(config.query_partitions, 8);
    assert_eq!(config.memory_limit, "512MB");
    assert_eq!(config.threads, Some(2));
    assert_eq!(config.output_dir, PathBuf::from("out"));
    assert_eq!(config.scratch_dir, Some(PathBuf::from("/tmp/scratch")));
    assert_eq!(config.duplicate_policy, DuplicatePolicy::Reject);
    assert!(!config.write_header);
    assert_eq!(config.timeout_secs, Some(30));
}

#[test]
fn test_cli_rejects_zero_batch_size() {
    let result = Cli::try_parse_from(["keydiff", "--batch-size", "0"]);
    assert!(result.is_err());
}

#[test]
fn test_cli_rejects_multi_char_delimiter() {
    assert!(Cli::try_parse_from(["keydiff", "--delimiter", "::"]).is_err());
}

#[test]
fn test_cli_rejects_zero_timeout() {
    assert!(Cli::try_parse_from(["keydiff", "--timeout", "0"]).is_err());
}

#[test]
fn test_missing_inputs_reported_before_work() {
    let cli = Cli::try_parse_from(["keydiff", "--key", "id"]).unwrap();
    let err = build_config(&cli).unwrap_err();
    assert_eq!(err.category(), "usage");
    assert!(err.to_string().contains("--old"));
}

#[test]
fn test_invalid_memory_limit_is_usage_error() {
    let cli = Cli::try_parse_from([
        "keydiff", "--old", "a", "--new", "b", "--key", "id", "--memory-limit", "lots",
    ])
    .unwrap();
    assert_eq!(build_config(&cli).unwrap_err().exit_code(), 2);
}
