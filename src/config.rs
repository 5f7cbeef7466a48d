//! Run configuration: defaults, JSON config file, validation

use crate::error::{KeydiffError, Result};
use crate::loader::{DuplicatePolicy, LoadOptions};
use crate::sink::SinkOptions;
use crate::store::{AntiJoinOptions, StoreSettings};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Everything a diff run needs.
///
/// Every field has a default so a JSON config file may set any subset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiffConfig {
    pub old: Option<PathBuf>,
    pub new: Option<PathBuf>,
    pub key: Option<String>,
    pub delimiter: char,
    pub batch_size: usize,
    pub channel_capacity: usize,
    pub flush_interval: usize,
    pub query_partitions: usize,
    pub memory_limit: String,
    pub threads: Option<usize>,
    pub output_dir: PathBuf,
    /// Defaults to the OS temp directory
    pub scratch_dir: Option<PathBuf>,
    pub duplicate_policy: DuplicatePolicy,
    pub write_header: bool,
    pub timeout_secs: Option<u64>,
    pub show_progress: bool,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            old: None,
            new: None,
            key: None,
            delimiter: ',',
            batch_size: crate::DEFAULT_BATCH_SIZE,
            channel_capacity: crate::DEFAULT_CHANNEL_CAPACITY,
            flush_interval: crate::DEFAULT_FLUSH_INTERVAL,
            query_partitions: 1,
            memory_limit: crate::DEFAULT_MEMORY_LIMIT.to_string(),
            threads: None,
            output_dir: PathBuf::from("output"),
            scratch_dir: None,
            duplicate_policy: DuplicatePolicy::Keep,
            write_header: true,
            timeout_secs: None,
            show_progress: false,
        }
    }
}

impl DiffConfig {
    pub fn new(old: impl Into<PathBuf>, new: impl Into<PathBuf>, key: impl Into<String>) -> Self {
        Self {
            old: Some(old.into()),
            new: Some(new.into()),
            key: Some(key.into()),
            ..Default::default()
        }
    }

    /// Load a JSON config file; unknown fields are rejected
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| KeydiffError::io(format!("reading config {}", path.display()), e))?;
        serde_json::from_str(&content).map_err(|e| {
            KeydiffError::usage(format!("invalid config file '{}': {}", path.display(), e))
        })
    }

    /// The three mandatory inputs, or a usage error naming the missing one
    pub fn inputs(&self) -> Result<(&Path, &Path, &str)> {
        let old = self
            .old
            .as_deref()
            .ok_or_else(|| KeydiffError::usage("missing '--old' parameter"))?;
        let new = self
            .new
            .as_deref()
            .ok_or_else(|| KeydiffError::usage("missing '--new' parameter"))?;
        let key = self
            .key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| KeydiffError::usage("missing '--key' parameter"))?;
        Ok((old, new, key))
    }

    /// Check every setting before any work starts
    pub fn validate(&self) -> Result<()> {
        self.inputs()?;
        validate_delimiter(self.delimiter).map_err(KeydiffError::usage)?;

        for (name, value) in [
            ("batch_size", self.batch_size),
            ("channel_capacity", self.channel_capacity),
            ("flush_interval", self.flush_interval),
            ("query_partitions", self.query_partitions),
        ] {
            if value == 0 {
                return Err(KeydiffError::usage(format!("{} must be greater than 0", name)));
            }
        }
        if self.threads == Some(0) {
            return Err(KeydiffError::usage("threads must be greater than 0"));
        }
        if self.timeout_secs == Some(0) {
            return Err(KeydiffError::usage("timeout must be greater than 0"));
        }
        validate_memory_limit(&self.memory_limit).map_err(KeydiffError::usage)?;

        Ok(())
    }

    /// Delimiter as the byte the csv reader/writer expect
    pub fn delimiter_byte(&self) -> u8 {
        // validate() guarantees ASCII
        self.delimiter as u8
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            delimiter: self.delimiter_byte(),
            batch_size: self.batch_size,
            duplicate_policy: self.duplicate_policy,
        }
    }

    pub fn anti_join_options(&self) -> AntiJoinOptions {
        AntiJoinOptions {
            channel_capacity: self.channel_capacity,
            partitions: self.query_partitions,
        }
    }

    pub fn sink_options(&self) -> SinkOptions {
        SinkOptions {
            delimiter: self.delimiter_byte(),
            flush_interval: self.flush_interval,
            write_header: self.write_header,
        }
    }

    pub fn store_settings(&self) -> StoreSettings {
        StoreSettings {
            memory_limit: self.memory_limit.clone(),
            threads: self.threads,
        }
    }
}

/// Accept a single ASCII character usable as a field separator
pub fn validate_delimiter(c: char) -> std::result::Result<(), String> {
    if !c.is_ascii() {
        return Err(format!("Delimiter must be a single ASCII character, got '{}'", c));
    }
    if matches!(c, '"' | '\n' | '\r') {
        return Err(format!("Delimiter cannot be {:?}", c));
    }
    Ok(())
}

/// Accept DuckDB size strings such as "4GB", "512 MiB" or "75%"
fn validate_memory_limit(limit: &str) -> std::result::Result<(), String> {
    let trimmed = limit.trim();
    let starts_with_digit = trimmed.chars().next().is_some_and(|c| c.is_ascii_digit());
    let allowed = trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '%' | ' '));
    if starts_with_digit && allowed {
        Ok(())
    } else {
        Err(format!("Invalid memory limit: '{}'", limit))
    }
}
