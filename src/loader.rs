//! Bulk loading of a delimited file into a dataset table

use crate::cancel::CancellationToken;
use crate::error::{KeydiffError, Result};
use crate::quotes::QuoteValidator;
use crate::record::{RowRecord, StoredRow};
use crate::store::{DatasetRole, DatasetTable, ScratchStore};
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::{Duration, Instant};

/// What to do when one key carries several different rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Warn and keep every distinct row
    #[default]
    Keep,
    /// Fail the load
    Reject,
}

impl DuplicatePolicy {
    pub fn parse(s: &str) -> std::result::Result<Self, String> {
        match s.to_lowercase().as_str() {
            "keep" => Ok(Self::Keep),
            "reject" => Ok(Self::Reject),
            _ => Err(format!("Invalid duplicate policy: {}. Use 'keep' or 'reject'", s)),
        }
    }
}

/// Loader settings shared by both datasets
#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    pub delimiter: u8,
    pub batch_size: usize,
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            batch_size: crate::DEFAULT_BATCH_SIZE,
            duplicate_policy: DuplicatePolicy::Keep,
        }
    }
}

/// Outcome of loading one dataset
#[derive(Debug, Clone)]
pub struct LoadedDataset {
    pub table: DatasetTable,
    pub header: Vec<String>,
    pub key_index: usize,
    pub rows: u64,
    pub batches: u64,
    pub duplicate_conflicts: u64,
    pub duration: Duration,
}

/// Load `path` into a fresh table for `role`, keyed by the `key` column.
///
/// Checks `cancel` before every row so a sibling failure or caller cancel
/// stops the load at the next record.
pub fn load_dataset(
    store: &ScratchStore,
    role: DatasetRole,
    path: &Path,
    key: &str,
    options: LoadOptions,
    cancel: &CancellationToken,
    progress: Option<&ProgressBar>,
) -> Result<LoadedDataset> {
    let start = Instant::now();
    cancel.check()?;

    let file = File::open(path)
        .map_err(|e| KeydiffError::io(format!("opening {}", path.display()), e))?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(options.delimiter)
        .flexible(false)
        .from_reader(QuoteValidator::new(BufReader::new(file), options.delimiter));

    let header: Vec<String> = reader
        .headers()
        .map_err(|e| KeydiffError::from_csv(path, e))?
        .iter()
        .map(String::from)
        .collect();
    if header.is_empty() {
        return Err(KeydiffError::schema(format!(
            "{} has no header row",
            path.display()
        )));
    }
    let key_index = key_index(&header, key).ok_or_else(|| {
        KeydiffError::schema(format!(
            "key column '{}' not found in header of {} (columns: {})",
            key,
            path.display(),
            header.join(", ")
        ))
    })?;

    let table = store.create_table(role)?;
    let mut writer = store.writer(&table)?;
    let batch_size = options.batch_size.max(1);
    let mut batch: Vec<StoredRow> = Vec::with_capacity(batch_size.min(crate::DEFAULT_BATCH_SIZE));
    let mut record = csv::StringRecord::new();
    let mut rows: u64 = 0;
    let mut batches: u64 = 0;

    loop {
        cancel.check()?;
        let more = reader
            .read_record(&mut record)
            .map_err(|e| KeydiffError::from_csv(path, e))?;
        if !more {
            break;
        }

        let fields: Vec<String> = record.iter().map(String::from).collect();
        let row = match RowRecord::from_fields(fields, key_index) {
            Some(row) if !row.key.is_empty() => row,
            _ => {
                let line = record.position().map(|p| p.line());
                return Err(KeydiffError::parse(path, line, format!("empty value in key column '{}'", key)));
            }
        };
        batch.push(StoredRow::encode(&row)?);
        rows += 1;

        if batch.len() >= batch_size {
            writer.insert_batch(&batch)?;
            batch.clear();
            batches += 1;
            log::debug!("[{}] Progress: {} rows", role, rows);
            if let Some(pb) = progress {
                pb.set_position(rows);
            }
        }
    }

    // Partial final batch
    if !batch.is_empty() {
        writer.insert_batch(&batch)?;
        batches += 1;
    }
    if let Some(pb) = progress {
        pb.set_position(rows);
    }

    log::debug!("[{}] {} rows inserted in {} batches", role, writer.rows_written(), batches);
    let table = writer.finish(cancel)?;
    let distinct_rows = store.row_count(&table)?;
    let (duplicate_conflicts, example) = store.duplicate_conflicts(&table, cancel)?;
    if duplicate_conflicts > 0 {
        let example = example.unwrap_or_default();
        match options.duplicate_policy {
            DuplicatePolicy::Keep => log::warn!(
                "[{}] {} key(s) carry differing rows (e.g. '{}'); every distinct row is kept",
                role,
                duplicate_conflicts,
                example
            ),
            DuplicatePolicy::Reject => {
                return Err(KeydiffError::DuplicateKey {
                    dataset: path.display().to_string(),
                    conflicts: duplicate_conflicts,
                    example,
                })
            }
        }
    }

    let duration = start.elapsed();
    log::info!(
        "[{}] Loaded {} rows ({} distinct) from {} in {:?}",
        role,
        rows,
        distinct_rows,
        path.display(),
        duration
    );

    Ok(LoadedDataset {
        table,
        header,
        key_index,
        rows,
        batches,
        duplicate_conflicts,
        duration,
    })
}

/// Position of the key column, by exact (case-sensitive) name
pub fn key_index(header: &[String], key: &str) -> Option<usize> {
    header.iter().position(|h| h == key)
}
