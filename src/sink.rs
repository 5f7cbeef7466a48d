//! Draining a row sequence into a delimited output file

use crate::cancel::CancellationToken;
use crate::error::{KeydiffError, Result};
use crate::record::RowRecord;
use indicatif::ProgressBar;
use std::fs;
use std::path::Path;

/// Output formatting for a sink
#[derive(Debug, Clone, Copy)]
pub struct SinkOptions {
    pub delimiter: u8,
    /// Rows written between flushes; 1 flushes after every row
    pub flush_interval: usize,
    pub write_header: bool,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            flush_interval: crate::DEFAULT_FLUSH_INTERVAL,
            write_header: true,
        }
    }
}

/// Write every row of `rows` to `destination`, returning the row count.
///
/// The file (and its parent directory) is created, truncating any previous
/// content. An error item from the sequence aborts the drain with that error.
pub fn drain<I>(
    rows: I,
    destination: &Path,
    header: Option<&[String]>,
    options: SinkOptions,
    cancel: &CancellationToken,
    progress: Option<&ProgressBar>,
) -> Result<u64>
where
    I: IntoIterator<Item = Result<RowRecord>>,
{
    cancel.check()?;
    let io_context = || format!("writing {}", destination.display());

    if let Some(parent) = destination.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|e| KeydiffError::io(format!("creating {}", parent.display()), e))?;
        }
    }

    let mut writer = csv::WriterBuilder::new()
        .delimiter(options.delimiter)
        .from_path(destination)
        .map_err(|e| KeydiffError::from_csv(destination, e))?;

    if let (true, Some(header)) = (options.write_header, header) {
        writer
            .write_record(header)
            .map_err(|e| KeydiffError::from_csv(destination, e))?;
        writer.flush().map_err(|e| KeydiffError::io(io_context(), e))?;
    }

    let flush_interval = options.flush_interval.max(1);
    let mut written: u64 = 0;
    let mut pending = 0usize;

    for item in rows {
        cancel.check()?;
        let record = item?;
        writer
            .write_record(&record.fields)
            .map_err(|e| KeydiffError::from_csv(destination, e))?;
        written += 1;
        pending += 1;

        if pending >= flush_interval {
            writer.flush().map_err(|e| KeydiffError::io(io_context(), e))?;
            pending = 0;
            if let Some(pb) = progress {
                pb.set_position(written);
            }
        }
    }

    writer.flush().map_err(|e| KeydiffError::io(io_context(), e))?;
    if let Some(pb) = progress {
        pb.set_position(written);
    }

    log::debug!("Wrote {} rows to {}", written, destination.display());
    Ok(written)
}
