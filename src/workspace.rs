//! Per-run directory layout for outputs and scratch files

use crate::error::{KeydiffError, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// File name of the added rows inside a run directory
pub const ADDED_FILE: &str = "added.csv";
/// File name of the removed rows inside a run directory
pub const REMOVED_FILE: &str = "removed.csv";
/// File name of the run summary inside a run directory
pub const SUMMARY_FILE: &str = "summary.json";

/// Locations used by one diff run
#[derive(Debug, Clone)]
pub struct RunWorkspace {
    pub run_id: String,
    /// `<output_dir>/<run_id>`
    pub run_dir: PathBuf,
    /// Directory holding the scratch store
    pub scratch_dir: PathBuf,
}

impl RunWorkspace {
    /// Fresh identifier; distinct runs never share outputs or scratch files
    pub fn new_run_id() -> String {
        Uuid::new_v4().simple().to_string()
    }

    /// Lay out a run under `output_dir`, refusing to reuse an existing run directory
    pub fn new(output_dir: &Path, scratch_dir: &Path, run_id: &str) -> Result<Self> {
        let run_dir = output_dir.join(run_id);
        if run_dir.exists() {
            return Err(KeydiffError::io(
                format!("preparing run directory {}", run_dir.display()),
                std::io::Error::new(std::io::ErrorKind::AlreadyExists, "run directory already exists"),
            ));
        }

        Ok(Self {
            run_id: run_id.to_string(),
            run_dir,
            scratch_dir: scratch_dir.to_path_buf(),
        })
    }

    pub fn added_path(&self) -> PathBuf {
        self.run_dir.join(ADDED_FILE)
    }

    pub fn removed_path(&self) -> PathBuf {
        self.run_dir.join(REMOVED_FILE)
    }

    pub fn summary_path(&self) -> PathBuf {
        self.run_dir.join(SUMMARY_FILE)
    }

    /// Write `summary` as pretty JSON next to the outputs
    pub fn write_summary<T: Serialize>(&self, summary: &T) -> Result<PathBuf> {
        let path = self.summary_path();
        fs::create_dir_all(&self.run_dir)
            .map_err(|e| KeydiffError::io(format!("creating {}", self.run_dir.display()), e))?;
        let json = serde_json::to_string_pretty(summary)?;
        fs::write(&path, json)
            .map_err(|e| KeydiffError::io(format!("writing {}", path.display()), e))?;
        Ok(path)
    }
}
