//! Run orchestration: load both datasets, then diff and write both results
//!
//! ```text
//! Init -> Loading -> Loaded -> Diffing -> Done
//!            \                    \
//!             +-------> Failed <---+
//! ```
//!
//! Each phase is a fan-out of two tasks joined by a barrier. A task that
//! fails cancels its sibling through the phase's child token; the caller's
//! token cancels everything. A deadline cancels the run's own token and
//! leaves the caller's untouched.

use crate::cancel::{CancellationToken, Watchdog};
use crate::config::DiffConfig;
use crate::differ::{compute_diff, DiffStreams};
use crate::error::{Phase, Result};
use crate::loader::{load_dataset, LoadedDataset};
use crate::progress::{finish_bar, ProgressReporter};
use crate::sink::drain;
use crate::store::{AntiJoinStream, DatasetRole, ScratchStore};
use crate::workspace::RunWorkspace;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Current format version of `summary.json`
pub const SUMMARY_FORMAT_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    Init,
    Loading,
    Loaded,
    Diffing,
    Done,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Per-dataset part of the run summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub path: PathBuf,
    pub rows: u64,
    pub duplicate_conflicts: u64,
    pub load_ms: u64,
}

/// What a successful run produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub format_version: String,
    pub run_id: String,
    pub key: String,
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    pub old: DatasetSummary,
    pub new: DatasetSummary,
    pub added: u64,
    pub removed: u64,
    pub added_path: PathBuf,
    pub removed_path: PathBuf,
    pub load_ms: u64,
    pub diff_ms: u64,
}

/// One diff run over a validated configuration
pub struct Pipeline {
    config: DiffConfig,
    run_id: String,
    state: Mutex<PipelineState>,
}

impl Pipeline {
    pub fn new(config: DiffConfig) -> Self {
        Self::with_run_id(config, RunWorkspace::new_run_id())
    }

    pub fn with_run_id(config: DiffConfig, run_id: impl Into<String>) -> Self {
        Self {
            config,
            run_id: run_id.into(),
            state: Mutex::new(PipelineState::Init),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn state(&self) -> PipelineState {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn transition(&self, to: PipelineState) {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        log::debug!("[{}] {} -> {}", self.run_id, *state, to);
        *state = to;
    }

    /// Run both phases. The scratch store is removed before this returns,
    /// on success and on every failure path.
    pub fn run(&self, cancel: &CancellationToken) -> Result<RunSummary> {
        // Usage errors surface before any side effect
        self.config.validate()?;
        let (old_path, new_path, key) = self.config.inputs()?;

        let (run_cancel, _deadline) = run_token(cancel, self.config.timeout());
        let started = Utc::now();
        log::info!("Starting diff with ID {}", self.run_id);

        let mut progress = ProgressReporter::for_config(self.config.show_progress);
        self.transition(PipelineState::Loading);
        let result = self.run_phases(old_path, new_path, key, started, &run_cancel, &mut progress);

        match result {
            Ok(summary) => {
                self.transition(PipelineState::Done);
                log::info!(
                    "[{}] Done: {} added, {} removed (load {} ms, diff {} ms)",
                    self.run_id,
                    summary.added,
                    summary.removed,
                    summary.load_ms,
                    summary.diff_ms
                );
                Ok(summary)
            }
            Err(e) => {
                self.transition(PipelineState::Failed);
                log::debug!("[{}] Failed: {}", self.run_id, e);
                Err(e)
            }
        }
    }

    fn run_phases(
        &self,
        old_path: &Path,
        new_path: &Path,
        key: &str,
        started: DateTime<Utc>,
        cancel: &CancellationToken,
        progress: &mut ProgressReporter,
    ) -> Result<RunSummary> {
        let workspace = RunWorkspace::new(&self.config.output_dir, &self.config.scratch_dir(), &self.run_id)
            .map_err(|e| e.in_phase(Phase::Load))?;
        // Dropped at the end of this function, after every stream below
        let store = ScratchStore::create(&workspace.scratch_dir, &self.run_id, &self.config.store_settings())
            .map_err(|e| e.in_phase(Phase::Load))?;

        let load_start = Instant::now();
        let (old, new) = self
            .load_phase(&store, old_path, new_path, key, cancel, progress)
            .map_err(|e| e.in_phase(Phase::Load))?;
        let load_elapsed = load_start.elapsed();
        self.transition(PipelineState::Loaded);
        log::info!("[{}] Load Duration: {:?}", self.run_id, load_elapsed);

        self.transition(PipelineState::Diffing);
        let diff_start = Instant::now();
        let (added, removed) = self
            .diff_phase(&store, &workspace, &old, &new, cancel, progress)
            .map_err(|e| e.in_phase(Phase::Diff))?;
        let diff_elapsed = diff_start.elapsed();
        log::info!("[{}] Diff Duration: {:?}", self.run_id, diff_elapsed);

        let summary = RunSummary {
            format_version: SUMMARY_FORMAT_VERSION.to_string(),
            run_id: self.run_id.clone(),
            key: key.to_string(),
            started,
            finished: Utc::now(),
            old: dataset_summary(old_path, &old),
            new: dataset_summary(new_path, &new),
            added,
            removed,
            added_path: workspace.added_path(),
            removed_path: workspace.removed_path(),
            load_ms: millis(load_elapsed),
            diff_ms: millis(diff_elapsed),
        };
        workspace
            .write_summary(&summary)
            .map_err(|e| e.in_phase(Phase::Diff))?;

        Ok(summary)
    }

    /// Barrier 1: both datasets fully loaded, or the first error
    fn load_phase(
        &self,
        store: &ScratchStore,
        old_path: &Path,
        new_path: &Path,
        key: &str,
        cancel: &CancellationToken,
        progress: &mut ProgressReporter,
    ) -> Result<(LoadedDataset, LoadedDataset)> {
        let group = cancel.child();
        let options = self.config.load_options();
        let old_pb = progress.load_bar(DatasetRole::Old);
        let new_pb = progress.load_bar(DatasetRole::New);

        let load = |role: DatasetRole, path: &Path, pb: Option<&indicatif::ProgressBar>| {
            let result = load_dataset(store, role, path, key, options, &group, pb);
            match &result {
                Ok(loaded) => finish_bar(pb, format!("✅ Loaded {} rows ({})", loaded.rows, role)),
                Err(_) => group.cancel(),
            }
            result
        };

        let (old, new) = rayon::join(
            || load(DatasetRole::Old, old_path, old_pb.as_ref()),
            || load(DatasetRole::New, new_path, new_pb.as_ref()),
        );
        first_error(old, new)
    }

    /// Barrier 2: both result sets written, or the first error
    fn diff_phase(
        &self,
        store: &ScratchStore,
        workspace: &RunWorkspace,
        old: &LoadedDataset,
        new: &LoadedDataset,
        cancel: &CancellationToken,
        progress: &mut ProgressReporter,
    ) -> Result<(u64, u64)> {
        let group = cancel.child();
        let DiffStreams { added, removed } =
            compute_diff(store, &old.table, &new.table, self.config.anti_join_options(), &group)?;

        let options = self.config.sink_options();
        let added_pb = progress.write_bar("added");
        let removed_pb = progress.write_bar("removed");
        let added_path = workspace.added_path();
        let removed_path = workspace.removed_path();

        let write = |stream: AntiJoinStream, path: &Path, header: &[String], pb: Option<&indicatif::ProgressBar>| {
            let label = stream.label().to_string();
            let result = drain(stream, path, Some(header), options, &group, pb);
            match &result {
                Ok(count) => finish_bar(pb, format!("✅ Wrote {} rows ({})", count, label)),
                Err(_) => group.cancel(),
            }
            result
        };

        // Added rows come from new, removed rows from old
        let (added, removed) = rayon::join(
            || write(added, added_path.as_path(), new.header.as_slice(), added_pb.as_ref()),
            || write(removed, removed_path.as_path(), old.header.as_slice(), removed_pb.as_ref()),
        );
        first_error(added, removed)
    }
}

/// Token for one run. It follows `cancel` and, when `timeout` is set, also
/// fires on its own once the returned watchdog's deadline passes.
fn run_token(cancel: &CancellationToken, timeout: Option<Duration>) -> (CancellationToken, Option<Watchdog>) {
    let run = cancel.child();
    let deadline = timeout.map(|t| run.cancel_after(t));
    (run, deadline)
}

/// Combine sibling results, preferring a primary failure over the
/// cancellation it caused in the other task.
fn first_error<A, B>(a: Result<A>, b: Result<B>) -> Result<(A, B)> {
    match (a, b) {
        (Ok(a), Ok(b)) => Ok((a, b)),
        (Err(ea), Err(eb)) => {
            if ea.is_cancelled() && !eb.is_cancelled() {
                Err(eb)
            } else {
                Err(ea)
            }
        }
        (Err(e), _) | (_, Err(e)) => Err(e),
    }
}

fn dataset_summary(path: &Path, loaded: &LoadedDataset) -> DatasetSummary {
    DatasetSummary {
        path: path.to_path_buf(),
        rows: loaded.rows,
        duplicate_conflicts: loaded.duplicate_conflicts,
        load_ms: millis(loaded.duration),
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
