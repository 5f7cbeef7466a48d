//! Progress reporting utilities

use crate::store::DatasetRole;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress reporter for one diff run.
///
/// Bars are created lazily per task and all render through one
/// `MultiProgress` so concurrent loaders/writers do not fight over the terminal.
#[derive(Debug)]
pub struct ProgressReporter {
    multi: Option<MultiProgress>,
    bars: Vec<ProgressBar>,
}

impl ProgressReporter {
    /// Create progress reporter that draws to the terminal
    pub fn new() -> Self {
        Self {
            multi: Some(MultiProgress::new()),
            bars: Vec::new(),
        }
    }

    /// Create minimal progress reporter (no progress bars)
    pub fn new_minimal() -> Self {
        Self {
            multi: None,
            bars: Vec::new(),
        }
    }

    pub fn for_config(show_progress: bool) -> Self {
        if show_progress {
            Self::new()
        } else {
            Self::new_minimal()
        }
    }

    /// Row counter for a loader
    pub fn load_bar(&mut self, role: DatasetRole) -> Option<ProgressBar> {
        self.add(format!("Loading {} dataset", role))
    }

    /// Row counter for a writer
    pub fn write_bar(&mut self, label: &str) -> Option<ProgressBar> {
        self.add(format!("Writing {} rows", label))
    }

    fn add(&mut self, message: String) -> Option<ProgressBar> {
        let multi = self.multi.as_ref()?;
        let pb = multi.add(create_row_counter(&message));
        self.bars.push(pb.clone());
        Some(pb)
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new_minimal()
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        // Bars abandoned by a failed task are cleared; finished ones stay
        for pb in self.bars.drain(..) {
            if !pb.is_finished() {
                pb.finish_and_clear();
            }
        }
    }
}

/// Finish a task's bar with a summary line
pub fn finish_bar(pb: Option<&ProgressBar>, message: String) {
    if let Some(pb) = pb {
        pb.finish_with_message(message);
    }
}

/// Create a spinner that also shows a running row count
fn create_row_counter(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
        .template("{spinner:.green} [{elapsed_precise}] {pos:>10} rows ({per_sec}) {msg}")
    {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
