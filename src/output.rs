//! Output formatting utilities

use crate::error::Result;
use crate::pipeline::RunSummary;

/// Pretty printer for keydiff output
pub struct PrettyPrinter;

impl PrettyPrinter {
    /// Print the outcome of a diff run
    pub fn print_run_summary(summary: &RunSummary) {
        println!("🔍 Diff Results: {} → {}", summary.old.path.display(), summary.new.path.display());
        println!("├─ Run ID: {}", summary.run_id);
        println!("├─ Key: {}", summary.key);
        println!(
            "├─ Rows: {} old, {} new",
            summary.old.rows, summary.new.rows
        );

        let conflicts = summary.old.duplicate_conflicts + summary.new.duplicate_conflicts;
        if conflicts > 0 {
            println!("├─ ⚠️  Duplicate keys: {} old, {} new", summary.old.duplicate_conflicts, summary.new.duplicate_conflicts);
        }

        if summary.added == 0 && summary.removed == 0 {
            println!("├─ ✅ No differences");
        } else {
            println!("├─ ➕ Added: {}", summary.added);
            println!("├─ ➖ Removed: {}", summary.removed);
        }

        println!("├─ Outputs:");
        println!("│  ├─ {}", summary.added_path.display());
        println!("│  └─ {}", summary.removed_path.display());
        println!(
            "└─ Time: {} (load {}, diff {})",
            format_millis(summary.load_ms + summary.diff_ms),
            format_millis(summary.load_ms),
            format_millis(summary.diff_ms)
        );
    }
}

/// JSON formatter for keydiff output
pub struct JsonFormatter;

impl JsonFormatter {
    /// Format any serializable value as pretty JSON
    pub fn format<T: serde::Serialize>(data: &T) -> Result<String> {
        Ok(serde_json::to_string_pretty(data)?)
    }

    pub fn format_summary(summary: &RunSummary) -> Result<String> {
        Self::format(summary)
    }
}

/// Format a millisecond duration in human-readable form
fn format_millis(ms: u64) -> String {
    if ms < 1_000 {
        format!("{} ms", ms)
    } else if ms < 60_000 {
        format!("{:.1} s", ms as f64 / 1_000.0)
    } else {
        format!("{}m {:02}s", ms / 60_000, (ms % 60_000) / 1_000)
    }
}
