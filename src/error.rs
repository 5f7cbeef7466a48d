//! Error types for keydiff operations

use crate::quotes::malformed_quote;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, KeydiffError>;

/// Pipeline phase an error surfaced in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Load,
    Diff,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Load => write!(f, "load"),
            Phase::Diff => write!(f, "diff/write"),
        }
    }
}

#[derive(Error, Debug)]
pub enum KeydiffError {
    #[error("Usage error: {message}")]
    Usage { message: String },

    #[error("IO error ({context}): {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Schema error: {message}")]
    Schema { message: String },

    #[error("Parse error in '{}'{}: {message}", path.display(), line.map(|l| format!(" at line {}", l)).unwrap_or_default())]
    Parse {
        path: PathBuf,
        line: Option<u64>,
        message: String,
    },

    #[error("Store error ({context}): {source}")]
    Store {
        context: String,
        #[source]
        source: duckdb::Error,
    },

    #[error("Corrupt stored row: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Duplicate keys with conflicting rows in {dataset}: {conflicts} key(s), e.g. '{example}'")]
    DuplicateKey {
        dataset: String,
        conflicts: u64,
        example: String,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{phase} phase failed: {source}")]
    Phase {
        phase: Phase,
        #[source]
        source: Box<KeydiffError>,
    },
}

impl From<duckdb::Error> for KeydiffError {
    fn from(source: duckdb::Error) -> Self {
        Self::Store {
            context: "duckdb".to_string(),
            source,
        }
    }
}

impl KeydiffError {
    pub fn usage(msg: impl Into<String>) -> Self {
        Self::Usage {
            message: msg.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema {
            message: msg.into(),
        }
    }

    pub fn parse(path: &Path, line: Option<u64>, msg: impl Into<String>) -> Self {
        Self::Parse {
            path: path.to_path_buf(),
            line,
            message: msg.into(),
        }
    }

    pub fn store(context: impl Into<String>, source: duckdb::Error) -> Self {
        Self::Store {
            context: context.into(),
            source,
        }
    }

    /// Tag an error with the phase it surfaced in (idempotent)
    pub fn in_phase(self, phase: Phase) -> Self {
        match self {
            already @ Self::Phase { .. } => already,
            other => Self::Phase {
                phase,
                source: Box::new(other),
            },
        }
    }

    /// Classify a csv library error for the file being read
    pub fn from_csv(path: &Path, error: csv::Error) -> Self {
        let line = error.position().map(|p| p.line());
        match error.into_kind() {
            csv::ErrorKind::Io(e) => match malformed_quote(&e) {
                Some(quote) => Self::parse(path, Some(quote.line), quote.message.clone()),
                None => Self::io(format!("reading {}", path.display()), e),
            },
            csv::ErrorKind::UnequalLengths { expected_len, len, .. } => Self::parse(
                path,
                line,
                format!("expected {} fields, found {}", expected_len, len),
            ),
            csv::ErrorKind::Utf8 { err, .. } => {
                Self::parse(path, line, format!("invalid UTF-8: {}", err))
            }
            other => Self::parse(path, line, format!("{:?}", other)),
        }
    }

    /// Innermost error, skipping phase tags
    pub fn root(&self) -> &KeydiffError {
        match self {
            Self::Phase { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn phase(&self) -> Option<Phase> {
        match self {
            Self::Phase { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    /// Short category name used in CLI messages
    pub fn category(&self) -> &'static str {
        match self.root() {
            Self::Usage { .. } => "usage",
            Self::Io { .. } => "io",
            Self::Schema { .. } => "schema",
            Self::Parse { .. } => "parse",
            Self::Store { .. } | Self::Codec(_) => "store",
            Self::DuplicateKey { .. } => "duplicate-key",
            Self::Cancelled => "cancelled",
            Self::Phase { .. } => unreachable!("root() never returns a phase tag"),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), Self::Cancelled)
    }

    pub fn exit_code(&self) -> i32 {
        match self.root() {
            Self::Usage { .. } => 2,
            _ => 1,
        }
    }
}
