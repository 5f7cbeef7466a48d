//! # keydiff
//!
//! Out-of-core symmetric difference of two large delimited datasets by a
//! single key column. Both inputs are bulk-loaded into a run-scoped DuckDB
//! scratch store, then two anti-joins stream the added and removed rows to
//! their output files without holding either dataset in memory.

pub mod cancel;
pub mod cli;
pub mod commands;
pub mod config;
pub mod differ;
pub mod error;
pub mod loader;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod quotes;
pub mod record;
pub mod sink;
pub mod store;
pub mod workspace;

pub use cancel::CancellationToken;
pub use config::DiffConfig;
pub use error::{KeydiffError, Phase, Result};
pub use pipeline::{Pipeline, PipelineState, RunSummary};

/// Rows buffered before each bulk insert
pub const DEFAULT_BATCH_SIZE: usize = 100_000;

/// Rows queued between an anti-join query and its writer
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Rows written between output flushes
pub const DEFAULT_FLUSH_INTERVAL: usize = 1;

/// DuckDB memory cap for the scratch store
pub const DEFAULT_MEMORY_LIMIT: &str = "4GB";
