//! The two anti-joins that make up a key diff

use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::store::{AntiJoinOptions, AntiJoinStream, DatasetTable, ScratchStore};

/// Lazy result sequences of one diff
pub struct DiffStreams {
    /// Rows of new whose key is absent from old
    pub added: AntiJoinStream,
    /// Rows of old whose key is absent from new
    pub removed: AntiJoinStream,
}

/// Issue both anti-joins without waiting for either.
///
/// Both tables must be fully loaded; each stream is driven by its consumer.
pub fn compute_diff(
    store: &ScratchStore,
    old: &DatasetTable,
    new: &DatasetTable,
    options: AntiJoinOptions,
    cancel: &CancellationToken,
) -> Result<DiffStreams> {
    let added = store.anti_join(new, old, options, cancel)?;
    // If this fails, dropping `added` stops its producer
    let removed = store.anti_join(old, new, options, cancel)?;

    Ok(DiffStreams { added, removed })
}
