//! Status views - キューと flush の集計
//!
//! どちらもシリアライズ可能で、CLI からそのまま JSON で出力できる。

use serde::{Deserialize, Serialize};

/// Point-in-time view of one queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: usize,
    /// Live records left in the generation being flushed.
    pub in_flight: usize,
    /// Owners with at least one entry in the owner index.
    pub indexed_owners: usize,
    pub flushing: bool,
}

/// What one `flush` call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlushStats {
    /// Completed passes.
    pub generations: usize,
    pub invoked: usize,
    /// Cancelled in flight, or the method could not be resolved.
    pub skipped: usize,
    /// Failures reported to the error handler.
    pub isolated_failures: usize,
}
