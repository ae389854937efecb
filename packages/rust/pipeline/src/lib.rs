//! Staged concurrent enrichment pipeline.
//!
//! Turns a handful of auction URLs into thousands of independently fetched
//! lot records: discovery fans out to a bounded lot extraction pool, whose
//! output either persists directly (full flow) or feeds a second bounded
//! buy-now enrichment pool (refresh flow). Each pool is a fan-out/fan-in
//! over a shared task channel; aggregation is single-owner by construction —
//! only the pool's receive loop appends to the stage's lot collection.

pub mod controller;
mod enrich;
mod extract;

#[cfg(test)]
pub(crate) mod fake;

pub use controller::{Pipeline, PipelineOptions, RunSummary};
pub use enrich::enrich_buy_now;
pub use extract::extract_lots;

use controller::RunSummary as Summary;

/// Sizing for one worker pool stage.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Number of concurrent workers (available parallelism times the
    /// configured multiplier; never zero).
    pub worker_count: usize,
    /// Lots below this model year are filtered at extraction time.
    pub min_model_year: u16,
}

/// Progress callback for reporting per-unit pipeline status.
pub trait Progress: Send + Sync {
    /// Called when entering a new stage.
    fn stage(&self, name: &str);
    /// Called when a unit of work (auction batch or lot) completes.
    fn unit_done(&self, current: usize, total: usize);
    /// Called when the active flow completes.
    fn done(&self, summary: &Summary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl Progress for SilentProgress {
    fn stage(&self, _name: &str) {}
    fn unit_done(&self, _current: usize, _total: usize) {}
    fn done(&self, _summary: &Summary) {}
}
