//! Progress reporting for feed downloads.
//!
//! Fetchers report through [`ProgressCallback`] so they stay independent
//! of how (or whether) progress is rendered. The CLI supplies an
//! `indicatif` implementation; tests and library callers use
//! [`null_progress`].

use std::sync::Arc;

/// Receives progress updates from a fetcher.
pub trait ProgressCallback: Send + Sync {
    /// Total number of requests (or rows) expected.
    fn set_total(&self, total: u64);

    /// Absolute position.
    fn set_position(&self, pos: u64);

    fn inc(&self, delta: u64);

    fn set_message(&self, msg: String);

    /// Completes the indicator, leaving `msg` visible.
    fn finish(&self, msg: String);

    fn finish_and_clear(&self);
}

/// Discards every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn set_position(&self, _pos: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
    fn finish_and_clear(&self) {}
}

#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
