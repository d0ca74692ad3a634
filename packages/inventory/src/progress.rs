//! Progress reporting for harvest runs.
//!
//! The harvester advances the reporter exactly once per dataset task,
//! whether the task succeeded or failed.

use std::sync::atomic::{AtomicUsize, Ordering};

use indicatif::ProgressBar;

/// Receives harvest progress. All methods default to doing nothing.
pub trait ProgressReporter: Send + Sync {
    /// Harvest of `total` datasets is starting.
    fn start(&self, total: usize) {
        let _ = total;
    }

    /// One dataset task completed.
    fn advance(&self) {}

    /// All tasks joined.
    fn finish(&self) {}
}

/// Ignores all progress (library mode).
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {}

/// Monotonic counter of completed tasks, readable from other threads.
#[derive(Debug, Default)]
pub struct ProgressCounter {
    total: AtomicUsize,
    completed: AtomicUsize,
}

impl ProgressCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

impl ProgressReporter for ProgressCounter {
    fn start(&self, total: usize) {
        self.total.store(total, Ordering::SeqCst);
    }

    fn advance(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
}

impl ProgressReporter for ProgressBar {
    fn start(&self, total: usize) {
        self.set_length(total as u64);
        self.set_position(0);
    }

    fn advance(&self) {
        self.inc(1);
    }

    fn finish(&self) {
        self.finish_and_clear();
    }
}
