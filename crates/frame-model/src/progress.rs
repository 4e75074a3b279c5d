//! Progress reporting primitives.
//!
//! Progress callbacks run on whichever thread finished the unit of work.
//! Callers that drive a UI must marshal the value to their own thread.

use std::sync::Mutex;

/// Progress through one stage of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageProgress {
    /// Units of work finished so far.
    pub completed: usize,
    /// Units of work in the stage.
    pub total: usize,
}

impl StageProgress {
    pub fn new(completed: usize, total: usize) -> Self {
        Self { completed, total }
    }

    /// `completed / total`, clamped to `[0, 1]`. An empty stage is complete.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        (self.completed as f64 / self.total as f64).clamp(0.0, 1.0)
    }

    pub fn is_complete(&self) -> bool {
        self.completed >= self.total
    }
}

/// Callback invoked after each unit of work.
pub type ProgressFn<'a> = &'a (dyn Fn(StageProgress) + Send + Sync);

/// A callback that ignores every update.
pub fn ignore_progress(_: StageProgress) {}

/// Counts finished units and forwards strictly increasing updates.
///
/// Safe to share between worker threads: the counter is bumped and the
/// callback invoked under one lock, so observers never see a value go
/// backwards even when units finish concurrently.
pub struct ProgressCounter<'a> {
    total: usize,
    completed: Mutex<usize>,
    callback: ProgressFn<'a>,
}

impl<'a> ProgressCounter<'a> {
    pub fn new(total: usize, callback: ProgressFn<'a>) -> Self {
        Self {
            total,
            completed: Mutex::new(0),
            callback,
        }
    }

    /// Record one finished unit and notify the callback.
    pub fn advance(&self) -> StageProgress {
        let mut completed = self
            .completed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *completed = (*completed + 1).min(self.total);
        let progress = StageProgress::new(*completed, self.total);
        (self.callback)(progress);
        progress
    }

    /// Units finished so far.
    pub fn completed(&self) -> usize {
        *self
            .completed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn total(&self) -> usize {
        self.total
    }
}
