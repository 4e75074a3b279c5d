//! Pipeline states and progress values.

use std::fmt;
use std::sync::Mutex;

use longexpo_frame_model::StageProgress;
use serde::{Deserialize, Serialize};

/// Where a long-exposure run is.
///
/// Runs move strictly forward through `Extracting`, `Aligning`,
/// `Compositing` and `Done`. `Error` and `Cancelled` can end a run from any
/// non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// Sampling frames from the source.
    Extracting,
    /// Registering and resampling frames against the reference.
    Aligning,
    /// Folding aligned frames into the accumulator.
    Compositing,
    /// The composite image is available.
    Done,
    /// The run failed.
    Error,
    /// The run was cancelled; no result was published.
    Cancelled,
}

impl PipelineState {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineState::Extracting => "extracting",
            PipelineState::Aligning => "aligning",
            PipelineState::Compositing => "compositing",
            PipelineState::Done => "done",
            PipelineState::Error => "error",
            PipelineState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PipelineState::Done | PipelineState::Error | PipelineState::Cancelled
        )
    }

    fn ordinal(self) -> u8 {
        match self {
            PipelineState::Extracting => 0,
            PipelineState::Aligning => 1,
            PipelineState::Compositing => 2,
            PipelineState::Done => 3,
            PipelineState::Error | PipelineState::Cancelled => u8::MAX,
        }
    }

    /// Whether a run in `self` may move to `next`.
    pub fn can_transition_to(self, next: PipelineState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            PipelineState::Error | PipelineState::Cancelled => true,
            _ => next.ordinal() == self.ordinal() + 1,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A progress update for one pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PipelineProgress {
    pub state: PipelineState,
    /// Fraction of the current stage done, in `[0, 1]`.
    pub fraction: f64,
    /// Units finished in the current stage.
    pub completed: usize,
    /// Units in the current stage.
    pub total: usize,
}

impl PipelineProgress {
    pub fn new(state: PipelineState, stage: StageProgress) -> Self {
        Self {
            state,
            fraction: stage.fraction(),
            completed: stage.completed,
            total: stage.total,
        }
    }

    /// A stage boundary with no work done yet.
    pub fn started(state: PipelineState, total: usize) -> Self {
        Self::new(state, StageProgress::new(0, total))
    }

    /// A terminal update.
    pub fn finished(state: PipelineState) -> Self {
        Self {
            state,
            fraction: 1.0,
            completed: 0,
            total: 0,
        }
    }
}

/// Callback receiving pipeline progress, on any thread.
pub type PipelineProgressFn<'a> = &'a (dyn Fn(PipelineProgress) + Send + Sync);

/// Forwards progress updates and tracks the state they carry.
///
/// Every state change must be one [`PipelineState::can_transition_to`]
/// allows; debug builds assert it. Updates are forwarded under the lock, so
/// the callback sees them in the order they were emitted.
pub(crate) struct StateTracker<'a> {
    callback: PipelineProgressFn<'a>,
    current: Mutex<Option<PipelineState>>,
}

impl<'a> StateTracker<'a> {
    pub(crate) fn new(callback: PipelineProgressFn<'a>) -> Self {
        Self {
            callback,
            current: Mutex::new(None),
        }
    }

    pub(crate) fn emit(&self, update: PipelineProgress) {
        let mut current = self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if *current != Some(update.state) {
            if let Some(previous) = *current {
                debug_assert!(
                    previous.can_transition_to(update.state),
                    "illegal pipeline transition {previous} -> {}",
                    update.state
                );
            }
            tracing::debug!(state = %update.state, "Pipeline state changed");
            *current = Some(update.state);
        }
        (self.callback)(update);
    }

    pub(crate) fn state(&self) -> Option<PipelineState> {
        *self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions_only() {
        use PipelineState::*;
        assert!(Extracting.can_transition_to(Aligning));
        assert!(Aligning.can_transition_to(Compositing));
        assert!(Compositing.can_transition_to(Done));

        assert!(!Extracting.can_transition_to(Compositing));
        assert!(!Compositing.can_transition_to(Aligning));
        assert!(!Aligning.can_transition_to(Aligning));
    }

    #[test]
    fn test_error_and_cancel_reachable_from_active_states() {
        use PipelineState::*;
        for state in [Extracting, Aligning, Compositing] {
            assert!(state.can_transition_to(Error));
            assert!(state.can_transition_to(Cancelled));
        }
    }

    #[test]
    fn test_terminal_states_are_final() {
        use PipelineState::*;
        for state in [Done, Error, Cancelled] {
            assert!(state.is_terminal());
            assert!(!state.can_transition_to(Error));
            assert!(!state.can_transition_to(Extracting));
        }
    }

    #[test]
    fn test_tracker_follows_legal_run() {
        use PipelineState::*;
        let seen = Mutex::new(Vec::new());
        let record = |p: PipelineProgress| seen.lock().unwrap().push(p.state);
        let tracker = StateTracker::new(&record);
        assert_eq!(tracker.state(), None);

        tracker.emit(PipelineProgress::started(Aligning, 2));
        tracker.emit(PipelineProgress::new(Aligning, StageProgress::new(1, 2)));
        tracker.emit(PipelineProgress::started(Compositing, 2));
        tracker.emit(PipelineProgress::finished(Cancelled));

        assert_eq!(tracker.state(), Some(Cancelled));
        assert_eq!(
            seen.into_inner().unwrap(),
            vec![Aligning, Aligning, Compositing, Cancelled]
        );
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "illegal pipeline transition")]
    fn test_tracker_rejects_backward_transition() {
        let ignore = |_: PipelineProgress| {};
        let tracker = StateTracker::new(&ignore);
        tracker.emit(PipelineProgress::started(PipelineState::Compositing, 1));
        tracker.emit(PipelineProgress::started(PipelineState::Extracting, 1));
    }

    #[test]
    fn test_progress_from_stage() {
        let p = PipelineProgress::new(PipelineState::Aligning, StageProgress::new(1, 4));
        assert_eq!(p.completed, 1);
        assert!((p.fraction - 0.25).abs() < 1e-12);
        assert_eq!(serde_json::to_value(p.state).unwrap(), "aligning");
    }
}
