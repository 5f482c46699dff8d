use std::fmt;

/// Orchestration stage, used for progress reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunStage {
    Snapshot,
    Aligning,
    Merging,
    Composing,
    Resampling,
    Diagnostics,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Snapshot => write!(f, "Writing project snapshot"),
            Self::Aligning => write!(f, "Aligning layers"),
            Self::Merging => write!(f, "Merging results"),
            Self::Composing => write!(f, "Composing cumulative affines"),
            Self::Resampling => write!(f, "Generating aligned images"),
            Self::Diagnostics => write!(f, "Writing diagnostics"),
        }
    }
}

/// Thread-safe progress reporting for an alignment run.
///
/// Implementors drive progress bars or log output. All methods default to
/// no-ops.
pub trait ProgressReporter: Send + Sync {
    /// A new stage has started. `total_items` is the number of work items
    /// in this stage (e.g., layer count), if known.
    fn begin_stage(&self, _stage: RunStage, _total_items: Option<usize>) {}

    /// One work item within the current stage has completed.
    fn advance(&self, _items_done: usize) {}

    /// The current stage is finished.
    fn finish_stage(&self) {}
}

/// Reporter that ignores every event.
pub struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}
