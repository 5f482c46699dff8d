use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::project::Layer;

use super::config::{AlignmentOption, ExecutionMode, IoMode};

/// Everything a worker needs to recompute one or more layers. The same
/// fields travel as positional arguments to the `align-job` entry point.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskArgs {
    pub snapshot: PathBuf,
    pub option: AlignmentOption,
    pub level: u32,
    pub mode: ExecutionMode,
    /// First layer index to compute.
    pub layer: usize,
    /// Number of consecutive layers to compute.
    pub count: usize,
    pub io: IoMode,
}

impl TaskArgs {
    /// Positional arguments in the order `align-job` expects them.
    pub fn to_args(&self) -> Vec<String> {
        vec![
            self.snapshot.display().to_string(),
            self.option.to_string(),
            self.level.to_string(),
            self.mode.to_string(),
            self.layer.to_string(),
            self.count.to_string(),
            self.io.to_string(),
        ]
    }
}

/// Lifecycle of one job.
#[derive(Clone, Debug, PartialEq)]
pub enum TaskStatus {
    Queued,
    Completed(JobOutput),
    TaskError(String),
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Completed(_) => write!(f, "completed"),
            Self::TaskError(msg) => write!(f, "task_error: {msg}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Task {
    pub args: TaskArgs,
    pub status: TaskStatus,
}

impl Task {
    pub fn new(args: TaskArgs) -> Self {
        Self {
            args,
            status: TaskStatus::Queued,
        }
    }

    pub fn index(&self) -> usize {
        self.args.layer
    }
}

/// Partial document a worker hands back: only the recomputed layers,
/// each tagged with its index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobOutput {
    pub scale: String,
    pub layers: Vec<JobLayer>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobLayer {
    pub index: usize,
    pub layer: Layer,
}
