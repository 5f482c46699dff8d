pub mod config;
pub mod executor;
mod orchestrator;
pub mod task;
mod types;
pub mod worker;

pub use executor::{InProcessExecutor, SubprocessExecutor, TaskExecutor};
pub use orchestrator::{compute_affines, compute_affines_with, run_alignment, RunSummary};
pub use task::{JobLayer, JobOutput, Task, TaskArgs, TaskStatus};
pub use types::{NoOpReporter, ProgressReporter, RunStage};
pub use worker::{run_align_job, JobSnapshot};
