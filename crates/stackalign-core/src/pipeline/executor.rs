use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::compute::RegistrationBackend;
use crate::consts::MAX_WORKERS;
use crate::error::{AlignError, Result};

use super::config::IoMode;
use super::task::{JobOutput, Task, TaskArgs, TaskStatus};
use super::types::ProgressReporter;
use super::worker::{align_layers, parse_pipe_output, read_file_output, JobSnapshot};

/// Runs one alignment job to completion.
pub trait TaskExecutor: Send + Sync {
    fn name(&self) -> &str;
    fn execute(&self, args: &TaskArgs) -> Result<JobOutput>;
}

/// Runs jobs on the calling thread against a snapshot held in memory.
pub struct InProcessExecutor {
    snapshot: Arc<JobSnapshot>,
    backend: Arc<dyn RegistrationBackend>,
}

impl InProcessExecutor {
    pub fn new(snapshot: Arc<JobSnapshot>, backend: Arc<dyn RegistrationBackend>) -> Self {
        Self { snapshot, backend }
    }
}

impl TaskExecutor for InProcessExecutor {
    fn name(&self) -> &str {
        "in-process"
    }

    fn execute(&self, args: &TaskArgs) -> Result<JobOutput> {
        align_layers(&self.snapshot, args, self.backend.as_ref())
    }
}

/// Spawns `<program> align-job <args...>` per job.
pub struct SubprocessExecutor {
    program: PathBuf,
    destination: PathBuf,
}

impl SubprocessExecutor {
    pub fn new(program: PathBuf, destination: PathBuf) -> Self {
        Self {
            program,
            destination,
        }
    }
}

impl TaskExecutor for SubprocessExecutor {
    fn name(&self) -> &str {
        "subprocess"
    }

    fn execute(&self, args: &TaskArgs) -> Result<JobOutput> {
        let output = Command::new(&self.program)
            .arg("align-job")
            .args(args.to_args())
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .output()?;

        if !output.status.success() {
            return Err(AlignError::Task(format!(
                "worker for layer {} exited with {}",
                args.layer, output.status
            )));
        }
        match args.io {
            IoMode::Pipe => parse_pipe_output(&String::from_utf8_lossy(&output.stdout)),
            IoMode::File => read_file_output(&self.destination, args.level, args.layer),
        }
    }
}

/// Bounded pool size: physical cores, capped at 48, the caller's limit and
/// the number of jobs.
pub fn pool_size(max_workers: Option<usize>, n_tasks: usize) -> usize {
    num_cpus::get_physical()
        .min(MAX_WORKERS)
        .min(max_workers.unwrap_or(usize::MAX))
        .min(n_tasks)
        .max(1)
}

/// Run one job, turning errors and panics into `TaskError`.
pub fn run_task(executor: &dyn TaskExecutor, args: TaskArgs) -> Task {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| executor.execute(&args)));
    let status = match outcome {
        Ok(Ok(output)) => TaskStatus::Completed(output),
        Ok(Err(e)) => TaskStatus::TaskError(e.to_string()),
        Err(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "worker panicked".to_string());
            TaskStatus::TaskError(format!("panic: {msg}"))
        }
    };
    if let TaskStatus::TaskError(msg) = &status {
        warn!(layer = args.layer, error = %msg, "Alignment job failed");
    }
    Task { args, status }
}

/// Fan out every job on a dedicated pool and block until all finish.
/// Results come back in submission order regardless of completion order.
pub fn run_parallel(
    executor: &dyn TaskExecutor,
    jobs: Vec<TaskArgs>,
    workers: usize,
    reporter: &dyn ProgressReporter,
) -> Result<Vec<Task>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| AlignError::Task(format!("cannot build worker pool: {e}")))?;
    debug!(workers, jobs = jobs.len(), executor = executor.name(), "Dispatching jobs");

    let done = std::sync::atomic::AtomicUsize::new(0);
    let tasks = pool.install(|| {
        jobs.into_par_iter()
            .map(|args| {
                let task = run_task(executor, args);
                let n = done.fetch_add(1, std::sync::atomic::Ordering::Relaxed) + 1;
                reporter.advance(n);
                task
            })
            .collect()
    });
    Ok(tasks)
}

/// Run jobs one at a time in order. `keep_going` sees each finished task
/// and returns false to leave the remaining jobs queued.
pub fn run_serial(
    executor: &dyn TaskExecutor,
    jobs: Vec<TaskArgs>,
    reporter: &dyn ProgressReporter,
    mut keep_going: impl FnMut(&Task) -> bool,
) -> Vec<Task> {
    let mut tasks = Vec::with_capacity(jobs.len());
    let mut halted = false;
    for (i, args) in jobs.into_iter().enumerate() {
        if halted {
            tasks.push(Task::new(args));
            continue;
        }
        let task = run_task(executor, args);
        reporter.advance(i + 1);
        halted = !keep_going(&task);
        tasks.push(task);
    }
    tasks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::config::{AlignmentOption, ExecutionMode};
    use crate::pipeline::types::NoOpReporter;

    struct Flaky;

    impl TaskExecutor for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        fn execute(&self, args: &TaskArgs) -> Result<JobOutput> {
            match args.layer {
                2 => panic!("boom"),
                3 => Err(AlignError::Task("bad layer".into())),
                _ => Ok(JobOutput {
                    scale: "scale_1".into(),
                    layers: Vec::new(),
                }),
            }
        }
    }

    fn jobs(n: usize) -> Vec<TaskArgs> {
        (1..=n)
            .map(|layer| TaskArgs {
                snapshot: PathBuf::from("snap.json"),
                option: AlignmentOption::InitAffine,
                level: 1,
                mode: ExecutionMode::Parallel,
                layer,
                count: 1,
                io: IoMode::Pipe,
            })
            .collect()
    }

    #[test]
    fn test_failures_stay_local() {
        let tasks = run_parallel(&Flaky, jobs(4), 2, &NoOpReporter).unwrap();
        let indices: Vec<usize> = tasks.iter().map(Task::index).collect();
        assert_eq!(indices, vec![1, 2, 3, 4]);
        assert!(matches!(tasks[0].status, TaskStatus::Completed(_)));
        assert!(matches!(&tasks[1].status, TaskStatus::TaskError(m) if m.contains("boom")));
        assert!(matches!(tasks[2].status, TaskStatus::TaskError(_)));
        assert!(matches!(tasks[3].status, TaskStatus::Completed(_)));
    }

    #[test]
    fn test_serial_halt_leaves_rest_queued() {
        let tasks = run_serial(&Flaky, jobs(4), &NoOpReporter, |t| t.index() < 1);
        assert!(matches!(tasks[0].status, TaskStatus::Completed(_)));
        assert!(tasks[1..].iter().all(|t| t.status == TaskStatus::Queued));
    }

    #[test]
    fn test_pool_size_bounds() {
        assert_eq!(pool_size(None, 1), 1);
        assert_eq!(pool_size(Some(2), 100).min(2), pool_size(Some(2), 100));
        assert!(pool_size(None, 1000) <= MAX_WORKERS);
        assert!(pool_size(None, 1000) <= num_cpus::get_physical().max(1));
        assert_eq!(pool_size(Some(0), 10), 1);
    }
}
