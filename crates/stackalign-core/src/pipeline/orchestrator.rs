use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use tracing::{info, warn};

use crate::compute::RegistrationBackend;
use crate::consts::SNAPSHOT_FILE_NAME;
use crate::error::{AlignError, Result};
use crate::frame::Rect;
use crate::process::save_aligned;
use crate::project::{Project, Stack};
use crate::stack::{bounding_rect, save_bias_analysis, set_stack_cafm};

use super::config::{ExecutionMode, ExecutorKind, RunConfig};
use super::executor::{
    pool_size, run_parallel, run_serial, InProcessExecutor, SubprocessExecutor, TaskExecutor,
};
use super::task::{Task, TaskArgs, TaskStatus};
use super::types::{ProgressReporter, RunStage};
use super::worker::JobSnapshot;

/// What one orchestration run did.
#[derive(Clone, Debug, Default)]
pub struct RunSummary {
    pub level: u32,
    pub layers: usize,
    /// Layers whose pairwise affine was recomputed.
    pub aligned: Vec<usize>,
    /// Layers whose job failed, with the reason.
    pub failed: Vec<(usize, String)>,
    /// Layers flagged `snr_skip` for the next pass.
    pub snr_skipped: Vec<usize>,
    /// Layer at which the SNR halt threshold stopped the run.
    pub halted_at: Option<usize>,
    /// Layers composed with an identity substitute.
    pub substituted: Vec<usize>,
    /// Layers marked skip because their transform was not invertible.
    pub degenerate: Vec<usize>,
    pub bounding_rect: Option<Rect>,
    pub images_written: usize,
    pub elapsed_secs: f64,
}

/// Load the project, align it, and write it back.
pub fn run_alignment(
    config: &RunConfig,
    backend: Arc<dyn RegistrationBackend>,
    reporter: &dyn ProgressReporter,
) -> Result<RunSummary> {
    let mut project = Project::load(&config.project)?;
    let summary = compute_affines(&mut project, config, backend, reporter)?;
    project.save(&config.project)?;
    Ok(summary)
}

/// Align one resolution level of `project` with the executor `config`
/// asks for.
pub fn compute_affines(
    project: &mut Project,
    config: &RunConfig,
    backend: Arc<dyn RegistrationBackend>,
    reporter: &dyn ProgressReporter,
) -> Result<RunSummary> {
    let level = match config.scale {
        Some(level) => level,
        None => project.current_level()?,
    };
    prepare(project, level, config.snr.apply_skip)?;

    reporter.begin_stage(RunStage::Snapshot, None);
    let snapshot = Arc::new(JobSnapshot {
        project: project.clone(),
        recipe: config.recipe.clone(),
    });
    let snapshot_path = project.data.destination_path.join(SNAPSHOT_FILE_NAME);
    snapshot.save(&snapshot_path)?;
    reporter.finish_stage();

    let executor: Box<dyn TaskExecutor> = match config.execution.executor {
        ExecutorKind::InProcess => Box::new(InProcessExecutor::new(snapshot, backend)),
        ExecutorKind::Subprocess => {
            let program = match &config.execution.worker_program {
                Some(p) => p.clone(),
                None => std::env::current_exe()?,
            };
            Box::new(SubprocessExecutor::new(
                program,
                project.data.destination_path.clone(),
            ))
        }
    };

    compute_affines_with(project, config, level, executor.as_ref(), reporter)
}

/// Relink references and give reference-less layers an identity result.
/// With `apply_skip`, layers flagged `snr_skip` by an earlier pass become
/// skipped layers first.
fn prepare(project: &mut Project, level: u32, apply_skip: bool) -> Result<()> {
    let stack = project.stack_mut(level)?;
    if stack.is_empty() {
        return Err(AlignError::EmptyStack);
    }
    if apply_skip {
        for (i, layer) in stack.alignment_stack.iter_mut().enumerate() {
            if layer.snr_skip {
                info!(layer = i, base = %layer.base_path().display(), "Skipping low SNR layer");
                layer.skip = true;
                layer.snr_skip = false;
            }
        }
    }
    stack.link_references();
    for layer in stack.alignment_stack.iter_mut() {
        if layer.ref_path().is_none() && !layer.skip {
            layer.set_identity();
        }
    }
    Ok(())
}

/// Fan out, merge, compose, resample and write diagnostics using
/// `executor` for the pairwise jobs. The snapshot named in the job
/// arguments must already exist.
pub fn compute_affines_with(
    project: &mut Project,
    config: &RunConfig,
    level: u32,
    executor: &dyn TaskExecutor,
    reporter: &dyn ProgressReporter,
) -> Result<RunSummary> {
    let started = Instant::now();
    let snapshot_path = project.data.destination_path.join(SNAPSHOT_FILE_NAME);
    let scale_dir = project.scale_dir(level);
    let stack = project.stack_mut(level)?;
    let n = stack.len();
    let end = config.end.unwrap_or(n).min(n);

    let jobs: Vec<TaskArgs> = (config.start..end)
        .filter(|&i| {
            let layer = &stack.alignment_stack[i];
            !layer.skip && layer.ref_path().is_some()
        })
        .map(|layer| TaskArgs {
            snapshot: snapshot_path.clone(),
            option: config.alignment_option,
            level,
            mode: config.execution.mode,
            layer,
            count: 1,
            io: config.execution.io_mode,
        })
        .collect();

    let workers = pool_size(config.execution.max_workers, jobs.len());
    info!(
        level,
        layers = n,
        jobs = jobs.len(),
        workers,
        mode = %config.execution.mode,
        executor = executor.name(),
        option = %config.alignment_option,
        "Computing affines"
    );

    reporter.begin_stage(RunStage::Aligning, Some(jobs.len()));
    let tasks = match config.execution.mode {
        ExecutionMode::Parallel => run_parallel(executor, jobs, workers, reporter)?,
        ExecutionMode::Serial => {
            let halt = config.snr.halt;
            run_serial(executor, jobs, reporter, |task| match (&task.status, halt) {
                (TaskStatus::Completed(out), Some(h)) => {
                    out.layers.iter().all(|l| l.layer.mean_snr().map_or(true, |snr| snr > h))
                }
                _ => true,
            })
        }
    };
    reporter.finish_stage();

    let mut summary = RunSummary {
        level,
        layers: n,
        ..RunSummary::default()
    };

    reporter.begin_stage(RunStage::Merging, Some(tasks.len()));
    merge(stack, tasks, config, &mut summary);
    reporter.finish_stage();

    reporter.begin_stage(RunStage::Composing, None);
    let null_biases = config.null_biases.unwrap_or(stack.null_cafm_trends);
    let report = set_stack_cafm(stack, null_biases)?;
    summary.substituted = report.substituted;
    summary.degenerate = report.degenerate;
    let rect = if stack.use_bounding_rect {
        match stack
            .image_size()
            .and_then(|size| bounding_rect(stack, size))
        {
            Ok(rect) => Some(rect),
            Err(e) => {
                warn!(error = %e, "Cannot compute bounding rectangle, using image extent");
                None
            }
        }
    } else {
        None
    };
    summary.bounding_rect = rect;
    reporter.finish_stage();

    if config.generate_images {
        let out_dir = scale_dir.join("img_aligned");
        let indices: Vec<usize> = (0..n).filter(|&i| !stack.alignment_stack[i].skip).collect();
        reporter.begin_stage(RunStage::Resampling, Some(indices.len()));
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(pool_size(config.execution.max_workers, indices.len()))
            .build()
            .map_err(|e| AlignError::Task(format!("cannot build resample pool: {e}")))?;

        let border = config.border;
        let written: Vec<bool> = pool.install(|| {
            stack
                .alignment_stack
                .par_iter_mut()
                .enumerate()
                .filter(|(_, layer)| !layer.skip)
                .map(|(i, layer)| match save_aligned(layer, i, &out_dir, rect, border) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(layer = i, error = %e, "Resampling failed");
                        layer.images.aligned = None;
                        false
                    }
                })
                .collect()
        });
        summary.images_written = written.iter().filter(|w| **w).count();
        reporter.finish_stage();
    }

    reporter.begin_stage(RunStage::Diagnostics, None);
    save_bias_analysis(stack, &scale_dir.join("bias_data"), rect)?;
    reporter.finish_stage();

    summary.elapsed_secs = started.elapsed().as_secs_f64();
    info!(
        aligned = summary.aligned.len(),
        failed = summary.failed.len(),
        elapsed_secs = summary.elapsed_secs,
        "Alignment run complete"
    );
    Ok(summary)
}

/// Merge job results into the stack by the index each result carries.
/// Failures become skipped identity layers. The SNR policy is applied in
/// layer order; a halting layer stops the merge.
fn merge(stack: &mut Stack, mut tasks: Vec<Task>, config: &RunConfig, summary: &mut RunSummary) {
    tasks.sort_by_key(Task::index);
    'tasks: for task in tasks {
        let index = task.index();
        match task.status {
            TaskStatus::Queued => {}
            TaskStatus::TaskError(msg) => {
                if let Some(layer) = stack.alignment_stack.get_mut(index) {
                    warn!(
                        layer = index,
                        reference = %layer.ref_path().map(|p| p.display().to_string()).unwrap_or_default(),
                        base = %layer.base_path().display(),
                        error = %msg,
                        "Layer failed, marking skip"
                    );
                    layer.skip = true;
                    layer.set_identity();
                }
                summary.failed.push((index, msg));
            }
            TaskStatus::Completed(output) => {
                for job_layer in output.layers {
                    let index = job_layer.index;
                    let Some(slot) = stack.alignment_stack.get_mut(index) else {
                        warn!(layer = index, "Result for unknown layer ignored");
                        continue;
                    };
                    *slot = job_layer.layer;
                    summary.aligned.push(index);

                    // Unmeasured results are exempt from the SNR policy.
                    let Some(snr) = slot.mean_snr() else {
                        continue;
                    };
                    if let Some(skip) = config.snr.skip {
                        slot.snr_skip = snr <= skip;
                        if slot.snr_skip {
                            summary.snr_skipped.push(index);
                        }
                    }
                    if config.snr.halt.is_some_and(|halt| snr <= halt) {
                        warn!(layer = index, snr, "SNR below halt threshold, stopping");
                        summary.halted_at = Some(index);
                        break 'tasks;
                    }
                }
            }
        }
    }
}
