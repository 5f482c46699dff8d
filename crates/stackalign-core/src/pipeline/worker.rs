use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::compute::RegistrationBackend;
use crate::consts::JOB_OUTPUT_DELIMITER;
use crate::error::{AlignError, Result};
use crate::process::AlignmentProcess;
use crate::project::{scale_key, Project};

use super::config::{AlignmentOption, IoMode, RecipeConfig};
use super::task::{JobLayer, JobOutput, TaskArgs};

/// Read-only project copy shared with every worker of one run, together
/// with the recipe defaults of that run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    #[serde(flatten)]
    pub project: Project,
    #[serde(default)]
    pub recipe: RecipeConfig,
}

impl JobSnapshot {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string(self)?)?;
        Ok(())
    }
}

/// Recompute the layers named by `args` against an in-memory snapshot.
/// The snapshot itself is never modified.
pub fn align_layers(
    snapshot: &JobSnapshot,
    args: &TaskArgs,
    backend: &dyn RegistrationBackend,
) -> Result<JobOutput> {
    let project = &snapshot.project;
    let stack = project.stack(args.level)?;
    let mut layers = Vec::with_capacity(args.count);

    for index in args.layer..args.layer + args.count.max(1) {
        let mut layer = stack.layer(index)?.clone();
        let mut process =
            AlignmentProcess::new(index, args.option, snapshot.recipe.clone(), backend);
        if args.option != AlignmentOption::InitAffine {
            process = process.with_seed(project.coarse_seed(args.level, index)?);
        }
        process.align(&mut layer)?;
        layers.push(JobLayer { index, layer });
    }

    debug!(first = args.layer, count = layers.len(), "Job complete");
    Ok(JobOutput {
        scale: scale_key(args.level),
        layers,
    })
}

/// `<dest>/<scale>/single_alignment_out_<layer>.json`.
pub fn job_output_path(destination: &Path, level: u32, layer: usize) -> PathBuf {
    destination
        .join(scale_key(level))
        .join(format!("single_alignment_out_{layer}.json"))
}

/// Worker entry point: load the snapshot, compute, and hand the partial
/// document back through stdout or a per-layer file.
pub fn run_align_job(args: &TaskArgs, backend: &dyn RegistrationBackend) -> Result<()> {
    run_align_job_to(args, backend, &mut std::io::stdout().lock())
}

/// [`run_align_job`] with pipe-mode output going to `out`.
pub fn run_align_job_to(
    args: &TaskArgs,
    backend: &dyn RegistrationBackend,
    out: &mut dyn Write,
) -> Result<()> {
    let snapshot = JobSnapshot::load(&args.snapshot)?;
    info!(
        layer = args.layer,
        option = %args.option,
        level = args.level,
        mode = %args.mode,
        "Starting alignment job"
    );
    let output = align_layers(&snapshot, args, backend)?;
    let json = serde_json::to_string(&output)?;

    match args.io {
        IoMode::Pipe => {
            writeln!(out, "{JOB_OUTPUT_DELIMITER}")?;
            writeln!(out, "{json}")?;
            out.flush()?;
        }
        IoMode::File => {
            let path =
                job_output_path(&snapshot.project.data.destination_path, args.level, args.layer);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, json)?;
        }
    }
    Ok(())
}

/// Extract the partial document from a worker's stdout.
pub fn parse_pipe_output(stdout: &str) -> Result<JobOutput> {
    let (_, payload) = stdout.split_once(JOB_OUTPUT_DELIMITER).ok_or_else(|| {
        AlignError::Task("worker output has no result delimiter".to_string())
    })?;
    Ok(serde_json::from_str(payload.trim())?)
}

pub fn read_file_output(destination: &Path, level: u32, layer: usize) -> Result<JobOutput> {
    let text = fs::read_to_string(job_output_path(destination, level, layer))?;
    Ok(serde_json::from_str(&text)?)
}
