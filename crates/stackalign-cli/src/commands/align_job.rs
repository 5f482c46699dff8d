use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use stackalign_core::compute::create_backend;
use stackalign_core::pipeline::config::{AlignmentOption, ExecutionMode, IoMode};
use stackalign_core::pipeline::{run_align_job, TaskArgs};

#[derive(Args)]
pub struct AlignJobArgs {
    /// Read-only project snapshot
    pub snapshot: PathBuf,
    /// init_affine, refine_affine or apply_affine
    pub option: AlignmentOption,
    /// Resolution level
    pub level: u32,
    /// parallel or serial
    pub mode: ExecutionMode,
    /// First layer index
    pub layer: usize,
    /// Number of layers
    pub count: usize,
    /// pipe or file
    pub io: IoMode,
}

pub fn run(args: &AlignJobArgs) -> Result<()> {
    let task = TaskArgs {
        snapshot: args.snapshot.clone(),
        option: args.option,
        level: args.level,
        mode: args.mode,
        layer: args.layer,
        count: args.count,
        io: args.io,
    };
    let backend = create_backend();
    run_align_job(&task, backend.as_ref())
        .with_context(|| format!("Alignment job for layer {} failed", args.layer))
}
