use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use stackalign_core::pipeline::config::BorderMode;
use stackalign_core::process::save_aligned;
use stackalign_core::project::Project;
use stackalign_core::stack::bounding_rect;

#[derive(Args)]
pub struct ApplyArgs {
    /// Project file
    pub project: PathBuf,

    /// Resolution level (defaults to the project's current scale)
    #[arg(long)]
    pub scale: Option<u32>,

    /// Fill outside pixels with zero instead of the image mean
    #[arg(long)]
    pub zero_border: bool,

    /// Output directory (defaults to <destination>/scale_N/img_aligned)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn run(args: &ApplyArgs) -> Result<()> {
    let mut project = Project::load(&args.project)
        .with_context(|| format!("Failed to read project {}", args.project.display()))?;
    let level = match args.scale {
        Some(level) => level,
        None => project.current_level()?,
    };
    let out_dir = args
        .output
        .clone()
        .unwrap_or_else(|| project.scale_dir(level).join("img_aligned"));
    let border = if args.zero_border {
        BorderMode::Zero
    } else {
        BorderMode::Mean
    };

    let stack = project.stack_mut(level)?;
    let rect = if stack.use_bounding_rect {
        Some(bounding_rect(stack, stack.image_size()?)?)
    } else {
        None
    };

    let pb = ProgressBar::new(stack.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg:20} [{bar:40}] {pos}/{len}")?
            .progress_chars("=> "),
    );
    pb.set_message("Resampling");

    let failures: Vec<String> = stack
        .alignment_stack
        .par_iter_mut()
        .enumerate()
        .filter(|(_, layer)| !layer.skip)
        .filter_map(|(i, layer)| {
            let result = save_aligned(layer, i, &out_dir, rect, border);
            pb.inc(1);
            result.err().map(|e| format!("layer {i}: {e}"))
        })
        .collect();
    pb.finish_with_message("Done");

    for failure in &failures {
        eprintln!("  {failure}");
    }
    println!("Aligned images written to {}", out_dir.display());

    project
        .save(&args.project)
        .with_context(|| format!("Failed to write project {}", args.project.display()))?;
    Ok(())
}
