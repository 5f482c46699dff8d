use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use stackalign_core::project::Project;
use stackalign_core::stack::{bounding_rect, save_bias_analysis, set_stack_cafm};

#[derive(Args)]
pub struct ComposeArgs {
    /// Project file
    pub project: PathBuf,

    /// Resolution level (defaults to the project's current scale)
    #[arg(long)]
    pub scale: Option<u32>,

    /// Remove polynomial drift (defaults to the stack's setting)
    #[arg(long)]
    pub null_biases: Option<bool>,

    /// Polynomial order for drift fitting
    #[arg(long)]
    pub poly_order: Option<usize>,
}

pub fn run(args: &ComposeArgs) -> Result<()> {
    let mut project = Project::load(&args.project)
        .with_context(|| format!("Failed to read project {}", args.project.display()))?;
    let level = match args.scale {
        Some(level) => level,
        None => project.current_level()?,
    };
    let bias_dir = project.scale_dir(level).join("bias_data");
    let stack = project.stack_mut(level)?;
    if let Some(order) = args.poly_order {
        stack.poly_order = order;
    }
    let null_biases = args.null_biases.unwrap_or(stack.null_cafm_trends);

    let report = set_stack_cafm(stack, null_biases)?;
    let rect = bounding_rect(stack, stack.image_size()?)?;
    save_bias_analysis(stack, &bias_dir, Some(rect))?;

    println!(
        "Composed {} layers (null biases: {})",
        stack.len(),
        if null_biases { "yes" } else { "no" }
    );
    if !report.substituted.is_empty() {
        println!("  Identity substituted: {:?}", report.substituted);
    }
    if !report.degenerate.is_empty() {
        println!("  Degenerate, now skipped: {:?}", report.degenerate);
    }
    println!(
        "  Bounding rect: {} {} {} {}",
        rect.x, rect.y, rect.width, rect.height
    );

    project
        .save(&args.project)
        .with_context(|| format!("Failed to write project {}", args.project.display()))?;
    Ok(())
}
