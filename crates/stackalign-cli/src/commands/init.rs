use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use stackalign_core::project::Project;

#[derive(Args)]
pub struct InitArgs {
    /// Section images in stack order
    #[arg(required = true)]
    pub images: Vec<PathBuf>,

    /// Destination directory for scaled copies and outputs
    #[arg(short, long)]
    pub destination: PathBuf,

    /// Comma-separated resolution levels (1 is always included)
    #[arg(long, default_value = "1", value_delimiter = ',')]
    pub levels: Vec<u32>,

    /// Project file to write (defaults to <destination>/project.json)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn run(args: &InitArgs) -> Result<()> {
    let project = Project::import(&args.images, &args.destination, &args.levels)
        .context("Failed to import images")?;
    let path = args
        .output
        .clone()
        .unwrap_or_else(|| args.destination.join("project.json"));
    project
        .save(&path)
        .with_context(|| format!("Failed to write project {}", path.display()))?;

    println!(
        "Created project with {} images at levels {:?}",
        args.images.len(),
        project.levels()
    );
    println!("  Current scale: {}", project.data.current_scale);
    println!("  Saved to {}", path.display());
    Ok(())
}
