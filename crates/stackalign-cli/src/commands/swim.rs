use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use stackalign_core::compute::create_backend;
use stackalign_core::pipeline::config::RecipeConfig;
use stackalign_core::recipe::{Ingredient, Recipe, WindowLayout};

#[derive(Args)]
pub struct SwimArgs {
    /// Stationary (reference) image
    pub stationary: PathBuf,

    /// Moving (base) image
    pub moving: PathBuf,

    /// Whitening exponent
    #[arg(long)]
    pub whitening: Option<f64>,

    /// Windows per side: 1, 2 or 4. Without it the full 1 -> 2x2 -> 4x4
    /// funnel runs.
    #[arg(long)]
    pub grid: Option<usize>,

    /// Swim/refit iterations per ingredient
    #[arg(long)]
    pub iterations: Option<usize>,
}

pub fn run(args: &SwimArgs) -> Result<()> {
    let mut config = RecipeConfig::default();
    if let Some(w) = args.whitening {
        config.whitening = w;
    }
    if let Some(n) = args.iterations {
        config.swim_iterations = n;
    }

    let mut recipe = Recipe::new(&args.stationary, &args.moving, config);
    match args.grid {
        None => recipe.add_coarse_to_fine()?,
        Some(n) => {
            let layout = if n <= 1 {
                WindowLayout::Single
            } else {
                WindowLayout::Grid(n)
            };
            let size = recipe.image_size()?;
            let ingredient = Ingredient::swim(
                layout.window(size, recipe.config().win_scale_factor),
                layout.centers(size),
                recipe.config(),
            );
            recipe.add_ingredient(ingredient);
        }
    }

    let backend = create_backend();
    let afm = recipe
        .execute(backend.as_ref())
        .with_context(|| {
            format!(
                "Failed to register {} against {}",
                args.moving.display(),
                args.stationary.display()
            )
        })?;

    println!("{afm}");
    println!("{}", recipe.snr_report());
    Ok(())
}
