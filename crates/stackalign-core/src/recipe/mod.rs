mod ingredient;
mod layout;

pub use ingredient::{snr_report, AlignMode, Ingredient};
pub use layout::WindowLayout;

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::affine::{AffineMatrix, Point};
use crate::align::mir::PointSet;
use crate::compute::RegistrationBackend;
use crate::consts::MATCH_POINT_WINDOW_DIVISOR;
use crate::error::Result;
use crate::frame::{Frame, ImageSize};
use crate::io::image_io::{image_size, load_image};
use crate::pipeline::config::RecipeConfig;

/// Ordered ingredients run over one stationary/moving image pair.
pub struct Recipe {
    pub ingredients: Vec<Ingredient>,
    stationary_path: PathBuf,
    moving_path: PathBuf,
    stationary: Option<Frame>,
    moving: Option<Frame>,
    config: RecipeConfig,
    /// Final affine mapping stationary to moving coordinates.
    pub afm: AffineMatrix,
}

impl Recipe {
    /// Recipe whose images are loaded lazily on `execute`.
    pub fn new(stationary_path: &Path, moving_path: &Path, config: RecipeConfig) -> Self {
        Self {
            ingredients: Vec::new(),
            stationary_path: stationary_path.to_path_buf(),
            moving_path: moving_path.to_path_buf(),
            stationary: None,
            moving: None,
            config,
            afm: AffineMatrix::IDENTITY,
        }
    }

    /// Recipe over images already in memory.
    pub fn with_frames(stationary: Frame, moving: Frame, config: RecipeConfig) -> Self {
        Self {
            ingredients: Vec::new(),
            stationary_path: PathBuf::new(),
            moving_path: PathBuf::new(),
            stationary: Some(stationary),
            moving: Some(moving),
            config,
            afm: AffineMatrix::IDENTITY,
        }
    }

    pub fn config(&self) -> &RecipeConfig {
        &self.config
    }

    pub fn add_ingredient(&mut self, ingredient: Ingredient) {
        self.ingredients.push(ingredient);
    }

    /// Stationary image size, read from the header when not preloaded.
    pub fn image_size(&self) -> Result<ImageSize> {
        match &self.stationary {
            Some(frame) => Ok(frame.size()),
            None => image_size(&self.stationary_path),
        }
    }

    /// Add the coarse-to-fine funnel: one window, then 2x2, then 4x4.
    pub fn add_coarse_to_fine(&mut self) -> Result<()> {
        let size = self.image_size()?;
        for layout in [WindowLayout::Single, WindowLayout::Grid(2), WindowLayout::Grid(4)] {
            let ingredient = Ingredient::swim(
                layout.window(size, self.config.win_scale_factor),
                layout.centers(size),
                &self.config,
            );
            self.add_ingredient(ingredient);
        }
        Ok(())
    }

    /// Add only the finest (4x4) ingredient, seeded with `seed`.
    pub fn add_refinement(&mut self, seed: AffineMatrix) -> Result<()> {
        let size = self.image_size()?;
        let layout = WindowLayout::Grid(4);
        let ingredient = Ingredient::swim_from(
            layout.window(size, self.config.win_scale_factor),
            layout.centers(size),
            seed,
            &self.config,
        );
        self.add_ingredient(ingredient);
        Ok(())
    }

    /// Fit from correspondences, then swim small windows at each point.
    pub fn add_match_points(&mut self, points: PointSet) -> Result<()> {
        let size = self.image_size()?;
        let side = (size.width as f64 / MATCH_POINT_WINDOW_DIVISOR) as usize;
        let refine = Ingredient::swim(
            ImageSize::new(side, side),
            points.stationary().to_vec(),
            &self.config,
        );
        self.add_ingredient(Ingredient::match_point(points, &self.config));
        self.add_ingredient(refine);
        Ok(())
    }

    /// Single-window SNR check over the whole image.
    pub fn add_check(&mut self) -> Result<()> {
        let size = self.image_size()?;
        let center = WindowLayout::Single.centers(size)[0];
        self.add_ingredient(Ingredient::check(size, center, &self.config));
        Ok(())
    }

    /// Run every ingredient in order, threading the running affine, then
    /// release the image buffers.
    pub fn execute(&mut self, backend: &dyn RegistrationBackend) -> Result<AffineMatrix> {
        let stationary = match self.stationary.take() {
            Some(frame) => frame,
            None => load_image(&self.stationary_path)?,
        };
        let moving = match self.moving.take() {
            Some(frame) => frame,
            None => load_image(&self.moving_path)?,
        };

        let mut afm = self
            .ingredients
            .first()
            .and_then(|i| i.afm)
            .unwrap_or(AffineMatrix::IDENTITY);

        for (i, ingredient) in self.ingredients.iter_mut().enumerate() {
            afm = ingredient.execute(&stationary, &moving, afm, backend, &self.config)?;
            debug!(step = i, mode = %ingredient.mode, afm = %afm, "Recipe step");
        }

        self.afm = afm;
        Ok(afm)
    }

    /// Per-window SNR of the last ingredient that correlated windows.
    /// Empty when no ingredient measured any.
    pub fn snr(&self) -> &[f64] {
        self.ingredients
            .iter()
            .rev()
            .find(|i| !i.snr.is_empty())
            .map(|i| i.snr.as_slice())
            .unwrap_or(&[])
    }

    pub fn snr_report(&self) -> String {
        snr_report(self.snr())
    }

    /// Centre points of the last ingredient, mapped through the final affine.
    pub fn moving_points(&self) -> Vec<Point> {
        self.ingredients
            .last()
            .map(|i| crate::affine::apply_points(&self.afm, &i.stationary_points))
            .unwrap_or_default()
    }
}
