use std::path::Path;

use tracing::{debug, info};

use crate::affine::{compose, AffineMatrix};
use crate::align::mir::PointSet;
use crate::compute::RegistrationBackend;
use crate::error::{AlignError, Result};
use crate::frame::Rect;
use crate::pipeline::config::{AlignmentOption, BorderMode, RecipeConfig};
use crate::project::{CoarseSeed, ImageRecord, Layer, SelectedMethod};
use crate::recipe::{Ingredient, Recipe};
use crate::resample::{aligned_path, ResampleJob};

/// Per-layer driver: builds the recipe the layer's method and option call
/// for, runs it, and writes the pairwise result into the layer.
pub struct AlignmentProcess<'a> {
    pub index: usize,
    pub option: AlignmentOption,
    config: RecipeConfig,
    seed: Option<CoarseSeed>,
    backend: &'a dyn RegistrationBackend,
}

impl<'a> AlignmentProcess<'a> {
    pub fn new(
        index: usize,
        option: AlignmentOption,
        config: RecipeConfig,
        backend: &'a dyn RegistrationBackend,
    ) -> Self {
        Self {
            index,
            option,
            config,
            seed: None,
            backend,
        }
    }

    /// Coarser-level result used by `refine_affine` and `apply_affine`.
    pub fn with_seed(mut self, seed: CoarseSeed) -> Self {
        self.seed = Some(seed);
        self
    }

    fn seed_afm(&self) -> Result<AffineMatrix> {
        self.seed.as_ref().map(|s| s.afm).ok_or_else(|| {
            AlignError::Config(format!(
                "layer {}: {} needs a coarser-level result",
                self.index, self.option
            ))
        })
    }

    /// Assemble the recipe for `layer`.
    pub fn build_recipe(&self, layer: &Layer) -> Result<Recipe> {
        let reference = layer
            .ref_path()
            .ok_or(AlignError::MissingReference(self.index))?;
        let config = self.config.for_layer(layer.method_data());
        let mut recipe = Recipe::new(reference, layer.base_path(), config);
        if let Some(seed) = &self.seed {
            debug!(
                layer = self.index,
                upscale = seed.upscale,
                seed = %seed.afm,
                "Seeding from coarser level"
            );
        }

        if self.option == AlignmentOption::ApplyAffine {
            let ingredient = Ingredient::apply_affine(self.seed_afm()?, recipe.config());
            recipe.add_ingredient(ingredient);
            return Ok(recipe);
        }

        match layer.align_to_ref_method.selected_method {
            SelectedMethod::AutoSwimAlign => match self.option {
                AlignmentOption::RefineAffine => recipe.add_refinement(self.seed_afm()?)?,
                _ => recipe.add_coarse_to_fine()?,
            },
            SelectedMethod::MatchPointAlign => {
                recipe.add_match_points(self.match_points(layer)?)?;
            }
        }

        if recipe.config().check_align {
            recipe.add_check()?;
        }
        Ok(recipe)
    }

    /// Point pairs for match-point alignment. When refining, the coarser
    /// level's points (already scaled to this level) take precedence.
    fn match_points(&self, layer: &Layer) -> Result<PointSet> {
        let seeded = match (self.option, &self.seed) {
            (AlignmentOption::RefineAffine, Some(seed)) => seed
                .match_points
                .clone()
                .filter(|(sta, mov)| !sta.is_empty() || !mov.is_empty()),
            _ => None,
        };
        let (stationary, moving) = match seeded {
            Some(points) => points,
            None => (
                layer
                    .images
                    .reference
                    .as_ref()
                    .map(|r| r.metadata.match_points.clone())
                    .unwrap_or_default(),
                layer.images.base.metadata.match_points.clone(),
            ),
        };
        if stationary.is_empty() && moving.is_empty() {
            return Err(AlignError::NoMatchPoints(self.index));
        }
        PointSet::new(stationary, moving)
    }

    /// Run the layer's recipe and store the pairwise affine, SNR and report.
    /// The cumulative affine is left for the composer.
    pub fn align(&self, layer: &mut Layer) -> Result<AffineMatrix> {
        let mut recipe = self.build_recipe(layer)?;
        debug!(
            layer = self.index,
            option = %self.option,
            ingredients = recipe.ingredients.len(),
            "Running recipe"
        );
        let afm = recipe.execute(self.backend)?;

        let report = recipe.snr_report();
        let snr = recipe.snr().to_vec();
        info!(layer = self.index, afm = %afm, "{report}");

        let results = layer.results_mut();
        results.affine_matrix = Some(afm);
        results.snr = snr;
        results.snr_report = Some(report);
        layer.align_to_ref_method.method_data.clear_biases();
        Ok(afm)
    }
}

/// Cumulative update for one layer: `compose(afm, c_afm)`, then the bias
/// correction when one is supplied. Skipped or unaligned layers contribute
/// identity. Stores and returns the new cumulative.
pub fn set_cafm(
    layer: &mut Layer,
    c_afm: &AffineMatrix,
    bias: Option<&AffineMatrix>,
) -> AffineMatrix {
    let afm = layer.pairwise_affine().unwrap_or(AffineMatrix::IDENTITY);
    let mut cafm = compose(&afm, c_afm);
    if let Some(bias) = bias {
        cafm = compose(bias, &cafm);
    }
    layer.results_mut().cumulative_afm = Some(cafm);
    cafm
}

/// Resample the layer's base image through its cumulative affine into
/// `out_dir` and record the output in `images.aligned`.
pub fn save_aligned(
    layer: &mut Layer,
    index: usize,
    out_dir: &Path,
    rect: Option<Rect>,
    border: BorderMode,
) -> Result<()> {
    let job = ResampleJob {
        index,
        source: layer.base_path().to_path_buf(),
        output: aligned_path(out_dir, layer.base_path())?,
        afm: layer
            .results()
            .cumulative_afm
            .unwrap_or(AffineMatrix::IDENTITY),
        rect,
        border,
    };
    let output = job.run()?;
    layer.images.aligned = Some(ImageRecord::new(output));
    Ok(())
}
