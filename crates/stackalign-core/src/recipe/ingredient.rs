use std::fmt;

use tracing::debug;

use crate::affine::{apply_points, AffineMatrix, Point};
use crate::align::mir::PointSet;
use crate::align::window::{moving_patches, multi_swim, stationary_patches};
use crate::compute::RegistrationBackend;
use crate::error::{AlignError, Result};
use crate::frame::{Frame, ImageSize};
use crate::pipeline::config::RecipeConfig;

/// What an ingredient does with the running affine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlignMode {
    /// Correlate windows, refit, repeat.
    SwimAlign,
    /// Fit directly from supplied correspondences.
    MatchPointAlign,
    /// Pass a supplied affine through.
    ApplyAffineAlign,
    /// Report SNR for the running affine without changing it.
    CheckAlign,
}

impl fmt::Display for AlignMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SwimAlign => write!(f, "swim_align"),
            Self::MatchPointAlign => write!(f, "match_point_align"),
            Self::ApplyAffineAlign => write!(f, "apply_affine_align"),
            Self::CheckAlign => write!(f, "check_align"),
        }
    }
}

/// One step of a recipe.
#[derive(Clone, Debug)]
pub struct Ingredient {
    pub mode: AlignMode,
    /// Correlation window size (unused by match-point and apply modes).
    pub window: ImageSize,
    /// Window centres in the stationary image.
    pub stationary_points: Vec<Point>,
    /// Supplied moving-image correspondences (match-point mode).
    pub moving_points: Vec<Point>,
    pub whitening: f64,
    pub iterations: usize,
    /// Affine carried in from the caller; overrides the running affine.
    pub afm: Option<AffineMatrix>,
    /// Affine after execution.
    pub output: Option<AffineMatrix>,
    /// Per-window SNR of the last swim pass.
    pub snr: Vec<f64>,
    /// RMS residual of the last fit.
    pub rms: f64,
}

impl Ingredient {
    fn base(mode: AlignMode, config: &RecipeConfig) -> Self {
        Self {
            mode,
            window: ImageSize::new(0, 0),
            stationary_points: Vec::new(),
            moving_points: Vec::new(),
            whitening: config.whitening,
            iterations: config.swim_iterations,
            afm: None,
            output: None,
            snr: Vec::new(),
            rms: 0.0,
        }
    }

    pub fn swim(window: ImageSize, points: Vec<Point>, config: &RecipeConfig) -> Self {
        Self {
            window,
            stationary_points: points,
            ..Self::base(AlignMode::SwimAlign, config)
        }
    }

    /// Swim ingredient that starts from `afm` instead of the running affine.
    pub fn swim_from(
        window: ImageSize,
        points: Vec<Point>,
        afm: AffineMatrix,
        config: &RecipeConfig,
    ) -> Self {
        Self {
            afm: Some(afm),
            ..Self::swim(window, points, config)
        }
    }

    pub fn match_point(points: PointSet, config: &RecipeConfig) -> Self {
        Self {
            stationary_points: points.stationary().to_vec(),
            moving_points: points.moving().to_vec(),
            ..Self::base(AlignMode::MatchPointAlign, config)
        }
    }

    pub fn apply_affine(afm: AffineMatrix, config: &RecipeConfig) -> Self {
        Self {
            afm: Some(afm),
            ..Self::base(AlignMode::ApplyAffineAlign, config)
        }
    }

    pub fn check(window: ImageSize, center: Point, config: &RecipeConfig) -> Self {
        Self {
            window,
            stationary_points: vec![center],
            iterations: 1,
            ..Self::base(AlignMode::CheckAlign, config)
        }
    }

    /// Run this step against the image pair, starting from `running`.
    pub fn execute(
        &mut self,
        stationary: &Frame,
        moving: &Frame,
        running: AffineMatrix,
        backend: &dyn RegistrationBackend,
        config: &RecipeConfig,
    ) -> Result<AffineMatrix> {
        let start = self.afm.unwrap_or(running);
        let result = match self.mode {
            AlignMode::SwimAlign => self.swim_align(stationary, moving, start, backend, config)?,
            AlignMode::MatchPointAlign => self.match_point_align(backend, config)?,
            AlignMode::ApplyAffineAlign => {
                self.snr.clear();
                start
            }
            AlignMode::CheckAlign => {
                self.check_align(stationary, moving, start, backend)?;
                start
            }
        };
        debug!(
            mode = %self.mode,
            windows = self.stationary_points.len(),
            rms = self.rms,
            "Ingredient complete"
        );
        self.output = Some(result);
        Ok(result)
    }

    fn swim_align(
        &mut self,
        stationary: &Frame,
        moving: &Frame,
        start: AffineMatrix,
        backend: &dyn RegistrationBackend,
        config: &RecipeConfig,
    ) -> Result<AffineMatrix> {
        let psta = self.stationary_points.clone();
        let stas = stationary_patches(backend, &stationary.data, &psta, self.window)?;

        let mut afm = start;
        let mut pmov = apply_points(&afm, &psta);
        for _ in 0..self.iterations.max(1) {
            let movs = moving_patches(backend, &moving.data, &pmov, &afm, self.window)?;
            let pass = multi_swim(backend, &stas, &movs, self.whitening, &afm)?;
            for (p, d) in pmov.iter_mut().zip(&pass.shifts) {
                *p += *d;
            }

            let fit = backend.fit(
                &PointSet::new(psta.clone(), pmov)?,
                config.rms_threshold,
                config.min_points,
            )?;
            afm = fit.afm;
            self.rms = fit.rms;
            self.snr = pass.snr;
            pmov = apply_points(&afm, &psta);
        }
        Ok(afm)
    }

    fn match_point_align(
        &mut self,
        backend: &dyn RegistrationBackend,
        config: &RecipeConfig,
    ) -> Result<AffineMatrix> {
        let points = PointSet::new(self.stationary_points.clone(), self.moving_points.clone())?;
        if points.is_empty() {
            return Err(AlignError::Config(
                "match point alignment needs at least one point pair".into(),
            ));
        }
        let fit = backend.fit(&points, config.rms_threshold, config.min_points)?;
        self.rms = fit.rms;
        self.snr.clear();
        Ok(fit.afm)
    }

    fn check_align(
        &mut self,
        stationary: &Frame,
        moving: &Frame,
        afm: AffineMatrix,
        backend: &dyn RegistrationBackend,
    ) -> Result<()> {
        let psta = &self.stationary_points;
        let stas = stationary_patches(backend, &stationary.data, psta, self.window)?;
        let pmov = apply_points(&afm, psta);
        let movs = moving_patches(backend, &moving.data, &pmov, &afm, self.window)?;
        let pass = multi_swim(backend, &stas, &movs, self.whitening, &afm)?;
        self.snr = pass.snr;
        Ok(())
    }

    /// `SNR: mean (+-std n:count)  <min  max>` over the per-window SNR.
    pub fn snr_report(&self) -> String {
        snr_report(&self.snr)
    }
}

pub fn snr_report(snr: &[f64]) -> String {
    if snr.is_empty() {
        return "SNR: --".to_string();
    }
    let n = snr.len() as f64;
    let mean = snr.iter().sum::<f64>() / n;
    let std = (snr.iter().map(|s| (s - mean) * (s - mean)).sum::<f64>() / n).sqrt();
    let min = snr.iter().copied().fold(f64::INFINITY, f64::min);
    let max = snr.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    format!(
        "SNR: {:.1} (+-{:.1} n:{})  <{:.1}  {:.1}>",
        mean,
        std,
        snr.len(),
        min,
        max
    )
}
