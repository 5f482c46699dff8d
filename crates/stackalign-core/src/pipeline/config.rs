use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::consts::{
    DEFAULT_MIR_MIN_POINTS, DEFAULT_MIR_RMS_THRESHOLD, DEFAULT_SWIM_ITERATIONS,
    DEFAULT_WHITENING, DEFAULT_WIN_SCALE_FACTOR,
};
use crate::error::AlignError;
use crate::project::MethodData;

/// How a layer's pairwise affine is produced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentOption {
    /// Full coarse-to-fine recipe from identity.
    #[default]
    InitAffine,
    /// Seed from the next-coarser level, run only the finest grid.
    RefineAffine,
    /// Stamp the scaled-up coarser affine without re-estimating.
    ApplyAffine,
}

impl fmt::Display for AlignmentOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitAffine => write!(f, "init_affine"),
            Self::RefineAffine => write!(f, "refine_affine"),
            Self::ApplyAffine => write!(f, "apply_affine"),
        }
    }
}

impl FromStr for AlignmentOption {
    type Err = AlignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "init_affine" => Ok(Self::InitAffine),
            "refine_affine" => Ok(Self::RefineAffine),
            "apply_affine" => Ok(Self::ApplyAffine),
            other => Err(AlignError::Config(format!(
                "unknown alignment option '{other}'"
            ))),
        }
    }
}

/// Parameters shared by every ingredient of one alignment run.
/// Built once, then passed by reference; never mutated mid-run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecipeConfig {
    /// Whitening exponent for the cross-power spectrum.
    pub whitening: f64,
    /// Fraction of a grid cell covered by its window.
    pub win_scale_factor: f64,
    pub swim_iterations: usize,
    pub rms_threshold: f64,
    pub min_points: usize,
    /// Append a single-window SNR check after the recipe.
    pub check_align: bool,
}

impl Default for RecipeConfig {
    fn default() -> Self {
        Self {
            whitening: DEFAULT_WHITENING,
            win_scale_factor: DEFAULT_WIN_SCALE_FACTOR,
            swim_iterations: DEFAULT_SWIM_ITERATIONS,
            rms_threshold: DEFAULT_MIR_RMS_THRESHOLD,
            min_points: DEFAULT_MIR_MIN_POINTS,
            check_align: false,
        }
    }
}

impl RecipeConfig {
    /// Copy with the per-layer whitening and window scale applied.
    pub fn for_layer(&self, data: &MethodData) -> Self {
        Self {
            whitening: data.whitening_factor.unwrap_or(self.whitening),
            win_scale_factor: data.win_scale_factor.unwrap_or(self.win_scale_factor),
            ..self.clone()
        }
    }
}

/// Parallel fan-out with a bounded pool, or one job at a time in layer order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Parallel,
    Serial,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parallel => write!(f, "parallel"),
            Self::Serial => write!(f, "serial"),
        }
    }
}

impl FromStr for ExecutionMode {
    type Err = AlignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "parallel" => Ok(Self::Parallel),
            "serial" => Ok(Self::Serial),
            other => Err(AlignError::Config(format!(
                "unknown execution mode '{other}'"
            ))),
        }
    }
}

/// Where an alignment job runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorKind {
    /// Worker threads of a Rayon pool inside this process.
    #[default]
    InProcess,
    /// One child process per job running the `align-job` entry point.
    Subprocess,
}

impl fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProcess => write!(f, "in-process"),
            Self::Subprocess => write!(f, "subprocess"),
        }
    }
}

/// How a worker hands its partial document back.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IoMode {
    /// JSON on stdout after the delimiter line.
    #[default]
    Pipe,
    /// JSON written to a per-layer file next to the snapshot.
    File,
}

impl fmt::Display for IoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pipe => write!(f, "pipe"),
            Self::File => write!(f, "file"),
        }
    }
}

impl FromStr for IoMode {
    type Err = AlignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pipe" => Ok(Self::Pipe),
            "file" => Ok(Self::File),
            other => Err(AlignError::Config(format!("unknown I/O mode '{other}'"))),
        }
    }
}

/// Fill value for output pixels that map outside the source image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BorderMode {
    /// Mean of the source image.
    #[default]
    Mean,
    Zero,
}

impl fmt::Display for BorderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mean => write!(f, "mean"),
            Self::Zero => write!(f, "zero"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub mode: ExecutionMode,
    pub executor: ExecutorKind,
    /// Upper bound on pool size; the hard cap of 48 still applies.
    pub max_workers: Option<usize>,
    pub io_mode: IoMode,
    /// Worker binary for the subprocess executor (defaults to the running
    /// executable).
    pub worker_program: Option<PathBuf>,
}

/// SNR thresholds. Both are scheduling policy only; stored results are
/// never altered by them. Layers without a measured SNR are exempt.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnrPolicy {
    /// Layers at or below this SNR are flagged `snr_skip` for the next pass.
    pub skip: Option<f64>,
    /// Layers at or below this SNR stop scheduling of later layers.
    pub halt: Option<f64>,
    /// Turn layers flagged `snr_skip` by an earlier pass into skipped
    /// layers before this run.
    pub apply_skip: bool,
}

/// Everything one `align` run needs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub project: PathBuf,
    /// Resolution level; defaults to the project's current scale.
    #[serde(default)]
    pub scale: Option<u32>,
    #[serde(default)]
    pub alignment_option: AlignmentOption,
    /// First layer to align (inclusive).
    #[serde(default)]
    pub start: usize,
    /// Last layer to align (exclusive); defaults to the stack length.
    #[serde(default)]
    pub end: Option<usize>,
    /// Overrides the stack's `null_cafm_trends` setting when present.
    #[serde(default)]
    pub null_biases: Option<bool>,
    #[serde(default = "default_generate_images")]
    pub generate_images: bool,
    #[serde(default)]
    pub border: BorderMode,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub snr: SnrPolicy,
    #[serde(default)]
    pub recipe: RecipeConfig,
}

fn default_generate_images() -> bool {
    true
}

impl RunConfig {
    pub fn new(project: PathBuf) -> Self {
        Self {
            project,
            scale: None,
            alignment_option: AlignmentOption::default(),
            start: 0,
            end: None,
            null_biases: None,
            generate_images: default_generate_images(),
            border: BorderMode::default(),
            execution: ExecutionConfig::default(),
            snr: SnrPolicy::default(),
            recipe: RecipeConfig::default(),
        }
    }
}
