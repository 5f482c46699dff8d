/// Minimum pixel count (h*w) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Default whitening exponent applied to the cross-power spectrum.
/// 0 is plain correlation, -1 is pure phase correlation.
pub const DEFAULT_WHITENING: f64 = -0.68;

/// Added to |P|^2 before whitening so empty frequencies stay finite.
pub const WHITENING_GUARD: f64 = 1e-40;

/// Radius of the neighbourhood folded around the correlation peak for the
/// centroid refinement (11x11 window).
pub const PEAK_CENTROID_RADIUS: usize = 5;

/// Default fraction of a grid cell covered by its correlation window.
pub const DEFAULT_WIN_SCALE_FACTOR: f64 = 0.8125;

/// Default number of swim -> refit rounds per ingredient.
pub const DEFAULT_SWIM_ITERATIONS: usize = 2;

/// RMS residual (pixels) above which the affine fit drops its worst point.
pub const DEFAULT_MIR_RMS_THRESHOLD: f64 = 3.0;

/// Point floor for iterative outlier rejection.
pub const DEFAULT_MIR_MIN_POINTS: usize = 4;

/// Match-point windows are image width divided by this.
pub const MATCH_POINT_WINDOW_DIVISOR: f64 = 32.0;

/// Default polynomial order for drift (bias) trend fitting.
pub const DEFAULT_POLY_ORDER: usize = 4;

/// Number of composition passes when drift nulling is enabled.
pub const BIAS_NULLING_PASSES: usize = 2;

/// Hard cap on the alignment worker pool.
pub const MAX_WORKERS: usize = 48;

/// Determinant magnitude below which an affine is treated as singular.
pub const DEGENERATE_DETERMINANT: f64 = 1e-12;

/// Small epsilon to avoid division by zero in floating-point comparisons.
pub const EPSILON: f64 = 1e-10;

/// Line printed by a piped worker right before its JSON payload.
pub const JOB_OUTPUT_DELIMITER: &str = "---JSON-DELIMITER---";

/// File name of the read-only project snapshot handed to workers.
pub const SNAPSHOT_FILE_NAME: &str = "project_runner_job_file.json";
