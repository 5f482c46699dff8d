use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AlignError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image format error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Project document error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid image dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Degenerate transform (determinant {determinant:e})")]
    DegenerateTransform { determinant: f64 },

    #[error("Match point count mismatch: {stationary} stationary vs {moving} moving")]
    MatchPointMismatch { stationary: usize, moving: usize },

    #[error("Layer {0} has no match points")]
    NoMatchPoints(usize),

    #[error("Window size mismatch: {0}x{1} vs {2}x{3}")]
    WindowSizeMismatch(usize, usize, usize, usize),

    #[error("Invalid window: {0}")]
    InvalidWindow(String),

    #[error("Stack is empty")]
    EmptyStack,

    #[error("Layer index {index} out of range (total: {total})")]
    LayerIndexOutOfRange { index: usize, total: usize },

    #[error("Layer {0} has no reference image")]
    MissingReference(usize),

    #[error("Unknown scale level: {0}")]
    UnknownScale(String),

    #[error("Invalid project: {0}")]
    InvalidProject(String),

    #[error("Image not found: {}", .0.display())]
    ImageNotFound(PathBuf),

    #[error("Task error: {0}")]
    Task(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, AlignError>;
