pub mod mir;
pub mod swim;
pub mod window;

pub use mir::{mir_affine, mir_iterate, MirFit, PointSet};
pub use swim::{swim, swim_windows, SwimResult};
pub use window::{apodize, multi_swim, MultiSwim};
