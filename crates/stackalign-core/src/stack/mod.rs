pub mod bias;
pub mod bounds;
pub mod compose;
pub mod diagnostics;

pub use bias::{decompose, BiasFuncs, Decomposition};
pub use bounds::bounding_rect;
pub use compose::{set_stack_cafm, ComposeReport};
pub use diagnostics::save_bias_analysis;
