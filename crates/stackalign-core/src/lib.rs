pub mod affine;
pub mod align;
pub mod compute;
pub mod consts;
pub mod error;
pub mod frame;
pub mod interp;
pub mod io;
pub mod pipeline;
pub mod process;
pub mod project;
pub mod recipe;
pub mod resample;
pub mod stack;
