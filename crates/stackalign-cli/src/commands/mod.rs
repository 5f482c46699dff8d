pub mod align;
pub mod align_job;
pub mod apply;
pub mod compose;
pub mod config;
pub mod init;
pub mod swim;
