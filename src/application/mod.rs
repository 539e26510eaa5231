//! Application layer - use cases built on top of the template library

pub mod render_file;

pub use render_file::*;
