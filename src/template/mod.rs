//! Compiled templates and directory-backed lookup

pub mod errors;
pub mod render;
pub mod template;

pub use errors::ResolutionError;
pub use render::{Render, Resolved};
pub use template::{Template, TemplateOptions, content_type_for, normalize_text};
