//! Sigil template library
//!
//! Line-oriented templates where `$` introduces expressions and directives:
//!
//! ```
//! use indexmap::IndexMap;
//! use sigil_template::{Template, Value};
//!
//! let template = Template::compile(
//!     "$def with (items)\n$for item in items:\n    <li>$item</li>\n",
//!     "list.html",
//! )
//! .unwrap();
//! let mut params = IndexMap::new();
//! params.insert("items".to_string(), Value::list(vec!["a & b".into()]));
//! assert_eq!(template.invoke(&params).unwrap().to_string(), "<li>a &amp; b</li>\n");
//! ```
//!
//! Text flows through the [`syntax`] layer (directives and sections), the
//! [`expr`] layer (embedded expressions), [`compile`] (executable form) and
//! [`runtime`] (evaluation). [`template`] ties them together and adds
//! directory lookup through [`Render`].

#![deny(unsafe_code)]

pub mod application;
pub mod compile;
pub mod core;
pub mod expr;
pub mod runtime;
pub mod syntax;
pub mod template;

pub use crate::core::{Error, RenderConfig, Result};
pub use application::render_to_file;
pub use runtime::{EscapeMode, OutputRecord, Value};
pub use template::{Render, Resolved, Template, TemplateOptions};
