//! Template front end: tokenizer, expression scanner and section parser

pub mod errors;
pub mod parser;
pub mod scanner;
pub mod section;
pub mod token;

pub use errors::ParseError;
pub use parser::Parser;
pub use section::{BlockKeyword, Document, FlowKeyword, Section, VarValue};
