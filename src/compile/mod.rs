//! Code generation: sections to an executable instruction tree

mod code;
pub mod codegen;
pub mod errors;
pub mod instr;

pub use codegen::CodeGen;
pub use errors::{CodegenError, CompileError};
pub use instr::{Branch, DefKind, FunctionDef, Instr, Program, VarInit};
