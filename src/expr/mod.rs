//! Embedded expression language: AST and parser

pub mod ast;
pub mod parser;

pub use ast::{BinaryOp, CompareOp, Expr, Literal, Param, Stmt, Subscript, Target, UnaryOp};
pub use parser::{
    SyntaxError, parse_def_header, parse_expression, parse_for_header, parse_keyword_expression,
    parse_params, parse_return, parse_simple_statement,
};
