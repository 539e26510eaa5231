//! Executable form of a compiled template

use std::sync::Arc;

use crate::expr::{Expr, Param, Stmt, Target};

/// How a `def` produces its result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefKind {
    /// `$def name(...):` renders into a fresh output record and returns it
    Template,
    /// `def name(...):` inside a `$code:` block returns its `return` value
    Procedure,
}

/// A compiled `def`
#[derive(Debug, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Vec<Instr>,
    pub kind: DefKind,
}

/// One `if`/`elif` arm
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub test: Expr,
    pub body: Vec<Instr>,
}

/// Right-hand side of `$var`
#[derive(Debug, Clone, PartialEq)]
pub enum VarInit {
    Expr(Expr),
    /// Rendered to a string before it is stored
    Fragment(Vec<Instr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    /// Append literal text
    Text(String),
    /// Convert a value to text and append it, escaping when requested
    Emit { expr: Expr, escape: bool },
    /// Run a statement and discard its result
    Exec(Stmt),
    If {
        branches: Vec<Branch>,
        otherwise: Option<Vec<Instr>>,
    },
    For {
        target: Target,
        iter: Expr,
        body: Vec<Instr>,
        otherwise: Option<Vec<Instr>>,
        /// Push a loop context so `loop` resolves inside the body
        track: bool,
    },
    While {
        test: Expr,
        body: Vec<Instr>,
        otherwise: Option<Vec<Instr>>,
    },
    /// Bind a callable in the current scope
    Def(Arc<FunctionDef>),
    /// Store a named attribute on the output record
    SetVar { name: String, init: VarInit },
    Break,
    Continue,
    Return(Option<Expr>),
}

/// A compiled template body with its declared parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub params: Vec<Param>,
    pub body: Vec<Instr>,
}

/// Append text, merging it into a preceding `Text` instruction
pub(crate) fn push_text(out: &mut Vec<Instr>, text: &str) {
    if text.is_empty() {
        return;
    }
    match out.last_mut() {
        Some(Instr::Text(existing)) => existing.push_str(text),
        _ => out.push(Instr::Text(text.to_string())),
    }
}
