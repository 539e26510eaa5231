//! Section tree produced by the template parser

use std::fmt;

/// Keywords that open an indented (or one-line) block body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKeyword {
    For,
    While,
    If,
    Elif,
    Else,
    Def,
}

impl BlockKeyword {
    pub fn parse(word: &str) -> Option<Self> {
        match word {
            "for" => Some(Self::For),
            "while" => Some(Self::While),
            "if" => Some(Self::If),
            "elif" => Some(Self::Elif),
            "else" => Some(Self::Else),
            "def" => Some(Self::Def),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::For => "for",
            Self::While => "while",
            Self::If => "if",
            Self::Elif => "elif",
            Self::Else => "else",
            Self::Def => "def",
        }
    }
}

impl fmt::Display for BlockKeyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Single-line flow statements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKeyword {
    Pass,
    Break,
    Continue,
    Return,
}

impl FlowKeyword {
    pub fn parse(word: &str) -> Option<Self> {
        match word {
            "pass" => Some(Self::Pass),
            "break" => Some(Self::Break),
            "continue" => Some(Self::Continue),
            "return" => Some(Self::Return),
            _ => None,
        }
    }
}

/// Value side of a `$var` line
#[derive(Debug, Clone, PartialEq)]
pub enum VarValue {
    /// `$var name = expr`
    Expr(String),
    /// `$var name: text` or an indented fragment; holds `Line` sections
    Fragment(Vec<Section>),
}

/// One syntactic unit of a template body
#[derive(Debug, Clone, PartialEq)]
pub enum Section {
    /// Literal text
    Text(String),
    /// `$expr` or `$:expr`
    Expression { code: String, escape: bool },
    /// One source line of `Text` and `Expression` pieces
    Line { pieces: Vec<Section>, line: usize },
    /// `$ code` up to the end of the line
    Assignment { code: String, line: usize },
    /// `$pass`, `$break`, `$continue`, `$return ...`
    Statement {
        keyword: FlowKeyword,
        code: String,
        line: usize,
    },
    /// `$for/$while/$if/$elif/$else/$def ...:` with its parsed body
    Block {
        keyword: BlockKeyword,
        header: String,
        body: Vec<Section>,
        indent: String,
        line: usize,
    },
    /// `$code:` block; the body is kept as raw procedural text
    Code { text: String, line: usize },
    /// `$var name ...`
    Var {
        name: String,
        value: VarValue,
        line: usize,
    },
}

impl Section {
    /// Source line the section starts on, when it has one
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Text(_) | Self::Expression { .. } => None,
            Self::Line { line, .. }
            | Self::Assignment { line, .. }
            | Self::Statement { line, .. }
            | Self::Block { line, .. }
            | Self::Code { line, .. }
            | Self::Var { line, .. } => Some(*line),
        }
    }
}

/// A parsed template: the optional `$def with (...)` header and the body
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Text of the parameter list, e.g. `(name, title='x')`
    pub params: Option<String>,
    pub body: Vec<Section>,
}
