//! Recursive descent parser for embedded expressions and simple statements.
//!
//! Precedence, loosest first: conditional `a if c else b`, `or`, `and`,
//! `not`, comparisons (chained), `+ -`, `* / // %`, unary `- +`, `**`,
//! then attribute access, calls and subscripts.

use thiserror::Error;

use super::ast::{BinaryOp, CompareOp, Expr, Literal, Param, Stmt, Subscript, Target, UnaryOp};
use crate::syntax::token::{Token, TokenKind, Tokenizer};

/// Malformed embedded expression or statement
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message} (at offset {offset})")]
pub struct SyntaxError {
    pub message: String,
    pub offset: usize,
}

type Result<T> = std::result::Result<T, SyntaxError>;

const KEYWORDS: &[&str] = &[
    "and", "as", "assert", "break", "class", "continue", "def", "del", "elif", "else", "except",
    "finally", "for", "from", "global", "if", "import", "in", "is", "lambda", "nonlocal", "not",
    "or", "pass", "raise", "return", "try", "while", "with", "yield", "True", "False", "None",
];

pub fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word)
}

/// Parse a complete expression. A top-level comma builds a tuple.
pub fn parse_expression(src: &str) -> Result<Expr> {
    let mut parser = ExprParser::new(src)?;
    let expr = parser.expression_list()?;
    parser.finish()?;
    Ok(expr)
}

/// Parse `KEYWORD EXPR`, e.g. the header `if x > 1` or `while n`
pub fn parse_keyword_expression(src: &str, keyword: &str) -> Result<Expr> {
    let mut parser = ExprParser::new(src)?;
    parser.expect_keyword(keyword)?;
    let expr = parser.expression_list()?;
    parser.finish()?;
    Ok(expr)
}

/// Parse `return [EXPR]`
pub fn parse_return(src: &str) -> Result<Option<Expr>> {
    let mut parser = ExprParser::new(src)?;
    parser.expect_keyword("return")?;
    if parser.peek().is_none() {
        return Ok(None);
    }
    let expr = parser.expression_list()?;
    parser.finish()?;
    Ok(Some(expr))
}

/// Parse a `for TARGET in EXPR` header
pub fn parse_for_header(src: &str) -> Result<(Target, Expr)> {
    let mut parser = ExprParser::new(src)?;
    parser.expect_keyword("for")?;
    let target = parser.target_list()?;
    parser.expect_keyword("in")?;
    let iter = parser.expression_list()?;
    parser.finish()?;
    Ok((target, iter))
}

/// Parse a parameter list, with or without its surrounding parentheses
pub fn parse_params(src: &str) -> Result<Vec<Param>> {
    let mut parser = ExprParser::new(src)?;
    let params = if parser.eat_open("(") {
        let params = parser.params(Some(")"))?;
        parser.expect_close(")")?;
        params
    } else {
        parser.params(None)?
    };
    parser.finish()?;
    Ok(params)
}

/// Parse a `def NAME(PARAMS)` header
pub fn parse_def_header(src: &str) -> Result<(String, Vec<Param>)> {
    let mut parser = ExprParser::new(src)?;
    parser.expect_keyword("def")?;
    let name = parser.identifier()?;
    if !parser.eat_open("(") {
        return Err(parser.error("expected `(` after the function name"));
    }
    let params = parser.params(Some(")"))?;
    parser.expect_close(")")?;
    parser.finish()?;
    Ok((name, params))
}

/// Parse an assignment, augmented assignment or expression statement
pub fn parse_simple_statement(src: &str) -> Result<Stmt> {
    let mut parser = ExprParser::new(src)?;
    let first = parser.expression_list()?;

    if let Some(op) = parser.peek().and_then(|t| {
        (t.kind == TokenKind::Op)
            .then(|| BinaryOp::from_augmented(t.text))
            .flatten()
    }) {
        parser.advance();
        let Expr::Name(name) = first else {
            return Err(SyntaxError {
                message: "augmented assignment needs a plain name".to_string(),
                offset: 0,
            });
        };
        let value = parser.expression_list()?;
        parser.finish()?;
        return Ok(Stmt::AugAssign { name, op, value });
    }

    if parser.check_op("=") {
        let mut targets = vec![expr_to_target(first)?];
        let value = loop {
            parser.advance();
            let next = parser.expression_list()?;
            if parser.check_op("=") {
                targets.push(expr_to_target(next)?);
            } else {
                break next;
            }
        };
        parser.finish()?;
        return Ok(Stmt::Assign { targets, value });
    }

    parser.finish()?;
    Ok(Stmt::Expr(first))
}

fn expr_to_target(expr: Expr) -> Result<Target> {
    match expr {
        Expr::Name(name) => Ok(Target::Name(name)),
        Expr::Tuple(items) | Expr::List(items) => Ok(Target::Tuple(
            items.into_iter().map(expr_to_target).collect::<Result<_>>()?,
        )),
        _ => Err(SyntaxError {
            message: "cannot assign to expression".to_string(),
            offset: 0,
        }),
    }
}

struct ExprParser<'a> {
    tokens: Vec<Token<'a>>,
    pos: usize,
    len: usize,
}

impl<'a> ExprParser<'a> {
    fn new(src: &'a str) -> Result<Self> {
        let tokens = Tokenizer::new(src)
            .filter(|t| !matches!(t, Ok(tok) if tok.is_trivia() || tok.kind == TokenKind::Newline))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| SyntaxError {
                message: e.message,
                offset: e.offset,
            })?;
        Ok(Self {
            tokens,
            pos: 0,
            len: src.len(),
        })
    }

    fn peek(&self) -> Option<Token<'a>> {
        self.tokens.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<Token<'a>> {
        self.tokens.get(self.pos + ahead).copied()
    }

    fn advance(&mut self) -> Option<Token<'a>> {
        let token = self.peek();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error<M: Into<String>>(&self, message: M) -> SyntaxError {
        SyntaxError {
            message: message.into(),
            offset: self.peek().map(|t| t.start).unwrap_or(self.len),
        }
    }

    fn unexpected(&self) -> SyntaxError {
        match self.peek() {
            Some(token) => self.error(format!("unexpected `{}`", token.text)),
            None => self.error("unexpected end of expression"),
        }
    }

    fn finish(&self) -> Result<()> {
        match self.peek() {
            None => Ok(()),
            Some(_) => Err(self.unexpected()),
        }
    }

    fn check_op(&self, op: &str) -> bool {
        self.peek().is_some_and(|t| t.is_op(op))
    }

    fn eat_op(&mut self, op: &str) -> bool {
        let found = self.check_op(op);
        if found {
            self.pos += 1;
        }
        found
    }

    fn check_keyword(&self, keyword: &str) -> bool {
        self.peek().is_some_and(|t| t.is_name(keyword))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        let found = self.check_keyword(keyword);
        if found {
            self.pos += 1;
        }
        found
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.error(format!("expected `{keyword}`")))
        }
    }

    fn check_close(&self, close: &str) -> bool {
        self.peek()
            .is_some_and(|t| t.kind == TokenKind::Close && t.text == close)
    }

    fn eat_open(&mut self, open: &str) -> bool {
        let found = self
            .peek()
            .is_some_and(|t| t.kind == TokenKind::Open && t.text == open);
        if found {
            self.pos += 1;
        }
        found
    }

    fn expect_close(&mut self, close: &str) -> Result<()> {
        if self.check_close(close) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected `{close}`")))
        }
    }

    fn identifier(&mut self) -> Result<String> {
        match self.peek() {
            Some(t) if t.kind == TokenKind::Name && !is_keyword(t.text) => {
                self.pos += 1;
                Ok(t.text.to_string())
            }
            _ => Err(self.error("expected an identifier")),
        }
    }

    /// True if the next token can begin an expression
    fn starts_expression(&self) -> bool {
        match self.peek() {
            None => false,
            Some(t) => match t.kind {
                TokenKind::Name => {
                    !is_keyword(t.text) || matches!(t.text, "not" | "True" | "False" | "None")
                }
                TokenKind::Number | TokenKind::Str | TokenKind::Open => true,
                TokenKind::Op => matches!(t.text, "-" | "+"),
                _ => false,
            },
        }
    }

    fn expression_list(&mut self) -> Result<Expr> {
        let first = self.expression()?;
        if !self.check_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if !self.starts_expression() {
                break;
            }
            items.push(self.expression()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn expression(&mut self) -> Result<Expr> {
        let body = self.or_expr()?;
        if !self.eat_keyword("if") {
            return Ok(body);
        }
        let test = self.or_expr()?;
        self.expect_keyword("else")?;
        let orelse = self.expression()?;
        Ok(Expr::Cond {
            test: Box::new(test),
            body: Box::new(body),
            orelse: Box::new(orelse),
        })
    }

    fn or_expr(&mut self) -> Result<Expr> {
        let mut left = self.and_expr()?;
        while self.eat_keyword("or") {
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr> {
        let mut left = self.not_expr()?;
        while self.eat_keyword("and") {
            let right = self.not_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr> {
        if self.eat_keyword("not") {
            let operand = self.not_expr()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.comparison()
    }

    fn compare_op(&mut self) -> Option<CompareOp> {
        let token = self.peek()?;
        let op = match (token.kind, token.text) {
            (TokenKind::Op, "==") => CompareOp::Eq,
            (TokenKind::Op, "!=") => CompareOp::NotEq,
            (TokenKind::Op, "<") => CompareOp::Lt,
            (TokenKind::Op, "<=") => CompareOp::LtE,
            (TokenKind::Op, ">") => CompareOp::Gt,
            (TokenKind::Op, ">=") => CompareOp::GtE,
            (TokenKind::Name, "in") => CompareOp::In,
            (TokenKind::Name, "not") if self.peek_at(1).is_some_and(|t| t.is_name("in")) => {
                self.pos += 1;
                CompareOp::NotIn
            }
            (TokenKind::Name, "is") if self.peek_at(1).is_some_and(|t| t.is_name("not")) => {
                self.pos += 1;
                CompareOp::IsNot
            }
            (TokenKind::Name, "is") => CompareOp::Is,
            _ => return None,
        };
        self.pos += 1;
        Some(op)
    }

    fn comparison(&mut self) -> Result<Expr> {
        let left = self.arith()?;
        let mut links = Vec::new();
        while let Some(op) = self.compare_op() {
            links.push((op, self.arith()?));
        }
        if links.is_empty() {
            return Ok(left);
        }
        Ok(Expr::Compare {
            left: Box::new(left),
            links,
        })
    }

    fn binary_op(&self, ops: &[(&str, BinaryOp)]) -> Option<BinaryOp> {
        let token = self.peek()?;
        if token.kind != TokenKind::Op {
            return None;
        }
        ops.iter().find(|(text, _)| *text == token.text).map(|(_, op)| *op)
    }

    fn arith(&mut self) -> Result<Expr> {
        let mut left = self.term()?;
        while let Some(op) = self.binary_op(&[("+", BinaryOp::Add), ("-", BinaryOp::Sub)]) {
            self.pos += 1;
            let right = self.term()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<Expr> {
        let mut left = self.factor()?;
        while let Some(op) = self.binary_op(&[
            ("*", BinaryOp::Mul),
            ("/", BinaryOp::Div),
            ("//", BinaryOp::FloorDiv),
            ("%", BinaryOp::Mod),
        ]) {
            self.pos += 1;
            let right = self.factor()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn factor(&mut self) -> Result<Expr> {
        let op = if self.eat_op("-") {
            UnaryOp::Neg
        } else if self.eat_op("+") {
            UnaryOp::Pos
        } else {
            return self.power();
        };
        let operand = self.factor()?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn power(&mut self) -> Result<Expr> {
        let base = self.primary()?;
        if !self.eat_op("**") {
            return Ok(base);
        }
        let exponent = self.factor()?;
        Ok(Expr::Binary {
            op: BinaryOp::Pow,
            left: Box::new(base),
            right: Box::new(exponent),
        })
    }

    fn primary(&mut self) -> Result<Expr> {
        let mut expr = self.atom()?;
        loop {
            let Some(token) = self.peek() else {
                return Ok(expr);
            };
            match (token.kind, token.text) {
                (TokenKind::Dot, _) => {
                    self.pos += 1;
                    let name = match self.advance() {
                        Some(t) if t.kind == TokenKind::Name => t.text.to_string(),
                        _ => return Err(self.error("expected an attribute name after `.`")),
                    };
                    expr = Expr::Attr {
                        value: Box::new(expr),
                        name,
                    };
                }
                (TokenKind::Open, "(") => {
                    self.pos += 1;
                    let (args, kwargs) = self.call_args()?;
                    expr = Expr::Call {
                        func: Box::new(expr),
                        args,
                        kwargs,
                    };
                }
                (TokenKind::Open, "[") => {
                    self.pos += 1;
                    let index = self.subscript()?;
                    self.expect_close("]")?;
                    expr = Expr::Index {
                        value: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn call_args(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>)> {
        let mut args = Vec::new();
        let mut kwargs: Vec<(String, Expr)> = Vec::new();
        while !self.check_close(")") {
            let keyword = match (self.peek(), self.peek_at(1)) {
                (Some(name), Some(eq)) if name.kind == TokenKind::Name && eq.is_op("=") => {
                    Some(name.text.to_string())
                }
                _ => None,
            };
            match keyword {
                Some(name) => {
                    if kwargs.iter().any(|(existing, _)| *existing == name) {
                        return Err(self.error(format!("keyword argument repeated: {name}")));
                    }
                    self.pos += 2;
                    kwargs.push((name, self.expression()?));
                }
                None if !kwargs.is_empty() => {
                    return Err(self.error("positional argument follows keyword argument"));
                }
                None => args.push(self.expression()?),
            }
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_close(")")?;
        Ok((args, kwargs))
    }

    fn subscript(&mut self) -> Result<Subscript> {
        let start = if self.check_op(":") {
            None
        } else {
            Some(self.expression_list()?)
        };
        if !self.eat_op(":") {
            return match start {
                Some(index) => Ok(Subscript::Index(index)),
                None => Err(self.unexpected()),
            };
        }
        let stop = if self.check_op(":") || self.check_close("]") {
            None
        } else {
            Some(self.expression()?)
        };
        let step = if self.eat_op(":") && !self.check_close("]") {
            Some(self.expression()?)
        } else {
            None
        };
        Ok(Subscript::Slice { start, stop, step })
    }

    fn sequence(&mut self, close: &str) -> Result<Vec<Expr>> {
        let mut items = Vec::new();
        while !self.check_close(close) {
            items.push(self.expression()?);
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_close(close)?;
        Ok(items)
    }

    fn atom(&mut self) -> Result<Expr> {
        let Some(token) = self.peek() else {
            return Err(self.unexpected());
        };
        match token.kind {
            TokenKind::Name => {
                let expr = match token.text {
                    "True" => Expr::Literal(Literal::Bool(true)),
                    "False" => Expr::Literal(Literal::Bool(false)),
                    "None" => Expr::Literal(Literal::None),
                    word if is_keyword(word) => return Err(self.unexpected()),
                    name => Expr::Name(name.to_string()),
                };
                self.pos += 1;
                Ok(expr)
            }
            TokenKind::Number => {
                let literal = parse_number(token.text).map_err(|message| self.error(message))?;
                self.pos += 1;
                Ok(Expr::Literal(literal))
            }
            TokenKind::Str => {
                let mut text = String::new();
                while let Some(t) = self.peek().filter(|t| t.kind == TokenKind::Str) {
                    text.push_str(&decode_string(t.text).map_err(|message| self.error(message))?);
                    self.pos += 1;
                }
                Ok(Expr::Literal(Literal::Str(text)))
            }
            TokenKind::Open => {
                self.pos += 1;
                match token.text {
                    "(" => self.paren(),
                    "[" => Ok(Expr::List(self.sequence("]")?)),
                    _ => self.dict(),
                }
            }
            _ => Err(self.unexpected()),
        }
    }

    fn paren(&mut self) -> Result<Expr> {
        if self.check_close(")") {
            self.pos += 1;
            return Ok(Expr::Tuple(Vec::new()));
        }
        let first = self.expression()?;
        if self.check_close(")") {
            self.pos += 1;
            return Ok(first);
        }
        if !self.eat_op(",") {
            return Err(self.error("expected `)`"));
        }
        let mut items = vec![first];
        items.extend(self.sequence(")")?);
        Ok(Expr::Tuple(items))
    }

    fn dict(&mut self) -> Result<Expr> {
        let mut entries = Vec::new();
        while !self.check_close("}") {
            let key = self.expression()?;
            if !self.eat_op(":") {
                return Err(self.error("expected `:` in dict literal"));
            }
            let value = self.expression()?;
            entries.push((key, value));
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_close("}")?;
        Ok(Expr::Dict(entries))
    }

    fn target(&mut self) -> Result<Target> {
        for (open, close) in [("(", ")"), ("[", "]")] {
            if self.eat_open(open) {
                let target = self.target_list()?;
                self.expect_close(close)?;
                return Ok(target);
            }
        }
        Ok(Target::Name(self.identifier()?))
    }

    fn target_list(&mut self) -> Result<Target> {
        let first = self.target()?;
        if !self.check_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            let more = self.peek().is_some_and(|t| {
                t.kind == TokenKind::Open || (t.kind == TokenKind::Name && !is_keyword(t.text))
            });
            if !more {
                break;
            }
            items.push(self.target()?);
        }
        Ok(Target::Tuple(items))
    }

    fn params(&mut self, close: Option<&str>) -> Result<Vec<Param>> {
        let mut params: Vec<Param> = Vec::new();
        loop {
            let at_end = match close {
                Some(close) => self.check_close(close),
                None => self.peek().is_none(),
            };
            if at_end {
                break;
            }
            let name = self.identifier()?;
            if params.iter().any(|p| p.name == name) {
                return Err(self.error(format!("duplicate parameter `{name}`")));
            }
            let default = if self.eat_op("=") {
                Some(self.expression()?)
            } else if params.iter().any(|p| p.default.is_some()) {
                return Err(self.error("non-default parameter follows default parameter"));
            } else {
                None
            };
            params.push(Param { name, default });
            if !self.eat_op(",") {
                break;
            }
        }
        Ok(params)
    }
}

fn parse_number(text: &str) -> std::result::Result<Literal, String> {
    let digits = text.replace('_', "");
    let lower = digits.to_ascii_lowercase();
    let radix = match lower.get(..2) {
        Some("0x") => Some(16),
        Some("0o") => Some(8),
        Some("0b") => Some(2),
        _ => None,
    };
    if let Some(radix) = radix {
        return i64::from_str_radix(&lower[2..], radix)
            .map(Literal::Int)
            .map_err(|_| format!("invalid number literal `{text}`"));
    }
    if lower.contains(['.', 'e']) {
        return lower
            .parse::<f64>()
            .map(Literal::Float)
            .map_err(|_| format!("invalid number literal `{text}`"));
    }
    lower
        .parse::<i64>()
        .map(Literal::Int)
        .map_err(|_| format!("integer literal `{text}` is too large"))
}

/// Decode a quoted string token, including its prefix, into its value
pub fn decode_string(token: &str) -> std::result::Result<String, String> {
    let quote_at = token.find(['\'', '"']).unwrap_or(0);
    let raw = token[..quote_at].contains(['r', 'R']);
    let quoted = &token[quote_at..];
    let quote_len = if quoted.starts_with("'''") || quoted.starts_with("\"\"\"") {
        3
    } else {
        1
    };
    if quoted.len() < 2 * quote_len {
        return Err("malformed string literal".to_string());
    }
    let body = &quoted[quote_len..quoted.len() - quote_len];
    if raw {
        return Ok(body.to_string());
    }
    unescape(body)
}

fn unescape(body: &str) -> std::result::Result<String, String> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('a') => out.push('\x07'),
            Some('b') => out.push('\x08'),
            Some('f') => out.push('\x0c'),
            Some('v') => out.push('\x0b'),
            Some(c @ ('\\' | '\'' | '"')) => out.push(c),
            Some('\n') => {}
            Some(kind @ ('x' | 'u' | 'U')) => {
                let width = match kind {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let digits: String = chars.by_ref().take(width).collect();
                let decoded = (digits.len() == width)
                    .then(|| u32::from_str_radix(&digits, 16).ok())
                    .flatten()
                    .and_then(char::from_u32)
                    .ok_or_else(|| format!("invalid \\{kind} escape"))?;
                out.push(decoded);
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(n: &str) -> Expr {
        Expr::Name(n.to_string())
    }

    fn int(i: i64) -> Expr {
        Expr::Literal(Literal::Int(i))
    }

    #[test]
    fn test_precedence_of_arithmetic() {
        let expr = parse_expression("1 + 2 * 3").unwrap();
        assert_eq!(
            expr,
            Expr::Binary {
                op: BinaryOp::Add,
                left: Box::new(int(1)),
                right: Box::new(Expr::Binary {
                    op: BinaryOp::Mul,
                    left: Box::new(int(2)),
                    right: Box::new(int(3)),
                }),
            }
        );
    }

    #[test]
    fn test_unary_minus_binds_looser_than_power() {
        let expr = parse_expression("-2 ** 2").unwrap();
        assert!(matches!(expr, Expr::Unary { op: UnaryOp::Neg, .. }));
    }

    #[test]
    fn test_attribute_call_and_index_chain() {
        let expr = parse_expression("user.items()[0].name").unwrap();
        let Expr::Attr { value, name: attr } = expr else {
            panic!("expected attribute access");
        };
        assert_eq!(attr, "name");
        assert!(matches!(*value, Expr::Index { .. }));
    }

    #[test]
    fn test_call_with_keyword_arguments() {
        let expr = parse_expression("f(1, x=2)").unwrap();
        assert_eq!(
            expr,
            Expr::Call {
                func: Box::new(name("f")),
                args: vec![int(1)],
                kwargs: vec![("x".to_string(), int(2))],
            }
        );
        assert!(parse_expression("f(x=1, 2)").is_err());
    }

    #[test]
    fn test_chained_comparison_and_membership() {
        let expr = parse_expression("0 < x <= 10 and y not in z").unwrap();
        let Expr::And(left, right) = expr else {
            panic!("expected `and`");
        };
        assert!(matches!(*left, Expr::Compare { ref links, .. } if links.len() == 2));
        assert!(
            matches!(*right, Expr::Compare { ref links, .. } if links[0].0 == CompareOp::NotIn)
        );
    }

    #[test]
    fn test_conditional_expression() {
        let expr = parse_expression("'a' if ok else 'b'").unwrap();
        assert!(matches!(expr, Expr::Cond { .. }));
    }

    #[test]
    fn test_collections_and_slices() {
        assert_eq!(
            parse_expression("[1, 2,]").unwrap(),
            Expr::List(vec![int(1), int(2)])
        );
        assert_eq!(parse_expression("(1,)").unwrap(), Expr::Tuple(vec![int(1)]));
        assert_eq!(parse_expression("(1)").unwrap(), int(1));
        assert!(matches!(parse_expression("{'a': 1}").unwrap(), Expr::Dict(ref e) if e.len() == 1));
        let Expr::Index { index, .. } = parse_expression("s[1:-1]").unwrap() else {
            panic!("expected a subscript");
        };
        assert!(matches!(*index, Subscript::Slice { step: None, .. }));
    }

    #[test]
    fn test_string_literals() {
        assert_eq!(
            parse_expression(r#""a\tb" 'c'"#).unwrap(),
            Expr::Literal(Literal::Str("a\tbc".to_string()))
        );
        assert_eq!(decode_string(r"r'\d+'").unwrap(), r"\d+");
        assert_eq!(decode_string(r"'é'").unwrap(), "é");
        assert_eq!(decode_string("'''x'y'''").unwrap(), "x'y");
    }

    #[test]
    fn test_number_literals() {
        assert_eq!(parse_expression("0x1F").unwrap(), int(31));
        assert_eq!(parse_expression("1_000").unwrap(), int(1000));
        assert_eq!(
            parse_expression("2.5e1").unwrap(),
            Expr::Literal(Literal::Float(25.0))
        );
        assert!(parse_expression("99999999999999999999").is_err());
    }

    #[test]
    fn test_keywords_are_not_names() {
        assert!(parse_expression("for").is_err());
        assert!(parse_expression("a b").is_err());
        assert_eq!(
            parse_expression("None").unwrap(),
            Expr::Literal(Literal::None)
        );
    }

    #[test]
    fn test_for_header() {
        let (target, iter) = parse_for_header("for k, v in d.items()").unwrap();
        assert_eq!(
            target,
            Target::Tuple(vec![Target::Name("k".into()), Target::Name("v".into())])
        );
        assert!(matches!(iter, Expr::Call { .. }));
        assert!(parse_for_header("for 1 in x").is_err());
    }

    #[test]
    fn test_params_and_def_header() {
        let params = parse_params("(name, title='x')").unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].default, None);
        assert!(params[1].default.is_some());
        assert!(parse_params("(a=1, b)").is_err());
        assert!(parse_params("(a, a)").is_err());

        let (name, params) = parse_def_header("def link(url, text=None)").unwrap();
        assert_eq!(name, "link");
        assert_eq!(params.len(), 2);
        assert!(parse_def_header("def with (x)").is_err());
    }

    #[test]
    fn test_simple_statements() {
        assert_eq!(
            parse_simple_statement("a = b = 1").unwrap(),
            Stmt::Assign {
                targets: vec![Target::Name("a".into()), Target::Name("b".into())],
                value: int(1),
            }
        );
        assert_eq!(
            parse_simple_statement("total += x").unwrap(),
            Stmt::AugAssign {
                name: "total".into(),
                op: BinaryOp::Add,
                value: name("x"),
            }
        );
        assert!(matches!(
            parse_simple_statement("x, y = 1, 2").unwrap(),
            Stmt::Assign { ref targets, .. } if matches!(targets[0], Target::Tuple(_))
        ));
        assert!(matches!(
            parse_simple_statement("f(x)").unwrap(),
            Stmt::Expr(Expr::Call { .. })
        ));
        assert!(parse_simple_statement("f(x) = 1").is_err());
    }

    #[test]
    fn test_return_and_keyword_expressions() {
        assert_eq!(parse_return("return").unwrap(), None);
        assert_eq!(parse_return("return 1").unwrap(), Some(int(1)));
        assert_eq!(parse_keyword_expression("while n", "while").unwrap(), name("n"));
    }

    #[test]
    fn test_error_offsets_point_at_the_problem() {
        let err = parse_expression("a + )").unwrap_err();
        assert_eq!(err.offset, 4);
    }
}
