//! Expression scanner.
//!
//! Finds where an embedded expression ends inside literal text:
//!
//! ```text
//! expr          -> simple_expr | group
//! simple_expr   -> token extended
//! extended      -> '.' NAME extended | group extended | ''
//! group         -> '(' tokens ')' | '[' tokens ']' | '{' tokens '}'
//! ```
//!
//! The scanner only decides the extent of the expression; parsing its
//! meaning happens later in [`crate::expr::parser`].

use thiserror::Error;

use super::token::{Token, TokenKind, Tokenizer, closing_of};

/// Error raised when an expression cannot be delimited
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScanError {
    #[error("unterminated `{0}` in expression")]
    Unterminated(String),

    #[error("expected an expression after `$`")]
    Empty,
}

/// Token stream with two tokens of lookahead
struct Lookahead<'a> {
    tokens: Tokenizer<'a>,
    buffer: Vec<Token<'a>>,
    last_end: usize,
}

impl<'a> Lookahead<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            tokens: Tokenizer::lenient(text),
            buffer: Vec::with_capacity(2),
            last_end: 0,
        }
    }

    fn fill(&mut self, n: usize) {
        while self.buffer.len() < n {
            match self.tokens.next() {
                Some(Ok(token)) => self.buffer.push(token),
                _ => break,
            }
        }
    }

    fn peek(&mut self) -> Option<Token<'a>> {
        self.fill(1);
        self.buffer.first().copied()
    }

    fn peek2(&mut self) -> Option<Token<'a>> {
        self.fill(2);
        self.buffer.get(1).copied()
    }

    fn advance(&mut self) -> Option<Token<'a>> {
        self.fill(1);
        if self.buffer.is_empty() {
            return None;
        }
        let token = self.buffer.remove(0);
        self.last_end = token.end;
        Some(token)
    }

    fn group(&mut self) -> Result<(), ScanError> {
        let open = self.advance().map(|t| t.text).unwrap_or("(");
        let close = closing_of(open);
        loop {
            match self.peek() {
                None => return Err(ScanError::Unterminated(open.to_string())),
                Some(t) if t.kind == TokenKind::Open => self.group()?,
                Some(t) => {
                    self.advance();
                    if t.kind == TokenKind::Close && t.text == close {
                        return Ok(());
                    }
                }
            }
        }
    }

    fn extended(&mut self) -> Result<(), ScanError> {
        loop {
            match self.peek() {
                Some(t) if t.kind == TokenKind::Dot => {
                    match self.peek2() {
                        Some(next) if next.kind == TokenKind::Name => {
                            self.advance();
                            self.advance();
                        }
                        _ => return Ok(()),
                    }
                }
                Some(t) if t.kind == TokenKind::Open => self.group()?,
                _ => return Ok(()),
            }
        }
    }
}

/// Split `text` (the text right after a sigil) into the expression and the
/// remaining text. Spaces between the sigil and the expression are skipped.
///
/// ```
/// use sigil_template::syntax::scanner::read_expr;
///
/// assert_eq!(read_expr("a.b and c").unwrap(), ("a.b", " and c"));
/// assert_eq!(read_expr("name.").unwrap(), ("name", "."));
/// assert_eq!(read_expr("(limit)ing").unwrap(), ("(limit)", "ing"));
/// ```
pub fn read_expr(text: &str) -> Result<(&str, &str), ScanError> {
    let mut tokens = Lookahead::new(text);
    while tokens.peek().is_some_and(|t| t.kind == TokenKind::Whitespace) {
        tokens.advance();
    }
    match tokens.peek() {
        None => return Err(ScanError::Empty),
        Some(t) if t.kind == TokenKind::Open => tokens.group()?,
        Some(_) => {
            tokens.advance();
            tokens.extended()?;
        }
    }
    let end = tokens.last_end;
    Ok((&text[..end], &text[end..]))
}

/// Normalize scanned expression text: trims it and rewrites `{...}` to
/// `(...)` so `${a + b}` behaves like `$(a + b)`.
pub fn normalize_expr(expr: &str) -> String {
    let trimmed = expr.trim();
    match trimmed.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
        Some(inner) => format!("({inner})"),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_simple_name() {
        assert_eq!(read_expr("name").unwrap(), ("name", ""));
        assert_eq!(read_expr("name</h1>").unwrap(), ("name", "</h1>"));
    }

    #[test]
    fn test_read_attribute_chain_stops_at_space_after_dot() {
        assert_eq!(read_expr("a.b and c").unwrap(), ("a.b", " and c"));
        assert_eq!(read_expr("a. b").unwrap(), ("a", ". b"));
        assert_eq!(read_expr("user.name.\n").unwrap(), ("user.name", ".\n"));
    }

    #[test]
    fn test_read_group_first() {
        assert_eq!(read_expr("(limit)ing").unwrap(), ("(limit)", "ing"));
        assert_eq!(read_expr("{a + b} rest").unwrap(), ("{a + b}", " rest"));
    }

    #[test]
    fn test_read_calls_and_indexes() {
        let text = r#"a[1, 2][:3].f(1+2, "weird string[).", 3 + 4) done."#;
        assert_eq!(
            read_expr(text).unwrap(),
            (r#"a[1, 2][:3].f(1+2, "weird string[).", 3 + 4)"#, " done.")
        );
    }

    #[test]
    fn test_read_stops_at_apostrophe() {
        assert_eq!(read_expr("name's house").unwrap(), ("name", "'s house"));
    }

    #[test]
    fn test_unterminated_group_is_an_error() {
        assert_eq!(
            read_expr("f(a, b\n"),
            Err(ScanError::Unterminated("(".to_string()))
        );
    }

    #[test]
    fn test_empty_input_is_an_error() {
        assert_eq!(read_expr(""), Err(ScanError::Empty));
        assert_eq!(read_expr("   "), Err(ScanError::Empty));
    }

    #[test]
    fn test_leading_spaces_are_skipped() {
        let (code, rest) = read_expr(" b c").unwrap();
        assert_eq!((normalize_expr(code).as_str(), rest), ("b", " c"));
    }

    #[test]
    fn test_normalize_expr_rewrites_braces() {
        assert_eq!(normalize_expr("{a + b}"), "(a + b)");
        assert_eq!(normalize_expr(" name "), "name");
    }
}
