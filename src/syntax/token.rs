//! Tokenizer for the embedded expression grammar.
//!
//! The expression grammar itself ignores whitespace, but the template grammar
//! around it does not: `$a.b` and `$a. b` end in different places. The
//! tokenizer therefore reports runs of spaces and tabs as explicit
//! [`TokenKind::Whitespace`] tokens, and the expression parser skips them.

use thiserror::Error;

/// Kind of a scanned token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Identifier or keyword
    Name,
    /// Integer or float literal
    Number,
    /// Quoted string literal, including its quotes and prefix
    Str,
    /// Operator or any other punctuation
    Op,
    /// `(`, `[` or `{`
    Open,
    /// `)`, `]` or `}`
    Close,
    /// `.`
    Dot,
    /// `\n`
    Newline,
    /// `# ...` up to the end of the line
    Comment,
    /// Synthetic token for spaces and tabs between other tokens
    Whitespace,
}

/// A token borrowed from the scanned text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub start: usize,
    pub end: usize,
}

impl<'a> Token<'a> {
    /// True for a `Name` token with exactly this text
    pub fn is_name(&self, name: &str) -> bool {
        self.kind == TokenKind::Name && self.text == name
    }

    /// True for an `Op` token with exactly this text
    pub fn is_op(&self, op: &str) -> bool {
        self.kind == TokenKind::Op && self.text == op
    }

    /// True if this token carries no meaning for the expression grammar
    pub fn is_trivia(&self) -> bool {
        matches!(self.kind, TokenKind::Whitespace | TokenKind::Comment)
    }
}

/// Error raised by the tokenizer in strict mode
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message} at offset {offset}")]
pub struct LexError {
    pub message: String,
    pub offset: usize,
}

/// Closing bracket for an opening one
pub fn closing_of(open: &str) -> &'static str {
    match open {
        "(" => ")",
        "[" => "]",
        _ => "}",
    }
}

const THREE_CHAR_OPS: &[&str] = &["**=", "//=", "<<=", ">>="];
const TWO_CHAR_OPS: &[&str] = &[
    "**", "//", "==", "!=", "<=", ">=", "+=", "-=", "*=", "/=", "%=", "->", "<<", ">>",
];

/// Streaming tokenizer over a single source string
pub struct Tokenizer<'a> {
    src: &'a str,
    pos: usize,
    strict: bool,
}

impl<'a> Tokenizer<'a> {
    /// Tokenizer that reports malformed string literals as errors
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            strict: true,
        }
    }

    /// Tokenizer that never fails.
    ///
    /// A quote that does not start a terminated string literal becomes a
    /// one-character `Op` token, so `$name's` scans as `name` followed by
    /// punctuation instead of failing.
    pub fn lenient(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            strict: false,
        }
    }

    /// Collect every remaining token
    pub fn collect_all(self) -> Result<Vec<Token<'a>>, LexError> {
        self.collect()
    }

    fn token(&mut self, kind: TokenKind, end: usize) -> Token<'a> {
        let start = self.pos;
        self.pos = end;
        Token {
            kind,
            text: &self.src[start..end],
            start,
            end,
        }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn scan_name(&self) -> usize {
        let rest = self.rest();
        let len = rest
            .char_indices()
            .find(|(_, c)| !(c.is_alphanumeric() || *c == '_'))
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        self.pos + len
    }

    fn scan_number(&self) -> usize {
        let bytes = self.src.as_bytes();
        let mut i = self.pos;
        let prefixed = matches!(bytes.get(i + 1), Some(b'x' | b'X' | b'o' | b'O' | b'b' | b'B'));
        if bytes[i] == b'0' && prefixed {
            i += 2;
            while i < bytes.len() && (bytes[i].is_ascii_hexdigit() || bytes[i] == b'_') {
                i += 1;
            }
            return i;
        }
        while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'_') {
            i += 1;
        }
        if i + 1 < bytes.len() && bytes[i] == b'.' && bytes[i + 1].is_ascii_digit() {
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
        }
        if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
            let mut j = i + 1;
            if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
                j += 1;
            }
            if j < bytes.len() && bytes[j].is_ascii_digit() {
                while j < bytes.len() && bytes[j].is_ascii_digit() {
                    j += 1;
                }
                i = j;
            }
        }
        i
    }

    /// End offset of a string literal whose opening quote is at `quote_at`,
    /// or `None` when it is not terminated.
    fn scan_string(&self, quote_at: usize) -> Option<usize> {
        let bytes = self.src.as_bytes();
        let quote = bytes[quote_at];
        let triple =
            bytes.get(quote_at + 1) == Some(&quote) && bytes.get(quote_at + 2) == Some(&quote);
        let mut i = quote_at + if triple { 3 } else { 1 };
        while i < bytes.len() {
            match bytes[i] {
                b'\\' => i += 2,
                b'\n' if !triple => return None,
                b if b == quote => {
                    if !triple {
                        return Some(i + 1);
                    }
                    if bytes.get(i + 1) == Some(&quote) && bytes.get(i + 2) == Some(&quote) {
                        return Some(i + 3);
                    }
                    i += 1;
                }
                _ => i += 1,
            }
        }
        None
    }

    fn string_prefix_len(&self) -> Option<usize> {
        let bytes = self.rest().as_bytes();
        let is_prefix = |b: u8| matches!(b, b'r' | b'R' | b'u' | b'U' | b'b' | b'B');
        match bytes {
            [q, ..] if *q == b'\'' || *q == b'"' => Some(0),
            [p, q, ..] if is_prefix(*p) && (*q == b'\'' || *q == b'"') => Some(1),
            _ => None,
        }
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Result<Token<'a>, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = self.rest();
        let c = rest.chars().next()?;

        if c == ' ' || c == '\t' {
            let len = rest
                .find(|ch: char| ch != ' ' && ch != '\t')
                .unwrap_or(rest.len());
            return Some(Ok(self.token(TokenKind::Whitespace, self.pos + len)));
        }
        if c == '\n' {
            return Some(Ok(self.token(TokenKind::Newline, self.pos + 1)));
        }
        if c == '#' {
            let len = rest.find('\n').unwrap_or(rest.len());
            return Some(Ok(self.token(TokenKind::Comment, self.pos + len)));
        }
        if let Some(prefix) = self.string_prefix_len() {
            let quote_at = self.pos + prefix;
            return match self.scan_string(quote_at) {
                Some(end) => Some(Ok(self.token(TokenKind::Str, end))),
                None if self.strict => {
                    let offset = self.pos;
                    self.pos = self.src.len();
                    Some(Err(LexError {
                        message: "unterminated string literal".to_string(),
                        offset,
                    }))
                }
                None if prefix == 0 => Some(Ok(self.token(TokenKind::Op, self.pos + 1))),
                None => {
                    let end = self.scan_name();
                    Some(Ok(self.token(TokenKind::Name, end)))
                }
            };
        }
        if c.is_alphabetic() || c == '_' {
            let end = self.scan_name();
            return Some(Ok(self.token(TokenKind::Name, end)));
        }
        if c.is_ascii_digit() {
            let end = self.scan_number();
            return Some(Ok(self.token(TokenKind::Number, end)));
        }
        match c {
            '(' | '[' | '{' => return Some(Ok(self.token(TokenKind::Open, self.pos + 1))),
            ')' | ']' | '}' => return Some(Ok(self.token(TokenKind::Close, self.pos + 1))),
            '.' => return Some(Ok(self.token(TokenKind::Dot, self.pos + 1))),
            _ => {}
        }
        for op in THREE_CHAR_OPS.iter().chain(TWO_CHAR_OPS) {
            if rest.starts_with(op) {
                return Some(Ok(self.token(TokenKind::Op, self.pos + op.len())));
            }
        }
        Some(Ok(self.token(TokenKind::Op, self.pos + c.len_utf8())))
    }
}

/// First meaningful-or-whitespace token of `text`, used to classify directives
pub fn first_token(text: &str) -> Option<Token<'_>> {
    Tokenizer::lenient(text).next().and_then(Result::ok)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<(TokenKind, &str)> {
        Tokenizer::new(src)
            .map(|t| t.unwrap())
            .map(|t| (t.kind, t.text))
            .collect()
    }

    #[test]
    fn test_tokenize_attribute_access_keeps_whitespace() {
        assert_eq!(
            kinds("a.b  c"),
            vec![
                (TokenKind::Name, "a"),
                (TokenKind::Dot, "."),
                (TokenKind::Name, "b"),
                (TokenKind::Whitespace, "  "),
                (TokenKind::Name, "c"),
            ]
        );
    }

    #[test]
    fn test_tokenize_operators_and_groups() {
        assert_eq!(
            kinds("f(x**2)//3 != y[0]"),
            vec![
                (TokenKind::Name, "f"),
                (TokenKind::Open, "("),
                (TokenKind::Name, "x"),
                (TokenKind::Op, "**"),
                (TokenKind::Number, "2"),
                (TokenKind::Close, ")"),
                (TokenKind::Op, "//"),
                (TokenKind::Number, "3"),
                (TokenKind::Whitespace, " "),
                (TokenKind::Op, "!="),
                (TokenKind::Whitespace, " "),
                (TokenKind::Name, "y"),
                (TokenKind::Open, "["),
                (TokenKind::Number, "0"),
                (TokenKind::Close, "]"),
            ]
        );
    }

    #[test]
    fn test_tokenize_strings_with_brackets_inside() {
        let tokens = kinds(r#""weird string[)." 'it\'s'"#);
        assert_eq!(tokens[0], (TokenKind::Str, r#""weird string[).""#));
        assert_eq!(tokens[2], (TokenKind::Str, r"'it\'s'"));
    }

    #[test]
    fn test_tokenize_numbers() {
        assert_eq!(
            kinds("1.5e3 0x1F 7."),
            vec![
                (TokenKind::Number, "1.5e3"),
                (TokenKind::Whitespace, " "),
                (TokenKind::Number, "0x1F"),
                (TokenKind::Whitespace, " "),
                (TokenKind::Number, "7"),
                (TokenKind::Dot, "."),
            ]
        );
    }

    #[test]
    fn test_strict_mode_rejects_unterminated_string() {
        let result: Result<Vec<_>, _> = Tokenizer::new("'abc\n").collect();
        assert!(result.is_err());
    }

    #[test]
    fn test_lenient_mode_turns_stray_quote_into_op() {
        let tokens: Vec<_> = Tokenizer::lenient("name's house")
            .map(|t| t.unwrap())
            .collect();
        assert_eq!(tokens[0].text, "name");
        assert_eq!(tokens[1].kind, TokenKind::Op);
        assert_eq!(tokens[1].text, "'");
    }

    #[test]
    fn test_first_token_classification() {
        assert!(first_token("for i in x:").unwrap().is_name("for"));
        assert_eq!(first_token(" x = 1").unwrap().kind, TokenKind::Whitespace);
        assert_eq!(first_token("\n").unwrap().kind, TokenKind::Newline);
        assert!(first_token("").is_none());
    }
}
