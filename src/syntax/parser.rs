//! Section reader and template parser.
//!
//! Splits normalized template text into [`Section`]s. A line starting with
//! `$` followed by a keyword opens a block, a flow statement, a `$var` or a
//! raw assignment; every other line is read piece by piece into a `Line` of
//! text and expressions. Block bodies are either the rest of the header line
//! or the following indented region, parsed recursively.

use tracing::trace;

use super::errors::ParseError;
use super::scanner::{normalize_expr, read_expr};
use super::section::{BlockKeyword, Document, FlowKeyword, Section, VarValue};
use super::token::{LexError, Token, TokenKind, Tokenizer, first_token};

/// Width that block bodies are clipped to, in spaces
pub const INDENT: usize = 4;

/// Split `text` after its first newline
pub fn splitline(text: &str) -> (&str, &str) {
    match text.find('\n') {
        Some(index) => text.split_at(index + 1),
        None => (text, ""),
    }
}

fn count_lines(text: &str) -> usize {
    text.bytes().filter(|b| *b == b'\n').count()
}

fn leading_spaces(line: &str) -> usize {
    line.len() - line.trim_start_matches(' ').len()
}

/// Read the indented region at the start of `text`, removing `width`
/// leading spaces from every line. Blank lines belong to the region.
pub fn read_indented_block(text: &str, width: usize) -> (String, &str) {
    if width == 0 {
        return (String::new(), text);
    }
    let mut block = String::new();
    let mut rest = text;
    while !rest.is_empty() {
        let (line, next) = splitline(rest);
        if line.trim().is_empty() {
            block.push('\n');
        } else if leading_spaces(line) >= width {
            block.push_str(&line[width..]);
        } else {
            break;
        }
        rest = next;
    }
    (block, rest)
}

/// Split a block header line at its terminating `:`, skipping colons
/// nested inside groups. Returns the header without the colon and the text
/// after it, or `None` when the line has no such colon.
pub fn split_header(content: &str) -> Result<Option<(&str, &str)>, LexError> {
    let mut depth = 0usize;
    for token in Tokenizer::new(content) {
        let token = token?;
        match token.kind {
            TokenKind::Open => depth += 1,
            TokenKind::Close => depth = depth.saturating_sub(1),
            TokenKind::Op if token.text == ":" && depth == 0 => {
                return Ok(Some((content[..token.start].trim_end(), &content[token.end..])));
            }
            TokenKind::Newline if depth == 0 => break,
            _ => {}
        }
    }
    Ok(None)
}

/// Template parser bound to a template name used in error messages
pub struct Parser<'n> {
    name: &'n str,
}

impl<'n> Parser<'n> {
    pub fn new(name: &'n str) -> Self {
        Self { name }
    }

    fn error<M: Into<String>>(&self, line: usize, message: M) -> ParseError {
        ParseError::new(self.name, line, message)
    }

    /// Parse a whole template, including the optional `$def with (...)` line
    pub fn parse(&self, text: &str) -> Result<Document, ParseError> {
        let (params, body, first_line) = match Self::defwith(text) {
            Some(rest) => {
                let (header, body) = splitline(rest);
                (Some(header.trim().to_string()), body, 2)
            }
            None => (None, text, 1),
        };
        let body = self.read_suite(body, first_line)?;
        trace!(template = self.name, sections = body.len(), "parsed template");
        Ok(Document { params, body })
    }

    fn defwith(text: &str) -> Option<&str> {
        let rest = text.strip_prefix("$def with")?;
        match rest.chars().next() {
            Some(c) if c.is_alphanumeric() || c == '_' => None,
            _ => Some(rest),
        }
    }

    /// Read sections until the text is exhausted
    pub fn read_suite(&self, mut text: &str, mut line: usize) -> Result<Vec<Section>, ParseError> {
        let mut sections = Vec::new();
        while !text.is_empty() {
            let (section, rest) = self.read_section(text, line)?;
            line += count_lines(&text[..text.len() - rest.len()]);
            sections.push(section);
            text = rest;
        }
        Ok(sections)
    }

    /// Read one section from the start of `text`
    pub fn read_section<'t>(
        &self,
        text: &'t str,
        line: usize,
    ) -> Result<(Section, &'t str), ParseError> {
        let stripped = text.trim_start_matches(' ');
        if let Some(after) = stripped.strip_prefix('$') {
            let begin_indent = &text[..text.len() - stripped.len()];
            match first_token(after) {
                Some(t) if t.is_name("var") => return self.read_var(after, begin_indent, line),
                Some(t)
                    if t.kind == TokenKind::Name
                        && (t.text == "code" || BlockKeyword::parse(t.text).is_some()) =>
                {
                    return self.read_block_section(after, begin_indent, line);
                }
                Some(t) if t.kind == TokenKind::Name && FlowKeyword::parse(t.text).is_some() => {
                    return Ok(self.read_keyword(after, line));
                }
                Some(t) if matches!(t.kind, TokenKind::Whitespace | TokenKind::Newline) => {
                    return Ok(self.read_assignment(after, line));
                }
                None => return Ok(self.read_assignment(after, line)),
                _ => {}
            }
        }
        self.readline(text, line)
    }

    /// Read one line of text and expressions. A trailing `\` suppresses the
    /// newline.
    pub fn readline<'t>(
        &self,
        text: &'t str,
        line: usize,
    ) -> Result<(Section, &'t str), ParseError> {
        let (mut content, rest) = splitline(text);
        if let Some(joined) = content.strip_suffix("\\\n") {
            content = joined;
        }
        let pieces = self.read_pieces(content, line)?;
        Ok((Section::Line { pieces, line }, rest))
    }

    fn read_pieces(&self, mut text: &str, line: usize) -> Result<Vec<Section>, ParseError> {
        let mut pieces = Vec::new();
        while !text.is_empty() {
            let (piece, rest) = self.read_node(text, line)?;
            pieces.push(piece);
            text = rest;
        }
        Ok(pieces)
    }

    fn read_node<'t>(&self, text: &'t str, line: usize) -> Result<(Section, &'t str), ParseError> {
        if let Some(rest) = text.strip_prefix("$$") {
            return Ok((Section::Text("$".to_string()), rest));
        }
        if text.starts_with("$#") {
            let (_, rest) = splitline(text);
            return Ok((Section::Text("\n".to_string()), rest));
        }
        if let Some(rest) = text.strip_prefix('$') {
            let (escape, rest) = match rest.strip_prefix(':') {
                Some(unescaped) => (false, unescaped),
                None => (true, rest),
            };
            let (code, rest) = read_expr(rest).map_err(|e| self.error(line, e.to_string()))?;
            let code = normalize_expr(code);
            if code.is_empty() {
                return Err(self.error(line, "expected an expression after `$`"));
            }
            return Ok((Section::Expression { code, escape }, rest));
        }
        let end = text.find('$').unwrap_or(text.len());
        Ok((Section::Text(text[..end].to_string()), &text[end..]))
    }

    fn read_keyword<'t>(&self, text: &'t str, line: usize) -> (Section, &'t str) {
        let (content, rest) = splitline(text);
        let code = content.trim();
        let keyword = first_token(code)
            .and_then(|t| FlowKeyword::parse(t.text))
            .unwrap_or(FlowKeyword::Pass);
        let section = Section::Statement {
            keyword,
            code: code.to_string(),
            line,
        };
        (section, rest)
    }

    fn read_assignment<'t>(&self, text: &'t str, line: usize) -> (Section, &'t str) {
        let (content, rest) = splitline(text);
        let section = Section::Assignment {
            code: content.trim().to_string(),
            line,
        };
        (section, rest)
    }

    fn tokens(text: &str) -> Vec<Token<'_>> {
        Tokenizer::lenient(text)
            .filter_map(Result::ok)
            .filter(|t| !t.is_trivia())
            .collect()
    }

    /// Read `$var name = expr`, `$var name: text` or `$var name:` followed by
    /// an indented fragment.
    fn read_var<'t>(
        &self,
        text: &'t str,
        begin_indent: &str,
        line: usize,
    ) -> Result<(Section, &'t str), ParseError> {
        let (content, rest) = splitline(text);
        let tokens = Self::tokens(content);
        if tokens.len() < 4 {
            return Err(self.error(line, "invalid var statement"));
        }
        let (name, sep) = (tokens[1], tokens[2]);
        if name.kind != TokenKind::Name {
            return Err(self.error(line, format!("invalid var name `{}`", name.text)));
        }
        if name.text == crate::runtime::record::BODY {
            return Err(self.error(line, "`body` is reserved and cannot be set with $var"));
        }
        let value_text = content[sep.end..].trim();

        if sep.is_op("=") {
            let section = Section::Var {
                name: name.text.to_string(),
                value: VarValue::Expr(value_text.to_string()),
                line,
            };
            return Ok((section, rest));
        }
        if !sep.is_op(":") {
            return Err(self.error(
                line,
                "invalid var statement: expected `=` or `:` after the name",
            ));
        }

        let (lines, rest) = if tokens[3].kind == TokenKind::Newline {
            let (block, rest) = read_indented_block(rest, begin_indent.len() + INDENT);
            let mut lines = Vec::new();
            for (offset, source) in block.lines().enumerate() {
                let number = line + 1 + offset;
                let mut pieces = self.read_pieces(source, number)?;
                pieces.push(Section::Text("\n".to_string()));
                lines.push(Section::Line { pieces, line: number });
            }
            (lines, rest)
        } else {
            let pieces = self.read_pieces(value_text, line)?;
            (vec![Section::Line { pieces, line }], rest)
        };

        let section = Section::Var {
            name: name.text.to_string(),
            value: VarValue::Fragment(lines),
            line,
        };
        Ok((section, rest))
    }

    fn read_header<'t>(
        &self,
        content: &'t str,
        line: usize,
    ) -> Result<(&'t str, &'t str), ParseError> {
        match split_header(content) {
            Ok(Some(parts)) => Ok(parts),
            Ok(None) => {
                let keyword = first_token(content).map(|t| t.text).unwrap_or_default();
                Err(self.error(line, format!("expected `:` at the end of the `${keyword}` header")))
            }
            Err(e) => Err(self.error(line, e.message)),
        }
    }

    fn read_block_section<'t>(
        &self,
        text: &'t str,
        begin_indent: &str,
        line: usize,
    ) -> Result<(Section, &'t str), ParseError> {
        let (content, mut rest) = splitline(text);
        let (header, remainder) = self.read_header(content, line)?;
        let keyword = first_token(header).map(|t| t.text).unwrap_or_default();

        let (body, body_line) = if !remainder.trim().is_empty() {
            (remainder.trim_start().to_string(), line)
        } else {
            let first_indent = rest
                .split_inclusive('\n')
                .find(|l| !l.trim().is_empty())
                .map(leading_spaces)
                .unwrap_or(0);
            let extra = first_indent.saturating_sub(begin_indent.len());
            let width = if keyword == "code" {
                begin_indent.len() + extra
            } else {
                begin_indent.len() + extra.min(INDENT)
            };
            if extra == 0 {
                (String::new(), line + 1)
            } else {
                let (block, after) = read_indented_block(rest, width);
                rest = after;
                (block, line + 1)
            }
        };

        if keyword == "code" {
            return Ok((Section::Code { text: body, line: body_line }, rest));
        }
        let Some(block_keyword) = BlockKeyword::parse(keyword) else {
            return Err(self.error(line, format!("unknown block keyword `{keyword}`")));
        };
        if body.trim().is_empty() {
            return Err(self.error(
                line,
                format!("expected an indented block after `${block_keyword}`"),
            ));
        }
        let section = Section::Block {
            keyword: block_keyword,
            header: header.to_string(),
            body: self.read_suite(&body, body_line)?,
            indent: begin_indent.to_string(),
            line,
        };
        Ok((section, rest))
    }
}
