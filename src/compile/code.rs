//! Compiler for `$code:` blocks.
//!
//! The body of a code block is a small indentation-structured statement
//! language: simple statements, `if/elif/else`, `for ... in ...` and `while`
//! (both with `else`), `def` procedures and the flow keywords. Indentation
//! must be made of spaces and every dedent must land on an enclosing level.

use std::sync::Arc;

use super::codegen::{BlockContext, CodeGen};
use super::errors::CodegenError;
use super::instr::{Branch, DefKind, FunctionDef, Instr};
use crate::expr::{
    parse_def_header, parse_for_header, parse_keyword_expression, parse_simple_statement,
};
use crate::syntax::FlowKeyword;
use crate::syntax::parser::split_header;
use crate::syntax::token::{TokenKind, Tokenizer, first_token};

const BAD_UNINDENT: &str = "unindent does not match any outer indentation level";

#[derive(Debug, Clone)]
struct LogicalLine {
    indent: usize,
    text: String,
    line: usize,
}

/// Compile the raw text of a code block starting at source line `line`
pub(crate) fn compile_code(
    codegen: &CodeGen<'_>,
    text: &str,
    line: usize,
    ctx: &BlockContext,
) -> Result<Vec<Instr>, CodegenError> {
    let lines = logical_lines(codegen, text, line)?;
    let mut block = CodeBlock {
        codegen,
        lines,
        pos: 0,
    };
    let body = block.block(0, ctx)?;
    if let Some(extra) = block.lines.get(block.pos) {
        return Err(codegen.parse_error(extra.line, BAD_UNINDENT));
    }
    Ok(body)
}

fn bracket_depth(text: &str) -> isize {
    Tokenizer::lenient(text)
        .filter_map(Result::ok)
        .map(|t| match t.kind {
            TokenKind::Open => 1,
            TokenKind::Close => -1,
            _ => 0,
        })
        .sum()
}

/// Join physical lines into statements: open brackets and a trailing `\`
/// continue onto the next line. Blank and comment-only lines are dropped.
fn logical_lines(
    codegen: &CodeGen<'_>,
    text: &str,
    first_line: usize,
) -> Result<Vec<LogicalLine>, CodegenError> {
    let mut lines = Vec::new();
    let mut pending: Option<LogicalLine> = None;

    for (offset, raw) in text.lines().enumerate() {
        let number = first_line + offset;
        let current = match pending.take() {
            Some(mut current) => {
                if current.text.ends_with('\\') {
                    current.text.pop();
                    current.text.push(' ');
                } else {
                    current.text.push('\n');
                }
                current.text.push_str(raw.trim());
                current
            }
            None => {
                let stripped = raw.trim_start_matches(' ');
                if stripped.trim().is_empty() || stripped.starts_with('#') {
                    continue;
                }
                if stripped.starts_with('\t') {
                    return Err(codegen.parse_error(
                        number,
                        "tabs are not allowed in code block indentation",
                    ));
                }
                LogicalLine {
                    indent: raw.len() - stripped.len(),
                    text: stripped.trim_end().to_string(),
                    line: number,
                }
            }
        };
        if bracket_depth(&current.text) > 0 || current.text.ends_with('\\') {
            pending = Some(current);
        } else {
            lines.push(current);
        }
    }

    if let Some(current) = pending {
        return Err(codegen.parse_error(current.line, "unterminated statement in code block"));
    }
    Ok(lines)
}

struct CodeBlock<'g, 'n> {
    codegen: &'g CodeGen<'n>,
    lines: Vec<LogicalLine>,
    pos: usize,
}

impl CodeBlock<'_, '_> {
    fn keyword(&self) -> Option<String> {
        let line = self.lines.get(self.pos)?;
        first_token(&line.text)
            .filter(|t| t.kind == TokenKind::Name)
            .map(|t| t.text.to_string())
    }

    fn block(&mut self, indent: usize, ctx: &BlockContext) -> Result<Vec<Instr>, CodegenError> {
        let mut out = Vec::new();
        while let Some(line) = self.lines.get(self.pos) {
            if line.indent < indent {
                break;
            }
            if line.indent > indent {
                return Err(self.codegen.parse_error(line.line, "unexpected indent"));
            }
            self.statement(indent, ctx, &mut out)?;
        }
        Ok(out)
    }

    fn statement(
        &mut self,
        indent: usize,
        ctx: &BlockContext,
        out: &mut Vec<Instr>,
    ) -> Result<(), CodegenError> {
        let current = self.lines[self.pos].clone();
        let keyword = self.keyword();
        if let Some(flow) = keyword.as_deref().and_then(FlowKeyword::parse) {
            self.pos += 1;
            if let Some(instr) = self.codegen.statement(flow, &current.text, current.line, ctx)? {
                out.push(instr);
            }
            return Ok(());
        }
        match keyword.as_deref() {
            Some("if") => out.push(self.if_chain(indent, ctx)?),
            Some("for") | Some("while") => out.push(self.loop_statement(indent, ctx)?),
            Some("def") => {
                let (header, body, line) = self.compound(indent, &ctx.clone().function())?;
                let (name, params) =
                    parse_def_header(&header).map_err(|e| self.codegen.compile_error(line, e))?;
                out.push(Instr::Def(Arc::new(FunctionDef {
                    name,
                    params,
                    body,
                    kind: DefKind::Procedure,
                })));
            }
            Some(word @ ("elif" | "else")) => {
                return Err(self
                    .codegen
                    .parse_error(current.line, format!("`{word}` without a matching block")));
            }
            _ => {
                self.pos += 1;
                let stmt = parse_simple_statement(&current.text)
                    .map_err(|e| self.codegen.compile_error(current.line, e))?;
                out.push(Instr::Exec(stmt));
            }
        }
        Ok(())
    }

    /// Read a compound statement header and its body. Returns the header
    /// text without the colon, the compiled body and the header's line.
    fn compound(
        &mut self,
        indent: usize,
        ctx: &BlockContext,
    ) -> Result<(String, Vec<Instr>, usize), CodegenError> {
        let LogicalLine { text, line, .. } = self.lines[self.pos].clone();
        self.pos += 1;
        let (header, rest) = match split_header(&text) {
            Ok(Some((header, rest))) => (header.to_string(), rest.trim().to_string()),
            Ok(None) => {
                let message = "expected `:` after the statement header";
                return Err(self.codegen.parse_error(line, message));
            }
            Err(e) => return Err(self.codegen.parse_error(line, e.message)),
        };

        if !rest.is_empty() {
            let mut inline = CodeBlock {
                codegen: self.codegen,
                lines: vec![LogicalLine {
                    indent: 0,
                    text: rest,
                    line,
                }],
                pos: 0,
            };
            return Ok((header, inline.block(0, ctx)?, line));
        }

        let width = match self.lines.get(self.pos) {
            Some(next) if next.indent > indent => next.indent,
            _ => return Err(self.codegen.parse_error(line, "expected an indented block")),
        };
        let body = self.block(width, ctx)?;
        if let Some(after) = self.lines.get(self.pos) {
            if after.indent > indent {
                return Err(self.codegen.parse_error(after.line, BAD_UNINDENT));
            }
        }
        Ok((header, body, line))
    }

    /// `else:` clause at this indent, if one follows
    fn else_clause(
        &mut self,
        indent: usize,
        ctx: &BlockContext,
    ) -> Result<Option<Vec<Instr>>, CodegenError> {
        let at_indent = self.lines.get(self.pos).is_some_and(|l| l.indent == indent);
        if !at_indent || self.keyword().as_deref() != Some("else") {
            return Ok(None);
        }
        let (header, body, line) = self.compound(indent, ctx)?;
        if header.trim() != "else" {
            return Err(self.codegen.compile_error(line, format!("unexpected text in `{header}`")));
        }
        Ok(Some(body))
    }

    fn if_chain(&mut self, indent: usize, ctx: &BlockContext) -> Result<Instr, CodegenError> {
        let mut branches = Vec::new();
        let mut word = "if";
        loop {
            let (header, body, line) = self.compound(indent, ctx)?;
            let test = parse_keyword_expression(&header, word)
                .map_err(|e| self.codegen.compile_error(line, e))?;
            branches.push(Branch { test, body });

            let at_indent = self.lines.get(self.pos).is_some_and(|l| l.indent == indent);
            if !(at_indent && self.keyword().as_deref() == Some("elif")) {
                break;
            }
            word = "elif";
        }
        let otherwise = self.else_clause(indent, ctx)?;
        Ok(Instr::If {
            branches,
            otherwise,
        })
    }

    fn loop_statement(&mut self, indent: usize, ctx: &BlockContext) -> Result<Instr, CodegenError> {
        let (header, body, line) = self.compound(indent, &ctx.clone().looping())?;
        let otherwise = self.else_clause(indent, ctx)?;
        if header.starts_with("for") {
            let (target, iter) =
                parse_for_header(&header).map_err(|e| self.codegen.compile_error(line, e))?;
            return Ok(Instr::For {
                target,
                iter,
                body,
                otherwise,
                track: false,
            });
        }
        let test = parse_keyword_expression(&header, "while")
            .map_err(|e| self.codegen.compile_error(line, e))?;
        Ok(Instr::While {
            test,
            body,
            otherwise,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::instr::Program;
    use crate::syntax::Parser;

    fn compile(text: &str) -> Result<Program, CodegenError> {
        let document = Parser::new("code.html").parse(text)?;
        CodeGen::new("code.html").program(&document)
    }

    #[test]
    fn test_code_block_defines_procedures() {
        let program =
            compile("$code:\n    x = 1\n    def double(a):\n        return a * 2\n").unwrap();
        assert!(matches!(program.body[0], Instr::Exec(_)));
        let Instr::Def(def) = &program.body[1] else {
            panic!("expected a def, got {:?}", program.body);
        };
        assert_eq!(def.kind, DefKind::Procedure);
        assert_eq!(def.body.len(), 1);
    }

    #[test]
    fn test_code_block_control_flow() {
        let program = compile(concat!(
            "$code:\n",
            "  total = 0\n",
            "  for x in xs:\n",
            "    if x > 2:\n",
            "      break\n",
            "    elif x:\n",
            "      total += x\n",
            "    else:\n",
            "      pass\n",
            "  else:\n",
            "    total = -1\n",
        ))
        .unwrap();
        let Instr::For {
            body,
            otherwise,
            track,
            ..
        } = &program.body[1]
        else {
            panic!("expected a loop");
        };
        assert!(!*track);
        assert!(otherwise.is_some());
        let Instr::If {
            branches,
            otherwise,
        } = &body[0]
        else {
            panic!("expected an if");
        };
        assert_eq!(branches.len(), 2);
        assert_eq!(otherwise, &Some(Vec::new()));
    }

    #[test]
    fn test_inconsistent_dedent_is_a_parse_error() {
        let err = compile("$code:\n    if x:\n        y = 1\n      z = 2\n").unwrap_err();
        assert!(matches!(err, CodegenError::Parse(ref e) if e.line == 4), "{err:?}");
    }

    #[test]
    fn test_unexpected_indent_is_a_parse_error() {
        let err = compile("$code:\n    x = 1\n      y = 2\n").unwrap_err();
        assert!(matches!(err, CodegenError::Parse(ref e) if e.line == 3), "{err:?}");
    }

    #[test]
    fn test_bracket_continuation_and_comments() {
        let program = compile(
            "$code:\n    # setup\n    items = [\n        1,\n        2]\n    n = len(items)\n",
        )
        .unwrap();
        assert_eq!(program.body.len(), 2);
    }

    #[test]
    fn test_one_line_compound_statement() {
        let program = compile("$code:\n    if ready: count = 1\n").unwrap();
        let Instr::If { branches, .. } = &program.body[0] else {
            panic!("expected an if");
        };
        assert!(matches!(branches[0].body[0], Instr::Exec(_)));
    }

    #[test]
    fn test_flow_keywords_are_checked() {
        assert!(matches!(
            compile("$code:\n    break\n"),
            Err(CodegenError::Compile(_))
        ));
        assert!(matches!(
            compile("$code:\n    return 5\n"),
            Err(CodegenError::Compile(_))
        ));
        assert!(compile("$code:\n    while True:\n        break\n").is_ok());
    }

    #[test]
    fn test_malformed_statement_reports_its_line() {
        let err = compile("a\n$code:\n    x = 1\n    y = = 2\n").unwrap_err();
        assert!(matches!(err, CodegenError::Compile(ref e) if e.line == 4), "{err:?}");
    }
}
