//! Lowers parsed sections into instructions.
//!
//! Embedded expressions are parsed here, so a malformed expression surfaces
//! as a [`CompileError`] carrying the template name and source line. Each
//! emitted line is prefixed with the indentation its enclosing block headers
//! contributed, which keeps nested markup indented in the output.

use std::fmt::Display;
use std::sync::Arc;

use tracing::trace;

use super::code;
use super::errors::{CodegenError, CompileError};
use super::instr::{Branch, DefKind, FunctionDef, Instr, Program, VarInit, push_text};
use crate::expr::{
    parse_def_header, parse_expression, parse_for_header, parse_keyword_expression, parse_params,
    parse_return, parse_simple_statement,
};
use crate::syntax::{BlockKeyword, Document, FlowKeyword, ParseError, Section, VarValue};

/// State inherited by nested blocks
#[derive(Debug, Clone, Default)]
pub(crate) struct BlockContext {
    /// Text prefixed to every emitted line
    pub indent: String,
    pub in_loop: bool,
    pub in_def: bool,
}

impl BlockContext {
    fn enter(&self, indent: &str) -> Self {
        Self {
            indent: format!("{indent}{}", self.indent),
            ..self.clone()
        }
    }

    pub(crate) fn looping(mut self) -> Self {
        self.in_loop = true;
        self
    }

    pub(crate) fn function(mut self) -> Self {
        self.in_loop = false;
        self.in_def = true;
        self
    }
}

pub struct CodeGen<'n> {
    template: &'n str,
}

impl<'n> CodeGen<'n> {
    pub fn new(template: &'n str) -> Self {
        Self { template }
    }

    pub(crate) fn compile_error<E: Display>(&self, line: usize, error: E) -> CodegenError {
        CompileError::new(self.template, line, error.to_string()).into()
    }

    pub(crate) fn parse_error<M: Into<String>>(&self, line: usize, message: M) -> CodegenError {
        ParseError::new(self.template, line, message).into()
    }

    /// Compile a parsed document
    pub fn program(&self, document: &Document) -> Result<Program, CodegenError> {
        let params = match &document.params {
            Some(text) => parse_params(text).map_err(|e| self.compile_error(1, e))?,
            None => Vec::new(),
        };
        let body = self.suite(&document.body, &BlockContext::default())?;
        trace!(
            template = self.template,
            params = params.len(),
            instructions = body.len(),
            "generated program"
        );
        Ok(Program { params, body })
    }

    pub(crate) fn suite(
        &self,
        sections: &[Section],
        ctx: &BlockContext,
    ) -> Result<Vec<Instr>, CodegenError> {
        let mut out = Vec::new();
        let mut index = 0;
        while index < sections.len() {
            index = self.section(sections, index, ctx, &mut out)?;
        }
        Ok(out)
    }

    /// Lower the section at `index`, returning the index of the next
    /// unconsumed section
    fn section(
        &self,
        sections: &[Section],
        index: usize,
        ctx: &BlockContext,
        out: &mut Vec<Instr>,
    ) -> Result<usize, CodegenError> {
        match &sections[index] {
            Section::Line { pieces, line } => {
                push_text(out, &ctx.indent);
                self.pieces(pieces, *line, out)?;
            }
            piece @ (Section::Text(_) | Section::Expression { .. }) => {
                self.pieces(std::slice::from_ref(piece), 0, out)?;
            }
            Section::Assignment { code, line } => {
                if !code.is_empty() {
                    let stmt =
                        parse_simple_statement(code).map_err(|e| self.compile_error(*line, e))?;
                    out.push(Instr::Exec(stmt));
                }
            }
            Section::Statement { keyword, code, line } => {
                if let Some(instr) = self.statement(*keyword, code, *line, ctx)? {
                    out.push(instr);
                }
            }
            Section::Code { text, line } => {
                out.extend(code::compile_code(self, text, *line, ctx)?);
            }
            Section::Var { name, value, line } => {
                let init = match value {
                    VarValue::Expr(code) => VarInit::Expr(
                        parse_expression(code).map_err(|e| self.compile_error(*line, e))?,
                    ),
                    VarValue::Fragment(lines) => {
                        let fragment = BlockContext {
                            indent: String::new(),
                            ..ctx.clone()
                        };
                        VarInit::Fragment(self.suite(lines, &fragment)?)
                    }
                };
                out.push(Instr::SetVar {
                    name: name.clone(),
                    init,
                });
            }
            Section::Block {
                keyword,
                header,
                body,
                indent,
                line,
            } => match keyword {
                BlockKeyword::If => return self.if_chain(sections, index, ctx, out),
                BlockKeyword::For | BlockKeyword::While => {
                    return self.loop_block(sections, index, ctx, out);
                }
                BlockKeyword::Def => {
                    let (name, params) =
                        parse_def_header(header).map_err(|e| self.compile_error(*line, e))?;
                    let body = self.suite(body, &ctx.enter(indent).function())?;
                    out.push(Instr::Def(Arc::new(FunctionDef {
                        name,
                        params,
                        body,
                        kind: DefKind::Template,
                    })));
                }
                BlockKeyword::Elif | BlockKeyword::Else => {
                    return Err(self.parse_error(
                        *line,
                        format!("`${keyword}` without a matching `$if`, `$for` or `$while`"),
                    ));
                }
            },
        }
        Ok(index + 1)
    }

    fn pieces(
        &self,
        pieces: &[Section],
        line: usize,
        out: &mut Vec<Instr>,
    ) -> Result<(), CodegenError> {
        for piece in pieces {
            match piece {
                Section::Text(text) => push_text(out, text),
                Section::Expression { code, escape } => {
                    let expr = parse_expression(code).map_err(|e| {
                        self.compile_error(line, format!("invalid expression `{code}`: {e}"))
                    })?;
                    out.push(Instr::Emit {
                        expr,
                        escape: *escape,
                    });
                }
                other => {
                    return Err(self.parse_error(
                        other.line().unwrap_or(line),
                        "unexpected directive inside a line",
                    ));
                }
            }
        }
        Ok(())
    }

    pub(crate) fn statement(
        &self,
        keyword: FlowKeyword,
        code: &str,
        line: usize,
        ctx: &BlockContext,
    ) -> Result<Option<Instr>, CodegenError> {
        match keyword {
            FlowKeyword::Pass => Ok(None),
            FlowKeyword::Break | FlowKeyword::Continue => {
                if !ctx.in_loop {
                    return Err(self.compile_error(line, format!("`{code}` outside a loop")));
                }
                Ok(Some(if keyword == FlowKeyword::Break {
                    Instr::Break
                } else {
                    Instr::Continue
                }))
            }
            FlowKeyword::Return => {
                let value = parse_return(code).map_err(|e| self.compile_error(line, e))?;
                if value.is_some() && !ctx.in_def {
                    return Err(self.compile_error(line, "`return` with a value outside a def"));
                }
                Ok(Some(Instr::Return(value)))
            }
        }
    }

    fn else_body(
        &self,
        header: &str,
        body: &[Section],
        indent: &str,
        line: usize,
        ctx: &BlockContext,
    ) -> Result<Vec<Instr>, CodegenError> {
        if header.trim() != "else" {
            return Err(self.compile_error(line, format!("unexpected text in `{header}`")));
        }
        self.suite(body, &ctx.enter(indent))
    }

    fn if_chain(
        &self,
        sections: &[Section],
        mut index: usize,
        ctx: &BlockContext,
        out: &mut Vec<Instr>,
    ) -> Result<usize, CodegenError> {
        let mut branches = Vec::new();
        let mut otherwise = None;
        while let Some(Section::Block {
            keyword,
            header,
            body,
            indent,
            line,
        }) = sections.get(index)
        {
            let word = match keyword {
                BlockKeyword::If if branches.is_empty() => "if",
                BlockKeyword::Elif if !branches.is_empty() => "elif",
                BlockKeyword::Else if !branches.is_empty() => {
                    otherwise = Some(self.else_body(header, body, indent, *line, ctx)?);
                    index += 1;
                    break;
                }
                _ => break,
            };
            let test =
                parse_keyword_expression(header, word).map_err(|e| self.compile_error(*line, e))?;
            let body = self.suite(body, &ctx.enter(indent))?;
            branches.push(Branch { test, body });
            index += 1;
        }
        out.push(Instr::If {
            branches,
            otherwise,
        });
        Ok(index)
    }

    fn loop_block(
        &self,
        sections: &[Section],
        index: usize,
        ctx: &BlockContext,
        out: &mut Vec<Instr>,
    ) -> Result<usize, CodegenError> {
        let Section::Block {
            keyword,
            header,
            body,
            indent,
            line,
        } = &sections[index]
        else {
            return Ok(index + 1);
        };
        let inner = self.suite(body, &ctx.enter(indent).looping())?;

        let mut next = index + 1;
        let otherwise = match sections.get(next) {
            Some(Section::Block {
                keyword: BlockKeyword::Else,
                header,
                body,
                indent,
                line,
            }) => {
                next += 1;
                Some(self.else_body(header, body, indent, *line, ctx)?)
            }
            _ => None,
        };

        let instr = if *keyword == BlockKeyword::For {
            let (target, iter) =
                parse_for_header(header).map_err(|e| self.compile_error(*line, e))?;
            Instr::For {
                target,
                iter,
                body: inner,
                otherwise,
                track: true,
            }
        } else {
            let test = parse_keyword_expression(header, "while")
                .map_err(|e| self.compile_error(*line, e))?;
            Instr::While {
                test,
                body: inner,
                otherwise,
            }
        };
        out.push(instr);
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{Expr, Target};
    use crate::syntax::Parser;

    fn compile(text: &str) -> Result<Program, CodegenError> {
        let document = Parser::new("test.html")
            .parse(text)
            .map_err(CodegenError::from)?;
        CodeGen::new("test.html").program(&document)
    }

    fn name(n: &str) -> Expr {
        Expr::Name(n.to_string())
    }

    #[test]
    fn test_adjacent_text_is_merged() {
        let program = compile("a\nb $$ c\n").unwrap();
        assert_eq!(program.body, vec![Instr::Text("a\nb $ c\n".to_string())]);
    }

    #[test]
    fn test_lines_inside_blocks_carry_header_indent() {
        let program = compile("<ul>\n  $for x in xs:\n    <li>$x</li>\n</ul>\n").unwrap();
        let Instr::For { body, track, .. } = &program.body[1] else {
            panic!("expected a loop, got {:?}", program.body);
        };
        assert!(*track);
        assert_eq!(
            body,
            &vec![
                Instr::Text("  <li>".to_string()),
                Instr::Emit {
                    expr: name("x"),
                    escape: true
                },
                Instr::Text("</li>\n".to_string()),
            ]
        );
    }

    #[test]
    fn test_if_chain_collects_elif_and_else() {
        let program = compile("$if a:\n    A\n$elif b:\n    B\n$else:\n    C\nafter\n").unwrap();
        let Instr::If {
            branches,
            otherwise,
        } = &program.body[0]
        else {
            panic!("expected an if chain");
        };
        assert_eq!(branches.len(), 2);
        assert_eq!(branches[1].test, name("b"));
        assert_eq!(otherwise, &Some(vec![Instr::Text("C\n".to_string())]));
        assert_eq!(program.body[1], Instr::Text("after\n".to_string()));
    }

    #[test]
    fn test_for_else_and_while() {
        let program = compile(
            "$for k, v in d:\n    $k\n$else:\n    none\n$while n:\n    $ n -= 1\n",
        )
        .unwrap();
        let Instr::For {
            target, otherwise, ..
        } = &program.body[0]
        else {
            panic!("expected a loop");
        };
        assert_eq!(target.names(), vec!["k", "v"]);
        assert!(otherwise.is_some());
        assert!(matches!(program.body[1], Instr::While { otherwise: None, .. }));
    }

    #[test]
    fn test_orphan_else_is_a_parse_error() {
        let err = compile("x\n$else:\n    y\n").unwrap_err();
        assert!(matches!(err, CodegenError::Parse(ref e) if e.line == 2));
        assert!(matches!(
            compile("$if a:\n    A\n$else:\n    B\n$else:\n    C\n"),
            Err(CodegenError::Parse(_))
        ));
    }

    #[test]
    fn test_break_outside_loop_is_rejected() {
        let err = compile("$break\n").unwrap_err();
        assert!(matches!(err, CodegenError::Compile(_)));
        assert!(compile("$for x in y:\n    $if x: $break\n").is_ok());
    }

    #[test]
    fn test_return_value_only_inside_def() {
        assert!(compile("$return 1\n").is_err());
        assert!(compile("$return\n").is_ok());
        assert!(compile("$def f():\n    $return 1\n").is_ok());
    }

    #[test]
    fn test_malformed_expression_reports_line() {
        let err = compile("ok\n$(1 +)\n").unwrap_err();
        match err {
            CodegenError::Compile(e) => {
                assert_eq!(e.line, 2);
                assert_eq!(e.template, "test.html");
            }
            other => panic!("expected a compile error, got {other:?}"),
        }
    }

    #[test]
    fn test_def_with_params_and_defs() {
        let program = compile("$def with (name, greeting='hi')\n$def tag(x):\n    <$x>\n").unwrap();
        assert_eq!(program.params.len(), 2);
        let Instr::Def(def) = &program.body[0] else {
            panic!("expected a def");
        };
        assert_eq!(def.name, "tag");
        assert_eq!(def.kind, DefKind::Template);
    }

    #[test]
    fn test_var_fragments_ignore_block_indent() {
        let program = compile("  $if x:\n    $var title: Hi $name\n").unwrap();
        let Instr::If { branches, .. } = &program.body[0] else {
            panic!("expected an if");
        };
        let Instr::SetVar {
            init: VarInit::Fragment(lines),
            ..
        } = &branches[0].body[0]
        else {
            panic!("expected a fragment var");
        };
        assert_eq!(lines[0], Instr::Text("Hi ".to_string()));
    }

    #[test]
    fn test_assignment_statement() {
        let program = compile("$ a = 1\n").unwrap();
        assert!(matches!(
            &program.body[0],
            Instr::Exec(crate::expr::Stmt::Assign { targets, .. })
                if targets[0] == Target::Name("a".into())
        ));
    }
}
