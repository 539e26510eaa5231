//! Compiled templates.
//!
//! A [`Template`] is compiled once from source text and can then be invoked
//! any number of times, from any thread. Each invocation runs with its own
//! output record and loop stack; only the compiled program and the global
//! bindings are shared.

// Internal imports (std, crate)
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::compile::{CodeGen, Program};
use crate::core::error::Result;
use crate::expr::Param;
use crate::runtime::interp::CallDepth;
use crate::runtime::{
    Args, EscapeMode, EvalResult, Machine, Object, OutputRecord, Scope, Value, bind_params,
    builtins,
};
use crate::syntax::Parser;

// External imports (alphabetized)
use indexmap::IndexMap;
use tracing::debug;

/// Options applied when compiling a template
#[derive(Debug, Clone, Default)]
pub struct TemplateOptions {
    /// Names visible to the template besides the builtins
    pub globals: IndexMap<String, Value>,
    /// Escaping filter; defaults to the one implied by the file name
    pub escape: Option<EscapeMode>,
}

pub struct Template {
    name: String,
    program: Program,
    defaults: Vec<Option<Value>>,
    content_type: Option<&'static str>,
    escape: EscapeMode,
    globals: Arc<Scope>,
}

/// Content type implied by a template file name
pub fn content_type_for(name: &str) -> Option<&'static str> {
    match Path::new(name).extension().and_then(|e| e.to_str())? {
        "html" => Some("text/html; charset=utf-8"),
        "xhtml" => Some("application/xhtml+xml; charset=utf-8"),
        "txt" => Some("text/plain"),
        _ => None,
    }
}

/// Unify line endings, drop a leading byte-order mark, turn the legacy `\$`
/// escape into `$$` and make sure the text ends with a newline
pub fn normalize_text(text: &str) -> String {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut text = text.replace("\r\n", "\n").replace('\r', "\n");
    if !text.ends_with('\n') {
        text.push('\n');
    }
    text.replace("\\$", "$$")
}

impl Template {
    /// Compile `text` with default options. `name` is used in error
    /// messages and selects the content type and escaping filter.
    pub fn compile(text: &str, name: &str) -> Result<Self> {
        Self::compile_with(text, name, TemplateOptions::default())
    }

    pub fn compile_with(text: &str, name: &str, options: TemplateOptions) -> Result<Self> {
        let text = normalize_text(text);
        let document = Parser::new(name).parse(&text)?;
        let program = CodeGen::new(name).program(&document)?;

        let globals = Scope::child(&builtins());
        for (key, value) in options.globals {
            globals.define(key, value);
        }
        let escape = options.escape.unwrap_or_else(|| EscapeMode::for_name(name));
        let defaults = Machine::new(Arc::clone(&globals), escape).defaults(&program.params)?;

        debug!(
            template = name,
            params = program.params.len(),
            ?escape,
            "compiled template"
        );
        Ok(Self {
            name: name.to_string(),
            program,
            defaults,
            content_type: content_type_for(name),
            escape,
            globals,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content_type(&self) -> Option<&'static str> {
        self.content_type
    }

    pub fn escape(&self) -> EscapeMode {
        self.escape
    }

    /// Declared parameters, from the `$def with (...)` line
    pub fn params(&self) -> &[Param] {
        &self.program.params
    }

    /// Render with named parameters
    pub fn invoke(&self, params: &IndexMap<String, Value>) -> Result<OutputRecord> {
        Ok(self.run(Args::named(params.clone()), &[])?)
    }

    /// Render with call arguments plus `extras` bound in the invocation
    /// frame; parameters shadow extras of the same name.
    pub fn run(&self, args: Args, extras: &[(&str, Value)]) -> EvalResult<OutputRecord> {
        let _depth = CallDepth::enter()?;
        let vars = bind_params(&self.program.params, &self.defaults, args, &self.name)?;
        let frame = Scope::child(&self.globals);
        for (name, value) in extras {
            frame.define(*name, value.clone());
        }
        for (name, value) in vars {
            frame.define(name, value);
        }

        let mut machine = Machine::new(frame, self.escape);
        machine.run(&self.program.body)?;
        Ok(machine.into_record().finish())
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("name", &self.name)
            .field("params", &self.program.params.len())
            .field("escape", &self.escape)
            .finish_non_exhaustive()
    }
}

impl Object for Template {
    fn type_name(&self) -> &str {
        "template"
    }

    fn is_callable(&self) -> bool {
        true
    }

    fn call(&self, args: Args) -> EvalResult<Value> {
        Ok(Value::from(self.run(args, &[])?))
    }

    fn to_text(&self) -> String {
        format!("<template {}>", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::Error;
    use crate::runtime::EvalError;

    fn params(pairs: &[(&str, Value)]) -> IndexMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("\u{feff}a\r\nb\rc"), "a\nb\nc\n");
        assert_eq!(normalize_text("cost: \\$5\n"), "cost: $$5\n");
    }

    #[test]
    fn test_content_type_and_escape_follow_suffix() {
        let html = Template::compile("x", "page.html").unwrap();
        assert_eq!(html.content_type(), Some("text/html; charset=utf-8"));
        assert_eq!(html.escape(), EscapeMode::Html);
        let text = Template::compile("x", "notes.txt").unwrap();
        assert_eq!(text.content_type(), Some("text/plain"));
        assert_eq!(text.escape(), EscapeMode::Plain);
        assert_eq!(
            content_type_for("page.xhtml"),
            Some("application/xhtml+xml; charset=utf-8")
        );
        assert_eq!(content_type_for("Makefile"), None);
        assert_eq!(content_type_for("PAGE.HTML"), None);
    }

    #[test]
    fn test_invoke_binds_declared_params() {
        let text = "$def with (name, greeting='Hello')\n$greeting, $name!\n";
        let template = Template::compile(text, "hi.txt").unwrap();
        let out = template.invoke(&params(&[("name", "World".into())])).unwrap();
        assert_eq!(out.to_string(), "Hello, World!\n");
        let out = template
            .invoke(&params(&[("name", "you".into()), ("greeting", "Hi".into())]))
            .unwrap();
        assert_eq!(out.to_string(), "Hi, you!\n");
    }

    #[test]
    fn test_missing_or_unknown_params_are_eval_errors() {
        let template = Template::compile("$def with (a)\n$a\n", "t.txt").unwrap();
        assert!(matches!(
            template.invoke(&IndexMap::new()),
            Err(Error::Eval(EvalError::Arity(_)))
        ));
        assert!(matches!(
            template.invoke(&params(&[("a", Value::Int(1)), ("b", Value::Int(2))])),
            Err(Error::Eval(EvalError::Arity(_)))
        ));
    }

    #[test]
    fn test_globals_and_escape_override() {
        let options = TemplateOptions {
            globals: params(&[("site", "<demo>".into())]),
            escape: Some(EscapeMode::Plain),
        };
        let template = Template::compile_with("$site\n", "page.html", options).unwrap();
        assert_eq!(template.invoke(&IndexMap::new()).unwrap().to_string(), "<demo>\n");
    }

    #[test]
    fn test_compile_errors_carry_name_and_line() {
        let err = Template::compile("ok\n$for x in:\n    $x\n", "list.html").unwrap_err();
        assert!(matches!(err, Error::Compile(_)));
        assert_eq!(err.location(), Some(("list.html", 2)));

        let err = Template::compile("a\nb\n$if x\n", "cond.html").unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
        assert_eq!(err.location(), Some(("cond.html", 3)));
    }

    #[test]
    fn test_template_is_callable_value() {
        let inner = Arc::new(Template::compile("$def with (x)\n<$x>\n", "inner.txt").unwrap());
        let options = TemplateOptions {
            globals: params(&[("inner", Value::Object(inner))]),
            escape: None,
        };
        let outer = Template::compile_with("[$:inner('a')]\n", "outer.txt", options).unwrap();
        assert_eq!(outer.invoke(&IndexMap::new()).unwrap().to_string(), "[<a>\n]\n");
    }

    #[test]
    fn test_template_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Template>();

        let text = "$def with (n)\n$for i in range(n):\n    $i\n";
        let template = Arc::new(Template::compile(text, "n.txt").unwrap());
        let handles: Vec<_> = (1..4)
            .map(|n| {
                let template = Arc::clone(&template);
                std::thread::spawn(move || {
                    template
                        .invoke(&params(&[("n", Value::Int(n))]))
                        .unwrap()
                        .to_string()
                })
            })
            .collect();
        let outputs: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(outputs, vec!["0\n", "0\n1\n", "0\n1\n2\n"]);
    }
}
