//! Instruction interpreter.
//!
//! A [`Machine`] runs one invocation: it owns the output record and the loop
//! stack, and evaluates against a scope chain that ends in the globals and
//! builtins. Nested `def`s become [`Closure`]s over the frame that defined
//! them; every call runs in a fresh machine with its own record.

use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;

use super::errors::{EvalError, EvalResult};
use super::escape::EscapeMode;
use super::loops::{LoopGuard, LoopHost, LoopStack};
use super::ops;
use super::record::OutputRecord;
use super::scope::Scope;
use super::value::{Args, Object, Value};
use crate::compile::{Branch, DefKind, FunctionDef, Instr, VarInit};
use crate::expr::{Expr, Literal, Param, Stmt, Subscript, Target};

/// Deepest nesting of template and function calls on one thread
const MAX_CALL_DEPTH: usize = 100;

thread_local! {
    static CALL_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Marks one active call; released on drop
pub(crate) struct CallDepth;

impl CallDepth {
    pub(crate) fn enter() -> EvalResult<Self> {
        CALL_DEPTH.with(|depth| {
            if depth.get() >= MAX_CALL_DEPTH {
                return Err(EvalError::value("maximum call depth exceeded"));
            }
            depth.set(depth.get() + 1);
            Ok(Self)
        })
    }
}

impl Drop for CallDepth {
    fn drop(&mut self) {
        CALL_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// How a sequence of instructions finished
#[derive(Debug)]
pub enum Flow {
    Normal,
    Break,
    Continue,
    Return(Option<Value>),
}

pub struct Machine {
    scope: Arc<Scope>,
    record: OutputRecord,
    loops: LoopStack,
    escape: EscapeMode,
}

impl LoopHost for Machine {
    fn loops(&mut self) -> &mut LoopStack {
        &mut self.loops
    }
}

impl Machine {
    pub fn new(scope: Arc<Scope>, escape: EscapeMode) -> Self {
        Self {
            scope,
            record: OutputRecord::new(),
            loops: LoopStack::default(),
            escape,
        }
    }

    pub fn into_record(self) -> OutputRecord {
        self.record
    }

    /// Evaluate the defaults of a parameter list in the current scope
    pub fn defaults(&mut self, params: &[Param]) -> EvalResult<Vec<Option<Value>>> {
        params
            .iter()
            .map(|param| param.default.as_ref().map(|expr| self.eval(expr)).transpose())
            .collect()
    }

    pub fn run(&mut self, body: &[Instr]) -> EvalResult<Flow> {
        for instr in body {
            match self.step(instr)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn step(&mut self, instr: &Instr) -> EvalResult<Flow> {
        match instr {
            Instr::Text(text) => self.record.push(text),
            Instr::Emit { expr, escape } => {
                let value = self.eval(expr)?;
                self.emit(&value, *escape);
            }
            Instr::Exec(stmt) => self.exec(stmt)?,
            Instr::If {
                branches,
                otherwise,
            } => return self.run_if(branches, otherwise.as_deref()),
            Instr::For {
                target,
                iter,
                body,
                otherwise,
                track,
            } => return self.run_for(target, iter, body, otherwise.as_deref(), *track),
            Instr::While {
                test,
                body,
                otherwise,
            } => return self.run_while(test, body, otherwise.as_deref()),
            Instr::Def(def) => {
                let defaults = self.defaults(&def.params)?;
                let closure = Closure {
                    def: Arc::clone(def),
                    scope: Captured::Weak(Arc::downgrade(&self.scope)),
                    defaults,
                    escape: self.escape,
                };
                self.scope.define(def.name.clone(), Value::object(closure));
            }
            Instr::SetVar { name, init } => {
                let value = match init {
                    VarInit::Expr(expr) => self.eval(expr)?,
                    VarInit::Fragment(body) => {
                        let outer = mem::take(&mut self.record);
                        let flow = self.run(body);
                        let fragment = mem::replace(&mut self.record, outer);
                        if let Flow::Return(value) = flow? {
                            return Ok(Flow::Return(value));
                        }
                        Value::str(fragment.into_body())
                    }
                };
                self.record.insert(name.as_str(), value);
            }
            Instr::Break => return Ok(Flow::Break),
            Instr::Continue => return Ok(Flow::Continue),
            Instr::Return(value) => {
                let value = value.as_ref().map(|expr| self.eval(expr)).transpose()?;
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Normal)
    }

    /// Append a value's text. `None` renders as nothing.
    fn emit(&mut self, value: &Value, escape: bool) {
        if value.is_null() {
            return;
        }
        let text = value.to_text();
        if escape {
            self.record.push(&self.escape.apply(&text));
        } else {
            self.record.push(&text);
        }
    }

    fn run_if(&mut self, branches: &[Branch], otherwise: Option<&[Instr]>) -> EvalResult<Flow> {
        for branch in branches {
            if self.eval(&branch.test)?.truthy() {
                return self.run(&branch.body);
            }
        }
        match otherwise {
            Some(body) => self.run(body),
            None => Ok(Flow::Normal),
        }
    }

    /// Run a loop body over `items`. Returns `Normal` when the items ran
    /// out, `Break` on `break` and `Return` on `return`.
    fn iterate(
        &mut self,
        target: &Target,
        items: Vec<Value>,
        body: &[Instr],
        track: bool,
    ) -> EvalResult<Flow> {
        for item in items {
            if track {
                self.loops.advance();
            }
            self.assign(target, item)?;
            match self.run(body)? {
                Flow::Normal | Flow::Continue => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn run_for(
        &mut self,
        target: &Target,
        iter: &Expr,
        body: &[Instr],
        otherwise: Option<&[Instr]>,
        track: bool,
    ) -> EvalResult<Flow> {
        let items = ops::iterate(&self.eval(iter)?)?;
        let flow = if track {
            let mut guard = LoopGuard::enter(self, items.len());
            guard.iterate(target, items, body, true)?
        } else {
            self.iterate(target, items, body, false)?
        };
        self.finish_loop(flow, otherwise)
    }

    fn run_while(
        &mut self,
        test: &Expr,
        body: &[Instr],
        otherwise: Option<&[Instr]>,
    ) -> EvalResult<Flow> {
        let flow = loop {
            if !self.eval(test)?.truthy() {
                break Flow::Normal;
            }
            match self.run(body)? {
                Flow::Normal | Flow::Continue => {}
                flow => break flow,
            }
        };
        self.finish_loop(flow, otherwise)
    }

    /// `else` runs only when the loop was not left with `break`
    fn finish_loop(&mut self, flow: Flow, otherwise: Option<&[Instr]>) -> EvalResult<Flow> {
        match (flow, otherwise) {
            (Flow::Normal, Some(body)) => self.run(body),
            (Flow::Normal | Flow::Break, _) => Ok(Flow::Normal),
            (flow, _) => Ok(flow),
        }
    }

    fn exec(&mut self, stmt: &Stmt) -> EvalResult<()> {
        match stmt {
            Stmt::Assign { targets, value } => {
                let value = self.eval(value)?;
                for target in targets {
                    self.assign(target, value.clone())?;
                }
            }
            Stmt::AugAssign { name, op, value } => {
                let current = self.lookup(name)?;
                let operand = self.eval(value)?;
                self.scope
                    .define(name.as_str(), ops::binary(*op, &current, &operand)?);
            }
            Stmt::Expr(expr) => {
                self.eval(expr)?;
            }
        }
        Ok(())
    }

    fn assign(&mut self, target: &Target, value: Value) -> EvalResult<()> {
        match target {
            Target::Name(name) => self.scope.define(name.as_str(), value),
            Target::Tuple(targets) => {
                let items = ops::iterate(&value)?;
                if items.len() != targets.len() {
                    return Err(EvalError::value(if items.len() > targets.len() {
                        format!("too many values to unpack (expected {})", targets.len())
                    } else {
                        format!(
                            "not enough values to unpack (expected {}, got {})",
                            targets.len(),
                            items.len()
                        )
                    }));
                }
                for (target, item) in targets.iter().zip(items) {
                    self.assign(target, item)?;
                }
            }
        }
        Ok(())
    }

    /// Resolve a name: the scope chain first, then the implicit `loop` and
    /// `result` bindings
    fn lookup(&mut self, name: &str) -> EvalResult<Value> {
        if let Some(value) = self.scope.lookup(name) {
            return Ok(match &value {
                Value::Object(object) => object.upgrade().unwrap_or(value),
                _ => value,
            });
        }
        match name {
            "loop" => match self.loops.current() {
                Some(context) => Ok(Value::Object(context)),
                None => Err(EvalError::UndefinedName(name.to_string())),
            },
            "result" => Ok(Value::from(self.record.snapshot())),
            _ => Err(EvalError::UndefinedName(name.to_string())),
        }
    }

    pub fn eval(&mut self, expr: &Expr) -> EvalResult<Value> {
        Ok(match expr {
            Expr::Literal(literal) => match literal {
                Literal::None => Value::Null,
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Int(i) => Value::Int(*i),
                Literal::Float(f) => Value::Float(*f),
                Literal::Str(s) => Value::str(s.as_str()),
            },
            Expr::Name(name) => self.lookup(name)?,
            Expr::List(items) | Expr::Tuple(items) => Value::list(self.eval_all(items)?),
            Expr::Dict(entries) => {
                let mut map = IndexMap::with_capacity(entries.len());
                for (key, value) in entries {
                    let key = self.eval(key)?.to_key();
                    map.insert(key, self.eval(value)?);
                }
                Value::map(map)
            }
            Expr::Attr { value, name } => ops::get_attr(&self.eval(value)?, name)?,
            Expr::Index { value, index } => {
                let value = self.eval(value)?;
                match index.as_ref() {
                    Subscript::Index(key) => ops::get_index(&value, &self.eval(key)?)?,
                    Subscript::Slice { start, stop, step } => {
                        let start = self.eval_optional(start.as_ref())?;
                        let stop = self.eval_optional(stop.as_ref())?;
                        let step = self.eval_optional(step.as_ref())?;
                        ops::slice(&value, start.as_ref(), stop.as_ref(), step.as_ref())?
                    }
                }
            }
            Expr::Call { func, args, kwargs } => {
                let func = self.eval(func)?;
                let positional = self.eval_all(args)?;
                let mut named = IndexMap::with_capacity(kwargs.len());
                for (name, value) in kwargs {
                    named.insert(name.clone(), self.eval(value)?);
                }
                ops::call(&func, Args { positional, named })?
            }
            Expr::Unary { op, operand } => ops::unary(*op, &self.eval(operand)?)?,
            Expr::Binary { op, left, right } => {
                let left = self.eval(left)?;
                ops::binary(*op, &left, &self.eval(right)?)?
            }
            Expr::Compare { left, links } => {
                let mut left = self.eval(left)?;
                for (op, right) in links {
                    let right = self.eval(right)?;
                    if !ops::compare(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Value::Bool(true)
            }
            Expr::And(left, right) => {
                let left = self.eval(left)?;
                if !left.truthy() {
                    return Ok(left);
                }
                self.eval(right)?
            }
            Expr::Or(left, right) => {
                let left = self.eval(left)?;
                if left.truthy() {
                    return Ok(left);
                }
                self.eval(right)?
            }
            Expr::Cond { test, body, orelse } => {
                if self.eval(test)?.truthy() {
                    self.eval(body)?
                } else {
                    self.eval(orelse)?
                }
            }
        })
    }

    fn eval_all(&mut self, exprs: &[Expr]) -> EvalResult<Vec<Value>> {
        exprs.iter().map(|expr| self.eval(expr)).collect()
    }

    fn eval_optional(&mut self, expr: Option<&Expr>) -> EvalResult<Option<Value>> {
        expr.map(|expr| self.eval(expr)).transpose()
    }
}

/// Bind call arguments to formal parameters
pub fn bind_params(
    params: &[Param],
    defaults: &[Option<Value>],
    args: Args,
    name: &str,
) -> EvalResult<HashMap<String, Value>> {
    if args.positional.len() > params.len() {
        return Err(EvalError::arity(format!(
            "{name}() takes {} positional argument{} but {} were given",
            params.len(),
            if params.len() == 1 { "" } else { "s" },
            args.positional.len()
        )));
    }

    let mut bound: HashMap<String, Value> = params
        .iter()
        .zip(args.positional)
        .map(|(param, value)| (param.name.clone(), value))
        .collect();

    for (key, value) in args.named {
        if !params.iter().any(|param| param.name == key) {
            return Err(EvalError::arity(format!(
                "{name}() got an unexpected keyword argument '{key}'"
            )));
        }
        if bound.contains_key(&key) {
            return Err(EvalError::arity(format!(
                "{name}() got multiple values for argument '{key}'"
            )));
        }
        bound.insert(key, value);
    }

    let mut missing = Vec::new();
    for (index, param) in params.iter().enumerate() {
        if bound.contains_key(&param.name) {
            continue;
        }
        match defaults.get(index).cloned().flatten() {
            Some(default) => {
                bound.insert(param.name.clone(), default);
            }
            None => missing.push(format!("'{}'", param.name)),
        }
    }
    if !missing.is_empty() {
        return Err(EvalError::arity(format!(
            "{name}() missing {} required argument{}: {}",
            missing.len(),
            if missing.len() == 1 { "" } else { "s" },
            missing.join(", ")
        )));
    }
    Ok(bound)
}

/// Frame a closure was defined in. The frame's own binding holds it weakly
/// so that a frame and its functions never keep each other alive; every
/// value handed out by a lookup holds it strongly.
enum Captured {
    Strong(Arc<Scope>),
    Weak(Weak<Scope>),
}

/// A `def` bound to the frame it was defined in
pub struct Closure {
    def: Arc<FunctionDef>,
    scope: Captured,
    defaults: Vec<Option<Value>>,
    escape: EscapeMode,
}

impl Closure {
    fn scope(&self) -> EvalResult<Arc<Scope>> {
        match &self.scope {
            Captured::Strong(scope) => Ok(Arc::clone(scope)),
            Captured::Weak(scope) => scope.upgrade().ok_or_else(|| {
                let name = &self.def.name;
                EvalError::value(format!("{name}() outlived the frame it was defined in"))
            }),
        }
    }
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<function {}>", self.def.name)
    }
}

impl Object for Closure {
    fn type_name(&self) -> &str {
        "function"
    }

    fn is_callable(&self) -> bool {
        true
    }

    fn call(&self, args: Args) -> EvalResult<Value> {
        let _depth = CallDepth::enter()?;
        let vars = bind_params(&self.def.params, &self.defaults, args, &self.def.name)?;
        let frame = Scope::child(&self.scope()?);
        for (name, value) in vars {
            frame.define(name, value);
        }

        let mut machine = Machine::new(frame, self.escape);
        let returned = match machine.run(&self.def.body)? {
            Flow::Return(value) => value,
            _ => None,
        };
        Ok(match (self.def.kind, returned) {
            (_, Some(value)) => value,
            (DefKind::Template, None) => Value::from(machine.into_record()),
            (DefKind::Procedure, None) => Value::Null,
        })
    }

    fn to_text(&self) -> String {
        format!("<function {}>", self.def.name)
    }

    fn upgrade(&self) -> Option<Value> {
        let Captured::Weak(_) = self.scope else {
            return None;
        };
        let scope = self.scope().ok()?;
        Some(Value::object(Closure {
            def: Arc::clone(&self.def),
            scope: Captured::Strong(scope),
            defaults: self.defaults.clone(),
            escape: self.escape,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::CodeGen;
    use crate::runtime::builtins::builtins;
    use crate::syntax::Parser;

    fn render_with(text: &str, vars: Vec<(&str, Value)>) -> EvalResult<OutputRecord> {
        let document = Parser::new("t.html").parse(text).expect("parses");
        let program = CodeGen::new("t.html").program(&document).expect("compiles");
        let frame = Scope::child(&builtins());
        for (name, value) in vars {
            frame.define(name, value);
        }
        let mut machine = Machine::new(frame, EscapeMode::Html);
        machine.run(&program.body)?;
        Ok(machine.into_record().finish())
    }

    fn render(text: &str) -> String {
        render_with(text, Vec::new()).unwrap().to_string()
    }

    #[test]
    fn test_emit_escapes_and_skips_none() {
        let out = render_with(
            "$x|$:x|$y|\n",
            vec![("x", Value::from("<b>")), ("y", Value::Null)],
        )
        .unwrap();
        assert_eq!(out.to_string(), "&lt;b&gt;|<b>||\n");
    }

    #[test]
    fn test_loop_metadata() {
        let out = render(
            "$for x in ['a', 'b', 'c']:\n    $loop.index/$loop.length $loop.parity $loop.last\n",
        );
        assert_eq!(out, "1/3 odd False\n2/3 even False\n3/3 odd True\n");
    }

    #[test]
    fn test_nested_loops_see_parent() {
        let out = render(
            "$for a in range(2):\n    $for b in range(2):\n        $loop.parent.index$loop.index\n",
        );
        assert_eq!(out, "11\n12\n21\n22\n");
    }

    #[test]
    fn test_loop_context_pops_on_break() {
        let out = render(concat!(
            "$for a in range(3):\n",
            "    $for b in range(3):\n",
            "        $if b == 1:\n",
            "            $break\n",
            "    $loop.index\n",
        ));
        assert_eq!(out, "1\n2\n3\n");
    }

    #[test]
    fn test_for_else_and_while() {
        assert_eq!(render("$for x in []:\n    $x\n$else:\n    empty\n"), "empty\n");
        assert_eq!(
            render("$for x in [1, 2]:\n    $if x == 2:\n        $break\n$else:\n    none\n"),
            ""
        );
        assert_eq!(render("$ i = 0\n$while i < 3:\n    $ i += 1\n    $i\n"), "1\n2\n3\n");
    }

    #[test]
    fn test_def_returns_fresh_record() {
        let out = render("$def item(x):\n    <li>$x</li>\n$:item('a')$:item('b')\n");
        assert_eq!(out, "<li>a</li>\n<li>b</li>\n\n");
    }

    #[test]
    fn test_var_sets_record_attributes() {
        let record = render_with(
            "$var title: Hello $name\n$var count = 2\nbody\n",
            vec![("name", "you".into())],
        )
        .unwrap();
        assert_eq!(record.peek("title"), Some(Value::from("Hello you")));
        assert_eq!(record.peek("count"), Some(Value::Int(2)));
        assert_eq!(record.to_string(), "body\n");
    }

    #[test]
    fn test_undefined_name_is_an_error() {
        let err = render_with("$missing\n", Vec::new()).unwrap_err();
        assert_eq!(err.to_string(), "name 'missing' is not defined");
        assert!(matches!(
            render_with("$loop.index\n", Vec::new()),
            Err(EvalError::UndefinedName(_))
        ));
    }

    #[test]
    fn test_top_level_return_stops_rendering() {
        assert_eq!(render("a\n$return\nb\n"), "a\n");
    }

    #[test]
    fn test_tuple_unpacking_errors() {
        assert_eq!(render("$for k, v in [[1, 2]]:\n    $k=$v\n"), "1=2\n");
        assert!(render_with("$ a, b = [1, 2, 3]\n", Vec::new()).is_err());
    }

    #[test]
    fn test_and_or_return_operands() {
        assert_eq!(render("${0 or 'x'}|${'' and 1}|${1 < 2 < 3}\n"), "x||True\n");
    }

    #[test]
    fn test_bind_params_errors() {
        let params = vec![
            Param {
                name: "a".to_string(),
                default: None,
            },
            Param {
                name: "b".to_string(),
                default: None,
            },
        ];
        let defaults = vec![None, Some(Value::Int(2))];
        let bound = bind_params(&params, &defaults, Args::new(vec![Value::Int(1)]), "f").unwrap();
        assert_eq!(bound["b"], Value::Int(2));

        let err = bind_params(&params, &defaults, Args::default(), "f").unwrap_err();
        assert_eq!(err.to_string(), "f() missing 1 required argument: 'a'");
        let err =
            bind_params(&params, &defaults, Args::new(vec![Value::Int(1); 3]), "f").unwrap_err();
        assert_eq!(err.to_string(), "f() takes 2 positional arguments but 3 were given");
    }

    #[test]
    fn test_returned_closure_keeps_its_frame() {
        let text = concat!(
            "$code:\n",
            "    def make(n):\n",
            "        def add(x):\n",
            "            return x + n\n",
            "        return add\n",
            "${make(1)(2)}\n",
        );
        assert_eq!(render(text), "3\n");
    }

    #[test]
    fn test_closure_stored_in_record_outlives_invocation() {
        let record = render_with(
            "$def side():\n    hi $user\n$var sidebar = side\nbody\n",
            vec![("user", "ada".into())],
        )
        .unwrap();
        let sidebar = record.peek("sidebar").unwrap();
        let out = ops::call(&sidebar, Args::default()).unwrap();
        assert_eq!(out.to_text(), "hi ada\n");
    }

    #[test]
    fn test_recursion_is_bounded() {
        let err = render_with(
            "$code:\n    def f(n):\n        return f(n + 1)\n${f(0)}\n",
            Vec::new(),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "maximum call depth exceeded");
    }
}
