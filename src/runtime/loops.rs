//! Loop metadata exposed to templates as `loop`

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use super::errors::{EvalError, EvalResult};
use super::value::{Object, Value};

#[derive(Debug, Clone, Copy)]
struct Frame {
    index: usize,
    length: usize,
}

/// Stack of active `$for` loops of one invocation
#[derive(Debug, Default)]
pub struct LoopStack {
    frames: Vec<Frame>,
}

impl LoopStack {
    pub fn enter(&mut self, length: usize) {
        self.frames.push(Frame { index: 0, length });
    }

    pub fn advance(&mut self) {
        if let Some(frame) = self.frames.last_mut() {
            frame.index += 1;
        }
    }

    pub fn exit(&mut self) {
        self.frames.pop();
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Context of the innermost loop, linked to its enclosing loops
    pub fn current(&self) -> Option<Arc<LoopContext>> {
        self.frames.iter().fold(None, |parent, frame| {
            Some(Arc::new(LoopContext {
                index: frame.index,
                length: frame.length,
                parent,
            }))
        })
    }
}

/// Owner of a [`LoopStack`]
pub trait LoopHost {
    fn loops(&mut self) -> &mut LoopStack;
}

/// Scoped loop frame: pushed on creation and popped when dropped, so every
/// exit path out of the loop body (`break`, `return`, an error) pops it.
pub struct LoopGuard<'h, H: LoopHost> {
    host: &'h mut H,
}

impl<'h, H: LoopHost> LoopGuard<'h, H> {
    pub fn enter(host: &'h mut H, length: usize) -> Self {
        host.loops().enter(length);
        Self { host }
    }

    pub fn advance(&mut self) {
        self.host.loops().advance();
    }
}

impl<H: LoopHost> Deref for LoopGuard<'_, H> {
    type Target = H;

    fn deref(&self) -> &H {
        self.host
    }
}

impl<H: LoopHost> DerefMut for LoopGuard<'_, H> {
    fn deref_mut(&mut self) -> &mut H {
        self.host
    }
}

impl<H: LoopHost> Drop for LoopGuard<'_, H> {
    fn drop(&mut self) {
        self.host.loops().exit();
    }
}

/// Snapshot of one loop's position
#[derive(Debug, Clone)]
pub struct LoopContext {
    /// 1-based; 0 before the first iteration
    pub index: usize,
    /// 0 when the length could not be determined
    pub length: usize,
    pub parent: Option<Arc<LoopContext>>,
}

impl LoopContext {
    pub fn index0(&self) -> i64 {
        self.index as i64 - 1
    }

    pub fn first(&self) -> bool {
        self.index == 1
    }

    pub fn last(&self) -> bool {
        self.index == self.length
    }

    pub fn odd(&self) -> bool {
        self.index % 2 == 1
    }

    pub fn even(&self) -> bool {
        self.index % 2 == 0
    }

    pub fn parity(&self) -> &'static str {
        if self.even() { "even" } else { "odd" }
    }

    pub fn revindex(&self) -> i64 {
        self.length as i64 - self.index as i64 + 1
    }

    pub fn revindex0(&self) -> i64 {
        self.length as i64 - self.index as i64
    }
}

impl Object for LoopContext {
    fn type_name(&self) -> &str {
        "loop"
    }

    fn get_attr(&self, name: &str) -> EvalResult<Value> {
        Ok(match name {
            "index" => Value::Int(self.index as i64),
            "index0" => Value::Int(self.index0()),
            "length" => Value::Int(self.length as i64),
            "first" => Value::Bool(self.first()),
            "last" => Value::Bool(self.last()),
            "odd" => Value::Bool(self.odd()),
            "even" => Value::Bool(self.even()),
            "parity" => Value::str(self.parity()),
            "revindex" => Value::Int(self.revindex()),
            "revindex0" => Value::Int(self.revindex0()),
            "parent" => match &self.parent {
                Some(parent) => Value::Object(parent.clone()),
                None => Value::Null,
            },
            _ => return Err(EvalError::no_attribute("loop", name)),
        })
    }

    fn to_text(&self) -> String {
        format!("<loop {}/{}>", self.index, self.length)
    }
}
