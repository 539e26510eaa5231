//! Lexical scopes

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::value::Value;

/// A frame of variable bindings with an optional enclosing frame.
///
/// Lookups walk outwards; definitions always land in this frame.
#[derive(Debug, Default)]
pub struct Scope {
    vars: RwLock<HashMap<String, Value>>,
    parent: Option<Arc<Scope>>,
}

impl Scope {
    pub fn root(vars: HashMap<String, Value>) -> Arc<Self> {
        Arc::new(Self {
            vars: RwLock::new(vars),
            parent: None,
        })
    }

    pub fn child(parent: &Arc<Scope>) -> Arc<Self> {
        Arc::new(Self {
            vars: RwLock::default(),
            parent: Some(Arc::clone(parent)),
        })
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        let found = self
            .vars
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned();
        match found {
            Some(value) => Some(value),
            None => self.parent.as_ref()?.lookup(name),
        }
    }

    pub fn define<S: Into<String>>(&self, name: S, value: Value) {
        self.vars
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), value);
    }
}
