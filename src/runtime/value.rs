//! Runtime values.
//!
//! [`Value`] is a closed sum over the plain data a template works with, plus
//! [`Value::Object`] for capability objects (functions, templates, renders,
//! loop contexts and bound methods). Every value answers attribute access,
//! indexing, calls, truthiness and text conversion through [`super::ops`],
//! failing with an [`EvalError`] when a capability is missing.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use super::errors::{EvalError, EvalResult};
use super::record::OutputRecord;

/// A value with capabilities beyond plain data
pub trait Object: fmt::Debug + Send + Sync {
    fn type_name(&self) -> &str;

    fn get_attr(&self, name: &str) -> EvalResult<Value> {
        Err(EvalError::no_attribute(self.type_name(), name))
    }

    fn get_index(&self, _key: &Value) -> EvalResult<Value> {
        Err(EvalError::NotSubscriptable(self.type_name().to_string()))
    }

    fn is_callable(&self) -> bool {
        false
    }

    fn call(&self, _args: Args) -> EvalResult<Value> {
        Err(EvalError::NotCallable(self.type_name().to_string()))
    }

    fn iterate(&self) -> EvalResult<Vec<Value>> {
        Err(EvalError::NotIterable(self.type_name().to_string()))
    }

    fn len(&self) -> Option<usize> {
        None
    }

    fn truthy(&self) -> bool {
        true
    }

    fn to_text(&self) -> String {
        format!("<{}>", self.type_name())
    }

    /// Strong form of an object that its defining frame holds weakly.
    /// Name lookups always hand out this form.
    fn upgrade(&self) -> Option<Value> {
        None
    }
}

/// Arguments of a call
#[derive(Debug, Clone, Default)]
pub struct Args {
    pub positional: Vec<Value>,
    pub named: IndexMap<String, Value>,
}

impl Args {
    pub fn new(positional: Vec<Value>) -> Self {
        Self {
            positional,
            named: IndexMap::new(),
        }
    }

    pub fn named(named: IndexMap<String, Value>) -> Self {
        Self {
            positional: Vec::new(),
            named,
        }
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    /// Require between `min` and `max` positional arguments and no keywords
    pub fn check(&self, name: &str, min: usize, max: usize) -> EvalResult<()> {
        if let Some(key) = self.named.keys().next() {
            return Err(EvalError::arity(format!(
                "{name}() got an unexpected keyword argument '{key}'"
            )));
        }
        self.check_positional(name, min, max)
    }

    /// Like [`Args::check`] but keywords are left to the caller
    pub fn check_positional(&self, name: &str, min: usize, max: usize) -> EvalResult<()> {
        let given = self.positional.len();
        if given < min || given > max {
            let expected = if min == max {
                format!("exactly {min}")
            } else if given < min {
                format!("at least {min}")
            } else {
                format!("at most {max}")
            };
            return Err(EvalError::arity(format!(
                "{name}() takes {expected} argument{} ({given} given)",
                if expected.ends_with(" 1") { "" } else { "s" }
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    List(Arc<Vec<Value>>),
    Map(Arc<IndexMap<String, Value>>),
    Record(Arc<OutputRecord>),
    Object(Arc<dyn Object>),
}

impl Value {
    pub fn str<S: Into<Arc<str>>>(s: S) -> Self {
        Self::Str(s.into())
    }

    pub fn list(items: Vec<Value>) -> Self {
        Self::List(Arc::new(items))
    }

    pub fn map(entries: IndexMap<String, Value>) -> Self {
        Self::Map(Arc::new(entries))
    }

    pub fn object<O: Object + 'static>(object: O) -> Self {
        Self::Object(Arc::new(object))
    }

    pub fn type_name(&self) -> &str {
        match self {
            Self::Null => "NoneType",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::List(_) => "list",
            Self::Map(_) => "dict",
            Self::Record(_) => "TemplateResult",
            Self::Object(object) => object.type_name(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::List(items) => !items.is_empty(),
            Self::Map(entries) => !entries.is_empty(),
            Self::Record(record) => !record.is_empty(),
            Self::Object(object) => object.truthy(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer value of an `int` or `bool`
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Numeric value of an `int`, `float` or `bool`
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            other => other.as_int().map(|i| i as f64),
        }
    }

    pub fn expect_str(&self, what: &str) -> EvalResult<&str> {
        self.as_str().ok_or_else(|| {
            EvalError::type_error(format!("{what} must be str, not {}", self.type_name()))
        })
    }

    pub fn expect_int(&self, what: &str) -> EvalResult<i64> {
        self.as_int().ok_or_else(|| {
            EvalError::type_error(format!("{what} must be int, not {}", self.type_name()))
        })
    }

    /// Key used when this value indexes or builds a dict
    pub fn to_key(&self) -> String {
        match self {
            Self::Str(s) => s.to_string(),
            other => other.to_text(),
        }
    }

    /// Text conversion, as `str(value)`
    pub fn to_text(&self) -> String {
        match self {
            Self::Null => "None".to_string(),
            Self::Bool(true) => "True".to_string(),
            Self::Bool(false) => "False".to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => format_float(*f),
            Self::Str(s) => s.to_string(),
            Self::Record(record) => record.to_string(),
            Self::Object(object) => object.to_text(),
            Self::List(_) | Self::Map(_) => self.repr(),
        }
    }

    /// Source-like representation, as `repr(value)`
    pub fn repr(&self) -> String {
        match self {
            Self::Str(s) => quote(s),
            Self::List(items) => {
                let inner: Vec<String> = items.iter().map(Value::repr).collect();
                format!("[{}]", inner.join(", "))
            }
            Self::Map(entries) => {
                let inner: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| format!("{}: {}", quote(k), v.repr()))
                    .collect();
                format!("{{{}}}", inner.join(", "))
            }
            Self::Record(record) => format!("<TemplateResult: {}>", quote(&record.to_string())),
            other => other.to_text(),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object(object) => write!(f, "{object:?}"),
            other => f.write_str(&other.repr()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        super::ops::equals(self, other)
    }
}

/// Format a float the way `repr` does: integral values keep a `.0` and
/// very large or small magnitudes switch to exponent notation.
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let magnitude = f.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        return python_exponent(&format!("{f:e}"));
    }
    if f.fract() == 0.0 {
        return format!("{f:.1}");
    }
    f.to_string()
}

/// Rewrite Rust exponent notation (`1.5e3`, `2e-7`) as `1.5e+03`, `2e-07`
pub(crate) fn python_exponent(formatted: &str) -> String {
    match formatted.split_once(['e', 'E']) {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent.trim_start_matches('+')),
            };
            let marker = if formatted.contains('E') { 'E' } else { 'e' };
            format!("{mantissa}{marker}{sign}{digits:0>2}")
        }
        None => formatted.to_string(),
    }
}

fn quote(s: &str) -> String {
    let delimiter = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(delimiter);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == delimiter => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(delimiter);
    out
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::list(items)
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(entries: IndexMap<String, Value>) -> Self {
        Self::map(entries)
    }
}

impl From<OutputRecord> for Value {
    fn from(record: OutputRecord) -> Self {
        Self::Record(Arc::new(record.finish()))
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Self::str(s),
            serde_json::Value::Array(items) => {
                Self::list(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(entries) => Self::map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_conversion_follows_host_conventions() {
        assert_eq!(Value::Null.to_text(), "None");
        assert_eq!(Value::Bool(true).to_text(), "True");
        assert_eq!(Value::Float(1.0).to_text(), "1.0");
        assert_eq!(Value::Float(0.5).to_text(), "0.5");
        assert_eq!(Value::Float(1e20).to_text(), "1e+20");
        assert_eq!(Value::Float(1.5e-7).to_text(), "1.5e-07");
        assert_eq!(
            Value::list(vec![Value::Int(1), Value::from("a")]).to_text(),
            "[1, 'a']"
        );
    }

    #[test]
    fn test_repr_quotes_strings() {
        assert_eq!(Value::from("it's").repr(), "\"it's\"");
        assert_eq!(Value::from("a\nb").repr(), "'a\\nb'");
        let mut entries = IndexMap::new();
        entries.insert("k".to_string(), Value::Int(1));
        assert_eq!(Value::map(entries).repr(), "{'k': 1}");
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.truthy());
        assert!(!Value::from("").truthy());
        assert!(!Value::list(Vec::new()).truthy());
        assert!(Value::Int(-1).truthy());
        assert!(!Value::Float(0.0).truthy());
    }

    #[test]
    fn test_from_json_keeps_order_and_types() {
        let value = Value::from(json!({"b": 1, "a": [true, null, 2.5, "x"]}));
        let Value::Map(entries) = &value else {
            panic!("expected a map");
        };
        assert_eq!(entries.keys().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(value.repr(), "{'b': 1, 'a': [True, None, 2.5, 'x']}");
    }

    #[test]
    fn test_args_check_messages() {
        let args = Args::new(vec![Value::Int(1), Value::Int(2)]);
        assert!(args.check("len", 1, 1).is_err());
        assert!(args.check("range", 1, 3).is_ok());
        let err = Args::new(Vec::new()).check("len", 1, 1).unwrap_err();
        assert_eq!(err.to_string(), "len() takes exactly 1 argument (0 given)");
    }
}
