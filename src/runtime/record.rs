//! Output record: the rendered body plus named attributes set with `$var`

use std::fmt;

use indexmap::IndexMap;

use super::value::Value;

/// Reserved key holding the rendered text
pub const BODY: &str = "body";

/// Result of one template invocation.
///
/// Emitted text is appended to a pending buffer and folded into the body on
/// the first read, so building the body never copies the text rendered so
/// far. After a fold the buffer is empty; later appends buffer again.
#[derive(Debug, Clone, Default)]
pub struct OutputRecord {
    body: Option<String>,
    pending: String,
    attrs: IndexMap<String, Value>,
}

impl OutputRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record with a preset body, e.g. to hand plain text to a layout
    pub fn with_body<S: Into<String>>(body: S) -> Self {
        Self {
            body: Some(body.into()),
            ..Self::default()
        }
    }

    /// Append rendered text
    pub fn push(&mut self, text: &str) {
        self.pending.push_str(text);
    }

    /// Move pending text into the body
    pub fn fold(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        match &mut self.body {
            Some(body) => body.push_str(&self.pending),
            None => self.body = Some(std::mem::take(&mut self.pending)),
        }
        self.pending.clear();
    }

    pub fn body(&mut self) -> &str {
        self.fold();
        self.body.as_deref().unwrap_or_default()
    }

    /// True if nothing was rendered and no attribute was set
    pub fn is_empty(&self) -> bool {
        self.body.as_deref().is_none_or(str::is_empty)
            && self.pending.is_empty()
            && self.attrs.is_empty()
    }

    /// Look up `body` or a named attribute
    pub fn get(&mut self, name: &str) -> Option<Value> {
        if name == BODY {
            return Some(Value::str(self.body()));
        }
        self.attrs.get(name).cloned()
    }

    /// Look up a key without folding. Only complete for finished records.
    pub fn peek(&self, name: &str) -> Option<Value> {
        if name == BODY {
            return Some(Value::str(self.to_string()));
        }
        self.attrs.get(name).cloned()
    }

    pub fn insert<S: Into<String>>(&mut self, name: S, value: Value) {
        let name = name.into();
        if name == BODY {
            self.pending.clear();
            self.body = Some(value.to_text());
            return;
        }
        self.attrs.insert(name, value);
    }

    /// `body` followed by the attribute names in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        std::iter::once(BODY).chain(self.attrs.keys().map(String::as_str))
    }

    pub fn attrs(&self) -> &IndexMap<String, Value> {
        &self.attrs
    }

    /// Fold and return the record, ready to be shared
    pub fn finish(mut self) -> Self {
        self.fold();
        self
    }

    /// Fold and copy the record as it stands
    pub fn snapshot(&mut self) -> Self {
        self.fold();
        self.clone()
    }

    pub fn into_body(mut self) -> String {
        self.fold();
        self.body.unwrap_or_default()
    }
}

impl fmt::Display for OutputRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(body) = &self.body {
            f.write_str(body)?;
        }
        f.write_str(&self.pending)
    }
}

impl PartialEq for OutputRecord {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string() && self.attrs == other.attrs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_record_has_absent_body() {
        let mut record = OutputRecord::new();
        assert!(record.is_empty());
        assert_eq!(record.body(), "");
        assert_eq!(record.keys().collect::<Vec<_>>(), vec!["body"]);
    }

    #[test]
    fn test_fold_on_read_then_keep_buffering() {
        let mut record = OutputRecord::new();
        record.push("hello, ");
        record.push("world");
        assert_eq!(record.pending, "hello, world");
        assert_eq!(record.body(), "hello, world");
        assert!(record.pending.is_empty());

        record.push("!");
        assert_eq!(record.to_string(), "hello, world!");
        assert_eq!(record.get("body").unwrap().to_text(), "hello, world!");
        assert!(record.pending.is_empty());
    }

    #[test]
    fn test_attributes_keep_insertion_order() {
        let mut record = OutputRecord::new();
        record.insert("title", Value::from("Home"));
        record.insert("author", Value::from("me"));
        assert_eq!(
            record.keys().collect::<Vec<_>>(),
            vec!["body", "title", "author"]
        );
        assert_eq!(record.get("title").unwrap().to_text(), "Home");
        assert!(record.get("missing").is_none());
    }

    #[test]
    fn test_insert_body_replaces_text() {
        let mut record = OutputRecord::new();
        record.push("draft");
        record.insert(BODY, Value::from("final"));
        assert_eq!(record.into_body(), "final");
    }
}
