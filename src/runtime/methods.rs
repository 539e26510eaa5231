//! Methods of the builtin value types (`name.upper()`, `d.items()`)

use indexmap::IndexMap;

use super::errors::{EvalError, EvalResult};
use super::format::str_format;
use super::ops;
use super::value::{Args, Object, Value};

const STR_METHODS: &[&str] = &[
    "capitalize",
    "count",
    "endswith",
    "find",
    "format",
    "isdigit",
    "join",
    "ljust",
    "lower",
    "lstrip",
    "replace",
    "rjust",
    "rstrip",
    "split",
    "startswith",
    "strip",
    "title",
    "upper",
];

const LIST_METHODS: &[&str] = &["count", "index"];

const MAP_METHODS: &[&str] = &["get", "items", "keys", "values"];

/// A method looked up on a value, waiting to be called
#[derive(Debug)]
pub struct BoundMethod {
    receiver: Value,
    name: &'static str,
}

/// Bound method `name` of `value`, if its type has one
pub fn lookup_method(value: &Value, name: &str) -> Option<Value> {
    let table = match value {
        Value::Str(_) => STR_METHODS,
        Value::List(_) => LIST_METHODS,
        Value::Map(_) => MAP_METHODS,
        _ => return None,
    };
    let name = table.iter().copied().find(|m| *m == name)?;
    Some(Value::object(BoundMethod {
        receiver: value.clone(),
        name,
    }))
}

impl Object for BoundMethod {
    fn type_name(&self) -> &str {
        "builtin_function_or_method"
    }

    fn is_callable(&self) -> bool {
        true
    }

    fn call(&self, args: Args) -> EvalResult<Value> {
        match &self.receiver {
            Value::Str(s) => str_method(s, self.name, &args),
            Value::List(items) => list_method(items, self.name, &args),
            Value::Map(entries) => map_method(entries, self.name, &args),
            other => Err(EvalError::no_attribute(other.type_name(), self.name)),
        }
    }

    fn to_text(&self) -> String {
        format!(
            "<built-in method {} of {} object>",
            self.name,
            self.receiver.type_name()
        )
    }
}

fn optional_str<'a>(args: &'a Args, index: usize, what: &str) -> EvalResult<Option<&'a str>> {
    match args.get(index) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value.expect_str(what).map(Some),
    }
}

fn strip_chars<'a>(s: &'a str, chars: Option<&str>, left: bool, right: bool) -> &'a str {
    let matches = |c: char| match chars {
        Some(set) => set.contains(c),
        None => c.is_whitespace(),
    };
    let s = if left { s.trim_start_matches(matches) } else { s };
    if right { s.trim_end_matches(matches) } else { s }
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut previous_cased = false;
    for c in s.chars() {
        if previous_cased {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        previous_cased = c.is_alphabetic();
    }
    out
}

fn justify(s: &str, args: &Args, name: &str, left: bool) -> EvalResult<Value> {
    args.check(name, 1, 2)?;
    let width = usize::try_from(args.positional[0].expect_int("width")?).unwrap_or(0);
    let fill = match optional_str(args, 1, "fill character")? {
        Some(fill) if fill.chars().count() == 1 => fill,
        Some(_) => {
            return Err(EvalError::type_error(
                "The fill character must be exactly one character long",
            ));
        }
        None => " ",
    };
    let len = s.chars().count();
    if width <= len {
        return Ok(Value::str(s));
    }
    ops::check_size(Some(width), "justified width")?;
    let padding = fill.repeat(width - len);
    Ok(Value::str(if left {
        format!("{s}{padding}")
    } else {
        format!("{padding}{s}")
    }))
}

fn str_method(s: &str, name: &str, args: &Args) -> EvalResult<Value> {
    match name {
        "format" => return str_format(s, args).map(Value::str),
        "ljust" => return justify(s, args, name, true),
        "rjust" => return justify(s, args, name, false),
        _ => {}
    }

    Ok(match name {
        "upper" => {
            args.check(name, 0, 0)?;
            Value::str(s.to_uppercase())
        }
        "lower" => {
            args.check(name, 0, 0)?;
            Value::str(s.to_lowercase())
        }
        "title" => {
            args.check(name, 0, 0)?;
            Value::str(title_case(s))
        }
        "capitalize" => {
            args.check(name, 0, 0)?;
            let mut chars = s.chars();
            Value::str(match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            })
        }
        "isdigit" => {
            args.check(name, 0, 0)?;
            Value::Bool(!s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))
        }
        "strip" | "lstrip" | "rstrip" => {
            args.check(name, 0, 1)?;
            let chars = optional_str(args, 0, "strip arg")?;
            Value::str(strip_chars(s, chars, name != "rstrip", name != "lstrip"))
        }
        "replace" => {
            args.check(name, 2, 3)?;
            let old = args.positional[0].expect_str("replace() argument 1")?;
            let new = args.positional[1].expect_str("replace() argument 2")?;
            match args.get(2) {
                Some(count) => {
                    let count = count.expect_int("replace() argument 3")?;
                    match usize::try_from(count) {
                        Ok(count) => Value::str(s.replacen(old, new, count)),
                        Err(_) => Value::str(s.replace(old, new)),
                    }
                }
                None => Value::str(s.replace(old, new)),
            }
        }
        "split" => {
            args.check(name, 0, 2)?;
            let limit = match args.get(1) {
                Some(limit) => usize::try_from(limit.expect_int("maxsplit")?).ok(),
                None => None,
            };
            let parts: Vec<Value> = match (optional_str(args, 0, "separator")?, limit) {
                (Some(""), _) => return Err(EvalError::value("empty separator")),
                (Some(sep), Some(n)) => s.splitn(n + 1, sep).map(Value::from).collect(),
                (Some(sep), None) => s.split(sep).map(Value::from).collect(),
                (None, Some(n)) => split_whitespace_limited(s, n),
                (None, None) => s.split_whitespace().map(Value::from).collect(),
            };
            Value::list(parts)
        }
        "join" => {
            args.check(name, 1, 1)?;
            let parts = ops::iterate(&args.positional[0])?
                .iter()
                .map(|part| match part {
                    Value::Str(part) => Ok(part.to_string()),
                    other => Err(EvalError::type_error(format!(
                        "sequence item: expected str instance, {} found",
                        other.type_name()
                    ))),
                })
                .collect::<EvalResult<Vec<_>>>()?;
            Value::str(parts.join(s))
        }
        "startswith" | "endswith" => {
            args.check(name, 1, 1)?;
            let candidates = match &args.positional[0] {
                Value::List(items) => items.as_ref().clone(),
                other => vec![other.clone()],
            };
            let mut found = false;
            for candidate in &candidates {
                let affix = candidate.expect_str(&format!("{name} arg"))?;
                found |= if name == "startswith" {
                    s.starts_with(affix)
                } else {
                    s.ends_with(affix)
                };
            }
            Value::Bool(found)
        }
        "find" => {
            args.check(name, 1, 1)?;
            let needle = args.positional[0].expect_str("find() argument")?;
            Value::Int(match s.find(needle) {
                Some(byte) => s[..byte].chars().count() as i64,
                None => -1,
            })
        }
        "count" => {
            args.check(name, 1, 1)?;
            let needle = args.positional[0].expect_str("count() argument")?;
            let count = if needle.is_empty() {
                s.chars().count() + 1
            } else {
                s.matches(needle).count()
            };
            Value::Int(count as i64)
        }
        _ => return Err(EvalError::no_attribute("str", name)),
    })
}

fn split_whitespace_limited(s: &str, limit: usize) -> Vec<Value> {
    let mut parts = Vec::new();
    let mut rest = s.trim_start();
    while !rest.is_empty() {
        if parts.len() == limit {
            parts.push(Value::str(rest));
            break;
        }
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        parts.push(Value::str(&rest[..end]));
        rest = rest[end..].trim_start();
    }
    parts
}

fn list_method(items: &[Value], name: &str, args: &Args) -> EvalResult<Value> {
    args.check(name, 1, 1)?;
    let needle = &args.positional[0];
    match name {
        "count" => Ok(Value::Int(
            items.iter().filter(|item| ops::equals(item, needle)).count() as i64,
        )),
        "index" => items
            .iter()
            .position(|item| ops::equals(item, needle))
            .map(|i| Value::Int(i as i64))
            .ok_or_else(|| EvalError::value(format!("{} is not in list", needle.repr()))),
        _ => Err(EvalError::no_attribute("list", name)),
    }
}

fn map_method(entries: &IndexMap<String, Value>, name: &str, args: &Args) -> EvalResult<Value> {
    match name {
        "get" => {
            args.check(name, 1, 2)?;
            let key = args.positional[0].to_key();
            Ok(entries
                .get(&key)
                .cloned()
                .or_else(|| args.get(1).cloned())
                .unwrap_or_default())
        }
        "keys" => {
            args.check(name, 0, 0)?;
            Ok(Value::list(entries.keys().map(|k| Value::str(k.as_str())).collect()))
        }
        "values" => {
            args.check(name, 0, 0)?;
            Ok(Value::list(entries.values().cloned().collect()))
        }
        "items" => {
            args.check(name, 0, 0)?;
            Ok(Value::list(
                entries
                    .iter()
                    .map(|(k, v)| Value::list(vec![Value::str(k.as_str()), v.clone()]))
                    .collect(),
            ))
        }
        _ => Err(EvalError::no_attribute("dict", name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(receiver: Value, name: &str, args: Vec<Value>) -> EvalResult<Value> {
        let method = lookup_method(&receiver, name).expect("method exists");
        ops::call(&method, Args::new(args))
    }

    #[test]
    fn test_string_case_methods() {
        assert_eq!(
            call("hello world".into(), "title", vec![]).unwrap(),
            Value::from("Hello World")
        );
        assert_eq!(call("hELLO".into(), "capitalize", vec![]).unwrap(), Value::from("Hello"));
        assert_eq!(call("abc".into(), "upper", vec![]).unwrap(), Value::from("ABC"));
        assert!(call("abc".into(), "upper", vec![Value::Int(1)]).is_err());
    }

    #[test]
    fn test_strip_split_join() {
        assert_eq!(call("  x  ".into(), "strip", vec![]).unwrap(), Value::from("x"));
        assert_eq!(call("--x--".into(), "rstrip", vec!["-".into()]).unwrap(), Value::from("--x"));
        assert_eq!(
            call("a,b,c".into(), "split", vec![",".into(), Value::Int(1)]).unwrap(),
            Value::list(vec!["a".into(), "b,c".into()])
        );
        assert_eq!(
            call(" a  b ".into(), "split", vec![]).unwrap(),
            Value::list(vec!["a".into(), "b".into()])
        );
        assert_eq!(
            call(", ".into(), "join", vec![Value::list(vec!["a".into(), "b".into()])]).unwrap(),
            Value::from("a, b")
        );
        assert!(call(",".into(), "join", vec![Value::list(vec![Value::Int(1)])]).is_err());
    }

    #[test]
    fn test_search_methods() {
        assert_eq!(call("héllo".into(), "find", vec!["l".into()]).unwrap(), Value::Int(2));
        assert_eq!(call("abc".into(), "find", vec!["z".into()]).unwrap(), Value::Int(-1));
        assert_eq!(call("banana".into(), "count", vec!["an".into()]).unwrap(), Value::Int(2));
        assert_eq!(
            call(
                "x.html".into(),
                "endswith",
                vec![Value::list(vec![".txt".into(), ".html".into()])]
            )
            .unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            call("7".into(), "rjust", vec![Value::Int(3), "0".into()]).unwrap(),
            Value::from("007")
        );
        assert!(matches!(
            call("7".into(), "ljust", vec![Value::Int(i64::MAX)]),
            Err(EvalError::Value(_))
        ));
    }

    #[test]
    fn test_dict_and_list_methods() {
        let mut entries = IndexMap::new();
        entries.insert("a".to_string(), Value::Int(1));
        let map = Value::map(entries);
        assert_eq!(call(map.clone(), "get", vec!["a".into()]).unwrap(), Value::Int(1));
        assert!(call(map.clone(), "get", vec!["b".into()]).unwrap().is_null());
        assert_eq!(
            call(map.clone(), "get", vec!["b".into(), Value::Int(0)]).unwrap(),
            Value::Int(0)
        );
        assert_eq!(call(map, "items", vec![]).unwrap().repr(), "[['a', 1]]");

        let list = Value::list(vec![Value::Int(3), Value::Int(4), Value::Int(3)]);
        assert_eq!(call(list.clone(), "count", vec![Value::Int(3)]).unwrap(), Value::Int(2));
        assert_eq!(call(list.clone(), "index", vec![Value::Int(4)]).unwrap(), Value::Int(1));
        assert!(call(list, "index", vec![Value::Int(9)]).is_err());
    }

    #[test]
    fn test_unknown_method_is_absent() {
        assert!(lookup_method(&Value::from("x"), "nope").is_none());
        assert!(lookup_method(&Value::Int(1), "upper").is_none());
    }
}
