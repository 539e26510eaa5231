//! Builtin functions visible to every template.
//!
//! The set is a fixed allowlist of pure helpers. Nothing here touches the
//! filesystem, the environment or the process.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use once_cell::sync::Lazy;

use super::errors::{EvalError, EvalResult};
use super::ops;
use super::scope::Scope;
use super::value::{Args, Object, Value};
use crate::expr::BinaryOp;

/// Largest sequence `range` will build
const RANGE_LIMIT: i64 = 1_000_000;

type BuiltinFn = fn(Args) -> EvalResult<Value>;

/// A native function exposed to templates
pub struct Builtin {
    name: &'static str,
    func: BuiltinFn,
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<built-in function {}>", self.name)
    }
}

impl Object for Builtin {
    fn type_name(&self) -> &str {
        "builtin_function_or_method"
    }

    fn is_callable(&self) -> bool {
        true
    }

    fn call(&self, args: Args) -> EvalResult<Value> {
        (self.func)(args)
    }

    fn to_text(&self) -> String {
        format!("<built-in function {}>", self.name)
    }
}

const TABLE: &[(&str, BuiltinFn)] = &[
    ("abs", abs),
    ("all", all),
    ("any", any),
    ("bool", bool_),
    ("callable", callable),
    ("chr", chr),
    ("dict", dict),
    ("divmod", divmod),
    ("enumerate", enumerate),
    ("filter", filter),
    ("float", float),
    ("hex", hex),
    ("int", int),
    ("len", len),
    ("list", list),
    ("max", max),
    ("min", min),
    ("oct", oct),
    ("ord", ord),
    ("pow", pow),
    ("range", range),
    ("repr", repr),
    ("reversed", reversed),
    ("round", round),
    ("sorted", sorted),
    ("str", str_),
    ("sum", sum),
    ("tuple", list),
    ("zip", zip),
];

static BUILTINS: Lazy<Arc<Scope>> = Lazy::new(|| {
    let vars: HashMap<String, Value> = TABLE
        .iter()
        .map(|&(name, func)| (name.to_string(), Value::object(Builtin { name, func })))
        .collect();
    Scope::root(vars)
});

/// Outermost scope shared by every template
pub fn builtins() -> Arc<Scope> {
    Arc::clone(&BUILTINS)
}

fn take_keyword(args: &mut Args, name: &str) -> Option<Value> {
    args.named.shift_remove(name)
}

fn abs(args: Args) -> EvalResult<Value> {
    args.check("abs", 1, 1)?;
    match &args.positional[0] {
        Value::Float(f) => Ok(Value::Float(f.abs())),
        other => {
            let i = other.as_int().ok_or_else(|| {
                EvalError::type_error(format!(
                    "bad operand type for abs(): '{}'",
                    other.type_name()
                ))
            })?;
            i.checked_abs().map(Value::Int).ok_or(EvalError::Overflow)
        }
    }
}

fn all(args: Args) -> EvalResult<Value> {
    args.check("all", 1, 1)?;
    Ok(Value::Bool(ops::iterate(&args.positional[0])?.iter().all(Value::truthy)))
}

fn any(args: Args) -> EvalResult<Value> {
    args.check("any", 1, 1)?;
    Ok(Value::Bool(ops::iterate(&args.positional[0])?.iter().any(Value::truthy)))
}

fn bool_(args: Args) -> EvalResult<Value> {
    args.check("bool", 0, 1)?;
    Ok(Value::Bool(args.get(0).is_some_and(Value::truthy)))
}

fn callable(args: Args) -> EvalResult<Value> {
    args.check("callable", 1, 1)?;
    Ok(Value::Bool(ops::is_callable(&args.positional[0])))
}

fn chr(args: Args) -> EvalResult<Value> {
    args.check("chr", 1, 1)?;
    let code = args.positional[0].expect_int("chr() argument")?;
    u32::try_from(code)
        .ok()
        .and_then(char::from_u32)
        .map(|c| Value::str(c.to_string()))
        .ok_or_else(|| EvalError::value("chr() arg not in range(0x110000)"))
}

fn ord(args: Args) -> EvalResult<Value> {
    args.check("ord", 1, 1)?;
    let text = args.positional[0].expect_str("ord() argument")?;
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(Value::Int(i64::from(u32::from(c)))),
        _ => Err(EvalError::type_error(format!(
            "ord() expected a character, but string of length {} found",
            text.chars().count()
        ))),
    }
}

/// Key/value pair out of a two-element sequence
fn pair(item: &Value) -> EvalResult<(String, Value)> {
    let items = ops::iterate(item)?;
    match items.as_slice() {
        [key, value] => Ok((key.to_key(), value.clone())),
        other => Err(EvalError::value(format!(
            "dictionary update sequence element has length {}; 2 is required",
            other.len()
        ))),
    }
}

fn dict(args: Args) -> EvalResult<Value> {
    args.check_positional("dict", 0, 1)?;
    let mut entries = IndexMap::new();
    match args.get(0) {
        Some(Value::Map(source)) => {
            entries.extend(source.iter().map(|(k, v)| (k.clone(), v.clone())))
        }
        Some(source) => {
            for item in ops::iterate(source)? {
                let (key, value) = pair(&item)?;
                entries.insert(key, value);
            }
        }
        None => {}
    }
    entries.extend(args.named);
    Ok(Value::map(entries))
}

fn divmod(args: Args) -> EvalResult<Value> {
    args.check("divmod", 2, 2)?;
    let (a, b) = (&args.positional[0], &args.positional[1]);
    Ok(Value::list(vec![
        ops::binary(BinaryOp::FloorDiv, a, b)?,
        ops::binary(BinaryOp::Mod, a, b)?,
    ]))
}

fn enumerate(mut args: Args) -> EvalResult<Value> {
    let start = take_keyword(&mut args, "start");
    args.check("enumerate", 1, 2)?;
    let start = match start.as_ref().or(args.get(1)) {
        Some(start) => start.expect_int("enumerate start")?,
        None => 0,
    };
    let items = ops::iterate(&args.positional[0])?;
    let mut out = Vec::with_capacity(items.len());
    for (offset, item) in items.into_iter().enumerate() {
        let index = start.checked_add(offset as i64).ok_or(EvalError::Overflow)?;
        out.push(Value::list(vec![Value::Int(index), item]));
    }
    Ok(Value::list(out))
}

fn filter(args: Args) -> EvalResult<Value> {
    args.check("filter", 2, 2)?;
    let func = &args.positional[0];
    let mut out = Vec::new();
    for item in ops::iterate(&args.positional[1])? {
        let keep = if func.is_null() {
            item.truthy()
        } else {
            ops::call(func, Args::new(vec![item.clone()]))?.truthy()
        };
        if keep {
            out.push(item);
        }
    }
    Ok(Value::list(out))
}

fn float(args: Args) -> EvalResult<Value> {
    args.check("float", 0, 1)?;
    let Some(value) = args.get(0) else {
        return Ok(Value::Float(0.0));
    };
    if let Some(f) = value.as_float() {
        return Ok(Value::Float(f));
    }
    let text = value.expect_str("float() argument")?.trim();
    let parsed = match text.to_ascii_lowercase().as_str() {
        "inf" | "+inf" | "infinity" => Some(f64::INFINITY),
        "-inf" | "-infinity" => Some(f64::NEG_INFINITY),
        "nan" => Some(f64::NAN),
        _ => text.parse().ok(),
    };
    parsed
        .map(Value::Float)
        .ok_or_else(|| EvalError::value(format!("could not convert string to float: '{text}'")))
}

fn radix(args: &Args, name: &str, prefix: &str) -> EvalResult<Value> {
    args.check(name, 1, 1)?;
    let i = args.positional[0].expect_int(&format!("{name}() argument"))?;
    let magnitude = i.unsigned_abs();
    let digits = match prefix {
        "0x" => format!("{magnitude:x}"),
        _ => format!("{magnitude:o}"),
    };
    let sign = if i < 0 { "-" } else { "" };
    Ok(Value::str(format!("{sign}{prefix}{digits}")))
}

fn hex(args: Args) -> EvalResult<Value> {
    radix(&args, "hex", "0x")
}

fn oct(args: Args) -> EvalResult<Value> {
    radix(&args, "oct", "0o")
}

fn int(mut args: Args) -> EvalResult<Value> {
    let base = take_keyword(&mut args, "base");
    args.check("int", 0, 2)?;
    let base = base.as_ref().or(args.get(1));
    let Some(value) = args.get(0) else {
        return Ok(Value::Int(0));
    };
    match (value, base) {
        (Value::Str(text), base) => {
            let base = match base {
                Some(base) => base.expect_int("int() base")?,
                None => 10,
            };
            let radix = u32::try_from(base)
                .ok()
                .filter(|b| (2..=36).contains(b))
                .ok_or_else(|| EvalError::value("int() base must be >= 2 and <= 36"))?;
            let cleaned = text.trim().replace('_', "");
            i64::from_str_radix(&cleaned, radix).map(Value::Int).map_err(|_| {
                EvalError::value(format!(
                    "invalid literal for int() with base {base}: {}",
                    value.repr()
                ))
            })
        }
        (_, Some(_)) => Err(EvalError::type_error(
            "int() can't convert non-string with explicit base",
        )),
        (Value::Float(f), None) => {
            if !f.is_finite() {
                return Err(EvalError::value(format!("cannot convert float {} to integer", value)));
            }
            let truncated = f.trunc();
            if truncated < i64::MIN as f64 || truncated >= i64::MAX as f64 {
                return Err(EvalError::Overflow);
            }
            Ok(Value::Int(truncated as i64))
        }
        (other, None) => other.as_int().map(Value::Int).ok_or_else(|| {
            EvalError::type_error(format!(
                "int() argument must be a string or a number, not '{}'",
                other.type_name()
            ))
        }),
    }
}

fn len(args: Args) -> EvalResult<Value> {
    args.check("len", 1, 1)?;
    Ok(Value::Int(ops::length(&args.positional[0])? as i64))
}

fn list(args: Args) -> EvalResult<Value> {
    args.check("list", 0, 1)?;
    match args.get(0) {
        Some(source) => Ok(Value::list(ops::iterate(source)?)),
        None => Ok(Value::list(Vec::new())),
    }
}

fn extreme(mut args: Args, name: &str, wanted: Ordering) -> EvalResult<Value> {
    let key = take_keyword(&mut args, "key").filter(|k| !k.is_null());
    let default = take_keyword(&mut args, "default");
    args.check(name, 1, usize::MAX)?;
    let items = if args.positional.len() == 1 {
        ops::iterate(&args.positional[0])?
    } else {
        args.positional
    };

    let mut best: Option<(Value, Value)> = None;
    for item in items {
        let rank = match &key {
            Some(key) => ops::call(key, Args::new(vec![item.clone()]))?,
            None => item.clone(),
        };
        let replace = match &best {
            None => true,
            Some((best_rank, _)) => {
                let ordering = ops::compare_values(&rank, best_rank).ok_or_else(|| {
                    EvalError::type_error(format!(
                        "'{}' not supported between instances of '{}' and '{}'",
                        if wanted == Ordering::Greater { ">" } else { "<" },
                        rank.type_name(),
                        best_rank.type_name()
                    ))
                })?;
                ordering == wanted
            }
        };
        if replace {
            best = Some((rank, item));
        }
    }
    match (best, default) {
        (Some((_, item)), _) => Ok(item),
        (None, Some(default)) => Ok(default),
        (None, None) => Err(EvalError::value(format!("{name}() arg is an empty sequence"))),
    }
}

fn max(args: Args) -> EvalResult<Value> {
    extreme(args, "max", Ordering::Greater)
}

fn min(args: Args) -> EvalResult<Value> {
    extreme(args, "min", Ordering::Less)
}

fn pow(args: Args) -> EvalResult<Value> {
    args.check("pow", 2, 2)?;
    ops::binary(BinaryOp::Pow, &args.positional[0], &args.positional[1])
}

fn range(args: Args) -> EvalResult<Value> {
    args.check("range", 1, 3)?;
    let bounds = args
        .positional
        .iter()
        .map(|v| v.expect_int("range() argument"))
        .collect::<EvalResult<Vec<i64>>>()?;
    let (start, stop, step) = match bounds.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => return Err(EvalError::arity("range expected at most 3 arguments")),
    };
    if step == 0 {
        return Err(EvalError::value("range() arg 3 must not be zero"));
    }
    let span = if step > 0 { stop.saturating_sub(start) } else { start.saturating_sub(stop) };
    let count = if span <= 0 { 0 } else { (span - 1) / step.saturating_abs() + 1 };
    if count > RANGE_LIMIT {
        return Err(EvalError::value(format!(
            "range() of {count} items exceeds the limit of {RANGE_LIMIT}"
        )));
    }
    Ok(Value::list(
        (0..count).map(|i| Value::Int(start + i * step)).collect(),
    ))
}

fn repr(args: Args) -> EvalResult<Value> {
    args.check("repr", 1, 1)?;
    Ok(Value::str(args.positional[0].repr()))
}

fn reversed(args: Args) -> EvalResult<Value> {
    args.check("reversed", 1, 1)?;
    let mut items = ops::iterate(&args.positional[0])?;
    items.reverse();
    Ok(Value::list(items))
}

/// Round half to even, as the host language does
fn round(args: Args) -> EvalResult<Value> {
    args.check("round", 1, 2)?;
    let value = &args.positional[0];
    let digits = match args.get(1) {
        None | Some(Value::Null) => None,
        Some(digits) => Some(digits.expect_int("round() ndigits")?),
    };
    match (value, digits) {
        (Value::Int(_) | Value::Bool(_), None) => {
            Ok(Value::Int(value.as_int().unwrap_or_default()))
        }
        (Value::Int(_) | Value::Bool(_), Some(_)) => Ok(value.clone()),
        (Value::Float(f), None) => {
            let rounded = f.round_ties_even();
            if !rounded.is_finite() || rounded.abs() >= i64::MAX as f64 {
                return Err(EvalError::Overflow);
            }
            Ok(Value::Int(rounded as i64))
        }
        (Value::Float(f), Some(digits)) => {
            let digits = i32::try_from(digits).map_err(|_| EvalError::Overflow)?;
            let scale = 10f64.powi(digits);
            Ok(Value::Float((f * scale).round_ties_even() / scale))
        }
        (other, _) => Err(EvalError::type_error(format!(
            "type {} doesn't define __round__ method",
            other.type_name()
        ))),
    }
}

fn sorted(mut args: Args) -> EvalResult<Value> {
    let key = take_keyword(&mut args, "key").filter(|k| !k.is_null());
    let reverse = take_keyword(&mut args, "reverse").is_some_and(|r| r.truthy());
    args.check("sorted", 1, 1)?;

    let mut ranked = Vec::new();
    for item in ops::iterate(&args.positional[0])? {
        let rank = match &key {
            Some(key) => ops::call(key, Args::new(vec![item.clone()]))?,
            None => item.clone(),
        };
        ranked.push((rank, item));
    }

    let mut failure = None;
    ranked.sort_by(|(a, _), (b, _)| {
        let ordering = ops::compare_values(a, b).unwrap_or_else(|| {
            failure.get_or_insert_with(|| {
                EvalError::type_error(format!(
                    "'<' not supported between instances of '{}' and '{}'",
                    a.type_name(),
                    b.type_name()
                ))
            });
            Ordering::Equal
        });
        if reverse { ordering.reverse() } else { ordering }
    });
    if let Some(error) = failure {
        return Err(error);
    }
    Ok(Value::list(ranked.into_iter().map(|(_, item)| item).collect()))
}

fn str_(args: Args) -> EvalResult<Value> {
    args.check("str", 0, 1)?;
    Ok(Value::str(args.get(0).map(Value::to_text).unwrap_or_default()))
}

fn sum(mut args: Args) -> EvalResult<Value> {
    let start = take_keyword(&mut args, "start");
    args.check("sum", 1, 2)?;
    let mut total = start.or_else(|| args.get(1).cloned()).unwrap_or(Value::Int(0));
    if total.as_str().is_some() {
        return Err(EvalError::type_error(
            "sum() can't sum strings [use ''.join(seq) instead]",
        ));
    }
    for item in ops::iterate(&args.positional[0])? {
        total = ops::binary(BinaryOp::Add, &total, &item)?;
    }
    Ok(total)
}

fn zip(args: Args) -> EvalResult<Value> {
    args.check("zip", 0, usize::MAX)?;
    let columns = args
        .positional
        .iter()
        .map(ops::iterate)
        .collect::<EvalResult<Vec<_>>>()?;
    let rows = columns.iter().map(Vec::len).min().unwrap_or(0);
    Ok(Value::list(
        (0..rows)
            .map(|row| Value::list(columns.iter().map(|column| column[row].clone()).collect()))
            .collect(),
    ))
}
