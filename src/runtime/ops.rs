//! Operators and capability dispatch over [`Value`]

use std::cmp::Ordering;
use std::sync::Arc;

use super::errors::{EvalError, EvalResult};
use super::format::percent_format;
use super::methods::lookup_method;
use super::value::{Args, Value};
use crate::expr::{BinaryOp, CompareOp, UnaryOp};

#[derive(Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

fn numeric(value: &Value) -> Option<Num> {
    match value {
        Value::Int(i) => Some(Num::Int(*i)),
        Value::Bool(b) => Some(Num::Int(i64::from(*b))),
        Value::Float(f) => Some(Num::Float(*f)),
        _ => None,
    }
}

fn unsupported(op: &str, left: &Value, right: &Value) -> EvalError {
    EvalError::type_error(format!(
        "unsupported operand type(s) for {op}: '{}' and '{}'",
        left.type_name(),
        right.type_name()
    ))
}

fn floor_div(a: i64, b: i64) -> EvalResult<i64> {
    if b == 0 {
        return Err(EvalError::ZeroDivision);
    }
    let q = a.checked_div(b).ok_or(EvalError::Overflow)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        Ok(q - 1)
    } else {
        Ok(q)
    }
}

fn floor_mod(a: i64, b: i64) -> EvalResult<i64> {
    if b == 0 {
        return Err(EvalError::ZeroDivision);
    }
    let r = a.checked_rem(b).unwrap_or(0);
    if r != 0 && ((r < 0) != (b < 0)) {
        Ok(r + b)
    } else {
        Ok(r)
    }
}

fn float_mod(a: f64, b: f64) -> EvalResult<f64> {
    if b == 0.0 {
        return Err(EvalError::ZeroDivision);
    }
    let r = a % b;
    if r != 0.0 && ((r < 0.0) != (b < 0.0)) {
        Ok(r + b)
    } else {
        Ok(r)
    }
}

/// Largest string or list a single operation may build
pub const SIZE_LIMIT: usize = 10_000_000;

/// Check that a result of `size` elements stays within [`SIZE_LIMIT`]
pub(crate) fn check_size(size: Option<usize>, what: &str) -> EvalResult<usize> {
    match size {
        Some(size) if size <= SIZE_LIMIT => Ok(size),
        _ => Err(EvalError::value(format!(
            "{what} exceeds the limit of {SIZE_LIMIT}"
        ))),
    }
}

fn repeat<T: Clone>(items: &[T], times: i64) -> EvalResult<Vec<T>> {
    let times = usize::try_from(times).unwrap_or(0);
    check_size(items.len().checked_mul(times), "repeated sequence")?;
    Ok(items.iter().cycle().take(items.len() * times).cloned().collect())
}

fn arithmetic(op: BinaryOp, a: Num, b: Num) -> EvalResult<Value> {
    use BinaryOp::*;
    match (a, b) {
        (Num::Int(a), Num::Int(b)) => match op {
            Add => a.checked_add(b).map(Value::Int).ok_or(EvalError::Overflow),
            Sub => a.checked_sub(b).map(Value::Int).ok_or(EvalError::Overflow),
            Mul => a.checked_mul(b).map(Value::Int).ok_or(EvalError::Overflow),
            Div => {
                if b == 0 {
                    return Err(EvalError::ZeroDivision);
                }
                Ok(Value::Float(a as f64 / b as f64))
            }
            FloorDiv => floor_div(a, b).map(Value::Int),
            Mod => floor_mod(a, b).map(Value::Int),
            Pow => {
                if b < 0 {
                    return Ok(Value::Float((a as f64).powf(b as f64)));
                }
                u32::try_from(b)
                    .ok()
                    .and_then(|b| a.checked_pow(b))
                    .map(Value::Int)
                    .ok_or(EvalError::Overflow)
            }
        },
        (a, b) => {
            let a = match a {
                Num::Int(i) => i as f64,
                Num::Float(f) => f,
            };
            let b = match b {
                Num::Int(i) => i as f64,
                Num::Float(f) => f,
            };
            let result = match op {
                Add => a + b,
                Sub => a - b,
                Mul => a * b,
                Div | FloorDiv if b == 0.0 => return Err(EvalError::ZeroDivision),
                Div => a / b,
                FloorDiv => (a / b).floor(),
                Mod => float_mod(a, b)?,
                Pow => a.powf(b),
            };
            Ok(Value::Float(result))
        }
    }
}

/// Evaluate `left OP right`
pub fn binary(op: BinaryOp, left: &Value, right: &Value) -> EvalResult<Value> {
    if let (Some(a), Some(b)) = (numeric(left), numeric(right)) {
        return arithmetic(op, a, b);
    }
    match (op, left, right) {
        (BinaryOp::Add, Value::Str(a), Value::Str(b)) => Ok(Value::str(format!("{a}{b}"))),
        (BinaryOp::Add, Value::List(a), Value::List(b)) => {
            Ok(Value::list(a.iter().chain(b.iter()).cloned().collect()))
        }
        (BinaryOp::Mul, Value::Str(s), n) | (BinaryOp::Mul, n, Value::Str(s))
            if n.as_int().is_some() =>
        {
            let times = usize::try_from(n.as_int().unwrap_or(0)).unwrap_or(0);
            check_size(s.len().checked_mul(times), "repeated string")?;
            Ok(Value::str(s.repeat(times)))
        }
        (BinaryOp::Mul, Value::List(items), n) | (BinaryOp::Mul, n, Value::List(items))
            if n.as_int().is_some() =>
        {
            Ok(Value::list(repeat(items, n.as_int().unwrap_or(0))?))
        }
        (BinaryOp::Mod, Value::Str(format), args) => percent_format(format, args).map(Value::str),
        _ => Err(unsupported(op.symbol(), left, right)),
    }
}

/// Evaluate a unary operator
pub fn unary(op: UnaryOp, operand: &Value) -> EvalResult<Value> {
    match (op, numeric(operand)) {
        (UnaryOp::Not, _) => Ok(Value::Bool(!operand.truthy())),
        (UnaryOp::Neg, Some(Num::Int(i))) => {
            i.checked_neg().map(Value::Int).ok_or(EvalError::Overflow)
        }
        (UnaryOp::Neg, Some(Num::Float(f))) => Ok(Value::Float(-f)),
        (UnaryOp::Pos, Some(Num::Int(i))) => Ok(Value::Int(i)),
        (UnaryOp::Pos, Some(Num::Float(f))) => Ok(Value::Float(f)),
        (op, None) => Err(EvalError::type_error(format!(
            "bad operand type for unary {}: '{}'",
            if op == UnaryOp::Neg { "-" } else { "+" },
            operand.type_name()
        ))),
    }
}

/// Value equality, `==`
pub fn equals(left: &Value, right: &Value) -> bool {
    if let (Some(a), Some(b)) = (numeric(left), numeric(right)) {
        return match (a, b) {
            (Num::Int(a), Num::Int(b)) => a == b,
            (Num::Int(a), Num::Float(b)) | (Num::Float(b), Num::Int(a)) => a as f64 == b,
            (Num::Float(a), Num::Float(b)) => a == b,
        };
    }
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::List(a), Value::List(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| equals(x, y))
        }
        (Value::Map(a), Value::Map(b)) => {
            a.len() == b.len()
                && a
                    .iter()
                    .all(|(k, v)| b.get(k).is_some_and(|other| equals(v, other)))
        }
        (Value::Record(a), Value::Record(b)) => a == b,
        (Value::Object(a), Value::Object(b)) => std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)),
        _ => false,
    }
}

/// Ordering for `< <= > >=` and `sorted`; `None` when the values are not
/// comparable
pub fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (numeric(left), numeric(right)) {
        return match (a, b) {
            (Num::Int(a), Num::Int(b)) => Some(a.cmp(&b)),
            (Num::Int(a), Num::Float(b)) => (a as f64).partial_cmp(&b),
            (Num::Float(a), Num::Int(b)) => a.partial_cmp(&(b as f64)),
            (Num::Float(a), Num::Float(b)) => a.partial_cmp(&b),
        };
    }
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::List(a), Value::List(b)) => {
            for (x, y) in a.iter().zip(b.iter()) {
                match compare_values(x, y)? {
                    Ordering::Equal => continue,
                    other => return Some(other),
                }
            }
            Some(a.len().cmp(&b.len()))
        }
        _ => None,
    }
}

fn identical(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Str(a), Value::Str(b)) => Arc::ptr_eq(a, b),
        (Value::List(a), Value::List(b)) => Arc::ptr_eq(a, b),
        (Value::Map(a), Value::Map(b)) => Arc::ptr_eq(a, b),
        (Value::Record(a), Value::Record(b)) => Arc::ptr_eq(a, b),
        (Value::Object(a), Value::Object(b)) => std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)),
        _ => false,
    }
}

/// Membership, `item in container`
pub fn contains(container: &Value, item: &Value) -> EvalResult<bool> {
    match container {
        Value::Str(s) => match item {
            Value::Str(needle) => Ok(s.contains(&**needle)),
            other => Err(EvalError::type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::List(items) => Ok(items.iter().any(|x| equals(x, item))),
        Value::Map(entries) => Ok(entries.contains_key(&item.to_key())),
        Value::Record(record) => {
            let key = item.to_key();
            Ok(record.keys().any(|k| k == key))
        }
        Value::Object(object) => Ok(object.iterate()?.iter().any(|x| equals(x, item))),
        other => Err(EvalError::type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

/// Evaluate one comparison link
pub fn compare(op: CompareOp, left: &Value, right: &Value) -> EvalResult<bool> {
    let ordered = |accept: fn(Ordering) -> bool| {
        compare_values(left, right).map(accept).ok_or_else(|| {
            EvalError::type_error(format!(
                "'{}' not supported between instances of '{}' and '{}'",
                op.symbol(),
                left.type_name(),
                right.type_name()
            ))
        })
    };
    match op {
        CompareOp::Eq => Ok(equals(left, right)),
        CompareOp::NotEq => Ok(!equals(left, right)),
        CompareOp::Lt => ordered(Ordering::is_lt),
        CompareOp::LtE => ordered(Ordering::is_le),
        CompareOp::Gt => ordered(Ordering::is_gt),
        CompareOp::GtE => ordered(Ordering::is_ge),
        CompareOp::In => contains(right, left),
        CompareOp::NotIn => contains(right, left).map(|found| !found),
        CompareOp::Is => Ok(identical(left, right)),
        CompareOp::IsNot => Ok(!identical(left, right)),
    }
}

/// Attribute access, `value.name`. Dicts answer their methods first, then
/// their keys.
pub fn get_attr(value: &Value, name: &str) -> EvalResult<Value> {
    if let Some(method) = lookup_method(value, name) {
        return Ok(method);
    }
    match value {
        Value::Map(entries) => entries
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::no_attribute("dict", name)),
        Value::Record(record) => record
            .peek(name)
            .ok_or_else(|| EvalError::no_attribute("TemplateResult", name)),
        Value::Object(object) => object.get_attr(name),
        other => Err(EvalError::no_attribute(other.type_name(), name)),
    }
}

fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let index = if index < 0 { index + len } else { index };
    (0..len).contains(&index).then_some(index as usize)
}

/// Subscript access, `value[key]`
pub fn get_index(value: &Value, key: &Value) -> EvalResult<Value> {
    match value {
        Value::List(items) => {
            let index = key.expect_int("list indices")?;
            normalize_index(index, items.len())
                .map(|i| items[i].clone())
                .ok_or_else(|| EvalError::IndexOutOfRange("list".to_string()))
        }
        Value::Str(s) => {
            let index = key.expect_int("string indices")?;
            let len = s.chars().count();
            normalize_index(index, len)
                .and_then(|i| s.chars().nth(i))
                .map(|c| Value::str(c.to_string()))
                .ok_or_else(|| EvalError::IndexOutOfRange("string".to_string()))
        }
        Value::Map(entries) => entries
            .get(&key.to_key())
            .cloned()
            .ok_or_else(|| EvalError::KeyNotFound(key.repr())),
        Value::Record(record) => record
            .peek(&key.to_key())
            .ok_or_else(|| EvalError::KeyNotFound(key.repr())),
        Value::Object(object) => object.get_index(key),
        other => Err(EvalError::NotSubscriptable(other.type_name().to_string())),
    }
}

/// Positions selected by `[start:stop:step]` over a sequence of `len`
fn slice_positions(
    len: usize,
    start: Option<i64>,
    stop: Option<i64>,
    step: Option<i64>,
) -> EvalResult<Vec<usize>> {
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(EvalError::value("slice step cannot be zero"));
    }
    let len = len as i64;
    let clamp = |bound: i64, low: i64, high: i64| {
        let bound = if bound < 0 { bound + len } else { bound };
        bound.clamp(low, high)
    };
    let mut positions = Vec::new();
    if step > 0 {
        let start = start.map_or(0, |s| clamp(s, 0, len));
        let stop = stop.map_or(len, |s| clamp(s, 0, len));
        let mut i = start;
        while i < stop {
            positions.push(i as usize);
            i += step;
        }
    } else {
        let start = start.map_or(len - 1, |s| clamp(s, -1, len - 1));
        let stop = stop.map_or(-1, |s| clamp(s, -1, len - 1));
        let mut i = start;
        while i > stop {
            positions.push(i as usize);
            i += step;
        }
    }
    Ok(positions)
}

fn slice_bound(bound: Option<&Value>) -> EvalResult<Option<i64>> {
    match bound {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value.expect_int("slice indices").map(Some),
    }
}

/// Slice access, `value[start:stop:step]`
pub fn slice(
    value: &Value,
    start: Option<&Value>,
    stop: Option<&Value>,
    step: Option<&Value>,
) -> EvalResult<Value> {
    let (start, stop, step) = (slice_bound(start)?, slice_bound(stop)?, slice_bound(step)?);
    match value {
        Value::List(items) => {
            let positions = slice_positions(items.len(), start, stop, step)?;
            Ok(Value::list(positions.into_iter().map(|i| items[i].clone()).collect()))
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let positions = slice_positions(chars.len(), start, stop, step)?;
            Ok(Value::str(positions.into_iter().map(|i| chars[i]).collect::<String>()))
        }
        other => Err(EvalError::NotSubscriptable(other.type_name().to_string())),
    }
}

/// Call a value
pub fn call(value: &Value, args: Args) -> EvalResult<Value> {
    match value {
        Value::Object(object) if object.is_callable() => object.call(args),
        other => Err(EvalError::NotCallable(other.type_name().to_string())),
    }
}

pub fn is_callable(value: &Value) -> bool {
    matches!(value, Value::Object(object) if object.is_callable())
}

/// Elements produced by iterating a value
pub fn iterate(value: &Value) -> EvalResult<Vec<Value>> {
    match value {
        Value::List(items) => Ok(items.as_ref().clone()),
        Value::Map(entries) => Ok(entries.keys().map(|k| Value::str(k.as_str())).collect()),
        Value::Str(s) => Ok(s.chars().map(|c| Value::str(c.to_string())).collect()),
        Value::Record(record) => Ok(record.keys().map(Value::from).collect()),
        Value::Object(object) => object.iterate(),
        other => Err(EvalError::NotIterable(other.type_name().to_string())),
    }
}

/// `len(value)`
pub fn length(value: &Value) -> EvalResult<usize> {
    let len = match value {
        Value::Str(s) => Some(s.chars().count()),
        Value::List(items) => Some(items.len()),
        Value::Map(entries) => Some(entries.len()),
        Value::Record(record) => Some(record.keys().count()),
        Value::Object(object) => object.len(),
        _ => None,
    };
    len.ok_or_else(|| {
        EvalError::type_error(format!("object of type '{}' has no len()", value.type_name()))
    })
}
