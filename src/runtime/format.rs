//! String formatting: `fmt % args` and `fmt.format(...)`

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::errors::{EvalError, EvalResult};
use super::ops;
use super::value::{Args, Value, python_exponent};

static PERCENT_SPEC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"%(?:\((?P<key>[^)]*)\))?(?P<flags>[-+ 0#]*)",
        r"(?P<width>\d+)?(?:\.(?P<precision>\d+))?(?P<conv>[diouxXeEfFgGcrs%])",
    ))
    .expect("valid percent format pattern")
});

static FORMAT_SPEC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"^(?:(?P<fill>.)?(?P<align>[<>^]))?(?P<zero>0)?",
        r"(?P<width>\d+)?(?:\.(?P<precision>\d+))?(?P<conv>[sdfFxXeEgG%])?$",
    ))
    .expect("valid format spec pattern")
});

/// Largest width or precision a conversion may request
pub const FIELD_LIMIT: usize = 10_000;

/// Read the `width` or `precision` group of a conversion
fn field_size(caps: &Captures<'_>, name: &str) -> EvalResult<Option<usize>> {
    let Some(field) = caps.name(name) else {
        return Ok(None);
    };
    match field.as_str().parse::<usize>() {
        Ok(size) if size <= FIELD_LIMIT => Ok(Some(size)),
        _ => Err(EvalError::value(format!("{name} too big"))),
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Flags {
    left: bool,
    zero: bool,
    plus: bool,
    space: bool,
    alternate: bool,
}

impl Flags {
    fn parse(flags: &str) -> Self {
        Self {
            left: flags.contains('-'),
            zero: flags.contains('0'),
            plus: flags.contains('+'),
            space: flags.contains(' '),
            alternate: flags.contains('#'),
        }
    }
}

/// A formatted number split so padding can go between sign and digits
struct Number {
    negative: bool,
    prefix: &'static str,
    digits: String,
}

fn integer_of(value: &Value, conv: char) -> EvalResult<i64> {
    match value {
        Value::Float(f) => Ok(f.trunc() as i64),
        other => other.as_int().ok_or_else(|| {
            EvalError::type_error(format!(
                "%{conv} format: a number is required, not {}",
                other.type_name()
            ))
        }),
    }
}

fn float_of(value: &Value, conv: char) -> EvalResult<f64> {
    value.as_float().ok_or_else(|| {
        EvalError::type_error(format!(
            "%{conv} format: a real number is required, not {}",
            value.type_name()
        ))
    })
}

fn strip_fraction_zeros(text: &str) -> String {
    match text.split_once(['e', 'E']) {
        Some((mantissa, exponent)) => {
            let marker = if text.contains('E') { 'E' } else { 'e' };
            let mantissa = strip_fraction_zeros(mantissa);
            format!("{mantissa}{marker}{exponent}")
        }
        None if text.contains('.') => text.trim_end_matches('0').trim_end_matches('.').to_string(),
        None => text.to_string(),
    }
}

fn format_exponent(f: f64, precision: usize, upper: bool) -> String {
    let text = python_exponent(&format!("{:.*e}", precision, f));
    if upper { text.to_uppercase() } else { text }
}

fn format_general(f: f64, precision: usize, upper: bool, alternate: bool) -> String {
    if !f.is_finite() {
        return format_special(f, upper);
    }
    let precision = precision.max(1);
    let exponent = if f == 0.0 {
        0
    } else {
        f.abs().log10().floor() as i64
    };
    let text = if exponent < -4 || exponent >= precision as i64 {
        format_exponent(f, precision - 1, upper)
    } else {
        let decimals = (precision as i64 - 1 - exponent).max(0) as usize;
        format!("{:.*}", decimals, f)
    };
    if alternate { text } else { strip_fraction_zeros(&text) }
}

fn format_special(f: f64, upper: bool) -> String {
    let text = if f.is_nan() {
        "nan"
    } else if f > 0.0 {
        "inf"
    } else {
        "-inf"
    };
    if upper { text.to_uppercase() } else { text.to_string() }
}

fn float_number(f: f64, conv: char, precision: Option<usize>, alternate: bool) -> Number {
    let precision = precision.unwrap_or(6);
    let upper = conv.is_ascii_uppercase();
    let magnitude = f.abs();
    let digits = match conv.to_ascii_lowercase() {
        _ if !f.is_finite() => format_special(magnitude, upper),
        'e' => format_exponent(magnitude, precision, upper),
        'g' => format_general(magnitude, precision, upper, alternate),
        _ => format!("{:.*}", precision, magnitude),
    };
    Number {
        negative: f.is_sign_negative() && !f.is_nan() && f != 0.0,
        prefix: "",
        digits,
    }
}

fn integer_number(i: i64, conv: char, alternate: bool) -> Number {
    let magnitude = i.unsigned_abs();
    let (prefix, digits) = match conv {
        'o' => ("0o", format!("{magnitude:o}")),
        'x' => ("0x", format!("{magnitude:x}")),
        'X' => ("0X", format!("{magnitude:X}")),
        _ => ("", magnitude.to_string()),
    };
    Number {
        negative: i < 0,
        prefix: if alternate { prefix } else { "" },
        digits,
    }
}

fn pad_number(number: Number, flags: Flags, width: usize) -> String {
    let sign = if number.negative {
        "-"
    } else if flags.plus {
        "+"
    } else if flags.space {
        " "
    } else {
        ""
    };
    let len = sign.len() + number.prefix.len() + number.digits.chars().count();
    if width <= len {
        return format!("{sign}{}{}", number.prefix, number.digits);
    }
    let fill = width - len;
    if flags.left {
        format!("{sign}{}{}{}", number.prefix, number.digits, " ".repeat(fill))
    } else if flags.zero {
        format!("{sign}{}{}{}", number.prefix, "0".repeat(fill), number.digits)
    } else {
        format!("{}{sign}{}{}", " ".repeat(fill), number.prefix, number.digits)
    }
}

fn pad_text(text: String, left: bool, width: usize) -> String {
    let len = text.chars().count();
    if width <= len {
        return text;
    }
    let fill = " ".repeat(width - len);
    if left { text + &fill } else { fill + &text }
}

fn convert(
    value: &Value,
    conv: char,
    flags: Flags,
    width: usize,
    precision: Option<usize>,
) -> EvalResult<String> {
    Ok(match conv {
        's' | 'r' => {
            let text = if conv == 's' { value.to_text() } else { value.repr() };
            let text = match precision {
                Some(p) => text.chars().take(p).collect(),
                None => text,
            };
            pad_text(text, flags.left, width)
        }
        'c' => {
            let text = match value {
                Value::Str(s) if s.chars().count() == 1 => s.to_string(),
                other => {
                    let code = integer_of(other, conv)?;
                    u32::try_from(code)
                        .ok()
                        .and_then(char::from_u32)
                        .ok_or_else(|| EvalError::value("%c arg not in range"))?
                        .to_string()
                }
            };
            pad_text(text, flags.left, width)
        }
        'd' | 'i' | 'u' | 'o' | 'x' | 'X' => {
            let conv = if matches!(conv, 'i' | 'u') { 'd' } else { conv };
            let number = integer_number(integer_of(value, conv)?, conv, flags.alternate);
            pad_number(number, flags, width)
        }
        _ => pad_number(
            float_number(float_of(value, conv)?, conv, precision, flags.alternate),
            flags,
            width,
        ),
    })
}

/// Printf-style formatting, `fmt % args`.
///
/// A list operand supplies one value per conversion; a dict operand serves
/// `%(name)s` lookups; any other operand is a single value.
pub fn percent_format(fmt: &str, args: &Value) -> EvalResult<String> {
    let positional: Vec<Value> = match args {
        Value::List(items) => items.as_ref().clone(),
        other => vec![other.clone()],
    };
    let mut next = 0usize;
    let mut uses_key = false;
    let mut out = String::with_capacity(fmt.len());
    let mut last = 0usize;

    for caps in PERCENT_SPEC.captures_iter(fmt) {
        let Some(whole) = caps.get(0) else { continue };
        let literal = &fmt[last..whole.start()];
        if literal.contains('%') {
            return Err(EvalError::value("unsupported format character"));
        }
        out.push_str(literal);
        last = whole.end();

        let conv = caps
            .name("conv")
            .and_then(|m| m.as_str().chars().next())
            .unwrap_or('s');
        if conv == '%' {
            out.push('%');
            continue;
        }
        let flags = Flags::parse(caps.name("flags").map_or("", |m| m.as_str()));
        let width = field_size(&caps, "width")?.unwrap_or(0);
        let precision = field_size(&caps, "precision")?;

        let value = match caps.name("key") {
            Some(key) => {
                uses_key = true;
                let Value::Map(entries) = args else {
                    return Err(EvalError::type_error("format requires a mapping"));
                };
                entries
                    .get(key.as_str())
                    .cloned()
                    .ok_or_else(|| EvalError::KeyNotFound(format!("'{}'", key.as_str())))?
            }
            None => {
                let value = positional.get(next).cloned().ok_or_else(|| {
                    EvalError::type_error("not enough arguments for format string")
                })?;
                next += 1;
                value
            }
        };
        out.push_str(&convert(&value, conv, flags, width, precision)?);
    }

    let tail = &fmt[last..];
    if tail.contains('%') {
        return Err(EvalError::value("incomplete format"));
    }
    out.push_str(tail);

    if !uses_key && next < positional.len() && !matches!(args, Value::Map(_)) {
        return Err(EvalError::type_error(
            "not all arguments converted during string formatting",
        ));
    }
    Ok(out)
}

fn apply_spec(value: &Value, spec: &str) -> EvalResult<String> {
    if spec.is_empty() {
        return Ok(value.to_text());
    }
    let caps = FORMAT_SPEC
        .captures(spec)
        .ok_or_else(|| EvalError::value(format!("invalid format specifier '{spec}'")))?;
    let width = field_size(&caps, "width")?.unwrap_or(0);
    let precision = field_size(&caps, "precision")?;
    let conv = caps.name("conv").and_then(|m| m.as_str().chars().next());
    let zero = caps.name("zero").is_some();

    let numeric = matches!(value, Value::Int(_) | Value::Float(_));
    let truncated = |text: String| match precision {
        Some(p) => text.chars().take(p).collect(),
        None => text,
    };

    let text = match conv {
        Some('%') => {
            let number = float_number(float_of(value, '%')? * 100.0, 'f', precision, false);
            pad_number(number, Flags::default(), 0) + "%"
        }
        Some('s') => truncated(value.to_text()),
        None if !numeric => truncated(value.to_text()),
        None => match (value, precision) {
            (Value::Float(f), Some(p)) => {
                pad_number(float_number(*f, 'g', Some(p), false), Flags::default(), 0)
            }
            _ => value.to_text(),
        },
        Some(conv) => {
            let number = if matches!(conv, 'd' | 'x' | 'X') {
                integer_number(value.expect_int("format argument")?, conv, false)
            } else {
                float_number(float_of(value, conv)?, conv, precision, false)
            };
            if zero && caps.name("align").is_none() {
                let flags = Flags {
                    zero,
                    ..Flags::default()
                };
                return Ok(pad_number(number, flags, width));
            }
            pad_number(number, Flags::default(), 0)
        }
    };

    let len = text.chars().count();
    if width <= len {
        return Ok(text);
    }
    let fill = caps
        .name("fill")
        .and_then(|m| m.as_str().chars().next())
        .unwrap_or(' ');
    let align = caps
        .name("align")
        .map(|m| m.as_str())
        .unwrap_or(if numeric { ">" } else { "<" });
    let padding = width - len;
    let pad = |n: usize| fill.to_string().repeat(n);
    Ok(match align {
        ">" => pad(padding) + &text,
        "^" => pad(padding / 2) + &text + &pad(padding - padding / 2),
        _ => text + &pad(padding),
    })
}

/// `str.format`: `{}` and `{0}` take positional arguments, `{name}`
/// keyword arguments, `{{` and `}}` are literal braces. A field may carry
/// a `:spec` with fill, alignment, width, precision and type.
pub fn str_format(fmt: &str, args: &Args) -> EvalResult<String> {
    let mut out = String::with_capacity(fmt.len());
    let mut chars = fmt.chars().peekable();
    let mut auto = 0usize;

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => return Err(EvalError::value("single '}' encountered in format string")),
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => field.push(c),
                        None => return Err(EvalError::value("expected '}' before end of string")),
                    }
                }
                let (name, spec) = field.split_once(':').unwrap_or((field.as_str(), ""));
                let (path, attrs) = match name.split_once('.') {
                    Some((head, rest)) => (head, Some(rest)),
                    None => (name, None),
                };
                let mut value = if path.is_empty() {
                    let value = args.get(auto).cloned();
                    auto += 1;
                    value.ok_or_else(|| EvalError::IndexOutOfRange("format argument".to_string()))?
                } else if let Ok(index) = path.parse::<usize>() {
                    args.get(index)
                        .cloned()
                        .ok_or_else(|| EvalError::IndexOutOfRange("format argument".to_string()))?
                } else {
                    args.named
                        .get(path)
                        .cloned()
                        .ok_or_else(|| EvalError::KeyNotFound(format!("'{path}'")))?
                };
                for attr in attrs.into_iter().flat_map(|a| a.split('.')) {
                    value = ops::get_attr(&value, attr)?;
                }
                out.push_str(&apply_spec(&value, spec)?);
            }
            c => out.push(c),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn list(values: Vec<Value>) -> Value {
        Value::list(values)
    }

    #[test]
    fn test_percent_basic_conversions() {
        assert_eq!(percent_format("%s-%d", &list(vec!["a".into(), Value::Int(3)])).unwrap(), "a-3");
        assert_eq!(percent_format("%r", &Value::from("x")).unwrap(), "'x'");
        assert_eq!(percent_format("100%%", &list(Vec::new())).unwrap(), "100%");
        assert_eq!(percent_format("%.2f", &Value::Float(3.14159)).unwrap(), "3.14");
        let numbers = list(vec![Value::Int(255), Value::Int(255), Value::Int(8)]);
        assert_eq!(percent_format("%x %X %o", &numbers).unwrap(), "ff FF 10");
        assert_eq!(percent_format("%c", &Value::Int(65)).unwrap(), "A");
    }

    #[test]
    fn test_percent_width_and_flags() {
        assert_eq!(percent_format("%5d|", &Value::Int(42)).unwrap(), "   42|");
        assert_eq!(percent_format("%-5d|", &Value::Int(42)).unwrap(), "42   |");
        assert_eq!(percent_format("%05d", &Value::Int(-42)).unwrap(), "-0042");
        assert_eq!(percent_format("%+d", &Value::Int(7)).unwrap(), "+7");
        assert_eq!(percent_format("%#06x", &Value::Int(255)).unwrap(), "0x00ff");
        assert_eq!(percent_format("%.3s", &Value::from("abcdef")).unwrap(), "abc");
    }

    #[test]
    fn test_oversized_fields_are_errors() {
        assert!(matches!(
            percent_format("%.99999999999f", &Value::Float(1.0)),
            Err(EvalError::Value(_))
        ));
        assert!(percent_format("%99999999999d", &Value::Int(1)).is_err());
        let args = Args::new(vec![Value::Int(1)]);
        assert!(matches!(str_format("{:>99999999999}", &args), Err(EvalError::Value(_))));
        assert!(str_format("{:.20000f}", &args).is_err());
        assert_eq!(str_format("{:>3}", &args).unwrap(), "  1");
        assert_eq!(percent_format("%.2f", &Value::Float(1.0)).unwrap(), "1.00");
    }

    #[test]
    fn test_percent_float_styles() {
        assert_eq!(percent_format("%e", &Value::Float(1500.0)).unwrap(), "1.500000e+03");
        assert_eq!(percent_format("%g", &Value::Float(0.0001)).unwrap(), "0.0001");
        assert_eq!(percent_format("%g", &Value::Float(1e-5)).unwrap(), "1e-05");
        assert_eq!(percent_format("%g", &Value::Float(2.5)).unwrap(), "2.5");
        assert_eq!(percent_format("%g", &Value::Float(1234567.0)).unwrap(), "1.23457e+06");
    }

    #[test]
    fn test_percent_named_keys() {
        let mut entries = IndexMap::new();
        entries.insert("name".to_string(), Value::from("web"));
        entries.insert("n".to_string(), Value::Int(2));
        let args = Value::map(entries);
        assert_eq!(percent_format("%(name)s has %(n)d", &args).unwrap(), "web has 2");
        assert!(percent_format("%(missing)s", &args).is_err());
    }

    #[test]
    fn test_percent_argument_count_errors() {
        assert!(percent_format("%s %s", &Value::from("a")).is_err());
        assert!(percent_format("%s", &list(vec![Value::Int(1), Value::Int(2)])).is_err());
        assert!(percent_format("%d", &Value::from("a")).is_err());
        assert!(percent_format("50% off", &list(Vec::new())).is_err());
    }

    #[test]
    fn test_str_format() {
        let mut args = Args::new(vec![Value::from("a"), Value::Int(5)]);
        args.named.insert("who".to_string(), Value::from("me"));
        assert_eq!(str_format("{} {} {who}", &args).unwrap(), "a 5 me");
        assert_eq!(str_format("{1}{0} {{x}}", &args).unwrap(), "5a {x}");
        assert_eq!(str_format("[{0:>3}|{1:03d}]", &args).unwrap(), "[  a|005]");
        assert_eq!(str_format("{:.2f}", &Args::new(vec![Value::Float(2.0)])).unwrap(), "2.00");
        assert_eq!(str_format("{:^5}", &Args::new(vec![Value::from("x")])).unwrap(), "  x  ");
        assert!(str_format("{2}", &args).is_err());
        assert!(str_format("{", &args).is_err());
    }
}
