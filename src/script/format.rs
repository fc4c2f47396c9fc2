//! `str.format` and printf-style `%` formatting.

use crate::error::RuntimeError;
use crate::sandbox::limits::Budget;
use crate::script::host::CallArgs;
use crate::script::value::{float_to_int, format_float, Value};

type Result<T> = std::result::Result<T, RuntimeError>;

/// `template.format(*args, **kwargs)`.
pub fn str_format(template: &str, args: &CallArgs, budget: &Budget) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut auto_index = 0usize;
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
            '}' => {
                return Err(RuntimeError::value_error(
                    "Single '}' encountered in format string",
                ))
            }
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => field.push(c),
                        None => {
                            return Err(RuntimeError::value_error(
                                "expected '}' before end of string",
                            ))
                        }
                    }
                }
                let (name, spec) = match field.split_once(':') {
                    Some((name, spec)) => (name, spec),
                    None => (field.as_str(), ""),
                };
                let (name, conversion) = match name.split_once('!') {
                    Some((name, conv)) => (name, Some(conv)),
                    None => (name, None),
                };
                let value = if name.is_empty() {
                    let value = args.positional.get(auto_index);
                    auto_index += 1;
                    value.ok_or_else(|| {
                        RuntimeError::index_error(format!(
                            "Replacement index {} out of range for positional args tuple",
                            auto_index - 1
                        ))
                    })?
                } else if let Ok(index) = name.parse::<usize>() {
                    args.positional.get(index).ok_or_else(|| {
                        RuntimeError::index_error(format!(
                            "Replacement index {index} out of range for positional args tuple"
                        ))
                    })?
                } else {
                    args.keyword(name)
                        .ok_or_else(|| RuntimeError::key_error(format!("'{name}'")))?
                };
                let converted;
                let value = match conversion {
                    Some("r") => {
                        converted = Value::from(value.try_repr(budget)?);
                        &converted
                    }
                    Some("s") => {
                        converted = Value::from(value.try_to_str(budget)?);
                        &converted
                    }
                    Some(other) => {
                        return Err(RuntimeError::value_error(format!(
                            "Unknown conversion specifier {other}"
                        )))
                    }
                    None => value,
                };
                out.push_str(&format_value(value, spec, budget)?);
            }
            c => out.push(c),
        }
    }
    Ok(out)
}

/// Parsed `[[fill]align][sign][0][width][,][.precision][type]`.
#[derive(Debug, Default)]
struct FormatSpec {
    fill: Option<char>,
    align: Option<char>,
    sign: Option<char>,
    zero: bool,
    width: usize,
    grouping: bool,
    precision: Option<usize>,
    kind: Option<char>,
}

fn parse_spec(spec: &str) -> Result<FormatSpec> {
    let chars: Vec<char> = spec.chars().collect();
    let mut parsed = FormatSpec::default();
    let mut i = 0;
    let is_align = |c: char| matches!(c, '<' | '>' | '^' | '=');
    if chars.len() >= 2 && is_align(chars[1]) {
        parsed.fill = Some(chars[0]);
        parsed.align = Some(chars[1]);
        i = 2;
    } else if !chars.is_empty() && is_align(chars[0]) {
        parsed.align = Some(chars[0]);
        i = 1;
    }
    if i < chars.len() && matches!(chars[i], '+' | '-' | ' ') {
        parsed.sign = Some(chars[i]);
        i += 1;
    }
    if i < chars.len() && chars[i] == '0' {
        parsed.zero = true;
        i += 1;
    }
    let start = i;
    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }
    if i > start {
        parsed.width = chars[start..i].iter().collect::<String>().parse().unwrap_or(0);
    }
    if i < chars.len() && chars[i] == ',' {
        parsed.grouping = true;
        i += 1;
    }
    if i < chars.len() && chars[i] == '.' {
        i += 1;
        let start = i;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
        if i == start {
            return Err(RuntimeError::value_error("Format specifier missing precision"));
        }
        parsed.precision = chars[start..i].iter().collect::<String>().parse().ok();
    }
    if i < chars.len() {
        parsed.kind = Some(chars[i]);
        i += 1;
    }
    if i != chars.len() {
        return Err(RuntimeError::value_error("Invalid format specifier"));
    }
    Ok(parsed)
}

fn group_thousands(digits: &str) -> String {
    let (int_part, rest) = match digits.find('.') {
        Some(dot) => digits.split_at(dot),
        None => (digits, ""),
    };
    let mut grouped = String::new();
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    grouped.push_str(rest);
    grouped
}

fn format_value(value: &Value, spec: &str, budget: &Budget) -> Result<String> {
    if spec.is_empty() {
        return value.try_to_str(budget);
    }
    let spec = parse_spec(spec)?;
    // Both are padding the script asks for; refuse them before allocating.
    budget.check_str_len(spec.width)?;
    budget.check_str_len(spec.precision.unwrap_or(0))?;
    let numeric = matches!(value, Value::Int(_) | Value::Float(_) | Value::Bool(_));
    let mismatch = || {
        RuntimeError::value_error(format!(
            "Unknown format code '{}' for object of type '{}'",
            spec.kind.unwrap_or('s'),
            value.type_name()
        ))
    };

    let (negative, body) = match (spec.kind, value) {
        (None | Some('s'), v) if !numeric || spec.kind == Some('s') => {
            if spec.kind == Some('s') && numeric {
                return Err(mismatch());
            }
            let mut text = v.try_to_str(budget)?;
            if let Some(p) = spec.precision {
                text = text.chars().take(p).collect();
            }
            (false, text)
        }
        (None | Some('d'), Value::Int(_) | Value::Bool(_)) => {
            let i = value.as_int().unwrap_or(0);
            (i < 0, i.unsigned_abs().to_string())
        }
        (Some('x' | 'X' | 'o' | 'b'), Value::Int(_) | Value::Bool(_)) => {
            let i = value.as_int().unwrap_or(0);
            let abs = i.unsigned_abs();
            let text = match spec.kind {
                Some('x') => format!("{abs:x}"),
                Some('X') => format!("{abs:X}"),
                Some('o') => format!("{abs:o}"),
                _ => format!("{abs:b}"),
            };
            (i < 0, text)
        }
        (None, Value::Float(f)) if spec.precision.is_none() => {
            (f.is_sign_negative() && *f != 0.0, format_float(f.abs()))
        }
        (None | Some('f' | 'F' | 'e' | 'E' | 'g' | 'G' | '%'), v) if numeric => {
            let f = v.as_float().unwrap_or(0.0);
            let precision = spec.precision.unwrap_or(6);
            let abs = f.abs();
            let text = match spec.kind {
                Some('e') => exponent(format!("{abs:.precision$e}")),
                Some('E') => exponent(format!("{abs:.precision$e}")).to_uppercase(),
                Some('%') => format!("{:.precision$}%", abs * 100.0),
                Some('g' | 'G') | None => {
                    let text = format!("{abs:.precision$}");
                    if text.contains('.') {
                        text.trim_end_matches('0').trim_end_matches('.').to_string()
                    } else {
                        text
                    }
                }
                _ => format!("{abs:.precision$}"),
            };
            (f < 0.0, text)
        }
        _ => return Err(mismatch()),
    };

    let body = if spec.grouping { group_thousands(&body) } else { body };
    let sign = match (negative, spec.sign) {
        (true, _) => "-",
        (false, Some('+')) => "+",
        (false, Some(' ')) => " ",
        _ => "",
    };
    let len = sign.chars().count() + body.chars().count();
    let pad = spec.width.saturating_sub(len);
    if pad == 0 {
        return Ok(format!("{sign}{body}"));
    }
    let default_align = if numeric { '>' } else { '<' };
    let (fill, align) = if spec.zero && spec.align.is_none() {
        ('0', '=')
    } else {
        (spec.fill.unwrap_or(' '), spec.align.unwrap_or(default_align))
    };
    let fill_str = |n: usize| fill.to_string().repeat(n);
    Ok(match align {
        '<' => format!("{sign}{body}{}", fill_str(pad)),
        '^' => format!(
            "{}{sign}{body}{}",
            fill_str(pad / 2),
            fill_str(pad - pad / 2)
        ),
        '=' => format!("{sign}{}{body}", fill_str(pad)),
        _ => format!("{}{sign}{body}", fill_str(pad)),
    })
}

/// Rust renders `1.5e3`; Python renders `1.5e+03`.
fn exponent(text: String) -> String {
    match text.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(d) => ('-', d),
                None => ('+', exp),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => text,
    }
}

/// `template % values`.
pub fn percent_format(template: &str, values: &Value, budget: &Budget) -> Result<String> {
    let args: Vec<Value> = match values {
        Value::Tuple(items) => items.to_vec(),
        other => vec![other.clone()],
    };
    let mut next = args.iter();
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut spec = String::new();
        let kind = loop {
            match chars.next() {
                Some(c) if c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | ' ' | '0') => {
                    spec.push(c)
                }
                Some(c) => break c,
                None => return Err(RuntimeError::value_error("incomplete format")),
            }
        };
        if kind == '%' {
            out.push('%');
            continue;
        }
        let value = next.next().ok_or_else(|| {
            RuntimeError::type_error("not enough arguments for format string")
        })?;
        let left_align = spec.starts_with('-');
        let spec = spec.trim_start_matches('-');
        let converted = match kind {
            's' => format_value(&Value::from(value.try_to_str(budget)?), &percent_spec(spec, None), budget)?,
            'r' => format_value(&Value::from(value.try_repr(budget)?), &percent_spec(spec, None), budget)?,
            'd' | 'i' => {
                let int = match value {
                    Value::Float(f) => Value::Int(float_to_int(f.trunc())?),
                    v if v.as_int().is_some() => Value::Int(v.as_int().unwrap_or(0)),
                    v => {
                        return Err(RuntimeError::type_error(format!(
                            "%{kind} format: a real number is required, not {}",
                            v.type_name()
                        )))
                    }
                };
                format_value(&int, &percent_spec(spec, Some('d')), budget)?
            }
            'f' | 'F' | 'e' | 'E' | 'g' | 'G' | 'x' | 'X' | 'o' => {
                let kind = if kind == 'F' { 'f' } else { kind };
                format_value(value, &percent_spec(spec, Some(kind)), budget)?
            }
            other => {
                return Err(RuntimeError::value_error(format!(
                    "unsupported format character '{other}'"
                )))
            }
        };
        if left_align {
            let width: usize = spec
                .trim_start_matches('0')
                .split('.')
                .next()
                .and_then(|w| w.parse().ok())
                .unwrap_or(0);
            let trimmed = converted.trim_start();
            out.push_str(&format!("{trimmed:<width$}"));
        } else {
            out.push_str(&converted);
        }
    }
    if next.next().is_some() {
        return Err(RuntimeError::type_error(
            "not all arguments converted during string formatting",
        ));
    }
    Ok(out)
}

fn percent_spec(spec: &str, kind: Option<char>) -> String {
    let mut out = String::new();
    let width_prec = spec.trim_start_matches(['+', ' ']);
    if let Some(sign) = spec.chars().next().filter(|c| matches!(c, '+' | ' ')) {
        out.push(sign);
    }
    if kind.is_none() && !width_prec.is_empty() {
        out.push('>');
    }
    out.push_str(width_prec);
    if let Some(kind) = kind {
        out.push(kind);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::sandbox::config::SandboxConfig;
    use crate::sandbox::limits::{CancelToken, ExecutionLimits};

    fn args(values: Vec<Value>) -> CallArgs {
        CallArgs::new(values)
    }

    fn budget() -> Budget {
        let config = SandboxConfig::builder().max_string_len(4096).build();
        Budget::new(ExecutionLimits::from(&config), CancelToken::new())
    }

    fn fmt(template: &str, a: &CallArgs) -> Result<String> {
        str_format(template, a, &budget())
    }

    fn percent(template: &str, values: &Value) -> Result<String> {
        percent_format(template, values, &budget())
    }

    #[test]
    fn test_positional_and_named_fields() {
        let a = args(vec![Value::from("vm-1"), Value::Int(3)])
            .with_keyword("state", Value::from("RUNNING"));
        assert_eq!(
            fmt("{} has {} disks ({state})", &a).unwrap(),
            "vm-1 has 3 disks (RUNNING)"
        );
        assert_eq!(fmt("{1}-{0}", &a).unwrap(), "3-vm-1");
        assert_eq!(fmt("{{literal}}", &a).unwrap(), "{literal}");
    }

    #[test]
    fn test_format_specs() {
        let a = args(vec![Value::Float(3.14159), Value::Int(1234567), Value::from("ab")]);
        assert_eq!(fmt("{0:.2f}", &a).unwrap(), "3.14");
        assert_eq!(fmt("{1:,}", &a).unwrap(), "1,234,567");
        assert_eq!(fmt("{2:>4}|{2:<4}|{2:^6}", &a).unwrap(), "  ab|ab  |  ab  ");
        assert_eq!(fmt("{1:08d}", &args(vec![Value::Int(-42)])).unwrap(), "-0000042");
        assert_eq!(fmt("{0!r}", &args(vec![Value::from("x")])).unwrap(), "'x'");
    }

    #[test]
    fn test_missing_argument() {
        let err = fmt("{} {}", &args(vec![Value::Int(1)])).unwrap_err();
        assert_eq!(err.kind(), Some("IndexError"));
        let err = fmt("{name}", &args(vec![])).unwrap_err();
        assert_eq!(err.kind(), Some("KeyError"));
    }

    #[test]
    fn test_percent_format() {
        let values = Value::tuple(vec![Value::from("disk"), Value::Int(5), Value::Float(2.5)]);
        assert_eq!(
            percent("%s: %d (%.1f GB) 100%%", &values).unwrap(),
            "disk: 5 (2.5 GB) 100%"
        );
        assert_eq!(percent("%5d|", &Value::Int(42)).unwrap(), "   42|");
        assert_eq!(percent("%-5s|", &Value::from("ab")).unwrap(), "ab   |");
        let err = percent("%s %s", &Value::from("x")).unwrap_err();
        assert_eq!(err.to_string(), "not enough arguments for format string");
        let err = percent("%d", &Value::Float(1e300)).unwrap_err();
        assert_eq!(err.kind(), Some("OverflowError"));
    }

    #[test]
    fn test_padding_respects_string_limit() {
        let a = args(vec![Value::Int(1), Value::Float(1.5)]);
        assert_eq!(fmt("{0:>6}|{1:.3f}", &a).unwrap(), "     1|1.500");
        for template in ["{0:99999999999}", "{0:>9223372036854775807}", "{1:.100000f}"] {
            let err = fmt(template, &a).unwrap_err();
            assert!(matches!(err, RuntimeError::LimitExceeded(_)), "{template}");
        }
        assert!(matches!(
            percent("%99999999s", &Value::from("x")).unwrap_err(),
            RuntimeError::LimitExceeded(_)
        ));
    }
}
