//! The reduced built-ins table.
//!
//! Scripts see exactly these names and nothing else: no `open`, `eval`,
//! `exec`, `compile`, `globals`, `type` or `object`. The table can be narrowed
//! further through the sandbox configuration, never extended.

use std::cmp::Ordering;

use crate::error::RuntimeError;
use crate::script::host::CallArgs;
use crate::script::interpreter::Interpreter;
use crate::script::ops;
use crate::script::value::{float_to_int, Dict, Range, Value};

type Result<T> = std::result::Result<T, RuntimeError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Builtin {
    Dict,
    List,
    Tuple,
    Set,
    Str,
    Int,
    Float,
    Bool,
    Len,
    Max,
    Min,
    Sorted,
    Filter,
    Map,
    Sum,
    Any,
    All,
    Hasattr,
    Getattr,
    Isinstance,
    Print,
    Range,
    Enumerate,
    Zip,
    Abs,
    Round,
    Reversed,
    Import,
}

impl Builtin {
    pub const ALL: [Builtin; 28] = [
        Builtin::Dict,
        Builtin::List,
        Builtin::Tuple,
        Builtin::Set,
        Builtin::Str,
        Builtin::Int,
        Builtin::Float,
        Builtin::Bool,
        Builtin::Len,
        Builtin::Max,
        Builtin::Min,
        Builtin::Sorted,
        Builtin::Filter,
        Builtin::Map,
        Builtin::Sum,
        Builtin::Any,
        Builtin::All,
        Builtin::Hasattr,
        Builtin::Getattr,
        Builtin::Isinstance,
        Builtin::Print,
        Builtin::Range,
        Builtin::Enumerate,
        Builtin::Zip,
        Builtin::Abs,
        Builtin::Round,
        Builtin::Reversed,
        Builtin::Import,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Dict => "dict",
            Builtin::List => "list",
            Builtin::Tuple => "tuple",
            Builtin::Set => "set",
            Builtin::Str => "str",
            Builtin::Int => "int",
            Builtin::Float => "float",
            Builtin::Bool => "bool",
            Builtin::Len => "len",
            Builtin::Max => "max",
            Builtin::Min => "min",
            Builtin::Sorted => "sorted",
            Builtin::Filter => "filter",
            Builtin::Map => "map",
            Builtin::Sum => "sum",
            Builtin::Any => "any",
            Builtin::All => "all",
            Builtin::Hasattr => "hasattr",
            Builtin::Getattr => "getattr",
            Builtin::Isinstance => "isinstance",
            Builtin::Print => "print",
            Builtin::Range => "range",
            Builtin::Enumerate => "enumerate",
            Builtin::Zip => "zip",
            Builtin::Abs => "abs",
            Builtin::Round => "round",
            Builtin::Reversed => "reversed",
            Builtin::Import => "__import__",
        }
    }

    pub fn from_name(name: &str) -> Option<Builtin> {
        Builtin::ALL.into_iter().find(|b| b.name() == name)
    }

    /// Whether `value` is an instance of this builtin used as a type.
    fn is_instance(self, value: &Value) -> Option<bool> {
        Some(match self {
            Builtin::Dict => matches!(value, Value::Dict(_)),
            Builtin::List => matches!(value, Value::List(_)),
            Builtin::Tuple => matches!(value, Value::Tuple(_)),
            Builtin::Set => matches!(value, Value::Set(_)),
            Builtin::Str => matches!(value, Value::Str(_)),
            Builtin::Int => matches!(value, Value::Int(_) | Value::Bool(_)),
            Builtin::Float => matches!(value, Value::Float(_)),
            Builtin::Bool => matches!(value, Value::Bool(_)),
            Builtin::Range => matches!(value, Value::Range(_)),
            _ => return None,
        })
    }
}

/// The built-in names installed into every namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltinTable {
    enabled: Vec<Builtin>,
}

impl Default for BuiltinTable {
    fn default() -> Self {
        Self::full()
    }
}

impl BuiltinTable {
    pub fn full() -> Self {
        Self {
            enabled: Builtin::ALL.to_vec(),
        }
    }

    /// Restrict the table to `names`. Unknown names are rejected.
    pub fn only<S: AsRef<str>>(names: &[S]) -> std::result::Result<Self, String> {
        let mut enabled = Vec::new();
        for name in names {
            let name = name.as_ref();
            let builtin =
                Builtin::from_name(name).ok_or_else(|| format!("unknown builtin '{name}'"))?;
            if !enabled.contains(&builtin) {
                enabled.push(builtin);
            }
        }
        enabled.sort();
        Ok(Self { enabled })
    }

    pub fn contains(&self, builtin: Builtin) -> bool {
        self.enabled.contains(&builtin)
    }

    pub fn iter(&self) -> impl Iterator<Item = Builtin> + '_ {
        self.enabled.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.enabled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.enabled.is_empty()
    }
}

fn arity(name: &str, args: &CallArgs, min: usize, max: usize) -> Result<()> {
    let given = args.positional.len();
    if given >= min && given <= max {
        return Ok(());
    }
    let plural = |n: usize| if n == 1 { "" } else { "s" };
    let message = match (min, max) {
        (1, 1) => format!("{name}() takes exactly one argument ({given} given)"),
        (min, max) if min == max => {
            format!("{name}() takes exactly {min} arguments ({given} given)")
        }
        (min, _) if given < min => {
            format!("{name} expected at least {min} argument{}, got {given}", plural(min))
        }
        (_, max) => format!("{name} expected at most {max} argument{}, got {given}", plural(max)),
    };
    Err(RuntimeError::type_error(message))
}

fn no_keywords(name: &str, args: &CallArgs) -> Result<()> {
    if args.keywords.is_empty() {
        Ok(())
    } else {
        Err(RuntimeError::type_error(format!(
            "{name}() takes no keyword arguments"
        )))
    }
}

/// Invoke a builtin.
pub fn call(interp: &mut Interpreter<'_>, builtin: Builtin, args: CallArgs) -> Result<Value> {
    let name = builtin.name();
    match builtin {
        Builtin::Print => {
            args.check_keywords(name, &["sep", "end"])?;
            let sep = match args.keyword("sep") {
                Some(Value::None) | None => " ".to_string(),
                Some(v) => v.try_to_str(interp.budget())?,
            };
            let end = match args.keyword("end") {
                Some(Value::None) | None => "\n".to_string(),
                Some(v) => v.try_to_str(interp.budget())?,
            };
            let mut line = String::new();
            for (i, value) in args.positional.iter().enumerate() {
                if i > 0 {
                    line.push_str(&sep);
                }
                line.push_str(&value.try_to_str(interp.budget())?);
            }
            line.push_str(&end);
            interp.print(&line);
            Ok(Value::None)
        }
        Builtin::Len => {
            no_keywords(name, &args)?;
            arity(name, &args, 1, 1)?;
            let len = ops::len(&args.positional[0])?;
            i64::try_from(len).map(Value::Int).map_err(|_| {
                RuntimeError::raise(
                    "OverflowError",
                    "Python int too large to convert to C ssize_t",
                )
            })
        }
        Builtin::Str => {
            no_keywords(name, &args)?;
            arity(name, &args, 0, 1)?;
            match args.positional.first() {
                Some(value) => Ok(Value::from(value.try_to_str(interp.budget())?)),
                None => Ok(Value::from("")),
            }
        }
        Builtin::Bool => {
            no_keywords(name, &args)?;
            arity(name, &args, 0, 1)?;
            Ok(Value::Bool(args.positional.first().is_some_and(Value::truthy)))
        }
        Builtin::Int => to_int(&args),
        Builtin::Float => {
            no_keywords(name, &args)?;
            arity(name, &args, 0, 1)?;
            to_float(args.positional.first())
        }
        Builtin::List => {
            no_keywords(name, &args)?;
            arity(name, &args, 0, 1)?;
            Ok(Value::list(match args.positional.first() {
                Some(source) => ops::collect(source, interp.budget())?,
                None => Vec::new(),
            }))
        }
        Builtin::Tuple => {
            no_keywords(name, &args)?;
            arity(name, &args, 0, 1)?;
            Ok(Value::tuple(match args.positional.first() {
                Some(source) => ops::collect(source, interp.budget())?,
                None => Vec::new(),
            }))
        }
        Builtin::Set => {
            no_keywords(name, &args)?;
            arity(name, &args, 0, 1)?;
            let mut set = Dict::new();
            if let Some(source) = args.positional.first() {
                for item in ops::collect(source, interp.budget())? {
                    set.insert(item, Value::None)?;
                }
            }
            Ok(Value::set(set))
        }
        Builtin::Dict => {
            arity(name, &args, 0, 1)?;
            let mut dict = Dict::new();
            if let Some(source) = args.positional.first() {
                for (k, v) in interp.mapping_pairs(source)? {
                    dict.insert(k, v)?;
                }
            }
            for (k, v) in &args.keywords {
                dict.insert(Value::from(k.as_str()), v.clone())?;
            }
            interp.budget().check_len(dict.len())?;
            Ok(Value::dict(dict))
        }
        Builtin::Range => {
            no_keywords(name, &args)?;
            arity(name, &args, 1, 3)?;
            let mut bounds = Vec::with_capacity(3);
            for value in &args.positional {
                bounds.push(value.as_int().ok_or_else(|| {
                    RuntimeError::type_error(format!(
                        "'{}' object cannot be interpreted as an integer",
                        value.type_name()
                    ))
                })?);
            }
            let range = match bounds[..] {
                [stop] => Range { start: 0, stop, step: 1 },
                [start, stop] => Range { start, stop, step: 1 },
                [start, stop, step] => {
                    if step == 0 {
                        return Err(RuntimeError::value_error("range() arg 3 must not be zero"));
                    }
                    Range { start, stop, step }
                }
                _ => return Err(RuntimeError::type_error("range expected at most 3 arguments")),
            };
            Ok(Value::Range(range))
        }
        Builtin::Sorted => {
            arity(name, &args, 1, 1)?;
            args.check_keywords(name, &["key", "reverse"])?;
            let items = ops::collect(&args.positional[0], interp.budget())?;
            let sorted = interp.sort_values(
                items,
                args.keyword("key"),
                args.keyword("reverse").is_some_and(Value::truthy),
            )?;
            Ok(Value::list(sorted))
        }
        Builtin::Reversed => {
            no_keywords(name, &args)?;
            arity(name, &args, 1, 1)?;
            let mut items = match &args.positional[0] {
                Value::Dict(_) | Value::Set(_) => {
                    return Err(RuntimeError::type_error(format!(
                        "'{}' object is not reversible",
                        args.positional[0].type_name()
                    )))
                }
                source => ops::collect(source, interp.budget())?,
            };
            items.reverse();
            Ok(Value::list(items))
        }
        Builtin::Max | Builtin::Min => extreme(interp, builtin, &args),
        Builtin::Sum => {
            arity(name, &args, 1, 2)?;
            args.check_keywords(name, &["start"])?;
            let mut total = args.get(1, "start").cloned().unwrap_or(Value::Int(0));
            if total.as_str().is_some() {
                return Err(RuntimeError::type_error(
                    "sum() can't sum strings [use ''.join(seq) instead]",
                ));
            }
            for item in ops::iterate(&args.positional[0])? {
                interp.tick()?;
                total = ops::binary_op(
                    crate::script::ast::BinOp::Add,
                    &total,
                    &item,
                    interp.budget(),
                )?;
            }
            Ok(total)
        }
        Builtin::Any | Builtin::All => {
            no_keywords(name, &args)?;
            arity(name, &args, 1, 1)?;
            let want = builtin == Builtin::Any;
            for item in ops::iterate(&args.positional[0])? {
                interp.tick()?;
                if item.truthy() == want {
                    return Ok(Value::Bool(want));
                }
            }
            Ok(Value::Bool(!want))
        }
        Builtin::Filter => {
            no_keywords(name, &args)?;
            arity(name, &args, 2, 2)?;
            let predicate = &args.positional[0];
            let mut kept = Vec::new();
            for item in ops::iterate(&args.positional[1])? {
                interp.tick()?;
                let keep = if predicate.is_none() {
                    item.truthy()
                } else {
                    interp.call_value(predicate, CallArgs::new(vec![item.clone()]))?.truthy()
                };
                if keep {
                    interp.budget().check_len(kept.len() + 1)?;
                    kept.push(item);
                }
            }
            Ok(Value::list(kept))
        }
        Builtin::Map => {
            no_keywords(name, &args)?;
            if args.positional.len() < 2 {
                return Err(RuntimeError::type_error(
                    "map() must have at least two arguments.",
                ));
            }
            let func = &args.positional[0];
            let columns = args.positional[1..]
                .iter()
                .map(|source| ops::collect(source, interp.budget()))
                .collect::<Result<Vec<_>>>()?;
            let rows = columns.iter().map(Vec::len).min().unwrap_or(0);
            let mut mapped = Vec::with_capacity(rows);
            for row in 0..rows {
                interp.tick()?;
                let call_args = columns.iter().map(|column| column[row].clone()).collect();
                mapped.push(interp.call_value(func, CallArgs::new(call_args))?);
            }
            Ok(Value::list(mapped))
        }
        Builtin::Zip => {
            no_keywords(name, &args)?;
            let columns = args
                .positional
                .iter()
                .map(|source| ops::collect(source, interp.budget()))
                .collect::<Result<Vec<_>>>()?;
            let rows = columns.iter().map(Vec::len).min().unwrap_or(0);
            Ok(Value::list(
                (0..rows)
                    .map(|row| Value::tuple(columns.iter().map(|c| c[row].clone()).collect()))
                    .collect(),
            ))
        }
        Builtin::Enumerate => {
            arity(name, &args, 1, 2)?;
            args.check_keywords(name, &["start"])?;
            let start = match args.get(1, "start") {
                Some(v) => v.as_int().ok_or_else(|| {
                    RuntimeError::type_error(format!(
                        "'{}' object cannot be interpreted as an integer",
                        v.type_name()
                    ))
                })?,
                None => 0,
            };
            let items = ops::collect(&args.positional[0], interp.budget())?;
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.into_iter().enumerate() {
                let index = start.checked_add(i as i64).ok_or_else(RuntimeError::overflow)?;
                out.push(Value::tuple(vec![Value::Int(index), item]));
            }
            Ok(Value::list(out))
        }
        Builtin::Abs => {
            no_keywords(name, &args)?;
            arity(name, &args, 1, 1)?;
            match &args.positional[0] {
                Value::Float(f) => Ok(Value::Float(f.abs())),
                v => match v.as_int() {
                    Some(i) => i.checked_abs().map(Value::Int).ok_or_else(RuntimeError::overflow),
                    None => Err(RuntimeError::type_error(format!(
                        "bad operand type for abs(): '{}'",
                        v.type_name()
                    ))),
                },
            }
        }
        Builtin::Round => {
            arity(name, &args, 1, 2)?;
            args.check_keywords(name, &["ndigits"])?;
            round(&args.positional[0], args.get(1, "ndigits"))
        }
        Builtin::Hasattr => {
            no_keywords(name, &args)?;
            arity(name, &args, 2, 2)?;
            let attr = attr_name(name, &args.positional[1])?;
            match ops::get_attr(&args.positional[0], attr) {
                Ok(_) => Ok(Value::Bool(true)),
                Err(err) if err.kind() == Some("AttributeError") => Ok(Value::Bool(false)),
                Err(err) => Err(err),
            }
        }
        Builtin::Getattr => {
            no_keywords(name, &args)?;
            arity(name, &args, 2, 3)?;
            let attr = attr_name(name, &args.positional[1])?;
            match (ops::get_attr(&args.positional[0], attr), args.positional.get(2)) {
                (Ok(value), _) => Ok(value),
                (Err(err), Some(default)) if err.kind() == Some("AttributeError") => {
                    Ok(default.clone())
                }
                (Err(err), _) => Err(err),
            }
        }
        Builtin::Isinstance => {
            no_keywords(name, &args)?;
            arity(name, &args, 2, 2)?;
            let types = match &args.positional[1] {
                Value::Tuple(items) => items.to_vec(),
                other => vec![other.clone()],
            };
            for ty in &types {
                let matched = match ty {
                    Value::Builtin(b) => b.is_instance(&args.positional[0]),
                    _ => None,
                };
                match matched {
                    Some(true) => return Ok(Value::Bool(true)),
                    Some(false) => {}
                    None => {
                        return Err(RuntimeError::type_error(
                            "isinstance() arg 2 must be a type or tuple of types",
                        ))
                    }
                }
            }
            Ok(Value::Bool(false))
        }
        Builtin::Import => {
            arity(name, &args, 1, 5)?;
            let module = args.require_str(0, "name")?.to_string();
            let fromlist = args.get(3, "fromlist").is_some_and(Value::truthy);
            let level = args.get(4, "level").and_then(Value::as_int).unwrap_or(0);
            if level != 0 {
                return Err(RuntimeError::raise(
                    "ImportError",
                    "attempted relative import with no known parent package",
                ));
            }
            interp.import_module(&module, !fromlist)
        }
    }
}

fn attr_name<'a>(builtin: &str, value: &'a Value) -> Result<&'a str> {
    value.as_str().ok_or_else(|| {
        RuntimeError::type_error(format!(
            "{builtin}(): attribute name must be string, not '{}'",
            value.type_name()
        ))
    })
}

fn to_int(args: &CallArgs) -> Result<Value> {
    arity("int", args, 0, 2)?;
    args.check_keywords("int", &["base"])?;
    let Some(value) = args.positional.first() else {
        return Ok(Value::Int(0));
    };
    let base = args.get(1, "base").and_then(Value::as_int);
    match (value, base) {
        (Value::Str(s), base) => {
            let base = base.unwrap_or(10);
            if !(2..=36).contains(&base) {
                return Err(RuntimeError::value_error(
                    "int() base must be >= 2 and <= 36, or 0",
                ));
            }
            let cleaned = s.trim().replace('_', "");
            let (negative, digits) = match cleaned.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, cleaned.strip_prefix('+').unwrap_or(&cleaned)),
            };
            let digits = match base {
                16 => digits.trim_start_matches("0x").trim_start_matches("0X"),
                8 => digits.trim_start_matches("0o").trim_start_matches("0O"),
                2 => digits.trim_start_matches("0b").trim_start_matches("0B"),
                _ => digits,
            };
            let parsed = i64::from_str_radix(digits, base as u32)
                .ok()
                .filter(|_| !digits.is_empty() && !digits.starts_with(['+', '-']));
            match parsed {
                Some(v) => Ok(Value::Int(if negative { -v } else { v })),
                None => Err(RuntimeError::value_error(format!(
                    "invalid literal for int() with base {base}: {}",
                    Value::from(s.to_string()).repr()
                ))),
            }
        }
        (_, Some(_)) => Err(RuntimeError::type_error(
            "int() can't convert non-string with explicit base",
        )),
        (Value::Float(f), None) => Ok(Value::Int(float_to_int(f.trunc())?)),
        (v, None) => v.as_int().map(Value::Int).ok_or_else(|| {
            RuntimeError::type_error(format!(
                "int() argument must be a string or a real number, not '{}'",
                v.type_name()
            ))
        }),
    }
}

fn to_float(value: Option<&Value>) -> Result<Value> {
    let Some(value) = value else {
        return Ok(Value::Float(0.0));
    };
    if let Some(f) = value.as_float() {
        return Ok(Value::Float(f));
    }
    match value {
        Value::Str(s) => {
            let text = s.trim().to_ascii_lowercase().replace('_', "");
            let parsed = match text.trim_start_matches(['+', '-']) {
                "inf" | "infinity" | "nan" => text.parse::<f64>().ok(),
                _ => text.parse::<f64>().ok().filter(|_| {
                    text.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | '+' | '-'))
                }),
            };
            parsed.map(Value::Float).ok_or_else(|| {
                RuntimeError::value_error(format!(
                    "could not convert string to float: {}",
                    value.repr()
                ))
            })
        }
        other => Err(RuntimeError::type_error(format!(
            "float() argument must be a string or a real number, not '{}'",
            other.type_name()
        ))),
    }
}

fn round(value: &Value, ndigits: Option<&Value>) -> Result<Value> {
    let ndigits = match ndigits {
        None | Some(Value::None) => None,
        Some(v) => Some(v.as_int().ok_or_else(|| {
            RuntimeError::type_error(format!(
                "'{}' object cannot be interpreted as an integer",
                v.type_name()
            ))
        })?),
    };
    match (value, ndigits) {
        (Value::Float(f), None) => Ok(Value::Int(float_to_int(f.round_ties_even())?)),
        (Value::Float(f), Some(n)) => {
            let factor = 10f64.powi(n.clamp(-308, 308) as i32);
            Ok(Value::Float((f * factor).round_ties_even() / factor))
        }
        (v, ndigits) => match v.as_int() {
            Some(i) => match ndigits {
                Some(n) if n < 0 => {
                    let factor = 10i64.checked_pow((-n) as u32).unwrap_or(i64::MAX);
                    let rounded = (i as f64 / factor as f64).round_ties_even() as i64;
                    rounded.checked_mul(factor).map(Value::Int).ok_or_else(RuntimeError::overflow)
                }
                _ => Ok(Value::Int(i)),
            },
            None => Err(RuntimeError::type_error(format!(
                "type {} doesn't define __round__ method",
                v.type_name()
            ))),
        },
    }
}

fn extreme(interp: &mut Interpreter<'_>, builtin: Builtin, args: &CallArgs) -> Result<Value> {
    let name = builtin.name();
    args.check_keywords(name, &["key", "default"])?;
    let items = match args.positional.len() {
        0 => {
            return Err(RuntimeError::type_error(format!(
                "{name} expected at least 1 argument, got 0"
            )))
        }
        1 => ops::collect(&args.positional[0], interp.budget())?,
        _ => args.positional.clone(),
    };
    if items.is_empty() {
        return match args.keyword("default") {
            Some(default) => Ok(default.clone()),
            None => Err(RuntimeError::value_error(format!(
                "{name}() arg is an empty sequence"
            ))),
        };
    }
    let key = args.keyword("key").filter(|k| !k.is_none());
    let wanted = if builtin == Builtin::Max {
        Ordering::Greater
    } else {
        Ordering::Less
    };
    let mut best: Option<(Value, Value)> = None;
    for item in items {
        let score = match key {
            Some(key) => interp.call_value(key, CallArgs::new(vec![item.clone()]))?,
            None => item.clone(),
        };
        best = match best {
            None => Some((item, score)),
            Some((best_item, best_score)) => {
                let op = if wanted == Ordering::Greater { ">" } else { "<" };
                if score.compare(&best_score, op)? == wanted {
                    Some((item, score))
                } else {
                    Some((best_item, best_score))
                }
            }
        };
    }
    Ok(best.map(|(item, _)| item).unwrap_or(Value::None))
}
