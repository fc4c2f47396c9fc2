//! Methods of the built-in value types (`str`, `list`, `dict`, `set`, `tuple`).

use crate::error::RuntimeError;
use crate::sandbox::limits::Budget;
use crate::script::format;
use crate::script::host::CallArgs;
use crate::script::interpreter::Interpreter;
use crate::script::ops;
use crate::script::value::{count_equal, find_equal, release, Dict, Value};

type Result<T> = std::result::Result<T, RuntimeError>;

const STR_METHODS: &[&str] = &[
    "lower", "upper", "strip", "lstrip", "rstrip", "split", "rsplit", "join", "startswith",
    "endswith", "replace", "find", "index", "count", "format", "isdigit", "isalpha", "isalnum",
    "splitlines", "capitalize", "title", "zfill",
];
const LIST_METHODS: &[&str] = &[
    "append", "extend", "insert", "pop", "remove", "index", "count", "sort", "reverse", "copy",
    "clear",
];
const DICT_METHODS: &[&str] = &[
    "get", "keys", "values", "items", "update", "pop", "setdefault", "copy", "clear",
];
const SET_METHODS: &[&str] = &[
    "add", "discard", "remove", "update", "union", "intersection", "difference", "issubset",
    "copy", "clear",
];
const TUPLE_METHODS: &[&str] = &["count", "index"];

pub fn has_method(value: &Value, name: &str) -> bool {
    let table = match value {
        Value::Str(_) => STR_METHODS,
        Value::List(_) => LIST_METHODS,
        Value::Dict(_) => DICT_METHODS,
        Value::Set(_) => SET_METHODS,
        Value::Tuple(_) => TUPLE_METHODS,
        _ => return false,
    };
    table.contains(&name)
}

fn arity(name: &str, args: &CallArgs, min: usize, max: usize) -> Result<()> {
    let given = args.positional.len();
    if given < min || given > max {
        let expected = if min == max {
            match min {
                0 => "no arguments".to_string(),
                1 => "exactly one argument".to_string(),
                n => format!("exactly {n} arguments"),
            }
        } else if given < min {
            format!("at least {min} argument{}", if min == 1 { "" } else { "s" })
        } else {
            format!("at most {max} argument{}", if max == 1 { "" } else { "s" })
        };
        return Err(RuntimeError::type_error(format!(
            "{name}() takes {expected} ({given} given)"
        )));
    }
    Ok(())
}

fn str_arg<'a>(name: &str, value: &'a Value) -> Result<&'a str> {
    value.as_str().ok_or_else(|| {
        RuntimeError::type_error(format!(
            "{name}() argument must be str, not {}",
            value.type_name()
        ))
    })
}

/// Call `receiver.name(*args)` for a built-in receiver or a host object.
pub fn call(
    interp: &mut Interpreter<'_>,
    receiver: &Value,
    name: &str,
    args: CallArgs,
) -> Result<Value> {
    match receiver {
        Value::Object(object) => {
            if let Some(attr) = object.get_attr(name)? {
                return interp.call_value(&attr, args);
            }
            interp.host_result(object.call_method(name, &args)?)
        }
        Value::Str(s) => {
            if !args.keywords.is_empty() && !matches!(name, "format" | "split" | "rsplit") {
                return Err(RuntimeError::type_error(format!(
                    "{name}() takes no keyword arguments"
                )));
            }
            let text = str_method(s, name, &args, interp.budget())?;
            if let Value::Str(out) = &text {
                interp.budget().check_str_len(out.len())?;
            }
            Ok(text)
        }
        Value::List(_) => list_method(interp, receiver, name, args),
        Value::Dict(_) => dict_method(interp, receiver, name, args),
        Value::Set(_) => set_method(interp, receiver, name, args),
        Value::Tuple(items) => match name {
            "count" => {
                arity(name, &args, 1, 1)?;
                Ok(Value::Int(count_equal(items, &args.positional[0])? as i64))
            }
            "index" => {
                arity(name, &args, 1, 1)?;
                position(items, &args.positional[0], "tuple")
            }
            _ => Err(RuntimeError::attribute_error("tuple", name)),
        },
        other => Err(RuntimeError::attribute_error(&other.type_name(), name)),
    }
}

fn position(items: &[Value], needle: &Value, what: &str) -> Result<Value> {
    find_equal(items, needle)?
        .map(|i| Value::Int(i as i64))
        .ok_or_else(|| RuntimeError::value_error(format!("{what}.index(x): x not in {what}")))
}

fn strip_chars(args: &CallArgs, name: &str) -> Result<Option<Vec<char>>> {
    match args.positional.first() {
        None | Some(Value::None) => Ok(None),
        Some(chars) => Ok(Some(str_arg(name, chars)?.chars().collect())),
    }
}

fn str_method(s: &str, name: &str, args: &CallArgs, budget: &Budget) -> Result<Value> {
    let pos = &args.positional;
    let out: Value = match name {
        "lower" => {
            arity(name, args, 0, 0)?;
            s.to_lowercase().into()
        }
        "upper" => {
            arity(name, args, 0, 0)?;
            s.to_uppercase().into()
        }
        "strip" | "lstrip" | "rstrip" => {
            arity(name, args, 0, 1)?;
            let chars = strip_chars(args, name)?;
            let matches = |c: char| match &chars {
                Some(set) => set.contains(&c),
                None => c.is_whitespace(),
            };
            let trimmed = match name {
                "strip" => s.trim_matches(matches),
                "lstrip" => s.trim_start_matches(matches),
                _ => s.trim_end_matches(matches),
            };
            trimmed.into()
        }
        "split" | "rsplit" => {
            arity(name, args, 0, 2)?;
            let sep = match args.get(0, "sep") {
                None | Some(Value::None) => None,
                Some(sep) => Some(str_arg(name, sep)?),
            };
            let maxsplit = args.get(1, "maxsplit").and_then(Value::as_int).unwrap_or(-1);
            Value::list(split(s, sep, maxsplit, name == "rsplit")?)
        }
        "splitlines" => {
            arity(name, args, 0, 0)?;
            Value::list(s.lines().map(Value::from).collect())
        }
        "join" => {
            arity(name, args, 1, 1)?;
            let mut parts = Vec::new();
            let mut total = 0usize;
            for (i, item) in ops::iterate(&pos[0])?.enumerate() {
                let text = match item {
                    Value::Str(text) => text,
                    other => {
                        return Err(RuntimeError::type_error(format!(
                            "sequence item {i}: expected str instance, {} found",
                            other.type_name()
                        )))
                    }
                };
                let sep = if i > 0 { s.len() } else { 0 };
                total = total.saturating_add(sep).saturating_add(text.len());
                budget.check_str_len(total)?;
                parts.push(text);
            }
            let mut out = String::with_capacity(total);
            for (i, part) in parts.iter().enumerate() {
                if i > 0 {
                    out.push_str(s);
                }
                out.push_str(part);
            }
            out.into()
        }
        "startswith" | "endswith" => {
            arity(name, args, 1, 1)?;
            let candidates: Vec<Value> = match &pos[0] {
                Value::Tuple(items) => items.to_vec(),
                other => vec![other.clone()],
            };
            let mut hit = false;
            for candidate in &candidates {
                let affix = str_arg(name, candidate)?;
                hit |= if name == "startswith" {
                    s.starts_with(affix)
                } else {
                    s.ends_with(affix)
                };
            }
            Value::Bool(hit)
        }
        "replace" => {
            arity(name, args, 2, 3)?;
            let (old, new) = (str_arg(name, &pos[0])?, str_arg(name, &pos[1])?);
            let limit = pos
                .get(2)
                .and_then(Value::as_int)
                .filter(|count| *count >= 0)
                .map(|count| count as usize);
            let found = if old.is_empty() {
                s.chars().count() + 1
            } else {
                s.matches(old).count()
            };
            let hits = limit.map_or(found, |limit| found.min(limit));
            let grown = new.len().saturating_sub(old.len()).saturating_mul(hits);
            budget.check_str_len(s.len().saturating_add(grown))?;
            match limit {
                Some(count) => s.replacen(old, new, count).into(),
                None => s.replace(old, new).into(),
            }
        }
        "find" | "index" => {
            arity(name, args, 1, 1)?;
            let needle = str_arg(name, &pos[0])?;
            match s.find(needle) {
                Some(byte) => Value::Int(s[..byte].chars().count() as i64),
                None if name == "find" => Value::Int(-1),
                None => return Err(RuntimeError::value_error("substring not found")),
            }
        }
        "count" => {
            arity(name, args, 1, 1)?;
            let needle = str_arg(name, &pos[0])?;
            let count = if needle.is_empty() {
                s.chars().count() + 1
            } else {
                s.matches(needle).count()
            };
            Value::Int(count as i64)
        }
        "format" => format::str_format(s, args, budget)?.into(),
        "isdigit" => Value::Bool(!s.is_empty() && s.chars().all(|c| c.is_ascii_digit())),
        "isalpha" => Value::Bool(!s.is_empty() && s.chars().all(char::is_alphabetic)),
        "isalnum" => Value::Bool(!s.is_empty() && s.chars().all(char::is_alphanumeric)),
        "capitalize" => {
            let mut chars = s.chars();
            match chars.next() {
                Some(first) => {
                    let mut out: String = first.to_uppercase().collect();
                    out.push_str(&chars.as_str().to_lowercase());
                    out.into()
                }
                None => "".into(),
            }
        }
        "title" => {
            let mut out = String::with_capacity(s.len());
            let mut prev_alpha = false;
            for c in s.chars() {
                if prev_alpha {
                    out.extend(c.to_lowercase());
                } else {
                    out.extend(c.to_uppercase());
                }
                prev_alpha = c.is_alphabetic();
            }
            out.into()
        }
        "zfill" => {
            arity(name, args, 1, 1)?;
            let width = pos[0].as_int().unwrap_or(0).max(0) as usize;
            budget.check_str_len(width)?;
            let len = s.chars().count();
            if len >= width {
                s.into()
            } else {
                let (sign, digits) = match s.strip_prefix(['-', '+']) {
                    Some(rest) => (&s[..1], rest),
                    None => ("", s),
                };
                format!("{sign}{}{digits}", "0".repeat(width - len)).into()
            }
        }
        _ => return Err(RuntimeError::attribute_error("str", name)),
    };
    Ok(out)
}

fn split(s: &str, sep: Option<&str>, maxsplit: i64, from_right: bool) -> Result<Vec<Value>> {
    let limit = if maxsplit < 0 { usize::MAX } else { maxsplit as usize };
    let parts: Vec<String> = match sep {
        Some("") => return Err(RuntimeError::value_error("empty separator")),
        Some(sep) if from_right => {
            let mut parts: Vec<String> = s.rsplitn(limit.saturating_add(1), sep).map(String::from).collect();
            parts.reverse();
            parts
        }
        Some(sep) => s.splitn(limit.saturating_add(1), sep).map(String::from).collect(),
        None => {
            let words: Vec<&str> = s.split_whitespace().collect();
            if words.len() <= limit {
                words.into_iter().map(String::from).collect()
            } else if from_right {
                let tail = &words[words.len() - limit..];
                let head_end = nth_word_end(s, words.len() - limit);
                let mut parts = vec![s[..head_end].trim().to_string()];
                parts.extend(tail.iter().map(|w| w.to_string()));
                parts
            } else {
                let mut parts: Vec<String> = words[..limit].iter().map(|w| w.to_string()).collect();
                let rest_start = nth_word_end(s, limit);
                parts.push(s[rest_start..].trim_start().to_string());
                parts
            }
        }
    };
    Ok(parts.into_iter().map(Value::from).collect())
}

/// Byte offset just past the `n`-th whitespace-separated word.
fn nth_word_end(s: &str, n: usize) -> usize {
    let mut seen = 0;
    let mut in_word = false;
    for (i, c) in s.char_indices() {
        if c.is_whitespace() {
            if in_word {
                seen += 1;
                if seen == n {
                    return i;
                }
            }
            in_word = false;
        } else {
            in_word = true;
        }
    }
    s.len()
}

fn list_method(
    interp: &mut Interpreter<'_>,
    receiver: &Value,
    name: &str,
    args: CallArgs,
) -> Result<Value> {
    let Value::List(items) = receiver else {
        return Err(RuntimeError::attribute_error(&receiver.type_name(), name));
    };
    if name != "sort" && !args.keywords.is_empty() {
        return Err(RuntimeError::type_error(format!(
            "{name}() takes no keyword arguments"
        )));
    }
    let pos = &args.positional;
    match name {
        "append" => {
            arity(name, &args, 1, 1)?;
            let len = items.borrow().len();
            interp.budget().check_len(len + 1)?;
            items.borrow_mut().push(pos[0].clone());
            Ok(Value::None)
        }
        "extend" => {
            arity(name, &args, 1, 1)?;
            let extra = ops::collect(&pos[0], interp.budget())?;
            let len = items.borrow().len();
            interp.budget().check_len(len + extra.len())?;
            items.borrow_mut().extend(extra);
            Ok(Value::None)
        }
        "insert" => {
            arity(name, &args, 2, 2)?;
            let mut list = items.borrow_mut();
            interp.budget().check_len(list.len() + 1)?;
            let len = list.len() as i64;
            let index = pos[0].as_int().ok_or_else(|| {
                RuntimeError::type_error("'insert' index must be an integer")
            })?;
            let at = if index < 0 { (index + len).max(0) } else { index.min(len) };
            list.insert(at as usize, pos[1].clone());
            Ok(Value::None)
        }
        "pop" => {
            arity(name, &args, 0, 1)?;
            let mut list = items.borrow_mut();
            if list.is_empty() {
                return Err(RuntimeError::index_error("pop from empty list"));
            }
            let len = list.len() as i64;
            let index = pos.first().and_then(Value::as_int).unwrap_or(-1);
            let at = if index < 0 { index + len } else { index };
            if at < 0 || at >= len {
                return Err(RuntimeError::index_error("pop index out of range"));
            }
            Ok(list.remove(at as usize))
        }
        "remove" => {
            arity(name, &args, 1, 1)?;
            // Compare under a shared borrow; the list may contain itself.
            let found = find_equal(&items.borrow(), &pos[0])?;
            match found {
                Some(at) => {
                    release(items.borrow_mut().remove(at));
                    Ok(Value::None)
                }
                None => Err(RuntimeError::value_error("list.remove(x): x not in list")),
            }
        }
        "index" => {
            arity(name, &args, 1, 1)?;
            position(&items.borrow(), &pos[0], "list")
        }
        "count" => {
            arity(name, &args, 1, 1)?;
            let count = count_equal(&items.borrow(), &pos[0])?;
            Ok(Value::Int(count as i64))
        }
        "sort" => {
            arity(name, &args, 0, 0)?;
            args.check_keywords("sort", &["key", "reverse"])?;
            let snapshot = items.borrow().clone();
            let sorted = interp.sort_values(
                snapshot,
                args.keyword("key"),
                args.keyword("reverse").is_some_and(Value::truthy),
            )?;
            *items.borrow_mut() = sorted;
            Ok(Value::None)
        }
        "reverse" => {
            arity(name, &args, 0, 0)?;
            items.borrow_mut().reverse();
            Ok(Value::None)
        }
        "copy" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::list(items.borrow().clone()))
        }
        "clear" => {
            arity(name, &args, 0, 0)?;
            let drained = std::mem::take(&mut *items.borrow_mut());
            release(Value::list(drained));
            Ok(Value::None)
        }
        _ => Err(RuntimeError::attribute_error("list", name)),
    }
}

fn dict_method(
    interp: &mut Interpreter<'_>,
    receiver: &Value,
    name: &str,
    args: CallArgs,
) -> Result<Value> {
    let Value::Dict(dict) = receiver else {
        return Err(RuntimeError::attribute_error(&receiver.type_name(), name));
    };
    let pos = &args.positional;
    if name != "update" && !args.keywords.is_empty() {
        return Err(RuntimeError::type_error(format!(
            "{name}() takes no keyword arguments"
        )));
    }
    match name {
        "get" => {
            arity(name, &args, 1, 2)?;
            let found = dict.borrow().get(&pos[0])?;
            Ok(found.unwrap_or_else(|| pos.get(1).cloned().unwrap_or(Value::None)))
        }
        "keys" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::list(dict.borrow().keys()))
        }
        "values" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::list(dict.borrow().values()))
        }
        "items" => {
            arity(name, &args, 0, 0)?;
            let items = dict
                .borrow()
                .items()
                .into_iter()
                .map(|(k, v)| Value::tuple(vec![k, v]))
                .collect();
            Ok(Value::list(items))
        }
        "update" => {
            arity(name, &args, 0, 1)?;
            let mut pairs = match pos.first() {
                Some(source) => interp.mapping_pairs(source)?,
                None => Vec::new(),
            };
            pairs.extend(
                args.keywords
                    .iter()
                    .map(|(k, v)| (Value::from(k.as_str()), v.clone())),
            );
            let mut dict = dict.borrow_mut();
            for (k, v) in pairs {
                dict.insert(k, v)?;
            }
            interp.budget().check_len(dict.len())?;
            Ok(Value::None)
        }
        "pop" => {
            arity(name, &args, 1, 2)?;
            let removed = dict.borrow_mut().remove(&pos[0])?;
            match (removed, pos.get(1)) {
                (Some(v), _) => Ok(v),
                (None, Some(default)) => Ok(default.clone()),
                (None, None) => Err(RuntimeError::key_error(pos[0].repr())),
            }
        }
        "setdefault" => {
            arity(name, &args, 1, 2)?;
            let mut dict = dict.borrow_mut();
            if let Some(existing) = dict.get(&pos[0])? {
                return Ok(existing);
            }
            let value = pos.get(1).cloned().unwrap_or(Value::None);
            interp.budget().check_len(dict.len() + 1)?;
            dict.insert(pos[0].clone(), value.clone())?;
            Ok(value)
        }
        "copy" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::dict(dict.borrow().clone()))
        }
        "clear" => {
            arity(name, &args, 0, 0)?;
            let old = std::mem::take(&mut *dict.borrow_mut());
            release(Value::dict(old));
            Ok(Value::None)
        }
        _ => Err(RuntimeError::attribute_error("dict", name)),
    }
}

fn set_method(
    interp: &mut Interpreter<'_>,
    receiver: &Value,
    name: &str,
    args: CallArgs,
) -> Result<Value> {
    let Value::Set(set) = receiver else {
        return Err(RuntimeError::attribute_error(&receiver.type_name(), name));
    };
    let pos = &args.positional;
    let budget = interp.budget();
    match name {
        "add" => {
            arity(name, &args, 1, 1)?;
            let mut set = set.borrow_mut();
            budget.check_len(set.len() + 1)?;
            set.insert(pos[0].clone(), Value::None)?;
            Ok(Value::None)
        }
        "discard" | "remove" => {
            arity(name, &args, 1, 1)?;
            let removed = set.borrow_mut().remove(&pos[0])?;
            if removed.is_none() && name == "remove" {
                return Err(RuntimeError::key_error(pos[0].repr()));
            }
            Ok(Value::None)
        }
        "update" => {
            let mut extra = Vec::new();
            for source in pos {
                extra.extend(ops::collect(source, budget)?);
            }
            let mut set = set.borrow_mut();
            for item in extra {
                set.insert(item, Value::None)?;
            }
            budget.check_len(set.len())?;
            Ok(Value::None)
        }
        "union" | "intersection" | "difference" | "issubset" => {
            let mut out = set.borrow().clone();
            for source in pos {
                let other = ops::collect(source, budget)?;
                match name {
                    "union" => {
                        for item in other {
                            out.insert(item, Value::None)?;
                        }
                    }
                    "issubset" => {
                        let mut theirs = Dict::new();
                        for item in other {
                            theirs.insert(item, Value::None)?;
                        }
                        for key in out.keys() {
                            if !theirs.contains(&key)? {
                                return Ok(Value::Bool(false));
                            }
                        }
                        return Ok(Value::Bool(true));
                    }
                    _ => {
                        let mut theirs = Dict::new();
                        for item in other {
                            theirs.insert(item, Value::None)?;
                        }
                        let mut kept = Dict::new();
                        for key in out.keys() {
                            if theirs.contains(&key)? == (name == "intersection") {
                                kept.insert(key, Value::None)?;
                            }
                        }
                        out = kept;
                    }
                }
            }
            budget.check_len(out.len())?;
            Ok(Value::set(out))
        }
        "copy" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::set(set.borrow().clone()))
        }
        "clear" => {
            arity(name, &args, 0, 0)?;
            set.borrow_mut().clear();
            Ok(Value::None)
        }
        _ => Err(RuntimeError::attribute_error("set", name)),
    }
}
