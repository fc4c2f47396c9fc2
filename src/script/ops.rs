//! Operators, subscripts, membership and iteration over script values.

use std::rc::Rc;

use crate::error::RuntimeError;
use crate::sandbox::limits::Budget;
use crate::script::ast::{BinOp, CmpOp, UnaryOp};
use crate::script::format;
use crate::script::methods;
use crate::script::value::{find_equal, float_to_int, release, BoundMethod, Dict, Range, Value};

type Result<T> = std::result::Result<T, RuntimeError>;

fn unsupported(op: BinOp, left: &Value, right: &Value) -> RuntimeError {
    RuntimeError::type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op.symbol(),
        left.type_name(),
        right.type_name()
    ))
}

fn is_number(value: &Value) -> bool {
    matches!(value, Value::Int(_) | Value::Bool(_) | Value::Float(_))
}

pub fn binary_op(op: BinOp, left: &Value, right: &Value, budget: &Budget) -> Result<Value> {
    if is_number(left) && is_number(right) {
        return numeric_op(op, left, right);
    }
    match op {
        BinOp::Add => add(left, right, budget),
        BinOp::Sub => match (left, right) {
            (Value::Set(a), Value::Set(b)) => {
                let mut out = Dict::new();
                let (a, b) = (a.borrow(), b.borrow());
                for key in a.keys() {
                    if !b.contains(&key)? {
                        out.insert(key, Value::None)?;
                    }
                }
                Ok(Value::set(out))
            }
            _ => Err(unsupported(op, left, right)),
        },
        BinOp::Mul => match (left, right) {
            (seq, Value::Int(_) | Value::Bool(_)) | (Value::Int(_) | Value::Bool(_), seq) => {
                let count = if is_number(left) { left } else { right };
                repeat(seq, count.as_int().unwrap_or(0), op, left, right, budget)
            }
            _ => Err(unsupported(op, left, right)),
        },
        BinOp::Mod => match left {
            Value::Str(template) => {
                let text = format::percent_format(template, right, budget)?;
                budget.check_str_len(text.len())?;
                Ok(Value::from(text))
            }
            _ => Err(unsupported(op, left, right)),
        },
        _ => Err(unsupported(op, left, right)),
    }
}

fn add(left: &Value, right: &Value, budget: &Budget) -> Result<Value> {
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => {
            budget.check_str_len(a.len() + b.len())?;
            let mut out = String::with_capacity(a.len() + b.len());
            out.push_str(a);
            out.push_str(b);
            Ok(Value::from(out))
        }
        (Value::Str(_), other) => Err(RuntimeError::type_error(format!(
            "can only concatenate str (not \"{}\") to str",
            other.type_name()
        ))),
        (Value::List(a), Value::List(b)) => {
            let mut items = a.borrow().clone();
            items.extend(b.borrow().iter().cloned());
            budget.check_len(items.len())?;
            Ok(Value::list(items))
        }
        (Value::List(_), other) => Err(RuntimeError::type_error(format!(
            "can only concatenate list (not \"{}\") to list",
            other.type_name()
        ))),
        (Value::Tuple(a), Value::Tuple(b)) => {
            budget.check_len(a.len() + b.len())?;
            Ok(Value::tuple(a.iter().chain(b.iter()).cloned().collect()))
        }
        (Value::Tuple(_), other) => Err(RuntimeError::type_error(format!(
            "can only concatenate tuple (not \"{}\") to tuple",
            other.type_name()
        ))),
        _ => Err(unsupported(BinOp::Add, left, right)),
    }
}

fn repeat(
    seq: &Value,
    count: i64,
    op: BinOp,
    left: &Value,
    right: &Value,
    budget: &Budget,
) -> Result<Value> {
    let count = count.max(0) as usize;
    match seq {
        Value::Str(s) => {
            budget.check_str_len(s.len().saturating_mul(count))?;
            Ok(Value::from(s.repeat(count)))
        }
        Value::List(items) => {
            let items = items.borrow();
            budget.check_len(items.len().saturating_mul(count))?;
            Ok(Value::list(repeat_items(&items, count)))
        }
        Value::Tuple(items) => {
            budget.check_len(items.len().saturating_mul(count))?;
            Ok(Value::tuple(repeat_items(items, count)))
        }
        _ => Err(unsupported(op, left, right)),
    }
}

fn repeat_items(items: &[Value], count: usize) -> Vec<Value> {
    let mut out = Vec::with_capacity(items.len() * count);
    for _ in 0..count {
        out.extend(items.iter().cloned());
    }
    out
}

fn numeric_op(op: BinOp, left: &Value, right: &Value) -> Result<Value> {
    if let (Some(a), Some(b)) = (left.as_int(), right.as_int()) {
        return int_op(op, a, b);
    }
    let (Some(a), Some(b)) = (left.as_float(), right.as_float()) else {
        return Err(unsupported(op, left, right));
    };
    let value = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => {
            if b == 0.0 {
                return Err(RuntimeError::zero_division("float division by zero"));
            }
            a / b
        }
        BinOp::FloorDiv => {
            if b == 0.0 {
                return Err(RuntimeError::zero_division("float floor division by zero"));
            }
            (a / b).floor()
        }
        BinOp::Mod => {
            if b == 0.0 {
                return Err(RuntimeError::zero_division("float modulo"));
            }
            let r = a % b;
            if r != 0.0 && (r < 0.0) != (b < 0.0) {
                r + b
            } else {
                r
            }
        }
        BinOp::Pow => {
            if a == 0.0 && b < 0.0 {
                return Err(RuntimeError::zero_division(
                    "0.0 cannot be raised to a negative power",
                ));
            }
            a.powf(b)
        }
    };
    Ok(Value::Float(value))
}

fn int_op(op: BinOp, a: i64, b: i64) -> Result<Value> {
    let value = match op {
        BinOp::Add => a.checked_add(b),
        BinOp::Sub => a.checked_sub(b),
        BinOp::Mul => a.checked_mul(b),
        BinOp::Div => {
            if b == 0 {
                return Err(RuntimeError::zero_division("division by zero"));
            }
            return Ok(Value::Float(a as f64 / b as f64));
        }
        BinOp::FloorDiv => {
            if b == 0 {
                return Err(RuntimeError::zero_division(
                    "integer division or modulo by zero",
                ));
            }
            a.checked_div(b).map(|q| {
                if a % b != 0 && (a < 0) != (b < 0) {
                    q - 1
                } else {
                    q
                }
            })
        }
        BinOp::Mod => {
            if b == 0 {
                return Err(RuntimeError::zero_division(
                    "integer division or modulo by zero",
                ));
            }
            a.checked_rem(b)
                .map(|r| if r != 0 && (r < 0) != (b < 0) { r + b } else { r })
        }
        BinOp::Pow => {
            if b < 0 {
                if a == 0 {
                    return Err(RuntimeError::zero_division(
                        "0.0 cannot be raised to a negative power",
                    ));
                }
                return Ok(Value::Float((a as f64).powf(b as f64)));
            }
            u32::try_from(b).ok().and_then(|exp| a.checked_pow(exp))
        }
    };
    value.map(Value::Int).ok_or_else(RuntimeError::overflow)
}

pub fn unary_op(op: UnaryOp, operand: &Value) -> Result<Value> {
    match (op, operand) {
        (UnaryOp::Not, v) => Ok(Value::Bool(!v.truthy())),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Pos, Value::Float(f)) => Ok(Value::Float(*f)),
        (UnaryOp::Neg, v) if v.as_int().is_some() => v
            .as_int()
            .and_then(i64::checked_neg)
            .map(Value::Int)
            .ok_or_else(RuntimeError::overflow),
        (UnaryOp::Pos, v) if v.as_int().is_some() => Ok(Value::Int(v.as_int().unwrap_or(0))),
        (op, v) => Err(RuntimeError::type_error(format!(
            "bad operand type for unary {}: '{}'",
            if op == UnaryOp::Neg { "-" } else { "+" },
            v.type_name()
        ))),
    }
}

pub fn compare(op: CmpOp, left: &Value, right: &Value) -> Result<bool> {
    Ok(match op {
        CmpOp::Eq => left.eq_value(right)?,
        CmpOp::NotEq => !left.eq_value(right)?,
        CmpOp::Lt => left.compare(right, "<")?.is_lt(),
        CmpOp::LtE => left.compare(right, "<=")?.is_le(),
        CmpOp::Gt => left.compare(right, ">")?.is_gt(),
        CmpOp::GtE => left.compare(right, ">=")?.is_ge(),
        CmpOp::In => contains(right, left)?,
        CmpOp::NotIn => !contains(right, left)?,
        CmpOp::Is => left.is_same(right),
        CmpOp::IsNot => !left.is_same(right),
    })
}

/// `item in container`.
pub fn contains(container: &Value, item: &Value) -> Result<bool> {
    match container {
        Value::Str(haystack) => match item {
            Value::Str(needle) => Ok(haystack.contains(&**needle)),
            other => Err(RuntimeError::type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::List(items) => Ok(find_equal(&items.borrow(), item)?.is_some()),
        Value::Tuple(items) => Ok(find_equal(items, item)?.is_some()),
        Value::Dict(dict) | Value::Set(dict) => dict.borrow().contains(item),
        Value::Range(range) => Ok(match item {
            Value::Float(f) if f.fract() == 0.0 => float_to_int(*f).is_ok_and(|i| range.contains(i)),
            other => other.as_int().is_some_and(|i| range.contains(i)),
        }),
        Value::Object(object) => match object.iterate() {
            Some(items) => Ok(find_equal(&items?, item)?.is_some()),
            None => Err(not_iterable(container)),
        },
        other => Err(RuntimeError::type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

pub fn len(value: &Value) -> Result<usize> {
    match value {
        Value::Str(s) => Ok(s.chars().count()),
        Value::List(items) => Ok(items.borrow().len()),
        Value::Tuple(items) => Ok(items.len()),
        Value::Dict(dict) | Value::Set(dict) => Ok(dict.borrow().len()),
        Value::Range(range) => Ok(range.len()),
        Value::Object(object) => object.len().ok_or_else(|| no_len(value)),
        _ => Err(no_len(value)),
    }
}

fn no_len(value: &Value) -> RuntimeError {
    RuntimeError::type_error(format!(
        "object of type '{}' has no len()",
        value.type_name()
    ))
}

fn not_iterable(value: &Value) -> RuntimeError {
    RuntimeError::type_error(format!("'{}' object is not iterable", value.type_name()))
}

/// Resolve a possibly negative index against `len`.
fn normalize_index(index: &Value, len: usize, what: &str) -> Result<usize> {
    let Some(i) = index.as_int() else {
        return Err(RuntimeError::type_error(format!(
            "{what} indices must be integers or slices, not {}",
            index.type_name()
        )));
    };
    let resolved = if i < 0 { i as i128 + len as i128 } else { i as i128 };
    if resolved < 0 || resolved >= len as i128 {
        return Err(RuntimeError::index_error(format!("{what} index out of range")));
    }
    Ok(resolved as usize)
}

/// `value[index]`.
pub fn get_item(value: &Value, index: &Value) -> Result<Value> {
    match value {
        Value::List(items) => {
            let items = items.borrow();
            let i = normalize_index(index, items.len(), "list")?;
            Ok(items[i].clone())
        }
        Value::Tuple(items) => {
            let i = normalize_index(index, items.len(), "tuple")?;
            Ok(items[i].clone())
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let i = normalize_index(index, chars.len(), "string")?;
            Ok(Value::from(chars[i].to_string()))
        }
        Value::Range(range) => {
            let i = normalize_index(index, range.len(), "range object")?;
            range.get(i).map(Value::Int).ok_or_else(|| {
                RuntimeError::index_error("range object index out of range")
            })
        }
        Value::Dict(dict) => dict
            .borrow()
            .get(index)?
            .ok_or_else(|| RuntimeError::key_error(index.repr())),
        Value::Object(object) => Ok(object.get_item(index)?),
        other => Err(RuntimeError::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

/// Bounds of `value[lower:upper:step]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SliceSpec {
    pub lower: Option<i64>,
    pub upper: Option<i64>,
    pub step: Option<i64>,
}

impl SliceSpec {
    /// Normalized `(start, stop, step)` for a sequence of `len` items.
    fn bounds(&self, len: usize) -> Result<(i128, i128, i128)> {
        let step = self.step.unwrap_or(1) as i128;
        if step == 0 {
            return Err(RuntimeError::value_error("slice step cannot be zero"));
        }
        let len = len as i128;
        let clamp = |bound: i64, low: i128, high: i128| {
            let bound = bound as i128;
            if bound < 0 {
                (bound + len).max(low)
            } else {
                bound.min(high)
            }
        };
        Ok(if step > 0 {
            (
                self.lower.map_or(0, |b| clamp(b, 0, len)),
                self.upper.map_or(len, |b| clamp(b, 0, len)),
                step,
            )
        } else {
            (
                self.lower.map_or(len - 1, |b| clamp(b, -1, len - 1)),
                self.upper.map_or(-1, |b| clamp(b, -1, len - 1)),
                step,
            )
        })
    }

    /// Indices selected from a sequence of `len` items.
    pub fn indices(&self, len: usize) -> Result<Vec<usize>> {
        let (start, stop, step) = self.bounds(len)?;
        let mut out = Vec::new();
        let mut i = start;
        while (step > 0 && i < stop) || (step < 0 && i > stop) {
            out.push(i as usize);
            i += step;
        }
        Ok(out)
    }
}

/// `value[lower:upper:step]`.
pub fn get_slice(value: &Value, slice: &SliceSpec) -> Result<Value> {
    match value {
        Value::List(items) => {
            let items = items.borrow();
            let picked = slice.indices(items.len())?;
            Ok(Value::list(picked.into_iter().map(|i| items[i].clone()).collect()))
        }
        Value::Tuple(items) => {
            let picked = slice.indices(items.len())?;
            Ok(Value::tuple(picked.into_iter().map(|i| items[i].clone()).collect()))
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let picked = slice.indices(chars.len())?;
            Ok(Value::from(picked.into_iter().map(|i| chars[i]).collect::<String>()))
        }
        Value::Range(range) => {
            let (start, stop, step) = slice.bounds(range.len())?;
            let at = |i: i128| {
                i64::try_from(range.start as i128 + i * range.step as i128)
                    .map_err(|_| RuntimeError::overflow())
            };
            Ok(Value::Range(Range {
                start: at(start)?,
                stop: at(stop)?,
                step: i64::try_from(step * range.step as i128)
                    .map_err(|_| RuntimeError::overflow())?,
            }))
        }
        other => Err(RuntimeError::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

/// `target[index] = value`.
pub fn set_item(target: &Value, index: &Value, value: Value, budget: &Budget) -> Result<()> {
    match target {
        Value::List(items) => {
            let mut items = items.borrow_mut();
            let i = normalize_index(index, items.len(), "list assignment")?;
            let old = std::mem::replace(&mut items[i], value);
            drop(items);
            release(old);
            Ok(())
        }
        Value::Dict(dict) => {
            let mut dict = dict.borrow_mut();
            if !dict.contains(index)? {
                budget.check_len(dict.len() + 1)?;
            }
            dict.insert(index.clone(), value)
        }
        other => Err(RuntimeError::type_error(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}

/// `del target[index]`.
pub fn del_item(target: &Value, index: &Value) -> Result<()> {
    match target {
        Value::List(items) => {
            let mut items = items.borrow_mut();
            let i = normalize_index(index, items.len(), "list assignment")?;
            let old = items.remove(i);
            drop(items);
            release(old);
            Ok(())
        }
        Value::Dict(dict) => match dict.borrow_mut().remove(index)? {
            Some(old) => {
                release(old);
                Ok(())
            }
            None => Err(RuntimeError::key_error(index.repr())),
        },
        other => Err(RuntimeError::type_error(format!(
            "'{}' object does not support item deletion",
            other.type_name()
        ))),
    }
}

/// `value.name`.
pub fn get_attr(value: &Value, name: &str) -> Result<Value> {
    match value {
        Value::Object(object) => {
            if let Some(attr) = object.get_attr(name)? {
                return Ok(attr);
            }
            if object.has_method(name) {
                return Ok(bind(value, name));
            }
            Err(RuntimeError::attribute_error(object.type_name(), name))
        }
        Value::Function(f) if name == "__name__" => Ok(Value::from(f.name.as_str())),
        _ if methods::has_method(value, name) => Ok(bind(value, name)),
        _ => Err(RuntimeError::attribute_error(&value.type_name(), name)),
    }
}

fn bind(receiver: &Value, name: &str) -> Value {
    Value::Method(Rc::new(BoundMethod {
        receiver: receiver.clone(),
        name: name.to_string(),
    }))
}

/// `target.name = value`.
pub fn set_attr(target: &Value, name: &str, value: Value) -> Result<()> {
    match target {
        Value::Object(object) => Ok(object.set_attr(name, value)?),
        other => Err(RuntimeError::attribute_error(&other.type_name(), name)),
    }
}

/// Iterator over the items of an iterable value.
///
/// Ranges are produced lazily so `for i in range(n)` never materializes `n`
/// items; other iterables are snapshotted up front.
pub enum ValueIter {
    Items(std::vec::IntoIter<Value>),
    Range { range: Range, next: usize },
}

impl Iterator for ValueIter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        match self {
            ValueIter::Items(items) => items.next(),
            ValueIter::Range { range, next } => {
                let value = range.get(*next)?;
                *next += 1;
                Some(Value::Int(value))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            ValueIter::Items(items) => items.size_hint(),
            ValueIter::Range { range, next } => {
                let left = range.len().saturating_sub(*next);
                (left, Some(left))
            }
        }
    }
}

pub fn iterate(value: &Value) -> Result<ValueIter> {
    let items = match value {
        Value::Range(range) => {
            return Ok(ValueIter::Range {
                range: *range,
                next: 0,
            })
        }
        Value::List(items) => items.borrow().clone(),
        Value::Tuple(items) => items.to_vec(),
        Value::Str(s) => s.chars().map(|c| Value::from(c.to_string())).collect(),
        Value::Dict(dict) | Value::Set(dict) => dict.borrow().keys(),
        Value::Object(object) => match object.iterate() {
            Some(items) => items?,
            None => return Err(not_iterable(value)),
        },
        _ => return Err(not_iterable(value)),
    };
    Ok(ValueIter::Items(items.into_iter()))
}

/// Materialize an iterable, enforcing the collection limit.
pub fn collect(value: &Value, budget: &Budget) -> Result<Vec<Value>> {
    let iter = iterate(value)?;
    budget.check_len(iter.size_hint().0)?;
    Ok(iter.collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::config::SandboxConfig;
    use crate::sandbox::limits::{CancelToken, ExecutionLimits};

    fn budget() -> Budget {
        Budget::new(
            ExecutionLimits::from(&SandboxConfig::default()),
            CancelToken::new(),
        )
    }

    fn int(v: i64) -> Value {
        Value::Int(v)
    }

    #[test]
    fn test_python_division_semantics() {
        let b = budget();
        assert_eq!(binary_op(BinOp::FloorDiv, &int(-7), &int(2), &b).unwrap().as_int(), Some(-4));
        assert_eq!(binary_op(BinOp::FloorDiv, &int(7), &int(-2), &b).unwrap().as_int(), Some(-4));
        assert_eq!(binary_op(BinOp::Mod, &int(-7), &int(2), &b).unwrap().as_int(), Some(1));
        assert_eq!(binary_op(BinOp::Mod, &int(7), &int(-2), &b).unwrap().as_int(), Some(-1));
        assert_eq!(binary_op(BinOp::Div, &int(7), &int(2), &b).unwrap().as_float(), Some(3.5));
        let err = binary_op(BinOp::Div, &int(1), &int(0), &b).unwrap_err();
        assert_eq!(err.kind(), Some("ZeroDivisionError"));
        assert_eq!(err.to_string(), "division by zero");
    }

    #[test]
    fn test_overflow_is_an_exception() {
        let err = binary_op(BinOp::Mul, &int(i64::MAX), &int(2), &budget()).unwrap_err();
        assert_eq!(err.kind(), Some("OverflowError"));
        let err = binary_op(BinOp::Pow, &int(10), &int(40), &budget()).unwrap_err();
        assert_eq!(err.kind(), Some("OverflowError"));
    }

    #[test]
    fn test_concatenation_errors() {
        let err = binary_op(BinOp::Add, &Value::from("a"), &int(1), &budget()).unwrap_err();
        assert_eq!(err.to_string(), "can only concatenate str (not \"int\") to str");
        let err = binary_op(BinOp::Sub, &Value::from("a"), &int(1), &budget()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "unsupported operand type(s) for -: 'str' and 'int'"
        );
    }

    #[test]
    fn test_repetition_respects_limits() {
        let b = budget();
        let repeated = binary_op(BinOp::Mul, &Value::from("ab"), &int(3), &b).unwrap();
        assert_eq!(repeated.as_str(), Some("ababab"));
        let err = binary_op(BinOp::Mul, &Value::list(vec![int(0)]), &int(10_000_000), &b)
            .unwrap_err();
        assert!(matches!(err, RuntimeError::LimitExceeded(_)));
    }

    #[test]
    fn test_indexing_and_slicing() {
        let list = Value::list((0..5).map(int).collect());
        assert_eq!(get_item(&list, &int(-1)).unwrap().as_int(), Some(4));
        let err = get_item(&list, &int(5)).unwrap_err();
        assert_eq!(err.to_string(), "list index out of range");

        let reversed = get_slice(&list, &SliceSpec { step: Some(-1), ..Default::default() }).unwrap();
        assert_eq!(reversed.repr(), "[4, 3, 2, 1, 0]");
        let middle = get_slice(
            &Value::from("sandbox"),
            &SliceSpec { lower: Some(1), upper: Some(-1), step: None },
        )
        .unwrap();
        assert_eq!(middle.as_str(), Some("andbo"));
    }

    #[test]
    fn test_missing_key_reports_repr() {
        let dict = Value::dict_from([("a", int(1))]);
        let err = get_item(&dict, &Value::from("b")).unwrap_err();
        assert_eq!(err.kind(), Some("KeyError"));
        assert_eq!(err.to_string(), "'b'");
    }

    #[test]
    fn test_membership() {
        assert!(contains(&Value::from("bucket"), &Value::from("ck")).unwrap());
        assert!(contains(&Value::Range(Range { start: 0, stop: 10, step: 2 }), &int(4)).unwrap());
        assert!(contains(&int(3), &int(3)).is_err());
    }

    #[test]
    fn test_range_iterates_lazily() {
        let iter = iterate(&Value::Range(Range { start: 0, stop: i64::MAX, step: 1 })).unwrap();
        let first: Vec<i64> = iter.take(3).filter_map(|v| v.as_int()).collect();
        assert_eq!(first, vec![0, 1, 2]);
    }

    #[test]
    fn test_range_slices_stay_ranges() {
        let range = Value::Range(Range { start: 0, stop: 10, step: 1 });
        let spec = SliceSpec { lower: Some(2), upper: Some(8), step: Some(2) };
        let Value::Range(sliced) = get_slice(&range, &spec).unwrap() else {
            panic!("expected a range");
        };
        assert_eq!((sliced.start, sliced.stop, sliced.step), (2, 8, 2));
        assert_eq!(sliced.len(), 3);

        let full = Value::Range(Range { start: i64::MIN, stop: i64::MAX, step: 1 });
        let tail = get_slice(&full, &SliceSpec { lower: Some(-2), ..Default::default() }).unwrap();
        let items: Vec<i64> = iterate(&tail).unwrap().filter_map(|v| v.as_int()).collect();
        assert_eq!(items, vec![i64::MAX - 2, i64::MAX - 1]);
    }

    #[test]
    fn test_method_lookup_binds_receiver() {
        let method = get_attr(&Value::list(vec![]), "append").unwrap();
        assert!(matches!(method, Value::Method(_)));
        let err = get_attr(&int(1), "nope").unwrap_err();
        assert_eq!(err.to_string(), "'int' object has no attribute 'nope'");
    }
}
