//! Runtime values.
//!
//! Values created while a script runs are single-threaded (`Rc`); only host
//! objects are shared across threads, which is why [`HostObject`] requires
//! `Send + Sync`.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::rc::Rc;
use std::sync::Arc;

use crate::error::RuntimeError;
use crate::sandbox::limits::Budget;
use crate::script::ast::{FunctionDef, Lambda};
use crate::script::builtins::Builtin;
use crate::script::host::{HostObject, NativeFunction};
use crate::script::scope::Scope;

/// How deep `==`, ordering and `repr` descend into nested containers.
pub const MAX_NESTING: usize = 256;

/// Rendering length after which [`Value::repr`] stops, for error messages
/// and other host-side uses.
pub const REPR_LIMIT: usize = 1 << 20;

#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(Rc<RefCell<Vec<Value>>>),
    Tuple(Rc<[Value]>),
    Dict(Rc<RefCell<Dict>>),
    /// Stored as a dict whose values are all `None`.
    Set(Rc<RefCell<Dict>>),
    Range(Range),
    Function(Rc<Function>),
    Builtin(Builtin),
    Native(Rc<NativeFunction>),
    Method(Rc<BoundMethod>),
    Object(Arc<dyn HostObject>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
}

impl Range {
    /// Number of elements; may exceed `i64::MAX` for spans near the integer limits.
    pub fn len(&self) -> usize {
        let span = if self.step > 0 {
            (self.stop as i128 - self.start as i128 + self.step as i128 - 1) / self.step as i128
        } else {
            (self.start as i128 - self.stop as i128 - self.step as i128 - 1) / (-(self.step as i128))
        };
        span.max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<i64> {
        if index >= self.len() {
            return None;
        }
        let value = self.start as i128 + self.step as i128 * index as i128;
        i64::try_from(value).ok()
    }

    pub fn contains(&self, v: i64) -> bool {
        let in_bounds = if self.step > 0 {
            v >= self.start && v < self.stop
        } else {
            v <= self.start && v > self.stop
        };
        in_bounds && (v as i128 - self.start as i128) % self.step as i128 == 0
    }
}

/// `int(f)` for a float that is already integral, failing like Python when
/// `f` has no `int` counterpart.
pub fn float_to_int(f: f64) -> Result<i64, RuntimeError> {
    if f.is_nan() {
        return Err(RuntimeError::value_error("cannot convert float NaN to integer"));
    }
    if f.is_infinite() {
        return Err(RuntimeError::raise(
            "OverflowError",
            "cannot convert float infinity to integer",
        ));
    }
    // 2^63 is exact as an f64; i64::MAX is not.
    if !(-9.223_372_036_854_775_808e18..9.223_372_036_854_775_808e18).contains(&f) {
        return Err(RuntimeError::raise("OverflowError", "int too large to convert"));
    }
    Ok(f as i64)
}

/// Code of a user-defined function or lambda.
pub enum FunctionBody {
    Def(Rc<FunctionDef>),
    Lambda(Rc<Lambda>),
}

pub struct Function {
    pub name: String,
    pub body: FunctionBody,
    /// Evaluated default values, aligned with the trailing parameters.
    pub defaults: Vec<Value>,
    pub closure: Rc<Scope>,
}

impl Function {
    pub fn param_names(&self) -> Vec<&str> {
        let params = match &self.body {
            FunctionBody::Def(def) => &def.params,
            FunctionBody::Lambda(lambda) => &lambda.params,
        };
        params.iter().map(|p| p.name.as_str()).collect()
    }
}

/// An attribute lookup that resolved to a method, e.g. `items.append`.
pub struct BoundMethod {
    pub receiver: Value,
    pub name: String,
}

/// Hashable projection of a value, used as dict and set key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    None,
    Int(i64),
    Float(u64),
    Str(Rc<str>),
    Tuple(Vec<HashKey>),
    Identity(usize),
}

impl HashKey {
    pub fn of(value: &Value) -> Result<HashKey, RuntimeError> {
        Ok(match value {
            Value::None => HashKey::None,
            Value::Bool(b) => HashKey::Int(*b as i64),
            Value::Int(i) => HashKey::Int(*i),
            Value::Float(f) => {
                if f.fract() == 0.0 && f.abs() < 9.2e18 {
                    HashKey::Int(*f as i64)
                } else {
                    HashKey::Float(f.to_bits())
                }
            }
            Value::Str(s) => HashKey::Str(s.clone()),
            Value::Tuple(items) => HashKey::Tuple(
                items
                    .iter()
                    .map(HashKey::of)
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            Value::Range(r) => HashKey::Tuple(vec![
                HashKey::Str(Rc::from("range")),
                HashKey::Int(r.start),
                HashKey::Int(r.stop),
                HashKey::Int(r.step),
            ]),
            Value::Function(f) => HashKey::Identity(Rc::as_ptr(f) as *const () as usize),
            Value::Native(f) => HashKey::Identity(Rc::as_ptr(f) as *const () as usize),
            Value::Method(m) => HashKey::Identity(Rc::as_ptr(m) as *const () as usize),
            Value::Object(o) => HashKey::Identity(Arc::as_ptr(o) as *const () as usize),
            Value::Builtin(b) => HashKey::Str(Rc::from(format!("<builtin {}>", b.name()))),
            Value::List(_) | Value::Dict(_) | Value::Set(_) => {
                return Err(RuntimeError::type_error(format!(
                    "unhashable type: '{}'",
                    value.type_name()
                )))
            }
        })
    }
}

/// Insertion-ordered mapping with Python key semantics.
#[derive(Clone, Default)]
pub struct Dict {
    entries: Vec<(Value, Value)>,
    index: HashMap<HashKey, usize>,
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &Value) -> Result<Option<Value>, RuntimeError> {
        let hash = HashKey::of(key)?;
        Ok(self.index.get(&hash).map(|&i| self.entries[i].1.clone()))
    }

    pub fn contains(&self, key: &Value) -> Result<bool, RuntimeError> {
        Ok(self.index.contains_key(&HashKey::of(key)?))
    }

    pub fn insert(&mut self, key: Value, value: Value) -> Result<(), RuntimeError> {
        let hash = HashKey::of(&key)?;
        match self.index.get(&hash) {
            Some(&i) => release(std::mem::replace(&mut self.entries[i].1, value)),
            None => {
                self.index.insert(hash, self.entries.len());
                self.entries.push((key, value));
            }
        }
        Ok(())
    }

    pub fn remove(&mut self, key: &Value) -> Result<Option<Value>, RuntimeError> {
        let hash = HashKey::of(key)?;
        let Some(i) = self.index.remove(&hash) else {
            return Ok(None);
        };
        let (_, value) = self.entries.remove(i);
        for slot in self.index.values_mut() {
            if *slot > i {
                *slot -= 1;
            }
        }
        Ok(Some(value))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    pub fn keys(&self) -> Vec<Value> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.entries.iter().map(|(_, v)| v.clone()).collect()
    }

    pub fn items(&self) -> Vec<(Value, Value)> {
        self.entries.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Value, Value)> {
        self.entries.iter()
    }

    pub fn into_entries(self) -> Vec<(Value, Value)> {
        self.entries
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.repr())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(Rc::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(Rc::from(v))
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::list(v)
    }
}

impl Value {
    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn tuple(items: Vec<Value>) -> Value {
        Value::Tuple(Rc::from(items))
    }

    pub fn dict(dict: Dict) -> Value {
        Value::Dict(Rc::new(RefCell::new(dict)))
    }

    /// Build a dict from string keys, the common case for host adapters.
    pub fn dict_from<K: Into<String>>(pairs: impl IntoIterator<Item = (K, Value)>) -> Value {
        let mut dict = Dict::new();
        for (k, v) in pairs {
            // String keys are always hashable.
            let _ = dict.insert(Value::from(k.into()), v);
        }
        Value::dict(dict)
    }

    pub fn set(dict: Dict) -> Value {
        Value::Set(Rc::new(RefCell::new(dict)))
    }

    pub fn object(object: impl HostObject + 'static) -> Value {
        Value::Object(Arc::new(object))
    }

    /// Convert plain JSON data into fresh script values.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::None,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::from(s.as_str()),
            serde_json::Value::Array(items) => {
                Value::list(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => {
                Value::dict_from(map.iter().map(|(k, v)| (k.clone(), Value::from_json(v))))
            }
        }
    }

    pub fn type_name(&self) -> String {
        match self {
            Value::None => "NoneType".into(),
            Value::Bool(_) => "bool".into(),
            Value::Int(_) => "int".into(),
            Value::Float(_) => "float".into(),
            Value::Str(_) => "str".into(),
            Value::List(_) => "list".into(),
            Value::Tuple(_) => "tuple".into(),
            Value::Dict(_) => "dict".into(),
            Value::Set(_) => "set".into(),
            Value::Range(_) => "range".into(),
            Value::Function(_) => "function".into(),
            Value::Builtin(_) | Value::Native(_) => "builtin_function_or_method".into(),
            Value::Method(_) => "method".into(),
            Value::Object(o) => o.type_name().to_string(),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view, treating `bool` as `int`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    /// Numeric view for arithmetic on mixed int/float operands.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Bool(b) => Some(*b as i64 as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn is_callable(&self) -> bool {
        match self {
            Value::Function(_) | Value::Builtin(_) | Value::Native(_) | Value::Method(_) => true,
            Value::Object(o) => o.is_callable(),
            _ => false,
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            Value::Tuple(items) => !items.is_empty(),
            Value::Dict(d) | Value::Set(d) => !d.borrow().is_empty(),
            Value::Range(r) => !r.is_empty(),
            Value::Object(o) => o.len().map_or(true, |n| n > 0),
            _ => true,
        }
    }

    /// Python `==`.
    pub fn eq_value(&self, other: &Value) -> Result<bool, RuntimeError> {
        self.eq_at(other, 0)
    }

    fn eq_at(&self, other: &Value, depth: usize) -> Result<bool, RuntimeError> {
        if depth > MAX_NESTING {
            return Err(too_deep("in comparison"));
        }
        Ok(match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                Rc::ptr_eq(a, b) || seq_eq(&a.borrow(), &b.borrow(), depth)?
            }
            (Value::Tuple(a), Value::Tuple(b)) => seq_eq(a, b, depth)?,
            (Value::Dict(a), Value::Dict(b)) | (Value::Set(a), Value::Set(b)) => {
                if Rc::ptr_eq(a, b) {
                    return Ok(true);
                }
                let (a, b) = (a.borrow(), b.borrow());
                if a.len() != b.len() {
                    return Ok(false);
                }
                for (k, v) in a.iter() {
                    match b.get(k)? {
                        Some(other) if v.eq_at(&other, depth + 1)? => {}
                        _ => return Ok(false),
                    }
                }
                true
            }
            (Value::Range(a), Value::Range(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            (Value::Method(a), Value::Method(b)) => {
                a.name == b.name && a.receiver.is_same(&b.receiver)
            }
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (a, b) => match (a.as_float(), b.as_float()) {
                (Some(x), Some(y)) => match (a.as_int(), b.as_int()) {
                    (Some(i), Some(j)) => i == j,
                    _ => x == y,
                },
                _ => false,
            },
        })
    }

    /// Python `is`. Immutable scalars compare by value.
    pub fn is_same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Tuple(a), Value::Tuple(b)) => Rc::ptr_eq(a, b),
            (Value::Dict(a), Value::Dict(b)) | (Value::Set(a), Value::Set(b)) => Rc::ptr_eq(a, b),
            (Value::Range(a), Value::Range(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
            (Value::Method(a), Value::Method(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Python ordering for `<`, `sorted`, `min` and `max`.
    pub fn compare(&self, other: &Value, op: &str) -> Result<Ordering, RuntimeError> {
        self.compare_at(other, op, 0)
    }

    fn compare_at(&self, other: &Value, op: &str, depth: usize) -> Result<Ordering, RuntimeError> {
        if depth > MAX_NESTING {
            return Err(too_deep("in comparison"));
        }
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
            (Value::List(a), Value::List(b)) => {
                let (a, b) = (a.borrow().clone(), b.borrow().clone());
                seq_cmp(&a, &b, op, depth)
            }
            (Value::Tuple(a), Value::Tuple(b)) => seq_cmp(a, b, op, depth),
            (a, b) => {
                if let (Some(i), Some(j)) = (a.as_int(), b.as_int()) {
                    return Ok(i.cmp(&j));
                }
                match (a.as_float(), b.as_float()) {
                    // NaN compares false both ways; treat it as equal so sorting stays total.
                    (Some(x), Some(y)) => Ok(x.partial_cmp(&y).unwrap_or(Ordering::Equal)),
                    _ => Err(RuntimeError::type_error(format!(
                        "'{op}' not supported between instances of '{}' and '{}'",
                        a.type_name(),
                        b.type_name()
                    ))),
                }
            }
        }
    }

    /// `str(value)`. Output past [`MAX_NESTING`] levels or [`REPR_LIMIT`]
    /// bytes is elided as `...`.
    pub fn to_str(&self) -> String {
        match self {
            Value::Str(s) => s.to_string(),
            _ => self.repr(),
        }
    }

    /// `repr(value)`, elided the same way as [`Value::to_str`].
    pub fn repr(&self) -> String {
        let mut writer = ReprWriter::new(REPR_LIMIT);
        writer.write(self, 0);
        writer.out
    }

    /// `str(value)` as scripts see it: too deep a value raises `RecursionError`
    /// and too long a rendering exceeds the string limit.
    pub fn try_to_str(&self, budget: &Budget) -> Result<String, RuntimeError> {
        match self {
            Value::Str(s) => Ok(s.to_string()),
            _ => self.try_repr(budget),
        }
    }

    /// `repr(value)` as scripts see it; see [`Value::try_to_str`].
    pub fn try_repr(&self, budget: &Budget) -> Result<String, RuntimeError> {
        let mut writer = ReprWriter::new(budget.limits().max_string_len);
        writer.write(self, 0);
        if writer.too_deep {
            return Err(too_deep("while getting the repr of an object"));
        }
        budget.check_str_len(writer.out.len())?;
        Ok(writer.out)
    }
}

fn too_deep(context: &str) -> RuntimeError {
    RuntimeError::raise(
        "RecursionError",
        format!("maximum recursion depth exceeded {context}"),
    )
}

fn seq_eq(a: &[Value], b: &[Value], depth: usize) -> Result<bool, RuntimeError> {
    if a.len() != b.len() {
        return Ok(false);
    }
    for (x, y) in a.iter().zip(b) {
        if !x.eq_at(y, depth + 1)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn seq_cmp(a: &[Value], b: &[Value], op: &str, depth: usize) -> Result<Ordering, RuntimeError> {
    for (x, y) in a.iter().zip(b) {
        if !x.eq_at(y, depth + 1)? {
            return x.compare_at(y, op, depth + 1);
        }
    }
    Ok(a.len().cmp(&b.len()))
}

/// Index of the first item equal to `needle`.
pub fn find_equal(items: &[Value], needle: &Value) -> Result<Option<usize>, RuntimeError> {
    for (i, item) in items.iter().enumerate() {
        if item.eq_value(needle)? {
            return Ok(Some(i));
        }
    }
    Ok(None)
}

pub fn count_equal(items: &[Value], needle: &Value) -> Result<usize, RuntimeError> {
    let mut count = 0;
    for item in items {
        if item.eq_value(needle)? {
            count += 1;
        }
    }
    Ok(count)
}

/// Drop a value without recursing through nested containers.
///
/// Containers this is the last owner of are emptied onto a worklist, so a
/// list nested hundreds of thousands of levels deep is freed in a loop
/// instead of on the stack. Shared containers only lose a reference.
pub fn release(value: Value) {
    let mut pending = vec![value];
    while let Some(value) = pending.pop() {
        match value {
            Value::List(items) => {
                if let Ok(cell) = Rc::try_unwrap(items) {
                    pending.extend(cell.into_inner());
                }
            }
            Value::Tuple(mut items) => {
                if let Some(slots) = Rc::get_mut(&mut items) {
                    pending.extend(slots.iter_mut().map(|slot| std::mem::replace(slot, Value::None)));
                }
            }
            Value::Dict(dict) | Value::Set(dict) => {
                if let Ok(cell) = Rc::try_unwrap(dict) {
                    for (key, value) in cell.into_inner().into_entries() {
                        pending.push(key);
                        pending.push(value);
                    }
                }
            }
            Value::Method(method) => {
                if let Ok(method) = Rc::try_unwrap(method) {
                    pending.push(method.receiver);
                }
            }
            _ => {}
        }
    }
}

pub fn format_float(v: f64) -> String {
    if v.is_nan() {
        return "nan".into();
    }
    if v.is_infinite() {
        return if v > 0.0 { "inf".into() } else { "-inf".into() };
    }
    let abs = v.abs();
    if abs != 0.0 && !(1e-4..1e16).contains(&abs) {
        // Rust prints `1e-7`; Python prints `1e-07`.
        let formatted = format!("{v:e}");
        return match formatted.split_once('e') {
            Some((mantissa, exp)) => {
                let (sign, digits) = match exp.strip_prefix('-') {
                    Some(d) => ('-', d),
                    None => ('+', exp),
                };
                format!("{mantissa}e{sign}{digits:0>2}")
            }
            None => formatted,
        };
    }
    if v.fract() == 0.0 {
        format!("{v:.1}")
    } else {
        format!("{v}")
    }
}

pub fn quote_str(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_control() => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

struct ReprWriter {
    out: String,
    /// Containers on the current path, for `[...]` on cycles.
    seen: Vec<usize>,
    /// Output length after which remaining values are skipped.
    limit: usize,
    too_deep: bool,
}

impl ReprWriter {
    fn new(limit: usize) -> Self {
        Self {
            out: String::new(),
            seen: Vec::new(),
            limit,
            too_deep: false,
        }
    }

    fn write(&mut self, value: &Value, depth: usize) {
        if self.out.len() > self.limit {
            return;
        }
        if depth > MAX_NESTING {
            self.out.push_str("...");
            self.too_deep = true;
            return;
        }
        match value {
            Value::None => self.out.push_str("None"),
            Value::Bool(true) => self.out.push_str("True"),
            Value::Bool(false) => self.out.push_str("False"),
            Value::Int(i) => {
                let _ = write!(self.out, "{i}");
            }
            Value::Float(f) => self.out.push_str(&format_float(*f)),
            Value::Str(s) => self.out.push_str(&quote_str(s)),
            Value::List(items) => {
                let ptr = Rc::as_ptr(items) as *const () as usize;
                if self.seen.contains(&ptr) {
                    self.out.push_str("[...]");
                    return;
                }
                self.seen.push(ptr);
                self.out.push('[');
                self.write_items(&items.borrow(), depth);
                self.out.push(']');
                self.seen.pop();
            }
            Value::Tuple(items) => {
                self.out.push('(');
                self.write_items(items, depth);
                if items.len() == 1 {
                    self.out.push(',');
                }
                self.out.push(')');
            }
            Value::Dict(dict) => {
                let ptr = Rc::as_ptr(dict) as *const () as usize;
                if self.seen.contains(&ptr) {
                    self.out.push_str("{...}");
                    return;
                }
                self.seen.push(ptr);
                self.out.push('{');
                for (i, (k, v)) in dict.borrow().iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.write(k, depth + 1);
                    self.out.push_str(": ");
                    self.write(v, depth + 1);
                }
                self.out.push('}');
                self.seen.pop();
            }
            Value::Set(set) => {
                let set = set.borrow();
                if set.is_empty() {
                    self.out.push_str("set()");
                    return;
                }
                self.out.push('{');
                self.write_items(&set.keys(), depth);
                self.out.push('}');
            }
            Value::Range(r) => {
                if r.step == 1 {
                    let _ = write!(self.out, "range({}, {})", r.start, r.stop);
                } else {
                    let _ = write!(self.out, "range({}, {}, {})", r.start, r.stop, r.step);
                }
            }
            Value::Function(f) => {
                let _ = write!(self.out, "<function {}>", f.name);
            }
            Value::Builtin(b) => {
                let _ = write!(self.out, "<built-in function {}>", b.name());
            }
            Value::Native(n) => {
                let _ = write!(self.out, "<built-in function {}>", n.name());
            }
            Value::Method(m) => {
                let _ = write!(
                    self.out,
                    "<bound method {}.{}>",
                    m.receiver.type_name(),
                    m.name
                );
            }
            Value::Object(o) => self.out.push_str(&o.repr()),
        }
    }

    fn write_items(&mut self, items: &[Value], depth: usize) {
        for (i, item) in items.iter().enumerate() {
            if self.out.len() > self.limit {
                self.out.push_str("...");
                return;
            }
            if i > 0 {
                self.out.push_str(", ");
            }
            self.write(item, depth + 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repr_matches_python() {
        assert_eq!(Value::Float(1.0).repr(), "1.0");
        assert_eq!(Value::Float(0.1).repr(), "0.1");
        assert_eq!(Value::Float(1e-7).repr(), "1e-07");
        assert_eq!(Value::Float(1e20).repr(), "1e+20");
        assert_eq!(Value::from("it's").repr(), "\"it's\"");
        assert_eq!(Value::tuple(vec![Value::Int(1)]).repr(), "(1,)");
        assert_eq!(
            Value::dict_from([("a", Value::Int(1)), ("b", Value::None)]).repr(),
            "{'a': 1, 'b': None}"
        );
        assert_eq!(Value::set(Dict::new()).repr(), "set()");
    }

    #[test]
    fn test_cyclic_list_repr() {
        let list = Value::list(vec![Value::Int(1)]);
        if let Value::List(items) = &list {
            items.borrow_mut().push(list.clone());
        }
        assert_eq!(list.repr(), "[1, [...]]");
        // Break the cycle so the test does not leak.
        if let Value::List(items) = &list {
            items.borrow_mut().clear();
        }
    }

    #[test]
    fn test_cyclic_equality_is_bounded() {
        let cycle = || {
            let list = Value::list(vec![]);
            if let Value::List(items) = &list {
                items.borrow_mut().push(list.clone());
            }
            list
        };
        let (a, b) = (cycle(), cycle());
        assert!(a.eq_value(&a).unwrap());
        let err = a.eq_value(&b).unwrap_err();
        assert_eq!(err.kind(), Some("RecursionError"));
        assert_eq!(err.to_string(), "maximum recursion depth exceeded in comparison");
        assert_eq!(a.compare(&b, "<").unwrap_err().kind(), Some("RecursionError"));
        for list in [a, b] {
            if let Value::List(items) = &list {
                items.borrow_mut().clear();
            }
        }
    }

    #[test]
    fn test_deep_repr_is_truncated() {
        let mut value = Value::Int(0);
        for _ in 0..MAX_NESTING + 10 {
            value = Value::list(vec![value]);
        }
        let text = value.repr();
        assert!(text.starts_with("[[[["));
        assert!(text.contains("..."));
        assert!(!text.contains('0'));
        release(value);
    }

    #[test]
    fn test_numeric_equality_and_hashing() {
        assert!(Value::Int(1).eq_value(&Value::Float(1.0)).unwrap());
        assert!(Value::Bool(true).eq_value(&Value::Int(1)).unwrap());
        assert_eq!(
            HashKey::of(&Value::Float(2.0)).unwrap(),
            HashKey::of(&Value::Int(2)).unwrap()
        );
        assert!(HashKey::of(&Value::list(vec![])).is_err());
    }

    #[test]
    fn test_dict_preserves_insertion_order_on_remove() {
        let mut dict = Dict::new();
        for (i, key) in ["a", "b", "c"].into_iter().enumerate() {
            dict.insert(Value::from(key), Value::Int(i as i64)).unwrap();
        }
        assert!(dict.remove(&Value::from("a")).unwrap().is_some());
        dict.insert(Value::from("d"), Value::Int(3)).unwrap();
        let keys: Vec<String> = dict.keys().iter().map(Value::to_str).collect();
        assert_eq!(keys, vec!["b", "c", "d"]);
        assert_eq!(dict.get(&Value::from("c")).unwrap().and_then(|v| v.as_int()), Some(2));
    }

    #[test]
    fn test_compare_type_error() {
        let err = Value::Int(1).compare(&Value::from("a"), "<").unwrap_err();
        assert_eq!(
            err.to_string(),
            "'<' not supported between instances of 'int' and 'str'"
        );
    }

    #[test]
    fn test_range_len_and_contains() {
        let r = Range { start: 0, stop: 10, step: 3 };
        assert_eq!(r.len(), 4);
        let full = Range { start: i64::MIN, stop: i64::MAX, step: 1 };
        assert_eq!(full.len() as u64, u64::MAX);
        assert!(full.contains(i64::MAX - 1));
        assert_eq!(full.get((u64::MAX - 1) as usize), Some(i64::MAX - 1));
        let wide = Range { start: i64::MIN, stop: i64::MAX, step: i64::MAX };
        assert!(wide.contains(i64::MAX - 1));
        assert!(!wide.contains(0));
        assert!(r.contains(9));
        assert!(!r.contains(10));
        let down = Range { start: 5, stop: 0, step: -2 };
        assert_eq!(down.len(), 3);
        assert_eq!(down.get(2), Some(1));
    }

    #[test]
    fn test_float_to_int_bounds() {
        assert_eq!(float_to_int(-9.223_372_036_854_775_808e18).unwrap(), i64::MIN);
        assert_eq!(float_to_int(1e18).unwrap(), 1_000_000_000_000_000_000);
        let err = float_to_int(9.223_372_036_854_775_808e18).unwrap_err();
        assert_eq!(err.to_string(), "int too large to convert");
        let err = float_to_int(f64::NEG_INFINITY).unwrap_err();
        assert_eq!(err.kind(), Some("OverflowError"));
        assert_eq!(err.to_string(), "cannot convert float infinity to integer");
        assert_eq!(float_to_int(f64::NAN).unwrap_err().kind(), Some("ValueError"));
    }

    #[test]
    fn test_from_json() {
        let value = Value::from_json(&serde_json::json!({"n": 1, "f": 1.5, "l": [true, null]}));
        assert_eq!(value.repr(), "{'n': 1, 'f': 1.5, 'l': [True, None]}");
    }
}
