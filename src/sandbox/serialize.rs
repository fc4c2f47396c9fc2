//! Conversion of script values into JSON payloads.
//!
//! The same walker backs both the result payload and `json.dumps`: the
//! payload coerces unsupported values to strings and flags the result as
//! lossy, while `json.dumps` rejects them.

use std::io;
use std::rc::Rc;
use std::sync::Arc;

use serde::Serialize;
use serde_json::ser::{Formatter, PrettyFormatter};
use serde_json::{Map, Number};
use thiserror::Error;

use crate::error::{HostError, SandboxError};
use crate::sandbox::namespace::OutputSlot;
use crate::script::value::{format_float, release, Value};

/// Containers nested deeper than this are rejected.
pub const MAX_DEPTH: usize = 256;

/// What to do with a value that has no JSON representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    /// Use its string form and mark the output lossy.
    Coerce,
    /// Fail with [`ExportError::Unsupported`].
    Reject,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExportError {
    #[error("Circular reference detected")]
    Cycle,

    #[error("nesting exceeds {0} levels")]
    TooDeep(usize),

    #[error("keys must be str, int, float, bool or None, not {0}")]
    InvalidKey(String),

    #[error("Object of type {0} is not JSON serializable")]
    Unsupported(String),

    #[error("Out of range float values are not JSON compliant")]
    NonFinite,

    #[error("{}", .0.message)]
    Host(HostError),
}

/// Walks a value graph and builds its JSON form.
#[derive(Debug)]
pub struct Exporter {
    fallback: Fallback,
    lossy: bool,
    active: Vec<usize>,
}

impl Exporter {
    pub fn new(fallback: Fallback) -> Self {
        Self {
            fallback,
            lossy: false,
            active: Vec::new(),
        }
    }

    /// Whether any value was coerced to a string so far.
    pub fn is_lossy(&self) -> bool {
        self.lossy
    }

    pub fn export(&mut self, value: &Value) -> Result<serde_json::Value, ExportError> {
        self.export_at(value, 0)
    }

    fn enter(&mut self, id: usize) -> Result<(), ExportError> {
        if self.active.contains(&id) {
            return Err(ExportError::Cycle);
        }
        self.active.push(id);
        Ok(())
    }

    fn leave(&mut self) {
        self.active.pop();
    }

    fn export_at(&mut self, value: &Value, depth: usize) -> Result<serde_json::Value, ExportError> {
        if depth > MAX_DEPTH {
            return Err(ExportError::TooDeep(MAX_DEPTH));
        }
        Ok(match value {
            Value::None => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::Number((*i).into()),
            Value::Float(f) => match Number::from_f64(*f) {
                Some(n) => serde_json::Value::Number(n),
                None => match self.fallback {
                    Fallback::Coerce => {
                        self.lossy = true;
                        serde_json::Value::String(format_float(*f))
                    }
                    Fallback::Reject => return Err(ExportError::NonFinite),
                },
            },
            Value::Str(s) => serde_json::Value::String(s.to_string()),
            Value::List(items) => {
                self.enter(Rc::as_ptr(items) as *const () as usize)?;
                let items = items.borrow().clone();
                let out = self.export_items(&items, depth);
                self.leave();
                out?
            }
            Value::Tuple(items) => self.export_items(items, depth)?,
            Value::Set(set) => {
                if self.fallback == Fallback::Reject {
                    return Err(ExportError::Unsupported("set".into()));
                }
                let keys = set.borrow().keys();
                self.export_items(&keys, depth)?
            }
            Value::Dict(dict) => {
                self.enter(Rc::as_ptr(dict) as *const () as usize)?;
                let entries = dict.borrow().items();
                let out = self.export_entries(&entries, depth);
                self.leave();
                out?
            }
            Value::Object(object) => match object.export() {
                Some(Ok(exported)) => {
                    self.enter(Arc::as_ptr(object) as *const () as usize)?;
                    let out = self.export_at(&exported, depth + 1);
                    self.leave();
                    out?
                }
                Some(Err(err)) => return Err(ExportError::Host(err)),
                None => self.fallback(value)?,
            },
            Value::Range(_)
            | Value::Function(_)
            | Value::Builtin(_)
            | Value::Native(_)
            | Value::Method(_) => self.fallback(value)?,
        })
    }

    fn export_items(
        &mut self,
        items: &[Value],
        depth: usize,
    ) -> Result<serde_json::Value, ExportError> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            out.push(self.export_at(item, depth + 1)?);
        }
        Ok(serde_json::Value::Array(out))
    }

    fn export_entries(
        &mut self,
        entries: &[(Value, Value)],
        depth: usize,
    ) -> Result<serde_json::Value, ExportError> {
        let mut map = Map::with_capacity(entries.len());
        for (key, value) in entries {
            map.insert(key_string(key)?, self.export_at(value, depth + 1)?);
        }
        Ok(serde_json::Value::Object(map))
    }

    fn fallback(&mut self, value: &Value) -> Result<serde_json::Value, ExportError> {
        match self.fallback {
            Fallback::Coerce => {
                self.lossy = true;
                Ok(serde_json::Value::String(value.to_str()))
            }
            Fallback::Reject => Err(ExportError::Unsupported(value.type_name())),
        }
    }
}

/// Dict keys follow Python's `json` module.
fn key_string(key: &Value) -> Result<String, ExportError> {
    Ok(match key {
        Value::Str(s) => s.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Bool(true) => "true".into(),
        Value::Bool(false) => "false".into(),
        Value::None => "null".into(),
        Value::Float(f) if f.is_nan() => "NaN".into(),
        Value::Float(f) if f.is_infinite() => String::from(if *f > 0.0 {
            "Infinity"
        } else {
            "-Infinity"
        }),
        Value::Float(f) => format_float(*f),
        other => return Err(ExportError::InvalidKey(other.type_name())),
    })
}

/// Compact output with Python's default `", "` and `": "` separators.
struct PythonFormatter;

impl Formatter for PythonFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

/// Render JSON text the way Python's `json.dumps` lays it out.
pub fn to_json_text(value: &serde_json::Value, indent: Option<&str>) -> serde_json::Result<String> {
    let mut out = Vec::new();
    match indent {
        None => value.serialize(&mut serde_json::Serializer::with_formatter(
            &mut out,
            PythonFormatter,
        ))?,
        Some(indent) => value.serialize(&mut serde_json::Serializer::with_formatter(
            &mut out,
            PrettyFormatter::with_indent(indent.as_bytes()),
        ))?,
    }
    // Serializer output is always valid UTF-8.
    Ok(String::from_utf8_lossy(&out).into_owned())
}

/// A successfully serialized result.
#[derive(Debug, Clone, PartialEq)]
pub struct Serialized {
    pub value: serde_json::Value,
    /// Set when part of the result was coerced to a string.
    pub lossy: bool,
}

impl Serialized {
    /// `{"result": ...}`, with `"lossy": true` when coercion happened.
    pub fn payload(&self) -> serde_json::Value {
        let mut map = Map::new();
        map.insert("result".into(), self.value.clone());
        if self.lossy {
            map.insert("lossy".into(), serde_json::Value::Bool(true));
        }
        serde_json::Value::Object(map)
    }

    pub fn to_json_string(&self) -> String {
        render(&self.payload())
    }
}

/// `{"error": message}`.
pub fn error_payload(message: &str) -> String {
    let mut map = Map::new();
    map.insert("error".into(), serde_json::Value::String(message.to_string()));
    render(&serde_json::Value::Object(map))
}

fn render(payload: &serde_json::Value) -> String {
    // Formatting a `serde_json::Value` into memory cannot fail.
    to_json_text(payload, None).unwrap_or_else(|_| payload.to_string())
}

/// Turn the extracted output slot into a payload.
pub fn serialize(slot: OutputSlot, output: &str) -> Result<Serialized, SandboxError> {
    let value = match slot {
        OutputSlot::Unset => {
            return Err(SandboxError::MissingResult {
                output: output.to_string(),
            })
        }
        OutputSlot::Bound(Value::None) => return Err(SandboxError::NullResult),
        OutputSlot::Bound(value) => value,
    };
    let mut exporter = Exporter::new(Fallback::Coerce);
    let exported = exporter.export(&value);
    release(value);
    let json = exported.map_err(|e| SandboxError::Unserializable(e.to_string()))?;
    Ok(Serialized {
        value: json,
        lossy: exporter.is_lossy(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::host::HostObject;
    use serde_json::json;

    struct Instance {
        exportable: bool,
    }

    impl HostObject for Instance {
        fn type_name(&self) -> &str {
            "Instance"
        }

        fn export(&self) -> Option<Result<Value, HostError>> {
            self.exportable.then(|| {
                Ok(Value::dict_from([
                    ("id", Value::from("ocid1.instance")),
                    ("cpus", Value::Int(4)),
                ]))
            })
        }
    }

    fn bound(value: Value) -> Result<Serialized, SandboxError> {
        serialize(OutputSlot::Bound(value), "result")
    }

    #[test]
    fn test_slot_states() {
        assert_eq!(
            serialize(OutputSlot::Unset, "result").unwrap_err(),
            SandboxError::MissingResult {
                output: "result".into()
            }
        );
        assert_eq!(bound(Value::None).unwrap_err(), SandboxError::NullResult);
    }

    #[test]
    fn test_containers_serialize_structurally() {
        let value = Value::dict_from([
            ("names", Value::list(vec!["a".into(), "b".into()])),
            ("pair", Value::tuple(vec![Value::Int(1), Value::Float(0.5)])),
        ]);
        let out = bound(value).unwrap();
        assert!(!out.lossy);
        assert_eq!(out.value, json!({"names": ["a", "b"], "pair": [1, 0.5]}));
    }

    #[test]
    fn test_exported_object() {
        let out = bound(Value::object(Instance { exportable: true })).unwrap();
        assert_eq!(out.value, json!({"id": "ocid1.instance", "cpus": 4}));
        assert!(!out.lossy);
    }

    #[test]
    fn test_opaque_object_is_coerced() {
        let out = bound(Value::object(Instance { exportable: false })).unwrap();
        assert_eq!(out.value, json!("<Instance object>"));
        assert!(out.lossy);
        assert_eq!(
            out.to_json_string(),
            r#"{"result": "<Instance object>", "lossy": true}"#
        );
    }

    #[test]
    fn test_non_finite_float_is_coerced() {
        let out = bound(Value::Float(f64::NAN)).unwrap();
        assert_eq!(out.value, json!("nan"));
        assert!(out.lossy);
    }

    #[test]
    fn test_cycle_is_unserializable() {
        let list = Value::list(vec![]);
        if let Value::List(items) = &list {
            items.borrow_mut().push(list.clone());
        }
        let err = bound(list.clone()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Result could not be serialized: Circular reference detected"
        );
        if let Value::List(items) = &list {
            items.borrow_mut().clear();
        }
    }

    #[test]
    fn test_shared_reference_is_not_a_cycle() {
        let shared = Value::list(vec![Value::Int(1)]);
        let out = bound(Value::list(vec![shared.clone(), shared])).unwrap();
        assert_eq!(out.value, json!([[1], [1]]));
    }

    #[test]
    fn test_dict_keys_follow_python_rules() {
        let mut dict = crate::script::value::Dict::new();
        dict.insert(Value::Int(1), Value::from("one")).unwrap();
        dict.insert(Value::Bool(true), Value::from("yes")).unwrap();
        dict.insert(Value::None, Value::from("none")).unwrap();
        dict.insert(Value::Float(2.5), Value::from("x")).unwrap();
        // `True` hashes like `1`, so it overwrote the value under key 1.
        let out = bound(Value::dict(dict)).unwrap();
        assert_eq!(out.value, json!({"1": "yes", "null": "none", "2.5": "x"}));

        let mut bad = crate::script::value::Dict::new();
        bad.insert(Value::tuple(vec![Value::Int(1)]), Value::None).unwrap();
        let err = bound(Value::dict(bad)).unwrap_err();
        assert!(matches!(err, SandboxError::Unserializable(_)));
    }

    #[test]
    fn test_reject_mode() {
        let mut exporter = Exporter::new(Fallback::Reject);
        let err = exporter.export(&Value::Float(f64::INFINITY)).unwrap_err();
        assert_eq!(err, ExportError::NonFinite);
        let err = exporter
            .export(&Value::object(Instance { exportable: false }))
            .unwrap_err();
        assert_eq!(err.to_string(), "Object of type Instance is not JSON serializable");
    }

    #[test]
    fn test_error_payload() {
        assert_eq!(error_payload("Result cannot be None"), r#"{"error": "Result cannot be None"}"#);
    }
}
