//! The seam between scripts and the objects a caller injects.
//!
//! A caller exposes an SDK client, a configuration handle or a helper module
//! by implementing [`HostObject`]. Every hook has a default, so an adapter only
//! implements what its object supports. The structured-export capability is
//! [`HostObject::export`]: objects that can describe themselves as plain data
//! serialize losslessly, everything else falls back to its `repr`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{HostError, RuntimeError};
use crate::script::value::Value;

/// Arguments of a call, as seen by host code.
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    pub positional: Vec<Value>,
    pub keywords: Vec<(String, Value)>,
}

impl CallArgs {
    pub fn new(positional: Vec<Value>) -> Self {
        Self {
            positional,
            keywords: Vec::new(),
        }
    }

    pub fn with_keyword(mut self, name: impl Into<String>, value: Value) -> Self {
        self.keywords.push((name.into(), value));
        self
    }

    pub fn len(&self) -> usize {
        self.positional.len() + self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keyword(&self, name: &str) -> Option<&Value> {
        self.keywords
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    /// Positional argument `index`, or the keyword argument `name`.
    pub fn get(&self, index: usize, name: &str) -> Option<&Value> {
        self.positional.get(index).or_else(|| self.keyword(name))
    }

    pub fn require(&self, index: usize, name: &str) -> Result<&Value, HostError> {
        self.get(index, name).ok_or_else(|| {
            HostError::new(
                "TypeError",
                format!("missing required argument: '{name}'"),
            )
        })
    }

    pub fn require_str(&self, index: usize, name: &str) -> Result<&str, HostError> {
        let value = self.require(index, name)?;
        value.as_str().ok_or_else(|| {
            HostError::new(
                "TypeError",
                format!("argument '{name}' must be str, not {}", value.type_name()),
            )
        })
    }

    /// Reject keyword arguments outside `allowed`.
    pub fn check_keywords(&self, function: &str, allowed: &[&str]) -> Result<(), HostError> {
        for (name, _) in &self.keywords {
            if !allowed.contains(&name.as_str()) {
                return Err(HostError::new(
                    "TypeError",
                    format!("{function}() got an unexpected keyword argument '{name}'"),
                ));
            }
        }
        Ok(())
    }
}

/// An opaque object made available to scripts.
///
/// Implementations are shared by every invocation of a sandbox, possibly from
/// several threads at once, so any interior mutability must be synchronized.
pub trait HostObject: Send + Sync {
    /// Name reported by `type(...)`-style messages.
    fn type_name(&self) -> &str;

    /// Attribute lookup. `Ok(None)` means "no such attribute" unless
    /// [`has_method`](HostObject::has_method) claims the name.
    fn get_attr(&self, _name: &str) -> Result<Option<Value>, HostError> {
        Ok(None)
    }

    fn set_attr(&self, name: &str, _value: Value) -> Result<(), HostError> {
        Err(HostError::new(
            "AttributeError",
            format!("'{}' object attribute '{name}' is read-only", self.type_name()),
        ))
    }

    fn has_method(&self, _name: &str) -> bool {
        false
    }

    fn call_method(&self, name: &str, _args: &CallArgs) -> Result<Value, HostError> {
        Err(HostError::new(
            "AttributeError",
            format!("'{}' object has no attribute '{name}'", self.type_name()),
        ))
    }

    fn is_callable(&self) -> bool {
        false
    }

    fn call(&self, _args: &CallArgs) -> Result<Value, HostError> {
        Err(HostError::new(
            "TypeError",
            format!("'{}' object is not callable", self.type_name()),
        ))
    }

    /// `obj[key]`.
    fn get_item(&self, _key: &Value) -> Result<Value, HostError> {
        Err(HostError::new(
            "TypeError",
            format!("'{}' object is not subscriptable", self.type_name()),
        ))
    }

    /// Items produced by `for x in obj`, or `None` if not iterable.
    fn iterate(&self) -> Option<Result<Vec<Value>, HostError>> {
        None
    }

    fn len(&self) -> Option<usize> {
        None
    }

    /// Structured-export capability: a plain dict/list/primitive view of the object.
    fn export(&self) -> Option<Result<Value, HostError>> {
        None
    }

    fn repr(&self) -> String {
        format!("<{} object>", self.type_name())
    }
}

type SharedFn = dyn Fn(&CallArgs) -> Result<Value, HostError> + Send + Sync;
type LocalFn = dyn Fn(&CallArgs) -> Result<Value, RuntimeError>;

/// A callable implemented in Rust.
///
/// Shared functions come from the execution context and live as long as the
/// sandbox; local ones are created while a script runs (e.g. the callable
/// returned by `operator.itemgetter`).
pub struct NativeFunction {
    name: String,
    func: NativeImpl,
}

enum NativeImpl {
    Shared(Arc<SharedFn>),
    Local(Box<LocalFn>),
}

impl NativeFunction {
    pub fn local(
        name: impl Into<String>,
        func: impl Fn(&CallArgs) -> Result<Value, RuntimeError> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            func: NativeImpl::Local(Box::new(func)),
        }
    }

    pub(crate) fn shared(name: impl Into<String>, func: Arc<SharedFn>) -> Self {
        Self {
            name: name.into(),
            func: NativeImpl::Shared(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, args: &CallArgs) -> Result<Value, RuntimeError> {
        match &self.func {
            NativeImpl::Shared(f) => f(args).map_err(RuntimeError::from),
            NativeImpl::Local(f) => f(args),
        }
    }
}

/// An entry of the execution context or of a [`HostModule`].
#[derive(Clone)]
pub enum ContextValue {
    /// Plain data, materialized as fresh script values on every invocation.
    Data(serde_json::Value),
    /// A shared host object, passed by reference.
    Object(Arc<dyn HostObject>),
    /// A shared native function.
    Function(Arc<SharedFn>),
}

impl ContextValue {
    pub fn function(
        f: impl Fn(&CallArgs) -> Result<Value, HostError> + Send + Sync + 'static,
    ) -> Self {
        ContextValue::Function(Arc::new(f))
    }

    pub fn object(object: impl HostObject + 'static) -> Self {
        ContextValue::Object(Arc::new(object))
    }

    /// Materialize the entry for one invocation.
    pub fn to_value(&self, name: &str) -> Value {
        match self {
            ContextValue::Data(json) => Value::from_json(json),
            ContextValue::Object(object) => Value::Object(Arc::clone(object)),
            ContextValue::Function(f) => {
                Value::Native(std::rc::Rc::new(NativeFunction::shared(name, Arc::clone(f))))
            }
        }
    }
}

impl fmt::Debug for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextValue::Data(json) => f.debug_tuple("Data").field(json).finish(),
            ContextValue::Object(object) => f.debug_tuple("Object").field(&object.repr()).finish(),
            ContextValue::Function(_) => f.write_str("Function(..)"),
        }
    }
}

impl From<serde_json::Value> for ContextValue {
    fn from(json: serde_json::Value) -> Self {
        ContextValue::Data(json)
    }
}

impl From<Arc<dyn HostObject>> for ContextValue {
    fn from(object: Arc<dyn HostObject>) -> Self {
        ContextValue::Object(object)
    }
}

/// A named table of members, importable by scripts.
#[derive(Debug, Clone)]
pub struct HostModule {
    name: String,
    members: BTreeMap<String, ContextValue>,
}

impl HostModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, member: impl Into<ContextValue>) -> Self {
        self.members.insert(name.into(), member.into());
        self
    }

    pub fn with_function(
        self,
        name: impl Into<String>,
        f: impl Fn(&CallArgs) -> Result<Value, HostError> + Send + Sync + 'static,
    ) -> Self {
        self.with(name, ContextValue::function(f))
    }

    pub fn with_submodule(self, module: HostModule) -> Self {
        let name = module.name.rsplit('.').next().unwrap_or(&module.name).to_string();
        self.with(name, ContextValue::object(module))
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl HostObject for HostModule {
    fn type_name(&self) -> &str {
        "module"
    }

    fn get_attr(&self, name: &str) -> Result<Option<Value>, HostError> {
        Ok(self.members.get(name).map(|member| member.to_value(name)))
    }

    fn repr(&self) -> String {
        format!("<module '{}'>", self.name)
    }
}
