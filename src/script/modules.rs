//! Importable modules: the registry and the helper modules shipped by default.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::error::{HostError, RuntimeError};
use crate::sandbox::serialize::{to_json_text, ExportError, Exporter, Fallback};
use crate::script::host::{CallArgs, HostModule, HostObject, NativeFunction};
use crate::script::ops;
use crate::script::value::{float_to_int, Value};

/// Modules a script may import, keyed by dotted name.
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    modules: BTreeMap<String, Arc<dyn HostObject>>,
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.modules.keys()).finish()
    }
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding `json`, `math` and `operator`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(json_module());
        registry.register(math_module());
        registry.register(operator_module());
        registry
    }

    pub fn register(&mut self, module: HostModule) {
        let name = module.name().to_string();
        self.modules.insert(name, Arc::new(module));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    /// Resolve a dotted module path to its module object.
    ///
    /// An exact registration wins; otherwise the longest registered prefix is
    /// looked up and the remaining components are walked as attributes.
    pub fn resolve(&self, path: &str) -> Result<Value, RuntimeError> {
        let not_found = || {
            RuntimeError::raise("ModuleNotFoundError", format!("No module named '{path}'"))
        };
        if let Some(module) = self.modules.get(path) {
            return Ok(Value::Object(Arc::clone(module)));
        }
        let parts: Vec<&str> = path.split('.').collect();
        for split in (1..parts.len()).rev() {
            let prefix = parts[..split].join(".");
            let Some(module) = self.modules.get(&prefix) else {
                continue;
            };
            let mut current = Value::Object(Arc::clone(module));
            for part in &parts[split..] {
                let next = match &current {
                    Value::Object(object) => object.get_attr(part)?,
                    _ => None,
                };
                match next {
                    Some(value @ Value::Object(_)) => current = value,
                    _ => return Err(not_found()),
                }
            }
            return Ok(current);
        }
        Err(not_found())
    }
}

fn json_error(err: ExportError) -> HostError {
    match err {
        ExportError::Host(host) => host,
        other @ (ExportError::Unsupported(_) | ExportError::InvalidKey(_)) => {
            HostError::new("TypeError", other.to_string())
        }
        other => HostError::new("ValueError", other.to_string()),
    }
}

fn sort_keys(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut entries: Vec<(String, serde_json::Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            serde_json::Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, sort_keys(v)))
                    .collect(),
            )
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(sort_keys).collect())
        }
        other => other,
    }
}

/// Widest `indent` `json.dumps` accepts; the indent is repeated per nesting level.
const MAX_INDENT: usize = 1024;

fn indent_too_wide() -> HostError {
    HostError::new(
        "ValueError",
        format!("indent must be at most {MAX_INDENT} characters"),
    )
}

/// `json.dumps(obj, indent=None, sort_keys=False)`.
fn json_dumps(args: &CallArgs) -> Result<Value, HostError> {
    args.check_keywords("dumps", &["indent", "sort_keys"])?;
    let value = args.require(0, "obj")?;
    let mut json = Exporter::new(Fallback::Reject)
        .export(value)
        .map_err(json_error)?;
    if args.keyword("sort_keys").is_some_and(Value::truthy) {
        json = sort_keys(json);
    }
    let indent = match args.keyword("indent") {
        Some(Value::None) | None => None,
        Some(Value::Str(s)) if s.len() <= MAX_INDENT => Some(s.to_string()),
        Some(Value::Str(_)) => return Err(indent_too_wide()),
        Some(other) => {
            let width = other.as_int().unwrap_or(0).max(0);
            if width > MAX_INDENT as i64 {
                return Err(indent_too_wide());
            }
            Some(" ".repeat(width as usize))
        }
    };
    let text = to_json_text(&json, indent.as_deref())
        .map_err(|e| HostError::new("ValueError", e.to_string()))?;
    Ok(Value::from(text))
}

/// `json.loads(s)`.
fn json_loads(args: &CallArgs) -> Result<Value, HostError> {
    args.check_keywords("loads", &[])?;
    let text = args.require_str(0, "s")?;
    let parsed: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| HostError::new("JSONDecodeError", e.to_string()))?;
    Ok(Value::from_json(&parsed))
}

pub fn json_module() -> HostModule {
    HostModule::new("json")
        .with_function("dumps", json_dumps)
        .with_function("loads", json_loads)
}

fn number(args: &CallArgs, index: usize, name: &str) -> Result<f64, HostError> {
    let value = args.require(index, name)?;
    value.as_float().ok_or_else(|| {
        HostError::new(
            "TypeError",
            format!("must be real number, not {}", value.type_name()),
        )
    })
}

/// Integral arguments pass through `floor`/`ceil` unchanged.
fn rounding(args: &CallArgs, round: fn(f64) -> f64) -> Result<Value, HostError> {
    let value = args.require(0, "x")?;
    if let Some(i) = value.as_int() {
        return Ok(Value::Int(i));
    }
    Ok(Value::Int(float_to_int(round(number(args, 0, "x")?))?))
}

pub fn math_module() -> HostModule {
    HostModule::new("math")
        .with("pi", serde_json::json!(std::f64::consts::PI))
        .with("e", serde_json::json!(std::f64::consts::E))
        .with_function("floor", |args| rounding(args, f64::floor))
        .with_function("ceil", |args| rounding(args, f64::ceil))
        .with_function("sqrt", |args| {
            let x = number(args, 0, "x")?;
            if x < 0.0 {
                return Err(HostError::new("ValueError", "math domain error"));
            }
            Ok(Value::Float(x.sqrt()))
        })
        .with_function("pow", |args| {
            let (x, y) = (number(args, 0, "x")?, number(args, 1, "y")?);
            let result = x.powf(y);
            if result.is_nan() && !x.is_nan() && !y.is_nan() {
                return Err(HostError::new("ValueError", "math domain error"));
            }
            Ok(Value::Float(result))
        })
        .with_function("fabs", |args| Ok(Value::Float(number(args, 0, "x")?.abs())))
}

/// `operator.itemgetter(*items)`.
fn itemgetter(args: &CallArgs) -> Result<Value, HostError> {
    if args.positional.is_empty() {
        return Err(HostError::new("TypeError", "itemgetter expected 1 argument, got 0"));
    }
    let items = args.positional.clone();
    let getter = NativeFunction::local("itemgetter", move |call: &CallArgs| {
        let target = call.require(0, "obj")?;
        if let [item] = items.as_slice() {
            return ops::get_item(target, item);
        }
        let picked = items
            .iter()
            .map(|item| ops::get_item(target, item))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Value::tuple(picked))
    });
    Ok(Value::Native(Rc::new(getter)))
}

/// `operator.attrgetter(*names)`; names may be dotted.
fn attrgetter(args: &CallArgs) -> Result<Value, HostError> {
    if args.positional.is_empty() {
        return Err(HostError::new("TypeError", "attrgetter expected 1 argument, got 0"));
    }
    let mut names = Vec::with_capacity(args.positional.len());
    for value in &args.positional {
        let name = value
            .as_str()
            .ok_or_else(|| HostError::new("TypeError", "attribute name must be a string"))?;
        names.push(name.split('.').map(String::from).collect::<Vec<_>>());
    }
    let getter = NativeFunction::local("attrgetter", move |call: &CallArgs| {
        let target = call.require(0, "obj")?;
        let fetch = |path: &Vec<String>| {
            path.iter()
                .try_fold(target.clone(), |current, part| ops::get_attr(&current, part))
        };
        if let [path] = names.as_slice() {
            return fetch(path);
        }
        let picked = names.iter().map(fetch).collect::<Result<Vec<_>, _>>()?;
        Ok(Value::tuple(picked))
    });
    Ok(Value::Native(Rc::new(getter)))
}

pub fn operator_module() -> HostModule {
    HostModule::new("operator")
        .with_function("itemgetter", itemgetter)
        .with_function("attrgetter", attrgetter)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(module: &HostModule, name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let Some(Value::Native(f)) = module.get_attr(name).unwrap() else {
            panic!("{name} is not a function");
        };
        f.call(&CallArgs::new(args))
    }

    #[test]
    fn test_dumps_uses_python_separators() {
        let value = Value::dict_from([
            ("b", Value::list(vec![Value::Int(1), Value::Float(2.5)])),
            ("a", Value::None),
        ]);
        let text = call(&json_module(), "dumps", vec![value.clone()]).unwrap();
        assert_eq!(text.as_str(), Some(r#"{"b": [1, 2.5], "a": null}"#));

        let sorted = json_dumps(
            &CallArgs::new(vec![value]).with_keyword("sort_keys", Value::Bool(true)),
        )
        .unwrap();
        assert_eq!(sorted.as_str(), Some(r#"{"a": null, "b": [1, 2.5]}"#));
    }

    #[test]
    fn test_dumps_with_indent() {
        let args = CallArgs::new(vec![Value::dict_from([("a", Value::Int(1))])])
            .with_keyword("indent", Value::Int(2));
        assert_eq!(json_dumps(&args).unwrap().as_str(), Some("{\n  \"a\": 1\n}"));
    }

    #[test]
    fn test_dumps_rejects_functions() {
        let module = math_module();
        let sqrt = module.get_attr("sqrt").unwrap().unwrap();
        let err = json_dumps(&CallArgs::new(vec![sqrt])).unwrap_err();
        assert_eq!(err.kind, "TypeError");
        assert!(err.message.contains("is not JSON serializable"));
    }

    #[test]
    fn test_dumps_rejects_oversized_indent() {
        let list = Value::list(vec![Value::Int(1)]);
        let dumps = |indent: Value| {
            json_dumps(&CallArgs::new(vec![list.clone()]).with_keyword("indent", indent))
        };
        assert_eq!(dumps(Value::Int(2)).unwrap().as_str(), Some("[\n  1\n]"));
        let err = dumps(Value::Int(i64::MAX)).unwrap_err();
        assert_eq!(err.kind, "ValueError");
        assert_eq!(err.message, "indent must be at most 1024 characters");
        assert!(dumps(Value::from("x".repeat(2048))).is_err());
    }

    #[test]
    fn test_loads() {
        let value = call(&json_module(), "loads", vec![r#"{"x": [1, "two"]}"#.into()]).unwrap();
        assert_eq!(value.repr(), "{'x': [1, 'two']}");
        let err = call(&json_module(), "loads", vec!["{".into()]).unwrap_err();
        assert_eq!(err.kind(), Some("JSONDecodeError"));
    }

    #[test]
    fn test_math() {
        let math = math_module();
        assert_eq!(call(&math, "floor", vec![Value::Float(-1.5)]).unwrap().as_int(), Some(-2));
        assert_eq!(call(&math, "ceil", vec![Value::Float(1.2)]).unwrap().as_int(), Some(2));
        assert_eq!(call(&math, "sqrt", vec![Value::Int(9)]).unwrap().as_float(), Some(3.0));
        let err = call(&math, "sqrt", vec![Value::Int(-1)]).unwrap_err();
        assert_eq!(err.to_string(), "math domain error");
        let err = call(&math, "floor", vec![Value::Float(1e300)]).unwrap_err();
        assert_eq!(err.kind(), Some("OverflowError"));
        assert_eq!(err.to_string(), "int too large to convert");
        let err = call(&math, "ceil", vec![Value::Float(f64::INFINITY)]).unwrap_err();
        assert_eq!(err.to_string(), "cannot convert float infinity to integer");
        assert!(math.get_attr("pi").unwrap().unwrap().as_float().is_some());
    }

    #[test]
    fn test_itemgetter_and_attrgetter() {
        let getter = itemgetter(&CallArgs::new(vec!["name".into()])).unwrap();
        let Value::Native(getter) = getter else { panic!("expected native") };
        let row = Value::dict_from([("name", Value::from("vm-1"))]);
        assert_eq!(getter.call(&CallArgs::new(vec![row])).unwrap().as_str(), Some("vm-1"));

        let getter = attrgetter(&CallArgs::new(vec!["math.pi".into()])).unwrap();
        let Value::Native(getter) = getter else { panic!("expected native") };
        let holder = Value::object(HostModule::new("holder").with_submodule(math_module()));
        let pi = getter.call(&CallArgs::new(vec![holder])).unwrap();
        assert_eq!(pi.as_float(), Some(std::f64::consts::PI));
    }

    #[test]
    fn test_registry_resolves_submodules() {
        let mut registry = ModuleRegistry::with_defaults();
        registry.register(HostModule::new("oci").with_submodule(HostModule::new("oci.core")));
        assert!(registry.resolve("oci.core").is_ok());
        assert!(registry.resolve("json").is_ok());
        let err = registry.resolve("oci.missing").unwrap_err();
        assert_eq!(err.kind(), Some("ModuleNotFoundError"));
        assert_eq!(err.to_string(), "No module named 'oci.missing'");
    }
}
