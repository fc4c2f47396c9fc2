//! Lexical scopes: the global namespace, function frames and comprehensions.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::script::value::{release, Value};

#[derive(Default)]
pub struct Scope {
    vars: RefCell<HashMap<String, Value>>,
    parent: Option<Rc<Scope>>,
}

impl Scope {
    pub fn root() -> Rc<Scope> {
        Rc::new(Scope::default())
    }

    pub fn child(parent: &Rc<Scope>) -> Rc<Scope> {
        Rc::new(Scope {
            vars: RefCell::new(HashMap::new()),
            parent: Some(Rc::clone(parent)),
        })
    }

    /// Resolve a name through this scope and its ancestors.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.vars.borrow().get(name) {
            return Some(value.clone());
        }
        self.parent.as_ref().and_then(|parent| parent.lookup(name))
    }

    pub fn get_local(&self, name: &str) -> Option<Value> {
        self.vars.borrow().get(name).cloned()
    }

    pub fn set(&self, name: impl Into<String>, value: Value) {
        let old = self.vars.borrow_mut().insert(name.into(), value);
        if let Some(old) = old {
            release(old);
        }
    }

    pub fn remove(&self, name: &str) -> Option<Value> {
        self.vars.borrow_mut().remove(name)
    }

    pub fn contains_local(&self, name: &str) -> bool {
        self.vars.borrow().contains_key(name)
    }

    /// Drop every binding. Functions keep their defining scope alive, so
    /// clearing is what breaks scope/closure reference cycles on teardown.
    pub fn clear(&self) {
        let drained: Vec<Value> = self.vars.borrow_mut().drain().map(|(_, v)| v).collect();
        drained.into_iter().for_each(release);
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        for (_, value) in self.vars.get_mut().drain() {
            release(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_shadows_parent() {
        let root = Scope::root();
        root.set("x", Value::Int(1));
        root.set("y", Value::Int(2));
        let child = Scope::child(&root);
        child.set("x", Value::Int(10));

        assert_eq!(child.lookup("x").and_then(|v| v.as_int()), Some(10));
        assert_eq!(child.lookup("y").and_then(|v| v.as_int()), Some(2));
        assert_eq!(root.lookup("x").and_then(|v| v.as_int()), Some(1));
        assert!(child.get_local("y").is_none());
    }

    #[test]
    fn test_deeply_nested_value_is_released_without_recursion() {
        let root = Scope::root();
        let mut nested = Value::list(vec![]);
        for _ in 0..500_000 {
            nested = Value::list(vec![nested]);
        }
        root.set("x", nested);
        root.set("x", Value::None);

        let mut nested = Value::tuple(vec![]);
        for _ in 0..500_000 {
            nested = Value::tuple(vec![nested]);
        }
        root.set("y", nested);
        drop(root);
    }

    #[test]
    fn test_clear_releases_values() {
        let root = Scope::root();
        let list = Value::list(vec![]);
        root.set("items", list.clone());
        root.clear();
        assert!(!root.contains_local("items"));
        if let Value::List(rc) = list {
            assert_eq!(std::rc::Rc::strong_count(&rc), 1);
        }
    }
}
