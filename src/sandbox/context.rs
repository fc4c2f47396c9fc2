//! The caller-supplied objects every invocation can see.

use std::collections::BTreeMap;

use crate::script::host::ContextValue;
use crate::script::modules::ModuleRegistry;

/// Globals and importable modules, fixed at sandbox construction.
///
/// Shared read-only by every invocation. Data entries are copied into each
/// namespace; objects and functions are shared by reference.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub globals: BTreeMap<String, ContextValue>,
    pub modules: ModuleRegistry,
}

impl ExecutionContext {
    /// An empty context with the default helper modules registered.
    pub fn new() -> Self {
        Self {
            globals: BTreeMap::new(),
            modules: ModuleRegistry::with_defaults(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ContextValue>) {
        self.globals.insert(name.into(), value.into());
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}
