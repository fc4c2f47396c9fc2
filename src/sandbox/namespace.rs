//! The per-invocation namespace a script runs in.
//!
//! Scopes form a chain: a root holding the builtins table, the globals
//! seeded from the execution context, then function and comprehension frames.
//! A namespace is built for one invocation and dropped right after the
//! output slot is extracted.

use std::rc::{Rc, Weak};
use std::sync::Arc;

use crate::policy::AllowList;
use crate::sandbox::context::ExecutionContext;
use crate::sandbox::io::CapturedOutput;
use crate::script::builtins::BuiltinTable;
use crate::script::scope::Scope;
use crate::script::value::Value;

/// State of the output variable after execution.
#[derive(Debug, Clone)]
pub enum OutputSlot {
    /// The script never assigned the output variable (or deleted it).
    Unset,
    Bound(Value),
}

pub struct RestrictedNamespace {
    builtins: Rc<Scope>,
    globals: Rc<Scope>,
    output: String,
    context: Arc<ExecutionContext>,
    allow_list: AllowList,
    /// Non-global scopes captured by functions, cleared on drop.
    captured: Vec<Weak<Scope>>,
    stdout: CapturedOutput,
}

impl RestrictedNamespace {
    /// Build a fresh namespace: builtins, then context entries, with the
    /// output slot unset.
    pub fn build(
        context: Arc<ExecutionContext>,
        builtins: &BuiltinTable,
        allow_list: AllowList,
        output: &str,
        stdout: CapturedOutput,
    ) -> Self {
        let root = Scope::root();
        for builtin in builtins.iter() {
            root.set(builtin.name(), Value::Builtin(builtin));
        }
        let globals = Scope::child(&root);
        for (name, entry) in &context.globals {
            if name != output {
                globals.set(name.as_str(), entry.to_value(name));
            }
        }
        Self {
            builtins: root,
            globals,
            output: output.to_string(),
            context,
            allow_list,
            captured: Vec::new(),
            stdout,
        }
    }

    pub fn globals(&self) -> &Rc<Scope> {
        &self.globals
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn allow_list(&self) -> &AllowList {
        &self.allow_list
    }

    pub fn stdout_mut(&mut self) -> &mut CapturedOutput {
        &mut self.stdout
    }

    /// Remember a scope a function closes over so teardown can break the
    /// cycle between the scope and the function stored in it.
    pub fn track(&mut self, scope: &Rc<Scope>) {
        if Rc::ptr_eq(scope, &self.globals) {
            return;
        }
        if self
            .captured
            .last()
            .is_some_and(|last| std::ptr::eq(last.as_ptr(), Rc::as_ptr(scope)))
        {
            return;
        }
        self.captured.retain(|weak| weak.strong_count() > 0);
        self.captured.push(Rc::downgrade(scope));
    }

    /// Read the output slot.
    pub fn extract(&self) -> OutputSlot {
        match self.globals.get_local(&self.output) {
            Some(value) => OutputSlot::Bound(value),
            None => OutputSlot::Unset,
        }
    }

    /// Take the captured `print` output.
    pub fn take_stdout(&mut self) -> String {
        self.stdout.take()
    }
}

impl Drop for RestrictedNamespace {
    fn drop(&mut self) {
        for weak in self.captured.drain(..) {
            if let Some(scope) = weak.upgrade() {
                scope.clear();
            }
        }
        self.globals.clear();
        self.builtins.clear();
    }
}
