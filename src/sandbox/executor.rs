//! Core execution engine for the script sandbox.
//!
//! One invocation runs the whole pipeline: parse, scan, policy check,
//! namespace build, execute, extract, serialize. Nothing but the sandbox's
//! configuration and execution context outlives an invocation.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, info_span, warn};

use crate::error::{HostError, Result, RuntimeError, SandboxError, Stage};
use crate::policy::{enforcer, scan, AllowList, ScanReport};
use crate::sandbox::config::{is_identifier, SandboxConfig};
use crate::sandbox::context::ExecutionContext;
use crate::sandbox::io::CapturedOutput;
use crate::sandbox::limits::{Budget, CancelToken, ExecutionLimits};
use crate::sandbox::namespace::RestrictedNamespace;
use crate::sandbox::redact::Redactor;
use crate::sandbox::serialize::{self, Serialized};
use crate::sandbox::tool;
use crate::script::builtins::{Builtin, BuiltinTable};
use crate::script::host::{CallArgs, ContextValue, HostModule, HostObject};
use crate::script::interpreter;
use crate::script::parser;
use crate::script::value::Value;

/// Metadata about a finished execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionMetadata {
    /// Wall-clock time spent in the interpreter.
    pub duration: Duration,
    /// Interpreter steps consumed.
    pub steps: u64,
}

/// A successful invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// The serialized output variable.
    pub result: Serialized,
    /// Everything the script printed.
    pub stdout: String,
    pub metadata: ExecutionMetadata,
}

impl Evaluation {
    /// Check if part of the result was coerced to a string.
    pub fn is_lossy(&self) -> bool {
        self.result.lossy
    }

    /// `{"result": ...}`.
    pub fn payload(&self) -> serde_json::Value {
        self.result.payload()
    }

    pub fn to_json_string(&self) -> String {
        self.result.to_json_string()
    }
}

struct Inner {
    config: SandboxConfig,
    context: Arc<ExecutionContext>,
    allow_list: AllowList,
    builtins: BuiltinTable,
    redactor: Redactor,
}

/// A policy-gated script sandbox.
///
/// Cheap to clone; clones share the configuration and execution context.
/// Invocations are independent and may run concurrently.
#[derive(Clone)]
pub struct ScriptSandbox {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ScriptSandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptSandbox")
            .field("config", &self.inner.config)
            .field("allow_list", &self.inner.allow_list)
            .field("globals", &self.inner.context.globals.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ScriptSandbox {
    /// Create a sandbox with an empty execution context.
    pub fn new(config: SandboxConfig) -> Result<Self> {
        SandboxBuilder::new(config).build()
    }

    /// Start building a sandbox with injected globals and modules.
    pub fn builder(config: SandboxConfig) -> SandboxBuilder {
        SandboxBuilder::new(config)
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.inner.config
    }

    pub fn allow_list(&self) -> &AllowList {
        &self.inner.allow_list
    }

    /// Parse, scan and policy-check a script without running it.
    pub fn validate(&self, script: &str) -> Result<ScanReport> {
        let program = parser::parse(script)?;
        let report = scan(&program, &self.inner.config.output_variable);
        enforcer::check(
            &report.imports,
            &self.inner.allow_list,
            report.binds_output,
            &self.inner.config.output_variable,
        )?;
        Ok(report)
    }

    /// Run a script on the current thread.
    ///
    /// The deadline is enforced cooperatively by the interpreter.
    pub fn evaluate(&self, script: &str) -> Result<Evaluation> {
        let span = info_span!("sandbox.run", mode = "sync", script_bytes = script.len());
        let _enter = span.enter();
        let result = self.guarded(script, CancelToken::new());
        record(&result);
        result
    }

    /// Run a script on the blocking thread pool, racing it against the
    /// configured timeout.
    pub async fn execute(&self, script: &str) -> Result<Evaluation> {
        let span = info_span!("sandbox.run", mode = "async", script_bytes = script.len());
        let timeout = self.inner.config.timeout;
        let cancel = CancelToken::new();

        let sandbox = self.clone();
        let script = script.to_string();
        let token = cancel.clone();
        let task_span = span.clone();
        let exec_handle = tokio::task::spawn_blocking(move || {
            let _enter = task_span.enter();
            sandbox.guarded(&script, token)
        });

        // Race between execution and timeout
        let result = tokio::select! {
            joined = exec_handle => match joined {
                Ok(result) => result,
                Err(e) => Err(internal_error(format!("execution task failed: {e}"))),
            },
            _ = tokio::time::sleep(timeout) => {
                cancel.cancel();
                Err(SandboxError::Runtime(RuntimeError::Timeout(timeout)))
            }
        };

        let _enter = span.enter();
        record(&result);
        result
    }

    /// Run a script synchronously and return the JSON payload.
    ///
    /// Never fails: errors become `{"error": "..."}`.
    pub fn run_sync(&self, script: &str) -> String {
        match self.evaluate(script) {
            Ok(evaluation) => evaluation.to_json_string(),
            Err(err) => self.error_payload(&err),
        }
    }

    /// Run a script asynchronously and return the JSON payload.
    pub async fn run(&self, script: &str) -> String {
        match self.execute(script).await {
            Ok(evaluation) => evaluation.to_json_string(),
            Err(err) => self.error_payload(&err),
        }
    }

    /// Handle a tool call whose arguments carry the script under `code`.
    pub async fn run_tool(&self, arguments: &serde_json::Value) -> String {
        match tool::code_argument(arguments) {
            Some(code) => self.run(code).await,
            None => {
                let message = tool::missing_code_message();
                warn!(error = %message, "rejected tool call");
                serialize::error_payload(&message)
            }
        }
    }

    /// The caller-visible `{"error": ...}` payload for a failure.
    pub fn error_payload(&self, err: &SandboxError) -> String {
        serialize::error_payload(&self.inner.redactor.redact(&err.to_string()))
    }

    /// Run the pipeline, turning a panic into an error.
    fn guarded(&self, script: &str, cancel: CancelToken) -> Result<Evaluation> {
        panic::catch_unwind(AssertUnwindSafe(|| self.pipeline(script, cancel))).unwrap_or_else(
            |payload| {
                let detail = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(internal_error(format!("interpreter panicked: {detail}")))
            },
        )
    }

    fn pipeline(&self, script: &str, cancel: CancelToken) -> Result<Evaluation> {
        let inner = &*self.inner;
        let output = inner.config.output_variable.as_str();

        let program = parser::parse(script)?;
        debug!(stage = %Stage::Parse, statements = program.body.len(), "parsed script");

        let report = scan(&program, output);
        debug!(
            stage = %Stage::Scan,
            imports = ?report.imports,
            binds_output = report.binds_output,
            "scanned script"
        );

        enforcer::check(
            &report.imports,
            &inner.allow_list,
            report.binds_output,
            output,
        )?;
        debug!(stage = %Stage::Policy, "policy passed");

        let mut namespace = RestrictedNamespace::build(
            Arc::clone(&inner.context),
            &inner.builtins,
            inner.allow_list.clone(),
            output,
            CapturedOutput::new(inner.config.max_output_bytes),
        );
        let mut budget = Budget::new(ExecutionLimits::from(&inner.config), cancel);
        let outcome = interpreter::execute(&program, &mut namespace, &mut budget);
        let stdout = namespace.take_stdout();
        if !stdout.is_empty() {
            debug!(stdout = %stdout, "captured script output");
        }
        outcome?;
        let metadata = ExecutionMetadata {
            duration: budget.elapsed(),
            steps: budget.steps(),
        };
        debug!(stage = %Stage::Execute, steps = metadata.steps, "executed script");

        let slot = namespace.extract();
        drop(namespace);
        debug!(stage = %Stage::Extract, "extracted output");

        let result = serialize::serialize(slot, output)?;
        debug!(stage = %Stage::Serialize, lossy = result.lossy, "serialized result");

        Ok(Evaluation {
            result,
            stdout,
            metadata,
        })
    }
}

fn internal_error(message: String) -> SandboxError {
    SandboxError::Runtime(RuntimeError::raise("SystemError", message))
}

fn record(result: &Result<Evaluation>) {
    match result {
        Ok(evaluation) => info!(
            steps = evaluation.metadata.steps,
            duration_ms = evaluation.metadata.duration.as_millis() as u64,
            lossy = evaluation.is_lossy(),
            "script succeeded"
        ),
        Err(err) => warn!(stage = %err.stage(), error = %err, "script failed"),
    }
}

/// Builder for a [`ScriptSandbox`] and its execution context.
#[derive(Debug)]
pub struct SandboxBuilder {
    config: SandboxConfig,
    context: ExecutionContext,
}

impl SandboxBuilder {
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            config,
            context: ExecutionContext::new(),
        }
    }

    /// Inject a global visible to every script.
    pub fn global(mut self, name: impl Into<String>, value: impl Into<ContextValue>) -> Self {
        self.context.insert(name, value);
        self
    }

    /// Inject plain data, copied fresh into every invocation.
    pub fn data(self, name: impl Into<String>, json: serde_json::Value) -> Self {
        self.global(name, ContextValue::Data(json))
    }

    /// Inject a shared host object.
    pub fn object(self, name: impl Into<String>, object: impl HostObject + 'static) -> Self {
        self.global(name, ContextValue::object(object))
    }

    /// Inject a native function.
    pub fn function(
        self,
        name: impl Into<String>,
        f: impl Fn(&CallArgs) -> std::result::Result<Value, HostError> + Send + Sync + 'static,
    ) -> Self {
        self.global(name, ContextValue::function(f))
    }

    /// Register an importable module and add it to the allow-list.
    pub fn module(mut self, module: HostModule) -> Self {
        let name = module.name().to_string();
        if !self.config.allowed_modules.contains(&name) {
            self.config.allowed_modules.push(name);
            self.config.allowed_modules.sort();
        }
        self.context.modules.register(module);
        self
    }

    /// Validate the configuration and build the sandbox.
    pub fn build(self) -> Result<ScriptSandbox> {
        let config = self.config;
        config.validate().map_err(SandboxError::Config)?;

        for name in self.context.globals.keys() {
            if name == &config.output_variable {
                return Err(SandboxError::Config(format!(
                    "context entry '{name}' collides with the output variable"
                )));
            }
            if !is_identifier(name) {
                return Err(SandboxError::Config(format!(
                    "context entry '{name}' is not a valid identifier"
                )));
            }
        }

        let builtins = match &config.builtins {
            Some(names) => BuiltinTable::only(names).map_err(SandboxError::Config)?,
            None => BuiltinTable::full(),
        };
        if let Some(shadowed) = self
            .context
            .globals
            .keys()
            .find(|name| Builtin::from_name(name).is_some_and(|b| builtins.contains(b)))
        {
            debug!(name = %shadowed, "context entry shadows a builtin");
        }

        let allow_list = AllowList::new(config.allowed_modules.iter().cloned());
        let redactor = Redactor::new(config.redactions.iter().cloned());
        info!(
            allowed = ?allow_list,
            globals = self.context.globals.len(),
            builtins = builtins.len(),
            "sandbox ready"
        );
        Ok(ScriptSandbox {
            inner: Arc::new(Inner {
                config,
                context: Arc::new(self.context),
                allow_list,
                builtins,
                redactor,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sandbox() -> ScriptSandbox {
        ScriptSandbox::new(SandboxConfig::default()).unwrap()
    }

    #[test]
    fn test_simple_execution() {
        let evaluation = sandbox().evaluate("print('hi')\nresult = 1 + 1").unwrap();
        assert_eq!(evaluation.payload(), json!({"result": 2}));
        assert_eq!(evaluation.stdout, "hi\n");
        assert!(evaluation.metadata.steps >= 2);
        assert_eq!(evaluation.to_json_string(), r#"{"result": 2}"#);
    }

    #[test]
    fn test_run_sync_payloads() {
        let sandbox = sandbox();
        assert_eq!(
            sandbox.run_sync("result = None"),
            r#"{"error": "Result cannot be None"}"#
        );
        assert_eq!(
            sandbox.run_sync("x = 5"),
            r#"{"error": "Code must set a 'result' variable with the query output"}"#
        );
        assert_eq!(
            sandbox.run_sync("if False:\n    result = 1\n"),
            r#"{"error": "Code did not assign the 'result' variable during execution"}"#
        );
    }

    #[test]
    fn test_validate_does_not_execute() {
        let report = sandbox()
            .validate("import json\nresult = undefined_name")
            .unwrap();
        assert!(report.binds_output);
        assert!(report.imports.contains("json"));
    }

    #[test]
    fn test_builder_rejects_bad_context() {
        let err = ScriptSandbox::builder(SandboxConfig::default())
            .data("result", json!(1))
            .build()
            .unwrap_err();
        assert!(matches!(err, SandboxError::Config(_)));

        let err = ScriptSandbox::builder(SandboxConfig::default())
            .data("not valid", json!(1))
            .build()
            .unwrap_err();
        assert!(matches!(err, SandboxError::Config(_)));

        let config = SandboxConfig::builder().builtins(["len", "exec"]).build();
        let err = ScriptSandbox::new(config).unwrap_err();
        assert_eq!(err.to_string(), "configuration error: unknown builtin 'exec'");
    }

    #[test]
    fn test_module_registration_extends_allow_list() {
        let sandbox = ScriptSandbox::builder(SandboxConfig::default())
            .module(HostModule::new("inventory").with("region", json!("eu-frankfurt-1")))
            .build()
            .unwrap();
        assert!(sandbox.allow_list().permits("inventory"));
        assert_eq!(
            sandbox.run_sync("import inventory\nresult = inventory.region"),
            r#"{"result": "eu-frankfurt-1"}"#
        );
    }

    #[test]
    fn test_errors_are_redacted() {
        let config = SandboxConfig::builder().redact("hunter2").build();
        let sandbox = ScriptSandbox::new(config).unwrap();
        assert_eq!(
            sandbox.run_sync("result = {}['hunter2']"),
            r#"{"error": "'[REDACTED]'"}"#
        );
    }

    #[tokio::test]
    async fn test_async_timeout() {
        let config = SandboxConfig::builder()
            .timeout(Duration::from_millis(100))
            .build();
        let sandbox = ScriptSandbox::new(config).unwrap();
        let result = sandbox.execute("while True:\n    pass\n").await;
        assert!(matches!(result, Err(ref e) if e.is_timeout()));
    }

    #[tokio::test]
    async fn test_run_tool() {
        let sandbox = sandbox();
        assert_eq!(
            sandbox.run_tool(&json!({"code": "result = [1, 'a']"})).await,
            r#"{"result": [1, "a"]}"#
        );
        assert_eq!(
            sandbox.run_tool(&json!({})).await,
            r#"{"error": "Missing required argument: code"}"#
        );
    }
}
