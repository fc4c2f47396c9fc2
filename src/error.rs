//! Error types for the script sandbox.
//!
//! Every failure a submitted script can produce maps onto exactly one variant
//! here. The `Display` output of each variant is the caller-visible message that
//! ends up in the `{"error": ...}` payload.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// A malformed script, reported with the position of the first problem.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} (line {line}, column {column})")]
pub struct SyntaxError {
    /// Human-readable diagnostic.
    pub message: String,
    /// 1-based line of the offending token.
    pub line: usize,
    /// 1-based column of the offending token.
    pub column: usize,
}

impl SyntaxError {
    pub(crate) fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            line,
            column,
        }
    }
}

/// A script rejected by static policy before anything ran.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyViolation {
    /// The script references modules outside the allow-list.
    #[error(
        "Unauthorized imports: {}. Only {} are allowed.",
        names.join(", "),
        allowed.join(", ")
    )]
    UnauthorizedImports {
        /// Every offending module name, sorted.
        names: Vec<String>,
        /// The configured allow-list, sorted.
        allowed: Vec<String>,
    },

    /// The script never assigns the output variable.
    #[error("Code must set a '{output}' variable with the query output")]
    MissingOutputBinding {
        /// Name of the reserved output variable.
        output: String,
    },
}

/// A fault raised while the interpreter was running the script.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    /// An exception escaped the script: name lookups, type errors, host failures.
    #[error("{message}")]
    Unhandled {
        /// Exception class name (e.g. "TypeError", "ServiceError").
        kind: String,
        /// The exception message.
        message: String,
        /// Script line of the statement that raised, when known.
        line: Option<usize>,
    },

    /// Execution exceeded the configured deadline.
    #[error("Execution timed out after {0:?}")]
    Timeout(Duration),

    /// Execution exhausted its step budget.
    #[error("Execution ran out of fuel after {consumed} steps")]
    OutOfFuel {
        /// Steps executed before the budget ran out.
        consumed: u64,
    },

    /// A collection or string grew past its configured bound.
    #[error("Resource limit exceeded: {0}")]
    LimitExceeded(String),
}

impl RuntimeError {
    /// Build an exception of the given class.
    pub fn raise(kind: impl Into<String>, message: impl Into<String>) -> Self {
        RuntimeError::Unhandled {
            kind: kind.into(),
            message: message.into(),
            line: None,
        }
    }

    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        Self::raise("TypeError", message)
    }

    pub(crate) fn value_error(message: impl Into<String>) -> Self {
        Self::raise("ValueError", message)
    }

    pub(crate) fn name_error(name: &str) -> Self {
        Self::raise("NameError", format!("name '{name}' is not defined"))
    }

    pub(crate) fn attribute_error(type_name: &str, attr: &str) -> Self {
        Self::raise(
            "AttributeError",
            format!("'{type_name}' object has no attribute '{attr}'"),
        )
    }

    pub(crate) fn index_error(message: impl Into<String>) -> Self {
        Self::raise("IndexError", message)
    }

    pub(crate) fn key_error(repr: String) -> Self {
        Self::raise("KeyError", repr)
    }

    pub(crate) fn zero_division(message: impl Into<String>) -> Self {
        Self::raise("ZeroDivisionError", message)
    }

    pub(crate) fn overflow() -> Self {
        Self::raise("OverflowError", "integer overflow")
    }

    /// Attach the script line to an exception that does not carry one yet.
    pub(crate) fn at_line(self, at: usize) -> Self {
        match self {
            RuntimeError::Unhandled {
                kind,
                message,
                line: None,
            } => RuntimeError::Unhandled {
                kind,
                message,
                line: Some(at),
            },
            other => other,
        }
    }

    /// The exception class name, if this is an exception.
    pub fn kind(&self) -> Option<&str> {
        match self {
            RuntimeError::Unhandled { kind, .. } => Some(kind),
            _ => None,
        }
    }
}

/// Failure reported by a host object or native function.
///
/// Host adapters may return any `anyhow::Error`; it is converted with the
/// generic `Exception` kind and its full context chain as the message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct HostError {
    /// Exception class name shown to the script.
    pub kind: String,
    /// The exception message.
    pub message: String,
}

impl HostError {
    /// Create a host error of a specific exception class.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for HostError {
    fn from(err: anyhow::Error) -> Self {
        HostError::new("Exception", format!("{err:#}"))
    }
}

impl From<RuntimeError> for HostError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::Unhandled { kind, message, .. } => HostError::new(kind, message),
            other => HostError::new("RuntimeError", other.to_string()),
        }
    }
}

impl From<HostError> for RuntimeError {
    fn from(err: HostError) -> Self {
        RuntimeError::raise(err.kind, err.message)
    }
}

/// Pipeline stage at which an invocation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Parse,
    Scan,
    Policy,
    Execute,
    Extract,
    Serialize,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Parse => "parse",
            Stage::Scan => "scan",
            Stage::Policy => "policy",
            Stage::Execute => "execute",
            Stage::Extract => "extract",
            Stage::Serialize => "serialize",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while building or running the sandbox.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SandboxError {
    /// The script does not parse.
    #[error("Syntax error: {0}")]
    Syntax(#[from] SyntaxError),

    /// The script was rejected by the import/output policy.
    #[error(transparent)]
    Policy(#[from] PolicyViolation),

    /// The script failed while running.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// The script ran to completion without binding the output variable.
    #[error("Code did not assign the '{output}' variable during execution")]
    MissingResult {
        /// Name of the reserved output variable.
        output: String,
    },

    /// The output variable was explicitly bound to `None`.
    #[error("Result cannot be None")]
    NullResult,

    /// The result could not be converted to JSON.
    #[error("Result could not be serialized: {0}")]
    Unserializable(String),

    /// Invalid sandbox configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl SandboxError {
    /// The pipeline stage this error originates from.
    pub fn stage(&self) -> Stage {
        match self {
            SandboxError::Syntax(_) => Stage::Parse,
            SandboxError::Policy(_) => Stage::Policy,
            SandboxError::Runtime(_) | SandboxError::Config(_) => Stage::Execute,
            SandboxError::MissingResult { .. } | SandboxError::NullResult => Stage::Extract,
            SandboxError::Unserializable(_) => Stage::Serialize,
        }
    }

    /// Check if this error represents a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, SandboxError::Runtime(RuntimeError::Timeout(_)))
    }

    /// Check if this error was raised by static policy.
    pub fn is_policy_violation(&self) -> bool {
        matches!(self, SandboxError::Policy(_))
    }

    /// Check if this error represents an exception raised by the script or the host.
    pub fn is_unhandled_exception(&self) -> bool {
        matches!(self, SandboxError::Runtime(RuntimeError::Unhandled { .. }))
    }

    /// Check if this error represents an exhausted step budget.
    pub fn is_out_of_fuel(&self) -> bool {
        matches!(self, SandboxError::Runtime(RuntimeError::OutOfFuel { .. }))
    }

    /// Check if this error represents a collection or string size limit.
    pub fn is_limit_exceeded(&self) -> bool {
        matches!(self, SandboxError::Runtime(RuntimeError::LimitExceeded(_)))
    }
}

/// Result type alias for sandbox operations.
pub type Result<T> = std::result::Result<T, SandboxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_imports_message() {
        let err = SandboxError::from(PolicyViolation::UnauthorizedImports {
            names: vec!["os".into(), "subprocess".into()],
            allowed: vec!["json".into(), "oci".into(), "operator".into()],
        });
        assert_eq!(
            err.to_string(),
            "Unauthorized imports: os, subprocess. Only json, oci, operator are allowed."
        );
        assert!(err.is_policy_violation());
        assert_eq!(err.stage(), Stage::Policy);
    }

    #[test]
    fn test_syntax_error_message() {
        let err = SandboxError::from(SyntaxError::new("'(' was never closed", 1, 7));
        assert_eq!(
            err.to_string(),
            "Syntax error: '(' was never closed (line 1, column 7)"
        );
    }

    #[test]
    fn test_unhandled_shows_message_only() {
        let err = SandboxError::from(RuntimeError::raise("ServiceError", "NotAuthorized").at_line(3));
        assert_eq!(err.to_string(), "NotAuthorized");
        assert!(err.is_unhandled_exception());
        if let SandboxError::Runtime(RuntimeError::Unhandled { line, kind, .. }) = err {
            assert_eq!(line, Some(3));
            assert_eq!(kind, "ServiceError");
        } else {
            panic!("Expected Unhandled");
        }
    }

    #[test]
    fn test_at_line_keeps_first_line() {
        let err = RuntimeError::name_error("x").at_line(2).at_line(9);
        assert!(matches!(err, RuntimeError::Unhandled { line: Some(2), .. }));
    }

    #[test]
    fn test_host_error_from_anyhow() {
        let err: HostError = anyhow::anyhow!("bucket missing").context("list_objects").into();
        assert_eq!(err.kind, "Exception");
        assert_eq!(err.message, "list_objects: bucket missing");
    }

    #[test]
    fn test_runtime_error_into_host_error() {
        let err = HostError::from(RuntimeError::key_error("'id'".into()));
        assert_eq!(err.kind, "KeyError");
        assert_eq!(err.message, "'id'");
    }

    #[test]
    fn test_error_helpers() {
        let timeout = SandboxError::Runtime(RuntimeError::Timeout(Duration::from_secs(5)));
        assert!(timeout.is_timeout());
        assert!(!timeout.is_policy_violation());

        let fuel = SandboxError::Runtime(RuntimeError::OutOfFuel { consumed: 10 });
        assert!(fuel.is_out_of_fuel());
        assert!(!fuel.is_timeout());

        assert_eq!(SandboxError::NullResult.stage(), Stage::Extract);
        assert_eq!(SandboxError::NullResult.to_string(), "Result cannot be None");
    }
}
