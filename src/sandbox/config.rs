//! Sandbox configuration with builder pattern.

use std::time::Duration;

/// Modules every sandbox permits unless the allow-list is replaced.
pub const DEFAULT_ALLOWED_MODULES: [&str; 3] = ["json", "math", "operator"];

/// Configuration for the script sandbox.
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxConfig {
    /// Maximum execution time before timeout.
    pub timeout: Duration,
    /// Maximum interpreter steps (fuel). `None` means unlimited.
    pub max_steps: Option<u64>,
    /// How many steps run between deadline checks.
    pub deadline_check_interval: u64,
    /// Largest list, tuple, dict or set a script may build.
    pub max_collection_len: usize,
    /// Largest string, in bytes, a script may build.
    pub max_string_len: usize,
    /// Maximum nesting of user function calls.
    pub max_call_depth: usize,
    /// Bytes of `print` output kept per invocation; the rest is dropped.
    pub max_output_bytes: usize,
    /// Name of the variable the script must assign.
    pub output_variable: String,
    /// Modules scripts may import.
    pub allowed_modules: Vec<String>,
    /// Builtins exposed to scripts. `None` exposes the full reduced table.
    pub builtins: Option<Vec<String>>,
    /// Literal strings replaced by `[REDACTED]` in caller-visible errors.
    pub redactions: Vec<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_steps: None,
            deadline_check_interval: 1024,
            max_collection_len: 1_000_000,
            max_string_len: 16 * 1024 * 1024, // 16MB
            max_call_depth: 64,
            max_output_bytes: 1024 * 1024,
            output_variable: "result".to_string(),
            allowed_modules: DEFAULT_ALLOWED_MODULES.iter().map(|m| m.to_string()).collect(),
            builtins: None,
            redactions: Vec::new(),
        }
    }
}

impl SandboxConfig {
    /// Create a new builder for SandboxConfig.
    pub fn builder() -> SandboxConfigBuilder {
        SandboxConfigBuilder::default()
    }

    /// Check the values a builder cannot reject on its own.
    pub fn validate(&self) -> Result<(), String> {
        if !is_identifier(&self.output_variable) {
            return Err(format!(
                "output variable '{}' is not a valid identifier",
                self.output_variable
            ));
        }
        if self.deadline_check_interval == 0 {
            return Err("deadline_check_interval must be at least 1".to_string());
        }
        if self.max_call_depth == 0 {
            return Err("max_call_depth must be at least 1".to_string());
        }
        if let Some(module) = self
            .allowed_modules
            .iter()
            .find(|m| m.is_empty() || m.split('.').any(|part| !is_identifier(part)))
        {
            return Err(format!("invalid module name '{module}' in allow-list"));
        }
        Ok(())
    }
}

pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_alphabetic())
        && chars.all(|c| c == '_' || c.is_alphanumeric())
        && !crate::script::parser::is_keyword(name)
}

/// Builder for creating SandboxConfig instances.
#[derive(Debug, Clone, Default)]
pub struct SandboxConfigBuilder {
    timeout: Option<Duration>,
    max_steps: Option<u64>,
    deadline_check_interval: Option<u64>,
    max_collection_len: Option<usize>,
    max_string_len: Option<usize>,
    max_call_depth: Option<usize>,
    max_output_bytes: Option<usize>,
    output_variable: Option<String>,
    allowed_modules: Option<Vec<String>>,
    extra_modules: Vec<String>,
    builtins: Option<Vec<String>>,
    redactions: Vec<String>,
}

impl SandboxConfigBuilder {
    /// Set the maximum execution timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the maximum number of interpreter steps.
    pub fn max_steps(mut self, steps: u64) -> Self {
        self.max_steps = Some(steps);
        self
    }

    /// Set how many steps run between deadline checks.
    pub fn deadline_check_interval(mut self, steps: u64) -> Self {
        self.deadline_check_interval = Some(steps);
        self
    }

    pub fn max_collection_len(mut self, len: usize) -> Self {
        self.max_collection_len = Some(len);
        self
    }

    pub fn max_string_len(mut self, bytes: usize) -> Self {
        self.max_string_len = Some(bytes);
        self
    }

    pub fn max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = Some(depth);
        self
    }

    pub fn max_output_bytes(mut self, bytes: usize) -> Self {
        self.max_output_bytes = Some(bytes);
        self
    }

    /// Set the name of the variable scripts must assign.
    pub fn output_variable(mut self, name: impl Into<String>) -> Self {
        self.output_variable = Some(name.into());
        self
    }

    /// Replace the allow-list.
    pub fn allowed_modules<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_modules = Some(modules.into_iter().map(Into::into).collect());
        self
    }

    /// Add one module to the allow-list, keeping the others.
    pub fn allow_module(mut self, module: impl Into<String>) -> Self {
        self.extra_modules.push(module.into());
        self
    }

    /// Narrow the builtins table to `names`.
    pub fn builtins<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.builtins = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Hide `secret` from caller-visible error messages.
    pub fn redact(mut self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        if !secret.is_empty() {
            self.redactions.push(secret);
        }
        self
    }

    /// Build the SandboxConfig.
    pub fn build(self) -> SandboxConfig {
        let default = SandboxConfig::default();
        let mut allowed_modules = self.allowed_modules.unwrap_or(default.allowed_modules);
        allowed_modules.extend(self.extra_modules);
        allowed_modules.sort();
        allowed_modules.dedup();
        SandboxConfig {
            timeout: self.timeout.unwrap_or(default.timeout),
            max_steps: self.max_steps.or(default.max_steps),
            deadline_check_interval: self
                .deadline_check_interval
                .unwrap_or(default.deadline_check_interval),
            max_collection_len: self.max_collection_len.unwrap_or(default.max_collection_len),
            max_string_len: self.max_string_len.unwrap_or(default.max_string_len),
            max_call_depth: self.max_call_depth.unwrap_or(default.max_call_depth),
            max_output_bytes: self.max_output_bytes.unwrap_or(default.max_output_bytes),
            output_variable: self.output_variable.unwrap_or(default.output_variable),
            allowed_modules,
            builtins: self.builtins.or(default.builtins),
            redactions: self.redactions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SandboxConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.max_steps, None);
        assert_eq!(config.deadline_check_interval, 1024);
        assert_eq!(config.output_variable, "result");
        assert_eq!(config.allowed_modules, vec!["json", "math", "operator"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = SandboxConfig::builder()
            .timeout(Duration::from_secs(5))
            .max_steps(1_000_000)
            .max_call_depth(16)
            .output_variable("answer")
            .allow_module("oci")
            .redact("s3cr3t")
            .redact("")
            .build();

        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.max_steps, Some(1_000_000));
        assert_eq!(config.max_call_depth, 16);
        assert_eq!(config.output_variable, "answer");
        assert_eq!(config.allowed_modules, vec!["json", "math", "oci", "operator"]);
        assert_eq!(config.redactions, vec!["s3cr3t"]);
    }

    #[test]
    fn test_replacing_allow_list() {
        let config = SandboxConfig::builder()
            .allowed_modules(["oci", "json"])
            .allow_module("json")
            .build();
        assert_eq!(config.allowed_modules, vec!["json", "oci"]);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad_output = SandboxConfig::builder().output_variable("1x").build();
        assert!(bad_output.validate().is_err());

        let keyword = SandboxConfig::builder().output_variable("lambda").build();
        assert!(keyword.validate().is_err());

        let bad_module = SandboxConfig::builder().allow_module("os..path").build();
        assert!(bad_module.validate().is_err());

        let zero_interval = SandboxConfig::builder().deadline_check_interval(0).build();
        assert!(zero_interval.validate().is_err());
    }
}
