//! Prelude module for convenient imports.

pub use crate::error::{HostError, Result, RuntimeError, SandboxError};
pub use crate::sandbox::{
    config::SandboxConfig,
    executor::{Evaluation, ScriptSandbox},
};
pub use crate::script::host::{CallArgs, HostModule, HostObject};
pub use crate::script::value::Value;
