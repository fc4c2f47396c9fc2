//! # Policy Script Sandbox
//!
//! Validate-then-execute sandbox for untrusted query scripts.
//!
//! A script is written in a small Python-shaped language. Before anything
//! runs it is parsed, scanned for imports and for an assignment to the output
//! variable, and checked against the sandbox's import allow-list. It then
//! executes in a fresh namespace holding the caller's injected context, a
//! reduced builtins table and nothing else, and the value bound to the output
//! variable comes back as JSON.
//!
//! - **No ambient capabilities**: the language has no file, process or
//!   network primitives; everything a script can touch is injected
//! - **Static policy**: unauthorized imports are rejected before execution
//! - **Resource limits**: deadline, step budget, collection and string sizes,
//!   call depth
//! - **Uniform results**: every outcome is a `{"result": ...}` or
//!   `{"error": ...}` payload
//!
//! ## Example
//!
//! ```rust,no_run
//! use policy_script_sandbox_rs::prelude::*;
//! use serde_json::json;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = SandboxConfig::builder()
//!         .timeout(Duration::from_secs(5))
//!         .build();
//!
//!     let sandbox = ScriptSandbox::builder(config)
//!         .data("compartments", json!([{"name": "prod"}, {"name": "dev"}]))
//!         .build()?;
//!
//!     let payload = sandbox
//!         .run("result = sorted(c['name'] for c in compartments)")
//!         .await;
//!     assert_eq!(payload, r#"{"result": ["dev", "prod"]}"#);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Host objects
//!
//! SDK clients and other live objects are exposed by implementing
//! [`HostObject`]. Objects that implement [`HostObject::export`] serialize as
//! structured data; anything else falls back to its string form and the
//! payload is marked `"lossy": true`.

pub mod error;
pub mod policy;
pub mod prelude;
pub mod sandbox;
pub mod script;
#[cfg(feature = "telemetry")]
pub mod telemetry;

// Re-export main types at crate root for convenience
pub use error::{
    HostError, PolicyViolation, Result, RuntimeError, SandboxError, Stage, SyntaxError,
};
pub use policy::{AllowList, ScanReport};
pub use sandbox::config::{SandboxConfig, SandboxConfigBuilder};
pub use sandbox::context::ExecutionContext;
pub use sandbox::executor::{Evaluation, ExecutionMetadata, SandboxBuilder, ScriptSandbox};
pub use sandbox::tool::code_snippet_schema;
pub use script::host::{CallArgs, ContextValue, HostModule, HostObject, NativeFunction};
pub use script::value::Value;
