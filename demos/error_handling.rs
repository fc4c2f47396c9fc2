//! Example demonstrating error handling patterns.
//!
//! This example shows how each failure surfaces:
//! - Syntax errors
//! - Policy violations
//! - Script exceptions
//! - Missing or null results
//! - Configuration errors
//!
//! Run with: cargo run --example error_handling

use std::time::Duration;
use policy_script_sandbox_rs::prelude::*;
use policy_script_sandbox_rs::{PolicyViolation, SandboxBuilder};

#[tokio::main]
async fn main() -> Result<()> {
    println!("=== Error Handling Example ===\n");

    let config = SandboxConfig::builder()
        .timeout(Duration::from_secs(5))
        .redact("ocid1.tenancy.oc1..private")
        .build();

    let sandbox = SandboxBuilder::new(config)
        .function("get_tenancy", |_args: &CallArgs| {
            Err(HostError::new(
                "ServiceError",
                "tenancy ocid1.tenancy.oc1..private not found",
            ))
        })
        .build()?;

    // Example 1: every failure as a payload
    println!("--- Test 1: Error payloads ---");
    for code in [
        "result = (1 + ",
        "import os\nimport sys\nresult = 1",
        "x = 5",
        "result = None",
        "if False:\n    result = 1\n",
        "result = 'string' + 42",
        "result = 1 / 0",
        "result = get_tenancy()",
    ] {
        println!("{:<40} -> {}", format!("{code:?}"), sandbox.run(code).await);
    }
    println!();

    // Example 2: matching on the typed error
    println!("--- Test 2: Typed errors ---");
    match sandbox.execute("import subprocess\nresult = 1").await {
        Err(SandboxError::Policy(PolicyViolation::UnauthorizedImports { names, allowed })) => {
            println!("Rejected modules: {:?}", names);
            println!("Allowed modules: {:?}", allowed);
        }
        other => println!("Unexpected: {:?}", other),
    }

    match sandbox.execute("result = undefined_variable").await {
        Err(SandboxError::Runtime(err)) => {
            println!("Exception kind: {:?}", err.kind());
            println!("Message: {}", err);
        }
        other => println!("Unexpected: {:?}", other),
    }

    match sandbox.execute("result = (").await {
        Err(err) => println!("Failed at stage '{}': {}", err.stage(), err),
        Ok(_) => println!("Unexpected success"),
    }
    println!();

    // Example 3: redaction
    println!("--- Test 3: Redacted host errors ---");
    match sandbox.execute("result = get_tenancy()").await {
        Err(err) => {
            println!("Operator sees: {}", err);
            println!("Caller sees:   {}", sandbox.error_payload(&err));
        }
        Ok(_) => println!("Unexpected success"),
    }
    println!();

    // Example 4: configuration errors are returned, not rendered
    println!("--- Test 4: Configuration errors ---");
    let bad = SandboxConfig::builder().output_variable("not valid").build();
    match ScriptSandbox::new(bad) {
        Ok(_) => println!("Unexpected success"),
        Err(e) => println!("Configuration rejected: {}", e),
    }

    let bad = SandboxConfig::builder().builtins(["len", "eval"]).build();
    match ScriptSandbox::new(bad) {
        Ok(_) => println!("Unexpected success"),
        Err(e) => println!("Configuration rejected: {}", e),
    }

    println!("\n=== Error Handling Example Complete ===");
    Ok(())
}
