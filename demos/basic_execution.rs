//! Basic example of running query scripts in the sandbox.
//!
//! Run with: cargo run --example basic_execution --features telemetry
//!
//! Set `RUST_LOG=policy_script_sandbox_rs=debug` to see each pipeline stage.

use std::time::Duration;
use policy_script_sandbox_rs::prelude::*;
use policy_script_sandbox_rs::telemetry::init_tracing;
use tracing::Level;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing(false, Level::INFO);

    // Configure the sandbox
    let config = SandboxConfig::builder()
        .timeout(Duration::from_secs(5))
        .max_steps(1_000_000)
        .build();

    println!("Creating sandbox with config: {:?}", config);

    let sandbox = ScriptSandbox::new(config)?;

    // Simple arithmetic
    println!("\n=== Test 1: Simple arithmetic ===");
    println!("{}", sandbox.run("result = 1 + 1").await);

    // Loop with captured output
    println!("\n=== Test 2: Loop execution ===");
    let code = r#"
squares = []
for i in range(5):
    print("Count:", i)
    squares.append(i * i)
result = squares
"#;
    match sandbox.execute(code).await {
        Ok(evaluation) => {
            println!("stdout:\n{}", evaluation.stdout);
            println!("payload: {}", evaluation.to_json_string());
            println!("duration: {:?}", evaluation.metadata.duration);
            println!("steps: {}", evaluation.metadata.steps);
        }
        Err(e) => eprintln!("Error: {}", e),
    }

    // Runtime error
    println!("\n=== Test 3: Script error ===");
    println!("{}", sandbox.run("result = int('not a number')").await);

    // Validation without running
    println!("\n=== Test 4: Validate only ===");
    match sandbox.validate("import json\nresult = json.dumps([1, 2])") {
        Ok(report) => println!("imports: {:?}, binds output: {}", report.imports, report.binds_output),
        Err(e) => eprintln!("rejected: {}", e),
    }

    Ok(())
}
