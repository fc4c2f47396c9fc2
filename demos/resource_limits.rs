//! Walk through each resource limit the sandbox enforces.
//!
//! Every scenario pairs a tightened configuration with one script that fits
//! inside it and one that does not.
//!
//! Run with: cargo run --example resource_limits

use policy_script_sandbox_rs::prelude::*;
use std::time::Duration;

struct Scenario {
    title: &'static str,
    config: SandboxConfig,
    fits: &'static str,
    breaches: &'static str,
}

fn scenarios() -> Vec<Scenario> {
    vec![
        Scenario {
            title: "wall-clock timeout (500ms)",
            config: SandboxConfig::builder()
                .timeout(Duration::from_millis(500))
                .deadline_check_interval(256)
                .build(),
            fits: "result = sum(range(10000))",
            breaches: "while True: pass\nresult = 1",
        },
        Scenario {
            title: "step budget (50k)",
            config: SandboxConfig::builder()
                .timeout(Duration::from_secs(10))
                .max_steps(50_000)
                .build(),
            fits: "result = sum(range(1000))",
            breaches: "total = 0\nfor i in range(1000000):\n    total += i\nresult = total",
        },
        Scenario {
            title: "collection length (100k)",
            config: SandboxConfig::builder().max_collection_len(100_000).build(),
            fits: "result = len([0] * 50000)",
            breaches: "result = len([0] * 500000)",
        },
        Scenario {
            title: "string length (1MiB)",
            config: SandboxConfig::builder().max_string_len(1 << 20).build(),
            fits: "result = len('x' * 1000)",
            breaches: "s = 'x'\nfor _ in range(30):\n    s = s + s\nresult = len(s)",
        },
        Scenario {
            title: "call depth (20)",
            config: SandboxConfig::builder().max_call_depth(20).build(),
            fits: "def depth(n):\n    return 0 if n == 0 else 1 + depth(n - 1)\nresult = depth(10)",
            breaches: "def depth(n):\n    return 0 if n == 0 else 1 + depth(n - 1)\nresult = depth(50)",
        },
    ]
}

fn describe(outcome: &Result<Evaluation>) -> String {
    match outcome {
        Ok(evaluation) => format!(
            "ok {} ({} steps)",
            evaluation.to_json_string(),
            evaluation.metadata.steps
        ),
        Err(e) if e.is_timeout() => format!("timed out: {e}"),
        Err(e) if e.is_out_of_fuel() => format!("out of fuel: {e}"),
        Err(e) if e.is_limit_exceeded() => format!("limit hit: {e}"),
        Err(e) => format!("{:?} stage error: {e}", e.stage()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    for scenario in scenarios() {
        let sandbox = ScriptSandbox::new(scenario.config)?;
        println!("{}", scenario.title);
        println!("  within:  {}", describe(&sandbox.execute(scenario.fits).await));
        println!("  beyond:  {}", describe(&sandbox.execute(scenario.breaches).await));
    }
    Ok(())
}
