//! Fan several queries out over one shared sandbox.
//!
//! A `ScriptSandbox` is cheap to clone; every clone shares the configuration
//! and execution context while each invocation gets its own namespace.
//!
//! Run with: cargo run --example concurrent_execution

use policy_script_sandbox_rs::prelude::*;
use serde_json::json;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

const QUERIES: &[(&str, &str)] = &[
    ("sum of squares", "result = sum(i ** 2 for i in range(100))"),
    (
        "multiples of 3",
        "result = len([x for x in range(1000) if x % 3 == 0])",
    ),
    (
        "distinct shapes",
        "result = sorted({i['shape'] for i in instances})",
    ),
    (
        "web tier ocpus",
        "result = sum(i['ocpus'] for i in instances if i['name'].startswith('web'))",
    ),
    ("bad query", "result = instances[10]"),
];

struct Report {
    label: &'static str,
    payload: String,
    elapsed: Duration,
}

#[tokio::main]
async fn main() -> Result<()> {
    let sandbox = ScriptSandbox::builder(
        SandboxConfig::builder()
            .timeout(Duration::from_secs(10))
            .build(),
    )
    .data(
        "instances",
        json!([
            {"name": "web-1", "shape": "VM.Standard.E4.Flex", "ocpus": 2},
            {"name": "web-2", "shape": "VM.Standard.E4.Flex", "ocpus": 2},
            {"name": "db-1", "shape": "VM.Standard3.Flex", "ocpus": 8},
        ]),
    )
    .build()?;

    let wall = Instant::now();
    let mut set = JoinSet::new();
    for &(label, code) in QUERIES {
        let sandbox = sandbox.clone();
        set.spawn(async move {
            let started = Instant::now();
            // `run` never fails; errors come back as `{"error": ...}` payloads.
            let payload = sandbox.run(code).await;
            Report {
                label,
                payload,
                elapsed: started.elapsed(),
            }
        });
    }

    println!("{} queries in flight", QUERIES.len());
    let mut busy = Duration::ZERO;
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(report) => {
                busy += report.elapsed;
                println!(
                    "  [{:>9.3?}] {:<16} {}",
                    report.elapsed, report.label, report.payload
                );
            }
            Err(join_error) => eprintln!("  query task failed: {join_error}"),
        }
    }

    println!(
        "wall clock {:.3?}, summed query time {:.3?}",
        wall.elapsed(),
        busy
    );
    Ok(())
}
