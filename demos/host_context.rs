//! Example of exposing host objects and modules to scripts.
//!
//! Mimics a cloud SDK: a client object whose methods return resource records,
//! plus an importable module. Records implement the export hook and serialize
//! as structured data; the client itself does not, so returning it is lossy.
//!
//! Run with: cargo run --example host_context --features telemetry

use std::time::Duration;

use policy_script_sandbox_rs::prelude::*;
use policy_script_sandbox_rs::telemetry::init_tracing;
use policy_script_sandbox_rs::{code_snippet_schema, SandboxBuilder};
use serde_json::json;
use tracing::Level;

struct Bucket {
    name: String,
    size_gb: i64,
}

impl HostObject for Bucket {
    fn type_name(&self) -> &str {
        "Bucket"
    }

    fn get_attr(&self, name: &str) -> std::result::Result<Option<Value>, HostError> {
        Ok(match name {
            "name" => Some(Value::from(self.name.as_str())),
            "size_gb" => Some(Value::Int(self.size_gb)),
            _ => None,
        })
    }

    fn export(&self) -> Option<std::result::Result<Value, HostError>> {
        Some(Ok(Value::dict_from([
            ("name", Value::from(self.name.as_str())),
            ("size_gb", Value::Int(self.size_gb)),
        ])))
    }
}

struct StorageClient {
    namespace: String,
}

impl HostObject for StorageClient {
    fn type_name(&self) -> &str {
        "StorageClient"
    }

    fn has_method(&self, name: &str) -> bool {
        name == "list_buckets"
    }

    fn call_method(&self, name: &str, args: &CallArgs) -> std::result::Result<Value, HostError> {
        match name {
            "list_buckets" => {
                args.check_keywords("list_buckets", &["prefix"])?;
                let prefix = match args.keyword("prefix") {
                    Some(value) => value
                        .as_str()
                        .ok_or_else(|| HostError::new("TypeError", "prefix must be str"))?
                        .to_string(),
                    None => String::new(),
                };
                let buckets = [("logs", 120), ("backups", 900), ("logs-archive", 3400)]
                    .into_iter()
                    .filter(|(name, _)| name.starts_with(&prefix))
                    .map(|(name, size_gb)| {
                        Value::object(Bucket {
                            name: name.to_string(),
                            size_gb,
                        })
                    })
                    .collect();
                Ok(Value::list(buckets))
            }
            other => Err(HostError::new(
                "AttributeError",
                format!("'StorageClient' object has no attribute '{other}'"),
            )),
        }
    }

    fn repr(&self) -> String {
        format!("<StorageClient namespace={}>", self.namespace)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing(false, Level::DEBUG);

    let config = SandboxConfig::builder()
        .timeout(Duration::from_secs(5))
        .build();

    let sandbox = SandboxBuilder::new(config)
        .object(
            "storage",
            StorageClient {
                namespace: "acme".to_string(),
            },
        )
        .data("region", json!("eu-frankfurt-1"))
        .module(
            HostModule::new("units")
                .with("GB_PER_TB", json!(1024))
                .with_function("to_tb", |args: &CallArgs| {
                    let gb = args.require(0, "gb")?;
                    match gb.as_float() {
                        Some(v) => Ok(Value::Float(v / 1024.0)),
                        None => Err(HostError::new("TypeError", "gb must be a number")),
                    }
                }),
        )
        .build()?;

    println!("=== Exported records ===");
    println!(
        "{}",
        sandbox.run("result = storage.list_buckets(prefix='logs')").await
    );

    println!("\n=== Query with a registered module ===");
    let code = r#"
from units import to_tb
sizes = [b.size_gb for b in storage.list_buckets()]
result = {"region": region, "total_tb": round(to_tb(sum(sizes)), 2)}
"#;
    println!("{}", sandbox.run(code).await);

    println!("\n=== Lossy result ===");
    println!("{}", sandbox.run("result = [storage, region]").await);

    println!("\n=== Tool call ===");
    let schema = code_snippet_schema("Python code using the 'storage' client; assign to result");
    println!("schema: {}", schema);
    let arguments = json!({"code": "result = max(b.size_gb for b in storage.list_buckets())"});
    println!("{}", sandbox.run_tool(&arguments).await);

    Ok(())
}
