//! End-to-end tests of the validate-then-execute pipeline.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use policy_script_sandbox_rs::prelude::*;
use policy_script_sandbox_rs::{code_snippet_schema, SandboxBuilder};
use serde_json::json;

/// A compartment record that knows how to describe itself as data.
struct Compartment {
    name: &'static str,
    id: &'static str,
}

impl HostObject for Compartment {
    fn type_name(&self) -> &str {
        "Compartment"
    }

    fn get_attr(&self, name: &str) -> std::result::Result<Option<Value>, HostError> {
        Ok(match name {
            "name" => Some(Value::from(self.name)),
            "id" => Some(Value::from(self.id)),
            _ => None,
        })
    }

    fn export(&self) -> Option<std::result::Result<Value, HostError>> {
        Some(Ok(Value::dict_from([
            ("name", Value::from(self.name)),
            ("id", Value::from(self.id)),
        ])))
    }
}

/// A client handle with no structured form.
struct IdentityClient {
    calls: AtomicUsize,
}

impl HostObject for IdentityClient {
    fn type_name(&self) -> &str {
        "IdentityClient"
    }

    fn has_method(&self, name: &str) -> bool {
        matches!(name, "list_compartments" | "get_tenancy")
    }

    fn call_method(&self, name: &str, args: &CallArgs) -> std::result::Result<Value, HostError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match name {
            "list_compartments" => {
                args.check_keywords("list_compartments", &[])?;
                Ok(Value::list(vec![
                    Value::object(Compartment {
                        name: "prod",
                        id: "ocid1.compartment.oc1..prod",
                    }),
                    Value::object(Compartment {
                        name: "dev",
                        id: "ocid1.compartment.oc1..dev",
                    }),
                ]))
            }
            "get_tenancy" => Err(HostError::new(
                "ServiceError",
                "NotAuthorizedOrNotFound: tenancy not found",
            )),
            _ => Err(HostError::new(
                "AttributeError",
                format!("'IdentityClient' object has no attribute '{name}'"),
            )),
        }
    }

    fn repr(&self) -> String {
        "<IdentityClient region=eu-frankfurt-1>".to_string()
    }
}

fn config() -> SandboxConfig {
    SandboxConfig::builder()
        .timeout(Duration::from_secs(5))
        .build()
}

fn oci_sandbox() -> ScriptSandbox {
    SandboxBuilder::new(config())
        .object(
            "identity",
            IdentityClient {
                calls: AtomicUsize::new(0),
            },
        )
        .data("tenancy", json!({"id": "ocid1.tenancy.oc1..aaa", "home_region": "us-ashburn-1"}))
        .build()
        .unwrap()
}

#[test]
fn test_scenario_a_arithmetic() {
    let sandbox = ScriptSandbox::new(config()).unwrap();
    assert_eq!(sandbox.run_sync("result = 1 + 1"), r#"{"result": 2}"#);
}

#[test]
fn test_scenario_b_unauthorized_import() {
    let sandbox = ScriptSandbox::new(config()).unwrap();
    assert_eq!(
        sandbox.run_sync("import os\nresult = 1"),
        r#"{"error": "Unauthorized imports: os. Only json, math, operator are allowed."}"#
    );
}

#[test]
fn test_scenario_c_missing_output() {
    let sandbox = ScriptSandbox::new(config()).unwrap();
    assert_eq!(
        sandbox.run_sync("x = 5"),
        r#"{"error": "Code must set a 'result' variable with the query output"}"#
    );
}

#[test]
fn test_scenario_d_none_result() {
    let sandbox = ScriptSandbox::new(config()).unwrap();
    assert_eq!(
        sandbox.run_sync("result = None"),
        r#"{"error": "Result cannot be None"}"#
    );
}

#[test]
fn test_scenario_e_syntax_error() {
    let sandbox = ScriptSandbox::new(config()).unwrap();
    let payload = sandbox.run_sync("result = (1 + 2");
    assert!(payload.starts_with(r#"{"error": "Syntax error: "#), "{payload}");
    assert!(payload.contains("line 1"), "{payload}");
}

#[test]
fn test_scenario_f_host_exception() {
    let sandbox = oci_sandbox();
    assert_eq!(
        sandbox.run_sync("result = identity.get_tenancy()"),
        r#"{"error": "NotAuthorizedOrNotFound: tenancy not found"}"#
    );
}

#[test]
fn test_exported_host_objects() {
    let sandbox = oci_sandbox();
    let evaluation = sandbox
        .evaluate("result = identity.list_compartments()")
        .unwrap();
    assert!(!evaluation.is_lossy());
    assert_eq!(
        evaluation.payload(),
        json!({"result": [
            {"name": "prod", "id": "ocid1.compartment.oc1..prod"},
            {"name": "dev", "id": "ocid1.compartment.oc1..dev"},
        ]})
    );
}

#[test]
fn test_query_over_host_objects() {
    let sandbox = oci_sandbox();
    let script = r#"
names = sorted(c.name for c in identity.list_compartments())
result = {"tenancy": tenancy["id"], "names": names, "count": len(names)}
"#;
    assert_eq!(
        sandbox.run_sync(script),
        r#"{"result": {"tenancy": "ocid1.tenancy.oc1..aaa", "names": ["dev", "prod"], "count": 2}}"#
    );
}

#[test]
fn test_non_exportable_object_is_lossy() {
    let sandbox = oci_sandbox();
    assert_eq!(
        sandbox.run_sync("result = identity"),
        r#"{"result": "<IdentityClient region=eu-frankfurt-1>", "lossy": true}"#
    );

    let evaluation = sandbox.evaluate("result = {'client': identity, 'n': 1}").unwrap();
    assert!(evaluation.is_lossy());
    assert_eq!(evaluation.payload()["result"]["n"], json!(1));
}

#[test]
fn test_functions_are_coerced() {
    let sandbox = ScriptSandbox::new(config()).unwrap();
    let evaluation = sandbox.evaluate("def f():\n    pass\nresult = [f]").unwrap();
    assert!(evaluation.is_lossy());
    assert!(evaluation.payload()["result"][0].is_string());
}

#[test]
fn test_unserializable_results() {
    let sandbox = ScriptSandbox::new(config()).unwrap();

    let payload = sandbox.run_sync("result = {(1, 2): 'pair'}");
    assert!(
        payload.starts_with(r#"{"error": "Result could not be serialized: "#),
        "{payload}"
    );

    let payload = sandbox.run_sync("x = []\nx.append(x)\nresult = x");
    assert!(
        payload.starts_with(r#"{"error": "Result could not be serialized: "#),
        "{payload}"
    );
}

#[test]
fn test_dict_key_coercion() {
    let sandbox = ScriptSandbox::new(config()).unwrap();
    assert_eq!(
        sandbox.run_sync("result = {1: 'a', 2.5: 'x', False: 'b', None: 'c', 'k': 'd'}"),
        r#"{"result": {"1": "a", "2.5": "x", "false": "b", "null": "c", "k": "d"}}"#
    );
}

#[test]
fn test_containers_serialize_structurally() {
    let sandbox = ScriptSandbox::new(config()).unwrap();
    assert_eq!(
        sandbox.run_sync("result = {'t': (1, 2.5), 's': 'é', 'b': [True, False, None]}"),
        r#"{"result": {"t": [1, 2.5], "s": "é", "b": [true, false, null]}}"#
    );
}

#[test]
fn test_helper_modules() {
    let sandbox = ScriptSandbox::new(config()).unwrap();
    let script = r#"
import json
import math
from operator import itemgetter

rows = json.loads('[{"n": "b", "v": 2}, {"n": "a", "v": 9}]')
rows = sorted(rows, key=itemgetter("n"))
result = {
    "first": rows[0]["n"],
    "root": math.sqrt(rows[1]["v"]),
    "text": json.dumps({"k": [1, 2]}),
}
"#;
    assert_eq!(
        sandbox.run_sync(script),
        r#"{"result": {"first": "a", "root": 1.4142135623730951, "text": "{\"k\": [1, 2]}"}}"#
    );
}

#[test]
fn test_custom_output_variable() {
    let config = SandboxConfig::builder().output_variable("answer").build();
    let sandbox = ScriptSandbox::new(config).unwrap();

    assert_eq!(sandbox.run_sync("answer = 'ok'"), r#"{"result": "ok"}"#);
    assert_eq!(
        sandbox.run_sync("result = 1"),
        r#"{"error": "Code must set a 'answer' variable with the query output"}"#
    );
}

#[test]
fn test_conditional_binding_is_checked_at_runtime() {
    let sandbox = ScriptSandbox::new(config()).unwrap();
    assert_eq!(
        sandbox.run_sync("if 1 > 2:\n    result = 1\n"),
        r#"{"error": "Code did not assign the 'result' variable during execution"}"#
    );
}

#[test]
fn test_idempotence() {
    let sandbox = oci_sandbox();
    let script = "result = [c.id for c in identity.list_compartments() if c.name != 'dev']";
    let first = sandbox.run_sync(script);
    for _ in 0..5 {
        assert_eq!(sandbox.run_sync(script), first);
    }
    assert_eq!(first, r#"{"result": ["ocid1.compartment.oc1..prod"]}"#);
}

#[test]
fn test_print_is_captured() {
    let sandbox = ScriptSandbox::new(config()).unwrap();
    let evaluation = sandbox
        .evaluate("for i in range(3):\n    print('row', i, sep='-')\nresult = 'done'")
        .unwrap();
    assert_eq!(evaluation.stdout, "row-0\nrow-1\nrow-2\n");
    assert_eq!(evaluation.to_json_string(), r#"{"result": "done"}"#);
}

#[test]
fn test_execution_metadata() {
    let sandbox = ScriptSandbox::new(config()).unwrap();
    let evaluation = sandbox
        .evaluate("total = 0\nfor i in range(100):\n    total += i\nresult = total")
        .unwrap();
    assert_eq!(evaluation.payload(), json!({"result": 4950}));
    assert!(evaluation.metadata.steps >= 100);
}

#[test]
fn test_registered_module() {
    let sandbox = SandboxBuilder::new(config())
        .module(
            HostModule::new("oci")
                .with("regions", json!(["us-ashburn-1", "eu-frankfurt-1"]))
                .with_submodule(
                    HostModule::new("oci.identity")
                        .with_function("home", |_args: &CallArgs| Ok(Value::from("us-ashburn-1"))),
                ),
        )
        .build()
        .unwrap();

    assert_eq!(
        sandbox.run_sync("import oci\nresult = oci.regions[-1]"),
        r#"{"result": "eu-frankfurt-1"}"#
    );
    assert_eq!(
        sandbox.run_sync("import oci.identity as ident\nresult = ident.home()"),
        r#"{"result": "us-ashburn-1"}"#
    );
    assert_eq!(
        sandbox.run_sync("from oci import identity\nresult = identity.home()"),
        r#"{"result": "us-ashburn-1"}"#
    );
}

#[tokio::test]
async fn test_async_run() {
    let sandbox = oci_sandbox();
    assert_eq!(
        sandbox.run("result = tenancy['home_region']").await,
        r#"{"result": "us-ashburn-1"}"#
    );
}

#[tokio::test]
async fn test_concurrent_invocations() {
    let sandbox = oci_sandbox();

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let sandbox = sandbox.clone();
            tokio::spawn(async move {
                let payload = sandbox
                    .run(&format!("result = [{i}] * 3 + [len(identity.list_compartments())]"))
                    .await;
                (i, payload)
            })
        })
        .collect();

    for handle in handles {
        let (i, payload) = handle.await.unwrap();
        assert_eq!(payload, format!(r#"{{"result": [{i}, {i}, {i}, 2]}}"#));
    }
}

#[tokio::test]
async fn test_timeout_does_not_poison_sandbox() {
    let config = SandboxConfig::builder()
        .timeout(Duration::from_millis(100))
        .build();
    let sandbox = ScriptSandbox::new(config).unwrap();

    let payload = sandbox.run("while True:\n    pass\nresult = 1").await;
    assert!(payload.starts_with(r#"{"error": "Execution timed out"#), "{payload}");
    assert_eq!(sandbox.run("result = 'still fine'").await, r#"{"result": "still fine"}"#);
}

#[tokio::test]
async fn test_tool_adapter() {
    let sandbox = oci_sandbox();

    let schema = code_snippet_schema("Python code to run against the OCI SDK");
    assert_eq!(schema["required"], json!(["code"]));
    assert_eq!(schema["properties"]["code"]["type"], json!("string"));

    assert_eq!(
        sandbox.run_tool(&json!({"code": "result = 6 * 7"})).await,
        r#"{"result": 42}"#
    );
    assert_eq!(
        sandbox.run_tool(&json!({"code": 42})).await,
        r#"{"error": "Missing required argument: code"}"#
    );
}

#[test]
fn test_host_calls_counted() {
    let client = Arc::new(IdentityClient {
        calls: AtomicUsize::new(0),
    });
    let sandbox = SandboxBuilder::new(config())
        .global("identity", Arc::clone(&client) as Arc<dyn HostObject>)
        .build()
        .unwrap();

    sandbox
        .evaluate("a = identity.list_compartments()\nb = identity.list_compartments()\nresult = len(a + b)")
        .unwrap();
    assert_eq!(client.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_blocking_entry_point_from_sync_code() {
    let sandbox = ScriptSandbox::new(config()).unwrap();
    let payload = tokio_test::block_on(sandbox.run("result = sum(range(10))"));
    assert_eq!(payload, r#"{"result": 45}"#);
}
