use std::path::Path;
use std::process::{Command, Output};

use tempfile::{tempdir, TempDir};

const CUSTOMERS: &str = "CREATE TABLE customers (id INT, name TEXT);";
const ORDERS: &str = "CREATE TABLE orders (id INT, customer_id INT);";
const VIEW: &str = "CREATE VIEW customer_orders AS
SELECT c.name, COUNT(o.id)
FROM customers c
LEFT JOIN orders o ON c.id = o.customer_id
GROUP BY c.name;";

/// A models directory with one file per object.
fn models() -> TempDir {
    let dir = tempdir().expect("temp dir");
    std::fs::write(dir.path().join("customers.sql"), CUSTOMERS).expect("write sql");
    std::fs::write(dir.path().join("orders.sql"), ORDERS).expect("write sql");
    std::fs::write(dir.path().join("customer_orders.sql"), VIEW).expect("write sql");
    dir
}

fn flowtrace(args: &[&str], dir: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_flowtrace"))
        .args(args)
        .arg(dir.to_str().expect("dir path"))
        .env_remove("FLOWTRACE_LOG")
        .output()
        .expect("run CLI")
}

fn json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("valid JSON output")
}

#[test]
fn test_upstream_json() {
    let dir = models();
    let output = flowtrace(
        &["upstream", "--node", "view:customer_orders", "--depth", "-1", "-f", "json"],
        dir.path(),
    );
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let value = json(&output);
    let mut ids: Vec<&str> = value["nodes"]
        .as_array()
        .expect("nodes")
        .iter()
        .map(|n| n["id"].as_str().expect("id"))
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["table:customers", "table:orders"]);
    assert!(value.get("maxDepth").is_none());
}

#[test]
fn test_impact_drop_text() {
    let dir = models();
    let output = flowtrace(&["impact", "--table", "orders", "--change", "drop"], dir.path());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "Expected exit 0, got: {stdout}");
    assert!(stdout.contains("Severity: CRITICAL"), "{stdout}");
    assert!(stdout.contains("customer_orders"), "{stdout}");
    assert!(stdout.contains("view definitions"), "{stdout}");
}

#[test]
fn test_columns_compact_json() {
    let dir = models();
    let output = flowtrace(
        &["columns", "--table", "customer_orders", "--column", "count", "-f", "json", "-c"],
        dir.path(),
    );
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim_end().lines().count(), 1);
    assert!(stdout.contains("\"transform\":\"aggregated\""), "{stdout}");
    assert!(stdout.contains("column:orders.id"), "{stdout}");
}

#[test]
fn test_unknown_node_exits_with_suggestion() {
    let dir = models();
    let output = flowtrace(&["downstream", "--node", "custmers"], dir.path());
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("table:customers"), "{stderr}");
}

#[test]
fn test_flow_reports_failed_statements() {
    let dir = tempdir().expect("temp dir");
    std::fs::write(
        dir.path().join("batch.sql"),
        "SELECT id FROM orders;\nSELEC broken;",
    )
    .expect("write sql");
    let output = flowtrace(&["flow", "-f", "json"], dir.path());
    assert_eq!(output.status.code(), Some(1));

    let value = json(&output);
    let batch = &value[0];
    assert_eq!(batch["successCount"], 1);
    assert_eq!(batch["errorCount"], 1);
    assert_eq!(batch["errors"][0]["line"], 2);
    assert!(batch["file"].as_str().expect("file").ends_with("batch.sql"));
}

#[test]
fn test_graph_with_default_schema() {
    let dir = tempdir().expect("temp dir");
    std::fs::write(
        dir.path().join("model.sql"),
        "CREATE TABLE public.orders (id INT);\nCREATE VIEW v AS SELECT id FROM orders;",
    )
    .expect("write sql");
    let output = flowtrace(&["graph", "--default-schema", "public"], dir.path());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "{stdout}");
    assert!(stdout.contains("view:v <- table:public.orders"), "{stdout}");
}

#[test]
fn test_bad_config_is_a_configuration_error() {
    let dir = models();
    let config = dir.path().join("flowtrace.json");
    std::fs::write(&config, "{ not json").expect("write config");
    let output = flowtrace(
        &["graph", "--config", config.to_str().expect("config path")],
        dir.path(),
    );
    assert_eq!(output.status.code(), Some(66));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("flowtrace: error: Invalid config file"), "{stderr}");
}

#[test]
fn test_config_file_sets_default_depth() {
    let dir = tempdir().expect("temp dir");
    std::fs::write(
        dir.path().join("chain.sql"),
        "CREATE TABLE a (id INT);
         CREATE VIEW b AS SELECT id FROM a;
         CREATE VIEW c AS SELECT id FROM b;",
    )
    .expect("write sql");
    let config = dir.path().join("settings.json");
    std::fs::write(&config, r#"{"defaultDepth": 1}"#).expect("write config");

    let output = flowtrace(
        &[
            "downstream",
            "--node",
            "a",
            "-f",
            "json",
            "--config",
            config.to_str().expect("config path"),
        ],
        dir.path(),
    );
    assert!(output.status.success());
    let value = json(&output);
    assert_eq!(value["nodes"].as_array().expect("nodes").len(), 1);
    assert_eq!(value["maxDepth"], 1);
}
