use flowtrace_core::{
    AnalyzerConfig, ColumnLineageResult, FlowBatch, FlowResult, ImpactReport,
};
use schemars::generate::SchemaSettings;
use serde_json::{json, Value};

fn generate_schema() -> Value {
    let settings = SchemaSettings::draft07();
    let generator = settings.into_generator();
    json!({
        "AnalyzerConfig": generator.clone().into_root_schema_for::<AnalyzerConfig>(),
        "FlowBatch": generator.clone().into_root_schema_for::<FlowBatch>(),
        "FlowResult": generator.clone().into_root_schema_for::<FlowResult>(),
        "ImpactReport": generator.clone().into_root_schema_for::<ImpactReport>(),
        "ColumnLineageResult": generator.into_root_schema_for::<ColumnLineageResult>(),
    })
}

fn properties<'a>(schema: &'a Value, name: &str) -> &'a serde_json::Map<String, Value> {
    schema[name]["properties"]
        .as_object()
        .unwrap_or_else(|| panic!("{name} has no properties"))
}

#[test]
fn result_schemas_use_camel_case_fields() {
    let schema = generate_schema();

    let flow = properties(&schema, "FlowResult");
    for field in ["start", "direction", "nodes", "edges", "paths", "columnEdges", "maxDepth"] {
        assert!(flow.contains_key(field), "FlowResult lacks {field}");
    }

    let impact = properties(&schema, "ImpactReport");
    for field in ["changeType", "target", "severity", "summary", "direct", "transitive"] {
        assert!(impact.contains_key(field), "ImpactReport lacks {field}");
    }

    let batch = properties(&schema, "FlowBatch");
    assert!(batch.contains_key("successCount"));
    assert!(batch.contains_key("errorCount"));

    let config = properties(&schema, "AnalyzerConfig");
    assert!(config.contains_key("defaultDepth"));
    assert!(config.contains_key("suggestionLimit"));
}

#[test]
fn column_lineage_schema_is_an_object() {
    let schema = generate_schema();
    assert_eq!(schema["ColumnLineageResult"]["type"], "object");
    assert!(properties(&schema, "ColumnLineageResult").contains_key("upstream"));
}

#[test]
#[ignore]
fn print_api_schema() {
    println!(
        "{}",
        serde_json::to_string_pretty(&generate_schema()).expect("serialize schema")
    );
}
