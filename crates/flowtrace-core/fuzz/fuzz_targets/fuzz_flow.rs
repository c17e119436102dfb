//! Fuzz target for flow graph construction.

#![no_main]

use std::collections::HashSet;

use arbitrary::Arbitrary;
use flowtrace_core::{build_flow_batch, Dialect};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    sql: String,
    postgres: bool,
}

fuzz_target!(|input: FuzzInput| {
    let dialect = if input.postgres {
        Dialect::Postgres
    } else {
        Dialect::Generic
    };
    let batch = build_flow_batch(&input.sql, dialect);
    assert_eq!(batch.success_count, batch.statements.len());
    assert_eq!(batch.error_count, batch.errors.len());
    for flow in &batch.statements {
        let ids: HashSet<&str> = flow.graph.nodes.iter().map(|n| n.id.as_str()).collect();
        for edge in &flow.graph.edges {
            assert!(ids.contains(edge.source.as_str()));
            assert!(ids.contains(edge.target.as_str()));
        }
    }
});
