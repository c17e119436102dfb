//! Fuzz target for batch splitting and parsing.
//!
//! `parse_batch()` must never panic; bad statements land in `failures`.

#![no_main]

use arbitrary::Arbitrary;
use flowtrace_core::{parse_batch, Dialect};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    sql: String,
    dialect_idx: u8,
}

impl FuzzInput {
    fn dialect(&self) -> Dialect {
        match self.dialect_idx % 5 {
            0 => Dialect::Generic,
            1 => Dialect::Postgres,
            2 => Dialect::Snowflake,
            3 => Dialect::Bigquery,
            _ => Dialect::Duckdb,
        }
    }
}

fuzz_target!(|input: FuzzInput| {
    let batch = parse_batch(&input.sql, input.dialect());
    for failure in &batch.failures {
        assert!(failure.line >= 1);
    }
});
