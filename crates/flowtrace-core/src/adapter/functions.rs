//! Function classification used when inferring column transforms.

use std::collections::HashSet;
use std::sync::LazyLock;

/// Functions that collapse many input rows into one value.
static AGGREGATE_FUNCTIONS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "any_value",
        "approx_count_distinct",
        "approx_distinct",
        "approx_percentile",
        "approx_quantile",
        "arbitrary",
        "array_agg",
        "avg",
        "bit_and",
        "bit_or",
        "bool_and",
        "bool_or",
        "corr",
        "count",
        "count_if",
        "countif",
        "covar_pop",
        "covar_samp",
        "every",
        "group_concat",
        "json_agg",
        "json_object_agg",
        "jsonb_agg",
        "listagg",
        "max",
        "max_by",
        "median",
        "min",
        "min_by",
        "mode",
        "object_agg",
        "percentile_cont",
        "percentile_disc",
        "stddev",
        "stddev_pop",
        "stddev_samp",
        "string_agg",
        "sum",
        "var_pop",
        "var_samp",
        "variance",
    ]
    .into_iter()
    .collect()
});

/// Checks if a function is an aggregate function (e.g., SUM, COUNT, AVG).
///
/// `name` may be schema-qualified; only the last segment is compared,
/// case-insensitively.
pub fn is_aggregate_function(name: &str) -> bool {
    let simple = name.rsplit('.').next().unwrap_or(name);
    AGGREGATE_FUNCTIONS.contains(simple.to_ascii_lowercase().as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregates_are_case_insensitive() {
        assert!(is_aggregate_function("COUNT"));
        assert!(is_aggregate_function("pg_catalog.sum"));
        assert!(!is_aggregate_function("coalesce"));
        assert!(!is_aggregate_function("row_number"));
    }
}
