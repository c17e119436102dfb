//! "Did you mean" ranking for lookups that miss.

use std::cmp::min;

use crate::types::{normalize_name, LineageNode};

/// Ranks `nodes` by similarity to `query` and returns at most `limit` node ids.
///
/// Names containing the query always qualify and come first. So do relations
/// whose own name sits inside the query, as long as that name covers at least
/// half of it. Other names qualify when their edit distance is at most
/// `max(3, 40% of the query length)`. Relations rank before columns on ties.
pub(crate) fn suggest<'a>(
    query: &str,
    nodes: impl IntoIterator<Item = &'a LineageNode>,
    limit: usize,
) -> Vec<String> {
    let query = strip_kind_prefix(query);
    let query = normalize_name(query);
    if query.is_empty() || limit == 0 {
        return Vec::new();
    }
    let query_len = query.chars().count();
    let threshold = (query_len * 2 / 5).max(3);

    let mut ranked: Vec<(bool, usize, bool, String)> = Vec::new();
    for node in nodes {
        let name = node.name();
        let simple = node.key.simple_name();
        let is_relation = node.kind().is_relation();
        let contained = is_relation
            && simple.chars().count() * 2 >= query_len
            && query.contains(simple);
        let substring = name.contains(&query) || contained;
        let distance = min(
            levenshtein_distance(&query, name),
            levenshtein_distance(&query, simple),
        );
        if substring || distance <= threshold {
            ranked.push((!substring, distance, !is_relation, node.key.id()));
        }
    }

    ranked.sort();
    ranked.dedup_by(|a, b| a.3 == b.3);
    ranked.into_iter().take(limit).map(|(_, _, _, id)| id).collect()
}

fn strip_kind_prefix(query: &str) -> &str {
    match query.split_once(':') {
        Some((kind, rest)) if kind.parse::<crate::types::NodeKind>().is_ok() => rest,
        _ => query,
    }
}

/// Wagner-Fischer edit distance over chars, keeping one row.
fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    if a_chars.len() < b_chars.len() {
        return levenshtein_distance(b, a);
    }

    let mut previous: Vec<usize> = (0..=b_chars.len()).collect();
    for (i, &ca) in a_chars.iter().enumerate() {
        let mut current = Vec::with_capacity(b_chars.len() + 1);
        current.push(i + 1);
        for (j, &cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != cb);
            current.push(min(min(previous[j + 1] + 1, current[j] + 1), previous[j] + cost));
        }
        previous = current;
    }
    previous[b_chars.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeKey;

    fn nodes(ids: &[&str]) -> Vec<LineageNode> {
        ids.iter()
            .map(|id| LineageNode::new(id.parse::<NodeKey>().unwrap()))
            .collect()
    }

    #[test]
    fn test_edit_distance() {
        assert_eq!(levenshtein_distance("custmers", "customers"), 1);
        assert_eq!(levenshtein_distance("", "abc"), 3);
        assert_eq!(levenshtein_distance("same", "same"), 0);
    }

    #[test]
    fn test_close_name_is_suggested_first() {
        let graph = nodes(&["table:orders", "table:customers", "view:customer_orders"]);
        let suggestions = suggest("custmers", &graph, 5);
        assert_eq!(suggestions.first().map(String::as_str), Some("table:customers"));
        assert!(!suggestions.contains(&"table:orders".to_string()));
    }

    #[test]
    fn test_substring_matches_rank_before_edit_distance() {
        let graph = nodes(&["table:ordrs", "view:order_summary"]);
        let suggestions = suggest("table:order", &graph, 5);
        assert_eq!(suggestions, vec!["view:order_summary", "table:ordrs"]);
    }

    #[test]
    fn test_short_names_inside_the_query_do_not_outrank_the_typo_target() {
        let graph = nodes(&[
            "table:paid_customers",
            "column:paid_customers.id",
            "column:paid_customers.name",
            "table:orders",
            "column:orders.id",
            "column:orders.amount",
            "view:a",
            "column:a.id",
        ]);
        let suggestions = suggest("paid_custmers", &graph, 5);
        assert_eq!(suggestions.first().map(String::as_str), Some("table:paid_customers"));
        assert!(!suggestions.contains(&"view:a".to_string()));
        assert!(!suggestions.contains(&"column:a.id".to_string()));
    }

    #[test]
    fn test_relation_named_inside_query_still_qualifies() {
        let graph = nodes(&["table:orders", "table:customers"]);
        let suggestions = suggest("orders_v2", &graph, 5);
        assert_eq!(suggestions, vec!["table:orders"]);
    }

    #[test]
    fn test_limit_and_empty_query() {
        let graph = nodes(&["table:a1", "table:a2", "table:a3"]);
        assert_eq!(suggest("a", &graph, 2).len(), 2);
        assert!(suggest("", &graph, 5).is_empty());
    }
}
