//! Expression walking: column references, aggregates, windows, CASE and subqueries.

use sqlparser::ast::{Expr, Function, FunctionArg, FunctionArgExpr, FunctionArguments, WindowType};

use super::functions::is_aggregate_function;
use super::ir::{CaseIr, ColumnRef, QueryIr, WindowIr};
use super::naming::{default_output_name, ident_name};
use super::Adapter;
use crate::types::{CaseBranch, TransformKind};

/// What one expression references and computes.
#[derive(Debug, Default)]
pub(crate) struct ExprFacts {
    pub(crate) columns: Vec<ColumnRef>,
    /// Non-windowed aggregate calls, as written.
    pub(crate) aggregates: Vec<String>,
    pub(crate) windows: Vec<WindowIr>,
    pub(crate) cases: Vec<CaseIr>,
    pub(crate) subqueries: Vec<QueryIr>,
}

impl ExprFacts {
    fn push_column(&mut self, column: ColumnRef) {
        if !self.columns.contains(&column) {
            self.columns.push(column);
        }
    }

    pub(crate) fn absorb(&mut self, other: ExprFacts) {
        for column in other.columns {
            self.push_column(column);
        }
        self.aggregates.extend(other.aggregates);
        self.windows.extend(other.windows);
        self.cases.extend(other.cases);
        self.subqueries.extend(other.subqueries);
    }
}

/// Transform an output column applies to its sources.
pub(crate) fn classify_transform(expr: &Expr, output: &str, facts: &ExprFacts) -> TransformKind {
    match expr {
        Expr::Nested(inner) => classify_transform(inner, output, facts),
        Expr::Identifier(_) | Expr::CompoundIdentifier(_) => {
            if default_output_name(expr) == output {
                TransformKind::Passthrough
            } else {
                TransformKind::Renamed
            }
        }
        _ if !facts.aggregates.is_empty() => TransformKind::Aggregated,
        _ => TransformKind::Calculated,
    }
}

impl Adapter {
    pub(crate) fn facts(&self, expr: &Expr) -> ExprFacts {
        let mut facts = ExprFacts::default();
        self.visit_expr(expr, &mut facts);
        facts
    }

    fn visit_expr(&self, expr: &Expr, facts: &mut ExprFacts) {
        match expr {
            Expr::Identifier(ident) => facts.push_column(ColumnRef::new(None, &ident_name(ident))),
            Expr::CompoundIdentifier(parts) => {
                if let Some((last, qualifier)) = parts.split_last() {
                    let qualifier = qualifier.iter().map(ident_name).collect::<Vec<_>>().join(".");
                    let qualifier = (!qualifier.is_empty()).then_some(qualifier);
                    facts.push_column(ColumnRef::new(qualifier.as_deref(), &ident_name(last)));
                }
            }
            Expr::BinaryOp { left, right, .. }
            | Expr::AnyOp { left, right, .. }
            | Expr::AllOp { left, right, .. }
            | Expr::IsDistinctFrom(left, right)
            | Expr::IsNotDistinctFrom(left, right) => {
                self.visit_expr(left, facts);
                self.visit_expr(right, facts);
            }
            Expr::Like { expr, pattern, .. }
            | Expr::ILike { expr, pattern, .. }
            | Expr::SimilarTo { expr, pattern, .. }
            | Expr::RLike { expr, pattern, .. } => {
                self.visit_expr(expr, facts);
                self.visit_expr(pattern, facts);
            }
            Expr::AtTimeZone {
                timestamp,
                time_zone,
            } => {
                self.visit_expr(timestamp, facts);
                self.visit_expr(time_zone, facts);
            }
            Expr::Position { expr, r#in } => {
                self.visit_expr(expr, facts);
                self.visit_expr(r#in, facts);
            }
            Expr::Substring {
                expr,
                substring_from,
                substring_for,
                ..
            } => {
                self.visit_expr(expr, facts);
                for bound in [substring_from, substring_for].into_iter().flatten() {
                    self.visit_expr(bound, facts);
                }
            }
            Expr::Overlay {
                expr,
                overlay_what,
                overlay_from,
                overlay_for,
            } => {
                self.visit_expr(expr, facts);
                self.visit_expr(overlay_what, facts);
                self.visit_expr(overlay_from, facts);
                if let Some(length) = overlay_for {
                    self.visit_expr(length, facts);
                }
            }
            Expr::UnaryOp { expr: inner, .. }
            | Expr::Nested(inner)
            | Expr::IsNull(inner)
            | Expr::IsNotNull(inner)
            | Expr::IsTrue(inner)
            | Expr::IsNotTrue(inner)
            | Expr::IsFalse(inner)
            | Expr::IsNotFalse(inner)
            | Expr::IsUnknown(inner)
            | Expr::IsNotUnknown(inner)
            | Expr::IsNormalized { expr: inner, .. }
            | Expr::Cast { expr: inner, .. }
            | Expr::Convert { expr: inner, .. }
            | Expr::Ceil { expr: inner, .. }
            | Expr::Floor { expr: inner, .. }
            | Expr::Collate { expr: inner, .. }
            | Expr::Extract { expr: inner, .. }
            | Expr::Trim { expr: inner, .. } => self.visit_expr(inner, facts),
            Expr::InList { expr, list, .. } => {
                self.visit_expr(expr, facts);
                for item in list {
                    self.visit_expr(item, facts);
                }
            }
            Expr::Tuple(items) => {
                for item in items {
                    self.visit_expr(item, facts);
                }
            }
            Expr::Between {
                expr, low, high, ..
            } => {
                self.visit_expr(expr, facts);
                self.visit_expr(low, facts);
                self.visit_expr(high, facts);
            }
            Expr::InSubquery { expr, subquery, .. } => {
                self.visit_expr(expr, facts);
                facts.subqueries.push(self.query(subquery));
            }
            Expr::Subquery(subquery) | Expr::Exists { subquery, .. } => {
                facts.subqueries.push(self.query(subquery));
            }
            Expr::Case {
                operand,
                conditions,
                else_result,
                ..
            } => {
                facts.cases.push(CaseIr {
                    operand: operand.as_ref().map(ToString::to_string),
                    branches: conditions
                        .iter()
                        .map(|when| CaseBranch {
                            condition: when.condition.to_string(),
                            result: when.result.to_string(),
                        })
                        .collect(),
                    else_result: else_result.as_ref().map(ToString::to_string),
                });
                if let Some(operand) = operand {
                    self.visit_expr(operand, facts);
                }
                for when in conditions {
                    self.visit_expr(&when.condition, facts);
                    self.visit_expr(&when.result, facts);
                }
                if let Some(otherwise) = else_result {
                    self.visit_expr(otherwise, facts);
                }
            }
            Expr::Function(function) => self.visit_function(function, facts),
            _ => {}
        }
    }

    fn visit_function(&self, function: &Function, facts: &mut ExprFacts) {
        match &function.args {
            FunctionArguments::List(list) => {
                for arg in &list.args {
                    match arg {
                        FunctionArg::Unnamed(FunctionArgExpr::Expr(expr))
                        | FunctionArg::Named {
                            arg: FunctionArgExpr::Expr(expr),
                            ..
                        }
                        | FunctionArg::ExprNamed {
                            arg: FunctionArgExpr::Expr(expr),
                            ..
                        } => self.visit_expr(expr, facts),
                        _ => {}
                    }
                }
            }
            FunctionArguments::Subquery(subquery) => facts.subqueries.push(self.query(subquery)),
            FunctionArguments::None => {}
        }
        if let Some(filter) = &function.filter {
            self.visit_expr(filter, facts);
        }

        let call = format!("{}{}", function.name, function.args);
        match &function.over {
            Some(WindowType::WindowSpec(spec)) => {
                for expr in &spec.partition_by {
                    self.visit_expr(expr, facts);
                }
                for order in &spec.order_by {
                    self.visit_expr(&order.expr, facts);
                }
                facts.windows.push(WindowIr {
                    function: call,
                    partition_by: spec.partition_by.iter().map(ToString::to_string).collect(),
                    order_by: spec.order_by.iter().map(ToString::to_string).collect(),
                    frame: spec.window_frame.as_ref().map(|frame| match &frame.end_bound {
                        Some(end_bound) => format!(
                            "{} BETWEEN {} AND {}",
                            frame.units, frame.start_bound, end_bound
                        ),
                        None => format!("{} {}", frame.units, frame.start_bound),
                    }),
                });
            }
            Some(WindowType::NamedWindow(window)) => facts.windows.push(WindowIr {
                function: format!("{call} OVER {window}"),
                partition_by: Vec::new(),
                order_by: Vec::new(),
                frame: None,
            }),
            None if is_aggregate_function(&function.name.to_string()) => {
                facts.aggregates.push(function.to_string());
            }
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use sqlparser::dialect::GenericDialect;
    use sqlparser::parser::Parser;

    fn expr(sql: &str) -> Expr {
        Parser::new(&GenericDialect {})
            .try_with_sql(sql)
            .unwrap()
            .parse_expr()
            .unwrap()
    }

    #[test]
    fn collects_qualified_and_bare_columns_once() {
        let facts = Adapter::new(0).facts(&expr("o.amount * rate + o.amount"));
        assert_eq!(
            facts.columns,
            vec![ColumnRef::new(Some("o"), "amount"), ColumnRef::new(None, "rate")]
        );
    }

    #[test]
    fn aggregate_and_window_calls_are_separated() {
        let facts = Adapter::new(0).facts(&expr(
            "SUM(x) + ROW_NUMBER() OVER (PARTITION BY region ORDER BY created_at)",
        ));
        assert_eq!(facts.aggregates, vec!["SUM(x)".to_string()]);
        assert_eq!(facts.windows.len(), 1);
        assert_eq!(facts.windows[0].partition_by, vec!["region".to_string()]);
        assert_eq!(
            facts.columns.iter().map(|c| c.column.as_str()).collect::<Vec<_>>(),
            vec!["x", "region", "created_at"]
        );
    }

    #[test]
    fn windowed_aggregate_is_not_an_aggregate() {
        let facts = Adapter::new(0).facts(&expr("SUM(amount) OVER (PARTITION BY id)"));
        assert!(facts.aggregates.is_empty());
        assert_eq!(facts.windows.len(), 1);
    }

    #[test]
    fn case_branches_are_recorded() {
        let facts = Adapter::new(0).facts(&expr(
            "CASE WHEN status = 'x' THEN amount ELSE 0 END",
        ));
        assert_eq!(facts.cases.len(), 1);
        assert_eq!(facts.cases[0].branches[0].condition, "status = 'x'");
        assert_eq!(facts.cases[0].else_result.as_deref(), Some("0"));
    }

    #[test]
    fn transforms_are_classified() {
        let adapter = Adapter::new(0);
        let check = |sql: &str, output: &str| {
            let parsed = expr(sql);
            classify_transform(&parsed, output, &adapter.facts(&parsed))
        };
        assert_eq!(check("c.name", "name"), TransformKind::Passthrough);
        assert_eq!(check("c.name", "customer_name"), TransformKind::Renamed);
        assert_eq!(check("COUNT(o.id)", "count"), TransformKind::Aggregated);
        assert_eq!(check("price * qty", "total"), TransformKind::Calculated);
    }

    #[rstest]
    #[case("flag IS NOT TRUE", &["flag"])]
    #[case("flag IS UNKNOWN", &["flag"])]
    #[case("created_at AT TIME ZONE tz", &["created_at", "tz"])]
    #[case("CEIL(price)", &["price"])]
    #[case("FLOOR(price)", &["price"])]
    #[case("name SIMILAR TO pattern", &["name", "pattern"])]
    #[case("SUBSTRING(code FROM start_at FOR width)", &["code", "start_at", "width"])]
    #[case("POSITION(needle IN haystack)", &["needle", "haystack"])]
    fn wrapped_operands_are_collected(#[case] sql: &str, #[case] expected: &[&str]) {
        let facts = Adapter::new(0).facts(&expr(sql));
        let columns: Vec<&str> = facts.columns.iter().map(|c| c.column.as_str()).collect();
        assert_eq!(columns, expected);
    }

    #[test]
    fn subqueries_are_adapted() {
        let facts = Adapter::new(0).facts(&expr("id IN (SELECT customer_id FROM orders)"));
        assert_eq!(facts.subqueries.len(), 1);
        assert_eq!(facts.columns, vec![ColumnRef::new(None, "id")]);
    }
}
