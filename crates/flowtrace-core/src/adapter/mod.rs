//! AST adapter: sqlparser statements to [`StatementIr`].
//!
//! The adapter is the only place that knows sqlparser's AST shapes. Everything
//! downstream matches exhaustively on the IR variants instead.

mod expression;
mod functions;
pub mod ir;
mod naming;

pub use ir::*;

use sqlparser::ast::{
    ColumnOption, FromTable, GroupByExpr, Join, JoinConstraint, JoinOperator, OrderByKind, Query,
    Select, SelectItem, SetExpr, SetQuantifier, Spanned, Statement, TableConstraint, TableFactor,
    TableWithJoins, UpdateTableFromKind,
};
use sqlparser::tokenizer::Span;

use self::expression::{classify_transform, ExprFacts};
use self::naming::{default_output_name, ident_name, object_name};
use crate::parser::{parse_batch, ParsedStatement, StatementFailure};
use crate::types::{normalize_name, Dialect, JoinKind, LineRange};

/// Statements of one SQL text, adapted, plus the ones that failed to parse.
#[derive(Debug, Clone, Default)]
pub struct AdaptedBatch {
    pub statements: Vec<StatementIr>,
    pub failures: Vec<StatementFailure>,
}

/// Parses `sql` statement by statement and adapts every statement that parsed.
pub fn adapt_sql(sql: &str, dialect: Dialect) -> AdaptedBatch {
    let batch = parse_batch(sql, dialect);
    AdaptedBatch {
        statements: batch.statements.iter().map(adapt_parsed).collect(),
        failures: batch.failures,
    }
}

/// Adapts a statement produced by [`crate::parser::parse_batch`].
pub fn adapt_parsed(parsed: &ParsedStatement) -> StatementIr {
    let mut ir = adapt_statement(&parsed.statement, parsed.index, parsed.line_offset);
    ir.lines = parsed.lines;
    ir
}

/// Adapts one parsed statement. `line_offset` is added to every span line.
pub fn adapt_statement(statement: &Statement, index: usize, line_offset: usize) -> StatementIr {
    let adapter = Adapter::new(line_offset);
    let lines = adapter
        .lines(statement.span())
        .unwrap_or_else(|| LineRange::single(line_offset + 1));
    StatementIr {
        index,
        lines,
        body: adapter.statement(statement),
    }
}

pub(crate) struct Adapter {
    line_offset: usize,
}

impl Adapter {
    pub(crate) fn new(line_offset: usize) -> Self {
        Self { line_offset }
    }

    fn lines(&self, span: Span) -> Option<LineRange> {
        if span.start.line == 0 {
            return None;
        }
        Some(LineRange::new(
            span.start.line as usize + self.line_offset,
            span.end.line as usize + self.line_offset,
        ))
    }

    fn statement(&self, statement: &Statement) -> StatementBody {
        match statement {
            Statement::Query(query) => StatementBody::Query(self.query(query)),
            Statement::Insert(insert) => StatementBody::Insert(InsertIr {
                target: TableRefIr {
                    name: normalize_name(&insert.table.to_string()),
                    alias: insert.table_alias.as_ref().map(ident_name),
                    lines: None,
                },
                columns: insert.columns.iter().map(ident_name).collect(),
                source: insert.source.as_ref().map(|query| self.query(query)),
            }),
            Statement::Update {
                table,
                assignments,
                from,
                selection,
                ..
            } => {
                let from = match from {
                    Some(UpdateTableFromKind::BeforeSet(tables))
                    | Some(UpdateTableFromKind::AfterSet(tables)) => {
                        tables.iter().map(|table| self.from_item(table)).collect()
                    }
                    None => Vec::new(),
                };
                StatementBody::Update(UpdateIr {
                    target: self.target_table(&table.relation),
                    joins: table.joins.iter().map(|join| self.join(join)).collect(),
                    assignments: assignments
                        .iter()
                        .map(|assignment| {
                            let column = assignment.target.to_string();
                            let column = normalize_name(&column);
                            let column = column.rsplit('.').next().unwrap_or(&column).to_string();
                            let facts = self.facts(&assignment.value);
                            AssignmentIr {
                                transform: classify_transform(&assignment.value, &column, &facts),
                                expression: assignment.value.to_string(),
                                column,
                                sources: facts.columns,
                                subqueries: facts.subqueries,
                            }
                        })
                        .collect(),
                    from,
                    filter: selection.as_ref().map(|expr| self.predicate(expr)),
                })
            }
            Statement::Delete(delete) => {
                let tables = match &delete.from {
                    FromTable::WithFromKeyword(tables) | FromTable::WithoutKeyword(tables) => {
                        tables
                    }
                };
                let mut sources: Vec<FromItemIr> =
                    tables.iter().map(|table| self.from_item(table)).collect();
                if let Some(using) = &delete.using {
                    sources.extend(using.iter().map(|table| self.from_item(table)));
                }

                let targets = if delete.tables.is_empty() {
                    sources
                        .first()
                        .and_then(|item| match &item.relation {
                            RelationIr::Table(table) => Some(table.clone()),
                            _ => None,
                        })
                        .into_iter()
                        .collect()
                } else {
                    delete
                        .tables
                        .iter()
                        .map(|name| resolve_delete_target(&object_name(name), &sources))
                        .collect()
                };

                StatementBody::Delete(DeleteIr {
                    targets,
                    sources,
                    filter: delete.selection.as_ref().map(|expr| self.predicate(expr)),
                })
            }
            Statement::CreateTable(create) => {
                let mut columns: Vec<ColumnDefIr> = create
                    .columns
                    .iter()
                    .map(|column| {
                        let mut not_null = false;
                        let mut primary_key = false;
                        for option in &column.options {
                            match &option.option {
                                ColumnOption::NotNull => not_null = true,
                                ColumnOption::Unique {
                                    is_primary: true, ..
                                } => primary_key = true,
                                _ => {}
                            }
                        }
                        ColumnDefIr {
                            name: ident_name(&column.name),
                            data_type: Some(column.data_type.to_string()),
                            nullable: !(not_null || primary_key),
                            primary_key,
                        }
                    })
                    .collect();

                for constraint in &create.constraints {
                    if let TableConstraint::PrimaryKey { columns: keys, .. } = constraint {
                        for key in keys {
                            let key = normalize_name(&key.column.expr.to_string());
                            if let Some(column) = columns.iter_mut().find(|c| c.name == key) {
                                column.primary_key = true;
                                column.nullable = false;
                            }
                        }
                    }
                }

                StatementBody::CreateTable(CreateTableIr {
                    name: object_name(&create.name),
                    columns,
                    query: create.query.as_ref().map(|query| self.query(query)),
                    temporary: create.temporary,
                })
            }
            Statement::CreateView {
                name,
                columns,
                query,
                materialized,
                ..
            } => StatementBody::CreateView(CreateViewIr {
                name: object_name(name),
                columns: columns.iter().map(|column| ident_name(&column.name)).collect(),
                query: self.query(query),
                materialized: *materialized,
            }),
            other => StatementBody::Unsupported {
                keyword: other
                    .to_string()
                    .split_whitespace()
                    .next()
                    .unwrap_or_default()
                    .to_uppercase(),
            },
        }
    }

    fn target_table(&self, factor: &TableFactor) -> TableRefIr {
        match self.relation(factor) {
            RelationIr::Table(table) => table,
            other => TableRefIr {
                name: normalize_name(&factor.to_string()),
                alias: other.alias().map(str::to_string),
                lines: self.lines(factor.span()),
            },
        }
    }

    pub(crate) fn query(&self, query: &Query) -> QueryIr {
        let (ctes, recursive) = match &query.with {
            Some(with) => (
                with.cte_tables
                    .iter()
                    .map(|cte| CteIr {
                        name: ident_name(&cte.alias.name),
                        columns: cte
                            .alias
                            .columns
                            .iter()
                            .map(|column| ident_name(&column.name))
                            .collect(),
                        query: self.query(&cte.query),
                        lines: self.lines(cte.span()),
                    })
                    .collect(),
                with.recursive,
            ),
            None => (Vec::new(), false),
        };

        let order_by = match &query.order_by {
            Some(order_by) => match &order_by.kind {
                OrderByKind::Expressions(exprs) => exprs.iter().map(ToString::to_string).collect(),
                OrderByKind::All(_) => vec!["ALL".to_string()],
            },
            None => Vec::new(),
        };

        let mut limit_parts = Vec::new();
        if let Some(limit) = &query.limit_clause {
            limit_parts.push(limit.to_string().trim().to_string());
        }
        if let Some(fetch) = &query.fetch {
            limit_parts.push(fetch.to_string().trim().to_string());
        }

        QueryIr {
            ctes,
            recursive,
            body: self.set_expr(&query.body),
            order_by,
            limit: (!limit_parts.is_empty()).then(|| limit_parts.join(" ")),
            lines: self.lines(query.span()),
        }
    }

    fn set_expr(&self, body: &SetExpr) -> SetExprIr {
        match body {
            SetExpr::Select(select) => SetExprIr::Select(Box::new(self.select(select))),
            SetExpr::Query(query) => SetExprIr::Nested(Box::new(self.query(query))),
            SetExpr::SetOperation {
                op,
                set_quantifier,
                left,
                right,
            } => SetExprIr::SetOperation {
                operator: op.to_string().to_uppercase(),
                all: matches!(
                    set_quantifier,
                    SetQuantifier::All | SetQuantifier::AllByName
                ),
                left: Box::new(self.set_expr(left)),
                right: Box::new(self.set_expr(right)),
            },
            SetExpr::Values(values) => SetExprIr::Values {
                rows: values.rows.len(),
            },
            SetExpr::Table(table) => SetExprIr::Table {
                name: normalize_name(
                    &[table.schema_name.as_deref(), table.table_name.as_deref()]
                        .into_iter()
                        .flatten()
                        .collect::<Vec<_>>()
                        .join("."),
                ),
            },
            other => SetExprIr::Other {
                keyword: other
                    .to_string()
                    .split_whitespace()
                    .next()
                    .unwrap_or_default()
                    .to_uppercase(),
            },
        }
    }

    fn select(&self, select: &Select) -> SelectIr {
        let mut facts = ExprFacts::default();
        let projection = select
            .projection
            .iter()
            .map(|item| self.projection_item(item, &mut facts))
            .collect();

        let having = select.having.as_ref().map(|expr| {
            let having_facts = self.facts(expr);
            facts.aggregates.extend(having_facts.aggregates.iter().cloned());
            self.predicate_from(expr, having_facts)
        });

        let group_by = match &select.group_by {
            GroupByExpr::Expressions(exprs, _) => exprs.iter().map(ToString::to_string).collect(),
            GroupByExpr::All(_) => vec!["ALL".to_string()],
        };

        SelectIr {
            distinct: select.distinct.is_some(),
            from: select.from.iter().map(|table| self.from_item(table)).collect(),
            filter: select.selection.as_ref().map(|expr| self.predicate(expr)),
            group_by,
            aggregates: facts.aggregates,
            having,
            projection,
            windows: facts.windows,
            cases: facts.cases,
            subqueries: facts.subqueries,
            lines: self.lines(select.span()),
        }
    }

    fn projection_item(&self, item: &SelectItem, facts: &mut ExprFacts) -> ProjectionItem {
        let (expr, alias) = match item {
            SelectItem::UnnamedExpr(expr) => (expr, None),
            SelectItem::ExprWithAlias { expr, alias } => (expr, Some(ident_name(alias))),
            SelectItem::Wildcard(_) => return ProjectionItem::Wildcard,
            SelectItem::QualifiedWildcard(..) => {
                let text = item.to_string();
                let qualifier = text.split(".*").next().unwrap_or(&text);
                return ProjectionItem::QualifiedWildcard(normalize_name(qualifier));
            }
        };

        let item_facts = self.facts(expr);
        let name = alias.unwrap_or_else(|| default_output_name(expr));
        let column = ProjectedColumn {
            transform: classify_transform(expr, &name, &item_facts),
            expression: expr.to_string(),
            sources: item_facts.columns.clone(),
            name,
        };
        facts.absorb(item_facts);
        ProjectionItem::Column(column)
    }

    fn predicate(&self, expr: &sqlparser::ast::Expr) -> PredicateIr {
        let facts = self.facts(expr);
        self.predicate_from(expr, facts)
    }

    fn predicate_from(&self, expr: &sqlparser::ast::Expr, facts: ExprFacts) -> PredicateIr {
        PredicateIr {
            text: expr.to_string(),
            columns: facts.columns,
            subqueries: facts.subqueries,
            cases: facts.cases,
            lines: self.lines(expr.span()),
        }
    }

    fn from_item(&self, table: &TableWithJoins) -> FromItemIr {
        FromItemIr {
            relation: self.relation(&table.relation),
            joins: table.joins.iter().map(|join| self.join(join)).collect(),
        }
    }

    fn relation(&self, factor: &TableFactor) -> RelationIr {
        let lines = self.lines(factor.span());
        match factor {
            TableFactor::Table {
                name,
                alias,
                args: None,
                ..
            } => RelationIr::Table(TableRefIr {
                name: object_name(name),
                alias: alias.as_ref().map(|alias| ident_name(&alias.name)),
                lines,
            }),
            TableFactor::Derived {
                lateral,
                subquery,
                alias,
            } => RelationIr::Derived(DerivedIr {
                alias: alias.as_ref().map(|alias| ident_name(&alias.name)),
                lateral: *lateral,
                query: Box::new(self.query(subquery)),
                lines,
            }),
            TableFactor::NestedJoin {
                table_with_joins,
                alias,
            } => RelationIr::Nested {
                alias: alias.as_ref().map(|alias| ident_name(&alias.name)),
                item: Box::new(self.from_item(table_with_joins)),
            },
            other => RelationIr::Function {
                text: other.to_string(),
                alias: None,
                lines,
            },
        }
    }

    fn join(&self, join: &Join) -> JoinIr {
        let (kind, constraint) = join_kind(&join.join_operator);
        let (condition, using) = match constraint {
            Some(JoinConstraint::On(expr)) => (Some(self.predicate(expr)), Vec::new()),
            Some(JoinConstraint::Using(columns)) => (
                None,
                columns
                    .iter()
                    .map(|column| normalize_name(&column.to_string()))
                    .collect(),
            ),
            _ => (None, Vec::new()),
        };
        JoinIr {
            kind,
            relation: self.relation(&join.relation),
            condition,
            using,
            lines: self.lines(join.span()),
        }
    }
}

fn join_kind(operator: &JoinOperator) -> (JoinKind, Option<&JoinConstraint>) {
    match operator {
        JoinOperator::Join(c) | JoinOperator::Inner(c) | JoinOperator::StraightJoin(c) => {
            (JoinKind::Inner, Some(c))
        }
        JoinOperator::Left(c) | JoinOperator::LeftOuter(c) => (JoinKind::Left, Some(c)),
        JoinOperator::Right(c) | JoinOperator::RightOuter(c) => (JoinKind::Right, Some(c)),
        JoinOperator::FullOuter(c) => (JoinKind::Full, Some(c)),
        JoinOperator::CrossJoin(c) => (JoinKind::Cross, Some(c)),
        JoinOperator::Semi(c) | JoinOperator::LeftSemi(c) | JoinOperator::RightSemi(c) => {
            (JoinKind::Semi, Some(c))
        }
        JoinOperator::Anti(c) | JoinOperator::LeftAnti(c) | JoinOperator::RightAnti(c) => {
            (JoinKind::Anti, Some(c))
        }
        JoinOperator::AsOf { constraint, .. } => (JoinKind::AsOf, Some(constraint)),
        JoinOperator::CrossApply | JoinOperator::OuterApply => (JoinKind::Apply, None),
    }
}

/// `DELETE t FROM orders t JOIN ...` names the target by alias.
fn resolve_delete_target(name: &str, sources: &[FromItemIr]) -> TableRefIr {
    let mut stack: Vec<&RelationIr> = Vec::new();
    for item in sources {
        stack.push(&item.relation);
        stack.extend(item.joins.iter().map(|join| &join.relation));
    }
    stack
        .into_iter()
        .find_map(|relation| match relation {
            RelationIr::Table(table) if table.visible_name() == name || table.name == name => {
                Some(table.clone())
            }
            _ => None,
        })
        .unwrap_or_else(|| TableRefIr {
            name: name.to_string(),
            alias: None,
            lines: None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapt_one(sql: &str) -> StatementIr {
        let batch = adapt_sql(sql, Dialect::Generic);
        assert!(batch.failures.is_empty(), "{:?}", batch.failures);
        batch.statements.into_iter().next().unwrap()
    }

    fn select_of(ir: &StatementIr) -> &SelectIr {
        match &ir.body {
            StatementBody::Query(query) => query.first_select().unwrap(),
            StatementBody::CreateView(view) => view.query.first_select().unwrap(),
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn test_view_projection_and_join() {
        let ir = adapt_one(
            "CREATE VIEW customer_orders AS SELECT c.name, COUNT(o.id) FROM customers c \
             LEFT JOIN orders o ON c.id = o.customer_id GROUP BY c.name",
        );
        let select = select_of(&ir);

        let RelationIr::Table(base) = &select.from[0].relation else {
            panic!("expected table");
        };
        assert_eq!(base.name, "customers");
        assert_eq!(base.alias.as_deref(), Some("c"));

        let join = &select.from[0].joins[0];
        assert_eq!(join.kind, JoinKind::Left);
        assert_eq!(
            join.condition.as_ref().map(|c| c.text.as_str()),
            Some("c.id = o.customer_id")
        );

        let names: Vec<_> = select
            .projection
            .iter()
            .filter_map(|item| match item {
                ProjectionItem::Column(column) => Some((column.name.as_str(), column.transform)),
                _ => None,
            })
            .collect();
        assert_eq!(
            names,
            vec![
                ("name", crate::types::TransformKind::Passthrough),
                ("count", crate::types::TransformKind::Aggregated)
            ]
        );
        assert_eq!(select.group_by, vec!["c.name".to_string()]);
        assert!(select.is_aggregating());
    }

    #[test]
    fn test_reserved_word_alias_stays_an_alias() {
        let ir = adapt_one("SELECT \"select\".id FROM users AS \"select\"");
        let select = select_of(&ir);
        let RelationIr::Table(table) = &select.from[0].relation else {
            panic!("expected table");
        };
        assert_eq!(table.name, "users");
        assert_eq!(table.alias.as_deref(), Some("select"));
    }

    #[test]
    fn test_cte_and_set_operation() {
        let ir = adapt_one(
            "WITH RECURSIVE tree AS (SELECT id FROM nodes UNION ALL SELECT n.id FROM nodes n JOIN tree t ON n.parent = t.id) \
             SELECT * FROM tree ORDER BY id LIMIT 10",
        );
        let StatementBody::Query(query) = &ir.body else {
            panic!("expected query");
        };
        assert!(query.recursive);
        assert_eq!(query.ctes[0].name, "tree");
        assert_eq!(query.order_by, vec!["id".to_string()]);
        assert_eq!(query.limit.as_deref(), Some("LIMIT 10"));
        let SetExprIr::SetOperation { operator, all, .. } = &query.ctes[0].query.body else {
            panic!("expected set operation");
        };
        assert_eq!(operator, "UNION");
        assert!(*all);
    }

    #[test]
    fn test_dml_shapes() {
        let insert = adapt_one("INSERT INTO archive (id, total) SELECT id, amount FROM orders");
        let StatementBody::Insert(insert) = &insert.body else {
            panic!("expected insert");
        };
        assert_eq!(insert.target.name, "archive");
        assert_eq!(insert.columns, vec!["id".to_string(), "total".to_string()]);
        assert!(insert.source.is_some());

        let update = adapt_one("UPDATE orders SET total = price * qty WHERE id = 1");
        let StatementBody::Update(update) = &update.body else {
            panic!("expected update");
        };
        assert_eq!(update.target.name, "orders");
        assert_eq!(update.assignments[0].column, "total");
        assert_eq!(
            update.assignments[0].transform,
            crate::types::TransformKind::Calculated
        );

        let delete = adapt_one("DELETE FROM orders WHERE customer_id IN (SELECT id FROM banned)");
        let StatementBody::Delete(delete) = &delete.body else {
            panic!("expected delete");
        };
        assert_eq!(delete.targets[0].name, "orders");
        assert_eq!(delete.filter.as_ref().map(|f| f.subqueries.len()), Some(1));
    }

    #[test]
    fn test_create_table_columns() {
        let ir = adapt_one(
            "CREATE TABLE customers (id INT PRIMARY KEY, name VARCHAR(100) NOT NULL, note TEXT)",
        );
        let StatementBody::CreateTable(create) = &ir.body else {
            panic!("expected create table");
        };
        assert_eq!(create.columns.len(), 3);
        assert!(create.columns[0].primary_key);
        assert!(!create.columns[0].nullable);
        assert!(!create.columns[1].nullable);
        assert!(create.columns[2].nullable);
        assert_eq!(ir.kind(), crate::types::StatementKind::CreateTable);
    }

    #[test]
    fn test_unique_column_is_not_a_primary_key() {
        let ir = adapt_one("CREATE TABLE t (code INT UNIQUE, id INT CONSTRAINT t_pk PRIMARY KEY)");
        let StatementBody::CreateTable(create) = &ir.body else {
            panic!("expected create table");
        };
        assert!(!create.columns[0].primary_key);
        assert!(create.columns[0].nullable);
        assert!(create.columns[1].primary_key);
        assert!(!create.columns[1].nullable);
    }

    #[test]
    fn test_table_level_primary_key() {
        let ir = adapt_one("CREATE TABLE t (a INT, b INT, PRIMARY KEY (a))");
        let StatementBody::CreateTable(create) = &ir.body else {
            panic!("expected create table");
        };
        assert!(create.columns[0].primary_key);
        assert!(!create.columns[1].primary_key);
    }

    #[test]
    fn test_unsupported_statement_keeps_keyword() {
        let ir = adapt_one("DROP TABLE orders");
        assert_eq!(
            ir.body,
            StatementBody::Unsupported {
                keyword: "DROP".to_string()
            }
        );
    }

    #[test]
    fn test_lines_are_offset_by_statement_position() {
        let batch = adapt_sql("SELECT 1;\n\nSELECT a\nFROM t\nWHERE a > 1;", Dialect::Generic);
        let second = &batch.statements[1];
        assert_eq!(second.lines, LineRange::new(3, 5));
        let select = select_of(second);
        assert_eq!(select.filter.as_ref().and_then(|f| f.lines), Some(LineRange::single(5)));
    }
}
