//! Two-pass lineage construction.
//!
//! Pass one registers every object a file defines (CREATE TABLE, CREATE VIEW,
//! CREATE TABLE AS) with its declared columns, so references resolve no matter
//! which file defines what. Pass two lowers every statement's queries to
//! relation sources and column origins and folds them into edges.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
#[cfg(feature = "tracing")]
use tracing::{debug, info_span};

use super::{LineageGraph, NodeIdx};
use crate::adapter::{
    adapt_sql, ColumnRef, CteIr, DeleteIr, FromItemIr, InsertIr, JoinIr, PredicateIr,
    ProjectedColumn, ProjectionItem, QueryIr, RelationIr, SelectIr, SetExprIr, StatementBody,
    StatementIr, UpdateIr,
};
use crate::config::LineageConfig;
use crate::types::{
    normalize_name, ColumnMeta, Dialect, LineageEdgeKind, LineageNode, NodeKey, NodeKind,
    QueryReference, StatementKind, TransformKind,
};

/// Adapted statements of one file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileStatements {
    pub path: String,
    pub statements: Vec<StatementIr>,
}

/// SQL text of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: String,
    pub content: String,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Parses and adapts every source, then builds the graph.
///
/// Statements that fail to parse contribute nothing; use
/// [`crate::build_flow_batch`] to report them.
pub fn build_lineage_graph_from_sources(
    sources: &[SourceFile],
    dialect: Dialect,
    config: &LineageConfig,
) -> LineageGraph {
    let files: Vec<FileStatements> = sources
        .iter()
        .map(|source| {
            let adapted = adapt_sql(&source.content, dialect);
            #[cfg(feature = "tracing")]
            if !adapted.failures.is_empty() {
                debug!(
                    file = %source.path,
                    failures = adapted.failures.len(),
                    "skipping statements that failed to parse"
                );
            }
            FileStatements {
                path: source.path.clone(),
                statements: adapted.statements,
            }
        })
        .collect();
    build_lineage_graph(&files, config)
}

/// Builds the workspace lineage graph. Input order fixes node and edge order,
/// so equal inputs always give equal graphs.
pub fn build_lineage_graph(files: &[FileStatements], config: &LineageConfig) -> LineageGraph {
    #[cfg(feature = "tracing")]
    let _span = info_span!("build_lineage_graph", files = files.len()).entered();

    let mut builder = Builder::new(config);
    for file in files {
        builder.graph.record_file(&file.path);
        for statement in &file.statements {
            builder.define(&file.path, statement);
        }
    }
    for file in files {
        for statement in &file.statements {
            builder.reference(&file.path, statement);
        }
    }
    builder.graph
}

/// Where one output column's values come from.
#[derive(Debug, Clone)]
struct Origin {
    column: NodeIdx,
    transform: TransformKind,
    expression: Option<String>,
}

#[derive(Debug, Clone)]
struct OutputColumn {
    name: String,
    origins: Vec<Origin>,
}

/// A query reduced to the relations it reads and its output columns.
#[derive(Debug, Clone, Default)]
struct Lowered {
    sources: Vec<(NodeIdx, LineageEdgeKind)>,
    columns: Vec<OutputColumn>,
}

impl Lowered {
    fn add_source(&mut self, idx: NodeIdx, kind: LineageEdgeKind) {
        if !self.sources.contains(&(idx, kind)) {
            self.sources.push((idx, kind));
        }
    }

    fn absorb_sources(&mut self, other: &Lowered, kind: Option<LineageEdgeKind>) {
        for &(idx, inner) in &other.sources {
            self.add_source(idx, kind.unwrap_or(inner));
        }
    }
}

/// What a name in FROM is bound to.
#[derive(Debug, Clone)]
enum Bound {
    Node(NodeIdx),
    /// Derived table, or a CTE of a query that defines no object.
    Derived(Lowered),
}

/// One relation visible inside a SELECT.
struct Entry {
    /// Alias, or the table name when unaliased.
    visible: String,
    /// Table name as written; empty for derived tables.
    name: String,
    bound: Bound,
}

struct Context<'a> {
    file: &'a str,
    line: usize,
    /// Object the statement defines or writes; owns the statement's CTE nodes.
    owner: Option<NodeIdx>,
    ctes: Vec<HashMap<String, Bound>>,
}

impl<'a> Context<'a> {
    fn edge_site(&self) -> (Option<&'a str>, Option<usize>) {
        (Some(self.file), Some(self.line))
    }
}

struct Builder {
    graph: LineageGraph,
    /// Normalized name → defined relation (the first definition wins).
    defined: HashMap<String, NodeIdx>,
    default_schema: Option<String>,
}

impl Builder {
    fn new(config: &LineageConfig) -> Self {
        let default_schema = config
            .default_schema
            .as_deref()
            .map(normalize_name)
            .filter(|schema| !schema.is_empty());
        Self {
            graph: LineageGraph::new(default_schema.clone()),
            defined: HashMap::new(),
            default_schema,
        }
    }

    fn define(&mut self, file: &str, statement: &StatementIr) {
        match &statement.body {
            StatementBody::CreateTable(create) => {
                let idx = self.define_relation(NodeKey::table(&create.name), file, statement);
                for column in &create.columns {
                    let meta = ColumnMeta {
                        data_type: column.data_type.clone(),
                        nullable: column.nullable,
                        primary_key: column.primary_key,
                    };
                    self.graph.add_column(idx, &column.name, Some(meta));
                }
                if let (Some(query), true) = (&create.query, create.columns.is_empty()) {
                    for name in named_outputs(query) {
                        self.graph.add_column(idx, &name, None);
                    }
                }
            }
            StatementBody::CreateView(view) => {
                let idx = self.define_relation(NodeKey::view(&view.name), file, statement);
                let names = if view.columns.is_empty() {
                    named_outputs(&view.query)
                } else {
                    view.columns.clone()
                };
                for name in names {
                    self.graph.add_column(idx, &name, None);
                }
            }
            _ => {}
        }
    }

    fn define_relation(&mut self, key: NodeKey, file: &str, statement: &StatementIr) -> NodeIdx {
        let name = key.name.clone();
        let mut node = LineageNode::new(key);
        node.file = Some(file.to_string());
        node.line = Some(statement.lines.start);
        let idx = self.graph.add_node(node);
        self.defined.entry(name).or_insert(idx);
        idx
    }

    fn reference(&mut self, file: &str, statement: &StatementIr) {
        let mut ctx = Context {
            file,
            line: statement.lines.start,
            owner: None,
            ctes: Vec::new(),
        };
        match &statement.body {
            StatementBody::Query(query) => {
                let lowered = self.lower_query(query, &mut ctx);
                for (idx, _) in lowered.sources {
                    self.query_reference(idx, StatementKind::Select, &ctx);
                }
            }
            StatementBody::Insert(insert) => self.insert(insert, &mut ctx),
            StatementBody::Update(update) => self.update(update, &mut ctx),
            StatementBody::Delete(delete) => self.delete(delete, &mut ctx),
            StatementBody::CreateTable(create) => {
                if let Some(query) = &create.query {
                    let target = self.exact_or_relation(NodeKey::table(&create.name), &ctx);
                    let declared = create.columns.iter().map(|c| c.name.clone()).collect();
                    self.define_from_query(target, declared, query, &mut ctx);
                }
            }
            StatementBody::CreateView(view) => {
                let target = self.exact_or_relation(NodeKey::view(&view.name), &ctx);
                self.define_from_query(target, view.columns.clone(), &view.query, &mut ctx);
            }
            #[cfg(feature = "tracing")]
            StatementBody::Unsupported { keyword } => {
                debug!(file, keyword = %keyword, "statement has no lineage");
            }
            #[cfg(not(feature = "tracing"))]
            StatementBody::Unsupported { .. } => {}
        }
    }

    /// View or CTAS body: sources feed `target`, outputs become its columns.
    fn define_from_query(
        &mut self,
        target: NodeIdx,
        declared: Vec<String>,
        query: &QueryIr,
        ctx: &mut Context<'_>,
    ) {
        ctx.owner = Some(target);
        let lowered = self.lower_query(query, ctx);
        let (file, line) = ctx.edge_site();
        for &(source, kind) in &lowered.sources {
            self.graph.add_edge(source, target, kind, file, line);
        }
        let names = if declared.is_empty() {
            lowered.columns.iter().map(|c| c.name.clone()).collect()
        } else {
            declared
        };
        self.map_columns(target, &names, &lowered, ctx);
    }

    fn insert(&mut self, insert: &InsertIr, ctx: &mut Context<'_>) {
        let target = self.relation(&insert.target.name, ctx);
        let Some(query) = &insert.source else {
            self.query_reference(target, StatementKind::Insert, ctx);
            return;
        };
        ctx.owner = Some(target);
        let lowered = self.lower_query(query, ctx);
        if lowered.sources.is_empty() {
            self.query_reference(target, StatementKind::Insert, ctx);
        }
        let (file, line) = ctx.edge_site();
        for &(source, _) in &lowered.sources {
            self.graph
                .add_edge(source, target, LineageEdgeKind::Insert, file, line);
        }

        let names = if !insert.columns.is_empty() {
            insert.columns.clone()
        } else {
            let declared = self.graph.column_names(target);
            if declared.is_empty() {
                lowered.columns.iter().map(|c| c.name.clone()).collect()
            } else {
                declared
            }
        };
        self.map_columns(target, &names, &lowered, ctx);
    }

    fn update(&mut self, update: &UpdateIr, ctx: &mut Context<'_>) {
        let target = self.relation(&update.target.name, ctx);
        ctx.owner = Some(target);

        let mut scope = vec![Entry {
            visible: update.target.visible_name().to_string(),
            name: update.target.name.clone(),
            bound: Bound::Node(target),
        }];
        let mut lowered = Lowered::default();
        self.bind_joins(&update.joins, &mut scope, &mut lowered, ctx);
        for item in &update.from {
            self.bind_from_item(item, LineageEdgeKind::DirectSelect, &mut scope, &mut lowered, ctx);
        }
        self.lower_predicate_subqueries(update.filter.as_ref(), &mut lowered, ctx);
        for assignment in &update.assignments {
            for subquery in &assignment.subqueries {
                let inner = self.lower_query(subquery, ctx);
                lowered.absorb_sources(&inner, None);
            }
        }

        let (file, line) = ctx.edge_site();
        let mut wrote_edge = false;
        for &(source, _) in &lowered.sources {
            if source != target {
                self.graph
                    .add_edge(source, target, LineageEdgeKind::Update, file, line);
                wrote_edge = true;
            }
        }
        if !wrote_edge {
            self.query_reference(target, StatementKind::Update, ctx);
        }

        for assignment in &update.assignments {
            let column = self.graph.add_column(target, &assignment.column, None);
            for source in &assignment.sources {
                for origin in self.resolve_column(&scope, source) {
                    let transform = origin.transform.compose(assignment.transform);
                    let expression = assignment
                        .transform
                        .carries_expression()
                        .then(|| assignment.expression.clone())
                        .or(origin.expression);
                    self.graph.add_column_edge(
                        origin.column,
                        column,
                        transform,
                        expression,
                        file,
                        line,
                    );
                }
            }
        }
    }

    fn delete(&mut self, delete: &DeleteIr, ctx: &mut Context<'_>) {
        let targets: Vec<NodeIdx> = delete
            .targets
            .iter()
            .map(|target| self.relation(&target.name, ctx))
            .collect();
        ctx.owner = targets.first().copied();

        let mut scope = Vec::new();
        let mut lowered = Lowered::default();
        for item in &delete.sources {
            self.bind_from_item(item, LineageEdgeKind::DirectSelect, &mut scope, &mut lowered, ctx);
        }
        self.lower_predicate_subqueries(delete.filter.as_ref(), &mut lowered, ctx);

        let (file, line) = ctx.edge_site();
        for &target in &targets {
            let mut wrote_edge = false;
            for &(source, _) in &lowered.sources {
                if !targets.contains(&source) {
                    self.graph
                        .add_edge(source, target, LineageEdgeKind::Delete, file, line);
                    wrote_edge = true;
                }
            }
            if !wrote_edge {
                self.query_reference(target, StatementKind::Delete, ctx);
            }
        }
    }

    fn lower_query(&mut self, query: &QueryIr, ctx: &mut Context<'_>) -> Lowered {
        ctx.ctes.push(HashMap::new());
        for cte in &query.ctes {
            let bound = self.lower_cte(cte, query.recursive, ctx);
            if let Some(scope) = ctx.ctes.last_mut() {
                scope.insert(cte.name.clone(), bound);
            }
        }
        let lowered = self.lower_set_expr(&query.body, ctx);
        ctx.ctes.pop();
        lowered
    }

    /// CTEs of an owned statement become `cte:<owner>.<name>` nodes; CTEs of
    /// a plain query are inlined like derived tables.
    fn lower_cte(&mut self, cte: &CteIr, recursive: bool, ctx: &mut Context<'_>) -> Bound {
        let Some(owner) = ctx.owner else {
            if recursive {
                if let Some(scope) = ctx.ctes.last_mut() {
                    scope.insert(cte.name.clone(), Bound::Derived(Lowered::default()));
                }
            }
            let mut lowered = self.lower_query(&cte.query, ctx);
            for (column, name) in lowered.columns.iter_mut().zip(&cte.columns) {
                column.name = name.clone();
            }
            return Bound::Derived(lowered);
        };

        let owner_name = self.graph.node_at(owner).name().to_string();
        let mut node = LineageNode::new(NodeKey::new(
            NodeKind::Cte,
            &format!("{owner_name}.{}", cte.name),
        ));
        node.file = Some(ctx.file.to_string());
        node.line = cte.lines.map(|lines| lines.start).or(Some(ctx.line));
        let idx = self.graph.add_node(node);

        let names = if cte.columns.is_empty() {
            named_outputs(&cte.query)
        } else {
            cte.columns.clone()
        };
        for name in &names {
            self.graph.add_column(idx, name, None);
        }
        if recursive {
            if let Some(scope) = ctx.ctes.last_mut() {
                scope.insert(cte.name.clone(), Bound::Node(idx));
            }
        }

        let lowered = self.lower_query(&cte.query, ctx);
        let (file, line) = ctx.edge_site();
        for &(source, kind) in &lowered.sources {
            self.graph.add_edge(source, idx, kind, file, line);
        }
        let names = if names.is_empty() {
            lowered.columns.iter().map(|c| c.name.clone()).collect()
        } else {
            names
        };
        self.map_columns(idx, &names, &lowered, ctx);
        Bound::Node(idx)
    }

    fn lower_set_expr(&mut self, expr: &SetExprIr, ctx: &mut Context<'_>) -> Lowered {
        match expr {
            SetExprIr::Select(select) => self.lower_select(select, ctx),
            SetExprIr::SetOperation { left, right, .. } => {
                let mut lowered = self.lower_set_expr(left, ctx);
                let right = self.lower_set_expr(right, ctx);
                lowered.absorb_sources(&right, None);
                for (column, other) in lowered.columns.iter_mut().zip(right.columns) {
                    column.origins.extend(other.origins);
                }
                lowered
            }
            SetExprIr::Nested(query) => self.lower_query(query, ctx),
            SetExprIr::Table { name } => {
                let mut lowered = Lowered::default();
                let mut scope = Vec::new();
                let bound = self.bind_table(name, ctx);
                self.add_bound_sources(&bound, LineageEdgeKind::DirectSelect, &mut lowered);
                scope.push(Entry {
                    visible: name.clone(),
                    name: name.clone(),
                    bound,
                });
                lowered.columns = self.entry_columns(&scope[0]);
                lowered
            }
            SetExprIr::Values { .. } | SetExprIr::Other { .. } => Lowered::default(),
        }
    }

    fn lower_select(&mut self, select: &SelectIr, ctx: &mut Context<'_>) -> Lowered {
        let mut lowered = Lowered::default();
        let mut scope = Vec::new();
        for item in &select.from {
            self.bind_from_item(item, LineageEdgeKind::DirectSelect, &mut scope, &mut lowered, ctx);
        }
        self.lower_predicate_subqueries(select.filter.as_ref(), &mut lowered, ctx);
        self.lower_predicate_subqueries(select.having.as_ref(), &mut lowered, ctx);
        for subquery in &select.subqueries {
            let inner = self.lower_query(subquery, ctx);
            lowered.absorb_sources(&inner, None);
        }

        for item in &select.projection {
            match item {
                ProjectionItem::Column(column) => {
                    let origins = column
                        .sources
                        .iter()
                        .flat_map(|source| self.resolve_column(&scope, source))
                        .map(|origin| compose(origin, column))
                        .collect();
                    lowered.columns.push(OutputColumn {
                        name: column.name.clone(),
                        origins,
                    });
                }
                ProjectionItem::Wildcard => {
                    for entry in &scope {
                        let columns = self.entry_columns(entry);
                        lowered.columns.extend(columns);
                    }
                }
                ProjectionItem::QualifiedWildcard(qualifier) => {
                    if let Some(entry) = find_entry(&scope, qualifier) {
                        let columns = self.entry_columns(entry);
                        lowered.columns.extend(columns);
                    }
                }
            }
        }
        lowered
    }

    fn lower_predicate_subqueries(
        &mut self,
        predicate: Option<&PredicateIr>,
        lowered: &mut Lowered,
        ctx: &mut Context<'_>,
    ) {
        for subquery in predicate.iter().flat_map(|p| &p.subqueries) {
            let inner = self.lower_query(subquery, ctx);
            lowered.absorb_sources(&inner, None);
        }
    }

    fn bind_from_item(
        &mut self,
        item: &FromItemIr,
        kind: LineageEdgeKind,
        scope: &mut Vec<Entry>,
        lowered: &mut Lowered,
        ctx: &mut Context<'_>,
    ) {
        self.bind_relation(&item.relation, kind, scope, lowered, ctx);
        self.bind_joins(&item.joins, scope, lowered, ctx);
    }

    fn bind_joins(
        &mut self,
        joins: &[JoinIr],
        scope: &mut Vec<Entry>,
        lowered: &mut Lowered,
        ctx: &mut Context<'_>,
    ) {
        for join in joins {
            self.bind_relation(&join.relation, LineageEdgeKind::Join, scope, lowered, ctx);
            for subquery in join.condition.iter().flat_map(|c| &c.subqueries) {
                let inner = self.lower_query(subquery, ctx);
                lowered.absorb_sources(&inner, Some(LineageEdgeKind::Join));
            }
        }
    }

    fn bind_relation(
        &mut self,
        relation: &RelationIr,
        kind: LineageEdgeKind,
        scope: &mut Vec<Entry>,
        lowered: &mut Lowered,
        ctx: &mut Context<'_>,
    ) {
        match relation {
            RelationIr::Table(table) => {
                let bound = self.bind_table(&table.name, ctx);
                self.add_bound_sources(&bound, kind, lowered);
                scope.push(Entry {
                    visible: table.visible_name().to_string(),
                    name: table.name.clone(),
                    bound,
                });
            }
            RelationIr::Derived(derived) => {
                let inner = self.lower_query(&derived.query, ctx);
                let forced = (kind == LineageEdgeKind::Join).then_some(kind);
                lowered.absorb_sources(&inner, forced);
                scope.push(Entry {
                    visible: derived.alias.clone().unwrap_or_default(),
                    name: String::new(),
                    bound: Bound::Derived(inner),
                });
            }
            RelationIr::Nested { item, .. } => self.bind_from_item(item, kind, scope, lowered, ctx),
            RelationIr::Function { .. } => {}
        }
    }

    fn add_bound_sources(&self, bound: &Bound, kind: LineageEdgeKind, lowered: &mut Lowered) {
        match bound {
            Bound::Node(idx) => lowered.add_source(*idx, kind),
            Bound::Derived(inner) => lowered.absorb_sources(inner, Some(kind)),
        }
    }

    /// CTEs shadow relations, innermost first; qualified names never match a CTE.
    fn bind_table(&mut self, name: &str, ctx: &Context<'_>) -> Bound {
        if !name.contains('.') {
            if let Some(bound) = ctx.ctes.iter().rev().find_map(|scope| scope.get(name)) {
                return bound.clone();
            }
        }
        Bound::Node(self.relation(name, ctx))
    }

    /// Defined relation for `name`, or an `external` node.
    fn relation(&mut self, name: &str, ctx: &Context<'_>) -> NodeIdx {
        let name = normalize_name(name);
        if let Some(idx) = self.resolve_defined(&name) {
            return idx;
        }
        let mut node = LineageNode::new(NodeKey::external(&name));
        node.file = Some(ctx.file.to_string());
        node.line = Some(ctx.line);
        self.graph.add_node(node)
    }

    fn exact_or_relation(&mut self, key: NodeKey, ctx: &Context<'_>) -> NodeIdx {
        match self.graph.index_of(&key) {
            Some(idx) => idx,
            None => self.relation(&key.name, ctx),
        }
    }

    /// Schema-aware resolution of a normalized name against definitions.
    fn resolve_defined(&self, name: &str) -> Option<NodeIdx> {
        if let Some(&idx) = self.defined.get(name) {
            return Some(idx);
        }
        if let Some((schema, simple)) = name.rsplit_once('.') {
            if self.default_schema.as_deref() == Some(schema) {
                return self.defined.get(simple).copied();
            }
            return None;
        }
        if let Some(schema) = &self.default_schema {
            if let Some(&idx) = self.defined.get(&format!("{schema}.{name}")) {
                return Some(idx);
            }
        }
        let mut matches = self.defined.iter().filter(|(defined, _)| {
            defined
                .rsplit_once('.')
                .is_some_and(|(_, simple)| simple == name)
        });
        let (_, &first) = matches.next()?;
        match matches.next() {
            None => Some(first),
            Some(_) => None,
        }
    }

    /// Origins of a column reference. Qualified references match an alias or
    /// table name; unqualified ones need a single relation in scope or a single
    /// relation declaring the column.
    fn resolve_column(&mut self, scope: &[Entry], column: &ColumnRef) -> Vec<Origin> {
        let entry = match &column.qualifier {
            Some(qualifier) => find_entry(scope, qualifier),
            None if scope.len() == 1 => scope.first(),
            None => {
                let mut declaring = scope
                    .iter()
                    .filter(|entry| self.entry_has_column(entry, &column.column));
                match (declaring.next(), declaring.next()) {
                    (Some(entry), None) => Some(entry),
                    _ => None,
                }
            }
        };
        let Some(entry) = entry else {
            return Vec::new();
        };
        match &entry.bound {
            Bound::Node(idx) => vec![Origin {
                column: self.graph.add_column(*idx, &column.column, None),
                transform: TransformKind::Passthrough,
                expression: None,
            }],
            Bound::Derived(inner) => inner
                .columns
                .iter()
                .find(|output| output.name == column.column)
                .map(|output| output.origins.clone())
                .unwrap_or_default(),
        }
    }

    fn entry_has_column(&self, entry: &Entry, column: &str) -> bool {
        match &entry.bound {
            Bound::Node(idx) => self
                .graph
                .node_at(*idx)
                .columns
                .iter()
                .any(|key| key.simple_name() == column),
            Bound::Derived(inner) => inner.columns.iter().any(|output| output.name == column),
        }
    }

    /// Known columns of `entry`, for `*` expansion.
    fn entry_columns(&self, entry: &Entry) -> Vec<OutputColumn> {
        match &entry.bound {
            Bound::Node(idx) => self
                .graph
                .node_at(*idx)
                .columns
                .iter()
                .filter_map(|key| {
                    Some(OutputColumn {
                        name: key.simple_name().to_string(),
                        origins: vec![Origin {
                            column: self.graph.index_of(key)?,
                            transform: TransformKind::Passthrough,
                            expression: None,
                        }],
                    })
                })
                .collect(),
            Bound::Derived(inner) => inner.columns.clone(),
        }
    }

    /// Pairs `names` with the lowered outputs by position and records column edges.
    fn map_columns(
        &mut self,
        target: NodeIdx,
        names: &[String],
        lowered: &Lowered,
        ctx: &Context<'_>,
    ) {
        let (file, line) = ctx.edge_site();
        for (name, output) in names.iter().zip(&lowered.columns) {
            let column = self.graph.add_column(target, name, None);
            for origin in &output.origins {
                self.graph.add_column_edge(
                    origin.column,
                    column,
                    origin.transform,
                    origin.expression.clone(),
                    file,
                    line,
                );
            }
        }
    }

    fn query_reference(&mut self, idx: NodeIdx, statement: StatementKind, ctx: &Context<'_>) {
        let node = self.graph.node_at(idx).key.clone();
        self.graph.add_query_reference(QueryReference {
            node,
            statement,
            file: Some(ctx.file.to_string()),
            line: Some(ctx.line),
        });
    }
}

fn find_entry<'a>(scope: &'a [Entry], qualifier: &str) -> Option<&'a Entry> {
    scope
        .iter()
        .find(|entry| entry.visible == qualifier)
        .or_else(|| {
            scope.iter().find(|entry| {
                !entry.name.is_empty()
                    && (entry.name == qualifier
                        || entry.name.rsplit('.').next() == Some(qualifier))
            })
        })
}

fn compose(origin: Origin, column: &ProjectedColumn) -> Origin {
    let expression = if column.transform.carries_expression() {
        Some(column.expression.clone())
    } else {
        origin.expression
    };
    Origin {
        column: origin.column,
        transform: origin.transform.compose(column.transform),
        expression,
    }
}

/// Named (non-wildcard) outputs of a query's leftmost SELECT.
fn named_outputs(query: &QueryIr) -> Vec<String> {
    query
        .first_select()
        .map(|select| {
            select
                .projection
                .iter()
                .filter_map(|item| match item {
                    ProjectionItem::Column(column) => Some(column.name.clone()),
                    ProjectionItem::Wildcard | ProjectionItem::QualifiedWildcard(_) => None,
                })
                .collect()
        })
        .unwrap_or_default()
}
