//! Intermediate representation produced by the AST adapter.
//!
//! Every statement and clause shape the flow builder and the lineage builder care
//! about is an explicit variant here. Names are already normalized with
//! [`crate::types::normalize_name`]; expression text is kept verbatim for display.

use crate::types::{CaseBranch, JoinKind, LineRange, StatementKind, TransformKind};

/// One adapted statement.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementIr {
    /// Position in the batch the statement was parsed from.
    pub index: usize,
    pub lines: LineRange,
    pub body: StatementBody,
}

impl StatementIr {
    pub fn kind(&self) -> StatementKind {
        match &self.body {
            StatementBody::Query(_) => StatementKind::Select,
            StatementBody::Insert(_) => StatementKind::Insert,
            StatementBody::Update(_) => StatementKind::Update,
            StatementBody::Delete(_) => StatementKind::Delete,
            StatementBody::CreateTable(create) if create.query.is_some() => {
                StatementKind::CreateTableAs
            }
            StatementBody::CreateTable(_) => StatementKind::CreateTable,
            StatementBody::CreateView(_) => StatementKind::CreateView,
            StatementBody::Unsupported { .. } => StatementKind::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementBody {
    Query(QueryIr),
    Insert(InsertIr),
    Update(UpdateIr),
    Delete(DeleteIr),
    CreateTable(CreateTableIr),
    CreateView(CreateViewIr),
    /// Any statement without a data-flow shape (SET, GRANT, ALTER, ...).
    Unsupported { keyword: String },
}

/// A full query: optional WITH clause, body and query-level ORDER BY / LIMIT.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryIr {
    pub ctes: Vec<CteIr>,
    pub recursive: bool,
    pub body: SetExprIr,
    pub order_by: Vec<String>,
    pub limit: Option<String>,
    pub lines: Option<LineRange>,
}

impl QueryIr {
    /// Leftmost SELECT of the body; it names the output columns of a set operation.
    pub fn first_select(&self) -> Option<&SelectIr> {
        self.body.first_select()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CteIr {
    pub name: String,
    pub columns: Vec<String>,
    pub query: QueryIr,
    pub lines: Option<LineRange>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SetExprIr {
    Select(Box<SelectIr>),
    SetOperation {
        operator: String,
        all: bool,
        left: Box<SetExprIr>,
        right: Box<SetExprIr>,
    },
    /// Parenthesized query used as a set operand.
    Nested(Box<QueryIr>),
    Values {
        rows: usize,
    },
    /// `TABLE name` shorthand.
    Table {
        name: String,
    },
    /// DML used as a query body; carries the leading keyword only.
    Other {
        keyword: String,
    },
}

impl SetExprIr {
    pub fn first_select(&self) -> Option<&SelectIr> {
        match self {
            SetExprIr::Select(select) => Some(select),
            SetExprIr::SetOperation { left, .. } => left.first_select(),
            SetExprIr::Nested(query) => query.first_select(),
            SetExprIr::Values { .. } | SetExprIr::Table { .. } | SetExprIr::Other { .. } => None,
        }
    }

    /// Every SELECT branch, left to right.
    pub fn selects(&self) -> Vec<&SelectIr> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(expr) = stack.pop() {
            match expr {
                SetExprIr::Select(select) => out.push(select.as_ref()),
                SetExprIr::SetOperation { left, right, .. } => {
                    stack.push(right);
                    stack.push(left);
                }
                SetExprIr::Nested(query) => stack.push(&query.body),
                SetExprIr::Values { .. } | SetExprIr::Table { .. } | SetExprIr::Other { .. } => {}
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectIr {
    pub distinct: bool,
    pub from: Vec<FromItemIr>,
    pub filter: Option<PredicateIr>,
    pub group_by: Vec<String>,
    /// Aggregate calls found anywhere in the projection, HAVING or ORDER BY.
    pub aggregates: Vec<String>,
    pub having: Option<PredicateIr>,
    pub projection: Vec<ProjectionItem>,
    pub windows: Vec<WindowIr>,
    pub cases: Vec<CaseIr>,
    /// Scalar subqueries in the projection.
    pub subqueries: Vec<QueryIr>,
    pub lines: Option<LineRange>,
}

impl SelectIr {
    pub fn is_aggregating(&self) -> bool {
        !self.group_by.is_empty() || !self.aggregates.is_empty()
    }
}

/// One comma-separated FROM entry with its joins.
#[derive(Debug, Clone, PartialEq)]
pub struct FromItemIr {
    pub relation: RelationIr,
    pub joins: Vec<JoinIr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RelationIr {
    Table(TableRefIr),
    Derived(DerivedIr),
    Nested {
        alias: Option<String>,
        item: Box<FromItemIr>,
    },
    /// Table functions, UNNEST, PIVOT and other opaque row sources.
    Function {
        text: String,
        alias: Option<String>,
        lines: Option<LineRange>,
    },
}

impl RelationIr {
    pub fn alias(&self) -> Option<&str> {
        match self {
            RelationIr::Table(table) => table.alias.as_deref(),
            RelationIr::Derived(derived) => derived.alias.as_deref(),
            RelationIr::Nested { alias, .. } | RelationIr::Function { alias, .. } => {
                alias.as_deref()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableRefIr {
    pub name: String,
    pub alias: Option<String>,
    pub lines: Option<LineRange>,
}

impl TableRefIr {
    /// Name the relation is addressed by inside the query.
    pub fn visible_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DerivedIr {
    pub alias: Option<String>,
    pub lateral: bool,
    pub query: Box<QueryIr>,
    pub lines: Option<LineRange>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinIr {
    pub kind: JoinKind,
    pub relation: RelationIr,
    pub condition: Option<PredicateIr>,
    pub using: Vec<String>,
    pub lines: Option<LineRange>,
}

/// A boolean clause (WHERE, HAVING, ON) with what it references.
#[derive(Debug, Clone, PartialEq)]
pub struct PredicateIr {
    pub text: String,
    pub columns: Vec<ColumnRef>,
    pub subqueries: Vec<QueryIr>,
    pub cases: Vec<CaseIr>,
    pub lines: Option<LineRange>,
}

/// A column reference as written: optional qualifier (alias, table or schema.table).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub qualifier: Option<String>,
    pub column: String,
}

impl ColumnRef {
    pub fn new(qualifier: Option<&str>, column: &str) -> Self {
        Self {
            qualifier: qualifier.map(str::to_string),
            column: column.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProjectionItem {
    Column(ProjectedColumn),
    Wildcard,
    QualifiedWildcard(String),
}

/// One named output column of a SELECT list.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedColumn {
    pub name: String,
    pub expression: String,
    pub sources: Vec<ColumnRef>,
    pub transform: TransformKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowIr {
    pub function: String,
    pub partition_by: Vec<String>,
    pub order_by: Vec<String>,
    pub frame: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseIr {
    pub operand: Option<String>,
    pub branches: Vec<CaseBranch>,
    pub else_result: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertIr {
    pub target: TableRefIr,
    pub columns: Vec<String>,
    pub source: Option<QueryIr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentIr {
    pub column: String,
    pub expression: String,
    pub sources: Vec<ColumnRef>,
    pub transform: TransformKind,
    pub subqueries: Vec<QueryIr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateIr {
    pub target: TableRefIr,
    /// Joins written directly on the target (`UPDATE a JOIN b ...`).
    pub joins: Vec<JoinIr>,
    pub assignments: Vec<AssignmentIr>,
    pub from: Vec<FromItemIr>,
    pub filter: Option<PredicateIr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteIr {
    pub targets: Vec<TableRefIr>,
    /// Every FROM/USING entry, targets included.
    pub sources: Vec<FromItemIr>,
    pub filter: Option<PredicateIr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefIr {
    pub name: String,
    pub data_type: Option<String>,
    pub nullable: bool,
    pub primary_key: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTableIr {
    pub name: String,
    pub columns: Vec<ColumnDefIr>,
    pub query: Option<QueryIr>,
    pub temporary: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateViewIr {
    pub name: String,
    pub columns: Vec<String>,
    pub query: QueryIr,
    pub materialized: bool,
}
