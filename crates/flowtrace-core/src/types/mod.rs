//! Serializable types shared by the flow builder, the lineage graph and the analyzers.
//!
//! Everything here is a plain value object: results returned by the analyzers carry
//! no reference back to the graph they were computed from.

mod analysis;
mod common;
mod flow;
mod lineage;

pub use analysis::{
    ChangeType, ColumnHop, ColumnLineagePath, ColumnLineageResult, Direction, FlowPath,
    FlowResult, ImpactItem, ImpactReport, ImpactSeverity, ImpactSummary, ImpactTarget,
};
pub use common::{Dialect, LineRange, StatementKind};
pub use flow::{
    CaseBranch, ClauseType, FlowBatch, FlowEdge, FlowGraph, FlowNode, FlowNodeDetail,
    FlowNodeKind, JoinKind, StatementError, StatementFlow,
};
pub use lineage::{
    ColumnEdge, ColumnMeta, GraphStats, LineageEdge, LineageEdgeKind, LineageNode, NodeKey,
    NodeKind, QueryReference, TransformKind,
};
pub use lineage::normalize_name;
