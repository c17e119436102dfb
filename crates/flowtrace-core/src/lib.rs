pub mod adapter;
pub mod analysis;
pub mod config;
pub mod error;
pub mod flow;
pub mod lineage;
pub mod parser;
pub mod types;

// Re-export main types and functions
pub use adapter::{adapt_sql, AdaptedBatch, StatementIr};
pub use analysis::{
    get_full_column_lineage, get_full_column_lineage_with_config, FlowAnalyzer, FlowOptions,
    ImpactAnalyzer,
};
pub use config::{AnalyzerConfig, LineageConfig, DEFAULT_DEPTH, HARD_MAX_DEPTH, UNBOUNDED_DEPTH};
pub use error::{FlowError, ImpactError, LookupError, ParseError};
pub use flow::{build_flow_batch, build_flow_graph};
pub use lineage::{
    build_lineage_graph, build_lineage_graph_from_sources, FileStatements, LineageGraph,
    LineageWorkspace, SourceFile,
};
pub use parser::{parse_batch, parse_sql_with_dialect};

// Re-export types explicitly
pub use types::{
    // Analysis results
    ChangeType,
    ColumnHop,
    ColumnLineagePath,
    ColumnLineageResult,
    Direction,
    FlowPath,
    FlowResult,
    ImpactItem,
    ImpactReport,
    ImpactSeverity,
    ImpactSummary,
    ImpactTarget,
    // Flow graphs
    CaseBranch,
    ClauseType,
    FlowBatch,
    FlowEdge,
    FlowGraph,
    FlowNode,
    FlowNodeDetail,
    FlowNodeKind,
    JoinKind,
    StatementError,
    StatementFlow,
    // Lineage graph
    ColumnEdge,
    ColumnMeta,
    GraphStats,
    LineageEdge,
    LineageEdgeKind,
    LineageNode,
    NodeKey,
    NodeKind,
    QueryReference,
    TransformKind,
    // Common
    Dialect,
    LineRange,
    StatementKind,
};
