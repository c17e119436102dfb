//! Read-only analyses over a built [`LineageGraph`](crate::lineage::LineageGraph).

mod column;
mod flow;
mod impact;
mod traversal;

pub use column::{get_full_column_lineage, get_full_column_lineage_with_config};
pub use flow::{normalize_depth, FlowAnalyzer, FlowOptions};
pub use impact::{column_severity, table_severity, ImpactAnalyzer};
