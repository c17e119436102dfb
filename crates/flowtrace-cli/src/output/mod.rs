//! Output formatting modules.

pub mod json;
pub mod text;

pub use json::format_json;
pub use text::{
    format_column_lineage, format_flow_batch, format_flow_result, format_graph,
    format_impact_report,
};
