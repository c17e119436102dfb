//! Human-readable text output formatting.

use flowtrace_core::{
    ColumnLineagePath, ColumnLineageResult, FlowBatch, FlowGraph, FlowResult, ImpactItem,
    ImpactReport, ImpactSeverity, LineageGraph,
};
use is_terminal::IsTerminal;
use owo_colors::OwoColorize;
use std::fmt::{self, Write};

const RULE_WIDTH: usize = 50;

/// Colors only when asked for and stdout is a terminal.
struct Style {
    colored: bool,
}

impl Style {
    fn new(use_colors: bool) -> Self {
        Self {
            colored: use_colors && std::io::stdout().is_terminal(),
        }
    }

    fn header(&self, out: &mut String, title: &str) -> fmt::Result {
        let line = "═".repeat(RULE_WIDTH);
        if self.colored {
            writeln!(out, "{}", title.bold())?;
            writeln!(out, "{}", line.dimmed())
        } else {
            writeln!(out, "{title}")?;
            writeln!(out, "{line}")
        }
    }

    fn accent(&self, text: &str) -> String {
        if self.colored {
            text.cyan().to_string()
        } else {
            text.to_string()
        }
    }

    fn dim(&self, text: &str) -> String {
        if self.colored {
            text.dimmed().to_string()
        } else {
            text.to_string()
        }
    }

    fn error(&self, text: &str) -> String {
        if self.colored {
            text.red().to_string()
        } else {
            text.to_string()
        }
    }

    fn severity(&self, severity: ImpactSeverity) -> String {
        let label = severity.as_str().to_uppercase();
        if !self.colored {
            return label;
        }
        match severity {
            ImpactSeverity::Critical => label.red().bold().to_string(),
            ImpactSeverity::High => label.red().to_string(),
            ImpactSeverity::Medium => label.yellow().to_string(),
            ImpactSeverity::Low => label.green().to_string(),
        }
    }
}

/// Format per-statement flow graphs.
pub fn format_flow_batch(batch: &FlowBatch, quiet: bool, use_colors: bool) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_flow_batch(&mut out, batch, quiet, &Style::new(use_colors));
    out
}

fn write_flow_batch(out: &mut String, batch: &FlowBatch, quiet: bool, style: &Style) -> fmt::Result {
    style.header(out, "FlowTrace Flow Graphs")?;
    for flow in &batch.statements {
        writeln!(
            out,
            "{} {}",
            style.accent(&format!("Statement {}", flow.index + 1)),
            style.dim(&format!("({}, lines {})", flow.statement, flow.lines)),
        )?;
        write_flow_graph(out, &flow.graph, 1, style)?;
        writeln!(out)?;
    }

    if !quiet && !batch.errors.is_empty() {
        writeln!(out, "{}", style.error("Errors:"))?;
        for error in &batch.errors {
            match error.line {
                Some(line) => writeln!(
                    out,
                    "  statement {} (line {line}): {}",
                    error.index + 1,
                    error.message
                )?,
                None => writeln!(out, "  statement {}: {}", error.index + 1, error.message)?,
            }
        }
        writeln!(out)?;
    }

    writeln!(
        out,
        "{}",
        style.accent(&format!(
            "Summary: {} succeeded | {} failed",
            batch.success_count, batch.error_count
        ))
    )
}

fn write_flow_graph(out: &mut String, graph: &FlowGraph, level: usize, style: &Style) -> fmt::Result {
    let indent = "  ".repeat(level);
    for node in &graph.nodes {
        writeln!(
            out,
            "{indent}{:<4} {:<14} {}",
            node.id,
            style.dim(node.kind.as_str()),
            node.label
        )?;
        for annotation in &node.annotations {
            writeln!(
                out,
                "{indent}     + {} {}",
                style.dim(annotation.kind.as_str()),
                annotation.label
            )?;
        }
        if let Some(children) = &node.children {
            write_flow_graph(out, children, level + 2, style)?;
        }
    }
    for edge in &graph.edges {
        match &edge.clause {
            Some(clause) => writeln!(
                out,
                "{indent}{} -> {} {}",
                edge.source,
                edge.target,
                style.dim(&format!("[{clause}]"))
            )?,
            None => writeln!(out, "{indent}{} -> {}", edge.source, edge.target)?,
        }
    }
    Ok(())
}

/// Format the workspace lineage graph as a list of relations and their sources.
pub fn format_graph(graph: &LineageGraph, quiet: bool, use_colors: bool) -> String {
    let mut out = String::new();
    let _ = write_graph(&mut out, graph, quiet, &Style::new(use_colors));
    out
}

fn write_graph(out: &mut String, graph: &LineageGraph, quiet: bool, style: &Style) -> fmt::Result {
    style.header(out, "FlowTrace Lineage Graph")?;
    let files: Vec<&str> = graph.files().collect();
    if !files.is_empty() {
        writeln!(out, "Files: {}", files.join(", "))?;
    }
    writeln!(out)?;

    let stats = graph.stats();
    writeln!(
        out,
        "{}",
        style.accent(&format!(
            "Summary: {} tables | {} views | {} ctes | {} columns | {} edges | {} column edges",
            stats.tables, stats.views, stats.ctes, stats.columns, stats.edges, stats.column_edges
        ))
    )?;
    writeln!(out)?;

    for node in graph.nodes().iter().filter(|n| n.kind().is_relation()) {
        let sources = graph.edges_into(&node.key);
        if sources.is_empty() {
            continue;
        }
        let list: Vec<String> = sources
            .iter()
            .map(|edge| format!("{} ({})", edge.source, edge.kind))
            .collect();
        writeln!(out, "{} <- {}", node.key, list.join(", "))?;
    }

    let externals: Vec<String> = graph
        .nodes()
        .iter()
        .filter(|n| n.is_external())
        .map(|n| n.name().to_string())
        .collect();
    if !quiet && !externals.is_empty() {
        writeln!(out)?;
        writeln!(
            out,
            "{} {}",
            style.dim("Not defined in any input file:"),
            externals.join(", ")
        )?;
    }
    Ok(())
}

/// Format an upstream/downstream traversal.
pub fn format_flow_result(result: &FlowResult, use_colors: bool) -> String {
    let mut out = String::new();
    let _ = write_flow_result(&mut out, result, &Style::new(use_colors));
    out
}

fn write_flow_result(out: &mut String, result: &FlowResult, style: &Style) -> fmt::Result {
    let direction = match result.direction {
        flowtrace_core::Direction::Upstream => "Upstream of",
        flowtrace_core::Direction::Downstream => "Downstream of",
        flowtrace_core::Direction::Both => "Lineage of",
    };
    style.header(out, &format!("{direction} {}", result.start))?;
    let bound = match result.max_depth {
        Some(max) => format!("depth {} of {max}", result.depth),
        None => format!("depth {}, unbounded", result.depth),
    };
    writeln!(
        out,
        "{}",
        style.accent(&format!("{} nodes | {bound}", result.nodes.len()))
    )?;
    writeln!(out)?;

    for node in &result.nodes {
        let location = match (&node.file, node.line) {
            (Some(file), Some(line)) => format!("{file}:{line}"),
            (Some(file), None) => file.clone(),
            _ => String::new(),
        };
        writeln!(
            out,
            "  {:<9} {} {}",
            node.kind().as_str(),
            node.name(),
            style.dim(&location)
        )?;
    }
    if !result.paths.is_empty() {
        writeln!(out)?;
        writeln!(out, "Paths:")?;
        for path in &result.paths {
            writeln!(out, "  {}", path.nodes.join(" -> "))?;
        }
    }
    Ok(())
}

/// Format an impact report.
pub fn format_impact_report(report: &ImpactReport, quiet: bool, use_colors: bool) -> String {
    let mut out = String::new();
    let _ = write_impact_report(&mut out, report, quiet, &Style::new(use_colors));
    out
}

fn write_impact_report(
    out: &mut String,
    report: &ImpactReport,
    quiet: bool,
    style: &Style,
) -> fmt::Result {
    style.header(
        out,
        &format!("Impact of {} on {}", report.change_type, report.target.id),
    )?;
    writeln!(out, "Severity: {}", style.severity(report.severity))?;
    let summary = &report.summary;
    writeln!(
        out,
        "{}",
        style.accent(&format!(
            "Summary: {} tables | {} views | {} queries | {} files",
            summary.tables, summary.views, summary.queries, summary.files
        ))
    )?;

    write_impact_items(out, "Direct", &report.direct, style)?;
    write_impact_items(out, "Transitive", &report.transitive, style)?;

    if !quiet && !report.suggestions.is_empty() {
        writeln!(out)?;
        writeln!(out, "Suggestions:")?;
        for suggestion in &report.suggestions {
            writeln!(out, "  - {suggestion}")?;
        }
    }
    Ok(())
}

fn write_impact_items(
    out: &mut String,
    title: &str,
    items: &[ImpactItem],
    style: &Style,
) -> fmt::Result {
    if items.is_empty() {
        return Ok(());
    }
    writeln!(out)?;
    writeln!(out, "{title}:")?;
    for item in items {
        let location = match (&item.file, item.line) {
            (Some(file), Some(line)) => format!(" ({file}:{line})"),
            (Some(file), None) => format!(" ({file})"),
            _ => String::new(),
        };
        writeln!(
            out,
            "  [{}] {} {}: {}{}",
            style.severity(item.severity),
            item.kind.as_str(),
            item.name,
            item.reason,
            style.dim(&location)
        )?;
    }
    Ok(())
}

/// Format the column tracker result.
pub fn format_column_lineage(result: &ColumnLineageResult, use_colors: bool) -> String {
    let mut out = String::new();
    let _ = write_column_lineage(&mut out, result, &Style::new(use_colors));
    out
}

fn write_column_lineage(
    out: &mut String,
    result: &ColumnLineageResult,
    style: &Style,
) -> fmt::Result {
    let subject = result
        .id
        .clone()
        .unwrap_or_else(|| format!("{}.{}", result.table, result.column));
    style.header(out, &format!("Column lineage of {subject}"))?;
    if let Some(warning) = &result.warning {
        writeln!(out, "{}", style.error(&format!("warning: {warning}")))?;
        return Ok(());
    }
    write_column_paths(out, "Upstream", &result.upstream, style)?;
    write_column_paths(out, "Downstream", &result.downstream, style)
}

fn write_column_paths(
    out: &mut String,
    title: &str,
    paths: &[ColumnLineagePath],
    style: &Style,
) -> fmt::Result {
    writeln!(out)?;
    writeln!(out, "{title} ({} paths):", paths.len())?;
    for path in paths {
        let mut line = String::new();
        for hop in &path.hops {
            let arrow = match &hop.expression {
                Some(expression) => format!("{}: {expression}", hop.transform),
                None => hop.transform.to_string(),
            };
            if line.is_empty() {
                line.push_str(&hop.from);
            }
            write!(line, " -[{}]-> {}", style.dim(&arrow), hop.to)?;
        }
        writeln!(out, "  {line}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowtrace_core::{
        build_flow_batch, build_lineage_graph_from_sources, get_full_column_lineage, ChangeType,
        Dialect, FlowAnalyzer, FlowOptions, ImpactAnalyzer, LineageConfig, SourceFile,
    };

    fn shop() -> LineageGraph {
        build_lineage_graph_from_sources(
            &[SourceFile::new(
                "shop.sql",
                "CREATE TABLE orders (id INT, amount INT);
                 CREATE VIEW totals AS SELECT SUM(amount) AS total FROM orders;",
            )],
            Dialect::Generic,
            &LineageConfig::default(),
        )
    }

    #[test]
    fn test_flow_batch_lists_stages_and_errors() {
        let batch = build_flow_batch(
            "SELECT id FROM orders WHERE id > 1;\nSELEC nope",
            Dialect::Generic,
        );
        let text = format_flow_batch(&batch, false, false);
        assert!(text.contains("Statement 1"));
        assert!(text.contains("filter"));
        assert!(text.contains("statement 2 (line 2)"));
        assert!(text.contains("1 succeeded | 1 failed"));

        let quiet = format_flow_batch(&batch, true, false);
        assert!(!quiet.contains("Errors:"));
    }

    #[test]
    fn test_graph_lists_sources() {
        let text = format_graph(&shop(), false, false);
        assert!(text.contains("view:totals <- table:orders (direct_select)"));
        assert!(text.contains("1 tables | 1 views"));
    }

    #[test]
    fn test_impact_report_text() {
        let graph = shop();
        let report = ImpactAnalyzer::new(&graph)
            .analyze_table_change("orders", ChangeType::Drop)
            .unwrap();
        let text = format_impact_report(&report, false, false);
        assert!(text.contains("Severity: CRITICAL"));
        assert!(text.contains("[CRITICAL] view totals"));
        assert!(text.contains("Suggestions:"));
    }

    #[test]
    fn test_flow_result_and_columns_text() {
        let graph = shop();
        let result = FlowAnalyzer::new(&graph)
            .get_downstream("orders", &FlowOptions::default())
            .unwrap();
        let text = format_flow_result(&result, false);
        assert!(text.contains("Downstream of table:orders"));
        assert!(text.contains("table:orders -> view:totals"));

        let columns = get_full_column_lineage(&graph, "totals", "total");
        let text = format_column_lineage(&columns, false);
        assert!(text.contains(
            "column:orders.amount -[aggregated: SUM(amount)]-> column:totals.total"
        ));
    }
}
