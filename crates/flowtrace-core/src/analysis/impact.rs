//! Blast radius of proposed schema changes.

use std::collections::{BTreeSet, HashMap};

#[cfg(feature = "tracing")]
use tracing::debug;

use super::traversal::{traverse, Layer, Traversal};
use crate::config::AnalyzerConfig;
use crate::error::{ImpactError, LookupError};
use crate::lineage::{LineageGraph, NodeIdx};
use crate::types::{
    normalize_name, ChangeType, ImpactItem, ImpactReport, ImpactSeverity, ImpactSummary,
    ImpactTarget, LineageEdgeKind, LineageNode, NodeKey, NodeKind, TransformKind,
};

/// Severity of a dependent reached over relation edges.
pub fn table_severity(change: ChangeType, dependent: NodeKind, direct: bool) -> ImpactSeverity {
    match change {
        ChangeType::Drop if direct => ImpactSeverity::Critical,
        ChangeType::Drop => ImpactSeverity::High,
        ChangeType::Rename if direct => ImpactSeverity::High,
        ChangeType::Rename => ImpactSeverity::Medium,
        ChangeType::Modify => {
            let base = if dependent == NodeKind::View {
                ImpactSeverity::High
            } else {
                ImpactSeverity::Medium
            };
            if direct {
                base
            } else {
                base.one_below()
            }
        }
        ChangeType::AddColumn => ImpactSeverity::Low,
    }
}

/// Severity of a dependent column reached over column edges.
pub fn column_severity(
    change: ChangeType,
    transform: TransformKind,
    direct: bool,
) -> ImpactSeverity {
    match change {
        ChangeType::Drop if direct => ImpactSeverity::Critical,
        ChangeType::Drop => ImpactSeverity::High,
        ChangeType::Rename if direct => ImpactSeverity::High,
        ChangeType::Rename => ImpactSeverity::Medium,
        ChangeType::Modify => {
            let base = match transform {
                TransformKind::Passthrough | TransformKind::Renamed => ImpactSeverity::High,
                TransformKind::Aggregated | TransformKind::Calculated => ImpactSeverity::Medium,
            };
            if direct {
                base
            } else {
                base.one_below()
            }
        }
        ChangeType::AddColumn => ImpactSeverity::Low,
    }
}

/// Severity when nothing depends on the target but queries still touch it.
fn reference_only_severity(change: ChangeType) -> ImpactSeverity {
    match change {
        ChangeType::Drop => ImpactSeverity::High,
        ChangeType::Rename => ImpactSeverity::Medium,
        ChangeType::Modify | ChangeType::AddColumn => ImpactSeverity::Low,
    }
}

/// A dependent plus the graph positions needed to summarize it.
struct Dependent {
    idx: NodeIdx,
    /// Relation the dependent belongs to (itself for relation nodes).
    relation: NodeIdx,
    item: ImpactItem,
}

/// Computes direct and transitive dependents of a table or column change.
///
/// Dependents are everything downstream of the target. CTE nodes are passed
/// through without being reported, so a view that reads a table through its
/// own CTE is still a direct dependent.
#[derive(Debug, Clone)]
pub struct ImpactAnalyzer<'g> {
    graph: &'g LineageGraph,
    config: AnalyzerConfig,
}

impl<'g> ImpactAnalyzer<'g> {
    pub fn new(graph: &'g LineageGraph) -> Self {
        Self::with_config(graph, AnalyzerConfig::default())
    }

    pub fn with_config(graph: &'g LineageGraph, config: AnalyzerConfig) -> Self {
        Self { graph, config }
    }

    pub fn analyze_table_change(
        &self,
        table: &str,
        change: ChangeType,
    ) -> Result<ImpactReport, ImpactError> {
        if table.trim().is_empty() {
            return Err(ImpactError::MissingTable);
        }
        let (target_idx, target) = self.relation(table)?;
        #[cfg(feature = "tracing")]
        debug!(target = %target.key, %change, "table impact analysis");

        let walk = traverse(self.graph, target_idx, false, Layer::Relations, None);
        let dependents = self.relation_dependents(&walk, target, change);
        let star_consumers = if change == ChangeType::AddColumn {
            self.star_consumers(target, &dependents)
        } else {
            Vec::new()
        };

        let report_target = ImpactTarget {
            id: target.key.id(),
            kind: target.kind(),
            name: target.name().to_string(),
            table: None,
        };
        Ok(self.report(change, report_target, target_idx, dependents, star_consumers))
    }

    pub fn analyze_column_change(
        &self,
        table: &str,
        column: &str,
        change: ChangeType,
    ) -> Result<ImpactReport, ImpactError> {
        if table.trim().is_empty() {
            return Err(ImpactError::MissingTable);
        }
        if column.trim().is_empty() {
            return Err(ImpactError::MissingColumn);
        }
        let (parent_idx, parent) = self.relation(table)?;
        let key = NodeKey::column(&parent.key, column);
        let Some(column_idx) = self.graph.index_of(&key) else {
            let query = format!("{}.{}", parent.name(), normalize_name(column));
            return Err(ImpactError::NotFound(LookupError {
                suggestions: self
                    .graph
                    .suggest(&key.id(), self.config.suggestion_limit),
                query,
            }));
        };
        #[cfg(feature = "tracing")]
        debug!(target = %key, %change, "column impact analysis");

        let walk = traverse(self.graph, column_idx, false, Layer::Columns, None);
        let dependents = self.column_dependents(&walk, &key, change);

        let report_target = ImpactTarget {
            id: key.id(),
            kind: NodeKind::Column,
            name: key.simple_name().to_string(),
            table: Some(parent.name().to_string()),
        };
        Ok(self.report(change, report_target, parent_idx, dependents, Vec::new()))
    }

    fn relation(&self, name: &str) -> Result<(NodeIdx, &'g LineageNode), LookupError> {
        let limit = self.config.suggestion_limit;
        let graph = self.graph;
        let node = graph.lookup(name, limit)?;
        match graph.index_of(&node.key) {
            Some(idx) if node.kind().is_relation() => Ok((idx, node)),
            _ => Err(LookupError {
                query: name.to_string(),
                suggestions: graph.suggest(name, limit),
            }),
        }
    }

    fn relation_dependents(
        &self,
        walk: &Traversal,
        target: &LineageNode,
        change: ChangeType,
    ) -> Vec<Dependent> {
        let mut depth: HashMap<NodeIdx, usize> = HashMap::from([(walk.start, 0)]);
        let mut via: HashMap<NodeIdx, LineageEdgeKind> = HashMap::new();
        let mut dependents = Vec::new();

        for reached in &walk.reached {
            let node = self.graph.node_at(reached.idx);
            let edge = self.graph.edge_at(reached.edge);
            let parent_depth = depth.get(&reached.parent).copied().unwrap_or(0);
            let relationship = match via.get(&reached.parent) {
                Some(&inherited) => inherited,
                None => edge.kind,
            };

            if node.kind() == NodeKind::Cte {
                depth.insert(reached.idx, parent_depth);
                via.insert(reached.idx, relationship);
                continue;
            }
            let hop = parent_depth + 1;
            depth.insert(reached.idx, hop);

            let direct = hop == 1;
            let reason = if direct {
                direct_reason(relationship, target.name())
            } else {
                format!(
                    "depends on {} through {}",
                    target.name(),
                    self.nearest_reported(reached.parent, walk)
                )
            };
            dependents.push(Dependent {
                idx: reached.idx,
                relation: reached.idx,
                item: ImpactItem {
                    id: node.key.id(),
                    kind: node.kind(),
                    name: node.name().to_string(),
                    depth: hop,
                    severity: table_severity(change, node.kind(), direct),
                    relationship: Some(relationship),
                    transform: None,
                    reason,
                    file: edge.file.clone(),
                    line: edge.line,
                },
            });
        }
        dependents
    }

    fn column_dependents(
        &self,
        walk: &Traversal,
        target: &NodeKey,
        change: ChangeType,
    ) -> Vec<Dependent> {
        let mut depth: HashMap<NodeIdx, usize> = HashMap::from([(walk.start, 0)]);
        let mut via: HashMap<NodeIdx, TransformKind> = HashMap::new();
        let mut dependents = Vec::new();

        for reached in &walk.reached {
            let node = self.graph.node_at(reached.idx);
            let edge = self.graph.column_edge_at(reached.edge);
            let parent_depth = depth.get(&reached.parent).copied().unwrap_or(0);
            let transform = match via.get(&reached.parent) {
                Some(inner) => inner.compose(edge.transform),
                None => edge.transform,
            };
            let Some(relation) = node
                .parent
                .as_ref()
                .and_then(|parent| self.graph.index_of(parent))
            else {
                continue;
            };

            if self.graph.node_at(relation).kind() == NodeKind::Cte {
                depth.insert(reached.idx, parent_depth);
                via.insert(reached.idx, transform);
                continue;
            }
            let hop = parent_depth + 1;
            depth.insert(reached.idx, hop);

            let direct = hop == 1;
            let reason = if direct {
                match &edge.expression {
                    Some(expression) => format!("{transform} from {} as {expression}", target.name),
                    None => format!("{transform} from {}", target.name),
                }
            } else {
                format!(
                    "derived from {} through {}",
                    target.name,
                    self.nearest_reported(reached.parent, walk)
                )
            };
            dependents.push(Dependent {
                idx: reached.idx,
                relation,
                item: ImpactItem {
                    id: node.key.id(),
                    kind: NodeKind::Column,
                    name: node.name().to_string(),
                    depth: hop,
                    severity: column_severity(change, transform, direct),
                    relationship: None,
                    transform: Some(transform),
                    reason,
                    file: edge.file.clone(),
                    line: edge.line,
                },
            });
        }
        dependents
    }

    /// Name of the closest ancestor in the visit tree that is not a CTE.
    fn nearest_reported(&self, mut idx: NodeIdx, walk: &Traversal) -> String {
        loop {
            let node = self.graph.node_at(idx);
            let hidden = match node.kind() {
                NodeKind::Cte => true,
                NodeKind::Column => node
                    .parent
                    .as_ref()
                    .is_some_and(|parent| parent.kind == NodeKind::Cte),
                _ => false,
            };
            if !hidden || idx == walk.start {
                return node.name().to_string();
            }
            match walk.reached.iter().find(|r| r.idx == idx) {
                Some(step) => idx = step.parent,
                None => return node.name().to_string(),
            }
        }
    }

    /// Direct dependents that pass every column of `target` through unchanged,
    /// which is what a `SELECT *` consumer looks like once expanded.
    fn star_consumers(&self, target: &LineageNode, dependents: &[Dependent]) -> Vec<String> {
        if target.columns.is_empty() {
            return Vec::new();
        }
        dependents
            .iter()
            .filter(|d| d.item.depth == 1)
            .filter(|d| {
                let consumer = &self.graph.node_at(d.idx).key;
                target.columns.iter().all(|column| {
                    let Some(column_idx) = self.graph.index_of(column) else {
                        return false;
                    };
                    self.graph.column_outgoing(column_idx).any(|(edge, next)| {
                        let next = self.graph.node_at(next);
                        next.parent.as_ref() == Some(consumer)
                            && next.key.simple_name() == column.simple_name()
                            && self.graph.column_edge_at(edge).transform
                                == TransformKind::Passthrough
                    })
                })
            })
            .map(|d| d.item.name.clone())
            .collect()
    }

    fn report(
        &self,
        change: ChangeType,
        target: ImpactTarget,
        target_relation: NodeIdx,
        dependents: Vec<Dependent>,
        star_consumers: Vec<String>,
    ) -> ImpactReport {
        let mut tables = BTreeSet::new();
        let mut views = BTreeSet::new();
        let mut files = BTreeSet::new();
        let mut relations = BTreeSet::from([target_relation]);
        for dependent in &dependents {
            let relation = self.graph.node_at(dependent.relation);
            match relation.kind() {
                NodeKind::View => {
                    views.insert(dependent.relation);
                }
                NodeKind::Table | NodeKind::External => {
                    tables.insert(dependent.relation);
                }
                NodeKind::Cte | NodeKind::Column => {}
            }
            relations.insert(dependent.relation);
            if let Some(file) = &dependent.item.file {
                files.insert(file.clone());
            }
        }

        let mut queries = 0;
        for &relation in &relations {
            for reference in self.graph.references_to(&self.graph.node_at(relation).key) {
                queries += 1;
                if let Some(file) = &reference.file {
                    files.insert(file.clone());
                }
            }
        }
        let summary = ImpactSummary {
            tables: tables.len(),
            views: views.len(),
            queries,
            files: files.len(),
        };

        let direct_views: Vec<String> = dependents
            .iter()
            .filter(|d| {
                d.item.depth == 1 && self.graph.node_at(d.relation).kind() == NodeKind::View
            })
            .map(|d| d.item.name.clone())
            .collect();
        let (direct, transitive): (Vec<ImpactItem>, Vec<ImpactItem>) = dependents
            .into_iter()
            .map(|d| d.item)
            .partition(|item| item.depth == 1);

        let severity = direct
            .iter()
            .chain(&transitive)
            .map(|item| item.severity)
            .max()
            .unwrap_or(if queries > 0 {
                reference_only_severity(change)
            } else {
                ImpactSeverity::Low
            });

        let suggestions = suggestions(
            change,
            &target,
            &direct,
            &transitive,
            &summary,
            &direct_views,
            &star_consumers,
        );
        ImpactReport {
            change_type: change,
            target,
            severity,
            summary,
            direct,
            transitive,
            suggestions,
        }
    }
}

fn direct_reason(relationship: LineageEdgeKind, target: &str) -> String {
    match relationship {
        LineageEdgeKind::DirectSelect => format!("selects from {target}"),
        LineageEdgeKind::Join => format!("joins {target}"),
        LineageEdgeKind::Insert => format!("is loaded by an INSERT reading {target}"),
        LineageEdgeKind::Update => format!("is updated using {target}"),
        LineageEdgeKind::Delete => format!("has rows deleted based on {target}"),
    }
}

fn names(items: &[&ImpactItem]) -> String {
    items
        .iter()
        .map(|item| item.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn suggestions(
    change: ChangeType,
    target: &ImpactTarget,
    direct: &[ImpactItem],
    transitive: &[ImpactItem],
    summary: &ImpactSummary,
    direct_views: &[String],
    star_consumers: &[String],
) -> Vec<String> {
    let subject = match &target.table {
        Some(table) => format!("{table}.{}", target.name),
        None => target.name.clone(),
    };
    let mut out = Vec::new();

    if !direct_views.is_empty() && change != ChangeType::AddColumn {
        out.push(format!(
            "Update the view definitions that read {subject}: {}",
            direct_views.join(", ")
        ));
    }

    let writers: Vec<&ImpactItem> = direct
        .iter()
        .filter(|item| item.relationship.is_some_and(|kind| kind.is_mutation()))
        .collect();
    if !writers.is_empty() {
        out.push(format!(
            "Check the INSERT, UPDATE and DELETE statements that write {}",
            names(&writers)
        ));
    }

    if change == ChangeType::Drop && !direct.is_empty() {
        out.push(format!(
            "Migrate or remove the {} direct dependents before dropping {subject}",
            direct.len()
        ));
    }
    if change == ChangeType::Rename && summary.files > 1 {
        out.push(format!(
            "{subject} is referenced from {} files; rename every reference in the same change",
            summary.files
        ));
    }
    if !transitive.is_empty() {
        out.push(format!(
            "{} objects depend on {subject} indirectly; re-test them once the direct dependents are updated",
            transitive.len()
        ));
    }
    if !star_consumers.is_empty() {
        out.push(format!(
            "SELECT * consumers will pick up the new column: {}",
            star_consumers.join(", ")
        ));
    }
    if direct.is_empty() && summary.queries > 0 {
        out.push(format!(
            "{} queries reference {subject}; review them before applying the change",
            summary.queries
        ));
    }
    if out.is_empty() {
        out.push(format!("No dependents of {subject} found; the change is self-contained"));
    }
    out
}
