/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Structural validation of diagram documents.
//!
//! Works on a `GraphSnapshot` rather than the live store so that loaded or
//! hand-edited documents can be checked before (or without) building a
//! `Graph`. Errors make a document invalid; warnings do not.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write as _;

use log::debug;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use serde::Serialize;

use crate::model::graph::{FORK_TYPE_KEY, GateKind, JOIN_TYPE_KEY, NodeType};
use crate::services::persistence::types::{GraphSnapshot, PersistedNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueCategory {
    DuplicateId,
    DanglingEdge,
    PathStart,
    PathEnd,
    TerminalEdge,
    UnreachableCycle,
    GateKind,
    Containment,
    ContainmentCycle,
    OrphanNode,
    DegenerateFork,
    DegenerateJoin,
    DisconnectedTerminal,
}

impl IssueCategory {
    pub fn label(self) -> &'static str {
        match self {
            IssueCategory::DuplicateId => "duplicate id",
            IssueCategory::DanglingEdge => "dangling edge",
            IssueCategory::PathStart => "path start",
            IssueCategory::PathEnd => "path end",
            IssueCategory::TerminalEdge => "terminal edge",
            IssueCategory::UnreachableCycle => "unreachable cycle",
            IssueCategory::GateKind => "gate kind",
            IssueCategory::Containment => "containment",
            IssueCategory::ContainmentCycle => "containment cycle",
            IssueCategory::OrphanNode => "orphan node",
            IssueCategory::DegenerateFork => "degenerate fork",
            IssueCategory::DegenerateJoin => "degenerate join",
            IssueCategory::DisconnectedTerminal => "disconnected terminal",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub category: IssueCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
}

impl ValidationIssue {
    fn new(category: IssueCategory, entity_id: &str, message: String) -> Self {
        Self {
            category,
            message,
            entity_id: Some(entity_id.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

#[derive(Default)]
struct Collector {
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
}

impl Collector {
    fn error(&mut self, category: IssueCategory, entity_id: &str, message: String) {
        self.errors
            .push(ValidationIssue::new(category, entity_id, message));
    }

    fn warning(&mut self, category: IssueCategory, entity_id: &str, message: String) {
        self.warnings
            .push(ValidationIssue::new(category, entity_id, message));
    }
}

/// Check a document for structural errors and warnings.
pub fn validate(snapshot: &GraphSnapshot) -> ValidationReport {
    let mut issues = Collector::default();
    check_paths(snapshot, &mut issues);
    check_containment(snapshot, &mut issues);
    debug!(
        "validation: {} errors, {} warnings",
        issues.errors.len(),
        issues.warnings.len()
    );
    ValidationReport {
        valid: issues.errors.is_empty(),
        errors: issues.errors,
        warnings: issues.warnings,
    }
}

fn check_paths(snapshot: &GraphSnapshot, issues: &mut Collector) {
    let mut nodes: HashMap<&str, &PersistedNode> = HashMap::new();
    let mut indices: HashMap<&str, NodeIndex> = HashMap::new();
    let mut flow: DiGraph<&str, ()> = DiGraph::new();
    for node in &snapshot.nodes {
        if nodes.insert(node.id.as_str(), node).is_some() {
            issues.error(
                IssueCategory::DuplicateId,
                &node.id,
                format!("Node id {} is used more than once", node.id),
            );
            continue;
        }
        indices.insert(node.id.as_str(), flow.add_node(node.id.as_str()));
    }

    // Dangling edges still count toward the degree of the endpoint that exists.
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut out_degree: HashMap<&str, usize> = HashMap::new();
    let mut edge_ids: HashSet<&str> = HashSet::new();
    for edge in &snapshot.edges {
        if !edge_ids.insert(edge.id.as_str()) {
            issues.error(
                IssueCategory::DuplicateId,
                &edge.id,
                format!("Edge id {} is used more than once", edge.id),
            );
        }
        let source = edge.source_node_id.as_str();
        let target = edge.target_node_id.as_str();
        let missing: Vec<String> = [("source", source), ("target", target)]
            .into_iter()
            .filter(|(_, id)| !nodes.contains_key(id))
            .map(|(role, id)| format!("{role} node {id}"))
            .collect();
        if !missing.is_empty() {
            issues.error(
                IssueCategory::DanglingEdge,
                &edge.id,
                format!("Edge {} references missing {}", edge.id, missing.join(" and ")),
            );
        }
        if nodes.contains_key(source) {
            *out_degree.entry(source).or_default() += 1;
        }
        if nodes.contains_key(target) {
            *in_degree.entry(target).or_default() += 1;
        }
        if let (Some(&from), Some(&to)) = (indices.get(source), indices.get(target)) {
            flow.add_edge(from, to, ());
        }
    }

    let mut seen: HashSet<&str> = HashSet::new();
    for node in &snapshot.nodes {
        if !seen.insert(node.id.as_str()) {
            continue;
        }
        let id = node.id.as_str();
        let incoming = in_degree.get(id).copied().unwrap_or(0);
        let outgoing = out_degree.get(id).copied().unwrap_or(0);
        let node_type = node.node_type;

        match node_type {
            NodeType::Start => {
                if incoming > 0 {
                    issues.error(
                        IssueCategory::TerminalEdge,
                        id,
                        format!("Start node {id} has {incoming} incoming edge(s)"),
                    );
                }
                if outgoing == 0 {
                    issues.warning(
                        IssueCategory::DisconnectedTerminal,
                        id,
                        format!("Start node {id} does not lead anywhere"),
                    );
                }
            },
            NodeType::End => {
                if outgoing > 0 {
                    issues.error(
                        IssueCategory::TerminalEdge,
                        id,
                        format!("End node {id} has {outgoing} outgoing edge(s)"),
                    );
                }
                if incoming == 0 {
                    issues.warning(
                        IssueCategory::DisconnectedTerminal,
                        id,
                        format!("End node {id} is not reached by any path"),
                    );
                }
            },
            _ if incoming == 0 && outgoing == 0 => {
                issues.warning(
                    IssueCategory::OrphanNode,
                    id,
                    format!("Node {id} ({node_type}) has no incoming or outgoing edges"),
                );
            },
            _ => {
                if incoming == 0 {
                    issues.error(
                        IssueCategory::PathStart,
                        id,
                        format!("Path through {id} begins at a {node_type} node instead of a start node"),
                    );
                }
                if outgoing == 0 {
                    issues.error(
                        IssueCategory::PathEnd,
                        id,
                        format!("Path through {id} ends at a {node_type} node instead of an end node"),
                    );
                }
            },
        }

        match node_type {
            NodeType::Fork => {
                check_gate_kind(node, FORK_TYPE_KEY, issues);
                if outgoing < 2 {
                    issues.warning(
                        IssueCategory::DegenerateFork,
                        id,
                        format!("Fork {id} has {outgoing} outgoing branch(es); expected at least 2"),
                    );
                }
            },
            NodeType::Join => {
                check_gate_kind(node, JOIN_TYPE_KEY, issues);
                if incoming < 2 {
                    issues.warning(
                        IssueCategory::DegenerateJoin,
                        id,
                        format!("Join {id} has {incoming} incoming branch(es); expected at least 2"),
                    );
                }
            },
            _ => {},
        }
    }

    // Cycles no path can enter: nodes with edges that no in-degree-0 node reaches.
    let roots: Vec<NodeIndex> = flow
        .node_indices()
        .filter(|&index| {
            flow.neighbors_directed(index, Direction::Incoming)
                .next()
                .is_none()
        })
        .collect();
    let mut reached: HashSet<NodeIndex> = HashSet::new();
    let mut dfs = Dfs::empty(&flow);
    for root in roots {
        dfs.move_to(root);
        while let Some(visited) = dfs.next(&flow) {
            reached.insert(visited);
        }
    }
    for index in flow.node_indices() {
        if reached.contains(&index) {
            continue;
        }
        let id = flow[index];
        issues.error(
            IssueCategory::UnreachableCycle,
            id,
            format!("Node {id} lies on a cycle that no path enters from a start node"),
        );
    }
}

fn check_gate_kind(node: &PersistedNode, key: &str, issues: &mut Collector) {
    let id = node.id.as_str();
    match node.properties.get(key) {
        None => issues.error(
            IssueCategory::GateKind,
            id,
            format!("{} {id} is missing {key}", node.node_type),
        ),
        Some(value) => {
            let parsed = value.as_str().map(str::parse::<GateKind>);
            if !matches!(parsed, Some(Ok(_))) {
                issues.error(
                    IssueCategory::GateKind,
                    id,
                    format!("{} {id} has invalid {key} {value}; expected \"or\" or \"and\"", node.node_type),
                );
            }
        },
    }
}

fn check_containment(snapshot: &GraphSnapshot, issues: &mut Collector) {
    let node_parents: HashMap<&str, Option<&str>> = snapshot
        .nodes
        .iter()
        .map(|node| (node.id.as_str(), node.parent_component.as_deref()))
        .collect();
    let mut component_parents: HashMap<&str, Option<&str>> = HashMap::new();
    for component in &snapshot.components {
        if component_parents
            .insert(component.id.as_str(), component.parent_component.as_deref())
            .is_some()
        {
            issues.error(
                IssueCategory::DuplicateId,
                &component.id,
                format!("Component id {} is used more than once", component.id),
            );
        }
    }

    let mut node_listed_by: HashMap<&str, &str> = HashMap::new();
    let mut component_listed_by: HashMap<&str, &str> = HashMap::new();
    for component in &snapshot.components {
        let cid = component.id.as_str();
        for child in &component.child_nodes {
            let child = child.as_str();
            match node_parents.get(child) {
                None => issues.error(
                    IssueCategory::Containment,
                    cid,
                    format!("Component {cid} lists missing node {child}"),
                ),
                Some(claimed) if *claimed != Some(cid) => issues.error(
                    IssueCategory::Containment,
                    child,
                    format!(
                        "Node {child} is listed by {cid} but claims parent {}",
                        claimed.unwrap_or("none")
                    ),
                ),
                Some(_) => {},
            }
            if let Some(previous) = node_listed_by.insert(child, cid) {
                issues.error(
                    IssueCategory::Containment,
                    child,
                    format!("Node {child} is listed by both {previous} and {cid}"),
                );
            }
        }
        for child in &component.child_components {
            let child = child.as_str();
            match component_parents.get(child) {
                None => issues.error(
                    IssueCategory::Containment,
                    cid,
                    format!("Component {cid} lists missing component {child}"),
                ),
                Some(claimed) if *claimed != Some(cid) => issues.error(
                    IssueCategory::Containment,
                    child,
                    format!(
                        "Component {child} is nested in {cid} but claims parent {}",
                        claimed.unwrap_or("none")
                    ),
                ),
                Some(_) => {},
            }
            if let Some(previous) = component_listed_by.insert(child, cid) {
                issues.error(
                    IssueCategory::Containment,
                    child,
                    format!("Component {child} is nested in both {previous} and {cid}"),
                );
            }
        }
    }

    for node in &snapshot.nodes {
        let Some(parent) = node.parent_component.as_deref() else {
            continue;
        };
        let id = node.id.as_str();
        if !component_parents.contains_key(parent) {
            issues.error(
                IssueCategory::Containment,
                id,
                format!("Node {id} references missing component {parent}"),
            );
        } else if node_listed_by.get(id) != Some(&parent) {
            issues.error(
                IssueCategory::Containment,
                id,
                format!("Node {id} claims component {parent} which does not list it"),
            );
        }
    }

    for component in &snapshot.components {
        let Some(parent) = component.parent_component.as_deref() else {
            continue;
        };
        let id = component.id.as_str();
        if !component_parents.contains_key(parent) {
            issues.error(
                IssueCategory::Containment,
                id,
                format!("Component {id} references missing parent {parent}"),
            );
        } else if component_listed_by.get(id) != Some(&parent) {
            issues.error(
                IssueCategory::Containment,
                id,
                format!("Component {id} claims parent {parent} which does not list it"),
            );
        }
    }

    // Walk up the listed nesting; a walk longer than the component count loops.
    for component in &snapshot.components {
        let id = component.id.as_str();
        let mut cursor = component_listed_by.get(id).copied();
        let mut steps = 0;
        while let Some(current) = cursor {
            if current == id {
                issues.error(
                    IssueCategory::ContainmentCycle,
                    id,
                    format!("Component {id} is nested inside itself"),
                );
                break;
            }
            steps += 1;
            if steps > snapshot.components.len() {
                break;
            }
            cursor = component_listed_by.get(current).copied();
        }
    }
}

/// Human-readable summary: status line, then per-category counts and messages
/// for errors and warnings.
pub fn generate_report(report: &ValidationReport) -> String {
    let mut out = String::new();
    let status = if report.valid { "PASSED" } else { "FAILED" };
    let _ = writeln!(
        out,
        "Validation {status}: {} error(s), {} warning(s)",
        report.errors.len(),
        report.warnings.len()
    );
    write_section(&mut out, "Errors", &report.errors);
    write_section(&mut out, "Warnings", &report.warnings);
    out
}

fn write_section(out: &mut String, title: &str, issues: &[ValidationIssue]) {
    if issues.is_empty() {
        return;
    }
    let mut counts: BTreeMap<IssueCategory, usize> = BTreeMap::new();
    for issue in issues {
        *counts.entry(issue.category).or_default() += 1;
    }
    let _ = writeln!(out, "\n{title}:");
    for (category, count) in counts {
        let _ = writeln!(out, "  {}: {count}", category.label());
    }
    for issue in issues {
        let _ = writeln!(out, "  - {}", issue.message);
    }
}
