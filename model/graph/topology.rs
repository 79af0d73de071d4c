/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Composite structural edits built from the store primitives.
//!
//! Each operation runs inside `Graph::transact`, so it either applies fully or
//! leaves the graph as it was.

use std::collections::BTreeSet;

use euclid::default::{Point2D, Vector2D};

use super::{
    ComponentId, ComponentRemovalPolicy, EdgeId, EntityRef, FORK_TYPE_KEY, GateKind, Graph,
    GraphError, JOIN_TYPE_KEY, NodeId, NodeType, NodeUpdate, Properties, Violation,
    gate_property,
};

/// A branch created off a gate: the new waypoint and the edge linking it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Branch {
    pub node: NodeId,
    pub edge: EdgeId,
}

/// Entities picked for a bulk delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub nodes: BTreeSet<NodeId>,
    pub edges: BTreeSet<EdgeId>,
    pub components: BTreeSet<ComponentId>,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty() && self.components.is_empty()
    }
}

/// What a bulk delete actually removed. Edges cascaded from node removal are
/// not listed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionSummary {
    pub nodes: Vec<NodeId>,
    pub edges: Vec<EdgeId>,
    pub components: Vec<ComponentId>,
}

fn midpoint(a: Point2D<f32>, b: Point2D<f32>) -> Point2D<f32> {
    a.lerp(b, 0.5)
}

impl Graph {
    fn edge_endpoints(&self, edge: EdgeId) -> Result<(NodeId, NodeId), GraphError> {
        self.get_edge(edge)
            .map(|e| (e.source, e.target))
            .ok_or(GraphError::NotFound(EntityRef::Edge(edge)))
    }

    /// Component a node inserted on `edge` should join: the source's, else the target's.
    fn edge_component(&self, source: NodeId, target: NodeId) -> Option<ComponentId> {
        self.get_node(source)
            .and_then(|node| node.parent_component)
            .or_else(|| self.get_node(target).and_then(|node| node.parent_component))
    }

    /// Split `edge` with a new node at its midpoint. The new node joins
    /// `component` when given; the original condition stays on the first half.
    fn split_edge(
        &mut self,
        edge: EdgeId,
        node_type: NodeType,
        properties: Properties,
        component: Option<ComponentId>,
    ) -> Result<NodeId, GraphError> {
        if node_type.is_terminal() {
            return Err(Violation::TerminalInsidePath { node_type }.into());
        }
        let original = self
            .get_edge(edge)
            .cloned()
            .ok_or(GraphError::NotFound(EntityRef::Edge(edge)))?;
        let position = midpoint(
            self.node(original.source)?.position,
            self.node(original.target)?.position,
        );
        self.transact(|graph| {
            graph.remove_edge(edge)?;
            let inserted = graph.add_node(node_type, position, properties)?;
            if let Some(component) = component {
                graph.bind_node_to_component(inserted, component)?;
            }
            graph.add_edge_with_condition(original.source, inserted, original.condition.clone())?;
            graph.add_edge(inserted, original.target)?;
            Ok(inserted)
        })
    }

    /// Insert a node into the first outgoing edge of `node`.
    /// Returns `Ok(None)` when `node` has no outgoing edge.
    pub fn insert_node_after(
        &mut self,
        node: NodeId,
        node_type: NodeType,
    ) -> Result<Option<NodeId>, GraphError> {
        let component = self.node(node)?.parent_component;
        let Some(edge) = self.out_edges(node).first().copied() else {
            return Ok(None);
        };
        self.split_edge(edge, node_type, Properties::new(), component)
            .map(Some)
    }

    /// Insert a node into the first incoming edge of `node`.
    /// Returns `Ok(None)` when `node` has no incoming edge.
    pub fn insert_node_before(
        &mut self,
        node: NodeId,
        node_type: NodeType,
    ) -> Result<Option<NodeId>, GraphError> {
        let component = self.node(node)?.parent_component;
        let Some(edge) = self.in_edges(node).first().copied() else {
            return Ok(None);
        };
        self.split_edge(edge, node_type, Properties::new(), component)
            .map(Some)
    }

    /// Replace `edge` with source → new node → target.
    pub fn insert_node_on_edge(
        &mut self,
        edge: EdgeId,
        node_type: NodeType,
    ) -> Result<NodeId, GraphError> {
        let (source, target) = self.edge_endpoints(edge)?;
        let component = self.edge_component(source, target);
        self.split_edge(edge, node_type, Properties::new(), component)
    }

    /// Retype `node` to a fork of `kind`. When it has fewer than two outgoing
    /// edges a branch to a new empty node is added at `branch_offset`.
    pub fn convert_to_fork(
        &mut self,
        node: NodeId,
        kind: GateKind,
        branch_offset: Vector2D<f32>,
    ) -> Result<Option<Branch>, GraphError> {
        let position = self.node(node)?.position;
        self.transact(|graph| {
            graph.update_node(
                node,
                NodeUpdate {
                    node_type: Some(NodeType::Fork),
                    properties: gate_property(FORK_TYPE_KEY, kind),
                    ..Default::default()
                },
            )?;
            if graph.out_degree(node) >= 2 {
                return Ok(None);
            }
            graph.add_branch(node, position + branch_offset).map(Some)
        })
    }

    /// Retype `node` to a join of `kind`. Incoming branches are left to the caller.
    pub fn convert_to_join(&mut self, node: NodeId, kind: GateKind) -> Result<(), GraphError> {
        self.update_node(
            node,
            NodeUpdate {
                node_type: Some(NodeType::Join),
                properties: gate_property(JOIN_TYPE_KEY, kind),
                ..Default::default()
            },
        )?;
        Ok(())
    }

    /// New empty node at `position` fed by a new edge from `node`.
    /// The branch joins `node`'s component.
    pub fn add_branch(&mut self, node: NodeId, position: Point2D<f32>) -> Result<Branch, GraphError> {
        let source = self.node(node)?;
        if source.node_type == NodeType::End {
            return Err(Violation::EndHasOutgoing { node }.into());
        }
        let component = source.parent_component;
        self.transact(|graph| {
            let branch = graph.add_node(NodeType::Empty, position, Properties::new())?;
            if let Some(component) = component {
                graph.bind_node_to_component(branch, component)?;
            }
            let edge = graph.add_edge(node, branch)?;
            Ok(Branch { node: branch, edge })
        })
    }

    /// Flip a fork or join between `or` and `and`.
    pub fn toggle_gate_kind(&mut self, node: NodeId) -> Result<GateKind, GraphError> {
        let current = self.node(node)?;
        let key = match current.node_type {
            NodeType::Fork => FORK_TYPE_KEY,
            NodeType::Join => JOIN_TYPE_KEY,
            other => {
                return Err(GraphError::InvalidType(format!(
                    "{other} node {node} has no gate kind"
                )));
            },
        };
        let next = current.gate_kind().unwrap_or_default().toggled();
        self.update_node(
            node,
            NodeUpdate {
                properties: gate_property(key, next),
                ..Default::default()
            },
        )?;
        Ok(next)
    }

    /// Split `edge` with a fork of `kind` and give it a second outgoing branch.
    pub fn insert_fork_on_path(
        &mut self,
        edge: EdgeId,
        kind: GateKind,
        branch_offset: Vector2D<f32>,
    ) -> Result<(NodeId, Branch), GraphError> {
        let (source, target) = self.edge_endpoints(edge)?;
        let component = self.edge_component(source, target);
        self.transact(|graph| {
            let fork = graph.split_edge(
                edge,
                NodeType::Fork,
                gate_property(FORK_TYPE_KEY, kind),
                component,
            )?;
            let position = graph.node(fork)?.position + branch_offset;
            let branch = graph.add_branch(fork, position)?;
            Ok((fork, branch))
        })
    }

    /// Split `edge` with a join of `kind` and give it a second incoming branch
    /// from a new empty node placed `branch_offset` before it.
    pub fn insert_join_on_path(
        &mut self,
        edge: EdgeId,
        kind: GateKind,
        branch_offset: Vector2D<f32>,
    ) -> Result<(NodeId, Branch), GraphError> {
        let (source, target) = self.edge_endpoints(edge)?;
        let component = self.edge_component(source, target);
        self.transact(|graph| {
            let join = graph.split_edge(
                edge,
                NodeType::Join,
                gate_property(JOIN_TYPE_KEY, kind),
                component,
            )?;
            let position = graph.node(join)?.position - branch_offset;
            let feeder = graph.add_node(NodeType::Empty, position, Properties::new())?;
            if let Some(component) = component {
                graph.bind_node_to_component(feeder, component)?;
            }
            let feed = graph.add_edge(feeder, join)?;
            Ok((
                join,
                Branch {
                    node: feeder,
                    edge: feed,
                },
            ))
        })
    }

    /// Whether removing `edge` alone keeps every path continuous.
    ///
    /// Allowed when both endpoints are terminals, when the source has another
    /// outgoing edge, or when the target has another incoming edge.
    pub fn can_delete_edge(&self, edge: EdgeId) -> Result<(), GraphError> {
        let (source, target) = self.edge_endpoints(edge)?;
        let both_terminal =
            self.node(source)?.node_type.is_terminal() && self.node(target)?.node_type.is_terminal();
        if both_terminal || self.out_degree(source) > 1 || self.in_degree(target) > 1 {
            return Ok(());
        }
        Err(Violation::StrandedPath {
            edge,
            source_node: source,
            target_node: target,
        }
        .into())
    }

    /// Continuity-checked edge removal.
    pub fn delete_edge(&mut self, edge: EdgeId) -> Result<(), GraphError> {
        self.can_delete_edge(edge)?;
        self.remove_edge(edge)?;
        Ok(())
    }

    /// Delete a mixed selection as one step: edges, then nodes (cascading
    /// their edges), then components under `policy`.
    ///
    /// Continuity is only enforced for selected edges whose endpoints both
    /// survive the delete. Ids no longer present are skipped.
    pub fn delete_selection(
        &mut self,
        selection: &Selection,
        policy: ComponentRemovalPolicy,
    ) -> Result<DeletionSummary, GraphError> {
        self.transact(|graph| {
            let mut summary = DeletionSummary::default();
            for &edge in &selection.edges {
                let Ok((source, target)) = graph.edge_endpoints(edge) else {
                    continue;
                };
                let endpoints_survive =
                    !selection.nodes.contains(&source) && !selection.nodes.contains(&target);
                if endpoints_survive {
                    graph.can_delete_edge(edge)?;
                }
                graph.remove_edge(edge)?;
                summary.edges.push(edge);
            }
            for &node in &selection.nodes {
                if !graph.contains_node(node) {
                    continue;
                }
                graph.remove_node(node)?;
                summary.nodes.push(node);
            }
            for &component in &selection.components {
                if graph.get_component(component).is_none() {
                    continue;
                }
                graph.remove_component(component, policy)?;
                summary.components.push(component);
            }
            Ok(summary)
        })
    }
}
