/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Interactive path creation: a start node followed by waypoints added one
//! click at a time, finished with an automatic end or cancelled wholesale.

use euclid::default::{Point2D, Vector2D};
use log::debug;

use super::{EdgeId, Graph, GraphError, NodeId, NodeType, NodeUpdate, Properties};

/// Result of a finished path session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedPath {
    pub start: NodeId,
    /// End node of the path, if the session produced one.
    pub end: Option<NodeId>,
    pub nodes: Vec<NodeId>,
    pub edges: Vec<EdgeId>,
}

/// In-progress path session.
///
/// Cancellation reverts everything journaled since `begin`, so the graph's
/// journal must not be drained while a session is open.
#[derive(Debug, Clone)]
pub struct PathBuilder {
    start: NodeId,
    last: NodeId,
    nodes: Vec<NodeId>,
    edges: Vec<EdgeId>,
    journal_mark: usize,
}

impl PathBuilder {
    /// Open a session by placing a start node at `position`.
    pub fn begin(graph: &mut Graph, position: Point2D<f32>) -> Result<Self, GraphError> {
        let journal_mark = graph.journal_len();
        let start = graph.add_node(NodeType::Start, position, Properties::new())?;
        debug!("path session opened at {start}");
        Ok(Self {
            start,
            last: start,
            nodes: vec![start],
            edges: Vec::new(),
            journal_mark,
        })
    }

    pub fn start_node(&self) -> NodeId {
        self.start
    }

    pub fn last_node(&self) -> NodeId {
        self.last
    }

    pub fn created_nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn created_edges(&self) -> &[EdgeId] {
        &self.edges
    }

    /// Add a waypoint of `node_type` at `position`, linked from the last node.
    pub fn append(
        &mut self,
        graph: &mut Graph,
        node_type: NodeType,
        position: Point2D<f32>,
    ) -> Result<NodeId, GraphError> {
        let last = self.last;
        let (node, edge) = graph.transact(|g| {
            let node = g.add_node(node_type, position, Properties::new())?;
            let edge = g.add_edge(last, node)?;
            Ok((node, edge))
        })?;
        self.nodes.push(node);
        self.edges.push(edge);
        self.last = node;
        Ok(node)
    }

    /// Link the last node to an existing node; the session continues from it.
    pub fn connect_to(&mut self, graph: &mut Graph, target: NodeId) -> Result<EdgeId, GraphError> {
        let edge = graph.add_edge(self.last, target)?;
        self.edges.push(edge);
        self.last = target;
        Ok(edge)
    }

    /// Close the session.
    ///
    /// A start node with nothing appended gets an end node at `auto_end_offset`.
    /// A trailing empty waypoint created in this session becomes the end node.
    pub fn finish(
        &self,
        graph: &mut Graph,
        auto_end_offset: Vector2D<f32>,
    ) -> Result<FinishedPath, GraphError> {
        let mut finished = FinishedPath {
            start: self.start,
            end: None,
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
        };

        if self.last == self.start {
            let position = graph.node(self.start)?.position + auto_end_offset;
            let start = self.start;
            let (end, edge) = graph.transact(|g| {
                let end = g.add_node(NodeType::End, position, Properties::new())?;
                let edge = g.add_edge(start, end)?;
                Ok((end, edge))
            })?;
            finished.nodes.push(end);
            finished.edges.push(edge);
            finished.end = Some(end);
        } else {
            let trailing = graph.node(self.last)?.node_type;
            let created_here = self.nodes.contains(&self.last);
            if created_here && trailing == NodeType::Empty && graph.out_degree(self.last) == 0 {
                graph.update_node(
                    self.last,
                    NodeUpdate {
                        node_type: Some(NodeType::End),
                        ..Default::default()
                    },
                )?;
                finished.end = Some(self.last);
            } else if trailing == NodeType::End {
                finished.end = Some(self.last);
            }
        }
        debug!(
            "path session closed: {} nodes, {} edges",
            finished.nodes.len(),
            finished.edges.len()
        );
        Ok(finished)
    }

    /// Discard the session, removing every node and edge it created.
    pub fn cancel(self, graph: &mut Graph) {
        debug!("path session from {} cancelled", self.start);
        graph.rollback_to(self.journal_mark);
    }
}
