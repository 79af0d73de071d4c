/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Graph store for Use Case Map diagrams.
//!
//! Core structures:
//! - `Graph`: entity arena backed by petgraph::StableGraph plus a component tree
//! - `Node`: typed waypoint with position, properties and an optional component binding
//! - `Edge`: directed path segment carrying a guard condition and control points
//! - `Component`: containment box grouping nodes and nested components
//!
//! Every reference between entities is an id resolved through the store. Edge
//! adjacency (`in_edges`/`out_edges`) is derived from the petgraph index and is
//! never authored by callers.
//!
//! Boundary: every mutation appends a `Mutation` to the journal and broadcasts
//! a `GraphEvent`. `EditorApp` drains the journal into undo history; callers
//! that mutate a `Graph` directly bypass history.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use crossbeam_channel::{Receiver, Sender};
use euclid::default::{Point2D, Rect, Vector2D};
use log::{error, warn};
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableGraph};
use petgraph::{Directed, Direction};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::services::persistence::PersistenceError;
use crate::services::persistence::types::{
    GraphSnapshot, PersistedBounds, PersistedComponent, PersistedEdge, PersistedNode,
    PersistedPoint,
};

pub mod path_builder;
pub mod topology;

/// Stable node handle (petgraph NodeIndex, survives other deletions)
pub type NodeKey = NodeIndex;

/// Stable edge handle (petgraph EdgeIndex)
pub type EdgeKey = EdgeIndex;

/// Open key/value bag attached to nodes and components.
pub type Properties = BTreeMap<String, serde_json::Value>;

pub const FORK_TYPE_KEY: &str = "forkType";
pub const JOIN_TYPE_KEY: &str = "joinType";
pub const NAME_KEY: &str = "name";
pub const DEFAULT_CONDITION: &str = "true";

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u64);

        impl $name {
            pub const PREFIX: &'static str = $prefix;

            pub fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            pub fn raw(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", Self::PREFIX, self.0)
            }
        }

        impl FromStr for $name {
            type Err = PersistenceError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.strip_prefix(Self::PREFIX)
                    .and_then(|rest| rest.strip_prefix('-'))
                    .and_then(|raw| raw.parse::<u64>().ok())
                    .map(Self)
                    .ok_or_else(|| PersistenceError::InvalidId(s.to_string()))
            }
        }
    };
}

entity_id!(
    /// Process-assigned node identity, rendered as `node-N`.
    NodeId,
    "node"
);
entity_id!(
    /// Process-assigned edge identity, rendered as `edge-N`.
    EdgeId,
    "edge"
);
entity_id!(
    /// Process-assigned component identity, rendered as `component-N`.
    ComponentId,
    "component"
);

/// Reference to any stored entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityRef {
    Node(NodeId),
    Edge(EdgeId),
    Component(ComponentId),
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Node(id) => id.fmt(f),
            EntityRef::Edge(id) => id.fmt(f),
            EntityRef::Component(id) => id.fmt(f),
        }
    }
}

/// Waypoint classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Start,
    End,
    Responsibility,
    Timer,
    Empty,
    Fork,
    Join,
}

impl NodeType {
    pub const ALL: [NodeType; 7] = [
        NodeType::Start,
        NodeType::End,
        NodeType::Responsibility,
        NodeType::Timer,
        NodeType::Empty,
        NodeType::Fork,
        NodeType::Join,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NodeType::Start => "start",
            NodeType::End => "end",
            NodeType::Responsibility => "responsibility",
            NodeType::Timer => "timer",
            NodeType::Empty => "empty",
            NodeType::Fork => "fork",
            NodeType::Join => "join",
        }
    }

    /// `start` and `end` bound a path.
    pub fn is_terminal(self) -> bool {
        matches!(self, NodeType::Start | NodeType::End)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        NodeType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == lower)
            .ok_or_else(|| GraphError::InvalidType(s.to_string()))
    }
}

/// Organizational unit a component box stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentType {
    Actor,
    Team,
    Object,
    Process,
    Agent,
}

impl ComponentType {
    pub const ALL: [ComponentType; 5] = [
        ComponentType::Actor,
        ComponentType::Team,
        ComponentType::Object,
        ComponentType::Process,
        ComponentType::Agent,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ComponentType::Actor => "actor",
            ComponentType::Team => "team",
            ComponentType::Object => "object",
            ComponentType::Process => "process",
            ComponentType::Agent => "agent",
        }
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComponentType {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        ComponentType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == lower)
            .ok_or_else(|| GraphError::InvalidType(s.to_string()))
    }
}

/// Fork/join semantics: `or` = alternative branches, `and` = parallel branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateKind {
    #[default]
    Or,
    And,
}

impl GateKind {
    pub fn as_str(self) -> &'static str {
        match self {
            GateKind::Or => "or",
            GateKind::And => "and",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            GateKind::Or => GateKind::And,
            GateKind::And => GateKind::Or,
        }
    }
}

impl fmt::Display for GateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GateKind {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "or" => Ok(GateKind::Or),
            "and" => Ok(GateKind::And),
            _ => Err(GraphError::InvalidType(s.to_string())),
        }
    }
}

/// What happens to nested components when their parent is removed.
/// Bound nodes are always unbound, never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentRemovalPolicy {
    /// Nested components move up to the removed component's parent (or the root).
    #[default]
    Reparent,
    /// Nested components are removed recursively.
    Cascade,
}

impl FromStr for ComponentRemovalPolicy {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reparent" => Ok(ComponentRemovalPolicy::Reparent),
            "cascade" => Ok(ComponentRemovalPolicy::Cascade),
            _ => Err(GraphError::InvalidType(s.to_string())),
        }
    }
}

/// A waypoint on a path.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub node_type: NodeType,

    /// Position in diagram space
    pub position: Point2D<f32>,

    /// name, description, precondition, postcondition, timeout, forkType/joinType
    pub properties: Properties,

    /// Weak back-reference; the component's `child_nodes` holds the other side.
    pub parent_component: Option<ComponentId>,
}

impl Node {
    pub fn name(&self) -> Option<&str> {
        self.properties.get(NAME_KEY).and_then(|value| value.as_str())
    }

    /// Fork kind for forks, join kind for joins, `None` for everything else.
    pub fn gate_kind(&self) -> Option<GateKind> {
        let key = gate_key(self.node_type)?;
        self.properties
            .get(key)
            .and_then(|value| value.as_str())
            .and_then(|raw| raw.parse().ok())
    }
}

/// A directed path segment.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,

    /// Free-text guard expression.
    pub condition: String,

    /// Intermediate bend points; rendering only.
    pub control_points: Vec<Point2D<f32>>,
}

/// A containment box.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub id: ComponentId,
    pub component_type: ComponentType,
    pub bounds: Rect<f32>,
    pub properties: Properties,
    pub child_nodes: BTreeSet<NodeId>,
    pub child_components: BTreeSet<ComponentId>,
    pub parent_component: Option<ComponentId>,
}

impl Component {
    pub fn name(&self) -> Option<&str> {
        self.properties.get(NAME_KEY).and_then(|value| value.as_str())
    }
}

/// Partial node update. `properties` are shallow-merged; a `null` value removes the key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeUpdate {
    pub node_type: Option<NodeType>,
    pub position: Option<Point2D<f32>>,
    pub properties: Properties,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgeUpdate {
    pub condition: Option<String>,
    pub control_points: Option<Vec<Point2D<f32>>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentUpdate {
    pub component_type: Option<ComponentType>,
    pub bounds: Option<Rect<f32>>,
    pub properties: Properties,
}

/// Direct neighbours of a node, one edge away in each direction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectedNodes {
    pub incoming: Vec<NodeId>,
    pub outgoing: Vec<NodeId>,
}

/// Structural rule a mutation would break.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Violation {
    #[error("start node {node} cannot have incoming edges")]
    StartHasIncoming { node: NodeId },
    #[error("end node {node} cannot have outgoing edges")]
    EndHasOutgoing { node: NodeId },
    #[error(
        "deleting {edge} would break path continuity: {source_node} has no other outgoing edge \
         and {target_node} has no other incoming edge"
    )]
    StrandedPath {
        edge: EdgeId,
        source_node: NodeId,
        target_node: NodeId,
    },
    #[error("a {node_type} node cannot be inserted inside a path")]
    TerminalInsidePath { node_type: NodeType },
    #[error("{node} still has incident edges")]
    NodeHasEdges { node: NodeId },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    #[error("{0} not found")]
    NotFound(EntityRef),
    #[error("{0} already exists")]
    AlreadyExists(EntityRef),
    #[error("invalid type: {0}")]
    InvalidType(String),
    #[error("binding {child} under {parent} would create a containment cycle")]
    Cycle {
        child: ComponentId,
        parent: ComponentId,
    },
    #[error(transparent)]
    InvariantViolation(#[from] Violation),
}

/// Change notification broadcast to subscribers after each mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphEvent {
    NodeCreated(Node),
    NodeUpdated(Node),
    NodeRemoved(Node),
    EdgeCreated(Edge),
    EdgeUpdated(Edge),
    EdgeRemoved(Edge),
    ComponentCreated(Component),
    ComponentUpdated(Component),
    ComponentRemoved(Component),
    Cleared,
    Loaded,
}

impl GraphEvent {
    pub fn name(&self) -> &'static str {
        match self {
            GraphEvent::NodeCreated(_) => "node:created",
            GraphEvent::NodeUpdated(_) => "node:updated",
            GraphEvent::NodeRemoved(_) => "node:removed",
            GraphEvent::EdgeCreated(_) => "edge:created",
            GraphEvent::EdgeUpdated(_) => "edge:updated",
            GraphEvent::EdgeRemoved(_) => "edge:removed",
            GraphEvent::ComponentCreated(_) => "component:created",
            GraphEvent::ComponentUpdated(_) => "component:updated",
            GraphEvent::ComponentRemoved(_) => "component:removed",
            GraphEvent::Cleared => "graph:cleared",
            GraphEvent::Loaded => "graph:loaded",
        }
    }
}

/// Journal record of one primitive mutation, carrying full entity state so it
/// can be replayed in either direction.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    NodeAdded(Node),
    NodeRemoved(Node),
    NodeChanged { before: Node, after: Node },
    EdgeAdded(Edge),
    EdgeRemoved(Edge),
    EdgeChanged { before: Edge, after: Edge },
    ComponentAdded(Component),
    ComponentRemoved(Component),
    ComponentChanged { before: Component, after: Component },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayDirection {
    /// Re-apply (redo).
    Forward,
    /// Invert (undo, rollback).
    Backward,
}

impl Mutation {
    pub fn entity(&self) -> EntityRef {
        match self {
            Mutation::NodeAdded(node) | Mutation::NodeRemoved(node) => EntityRef::Node(node.id),
            Mutation::NodeChanged { after, .. } => EntityRef::Node(after.id),
            Mutation::EdgeAdded(edge) | Mutation::EdgeRemoved(edge) => EntityRef::Edge(edge.id),
            Mutation::EdgeChanged { after, .. } => EntityRef::Edge(after.id),
            Mutation::ComponentAdded(component) | Mutation::ComponentRemoved(component) => {
                EntityRef::Component(component.id)
            },
            Mutation::ComponentChanged { after, .. } => EntityRef::Component(after.id),
        }
    }

    /// Notification observed when this mutation is applied in `direction`.
    pub fn event(&self, direction: ReplayDirection) -> GraphEvent {
        use ReplayDirection::{Backward, Forward};
        match (self, direction) {
            (Mutation::NodeAdded(node), Forward) | (Mutation::NodeRemoved(node), Backward) => {
                GraphEvent::NodeCreated(node.clone())
            },
            (Mutation::NodeAdded(node), Backward) | (Mutation::NodeRemoved(node), Forward) => {
                GraphEvent::NodeRemoved(node.clone())
            },
            (Mutation::NodeChanged { after: state, .. }, Forward)
            | (Mutation::NodeChanged { before: state, .. }, Backward) => {
                GraphEvent::NodeUpdated(state.clone())
            },
            (Mutation::EdgeAdded(edge), Forward) | (Mutation::EdgeRemoved(edge), Backward) => {
                GraphEvent::EdgeCreated(edge.clone())
            },
            (Mutation::EdgeAdded(edge), Backward) | (Mutation::EdgeRemoved(edge), Forward) => {
                GraphEvent::EdgeRemoved(edge.clone())
            },
            (Mutation::EdgeChanged { after: state, .. }, Forward)
            | (Mutation::EdgeChanged { before: state, .. }, Backward) => {
                GraphEvent::EdgeUpdated(state.clone())
            },
            (Mutation::ComponentAdded(component), Forward)
            | (Mutation::ComponentRemoved(component), Backward) => {
                GraphEvent::ComponentCreated(component.clone())
            },
            (Mutation::ComponentAdded(component), Backward)
            | (Mutation::ComponentRemoved(component), Forward) => {
                GraphEvent::ComponentRemoved(component.clone())
            },
            (Mutation::ComponentChanged { after: state, .. }, Forward)
            | (Mutation::ComponentChanged { before: state, .. }, Backward) => {
                GraphEvent::ComponentUpdated(state.clone())
            },
        }
    }
}

/// Main graph structure backed by petgraph::StableGraph
#[derive(Clone, Default)]
pub struct Graph {
    /// The underlying petgraph stable graph; owns nodes and edges.
    pub(crate) inner: StableGraph<Node, Edge, Directed>,

    node_keys: HashMap<NodeId, NodeKey>,
    edge_keys: HashMap<EdgeId, EdgeKey>,
    components: BTreeMap<ComponentId, Component>,

    /// Highest id handed out so far; ids are shared across entity kinds.
    last_id: u64,

    journal: Vec<Mutation>,
    /// Set for stores with no undo history; mutations are then only kept
    /// while a `transact` closure runs.
    journal_disabled: bool,
    subscribers: Vec<Sender<GraphEvent>>,
}

impl Graph {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that keeps no mutation journal outside `transact`.
    ///
    /// Suits batch tools and importers. Path sessions, `rollback_to` marks
    /// and `History` all need a journaling store.
    pub fn without_journal() -> Self {
        Self {
            journal_disabled: true,
            ..Self::default()
        }
    }

    /// Turn journaling on or off. Turning it off drops the current journal.
    pub fn set_journaling(&mut self, enabled: bool) {
        self.journal_disabled = !enabled;
        if !enabled {
            self.journal.clear();
        }
    }

    pub fn is_journaling(&self) -> bool {
        !self.journal_disabled
    }

    fn next_raw_id(&mut self) -> u64 {
        self.last_id += 1;
        self.last_id
    }

    /// Receive every change notification emitted after this call.
    ///
    /// Events are queued on the channel while the mutation runs; a listener
    /// only observes them once control has returned to it.
    pub fn subscribe(&mut self) -> Receiver<GraphEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.push(tx);
        rx
    }

    fn emit(&mut self, event: GraphEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn record(&mut self, mutation: Mutation) {
        let event = mutation.event(ReplayDirection::Forward);
        if !self.journal_disabled {
            self.journal.push(mutation);
        }
        self.emit(event);
    }

    pub fn journal_len(&self) -> usize {
        self.journal.len()
    }

    /// Drain journaled mutations (oldest first).
    pub fn take_journal(&mut self) -> Vec<Mutation> {
        std::mem::take(&mut self.journal)
    }

    // --- Lookups ---

    fn node_key(&self, id: NodeId) -> Result<NodeKey, GraphError> {
        self.node_keys
            .get(&id)
            .copied()
            .ok_or(GraphError::NotFound(EntityRef::Node(id)))
    }

    fn edge_key(&self, id: EdgeId) -> Result<EdgeKey, GraphError> {
        self.edge_keys
            .get(&id)
            .copied()
            .ok_or(GraphError::NotFound(EntityRef::Edge(id)))
    }

    pub(crate) fn node(&self, id: NodeId) -> Result<&Node, GraphError> {
        Ok(&self.inner[self.node_key(id)?])
    }

    pub(crate) fn component(&self, id: ComponentId) -> Result<&Component, GraphError> {
        self.components
            .get(&id)
            .ok_or(GraphError::NotFound(EntityRef::Component(id)))
    }

    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        let key = self.node_keys.get(&id)?;
        self.inner.node_weight(*key)
    }

    pub fn get_edge(&self, id: EdgeId) -> Option<&Edge> {
        let key = self.edge_keys.get(&id)?;
        self.inner.edge_weight(*key)
    }

    pub fn get_component(&self, id: ComponentId) -> Option<&Component> {
        self.components.get(&id)
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.node_keys.contains_key(&id)
    }

    /// Iterate over all nodes (storage order)
    pub fn nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.inner.node_indices().map(move |key| &self.inner[key])
    }

    /// Iterate over all edges (storage order)
    pub fn edges(&self) -> impl Iterator<Item = &Edge> + '_ {
        self.inner.edge_indices().map(move |key| &self.inner[key])
    }

    /// Iterate over all components in id order
    pub fn components(&self) -> impl Iterator<Item = &Component> + '_ {
        self.components.values()
    }

    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_count() == 0 && self.components.is_empty()
    }

    fn directed_edges(&self, id: NodeId, direction: Direction) -> Vec<EdgeId> {
        let Some(key) = self.node_keys.get(&id) else {
            return Vec::new();
        };
        let mut ids: Vec<EdgeId> = self
            .inner
            .edges_directed(*key, direction)
            .map(|edge| edge.weight().id)
            .collect();
        ids.sort();
        ids
    }

    /// Outgoing edge ids in creation order; empty for unknown nodes.
    pub fn out_edges(&self, id: NodeId) -> Vec<EdgeId> {
        self.directed_edges(id, Direction::Outgoing)
    }

    /// Incoming edge ids in creation order; empty for unknown nodes.
    pub fn in_edges(&self, id: NodeId) -> Vec<EdgeId> {
        self.directed_edges(id, Direction::Incoming)
    }

    pub fn out_degree(&self, id: NodeId) -> usize {
        self.node_keys.get(&id).map_or(0, |key| {
            self.inner.edges_directed(*key, Direction::Outgoing).count()
        })
    }

    pub fn in_degree(&self, id: NodeId) -> usize {
        self.node_keys.get(&id).map_or(0, |key| {
            self.inner.edges_directed(*key, Direction::Incoming).count()
        })
    }

    fn incident_edges(&self, key: NodeKey) -> BTreeSet<EdgeId> {
        self.inner
            .edges_directed(key, Direction::Outgoing)
            .chain(self.inner.edges_directed(key, Direction::Incoming))
            .map(|edge| edge.weight().id)
            .collect()
    }

    /// Nodes one edge away, for adjacency display (not full reachability).
    pub fn get_connected_nodes(&self, id: NodeId) -> Result<ConnectedNodes, GraphError> {
        let key = self.node_key(id)?;
        let collect = |direction: Direction| -> Vec<NodeId> {
            let ids: BTreeSet<NodeId> = self
                .inner
                .neighbors_directed(key, direction)
                .map(|neighbor| self.inner[neighbor].id)
                .collect();
            ids.into_iter().collect()
        };
        Ok(ConnectedNodes {
            incoming: collect(Direction::Incoming),
            outgoing: collect(Direction::Outgoing),
        })
    }

    /// True when `ancestor` is `component` itself or one of its parents.
    pub fn is_component_ancestor(&self, ancestor: ComponentId, component: ComponentId) -> bool {
        let mut cursor = Some(component);
        // Bounded walk: a corrupt tree must not hang the caller.
        for _ in 0..=self.components.len() {
            match cursor {
                Some(current) if current == ancestor => return true,
                Some(current) => {
                    cursor = self
                        .components
                        .get(&current)
                        .and_then(|c| c.parent_component)
                },
                None => return false,
            }
        }
        false
    }

    // --- Primitive mutations ---

    pub fn add_node(
        &mut self,
        node_type: NodeType,
        position: Point2D<f32>,
        properties: Properties,
    ) -> Result<NodeId, GraphError> {
        let mut node = Node {
            id: NodeId(0),
            node_type,
            position,
            properties,
            parent_component: None,
        };
        normalize_gate_properties(&mut node)?;
        node.id = NodeId(self.next_raw_id());
        let id = node.id;
        self.insert_node_raw(node.clone());
        self.record(Mutation::NodeAdded(node));
        Ok(id)
    }

    fn insert_node_raw(&mut self, node: Node) {
        let id = node.id;
        let key = self.inner.add_node(node);
        self.node_keys.insert(id, key);
    }

    pub fn add_edge(&mut self, source: NodeId, target: NodeId) -> Result<EdgeId, GraphError> {
        self.add_edge_with_condition(source, target, DEFAULT_CONDITION.to_string())
    }

    pub fn add_edge_with_condition(
        &mut self,
        source: NodeId,
        target: NodeId,
        condition: String,
    ) -> Result<EdgeId, GraphError> {
        let source_key = self.node_key(source)?;
        let target_key = self.node_key(target)?;
        if self.inner[target_key].node_type == NodeType::Start {
            return Err(Violation::StartHasIncoming { node: target }.into());
        }
        if self.inner[source_key].node_type == NodeType::End {
            return Err(Violation::EndHasOutgoing { node: source }.into());
        }
        let edge = Edge {
            id: EdgeId(self.next_raw_id()),
            source,
            target,
            condition,
            control_points: Vec::new(),
        };
        let id = edge.id;
        self.insert_edge_raw(edge.clone())?;
        self.record(Mutation::EdgeAdded(edge));
        Ok(id)
    }

    fn insert_edge_raw(&mut self, edge: Edge) -> Result<(), GraphError> {
        if self.edge_keys.contains_key(&edge.id) {
            return Err(GraphError::AlreadyExists(EntityRef::Edge(edge.id)));
        }
        let source_key = self.node_key(edge.source)?;
        let target_key = self.node_key(edge.target)?;
        let id = edge.id;
        let key = self.inner.add_edge(source_key, target_key, edge);
        self.edge_keys.insert(id, key);
        Ok(())
    }

    pub fn add_component(
        &mut self,
        component_type: ComponentType,
        bounds: Rect<f32>,
        properties: Properties,
    ) -> ComponentId {
        let component = Component {
            id: ComponentId(self.next_raw_id()),
            component_type,
            bounds,
            properties,
            child_nodes: BTreeSet::new(),
            child_components: BTreeSet::new(),
            parent_component: None,
        };
        let id = component.id;
        self.components.insert(id, component.clone());
        self.record(Mutation::ComponentAdded(component));
        id
    }

    pub fn update_node(&mut self, id: NodeId, update: NodeUpdate) -> Result<&Node, GraphError> {
        let key = self.node_key(id)?;
        let mut after = self.inner[key].clone();
        if let Some(node_type) = update.node_type {
            after.node_type = node_type;
        }
        if let Some(position) = update.position {
            after.position = position;
        }
        merge_properties(&mut after.properties, update.properties);
        normalize_gate_properties(&mut after)?;
        // Degree rules are checked on retype only; loaded documents may
        // already break them and their nodes must stay editable.
        if after.node_type != self.inner[key].node_type {
            match after.node_type {
                NodeType::Start if self.in_degree(id) > 0 => {
                    return Err(Violation::StartHasIncoming { node: id }.into());
                },
                NodeType::End if self.out_degree(id) > 0 => {
                    return Err(Violation::EndHasOutgoing { node: id }.into());
                },
                _ => {},
            }
        }
        self.commit_node(key, after);
        Ok(&self.inner[key])
    }

    fn commit_node(&mut self, key: NodeKey, after: Node) {
        let before = std::mem::replace(&mut self.inner[key], after.clone());
        if before != after {
            self.record(Mutation::NodeChanged { before, after });
        }
    }

    pub fn update_edge(&mut self, id: EdgeId, update: EdgeUpdate) -> Result<&Edge, GraphError> {
        let key = self.edge_key(id)?;
        let mut after = self.inner[key].clone();
        if let Some(condition) = update.condition {
            after.condition = condition;
        }
        if let Some(control_points) = update.control_points {
            after.control_points = control_points;
        }
        let before = std::mem::replace(&mut self.inner[key], after.clone());
        if before != after {
            self.record(Mutation::EdgeChanged { before, after });
        }
        Ok(&self.inner[key])
    }

    pub fn update_component(
        &mut self,
        id: ComponentId,
        update: ComponentUpdate,
    ) -> Result<&Component, GraphError> {
        let mut after = self.component(id)?.clone();
        if let Some(component_type) = update.component_type {
            after.component_type = component_type;
        }
        if let Some(bounds) = update.bounds {
            after.bounds = bounds;
        }
        merge_properties(&mut after.properties, update.properties);
        self.commit_component(after);
        self.component(id)
    }

    fn commit_component(&mut self, after: Component) {
        let Some(slot) = self.components.get_mut(&after.id) else {
            return;
        };
        let before = std::mem::replace(slot, after.clone());
        if before != after {
            self.record(Mutation::ComponentChanged { before, after });
        }
    }

    /// Remove a node, every edge incident to it, and its component binding.
    pub fn remove_node(&mut self, id: NodeId) -> Result<Node, GraphError> {
        let key = self.node_key(id)?;
        for edge in self.incident_edges(key) {
            self.remove_edge(edge)?;
        }
        self.unbind_node(id)?;
        let node = self
            .inner
            .remove_node(key)
            .ok_or(GraphError::NotFound(EntityRef::Node(id)))?;
        self.node_keys.remove(&id);
        self.record(Mutation::NodeRemoved(node.clone()));
        Ok(node)
    }

    /// Remove an edge; its endpoint nodes stay.
    pub fn remove_edge(&mut self, id: EdgeId) -> Result<Edge, GraphError> {
        let key = self.edge_key(id)?;
        let edge = self
            .inner
            .remove_edge(key)
            .ok_or(GraphError::NotFound(EntityRef::Edge(id)))?;
        self.edge_keys.remove(&id);
        self.record(Mutation::EdgeRemoved(edge.clone()));
        Ok(edge)
    }

    /// Remove a component. Bound nodes are unbound; nested components follow `policy`.
    pub fn remove_component(
        &mut self,
        id: ComponentId,
        policy: ComponentRemovalPolicy,
    ) -> Result<Component, GraphError> {
        let component = self.component(id)?.clone();
        for node in &component.child_nodes {
            self.unbind_node(*node)?;
        }
        for child in &component.child_components {
            match (policy, component.parent_component) {
                (ComponentRemovalPolicy::Cascade, _) => {
                    self.remove_component(*child, policy)?;
                },
                (ComponentRemovalPolicy::Reparent, Some(grandparent)) => {
                    self.bind_component_to_component(*child, grandparent)?;
                },
                (ComponentRemovalPolicy::Reparent, None) => {
                    self.unbind_component(*child)?;
                },
            }
        }
        self.unbind_component(id)?;
        let removed = self
            .components
            .remove(&id)
            .ok_or(GraphError::NotFound(EntityRef::Component(id)))?;
        self.record(Mutation::ComponentRemoved(removed.clone()));
        Ok(removed)
    }

    /// Bind a node to a component, moving it out of any previous component. Idempotent.
    pub fn bind_node_to_component(
        &mut self,
        node: NodeId,
        component: ComponentId,
    ) -> Result<(), GraphError> {
        let key = self.node_key(node)?;
        self.component(component)?;
        let previous = self.inner[key].parent_component;
        if previous == Some(component) {
            return Ok(());
        }
        if let Some(previous) = previous {
            self.detach_child_node(previous, node);
        }
        let mut bound = self.inner[key].clone();
        bound.parent_component = Some(component);
        self.commit_node(key, bound);
        let mut parent = self.component(component)?.clone();
        parent.child_nodes.insert(node);
        self.commit_component(parent);
        Ok(())
    }

    /// Clear a node's component binding. No-op when unbound.
    pub fn unbind_node(&mut self, node: NodeId) -> Result<(), GraphError> {
        let key = self.node_key(node)?;
        let Some(previous) = self.inner[key].parent_component else {
            return Ok(());
        };
        self.detach_child_node(previous, node);
        let mut unbound = self.inner[key].clone();
        unbound.parent_component = None;
        self.commit_node(key, unbound);
        Ok(())
    }

    fn detach_child_node(&mut self, component: ComponentId, node: NodeId) {
        if let Some(existing) = self.components.get(&component) {
            let mut after = existing.clone();
            after.child_nodes.remove(&node);
            self.commit_component(after);
        }
    }

    /// Nest `child` inside `parent`, moving it out of any previous parent. Idempotent.
    pub fn bind_component_to_component(
        &mut self,
        child: ComponentId,
        parent: ComponentId,
    ) -> Result<(), GraphError> {
        let previous = self.component(child)?.parent_component;
        self.component(parent)?;
        if self.is_component_ancestor(child, parent) {
            return Err(GraphError::Cycle { child, parent });
        }
        if previous == Some(parent) {
            return Ok(());
        }
        if let Some(previous) = previous {
            self.detach_child_component(previous, child);
        }
        let mut nested = self.component(child)?.clone();
        nested.parent_component = Some(parent);
        self.commit_component(nested);
        let mut container = self.component(parent)?.clone();
        container.child_components.insert(child);
        self.commit_component(container);
        Ok(())
    }

    /// Detach a component to the root of the component tree. No-op when already a root.
    pub fn unbind_component(&mut self, child: ComponentId) -> Result<(), GraphError> {
        let Some(previous) = self.component(child)?.parent_component else {
            return Ok(());
        };
        self.detach_child_component(previous, child);
        let mut detached = self.component(child)?.clone();
        detached.parent_component = None;
        self.commit_component(detached);
        Ok(())
    }

    fn detach_child_component(&mut self, parent: ComponentId, child: ComponentId) {
        if let Some(existing) = self.components.get(&parent) {
            let mut after = existing.clone();
            after.child_components.remove(&child);
            self.commit_component(after);
        }
    }

    /// Absolute reposition of a single node.
    pub fn move_node(&mut self, id: NodeId, x: f32, y: f32) -> Result<&Node, GraphError> {
        self.update_node(
            id,
            NodeUpdate {
                position: Some(Point2D::new(x, y)),
                ..Default::default()
            },
        )
    }

    /// Absolute reposition of a component; bound nodes and nested components
    /// move by the same delta.
    pub fn move_component(
        &mut self,
        id: ComponentId,
        x: f32,
        y: f32,
    ) -> Result<&Component, GraphError> {
        let origin = self.component(id)?.bounds.origin;
        let delta = Point2D::new(x, y) - origin;
        self.translate_component(id, delta);
        self.component(id)
    }

    fn translate_component(&mut self, id: ComponentId, delta: Vector2D<f32>) {
        let Some(component) = self.components.get(&id).cloned() else {
            return;
        };
        let mut moved = component.clone();
        moved.bounds = moved.bounds.translate(delta);
        self.commit_component(moved);
        for node in &component.child_nodes {
            let Some(&key) = self.node_keys.get(node) else {
                continue;
            };
            let mut shifted = self.inner[key].clone();
            shifted.position += delta;
            self.commit_node(key, shifted);
        }
        for child in &component.child_components {
            self.translate_component(*child, delta);
        }
    }

    /// Reset to the empty graph. Not journaled: dependents reset instead of replaying.
    pub fn clear(&mut self) {
        self.inner.clear();
        self.node_keys.clear();
        self.edge_keys.clear();
        self.components.clear();
        self.journal.clear();
        self.emit(GraphEvent::Cleared);
    }

    // --- Composite support ---

    /// Run `f` as one all-or-nothing step: when it fails, every mutation it
    /// journaled is reverted before the error is returned.
    ///
    /// Journaling is on for the duration of `f` even on a store built with
    /// `without_journal`; such a store forgets the entries afterwards.
    pub fn transact<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, GraphError>,
    ) -> Result<T, GraphError> {
        let mark = self.journal.len();
        let disabled = std::mem::replace(&mut self.journal_disabled, false);
        let result = f(self);
        if result.is_err() {
            self.rollback_to(mark);
        }
        self.journal_disabled = disabled;
        if disabled {
            self.journal.truncate(mark);
        }
        result
    }

    /// Revert and forget every mutation journaled after `mark`.
    pub fn rollback_to(&mut self, mark: usize) {
        if mark >= self.journal.len() {
            return;
        }
        let tail = self.journal.split_off(mark);
        if let Err(e) = self.replay_all(&tail, ReplayDirection::Backward) {
            error!("rollback of {} journaled mutations failed: {e}", tail.len());
        }
    }

    /// Apply `mutations` (reversed when `Backward`) without journaling.
    ///
    /// Work happens on a detached copy that replaces the live state only once
    /// every step succeeded, so a failed replay leaves the graph untouched.
    pub fn replay_all(
        &mut self,
        mutations: &[Mutation],
        direction: ReplayDirection,
    ) -> Result<(), GraphError> {
        let ordered: Vec<&Mutation> = match direction {
            ReplayDirection::Forward => mutations.iter().collect(),
            ReplayDirection::Backward => mutations.iter().rev().collect(),
        };
        let mut scratch = self.detached();
        let mut events = Vec::with_capacity(ordered.len());
        for mutation in ordered {
            scratch.replay(mutation, direction)?;
            events.push(mutation.event(direction));
        }
        self.adopt(scratch);
        for event in events {
            self.emit(event);
        }
        Ok(())
    }

    fn replay(&mut self, mutation: &Mutation, direction: ReplayDirection) -> Result<(), GraphError> {
        use ReplayDirection::{Backward, Forward};
        match (mutation, direction) {
            (Mutation::NodeAdded(node), Forward) | (Mutation::NodeRemoved(node), Backward) => {
                if self.node_keys.contains_key(&node.id) {
                    return Err(GraphError::AlreadyExists(EntityRef::Node(node.id)));
                }
                self.insert_node_raw(node.clone());
            },
            (Mutation::NodeAdded(node), Backward) | (Mutation::NodeRemoved(node), Forward) => {
                let key = self.node_key(node.id)?;
                if !self.incident_edges(key).is_empty() {
                    return Err(Violation::NodeHasEdges { node: node.id }.into());
                }
                self.inner.remove_node(key);
                self.node_keys.remove(&node.id);
            },
            (Mutation::NodeChanged { after: state, .. }, Forward)
            | (Mutation::NodeChanged { before: state, .. }, Backward) => {
                let key = self.node_key(state.id)?;
                self.inner[key] = state.clone();
            },
            (Mutation::EdgeAdded(edge), Forward) | (Mutation::EdgeRemoved(edge), Backward) => {
                self.insert_edge_raw(edge.clone())?;
            },
            (Mutation::EdgeAdded(edge), Backward) | (Mutation::EdgeRemoved(edge), Forward) => {
                let key = self.edge_key(edge.id)?;
                self.inner.remove_edge(key);
                self.edge_keys.remove(&edge.id);
            },
            (Mutation::EdgeChanged { after: state, .. }, Forward)
            | (Mutation::EdgeChanged { before: state, .. }, Backward) => {
                let key = self.edge_key(state.id)?;
                self.inner[key] = state.clone();
            },
            (Mutation::ComponentAdded(component), Forward)
            | (Mutation::ComponentRemoved(component), Backward) => {
                if self.components.contains_key(&component.id) {
                    return Err(GraphError::AlreadyExists(EntityRef::Component(component.id)));
                }
                self.components.insert(component.id, component.clone());
            },
            (Mutation::ComponentAdded(component), Backward)
            | (Mutation::ComponentRemoved(component), Forward) => {
                self.components
                    .remove(&component.id)
                    .ok_or(GraphError::NotFound(EntityRef::Component(component.id)))?;
            },
            (Mutation::ComponentChanged { after: state, .. }, Forward)
            | (Mutation::ComponentChanged { before: state, .. }, Backward) => {
                let slot = self
                    .components
                    .get_mut(&state.id)
                    .ok_or(GraphError::NotFound(EntityRef::Component(state.id)))?;
                *slot = state.clone();
            },
        }
        Ok(())
    }

    /// Copy of the entity state without journal or subscribers.
    fn detached(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            node_keys: self.node_keys.clone(),
            edge_keys: self.edge_keys.clone(),
            components: self.components.clone(),
            last_id: self.last_id,
            journal: Vec::new(),
            journal_disabled: true,
            subscribers: Vec::new(),
        }
    }

    /// Take over `other`'s entity state, keeping our journal and subscribers.
    fn adopt(&mut self, other: Graph) {
        self.inner = other.inner;
        self.node_keys = other.node_keys;
        self.edge_keys = other.edge_keys;
        self.components = other.components;
        self.last_id = self.last_id.max(other.last_id);
    }

    /// Cross-check the id indexes, edge endpoints and containment back-references.
    /// Returns one message per inconsistency; empty when the store is sound.
    pub fn collect_index_violations(&self) -> Vec<String> {
        let mut violations = Vec::new();
        if self.node_keys.len() != self.inner.node_count() {
            violations.push(format!(
                "node index desync: {} ids for {} nodes",
                self.node_keys.len(),
                self.inner.node_count()
            ));
        }
        if self.edge_keys.len() != self.inner.edge_count() {
            violations.push(format!(
                "edge index desync: {} ids for {} edges",
                self.edge_keys.len(),
                self.inner.edge_count()
            ));
        }
        for key in self.inner.node_indices() {
            let node = &self.inner[key];
            if self.node_keys.get(&node.id) != Some(&key) {
                violations.push(format!("node index desync: {} is not indexed", node.id));
            }
            if let Some(parent) = node.parent_component {
                let listed = self
                    .components
                    .get(&parent)
                    .is_some_and(|component| component.child_nodes.contains(&node.id));
                if !listed {
                    violations.push(format!(
                        "containment desync: {} claims {parent} which does not list it",
                        node.id
                    ));
                }
            }
        }
        for key in self.inner.edge_indices() {
            let edge = &self.inner[key];
            if self.edge_keys.get(&edge.id) != Some(&key) {
                violations.push(format!("edge index desync: {} is not indexed", edge.id));
            }
            let Some((source, target)) = self.inner.edge_endpoints(key) else {
                violations.push(format!("edge {} has no endpoints", edge.id));
                continue;
            };
            if self.inner[source].id != edge.source || self.inner[target].id != edge.target {
                violations.push(format!(
                    "edge {} endpoints disagree with its recorded source/target",
                    edge.id
                ));
            }
        }
        for component in self.components.values() {
            for node in &component.child_nodes {
                if self.get_node(*node).and_then(|n| n.parent_component) != Some(component.id) {
                    violations.push(format!(
                        "containment desync: {} lists {node} which is not bound to it",
                        component.id
                    ));
                }
            }
            for child in &component.child_components {
                if self.components.get(child).and_then(|c| c.parent_component)
                    != Some(component.id)
                {
                    violations.push(format!(
                        "containment desync: {} lists {child} which is not nested in it",
                        component.id
                    ));
                }
            }
            if let Some(parent) = component.parent_component {
                if !self
                    .components
                    .get(&parent)
                    .is_some_and(|p| p.child_components.contains(&component.id))
                {
                    violations.push(format!(
                        "containment desync: {} claims parent {parent} which does not list it",
                        component.id
                    ));
                }
                if self.is_component_ancestor(component.id, parent) {
                    violations.push(format!("containment cycle through {}", component.id));
                }
            }
        }
        violations
    }

    // --- Snapshots ---

    /// Serialize the graph to a persistable snapshot (entities in id order).
    pub fn to_snapshot(&self) -> GraphSnapshot {
        let mut nodes: Vec<&Node> = self.nodes().collect();
        nodes.sort_by_key(|node| node.id);
        let mut edges: Vec<&Edge> = self.edges().collect();
        edges.sort_by_key(|edge| edge.id);

        GraphSnapshot {
            nodes: nodes
                .into_iter()
                .map(|node| PersistedNode {
                    id: node.id.to_string(),
                    node_type: node.node_type,
                    position: PersistedPoint::from(node.position),
                    properties: node.properties.clone(),
                    parent_component: node.parent_component.map(|c| c.to_string()),
                })
                .collect(),
            edges: edges
                .into_iter()
                .map(|edge| PersistedEdge {
                    id: edge.id.to_string(),
                    source_node_id: edge.source.to_string(),
                    target_node_id: edge.target.to_string(),
                    condition: edge.condition.clone(),
                    control_points: edge
                        .control_points
                        .iter()
                        .copied()
                        .map(PersistedPoint::from)
                        .collect(),
                })
                .collect(),
            components: self
                .components
                .values()
                .map(|component| PersistedComponent {
                    id: component.id.to_string(),
                    component_type: component.component_type,
                    bounds: PersistedBounds::from(component.bounds),
                    properties: component.properties.clone(),
                    child_nodes: component.child_nodes.iter().map(|n| n.to_string()).collect(),
                    child_components: component
                        .child_components
                        .iter()
                        .map(|c| c.to_string())
                        .collect(),
                    parent_component: component.parent_component.map(|c| c.to_string()),
                })
                .collect(),
        }
    }

    /// Rebuild a graph from a snapshot.
    ///
    /// Containment comes from the components' child lists and edge adjacency
    /// from the edge records; redundant copies (node `parentComponent`) are
    /// not trusted. Edges with missing endpoints, duplicate ids and bindings
    /// that would nest a component inside itself are dropped with a warning.
    pub fn from_snapshot(snapshot: &GraphSnapshot) -> Result<Self, PersistenceError> {
        let mut graph = Graph::new();
        let mut max_raw = 0u64;

        for persisted in &snapshot.nodes {
            let id: NodeId = persisted.id.parse()?;
            if graph.node_keys.contains_key(&id) {
                warn!("Dropping duplicate node id {id} from snapshot");
                continue;
            }
            let mut node = Node {
                id,
                node_type: persisted.node_type,
                position: persisted.position.into(),
                properties: persisted.properties.clone(),
                parent_component: None,
            };
            normalize_gate_properties(&mut node)?;
            max_raw = max_raw.max(id.raw());
            graph.insert_node_raw(node);
        }

        for persisted in &snapshot.components {
            let id: ComponentId = persisted.id.parse()?;
            if graph.components.contains_key(&id) {
                warn!("Dropping duplicate component id {id} from snapshot");
                continue;
            }
            max_raw = max_raw.max(id.raw());
            graph.components.insert(
                id,
                Component {
                    id,
                    component_type: persisted.component_type,
                    bounds: persisted.bounds.into(),
                    properties: persisted.properties.clone(),
                    child_nodes: BTreeSet::new(),
                    child_components: BTreeSet::new(),
                    parent_component: None,
                },
            );
        }

        for persisted in &snapshot.components {
            let parent: ComponentId = persisted.id.parse()?;
            for raw in &persisted.child_nodes {
                let child: NodeId = raw.parse()?;
                let Some(&key) = graph.node_keys.get(&child) else {
                    warn!("Component {parent} lists missing node {child}; binding dropped");
                    continue;
                };
                if let Some(existing) = graph.inner[key].parent_component {
                    warn!("Node {child} listed by {existing} and {parent}; keeping {existing}");
                    continue;
                }
                graph.inner[key].parent_component = Some(parent);
                if let Some(component) = graph.components.get_mut(&parent) {
                    component.child_nodes.insert(child);
                }
            }
            for raw in &persisted.child_components {
                let child: ComponentId = raw.parse()?;
                let Some(existing) = graph.components.get(&child).map(|c| c.parent_component)
                else {
                    warn!("Component {parent} lists missing component {child}; binding dropped");
                    continue;
                };
                if let Some(existing) = existing {
                    warn!("Component {child} nested in {existing} and {parent}; keeping {existing}");
                    continue;
                }
                if graph.is_component_ancestor(child, parent) {
                    warn!("Nesting {child} under {parent} would form a cycle; binding dropped");
                    continue;
                }
                if let Some(component) = graph.components.get_mut(&child) {
                    component.parent_component = Some(parent);
                }
                if let Some(component) = graph.components.get_mut(&parent) {
                    component.child_components.insert(child);
                }
            }
        }

        for persisted in &snapshot.edges {
            let id: EdgeId = persisted.id.parse()?;
            let source: NodeId = persisted.source_node_id.parse()?;
            let target: NodeId = persisted.target_node_id.parse()?;
            if !graph.contains_node(source) || !graph.contains_node(target) {
                warn!("Dropping edge {id}: endpoint {source} or {target} is missing");
                continue;
            }
            if graph.edge_keys.contains_key(&id) {
                warn!("Dropping duplicate edge id {id} from snapshot");
                continue;
            }
            max_raw = max_raw.max(id.raw());
            graph.insert_edge_raw(Edge {
                id,
                source,
                target,
                condition: persisted.condition.clone(),
                control_points: persisted
                    .control_points
                    .iter()
                    .copied()
                    .map(Point2D::from)
                    .collect(),
            })?;
        }

        graph.last_id = max_raw;
        Ok(graph)
    }

    /// Replace the whole state with `snapshot` and emit `graph:loaded`.
    pub fn load_snapshot(&mut self, snapshot: &GraphSnapshot) -> Result<(), PersistenceError> {
        let loaded = Graph::from_snapshot(snapshot)?;
        self.inner = loaded.inner;
        self.node_keys = loaded.node_keys;
        self.edge_keys = loaded.edge_keys;
        self.components = loaded.components;
        self.last_id = loaded.last_id;
        self.journal.clear();
        self.emit(GraphEvent::Loaded);
        Ok(())
    }
}

fn gate_key(node_type: NodeType) -> Option<&'static str> {
    match node_type {
        NodeType::Fork => Some(FORK_TYPE_KEY),
        NodeType::Join => Some(JOIN_TYPE_KEY),
        _ => None,
    }
}

/// Property patch setting a gate kind under `key`.
pub(crate) fn gate_property(key: &str, kind: GateKind) -> Properties {
    Properties::from([(key.to_string(), serde_json::Value::from(kind.as_str()))])
}

fn merge_properties(target: &mut Properties, patch: Properties) {
    for (key, value) in patch {
        if value.is_null() {
            target.remove(&key);
        } else {
            target.insert(key, value);
        }
    }
}

/// Forks carry `forkType`, joins carry `joinType`, nothing else carries either.
fn normalize_gate_properties(node: &mut Node) -> Result<(), GraphError> {
    let keep = gate_key(node.node_type);
    for key in [FORK_TYPE_KEY, JOIN_TYPE_KEY] {
        if Some(key) != keep {
            node.properties.remove(key);
        }
    }
    let Some(key) = keep else {
        return Ok(());
    };
    let kind = match node.properties.get(key) {
        None => GateKind::default(),
        Some(serde_json::Value::String(raw)) => raw.parse()?,
        Some(other) => return Err(GraphError::InvalidType(other.to_string())),
    };
    node.properties
        .insert(key.to_string(), serde_json::Value::from(kind.as_str()));
    Ok(())
}
