/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Editor session state: the graph store, its undo history, the path tool and
//! open transactions.
//!
//! Every mutating entry point runs one store operation and drains the graph's
//! journal into a single history command. While a path session or explicit
//! transaction is open the journal keeps accumulating and becomes one command
//! when the session closes.

use crossbeam_channel::Receiver;
use euclid::default::{Point2D, Rect};
use log::{debug, info, warn};
use thiserror::Error;

use crate::model::graph::path_builder::{FinishedPath, PathBuilder};
use crate::model::graph::topology::{Branch, DeletionSummary, Selection};
use crate::model::graph::{
    ComponentId, ComponentType, ComponentUpdate, EdgeId, EdgeUpdate, EntityRef, GateKind, Graph,
    GraphError, GraphEvent, NodeId, NodeType, NodeUpdate, Properties,
};
use crate::prefs::EditorConfig;
use crate::services::history::{CoalesceKey, History, HistoryError};
use crate::services::persistence::types::GraphSnapshot;
use crate::services::persistence::{self, PersistenceError};
use crate::services::validation::{self, ValidationReport};

#[derive(Debug, Error)]
pub enum EditorError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("a path is already being drawn")]
    PathInProgress,
    #[error("no path is being drawn")]
    NoActivePath,
    #[error("a path session or transaction is still open")]
    TransactionInProgress,
    #[error("no transaction is open")]
    NoOpenTransaction,
}

fn rejected(operation: &str, error: impl Into<EditorError>) -> EditorError {
    let error = error.into();
    warn!("{operation} rejected: {error}");
    error
}

/// User-level editing requests.
#[derive(Debug, Clone, PartialEq)]
pub enum EditorIntent {
    AddNode {
        node_type: NodeType,
        position: Point2D<f32>,
        properties: Properties,
    },
    AddEdge {
        source: NodeId,
        target: NodeId,
    },
    AddComponent {
        component_type: ComponentType,
        bounds: Rect<f32>,
        properties: Properties,
    },
    UpdateNode {
        id: NodeId,
        update: NodeUpdate,
    },
    UpdateEdge {
        id: EdgeId,
        update: EdgeUpdate,
    },
    UpdateComponent {
        id: ComponentId,
        update: ComponentUpdate,
    },
    RemoveNode {
        id: NodeId,
    },
    RemoveEdge {
        id: EdgeId,
    },
    RemoveComponent {
        id: ComponentId,
    },
    /// Continuity-checked edge removal.
    DeleteEdge {
        id: EdgeId,
    },
    DeleteSelection {
        selection: Selection,
    },
    BindNode {
        node: NodeId,
        component: ComponentId,
    },
    UnbindNode {
        node: NodeId,
    },
    BindComponent {
        child: ComponentId,
        parent: ComponentId,
    },
    UnbindComponent {
        child: ComponentId,
    },
    MoveNode {
        id: NodeId,
        position: Point2D<f32>,
    },
    MoveComponent {
        id: ComponentId,
        position: Point2D<f32>,
    },
    InsertNodeAfter {
        node: NodeId,
        node_type: NodeType,
    },
    InsertNodeBefore {
        node: NodeId,
        node_type: NodeType,
    },
    InsertNodeOnEdge {
        edge: EdgeId,
        node_type: NodeType,
    },
    ConvertToFork {
        node: NodeId,
        kind: GateKind,
    },
    ConvertToJoin {
        node: NodeId,
        kind: GateKind,
    },
    AddBranch {
        node: NodeId,
        position: Point2D<f32>,
    },
    ToggleGateKind {
        node: NodeId,
    },
    InsertForkOnPath {
        edge: EdgeId,
        kind: GateKind,
    },
    InsertJoinOnPath {
        edge: EdgeId,
        kind: GateKind,
    },
    BeginPath {
        position: Point2D<f32>,
    },
    ExtendPath {
        node_type: NodeType,
        position: Point2D<f32>,
    },
    ConnectPathTo {
        node: NodeId,
    },
    FinishPath,
    CancelPath,
    BeginTransaction {
        label: String,
    },
    CommitTransaction,
    CancelTransaction,
    Undo,
    Redo,
    Clear,
}

/// What an applied intent produced.
#[derive(Debug, Clone, PartialEq)]
pub enum IntentOutcome {
    Done,
    /// The operation was valid but had nothing to act on.
    Skipped,
    Node(NodeId),
    Edge(EdgeId),
    Component(ComponentId),
    Branch(Branch),
    Gate { node: NodeId, branch: Branch },
    GateKind(GateKind),
    Path(FinishedPath),
    Deleted(DeletionSummary),
    /// Label of the command undone or redone.
    History(String),
}

#[derive(Debug, Clone)]
struct OpenTransaction {
    label: String,
    mark: usize,
}

pub struct EditorApp {
    graph: Graph,
    history: History,
    config: EditorConfig,
    path: Option<PathBuilder>,
    transaction: Option<OpenTransaction>,
}

impl Default for EditorApp {
    fn default() -> Self {
        Self::new(EditorConfig::default())
    }
}

impl EditorApp {
    pub fn new(config: EditorConfig) -> Self {
        Self {
            graph: Graph::new(),
            history: History::new(config.max_undo_steps, config.coalesce_window()),
            config,
            path: None,
            transaction: None,
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn subscribe(&mut self) -> Receiver<GraphEvent> {
        self.graph.subscribe()
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn is_drawing_path(&self) -> bool {
        self.path.is_some()
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    fn session_open(&self) -> bool {
        self.path.is_some() || self.transaction.is_some()
    }

    /// Drain the journal into one history command unless a session is collecting it.
    fn commit(&mut self, label: &str, coalesce: Option<EntityRef>) {
        if self.session_open() {
            return;
        }
        let mutations = self.graph.take_journal();
        let key = coalesce.map(|entity| CoalesceKey {
            label: label.to_string(),
            entity,
        });
        if self.history.record(label, mutations, key) {
            debug!("recorded '{label}'");
        }
    }

    fn run<T>(
        &mut self,
        label: &str,
        coalesce: Option<EntityRef>,
        operation: impl FnOnce(&mut Graph) -> Result<T, GraphError>,
    ) -> Result<T, EditorError> {
        // Cancelling a path rolls back its journal tail, which must hold only path edits.
        if self.path.is_some() {
            return Err(rejected(label, EditorError::PathInProgress));
        }
        let value = self
            .graph
            .transact(operation)
            .map_err(|e| rejected(label, e))?;
        self.commit(label, coalesce);
        Ok(value)
    }

    // --- Store operations ---

    pub fn add_node(
        &mut self,
        node_type: NodeType,
        position: Point2D<f32>,
        properties: Properties,
    ) -> Result<NodeId, EditorError> {
        self.run("add node", None, |g| {
            g.add_node(node_type, position, properties)
        })
    }

    pub fn add_edge(&mut self, source: NodeId, target: NodeId) -> Result<EdgeId, EditorError> {
        self.run("add edge", None, |g| g.add_edge(source, target))
    }

    pub fn add_component(
        &mut self,
        component_type: ComponentType,
        bounds: Rect<f32>,
        properties: Properties,
    ) -> Result<ComponentId, EditorError> {
        self.run("add component", None, |g| {
            Ok(g.add_component(component_type, bounds, properties))
        })
    }

    pub fn update_node(&mut self, id: NodeId, update: NodeUpdate) -> Result<(), EditorError> {
        self.run("update node", Some(EntityRef::Node(id)), |g| {
            g.update_node(id, update).map(|_| ())
        })
    }

    pub fn update_edge(&mut self, id: EdgeId, update: EdgeUpdate) -> Result<(), EditorError> {
        self.run("update edge", Some(EntityRef::Edge(id)), |g| {
            g.update_edge(id, update).map(|_| ())
        })
    }

    pub fn update_component(
        &mut self,
        id: ComponentId,
        update: ComponentUpdate,
    ) -> Result<(), EditorError> {
        self.run("update component", Some(EntityRef::Component(id)), |g| {
            g.update_component(id, update).map(|_| ())
        })
    }

    pub fn remove_node(&mut self, id: NodeId) -> Result<(), EditorError> {
        self.run("remove node", None, |g| g.remove_node(id).map(|_| ()))
    }

    pub fn remove_edge(&mut self, id: EdgeId) -> Result<(), EditorError> {
        self.run("remove edge", None, |g| g.remove_edge(id).map(|_| ()))
    }

    pub fn remove_component(&mut self, id: ComponentId) -> Result<(), EditorError> {
        let policy = self.config.component_removal;
        self.run("remove component", None, |g| {
            g.remove_component(id, policy).map(|_| ())
        })
    }

    pub fn delete_edge(&mut self, id: EdgeId) -> Result<(), EditorError> {
        self.run("delete edge", None, |g| g.delete_edge(id))
    }

    pub fn delete_selection(&mut self, selection: &Selection) -> Result<DeletionSummary, EditorError> {
        let policy = self.config.component_removal;
        self.run("delete selection", None, |g| {
            g.delete_selection(selection, policy)
        })
    }

    pub fn bind_node_to_component(
        &mut self,
        node: NodeId,
        component: ComponentId,
    ) -> Result<(), EditorError> {
        self.run("bind node", None, |g| {
            g.bind_node_to_component(node, component)
        })
    }

    pub fn unbind_node(&mut self, node: NodeId) -> Result<(), EditorError> {
        self.run("unbind node", None, |g| g.unbind_node(node))
    }

    pub fn bind_component_to_component(
        &mut self,
        child: ComponentId,
        parent: ComponentId,
    ) -> Result<(), EditorError> {
        self.run("nest component", None, |g| {
            g.bind_component_to_component(child, parent)
        })
    }

    pub fn unbind_component(&mut self, child: ComponentId) -> Result<(), EditorError> {
        self.run("unnest component", None, |g| g.unbind_component(child))
    }

    pub fn move_node(&mut self, id: NodeId, position: Point2D<f32>) -> Result<(), EditorError> {
        self.run("move node", Some(EntityRef::Node(id)), |g| {
            g.move_node(id, position.x, position.y).map(|_| ())
        })
    }

    pub fn move_component(
        &mut self,
        id: ComponentId,
        position: Point2D<f32>,
    ) -> Result<(), EditorError> {
        self.run("move component", Some(EntityRef::Component(id)), |g| {
            g.move_component(id, position.x, position.y).map(|_| ())
        })
    }

    /// End the current drag or typing burst so the next edit starts a new command.
    pub fn seal_history(&mut self) {
        self.history.seal();
    }

    // --- Topology operations ---

    pub fn insert_node_after(
        &mut self,
        node: NodeId,
        node_type: NodeType,
    ) -> Result<Option<NodeId>, EditorError> {
        self.run("insert node", None, |g| g.insert_node_after(node, node_type))
    }

    pub fn insert_node_before(
        &mut self,
        node: NodeId,
        node_type: NodeType,
    ) -> Result<Option<NodeId>, EditorError> {
        self.run("insert node", None, |g| g.insert_node_before(node, node_type))
    }

    pub fn insert_node_on_edge(
        &mut self,
        edge: EdgeId,
        node_type: NodeType,
    ) -> Result<NodeId, EditorError> {
        self.run("insert node", None, |g| g.insert_node_on_edge(edge, node_type))
    }

    pub fn convert_to_fork(
        &mut self,
        node: NodeId,
        kind: GateKind,
    ) -> Result<Option<Branch>, EditorError> {
        let offset = self.config.branch_offset();
        self.run("convert to fork", None, |g| {
            g.convert_to_fork(node, kind, offset)
        })
    }

    pub fn convert_to_join(&mut self, node: NodeId, kind: GateKind) -> Result<(), EditorError> {
        self.run("convert to join", None, |g| g.convert_to_join(node, kind))
    }

    pub fn add_branch(
        &mut self,
        node: NodeId,
        position: Point2D<f32>,
    ) -> Result<Branch, EditorError> {
        self.run("add branch", None, |g| g.add_branch(node, position))
    }

    pub fn toggle_gate_kind(&mut self, node: NodeId) -> Result<GateKind, EditorError> {
        self.run("toggle gate", None, |g| g.toggle_gate_kind(node))
    }

    pub fn insert_fork_on_path(
        &mut self,
        edge: EdgeId,
        kind: GateKind,
    ) -> Result<(NodeId, Branch), EditorError> {
        let offset = self.config.branch_offset();
        self.run("insert fork", None, |g| {
            g.insert_fork_on_path(edge, kind, offset)
        })
    }

    pub fn insert_join_on_path(
        &mut self,
        edge: EdgeId,
        kind: GateKind,
    ) -> Result<(NodeId, Branch), EditorError> {
        let offset = self.config.branch_offset();
        self.run("insert join", None, |g| {
            g.insert_join_on_path(edge, kind, offset)
        })
    }

    // --- Path tool ---

    pub fn begin_path(&mut self, position: Point2D<f32>) -> Result<NodeId, EditorError> {
        if self.path.is_some() {
            return Err(EditorError::PathInProgress);
        }
        if self.transaction.is_some() {
            return Err(EditorError::TransactionInProgress);
        }
        let builder =
            PathBuilder::begin(&mut self.graph, position).map_err(|e| rejected("begin path", e))?;
        let start = builder.start_node();
        self.path = Some(builder);
        Ok(start)
    }

    pub fn extend_path(
        &mut self,
        node_type: NodeType,
        position: Point2D<f32>,
    ) -> Result<NodeId, EditorError> {
        let builder = self.path.as_mut().ok_or(EditorError::NoActivePath)?;
        builder
            .append(&mut self.graph, node_type, position)
            .map_err(|e| rejected("extend path", e))
    }

    pub fn connect_path_to(&mut self, node: NodeId) -> Result<EdgeId, EditorError> {
        let builder = self.path.as_mut().ok_or(EditorError::NoActivePath)?;
        builder
            .connect_to(&mut self.graph, node)
            .map_err(|e| rejected("connect path", e))
    }

    /// Close the path session; everything it created becomes one undo step.
    pub fn finish_path(&mut self) -> Result<FinishedPath, EditorError> {
        let builder = self.path.take().ok_or(EditorError::NoActivePath)?;
        match builder.finish(&mut self.graph, self.config.auto_end_offset()) {
            Ok(finished) => {
                self.commit("create path", None);
                Ok(finished)
            },
            Err(e) => {
                self.path = Some(builder);
                Err(rejected("finish path", e))
            },
        }
    }

    pub fn cancel_path(&mut self) -> Result<(), EditorError> {
        let builder = self.path.take().ok_or(EditorError::NoActivePath)?;
        builder.cancel(&mut self.graph);
        Ok(())
    }

    // --- Transactions ---

    /// Group the following operations into one undo step.
    pub fn begin_transaction(&mut self, label: impl Into<String>) -> Result<(), EditorError> {
        if self.session_open() {
            return Err(EditorError::TransactionInProgress);
        }
        self.transaction = Some(OpenTransaction {
            label: label.into(),
            mark: self.graph.journal_len(),
        });
        Ok(())
    }

    /// Record the grouped operations. Returns false when the group changed nothing.
    pub fn commit_transaction(&mut self) -> Result<bool, EditorError> {
        let transaction = self
            .transaction
            .take()
            .ok_or(EditorError::NoOpenTransaction)?;
        let mutations = self.graph.take_journal();
        Ok(self.history.record(transaction.label, mutations, None))
    }

    /// Revert every operation since `begin_transaction`.
    pub fn cancel_transaction(&mut self) -> Result<(), EditorError> {
        let transaction = self
            .transaction
            .take()
            .ok_or(EditorError::NoOpenTransaction)?;
        self.graph.rollback_to(transaction.mark);
        debug!("transaction '{}' cancelled", transaction.label);
        Ok(())
    }

    // --- History ---

    pub fn undo(&mut self) -> Result<String, EditorError> {
        if self.session_open() {
            return Err(EditorError::TransactionInProgress);
        }
        Ok(self.history.undo(&mut self.graph)?)
    }

    pub fn redo(&mut self) -> Result<String, EditorError> {
        if self.session_open() {
            return Err(EditorError::TransactionInProgress);
        }
        Ok(self.history.redo(&mut self.graph)?)
    }

    /// Empty the graph and forget history. Not undoable.
    pub fn clear(&mut self) -> Result<(), EditorError> {
        if self.session_open() {
            return Err(EditorError::TransactionInProgress);
        }
        self.graph.clear();
        self.history.reset();
        Ok(())
    }

    // --- Documents ---

    pub fn snapshot(&self) -> GraphSnapshot {
        self.graph.to_snapshot()
    }

    pub fn to_json(&self) -> Result<String, EditorError> {
        Ok(persistence::to_json(&self.graph)?)
    }

    /// Replace the diagram with `snapshot`; history starts over.
    pub fn load_snapshot(&mut self, snapshot: &GraphSnapshot) -> Result<(), EditorError> {
        if self.session_open() {
            return Err(EditorError::TransactionInProgress);
        }
        self.graph.load_snapshot(snapshot)?;
        self.history.reset();
        info!(
            "Loaded diagram: {} nodes, {} edges, {} components",
            self.graph.node_count(),
            self.graph.edge_count(),
            self.graph.component_count()
        );
        Ok(())
    }

    pub fn load_json(&mut self, data: &str) -> Result<(), EditorError> {
        let snapshot = persistence::snapshot_from_json(data)?;
        self.load_snapshot(&snapshot)
    }

    pub fn validate(&self) -> ValidationReport {
        validation::validate(&self.graph.to_snapshot())
    }

    pub fn validation_report(&self) -> String {
        validation::generate_report(&self.validate())
    }

    // --- Intents ---

    pub fn apply_intents<I>(&mut self, intents: I) -> Vec<Result<IntentOutcome, EditorError>>
    where
        I: IntoIterator<Item = EditorIntent>,
    {
        intents
            .into_iter()
            .map(|intent| self.apply_intent(intent))
            .collect()
    }

    pub fn apply_intent(&mut self, intent: EditorIntent) -> Result<IntentOutcome, EditorError> {
        match intent {
            EditorIntent::AddNode {
                node_type,
                position,
                properties,
            } => self
                .add_node(node_type, position, properties)
                .map(IntentOutcome::Node),
            EditorIntent::AddEdge { source, target } => {
                self.add_edge(source, target).map(IntentOutcome::Edge)
            },
            EditorIntent::AddComponent {
                component_type,
                bounds,
                properties,
            } => self
                .add_component(component_type, bounds, properties)
                .map(IntentOutcome::Component),
            EditorIntent::UpdateNode { id, update } => {
                self.update_node(id, update).map(|()| IntentOutcome::Done)
            },
            EditorIntent::UpdateEdge { id, update } => {
                self.update_edge(id, update).map(|()| IntentOutcome::Done)
            },
            EditorIntent::UpdateComponent { id, update } => self
                .update_component(id, update)
                .map(|()| IntentOutcome::Done),
            EditorIntent::RemoveNode { id } => self.remove_node(id).map(|()| IntentOutcome::Done),
            EditorIntent::RemoveEdge { id } => self.remove_edge(id).map(|()| IntentOutcome::Done),
            EditorIntent::RemoveComponent { id } => {
                self.remove_component(id).map(|()| IntentOutcome::Done)
            },
            EditorIntent::DeleteEdge { id } => self.delete_edge(id).map(|()| IntentOutcome::Done),
            EditorIntent::DeleteSelection { selection } => self
                .delete_selection(&selection)
                .map(IntentOutcome::Deleted),
            EditorIntent::BindNode { node, component } => self
                .bind_node_to_component(node, component)
                .map(|()| IntentOutcome::Done),
            EditorIntent::UnbindNode { node } => {
                self.unbind_node(node).map(|()| IntentOutcome::Done)
            },
            EditorIntent::BindComponent { child, parent } => self
                .bind_component_to_component(child, parent)
                .map(|()| IntentOutcome::Done),
            EditorIntent::UnbindComponent { child } => {
                self.unbind_component(child).map(|()| IntentOutcome::Done)
            },
            EditorIntent::MoveNode { id, position } => {
                self.move_node(id, position).map(|()| IntentOutcome::Done)
            },
            EditorIntent::MoveComponent { id, position } => self
                .move_component(id, position)
                .map(|()| IntentOutcome::Done),
            EditorIntent::InsertNodeAfter { node, node_type } => self
                .insert_node_after(node, node_type)
                .map(|inserted| inserted.map_or(IntentOutcome::Skipped, IntentOutcome::Node)),
            EditorIntent::InsertNodeBefore { node, node_type } => self
                .insert_node_before(node, node_type)
                .map(|inserted| inserted.map_or(IntentOutcome::Skipped, IntentOutcome::Node)),
            EditorIntent::InsertNodeOnEdge { edge, node_type } => self
                .insert_node_on_edge(edge, node_type)
                .map(IntentOutcome::Node),
            EditorIntent::ConvertToFork { node, kind } => self
                .convert_to_fork(node, kind)
                .map(|branch| branch.map_or(IntentOutcome::Done, IntentOutcome::Branch)),
            EditorIntent::ConvertToJoin { node, kind } => self
                .convert_to_join(node, kind)
                .map(|()| IntentOutcome::Done),
            EditorIntent::AddBranch { node, position } => self
                .add_branch(node, position)
                .map(IntentOutcome::Branch),
            EditorIntent::ToggleGateKind { node } => self
                .toggle_gate_kind(node)
                .map(IntentOutcome::GateKind),
            EditorIntent::InsertForkOnPath { edge, kind } => self
                .insert_fork_on_path(edge, kind)
                .map(|(node, branch)| IntentOutcome::Gate { node, branch }),
            EditorIntent::InsertJoinOnPath { edge, kind } => self
                .insert_join_on_path(edge, kind)
                .map(|(node, branch)| IntentOutcome::Gate { node, branch }),
            EditorIntent::BeginPath { position } => {
                self.begin_path(position).map(IntentOutcome::Node)
            },
            EditorIntent::ExtendPath {
                node_type,
                position,
            } => self
                .extend_path(node_type, position)
                .map(IntentOutcome::Node),
            EditorIntent::ConnectPathTo { node } => {
                self.connect_path_to(node).map(IntentOutcome::Edge)
            },
            EditorIntent::FinishPath => self.finish_path().map(IntentOutcome::Path),
            EditorIntent::CancelPath => self.cancel_path().map(|()| IntentOutcome::Done),
            EditorIntent::BeginTransaction { label } => self
                .begin_transaction(label)
                .map(|()| IntentOutcome::Done),
            EditorIntent::CommitTransaction => self.commit_transaction().map(|recorded| {
                if recorded {
                    IntentOutcome::Done
                } else {
                    IntentOutcome::Skipped
                }
            }),
            EditorIntent::CancelTransaction => {
                self.cancel_transaction().map(|()| IntentOutcome::Done)
            },
            EditorIntent::Undo => self.undo().map(IntentOutcome::History),
            EditorIntent::Redo => self.redo().map(IntentOutcome::History),
            EditorIntent::Clear => self.clear().map(|()| IntentOutcome::Done),
        }
    }
}
