/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Diagram documents: JSON in and out of the graph store.

pub mod types;

use log::info;
use thiserror::Error;

use crate::model::graph::{Graph, GraphError};
use types::GraphSnapshot;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("invalid diagram JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed entity id '{0}'")]
    InvalidId(String),
    #[error("diagram rejected: {0}")]
    Graph(#[from] GraphError),
}

pub fn snapshot_to_json(snapshot: &GraphSnapshot) -> Result<String, PersistenceError> {
    Ok(serde_json::to_string_pretty(snapshot)?)
}

pub fn snapshot_from_json(data: &str) -> Result<GraphSnapshot, PersistenceError> {
    Ok(serde_json::from_str(data)?)
}

/// Serialize the whole graph as a pretty-printed document.
pub fn to_json(graph: &Graph) -> Result<String, PersistenceError> {
    snapshot_to_json(&graph.to_snapshot())
}

/// Build a fresh graph from a document.
pub fn from_json(data: &str) -> Result<Graph, PersistenceError> {
    let snapshot = snapshot_from_json(data)?;
    let graph = Graph::from_snapshot(&snapshot)?;
    info!(
        "Loaded diagram: {} nodes, {} edges, {} components",
        graph.node_count(),
        graph.edge_count(),
        graph.component_count()
    );
    Ok(graph)
}
