/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::fs;

use serde_json::{Value, json};
use tempfile::TempDir;
use ucmap::EditorError;
use ucmap::model::graph::{GateKind, NodeType, NodeUpdate, Properties};
use ucmap::services::persistence::{self, PersistenceError};

use super::harness::TestHarness;

fn populated() -> TestHarness {
    let mut harness = TestHarness::new();
    let (start, work, _) = harness.simple_path();
    let outer = harness.add_component(-20.0, -20.0, 400.0, 200.0);
    let inner = harness.add_component(50.0, -10.0, 100.0, 50.0);
    harness
        .app
        .bind_component_to_component(inner, outer)
        .unwrap();
    harness.app.bind_node_to_component(work, inner).unwrap();
    harness
        .app
        .update_node(
            work,
            NodeUpdate {
                properties: Properties::from([
                    ("name".to_string(), json!("Reserve stock")),
                    ("timeout".to_string(), json!(30)),
                ]),
                ..Default::default()
            },
        )
        .unwrap();
    let first = harness.app.graph().out_edges(start)[0];
    harness
        .app
        .insert_fork_on_path(first, GateKind::And)
        .unwrap();
    harness
}

#[test]
fn test_document_roundtrip_preserves_everything() {
    let harness = populated();
    let json = harness.app.to_json().unwrap();

    let mut restored = TestHarness::new();
    restored.app.load_json(&json).unwrap();

    assert_eq!(restored.snapshot(), harness.snapshot());
    assert!(restored.app.graph().collect_index_violations().is_empty());
    for node in harness.app.graph().nodes() {
        assert_eq!(
            restored.app.graph().in_edges(node.id),
            harness.app.graph().in_edges(node.id)
        );
        assert_eq!(
            restored.app.graph().out_edges(node.id),
            harness.app.graph().out_edges(node.id)
        );
    }
}

#[test]
fn test_document_shape() {
    let mut harness = TestHarness::new();
    let a = harness.add_node(NodeType::Start, 1.0, 2.0);
    let b = harness.add_node(NodeType::End, 3.0, 4.0);
    harness.connect(a, b);
    harness.add_component(0.0, 0.0, 10.0, 20.0);

    let value: Value = serde_json::from_str(&harness.app.to_json().unwrap()).unwrap();

    assert_eq!(
        value,
        json!({
            "nodes": [
                { "id": "node-1", "type": "start", "position": { "x": 1.0, "y": 2.0 }, "properties": {} },
                { "id": "node-2", "type": "end", "position": { "x": 3.0, "y": 4.0 }, "properties": {} }
            ],
            "edges": [
                {
                    "id": "edge-3",
                    "sourceNodeId": "node-1",
                    "targetNodeId": "node-2",
                    "condition": "true",
                    "controlPoints": []
                }
            ],
            "components": [
                {
                    "id": "component-4",
                    "type": "team",
                    "bounds": { "x": 0.0, "y": 0.0, "width": 10.0, "height": 20.0 },
                    "properties": {},
                    "childNodes": [],
                    "childComponents": []
                }
            ]
        })
    );
}

#[test]
fn test_loaded_ids_never_collide_with_new_ones() {
    let harness = populated();
    let json = harness.app.to_json().unwrap();

    let mut restored = TestHarness::new();
    restored.app.load_json(&json).unwrap();
    let fresh = restored.add_node(NodeType::Timer, 0.0, 0.0);

    assert!(harness.app.graph().get_node(fresh).is_none());
}

#[test]
fn test_foreign_document_loads_with_dangling_edge_dropped() {
    let data = r#"{
        "nodes": [
            { "id": "node-10", "type": "start", "position": { "x": 0, "y": 0 } },
            { "id": "node-11", "type": "fork", "position": { "x": 50, "y": 0 } },
            { "id": "node-12", "type": "end", "position": { "x": 100, "y": 0 } }
        ],
        "edges": [
            { "id": "edge-20", "sourceNodeId": "node-10", "targetNodeId": "node-11" },
            { "id": "edge-21", "sourceNodeId": "node-11", "targetNodeId": "node-12", "condition": "ok" },
            { "id": "edge-22", "sourceNodeId": "node-11", "targetNodeId": "node-99" }
        ]
    }"#;

    let snapshot = persistence::snapshot_from_json(data).unwrap();
    let report = ucmap::services::validation::validate(&snapshot);
    assert!(!report.valid);

    let mut harness = TestHarness::new();
    harness.app.load_snapshot(&snapshot).unwrap();

    let graph = harness.app.graph();
    assert_eq!(graph.node_count(), 3);
    assert_eq!(graph.edge_count(), 2);
    let fork = graph.get_node("node-11".parse().unwrap()).unwrap();
    assert_eq!(fork.gate_kind(), Some(GateKind::Or));
}

#[test]
fn test_loading_bad_document_keeps_current_graph() {
    let mut harness = TestHarness::new();
    harness.simple_path();
    let before = harness.snapshot();

    let result = harness.app.load_json(r#"{"nodes":[{"id":"node-1","type":"portal","position":{"x":0,"y":0}}]}"#);

    assert!(matches!(
        result,
        Err(EditorError::Persistence(PersistenceError::Json(_)))
    ));
    assert_eq!(harness.snapshot(), before);
    assert!(harness.app.can_undo());
}

#[test]
fn test_save_and_reload_from_disk() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("flow.ucm.json");
    let harness = populated();

    fs::write(&path, harness.app.to_json().unwrap()).unwrap();
    let graph = persistence::from_json(&fs::read_to_string(&path).unwrap()).unwrap();

    assert_eq!(graph.to_snapshot(), harness.snapshot());
}
