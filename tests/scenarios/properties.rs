/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Random edit sequences against the store invariants.

use euclid::default::Point2D;
use proptest::prelude::*;
use ucmap::EditorApp;
use ucmap::model::graph::{ComponentId, EdgeId, GateKind, NodeId, NodeType};

use super::harness::TestHarness;

#[derive(Debug, Clone)]
enum Op {
    AddNode(usize, f32, f32),
    Connect(usize, usize),
    InsertOnEdge(usize, usize),
    ConvertToFork(usize),
    ToggleGate(usize),
    RemoveNode(usize),
    DeleteEdge(usize),
    AddComponent(f32, f32),
    Bind(usize, usize),
    Nest(usize, usize),
    RemoveComponent(usize),
    MoveNode(usize, f32, f32),
    MoveComponent(usize, f32, f32),
}

fn coord() -> impl Strategy<Value = f32> {
    (-500i16..500).prop_map(f32::from)
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..NodeType::ALL.len(), coord(), coord()).prop_map(|(t, x, y)| Op::AddNode(t, x, y)),
        3 => (any::<usize>(), any::<usize>()).prop_map(|(a, b)| Op::Connect(a, b)),
        1 => (any::<usize>(), 0..NodeType::ALL.len()).prop_map(|(e, t)| Op::InsertOnEdge(e, t)),
        1 => any::<usize>().prop_map(Op::ConvertToFork),
        1 => any::<usize>().prop_map(Op::ToggleGate),
        1 => any::<usize>().prop_map(Op::RemoveNode),
        1 => any::<usize>().prop_map(Op::DeleteEdge),
        1 => (coord(), coord()).prop_map(|(x, y)| Op::AddComponent(x, y)),
        1 => (any::<usize>(), any::<usize>()).prop_map(|(n, c)| Op::Bind(n, c)),
        1 => (any::<usize>(), any::<usize>()).prop_map(|(a, b)| Op::Nest(a, b)),
        1 => any::<usize>().prop_map(Op::RemoveComponent),
        1 => (any::<usize>(), coord(), coord()).prop_map(|(n, x, y)| Op::MoveNode(n, x, y)),
        1 => (any::<usize>(), coord(), coord()).prop_map(|(c, x, y)| Op::MoveComponent(c, x, y)),
    ]
}

fn pick<T: Copy>(items: &[T], index: usize) -> Option<T> {
    if items.is_empty() {
        None
    } else {
        Some(items[index % items.len()])
    }
}

fn node_ids(app: &EditorApp) -> Vec<NodeId> {
    let mut ids: Vec<NodeId> = app.graph().nodes().map(|node| node.id).collect();
    ids.sort();
    ids
}

fn edge_ids(app: &EditorApp) -> Vec<EdgeId> {
    let mut ids: Vec<EdgeId> = app.graph().edges().map(|edge| edge.id).collect();
    ids.sort();
    ids
}

fn component_ids(app: &EditorApp) -> Vec<ComponentId> {
    app.graph().components().map(|component| component.id).collect()
}

/// Apply `op`; rejected edits are part of the exercise and are ignored.
fn apply(harness: &mut TestHarness, op: &Op) {
    let nodes = node_ids(&harness.app);
    let edges = edge_ids(&harness.app);
    let components = component_ids(&harness.app);
    match *op {
        Op::AddNode(t, x, y) => {
            harness.add_node(NodeType::ALL[t], x, y);
        },
        Op::Connect(a, b) => {
            if let (Some(a), Some(b)) = (pick(&nodes, a), pick(&nodes, b)) {
                let _ = harness.app.add_edge(a, b);
            }
        },
        Op::InsertOnEdge(e, t) => {
            if let Some(e) = pick(&edges, e) {
                let _ = harness.app.insert_node_on_edge(e, NodeType::ALL[t]);
            }
        },
        Op::ConvertToFork(n) => {
            if let Some(n) = pick(&nodes, n) {
                let _ = harness.app.convert_to_fork(n, GateKind::Or);
            }
        },
        Op::ToggleGate(n) => {
            if let Some(n) = pick(&nodes, n) {
                let _ = harness.app.toggle_gate_kind(n);
            }
        },
        Op::RemoveNode(n) => {
            if let Some(n) = pick(&nodes, n) {
                let _ = harness.app.remove_node(n);
            }
        },
        Op::DeleteEdge(e) => {
            if let Some(e) = pick(&edges, e) {
                let _ = harness.app.delete_edge(e);
            }
        },
        Op::AddComponent(x, y) => {
            harness.add_component(x, y, 120.0, 80.0);
        },
        Op::Bind(n, c) => {
            if let (Some(n), Some(c)) = (pick(&nodes, n), pick(&components, c)) {
                let _ = harness.app.bind_node_to_component(n, c);
            }
        },
        Op::Nest(a, b) => {
            if let (Some(a), Some(b)) = (pick(&components, a), pick(&components, b)) {
                let _ = harness.app.bind_component_to_component(a, b);
            }
        },
        Op::RemoveComponent(c) => {
            if let Some(c) = pick(&components, c) {
                let _ = harness.app.remove_component(c);
            }
        },
        Op::MoveNode(n, x, y) => {
            if let Some(n) = pick(&nodes, n) {
                let _ = harness.app.move_node(n, Point2D::new(x, y));
            }
        },
        Op::MoveComponent(c, x, y) => {
            if let Some(c) = pick(&components, c) {
                let _ = harness.app.move_component(c, Point2D::new(x, y));
            }
        },
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn store_indexes_stay_consistent(ops in prop::collection::vec(op(), 1..40)) {
        let mut harness = TestHarness::new();
        for op in &ops {
            apply(&mut harness, op);
            let violations = harness.app.graph().collect_index_violations();
            prop_assert!(violations.is_empty(), "after {:?}: {:?}", op, violations);
        }
    }

    #[test]
    fn document_roundtrip_is_lossless(ops in prop::collection::vec(op(), 1..40)) {
        let mut harness = TestHarness::new();
        for op in &ops {
            apply(&mut harness, op);
        }
        let json = harness.app.to_json().unwrap();

        let mut restored = TestHarness::new();
        restored.app.load_json(&json).unwrap();

        prop_assert_eq!(restored.snapshot(), harness.snapshot());
    }

    #[test]
    fn undoing_everything_empties_the_diagram(ops in prop::collection::vec(op(), 1..40)) {
        let mut harness = TestHarness::new();
        for op in &ops {
            apply(&mut harness, op);
        }
        let after = harness.snapshot();

        let mut steps = 0;
        while harness.app.can_undo() {
            harness.app.undo().unwrap();
            steps += 1;
        }
        prop_assert!(harness.app.graph().is_empty());
        prop_assert_eq!(harness.app.graph().edge_count(), 0);

        for _ in 0..steps {
            harness.app.redo().unwrap();
        }
        prop_assert_eq!(harness.snapshot(), after);
    }
}
