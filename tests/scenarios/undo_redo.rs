/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::collections::BTreeSet;

use euclid::default::Point2D;
use rstest::rstest;
use ucmap::model::graph::topology::Selection;
use ucmap::model::graph::{GateKind, GraphEvent, NodeType, NodeUpdate, Properties};
use ucmap::prefs::EditorConfig;
use ucmap::services::history::HistoryError;
use ucmap::EditorError;

use super::harness::TestHarness;

#[derive(Debug, Clone, Copy)]
enum Edit {
    InsertOnEdge,
    InsertAfter,
    InsertBefore,
    ConvertToFork,
    ConvertToJoin,
    ToggleGate,
    ForkOnPath,
    JoinOnPath,
    RemoveMiddleNode,
    DeleteSelection,
    RemoveComponent,
    MoveComponent,
    Retype,
}

fn apply(harness: &mut TestHarness, edit: Edit) {
    let (start, work, end) = harness.simple_path();
    let team = harness.add_component(-10.0, -10.0, 150.0, 50.0);
    harness.app.bind_node_to_component(work, team).unwrap();
    let first = harness.app.graph().out_edges(start)[0];
    let app = &mut harness.app;
    match edit {
        Edit::InsertOnEdge => {
            app.insert_node_on_edge(first, NodeType::Timer).unwrap();
        },
        Edit::InsertAfter => {
            app.insert_node_after(work, NodeType::Empty).unwrap();
        },
        Edit::InsertBefore => {
            app.insert_node_before(end, NodeType::Responsibility)
                .unwrap();
        },
        Edit::ConvertToFork => {
            app.convert_to_fork(work, GateKind::And).unwrap();
        },
        Edit::ConvertToJoin => {
            app.convert_to_join(work, GateKind::Or).unwrap();
        },
        Edit::ToggleGate => {
            app.convert_to_join(work, GateKind::Or).unwrap();
            app.toggle_gate_kind(work).unwrap();
        },
        Edit::ForkOnPath => {
            app.insert_fork_on_path(first, GateKind::Or).unwrap();
        },
        Edit::JoinOnPath => {
            app.insert_join_on_path(first, GateKind::And).unwrap();
        },
        Edit::RemoveMiddleNode => {
            app.remove_node(work).unwrap();
        },
        Edit::DeleteSelection => {
            let selection = Selection {
                nodes: BTreeSet::from([work]),
                components: BTreeSet::from([team]),
                ..Default::default()
            };
            app.delete_selection(&selection).unwrap();
        },
        Edit::RemoveComponent => {
            app.remove_component(team).unwrap();
        },
        Edit::MoveComponent => {
            app.move_component(team, Point2D::new(300.0, 300.0)).unwrap();
        },
        Edit::Retype => {
            app.update_node(
                work,
                NodeUpdate {
                    node_type: Some(NodeType::Timer),
                    ..Default::default()
                },
            )
            .unwrap();
        },
    }
}

#[rstest]
#[case::insert_on_edge(Edit::InsertOnEdge)]
#[case::insert_after(Edit::InsertAfter)]
#[case::insert_before(Edit::InsertBefore)]
#[case::convert_to_fork(Edit::ConvertToFork)]
#[case::convert_to_join(Edit::ConvertToJoin)]
#[case::toggle_gate(Edit::ToggleGate)]
#[case::fork_on_path(Edit::ForkOnPath)]
#[case::join_on_path(Edit::JoinOnPath)]
#[case::remove_middle_node(Edit::RemoveMiddleNode)]
#[case::delete_selection(Edit::DeleteSelection)]
#[case::remove_component(Edit::RemoveComponent)]
#[case::move_component(Edit::MoveComponent)]
#[case::retype(Edit::Retype)]
fn undo_then_redo_restores_exact_states(#[case] edit: Edit) {
    let mut harness = TestHarness::new();
    apply(&mut harness, edit);
    let after = harness.snapshot();

    // Walk all the way back to the empty diagram, then all the way forward.
    let mut steps = 0;
    while harness.app.can_undo() {
        harness.app.undo().unwrap();
        steps += 1;
    }
    assert!(harness.app.graph().is_empty());
    for _ in 0..steps {
        harness.app.redo().unwrap();
    }

    assert_eq!(harness.snapshot(), after);
    assert!(harness.app.graph().collect_index_violations().is_empty());
}

#[test]
fn test_composite_operation_undoes_in_one_step() {
    let mut harness = TestHarness::new();
    let (start, _, _) = harness.simple_path();
    let before = harness.snapshot();
    let first = harness.app.graph().out_edges(start)[0];

    harness.app.insert_fork_on_path(first, GateKind::And).unwrap();
    harness.app.undo().unwrap();

    assert_eq!(harness.snapshot(), before);
}

#[test]
fn test_undo_stack_trimmed_at_max() {
    let mut harness = TestHarness::new();
    for i in 0..129 {
        harness.add_node(NodeType::Responsibility, i as f32, 0.0);
    }
    assert_eq!(harness.app.history().undo_len(), 128);
}

#[test]
fn test_configured_depth_is_respected() {
    let mut harness = TestHarness::with_config(EditorConfig {
        max_undo_steps: 2,
        ..EditorConfig::default()
    });
    for i in 0..4 {
        harness.add_node(NodeType::Timer, i as f32, 0.0);
    }

    harness.app.undo().unwrap();
    harness.app.undo().unwrap();

    assert_eq!(harness.app.graph().node_count(), 2);
    assert!(matches!(
        harness.app.undo(),
        Err(EditorError::History(HistoryError::CannotUndo))
    ));
}

#[test]
fn test_new_action_clears_redo_stack() {
    let mut harness = TestHarness::new();
    harness.add_node(NodeType::Timer, 0.0, 0.0);
    harness.add_node(NodeType::Timer, 10.0, 0.0);
    harness.app.undo().unwrap();
    assert!(harness.app.can_redo());

    harness.add_node(NodeType::Empty, 20.0, 0.0);

    assert!(!harness.app.can_redo());
    assert!(matches!(
        harness.app.redo(),
        Err(EditorError::History(HistoryError::CannotRedo))
    ));
}

#[test]
fn test_undo_emits_inverse_events() {
    let mut harness = TestHarness::new();
    let (start, work, _) = harness.simple_path();
    harness.app.remove_node(work).unwrap();
    let events = harness.app.subscribe();

    harness.app.undo().unwrap();

    let names: Vec<&str> = events.try_iter().map(|event| event.name()).collect();
    assert_eq!(
        names,
        vec!["node:created", "edge:created", "edge:created"]
    );
    assert_eq!(harness.app.graph().out_edges(start).len(), 1);
}

#[test]
fn test_history_survives_failed_operation() {
    let mut harness = TestHarness::new();
    let (_, work, end) = harness.simple_path();
    let depth = harness.app.history().undo_len();

    assert!(harness.app.add_branch(end, Point2D::new(0.0, 0.0)).is_err());
    assert!(harness
        .app
        .update_node(
            work,
            NodeUpdate {
                properties: Properties::from([(
                    "forkType".to_string(),
                    serde_json::json!("xor")
                )]),
                node_type: Some(NodeType::Fork),
                ..Default::default()
            },
        )
        .is_err());

    assert_eq!(harness.app.history().undo_len(), depth);
    harness.app.undo().unwrap();
    assert_eq!(harness.app.graph().edge_count(), 1);
}

#[test]
fn test_clear_is_not_undoable() {
    let mut harness = TestHarness::new();
    harness.simple_path();
    let events = harness.app.subscribe();

    harness.app.clear().unwrap();

    assert!(harness.app.graph().is_empty());
    assert!(!harness.app.can_undo());
    assert_eq!(events.try_recv().unwrap(), GraphEvent::Cleared);
}
