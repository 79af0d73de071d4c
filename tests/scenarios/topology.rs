/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use euclid::default::Point2D;
use rstest::rstest;
use serde_json::json;
use ucmap::model::graph::{
    FORK_TYPE_KEY, GateKind, GraphError, NodeType, Violation,
};
use ucmap::{EditorError, EditorIntent, IntentOutcome};

use super::harness::TestHarness;

#[test]
fn test_split_edge_between_start_and_end() {
    let mut harness = TestHarness::new();
    let a = harness.add_node(NodeType::Start, 0.0, 0.0);
    let b = harness.add_node(NodeType::End, 200.0, 100.0);
    let edge = harness.connect(a, b);

    let inserted = harness
        .app
        .insert_node_on_edge(edge, NodeType::Responsibility)
        .unwrap();

    let graph = harness.app.graph();
    assert_eq!(graph.node_count(), 3);
    assert_eq!(graph.edge_count(), 2);
    assert!(graph.get_edge(edge).is_none());
    assert_eq!(
        graph.get_node(inserted).unwrap().position,
        Point2D::new(100.0, 50.0)
    );
    assert_eq!(graph.get_connected_nodes(inserted).unwrap().incoming, vec![a]);
    assert_eq!(graph.get_connected_nodes(inserted).unwrap().outgoing, vec![b]);
}

#[test]
fn test_fork_conversion_of_waypoint() {
    let mut harness = TestHarness::new();
    let start = harness.add_node(NodeType::Start, 0.0, 0.0);
    let x = harness.add_node(NodeType::Empty, 100.0, 0.0);
    let end = harness.add_node(NodeType::End, 200.0, 0.0);
    harness.connect(start, x);
    harness.connect(x, end);

    let branch = harness
        .app
        .convert_to_fork(x, GateKind::Or)
        .unwrap()
        .expect("a branch is added to a single-exit waypoint");

    let graph = harness.app.graph();
    let fork = graph.get_node(x).unwrap();
    assert_eq!(fork.node_type, NodeType::Fork);
    assert_eq!(fork.properties[FORK_TYPE_KEY], json!("or"));
    assert_eq!(graph.out_degree(x), 2);
    assert_eq!(
        graph.get_node(branch.node).unwrap().node_type,
        NodeType::Empty
    );
}

#[rstest]
#[case::between_terminals(NodeType::Start, NodeType::End, false, false, true)]
#[case::stranding_both_sides(NodeType::Start, NodeType::Responsibility, false, false, false)]
#[case::source_has_alternative(NodeType::Responsibility, NodeType::End, true, false, true)]
#[case::target_has_alternative(NodeType::Responsibility, NodeType::Timer, false, true, true)]
#[case::middle_of_path(NodeType::Responsibility, NodeType::Timer, false, false, false)]
fn edge_deletion_policy(
    #[case] source_type: NodeType,
    #[case] target_type: NodeType,
    #[case] source_branches: bool,
    #[case] target_merges: bool,
    #[case] allowed: bool,
) {
    let mut harness = TestHarness::new();
    let source = harness.add_node(source_type, 0.0, 0.0);
    let target = harness.add_node(target_type, 100.0, 0.0);
    let edge = harness.connect(source, target);
    if source_branches {
        let other = harness.add_node(NodeType::End, 100.0, 100.0);
        harness.connect(source, other);
    }
    if target_merges {
        let other = harness.add_node(NodeType::Start, 0.0, 100.0);
        harness.connect(other, target);
    }

    let result = harness.app.delete_edge(edge);

    if allowed {
        assert!(result.is_ok(), "{result:?}");
        assert!(harness.app.graph().get_edge(edge).is_none());
    } else {
        assert!(matches!(
            result,
            Err(EditorError::Graph(GraphError::InvariantViolation(
                Violation::StrandedPath { .. }
            )))
        ));
        assert!(harness.app.graph().get_edge(edge).is_some());
    }
}

#[test]
fn test_structural_remove_edge_bypasses_policy() {
    let mut harness = TestHarness::new();
    let (start, _, _) = harness.simple_path();
    let first = harness.app.graph().out_edges(start)[0];

    harness.app.remove_edge(first).unwrap();

    assert_eq!(harness.app.graph().edge_count(), 1);
}

#[test]
fn test_insert_after_node_without_exit_is_skipped() {
    let mut harness = TestHarness::new();
    let (_, _, end) = harness.simple_path();
    let depth = harness.app.history().undo_len();

    let outcome = harness.app.apply_intent(EditorIntent::InsertNodeAfter {
        node: end,
        node_type: NodeType::Timer,
    });

    assert_eq!(outcome.unwrap(), IntentOutcome::Skipped);
    assert_eq!(harness.app.history().undo_len(), depth);
}

#[test]
fn test_branch_from_fork_joins_its_component() {
    let mut harness = TestHarness::new();
    let (_, work, _) = harness.simple_path();
    let team = harness.add_component(50.0, -50.0, 300.0, 300.0);
    harness.app.bind_node_to_component(work, team).unwrap();

    let branch = harness
        .app
        .add_branch(work, Point2D::new(150.0, 80.0))
        .unwrap();

    let graph = harness.app.graph();
    assert_eq!(
        graph.get_node(branch.node).unwrap().parent_component,
        Some(team)
    );
    assert!(graph.get_component(team).unwrap().child_nodes.contains(&branch.node));
}

#[test]
fn test_path_tool_builds_valid_path() {
    let mut harness = TestHarness::new();
    let outcomes = harness.app.apply_intents([
        EditorIntent::BeginPath {
            position: Point2D::new(0.0, 0.0),
        },
        EditorIntent::ExtendPath {
            node_type: NodeType::Responsibility,
            position: Point2D::new(80.0, 0.0),
        },
        EditorIntent::ExtendPath {
            node_type: NodeType::Empty,
            position: Point2D::new(160.0, 0.0),
        },
        EditorIntent::FinishPath,
    ]);

    assert!(outcomes.iter().all(Result::is_ok));
    let report = harness.app.validate();
    assert!(report.valid, "{:?}", report.errors);
    assert!(report.warnings.is_empty());
    assert_eq!(harness.app.history().undo_len(), 1);
}

#[test]
fn test_path_tool_can_close_onto_existing_node() {
    let mut harness = TestHarness::new();
    let (_, _, end) = harness.simple_path();

    harness.app.begin_path(Point2D::new(0.0, 100.0)).unwrap();
    harness.app.connect_path_to(end).unwrap();
    let finished = harness.app.finish_path().unwrap();

    assert_eq!(finished.end, Some(end));
    assert_eq!(harness.app.graph().in_degree(end), 2);
    assert!(harness.app.validate().valid);
}
