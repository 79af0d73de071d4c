/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use euclid::default::Point2D;
use ucmap::model::graph::{GateKind, NodeType, NodeUpdate};
use ucmap::services::persistence::types::PersistedEdge;
use ucmap::services::validation::{self, IssueCategory};

use super::harness::TestHarness;

#[test]
fn test_lone_responsibility_warns_but_passes() {
    let mut harness = TestHarness::new();
    harness.add_node(NodeType::Responsibility, 0.0, 0.0);

    let report = harness.app.validate();

    assert!(report.valid);
    assert!(report.errors.is_empty());
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].category, IssueCategory::OrphanNode);
}

#[test]
fn test_edge_to_missing_node_is_the_only_error() {
    let mut harness = TestHarness::new();
    let a = harness.add_node(NodeType::Start, 0.0, 0.0);
    let b = harness.add_node(NodeType::End, 100.0, 0.0);
    harness.connect(a, b);
    let mut snapshot = harness.snapshot();
    snapshot.edges.push(PersistedEdge {
        id: "edge-50".into(),
        source_node_id: a.to_string(),
        target_node_id: "node-49".into(),
        condition: "true".into(),
        control_points: Vec::new(),
    });

    let report = validation::validate(&snapshot);

    assert!(!report.valid);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].category, IssueCategory::DanglingEdge);
    assert_eq!(report.errors[0].entity_id.as_deref(), Some("edge-50"));
}

#[test]
fn test_half_built_fork_is_flagged_until_branches_close() {
    let mut harness = TestHarness::new();
    let (_, work, _) = harness.simple_path();

    let branch = harness
        .app
        .convert_to_fork(work, GateKind::And)
        .unwrap()
        .unwrap();
    let report = harness.app.validate();
    assert!(!report.valid);
    assert!(report
        .errors
        .iter()
        .any(|issue| issue.category == IssueCategory::PathEnd
            && issue.entity_id.as_deref() == Some(branch.node.to_string().as_str())));

    let end = harness.add_node(NodeType::End, 300.0, 150.0);
    harness.connect(branch.node, end);

    let report = harness.app.validate();
    assert!(report.valid, "{:?}", report.errors);
    assert!(report.warnings.is_empty());
}

#[test]
fn test_editor_operations_keep_diagram_valid() {
    let mut harness = TestHarness::new();
    let (start, work, end) = harness.simple_path();
    let team = harness.add_component(-20.0, -20.0, 300.0, 100.0);
    harness.app.bind_node_to_component(work, team).unwrap();

    let first = harness.app.graph().out_edges(start)[0];
    harness
        .app
        .insert_node_on_edge(first, NodeType::Timer)
        .unwrap();
    harness
        .app
        .insert_node_before(end, NodeType::Responsibility)
        .unwrap();
    let into_end = harness.app.graph().in_edges(end)[0];
    let (_, feeder) = harness
        .app
        .insert_join_on_path(into_end, GateKind::Or)
        .unwrap();
    // The new incoming branch has no source until it is retyped.
    assert!(!harness.app.validate().valid);
    harness
        .app
        .update_node(
            feeder.node,
            NodeUpdate {
                node_type: Some(NodeType::Start),
                ..Default::default()
            },
        )
        .unwrap();

    let report = harness.app.validate();
    assert!(report.valid, "{:?}", report.errors);
    assert!(report.warnings.is_empty());
}

#[test]
fn test_report_for_unfinished_path() {
    let mut harness = TestHarness::new();
    harness.app.begin_path(Point2D::new(0.0, 0.0)).unwrap();
    harness
        .app
        .extend_path(NodeType::Responsibility, Point2D::new(80.0, 0.0))
        .unwrap();

    let text = harness.app.validation_report();

    assert!(text.starts_with("Validation FAILED: 1 error(s), 0 warning(s)\n"));
    assert!(text.contains("\nErrors:\n  path end: 1\n"));
}
