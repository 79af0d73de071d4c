/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Serializable types for diagram documents.
//!
//! Field names follow the document format (camelCase, `type` discriminators).
//! Ids travel as strings so unknown or malformed ids surface at load time.

use euclid::default::{Point2D, Rect, Size2D};
use serde::{Deserialize, Serialize};

use crate::model::graph::{ComponentType, DEFAULT_CONDITION, NodeType, Properties};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PersistedPoint {
    pub x: f32,
    pub y: f32,
}

impl From<Point2D<f32>> for PersistedPoint {
    fn from(point: Point2D<f32>) -> Self {
        Self {
            x: point.x,
            y: point.y,
        }
    }
}

impl From<PersistedPoint> for Point2D<f32> {
    fn from(point: PersistedPoint) -> Self {
        Point2D::new(point.x, point.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PersistedBounds {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl From<Rect<f32>> for PersistedBounds {
    fn from(rect: Rect<f32>) -> Self {
        Self {
            x: rect.origin.x,
            y: rect.origin.y,
            width: rect.size.width,
            height: rect.size.height,
        }
    }
}

impl From<PersistedBounds> for Rect<f32> {
    fn from(bounds: PersistedBounds) -> Self {
        Rect::new(
            Point2D::new(bounds.x, bounds.y),
            Size2D::new(bounds.width, bounds.height),
        )
    }
}

/// Persisted node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub position: PersistedPoint,
    #[serde(default)]
    pub properties: Properties,
    /// Informational copy; containment is rebuilt from component child lists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_component: Option<String>,
}

fn default_condition() -> String {
    DEFAULT_CONDITION.to_string()
}

/// Persisted edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedEdge {
    pub id: String,
    pub source_node_id: String,
    pub target_node_id: String,
    #[serde(default = "default_condition")]
    pub condition: String,
    #[serde(default)]
    pub control_points: Vec<PersistedPoint>,
}

/// Persisted component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedComponent {
    pub id: String,
    #[serde(rename = "type")]
    pub component_type: ComponentType,
    pub bounds: PersistedBounds,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub child_nodes: Vec<String>,
    #[serde(default)]
    pub child_components: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_component: Option<String>,
}

/// Full diagram document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    #[serde(default)]
    pub nodes: Vec<PersistedNode>,
    #[serde(default)]
    pub edges: Vec<PersistedEdge>,
    #[serde(default)]
    pub components: Vec<PersistedComponent>,
}
