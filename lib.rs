/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Structural editing core for Use Case Map diagrams: a typed graph store with
//! path topology operations, command-based undo/redo, structural validation
//! and JSON documents.

pub mod app;
pub mod model;
pub mod prefs;
pub mod services;

pub use app::{EditorApp, EditorError, EditorIntent, IntentOutcome};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
