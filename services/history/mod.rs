/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Undo/redo over journaled graph mutations.
//!
//! A `Command` is the ordered list of primitive mutations one user-level
//! operation produced. Undo replays it backwards, redo forwards, both through
//! `Graph::replay_all`, so the graph only changes when the whole command
//! applies.
//!
//! Rapid edits of the same kind on the same entity (drags, typing into a
//! property) merge into one command while they arrive within the coalesce
//! window.

use std::time::{Duration, Instant};

use log::{debug, warn};
use thiserror::Error;

use crate::model::graph::{EntityRef, Graph, GraphError, Mutation, ReplayDirection};

pub const DEFAULT_MAX_UNDO_STEPS: usize = 128;
pub const DEFAULT_COALESCE_WINDOW: Duration = Duration::from_millis(500);

/// Identifies edits that may merge: same operation on the same entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CoalesceKey {
    pub label: String,
    pub entity: EntityRef,
}

#[derive(Debug, Clone)]
pub struct Command {
    label: String,
    mutations: Vec<Mutation>,
    coalesce_key: Option<CoalesceKey>,
    last_recorded: Instant,
}

impl Command {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("nothing to undo")]
    CannotUndo,
    #[error("nothing to redo")]
    CannotRedo,
    #[error("history entry '{label}' no longer matches the graph and was discarded: {source}")]
    Inconsistent {
        label: String,
        #[source]
        source: GraphError,
    },
}

#[derive(Debug, Clone)]
pub struct History {
    undo_stack: Vec<Command>,
    redo_stack: Vec<Command>,
    max_steps: usize,
    coalesce_window: Duration,
    /// Set after undo/redo or an explicit `seal`; the top command stops absorbing edits.
    sealed: bool,
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_UNDO_STEPS, DEFAULT_COALESCE_WINDOW)
    }
}

impl History {
    pub fn new(max_steps: usize, coalesce_window: Duration) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_steps: max_steps.max(1),
            coalesce_window,
            sealed: false,
        }
    }

    /// Record a completed operation. Returns false when there was nothing to record.
    pub fn record(
        &mut self,
        label: impl Into<String>,
        mutations: Vec<Mutation>,
        coalesce_key: Option<CoalesceKey>,
    ) -> bool {
        self.record_at(label, mutations, coalesce_key, Instant::now())
    }

    /// `record` with an explicit clock reading.
    pub fn record_at(
        &mut self,
        label: impl Into<String>,
        mutations: Vec<Mutation>,
        coalesce_key: Option<CoalesceKey>,
        now: Instant,
    ) -> bool {
        if mutations.is_empty() {
            return false;
        }
        self.redo_stack.clear();

        let window = self.coalesce_window;
        if !self.sealed
            && let Some(key) = &coalesce_key
            && let Some(top) = self.undo_stack.last_mut()
            && top.coalesce_key.as_ref() == Some(key)
            && now.saturating_duration_since(top.last_recorded) <= window
        {
            top.mutations.extend(mutations);
            top.last_recorded = now;
            debug!("history: coalesced '{}' on {}", key.label, key.entity);
            return true;
        }

        self.undo_stack.push(Command {
            label: label.into(),
            mutations,
            coalesce_key,
            last_recorded: now,
        });
        self.sealed = false;
        if self.undo_stack.len() > self.max_steps {
            let excess = self.undo_stack.len() - self.max_steps;
            self.undo_stack.drain(0..excess);
        }
        true
    }

    /// Stop the newest command from absorbing further edits.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    /// Revert the newest command. Returns its label.
    pub fn undo(&mut self, graph: &mut Graph) -> Result<String, HistoryError> {
        let command = self.undo_stack.pop().ok_or(HistoryError::CannotUndo)?;
        self.sealed = true;
        match graph.replay_all(&command.mutations, ReplayDirection::Backward) {
            Ok(()) => {
                debug!("history: undo '{}'", command.label);
                let label = command.label.clone();
                self.redo_stack.push(command);
                Ok(label)
            },
            Err(source) => {
                warn!(
                    "history: dropping '{}' after failed undo: {source}",
                    command.label
                );
                Err(HistoryError::Inconsistent {
                    label: command.label,
                    source,
                })
            },
        }
    }

    /// Re-apply the most recently undone command. Returns its label.
    pub fn redo(&mut self, graph: &mut Graph) -> Result<String, HistoryError> {
        let command = self.redo_stack.pop().ok_or(HistoryError::CannotRedo)?;
        self.sealed = true;
        match graph.replay_all(&command.mutations, ReplayDirection::Forward) {
            Ok(()) => {
                debug!("history: redo '{}'", command.label);
                let label = command.label.clone();
                self.undo_stack.push(command);
                Ok(label)
            },
            Err(source) => {
                warn!(
                    "history: dropping '{}' after failed redo: {source}",
                    command.label
                );
                Err(HistoryError::Inconsistent {
                    label: command.label,
                    source,
                })
            },
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn undo_label(&self) -> Option<&str> {
        self.undo_stack.last().map(Command::label)
    }

    pub fn redo_label(&self) -> Option<&str> {
        self.redo_stack.last().map(Command::label)
    }

    /// Forget all history (after clear or load).
    pub fn reset(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.sealed = false;
    }
}
