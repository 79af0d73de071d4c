/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Editor preferences: TOML file, then `UCMAP_*` environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use euclid::default::Vector2D;
use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::graph::ComponentRemovalPolicy;
use crate::services::history::{DEFAULT_COALESCE_WINDOW, DEFAULT_MAX_UNDO_STEPS};

pub const ENV_MAX_UNDO_STEPS: &str = "UCMAP_MAX_UNDO_STEPS";
pub const ENV_COALESCE_WINDOW_MS: &str = "UCMAP_COALESCE_WINDOW_MS";
pub const ENV_COMPONENT_REMOVAL: &str = "UCMAP_COMPONENT_REMOVAL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Undo stack depth; older commands are dropped first.
    pub max_undo_steps: usize,
    /// Edits of the same kind on the same entity closer than this merge.
    pub coalesce_window_ms: u64,
    pub component_removal: ComponentRemovalPolicy,
    /// Placement of a branch added by fork conversion, relative to the fork.
    pub branch_offset: [f32; 2],
    /// Placement of the end node added to a lone start, relative to the start.
    pub auto_end_offset: [f32; 2],
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            max_undo_steps: DEFAULT_MAX_UNDO_STEPS,
            coalesce_window_ms: DEFAULT_COALESCE_WINDOW.as_millis() as u64,
            component_removal: ComponentRemovalPolicy::default(),
            branch_offset: [120.0, 80.0],
            auto_end_offset: [120.0, 0.0],
        }
    }
}

impl EditorConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Apply `UCMAP_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| env::var(key).ok())
    }

    /// Apply overrides from `lookup`. Invalid values are ignored with a warning.
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(raw) = lookup(ENV_MAX_UNDO_STEPS) {
            match raw.trim().parse::<usize>() {
                Ok(steps) if steps > 0 => self.max_undo_steps = steps,
                _ => warn!(
                    "{ENV_MAX_UNDO_STEPS} invalid ('{raw}'); keeping {}",
                    self.max_undo_steps
                ),
            }
        }
        if let Some(raw) = lookup(ENV_COALESCE_WINDOW_MS) {
            match raw.trim().parse::<u64>() {
                Ok(ms) => self.coalesce_window_ms = ms,
                Err(_) => warn!(
                    "{ENV_COALESCE_WINDOW_MS} invalid ('{raw}'); keeping {}ms",
                    self.coalesce_window_ms
                ),
            }
        }
        if let Some(raw) = lookup(ENV_COMPONENT_REMOVAL) {
            match raw.parse::<ComponentRemovalPolicy>() {
                Ok(policy) => self.component_removal = policy,
                Err(_) => warn!(
                    "{ENV_COMPONENT_REMOVAL} invalid ('{raw}'); keeping {:?}",
                    self.component_removal
                ),
            }
        }
        self
    }

    pub fn coalesce_window(&self) -> Duration {
        Duration::from_millis(self.coalesce_window_ms)
    }

    pub fn branch_offset(&self) -> Vector2D<f32> {
        Vector2D::from(self.branch_offset)
    }

    pub fn auto_end_offset(&self) -> Vector2D<f32> {
        Vector2D::from(self.auto_end_offset)
    }
}
