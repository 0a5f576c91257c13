// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Pipeline configuration loaded from environment variables.

use std::fmt;
use std::str::FromStr;

/// How an object's explicit geometries take their vertices from the shared pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExtractionMode {
    /// Copy the whole `[min, max]` index range
    #[default]
    Slice,
    /// As `Slice`, but every index in the range must be referenced
    Strict,
    /// Copy only referenced vertices, renumbered in first-seen order
    Compact,
}

impl ExtractionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ExtractionMode::Slice => "slice",
            ExtractionMode::Strict => "strict",
            ExtractionMode::Compact => "compact",
        }
    }
}

impl FromStr for ExtractionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "slice" => Ok(ExtractionMode::Slice),
            "strict" => Ok(ExtractionMode::Strict),
            "compact" => Ok(ExtractionMode::Compact),
            other => Err(format!(
                "unknown extraction mode '{}' (expected slice, strict or compact)",
                other
            )),
        }
    }
}

impl fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ingestion settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Vertex extraction for explicit geometries.
    pub extraction: ExtractionMode,
    /// Object futures polled at once.
    pub max_in_flight: usize,
    /// Remove stored parent/child links that point at failed objects.
    pub prune_failed_edges: bool,
    /// Fill a missing model extent from the stored objects.
    pub fill_model_extent: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            extraction: ExtractionMode::Slice,
            max_in_flight: 256,
            prune_failed_edges: true,
            fill_model_extent: true,
        }
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            extraction: std::env::var("CITYJSON_EXTRACTION")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.extraction),
            max_in_flight: std::env::var("CITYJSON_MAX_IN_FLIGHT")
                .unwrap_or_else(|_| defaults.max_in_flight.to_string())
                .parse()
                .ok()
                .filter(|&n: &usize| n > 0)
                .unwrap_or(defaults.max_in_flight),
            prune_failed_edges: env_flag(
                "CITYJSON_PRUNE_FAILED_EDGES",
                defaults.prune_failed_edges,
            ),
            fill_model_extent: env_flag("CITYJSON_FILL_EXTENT", defaults.fill_model_extent),
        }
    }
}
