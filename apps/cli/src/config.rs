// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! CLI configuration loaded from environment variables.

use cityjson_lite_processing::PipelineConfig;

/// CLI configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Prefix for the per-kind object collections.
    pub collection_prefix: String,
    /// Log filter used when `RUST_LOG` is unset.
    pub default_log_filter: String,
    /// Ingestion settings.
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            collection_prefix: std::env::var("CITYJSON_COLLECTION_PREFIX").unwrap_or_default(),
            default_log_filter: std::env::var("CITYJSON_LOG")
                .unwrap_or_else(|_| "info,cityjson_lite_processing=debug".into()),
            pipeline: PipelineConfig::from_env(),
        }
    }
}
