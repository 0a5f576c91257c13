// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the ingestion pipeline.
//!
//! [`ObjectError`] is scoped to one city object and is collected into the
//! batch result. [`IngestError`] aborts a whole ingestion.

use thiserror::Error;

/// Document store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Duplicate key in '{collection}': {key}")]
    Conflict { collection: String, key: String },

    #[error("Not found in '{collection}': {what}")]
    NotFound { collection: String, what: String },

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(collection: &str, what: impl Into<String>) -> Self {
        StoreError::NotFound {
            collection: collection.to_string(),
            what: what.into(),
        }
    }
}

/// Failure of a single city object. Never aborts its siblings.
#[derive(Debug, Error)]
pub enum ObjectError {
    #[error(transparent)]
    Core(#[from] cityjson_lite_core::Error),

    #[error(transparent)]
    Geometry(#[from] cityjson_lite_geometry::Error),

    #[error("City object '{uid}' has unsupported type '{type_name}'")]
    Unsupported { uid: String, type_name: String },

    #[error("City object '{uid}' failed validation: {reason}")]
    Validation { uid: String, reason: String },

    #[error("City object '{uid}' does not reference vertex {missing} inside its range")]
    NonContiguous { uid: String, missing: i64 },

    #[error("City object '{uid}' references unknown object '{target}'")]
    DanglingReference { uid: String, target: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failure of an ingestion as a whole.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Invalid CityJSON document: {0}")]
    Document(#[from] cityjson_lite_core::Error),

    #[error("Failed to save city model: {0}")]
    Store(#[from] StoreError),

    #[error("City model '{0}' already exists")]
    DuplicateModel(String),
}
