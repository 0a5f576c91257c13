// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use thiserror::Error;

/// Result type for CityJSON data model operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while reading or validating CityJSON data
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid CityJSON document: {0}")]
    InvalidDocument(String),

    #[error("CityJSON document has no usable transform: {0}")]
    MissingTransform(String),

    #[error("City object '{uid}' is malformed: {reason}")]
    InvalidObject { uid: String, reason: String },

    #[error("Unknown city object type '{type_name}' on object '{uid}'")]
    UnknownType { uid: String, type_name: String },

    #[error("{geometry_type} expects boundary depth {expected}, found {found}")]
    BoundaryDepth {
        geometry_type: String,
        expected: usize,
        found: usize,
    },

    #[error("Vertex index {index} out of range (pool has {len} vertices)")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("Unsupported coordinate reference system: {0}")]
    UnsupportedCrs(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidDocument(msg.into())
    }
}
