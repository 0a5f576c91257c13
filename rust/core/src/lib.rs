// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # CityJSON-Lite Core
//!
//! Data model and index utilities for CityJSON city models.
//!
//! ## Overview
//!
//! - **Document model**: serde types for a whole CityJSON file and for the
//!   self-contained objects it decomposes into
//! - **Boundaries**: nested vertex-index arrays with scan, rebase and remap
//! - **Type table**: the closed set of city object types and the storage
//!   kind each maps to
//! - **Georeferencing**: EPSG code parsing and WGS84 reprojection for display
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cityjson_lite_core::{boundary, CityJsonDocument, RawCityObject};
//!
//! let doc = CityJsonDocument::parse_str(content)?;
//! for (uid, value) in &doc.city_objects {
//!     let object = RawCityObject::from_value(uid, value)?;
//!     let range = boundary::extreme_indices(object.geometry.iter().map(|g| &g.boundaries));
//!     println!("{} uses vertices {:?}", uid, range);
//! }
//! ```

pub mod bbox;
pub mod boundary;
pub mod error;
pub mod georef;
pub mod kind;
pub mod model;

pub use bbox::BBox;
pub use boundary::{extreme_indices, rebase, scan_extreme_indices, Boundary, IndexRemap};
pub use error::{Error, Result};
pub use georef::{parse_epsg_code, BuiltinReprojector, Reprojector};
pub use kind::{CityObjectType, StoreKind};
pub use model::{
    Attributes, CityJsonDocument, CityObject, Geometry, GeometryInstance, GeometryTemplates,
    GeometryType, Lod, Metadata, RawCityObject, SemanticSurface, Semantics, Transform, Vertex,
};
