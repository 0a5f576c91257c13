// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! CityJSON-Lite Geometry Processing
//!
//! Geometry instance resolution with nalgebra matrices, surface
//! triangulation with earcutr, and render meshes for decomposed objects.

pub mod error;
pub mod mesh;
pub mod template;
pub mod triangulation;

// Re-export nalgebra types for convenience
pub use nalgebra::{Matrix4, Point2, Point3, Vector3};

pub use error::{Error, Result};
pub use mesh::{build_object_mesh, CoordinateShift, Mesh, ObjectMesh};
pub use template::{resolve_instance, ResolvedInstance};
pub use triangulation::{
    collect_surfaces, newell_normal, triangulate_geometry, triangulate_polygon,
    triangulate_surface,
};
