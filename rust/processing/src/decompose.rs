// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-object decomposition: turn a raw object that indexes the shared
//! vertex pool into a self-contained [`CityObject`].
//!
//! Explicit geometries take their vertices from the pool according to the
//! [`ExtractionMode`]. Geometry instances are resolved against the model
//! templates and their vertices appended after the extracted ones.

use cityjson_lite_core::{
    boundary::first_unreferenced, extreme_indices, rebase, BBox, Boundary, CityObject,
    CityObjectType, Error as CoreError, Geometry, GeometryTemplates, IndexRemap, RawCityObject,
    Transform, Vertex,
};
use cityjson_lite_geometry::resolve_instance;

use crate::config::ExtractionMode;
use crate::error::ObjectError;

/// Read-only model data shared by every object of one ingestion
#[derive(Debug, Clone, Copy)]
pub struct SharedModel<'a> {
    pub vertices: &'a [Vertex],
    pub templates: Option<&'a GeometryTemplates>,
    pub transform: &'a Transform,
}

fn check_range(min: i64, max: i64, len: usize) -> Result<(), CoreError> {
    if min < 0 {
        return Err(CoreError::IndexOutOfRange { index: min, len });
    }
    if max as u64 >= len as u64 {
        return Err(CoreError::IndexOutOfRange { index: max, len });
    }
    Ok(())
}

/// Private vertices and rewritten boundaries of the explicit geometries
fn extract_explicit(
    uid: &str,
    boundaries: &[&Boundary],
    pool: &[Vertex],
    mode: ExtractionMode,
) -> Result<(Vec<Vertex>, Vec<Boundary>), ObjectError> {
    let Some((min, max)) = extreme_indices(boundaries.iter().copied()) else {
        return Ok((Vec::new(), boundaries.iter().map(|b| (*b).clone()).collect()));
    };
    check_range(min, max, pool.len())?;

    match mode {
        ExtractionMode::Slice | ExtractionMode::Strict => {
            if mode == ExtractionMode::Strict {
                if let Some(missing) = first_unreferenced(boundaries.iter().copied(), min, max) {
                    return Err(ObjectError::NonContiguous {
                        uid: uid.to_string(),
                        missing,
                    });
                }
            }
            let vertices = pool[min as usize..=max as usize].to_vec();
            let rebased = boundaries.iter().map(|b| rebase(b, min)).collect();
            Ok((vertices, rebased))
        }
        ExtractionMode::Compact => {
            let remap = IndexRemap::from_boundaries(boundaries.iter().copied());
            // In range: every index lies in [min, max]
            let vertices = remap.order.iter().map(|&i| pool[i as usize]).collect();
            let remapped = boundaries.iter().map(|b| remap.apply(b)).collect();
            Ok((vertices, remapped))
        }
    }
}

/// Decompose one raw object.
///
/// `parents` and `children` are copied from the raw object; the assembler
/// replaces them with the symmetric lists of the object graph.
pub fn decompose_object(
    uid: &str,
    raw: &RawCityObject,
    shared: &SharedModel<'_>,
    mode: ExtractionMode,
) -> Result<CityObject, ObjectError> {
    let object_type = CityObjectType::parse_for(uid, &raw.type_name)?;
    for geometry in &raw.geometry {
        geometry.validate_depth()?;
    }

    let explicit: Vec<&Boundary> = raw
        .geometry
        .iter()
        .filter(|g| !g.is_instance())
        .map(|g| &g.boundaries)
        .collect();
    let (mut vertices, rewritten) = extract_explicit(uid, &explicit, shared.vertices, mode)?;

    let empty = GeometryTemplates::default();
    let templates = shared.templates.unwrap_or(&empty);

    let mut rewritten = rewritten.into_iter();
    let mut geometry = Vec::with_capacity(raw.geometry.len());
    for g in &raw.geometry {
        if g.is_instance() {
            let resolved = resolve_instance(g, templates, shared.vertices, shared.transform)?;
            let offset = vertices.len() as i64;
            let mut concrete: Geometry = resolved.geometry;
            concrete.boundaries = rebase(&concrete.boundaries, -offset);
            vertices.extend(resolved.vertices);
            geometry.push(concrete);
        } else {
            let mut explicit = g.clone();
            if let Some(b) = rewritten.next() {
                explicit.boundaries = b;
            }
            geometry.push(explicit);
        }
    }

    let geographical_extent = BBox::from_compressed(&vertices, shared.transform);

    Ok(CityObject {
        uid: uid.to_string(),
        object_type,
        parents: raw.parents.clone(),
        children: raw.children.clone(),
        vertices,
        geometry,
        spatial_index: geographical_extent.is_some(),
        geographical_extent,
        attributes: raw.attributes.clone(),
        transform: *shared.transform,
    })
}
