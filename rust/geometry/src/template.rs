// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! GeometryInstance resolution - geometry instancing.
//!
//! A `GeometryInstance` points at a shared template, places it at an anchor
//! vertex of the model pool and transforms it with a 4x4 matrix. Resolving
//! it produces a concrete geometry with a private vertex list, so the owning
//! object no longer depends on the template set.
//!
//! Template vertices are real-world offsets from the anchor, while object
//! vertices are compressed. Resolved vertices are converted into the model's
//! compressed space (`M·v / scale + anchor`) so that the object's single
//! transform decompresses both kinds alike.

use cityjson_lite_core::{Geometry, GeometryTemplates, IndexRemap, Transform, Vertex};
use nalgebra::{Matrix4, Vector4};

use crate::{Error, Result};

/// A resolved instance: concrete geometry over its own vertices
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedInstance {
    /// Template geometry with indices in `0..vertices.len()`
    pub geometry: Geometry,
    /// Compressed vertices, in first-referenced order
    pub vertices: Vec<Vertex>,
}

/// Build the 4x4 matrix from 16 row-major values
#[inline]
pub fn instance_matrix(values: &[f64; 16]) -> Matrix4<f64> {
    Matrix4::from_row_slice(values)
}

/// Apply a homogeneous transform to every vertex.
///
/// Results are divided by `w` when the matrix is projective.
pub fn transform_vertices(vertices: &[Vertex], matrix: &Matrix4<f64>) -> Result<Vec<Vertex>> {
    vertices
        .iter()
        .map(|v| {
            let p = matrix * Vector4::new(v[0], v[1], v[2], 1.0);
            if p.w == 1.0 {
                Ok([p.x, p.y, p.z])
            } else if p.w.abs() > f64::EPSILON {
                Ok([p.x / p.w, p.y / p.w, p.z / p.w])
            } else {
                Err(Error::InvalidMatrix(format!(
                    "maps vertex {:?} to infinity",
                    v
                )))
            }
        })
        .collect()
}

/// Expand a `GeometryInstance` against the model's templates.
///
/// `shared` is the model vertex pool holding the anchor and `transform` is
/// the model transform. Neither the templates nor the instance are modified.
pub fn resolve_instance(
    instance: &Geometry,
    templates: &GeometryTemplates,
    shared: &[Vertex],
    transform: &Transform,
) -> Result<ResolvedInstance> {
    let params = instance.instance()?;

    let template = usize::try_from(params.template)
        .ok()
        .and_then(|i| templates.templates.get(i))
        .ok_or(Error::TemplateOutOfRange {
            index: params.template,
            count: templates.templates.len(),
        })?;
    if template.is_instance() {
        return Err(Error::NestedInstance(params.template));
    }

    let anchor = usize::try_from(params.anchor)
        .ok()
        .and_then(|i| shared.get(i))
        .copied()
        .ok_or(Error::AnchorOutOfRange {
            anchor: params.anchor,
            len: shared.len(),
        })?;

    // Only the template vertices this geometry uses, densely renumbered
    let remap = IndexRemap::from_boundaries([&template.boundaries]);
    let local: Vec<Vertex> = remap
        .order
        .iter()
        .map(|&i| {
            usize::try_from(i)
                .ok()
                .and_then(|i| templates.vertices.get(i))
                .copied()
                .ok_or(Error::TemplateVertexOutOfRange {
                    template: params.template,
                    index: i,
                    len: templates.vertices.len(),
                })
        })
        .collect::<Result<_>>()?;

    let placed = transform_vertices(&local, &instance_matrix(&params.matrix))?;
    let vertices = placed
        .into_iter()
        .map(|p| {
            [
                p[0] / transform.scale[0] + anchor[0],
                p[1] / transform.scale[1] + anchor[1],
                p[2] / transform.scale[2] + anchor[2],
            ]
        })
        .collect();

    let mut geometry = template.clone();
    geometry.boundaries = remap.apply(&template.boundaries);
    if geometry.lod.is_none() {
        geometry.lod = instance.lod;
    }

    Ok(ResolvedInstance { geometry, vertices })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use cityjson_lite_core::{Boundary, GeometryType};
    use serde_json::json;

    const IDENTITY: [f64; 16] = [
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ];

    fn templates() -> GeometryTemplates {
        GeometryTemplates {
            templates: vec![Geometry::new(
                GeometryType::MultiSurface,
                2.0,
                Boundary::from(vec![vec![vec![0i64, 1, 2, 3]], vec![vec![0i64, 3, 4]]]),
            )],
            vertices: vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 1.0, 0.0],
                [0.5, 0.5, 2.0],
            ],
        }
    }

    fn instance(template: i64, anchor: i64, matrix: &[f64]) -> Geometry {
        serde_json::from_value(json!({
            "type": "GeometryInstance",
            "template": template,
            "boundaries": [anchor],
            "transformationMatrix": matrix,
        }))
        .unwrap()
    }

    #[test]
    fn test_identity_matrix_keeps_template_vertices() {
        let t = templates();
        let out = transform_vertices(&t.vertices, &instance_matrix(&IDENTITY)).unwrap();
        for (a, b) in out.iter().zip(&t.vertices) {
            for k in 0..3 {
                assert_relative_eq!(a[k], b[k]);
            }
        }

        let shared = vec![[0.0, 0.0, 0.0]];
        let resolved =
            resolve_instance(&instance(0, 0, &IDENTITY), &t, &shared, &Transform::identity())
                .unwrap();
        assert_eq!(resolved.vertices, t.vertices);
        assert_eq!(resolved.geometry.geometry_type, GeometryType::MultiSurface);
        assert_eq!(resolved.geometry.boundaries, t.templates[0].boundaries);
    }

    #[test]
    fn test_translation_and_anchor_in_compressed_space() {
        let t = templates();
        // Translate by (10, 0, 0) in real units
        let m = [
            1.0, 0.0, 0.0, 10.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ];
        let transform = Transform {
            scale: [0.5, 0.5, 0.5],
            translate: [100.0, 200.0, 0.0],
        };
        let shared = vec![[0.0, 0.0, 0.0], [4.0, 6.0, 0.0]];
        let resolved = resolve_instance(&instance(0, 1, &m), &t, &shared, &transform).unwrap();

        // Vertex 1 of the template (1,0,0) -> real offset (11,0,0) -> compressed (22,0,0) + anchor
        assert_relative_eq!(resolved.vertices[1][0], 26.0);
        assert_relative_eq!(resolved.vertices[1][1], 6.0);
        // Decompressed, the anchor vertex sits at its real-world position plus the offset
        let real = transform.apply(resolved.vertices[0]);
        assert_relative_eq!(real[0], 100.0 + 2.0 + 10.0);
        assert_relative_eq!(real[1], 200.0 + 3.0);
    }

    #[test]
    fn test_template_out_of_range() {
        let shared = vec![[0.0, 0.0, 0.0]];
        let err = resolve_instance(
            &instance(3, 0, &IDENTITY),
            &templates(),
            &shared,
            &Transform::identity(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::TemplateOutOfRange { index: 3, count: 1 }));
    }

    #[test]
    fn test_anchor_out_of_range() {
        let err = resolve_instance(
            &instance(0, 9, &IDENTITY),
            &templates(),
            &[],
            &Transform::identity(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::AnchorOutOfRange { anchor: 9, len: 0 }));
    }

    #[test]
    fn test_resolution_leaves_templates_untouched() {
        let t = templates();
        let before = t.clone();
        let m = [
            2.0, 0.0, 0.0, 0.0, //
            0.0, 2.0, 0.0, 0.0, //
            0.0, 0.0, 2.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ];
        let shared = vec![[1.0, 1.0, 1.0]];
        let a = resolve_instance(&instance(0, 0, &m), &t, &shared, &Transform::identity()).unwrap();
        let b = resolve_instance(&instance(0, 0, &m), &t, &shared, &Transform::identity()).unwrap();
        assert_eq!(t, before);
        assert_eq!(a, b);
        assert_relative_eq!(a.vertices[4][2], 5.0);
    }

    #[test]
    fn test_unused_template_vertices_are_dropped() {
        let mut t = templates();
        t.templates[0].boundaries = Boundary::from(vec![vec![vec![4i64, 2, 1]]]);
        let shared = vec![[0.0, 0.0, 0.0]];
        let r = resolve_instance(&instance(0, 0, &IDENTITY), &t, &shared, &Transform::identity())
            .unwrap();
        assert_eq!(r.vertices.len(), 3);
        assert_eq!(r.geometry.boundaries, Boundary::from(vec![vec![vec![0i64, 1, 2]]]));
        assert_eq!(r.vertices[0], [0.5, 0.5, 2.0]);
    }
}
