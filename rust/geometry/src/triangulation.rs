// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Polygon triangulation utilities
//!
//! Surfaces are rings of indices into a vertex list: the first ring is the
//! outer boundary, the rest are holes. They are projected onto their own
//! plane (Newell normal + Gram-Schmidt basis) and ear-clipped with earcutr.

use cityjson_lite_core::{Boundary, Error as CoreError, Geometry, GeometryType, Vertex};

use crate::{Error, Point2, Point3, Result, Vector3};

/// Normals shorter than this are treated as degenerate
const NORMAL_EPSILON: f64 = 1e-12;

/// Check if a polygon is convex (all cross products have same sign)
#[inline]
fn is_convex(points: &[Point2<f64>]) -> bool {
    if points.len() < 3 {
        return false;
    }

    let n = points.len();
    let mut sign = 0i8;

    for i in 0..n {
        let p0 = &points[i];
        let p1 = &points[(i + 1) % n];
        let p2 = &points[(i + 2) % n];

        // Cross product of edges
        let cross = (p1.x - p0.x) * (p2.y - p1.y) - (p1.y - p0.y) * (p2.x - p1.x);

        if cross.abs() > 1e-10 {
            let current_sign = if cross > 0.0 { 1i8 } else { -1i8 };
            if sign == 0 {
                sign = current_sign;
            } else if sign != current_sign {
                return false; // Sign changed - not convex
            }
        }
    }

    // All-collinear rings never set a sign
    sign != 0
}

/// Simple fan triangulation for convex polygons
#[inline]
fn fan_triangulate(n: usize) -> Vec<usize> {
    let mut indices = Vec::with_capacity((n - 2) * 3);
    for i in 1..n - 1 {
        indices.push(0);
        indices.push(i);
        indices.push(i + 1);
    }
    indices
}

/// Triangulate a simple polygon (no holes)
/// Returns triangle indices into the input points
#[inline]
pub fn triangulate_polygon(points: &[Point2<f64>]) -> Result<Vec<usize>> {
    let n = points.len();

    if n < 3 {
        return Err(Error::TriangulationError(
            "Need at least 3 points to triangulate".to_string(),
        ));
    }

    // FAST PATH: Convex polygon - use fan triangulation
    if n <= 8 && is_convex(points) {
        return Ok(fan_triangulate(n));
    }

    // Flatten points for earcutr
    let mut vertices = Vec::with_capacity(n * 2);
    for p in points {
        vertices.push(p.x);
        vertices.push(p.y);
    }

    let indices = earcutr::earcut(&vertices, &[], 2)
        .map_err(|e| Error::TriangulationError(format!("{:?}", e)))?;

    Ok(indices)
}

/// Triangulate a polygon with holes
/// Returns triangle indices into the combined vertex array (outer + all holes)
#[inline]
pub fn triangulate_polygon_with_holes(
    outer: &[Point2<f64>],
    holes: &[Vec<Point2<f64>>],
) -> Result<Vec<usize>> {
    if outer.len() < 3 {
        return Err(Error::TriangulationError(
            "Need at least 3 points in outer boundary".to_string(),
        ));
    }

    // Holes must already be filtered by the caller so that offsets line up
    if holes.is_empty() {
        return triangulate_polygon(outer);
    }

    let total_points: usize = outer.len() + holes.iter().map(|h| h.len()).sum::<usize>();
    let mut vertices = Vec::with_capacity(total_points * 2);

    for p in outer {
        vertices.push(p.x);
        vertices.push(p.y);
    }

    // Add holes and track their start indices
    let mut hole_indices = Vec::with_capacity(holes.len());
    for hole in holes {
        hole_indices.push(vertices.len() / 2);
        for p in hole {
            vertices.push(p.x);
            vertices.push(p.y);
        }
    }

    let indices = earcutr::earcut(&vertices, &hole_indices, 2)
        .map_err(|e| Error::TriangulationError(format!("{:?}", e)))?;

    Ok(indices)
}

/// Polygon normal by Newell's method, `None` when the ring has no area.
///
/// Reversing the ring flips the sign of the result.
pub fn newell_normal(points: &[Point3<f64>]) -> Option<Vector3<f64>> {
    let n = points.len();
    if n < 3 {
        return None;
    }

    let mut normal = Vector3::<f64>::zeros();
    for i in 0..n {
        let current = &points[i];
        let next = &points[(i + 1) % n];

        normal.x += (current.y - next.y) * (current.z + next.z);
        normal.y += (current.z - next.z) * (current.x + next.x);
        normal.z += (current.x - next.x) * (current.y + next.y);
    }

    let len = normal.norm();
    (len.is_finite() && len > NORMAL_EPSILON).then(|| normal / len)
}

/// In-plane orthonormal basis for a unit normal.
///
/// Starts from the axis least parallel to the normal and removes its normal
/// component (one Gram-Schmidt step).
pub fn plane_basis(normal: &Vector3<f64>) -> (Vector3<f64>, Vector3<f64>) {
    let abs_x = normal.x.abs();
    let abs_y = normal.y.abs();
    let abs_z = normal.z.abs();

    let reference = if abs_x <= abs_y && abs_x <= abs_z {
        Vector3::new(1.0, 0.0, 0.0)
    } else if abs_y <= abs_z {
        Vector3::new(0.0, 1.0, 0.0)
    } else {
        Vector3::new(0.0, 0.0, 1.0)
    };

    let u_axis = (reference - normal * reference.dot(normal)).normalize();
    let v_axis = normal.cross(&u_axis);
    (u_axis, v_axis)
}

/// Project 3D points using an existing coordinate system
#[inline]
pub fn project_to_2d_with_basis(
    points_3d: &[Point3<f64>],
    u_axis: &Vector3<f64>,
    v_axis: &Vector3<f64>,
    origin: &Point3<f64>,
) -> Vec<Point2<f64>> {
    points_3d
        .iter()
        .map(|p| {
            let v = p - origin;
            Point2::new(v.dot(u_axis), v.dot(v_axis))
        })
        .collect()
}

#[inline]
fn point(vertices: &[Vertex], index: i64) -> Result<Point3<f64>> {
    usize::try_from(index)
        .ok()
        .and_then(|i| vertices.get(i))
        .map(|v| Point3::new(v[0], v[1], v[2]))
        .ok_or(Error::CoreError(CoreError::IndexOutOfRange {
            index,
            len: vertices.len(),
        }))
}

/// Triangulate one surface given as rings of vertex indices.
///
/// Returns a flat triangle list of indices into `vertices`. An empty surface
/// yields no triangles; rings with fewer than 3 indices are ignored. A
/// surface whose normal cannot be computed is reported as
/// [`Error::DegenerateSurface`].
pub fn triangulate_surface(rings: &[Vec<i64>], vertices: &[Vertex]) -> Result<Vec<usize>> {
    let Some(outer) = rings.first() else {
        return Ok(Vec::new());
    };
    if outer.len() < 3 {
        return Ok(Vec::new());
    }
    let holes: Vec<&Vec<i64>> = rings[1..].iter().filter(|r| r.len() >= 3).collect();

    // Local -> global index map over the flattened rings
    let mut local_to_global: Vec<usize> =
        Vec::with_capacity(outer.len() + holes.iter().map(|h| h.len()).sum::<usize>());
    let mut outer_points = Vec::with_capacity(outer.len());
    for &i in outer {
        outer_points.push(point(vertices, i)?);
        local_to_global.push(i as usize);
    }

    // FAST PATH: a lone triangle needs no projection
    if outer.len() == 3 && holes.is_empty() {
        return Ok(local_to_global);
    }

    let mut hole_points = Vec::with_capacity(holes.len());
    for hole in &holes {
        let mut pts = Vec::with_capacity(hole.len());
        for &i in hole.iter() {
            pts.push(point(vertices, i)?);
            local_to_global.push(i as usize);
        }
        hole_points.push(pts);
    }

    let normal = newell_normal(&outer_points).ok_or_else(|| {
        Error::DegenerateSurface(format!("ring {:?} has no area", outer))
    })?;
    let (u_axis, v_axis) = plane_basis(&normal);
    let origin = outer_points[0];

    let outer_2d = project_to_2d_with_basis(&outer_points, &u_axis, &v_axis, &origin);
    let holes_2d: Vec<Vec<Point2<f64>>> = hole_points
        .iter()
        .map(|h| project_to_2d_with_basis(h, &u_axis, &v_axis, &origin))
        .collect();

    let local = triangulate_polygon_with_holes(&outer_2d, &holes_2d)?;
    Ok(local.into_iter().map(|i| local_to_global[i]).collect())
}

/// Every polygon surface of a geometry, each as its list of rings.
///
/// Point and line geometries have no surfaces.
pub fn collect_surfaces(geometry_type: GeometryType, boundaries: &Boundary) -> Vec<Vec<Vec<i64>>> {
    if !geometry_type.has_surfaces() {
        return Vec::new();
    }
    // Levels above the surface list: MultiSurface 0, Solid 1, MultiSolid 2
    let levels = geometry_type.boundary_depth() - 3;

    let mut nodes: Vec<&Boundary> = vec![boundaries];
    for _ in 0..levels {
        nodes = nodes.into_iter().flat_map(|b| b.children().iter()).collect();
    }

    nodes
        .into_iter()
        .flat_map(|list| list.children().iter())
        .map(|surface| {
            surface
                .children()
                .iter()
                .filter_map(Boundary::as_ring)
                .collect()
        })
        .collect()
}

/// Triangulate every surface of a geometry into one flat triangle list.
///
/// Degenerate surfaces are skipped; invalid indices are errors.
pub fn triangulate_geometry(geometry: &Geometry, vertices: &[Vertex]) -> Result<Vec<usize>> {
    let mut triangles = Vec::new();
    for rings in collect_surfaces(geometry.geometry_type, &geometry.boundaries) {
        match triangulate_surface(&rings, vertices) {
            Ok(t) => triangles.extend(t),
            Err(Error::DegenerateSurface(_)) => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(triangles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square_with_hole() -> Vec<Vertex> {
        vec![
            [0.0, 0.0, 5.0],
            [10.0, 0.0, 5.0],
            [10.0, 10.0, 5.0],
            [0.0, 10.0, 5.0],
            [3.0, 3.0, 5.0],
            [3.0, 7.0, 5.0],
            [7.0, 7.0, 5.0],
            [7.0, 3.0, 5.0],
        ]
    }

    #[test]
    fn test_triangle_passes_through() {
        let v = vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        assert_eq!(triangulate_surface(&[vec![2, 0, 1]], &v).unwrap(), vec![2, 0, 1]);
    }

    #[test]
    fn test_convex_ngon_gives_n_minus_2() {
        for n in 4..=12usize {
            let v: Vec<Vertex> = (0..n)
                .map(|i| {
                    let a = i as f64 / n as f64 * std::f64::consts::TAU;
                    // A tilted plane, to exercise the projection
                    [a.cos(), a.sin(), 0.3 * a.cos() + 2.0]
                })
                .collect();
            let ring: Vec<i64> = (0..n as i64).collect();
            let tris = triangulate_surface(&[ring], &v).unwrap();
            assert_eq!(tris.len() / 3, n - 2, "n = {}", n);
            assert!(tris.iter().all(|&i| i < n));
        }
    }

    #[test]
    fn test_hole_indices_map_back() {
        let v = square_with_hole();
        let rings = vec![vec![0, 1, 2, 3], vec![4, 5, 6, 7]];
        let tris = triangulate_surface(&rings, &v).unwrap();
        assert_eq!(tris.len() % 3, 0);
        assert!(tris.len() > 6);
        // every hole vertex is used, all indices are global
        for hole_vertex in 4..8 {
            assert!(tris.contains(&hole_vertex));
        }
        assert!(tris.iter().all(|&i| i < v.len()));
    }

    #[test]
    fn test_collinear_ring_is_degenerate() {
        let v = vec![[0.0, 0.0, 0.0], [1.0, 1.0, 1.0], [2.0, 2.0, 2.0], [3.0, 3.0, 3.0]];
        let err = triangulate_surface(&[vec![0, 1, 2, 3]], &v).unwrap_err();
        assert!(matches!(err, Error::DegenerateSurface(_)));
    }

    #[test]
    fn test_empty_surface_has_no_faces() {
        assert!(triangulate_surface(&[], &[]).unwrap().is_empty());
        assert!(triangulate_surface(&[vec![0, 1]], &[[0.0; 3], [1.0; 3]]).unwrap().is_empty());
    }

    #[test]
    fn test_out_of_range_index() {
        let v = vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]];
        assert!(triangulate_surface(&[vec![0, 1, 5, 6]], &v).is_err());
    }

    #[test]
    fn test_newell_winding_flips_sign() {
        let pts: Vec<Point3<f64>> = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let n = newell_normal(&pts).unwrap();
        let mut rev = pts.clone();
        rev.reverse();
        let r = newell_normal(&rev).unwrap();
        assert_relative_eq!(n.z, 1.0);
        assert_relative_eq!(r.z, -1.0);
    }

    #[test]
    fn test_plane_basis_is_orthonormal() {
        let n = Vector3::new(1.0, 2.0, 3.0).normalize();
        let (u, v) = plane_basis(&n);
        assert_relative_eq!(u.norm(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(v.norm(), 1.0, epsilon = 1e-12);
        assert!(u.dot(&n).abs() < 1e-12);
        assert!(v.dot(&n).abs() < 1e-12);
        assert!(u.dot(&v).abs() < 1e-12);
    }

    #[test]
    fn test_collect_surfaces_of_solid() {
        let solid = Boundary::from(vec![
            vec![vec![vec![0i64, 1, 2, 3]], vec![vec![4i64, 5, 6], vec![7i64, 8, 9]]],
            vec![vec![vec![10i64, 11, 12]]],
        ]);
        let surfaces = collect_surfaces(GeometryType::Solid, &solid);
        assert_eq!(surfaces.len(), 3);
        assert_eq!(surfaces[1], vec![vec![4, 5, 6], vec![7, 8, 9]]);
        assert!(collect_surfaces(GeometryType::MultiLineString, &solid).is_empty());
    }

    #[test]
    fn test_geometry_skips_degenerate_surfaces() {
        let v = vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
            [2.0, 2.0, 0.0],
            [3.0, 3.0, 0.0],
        ];
        let geometry = Geometry::new(
            GeometryType::MultiSurface,
            2.0,
            Boundary::from(vec![vec![vec![0i64, 1, 2, 3]], vec![vec![0i64, 2, 4, 5]]]),
        );
        let tris = triangulate_geometry(&geometry, &v).unwrap();
        assert_eq!(tris.len(), 6);
        assert!(tris.iter().all(|&i| i < 4));
    }
}
