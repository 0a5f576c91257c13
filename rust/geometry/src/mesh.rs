// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mesh data structures and the per-object mesh builder

use cityjson_lite_core::{CityObject, Vertex};
use nalgebra::{Point3, Vector3};
use rayon::prelude::*;

use crate::triangulation::{collect_surfaces, newell_normal, triangulate_surface};
use crate::{Error, Result};

/// Real-world origin of a mesh.
///
/// CityJSON vertices decompress to projected coordinates (UTM northings of
/// millions of metres). Meshes store positions relative to this point,
/// normally the object's extent centroid, so they survive the f32 cast.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CoordinateShift {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl CoordinateShift {
    #[inline]
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Positions are already real-world coordinates
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0 && self.z == 0.0
    }
}

/// Triangle mesh
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    /// Vertex positions (x, y, z)
    pub positions: Vec<f32>,
    /// Vertex normals (nx, ny, nz)
    pub normals: Vec<f32>,
    /// Triangle indices (i0, i1, i2)
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a real-world vertex and its normal. The shift is subtracted in
    /// f64, before the f32 cast.
    #[inline]
    pub fn add_vertex_with_shift(
        &mut self,
        position: Point3<f64>,
        normal: Vector3<f64>,
        shift: &CoordinateShift,
    ) {
        self.positions.push((position.x - shift.x) as f32);
        self.positions.push((position.y - shift.y) as f32);
        self.positions.push((position.z - shift.z) as f32);

        self.normals.push(normal.x as f32);
        self.normals.push(normal.y as f32);
        self.normals.push(normal.z as f32);
    }

    #[inline]
    pub fn add_triangle(&mut self, i0: u32, i1: u32, i2: u32) {
        self.indices.push(i0);
        self.indices.push(i1);
        self.indices.push(i2);
    }

    /// Batch merge multiple meshes at once
    pub fn merge_all(&mut self, meshes: &[Mesh]) {
        let total_positions: usize = meshes.iter().map(|m| m.positions.len()).sum();
        let total_indices: usize = meshes.iter().map(|m| m.indices.len()).sum();

        self.positions.reserve(total_positions);
        self.normals.reserve(total_positions);
        self.indices.reserve(total_indices);

        for mesh in meshes {
            if !mesh.is_empty() {
                let vertex_offset = (self.positions.len() / 3) as u32;
                self.positions.extend_from_slice(&mesh.positions);
                self.normals.extend_from_slice(&mesh.normals);
                self.indices.extend(mesh.indices.iter().map(|&i| i + vertex_offset));
            }
        }
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Corners of the positions, relative to the mesh's shift; the origin
    /// twice for an empty mesh
    pub fn bounds(&self) -> (Point3<f32>, Point3<f32>) {
        let mut points = self
            .positions
            .chunks_exact(3)
            .map(|p| Point3::new(p[0], p[1], p[2]));
        let Some(first) = points.next() else {
            return (Point3::origin(), Point3::origin());
        };
        points.fold((first, first), |(lo, hi), p| (lo.inf(&p), hi.sup(&p)))
    }
}

/// Render mesh of one city object
#[derive(Debug, Clone, Default)]
pub struct ObjectMesh {
    pub uid: String,
    pub mesh: Mesh,
    /// Add back to `mesh.positions` for real-world coordinates
    pub shift: CoordinateShift,
    /// Surfaces left out because their normal is undefined
    pub skipped_surfaces: usize,
}

/// Flat-shaded mesh of one surface: its own copy of each vertex it uses
fn surface_mesh(
    rings: &[Vec<i64>],
    world: &[Vertex],
    shift: &CoordinateShift,
) -> Result<Mesh> {
    let triangles = triangulate_surface(rings, world)?;
    if triangles.is_empty() {
        return Ok(Mesh::new());
    }

    let outer: Vec<Point3<f64>> = rings[0]
        .iter()
        .map(|&i| {
            let v = world[i as usize];
            Point3::new(v[0], v[1], v[2])
        })
        .collect();
    let normal = newell_normal(&outer)
        .ok_or_else(|| Error::DegenerateSurface(format!("ring {:?} has no area", rings[0])))?;

    let mut used = triangles.clone();
    used.sort_unstable();
    used.dedup();

    let mut mesh = Mesh::new();
    for &i in &used {
        let v = world[i];
        mesh.add_vertex_with_shift(Point3::new(v[0], v[1], v[2]), normal, shift);
    }
    let local = |g: usize| -> Result<u32> {
        used.binary_search(&g).map(|i| i as u32).map_err(|_| {
            Error::TriangulationError(format!("triangle vertex {} was not emitted", g))
        })
    };
    for t in triangles.chunks_exact(3) {
        mesh.add_triangle(local(t[0])?, local(t[1])?, local(t[2])?);
    }
    Ok(mesh)
}

/// Build the render mesh of an object from its highest-lod geometry.
///
/// Positions are real-world coordinates minus the extent centroid.
/// Degenerate surfaces are skipped and counted.
pub fn build_object_mesh(object: &CityObject) -> Result<ObjectMesh> {
    let world = object.world_vertices();
    let shift = object
        .geographical_extent
        .map(|b| {
            let c = b.centroid();
            CoordinateShift::new(c[0], c[1], c[2])
        })
        .unwrap_or_default();

    let Some(geometry) = object.highest_lod_index().map(|i| &object.geometry[i]) else {
        return Ok(ObjectMesh {
            uid: object.uid.clone(),
            shift,
            ..Default::default()
        });
    };

    let surfaces = collect_surfaces(geometry.geometry_type, &geometry.boundaries);
    let results: Vec<Result<Mesh>> = surfaces
        .par_iter()
        .map(|rings| surface_mesh(rings, &world, &shift))
        .collect();

    let mut meshes = Vec::with_capacity(results.len());
    let mut skipped_surfaces = 0;
    for result in results {
        match result {
            Ok(m) => meshes.push(m),
            Err(Error::DegenerateSurface(_)) => skipped_surfaces += 1,
            Err(e) => return Err(e),
        }
    }

    let mut mesh = Mesh::new();
    mesh.merge_all(&meshes);

    Ok(ObjectMesh {
        uid: object.uid.clone(),
        mesh,
        shift,
        skipped_surfaces,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use cityjson_lite_core::{BBox, Boundary, CityObjectType, Geometry, GeometryType, Transform};

    fn cube_object() -> CityObject {
        let vertices: Vec<Vertex> = vec![
            [0.0, 0.0, 0.0],
            [10.0, 0.0, 0.0],
            [10.0, 10.0, 0.0],
            [0.0, 10.0, 0.0],
            [0.0, 0.0, 10.0],
            [10.0, 0.0, 10.0],
            [10.0, 10.0, 10.0],
            [0.0, 10.0, 10.0],
        ];
        let shell = vec![
            vec![vec![0i64, 3, 2, 1]],
            vec![vec![4i64, 5, 6, 7]],
            vec![vec![0i64, 1, 5, 4]],
            vec![vec![1i64, 2, 6, 5]],
            vec![vec![2i64, 3, 7, 6]],
            vec![vec![3i64, 0, 4, 7]],
        ];
        let transform = Transform {
            scale: [0.1, 0.1, 0.1],
            translate: [500_000.0, 5_000_000.0, 0.0],
        };
        let extent = BBox::from_compressed(&vertices, &transform);
        CityObject {
            uid: "cube".to_string(),
            object_type: CityObjectType::Building,
            parents: vec![],
            children: vec![],
            vertices,
            geometry: vec![
                Geometry::new(
                    GeometryType::MultiSurface,
                    1.0,
                    Boundary::from(vec![vec![vec![0i64, 1, 2, 3]]]),
                ),
                Geometry::new(GeometryType::Solid, 2.0, Boundary::from(vec![shell])),
            ],
            geographical_extent: extent,
            attributes: Default::default(),
            transform,
            spatial_index: true,
        }
    }

    #[test]
    fn test_cube_mesh() {
        let out = build_object_mesh(&cube_object()).unwrap();
        assert_eq!(out.uid, "cube");
        // Highest lod is the solid: 6 quads, 4 vertices each
        assert_eq!(out.mesh.triangle_count(), 12);
        assert_eq!(out.mesh.vertex_count(), 24);
        assert_eq!(out.skipped_surfaces, 0);
        assert!(out.mesh.normals.iter().all(|n| n.is_finite()));
        assert_relative_eq!(out.shift.x, 500_000.5);
        assert_relative_eq!(out.shift.y, 5_000_000.5);
    }

    #[test]
    fn test_positions_are_shifted_world_coordinates() {
        let out = build_object_mesh(&cube_object()).unwrap();
        let (min, max) = out.mesh.bounds();
        assert_relative_eq!(min.x, -0.5);
        assert_relative_eq!(max.x, 0.5);
        assert_relative_eq!(max.z - min.z, 1.0);
    }

    #[test]
    fn test_degenerate_surface_is_counted() {
        let mut object = cube_object();
        object.geometry = vec![Geometry::new(
            GeometryType::MultiSurface,
            2.0,
            Boundary::from(vec![vec![vec![0i64, 1, 2, 3]], vec![vec![0i64, 1, 0, 1]]]),
        )];
        let out = build_object_mesh(&object).unwrap();
        assert_eq!(out.skipped_surfaces, 1);
        assert_eq!(out.mesh.triangle_count(), 2);
    }

    #[test]
    fn test_object_without_geometry() {
        let mut object = cube_object();
        object.geometry.clear();
        let out = build_object_mesh(&object).unwrap();
        assert!(out.mesh.is_empty());
    }

    #[test]
    fn test_merge_all_offsets_indices() {
        let mut a = Mesh::new();
        let shift = CoordinateShift::default();
        for p in [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]] {
            a.add_vertex_with_shift(Point3::new(p[0], p[1], p[2]), Vector3::z(), &shift);
        }
        a.add_triangle(0, 1, 2);
        let mut merged = Mesh::new();
        merged.merge_all(&[a.clone(), Mesh::new(), a]);
        assert_eq!(merged.vertex_count(), 6);
        assert_eq!(merged.indices, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_surface_mesh_renumbers_sparse_indices() {
        let mut world: Vec<Vertex> = vec![[99.0, 99.0, 99.0]; 10];
        world[2] = [0.0, 0.0, 0.0];
        world[5] = [4.0, 0.0, 0.0];
        world[9] = [4.0, 3.0, 0.0];
        world[7] = [0.0, 3.0, 0.0];

        let mesh = surface_mesh(&[vec![9, 7, 2, 5]], &world, &CoordinateShift::default()).unwrap();
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.triangle_count(), 2);
        assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.vertex_count()));
        // Vertices are emitted in ascending global order: 2, 5, 7, 9
        assert_eq!(&mesh.positions[3..6], &[4.0, 0.0, 0.0]);

        let (min, max) = mesh.bounds();
        assert_eq!(min, Point3::new(0.0, 0.0, 0.0));
        assert_eq!(max, Point3::new(4.0, 3.0, 0.0));
    }

    #[test]
    fn test_empty_mesh_bounds() {
        let (min, max) = Mesh::new().bounds();
        assert_eq!(min, Point3::origin());
        assert_eq!(max, Point3::origin());
    }
}
