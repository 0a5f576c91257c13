// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! CityJSON document model
//!
//! Two families of types live here: the raw document as it arrives
//! ([`CityJsonDocument`], [`RawCityObject`]) where every object indexes the
//! shared vertex pool, and the decomposed [`CityObject`] which owns its
//! vertices and carries its own extent and transform.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::bbox::BBox;
use crate::boundary::Boundary;
use crate::error::{Error, Result};
use crate::kind::CityObjectType;

/// A vertex, compressed (integer-valued) or real-world depending on context
pub type Vertex = [f64; 3];

/// Scalar attribute map attached to city objects
pub type Attributes = Map<String, Value>;

/// Affine transform decompressing vertices: `real = v * scale + translate`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub scale: [f64; 3],
    pub translate: [f64; 3],
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    pub fn identity() -> Self {
        Self {
            scale: [1.0; 3],
            translate: [0.0; 3],
        }
    }

    /// Compressed to real-world coordinates
    #[inline]
    pub fn apply(&self, v: Vertex) -> Vertex {
        [
            v[0] * self.scale[0] + self.translate[0],
            v[1] * self.scale[1] + self.translate[1],
            v[2] * self.scale[2] + self.translate[2],
        ]
    }

    /// Reject zero or non-finite scale and non-finite translate
    pub fn validate(&self) -> Result<()> {
        if self.scale.iter().any(|s| !s.is_finite() || *s == 0.0) {
            return Err(Error::MissingTransform(format!(
                "scale {:?} must be finite and non-zero",
                self.scale
            )));
        }
        if self.translate.iter().any(|t| !t.is_finite()) {
            return Err(Error::MissingTransform(format!(
                "translate {:?} must be finite",
                self.translate
            )));
        }
        Ok(())
    }
}

/// Transform as written in the file, checked for arity before use
#[derive(Debug, Clone, Deserialize)]
struct RawTransform {
    #[serde(default)]
    scale: Vec<f64>,
    #[serde(default)]
    translate: Vec<f64>,
}

impl TryFrom<RawTransform> for Transform {
    type Error = Error;

    fn try_from(raw: RawTransform) -> Result<Self> {
        let scale: [f64; 3] = raw.scale.as_slice().try_into().map_err(|_| {
            Error::MissingTransform(format!("scale has {} components, expected 3", raw.scale.len()))
        })?;
        let translate: [f64; 3] = raw.translate.as_slice().try_into().map_err(|_| {
            Error::MissingTransform(format!(
                "translate has {} components, expected 3",
                raw.translate.len()
            ))
        })?;
        let t = Transform { scale, translate };
        t.validate()?;
        Ok(t)
    }
}

/// Geometry primitive types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryType {
    MultiPoint,
    MultiLineString,
    MultiSurface,
    CompositeSurface,
    Solid,
    MultiSolid,
    CompositeSolid,
    GeometryInstance,
}

impl GeometryType {
    pub const ALL: [GeometryType; 8] = [
        GeometryType::MultiPoint,
        GeometryType::MultiLineString,
        GeometryType::MultiSurface,
        GeometryType::CompositeSurface,
        GeometryType::Solid,
        GeometryType::MultiSolid,
        GeometryType::CompositeSolid,
        GeometryType::GeometryInstance,
    ];

    /// Nesting depth of the boundary array for this type
    pub fn boundary_depth(self) -> usize {
        match self {
            GeometryType::MultiPoint | GeometryType::GeometryInstance => 1,
            GeometryType::MultiLineString => 2,
            GeometryType::MultiSurface | GeometryType::CompositeSurface => 3,
            GeometryType::Solid => 4,
            GeometryType::MultiSolid | GeometryType::CompositeSolid => 5,
        }
    }

    /// Whether the boundary bottoms out in polygon surfaces
    pub fn has_surfaces(self) -> bool {
        matches!(
            self,
            GeometryType::MultiSurface
                | GeometryType::CompositeSurface
                | GeometryType::Solid
                | GeometryType::MultiSolid
                | GeometryType::CompositeSolid
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GeometryType::MultiPoint => "MultiPoint",
            GeometryType::MultiLineString => "MultiLineString",
            GeometryType::MultiSurface => "MultiSurface",
            GeometryType::CompositeSurface => "CompositeSurface",
            GeometryType::Solid => "Solid",
            GeometryType::MultiSolid => "MultiSolid",
            GeometryType::CompositeSolid => "CompositeSolid",
            GeometryType::GeometryInstance => "GeometryInstance",
        }
    }
}

impl fmt::Display for GeometryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Level of detail.
///
/// CityJSON 1.0 writes it as a number, 1.1 as a string such as `"2.2"`.
/// Both are read; it is always written back as a number.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Lod(pub f64);

impl Serialize for Lod {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.0)
    }
}

impl<'de> Deserialize<'de> for Lod {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum LodRepr {
            Number(f64),
            Text(String),
        }

        match LodRepr::deserialize(deserializer)? {
            LodRepr::Number(n) if n.is_finite() => Ok(Lod(n)),
            LodRepr::Number(n) => Err(serde::de::Error::custom(format!("invalid lod {}", n))),
            LodRepr::Text(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(Lod)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid lod '{}'", s))),
        }
    }
}

/// A semantic surface, e.g. `RoofSurface`, with arbitrary extra attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticSurface {
    #[serde(rename = "type")]
    pub surface_type: String,
    #[serde(flatten)]
    pub attributes: Attributes,
}

/// Semantic surfaces and the per-primitive index array pointing at them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Semantics {
    #[serde(default)]
    pub surfaces: Vec<SemanticSurface>,
    /// Nested like the boundary minus its innermost level, `null` for none
    #[serde(default)]
    pub values: Value,
}

/// One geometry of a city object.
///
/// `template` and `transformation_matrix` are only present on a
/// `GeometryInstance`; use [`Geometry::instance`] to read them validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Geometry {
    #[serde(rename = "type")]
    pub geometry_type: GeometryType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lod: Option<Lod>,
    #[serde(default)]
    pub boundaries: Boundary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantics: Option<Semantics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub texture: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformation_matrix: Option<Vec<f64>>,
}

impl Geometry {
    pub fn new(geometry_type: GeometryType, lod: f64, boundaries: Boundary) -> Self {
        Self {
            geometry_type,
            lod: Some(Lod(lod)),
            boundaries,
            semantics: None,
            material: None,
            texture: None,
            template: None,
            transformation_matrix: None,
        }
    }

    #[inline]
    pub fn is_instance(&self) -> bool {
        self.geometry_type == GeometryType::GeometryInstance
    }

    /// Numeric level of detail, 0 when absent
    #[inline]
    pub fn lod_value(&self) -> f64 {
        self.lod.map(|l| l.0).unwrap_or(0.0)
    }

    /// Check the boundary nesting against the geometry type
    pub fn validate_depth(&self) -> Result<()> {
        let expected = self.geometry_type.boundary_depth();
        // An instance anchor may be written as [i] or [[i]]
        let ok = self.boundaries.has_depth(expected)
            || (self.is_instance() && self.boundaries.has_depth(2));
        if ok {
            Ok(())
        } else {
            Err(Error::BoundaryDepth {
                geometry_type: self.geometry_type.to_string(),
                expected,
                found: self.boundaries.depth().unwrap_or(0),
            })
        }
    }

    /// Read the instancing fields of a `GeometryInstance`
    pub fn instance(&self) -> Result<GeometryInstance> {
        if !self.is_instance() {
            return Err(Error::invalid(format!(
                "{} is not a GeometryInstance",
                self.geometry_type
            )));
        }
        let template = self
            .template
            .ok_or_else(|| Error::invalid("GeometryInstance missing template"))?;
        let matrix = self
            .transformation_matrix
            .as_deref()
            .ok_or_else(|| Error::invalid("GeometryInstance missing transformationMatrix"))?;
        if matrix.is_empty() || matrix.len() % 16 != 0 {
            return Err(Error::invalid(format!(
                "transformationMatrix has {} values, expected a multiple of 16",
                matrix.len()
            )));
        }
        let anchor = self
            .boundaries
            .leaf_indices()
            .first()
            .copied()
            .ok_or_else(|| Error::invalid("GeometryInstance has no anchor point"))?;

        let mut m = [0.0; 16];
        m.copy_from_slice(&matrix[..16]);
        Ok(GeometryInstance {
            template,
            anchor,
            matrix: m,
        })
    }
}

/// Validated instancing parameters of a `GeometryInstance`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryInstance {
    /// Index into the model's template list
    pub template: i64,
    /// Index into the shared vertex pool where the template is placed
    pub anchor: i64,
    /// Row-major 4x4 matrix
    pub matrix: [f64; 16],
}

/// Template geometries with their own vertex pool
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeometryTemplates {
    #[serde(default)]
    pub templates: Vec<Geometry>,
    #[serde(rename = "vertices-templates", default)]
    pub vertices: Vec<Vertex>,
}

/// Model-level metadata. Keys other than extent and CRS are kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geographical_extent: Option<BBox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_system: Option<String>,
    #[serde(flatten)]
    pub other: Attributes,
}

/// A city object as found in the document, indexing the shared pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCityObject {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default)]
    pub geometry: Vec<Geometry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geographical_extent: Option<BBox>,
}

impl RawCityObject {
    /// Parse one entry of `CityObjects`
    pub fn from_value(uid: &str, value: &Value) -> Result<Self> {
        RawCityObject::deserialize(value).map_err(|e| Error::InvalidObject {
            uid: uid.to_string(),
            reason: e.to_string(),
        })
    }
}

/// A whole CityJSON document before decomposition.
///
/// City objects stay untyped until [`RawCityObject::from_value`], so a
/// malformed object does not make the document unreadable.
#[derive(Debug, Clone, Deserialize)]
pub struct CityJsonDocument {
    #[serde(rename = "type")]
    pub doc_type: String,
    #[serde(default)]
    pub version: String,
    #[serde(rename = "CityObjects", default)]
    pub city_objects: BTreeMap<String, Value>,
    #[serde(default)]
    pub vertices: Vec<Vertex>,
    #[serde(default)]
    transform: Option<RawTransform>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(rename = "geometry-templates", default)]
    pub geometry_templates: Option<GeometryTemplates>,
}

impl CityJsonDocument {
    pub fn from_value(value: Value) -> Result<Self> {
        let doc: CityJsonDocument = serde_json::from_value(value)?;
        doc.check_type()?;
        Ok(doc)
    }

    pub fn parse_str(content: &str) -> Result<Self> {
        let doc: CityJsonDocument = serde_json::from_str(content)?;
        doc.check_type()?;
        Ok(doc)
    }

    fn check_type(&self) -> Result<()> {
        if self.doc_type != "CityJSON" {
            return Err(Error::invalid(format!(
                "expected type 'CityJSON', found '{}'",
                self.doc_type
            )));
        }
        Ok(())
    }

    /// The model transform; required for decomposition
    pub fn transform(&self) -> Result<Transform> {
        let raw = self
            .transform
            .clone()
            .ok_or_else(|| Error::MissingTransform("document has no 'transform'".into()))?;
        Transform::try_from(raw)
    }
}

/// A decomposed, self-contained city object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CityObject {
    pub uid: String,
    #[serde(rename = "type")]
    pub object_type: CityObjectType,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub children: Vec<String>,
    /// Private vertices, compressed; decompress with `transform`
    #[serde(default)]
    pub vertices: Vec<Vertex>,
    #[serde(default)]
    pub geometry: Vec<Geometry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geographical_extent: Option<BBox>,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default)]
    pub transform: Transform,
    #[serde(default)]
    pub spatial_index: bool,
}

impl CityObject {
    /// Index of the geometry with the largest lod, first seen on ties
    pub fn highest_lod_index(&self) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (i, g) in self.geometry.iter().enumerate() {
            let lod = g.lod_value();
            match best {
                Some((_, b)) if lod <= b => {}
                _ => best = Some((i, lod)),
            }
        }
        best.map(|(i, _)| i)
    }

    /// Copy keeping only the highest-lod geometry
    pub fn with_highest_lod(&self) -> CityObject {
        let mut out = self.clone();
        out.geometry = self
            .highest_lod_index()
            .map(|i| vec![self.geometry[i].clone()])
            .unwrap_or_default();
        out
    }

    /// Vertices decompressed to real-world coordinates
    pub fn world_vertices(&self) -> Vec<Vertex> {
        self.vertices.iter().map(|v| self.transform.apply(*v)).collect()
    }
}
