// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Axis-aligned bounds in f64 precision
//!
//! Serialized the CityJSON way, as `[minx, miny, minz, maxx, maxy, maxz]`.

use serde::{Deserialize, Serialize};

use crate::model::{Transform, Vertex};

/// Geographical extent of an object or model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 6]", into = "[f64; 6]")]
pub struct BBox {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl From<[f64; 6]> for BBox {
    fn from(v: [f64; 6]) -> Self {
        Self {
            min: [v[0], v[1], v[2]],
            max: [v[3], v[4], v[5]],
        }
    }
}

impl From<BBox> for [f64; 6] {
    fn from(b: BBox) -> Self {
        [b.min[0], b.min[1], b.min[2], b.max[0], b.max[1], b.max[2]]
    }
}

impl BBox {
    /// Create new bounds initialized to an invalid (inverted) state
    pub fn empty() -> Self {
        Self {
            min: [f64::INFINITY; 3],
            max: [f64::NEG_INFINITY; 3],
        }
    }

    /// Check if at least one point has been added
    #[inline]
    pub fn is_valid(&self) -> bool {
        (0..3).all(|i| self.min[i] <= self.max[i])
    }

    /// Expand bounds to include a point
    #[inline]
    pub fn expand(&mut self, p: Vertex) {
        for i in 0..3 {
            self.min[i] = self.min[i].min(p[i]);
            self.max[i] = self.max[i].max(p[i]);
        }
    }

    /// Expand bounds to include another box
    pub fn union(&mut self, other: &BBox) {
        if other.is_valid() {
            self.expand(other.min);
            self.expand(other.max);
        }
    }

    /// Bounds of a point set, `None` for an empty set
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Vertex>) -> Option<Self> {
        let mut bbox = Self::empty();
        for p in points {
            bbox.expand(*p);
        }
        bbox.is_valid().then_some(bbox)
    }

    /// Bounds of compressed vertices, converted to real-world coordinates.
    ///
    /// The scan runs in compressed space and only the two corners go through
    /// the transform. A negative scale component swaps that axis.
    pub fn from_compressed(vertices: &[Vertex], transform: &Transform) -> Option<Self> {
        let raw = Self::from_points(vertices)?;
        let a = transform.apply(raw.min);
        let b = transform.apply(raw.max);
        let mut out = Self::empty();
        out.expand(a);
        out.expand(b);
        Some(out)
    }

    #[inline]
    pub fn centroid(&self) -> [f64; 3] {
        [
            (self.min[0] + self.max[0]) / 2.0,
            (self.min[1] + self.max[1]) / 2.0,
            (self.min[2] + self.max[2]) / 2.0,
        ]
    }

    #[inline]
    pub fn to_array(&self) -> [f64; 6] {
        (*self).into()
    }
}
