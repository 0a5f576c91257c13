// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Boundary index utilities
//!
//! A CityJSON boundary is an arbitrarily nested array of vertex indices. Its
//! nesting depth is fixed by the geometry type (a MultiPoint is a flat list,
//! a Solid is shells of surfaces of rings). Everything here is a pure function
//! over that tree: nothing mutates its input.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Nested array of vertex indices.
///
/// Leaves are signed so that re-basing by any offset can always be undone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Boundary {
    Index(i64),
    Nested(Vec<Boundary>),
}

impl Default for Boundary {
    fn default() -> Self {
        Boundary::Nested(Vec::new())
    }
}

impl From<i64> for Boundary {
    fn from(index: i64) -> Self {
        Boundary::Index(index)
    }
}

impl<T: Into<Boundary>> From<Vec<T>> for Boundary {
    fn from(items: Vec<T>) -> Self {
        Boundary::Nested(items.into_iter().map(Into::into).collect())
    }
}

impl Boundary {
    /// True when the boundary holds no index at any depth
    pub fn is_empty(&self) -> bool {
        match self {
            Boundary::Index(_) => false,
            Boundary::Nested(children) => children.iter().all(Boundary::is_empty),
        }
    }

    /// Direct children of a nested boundary (empty for a leaf)
    #[inline]
    pub fn children(&self) -> &[Boundary] {
        match self {
            Boundary::Index(_) => &[],
            Boundary::Nested(children) => children,
        }
    }

    /// Leaf index if this node is a leaf
    #[inline]
    pub fn as_index(&self) -> Option<i64> {
        match self {
            Boundary::Index(i) => Some(*i),
            Boundary::Nested(_) => None,
        }
    }

    /// Flat list of indices when every child is a leaf (a ring or a point list)
    pub fn as_ring(&self) -> Option<Vec<i64>> {
        self.children().iter().map(Boundary::as_index).collect()
    }

    /// Deepest leaf depth, `None` when no leaf exists
    pub fn depth(&self) -> Option<usize> {
        match self {
            Boundary::Index(_) => Some(0),
            Boundary::Nested(children) => children
                .iter()
                .filter_map(Boundary::depth)
                .max()
                .map(|d| d + 1),
        }
    }

    /// Check that every leaf sits exactly `expected` levels down.
    ///
    /// Empty arrays are accepted at any level above the leaves.
    pub fn has_depth(&self, expected: usize) -> bool {
        match self {
            Boundary::Index(_) => expected == 0,
            Boundary::Nested(children) => {
                expected > 0 && children.iter().all(|c| c.has_depth(expected - 1))
            }
        }
    }

    /// Visit every leaf index in document order
    pub fn for_each_index(&self, f: &mut impl FnMut(i64)) {
        match self {
            Boundary::Index(i) => f(*i),
            Boundary::Nested(children) => {
                for child in children {
                    child.for_each_index(f);
                }
            }
        }
    }

    /// All leaf indices in document order
    pub fn leaf_indices(&self) -> Vec<i64> {
        let mut out = Vec::new();
        self.for_each_index(&mut |i| out.push(i));
        out
    }

    /// Structure-preserving copy with every leaf passed through `f`
    pub fn map_indices(&self, f: &mut impl FnMut(i64) -> i64) -> Boundary {
        match self {
            Boundary::Index(i) => Boundary::Index(f(*i)),
            Boundary::Nested(children) => {
                Boundary::Nested(children.iter().map(|c| c.map_indices(f)).collect())
            }
        }
    }
}

/// Smallest and largest leaf index, folded into the given seeds.
///
/// An empty boundary returns the seeds unchanged.
pub fn scan_extreme_indices(boundary: &Boundary, min_so_far: i64, max_so_far: i64) -> (i64, i64) {
    match boundary {
        Boundary::Index(i) => (min_so_far.min(*i), max_so_far.max(*i)),
        Boundary::Nested(children) => children
            .iter()
            .fold((min_so_far, max_so_far), |(lo, hi), child| {
                scan_extreme_indices(child, lo, hi)
            }),
    }
}

/// Extreme indices over several boundaries, `None` if none holds an index
pub fn extreme_indices<'a>(
    boundaries: impl IntoIterator<Item = &'a Boundary>,
) -> Option<(i64, i64)> {
    let (lo, hi) = boundaries
        .into_iter()
        .fold((i64::MAX, i64::MIN), |(lo, hi), b| scan_extreme_indices(b, lo, hi));
    (lo <= hi).then_some((lo, hi))
}

/// Subtract `offset` from every leaf index
#[inline]
pub fn rebase(boundary: &Boundary, offset: i64) -> Boundary {
    boundary.map_indices(&mut |i| i - offset)
}

/// First index inside `[min, max]` that no boundary references
pub fn first_unreferenced<'a>(
    boundaries: impl IntoIterator<Item = &'a Boundary>,
    min: i64,
    max: i64,
) -> Option<i64> {
    if max < min {
        return None;
    }
    let mut seen = vec![false; (max - min + 1) as usize];
    for boundary in boundaries {
        boundary.for_each_index(&mut |i| {
            if (min..=max).contains(&i) {
                seen[(i - min) as usize] = true;
            }
        });
    }
    seen.iter().position(|s| !s).map(|p| min + p as i64)
}

/// Dense renumbering of the indices referenced by a set of boundaries.
///
/// Indices are numbered in first-seen order, so `order[new] == old`.
#[derive(Debug, Clone, Default)]
pub struct IndexRemap {
    pub order: Vec<i64>,
    lookup: FxHashMap<i64, i64>,
}

impl IndexRemap {
    pub fn from_boundaries<'a>(boundaries: impl IntoIterator<Item = &'a Boundary>) -> Self {
        let mut remap = IndexRemap::default();
        for boundary in boundaries {
            boundary.for_each_index(&mut |i| {
                if !remap.lookup.contains_key(&i) {
                    remap.lookup.insert(i, remap.order.len() as i64);
                    remap.order.push(i);
                }
            });
        }
        remap
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Rewrite a boundary into the dense numbering.
    ///
    /// Indices the remap has never seen are left untouched.
    pub fn apply(&self, boundary: &Boundary) -> Boundary {
        boundary.map_indices(&mut |i| self.lookup.get(&i).copied().unwrap_or(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid() -> Boundary {
        // one shell, two surfaces, outer ring each
        Boundary::from(vec![vec![
            vec![vec![10i64, 11, 12, 13]],
            vec![vec![13i64, 12, 14]],
        ]])
    }

    #[test]
    fn test_scan_extreme_indices() {
        let (lo, hi) = scan_extreme_indices(&solid(), i64::MAX, i64::MIN);
        assert_eq!((lo, hi), (10, 14));
    }

    #[test]
    fn test_scan_empty_returns_seeds() {
        let empty = Boundary::from(Vec::<Vec<i64>>::new());
        assert_eq!(scan_extreme_indices(&empty, 7, 3), (7, 3));
        assert_eq!(extreme_indices([&empty]), None);
    }

    #[test]
    fn test_rebase_round_trip() {
        let original = solid();
        assert_eq!(rebase(&original, 0), original);
        for k in [-25i64, -1, 3, 10, 1_000_000] {
            assert_eq!(rebase(&rebase(&original, k), -k), original);
        }
    }

    #[test]
    fn test_rebase_preserves_structure() {
        let rebased = rebase(&solid(), 10);
        assert_eq!(
            rebased,
            Boundary::from(vec![vec![vec![vec![0i64, 1, 2, 3]], vec![vec![3i64, 2, 4]]]])
        );
    }

    #[test]
    fn test_depth_checks() {
        let points = Boundary::from(vec![1i64, 2, 3]);
        assert!(points.has_depth(1));
        assert!(!points.has_depth(2));
        assert_eq!(solid().depth(), Some(4));
        assert!(solid().has_depth(4));

        // Empty shell at depth 4 is depth-neutral
        let partial = Boundary::from(vec![Boundary::Nested(vec![])]);
        assert!(partial.has_depth(4));
    }

    #[test]
    fn test_json_shape() {
        let b: Boundary = serde_json::from_str("[[[0,1,2]],[[2,3,0]]]").unwrap();
        assert!(b.has_depth(3));
        assert_eq!(serde_json::to_string(&b).unwrap(), "[[[0,1,2]],[[2,3,0]]]");
    }

    #[test]
    fn test_first_unreferenced() {
        let b = Boundary::from(vec![vec![vec![4i64, 5, 7]]]);
        assert_eq!(first_unreferenced([&b], 4, 7), Some(6));
        assert_eq!(first_unreferenced([&solid()], 10, 14), None);
    }

    #[test]
    fn test_index_remap_first_seen_order() {
        let b = Boundary::from(vec![vec![vec![40i64, 7, 40, 19]]]);
        let remap = IndexRemap::from_boundaries([&b]);
        assert_eq!(remap.order, vec![40, 7, 19]);
        assert_eq!(remap.apply(&b), Boundary::from(vec![vec![vec![0i64, 1, 0, 2]]]));
    }
}
