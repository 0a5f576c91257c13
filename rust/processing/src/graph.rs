// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Parent/child graph over the city objects of one model.
//!
//! Each `parent -> child` edge is stored once; both adjacency directions
//! index into the same edge list, so `parents` and `children` can never
//! disagree. Records in the store repeat the edges as `parents` and
//! `children` uid lists, and [`unlink_records`] patches both sides together.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::error::StoreError;
use crate::registry::{MODEL_FIELD, UID_FIELD};
use crate::store::{DocumentStore, Filter, Patch};

/// A parent-to-child edge between node indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphEdge {
    pub parent: usize,
    pub child: usize,
}

/// Claim on a uid that is not part of the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingRef {
    /// Object making the claim
    pub uid: String,
    pub target: String,
}

#[derive(Debug, Default, Clone)]
pub struct ObjectGraph {
    nodes: Vec<String>,
    key_to_node: FxHashMap<String, usize>,
    /// Edge slots in link order; `None` once unlinked
    edges: Vec<Option<GraphEdge>>,
    edge_index: FxHashMap<(usize, usize), usize>,
    /// node -> edge slots where it is the parent
    outgoing: Vec<Vec<usize>>,
    /// node -> edge slots where it is the child
    incoming: Vec<Vec<usize>>,
}

impl ObjectGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the untyped `CityObjects` entries of a document.
    ///
    /// An edge claimed by either side is linked on both. Claims on uids that
    /// are not in `objects` are returned, one per referring object and target.
    /// Non-string entries are ignored here; the object fails when parsed.
    pub fn from_objects(objects: &BTreeMap<String, Value>) -> (Self, Vec<DanglingRef>) {
        let links: Vec<(&str, Vec<String>, Vec<String>)> = objects
            .iter()
            .map(|(uid, o)| (uid.as_str(), uid_list(o, "children"), uid_list(o, "parents")))
            .collect();
        Self::from_claims(
            links
                .iter()
                .map(|(uid, children, parents)| (*uid, children.as_slice(), parents.as_slice())),
        )
    }

    /// Build from `(uid, children, parents)` claims
    pub fn from_claims<'a>(
        claims: impl IntoIterator<Item = (&'a str, &'a [String], &'a [String])> + Clone,
    ) -> (Self, Vec<DanglingRef>) {
        let mut graph = Self::new();
        for (uid, _, _) in claims.clone() {
            graph.add_node(uid);
        }

        let mut dangling = Vec::new();
        for (uid, children, parents) in claims {
            for child in children {
                if !graph.link(uid, child) && !graph.contains(child) {
                    dangling.push(DanglingRef {
                        uid: uid.to_string(),
                        target: child.clone(),
                    });
                }
            }
            for parent in parents {
                if !graph.link(parent, uid) && !graph.contains(parent) {
                    dangling.push(DanglingRef {
                        uid: uid.to_string(),
                        target: parent.clone(),
                    });
                }
            }
        }
        (graph, dangling)
    }

    /// Add a node, returning its index. Existing nodes keep theirs.
    pub fn add_node(&mut self, uid: &str) -> usize {
        if let Some(&i) = self.key_to_node.get(uid) {
            return i;
        }
        let i = self.nodes.len();
        self.nodes.push(uid.to_string());
        self.key_to_node.insert(uid.to_string(), i);
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
        i
    }

    #[inline]
    pub fn contains(&self, uid: &str) -> bool {
        self.key_to_node.contains_key(uid)
    }

    #[inline]
    pub fn edge_count(&self) -> usize {
        self.edge_index.len()
    }

    /// Link `parent -> child`. Returns false when either node is unknown,
    /// the edge already exists or it would be a self-loop.
    pub fn link(&mut self, parent: &str, child: &str) -> bool {
        let (Some(&p), Some(&c)) = (self.key_to_node.get(parent), self.key_to_node.get(child))
        else {
            return false;
        };
        if p == c || self.edge_index.contains_key(&(p, c)) {
            return false;
        }
        let slot = self.edges.len();
        self.edges.push(Some(GraphEdge { parent: p, child: c }));
        self.edge_index.insert((p, c), slot);
        self.outgoing[p].push(slot);
        self.incoming[c].push(slot);
        true
    }

    /// Remove the edge from both adjacency lists
    pub fn unlink(&mut self, parent: &str, child: &str) -> bool {
        let (Some(&p), Some(&c)) = (self.key_to_node.get(parent), self.key_to_node.get(child))
        else {
            return false;
        };
        let Some(slot) = self.edge_index.remove(&(p, c)) else {
            return false;
        };
        self.edges[slot] = None;
        self.outgoing[p].retain(|&e| e != slot);
        self.incoming[c].retain(|&e| e != slot);
        true
    }

    /// Drop every edge touching `uid`; returns the edges removed as
    /// `(parent, child)` uid pairs
    pub fn remove_node(&mut self, uid: &str) -> Vec<(String, String)> {
        let Some(&n) = self.key_to_node.get(uid) else {
            return Vec::new();
        };
        let slots: Vec<usize> = self.outgoing[n]
            .iter()
            .chain(self.incoming[n].iter())
            .copied()
            .collect();

        let mut removed = Vec::with_capacity(slots.len());
        for slot in slots {
            if let Some(edge) = self.edges[slot] {
                let pair = (self.nodes[edge.parent].clone(), self.nodes[edge.child].clone());
                self.unlink(&pair.0, &pair.1);
                removed.push(pair);
            }
        }
        removed
    }

    /// Children in link order
    pub fn children(&self, uid: &str) -> Vec<&str> {
        self.key_to_node
            .get(uid)
            .map(|&n| {
                self.outgoing[n]
                    .iter()
                    .filter_map(|&e| self.edges[e])
                    .map(|edge| self.nodes[edge.child].as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Parents in link order
    pub fn parents(&self, uid: &str) -> Vec<&str> {
        self.key_to_node
            .get(uid)
            .map(|&n| {
                self.incoming[n]
                    .iter()
                    .filter_map(|&e| self.edges[e])
                    .map(|edge| self.nodes[edge.parent].as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every object reachable through `children`, excluding `uid`,
    /// breadth-first
    pub fn descendants(&self, uid: &str) -> Vec<&str> {
        let Some(&start) = self.key_to_node.get(uid) else {
            return Vec::new();
        };
        let mut seen = vec![false; self.nodes.len()];
        seen[start] = true;
        let mut queue = std::collections::VecDeque::from([start]);
        let mut out = Vec::new();
        while let Some(n) = queue.pop_front() {
            for edge in self.outgoing[n].iter().filter_map(|&e| self.edges[e]) {
                if !seen[edge.child] {
                    seen[edge.child] = true;
                    out.push(self.nodes[edge.child].as_str());
                    queue.push_back(edge.child);
                }
            }
        }
        out
    }
}

/// String entries of an array field
fn uid_list(object: &Value, field: &str) -> Vec<String> {
    object
        .get(field)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn record_filter(model_uid: &str, uid: &str) -> Filter {
    Filter::eq(MODEL_FIELD, model_uid).and(Filter::eq(UID_FIELD, uid))
}

/// Remove a stored `parent -> child` edge from both records.
///
/// Each side is `(collection, uid)`. A side whose record does not exist is
/// left alone, so this also clears half-edges to objects that were never
/// stored.
pub async fn unlink_records<S: DocumentStore>(
    store: &S,
    model_uid: &str,
    parent: (&str, &str),
    child: (&str, &str),
) -> Result<(), StoreError> {
    let (parent_collection, parent_uid) = parent;
    let (child_collection, child_uid) = child;
    store
        .update_one(
            parent_collection,
            &record_filter(model_uid, parent_uid),
            &[Patch::pull("children", Value::from(child_uid))],
        )
        .await?;
    store
        .update_one(
            child_collection,
            &record_filter(model_uid, child_uid),
            &[Patch::pull("parents", Value::from(parent_uid))],
        )
        .await?;
    Ok(())
}
