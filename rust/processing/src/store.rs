// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Document store seam and the bundled in-memory implementation.
//!
//! Records are `serde_json::Value` objects grouped in named collections.
//! Filters cover field equality, array containment and conjunction; patches
//! cover set, push and pull. Every call is an `.await` point.

use std::collections::BTreeMap;
use std::future::Future;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::StoreError;

pub type Document = Value;

/// Identifier assigned by the store on insert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocId(pub u64);

impl std::fmt::Display for DocId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Field holding the store id inside each record
pub const ID_FIELD: &str = "_id";

/// Resolve a dotted field path inside a document
fn lookup<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(document, |v, key| v.get(key))
}

/// Record selector
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches every record
    All,
    /// Field equals the value
    Eq(String, Value),
    /// Array field contains the value
    Contains(String, Value),
    And(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(field.to_string(), value.into())
    }

    pub fn contains(field: &str, value: impl Into<Value>) -> Self {
        Filter::Contains(field.to_string(), value.into())
    }

    pub fn and(self, other: Filter) -> Self {
        match self {
            Filter::And(mut all) => {
                all.push(other);
                Filter::And(all)
            }
            Filter::All => other,
            first => Filter::And(vec![first, other]),
        }
    }

    pub fn matches(&self, document: &Value) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq(field, value) => lookup(document, field) == Some(value),
            Filter::Contains(field, value) => lookup(document, field)
                .and_then(Value::as_array)
                .is_some_and(|items| items.contains(value)),
            Filter::And(all) => all.iter().all(|f| f.matches(document)),
        }
    }
}

/// Record mutation
#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
    Set(String, Value),
    /// Append to an array field, creating it when absent
    Push(String, Value),
    /// Remove every equal element from an array field
    Pull(String, Value),
}

impl Patch {
    pub fn set(field: &str, value: impl Into<Value>) -> Self {
        Patch::Set(field.to_string(), value.into())
    }

    pub fn push(field: &str, value: impl Into<Value>) -> Self {
        Patch::Push(field.to_string(), value.into())
    }

    pub fn pull(field: &str, value: impl Into<Value>) -> Self {
        Patch::Pull(field.to_string(), value.into())
    }

    fn field(&self) -> &str {
        match self {
            Patch::Set(f, _) | Patch::Push(f, _) | Patch::Pull(f, _) => f,
        }
    }

    /// Apply to a top-level field of a record
    pub fn apply(&self, document: &mut Value) -> Result<(), StoreError> {
        let field = self.field();
        if field == ID_FIELD {
            return Err(StoreError::InvalidDocument(format!("'{}' is read-only", ID_FIELD)));
        }
        let object = document
            .as_object_mut()
            .ok_or_else(|| StoreError::InvalidDocument("record is not an object".into()))?;

        match self {
            Patch::Set(_, value) => {
                object.insert(field.to_string(), value.clone());
            }
            Patch::Push(_, value) => {
                let slot = object
                    .entry(field.to_string())
                    .or_insert_with(|| Value::Array(Vec::new()));
                slot.as_array_mut()
                    .ok_or_else(|| {
                        StoreError::InvalidDocument(format!("'{}' is not an array", field))
                    })?
                    .push(value.clone());
            }
            Patch::Pull(_, value) => {
                if let Some(slot) = object.get_mut(field) {
                    slot.as_array_mut()
                        .ok_or_else(|| {
                            StoreError::InvalidDocument(format!("'{}' is not an array", field))
                        })?
                        .retain(|item| item != value);
                }
            }
        }
        Ok(())
    }
}

/// Persistence collaborator.
///
/// Implementations must be shareable between the concurrently polled
/// per-object futures, so every method takes `&self`.
pub trait DocumentStore: Send + Sync {
    fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> impl Future<Output = Result<Option<Document>, StoreError>> + Send;

    fn find(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> impl Future<Output = Result<Vec<Document>, StoreError>> + Send;

    fn insert(
        &self,
        collection: &str,
        document: Document,
    ) -> impl Future<Output = Result<DocId, StoreError>> + Send;

    /// Returns whether a record matched
    fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        patches: &[Patch],
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Returns the number of records updated
    fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        patches: &[Patch],
    ) -> impl Future<Output = Result<usize, StoreError>> + Send;

    fn delete_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    fn delete_many(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> impl Future<Output = Result<usize, StoreError>> + Send;

    /// Declare a compound unique key over `fields`
    fn ensure_unique(
        &self,
        collection: &str,
        fields: &[String],
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// A compound unique key and the record owning each key value
#[derive(Debug)]
struct UniqueIndex {
    fields: Vec<String>,
    owners: FxHashMap<String, DocId>,
}

impl UniqueIndex {
    fn new(fields: &[String]) -> Self {
        Self {
            fields: fields.to_vec(),
            owners: FxHashMap::default(),
        }
    }

    /// Encoded key of a record, `None` if it lacks one of the fields
    fn key(&self, document: &Value) -> Option<String> {
        self.fields
            .iter()
            .map(|f| lookup(document, f).cloned())
            .collect::<Option<Vec<Value>>>()
            .map(|values| Value::Array(values).to_string())
    }

    fn conflict(&self, collection: &str, key: &str) -> StoreError {
        StoreError::Conflict {
            collection: collection.to_string(),
            key: format!("{:?} = {}", self.fields, key),
        }
    }
}

#[derive(Debug, Default)]
struct Collection {
    records: BTreeMap<DocId, Document>,
    unique: Vec<UniqueIndex>,
}

impl Collection {
    fn matching(&self, filter: &Filter) -> Vec<DocId> {
        self.records
            .iter()
            .filter(|(_, d)| filter.matches(d))
            .map(|(id, _)| *id)
            .collect()
    }

    fn insert(&mut self, name: &str, id: DocId, document: Document) -> Result<(), StoreError> {
        let keys: Vec<Option<String>> = self.unique.iter().map(|u| u.key(&document)).collect();
        for (index, key) in self.unique.iter().zip(&keys) {
            if let Some(key) = key {
                if index.owners.contains_key(key) {
                    return Err(index.conflict(name, key));
                }
            }
        }
        for (index, key) in self.unique.iter_mut().zip(keys) {
            if let Some(key) = key {
                index.owners.insert(key, id);
            }
        }
        self.records.insert(id, document);
        Ok(())
    }

    /// Drop the index entries of a record
    fn unindex(&mut self, id: DocId) {
        let Some(document) = self.records.get(&id) else {
            return;
        };
        for index in &mut self.unique {
            if let Some(key) = index.key(document) {
                if index.owners.get(&key) == Some(&id) {
                    index.owners.remove(&key);
                }
            }
        }
    }

    fn remove(&mut self, id: DocId) -> bool {
        self.unindex(id);
        self.records.remove(&id).is_some()
    }

    /// Patch every record in `ids`. Nothing is written unless every patch
    /// applies and no unique key clashes.
    fn update(&mut self, name: &str, ids: &[DocId], patches: &[Patch]) -> Result<(), StoreError> {
        let mut staged = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(current) = self.records.get(id) else {
                continue;
            };
            let mut next = current.clone();
            for patch in patches {
                patch.apply(&mut next)?;
            }
            staged.push((*id, next));
        }

        // Keys held by the staged records are released by the update itself
        let changing: FxHashSet<DocId> = staged.iter().map(|(id, _)| *id).collect();
        for index in &self.unique {
            let mut claimed = FxHashSet::default();
            for (_, next) in &staged {
                let Some(key) = index.key(next) else {
                    continue;
                };
                let taken = index
                    .owners
                    .get(&key)
                    .is_some_and(|owner| !changing.contains(owner));
                if taken || !claimed.insert(key.clone()) {
                    return Err(index.conflict(name, &key));
                }
            }
        }

        for (id, _) in &staged {
            self.unindex(*id);
        }
        for (id, next) in staged {
            for index in &mut self.unique {
                if let Some(key) = index.key(&next) {
                    index.owners.insert(key, id);
                }
            }
            self.records.insert(id, next);
        }
        Ok(())
    }

    /// Add a unique key, failing if existing records already clash
    fn add_unique(&mut self, name: &str, fields: &[String]) -> Result<(), StoreError> {
        if self.unique.iter().any(|u| u.fields == fields) {
            return Ok(());
        }
        let mut index = UniqueIndex::new(fields);
        for (id, document) in &self.records {
            if let Some(key) = index.key(document) {
                if index.owners.contains_key(&key) {
                    return Err(index.conflict(name, &key));
                }
                index.owners.insert(key, *id);
            }
        }
        self.unique.push(index);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct StoreState {
    next_id: u64,
    collections: FxHashMap<String, Collection>,
}

/// In-process document store guarded by an async read-write lock
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records in a collection
    pub async fn count(&self, collection: &str) -> usize {
        self.state
            .read()
            .await
            .collections
            .get(collection)
            .map_or(0, |c| c.records.len())
    }
}

impl DocumentStore for MemoryStore {
    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<Document>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .collections
            .get(collection)
            .and_then(|c| c.records.values().find(|d| filter.matches(d)))
            .cloned())
    }

    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .collections
            .get(collection)
            .map(|c| {
                c.records
                    .values()
                    .filter(|d| filter.matches(d))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn insert(&self, collection: &str, mut document: Document) -> Result<DocId, StoreError> {
        let Some(object) = document.as_object_mut() else {
            return Err(StoreError::InvalidDocument(format!(
                "records in '{}' must be JSON objects",
                collection
            )));
        };

        let mut state = self.state.write().await;
        let id = DocId(state.next_id);
        object.insert(ID_FIELD.to_string(), Value::from(id.0));

        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(collection, id, document)?;
        state.next_id += 1;
        Ok(id)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        patches: &[Patch],
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let Some(records) = state.collections.get_mut(collection) else {
            return Ok(false);
        };
        let Some(id) = records.matching(filter).first().copied() else {
            return Ok(false);
        };
        records.update(collection, &[id], patches)?;
        Ok(true)
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        patches: &[Patch],
    ) -> Result<usize, StoreError> {
        let mut state = self.state.write().await;
        let Some(records) = state.collections.get_mut(collection) else {
            return Ok(0);
        };
        let ids = records.matching(filter);
        records.update(collection, &ids, patches)?;
        Ok(ids.len())
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let Some(records) = state.collections.get_mut(collection) else {
            return Ok(false);
        };
        match records.matching(filter).first() {
            Some(id) => Ok(records.remove(*id)),
            None => Ok(false),
        }
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<usize, StoreError> {
        let mut state = self.state.write().await;
        let Some(records) = state.collections.get_mut(collection) else {
            return Ok(0);
        };
        let ids = records.matching(filter);
        for id in &ids {
            records.remove(*id);
        }
        Ok(ids.len())
    }

    async fn ensure_unique(&self, collection: &str, fields: &[String]) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .add_unique(collection, fields)
    }
}
