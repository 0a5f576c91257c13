// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Collection registry: where each kind of record lives and which keys
//! must stay unique.

use cityjson_lite_core::StoreKind;
use rustc_hash::FxHashMap;

use crate::error::StoreError;
use crate::store::DocumentStore;

/// Model uid field on object records
pub const MODEL_FIELD: &str = "model";
pub const UID_FIELD: &str = "uid";

/// A named collection and its unique keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSpec {
    pub name: String,
    pub unique: Vec<Vec<String>>,
}

impl CollectionSpec {
    fn new(name: impl Into<String>, unique: &[&[&str]]) -> Self {
        Self {
            name: name.into(),
            unique: unique
                .iter()
                .map(|key| key.iter().map(|f| f.to_string()).collect())
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Registry {
    model: CollectionSpec,
    kinds: FxHashMap<StoreKind, CollectionSpec>,
}

impl Registry {
    /// One collection per storage kind, named after the kind, plus
    /// `CityModel`. Collection names get `prefix` prepended.
    pub fn with_prefix(prefix: &str) -> Self {
        let kinds = StoreKind::ALL
            .iter()
            .map(|&kind| {
                let spec = CollectionSpec::new(
                    format!("{}{}", prefix, kind.as_str()),
                    &[&[MODEL_FIELD, UID_FIELD]],
                );
                (kind, spec)
            })
            .collect();
        Self {
            model: CollectionSpec::new(format!("{}CityModel", prefix), &[&[UID_FIELD]]),
            kinds,
        }
    }

    pub fn model_collection(&self) -> &str {
        &self.model.name
    }

    pub fn collection(&self, kind: StoreKind) -> &str {
        // Every kind is registered at construction
        self.kinds.get(&kind).map_or("", |c| c.name.as_str())
    }

    pub fn kind_of(&self, collection: &str) -> Option<StoreKind> {
        self.kinds
            .iter()
            .find(|(_, spec)| spec.name == collection)
            .map(|(kind, _)| *kind)
    }

    /// Every object collection, in `StoreKind::ALL` order
    pub fn object_collections(&self) -> impl Iterator<Item = &str> + '_ {
        StoreKind::ALL.iter().map(move |&k| self.collection(k))
    }

    /// Declare the unique keys on the store
    pub async fn install<S: DocumentStore>(&self, store: &S) -> Result<(), StoreError> {
        let specs = std::iter::once(&self.model).chain(
            StoreKind::ALL
                .iter()
                .filter_map(|k| self.kinds.get(k)),
        );
        for spec in specs {
            for fields in &spec.unique {
                store.ensure_unique(&spec.name, fields).await?;
            }
        }
        tracing::debug!(collections = self.kinds.len() + 1, "Registered collections");
        Ok(())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_prefix("")
    }
}
