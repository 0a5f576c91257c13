// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Deletion of stored city objects and models.
//!
//! Deleting an object removes it from every surviving neighbour's
//! `parents`/`children` list and from the model's `objects` list.

use std::collections::BTreeSet;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::Deserialize;
use serde_json::Value;

use crate::assemble::Pipeline;
use crate::dispatch::ObjectRef;
use crate::error::StoreError;
use crate::graph::{record_filter, unlink_records, ObjectGraph};
use crate::registry::{MODEL_FIELD, UID_FIELD};
use crate::store::{Document, DocumentStore, Filter, Patch};

/// Objects removed by a delete call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteReport {
    pub deleted: Vec<String>,
}

/// The link fields of an object record
#[derive(Debug, Deserialize)]
struct Links {
    uid: String,
    #[serde(default)]
    parents: Vec<String>,
    #[serde(default)]
    children: Vec<String>,
}

impl<S: DocumentStore> Pipeline<S> {
    /// Model record and its object refs
    pub(crate) async fn load_model(
        &self,
        model_uid: &str,
    ) -> Result<(Document, Vec<ObjectRef>), StoreError> {
        let models = self.registry.model_collection();
        let record = self
            .store
            .find_one(models, &Filter::eq(UID_FIELD, model_uid))
            .await?
            .ok_or_else(|| StoreError::not_found(models, format!("model '{}'", model_uid)))?;
        let refs = match record.get("objects") {
            Some(objects) => serde_json::from_value(objects.clone())?,
            None => Vec::new(),
        };
        Ok((record, refs))
    }

    /// Graph of the stored parent/child links of a model
    async fn stored_graph(
        &self,
        model_uid: &str,
        refs: &[ObjectRef],
    ) -> Result<ObjectGraph, StoreError> {
        let collections: BTreeSet<&str> = refs.iter().map(|r| r.collection.as_str()).collect();
        let mut links = Vec::with_capacity(refs.len());
        for collection in collections {
            for record in self
                .store
                .find(collection, &Filter::eq(MODEL_FIELD, model_uid))
                .await?
            {
                links.push(serde_json::from_value::<Links>(record)?);
            }
        }
        let (graph, _) = ObjectGraph::from_claims(
            links
                .iter()
                .map(|l| (l.uid.as_str(), l.children.as_slice(), l.parents.as_slice())),
        );
        Ok(graph)
    }

    /// Delete one object of a model, and with `cascade` all its descendants
    pub async fn delete_object(
        &self,
        model_uid: &str,
        object_uid: &str,
        cascade: bool,
    ) -> Result<DeleteReport, StoreError> {
        let (_, refs) = self.load_model(model_uid).await?;
        let by_uid: FxHashMap<&str, &ObjectRef> =
            refs.iter().map(|r| (r.uid.as_str(), r)).collect();
        if !by_uid.contains_key(object_uid) {
            return Err(StoreError::not_found(
                self.registry.model_collection(),
                format!("object '{}' in model '{}'", object_uid, model_uid),
            ));
        }

        let mut graph = self.stored_graph(model_uid, &refs).await?;

        let mut targets = vec![object_uid.to_string()];
        if cascade {
            targets.extend(
                graph
                    .descendants(object_uid)
                    .into_iter()
                    .filter(|uid| by_uid.contains_key(uid))
                    .map(String::from),
            );
        }
        let doomed: FxHashSet<&str> = targets.iter().map(String::as_str).collect();

        let models = self.registry.model_collection();
        for target in &targets {
            for (parent, child) in graph.remove_node(target) {
                let neighbour = if parent == *target { &child } else { &parent };
                if doomed.contains(neighbour.as_str()) {
                    continue;
                }
                let (Some(p), Some(c)) = (by_uid.get(parent.as_str()), by_uid.get(child.as_str()))
                else {
                    continue;
                };
                unlink_records(
                    &self.store,
                    model_uid,
                    (p.collection.as_str(), parent.as_str()),
                    (c.collection.as_str(), child.as_str()),
                )
                .await?;
            }

            let object_ref = by_uid[target.as_str()];
            self.store
                .delete_one(&object_ref.collection, &record_filter(model_uid, target))
                .await?;
            self.store
                .update_one(
                    models,
                    &Filter::eq(UID_FIELD, model_uid),
                    &[Patch::pull("objects", serde_json::to_value(object_ref)?)],
                )
                .await?;
        }

        tracing::info!(
            model = %model_uid,
            object = %object_uid,
            cascade,
            deleted = targets.len(),
            "Deleted city object"
        );
        Ok(DeleteReport { deleted: targets })
    }

    /// Delete a model record and every object stored for it
    pub async fn delete_city_model(&self, model_uid: &str) -> Result<DeleteReport, StoreError> {
        let (_, refs) = self.load_model(model_uid).await?;

        let mut removed = 0;
        for collection in self.registry.object_collections() {
            removed += self
                .store
                .delete_many(collection, &Filter::eq(MODEL_FIELD, Value::from(model_uid)))
                .await?;
        }
        self.store
            .delete_one(self.registry.model_collection(), &Filter::eq(UID_FIELD, model_uid))
            .await?;

        tracing::info!(model = %model_uid, objects = removed, "Deleted city model");
        Ok(DeleteReport {
            deleted: refs.into_iter().map(|r| r.uid).collect(),
        })
    }
}
