// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! City model assembly: decompose and store every object, then persist the
//! model record once all of them have settled.

use std::collections::BTreeMap;

use cityjson_lite_core::{CityJsonDocument, RawCityObject, Transform};
use futures::stream::{self, StreamExt};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use serde_json::Value;

use crate::config::PipelineConfig;
use crate::decompose::{decompose_object, SharedModel};
use crate::dispatch::{self, ObjectRef, StoredObject};
use crate::error::{IngestError, ObjectError, StoreError};
use crate::graph::{unlink_records, DanglingRef, ObjectGraph};
use crate::registry::{Registry, UID_FIELD};
use crate::store::{DocId, DocumentStore, Filter};

/// One failed input and why
#[derive(Debug)]
pub struct Failure<E> {
    pub input: String,
    pub error: E,
}

/// Outcome of a batch where items fail independently
#[derive(Debug)]
pub struct BatchResult<T, E = ObjectError> {
    pub succeeded: Vec<T>,
    pub failed: Vec<Failure<E>>,
}

impl<T, E> Default for BatchResult<T, E> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<T, E> BatchResult<T, E> {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Result of a successful ingestion; individual objects may still have failed
#[derive(Debug)]
pub struct IngestReport {
    pub model_uid: String,
    pub model_id: DocId,
    pub objects: BatchResult<ObjectRef>,
    /// Stored parent/child links removed because the other side failed
    pub pruned_edges: usize,
}

/// The model record as persisted
#[derive(Debug, Serialize)]
struct ModelRecord<'a> {
    uid: &'a str,
    #[serde(rename = "type")]
    doc_type: &'a str,
    version: &'a str,
    objects: &'a [ObjectRef],
    vertices: [Value; 0],
    transform: Transform,
    metadata: Value,
    #[serde(rename = "geometry-templates", skip_serializing_if = "Option::is_none")]
    templates: Option<Value>,
}

/// Ingestion pipeline over a document store.
///
/// The registry and configuration are fixed at construction. Deletion and
/// viewer queries live in their own modules as further `impl` blocks.
#[derive(Debug)]
pub struct Pipeline<S> {
    pub(crate) store: S,
    pub(crate) registry: Registry,
    pub(crate) config: PipelineConfig,
}

impl<S: DocumentStore> Pipeline<S> {
    /// Create the pipeline and declare the registry's unique keys
    pub async fn new(
        store: S,
        registry: Registry,
        config: PipelineConfig,
    ) -> Result<Self, StoreError> {
        registry.install(&store).await?;
        Ok(Self {
            store,
            registry,
            config,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Parse, decompose, validate and persist a single object
    async fn ingest_object(
        &self,
        model_uid: &str,
        uid: &str,
        value: &Value,
        shared: &SharedModel<'_>,
        graph: &ObjectGraph,
        dangling: Option<&DanglingRef>,
    ) -> Result<StoredObject, ObjectError> {
        if let Some(d) = dangling {
            return Err(ObjectError::DanglingReference {
                uid: d.uid.clone(),
                target: d.target.clone(),
            });
        }

        let raw = RawCityObject::from_value(uid, value)?;
        let mut object = decompose_object(uid, &raw, shared, self.config.extraction)?;
        let kind = dispatch::store_kind(uid, &object.object_type)?;
        dispatch::validate_geometry(uid, kind, &raw.geometry)?;

        object.parents = graph.parents(uid).into_iter().map(String::from).collect();
        object.children = graph.children(uid).into_iter().map(String::from).collect();

        dispatch::persist(&self.store, &self.registry, model_uid, kind, &object).await
    }

    /// Ingest a CityJSON document as model `uid`.
    ///
    /// Invalid documents, a duplicate uid and a failed model save are
    /// errors. Objects that fail, malformed ones included, are reported in
    /// the returned batch and the model is stored with the rest.
    pub async fn ingest_city_model(
        &self,
        uid: &str,
        document: Value,
    ) -> Result<IngestReport, IngestError> {
        let doc = CityJsonDocument::from_value(document)?;
        let transform = doc.transform()?;

        let models = self.registry.model_collection();
        if self
            .store
            .find_one(models, &Filter::eq(UID_FIELD, uid))
            .await?
            .is_some()
        {
            return Err(IngestError::DuplicateModel(uid.to_string()));
        }

        tracing::info!(
            model = %uid,
            version = %doc.version,
            objects = doc.city_objects.len(),
            vertices = doc.vertices.len(),
            extraction = %self.config.extraction,
            "Ingesting city model"
        );

        let (mut graph, dangling) = ObjectGraph::from_objects(&doc.city_objects);
        let mut first_dangling: BTreeMap<&str, &DanglingRef> = BTreeMap::new();
        for d in &dangling {
            first_dangling.entry(d.uid.as_str()).or_insert(d);
        }

        let shared = SharedModel {
            vertices: &doc.vertices,
            templates: doc.geometry_templates.as_ref(),
            transform: &transform,
        };

        // Polled together on this task; completion order is unspecified
        let outcomes: Vec<(&str, Result<StoredObject, ObjectError>)> =
            stream::iter(doc.city_objects.iter())
                .map(|(object_uid, value)| {
                    let shared = &shared;
                    let graph = &graph;
                    let dangling = first_dangling.get(object_uid.as_str()).copied();
                    async move {
                        let result = self
                            .ingest_object(uid, object_uid, value, shared, graph, dangling)
                            .await;
                        (object_uid.as_str(), result)
                    }
                })
                .buffer_unordered(self.config.max_in_flight.max(1))
                .collect()
                .await;

        let mut stored: Vec<StoredObject> = Vec::with_capacity(outcomes.len());
        let mut objects = BatchResult::default();
        for (object_uid, result) in outcomes {
            match result {
                Ok(s) => stored.push(s),
                Err(error) => {
                    tracing::warn!(
                        model = %uid,
                        object = %object_uid,
                        error = %error,
                        "City object failed"
                    );
                    objects.failed.push(Failure {
                        input: object_uid.to_string(),
                        error,
                    });
                }
            }
        }
        // Uid order, independent of completion order
        stored.sort_by(|a, b| a.object_ref.uid.cmp(&b.object_ref.uid));
        objects.failed.sort_by(|a, b| a.input.cmp(&b.input));

        let pruned_edges = if self.config.prune_failed_edges {
            self.prune_failed_edges(uid, &mut graph, &stored, &objects.failed)
                .await?
        } else {
            0
        };

        let mut metadata = doc.metadata.clone();
        if self.config.fill_model_extent && metadata.geographical_extent.is_none() {
            metadata.geographical_extent = stored
                .iter()
                .filter_map(|s| s.extent)
                .reduce(|mut a, b| {
                    a.union(&b);
                    a
                });
        }

        objects.succeeded = stored.into_iter().map(|s| s.object_ref).collect();

        let record = ModelRecord {
            uid,
            doc_type: &doc.doc_type,
            version: &doc.version,
            objects: &objects.succeeded,
            vertices: [],
            transform,
            metadata: serde_json::to_value(&metadata).map_err(StoreError::from)?,
            templates: doc
                .geometry_templates
                .as_ref()
                .map(serde_json::to_value)
                .transpose()
                .map_err(StoreError::from)?,
        };
        let record = serde_json::to_value(&record).map_err(StoreError::from)?;

        let model_id = match self.store.insert(models, record).await {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(model = %uid, error = %e, "Failed to save city model");
                return Err(e.into());
            }
        };

        tracing::info!(
            model = %uid,
            stored = objects.succeeded.len(),
            failed = objects.failed.len(),
            pruned_edges,
            "City model ingested"
        );

        Ok(IngestReport {
            model_uid: uid.to_string(),
            model_id,
            objects,
            pruned_edges,
        })
    }

    /// Unlink every stored object from the objects that failed
    async fn prune_failed_edges(
        &self,
        model_uid: &str,
        graph: &mut ObjectGraph,
        stored: &[StoredObject],
        failed: &[Failure<ObjectError>],
    ) -> Result<usize, StoreError> {
        let collections: FxHashMap<&str, &str> = stored
            .iter()
            .map(|s| (s.object_ref.uid.as_str(), s.object_ref.collection.as_str()))
            .collect();
        let failed_uids: FxHashSet<&str> = failed.iter().map(|f| f.input.as_str()).collect();

        let mut pruned = 0;
        for f in failed {
            for (parent, child) in graph.remove_node(&f.input) {
                // Only the neighbour has a record; the failed side's patch matches nothing
                let neighbour = if parent == f.input { &child } else { &parent };
                if failed_uids.contains(neighbour.as_str()) {
                    continue;
                }
                let Some(&collection) = collections.get(neighbour.as_str()) else {
                    continue;
                };
                unlink_records(
                    &self.store,
                    model_uid,
                    (collection, parent.as_str()),
                    (collection, child.as_str()),
                )
                .await?;
                pruned += 1;
            }
        }
        if pruned > 0 {
            tracing::debug!(model = %model_uid, pruned, "Pruned links to failed objects");
        }
        Ok(pruned)
    }
}
