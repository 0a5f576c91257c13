// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Read side used by the 3D viewer.

use cityjson_lite_core::{
    georef::extent_to_wgs84, CityObject, Error as CoreError, Metadata, Reprojector,
};
use cityjson_lite_geometry::{build_object_mesh, ObjectMesh};

use crate::assemble::Pipeline;
use crate::error::{ObjectError, StoreError};
use crate::graph::record_filter;
use crate::store::DocumentStore;

impl<S: DocumentStore> Pipeline<S> {
    /// Stored object with all of its geometries
    pub async fn get_object(
        &self,
        model_uid: &str,
        object_uid: &str,
    ) -> Result<CityObject, ObjectError> {
        let (_, refs) = self.load_model(model_uid).await?;
        let object_ref = refs.iter().find(|r| r.uid == object_uid).ok_or_else(|| {
            StoreError::not_found(
                self.registry.model_collection(),
                format!("object '{}' in model '{}'", object_uid, model_uid),
            )
        })?;

        let record = self
            .store
            .find_one(&object_ref.collection, &record_filter(model_uid, object_uid))
            .await?
            .ok_or_else(|| StoreError::not_found(&object_ref.collection, object_uid))?;
        // Store fields (model, kind, typed attributes) are ignored
        let object: CityObject = serde_json::from_value(record).map_err(StoreError::from)?;
        Ok(object)
    }

    /// Stored object reduced to its highest-lod geometry.
    ///
    /// Ties keep the first geometry. The vertex list is left whole so the
    /// indices stay valid.
    pub async fn get_decomposed_object(
        &self,
        model_uid: &str,
        object_uid: &str,
    ) -> Result<CityObject, ObjectError> {
        let object = self.get_object(model_uid, object_uid).await?;
        Ok(object.with_highest_lod())
    }

    /// Render mesh of a stored object
    pub async fn get_object_mesh(
        &self,
        model_uid: &str,
        object_uid: &str,
    ) -> Result<ObjectMesh, ObjectError> {
        let object = self.get_decomposed_object(model_uid, object_uid).await?;
        let mesh = build_object_mesh(&object)?;
        if mesh.skipped_surfaces > 0 {
            tracing::debug!(
                object = %object_uid,
                skipped = mesh.skipped_surfaces,
                "Skipped degenerate surfaces"
            );
        }
        Ok(mesh)
    }

    /// The model's metadata extent as WGS84 `[south-west, north-east]`
    /// corners; `None` when the model has no extent
    pub async fn model_extent_wgs84(
        &self,
        model_uid: &str,
        reprojector: &dyn Reprojector,
    ) -> Result<Option<[[f64; 2]; 2]>, ObjectError> {
        let (record, _) = self.load_model(model_uid).await?;
        let metadata: Metadata = match record.get("metadata") {
            Some(m) => serde_json::from_value(m.clone()).map_err(StoreError::from)?,
            None => Metadata::default(),
        };
        let Some(extent) = metadata.geographical_extent else {
            return Ok(None);
        };
        let crs = metadata
            .reference_system
            .ok_or_else(|| CoreError::UnsupportedCrs("model has no referenceSystem".into()))?;
        Ok(Some(extent_to_wgs84(reprojector, &crs, &extent)?))
    }
}
