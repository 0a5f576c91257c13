// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Type dispatch: pick the storage kind of an object, validate it against
//! that kind and persist the typed record in the kind's collection.

use cityjson_lite_core::{BBox, CityObject, CityObjectType, Geometry, StoreKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ObjectError, StoreError};
use crate::registry::{Registry, MODEL_FIELD};
use crate::store::{DocId, Document, DocumentStore};

/// Kind marker on object records
pub const KIND_FIELD: &str = "kind";

/// Where a stored object lives; the model record lists these
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub uid: String,
    pub collection: String,
    pub id: DocId,
}

/// Outcome of persisting one object
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub kind: StoreKind,
    pub object_ref: ObjectRef,
    pub extent: Option<BBox>,
}

/// Storage kind of a type, or `Unsupported` naming the object
pub fn store_kind(uid: &str, object_type: &CityObjectType) -> Result<StoreKind, ObjectError> {
    object_type.store_kind().ok_or_else(|| ObjectError::Unsupported {
        uid: uid.to_string(),
        type_name: object_type.to_string(),
    })
}

/// Check geometry types against the kind. Expects the geometry as written
/// in the document, before instances are resolved.
pub fn validate_geometry(
    uid: &str,
    kind: StoreKind,
    geometry: &[Geometry],
) -> Result<(), ObjectError> {
    match geometry.iter().find(|g| !kind.allows(g.geometry_type)) {
        Some(g) => Err(ObjectError::Validation {
            uid: uid.to_string(),
            reason: format!("{} records cannot hold {} geometry", kind, g.geometry_type),
        }),
        None => Ok(()),
    }
}

fn invalid(uid: &str, field: &str, expected: &str, found: &Value) -> ObjectError {
    ObjectError::Validation {
        uid: uid.to_string(),
        reason: format!("attribute '{}' must be {}, found {}", field, expected, found),
    }
}

/// Copy a typed attribute into the record, failing on the wrong JSON type
fn lift(
    uid: &str,
    attributes: &Map<String, Value>,
    record: &mut Map<String, Value>,
    field: &str,
    expected: &str,
    accept: fn(&Value) -> Option<Value>,
) -> Result<(), ObjectError> {
    match attributes.get(field) {
        None | Some(Value::Null) => Ok(()),
        Some(value) => {
            let typed = accept(value).ok_or_else(|| invalid(uid, field, expected, value))?;
            record.insert(field.to_string(), typed);
            Ok(())
        }
    }
}

fn as_number(v: &Value) -> Option<Value> {
    v.as_f64().map(Value::from)
}

fn as_integer(v: &Value) -> Option<Value> {
    v.as_i64()
        .or_else(|| v.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
        .map(Value::from)
}

fn as_string(v: &Value) -> Option<Value> {
    v.as_str().map(Value::from)
}

/// Kind-specific fields lifted from the attributes
fn kind_fields(
    kind: StoreKind,
    object: &CityObject,
    record: &mut Map<String, Value>,
) -> Result<(), ObjectError> {
    let uid = object.uid.as_str();
    let attributes = &object.attributes;
    match kind {
        StoreKind::Building => {
            lift(uid, attributes, record, "measuredHeight", "a number", as_number)?;
            lift(uid, attributes, record, "roofType", "a string", as_string)?;
            lift(uid, attributes, record, "storeysAboveGround", "an integer", as_integer)?;
            lift(uid, attributes, record, "yearOfConstruction", "an integer", as_integer)?;
        }
        StoreKind::Transportation => {
            record.insert("mode".into(), Value::from(object.object_type.as_str()));
        }
        StoreKind::Bridge | StoreKind::Tunnel => {
            record.insert("isPart".into(), Value::Bool(object.object_type.is_part()));
        }
        StoreKind::BridgeInstallation
        | StoreKind::CityFurniture
        | StoreKind::LandUse
        | StoreKind::PlantCover
        | StoreKind::SolitaryVegetationObject
        | StoreKind::TINRelief
        | StoreKind::TunnelInstallation
        | StoreKind::WaterBody => {}
    }
    Ok(())
}

/// Build the record for a decomposed object
pub fn build_record(
    model_uid: &str,
    kind: StoreKind,
    object: &CityObject,
) -> Result<Document, ObjectError> {
    let value = serde_json::to_value(object).map_err(StoreError::from)?;
    let Value::Object(mut record) = value else {
        let reason = "city object did not serialize to a map".to_string();
        return Err(StoreError::InvalidDocument(reason).into());
    };
    record.insert(MODEL_FIELD.into(), Value::from(model_uid));
    record.insert(KIND_FIELD.into(), Value::from(kind.as_str()));
    kind_fields(kind, object, &mut record)?;
    Ok(Value::Object(record))
}

/// Persist a decomposed object in its kind's collection
pub async fn persist<S: DocumentStore>(
    store: &S,
    registry: &Registry,
    model_uid: &str,
    kind: StoreKind,
    object: &CityObject,
) -> Result<StoredObject, ObjectError> {
    let record = build_record(model_uid, kind, object)?;
    let collection = registry.collection(kind);
    let id = store.insert(collection, record).await?;

    tracing::debug!(
        uid = %object.uid,
        kind = %kind,
        id = %id,
        vertices = object.vertices.len(),
        "Stored city object"
    );

    Ok(StoredObject {
        kind,
        object_ref: ObjectRef {
            uid: object.uid.clone(),
            collection: collection.to_string(),
            id,
        },
        extent: object.geographical_extent,
    })
}
