// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fs;
use std::path::PathBuf;

use approx::assert_relative_eq;
use cityjson_lite_core::{BuiltinReprojector, Error as CoreError, GeometryType, StoreKind};
use cityjson_lite_geometry::Error as GeometryError;
use cityjson_lite_processing::{
    DocumentStore, ExtractionMode, Filter, IngestError, MemoryStore, ObjectError, Pipeline,
    PipelineConfig, Registry, StoreError,
};
use serde_json::{json, Value};

fn fixture() -> Value {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join("campus.city.json");
    let content = fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Test model not found at {}: {}", path.display(), e));
    serde_json::from_str(&content).unwrap()
}

async fn pipeline() -> Pipeline<MemoryStore> {
    Pipeline::new(MemoryStore::new(), Registry::default(), PipelineConfig::default())
        .await
        .unwrap()
}

const IDENTITY: [f64; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

/// Model with a small template set and the given objects over a 12-vertex pool
fn model(objects: Value) -> Value {
    json!({
        "type": "CityJSON",
        "version": "1.1",
        "transform": {"scale": [0.01, 0.01, 0.01], "translate": [0.0, 0.0, 0.0]},
        "CityObjects": objects,
        "geometry-templates": {
            "templates": [{"type": "MultiSurface", "lod": 1, "boundaries": [[[0, 1, 2]]]}],
            "vertices-templates": [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]
        },
        "vertices": (0..12).map(|i| json!([i * 100, i * 50, i % 3 * 100])).collect::<Vec<_>>()
    })
}

fn surface(indices: &[i64]) -> Value {
    json!({"type": "MultiSurface", "lod": 2, "boundaries": [[indices]]})
}

async fn record(
    pipeline: &Pipeline<MemoryStore>,
    kind: StoreKind,
    model: &str,
    uid: &str,
) -> Option<Value> {
    let collection = pipeline.registry().collection(kind);
    pipeline
        .store()
        .find_one(collection, &Filter::eq("model", model).and(Filter::eq("uid", uid)))
        .await
        .unwrap()
}

async fn model_record(pipeline: &Pipeline<MemoryStore>, uid: &str) -> Value {
    pipeline
        .store()
        .find_one(pipeline.registry().model_collection(), &Filter::eq("uid", uid))
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn test_ingest_fixture_model() {
    let pipeline = pipeline().await;
    let report = pipeline.ingest_city_model("campus", fixture()).await.unwrap();

    let stored: Vec<&str> = report.objects.succeeded.iter().map(|r| r.uid.as_str()).collect();
    assert_eq!(stored, vec!["Bench_1", "Building_A", "Part_B", "Road_1"]);
    assert_eq!(report.objects.failed.len(), 1);
    assert_eq!(report.objects.failed[0].input, "Group_1");
    assert!(matches!(
        report.objects.failed[0].error,
        ObjectError::Unsupported { .. }
    ));

    let model = model_record(&pipeline, "campus").await;
    assert_eq!(model["objects"].as_array().unwrap().len(), 4);
    assert_eq!(model["vertices"], json!([]));
    assert_eq!(model["metadata"]["title"], json!("Campus test model"));
    let extent = model["metadata"]["geographicalExtent"].as_array().unwrap();
    assert_relative_eq!(extent[0].as_f64().unwrap(), 84995.0, epsilon = 1e-6);
    assert_relative_eq!(extent[3].as_f64().unwrap(), 85020.0, epsilon = 1e-6);

    let building = record(&pipeline, StoreKind::Building, "campus", "Building_A").await.unwrap();
    assert_eq!(building["children"], json!(["Part_B"]));
    assert_eq!(building["vertices"].as_array().unwrap().len(), 8);
    assert_eq!(building["measuredHeight"], json!(10.0));
    assert_eq!(building["yearOfConstruction"], json!(1968));
    assert_eq!(building["spatialIndex"], json!(true));

    let part = record(&pipeline, StoreKind::Building, "campus", "Part_B").await.unwrap();
    assert_eq!(part["parents"], json!(["Building_A"]));
    assert_eq!(part["vertices"].as_array().unwrap().len(), 4);

    // The failed group's link to the road is removed from the stored road
    let road = record(&pipeline, StoreKind::Transportation, "campus", "Road_1").await.unwrap();
    assert_eq!(road["parents"], json!([]));
    assert_eq!(road["mode"], json!("Road"));
    assert_eq!(report.pruned_edges, 1);

    let bench = record(&pipeline, StoreKind::CityFurniture, "campus", "Bench_1").await.unwrap();
    assert_eq!(bench["geometry"][0]["type"], json!("MultiSurface"));
    assert_eq!(bench["vertices"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_failed_template_does_not_stop_siblings() {
    let pipeline = pipeline().await;
    let document = model(json!({
        "a": {"type": "Building", "geometry": [surface(&[0, 1, 2, 3])]},
        "b": {"type": "WaterBody", "geometry": [surface(&[4, 5, 6])]},
        "c": {"type": "CityFurniture", "geometry": [{
            "type": "GeometryInstance",
            "template": 7,
            "boundaries": [8],
            "transformationMatrix": IDENTITY
        }]}
    }));

    let report = pipeline.ingest_city_model("m", document).await.unwrap();
    assert_eq!(report.objects.succeeded.len(), 2);
    assert_eq!(report.objects.failed.len(), 1);
    assert_eq!(report.objects.failed[0].input, "c");
    assert!(matches!(
        report.objects.failed[0].error,
        ObjectError::Geometry(GeometryError::TemplateOutOfRange { index: 7, .. })
    ));

    let model = model_record(&pipeline, "m").await;
    assert_eq!(model["objects"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_malformed_object_fails_alone() {
    let malformed = [
        json!({"type": "Building", "geometry": [
            {"type": "Polygon", "lod": 2, "boundaries": [[[0, 1, 2]]]}
        ]}),
        json!({"type": "Building", "geometry": [
            {"type": "MultiSurface", "lod": "high", "boundaries": [[[0, 1, 2]]]}
        ]}),
        json!({"type": "CityFurniture", "geometry": [{
            "type": "GeometryInstance",
            "template": 0,
            "boundaries": [3],
            "transformationMatrix": ["1", 0, 0, 0, 0, 1, 0, 0, 0, 0, 1, 0, 0, 0, 0, 1]
        }]}),
        json!({"type": 42}),
    ];

    for (i, bad) in malformed.into_iter().enumerate() {
        let pipeline = pipeline().await;
        let document = model(json!({
            "good": {"type": "Building", "geometry": [surface(&[0, 1, 2, 3])]},
            "bad": bad
        }));

        let report = pipeline.ingest_city_model("m", document).await.unwrap();
        let stored: Vec<&str> =
            report.objects.succeeded.iter().map(|r| r.uid.as_str()).collect();
        assert_eq!(stored, vec!["good"], "case {i}");
        assert_eq!(report.objects.failed.len(), 1, "case {i}");
        assert_eq!(report.objects.failed[0].input, "bad");
        assert!(
            matches!(
                report.objects.failed[0].error,
                ObjectError::Core(CoreError::InvalidObject { .. })
            ),
            "case {i}: {:?}",
            report.objects.failed[0].error
        );
        let model = model_record(&pipeline, "m").await;
        assert_eq!(model["objects"].as_array().unwrap().len(), 1);
    }
}

#[tokio::test]
async fn test_links_to_malformed_object_are_pruned() {
    let pipeline = pipeline().await;
    let document = model(json!({
        "parent": {"type": "Building", "children": ["child"], "geometry": [{"type": "Polygon"}]},
        "child": {"type": "BuildingPart", "parents": ["parent"], "geometry": [surface(&[4, 5, 6])]}
    }));

    let report = pipeline.ingest_city_model("m", document).await.unwrap();
    assert_eq!(report.objects.succeeded.len(), 1);
    assert_eq!(report.pruned_edges, 1);
    let child = record(&pipeline, StoreKind::Building, "m", "child").await.unwrap();
    assert_eq!(child["parents"], json!([]));
}

#[tokio::test]
async fn test_contiguous_range_extraction() {
    let pipeline = pipeline().await;
    let document = model(json!({
        "a": {"type": "Building", "geometry": [surface(&[3, 4, 5, 6, 7])]}
    }));
    pipeline.ingest_city_model("m", document).await.unwrap();

    let a = record(&pipeline, StoreKind::Building, "m", "a").await.unwrap();
    assert_eq!(a["vertices"].as_array().unwrap().len(), 7 - 3 + 1);
    assert_eq!(a["geometry"][0]["boundaries"], json!([[[0, 1, 2, 3, 4]]]));
    assert_eq!(a["transform"]["scale"], json!([0.01, 0.01, 0.01]));
}

#[tokio::test]
async fn test_strict_extraction_reports_gaps() {
    let config = PipelineConfig {
        extraction: ExtractionMode::Strict,
        ..PipelineConfig::default()
    };
    let pipeline = Pipeline::new(MemoryStore::new(), Registry::default(), config)
        .await
        .unwrap();
    let document = model(json!({
        "gappy": {"type": "Building", "geometry": [surface(&[0, 1, 5])]},
        "dense": {"type": "Building", "geometry": [surface(&[6, 7, 8])]}
    }));

    let report = pipeline.ingest_city_model("m", document).await.unwrap();
    assert_eq!(report.objects.succeeded.len(), 1);
    assert!(matches!(
        report.objects.failed[0].error,
        ObjectError::NonContiguous { missing: 2, .. }
    ));
}

#[tokio::test]
async fn test_geometry_type_validated_per_kind() {
    let pipeline = pipeline().await;
    let document = model(json!({
        "tin": {"type": "TINRelief", "geometry": [surface(&[0, 1, 2])]}
    }));
    let report = pipeline.ingest_city_model("m", document).await.unwrap();
    assert!(report.objects.succeeded.is_empty());
    assert!(matches!(
        report.objects.failed[0].error,
        ObjectError::Validation { .. }
    ));
    // The model is stored even when every object failed
    assert_eq!(model_record(&pipeline, "m").await["objects"], json!([]));
}

#[tokio::test]
async fn test_dangling_reference_fails_only_the_referrer() {
    let pipeline = pipeline().await;
    let document = model(json!({
        "a": {"type": "Building", "children": ["ghost"], "geometry": [surface(&[0, 1, 2])]},
        "b": {"type": "Building", "geometry": [surface(&[3, 4, 5])]}
    }));
    let report = pipeline.ingest_city_model("m", document).await.unwrap();
    assert_eq!(report.objects.succeeded.len(), 1);
    match &report.objects.failed[0].error {
        ObjectError::DanglingReference { uid, target } => {
            assert_eq!(uid, "a");
            assert_eq!(target, "ghost");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_transform_is_fatal() {
    let pipeline = pipeline().await;
    let mut document = model(json!({
        "a": {"type": "Building", "geometry": [surface(&[0, 1, 2])]}
    }));
    document.as_object_mut().unwrap().remove("transform");

    let err = pipeline.ingest_city_model("m", document).await.unwrap_err();
    assert!(matches!(err, IngestError::Document(CoreError::MissingTransform(_))));
    assert_eq!(pipeline.store().count(pipeline.registry().model_collection()).await, 0);
    assert_eq!(pipeline.store().count("Building").await, 0);
}

#[tokio::test]
async fn test_wrong_document_type_is_fatal() {
    let pipeline = pipeline().await;
    let mut document = model(json!({}));
    document["type"] = json!("FeatureCollection");
    assert!(matches!(
        pipeline.ingest_city_model("m", document).await,
        Err(IngestError::Document(CoreError::InvalidDocument(_)))
    ));
}

#[tokio::test]
async fn test_duplicate_model_uid() {
    let pipeline = pipeline().await;
    let document = model(json!({
        "a": {"type": "Building", "geometry": [surface(&[0, 1, 2])]}
    }));
    pipeline.ingest_city_model("m", document.clone()).await.unwrap();

    let err = pipeline.ingest_city_model("m", document.clone()).await.unwrap_err();
    assert!(matches!(err, IngestError::DuplicateModel(ref uid) if uid == "m"));
    assert_eq!(pipeline.store().count("Building").await, 1);

    // The same objects under another model uid are fine
    pipeline.ingest_city_model("m2", document).await.unwrap();
    assert_eq!(pipeline.store().count("Building").await, 2);
}

fn parent_child_model() -> Value {
    model(json!({
        "A": {"type": "Building", "children": ["B"], "geometry": [surface(&[0, 1, 2, 3])]},
        "B": {"type": "BuildingPart", "parents": ["A"], "geometry": [surface(&[4, 5, 6])]},
        "C": {"type": "Road", "geometry": [surface(&[7, 8, 9])]}
    }))
}

#[tokio::test]
async fn test_cascade_delete_removes_children() {
    let pipeline = pipeline().await;
    pipeline.ingest_city_model("m", parent_child_model()).await.unwrap();

    let report = pipeline.delete_object("m", "A", true).await.unwrap();
    assert_eq!(report.deleted, vec!["A".to_string(), "B".to_string()]);

    assert!(record(&pipeline, StoreKind::Building, "m", "A").await.is_none());
    assert!(record(&pipeline, StoreKind::Building, "m", "B").await.is_none());
    let model = model_record(&pipeline, "m").await;
    let refs: Vec<&str> = model["objects"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["uid"].as_str().unwrap())
        .collect();
    assert_eq!(refs, vec!["C"]);
}

#[tokio::test]
async fn test_delete_child_unlinks_parent() {
    let pipeline = pipeline().await;
    pipeline.ingest_city_model("m", parent_child_model()).await.unwrap();

    let report = pipeline.delete_object("m", "B", false).await.unwrap();
    assert_eq!(report.deleted, vec!["B".to_string()]);

    let a = record(&pipeline, StoreKind::Building, "m", "A").await.unwrap();
    assert_eq!(a["children"], json!([]));
    assert_eq!(model_record(&pipeline, "m").await["objects"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_delete_parent_without_cascade_keeps_child() {
    let pipeline = pipeline().await;
    pipeline.ingest_city_model("m", parent_child_model()).await.unwrap();

    pipeline.delete_object("m", "A", false).await.unwrap();
    let b = record(&pipeline, StoreKind::Building, "m", "B").await.unwrap();
    assert_eq!(b["parents"], json!([]));
}

#[tokio::test]
async fn test_delete_unknown_object_or_model() {
    let pipeline = pipeline().await;
    pipeline.ingest_city_model("m", parent_child_model()).await.unwrap();

    assert!(matches!(
        pipeline.delete_object("m", "nope", true).await,
        Err(StoreError::NotFound { .. })
    ));
    assert!(matches!(
        pipeline.delete_object("other", "A", true).await,
        Err(StoreError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_delete_city_model() {
    let pipeline = pipeline().await;
    pipeline.ingest_city_model("m", parent_child_model()).await.unwrap();
    pipeline.ingest_city_model("keep", parent_child_model()).await.unwrap();

    let report = pipeline.delete_city_model("m").await.unwrap();
    assert_eq!(report.deleted.len(), 3);
    assert_eq!(pipeline.store().count("Building").await, 2);
    assert_eq!(pipeline.store().count("Transportation").await, 1);
    assert_eq!(pipeline.store().count("CityModel").await, 1);
}

#[tokio::test]
async fn test_viewer_gets_highest_lod() {
    let pipeline = pipeline().await;
    pipeline.ingest_city_model("campus", fixture()).await.unwrap();

    let building = pipeline.get_decomposed_object("campus", "Building_A").await.unwrap();
    assert_eq!(building.geometry.len(), 1);
    assert_eq!(building.geometry[0].geometry_type, GeometryType::Solid);
    assert_relative_eq!(building.geometry[0].lod_value(), 2.2);
    // Vertices of dropped geometries stay so indices remain valid
    assert_eq!(building.vertices.len(), 8);
    assert_eq!(building.children, vec!["Part_B".to_string()]);

    let mesh = pipeline.get_object_mesh("campus", "Building_A").await.unwrap();
    assert_eq!(mesh.mesh.triangle_count(), 12);
    assert_eq!(mesh.skipped_surfaces, 0);

    assert!(matches!(
        pipeline.get_decomposed_object("campus", "Group_1").await,
        Err(ObjectError::Store(StoreError::NotFound { .. }))
    ));
}

#[tokio::test]
async fn test_model_extent_in_wgs84() {
    let pipeline = pipeline().await;
    let mut document = model(json!({}));
    document["metadata"] = json!({
        "referenceSystem": "urn:ogc:def:crs:EPSG::32631",
        "geographicalExtent": [500000.0, 5700000.0, 0.0, 501000.0, 5701000.0, 10.0]
    });
    pipeline.ingest_city_model("utm", document).await.unwrap();

    let [sw, ne] = pipeline
        .model_extent_wgs84("utm", &BuiltinReprojector)
        .await
        .unwrap()
        .unwrap();
    assert_relative_eq!(sw[0], 3.0, epsilon = 1e-6);
    assert!(sw[1] > 51.0 && sw[1] < 52.0);
    assert!(ne[0] > sw[0] && ne[1] > sw[1]);

    // The fixture's compound Dutch CRS has no built-in conversion
    pipeline.ingest_city_model("campus", fixture()).await.unwrap();
    assert!(matches!(
        pipeline.model_extent_wgs84("campus", &BuiltinReprojector).await,
        Err(ObjectError::Core(CoreError::UnsupportedCrs(_)))
    ));
}

#[tokio::test]
async fn test_concurrency_limit_does_not_change_the_result() {
    let objects: serde_json::Map<String, Value> = (0..10)
        .map(|i| {
            (
                format!("b{}", i),
                json!({"type": "Building", "geometry": [surface(&[i, i + 1, i + 2])]}),
            )
        })
        .collect();
    let config = PipelineConfig {
        max_in_flight: 1,
        ..PipelineConfig::default()
    };
    let serial = Pipeline::new(MemoryStore::new(), Registry::default(), config)
        .await
        .unwrap();
    let parallel = pipeline().await;

    let a = serial
        .ingest_city_model("m", model(Value::Object(objects.clone())))
        .await
        .unwrap();
    let b = parallel
        .ingest_city_model("m", model(Value::Object(objects)))
        .await
        .unwrap();
    assert_eq!(a.objects.succeeded.len(), 10);
    let uids = |r: &cityjson_lite_processing::IngestReport| -> Vec<String> {
        r.objects.succeeded.iter().map(|o| o.uid.clone()).collect()
    };
    assert_eq!(uids(&a), uids(&b));
}
