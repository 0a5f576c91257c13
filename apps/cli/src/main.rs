// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! CLI tool: ingest a CityJSON file into an in-memory document store
//!
//! Prints the ingestion report, and optionally writes it together with the
//! render meshes of the stored objects as JSON.
//!
//! Usage:
//!   cityjson-lite <file.city.json> [options]

mod config;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use cityjson_lite_core::BuiltinReprojector;
use cityjson_lite_processing::{ExtractionMode, IngestReport, MemoryStore, Pipeline, Registry};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use config::Config;

#[derive(Debug)]
struct Args {
    input: PathBuf,
    uid: Option<String>,
    extraction: Option<ExtractionMode>,
    max_in_flight: Option<usize>,
    mesh_out: Option<PathBuf>,
    report_out: Option<PathBuf>,
    keep_failed_edges: bool,
}

fn parse_args(args: &[String]) -> Result<Args> {
    let mut parsed = Args {
        input: PathBuf::from(&args[1]),
        uid: None,
        extraction: None,
        max_in_flight: None,
        mesh_out: None,
        report_out: None,
        keep_failed_edges: false,
    };

    let mut i = 2;
    while i < args.len() {
        let flag = args[i].as_str();
        let mut value = || {
            i += 1;
            args.get(i)
                .cloned()
                .with_context(|| format!("missing value for {}", flag))
        };
        match flag {
            "--uid" => parsed.uid = Some(value()?),
            "--extraction" => {
                let v = value()?;
                parsed.extraction = Some(v.parse().map_err(anyhow::Error::msg)?);
            }
            "--max-in-flight" => {
                let v = value()?;
                let n: usize = v
                    .parse()
                    .with_context(|| format!("invalid --max-in-flight '{}'", v))?;
                if n == 0 {
                    bail!("--max-in-flight must be at least 1");
                }
                parsed.max_in_flight = Some(n);
            }
            "--mesh-out" => parsed.mesh_out = Some(PathBuf::from(value()?)),
            "--report-out" => parsed.report_out = Some(PathBuf::from(value()?)),
            "--keep-failed-edges" => parsed.keep_failed_edges = true,
            other => bail!("unknown option '{}'", other),
        }
        i += 1;
    }
    Ok(parsed)
}

/// Model uid from the file name, `rotterdam.city.json` -> `rotterdam`
fn default_uid(path: &Path) -> String {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("model");
    name.split('.').next().filter(|s| !s.is_empty()).unwrap_or(name).to_string()
}

fn report_json(report: &IngestReport, extent_wgs84: Option<[[f64; 2]; 2]>) -> Value {
    json!({
        "model": report.model_uid,
        "id": report.model_id,
        "stored": report.objects.succeeded,
        "failed": report
            .objects
            .failed
            .iter()
            .map(|f| json!({ "uid": f.input, "error": f.error.to_string() }))
            .collect::<Vec<_>>(),
        "prunedEdges": report.pruned_edges,
        "extentWgs84": extent_wgs84,
    })
}

async fn export_meshes(
    pipeline: &Pipeline<MemoryStore>,
    report: &IngestReport,
    path: &Path,
) -> Result<usize> {
    let mut meshes = Vec::with_capacity(report.objects.succeeded.len());
    for object_ref in &report.objects.succeeded {
        let object_mesh = match pipeline
            .get_object_mesh(&report.model_uid, &object_ref.uid)
            .await
        {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(object = %object_ref.uid, error = %e, "Mesh export failed");
                continue;
            }
        };
        if object_mesh.mesh.is_empty() {
            continue;
        }
        meshes.push(json!({
            "uid": object_mesh.uid,
            "shift": [object_mesh.shift.x, object_mesh.shift.y, object_mesh.shift.z],
            "positions": object_mesh.mesh.positions,
            "normals": object_mesh.mesh.normals,
            "indices": object_mesh.mesh.indices,
        }));
    }
    let count = meshes.len();
    let text = serde_json::to_string(&Value::Array(meshes))?;
    fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
    Ok(count)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let argv: Vec<String> = env::args().collect();
    if argv.len() < 2 || argv[1] == "--help" || argv[1] == "-h" {
        print_usage();
        return Ok(());
    }

    let config = Config::from_env();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.default_log_filter)),
        )
        .init();

    let args = parse_args(&argv)?;
    let mut pipeline_config = config.pipeline.clone();
    if let Some(mode) = args.extraction {
        pipeline_config.extraction = mode;
    }
    if let Some(n) = args.max_in_flight {
        pipeline_config.max_in_flight = n;
    }
    if args.keep_failed_edges {
        pipeline_config.prune_failed_edges = false;
    }

    let text = fs::read_to_string(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let document: Value = serde_json::from_str(&text)
        .with_context(|| format!("parsing {}", args.input.display()))?;
    let uid = args.uid.clone().unwrap_or_else(|| default_uid(&args.input));

    let pipeline = Pipeline::new(
        MemoryStore::new(),
        Registry::with_prefix(&config.collection_prefix),
        pipeline_config,
    )
    .await?;
    let report = pipeline.ingest_city_model(&uid, document).await?;

    let extent_wgs84 = match pipeline.model_extent_wgs84(&uid, &BuiltinReprojector).await {
        Ok(extent) => extent,
        Err(e) => {
            tracing::info!(model = %uid, reason = %e, "No WGS84 extent");
            None
        }
    };

    println!(
        "Model '{}': {} objects stored, {} failed, {} links pruned",
        report.model_uid,
        report.objects.succeeded.len(),
        report.objects.failed.len(),
        report.pruned_edges
    );
    for failure in &report.objects.failed {
        println!("  {}: {}", failure.input, failure.error);
    }
    if let Some([[west, south], [east, north]]) = extent_wgs84 {
        println!("  extent (WGS84): {:.6},{:.6} .. {:.6},{:.6}", west, south, east, north);
    }

    if let Some(path) = &args.report_out {
        let text = serde_json::to_string_pretty(&report_json(&report, extent_wgs84))?;
        fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
        println!("Report written to {}", path.display());
    }

    if let Some(path) = &args.mesh_out {
        let count = export_meshes(&pipeline, &report, path).await?;
        println!("{} meshes written to {}", count, path.display());
    }

    Ok(())
}

fn print_usage() {
    println!(
        r#"CityJSON-Lite ingestion
=======================

Decomposes every city object of a CityJSON file into a self-contained record
and stores it in an in-memory document store.

USAGE:
  cityjson-lite <file.city.json> [OPTIONS]

ARGUMENTS:
  <file.city.json>          CityJSON document to ingest

OPTIONS:
  --uid <uid>               Model uid (default: file name up to the first '.')
  --extraction <mode>       slice, strict or compact (default: slice)
  --max-in-flight <n>       Objects processed at once (default: 256)
  --keep-failed-edges       Keep links to objects that failed
  --report-out <path>       Write the ingestion report as JSON
  --mesh-out <path>         Write render meshes of the stored objects as JSON
  -h, --help                Show this help message

ENVIRONMENT:
  CITYJSON_EXTRACTION, CITYJSON_MAX_IN_FLIGHT, CITYJSON_PRUNE_FAILED_EDGES,
  CITYJSON_FILL_EXTENT, CITYJSON_COLLECTION_PREFIX, RUST_LOG
"#
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(rest: &[&str]) -> Vec<String> {
        std::iter::once("cityjson-lite")
            .chain(rest.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_parse_args() {
        let args = parse_args(&argv(&[
            "delft.city.json",
            "--uid",
            "delft",
            "--extraction",
            "compact",
            "--keep-failed-edges",
        ]))
        .unwrap();
        assert_eq!(args.input, PathBuf::from("delft.city.json"));
        assert_eq!(args.uid.as_deref(), Some("delft"));
        assert_eq!(args.extraction, Some(ExtractionMode::Compact));
        assert!(args.keep_failed_edges);
        assert!(args.mesh_out.is_none());
    }

    #[test]
    fn test_parse_args_errors() {
        assert!(parse_args(&argv(&["a.json", "--uid"])).is_err());
        assert!(parse_args(&argv(&["a.json", "--extraction", "sparse"])).is_err());
        assert!(parse_args(&argv(&["a.json", "--max-in-flight", "0"])).is_err());
        assert!(parse_args(&argv(&["a.json", "--bogus"])).is_err());
    }

    #[test]
    fn test_default_uid() {
        assert_eq!(default_uid(Path::new("data/rotterdam.city.json")), "rotterdam");
        assert_eq!(default_uid(Path::new("plain")), "plain");
    }
}
