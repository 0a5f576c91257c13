// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! CityJSON ingestion pipeline.
//!
//! [`Pipeline::ingest_city_model`] decomposes every city object of a
//! document into a self-contained record, stores it in the collection of
//! its kind and finally stores the model record listing the objects that
//! made it. Objects are processed concurrently on the calling task and fail
//! independently; the outcome of each is in the returned [`BatchResult`].
//!
//! ```rust,ignore
//! use cityjson_lite_processing::{MemoryStore, Pipeline, PipelineConfig, Registry};
//!
//! let config = PipelineConfig::from_env();
//! let pipeline = Pipeline::new(MemoryStore::new(), Registry::default(), config).await?;
//! let report = pipeline.ingest_city_model("rotterdam", document).await?;
//! for failure in &report.objects.failed {
//!     eprintln!("{}: {}", failure.input, failure.error);
//! }
//! ```

pub mod assemble;
pub mod config;
pub mod decompose;
pub mod delete;
pub mod dispatch;
pub mod error;
pub mod graph;
pub mod registry;
pub mod store;
pub mod viewer;

pub use assemble::{BatchResult, Failure, IngestReport, Pipeline};
pub use config::{ExtractionMode, PipelineConfig};
pub use decompose::{decompose_object, SharedModel};
pub use delete::DeleteReport;
pub use dispatch::{ObjectRef, StoredObject};
pub use error::{IngestError, ObjectError, StoreError};
pub use graph::{DanglingRef, ObjectGraph};
pub use registry::Registry;
pub use store::{DocId, Document, DocumentStore, Filter, MemoryStore, Patch};
