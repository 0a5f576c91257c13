use thiserror::Error;

/// Result type for geometry operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during geometry processing
#[derive(Error, Debug)]
pub enum Error {
    #[error("Triangulation failed: {0}")]
    TriangulationError(String),

    #[error("Degenerate surface: {0}")]
    DegenerateSurface(String),

    #[error("Template index {index} out of range ({count} templates)")]
    TemplateOutOfRange { index: i64, count: usize },

    #[error("Template {template} references vertex {index} outside its pool of {len}")]
    TemplateVertexOutOfRange { template: i64, index: i64, len: usize },

    #[error("Instance anchor {anchor} out of range (pool has {len} vertices)")]
    AnchorOutOfRange { anchor: i64, len: usize },

    #[error("Template {0} is itself a GeometryInstance")]
    NestedInstance(i64),

    #[error("Invalid transformation matrix: {0}")]
    InvalidMatrix(String),

    #[error("Core model error: {0}")]
    CoreError(#[from] cityjson_lite_core::Error),
}
