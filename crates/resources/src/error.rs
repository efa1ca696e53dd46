//! Error types for resource loading.

use std::path::PathBuf;
use thiserror::Error;

/// Error type for resource loading operations.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// A mesh record is malformed.
    #[error("Invalid mesh '{name}': {message}")]
    InvalidMesh {
        /// Name of the offending mesh.
        name: String,
        /// What is wrong with it.
        message: String,
    },

    /// A model has no meshes at all.
    #[error("Model '{0}' contains no meshes")]
    NoMeshes(String),

    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding error.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// File not found.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
}

/// Result type alias for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;
