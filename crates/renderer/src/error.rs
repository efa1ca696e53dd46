//! Renderer error types.

use thiserror::Error;
use umbra_rhi::RhiError;
use umbra_scene::SceneError;

use crate::graph::GraphError;

/// Anything that stops the renderer. None of these are recoverable; the
/// application reports them and exits.
#[derive(Error, Debug)]
pub enum RendererError {
    #[error(transparent)]
    Rhi(#[from] RhiError),

    #[error(transparent)]
    Scene(#[from] SceneError),

    /// Window or surface creation failed
    #[error(transparent)]
    Platform(#[from] umbra_core::Error),

    /// Passes recorded out of dependency order
    #[error("Pass graph: {0}")]
    Graph(#[from] GraphError),

    /// Frame protocol misuse, such as a wrong number of frame slots
    #[error("Frame error: {0}")]
    Frame(String),
}

pub type RendererResult<T> = Result<T, RendererError>;
