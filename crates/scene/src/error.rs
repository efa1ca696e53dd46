//! Scene error types.

use thiserror::Error;
use umbra_resources::ResourceError;
use umbra_rhi::RhiError;

use crate::scene::ModelId;

#[derive(Error, Debug)]
pub enum SceneError {
    /// GPU buffer, image or descriptor creation failed
    #[error(transparent)]
    Rhi(#[from] RhiError),

    /// A mesh record or texture could not be used
    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error("Unknown model {0:?}")]
    UnknownModel(ModelId),
}

pub type SceneResult<T> = Result<T, SceneError>;
