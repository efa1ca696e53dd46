//! RHI-specific error types.

use std::path::PathBuf;

use ash::vk;
use thiserror::Error;

/// RHI-specific error type.
///
/// Everything here is fatal to the renderer. Out-of-date and suboptimal
/// swapchain results are reported as values by the swapchain and never
/// converted into this type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] vk::Result),

    /// Failed to load Vulkan
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// No suitable GPU found
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// The selected device lacks something the renderer cannot work without
    #[error("Missing device capability: {0}")]
    MissingCapability(String),

    /// SPIR-V file missing on disk
    #[error("Shader not found: {}", .0.display())]
    ShaderNotFound(PathBuf),

    /// Malformed SPIR-V or module creation failure
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// Surface creation error
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Invalid handle or parameter
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Host access outside a buffer's range
    #[error("Out of bounds: offset {offset} + {len} bytes exceeds {size} bytes")]
    OutOfBounds { offset: u64, len: u64, size: u64 },

    /// Pipeline creation error
    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// Descriptor allocation or update error
    #[error("Descriptor error: {0}")]
    DescriptorError(String),
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
