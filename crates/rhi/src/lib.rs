//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! This crate provides a thin, mostly safe abstraction over Vulkan using `ash`:
//! - Instance, physical device selection and device creation
//! - One-time capability resolution ([`Capabilities`])
//! - Buffers, images with tracked layouts, samplers and uniform buffers
//! - Descriptor layouts, pools and per-frame descriptor sets
//! - Shader modules and immutable graphics pipelines
//! - Command recording, synchronization primitives and the swapchain

mod error;

pub mod buffer;
pub mod capabilities;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod rendering;
pub mod sampler;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod texture;
pub mod uniform;
pub mod vertex;

pub use capabilities::Capabilities;
pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;

/// Number of frames the CPU may record ahead of the GPU.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;
