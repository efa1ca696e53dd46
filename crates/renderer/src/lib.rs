//! Deferred rendering on top of the RHI.
//!
//! This crate orchestrates the rendering process:
//! - The frame protocol over [`MAX_FRAMES_IN_FLIGHT`] slots
//! - The seven passes and their ordering graph
//! - Uniform blocks shared with the shaders
//! - The [`Renderer`] that owns all of it

mod chain;
pub mod error;
pub mod frame;
pub mod frame_manager;
pub mod graph;
pub mod passes;
mod renderer;
pub mod ubo;

pub use chain::{ChainConfig, PassChain};
pub use error::{RendererError, RendererResult};
pub use frame::{FrameSlots, FrameState};
pub use frame_manager::{FrameManager, FrameOutcome};
pub use graph::{PassGraph, PassId};
pub use renderer::{FrameTarget, Renderer};
pub use umbra_rhi::MAX_FRAMES_IN_FLIGHT;
