//! Shared foundations for the umbra renderer.
//!
//! - Error types and result aliases
//! - Logging initialization
//! - TOML configuration
//! - Frame timing

mod config;
mod error;
mod logging;
mod timer;

pub use config::{Config, LogConfig, PostConfig, RendererSettings, VolumetricConfig, WindowConfig};
pub use error::{Error, Result};
pub use logging::{init_logging, init_logging_with, DEFAULT_FILTER};
pub use timer::FrameTimer;
