//! TOML configuration.
//!
//! Every field has a default, so a partial file (or no file at all) is valid.
//!
//! ```toml
//! [window]
//! width = 1920
//! height = 1080
//!
//! [post]
//! exposure = 1.5
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{Error, Result};

/// Root configuration loaded from `umbra.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub renderer: RendererSettings,
    pub post: PostConfig,
    pub volumetric: VolumetricConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            title: "umbra".to_string(),
        }
    }
}

/// GPU-side settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererSettings {
    /// Enable the Khronos validation layer.
    pub validation: bool,
    /// Prefer FIFO presentation over mailbox.
    pub vsync: bool,
    /// Directory holding the compiled `.spv` files.
    pub shader_dir: PathBuf,
    /// Edge length of the square shadow map, in texels.
    pub shadow_map_size: u32,
    /// Clear colour of the lit target, linear RGBA.
    pub clear_color: [f32; 4],
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            validation: cfg!(debug_assertions),
            vsync: false,
            shader_dir: PathBuf::from("shaders/spirv"),
            shadow_map_size: 2048,
            clear_color: [0.02, 0.02, 0.03, 1.0],
        }
    }
}

/// Tone-mapping parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostConfig {
    pub exposure: f32,
    pub gamma: f32,
}

impl Default for PostConfig {
    fn default() -> Self {
        Self {
            exposure: 1.0,
            gamma: 2.2,
        }
    }
}

/// Ray-marched light scattering.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumetricConfig {
    pub enabled: bool,
    pub samples: u32,
    pub scattering: f32,
    pub density: f32,
}

impl Default for VolumetricConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            samples: 32,
            scattering: 0.7,
            density: 0.04,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: crate::DEFAULT_FILTER.to_string(),
        }
    }
}

impl Config {
    /// Parse a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse `path` if it exists, otherwise return the defaults.
    ///
    /// A file that exists but does not parse is still an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Write the configuration as pretty TOML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = toml::from_str("[post]\nexposure = 2.5\n").unwrap();
        assert_eq!(config.post.exposure, 2.5);
        assert_eq!(config.post.gamma, 2.2);
        assert_eq!(config.window, WindowConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("umbra.toml");

        let mut config = Config::default();
        config.window.width = 640;
        config.volumetric.samples = 8;
        config.save(&path).unwrap();

        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[window\nwidth = ").unwrap();
        assert!(matches!(Config::load(&path), Err(Error::Config(_))));
    }
}
