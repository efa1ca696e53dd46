//! SPIR-V loading and shader modules.
//!
//! Shaders are compiled ahead of time by `glslc` into `<name>.<stage>.spv`
//! files. A missing file is fatal: it surfaces as
//! [`RhiError::ShaderNotFound`] and propagates out of pass construction.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::path::Path;
//! use umbra_rhi::device::Device;
//! use umbra_rhi::shader::Shader;
//!
//! # fn example(device: Arc<Device>) -> Result<(), umbra_rhi::RhiError> {
//! let vert = Shader::load(device.clone(), Path::new("shaders/spirv"), "geometry.vert")?;
//! let frag = Shader::load(device, Path::new("shaders/spirv"), "geometry.frag")?;
//! # Ok(())
//! # }
//! ```

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

const ENTRY_POINT: &std::ffi::CStr = c"main";
const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Pipeline stage a module is compiled for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn to_vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }

    /// Infers the stage from a `glslc`-style name such as `lighting.frag`.
    pub fn from_name(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(".spv").unwrap_or(name);
        match stem.rsplit('.').next()? {
            "vert" => Some(ShaderStage::Vertex),
            "frag" => Some(ShaderStage::Fragment),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        }
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Decodes SPIR-V bytes into words, checking size and magic number.
pub fn decode_spirv(bytes: &[u8]) -> RhiResult<Vec<u32>> {
    let words = ash::util::read_spv(&mut Cursor::new(bytes))
        .map_err(|e| RhiError::ShaderError(format!("invalid SPIR-V: {e}")))?;
    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(words),
        Some(other) => Err(RhiError::ShaderError(format!(
            "bad SPIR-V magic number {other:#010x}"
        ))),
        None => Err(RhiError::ShaderError("empty SPIR-V module".to_string())),
    }
}

/// Owned `VkShaderModule` with entry point `main`.
pub struct Shader {
    device: Arc<Device>,
    module: vk::ShaderModule,
    stage: ShaderStage,
}

impl Shader {
    /// Loads `<dir>/<name>.spv`, taking the stage from `name`.
    pub fn load(device: Arc<Device>, dir: &Path, name: &str) -> RhiResult<Self> {
        let stage = ShaderStage::from_name(name).ok_or_else(|| {
            RhiError::ShaderError(format!("cannot infer shader stage from '{name}'"))
        })?;
        Self::from_spirv_file(device, &dir.join(format!("{name}.spv")), stage)
    }

    pub fn from_spirv_file(
        device: Arc<Device>,
        path: &Path,
        stage: ShaderStage,
    ) -> RhiResult<Self> {
        debug!("Loading {} shader from {:?}", stage, path);
        let bytes = std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => RhiError::ShaderNotFound(path.to_path_buf()),
            _ => RhiError::ShaderError(format!("failed to read {}: {e}", path.display())),
        })?;
        Self::from_spirv_bytes(device, &bytes, stage)
    }

    pub fn from_spirv_bytes(
        device: Arc<Device>,
        bytes: &[u8],
        stage: ShaderStage,
    ) -> RhiResult<Self> {
        let code = decode_spirv(bytes)?;
        let create_info = vk::ShaderModuleCreateInfo::default().code(&code);
        let module = unsafe { device.handle().create_shader_module(&create_info, None)? };

        info!("Created {} shader module ({} words)", stage, code.len());

        Ok(Self {
            device,
            module,
            stage,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    #[inline]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn stage_create_info(&self) -> vk::PipelineShaderStageCreateInfo<'static> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage.to_vk_stage())
            .module(self.module)
            .name(ENTRY_POINT)
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_shader_module(self.module, None);
        }
        debug!("Destroyed {} shader module", self.stage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_from_name() {
        assert_eq!(ShaderStage::from_name("geometry.vert"), Some(ShaderStage::Vertex));
        assert_eq!(ShaderStage::from_name("blit.frag.spv"), Some(ShaderStage::Fragment));
        assert_eq!(ShaderStage::from_name("noise.comp"), None);
        assert_eq!(ShaderStage::from_name(""), None);
    }

    #[test]
    fn test_stage_flags() {
        assert_eq!(ShaderStage::Vertex.to_vk_stage(), vk::ShaderStageFlags::VERTEX);
        assert_eq!(ShaderStage::Fragment.to_vk_stage(), vk::ShaderStageFlags::FRAGMENT);
    }

    #[test]
    fn test_decode_rejects_unaligned() {
        assert!(matches!(
            decode_spirv(&[0x03, 0x02, 0x23]),
            Err(RhiError::ShaderError(_))
        ));
    }

    #[test]
    fn test_decode_rejects_bad_magic() {
        let bytes = 0xdead_beefu32.to_le_bytes();
        assert!(decode_spirv(&bytes).is_err());
    }

    #[test]
    fn test_decode_accepts_header() {
        let mut bytes = Vec::new();
        for word in [SPIRV_MAGIC, 0x0001_0000, 0, 8, 0] {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        assert_eq!(decode_spirv(&bytes).unwrap().len(), 5);
    }
}
