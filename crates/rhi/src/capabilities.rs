//! Device capability resolution.
//!
//! Optional Vulkan entry points (dynamic rendering on pre-1.3 drivers,
//! debug-utils labels) and format choices are resolved exactly once while the
//! logical device is created. The result is an immutable [`Capabilities`]
//! value owned by the [`Device`](crate::device::Device) and handed to whatever
//! records commands.

use ash::vk;
use tracing::{debug, info};

use crate::error::{RhiError, RhiResult};
use crate::physical_device::PhysicalDeviceInfo;

/// Depth formats in order of preference. The renderer samples depth in later
/// passes, so candidates must also support `SAMPLED_IMAGE`.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// How `vkCmdBeginRendering` is reached on this device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderingPath {
    /// Vulkan 1.3 core entry points.
    Core,
    /// `VK_KHR_dynamic_rendering` on a 1.2 device.
    Extension,
}

impl RenderingPath {
    /// Picks the dispatch path for a device, or `None` if dynamic rendering
    /// is unavailable altogether.
    pub fn resolve(api_version: u32, has_khr_extension: bool) -> Option<Self> {
        let major = vk::api_version_major(api_version);
        let minor = vk::api_version_minor(api_version);
        if major > 1 || (major == 1 && minor >= 3) {
            Some(Self::Core)
        } else if major == 1 && minor == 2 && has_khr_extension {
            Some(Self::Extension)
        } else {
            None
        }
    }
}

enum DynamicRendering {
    Core(ash::Device),
    Extension(ash::khr::dynamic_rendering::Device),
}

/// Immutable set of resolved device capabilities.
pub struct Capabilities {
    dynamic_rendering: DynamicRendering,
    debug_utils: Option<ash::ext::debug_utils::Device>,
    depth_format: vk::Format,
    max_sampler_anisotropy: f32,
    min_uniform_buffer_offset_alignment: vk::DeviceSize,
}

impl Capabilities {
    /// Loads function tables and picks formats for a freshly created device.
    ///
    /// `debug_utils_enabled` must reflect whether the instance was created
    /// with `VK_EXT_debug_utils`; the label functions are only loaded then.
    pub fn resolve(
        instance: &ash::Instance,
        physical_device: &PhysicalDeviceInfo,
        device: &ash::Device,
        debug_utils_enabled: bool,
    ) -> RhiResult<Self> {
        let dynamic_rendering = match physical_device.rendering_path {
            RenderingPath::Core => DynamicRendering::Core(device.clone()),
            RenderingPath::Extension => DynamicRendering::Extension(
                ash::khr::dynamic_rendering::Device::new(instance, device),
            ),
        };

        let debug_utils =
            debug_utils_enabled.then(|| ash::ext::debug_utils::Device::new(instance, device));

        let depth_format = first_supported_format(&DEPTH_FORMAT_CANDIDATES, |format| {
            let props = unsafe {
                instance.get_physical_device_format_properties(physical_device.device, format)
            };
            props.optimal_tiling_features.contains(
                vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
                    | vk::FormatFeatureFlags::SAMPLED_IMAGE,
            )
        })
        .ok_or_else(|| RhiError::MissingCapability("sampleable depth format".to_string()))?;

        let limits = &physical_device.properties.limits;

        let caps = Self {
            dynamic_rendering,
            debug_utils,
            depth_format,
            max_sampler_anisotropy: limits.max_sampler_anisotropy,
            min_uniform_buffer_offset_alignment: limits.min_uniform_buffer_offset_alignment.max(1),
        };

        info!(
            "Capabilities: rendering={:?}, labels={}, depth={:?}, ubo alignment={}",
            physical_device.rendering_path,
            caps.debug_utils.is_some(),
            caps.depth_format,
            caps.min_uniform_buffer_offset_alignment
        );

        Ok(caps)
    }

    /// Depth format used for every depth attachment.
    #[inline]
    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    #[inline]
    pub fn max_sampler_anisotropy(&self) -> f32 {
        self.max_sampler_anisotropy
    }

    /// Required alignment between per-frame regions of one uniform buffer.
    #[inline]
    pub fn min_uniform_buffer_offset_alignment(&self) -> vk::DeviceSize {
        self.min_uniform_buffer_offset_alignment
    }

    /// Whether debug labels will reach a debugger.
    #[inline]
    pub fn has_debug_labels(&self) -> bool {
        self.debug_utils.is_some()
    }

    pub(crate) unsafe fn cmd_begin_rendering(
        &self,
        cmd: vk::CommandBuffer,
        info: &vk::RenderingInfo<'_>,
    ) {
        unsafe {
            match &self.dynamic_rendering {
                DynamicRendering::Core(device) => device.cmd_begin_rendering(cmd, info),
                DynamicRendering::Extension(ext) => ext.cmd_begin_rendering(cmd, info),
            }
        }
    }

    pub(crate) unsafe fn cmd_end_rendering(&self, cmd: vk::CommandBuffer) {
        unsafe {
            match &self.dynamic_rendering {
                DynamicRendering::Core(device) => device.cmd_end_rendering(cmd),
                DynamicRendering::Extension(ext) => ext.cmd_end_rendering(cmd),
            }
        }
    }

    pub(crate) unsafe fn cmd_begin_label(&self, cmd: vk::CommandBuffer, name: &std::ffi::CStr) {
        if let Some(debug_utils) = &self.debug_utils {
            let label = vk::DebugUtilsLabelEXT::default().label_name(name);
            unsafe { debug_utils.cmd_begin_debug_utils_label(cmd, &label) };
        }
    }

    pub(crate) unsafe fn cmd_end_label(&self, cmd: vk::CommandBuffer) {
        if let Some(debug_utils) = &self.debug_utils {
            unsafe { debug_utils.cmd_end_debug_utils_label(cmd) };
        }
    }

    /// Attaches a debug name to a Vulkan object. No-op without debug utils.
    pub fn set_object_name<H: vk::Handle>(&self, handle: H, name: &std::ffi::CStr) {
        let Some(debug_utils) = &self.debug_utils else {
            return;
        };
        let info = vk::DebugUtilsObjectNameInfoEXT::default()
            .object_handle(handle)
            .object_name(name);
        if let Err(e) = unsafe { debug_utils.set_debug_utils_object_name(&info) } {
            debug!("Failed to name object {:?}: {:?}", name, e);
        }
    }
}

/// Returns the first candidate accepted by `supported`.
pub fn first_supported_format(
    candidates: &[vk::Format],
    mut supported: impl FnMut(vk::Format) -> bool,
) -> Option<vk::Format> {
    candidates.iter().copied().find(|&format| supported(format))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rendering_path_core_on_1_3() {
        let version = vk::make_api_version(0, 1, 3, 250);
        assert_eq!(RenderingPath::resolve(version, false), Some(RenderingPath::Core));
        assert_eq!(RenderingPath::resolve(version, true), Some(RenderingPath::Core));
    }

    #[test]
    fn test_rendering_path_extension_on_1_2() {
        let version = vk::make_api_version(0, 1, 2, 0);
        assert_eq!(
            RenderingPath::resolve(version, true),
            Some(RenderingPath::Extension)
        );
        assert_eq!(RenderingPath::resolve(version, false), None);
    }

    #[test]
    fn test_rendering_path_unavailable_on_1_1() {
        let version = vk::make_api_version(0, 1, 1, 0);
        assert_eq!(RenderingPath::resolve(version, true), None);
    }

    #[test]
    fn test_first_supported_format_respects_order() {
        let picked = first_supported_format(&DEPTH_FORMAT_CANDIDATES, |f| {
            f != vk::Format::D32_SFLOAT
        });
        assert_eq!(picked, Some(vk::Format::D32_SFLOAT_S8_UINT));
        assert_eq!(first_supported_format(&DEPTH_FORMAT_CANDIDATES, |_| false), None);
    }

    #[test]
    fn test_capabilities_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Capabilities>();
    }
}
