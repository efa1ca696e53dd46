//! The winit window and the Vulkan surface presented to it.

use std::ffi::{CStr, c_char};
use std::sync::Arc;

use ash::vk;
use raw_window_handle::{
    HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle,
};
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window as WinitWindow, WindowAttributes};

use umbra_core::{Error, Result};

use crate::extent::ExtentSource;

/// Owned `VkSurfaceKHR` with the loader that destroys it.
///
/// Must be dropped after every swapchain built on it and before the
/// instance it came from.
pub struct Surface {
    handle: vk::SurfaceKHR,
    loader: ash::khr::surface::Instance,
}

impl Surface {
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// Capability, format and present-mode queries.
    #[inline]
    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.loader
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        // SAFETY: created by ash_window on the loader's instance and
        // destroyed only here.
        unsafe {
            self.loader.destroy_surface(self.handle, None);
        }
        tracing::debug!("Vulkan surface destroyed");
    }
}

/// A resizable winit window.
///
/// Resize events only raise a flag; the app hands it to the renderer with
/// [`take_resized`](Self::take_resized), which rebuilds after the next
/// present.
pub struct Window {
    window: Arc<WinitWindow>,
    last_size: vk::Extent2D,
    resized: bool,
}

impl Window {
    pub fn new(event_loop: &ActiveEventLoop, width: u32, height: u32, title: &str) -> Result<Self> {
        let attrs = WindowAttributes::default()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(width, height))
            .with_resizable(true);

        let window = event_loop
            .create_window(attrs)
            .map_err(|e| Error::Window(e.to_string()))?;

        tracing::info!("Window created: {}x{}", width, height);

        Ok(Self {
            window: Arc::new(window),
            last_size: vk::Extent2D { width, height },
            resized: false,
        })
    }

    /// Records the size from a resize event. A zero size still counts; the
    /// frame manager waits it out before rebuilding.
    pub fn resize(&mut self, width: u32, height: u32) {
        let size = vk::Extent2D { width, height };
        if size == self.last_size {
            return;
        }
        self.last_size = size;
        self.resized = true;
        tracing::debug!("Window resized: {}x{}", width, height);
    }

    /// Whether a resize happened since the last call. Clears the flag.
    pub fn take_resized(&mut self) -> bool {
        std::mem::take(&mut self.resized)
    }

    /// Minimized windows report a zero size on most platforms, and some
    /// only report it through the size.
    pub fn is_minimized(&self) -> bool {
        self.window.is_minimized().unwrap_or(false) || self.is_zero()
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    /// Instance extensions needed to create a surface for this window.
    pub fn required_extensions(&self) -> Result<Vec<*const c_char>> {
        let (display, _) = self.raw_handles()?;
        required_extensions(display)
    }

    /// Creates the surface to present to.
    ///
    /// `instance` must have been created with
    /// [`required_extensions`](Self::required_extensions) enabled and must
    /// outlive the returned [`Surface`].
    pub fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> Result<Surface> {
        let (display, window) = self.raw_handles()?;

        // SAFETY: both handles come from the live winit window owned by self.
        let handle = unsafe { ash_window::create_surface(entry, instance, display, window, None) }
            .map_err(|e| Error::Surface(format!("Failed to create Vulkan surface: {}", e)))?;

        tracing::info!("Vulkan surface created");

        Ok(Surface {
            handle,
            loader: ash::khr::surface::Instance::new(entry, instance),
        })
    }

    fn raw_handles(&self) -> Result<(RawDisplayHandle, RawWindowHandle)> {
        let display = self
            .window
            .display_handle()
            .map_err(|e| Error::Window(format!("No display handle: {}", e)))?;
        let window = self
            .window
            .window_handle()
            .map_err(|e| Error::Window(format!("No window handle: {}", e)))?;
        Ok((display.as_raw(), window.as_raw()))
    }
}

impl ExtentSource for Window {
    /// The live size, not the last event's, so polling through a minimize
    /// sees the restore.
    fn extent(&self) -> vk::Extent2D {
        let size = self.window.inner_size();
        vk::Extent2D {
            width: size.width,
            height: size.height,
        }
    }
}

/// Instance extensions required to present to `display`.
///
/// The pointers reference static strings owned by the loader.
pub fn required_extensions(display: RawDisplayHandle) -> Result<Vec<*const c_char>> {
    let extensions = ash_window::enumerate_required_extensions(display)
        .map_err(|e| Error::Surface(format!("Failed to enumerate surface extensions: {}", e)))?;

    tracing::debug!(
        "Surface extensions: {:?}",
        extensions
            .iter()
            // SAFETY: ash_window returns null-terminated static strings.
            .map(|&ext| unsafe { CStr::from_ptr(ext) })
            .collect::<Vec<_>>()
    );

    Ok(extensions.to_vec())
}
