//! Main renderer orchestration.
//!
//! [`Renderer`] owns every Vulkan object and hands the frame protocol a
//! [`FrameTarget`] borrowing the parts a frame touches.

use std::mem::ManuallyDrop;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info};

use umbra_core::{Config, PostConfig, VolumetricConfig};
use umbra_platform::{ExtentSource, Surface, Window};
use umbra_resources::ModelData;
use umbra_rhi::command::{CommandBuffer, CommandPool};
use umbra_rhi::device::Device;
use umbra_rhi::instance::Instance;
use umbra_rhi::physical_device::select_physical_device;
use umbra_rhi::swapchain::Swapchain;
use umbra_rhi::sync::FrameSync;
use umbra_rhi::{MAX_FRAMES_IN_FLIGHT, RhiError, RhiResult};
use umbra_scene::{Camera, ModelId, Scene};

use crate::chain::{ChainConfig, PassChain};
use crate::error::RendererResult;
use crate::frame_manager::{
    Acquire, FrameContext, FrameManager, FrameOutcome, PresentStatus, PresentSurface,
};
use crate::passes::FrameInputs;

fn aspect(extent: vk::Extent2D) -> f32 {
    extent.width as f32 / extent.height.max(1) as f32
}

/// The deferred renderer.
///
/// `ManuallyDrop` fields are released in [`Drop`] after the device is idle:
/// everything created from the device first, then the swapchain, the
/// surface, the device and finally the instance.
pub struct Renderer {
    frames: ManuallyDrop<FrameManager<FrameSync>>,
    command_buffers: Vec<CommandBuffer>,
    command_pool: ManuallyDrop<CommandPool>,
    passes: ManuallyDrop<PassChain>,
    scene: ManuallyDrop<Scene>,
    swapchain: ManuallyDrop<Swapchain>,
    surface: ManuallyDrop<Surface>,
    device: ManuallyDrop<Arc<Device>>,
    instance: ManuallyDrop<Instance>,
    camera: Camera,
}

impl Renderer {
    /// Creates the instance, device, swapchain, scene and passes for
    /// `window`.
    ///
    /// # Errors
    ///
    /// Any failure here is fatal: a missing loader, no suitable GPU, a
    /// missing shader, or a failed allocation.
    pub fn new(window: &Window, config: &Config) -> RendererResult<Self> {
        info!("Initializing renderer");

        let extensions = window.required_extensions()?;
        let instance = Instance::new(
            &config.window.title,
            config.renderer.validation,
            &extensions,
        )?;
        let surface = window.create_surface(instance.entry(), instance.handle())?;

        let physical =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        info!(
            "Selected GPU: {} ({})",
            physical.device_name(),
            physical.device_type_name()
        );
        let device = Device::new(&instance, &physical)?;

        let swapchain = Swapchain::new(
            &instance,
            device.clone(),
            surface.handle(),
            window.extent(),
            config.renderer.vsync,
        )?;
        info!(
            "Presenting {} images with {:?}",
            swapchain.image_count(),
            swapchain.present_mode()
        );

        let command_pool = CommandPool::new(device.clone())?;
        let command_buffers = command_pool.allocate(MAX_FRAMES_IN_FLIGHT as u32)?;
        let syncs = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| FrameSync::new(device.clone()))
            .collect::<RhiResult<Vec<_>>>()?;
        let frames = FrameManager::new(syncs)?;

        let scene = Scene::new(device.clone())?;
        let passes = PassChain::new(
            device.clone(),
            ChainConfig {
                settings: &config.renderer,
                post: config.post,
                volumetric: config.volumetric,
                extent: swapchain.extent(),
                target_format: swapchain.format(),
                material_layout: scene.material_layout().handle(),
            },
        )?;

        let mut camera = Camera::new();
        camera.set_aspect(aspect(swapchain.extent()));

        info!("Renderer initialized");

        Ok(Self {
            frames: ManuallyDrop::new(frames),
            command_buffers,
            command_pool: ManuallyDrop::new(command_pool),
            passes: ManuallyDrop::new(passes),
            scene: ManuallyDrop::new(scene),
            swapchain: ManuallyDrop::new(swapchain),
            surface: ManuallyDrop::new(surface),
            device: ManuallyDrop::new(device),
            instance: ManuallyDrop::new(instance),
            camera,
        })
    }

    /// Rebuilds the swapchain after the next present.
    pub fn resize(&mut self) {
        self.frames.request_resize();
    }

    /// Runs one frame against the window's current size.
    pub fn render_frame(&mut self, window: &dyn ExtentSource) -> RendererResult<FrameOutcome> {
        let mut target = FrameTarget {
            device: &self.device,
            swapchain: &mut self.swapchain,
            command_buffers: &self.command_buffers,
            passes: &mut self.passes,
            scene: &mut self.scene,
            camera: &mut self.camera,
        };
        self.frames.render_frame(&mut target, window)
    }

    /// Uploads `data` and adds it to the scene.
    pub fn add_model(&mut self, data: &ModelData) -> RendererResult<ModelId> {
        Ok(self.scene.add_model(data)?)
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn post_mut(&mut self) -> &mut PostConfig {
        self.passes.post_mut()
    }

    pub fn volumetric_mut(&mut self) -> &mut VolumetricConfig {
        self.passes.volumetric_mut()
    }

    /// Frames submitted so far.
    pub fn frame_number(&self) -> u64 {
        self.frames.frame_number()
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    pub fn format(&self) -> vk::Format {
        self.swapchain.format()
    }

    pub fn wait_idle(&self) -> RendererResult<()> {
        Ok(self.device.wait_idle()?)
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during renderer drop: {}", e);
        }

        unsafe {
            ManuallyDrop::drop(&mut self.frames);
            self.command_buffers.clear();
            ManuallyDrop::drop(&mut self.command_pool);
            ManuallyDrop::drop(&mut self.passes);
            self.scene.flush_retired();
            ManuallyDrop::drop(&mut self.scene);
            ManuallyDrop::drop(&mut self.swapchain);
            ManuallyDrop::drop(&mut self.surface);
            ManuallyDrop::drop(&mut self.device);
            ManuallyDrop::drop(&mut self.instance);
        }

        info!("Renderer destroyed");
    }
}

/// The renderer's side of one frame: everything the frame protocol acquires
/// from, records into, submits and presents.
pub struct FrameTarget<'a> {
    device: &'a Arc<Device>,
    swapchain: &'a mut Swapchain,
    command_buffers: &'a [CommandBuffer],
    passes: &'a mut PassChain,
    scene: &'a mut Scene,
    camera: &'a mut Camera,
}

impl PresentSurface for FrameTarget<'_> {
    type Sync = FrameSync;

    fn acquire(&mut self, sync: &FrameSync) -> RendererResult<Acquire> {
        match self
            .swapchain
            .acquire_next_image(sync.image_available_semaphore().handle())
        {
            Ok((index, suboptimal)) => Ok(Acquire::Image { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Acquire::OutOfDate),
            Err(e) => Err(RhiError::from(e).into()),
        }
    }

    fn record(&mut self, frame: FrameContext) -> RendererResult<u32> {
        // The slot's fence has signaled, so its resources are free to reuse.
        self.scene.update();

        let cmd = &self.command_buffers[frame.slot];
        cmd.reset()?;
        cmd.begin()?;

        let inputs = FrameInputs {
            cmd,
            slot: frame.slot,
            camera: &*self.camera,
            scene: &*self.scene,
        };
        let (target, target_depth) = self.swapchain.targets_mut(frame.image_index as usize);
        let draws = self.passes.record(&inputs, target, target_depth)?;

        cmd.end()?;
        Ok(draws)
    }

    fn submit(&mut self, frame: FrameContext, sync: &FrameSync) -> RendererResult<()> {
        let wait_semaphores = [sync.image_available_semaphore().handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [self.command_buffers[frame.slot].handle()];
        let signal_semaphores = [sync.render_finished_semaphore().handle()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .handle()
                .queue_submit(
                    self.device.graphics_queue(),
                    &[submit_info],
                    sync.in_flight_fence().handle(),
                )
                .map_err(RhiError::from)?;
        }
        Ok(())
    }

    fn present(&mut self, frame: FrameContext, sync: &FrameSync) -> RendererResult<PresentStatus> {
        match self
            .swapchain
            .present(frame.image_index, sync.render_finished_semaphore().handle())
        {
            Ok(false) => Ok(PresentStatus::Optimal),
            Ok(true) => {
                debug!("Present reported a suboptimal swapchain");
                Ok(PresentStatus::Stale)
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Present returned ERROR_OUT_OF_DATE_KHR");
                Ok(PresentStatus::Stale)
            }
            Err(e) => Err(RhiError::from(e).into()),
        }
    }

    fn rebuild(&mut self, extent: vk::Extent2D) -> RendererResult<()> {
        self.swapchain.recreate(extent)?;
        let extent = self.swapchain.extent();
        self.passes.resize(extent, self.swapchain.format())?;
        self.camera.set_aspect(aspect(extent));
        info!("Rebuilt frame targets at {}x{}", extent.width, extent.height);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aspect_tolerates_zero_height() {
        let wide = vk::Extent2D {
            width: 1920,
            height: 1080,
        };
        assert!((aspect(wide) - 16.0 / 9.0).abs() < 1e-6);
        let flat = vk::Extent2D {
            width: 800,
            height: 0,
        };
        assert_eq!(aspect(flat), 800.0);
    }
}
