//! umbra - deferred Vulkan renderer demo.
//!
//! Renders the built-in demo scene with an orbiting camera.
//!
//! Controls: left-drag orbits, scroll zooms, Space pauses the orbit,
//! Left/Right swing the sun, V toggles volumetric light, +/- change
//! exposure, Backspace removes the newest model, Escape quits.

use std::path::PathBuf;

use anyhow::{Context, Result};
use glam::{Quat, Vec3};
use tracing::{error, info, warn};
use winit::application::ApplicationHandler;
use winit::event::{MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::PhysicalKey;
use winit::window::WindowId;

use umbra_core::{Config, FrameTimer};
use umbra_platform::{InputState, KeyCode, MouseButton, Window};
use umbra_renderer::{FrameOutcome, Renderer};
use umbra_resources::demo_scene;
use umbra_scene::ModelId;

const DEFAULT_CONFIG_PATH: &str = "umbra.toml";

/// Point the camera orbits around.
const ORBIT_TARGET: Vec3 = Vec3::new(0.0, 1.5, 0.0);
const ORBIT_SPEED: f32 = 0.2;
/// Radians per second while an arrow key is held.
const SUN_SPEED: f32 = 0.8;
/// Pixel pitch of trackpad scrolling per wheel line.
const PIXELS_PER_LINE: f32 = 40.0;

struct Orbit {
    azimuth: f32,
    radius: f32,
    height: f32,
    paused: bool,
}

impl Default for Orbit {
    fn default() -> Self {
        Self {
            azimuth: 0.6,
            radius: 22.0,
            height: 9.0,
            paused: false,
        }
    }
}

impl Orbit {
    fn update(&mut self, input: &InputState, dt: f32) {
        if !self.paused {
            self.azimuth += ORBIT_SPEED * dt;
        }
        let (dx, dy) = input.drag_delta(MouseButton::Left);
        self.azimuth -= dx * 0.005;
        self.height = (self.height + dy * 0.05).clamp(1.0, 40.0);
        self.radius = (self.radius - input.scroll_delta()).clamp(5.0, 60.0);
    }
}

struct App {
    config: Config,
    window: Option<Window>,
    renderer: Option<Renderer>,
    input: InputState,
    timer: FrameTimer,
    orbit: Orbit,
    models: Vec<ModelId>,
    /// First fatal error; the event loop exits and `main` returns it.
    fatal: Option<anyhow::Error>,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            window: None,
            renderer: None,
            input: InputState::new(),
            timer: FrameTimer::new(),
            orbit: Orbit::default(),
            models: Vec::new(),
            fatal: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{:#}", err);
        self.fatal.get_or_insert(err);
        event_loop.exit();
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window_config = &self.config.window;
        let window = Window::new(
            event_loop,
            window_config.width,
            window_config.height,
            &window_config.title,
        )
        .context("creating window")?;

        let mut renderer = Renderer::new(&window, &self.config).context("creating renderer")?;
        for model in demo_scene() {
            let id = renderer
                .add_model(&model)
                .with_context(|| format!("uploading model '{}'", model.name))?;
            self.models.push(id);
        }
        info!(
            "Initialization complete, {} model(s) loaded",
            renderer.scene().model_count()
        );

        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }

    fn handle_keys(&mut self, event_loop: &ActiveEventLoop) {
        if self.input.is_key_just_pressed(KeyCode::Escape) {
            info!("Escape pressed, shutting down");
            event_loop.exit();
        }
        if self.input.is_key_just_pressed(KeyCode::Space) {
            self.orbit.paused = !self.orbit.paused;
        }
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        if self.input.is_key_just_pressed(KeyCode::KeyV) {
            let volumetric = renderer.volumetric_mut();
            volumetric.enabled = !volumetric.enabled;
            info!("Volumetric light {}", if volumetric.enabled { "on" } else { "off" });
        }
        let exposure_step = if self.input.is_key_just_pressed(KeyCode::Equal)
            || self.input.is_key_just_pressed(KeyCode::NumpadAdd)
        {
            Some(1.25)
        } else if self.input.is_key_just_pressed(KeyCode::Minus)
            || self.input.is_key_just_pressed(KeyCode::NumpadSubtract)
        {
            Some(0.8)
        } else {
            None
        };
        if self.input.is_key_just_pressed(KeyCode::Backspace)
            && let Some(id) = self.models.pop()
            && let Err(e) = renderer.scene_mut().remove_model(id)
        {
            warn!("Could not remove model: {}", e);
        }
        if let Some(step) = exposure_step {
            let post = renderer.post_mut();
            post.exposure = (post.exposure * step).clamp(0.05, 20.0);
            info!("Exposure {:.2}", post.exposure);
        }
    }

    /// Swings the light around the vertical axis while an arrow key is held.
    fn swing_sun(&mut self, dt: f32) {
        let mut turn = 0.0;
        if self.input.is_key_pressed(KeyCode::ArrowLeft) {
            turn += SUN_SPEED * dt;
        }
        if self.input.is_key_pressed(KeyCode::ArrowRight) {
            turn -= SUN_SPEED * dt;
        }
        if turn == 0.0 {
            return;
        }
        if let Some(renderer) = self.renderer.as_mut() {
            let light = renderer.scene_mut().light_mut();
            light.set_direction(Quat::from_rotation_y(turn) * light.direction());
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let (delta, fps) = self.timer.tick();
        let dt = delta.as_secs_f32();
        self.handle_keys(event_loop);
        self.swing_sun(dt);
        self.orbit.update(&self.input, dt);

        let (Some(window), Some(renderer)) = (self.window.as_mut(), self.renderer.as_mut()) else {
            return Ok(());
        };
        if window.take_resized() {
            renderer.resize();
        }

        let orbit = &self.orbit;
        renderer
            .camera_mut()
            .orbit(ORBIT_TARGET, orbit.radius, orbit.height, orbit.azimuth);

        let outcome = renderer.render_frame(&*window).context("rendering frame")?;
        if let Some(fps) = fps {
            info!("{:.1} fps, {} draws", fps, outcome.draws());
        }
        if outcome == FrameOutcome::Recreated {
            info!("Swapchain recreated at {:?}", renderer.extent());
        }

        self.input.end_frame();
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none()
            && let Err(e) = self.init(event_loop)
        {
            self.fail(event_loop, e);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(window) = self.window.as_mut() {
                    window.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw(event_loop) {
                    self.fail(event_loop, e);
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    if event.state.is_pressed() {
                        self.input.on_key_pressed(key);
                    } else {
                        self.input.on_key_released(key);
                    }
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                if let Some(button) = MouseButton::from_winit(button) {
                    if state.is_pressed() {
                        self.input.on_mouse_pressed(button);
                    } else {
                        self.input.on_mouse_released(button);
                    }
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.input
                    .on_mouse_moved(position.x as f32, position.y as f32);
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(p) => p.y as f32 / PIXELS_PER_LINE,
                };
                self.input.on_scroll(lines);
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref()
            && !window.is_minimized()
        {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        info!(
            "Rendered {} frames in {:.1}s (last {:.1} fps)",
            self.timer.frame_count(),
            self.timer.elapsed_secs(),
            self.timer.average_fps()
        );
        if let Some(renderer) = self.renderer.as_ref()
            && let Err(e) = renderer.wait_idle()
        {
            error!("Failed to wait for device idle on exit: {}", e);
        }
        // The surface inside the renderer must go before its window.
        self.renderer = None;
        self.window = None;
    }
}

fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    umbra_core::init_logging_with(&config.log.filter);
    info!("Starting umbra");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    match app.fatal.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
