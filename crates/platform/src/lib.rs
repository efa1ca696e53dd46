//! Platform layer for the renderer.
//!
//! - Window management via winit, with resize tracking
//! - Vulkan surface creation and the required instance extensions
//! - [`ExtentSource`], the size query the renderer polls while minimized
//! - Raw keyboard and mouse state

mod extent;
mod input;
mod window;

pub use extent::{ExtentSource, FixedExtent};
pub use input::{InputState, KeyCode, MouseButton};
pub use window::{Surface, Window, required_extensions};

// Re-export winit types that users might need
pub use winit::event::{ElementState, MouseScrollDelta, WindowEvent};
pub use winit::event_loop::{ActiveEventLoop, EventLoop};
