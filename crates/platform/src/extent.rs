//! Surface size queries decoupled from winit.

use ash::vk;

/// Anything that can report the current drawable size.
///
/// The renderer polls this while a minimized window reports zero size, so
/// implementations must return the live size rather than a cached one.
pub trait ExtentSource {
    fn extent(&self) -> vk::Extent2D;

    /// Whether there is nothing to render into.
    fn is_zero(&self) -> bool {
        let extent = self.extent();
        extent.width == 0 || extent.height == 0
    }
}

/// A size that never changes. Headless use and tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedExtent(pub vk::Extent2D);

impl FixedExtent {
    pub fn new(width: u32, height: u32) -> Self {
        Self(vk::Extent2D { width, height })
    }
}

impl ExtentSource for FixedExtent {
    fn extent(&self) -> vk::Extent2D {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_extent_detection() {
        assert!(FixedExtent::new(0, 720).is_zero());
        assert!(FixedExtent::new(1280, 0).is_zero());
        assert!(!FixedExtent::new(1280, 720).is_zero());
    }

    #[test]
    fn test_fixed_extent_reports_size() {
        let source = FixedExtent::new(800, 600);
        assert_eq!(source.extent().width, 800);
        assert_eq!(source.extent().height, 600);
    }
}
