//! Frame sources: on-demand pixel capture of a virtual-desktop region.

use anyhow::Result;
use image::RgbImage;

use super::monitor::MonitorDescriptor;

/// Rectangle in virtual-desktop pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    /// Builds a region, clamping the size to at least 1x1.
    pub fn new(left: i32, top: i32, width: i32, height: i32) -> Self {
        Self {
            left,
            top,
            width: width.max(1) as u32,
            height: height.max(1) as u32,
        }
    }

    pub fn of_monitor(monitor: &MonitorDescriptor) -> Self {
        Self::new(monitor.left, monitor.top, monitor.width, monitor.height)
    }
}

/// Captures screen regions into dense, top-down RGB buffers.
///
/// Every call re-samples the screen; nothing is cached.
pub trait FrameSource {
    fn capture(&mut self, region: &Region) -> Result<RgbImage>;
}

/// Opens a frame source per consumer thread.
pub trait CaptureBackend: Send + Sync {
    fn open(&self) -> Result<Box<dyn FrameSource>>;
}
