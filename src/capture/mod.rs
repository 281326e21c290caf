//! Screen-side plumbing for the control loops.
//!
//! This module provides:
//! - Monitor geometry and absolute input mapping (`CoordinateSpace`)
//! - Region capture (`FrameSource`, GDI backend on Windows)
//! - Target focus checks (`FocusOracle`, foreground-process backend on Windows)

pub mod frames;
pub mod monitor;
#[cfg(windows)]
pub mod screen;
#[cfg(test)]
pub mod testing;
pub mod window;

pub use frames::{CaptureBackend, FrameSource, Region};
pub use monitor::{AbsolutePoint, CoordinateSpace, MonitorDescriptor};
pub use window::FocusOracle;

#[cfg(windows)]
pub use monitor::enumerate_monitors;
#[cfg(windows)]
pub use screen::GdiBackend;
#[cfg(windows)]
pub use window::ForegroundFocus;
