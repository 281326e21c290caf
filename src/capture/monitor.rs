//! Monitor geometry and the absolute input coordinate space.
//!
//! Synthetic absolute pointer input addresses the whole virtual desktop with
//! a 0..=65535 range on each axis. `CoordinateSpace` owns the monitor list
//! (enumerated once at startup) and the currently selected monitor.

use std::sync::Arc;

use parking_lot::RwLock;

/// Smallest virtual-desktop extent used as a divisor.
const MIN_EXTENT: i32 = 2;

/// Largest normalized absolute coordinate.
const ABSOLUTE_MAX: f64 = 65535.0;

/// One physical display in virtual-desktop pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MonitorDescriptor {
    pub index: usize,
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
}

impl MonitorDescriptor {
    pub fn right(&self) -> i32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.top + self.height
    }

    /// Returns `(left, top, right, bottom)`.
    pub fn rect(&self) -> (i32, i32, i32, i32) {
        (self.left, self.top, self.right(), self.bottom())
    }

    /// Converts a fraction of this monitor's size to a virtual-desktop pixel.
    pub fn point_at(&self, fx: f32, fy: f32) -> (i32, i32) {
        (
            self.left + (self.width as f32 * fx) as i32,
            self.top + (self.height as f32 * fy) as i32,
        )
    }
}

/// A point in the normalized absolute input space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AbsolutePoint {
    pub x: u16,
    pub y: u16,
}

/// Virtual desktop bounds plus the selected monitor.
pub struct CoordinateSpace {
    monitors: Vec<Arc<MonitorDescriptor>>,
    virt_left: i32,
    virt_top: i32,
    virt_width: i32,
    virt_height: i32,
    current: RwLock<Arc<MonitorDescriptor>>,
}

impl CoordinateSpace {
    /// Builds the space from enumerated monitors. The first monitor starts selected.
    ///
    /// An empty list falls back to a single 1920x1080 monitor at the origin.
    pub fn new(mut monitors: Vec<MonitorDescriptor>) -> Self {
        if monitors.is_empty() {
            crate::log("No monitors enumerated, assuming a single 1920x1080 display");
            monitors.push(MonitorDescriptor {
                index: 0,
                left: 0,
                top: 0,
                width: 1920,
                height: 1080,
            });
        }

        let left = monitors.iter().map(|m| m.left).min().unwrap_or(0);
        let top = monitors.iter().map(|m| m.top).min().unwrap_or(0);
        let right = monitors.iter().map(|m| m.right()).max().unwrap_or(0);
        let bottom = monitors.iter().map(|m| m.bottom()).max().unwrap_or(0);

        let monitors: Vec<Arc<MonitorDescriptor>> = monitors.into_iter().map(Arc::new).collect();
        let current = RwLock::new(monitors[0].clone());

        Self {
            monitors,
            virt_left: left,
            virt_top: top,
            virt_width: (right - left).max(MIN_EXTENT),
            virt_height: (bottom - top).max(MIN_EXTENT),
            current,
        }
    }

    pub fn monitors(&self) -> &[Arc<MonitorDescriptor>] {
        &self.monitors
    }

    /// Returns `(left, top, width, height)` of the virtual desktop.
    pub fn virtual_bounds(&self) -> (i32, i32, i32, i32) {
        (self.virt_left, self.virt_top, self.virt_width, self.virt_height)
    }

    /// Maps a virtual-desktop pixel into the absolute input range.
    pub fn to_absolute(&self, x: i32, y: i32) -> AbsolutePoint {
        AbsolutePoint {
            x: normalize(x - self.virt_left, self.virt_width),
            y: normalize(y - self.virt_top, self.virt_height),
        }
    }

    /// Inverse of `to_absolute`.
    pub fn to_screen(&self, point: AbsolutePoint) -> (i32, i32) {
        (
            self.virt_left + denormalize(point.x, self.virt_width),
            self.virt_top + denormalize(point.y, self.virt_height),
        )
    }

    pub fn current_monitor(&self) -> Arc<MonitorDescriptor> {
        self.current.read().clone()
    }

    /// Selects a monitor by list position. Returns false if out of range.
    pub fn select_monitor(&self, index: usize) -> bool {
        let Some(monitor) = self.monitors.get(index) else {
            return false;
        };
        *self.current.write() = monitor.clone();
        true
    }

    /// Steps through the monitor list, wrapping at both ends.
    pub fn cycle_monitor(&self, delta: i32) -> Arc<MonitorDescriptor> {
        let mut current = self.current.write();
        let count = self.monitors.len() as i32;
        let position = self
            .monitors
            .iter()
            .position(|m| Arc::ptr_eq(m, &*current))
            .unwrap_or(0) as i32;
        let next = (position + delta).rem_euclid(count) as usize;
        *current = self.monitors[next].clone();
        current.clone()
    }

    /// Selects the monitor whose rectangle equals `rect` exactly.
    ///
    /// Returns true only if the selection changed.
    pub fn select_monitor_matching(&self, rect: (i32, i32, i32, i32)) -> bool {
        let Some(found) = self.monitors.iter().find(|m| m.rect() == rect) else {
            return false;
        };
        let mut current = self.current.write();
        if Arc::ptr_eq(found, &*current) {
            return false;
        }
        *current = found.clone();
        true
    }
}

fn normalize(offset: i32, extent: i32) -> u16 {
    let scaled = offset as f64 * ABSOLUTE_MAX / (extent - 1) as f64;
    scaled.round().clamp(0.0, ABSOLUTE_MAX) as u16
}

fn denormalize(value: u16, extent: i32) -> i32 {
    (value as f64 * (extent - 1) as f64 / ABSOLUTE_MAX).round() as i32
}

#[cfg(windows)]
pub use self::win32::{enumerate_monitors, monitor_rect_of_window};

#[cfg(windows)]
mod win32 {
    use anyhow::{anyhow, Result};
    use windows::Win32::Foundation::{BOOL, HWND, LPARAM, RECT, TRUE};
    use windows::Win32::Graphics::Gdi::{
        EnumDisplayMonitors, GetMonitorInfoW, MonitorFromWindow, HDC, HMONITOR, MONITORINFO,
        MONITOR_DEFAULTTONEAREST,
    };

    use super::MonitorDescriptor;

    fn monitor_rect(monitor: HMONITOR) -> Option<RECT> {
        let mut info = MONITORINFO {
            cbSize: std::mem::size_of::<MONITORINFO>() as u32,
            ..Default::default()
        };
        unsafe { GetMonitorInfoW(monitor, &mut info) }
            .as_bool()
            .then_some(info.rcMonitor)
    }

    /// Lists every attached display in enumeration order.
    pub fn enumerate_monitors() -> Result<Vec<MonitorDescriptor>> {
        unsafe extern "system" fn enum_proc(
            monitor: HMONITOR,
            _hdc: HDC,
            _rect: *mut RECT,
            data: LPARAM,
        ) -> BOOL {
            let monitors = unsafe { &mut *(data.0 as *mut Vec<MonitorDescriptor>) };
            if let Some(rc) = monitor_rect(monitor) {
                monitors.push(MonitorDescriptor {
                    index: monitors.len(),
                    left: rc.left,
                    top: rc.top,
                    width: rc.right - rc.left,
                    height: rc.bottom - rc.top,
                });
            }
            TRUE
        }

        let mut monitors: Vec<MonitorDescriptor> = Vec::new();
        unsafe {
            let _ = EnumDisplayMonitors(
                HDC::default(),
                None,
                Some(enum_proc),
                LPARAM(&mut monitors as *mut Vec<MonitorDescriptor> as isize),
            );
        }

        if monitors.is_empty() {
            return Err(anyhow!("EnumDisplayMonitors returned no monitors"));
        }
        Ok(monitors)
    }

    /// Rectangle `(left, top, right, bottom)` of the monitor a window is on.
    pub fn monitor_rect_of_window(hwnd: HWND) -> Option<(i32, i32, i32, i32)> {
        let monitor = unsafe { MonitorFromWindow(hwnd, MONITOR_DEFAULTTONEAREST) };
        monitor_rect(monitor).map(|rc| (rc.left, rc.top, rc.right, rc.bottom))
    }
}

#[cfg(windows)]
impl CoordinateSpace {
    /// Selects the monitor that contains `hwnd`. Returns true if it changed.
    pub fn select_monitor_under(&self, hwnd: windows::Win32::Foundation::HWND) -> bool {
        monitor_rect_of_window(hwnd).is_some_and(|rect| self.select_monitor_matching(rect))
    }
}
