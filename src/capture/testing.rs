//! Scripted capture and focus doubles for loop tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{anyhow, Result};
use image::RgbImage;
use parking_lot::Mutex;

use super::frames::{CaptureBackend, FrameSource, Region};
use super::window::FocusOracle;

/// Returns queued frames in order, then repeats `fallback` (or errors).
pub struct ScriptedFrames {
    frames: VecDeque<RgbImage>,
    fallback: Option<RgbImage>,
    pub regions: Vec<Region>,
}

impl ScriptedFrames {
    pub fn new(frames: Vec<RgbImage>) -> Self {
        Self {
            frames: frames.into(),
            fallback: None,
            regions: Vec::new(),
        }
    }

    pub fn then_repeat(mut self, frame: RgbImage) -> Self {
        self.fallback = Some(frame);
        self
    }

    pub fn push(&mut self, frame: RgbImage) {
        self.frames.push_back(frame);
    }
}

impl FrameSource for ScriptedFrames {
    fn capture(&mut self, region: &Region) -> Result<RgbImage> {
        self.regions.push(*region);
        self.frames
            .pop_front()
            .or_else(|| self.fallback.clone())
            .ok_or_else(|| anyhow!("Script exhausted"))
    }
}

/// Black frames of whatever size is asked for.
pub struct BlankFrames;

impl FrameSource for BlankFrames {
    fn capture(&mut self, region: &Region) -> Result<RgbImage> {
        Ok(RgbImage::new(region.width, region.height))
    }
}

pub struct BlankBackend;

impl CaptureBackend for BlankBackend {
    fn open(&self) -> Result<Box<dyn FrameSource>> {
        Ok(Box::new(BlankFrames))
    }
}

/// Focus oracle with a settable answer.
pub struct FixedFocus {
    focused: AtomicBool,
    monitor_rect: Mutex<Option<(i32, i32, i32, i32)>>,
}

impl FixedFocus {
    pub fn new(focused: bool) -> Self {
        Self {
            focused: AtomicBool::new(focused),
            monitor_rect: Mutex::new(None),
        }
    }

    pub fn set(&self, focused: bool) {
        self.focused.store(focused, Ordering::SeqCst);
    }

    pub fn set_monitor_rect(&self, rect: Option<(i32, i32, i32, i32)>) {
        *self.monitor_rect.lock() = rect;
    }
}

impl FocusOracle for FixedFocus {
    fn is_target_focused(&self) -> bool {
        self.focused.load(Ordering::SeqCst)
    }

    fn target_monitor_rect(&self) -> Option<(i32, i32, i32, i32)> {
        *self.monitor_rect.lock()
    }
}
