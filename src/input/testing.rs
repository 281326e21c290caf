//! Recording input sink with a simulated cursor, and a settable keyboard.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use parking_lot::Mutex;

use super::keys::KeyboardState;
use super::{InputEvent, InputSink, MouseButton};
use crate::capture::CoordinateSpace;

#[derive(Default)]
struct Recording {
    events: Vec<InputEvent>,
    cursor: (i32, i32),
    failing: bool,
}

/// Logs every event and moves a virtual cursor. Clones share one log.
#[derive(Clone)]
pub struct RecordingSink {
    shared: Arc<Mutex<Recording>>,
    coords: Arc<CoordinateSpace>,
}

impl RecordingSink {
    pub fn new(coords: Arc<CoordinateSpace>) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Recording::default())),
            coords,
        }
    }

    pub fn events(&self) -> Vec<InputEvent> {
        self.shared.lock().events.clone()
    }

    pub fn clear(&self) {
        self.shared.lock().events.clear();
    }

    pub fn cursor(&self) -> (i32, i32) {
        self.shared.lock().cursor
    }

    pub fn set_cursor(&self, x: i32, y: i32) {
        self.shared.lock().cursor = (x, y);
    }

    pub fn set_failing(&self, failing: bool) {
        self.shared.lock().failing = failing;
    }

    /// Number of left-button presses seen.
    pub fn left_presses(&self) -> usize {
        self.shared
            .lock()
            .events
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    InputEvent::MouseButton { button: MouseButton::Left, pressed: true, .. }
                )
            })
            .count()
    }
}

impl InputSink for RecordingSink {
    fn send(&mut self, event: &InputEvent) -> Result<()> {
        let mut rec = self.shared.lock();
        if rec.failing {
            return Err(anyhow!("Simulated dispatch failure"));
        }
        match *event {
            InputEvent::MoveAbsolute { at } => rec.cursor = self.coords.to_screen(at),
            InputEvent::MoveRelative { dx, dy } => {
                rec.cursor.0 += dx;
                rec.cursor.1 += dy;
            }
            _ => {}
        }
        rec.events.push(*event);
        Ok(())
    }

    fn cursor_position(&self) -> Result<(i32, i32)> {
        Ok(self.shared.lock().cursor)
    }
}

/// Keyboard whose held keys are set by the test.
#[derive(Default)]
pub struct HeldKeys {
    down: Mutex<Vec<u16>>,
}

impl HeldKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&self, vk: u16) {
        let mut down = self.down.lock();
        if !down.contains(&vk) {
            down.push(vk);
        }
    }

    pub fn release(&self, vk: u16) {
        self.down.lock().retain(|&k| k != vk);
    }
}

impl KeyboardState for HeldKeys {
    fn is_down(&self, vk: u16) -> bool {
        self.down.lock().contains(&vk)
    }
}
