//! Synthetic keyboard and mouse input.
//!
//! This module provides:
//! - The primitive event vocabulary and the `InputSink` seam (`InputEvent`)
//! - Held-input tracking, arbitration and composite gestures (`InputInjector`)
//! - Scan codes and physical key state (`KeyboardState`)
//! - The `SendInput` backend on Windows (`SendInputSink`)

pub mod injector;
pub mod keys;
#[cfg(windows)]
pub mod sendinput;
#[cfg(test)]
pub mod testing;

use anyhow::Result;

pub use crate::capture::AbsolutePoint;
pub use injector::{InputInjector, Seat};
#[cfg(windows)]
pub use keys::AsyncKeyState;
pub use keys::KeyboardState;
#[cfg(windows)]
pub use sendinput::SendInputSink;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
}

/// One primitive input event as handed to the OS.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputEvent {
    Key {
        scan_code: u16,
        pressed: bool,
        extended: bool,
    },
    /// Button transitions fire at the current cursor; `at` is informational.
    MouseButton {
        button: MouseButton,
        pressed: bool,
        at: AbsolutePoint,
    },
    MoveAbsolute {
        at: AbsolutePoint,
    },
    MoveRelative {
        dx: i32,
        dy: i32,
    },
}

/// Where primitive events go.
pub trait InputSink: Send {
    fn send(&mut self, event: &InputEvent) -> Result<()>;

    /// Current cursor position in virtual-desktop pixels.
    fn cursor_position(&self) -> Result<(i32, i32)>;
}
