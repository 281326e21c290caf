//! Keyboard scan codes and the physical key-state seam.
//!
//! Synthetic keys go out as scan codes; physical state is read by virtual-key
//! code, which is what `GetAsyncKeyState` takes.

pub const SCAN_LSHIFT: u16 = 0x2A;
/// Needs the extended flag
pub const SCAN_LEFT_ARROW: u16 = 0x4B;

/// Virtual-key codes of W, A, S and D.
pub const WASD_VK: [u16; 4] = [0x57, 0x41, 0x53, 0x44];

/// Set-1 scan code of a digit or letter key, case-insensitive.
pub fn scan_code_for(key: char) -> Option<u16> {
    const DIGITS: [u16; 10] = [0x0B, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A];
    const LETTERS: [u16; 26] = [
        0x1E, 0x30, 0x2E, 0x20, 0x12, 0x21, 0x22, 0x23, 0x17, 0x24, 0x25, 0x26, 0x32, 0x31, 0x18,
        0x19, 0x10, 0x13, 0x1F, 0x14, 0x16, 0x2F, 0x11, 0x2D, 0x15, 0x2C,
    ];
    let key = key.to_ascii_lowercase();
    match key {
        '0'..='9' => Some(DIGITS[key as usize - '0' as usize]),
        'a'..='z' => Some(LETTERS[key as usize - 'a' as usize]),
        _ => None,
    }
}

/// Physical keyboard state.
pub trait KeyboardState: Send + Sync {
    /// True while the key with virtual-key code `vk` is held down.
    fn is_down(&self, vk: u16) -> bool;

    fn any_down(&self, vks: &[u16]) -> bool {
        vks.iter().any(|&vk| self.is_down(vk))
    }
}

/// Reads key state with `GetAsyncKeyState`.
#[cfg(windows)]
pub struct AsyncKeyState;

#[cfg(windows)]
impl KeyboardState for AsyncKeyState {
    fn is_down(&self, vk: u16) -> bool {
        use windows::Win32::UI::Input::KeyboardAndMouse::GetAsyncKeyState;

        // High bit set, so the value is negative, while the key is down
        unsafe { GetAsyncKeyState(vk as i32) < 0 }
    }
}
