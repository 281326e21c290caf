//! Foreground-window inspection: is the target game focused, and where is it.

/// Reports whether the target application owns input focus.
///
/// Implementations never fail: any OS error reads as "not focused".
pub trait FocusOracle: Send + Sync {
    fn is_target_focused(&self) -> bool;

    /// Monitor rectangle `(left, top, right, bottom)` of the focused target, if any.
    fn target_monitor_rect(&self) -> Option<(i32, i32, i32, i32)> {
        None
    }
}

/// Extracts the file name from a full image path and compares it
/// case-insensitively against `target`.
pub fn process_name_matches(full_path: &str, target: &str) -> bool {
    let name = full_path
        .rsplit(['\\', '/'])
        .next()
        .unwrap_or(full_path);
    name.eq_ignore_ascii_case(target)
}

#[cfg(windows)]
pub use self::win32::ForegroundFocus;

#[cfg(windows)]
mod win32 {
    use std::ffi::OsString;
    use std::os::windows::ffi::OsStringExt;
    use std::sync::atomic::{AtomicBool, Ordering};

    use anyhow::{anyhow, Result};
    use windows::Win32::Foundation::{CloseHandle, HWND};
    use windows::Win32::System::Threading::{
        OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32,
        PROCESS_QUERY_LIMITED_INFORMATION,
    };
    use windows::Win32::UI::WindowsAndMessaging::{GetForegroundWindow, GetWindowThreadProcessId};

    use super::{process_name_matches, FocusOracle};
    use crate::capture::monitor::monitor_rect_of_window;

    /// Matches the foreground window's owning executable against a target name.
    pub struct ForegroundFocus {
        target: String,
        failing: AtomicBool,
    }

    impl ForegroundFocus {
        pub fn new(target: &str) -> Self {
            Self {
                target: target.to_string(),
                failing: AtomicBool::new(false),
            }
        }

        fn foreground_image_path(hwnd: HWND) -> Result<String> {
            let mut process_id: u32 = 0;
            unsafe { GetWindowThreadProcessId(hwnd, Some(&mut process_id)) };
            if process_id == 0 {
                return Err(anyhow!("No process for foreground window"));
            }

            let process_handle =
                unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, process_id)? };

            let mut name_buf: Vec<u16> = vec![0; 1024];
            let mut len = name_buf.len() as u32;
            let result = unsafe {
                QueryFullProcessImageNameW(
                    process_handle,
                    PROCESS_NAME_WIN32,
                    windows::core::PWSTR(name_buf.as_mut_ptr()),
                    &mut len,
                )
            };
            let _ = unsafe { CloseHandle(process_handle) };
            result?;

            Ok(OsString::from_wide(&name_buf[..len as usize])
                .to_string_lossy()
                .to_string())
        }

        /// The foreground window, if it belongs to the target process.
        pub fn focused_window(&self) -> Option<HWND> {
            let hwnd = unsafe { GetForegroundWindow() };
            if hwnd.is_invalid() {
                return None;
            }
            match Self::foreground_image_path(hwnd) {
                Ok(path) => {
                    if self.failing.swap(false, Ordering::Relaxed) {
                        crate::log("Focus check recovered");
                    }
                    process_name_matches(&path, &self.target).then_some(hwnd)
                }
                Err(e) => {
                    if !self.failing.swap(true, Ordering::Relaxed) {
                        crate::log(&format!("Focus check failed: {}", e));
                    }
                    None
                }
            }
        }
    }

    impl FocusOracle for ForegroundFocus {
        fn is_target_focused(&self) -> bool {
            self.focused_window().is_some()
        }

        fn target_monitor_rect(&self) -> Option<(i32, i32, i32, i32)> {
            self.focused_window().and_then(monitor_rect_of_window)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_exact_name_case_insensitively() {
        assert!(process_name_matches(
            r"C:\Users\me\AppData\Local\Roblox\Versions\v1\RobloxPlayerBeta.exe",
            "robloxplayerbeta.exe"
        ));
        assert!(process_name_matches("RobloxPlayerBeta.exe", "RobloxPlayerBeta.exe"));
    }

    #[test]
    fn test_rejects_similar_names() {
        assert!(!process_name_matches(r"C:\x\RobloxPlayerBeta-helper.exe", "RobloxPlayerBeta.exe"));
        assert!(!process_name_matches(r"C:\RobloxPlayerBeta.exe\other.exe", "RobloxPlayerBeta.exe"));
    }
}
