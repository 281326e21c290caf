//! Forge Assist
//!
//! A Windows hotkey tool that plays the smithing minigames of a game window:
//! it watches the screen, recognises rings, bars and banners by colour, and
//! drives the mouse with synthetic input while the game is focused.

// Hide console window on Windows release builds
#![cfg_attr(all(windows, not(debug_assertions)), windows_subsystem = "windows")]

mod automation;
mod capture;
mod detection;
mod input;
mod paths;

use anyhow::Result;
use chrono::Local;
use std::fs::OpenOptions;
use std::io::Write;

const LOG_FILE: &str = "forge_assist.log";

/// Logs a message to both console and log file with timestamp.
pub fn log(msg: &str) {
    let timestamp = Local::now().format("%H:%M:%S%.3f");
    let line = format!("[{}] {}\n", timestamp, msg);
    print!("{}", line);
    let log_path = paths::get_logs_dir().join(LOG_FILE);
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&log_path) {
        let _ = file.write_all(line.as_bytes());
    }
}

fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let msg = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        let location = panic_info
            .location()
            .map(|loc| format!(" at {}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_default();
        log(&format!("[PANIC]{} {}", location, msg));
    }));
}

fn main() -> Result<()> {
    install_panic_hook();
    paths::ensure_directories()?;
    automation::init_config();
    run()
}

#[cfg(not(windows))]
fn run() -> Result<()> {
    Err(anyhow::anyhow!("Forge Assist drives Win32 input and only runs on Windows"))
}

#[cfg(windows)]
fn run() -> Result<()> {
    hotkeys::run()
}

#[cfg(windows)]
mod hotkeys {
    use std::sync::Arc;

    use anyhow::Result;
    use windows::Win32::Foundation::HWND;
    use windows::Win32::UI::Input::KeyboardAndMouse::{
        RegisterHotKey, UnregisterHotKey, MOD_CONTROL, MOD_NOREPEAT, MOD_SHIFT, VK_NEXT, VK_PRIOR,
    };
    use windows::Win32::UI::WindowsAndMessaging::{GetMessageW, MSG, WM_HOTKEY};

    use crate::automation::{self, Activity, ControlContext};
    use crate::capture::{enumerate_monitors, CoordinateSpace, ForegroundFocus, GdiBackend};
    use crate::input::{AsyncKeyState, SendInputSink};
    use crate::log;

    #[derive(Clone, Copy, Debug)]
    enum Command {
        Toggle(Activity),
        ToggleSequencer,
        ToggleAttack,
        ConfirmReady,
        CycleMonitor(i32),
        Snapshot,
        StopAll,
        Exit,
    }

    /// Ctrl+Shift+<key> bindings, registered with id = index + 1.
    const BINDINGS: [(u32, Command, &str); 15] = [
        (0x4A, Command::Toggle(Activity::Jiggle), "J (jiggle)"),
        (0x42, Command::Toggle(Activity::Bar), "B (bar)"),
        (0x48, Command::Toggle(Activity::Shaping), "H (shaping)"),
        (0x52, Command::Toggle(Activity::Ring), "R (ring)"),
        (0x43, Command::Toggle(Activity::Autoclick), "C (autoclick)"),
        (0x4B, Command::ToggleAttack, "K (periodic attack with autoclick)"),
        (0x4C, Command::Toggle(Activity::HoldKey), "L (hold left arrow)"),
        (0x56, Command::Toggle(Activity::Sprint), "V (sprint)"),
        (0x55, Command::ToggleSequencer, "U (phase sequencer)"),
        (0x47, Command::ConfirmReady, "G (confirm ready)"),
        (VK_PRIOR.0 as u32, Command::CycleMonitor(-1), "PageUp (previous monitor)"),
        (VK_NEXT.0 as u32, Command::CycleMonitor(1), "PageDown (next monitor)"),
        (0x53, Command::Snapshot, "S (log overlay)"),
        (0x51, Command::StopAll, "Q (stop all)"),
        (0x58, Command::Exit, "X (exit)"),
    ];

    pub fn run() -> Result<()> {
        let config = automation::get_config().clone();

        let monitors = enumerate_monitors()?;
        let coords = Arc::new(CoordinateSpace::new(monitors));
        if !coords.select_monitor(config.monitor_index) {
            log(&format!(
                "Monitor {} not found, using monitor 0",
                config.monitor_index
            ));
        }
        let focus = Arc::new(ForegroundFocus::new(&config.target_process));
        let on_target = config.follow_target_monitor
            && focus
                .focused_window()
                .is_some_and(|hwnd| coords.select_monitor_under(hwnd));
        if on_target {
            log(&format!("Target is on monitor {}", coords.current_monitor().index));
        }
        let ctx = Arc::new(ControlContext::new(
            Box::new(SendInputSink),
            coords,
            focus,
            config,
        ));
        let handles = automation::spawn_loops(ctx.clone(), Arc::new(GdiBackend), Arc::new(AsyncKeyState));

        for (i, (vk, _, label)) in BINDINGS.iter().enumerate() {
            let registered = unsafe {
                RegisterHotKey(
                    HWND::default(),
                    i as i32 + 1,
                    MOD_CONTROL | MOD_SHIFT | MOD_NOREPEAT,
                    *vk,
                )
            };
            match registered {
                Ok(()) => log(&format!("Hotkey: Ctrl+Shift+{}", label)),
                Err(e) => log(&format!("Failed to register Ctrl+Shift+{}: {}", label, e)),
            }
        }
        log(&format!("Forge Assist started, target {}", ctx.config.target_process));

        let mut msg = MSG::default();
        unsafe {
            while GetMessageW(&mut msg, HWND::default(), 0, 0).as_bool() {
                if msg.message != WM_HOTKEY {
                    continue;
                }
                let Some((_, command, _)) = (msg.wParam.0 as usize)
                    .checked_sub(1)
                    .and_then(|i| BINDINGS.get(i))
                else {
                    continue;
                };
                if !handle(&ctx, *command) {
                    break;
                }
            }
            for i in 0..BINDINGS.len() {
                let _ = UnregisterHotKey(HWND::default(), i as i32 + 1);
            }
        }

        automation::shutdown(&ctx, handles);
        log("Forge Assist exited");
        Ok(())
    }

    /// Runs one hotkey command. Returns false when the app should exit.
    fn handle(ctx: &ControlContext, command: Command) -> bool {
        match command {
            Command::Toggle(activity) => {
                let now = ctx.request(activity);
                log(&format!("Requested {}: now {}", activity, now));
            }
            Command::ToggleSequencer => {
                ctx.toggle_sequencer();
            }
            Command::ToggleAttack => {
                ctx.toggle_attack();
            }
            Command::ConfirmReady => match ctx.confirm_ready() {
                Ok(true) => {}
                Ok(false) => log("Sequencer is not waiting for a start"),
                Err(e) => log(&format!("Confirm click failed: {:#}", e)),
            },
            Command::CycleMonitor(delta) => {
                ctx.cycle_monitor(delta);
            }
            Command::Snapshot => {
                let snapshots = ctx.overlay.all();
                if snapshots.is_empty() {
                    log("Overlay: nothing visible");
                }
                for snapshot in snapshots {
                    log(&format!("Overlay: {}", snapshot));
                }
            }
            Command::StopAll => {
                ctx.deactivate_all();
                log("All activities stopped");
            }
            Command::Exit => return false,
        }
        true
    }
}
