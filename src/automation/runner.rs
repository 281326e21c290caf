//! Loop threads: one per control loop, plus the monitor follower.
//!
//! Every loop thread opens its own frame source and runs until the context
//! stops running. Shutdown is `ControlContext::shutdown` followed by a join.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::automation::attack::PeriodicAttack;
use crate::automation::autoclick::Autoclicker;
use crate::automation::bar::BarRider;
use crate::automation::context::{ControlContext, ControlLoop};
use crate::automation::holdkey::HoldKey;
use crate::automation::jiggle::CursorJiggle;
use crate::automation::ring::RingTracker;
use crate::automation::sequencer::GoWatcher;
use crate::automation::sprint::Sprint;
use crate::capture::{CaptureBackend, FrameSource};
use crate::input::KeyboardState;

/// Longest single sleep, so a stop request is seen promptly.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// How often the follower re-checks which monitor the target is on.
const FOLLOW_INTERVAL: Duration = Duration::from_millis(500);

/// Backoff before retrying a capture source that failed to open.
const REOPEN_DELAY: Duration = Duration::from_secs(1);

/// Sleeps for `duration` in slices, returning early once `ctx` stops.
fn nap(ctx: &ControlContext, duration: Duration) {
    let deadline = Instant::now() + duration;
    while ctx.is_running() {
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return;
        }
        thread::sleep(left.min(SLEEP_SLICE));
    }
}

/// Ticks `control` against `frames` until `ctx` stops.
pub fn run_loop(ctx: &ControlContext, control: &mut dyn ControlLoop, frames: &mut dyn FrameSource) {
    while ctx.is_running() {
        let wait = control.tick(ctx, frames, Instant::now());
        if wait.is_zero() {
            thread::yield_now();
        } else {
            nap(ctx, wait);
        }
    }
}

fn open_frames(ctx: &ControlContext, backend: &dyn CaptureBackend, name: &str) -> Option<Box<dyn FrameSource>> {
    let mut logged = false;
    while ctx.is_running() {
        match backend.open() {
            Ok(frames) => return Some(frames),
            Err(e) => {
                if !logged {
                    crate::log(&format!("{}: capture unavailable: {:#}", name, e));
                    logged = true;
                }
                nap(ctx, REOPEN_DELAY);
            }
        }
    }
    None
}

fn spawn_control(
    ctx: Arc<ControlContext>,
    backend: Arc<dyn CaptureBackend>,
    mut control: Box<dyn ControlLoop>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let name = control.name();
        let Some(mut frames) = open_frames(&ctx, backend.as_ref(), name) else {
            return;
        };
        crate::log(&format!("Loop started: {}", name));
        run_loop(&ctx, control.as_mut(), frames.as_mut());
        crate::log(&format!("Loop stopped: {}", name));
    })
}

/// Moves the active monitor to whichever one the focused target sits on.
fn follow_target_monitor(ctx: &ControlContext) {
    while ctx.is_running() {
        let moved = ctx
            .focus
            .target_monitor_rect()
            .is_some_and(|rect| ctx.coords.select_monitor_matching(rect));
        if moved {
            let monitor = ctx.current_monitor();
            crate::log(&format!(
                "Target moved to monitor {} ({}x{} at {}, {})",
                monitor.index, monitor.width, monitor.height, monitor.left, monitor.top
            ));
        }
        nap(ctx, FOLLOW_INTERVAL);
    }
}

/// Starts every control loop on its own thread. `keys` is the physical
/// keyboard the sprint loop watches.
pub fn spawn_loops(
    ctx: Arc<ControlContext>,
    backend: Arc<dyn CaptureBackend>,
    keys: Arc<dyn KeyboardState>,
) -> Vec<JoinHandle<()>> {
    let loops: Vec<Box<dyn ControlLoop>> = vec![
        Box::new(RingTracker::new(ctx.config.ring.blob_filter())),
        Box::new(BarRider::new()),
        Box::new(CursorJiggle::new()),
        Box::new(Autoclicker::new()),
        Box::new(PeriodicAttack::new()),
        Box::new(HoldKey::new()),
        Box::new(Sprint::new(keys)),
        Box::new(GoWatcher::new()),
    ];

    let mut handles: Vec<JoinHandle<()>> = loops
        .into_iter()
        .map(|control| spawn_control(ctx.clone(), backend.clone(), control))
        .collect();

    if ctx.config.follow_target_monitor {
        let ctx = ctx.clone();
        handles.push(thread::spawn(move || follow_target_monitor(&ctx)));
    }
    handles
}

/// Stops all loops, releases held input, and waits for the threads.
pub fn shutdown(ctx: &ControlContext, handles: Vec<JoinHandle<()>>) {
    ctx.shutdown();
    for handle in handles {
        if let Err(e) = handle.join() {
            crate::log(&format!("Loop thread panicked: {:?}", e));
        }
    }
    crate::log("All loops stopped");
}
