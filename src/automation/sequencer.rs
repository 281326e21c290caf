//! Phase sequencing across one forge engagement.
//!
//! `PhaseSequencer` walks the fixed phase list once per engagement.
//! `GoWatcher` samples the centre of the monitor for the green "GO" banner
//! and advances the sequencer when it appears.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::automation::activity::Activity;
use crate::automation::context::{ControlContext, ControlLoop, FailureLatch};
use crate::capture::{FrameSource, MonitorDescriptor, Region};
use crate::detection::{ColorMask, Feature};
use crate::input::InputInjector;

/// Activities run in order, one per GO signal.
pub const PHASES: [Activity; 3] = [Activity::Jiggle, Activity::Bar, Activity::Ring];

#[derive(Default)]
struct SequencerState {
    enabled: bool,
    /// `None` until the first GO
    index: Option<usize>,
}

#[derive(Default)]
pub struct PhaseSequencer {
    state: Mutex<SequencerState>,
}

impl PhaseSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops every loop and rewinds to before the first phase.
    pub fn enable(&self, injector: &InputInjector) {
        let mut state = self.state.lock();
        injector.reassign(Activity::Idle);
        state.enabled = true;
        state.index = None;
    }

    pub fn disable(&self) {
        self.state.lock().enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    pub fn current_phase(&self) -> Option<Activity> {
        self.state.lock().index.map(|i| PHASES[i])
    }

    /// True while on and before the first phase.
    pub fn awaiting_start(&self) -> bool {
        let state = self.state.lock();
        state.enabled && state.index.is_none()
    }

    /// Moves to the next phase and activates it.
    ///
    /// Reaching the last phase turns the sequencer off, leaving that phase
    /// running on its own. Returns the activated phase, if any.
    pub fn advance(&self, injector: &InputInjector) -> Option<Activity> {
        let mut state = self.state.lock();
        if !state.enabled {
            return None;
        }

        let next = state.index.map_or(0, |i| i + 1);
        let Some(&phase) = PHASES.get(next) else {
            state.enabled = false;
            return None;
        };

        state.index = Some(next);
        injector.reassign(phase);
        crate::log(&format!("Phase {}/{}: {}", next + 1, PHASES.len(), phase));

        if next + 1 == PHASES.len() {
            state.enabled = false;
            crate::log("Final phase reached, sequencer off");
        }
        Some(phase)
    }
}

/// Centre square of `monitor` inset by `inset` on every side.
fn go_region(monitor: &MonitorDescriptor, inset: f32) -> Region {
    let dx = (monitor.width as f32 * inset) as i32;
    let dy = (monitor.height as f32 * inset) as i32;
    Region::new(
        monitor.left + dx,
        monitor.top + dy,
        monitor.width - 2 * dx,
        monitor.height - 2 * dy,
    )
}

/// Watches for the GO banner while the sequencer is on.
#[derive(Default)]
pub struct GoWatcher {
    cooldown_until: Option<Instant>,
    capture: FailureLatch,
}

impl GoWatcher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ControlLoop for GoWatcher {
    fn name(&self) -> &'static str {
        "go"
    }

    fn tick(&mut self, ctx: &ControlContext, frames: &mut dyn FrameSource, now: Instant) -> Duration {
        let cfg = &ctx.config.go;
        if !ctx.sequencer.is_enabled() || !ctx.is_focused() {
            return Duration::from_millis(cfg.idle_ms);
        }

        if let Some(until) = self.cooldown_until {
            if now < until {
                return Duration::from_millis(cfg.cooldown_poll_ms);
            }
            self.cooldown_until = None;
        }

        let region = go_region(&ctx.current_monitor(), cfg.region_inset);
        let Some(frame) = self.capture.check("GO capture", frames.capture(&region)) else {
            return Duration::from_millis(cfg.poll_ms);
        };

        let green = ColorMask::from_image(&frame, Feature::GoGreen.range()).count();
        if green > cfg.min_pixels {
            crate::log(&format!("GO detected ({} green px)", green));
            ctx.sequencer.advance(&ctx.injector);
            self.cooldown_until = Some(now + Duration::from_millis(cfg.cooldown_ms));
        }

        Duration::from_millis(cfg.poll_ms)
    }
}
