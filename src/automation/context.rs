//! Shared state for the control loops and the activation entrypoints.
//!
//! Loops read the activity token and the current monitor every tick; only the
//! entrypoints here (and the phase sequencer) arbitrate the token.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::automation::activity::{Activity, ActivityToken, TokenState};
use crate::automation::config::ControlConfig;
use crate::automation::overlay::OverlayBoard;
use crate::automation::sequencer::PhaseSequencer;
use crate::capture::{CoordinateSpace, FocusOracle, FrameSource, MonitorDescriptor};
use crate::input::{InputInjector, InputSink};

/// Steps and duration of the cursor drag before a confirm click.
const CONFIRM_DRAG_STEPS: u32 = 20;
const CONFIRM_DRAG_TIME: Duration = Duration::from_millis(50);

/// One long-lived polling loop.
pub trait ControlLoop: Send {
    fn name(&self) -> &'static str;

    /// Runs one iteration and returns how long to sleep before the next.
    fn tick(&mut self, ctx: &ControlContext, frames: &mut dyn FrameSource, now: Instant) -> Duration;
}

/// Logs a repeating environment failure once, and its recovery once.
#[derive(Default)]
pub struct FailureLatch {
    failing: bool,
}

impl FailureLatch {
    pub fn fail(&mut self, what: &str, err: &anyhow::Error) {
        if !self.failing {
            crate::log(&format!("{} failed: {:#}", what, err));
            self.failing = true;
        }
    }

    pub fn ok(&mut self, what: &str) {
        if self.failing {
            crate::log(&format!("{} recovered", what));
            self.failing = false;
        }
    }

    /// Unwraps `result`, logging on the first failure.
    pub fn check<T>(&mut self, what: &str, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => {
                self.ok(what);
                Some(value)
            }
            Err(e) => {
                self.fail(what, &e);
                None
            }
        }
    }
}

pub struct ControlContext {
    running: AtomicBool,
    /// Periodic attack rides along with the autoclicker while set
    attack: AtomicBool,
    pub token: Arc<ActivityToken>,
    pub coords: Arc<CoordinateSpace>,
    pub injector: InputInjector,
    pub focus: Arc<dyn FocusOracle>,
    pub overlay: OverlayBoard,
    pub sequencer: PhaseSequencer,
    pub config: ControlConfig,
}

impl ControlContext {
    pub fn new(
        sink: Box<dyn InputSink>,
        coords: Arc<CoordinateSpace>,
        focus: Arc<dyn FocusOracle>,
        config: ControlConfig,
    ) -> Self {
        let token = Arc::new(ActivityToken::new());
        Self {
            running: AtomicBool::new(true),
            attack: AtomicBool::new(false),
            injector: InputInjector::new(sink, token.clone(), coords.clone()),
            token,
            coords,
            focus,
            overlay: OverlayBoard::new(),
            sequencer: PhaseSequencer::new(),
            config,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_focused(&self) -> bool {
        self.focus.is_target_focused()
    }

    pub fn current_monitor(&self) -> Arc<MonitorDescriptor> {
        self.coords.current_monitor()
    }

    /// Makes `activity` the sole holder of the input devices.
    pub fn activate(&self, activity: Activity) -> TokenState {
        self.injector.reassign(activity)
    }

    /// Manual activation request with toggle semantics.
    ///
    /// Requesting the current activity releases it. Any manual request turns
    /// the phase sequencer off. Returns the activity now held.
    pub fn request(&self, activity: Activity) -> Activity {
        if self.sequencer.is_enabled() {
            self.sequencer.disable();
            crate::log("Phase sequencer off (manual request)");
        }
        let next = if self.token.current() == activity {
            Activity::Idle
        } else {
            activity
        };
        self.activate(next);
        next
    }

    pub fn deactivate_all(&self) {
        self.sequencer.disable();
        self.attack.store(false, Ordering::SeqCst);
        self.activate(Activity::Idle);
    }

    pub fn attack_enabled(&self) -> bool {
        self.attack.load(Ordering::SeqCst)
    }

    /// Flips the periodic attack add-on. It only fires while the autoclicker
    /// holds the token. Returns the new state.
    pub fn toggle_attack(&self) -> bool {
        let enabled = !self.attack.fetch_xor(true, Ordering::SeqCst);
        crate::log(&format!("Periodic attack {}", if enabled { "on" } else { "off" }));
        enabled
    }

    /// Turns the sequencer on (resetting it) or off. Returns the new state.
    pub fn toggle_sequencer(&self) -> bool {
        if self.sequencer.is_enabled() {
            self.sequencer.disable();
            crate::log("Phase sequencer off");
            false
        } else {
            self.sequencer.enable(&self.injector);
            crate::log("Phase sequencer on, waiting for GO");
            true
        }
    }

    /// Clicks the minigame's start button while the sequencer waits for its first phase.
    ///
    /// Returns false if the sequencer is not waiting.
    pub fn confirm_ready(&self) -> Result<bool> {
        if !self.sequencer.awaiting_start() {
            return Ok(false);
        }
        let go = &self.config.go;
        let (x, y) = self.current_monitor().point_at(go.confirm_x, go.confirm_y);
        self.injector.drag_to(x, y, CONFIRM_DRAG_STEPS, CONFIRM_DRAG_TIME)?;
        self.injector.click_at(x, y)?;
        crate::log(&format!("Confirm click at ({}, {})", x, y));
        Ok(true)
    }

    /// Steps the active monitor forward or backward through the list.
    pub fn cycle_monitor(&self, delta: i32) -> Arc<MonitorDescriptor> {
        let monitor = self.coords.cycle_monitor(delta);
        crate::log(&format!(
            "Monitor {}: {}x{} at ({}, {})",
            monitor.index, monitor.width, monitor.height, monitor.left, monitor.top
        ));
        monitor
    }

    /// Stops every loop and releases all held input.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.deactivate_all();
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::capture::testing::FixedFocus;
    use crate::capture::MonitorDescriptor;
    use crate::input::testing::RecordingSink;

    pub struct Harness {
        pub ctx: ControlContext,
        pub sink: RecordingSink,
        pub focus: Arc<FixedFocus>,
    }

    /// A 400x300 monitor at the origin, focused target, default config.
    pub fn harness() -> Harness {
        harness_with(ControlConfig::default())
    }

    pub fn harness_with(config: ControlConfig) -> Harness {
        harness_on(
            vec![MonitorDescriptor { index: 0, left: 0, top: 0, width: 400, height: 300 }],
            config,
        )
    }

    /// Focused target on the given monitor layout; the first monitor is current.
    pub fn harness_on(monitors: Vec<MonitorDescriptor>, config: ControlConfig) -> Harness {
        let coords = Arc::new(CoordinateSpace::new(monitors));
        let sink = RecordingSink::new(coords.clone());
        let focus = Arc::new(FixedFocus::new(true));
        let ctx = ControlContext::new(Box::new(sink.clone()), coords, focus.clone(), config);
        Harness { ctx, sink, focus }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::harness;
    use super::*;

    #[test]
    fn test_request_toggles() {
        let h = harness();
        assert_eq!(h.ctx.request(Activity::Bar), Activity::Bar);
        assert_eq!(h.ctx.token.current(), Activity::Bar);
        assert_eq!(h.ctx.request(Activity::Bar), Activity::Idle);
        assert_eq!(h.ctx.token.current(), Activity::Idle);
    }

    #[test]
    fn test_request_switches_between_activities() {
        let h = harness();
        h.ctx.request(Activity::Jiggle);
        assert_eq!(h.ctx.request(Activity::Ring), Activity::Ring);
        assert_eq!(h.ctx.token.current(), Activity::Ring);
    }

    #[test]
    fn test_manual_request_disables_sequencer() {
        let h = harness();
        assert!(h.ctx.toggle_sequencer());
        h.ctx.request(Activity::Autoclick);
        assert!(!h.ctx.sequencer.is_enabled());
    }

    #[test]
    fn test_attack_toggle_is_independent_of_token() {
        let h = harness();
        h.ctx.request(Activity::Autoclick);
        assert!(h.ctx.toggle_attack());
        assert!(h.ctx.attack_enabled());
        assert_eq!(h.ctx.token.current(), Activity::Autoclick);

        h.ctx.deactivate_all();
        assert!(!h.ctx.attack_enabled());
        assert!(h.ctx.toggle_attack());
        assert!(!h.ctx.toggle_attack());
    }

    #[test]
    fn test_confirm_only_while_waiting_for_first_phase() {
        let h = harness();
        assert!(!h.ctx.confirm_ready().unwrap());
        assert!(h.sink.events().is_empty());

        h.ctx.toggle_sequencer();
        assert!(h.ctx.confirm_ready().unwrap());
        assert_eq!(h.sink.cursor(), (200, 258));
        assert_eq!(h.sink.left_presses(), 1);

        h.ctx.sequencer.advance(&h.ctx.injector);
        assert!(!h.ctx.confirm_ready().unwrap());
    }

    #[test]
    fn test_shutdown_stops_and_releases() {
        let h = harness();
        h.ctx.activate(Activity::Bar);
        h.ctx
            .injector
            .mouse_button(crate::input::MouseButton::Left, true, Default::default())
            .unwrap();

        h.ctx.shutdown();
        assert!(!h.ctx.is_running());
        assert_eq!(h.ctx.token.current(), Activity::Idle);
        assert!(matches!(
            h.sink.events().last(),
            Some(crate::input::InputEvent::MouseButton { pressed: false, .. })
        ));
    }

    #[test]
    fn test_failure_latch_reports_transitions() {
        let mut latch = FailureLatch::default();
        assert_eq!(latch.check("capture", Ok(3)), Some(3));
        assert_eq!(latch.check::<i32>("capture", Err(anyhow::anyhow!("boom"))), None);
        assert!(latch.failing);
        assert_eq!(latch.check("capture", Ok(4)), Some(4));
        assert!(!latch.failing);
    }
}
