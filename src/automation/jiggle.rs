//! Cursor jiggle: sweeps the cursor up and down the current monitor.

use std::time::{Duration, Instant};

use crate::automation::activity::LoopKind;
use crate::automation::context::{ControlContext, ControlLoop, FailureLatch};
use crate::capture::FrameSource;

pub struct CursorJiggle {
    going_up: bool,
    input: FailureLatch,
}

impl CursorJiggle {
    pub fn new() -> Self {
        Self {
            going_up: true,
            input: FailureLatch::default(),
        }
    }

    pub fn going_up(&self) -> bool {
        self.going_up
    }
}

impl Default for CursorJiggle {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlLoop for CursorJiggle {
    fn name(&self) -> &'static str {
        "jiggle"
    }

    fn tick(&mut self, ctx: &ControlContext, _frames: &mut dyn FrameSource, _now: Instant) -> Duration {
        let cfg = &ctx.config.jiggle;
        let token = ctx.token.load();
        if !token.is_owned_by(LoopKind::Jiggle) || !ctx.is_focused() {
            self.going_up = true;
            return Duration::from_millis(cfg.idle_ms);
        }

        let Some((x, _)) = self.input.check("Jiggle cursor", ctx.injector.cursor_position()) else {
            return Duration::from_millis(cfg.idle_ms);
        };
        let monitor = ctx.current_monitor();
        let fy = if self.going_up { cfg.top } else { cfg.bottom };
        let y = monitor.top + (monitor.height as f32 * fy) as i32;

        let seat = ctx.injector.seat(LoopKind::Jiggle, token.generation);
        let generation = token.generation;
        let keep_going = || ctx.is_running() && ctx.token.is_held(LoopKind::Jiggle, generation);
        let swept = seat.drag_to_while(x, y, cfg.steps, Duration::from_millis(cfg.period_ms), keep_going);
        if let Some(true) = self.input.check("Jiggle sweep", swept) {
            self.going_up = !self.going_up;
        }
        Duration::ZERO
    }
}
