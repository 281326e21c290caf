//! Autoclicker: left clicks at the cursor on a fixed interval.

use std::time::{Duration, Instant};

use crate::automation::activity::LoopKind;
use crate::automation::context::{ControlContext, ControlLoop, FailureLatch};
use crate::capture::FrameSource;
use crate::input::injector::CLICK_HOLD;

const MIN_GAP: Duration = Duration::from_millis(10);

pub struct Autoclicker {
    input: FailureLatch,
}

impl Autoclicker {
    pub fn new() -> Self {
        Self {
            input: FailureLatch::default(),
        }
    }
}

impl Default for Autoclicker {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlLoop for Autoclicker {
    fn name(&self) -> &'static str {
        "autoclick"
    }

    fn tick(&mut self, ctx: &ControlContext, _frames: &mut dyn FrameSource, _now: Instant) -> Duration {
        let cfg = &ctx.config.autoclick;
        let idle = Duration::from_millis(cfg.idle_ms);
        let token = ctx.token.load();
        if !token.is_owned_by(LoopKind::Autoclick) || !ctx.is_focused() {
            return idle;
        }

        let seat = ctx.injector.seat(LoopKind::Autoclick, token.generation);
        let clicked = seat
            .cursor_position()
            .and_then(|(x, y)| seat.click_at(x, y));
        match self.input.check("Autoclick", clicked) {
            Some(true) => Duration::from_millis(cfg.interval_ms)
                .saturating_sub(CLICK_HOLD)
                .max(MIN_GAP),
            _ => idle,
        }
    }
}
