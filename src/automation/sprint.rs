//! Sprint: holds shift while any movement key is physically down.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::automation::activity::LoopKind;
use crate::automation::config::SprintConfig;
use crate::automation::context::{ControlContext, ControlLoop, FailureLatch};
use crate::capture::FrameSource;
use crate::input::{KeyboardState, Seat};

pub struct Sprint {
    keys: Arc<dyn KeyboardState>,
    shift_held: bool,
    input: FailureLatch,
}

impl Sprint {
    pub fn new(keys: Arc<dyn KeyboardState>) -> Self {
        Self {
            keys,
            shift_held: false,
            input: FailureLatch::default(),
        }
    }

    pub fn is_holding_shift(&self) -> bool {
        self.shift_held
    }

    fn let_go(&mut self, seat: &Seat<'_>, cfg: &SprintConfig) {
        if self.shift_held {
            self.input
                .check("Sprint release", seat.key(cfg.shift_scan, false, false));
            self.shift_held = false;
        }
    }
}

impl ControlLoop for Sprint {
    fn name(&self) -> &'static str {
        "sprint"
    }

    fn tick(&mut self, ctx: &ControlContext, _frames: &mut dyn FrameSource, _now: Instant) -> Duration {
        let cfg = &ctx.config.sprint;
        let idle = Duration::from_millis(cfg.idle_ms);
        let token = ctx.token.load();
        if !token.is_owned_by(LoopKind::Sprint) {
            self.shift_held = false;
            return idle;
        }

        let seat = ctx.injector.seat(LoopKind::Sprint, token.generation);
        if !ctx.is_focused() {
            self.let_go(&seat, cfg);
            return idle;
        }

        let moving = self.keys.any_down(&cfg.movement_keys);
        if moving && !self.shift_held {
            if let Some(true) = self.input.check("Sprint", seat.key(cfg.shift_scan, true, false)) {
                self.shift_held = true;
            }
        } else if !moving {
            self.let_go(&seat, cfg);
        }
        Duration::from_millis(cfg.poll_ms)
    }
}
