//! Hold key: keeps one key down while active and the target is focused.
//!
//! The key-down is repeated every tick, the way keyboard autorepeat would.

use std::time::{Duration, Instant};

use crate::automation::activity::LoopKind;
use crate::automation::config::HoldKeyConfig;
use crate::automation::context::{ControlContext, ControlLoop, FailureLatch};
use crate::capture::FrameSource;
use crate::input::Seat;

pub struct HoldKey {
    held: bool,
    input: FailureLatch,
}

impl HoldKey {
    pub fn new() -> Self {
        Self {
            held: false,
            input: FailureLatch::default(),
        }
    }

    pub fn is_holding(&self) -> bool {
        self.held
    }

    fn let_go(&mut self, seat: &Seat<'_>, cfg: &HoldKeyConfig) {
        if self.held {
            self.input
                .check("Hold key release", seat.key(cfg.scan_code, false, cfg.extended));
            self.held = false;
        }
    }
}

impl Default for HoldKey {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlLoop for HoldKey {
    fn name(&self) -> &'static str {
        "hold key"
    }

    fn tick(&mut self, ctx: &ControlContext, _frames: &mut dyn FrameSource, _now: Instant) -> Duration {
        let cfg = &ctx.config.hold_key;
        let idle = Duration::from_millis(cfg.idle_ms);
        let token = ctx.token.load();
        if !token.is_owned_by(LoopKind::HoldKey) {
            // Released by the arbitration that took the token
            self.held = false;
            return idle;
        }

        let seat = ctx.injector.seat(LoopKind::HoldKey, token.generation);
        if !ctx.is_focused() {
            self.let_go(&seat, cfg);
            return idle;
        }

        match self.input.check("Hold key", seat.key(cfg.scan_code, true, cfg.extended)) {
            Some(sent) => {
                self.held = sent;
                Duration::from_millis(cfg.repeat_ms)
            }
            None => idle,
        }
    }
}
