//! Periodic attack: taps two keys in turn on a fixed cycle while the
//! autoclicker is running.
//!
//! The cycle is first key, a pause, second key, then a rest until the cycle
//! period has passed. Anything that stops the autoclicker (or the toggle, or
//! focus) restarts the cycle from the first key.

use std::time::{Duration, Instant};

use anyhow::anyhow;

use crate::automation::activity::LoopKind;
use crate::automation::context::{ControlContext, ControlLoop, FailureLatch};
use crate::capture::FrameSource;
use crate::input::keys::scan_code_for;
use crate::input::Seat;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Step {
    First,
    Second { at: Instant },
    Rest { until: Instant },
}

pub struct PeriodicAttack {
    step: Step,
    keymap: FailureLatch,
    input: FailureLatch,
}

impl PeriodicAttack {
    pub fn new() -> Self {
        Self {
            step: Step::First,
            keymap: FailureLatch::default(),
            input: FailureLatch::default(),
        }
    }

    /// Taps `key`. True when the cycle may move on.
    fn tap(&mut self, seat: &Seat<'_>, key: char) -> bool {
        let Some(scan_code) = scan_code_for(key) else {
            self.keymap
                .check::<()>("Attack key", Err(anyhow!("no scan code for {:?}", key)));
            return true;
        };
        matches!(self.input.check("Attack tap", seat.tap_key(scan_code, false)), Some(true))
    }
}

impl Default for PeriodicAttack {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlLoop for PeriodicAttack {
    fn name(&self) -> &'static str {
        "attack"
    }

    fn tick(&mut self, ctx: &ControlContext, _frames: &mut dyn FrameSource, now: Instant) -> Duration {
        let cfg = &ctx.config.attack;
        let poll = Duration::from_millis(cfg.poll_ms);
        let token = ctx.token.load();
        if !ctx.attack_enabled() || !token.is_owned_by(LoopKind::Autoclick) || !ctx.is_focused() {
            self.step = Step::First;
            return poll;
        }

        let seat = ctx.injector.seat(LoopKind::Autoclick, token.generation);
        if let Step::Rest { until } = self.step {
            if now >= until {
                self.step = Step::First;
            }
        }
        match self.step {
            Step::First => {
                if self.tap(&seat, cfg.first_key) {
                    self.step = Step::Second {
                        at: now + Duration::from_millis(cfg.second_after_ms),
                    };
                }
            }
            Step::Second { at } if now >= at => {
                if self.tap(&seat, cfg.second_key) {
                    let rest = cfg.cycle_ms.saturating_sub(cfg.second_after_ms);
                    self.step = Step::Rest {
                        until: now + Duration::from_millis(rest),
                    };
                }
            }
            _ => {}
        }

        match self.step {
            Step::First => poll,
            Step::Second { at: due } | Step::Rest { until: due } => {
                due.saturating_duration_since(now).min(poll)
            }
        }
    }
}
