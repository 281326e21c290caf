//! The process-wide activity token: which control loop owns the input devices.
//!
//! The token packs the current `Activity` and a generation counter into one
//! atomic word. Every arbitration bumps the generation, so a loop that sees a
//! new generation knows its local state is stale even if the activity it owns
//! is the same as before.

use std::sync::atomic::{AtomicU64, Ordering};

/// Activities that can own the input devices. At most one at a time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Activity {
    Idle = 0,
    /// Idle-motion cursor sweep
    Jiggle = 1,
    /// Bar rider, tracking sub-state
    Bar = 2,
    /// Bar rider, free-form shaping sub-state
    Shaping = 3,
    /// Ring tracker
    Ring = 4,
    Autoclick = 5,
    /// Holds one key down
    HoldKey = 6,
    /// Holds shift while a movement key is down
    Sprint = 7,
}

/// Control loops that can hold the token. `Bar` and `Shaping` share one loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LoopKind {
    Jiggle,
    Bar,
    Ring,
    Autoclick,
    HoldKey,
    Sprint,
}

impl Activity {
    pub const ALL: [Activity; 8] = [
        Activity::Idle,
        Activity::Jiggle,
        Activity::Bar,
        Activity::Shaping,
        Activity::Ring,
        Activity::Autoclick,
        Activity::HoldKey,
        Activity::Sprint,
    ];

    fn from_bits(bits: u8) -> Activity {
        match bits {
            1 => Activity::Jiggle,
            2 => Activity::Bar,
            3 => Activity::Shaping,
            4 => Activity::Ring,
            5 => Activity::Autoclick,
            6 => Activity::HoldKey,
            7 => Activity::Sprint,
            _ => Activity::Idle,
        }
    }

    /// The loop that runs this activity.
    pub fn owner(self) -> Option<LoopKind> {
        match self {
            Activity::Idle => None,
            Activity::Jiggle => Some(LoopKind::Jiggle),
            Activity::Bar | Activity::Shaping => Some(LoopKind::Bar),
            Activity::Ring => Some(LoopKind::Ring),
            Activity::Autoclick => Some(LoopKind::Autoclick),
            Activity::HoldKey => Some(LoopKind::HoldKey),
            Activity::Sprint => Some(LoopKind::Sprint),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Activity::Idle => "idle",
            Activity::Jiggle => "jiggle",
            Activity::Bar => "bar",
            Activity::Shaping => "shaping",
            Activity::Ring => "ring",
            Activity::Autoclick => "autoclick",
            Activity::HoldKey => "hold key",
            Activity::Sprint => "sprint",
        }
    }
}

impl std::fmt::Display for Activity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A decoded token value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TokenState {
    pub activity: Activity,
    pub generation: u32,
}

impl TokenState {
    fn pack(self) -> u64 {
        ((self.generation as u64) << 8) | self.activity as u64
    }

    fn unpack(bits: u64) -> Self {
        Self {
            activity: Activity::from_bits((bits & 0xff) as u8),
            generation: (bits >> 8) as u32,
        }
    }

    /// True if this state belongs to `kind`.
    pub fn is_owned_by(&self, kind: LoopKind) -> bool {
        self.activity.owner() == Some(kind)
    }
}

/// Single atomic record of the active activity.
///
/// Only `InputInjector::reassign` replaces the holder, so that held input is
/// released between the old holder and the new one.
pub struct ActivityToken(AtomicU64);

impl ActivityToken {
    pub fn new() -> Self {
        Self(AtomicU64::new(
            TokenState {
                activity: Activity::Idle,
                generation: 0,
            }
            .pack(),
        ))
    }

    pub fn load(&self) -> TokenState {
        TokenState::unpack(self.0.load(Ordering::SeqCst))
    }

    pub fn current(&self) -> Activity {
        self.load().activity
    }

    /// True while `kind` holds the token at exactly `generation`.
    pub fn is_held(&self, kind: LoopKind, generation: u32) -> bool {
        let state = self.load();
        state.is_owned_by(kind) && state.generation == generation
    }

    /// Installs `next` under a new generation and returns the previous state.
    pub(crate) fn replace(&self, next: Activity) -> TokenState {
        let mut bits = self.0.load(Ordering::SeqCst);
        loop {
            let old = TokenState::unpack(bits);
            let new = TokenState {
                activity: next,
                generation: old.generation.wrapping_add(1),
            };
            match self
                .0
                .compare_exchange(bits, new.pack(), Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return old,
                Err(actual) => bits = actual,
            }
        }
    }

    /// Swaps `from` for `to` within the same generation.
    ///
    /// Fails if the token no longer holds `from` at `generation`. Used by a
    /// loop to change its own sub-activity without losing ownership.
    pub fn promote(&self, from: Activity, to: Activity, generation: u32) -> bool {
        let expected = TokenState { activity: from, generation }.pack();
        let next = TokenState { activity: to, generation }.pack();
        self.0
            .compare_exchange(expected, next, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

impl Default for ActivityToken {
    fn default() -> Self {
        Self::new()
    }
}
