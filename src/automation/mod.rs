//! Control loops and the activation surface around them.
//!
//! This module provides:
//! - The activity token that decides which loop owns the input devices
//! - Ring, bar, jiggle, autoclick and "GO" loops
//! - Keyboard helpers: hold key, sprint and the periodic attack
//! - The phase sequencer chaining jiggle, bar and ring
//! - Overlay snapshots of every loop's internal state

pub mod activity;
pub mod attack;
pub mod autoclick;
pub mod bar;
pub mod config;
pub mod context;
pub mod holdkey;
pub mod jiggle;
pub mod overlay;
pub mod ring;
pub mod runner;
pub mod sequencer;
pub mod sprint;

pub use activity::{Activity, ActivityToken, LoopKind, TokenState};
pub use attack::PeriodicAttack;
pub use autoclick::Autoclicker;
pub use bar::{BarRider, BarState};
pub use config::{get_config, init_config, ControlConfig};
pub use context::{ControlContext, ControlLoop};
pub use holdkey::HoldKey;
pub use jiggle::CursorJiggle;
pub use overlay::{BarOverlay, LoopSnapshot, OverlayBoard};
pub use ring::{RingState, RingTracker};
pub use runner::{shutdown, spawn_loops};
pub use sequencer::{GoWatcher, PhaseSequencer};
pub use sprint::Sprint;
