//! Ring tracker: clicks shrinking rings at the moment they turn green.
//!
//! The state machine sequences through: Scan → Track → Ready → Cooldown → Scan.
//! Losing focus or the activity token at any point drops back to Scan.

use std::time::{Duration, Instant};

use crate::automation::activity::LoopKind;
use crate::automation::context::{ControlContext, ControlLoop, FailureLatch};
use crate::automation::overlay::LoopSnapshot;
use crate::capture::{FrameSource, MonitorDescriptor, Region};
use crate::detection::{downscale, find_blobs, BlobCandidate, BlobFilter, Feature, HsvImage};

const LOOP_NAME: &str = "ring";

/// Ring tracker states.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RingState {
    /// Looking for a white ring
    Scan,
    /// Cursor is on a ring; waiting for it to turn green
    Track { since: Instant, lost_frames: u32 },
    /// Green seen; waiting out the confirmation delay
    Ready { green_at: Instant },
    /// Clicked; ignoring detections until the deadline
    Cooldown { until: Instant },
}

impl std::fmt::Display for RingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RingState::Scan => write!(f, "SCAN"),
            RingState::Track { .. } => write!(f, "TRACK"),
            RingState::Ready { .. } => write!(f, "READY"),
            RingState::Cooldown { .. } => write!(f, "COOLDOWN"),
        }
    }
}

pub struct RingTracker {
    state: RingState,
    tracked: (i32, i32),
    generation: Option<u32>,
    filter: BlobFilter,
    shown: bool,
    capture: FailureLatch,
    input: FailureLatch,
}

impl RingTracker {
    pub fn new(filter: BlobFilter) -> Self {
        Self {
            state: RingState::Scan,
            tracked: (0, 0),
            generation: None,
            filter,
            shown: false,
            capture: FailureLatch::default(),
            input: FailureLatch::default(),
        }
    }

    pub fn state(&self) -> RingState {
        self.state
    }

    pub fn tracked_point(&self) -> (i32, i32) {
        self.tracked
    }

    fn reset(&mut self, ctx: &ControlContext) {
        self.state = RingState::Scan;
        if self.shown {
            ctx.overlay.hide(LOOP_NAME);
            self.shown = false;
        }
    }

    /// Captures the monitor, downscales it and converts it to HSV once for
    /// every feature checked this tick.
    fn sample(
        &mut self,
        ctx: &ControlContext,
        frames: &mut dyn FrameSource,
        monitor: &MonitorDescriptor,
    ) -> Option<HsvImage> {
        let frame = self
            .capture
            .check("Ring capture", frames.capture(&Region::of_monitor(monitor)))?;
        Some(HsvImage::from_rgb(&downscale(&frame, ctx.config.ring.scale)))
    }

    /// Blobs of `feature` as `(x, y, area)` with the centre in screen pixels.
    fn blobs(
        &self,
        ctx: &ControlContext,
        small: &HsvImage,
        monitor: &MonitorDescriptor,
        feature: Feature,
    ) -> Vec<(i32, i32, f32)> {
        let scale = ctx.config.ring.scale;
        find_blobs(small, feature.range(), &self.filter)
            .into_iter()
            .map(|b| {
                let (x, y) = to_screen(&b, scale, monitor);
                (x, y, b.area)
            })
            .collect()
    }

    fn publish(&mut self, ctx: &ControlContext, now: Instant, green_delay: Duration) {
        let snapshot = match self.state {
            RingState::Track { since, .. } => LoopSnapshot::new(LOOP_NAME, self.state)
                .at(self.tracked)
                .timer(format!("{:.1}s", now.saturating_duration_since(since).as_secs_f32())),
            RingState::Ready { green_at } => {
                let remaining = green_delay.saturating_sub(now.saturating_duration_since(green_at));
                LoopSnapshot::new(LOOP_NAME, self.state)
                    .at(self.tracked)
                    .timer(format!("{:.0}ms", remaining.as_secs_f32() * 1000.0))
            }
            _ => {
                if self.shown {
                    ctx.overlay.hide(LOOP_NAME);
                    self.shown = false;
                }
                return;
            }
        };
        ctx.overlay.publish(snapshot);
        self.shown = true;
    }
}

/// Maps a blob centre in the downscaled buffer back to virtual-desktop pixels.
fn to_screen(blob: &BlobCandidate, scale: f32, monitor: &MonitorDescriptor) -> (i32, i32) {
    (
        (blob.centroid_x / scale) as i32 + monitor.left,
        (blob.centroid_y / scale) as i32 + monitor.top,
    )
}

impl ControlLoop for RingTracker {
    fn name(&self) -> &'static str {
        LOOP_NAME
    }

    fn tick(&mut self, ctx: &ControlContext, frames: &mut dyn FrameSource, now: Instant) -> Duration {
        let cfg = &ctx.config.ring;
        let token = ctx.token.load();
        if !token.is_owned_by(LoopKind::Ring) || !ctx.is_focused() {
            self.reset(ctx);
            return Duration::from_millis(cfg.idle_ms);
        }
        if self.generation != Some(token.generation) {
            self.reset(ctx);
            self.generation = Some(token.generation);
        }

        let seat = ctx.injector.seat(LoopKind::Ring, token.generation);
        let monitor = ctx.current_monitor();
        let green_delay = cfg.green_delay(monitor.height);

        match self.state {
            RingState::Scan => {
                let Some(small) = self.sample(ctx, frames, &monitor) else {
                    return Duration::from_millis(cfg.tick_ms);
                };
                let whites = self.blobs(ctx, &small, &monitor, Feature::RingWhite);
                if let Some(&(x, y, _)) = whites.iter().max_by(|a, b| a.2.total_cmp(&b.2)) {
                    self.tracked = (x, y);
                    let drag = seat.drag_to(x, y, cfg.drag_steps, Duration::from_millis(cfg.drag_ms));
                    if self.input.check("Ring drag", drag).is_some() {
                        crate::log(&format!("Ring: SCAN -> TRACK at ({}, {})", x, y));
                        self.state = RingState::Track { since: now, lost_frames: 0 };
                    }
                }
            }
            RingState::Track { since, lost_frames } => {
                let Some(small) = self.sample(ctx, frames, &monitor) else {
                    return Duration::from_millis(cfg.tick_ms);
                };
                let greens = self.blobs(ctx, &small, &monitor, Feature::RingGreen);
                let (tx, ty) = (self.tracked.0 as f32, self.tracked.1 as f32);
                let radius_sq = cfg.track_radius * cfg.track_radius;
                let nearby = greens.iter().any(|&(x, y, _)| {
                    let (dx, dy) = (x as f32 - tx, y as f32 - ty);
                    dx * dx + dy * dy < radius_sq
                });

                if nearby {
                    self.state = RingState::Ready { green_at: now };
                } else {
                    let whites = self.blobs(ctx, &small, &monitor, Feature::RingWhite);
                    let lost_frames = if whites.is_empty() { lost_frames + 1 } else { 0 };
                    if lost_frames > cfg.lost_frame_limit {
                        crate::log("Ring: lock lost, back to SCAN");
                        self.state = RingState::Scan;
                    } else {
                        self.state = RingState::Track { since, lost_frames };
                    }
                }
            }
            RingState::Ready { green_at } => {
                if now.saturating_duration_since(green_at) >= green_delay {
                    let (x, y) = self.tracked;
                    if let Some(true) = self.input.check("Ring click", seat.click_at(x, y)) {
                        crate::log(&format!("Ring: click at ({}, {})", x, y));
                    }
                    self.state = RingState::Cooldown {
                        until: now + Duration::from_millis(cfg.cooldown_ms),
                    };
                }
            }
            RingState::Cooldown { until } => {
                if now >= until {
                    self.state = RingState::Scan;
                }
            }
        }

        self.publish(ctx, now, green_delay);
        Duration::from_millis(cfg.tick_ms)
    }
}
