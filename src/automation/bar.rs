//! Bar rider: holds the button while the marker is below the target zone.
//!
//! Two sub-states share this loop. Tracking compares the white marker with the
//! yellow zone in the monitor's right-hand column. Once the zone has been gone
//! for a full second the loop promotes its own activity to shaping and clicks
//! around the middle of the screen until deactivated.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::automation::activity::{Activity, LoopKind};
use crate::automation::config::BarConfig;
use crate::automation::context::{ControlContext, ControlLoop, FailureLatch};
use crate::automation::overlay::{BarOverlay, LoopSnapshot};
use crate::capture::{FrameSource, MonitorDescriptor, Region};
use crate::detection::{downscale, median, percentile, ColorMask, Feature, HsvImage};
use crate::input::{AbsolutePoint, MouseButton, Seat};

const LOOP_NAME: &str = "bar";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarState {
    Tracking,
    Shaping,
}

impl std::fmt::Display for BarState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BarState::Tracking => write!(f, "TRACKING"),
            BarState::Shaping => write!(f, "SHAPING"),
        }
    }
}

/// Capture column for one monitor, rebuilt when the monitor changes.
struct BarRegion {
    monitor: Arc<MonitorDescriptor>,
    region: Region,
    /// Sampled rows cleared before locating the marker
    marker_top_rows: u32,
}

impl BarRegion {
    fn new(monitor: Arc<MonitorDescriptor>, cfg: &BarConfig) -> Self {
        let crop_left = (monitor.width as f32 * cfg.region_left) as i32;
        let height = (monitor.height as f32 * cfg.region_bottom) as i32;
        let region = Region::new(
            monitor.left + crop_left,
            monitor.top,
            monitor.width - crop_left,
            height,
        );
        let sampled_rows = (region.height as f32 * cfg.scale) as u32;
        Self {
            monitor,
            region,
            marker_top_rows: (sampled_rows as f32 * cfg.marker_top_margin) as u32,
        }
    }
}

/// Zone and marker positions in sampled rows/columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BarReading {
    zone_top: u32,
    zone_bottom: u32,
    zone_left: u32,
    zone_right: u32,
    target_y: u32,
    marker_y: Option<u32>,
}

impl BarReading {
    fn deadband(&self, min_deadband: i32) -> i32 {
        let half = ((self.zone_bottom - self.zone_top) as i32 / 2).max(1);
        min_deadband.max(half / 4)
    }
}

/// Desired button state: press below the band, release above it, else keep.
pub fn hold_decision(marker_y: i32, target_y: i32, deadband: i32, holding: bool) -> bool {
    if marker_y > target_y + deadband {
        true
    } else if marker_y < target_y - deadband {
        false
    } else {
        holding
    }
}

/// Locates zone and marker in a downscaled column, or `None` if the zone is absent.
fn read_bar(small: &HsvImage, marker_top_rows: u32, cfg: &BarConfig) -> Option<BarReading> {
    let zone = ColorMask::from_hsv(small, Feature::BarYellow.range());
    let (mut xs, ys) = zone.coordinates();
    if ys.len() < cfg.min_zone_pixels {
        return None;
    }
    xs.sort_unstable();

    let zone_top = percentile(&ys, 5.0)?;
    let zone_bottom = percentile(&ys, 95.0)?;
    let zone_left = percentile(&xs, 5.0)?;
    let zone_right = percentile(&xs, 95.0)?;
    let target_y = zone_top + ((zone_bottom - zone_top) as f32 * cfg.zone_anchor) as u32;

    let mut marker = ColorMask::from_hsv(small, Feature::SlitWhite.range());
    marker.clear_top_rows(marker_top_rows);
    let (_, marker_ys) = marker.coordinates();
    let marker_y = if marker_ys.len() > cfg.min_marker_pixels {
        median(&marker_ys)
    } else {
        None
    };

    Some(BarReading {
        zone_top,
        zone_bottom,
        zone_left,
        zone_right,
        target_y,
        marker_y,
    })
}

pub struct BarRider {
    state: BarState,
    generation: Option<u32>,
    region: Option<BarRegion>,
    holding: bool,
    zone_gone_since: Option<Instant>,
    last_shape_click: Option<Instant>,
    rng: StdRng,
    shown: bool,
    capture: FailureLatch,
    input: FailureLatch,
}

impl BarRider {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            state: BarState::Tracking,
            generation: None,
            region: None,
            holding: false,
            zone_gone_since: None,
            last_shape_click: None,
            rng,
            shown: false,
            capture: FailureLatch::default(),
            input: FailureLatch::default(),
        }
    }

    pub fn state(&self) -> BarState {
        self.state
    }

    pub fn is_holding(&self) -> bool {
        self.holding
    }

    fn cursor_absolute(seat: &Seat<'_>) -> AbsolutePoint {
        seat.cursor_position()
            .map(|(x, y)| seat.coords().to_absolute(x, y))
            .unwrap_or_default()
    }

    /// Lets go of the button if this loop is holding it. A stale seat sends
    /// nothing, since `reassign` already released the button.
    fn let_go(&mut self, seat: &Seat<'_>) {
        if self.holding {
            let at = Self::cursor_absolute(seat);
            self.input.check("Bar release", seat.release(MouseButton::Left, at));
            self.holding = false;
        }
    }

    fn hide(&mut self, ctx: &ControlContext) {
        if self.shown {
            ctx.overlay.hide(LOOP_NAME);
            self.shown = false;
        }
    }

    /// Drops all local state; the next active tick starts fresh. The button
    /// must already be released or owned by `reassign`.
    fn pause(&mut self, ctx: &ControlContext) {
        self.holding = false;
        self.hide(ctx);
        self.region = None;
        self.zone_gone_since = None;
        self.generation = None;
    }

    fn enter(&mut self, activity: Activity, generation: u32) {
        self.state = if activity == Activity::Shaping {
            BarState::Shaping
        } else {
            BarState::Tracking
        };
        self.generation = Some(generation);
        self.zone_gone_since = None;
        self.last_shape_click = None;
    }

    fn shape(&mut self, ctx: &ControlContext, seat: &Seat<'_>, monitor: &MonitorDescriptor, now: Instant) {
        let cfg = &ctx.config.bar;
        self.let_go(seat);
        self.hide(ctx);

        let due = self
            .last_shape_click
            .is_none_or(|t| now.saturating_duration_since(t) >= Duration::from_millis(cfg.shaping_interval_ms));
        if !due {
            return;
        }

        let (x, y) = monitor.point_at(cfg.shaping_x, cfg.shaping_y);
        let jitter = cfg.shaping_jitter;
        let x = x + self.rng.gen_range(-jitter..=jitter);
        let y = y + self.rng.gen_range(-jitter..=jitter);
        self.input.check("Shaping click", seat.click_point(x, y));
        self.last_shape_click = Some(now);
    }

    fn track(
        &mut self,
        ctx: &ControlContext,
        seat: &Seat<'_>,
        frames: &mut dyn FrameSource,
        generation: u32,
        now: Instant,
    ) {
        let cfg = &ctx.config.bar;
        let Some(bar_region) = self.region.as_ref() else {
            return;
        };
        let region = bar_region.region;
        let marker_top_rows = bar_region.marker_top_rows;
        let monitor = bar_region.monitor.clone();

        let Some(frame) = self.capture.check("Bar capture", frames.capture(&region)) else {
            return;
        };
        let small = HsvImage::from_rgb(&downscale(&frame, cfg.scale));

        let Some(reading) = read_bar(&small, marker_top_rows, cfg) else {
            self.let_go(seat);
            self.hide(ctx);
            match self.zone_gone_since {
                None => self.zone_gone_since = Some(now),
                Some(since)
                    if now.saturating_duration_since(since)
                        >= Duration::from_millis(cfg.zone_lost_ms) =>
                {
                    if ctx.token.promote(Activity::Bar, Activity::Shaping, generation) {
                        crate::log("Bar: zone gone, TRACKING -> SHAPING");
                        self.state = BarState::Shaping;
                        self.last_shape_click = None;
                    }
                }
                Some(_) => {}
            }
            return;
        };
        self.zone_gone_since = None;

        let inv = 1.0 / cfg.scale;
        let up = |v: u32| (v as f32 * inv) as i32;
        let overlay = BarOverlay {
            zone_x: region.left + up(reading.zone_left),
            zone_y: region.top + up(reading.target_y),
            zone_width: up(reading.zone_right - reading.zone_left).max(20),
            marker_y: reading.marker_y.map(|y| region.top + up(y)),
            column_left: region.left,
            column_right: monitor.right(),
            column_bottom: region.top + region.height as i32,
        };
        ctx.overlay
            .publish(LoopSnapshot::new(LOOP_NAME, self.state).with_bar(overlay));
        self.shown = true;

        let Some(marker_y) = reading.marker_y else {
            return;
        };
        let deadband = reading.deadband(cfg.min_deadband);
        let want = hold_decision(marker_y as i32, reading.target_y as i32, deadband, self.holding);
        if want == self.holding {
            return;
        }

        let at = Self::cursor_absolute(seat);
        if want {
            if let Some(pressed) = self.input.check("Bar press", seat.press(MouseButton::Left, at)) {
                self.holding = pressed;
            }
        } else {
            self.let_go(seat);
        }
    }
}

impl Default for BarRider {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlLoop for BarRider {
    fn name(&self) -> &'static str {
        LOOP_NAME
    }

    fn tick(&mut self, ctx: &ControlContext, frames: &mut dyn FrameSource, now: Instant) -> Duration {
        let cfg = &ctx.config.bar;
        let token = ctx.token.load();
        if !token.is_owned_by(LoopKind::Bar) {
            self.pause(ctx);
            return Duration::from_millis(cfg.idle_ms);
        }
        if !ctx.is_focused() {
            self.let_go(&ctx.injector.seat(LoopKind::Bar, token.generation));
            self.pause(ctx);
            return Duration::from_millis(cfg.idle_ms);
        }
        if self.generation != Some(token.generation) {
            self.pause(ctx);
            self.enter(token.activity, token.generation);
        }

        let monitor = ctx.current_monitor();
        let stale = self
            .region
            .as_ref()
            .is_none_or(|r| !Arc::ptr_eq(&r.monitor, &monitor));
        if stale {
            self.region = Some(BarRegion::new(monitor.clone(), cfg));
        }

        let seat = ctx.injector.seat(LoopKind::Bar, token.generation);
        match self.state {
            BarState::Shaping => self.shape(ctx, &seat, &monitor, now),
            BarState::Tracking => self.track(ctx, &seat, frames, token.generation, now),
        }
        Duration::from_millis(cfg.tick_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::config::ControlConfig;
    use crate::automation::context::test_support::{harness, harness_on, Harness};
    use crate::capture::testing::ScriptedFrames;
    use crate::input::InputEvent;
    use image::{Rgb, RgbImage};

    const YELLOW: Rgb<u8> = Rgb([200, 180, 40]);
    const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

    /// Capture column of the 400x300 test monitor is 100x255.
    fn column(marker_rows: std::ops::Range<u32>) -> RgbImage {
        RgbImage::from_fn(100, 255, |x, y| {
            if marker_rows.contains(&y) && (10..90).contains(&x) {
                WHITE
            } else if (100..180).contains(&y) && (20..80).contains(&x) {
                YELLOW
            } else {
                Rgb([0, 0, 0])
            }
        })
    }

    fn button_events(h: &Harness) -> Vec<bool> {
        h.sink
            .events()
            .into_iter()
            .filter_map(|e| match e {
                InputEvent::MouseButton { pressed, .. } => Some(pressed),
                _ => None,
            })
            .collect()
    }

    fn bar_harness(activity: Activity) -> (Harness, BarRider) {
        let h = harness();
        h.ctx.activate(activity);
        (h, BarRider::with_rng(StdRng::seed_from_u64(7)))
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_hold_decision_hysteresis() {
        assert!(hold_decision(80, 74, 5, false));
        assert!(!hold_decision(68, 74, 5, true));
        for marker in 69..=79 {
            assert!(hold_decision(marker, 74, 5, true));
            assert!(!hold_decision(marker, 74, 5, false));
        }
    }

    #[test]
    fn test_region_is_right_quarter_top_85_percent() {
        let monitor = Arc::new(MonitorDescriptor { index: 0, left: -400, top: 10, width: 400, height: 300 });
        let region = BarRegion::new(monitor, &BarConfig::default());
        assert_eq!(region.region, Region::new(-100, 10, 100, 255));
        assert_eq!(region.marker_top_rows, 25);
    }

    #[test]
    fn test_reading_of_synthetic_column() {
        let small = HsvImage::from_rgb(&downscale(&column(146..151), 0.5));
        let reading = read_bar(&small, 25, &BarConfig::default()).unwrap();
        assert!((73..=75).contains(&reading.target_y), "target {}", reading.target_y);
        let marker = reading.marker_y.unwrap();
        assert!((73..=75).contains(&marker), "marker {}", marker);
        assert_eq!(reading.deadband(5), 5);
    }

    #[test]
    fn test_deadband_holds_state_across_jitter() {
        let (h, mut rider) = bar_harness(Activity::Bar);
        let mut frames = ScriptedFrames::new(vec![
            column(230..235), // far below: press
            column(146..151), // centred
            column(142..147), // slightly above
            column(152..157), // slightly below
            column(142..147),
            column(60..65), // far above: release
        ]);
        let t0 = Instant::now();

        rider.tick(&h.ctx, &mut frames, t0);
        assert!(rider.is_holding());
        for i in 1..5 {
            rider.tick(&h.ctx, &mut frames, t0 + ms(i));
            assert!(rider.is_holding(), "frame {}", i);
        }
        assert_eq!(button_events(&h), vec![true]);

        rider.tick(&h.ctx, &mut frames, t0 + ms(5));
        assert!(!rider.is_holding());
        assert_eq!(button_events(&h), vec![true, false]);
    }

    #[test]
    fn test_jitter_inside_band_never_presses() {
        let (h, mut rider) = bar_harness(Activity::Bar);
        let mut frames = ScriptedFrames::new(vec![
            column(146..151),
            column(142..147),
            column(152..157),
            column(146..151),
        ]);
        let t0 = Instant::now();
        for i in 0..4 {
            rider.tick(&h.ctx, &mut frames, t0 + ms(i));
        }
        assert!(button_events(&h).is_empty());
        let overlay = h.ctx.overlay.get("bar").and_then(|s| s.bar).unwrap();
        assert_eq!(overlay.column_left, 300);
        assert_eq!(overlay.column_bottom, 255);
    }

    #[test]
    fn test_zone_loss_promotes_to_shaping_after_one_second() {
        let (h, mut rider) = bar_harness(Activity::Bar);
        let mut frames = ScriptedFrames::new(vec![column(230..235)]).then_repeat(RgbImage::new(100, 255));
        let t0 = Instant::now();

        rider.tick(&h.ctx, &mut frames, t0);
        assert!(rider.is_holding());

        // Zone disappears: button released, but no shaping yet
        rider.tick(&h.ctx, &mut frames, t0 + ms(10));
        assert!(!rider.is_holding());
        rider.tick(&h.ctx, &mut frames, t0 + ms(900));
        assert_eq!(rider.state(), BarState::Tracking);
        assert_eq!(h.ctx.token.current(), Activity::Bar);

        rider.tick(&h.ctx, &mut frames, t0 + ms(1010));
        assert_eq!(rider.state(), BarState::Shaping);
        assert_eq!(h.ctx.token.current(), Activity::Shaping);
    }

    #[test]
    fn test_single_missed_frame_does_not_reset_tracking() {
        let (h, mut rider) = bar_harness(Activity::Bar);
        let mut frames = ScriptedFrames::new(vec![
            RgbImage::new(100, 255),
            column(146..151),
            RgbImage::new(100, 255),
        ]);
        let t0 = Instant::now();
        rider.tick(&h.ctx, &mut frames, t0);
        rider.tick(&h.ctx, &mut frames, t0 + ms(600));
        rider.tick(&h.ctx, &mut frames, t0 + ms(1200));
        assert_eq!(rider.state(), BarState::Tracking);
    }

    #[test]
    fn test_shaping_clicks_on_interval_and_is_terminal() {
        let (h, mut rider) = bar_harness(Activity::Shaping);
        let mut frames = ScriptedFrames::new(vec![]).then_repeat(column(146..151));
        let t0 = Instant::now();

        rider.tick(&h.ctx, &mut frames, t0);
        assert_eq!(rider.state(), BarState::Shaping);
        assert_eq!(h.sink.left_presses(), 1);
        let (x, y) = h.sink.cursor();
        assert!((225..=255).contains(&x) && (135..=165).contains(&y), "click at {:?}", (x, y));

        rider.tick(&h.ctx, &mut frames, t0 + ms(100));
        assert_eq!(h.sink.left_presses(), 1);
        rider.tick(&h.ctx, &mut frames, t0 + ms(150));
        assert_eq!(h.sink.left_presses(), 2);

        // Zone on screen again: still shaping, nothing captured
        assert!(frames.regions.is_empty());
        assert_eq!(rider.state(), BarState::Shaping);
    }

    #[test]
    fn test_focus_loss_releases_button() {
        let (h, mut rider) = bar_harness(Activity::Bar);
        let mut frames = ScriptedFrames::new(vec![column(230..235), column(230..235)]);
        let t0 = Instant::now();

        rider.tick(&h.ctx, &mut frames, t0);
        assert!(rider.is_holding());

        h.focus.set(false);
        rider.tick(&h.ctx, &mut frames, t0 + ms(1));
        assert!(!rider.is_holding());
        assert_eq!(button_events(&h), vec![true, false]);

        h.focus.set(true);
        rider.tick(&h.ctx, &mut frames, t0 + ms(2));
        assert!(rider.is_holding());
    }

    #[test]
    fn test_lost_token_does_not_release_next_owners_press() {
        let (h, mut rider) = bar_harness(Activity::Bar);
        let mut frames = ScriptedFrames::new(vec![column(230..235)]).then_repeat(column(230..235));
        let t0 = Instant::now();

        rider.tick(&h.ctx, &mut frames, t0);
        assert!(rider.is_holding());

        // The switch releases the bar's press; autoclick then presses its own
        h.ctx.request(Activity::Autoclick);
        let generation = h.ctx.token.load().generation;
        let autoclick = h.ctx.injector.seat(LoopKind::Autoclick, generation);
        assert!(autoclick.press(MouseButton::Left, AbsolutePoint::default()).unwrap());

        rider.tick(&h.ctx, &mut frames, t0 + ms(1));
        assert!(!rider.is_holding());
        assert_eq!(button_events(&h), vec![true, false, true]);
    }

    #[test]
    fn test_region_follows_monitor_change() {
        let monitors = vec![
            MonitorDescriptor { index: 0, left: 0, top: 0, width: 400, height: 300 },
            MonitorDescriptor { index: 1, left: 400, top: 0, width: 800, height: 600 },
        ];
        let h = harness_on(monitors, ControlConfig::default());
        h.ctx.activate(Activity::Bar);
        let mut rider = BarRider::with_rng(StdRng::seed_from_u64(7));
        let mut frames = ScriptedFrames::new(vec![]).then_repeat(RgbImage::new(1, 1));
        let t0 = Instant::now();

        rider.tick(&h.ctx, &mut frames, t0);
        rider.tick(&h.ctx, &mut frames, t0 + ms(1));
        assert_eq!(frames.regions, vec![Region::new(300, 0, 100, 255); 2]);

        h.ctx.cycle_monitor(1);
        rider.tick(&h.ctx, &mut frames, t0 + ms(2));
        assert_eq!(frames.regions[2], Region::new(1000, 0, 200, 510));
        assert_eq!(rider.region.as_ref().map(|r| r.marker_top_rows), Some(51));

        // Same monitor again: the region is kept, not rebuilt
        let kept = rider.region.as_ref().map(|r| Arc::as_ptr(&r.monitor));
        rider.tick(&h.ctx, &mut frames, t0 + ms(3));
        assert_eq!(rider.region.as_ref().map(|r| Arc::as_ptr(&r.monitor)), kept);
        assert_eq!(frames.regions[3], Region::new(1000, 0, 200, 510));
    }
}
