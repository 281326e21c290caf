//! Read-only per-loop snapshots for overlay rendering and status output.
//!
//! Loops publish after each tick; nothing here is read back by control logic.

use std::collections::BTreeMap;

use parking_lot::Mutex;

/// Guide geometry for the bar minigame, in virtual-desktop pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BarOverlay {
    pub zone_x: i32,
    pub zone_y: i32,
    pub zone_width: i32,
    pub marker_y: Option<i32>,
    pub column_left: i32,
    pub column_right: i32,
    pub column_bottom: i32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LoopSnapshot {
    pub loop_name: &'static str,
    pub state: String,
    pub tracked_point: Option<(i32, i32)>,
    pub timer_text: Option<String>,
    pub bar: Option<BarOverlay>,
}

impl LoopSnapshot {
    pub fn new(loop_name: &'static str, state: impl ToString) -> Self {
        Self {
            loop_name,
            state: state.to_string(),
            tracked_point: None,
            timer_text: None,
            bar: None,
        }
    }

    pub fn at(mut self, point: (i32, i32)) -> Self {
        self.tracked_point = Some(point);
        self
    }

    pub fn timer(mut self, text: String) -> Self {
        self.timer_text = Some(text);
        self
    }

    pub fn with_bar(mut self, bar: BarOverlay) -> Self {
        self.bar = Some(bar);
        self
    }
}

impl std::fmt::Display for LoopSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.loop_name, self.state)?;
        if let Some((x, y)) = self.tracked_point {
            write!(f, " @ ({}, {})", x, y)?;
        }
        if let Some(timer) = &self.timer_text {
            write!(f, " [{}]", timer)?;
        }
        if let Some(bar) = &self.bar {
            write!(f, " zone y={} marker y={:?}", bar.zone_y, bar.marker_y)?;
        }
        Ok(())
    }
}

/// Latest visible snapshot per loop. A hidden loop has no entry.
#[derive(Default)]
pub struct OverlayBoard {
    snapshots: Mutex<BTreeMap<&'static str, LoopSnapshot>>,
}

impl OverlayBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, snapshot: LoopSnapshot) {
        self.snapshots.lock().insert(snapshot.loop_name, snapshot);
    }

    pub fn hide(&self, loop_name: &str) {
        self.snapshots.lock().remove(loop_name);
    }

    pub fn get(&self, loop_name: &str) -> Option<LoopSnapshot> {
        self.snapshots.lock().get(loop_name).cloned()
    }

    /// All visible snapshots, ordered by loop name.
    pub fn all(&self) -> Vec<LoopSnapshot> {
        self.snapshots.lock().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_replaces_and_hide_removes() {
        let board = OverlayBoard::new();
        board.publish(LoopSnapshot::new("ring", "TRACK").at((10, 20)));
        board.publish(LoopSnapshot::new("ring", "READY").at((10, 20)).timer("12ms".into()));
        board.publish(LoopSnapshot::new("bar", "TRACKING"));

        assert_eq!(board.get("ring").map(|s| s.state), Some("READY".to_string()));
        assert_eq!(board.all().len(), 2);

        board.hide("ring");
        assert!(board.get("ring").is_none());
        assert_eq!(board.all()[0].loop_name, "bar");
    }

    #[test]
    fn test_display_includes_point_and_timer() {
        let snapshot = LoopSnapshot::new("ring", "TRACK").at((5, 6)).timer("0.3s".into());
        assert_eq!(snapshot.to_string(), "ring: TRACK @ (5, 6) [0.3s]");
    }
}
