//! Input dispatch with held-input tracking and activity arbitration.
//!
//! All events pass through one lock. Events issued through a `Seat` are
//! checked against the activity token under that lock, and `reassign` swaps
//! the token and releases held input under the same lock, so a loop that has
//! lost the token can neither press nor release on top of the next owner.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use parking_lot::Mutex;

use super::{AbsolutePoint, InputEvent, InputSink, MouseButton};
use crate::automation::activity::{Activity, ActivityToken, LoopKind, TokenState};
use crate::capture::CoordinateSpace;

/// Press-to-release hold for clicks.
pub const CLICK_HOLD: Duration = Duration::from_millis(30);

/// Press-to-release hold for key taps.
pub const KEY_HOLD: Duration = Duration::from_millis(50);

/// Displacements below this on both axes are not worth a drag.
const MIN_DRAG_DISTANCE: i32 = 2;

struct Inner {
    sink: Box<dyn InputSink>,
    held_buttons: Vec<MouseButton>,
    held_keys: Vec<(u16, bool)>,
}

impl Inner {
    fn send(&mut self, event: InputEvent) -> Result<()> {
        self.sink.send(&event)?;
        match event {
            InputEvent::Key { scan_code, pressed, extended } => {
                let key = (scan_code, extended);
                self.held_keys.retain(|k| *k != key);
                if pressed {
                    self.held_keys.push(key);
                }
            }
            InputEvent::MouseButton { button, pressed, .. } => {
                self.held_buttons.retain(|b| *b != button);
                if pressed {
                    self.held_buttons.push(button);
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Sends an up event for everything still held. Tracking is cleared even on failure.
    fn release_held(&mut self, coords: &CoordinateSpace) -> Result<()> {
        let at = self
            .sink
            .cursor_position()
            .map(|(x, y)| coords.to_absolute(x, y))
            .unwrap_or_default();

        let buttons = std::mem::take(&mut self.held_buttons);
        let keys = std::mem::take(&mut self.held_keys);
        let mut result = Ok(());

        for button in buttons {
            let event = InputEvent::MouseButton { button, pressed: false, at };
            if let Err(e) = self.sink.send(&event) {
                result = Err(e);
            }
        }
        for (scan_code, extended) in keys {
            let event = InputEvent::Key { scan_code, pressed: false, extended };
            if let Err(e) = self.sink.send(&event) {
                result = Err(e);
            }
        }
        result
    }
}

/// Ownership check for gated dispatch.
#[derive(Clone, Copy)]
struct Gate<'a> {
    token: &'a ActivityToken,
    kind: LoopKind,
    generation: u32,
}

impl Gate<'_> {
    fn is_open(&self) -> bool {
        self.token.is_held(self.kind, self.generation)
    }
}

pub struct InputInjector {
    inner: Mutex<Inner>,
    token: Arc<ActivityToken>,
    coords: Arc<CoordinateSpace>,
}

impl InputInjector {
    pub fn new(
        sink: Box<dyn InputSink>,
        token: Arc<ActivityToken>,
        coords: Arc<CoordinateSpace>,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                sink,
                held_buttons: Vec::new(),
                held_keys: Vec::new(),
            }),
            token,
            coords,
        }
    }

    pub fn token(&self) -> &ActivityToken {
        &self.token
    }

    pub fn coords(&self) -> &CoordinateSpace {
        &self.coords
    }

    /// Sends one event unless a closed gate forbids it. Ungated events always pass.
    fn dispatch(&self, gate: Option<Gate<'_>>, event: InputEvent) -> Result<bool> {
        let mut inner = self.inner.lock();
        if gate.is_some_and(|g| !g.is_open()) {
            return Ok(false);
        }
        inner.send(event)?;
        Ok(true)
    }

    pub fn mouse_button(&self, button: MouseButton, pressed: bool, at: AbsolutePoint) -> Result<()> {
        self.dispatch(None, InputEvent::MouseButton { button, pressed, at })
            .map(|_| ())
    }

    pub fn mouse_move_absolute(&self, at: AbsolutePoint) -> Result<()> {
        self.dispatch(None, InputEvent::MoveAbsolute { at }).map(|_| ())
    }

    pub fn mouse_move_relative(&self, dx: i32, dy: i32) -> Result<()> {
        self.dispatch(None, InputEvent::MoveRelative { dx, dy }).map(|_| ())
    }

    pub fn cursor_position(&self) -> Result<(i32, i32)> {
        self.inner.lock().sink.cursor_position()
    }

    /// Moves the cursor to `(x, y)` in `steps` relative moves spread over `duration`.
    pub fn drag_to(&self, x: i32, y: i32, steps: u32, duration: Duration) -> Result<()> {
        self.drag(None, x, y, steps, duration, &|| true).map(|_| ())
    }

    /// Like `drag_to`, but stops early once `keep_going` returns false.
    ///
    /// Returns true if the full drag was performed.
    pub fn drag_to_while(
        &self,
        x: i32,
        y: i32,
        steps: u32,
        duration: Duration,
        keep_going: impl Fn() -> bool,
    ) -> Result<bool> {
        self.drag(None, x, y, steps, duration, &keep_going)
    }

    /// Left click at the current cursor. The caller must already be at `(x, y)`.
    pub fn click_at(&self, x: i32, y: i32) -> Result<()> {
        self.click(None, x, y).map(|_| ())
    }

    /// Absolute move to `(x, y)`, then click there.
    pub fn click_point(&self, x: i32, y: i32) -> Result<()> {
        self.click_point_gated(None, x, y).map(|_| ())
    }

    /// Arbitrates the activity token to `next`.
    ///
    /// The previous holder is deactivated and its held input released before
    /// `next` becomes active. Returns the previous token state.
    pub fn reassign(&self, next: Activity) -> TokenState {
        let mut inner = self.inner.lock();
        let previous = self.token.replace(Activity::Idle);
        if let Err(e) = inner.release_held(&self.coords) {
            crate::log(&format!("Failed to release held input: {}", e));
        }
        if next != Activity::Idle {
            self.token.replace(next);
        }
        if previous.activity != next {
            crate::log(&format!("Activity: {} -> {}", previous.activity, next));
        }
        previous
    }

    /// Gated handle for the loop `kind` holding the token at `generation`.
    pub fn seat(&self, kind: LoopKind, generation: u32) -> Seat<'_> {
        Seat {
            injector: self,
            gate: Gate {
                token: &self.token,
                kind,
                generation,
            },
        }
    }

    fn drag(
        &self,
        gate: Option<Gate<'_>>,
        x: i32,
        y: i32,
        steps: u32,
        duration: Duration,
        keep_going: &dyn Fn() -> bool,
    ) -> Result<bool> {
        let (cx, cy) = self.cursor_position()?;
        let (dx, dy) = (x - cx, y - cy);
        if dx.abs() < MIN_DRAG_DISTANCE && dy.abs() < MIN_DRAG_DISTANCE {
            return Ok(true);
        }

        let steps = steps.max(1);
        let pause = duration / steps;
        for i in 1..=steps {
            if !keep_going() {
                return Ok(false);
            }
            let sx = step_delta(dx, i, steps);
            let sy = step_delta(dy, i, steps);
            if (sx != 0 || sy != 0)
                && !self.dispatch(gate, InputEvent::MoveRelative { dx: sx, dy: sy })?
            {
                return Ok(false);
            }
            if !pause.is_zero() {
                thread::sleep(pause);
            }
        }
        Ok(true)
    }

    fn click(&self, gate: Option<Gate<'_>>, x: i32, y: i32) -> Result<bool> {
        let at = self.coords.to_absolute(x, y);
        let button = MouseButton::Left;
        if !self.dispatch(gate, InputEvent::MouseButton { button, pressed: true, at })? {
            return Ok(false);
        }
        thread::sleep(CLICK_HOLD);
        self.dispatch(gate, InputEvent::MouseButton { button, pressed: false, at })?;
        Ok(true)
    }

    fn click_point_gated(&self, gate: Option<Gate<'_>>, x: i32, y: i32) -> Result<bool> {
        let at = self.coords.to_absolute(x, y);
        if !self.dispatch(gate, InputEvent::MoveAbsolute { at })? {
            return Ok(false);
        }
        self.click(gate, x, y)
    }

    fn tap(&self, gate: Option<Gate<'_>>, scan_code: u16, extended: bool) -> Result<bool> {
        if !self.dispatch(gate, InputEvent::Key { scan_code, pressed: true, extended })? {
            return Ok(false);
        }
        thread::sleep(KEY_HOLD);
        self.dispatch(gate, InputEvent::Key { scan_code, pressed: false, extended })?;
        Ok(true)
    }
}

/// Share of `total` moved by step `i` of `steps`, with rounding error carried forward.
fn step_delta(total: i32, i: u32, steps: u32) -> i32 {
    let at = |k: u32| (total as f64 * k as f64 / steps as f64).round() as i32;
    at(i) - at(i - 1)
}

/// Input handle for one control loop.
///
/// Events are dropped (returning `Ok(false)`) once the loop no longer holds
/// the token at the generation the seat was taken for. Anything the loop was
/// holding at that point has already been released by `reassign`.
pub struct Seat<'a> {
    injector: &'a InputInjector,
    gate: Gate<'a>,
}

impl Seat<'_> {
    /// True while the seat's owner still holds the token.
    pub fn is_live(&self) -> bool {
        self.gate.is_open()
    }

    pub fn coords(&self) -> &CoordinateSpace {
        self.injector.coords()
    }

    pub fn cursor_position(&self) -> Result<(i32, i32)> {
        self.injector.cursor_position()
    }

    pub fn press(&self, button: MouseButton, at: AbsolutePoint) -> Result<bool> {
        self.injector
            .dispatch(Some(self.gate), InputEvent::MouseButton { button, pressed: true, at })
    }

    pub fn release(&self, button: MouseButton, at: AbsolutePoint) -> Result<bool> {
        self.injector
            .dispatch(Some(self.gate), InputEvent::MouseButton { button, pressed: false, at })
    }

    pub fn move_absolute(&self, at: AbsolutePoint) -> Result<bool> {
        self.injector.dispatch(Some(self.gate), InputEvent::MoveAbsolute { at })
    }

    pub fn drag_to(&self, x: i32, y: i32, steps: u32, duration: Duration) -> Result<bool> {
        self.injector.drag(Some(self.gate), x, y, steps, duration, &|| true)
    }

    pub fn drag_to_while(
        &self,
        x: i32,
        y: i32,
        steps: u32,
        duration: Duration,
        keep_going: impl Fn() -> bool,
    ) -> Result<bool> {
        self.injector
            .drag(Some(self.gate), x, y, steps, duration, &keep_going)
    }

    pub fn click_at(&self, x: i32, y: i32) -> Result<bool> {
        self.injector.click(Some(self.gate), x, y)
    }

    pub fn click_point(&self, x: i32, y: i32) -> Result<bool> {
        self.injector.click_point_gated(Some(self.gate), x, y)
    }

    pub fn key(&self, scan_code: u16, pressed: bool, extended: bool) -> Result<bool> {
        self.injector
            .dispatch(Some(self.gate), InputEvent::Key { scan_code, pressed, extended })
    }

    pub fn tap_key(&self, scan_code: u16, extended: bool) -> Result<bool> {
        self.injector.tap(Some(self.gate), scan_code, extended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::MonitorDescriptor;
    use crate::input::testing::RecordingSink;

    fn setup() -> (InputInjector, RecordingSink) {
        let coords = Arc::new(CoordinateSpace::new(vec![MonitorDescriptor {
            index: 0,
            left: 0,
            top: 0,
            width: 1920,
            height: 1080,
        }]));
        let sink = RecordingSink::new(coords.clone());
        let injector = InputInjector::new(
            Box::new(sink.clone()),
            Arc::new(ActivityToken::new()),
            coords,
        );
        (injector, sink)
    }

    fn relative_moves(sink: &RecordingSink) -> Vec<(i32, i32)> {
        sink.events()
            .into_iter()
            .filter_map(|e| match e {
                InputEvent::MoveRelative { dx, dy } => Some((dx, dy)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_step_delta_never_accumulates_error() {
        for total in [-101, -7, 0, 1, 10, 333] {
            for steps in [1, 3, 7, 20, 30] {
                let sum: i32 = (1..=steps).map(|i| step_delta(total, i, steps)).sum();
                assert_eq!(sum, total, "total {} steps {}", total, steps);
            }
        }
    }

    #[test]
    fn test_drag_arrives_exactly() {
        let (injector, sink) = setup();
        sink.set_cursor(100, 100);
        injector.drag_to(207, 53, 7, Duration::ZERO).unwrap();

        let moves = relative_moves(&sink);
        assert!(moves.len() <= 7);
        assert_eq!(sink.cursor(), (207, 53));
    }

    #[test]
    fn test_tiny_drag_is_skipped() {
        let (injector, sink) = setup();
        sink.set_cursor(100, 100);
        injector.drag_to(101, 99, 10, Duration::ZERO).unwrap();
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_drag_while_stops_when_told() {
        let (injector, sink) = setup();
        sink.set_cursor(0, 0);
        let calls = std::cell::Cell::new(0);
        let completed = injector
            .drag_to_while(300, 0, 30, Duration::ZERO, || {
                calls.set(calls.get() + 1);
                calls.get() <= 3
            })
            .unwrap();
        assert!(!completed);
        assert_eq!(relative_moves(&sink).len(), 3);
    }

    #[test]
    fn test_click_holds_for_contract_duration() {
        let (injector, sink) = setup();
        sink.set_cursor(400, 300);
        let start = std::time::Instant::now();
        injector.click_at(400, 300).unwrap();
        assert!(start.elapsed() >= CLICK_HOLD);

        let at = injector.coords().to_absolute(400, 300);
        assert_eq!(
            sink.events(),
            vec![
                InputEvent::MouseButton { button: MouseButton::Left, pressed: true, at },
                InputEvent::MouseButton { button: MouseButton::Left, pressed: false, at },
            ]
        );
    }

    #[test]
    fn test_click_point_moves_first() {
        let (injector, sink) = setup();
        injector.click_point(960, 540).unwrap();
        let events = sink.events();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], InputEvent::MoveAbsolute { .. }));
        assert_eq!(sink.cursor(), (960, 540));
    }

    fn seat_for(injector: &InputInjector, activity: Activity) -> Seat<'_> {
        injector.reassign(activity);
        let kind = activity.owner().unwrap();
        injector.seat(kind, injector.token().load().generation)
    }

    #[test]
    fn test_tap_key_pairs_down_and_up() {
        let (injector, sink) = setup();
        let seat = seat_for(&injector, Activity::Autoclick);
        assert!(seat.tap_key(0x1C, false).unwrap());
        assert_eq!(
            sink.events(),
            vec![
                InputEvent::Key { scan_code: 0x1C, pressed: true, extended: false },
                InputEvent::Key { scan_code: 0x1C, pressed: false, extended: false },
            ]
        );
    }

    #[test]
    fn test_reassign_ups_everything_held() {
        let (injector, sink) = setup();
        let seat = seat_for(&injector, Activity::Sprint);
        assert!(seat.key(0x2A, true, false).unwrap());
        injector.mouse_button(MouseButton::Left, true, AbsolutePoint::default()).unwrap();
        injector.reassign(Activity::Idle);

        let events = sink.events();
        assert!(events.contains(&InputEvent::Key { scan_code: 0x2A, pressed: false, extended: false }));
        assert!(events.iter().any(|e| matches!(
            e,
            InputEvent::MouseButton { button: MouseButton::Left, pressed: false, .. }
        )));

        // Nothing left to release
        let before = sink.events().len();
        injector.reassign(Activity::Idle);
        assert_eq!(sink.events().len(), before);
    }

    #[test]
    fn test_reassign_releases_previous_holder_input() {
        let (injector, sink) = setup();
        injector.reassign(Activity::Bar);
        let bar = injector.token().load().generation;

        let seat = injector.seat(LoopKind::Bar, bar);
        assert!(seat.press(MouseButton::Left, AbsolutePoint::default()).unwrap());

        let previous = injector.reassign(Activity::Ring);
        assert_eq!(previous.activity, Activity::Bar);
        assert_eq!(injector.token().current(), Activity::Ring);
        assert!(matches!(
            sink.events().last(),
            Some(InputEvent::MouseButton { pressed: false, .. })
        ));

        // The stale seat can no longer press or move
        assert!(!seat.is_live());
        assert!(!seat.press(MouseButton::Left, AbsolutePoint::default()).unwrap());
        assert!(!seat.move_absolute(AbsolutePoint::default()).unwrap());
        // Nor release on top of whoever holds the token next
        let before = sink.events().len();
        assert!(!seat.release(MouseButton::Left, AbsolutePoint::default()).unwrap());
        assert_eq!(sink.events().len(), before);
    }

    #[test]
    fn test_stale_release_leaves_new_owner_press_intact() {
        let (injector, sink) = setup();
        injector.reassign(Activity::Bar);
        let bar = injector.seat(LoopKind::Bar, injector.token().load().generation);
        assert!(bar.press(MouseButton::Left, AbsolutePoint::default()).unwrap());

        injector.reassign(Activity::Autoclick);
        let autoclick = injector.seat(LoopKind::Autoclick, injector.token().load().generation);
        assert!(autoclick.press(MouseButton::Left, AbsolutePoint::default()).unwrap());
        assert!(!bar.release(MouseButton::Left, AbsolutePoint::default()).unwrap());

        let presses: Vec<bool> = sink
            .events()
            .into_iter()
            .filter_map(|e| match e {
                InputEvent::MouseButton { pressed, .. } => Some(pressed),
                _ => None,
            })
            .collect();
        assert_eq!(presses, vec![true, false, true]);
    }

    #[test]
    fn test_stale_seat_sends_no_keys() {
        let (injector, sink) = setup();
        let seat = seat_for(&injector, Activity::HoldKey);
        assert!(seat.key(0x4B, true, true).unwrap());
        injector.reassign(Activity::Ring);
        let before = sink.events().len();

        assert!(!seat.key(0x4B, true, true).unwrap());
        assert!(!seat.key(0x4B, false, true).unwrap());
        assert!(!seat.tap_key(0x03, false).unwrap());
        assert_eq!(sink.events().len(), before);
        assert_eq!(
            sink.events().last(),
            Some(&InputEvent::Key { scan_code: 0x4B, pressed: false, extended: true })
        );
    }

    #[test]
    fn test_seat_drag_stops_on_lost_token() {
        let (injector, sink) = setup();
        sink.set_cursor(0, 0);
        injector.reassign(Activity::Jiggle);
        let generation = injector.token().load().generation;
        injector.reassign(Activity::Idle);

        let seat = injector.seat(LoopKind::Jiggle, generation);
        assert!(!seat.drag_to(500, 0, 10, Duration::ZERO).unwrap());
        assert!(relative_moves(&sink).is_empty());
    }

    #[test]
    fn test_ungated_primitives_always_send() {
        let (injector, sink) = setup();
        injector.mouse_move_relative(5, -5).unwrap();
        injector.mouse_move_absolute(AbsolutePoint { x: 0, y: 0 }).unwrap();
        assert_eq!(sink.events().len(), 2);
        assert_eq!(sink.cursor(), (0, 0));
    }

    #[test]
    fn test_sink_failure_propagates() {
        let (injector, sink) = setup();
        let seat = seat_for(&injector, Activity::HoldKey);
        sink.set_failing(true);
        assert!(seat.tap_key(0x1C, false).is_err());
    }
}
