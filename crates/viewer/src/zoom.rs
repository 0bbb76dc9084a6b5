//! Zoom controller
//!
//! Three zoom scalars cooperate to keep wheel zooming smooth without
//! re-rendering every frame: the *target* is where the gesture wants to
//! end up, the *visual* zoom eases toward it each tick and only scales
//! already-rendered pixels at paint time, and the *committed* zoom,
//! which drives layout and cache keys, snaps to the target only after a
//! debounce window with no further input. The scroll correction at
//! commit uses the same anchor formula the paint path uses during the
//! gesture, so the commit itself is invisible.

use std::time::{Duration, Instant};

pub const MIN_ZOOM: f32 = 0.1;
pub const MAX_ZOOM: f32 = 8.0;

/// Fraction of the remaining distance covered per tick (ease-out).
const LERP_FACTOR: f32 = 0.22;

/// Snap-to-target threshold.
const SNAP_EPSILON: f32 = 5e-4;

/// Quiet time after the last zoom input before committing.
const COMMIT_DEBOUNCE: Duration = Duration::from_millis(140);

/// How long after commit the interactive fallback rendering stays on,
/// giving background high-res renders time to land.
const SETTLE_WINDOW: Duration = Duration::from_millis(250);

/// Zoom step per wheel tick (angle delta of 120).
const WHEEL_TICK_STEP: f32 = 0.07;

/// Zoom step per precision-touchpad pixel.
const WHEEL_PIXEL_STEP: f32 = 0.004;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomPhase {
    Idle,
    /// A gesture is in progress; visual zoom is easing toward target.
    Animating,
    /// Committed, inside the settle window.
    Committing,
}

/// Snapshot of the state at gesture start; defines the invariant anchor
/// point kept fixed through the gesture and at commit.
#[derive(Debug, Clone, Copy)]
struct Gesture {
    scroll0: f32,
    zoom0: f32,
    /// Anchor y within the viewport: cursor position for wheel gestures,
    /// viewport center otherwise.
    anchor: f32,
}

/// Outcome of a controller tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ZoomTick {
    Quiet,
    Repaint,
    /// Committed zoom changed: re-layout and apply the corrected scroll.
    Committed { zoom: f32, scroll: f32 },
}

#[derive(Debug)]
pub struct ZoomController {
    committed: f32,
    visual: f32,
    target: f32,
    phase: ZoomPhase,
    gesture: Option<Gesture>,
    debounce_deadline: Option<Instant>,
    settle_deadline: Option<Instant>,
}

impl Default for ZoomController {
    fn default() -> Self {
        Self::new()
    }
}

impl ZoomController {
    pub fn new() -> Self {
        Self {
            committed: 1.0,
            visual: 1.0,
            target: 1.0,
            phase: ZoomPhase::Idle,
            gesture: None,
            debounce_deadline: None,
            settle_deadline: None,
        }
    }

    pub fn committed(&self) -> f32 {
        self.committed
    }

    pub fn visual(&self) -> f32 {
        self.visual
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn phase(&self) -> ZoomPhase {
        self.phase
    }

    /// Paint-time scale factor relative to the committed layout.
    pub fn visual_scale(&self) -> f32 {
        self.visual / self.committed
    }

    /// True while a gesture or its settle window is active; the cache
    /// may serve scaled fallbacks during this time.
    pub fn is_interactive(&self) -> bool {
        self.phase != ZoomPhase::Idle
    }

    /// Anchor y (viewport coordinates) of the active gesture.
    pub fn anchor(&self) -> Option<f32> {
        self.gesture.map(|g| g.anchor)
    }

    /// Wheel zoom with the modifier held. `pixel_delta` takes precedence
    /// over `tick_delta` (precision touchpads send small continuous
    /// pixel deltas; mouse wheels send multiples of ±120).
    pub fn wheel_zoom(
        &mut self,
        pixel_delta: f32,
        angle_delta: f32,
        cursor_viewport_y: f32,
        scroll: f32,
        viewport_height: f32,
        now: Instant,
    ) {
        let factor = if pixel_delta != 0.0 {
            1.0 + pixel_delta * WHEEL_PIXEL_STEP
        } else {
            1.0 + (angle_delta / 120.0) * WHEEL_TICK_STEP
        };
        let anchor = cursor_viewport_y.clamp(0.0, viewport_height);
        self.begin_input(factor, anchor, scroll, now);
    }

    /// Zoom toward an absolute value, anchored at the viewport center
    /// (zoom buttons, percentage input).
    pub fn request_zoom(
        &mut self,
        zoom: f32,
        scroll: f32,
        viewport_height: f32,
        now: Instant,
    ) {
        let clamped = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
        if (clamped - self.target).abs() < 0.001 {
            return;
        }
        let factor = clamped / self.target;
        self.begin_input(factor, viewport_height / 2.0, scroll, now);
    }

    fn begin_input(&mut self, factor: f32, anchor: f32, scroll: f32, now: Instant) {
        // First input of a new gesture snapshots the scroll origin;
        // scroll0/zoom0 define the document point held fixed until
        // commit and are not re-captured by follow-up events.
        if self.gesture.is_none() {
            self.gesture = Some(Gesture { scroll0: scroll, zoom0: self.committed, anchor });
        }
        self.target = (self.target * factor).clamp(MIN_ZOOM, MAX_ZOOM);
        self.phase = ZoomPhase::Animating;
        self.debounce_deadline = Some(now + COMMIT_DEBOUNCE);
        self.settle_deadline = None;
    }

    /// Advance the animation; call at ~60 Hz while interactive.
    pub fn tick(&mut self, now: Instant) -> ZoomTick {
        match self.phase {
            ZoomPhase::Idle => ZoomTick::Quiet,
            ZoomPhase::Committing => {
                if self.settle_deadline.is_some_and(|d| now >= d) {
                    self.settle_deadline = None;
                    self.phase = ZoomPhase::Idle;
                    ZoomTick::Repaint
                } else {
                    ZoomTick::Quiet
                }
            }
            ZoomPhase::Animating => {
                let diff = self.target - self.visual;
                if diff.abs() < SNAP_EPSILON {
                    self.visual = self.target;
                } else {
                    self.visual += diff * LERP_FACTOR;
                }

                if self.debounce_deadline.is_some_and(|d| now >= d) {
                    return self.commit(now);
                }
                ZoomTick::Repaint
            }
        }
    }

    fn commit(&mut self, now: Instant) -> ZoomTick {
        self.debounce_deadline = None;
        let zoom = round3(self.target);

        // Same anchor formula the paint path used throughout the
        // gesture, so there is no visible jump at commit time.
        let scroll = match self.gesture.take() {
            Some(g) if g.zoom0 > 0.0 => {
                ((g.scroll0 + g.anchor) * (zoom / g.zoom0) - g.anchor).max(0.0)
            }
            _ => 0.0,
        };

        self.committed = zoom;
        self.visual = zoom;
        self.target = zoom;
        self.phase = ZoomPhase::Committing;
        self.settle_deadline = Some(now + SETTLE_WINDOW);
        ZoomTick::Committed { zoom, scroll }
    }
}

fn round3(z: f32) -> f32 {
    (z * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> Instant {
        Instant::now()
    }

    /// Tick until the controller commits, returning the commit.
    fn run_to_commit(ctrl: &mut ZoomController, start: Instant) -> (f32, f32) {
        let mut now = start;
        for _ in 0..200 {
            now += Duration::from_millis(16);
            if let ZoomTick::Committed { zoom, scroll } = ctrl.tick(now) {
                return (zoom, scroll);
            }
        }
        panic!("controller never committed");
    }

    #[test]
    fn target_is_clamped() {
        let mut ctrl = ZoomController::new();
        let now = t0();
        for _ in 0..100 {
            ctrl.wheel_zoom(0.0, 120.0, 300.0, 0.0, 600.0, now);
        }
        assert!(ctrl.target() <= MAX_ZOOM);

        let mut ctrl = ZoomController::new();
        for _ in 0..100 {
            ctrl.wheel_zoom(0.0, -120.0, 300.0, 0.0, 600.0, now);
        }
        assert!(ctrl.target() >= MIN_ZOOM);
    }

    #[test]
    fn five_wheel_ticks_commit_to_expected_zoom() {
        let mut ctrl = ZoomController::new();
        let now = t0();
        for _ in 0..5 {
            ctrl.wheel_zoom(0.0, 120.0, 300.0, 0.0, 600.0, now);
        }
        let expected = 1.07_f32.powi(5);
        let (zoom, _) = run_to_commit(&mut ctrl, now);
        assert!((zoom - round3(expected)).abs() < 1e-6, "got {zoom}, want ≈{expected}");
        assert_eq!(ctrl.committed(), zoom);
        assert_eq!(ctrl.visual(), zoom);
    }

    #[test]
    fn visual_eases_toward_target_before_commit() {
        let mut ctrl = ZoomController::new();
        let now = t0();
        ctrl.wheel_zoom(0.0, 120.0, 300.0, 0.0, 600.0, now);
        assert_eq!(ctrl.visual(), 1.0);

        let tick = ctrl.tick(now + Duration::from_millis(16));
        assert_eq!(tick, ZoomTick::Repaint);
        assert!(ctrl.visual() > 1.0);
        assert!(ctrl.visual() < ctrl.target());
        assert!(ctrl.visual_scale() > 1.0);
    }

    #[test]
    fn commit_waits_for_debounce_quiet_period() {
        let mut ctrl = ZoomController::new();
        let now = t0();
        ctrl.wheel_zoom(0.0, 120.0, 300.0, 0.0, 600.0, now);
        // Input keeps arriving: no commit yet.
        let tick = ctrl.tick(now + Duration::from_millis(100));
        assert_eq!(tick, ZoomTick::Repaint);
        ctrl.wheel_zoom(0.0, 120.0, 300.0, 0.0, 600.0, now + Duration::from_millis(100));
        assert!(!matches!(
            ctrl.tick(now + Duration::from_millis(200)),
            ZoomTick::Committed { .. }
        ));
        // Quiet long enough → commit.
        assert!(matches!(
            ctrl.tick(now + Duration::from_millis(400)),
            ZoomTick::Committed { .. }
        ));
    }

    #[test]
    fn settle_window_keeps_interactive_alive_after_commit() {
        let mut ctrl = ZoomController::new();
        let now = t0();
        ctrl.wheel_zoom(0.0, 120.0, 300.0, 0.0, 600.0, now);
        let (_, _) = run_to_commit(&mut ctrl, now);
        assert_eq!(ctrl.phase(), ZoomPhase::Committing);
        assert!(ctrl.is_interactive());

        // After the settle window the controller goes idle.
        let mut later = t0() + Duration::from_secs(10);
        loop {
            match ctrl.tick(later) {
                ZoomTick::Repaint => break,
                ZoomTick::Quiet => later += Duration::from_millis(50),
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(ctrl.phase(), ZoomPhase::Idle);
        assert!(!ctrl.is_interactive());
    }

    #[test]
    fn commit_scroll_follows_anchor_formula() {
        let mut ctrl = ZoomController::new();
        let now = t0();
        let (s0, anchor) = (1000.0, 250.0);
        ctrl.wheel_zoom(0.0, 120.0, anchor, s0, 600.0, now);
        let (zoom, scroll) = run_to_commit(&mut ctrl, now);
        let expected = (s0 + anchor) * zoom / 1.0 - anchor;
        assert!((scroll - expected).abs() < 0.01);
    }

    #[test]
    fn zoom_there_and_back_restores_scroll() {
        let mut ctrl = ZoomController::new();
        let now = t0();
        let (s0, anchor, vh) = (1234.0, 217.0, 600.0);

        ctrl.wheel_zoom(0.0, 120.0, anchor, s0, vh, now);
        let (z1, s1) = run_to_commit(&mut ctrl, now);
        assert!(z1 > 1.0);

        // Second gesture back to the original zoom, same anchor.
        let later = t0() + Duration::from_secs(5);
        ctrl.request_zoom(1.0, s1, vh, later);
        // request_zoom anchors at the viewport center.
        let center = vh / 2.0;
        let (z2, s2) = run_to_commit(&mut ctrl, later);
        assert_eq!(z2, 1.0);
        let expected = ((s1 + center) * (1.0 / z1) - center).max(0.0);
        assert!((s2 - expected).abs() < 0.5);

        // A full wheel round trip with the same anchor restores s0.
        let mut ctrl = ZoomController::new();
        ctrl.wheel_zoom(0.0, 120.0, anchor, s0, vh, now);
        let (z1, s1) = run_to_commit(&mut ctrl, now);
        ctrl.wheel_zoom(0.0, -120.0, anchor, s1, vh, later);
        // Drive the target exactly back to 1.0 (two opposite ticks do
        // not cancel exactly; correct the residual with request_zoom).
        ctrl.request_zoom(1.0, s1, vh, later);
        let (z2, s2) = run_to_commit(&mut ctrl, later);
        assert_eq!(z2, 1.0);
        let _ = z1;
        // Anchor math: s2 = (s1 + a)·(1/z1) − a = s0 within rounding.
        assert!((s2 - s0).abs() < 1.5, "s2={s2} s0={s0}");
    }

    #[test]
    fn request_zoom_is_ignored_when_already_at_target() {
        let mut ctrl = ZoomController::new();
        ctrl.request_zoom(1.0, 0.0, 600.0, t0());
        assert_eq!(ctrl.phase(), ZoomPhase::Idle);
    }
}
