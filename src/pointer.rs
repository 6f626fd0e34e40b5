//! Pointer drag tracking with capture-based gesture exclusivity
//!
//! Raw pointer-down/move/up events become bounded pan deltas for the
//! viewport. A single active gesture is enforced by capturing the pointer id
//! on the hosting container; events for any other id are ignored. The
//! container is abstracted behind [`CaptureTarget`] so the tracker tests
//! without a DOM.

use egui::{Pos2, Vec2};

/// Platform pointer id (matches the DOM `pointerId`)
pub type PointerId = i32;

/// The element pointer capture is requested on.
///
/// `capture` returns `false` when the container is not available (e.g. not
/// yet mounted), in which case the gesture is ignored.
pub trait CaptureTarget {
    fn capture(&mut self, id: PointerId) -> bool;
    fn release(&mut self, id: PointerId);
}

/// Always-succeeding capture target for hosts without real pointer capture
/// (native shells, tests)
#[derive(Clone, Copy, Debug, Default)]
pub struct NullCapture;

impl CaptureTarget for NullCapture {
    fn capture(&mut self, _id: PointerId) -> bool {
        true
    }

    fn release(&mut self, _id: PointerId) {}
}

#[derive(Clone, Copy, Debug)]
struct ActiveGesture {
    id: PointerId,
    last: Pos2,
}

/// Tracks at most one active drag gesture
#[derive(Debug, Default)]
pub struct PointerTracker {
    active: Option<ActiveGesture>,
}

impl PointerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a gesture is currently captured
    pub fn is_dragging(&self) -> bool {
        self.active.is_some()
    }

    /// Begin a gesture: capture the pointer and record the starting point.
    /// Returns `false` (gesture ignored) when capture fails or another
    /// gesture is already active.
    pub fn pointer_down(
        &mut self,
        id: PointerId,
        pos: Pos2,
        target: &mut dyn CaptureTarget,
    ) -> bool {
        if self.active.is_some() {
            return false;
        }
        if !target.capture(id) {
            return false;
        }
        self.active = Some(ActiveGesture { id, last: pos });
        true
    }

    /// Advance the gesture; returns the delta since the last recorded point.
    ///
    /// `None` when the id does not match the captured gesture or when the
    /// delta is exactly zero (duplicate events are common and skipped).
    pub fn pointer_move(&mut self, id: PointerId, pos: Pos2) -> Option<Vec2> {
        let gesture = self.active.as_mut()?;
        if gesture.id != id {
            return None;
        }
        let delta = pos - gesture.last;
        if delta == Vec2::ZERO {
            return None;
        }
        gesture.last = pos;
        Some(delta)
    }

    /// End the gesture: release capture and clear tracking state. Returns
    /// `false` when the id does not match the captured gesture.
    pub fn pointer_up(&mut self, id: PointerId, target: &mut dyn CaptureTarget) -> bool {
        match self.active {
            Some(gesture) if gesture.id == id => {
                target.release(id);
                self.active = None;
                true
            }
            _ => false,
        }
    }

    /// Discard any stale capture/position state. Called when the editor
    /// opens or the source image changes.
    pub fn reset(&mut self, target: &mut dyn CaptureTarget) {
        if let Some(gesture) = self.active.take() {
            target.release(gesture.id);
        }
    }
}
