//! Pan/zoom viewport state for the square avatar crop window
//!
//! This module contains pure viewport state and coordinate math that can be
//! easily unit tested without egui or DOM dependencies. The viewport is a
//! fixed square window; the image is scaled so its shorter side exactly fills
//! the window ("fit scale") and the user zooms/pans on top of that baseline.

use egui::Vec2;
use serde::{Deserialize, Serialize};

use crate::matrix::AffineMatrix;

/// Minimum zoom level (1.0 = fit-to-viewport baseline)
pub const MIN_ZOOM: f32 = 1.0;

/// Maximum zoom level
pub const MAX_ZOOM: f32 = 3.0;

/// Zoom step for the +/- controls
pub const ZOOM_STEP: f32 = 0.2;

/// Viewport re-measurements smaller than this are sub-pixel jitter and ignored
pub const RESIZE_EPSILON: f32 = 0.5;

/// A length is usable for geometry when it is a positive finite number
pub fn is_usable_length(v: f32) -> bool {
    v.is_finite() && v > 0.0
}

/// Whether a re-measured dimension differs enough from the current one to
/// be worth applying (guards against ResizeObserver sub-pixel thrash)
pub fn dimension_changed(current: f32, next: f32) -> bool {
    (next - current).abs() >= RESIZE_EPSILON
}

/// Lifecycle phase of the viewport with respect to the loaded image.
///
/// A fresh session (modal open, source swap) starts in `NeedsRecenter`; the
/// first successful [`ViewportState::recenter`] moves it to `Stable` so later
/// renders do not re-trigger recentering mid-gesture.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewPhase {
    NeedsRecenter,
    Stable,
}

/// Effective display geometry derived from the core state
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DisplayMetrics {
    /// Fit-scale times zoom; source pixels to viewport pixels
    pub scale_factor: f32,
    /// Displayed image width in viewport pixels
    pub width: f32,
    /// Displayed image height in viewport pixels
    pub height: f32,
}

impl DisplayMetrics {
    /// Metrics are usable for cropping only when the scale is positive finite
    pub fn is_usable(&self) -> bool {
        is_usable_length(self.scale_factor)
    }
}

/// Per-axis clamp box for the pan offset
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OffsetBounds {
    pub min_x: f32,
    pub max_x: f32,
    pub min_y: f32,
    pub max_y: f32,
}

impl OffsetBounds {
    pub fn clamp(&self, offset: Vec2) -> Vec2 {
        Vec2::new(
            offset.x.clamp(self.min_x, self.max_x),
            offset.y.clamp(self.min_y, self.max_y),
        )
    }

    pub fn contains(&self, offset: Vec2) -> bool {
        offset.x >= self.min_x
            && offset.x <= self.max_x
            && offset.y >= self.min_y
            && offset.y <= self.max_y
    }
}

/// Compute displayed scale and size for the given natural size, viewport edge
/// and zoom. Degenerate inputs (zero/negative dimensions) produce a
/// non-usable scale factor that downstream validity checks reject.
pub fn compute_display_metrics(natural: Vec2, viewport_size: f32, zoom: f32) -> DisplayMetrics {
    let shortest = natural.x.min(natural.y);
    let scale_factor = viewport_size / shortest * zoom;
    DisplayMetrics {
        scale_factor,
        width: natural.x * scale_factor,
        height: natural.y * scale_factor,
    }
}

/// Pan offset bounds for a displayed size inside a square viewport.
///
/// The image is centered in the viewport at zero offset, so the usable pan
/// range per axis is symmetric: `[(viewport - display) / 2, (display -
/// viewport) / 2]`. Any offset in this range keeps the image covering the
/// whole viewport. An axis whose display dimension does not exceed the
/// viewport is pinned to zero.
pub fn compute_offset_bounds(
    display_width: f32,
    display_height: f32,
    viewport_size: f32,
) -> OffsetBounds {
    let span_x = (viewport_size - display_width) / 2.0;
    let span_y = (viewport_size - display_height) / 2.0;
    OffsetBounds {
        min_x: span_x.min(0.0),
        max_x: (-span_x).max(0.0),
        min_y: span_y.min(0.0),
        max_y: (-span_y).max(0.0),
    }
}

/// Core pan/zoom state for the avatar crop viewport
#[derive(Clone, Debug)]
pub struct ViewportState {
    /// Zoom level on top of the fit scale, in [MIN_ZOOM, MAX_ZOOM]
    pub zoom: f32,
    /// Pan translation in viewport-pixel units
    pub offset: Vec2,
    /// Intrinsic pixel dimensions of the source image; (0, 0) when unknown
    pub natural: Vec2,
    /// Edge length of the square crop window, in pixels
    pub viewport_size: f32,
    /// Whether a recenter is still pending for the current source
    pub phase: ViewPhase,
}

impl Default for ViewportState {
    fn default() -> Self {
        Self {
            zoom: MIN_ZOOM,
            offset: Vec2::ZERO,
            natural: Vec2::ZERO,
            viewport_size: 0.0,
            phase: ViewPhase::NeedsRecenter,
        }
    }
}

impl ViewportState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset to the pre-load state: zoom at baseline, no pan, recenter
    /// pending. Called when the editor opens or the source image changes,
    /// before the new image's dimensions are known.
    pub fn reset_view(&mut self) {
        self.zoom = MIN_ZOOM;
        self.offset = Vec2::ZERO;
        self.phase = ViewPhase::NeedsRecenter;
    }

    /// Compute the "fit" state for a freshly loaded image and clear the
    /// pending-recenter phase.
    ///
    /// All inputs must be positive finite numbers; otherwise the call is a
    /// no-op and returns `false`. `target_zoom` is clamped into
    /// [MIN_ZOOM, MAX_ZOOM]; the offset is reset to zero.
    pub fn recenter(
        &mut self,
        natural_width: f32,
        natural_height: f32,
        viewport_size: f32,
        target_zoom: f32,
    ) -> bool {
        if !is_usable_length(natural_width)
            || !is_usable_length(natural_height)
            || !is_usable_length(viewport_size)
            || !is_usable_length(target_zoom)
        {
            return false;
        }

        self.natural = Vec2::new(natural_width, natural_height);
        self.viewport_size = viewport_size;
        self.zoom = target_zoom.clamp(MIN_ZOOM, MAX_ZOOM);
        self.offset = Vec2::ZERO;
        self.phase = ViewPhase::Stable;
        true
    }

    /// Apply a re-measured viewport edge length. Changes below
    /// [`RESIZE_EPSILON`] are ignored; accepted changes re-clamp the offset
    /// into the new bounds. Returns whether the measurement was applied.
    pub fn set_viewport_size(&mut self, size: f32) -> bool {
        if !is_usable_length(size) || !dimension_changed(self.viewport_size, size) {
            return false;
        }
        self.viewport_size = size;
        self.clamp_offset();
        true
    }

    /// Record the intrinsic size of the source image
    pub fn set_natural_size(&mut self, width: f32, height: f32) {
        self.natural = Vec2::new(width, height);
    }

    /// Current display metrics (scale factor and displayed size)
    pub fn display_metrics(&self) -> DisplayMetrics {
        compute_display_metrics(self.natural, self.viewport_size, self.zoom)
    }

    /// Current pan offset clamp box
    pub fn offset_bounds(&self) -> OffsetBounds {
        let metrics = self.display_metrics();
        compute_offset_bounds(metrics.width, metrics.height, self.viewport_size)
    }

    /// Re-clamp the offset into the current bounds. Called whenever the
    /// display metrics change (zoom step, viewport re-measure).
    fn clamp_offset(&mut self) {
        let metrics = self.display_metrics();
        if !metrics.is_usable() {
            return;
        }
        self.offset = self.offset_bounds().clamp(self.offset);
    }

    /// Add a drag delta (in viewport pixels) to the offset and clamp
    pub fn apply_offset_delta(&mut self, delta: Vec2) {
        self.offset += delta;
        self.clamp_offset();
    }

    /// Step the zoom up by [`ZOOM_STEP`], clamped to [`MAX_ZOOM`].
    /// Returns `false` without changing state when already at the bound.
    pub fn zoom_in(&mut self) -> bool {
        self.step_zoom(ZOOM_STEP)
    }

    /// Step the zoom down by [`ZOOM_STEP`], clamped to [`MIN_ZOOM`]
    pub fn zoom_out(&mut self) -> bool {
        self.step_zoom(-ZOOM_STEP)
    }

    fn step_zoom(&mut self, step: f32) -> bool {
        let next = (self.zoom + step).clamp(MIN_ZOOM, MAX_ZOOM);
        if (next - self.zoom).abs() < f32::EPSILON {
            return false;
        }
        self.zoom = next;
        self.clamp_offset();
        true
    }

    /// Whether the zoom-in control should be disabled
    pub fn at_max_zoom(&self) -> bool {
        self.zoom >= MAX_ZOOM - f32::EPSILON
    }

    /// Whether the zoom-out control should be disabled
    pub fn at_min_zoom(&self) -> bool {
        self.zoom <= MIN_ZOOM + f32::EPSILON
    }

    /// Synthesize the display transform as an affine matrix.
    ///
    /// Ordered composition: translate by `offset`, translate to the viewport
    /// center, scale by the effective scale factor, translate by
    /// `-natural/2`. The order makes zoom pivot around the image's own
    /// center while pan stays in un-scaled viewport units, matching the
    /// coordinate space of pointer deltas.
    pub fn image_transform(&self) -> AffineMatrix {
        let s = self.display_metrics().scale_factor;
        let half_viewport = self.viewport_size / 2.0;
        AffineMatrix {
            a: s,
            b: 0.0,
            c: 0.0,
            d: s,
            e: self.offset.x + half_viewport - s * self.natural.x / 2.0,
            f: self.offset.y + half_viewport - s * self.natural.y / 2.0,
        }
    }

    /// The transform as a CSS-style `matrix(...)` string, suitable for
    /// applying to the previewed image element
    pub fn image_transform_css(&self) -> String {
        self.image_transform().to_css()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recentered(nw: f32, nh: f32, viewport: f32) -> ViewportState {
        let mut v = ViewportState::new();
        assert!(v.recenter(nw, nh, viewport, MIN_ZOOM));
        v
    }

    #[test]
    fn test_default_state_needs_recenter() {
        let v = ViewportState::new();
        assert_eq!(v.phase, ViewPhase::NeedsRecenter);
        assert!((v.zoom - MIN_ZOOM).abs() < 0.001);
        assert!(v.offset.length() < 0.001);
    }

    #[test]
    fn test_recenter_landscape_image() {
        let v = recentered(1200.0, 800.0, 320.0);
        let metrics = v.display_metrics();
        // Fit scale makes the shorter side (800) fill the 320px viewport
        assert!((metrics.scale_factor - 0.4).abs() < 1e-6);
        assert!((metrics.width - 480.0).abs() < 0.001);
        assert!((metrics.height - 320.0).abs() < 0.001);
        assert_eq!(v.phase, ViewPhase::Stable);
    }

    #[test]
    fn test_recenter_rejects_degenerate_inputs() {
        let mut v = ViewportState::new();
        v.zoom = 2.0;
        v.offset = Vec2::new(5.0, 5.0);

        assert!(!v.recenter(0.0, 800.0, 320.0, 1.0));
        assert!(!v.recenter(1200.0, -1.0, 320.0, 1.0));
        assert!(!v.recenter(1200.0, 800.0, f32::NAN, 1.0));
        assert!(!v.recenter(1200.0, 800.0, 320.0, f32::INFINITY));

        // State untouched by the rejected calls
        assert!((v.zoom - 2.0).abs() < 0.001);
        assert!((v.offset.x - 5.0).abs() < 0.001);
        assert_eq!(v.phase, ViewPhase::NeedsRecenter);
    }

    #[test]
    fn test_recenter_clamps_target_zoom() {
        let mut v = ViewportState::new();
        assert!(v.recenter(100.0, 100.0, 50.0, 10.0));
        assert!((v.zoom - MAX_ZOOM).abs() < 0.001);
        assert!(v.recenter(100.0, 100.0, 50.0, 0.1));
        assert!((v.zoom - MIN_ZOOM).abs() < 0.001);
    }

    #[test]
    fn test_reset_view_restores_baseline() {
        let mut v = recentered(1200.0, 800.0, 320.0);
        v.zoom = 2.0;
        v.offset = Vec2::new(-40.0, -10.0);

        v.reset_view();
        assert_eq!(v.phase, ViewPhase::NeedsRecenter);
        assert!((v.zoom - MIN_ZOOM).abs() < 0.001);
        assert!(v.offset.length() < 0.001);
    }

    #[test]
    fn test_zoom_clamped_under_repeated_stepping() {
        let mut v = recentered(1200.0, 800.0, 320.0);

        for _ in 0..100 {
            v.zoom_in();
        }
        assert!(v.zoom <= MAX_ZOOM + 1e-6);
        assert!(v.at_max_zoom());
        assert!(!v.zoom_in());

        for _ in 0..100 {
            v.zoom_out();
        }
        assert!(v.zoom >= MIN_ZOOM - 1e-6);
        assert!(v.at_min_zoom());
        assert!(!v.zoom_out());
    }

    #[test]
    fn test_offset_bounds_square_viewport() {
        // 480x320 display centered in a 320 viewport: x can pan in [-80, 80],
        // y is pinned
        let bounds = compute_offset_bounds(480.0, 320.0, 320.0);
        assert!((bounds.min_x - (-80.0)).abs() < 0.001);
        assert!((bounds.max_x - 80.0).abs() < 0.001);
        assert!(bounds.min_y.abs() < 0.001);
        assert!(bounds.max_y.abs() < 0.001);

        // A display smaller than the viewport pins both axes
        let bounds = compute_offset_bounds(200.0, 100.0, 320.0);
        assert!(bounds.min_x.abs() < 0.001);
        assert!(bounds.max_x.abs() < 0.001);
        assert!(bounds.min_y.abs() < 0.001);
        assert!(bounds.max_y.abs() < 0.001);
    }

    #[test]
    fn test_viewport_covered_at_offset_extremes() {
        let mut v = recentered(1200.0, 800.0, 320.0);
        let metrics = v.display_metrics();

        // At both ends of the clamp range the image still spans the whole
        // viewport on the pannable axis
        for delta in [Vec2::new(-10000.0, 0.0), Vec2::new(20000.0, 0.0)] {
            v.apply_offset_delta(delta);
            let left = v.offset.x + (v.viewport_size - metrics.width) / 2.0;
            assert!(left <= 1e-3, "image left edge {left} inside the viewport");
            assert!(
                left + metrics.width >= v.viewport_size - 1e-3,
                "image right edge {} uncovers the viewport",
                left + metrics.width
            );
        }
    }

    #[test]
    fn test_offset_clamped_after_any_delta() {
        let mut v = recentered(1200.0, 800.0, 320.0);

        // Overshoot far past the image edge in every direction
        v.apply_offset_delta(Vec2::new(-10000.0, -10000.0));
        assert!(v.offset_bounds().contains(v.offset));
        v.apply_offset_delta(Vec2::new(10000.0, 10000.0));
        assert!(v.offset_bounds().contains(v.offset));
        assert!((v.offset.x - 80.0).abs() < 0.001);

        // Small in-range deltas accumulate exactly from the clamped point
        v.apply_offset_delta(Vec2::new(-40.0, 0.0));
        assert!((v.offset.x - 40.0).abs() < 0.001);
        assert!(v.offset_bounds().contains(v.offset));
    }

    #[test]
    fn test_offset_reclamped_when_zooming_out() {
        let mut v = recentered(1200.0, 800.0, 320.0);
        v.zoom = 2.0;
        v.apply_offset_delta(Vec2::new(-300.0, -200.0));
        assert!(v.offset_bounds().contains(v.offset));

        // Shrinking the display tightens the bounds; offset must follow
        v.zoom_out();
        v.zoom_out();
        v.zoom_out();
        assert!(v.offset_bounds().contains(v.offset));
    }

    #[test]
    fn test_viewport_remeasure_threshold() {
        let mut v = recentered(1200.0, 800.0, 320.0);

        // Sub-pixel jitter is ignored
        assert!(!v.set_viewport_size(320.2));
        assert!((v.viewport_size - 320.0).abs() < 0.001);

        // A real change is applied
        assert!(v.set_viewport_size(280.0));
        assert!((v.viewport_size - 280.0).abs() < 0.001);

        assert!(!v.set_viewport_size(f32::NAN));
        assert!(!v.set_viewport_size(-5.0));
    }

    #[test]
    fn test_display_metrics_degenerate_inputs() {
        let metrics = compute_display_metrics(Vec2::ZERO, 320.0, 1.0);
        assert!(!metrics.is_usable());

        let metrics = compute_display_metrics(Vec2::new(1200.0, 800.0), 0.0, 1.0);
        assert!(!metrics.is_usable());
    }

    #[test]
    fn test_image_transform_centers_image() {
        let v = recentered(1200.0, 800.0, 320.0);
        let m = v.image_transform();

        // Uniform scale, no rotation or shear
        assert!((m.a - 0.4).abs() < 1e-6);
        assert!((m.d - 0.4).abs() < 1e-6);
        assert!(m.b.abs() < 1e-6);
        assert!(m.c.abs() < 1e-6);

        // Image center maps to the viewport center
        let center = m.apply(egui::pos2(600.0, 400.0));
        assert!((center.x - 160.0).abs() < 0.001);
        assert!((center.y - 160.0).abs() < 0.001);
    }

    #[test]
    fn test_image_transform_pan_is_unscaled() {
        let mut v = recentered(1200.0, 800.0, 320.0);
        let before = v.image_transform();
        v.apply_offset_delta(Vec2::new(-40.0, 0.0));
        let after = v.image_transform();

        // A 40px drag moves the rendered image by exactly 40 viewport pixels
        assert!((before.e - after.e - 40.0).abs() < 0.001);
        assert!((before.f - after.f).abs() < 0.001);
    }

    #[test]
    fn test_image_transform_css_round_trips() {
        let v = recentered(1200.0, 800.0, 320.0);
        let css = v.image_transform_css();
        let parsed = AffineMatrix::parse_css(&css).expect("synthesized transform must parse");
        let m = v.image_transform();
        assert!((parsed.a - m.a).abs() < 1e-4);
        assert!((parsed.e - m.e).abs() < 1e-3);
        assert!((parsed.f - m.f).abs() < 1e-3);
    }
}
