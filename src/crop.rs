//! Crop rectangle derivation and cross-validation
//!
//! Two independent strategies each attempt to map the square viewport back
//! into source-image pixel space: a closed-form geometry derivation from
//! scale/offset/viewport size, and a matrix inversion of the transform that
//! was actually applied to the rendered image. The resolver runs both,
//! cross-checks their deviation, and prefers the matrix result because it
//! reflects what the user visually confirmed on screen.

use egui::{pos2, Pos2, Vec2};
use serde::{Deserialize, Serialize};

use crate::matrix::AffineMatrix;
use crate::viewport::{is_usable_length, DisplayMetrics, ViewportState};

/// Candidate rectangles differing by more than this (px, in source space)
/// indicate transform-derivation drift and are logged
pub const DEVIATION_TOLERANCE: f32 = 0.5;

/// An axis-aligned rectangle in source-image pixel space
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CropRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl CropRect {
    /// Shared validity predicate for strategy results
    pub fn is_valid(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.width > 0.0
            && self.height > 0.0
    }

    /// Largest absolute componentwise difference to another rectangle
    pub fn deviation(&self, other: &CropRect) -> f32 {
        (self.x - other.x)
            .abs()
            .max((self.y - other.y).abs())
            .max((self.width - other.width).abs())
            .max((self.height - other.height).abs())
    }
}

/// Snapshot of the displayed geometry taken at confirm time
#[derive(Clone, Debug)]
pub struct CropContext {
    /// Intrinsic source-image dimensions
    pub natural: Vec2,
    /// Edge length of the square viewport
    pub viewport_size: f32,
    /// Current display metrics (fit-scale × zoom and displayed size)
    pub metrics: DisplayMetrics,
    /// Current pan offset in viewport pixels
    pub offset: Vec2,
    /// The transform actually applied to the rendered image, when readable
    pub rendered_transform: Option<AffineMatrix>,
}

impl CropContext {
    /// Capture the current viewport state, optionally paired with the
    /// live rendered transform
    pub fn from_viewport(view: &ViewportState, rendered_transform: Option<AffineMatrix>) -> Self {
        Self {
            natural: view.natural,
            viewport_size: view.viewport_size,
            metrics: view.display_metrics(),
            offset: view.offset,
            rendered_transform,
        }
    }

    fn has_usable_dimensions(&self) -> bool {
        is_usable_length(self.natural.x)
            && is_usable_length(self.natural.y)
            && is_usable_length(self.viewport_size)
    }
}

/// Which strategy produced the selected rectangle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CropSource {
    Matrix,
    Geometry,
}

/// Outcome of running and reconciling both strategies
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Resolution {
    Matrix(CropRect),
    Geometry(CropRect),
    Unavailable,
}

impl Resolution {
    pub fn rect(&self) -> Option<CropRect> {
        match self {
            Resolution::Matrix(rect) | Resolution::Geometry(rect) => Some(*rect),
            Resolution::Unavailable => None,
        }
    }

    pub fn source(&self) -> Option<CropSource> {
        match self {
            Resolution::Matrix(_) => Some(CropSource::Matrix),
            Resolution::Geometry(_) => Some(CropSource::Geometry),
            Resolution::Unavailable => None,
        }
    }
}

/// Closed-form strategy: invert the uniform scale-and-translate that placed
/// the image (no rotation, no shear), mapping the viewport square back into
/// source space and clamping to the image bounds. Returns `None` on any
/// invalid input rather than raising.
pub fn geometry_crop(ctx: &CropContext) -> Option<CropRect> {
    if !ctx.has_usable_dimensions() || !ctx.metrics.is_usable() {
        return None;
    }

    let scale = ctx.metrics.scale_factor;
    // The displayed image is centered in the viewport, then shifted by the
    // pan offset; its top-left corner in viewport coordinates:
    let left = ctx.offset.x + (ctx.viewport_size - ctx.metrics.width) / 2.0;
    let top = ctx.offset.y + (ctx.viewport_size - ctx.metrics.height) / 2.0;

    let min_x = ((0.0 - left) / scale).clamp(0.0, ctx.natural.x);
    let max_x = ((ctx.viewport_size - left) / scale).clamp(0.0, ctx.natural.x);
    let min_y = ((0.0 - top) / scale).clamp(0.0, ctx.natural.y);
    let max_y = ((ctx.viewport_size - top) / scale).clamp(0.0, ctx.natural.y);

    let rect = CropRect {
        x: min_x,
        y: min_y,
        width: max_x - min_x,
        height: max_y - min_y,
    };
    rect.is_valid().then_some(rect)
}

/// Matrix strategy: invert the actually-rendered affine transform and map
/// the viewport's four corners back into source space, clamping each corner
/// to the image bounds and taking the bounding box. `None` when no transform
/// is readable, the matrix is singular, or the box degenerates.
pub fn matrix_crop(ctx: &CropContext) -> Option<CropRect> {
    if !ctx.has_usable_dimensions() {
        return None;
    }
    let inverse = ctx.rendered_transform?.invert()?;

    let v = ctx.viewport_size;
    let corners = [
        pos2(0.0, 0.0),
        pos2(v, 0.0),
        pos2(0.0, v),
        pos2(v, v),
    ];

    let mut min = Pos2::new(f32::INFINITY, f32::INFINITY);
    let mut max = Pos2::new(f32::NEG_INFINITY, f32::NEG_INFINITY);
    for corner in corners {
        let mapped = inverse.apply(corner);
        let clamped = pos2(
            mapped.x.clamp(0.0, ctx.natural.x),
            mapped.y.clamp(0.0, ctx.natural.y),
        );
        min = min.min(clamped);
        max = max.max(clamped);
    }

    if max.x <= min.x || max.y <= min.y {
        return None;
    }

    let rect = CropRect {
        x: min.x,
        y: min.y,
        width: max.x - min.x,
        height: max.y - min.y,
    };
    rect.is_valid().then_some(rect)
}

/// Run both strategies against the context and reconcile the candidates.
///
/// The matrix strategy runs first; when both candidates are valid their
/// deviation is checked against [`DEVIATION_TOLERANCE`] and a warning is
/// logged on mismatch, but the matrix result still wins since it reflects
/// what is actually rendered on screen. A single valid candidate is used
/// as-is; `Unavailable` means the caller cannot crop right now.
pub fn resolve_crop_parameters(ctx: &CropContext) -> Resolution {
    let matrix = matrix_crop(ctx);
    let geometry = geometry_crop(ctx);

    if let (Some(matrix_rect), Some(geometry_rect)) = (matrix, geometry) {
        let deviation = matrix_rect.deviation(&geometry_rect);
        if deviation > DEVIATION_TOLERANCE {
            log::warn!(
                "crop strategies diverge by {:.2}px (matrix {:?} vs geometry {:?}; \
                 viewport {:.1}px, natural {:.0}x{:.0})",
                deviation,
                matrix_rect,
                geometry_rect,
                ctx.viewport_size,
                ctx.natural.x,
                ctx.natural.y,
            );
        }
    }

    match (matrix, geometry) {
        (Some(rect), _) => Resolution::Matrix(rect),
        (None, Some(rect)) => Resolution::Geometry(rect),
        (None, None) => Resolution::Unavailable,
    }
}
