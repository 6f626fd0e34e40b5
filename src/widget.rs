//! AvatarCropWidget - a self-contained egui widget for the avatar crop editor
//!
//! This widget encapsulates all state for previewing and cropping an avatar:
//! the pan/zoom viewport, pointer gesture tracking, the decoded source image
//! and its texture, and the confirm pipeline that resolves and renders the
//! final crop. Multiple instances can be used without sharing state.

use egui::{
    Color32, ColorImage, Key, PointerButton, Response, TextureHandle, TextureOptions, Ui, Vec2,
};
use image::RgbaImage;

use crate::crop::{resolve_crop_parameters, CropContext};
use crate::matrix::AffineMatrix;
use crate::pointer::{CaptureTarget, PointerId, PointerTracker};
use crate::render::{render_cropped_avatar, EncodedAvatar, RenderError};
use crate::viewport::{ViewPhase, ViewportState, MIN_ZOOM};

/// Zoom button edge length
const ZOOM_BUTTON_SIZE: f32 = 28.0;
/// Margin between overlays and the viewport edge
const OVERLAY_MARGIN: f32 = 10.0;

/// Actions returned from the zoom controls overlay
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ZoomAction {
    None,
    ZoomIn,
    ZoomOut,
}

/// A self-contained widget for cropping a square avatar out of an image.
///
/// The widget owns all its state and can be embedded in any egui
/// application; the wasm handle drives the same state through the pointer
/// and lifecycle methods.
pub struct AvatarCropWidget {
    // === Image data ===
    /// Decoded source image, kept for the confirm-time render
    source: Option<RgbaImage>,
    /// Identity of the current source; async size reports carrying an older
    /// generation are stale and ignored
    generation: u64,

    // === View state ===
    /// Pan/zoom viewport state
    view: ViewportState,
    /// Active drag gesture tracking
    pointer: PointerTracker,
    /// Set while a confirm/upload is in flight; disables the zoom controls
    exporting: bool,

    // === Rendering state ===
    /// Flag indicating texture needs rebuild
    texture_dirty: bool,
    /// Preview texture
    texture: Option<TextureHandle>,
    /// The transform string the image was last painted with; this is what
    /// the matrix crop strategy reads back at confirm time
    last_rendered_transform: Option<String>,
}

impl Default for AvatarCropWidget {
    fn default() -> Self {
        Self::new()
    }
}

impl AvatarCropWidget {
    pub fn new() -> Self {
        Self {
            source: None,
            generation: 0,
            view: ViewportState::new(),
            pointer: PointerTracker::new(),
            exporting: false,
            texture_dirty: false,
            texture: None,
            last_rendered_transform: None,
        }
    }

    // =========================================================================
    // Lifecycle (called from the host: modal open, source swap, image load)
    // =========================================================================

    /// Signal that the editor opened or the source image identity changed.
    ///
    /// Bumps the source generation (so stale async size reports are
    /// discarded), resets zoom/pan to the pre-load state and clears any
    /// in-progress gesture. Returns the new generation.
    pub fn notify_source_changed(&mut self, capture: &mut dyn CaptureTarget) -> u64 {
        self.generation += 1;
        self.source = None;
        self.texture = None;
        self.texture_dirty = false;
        self.last_rendered_transform = None;
        self.view.reset_view();
        self.pointer.reset(capture);
        self.generation
    }

    /// Set the decoded source image for the current generation
    pub fn set_image(&mut self, image: RgbaImage) {
        self.view
            .set_natural_size(image.width() as f32, image.height() as f32);
        self.source = Some(image);
        self.texture_dirty = true;
        self.try_pending_recenter();
    }

    /// Report asynchronously-resolved intrinsic dimensions (e.g. a vector
    /// image whose size is not readable directly). Reports for a stale
    /// generation are ignored so a rapid source swap cannot be overwritten.
    pub fn report_natural_size(&mut self, generation: u64, width: f32, height: f32) {
        if generation != self.generation {
            log::debug!(
                "ignoring stale natural size report (generation {} != {})",
                generation,
                self.generation
            );
            return;
        }
        self.view.set_natural_size(width, height);
        self.try_pending_recenter();
    }

    /// Apply a re-measured viewport edge (sub-pixel changes are ignored)
    pub fn set_viewport_size(&mut self, size: f32) {
        if self.view.set_viewport_size(size) {
            self.try_pending_recenter();
        }
    }

    /// Run the pending recenter once both the natural size and the viewport
    /// measurement are known; later calls are no-ops until the next source
    /// change.
    fn try_pending_recenter(&mut self) {
        if self.view.phase != ViewPhase::NeedsRecenter {
            return;
        }
        self.view.recenter(
            self.view.natural.x,
            self.view.natural.y,
            self.view.viewport_size,
            MIN_ZOOM,
        );
    }

    pub fn has_image(&self) -> bool {
        self.source.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn view(&self) -> &ViewportState {
        &self.view
    }

    // =========================================================================
    // Pointer interaction (driven by the host's pointer events)
    // =========================================================================

    pub fn pointer_down(
        &mut self,
        id: PointerId,
        pos: egui::Pos2,
        capture: &mut dyn CaptureTarget,
    ) -> bool {
        self.pointer.pointer_down(id, pos, capture)
    }

    pub fn pointer_move(&mut self, id: PointerId, pos: egui::Pos2) {
        if let Some(delta) = self.pointer.pointer_move(id, pos) {
            self.view.apply_offset_delta(delta);
        }
    }

    pub fn pointer_up(&mut self, id: PointerId, capture: &mut dyn CaptureTarget) -> bool {
        self.pointer.pointer_up(id, capture)
    }

    // =========================================================================
    // Zoom controls
    // =========================================================================

    /// Step zoom in; no-op at the bound or while a confirm is in flight
    pub fn zoom_in(&mut self) -> bool {
        if self.exporting {
            return false;
        }
        self.view.zoom_in()
    }

    /// Step zoom out; no-op at the bound or while a confirm is in flight
    pub fn zoom_out(&mut self) -> bool {
        if self.exporting {
            return false;
        }
        self.view.zoom_out()
    }

    pub fn is_zoom_in_disabled(&self) -> bool {
        self.exporting || self.view.at_max_zoom()
    }

    pub fn is_zoom_out_disabled(&self) -> bool {
        self.exporting || self.view.at_min_zoom()
    }

    /// Mark a confirm/upload as in flight (disables the zoom controls)
    pub fn set_exporting(&mut self, exporting: bool) {
        self.exporting = exporting;
    }

    /// The synthesized display transform as a CSS-style string, for hosts
    /// that render the preview themselves
    pub fn image_transform(&self) -> String {
        self.view.image_transform_css()
    }

    // =========================================================================
    // Confirm
    // =========================================================================

    /// Resolve the crop rectangle for the current view and render the final
    /// avatar.
    ///
    /// Returns `Ok(None)` when no strategy can produce a usable rectangle
    /// (the view is treated as "cannot crop right now" and left untouched);
    /// renderer failures surface as errors for the caller to log and roll
    /// back.
    pub fn confirm(&mut self) -> Result<Option<EncodedAvatar>, RenderError> {
        let source = match &self.source {
            Some(source) => source,
            None => return Err(RenderError::SourceUnavailable),
        };

        let rendered = self
            .last_rendered_transform
            .as_deref()
            .and_then(AffineMatrix::parse_css);
        let ctx = CropContext::from_viewport(&self.view, rendered);

        match resolve_crop_parameters(&ctx).rect() {
            None => {
                log::warn!(
                    "no crop strategy produced a usable rectangle (viewport {:.1}px, natural {:.0}x{:.0})",
                    ctx.viewport_size,
                    ctx.natural.x,
                    ctx.natural.y,
                );
                Ok(None)
            }
            Some(rect) => render_cropped_avatar(source, rect).map(Some),
        }
    }

    // =========================================================================
    // Internal helpers
    // =========================================================================

    fn build_color_image(&self) -> Option<ColorImage> {
        let source = self.source.as_ref()?;
        Some(ColorImage::from_rgba_unmultiplied(
            [source.width() as usize, source.height() as usize],
            source.as_raw(),
        ))
    }

    fn rebuild_texture(&mut self, ctx: &egui::Context) {
        if let Some(color_image) = self.build_color_image() {
            self.texture =
                Some(ctx.load_texture("avatar-source", color_image, TextureOptions::LINEAR));
        }
    }

    // =========================================================================
    // Main rendering - called every frame by the hosting shell
    // =========================================================================

    /// Show the widget, rendering the square crop viewport into the given UI.
    ///
    /// The viewport edge length is measured from the container width, so the
    /// host lays the widget out and the engine follows.
    pub fn show(&mut self, ui: &mut Ui, container_size: Vec2) -> Response {
        let ctx = ui.ctx().clone();

        if self.texture_dirty {
            self.texture_dirty = false;
            self.rebuild_texture(&ctx);
        }

        self.handle_keyboard_input(&ctx);

        // The crop window is a square sized from the container width
        let edge = container_size.x.max(0.0);
        self.set_viewport_size(edge);

        let (rect, response) =
            ui.allocate_exact_size(Vec2::splat(edge), egui::Sense::click_and_drag());

        if !self.has_image() {
            let painter = ui.painter_at(rect);
            painter.text(
                rect.center(),
                egui::Align2::CENTER_CENTER,
                "No image loaded",
                egui::FontId::default(),
                ui.style().visuals.text_color(),
            );
            return response;
        }

        // Paint the image with the synthesized transform, clipped to the
        // square viewport. The applied transform string is recorded so the
        // matrix crop strategy can read back exactly what was rendered.
        let transform = self.view.image_transform();
        let metrics = self.view.display_metrics();
        if metrics.is_usable() {
            if let Some(texture) = &self.texture {
                let painter = ui.painter_at(rect);
                let image_rect = egui::Rect::from_min_size(
                    rect.min + egui::vec2(transform.e, transform.f),
                    egui::vec2(metrics.width, metrics.height),
                );
                painter.image(
                    texture.id(),
                    image_rect,
                    egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                    Color32::WHITE,
                );
                self.last_rendered_transform = Some(transform.to_css());
            }
        }

        // Pan via drag; deltas arrive in viewport pixels
        if response.dragged_by(PointerButton::Primary) {
            let drag_delta = response.drag_delta();
            if drag_delta != Vec2::ZERO {
                self.view.apply_offset_delta(drag_delta);
            }
        }

        let zoom_action = self.render_zoom_controls(&ctx, rect);
        self.render_build_info(&ctx, rect);

        match zoom_action {
            ZoomAction::None => {}
            ZoomAction::ZoomIn => {
                self.zoom_in();
            }
            ZoomAction::ZoomOut => {
                self.zoom_out();
            }
        }

        response
    }

    /// Handle keyboard shortcuts for zoom
    fn handle_keyboard_input(&mut self, ctx: &egui::Context) {
        ctx.input(|i| {
            if i.key_pressed(Key::Equals) || i.key_pressed(Key::Plus) {
                self.zoom_in();
            }
            if i.key_pressed(Key::Minus) {
                self.zoom_out();
            }
        });
    }

    /// Render zoom control buttons at bottom-right of the viewport.
    /// Returns an action to be applied after rendering.
    fn render_zoom_controls(&self, ctx: &egui::Context, widget_rect: egui::Rect) -> ZoomAction {
        let button_size = Vec2::splat(ZOOM_BUTTON_SIZE);
        let spacing = 4.0;

        let num_buttons = 2.0;
        let base_x = widget_rect.max.x
            - OVERLAY_MARGIN
            - button_size.x * num_buttons
            - spacing * (num_buttons - 1.0);
        let base_y = widget_rect.max.y - OVERLAY_MARGIN - button_size.y;

        let mut action = ZoomAction::None;

        egui::Area::new(egui::Id::new("avatar_zoom_controls"))
            .fixed_pos(egui::pos2(base_x, base_y))
            .show(ctx, |ui| {
                let frame_style = overlay_frame(ui);
                let text_color = get_overlay_text_color(ui);

                frame_style.show(ui, |ui| {
                    ui.horizontal(|ui| {
                        ui.spacing_mut().item_spacing.x = spacing;

                        let can_zoom_out = !self.is_zoom_out_disabled();
                        let minus_color = if can_zoom_out {
                            text_color
                        } else {
                            text_color.gamma_multiply(0.3)
                        };
                        let minus_btn =
                            egui::Button::new(egui::RichText::new("−").color(minus_color))
                                .fill(Color32::TRANSPARENT);
                        if ui.add_sized(button_size, minus_btn).clicked() && can_zoom_out {
                            action = ZoomAction::ZoomOut;
                        }

                        let can_zoom_in = !self.is_zoom_in_disabled();
                        let plus_color = if can_zoom_in {
                            text_color
                        } else {
                            text_color.gamma_multiply(0.3)
                        };
                        let plus_btn =
                            egui::Button::new(egui::RichText::new("+").color(plus_color))
                                .fill(Color32::TRANSPARENT);
                        if ui.add_sized(button_size, plus_btn).clicked() && can_zoom_in {
                            action = ZoomAction::ZoomIn;
                        }
                    });
                });
            });

        action
    }

    /// Render build info at bottom-left of the viewport
    fn render_build_info(&self, ctx: &egui::Context, widget_rect: egui::Rect) {
        egui::Area::new(egui::Id::new("avatar_build_info"))
            .fixed_pos(egui::pos2(
                widget_rect.min.x + OVERLAY_MARGIN,
                widget_rect.max.y - OVERLAY_MARGIN - 20.0,
            ))
            .show(ctx, |ui| {
                ui.label(
                    egui::RichText::new(env!("BUILD_TIMESTAMP"))
                        .color(egui::Color32::from_white_alpha(80))
                        .small(),
                );
            });
    }
}

/// Get a translucent background color appropriate for light/dark mode
fn get_overlay_bg(ui: &Ui) -> Color32 {
    if ui.visuals().dark_mode {
        Color32::from_black_alpha(180)
    } else {
        Color32::from_white_alpha(220)
    }
}

/// Get text color appropriate for light/dark mode overlays
fn get_overlay_text_color(ui: &Ui) -> Color32 {
    if ui.visuals().dark_mode {
        Color32::WHITE
    } else {
        Color32::from_gray(30)
    }
}

/// Create a frame style for overlay controls that adapts to light/dark mode
fn overlay_frame(ui: &Ui) -> egui::Frame {
    let bg = get_overlay_bg(ui);
    egui::Frame::NONE
        .fill(bg)
        .corner_radius(4)
        .inner_margin(egui::Margin::symmetric(6, 4))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pointer::NullCapture;
    use crate::render::OUTPUT_EDGE;
    use crate::viewport::MAX_ZOOM;
    use image::Rgba;

    fn gradient_image(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, 0, 255])
        })
    }

    fn loaded_widget() -> AvatarCropWidget {
        let mut widget = AvatarCropWidget::new();
        widget.notify_source_changed(&mut NullCapture);
        widget.set_viewport_size(320.0);
        widget.set_image(gradient_image(1200, 800));
        widget
    }

    #[test]
    fn test_recenter_runs_once_dimensions_are_known() {
        let mut widget = AvatarCropWidget::new();
        widget.notify_source_changed(&mut NullCapture);

        // Neither dimension known yet: still pending
        assert_eq!(widget.view().phase, ViewPhase::NeedsRecenter);

        widget.set_viewport_size(320.0);
        assert_eq!(widget.view().phase, ViewPhase::NeedsRecenter);

        widget.set_image(gradient_image(1200, 800));
        assert_eq!(widget.view().phase, ViewPhase::Stable);
        assert!((widget.view().display_metrics().scale_factor - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_source_change_resets_session() {
        let mut widget = loaded_widget();
        widget.zoom_in();
        widget.pointer_down(1, egui::pos2(0.0, 0.0), &mut NullCapture);

        let generation = widget.notify_source_changed(&mut NullCapture);
        assert!(generation > 0);
        assert!(!widget.has_image());
        assert_eq!(widget.view().phase, ViewPhase::NeedsRecenter);
        assert!((widget.view().zoom - MIN_ZOOM).abs() < 0.001);
    }

    #[test]
    fn test_stale_natural_size_report_ignored() {
        let mut widget = AvatarCropWidget::new();
        let old_generation = widget.notify_source_changed(&mut NullCapture);
        widget.set_viewport_size(320.0);

        // Swap again: a late report for the previous source must not land
        widget.notify_source_changed(&mut NullCapture);
        widget.report_natural_size(old_generation, 999.0, 999.0);
        assert!(widget.view().natural.length() < 0.001);

        widget.report_natural_size(widget.generation(), 1200.0, 800.0);
        assert!((widget.view().natural.x - 1200.0).abs() < 0.001);
        assert_eq!(widget.view().phase, ViewPhase::Stable);
    }

    #[test]
    fn test_pointer_gesture_pans_view() {
        let mut widget = loaded_widget();
        widget.zoom_in(); // make room to pan vertically too

        assert!(widget.pointer_down(5, egui::pos2(100.0, 100.0), &mut NullCapture));
        widget.pointer_move(5, egui::pos2(60.0, 90.0));
        assert!((widget.view().offset.x - (-40.0)).abs() < 0.001);
        assert!((widget.view().offset.y - (-10.0)).abs() < 0.001);

        // Foreign pointer id does not move the view
        widget.pointer_move(9, egui::pos2(0.0, 0.0));
        assert!((widget.view().offset.x - (-40.0)).abs() < 0.001);

        assert!(widget.pointer_up(5, &mut NullCapture));
    }

    #[test]
    fn test_zoom_controls_respect_exporting_flag() {
        let mut widget = loaded_widget();
        widget.set_exporting(true);
        assert!(widget.is_zoom_in_disabled());
        assert!(widget.is_zoom_out_disabled());
        assert!(!widget.zoom_in());
        assert!((widget.view().zoom - MIN_ZOOM).abs() < 0.001);

        widget.set_exporting(false);
        assert!(widget.zoom_in());
        assert!(!widget.is_zoom_out_disabled());

        for _ in 0..20 {
            widget.zoom_in();
        }
        assert!(widget.is_zoom_in_disabled());
        assert!((widget.view().zoom - MAX_ZOOM).abs() < 0.001);
    }

    #[test]
    fn test_confirm_renders_avatar_via_geometry_fallback() {
        // Nothing painted yet: no rendered transform is readable, so the
        // geometry strategy carries the confirm alone
        let mut widget = loaded_widget();
        let avatar = widget.confirm().unwrap().expect("crop should resolve");
        assert_eq!(avatar.edge, OUTPUT_EDGE);

        let decoded = image::load_from_memory(&avatar.png).unwrap().to_rgba8();
        assert_eq!(decoded.width(), OUTPUT_EDGE);
        assert_eq!(decoded.height(), OUTPUT_EDGE);
    }

    #[test]
    fn test_confirm_uses_recorded_transform() {
        let mut widget = loaded_widget();
        widget.last_rendered_transform = Some(widget.image_transform());
        let avatar = widget.confirm().unwrap().expect("crop should resolve");
        assert!(!avatar.png.is_empty());
    }

    #[test]
    fn test_confirm_without_source_fails() {
        let mut widget = AvatarCropWidget::new();
        assert!(matches!(
            widget.confirm(),
            Err(RenderError::SourceUnavailable)
        ));
    }

    #[test]
    fn test_confirm_is_noop_when_view_degenerate() {
        let mut widget = AvatarCropWidget::new();
        widget.notify_source_changed(&mut NullCapture);
        // Image known but the viewport was never measured: no strategy can
        // produce a rectangle, confirm resolves to a silent no-op
        widget.set_image(gradient_image(100, 100));
        assert!(matches!(widget.confirm(), Ok(None)));
    }

    #[test]
    fn test_image_transform_string_parses() {
        let widget = loaded_widget();
        let css = widget.image_transform();
        assert!(AffineMatrix::parse_css(&css).is_some());
    }
}
