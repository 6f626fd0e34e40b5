//! avacrop - a browser-embeddable avatar crop editor engine using Rust, WASM, and egui
//!
//! This library implements the geometry and interaction core of an avatar
//! editor: a bounded pan/zoom viewport over a previewed image, pointer
//! gesture tracking with capture-based exclusivity, dual-strategy derivation
//! of the crop rectangle in source-image pixel space, and rendering of the
//! final fixed-size PNG avatar.
//!
//! ## Architecture
//!
//! - `viewport` / `matrix` / `crop` / `pointer` / `render`: pure engine
//!   modules, unit tested natively
//! - `AvatarCropWidget`: self-contained egui widget with all editor state
//! - `CropperApp`: thin eframe App shell that hosts the widget
//! - `CropperHandle`: WASM interface for JavaScript to drive the editor

#[cfg(target_arch = "wasm32")]
use std::cell::RefCell;
#[cfg(target_arch = "wasm32")]
use std::rc::Rc;
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;
#[cfg(target_arch = "wasm32")]
use web_sys::HtmlCanvasElement;

#[cfg(target_arch = "wasm32")]
mod app;
pub mod crop;
pub mod matrix;
pub mod pointer;
pub mod render;
pub mod viewport;
pub mod widget;

#[cfg(target_arch = "wasm32")]
use app::CropperApp;
#[cfg(target_arch = "wasm32")]
use pointer::CaptureTarget;
#[cfg(target_arch = "wasm32")]
use widget::AvatarCropWidget;

/// Callbacks that can be registered from JavaScript
#[cfg(target_arch = "wasm32")]
#[derive(Default)]
pub struct CropperCallbacks {
    /// Called when the view state changes (zoom, pan, transform)
    pub on_state_change: Option<js_sys::Function>,
}

/// Callbacks that can be registered from JavaScript
#[cfg(not(target_arch = "wasm32"))]
#[derive(Default)]
pub struct CropperCallbacks {}

/// Pointer-capture binding to the hosting canvas element.
///
/// Capture fails silently (returns `false`) when the element is not
/// available, in which case the gesture is ignored.
#[cfg(target_arch = "wasm32")]
struct DomCapture<'a>(Option<&'a web_sys::Element>);

#[cfg(target_arch = "wasm32")]
impl CaptureTarget for DomCapture<'_> {
    fn capture(&mut self, id: pointer::PointerId) -> bool {
        match self.0 {
            Some(element) => element.set_pointer_capture(id).is_ok(),
            None => false,
        }
    }

    fn release(&mut self, id: pointer::PointerId) {
        if let Some(element) = self.0 {
            let _ = element.release_pointer_capture(id);
        }
    }
}

/// A handle to a crop editor instance. Each handle manages its own canvas
/// and state.
///
/// This struct is exposed to JavaScript and provides the full interaction
/// surface of the editor: lifecycle signals, pointer and zoom events, the
/// display transform for rendering controls, and the confirm operation that
/// produces the final avatar blob.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub struct CropperHandle {
    /// The widget instance (shared with CropperApp)
    widget: Rc<RefCell<AvatarCropWidget>>,
    /// Callbacks registered from JavaScript
    callbacks: Rc<RefCell<CropperCallbacks>>,
    /// Element pointer capture is requested on
    capture_element: web_sys::Element,
    /// The eframe runner (kept alive to maintain the render loop)
    runner: eframe::WebRunner,
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
impl CropperHandle {
    /// Create a new editor instance attached to the given canvas element.
    /// Returns a promise that resolves to a CropperHandle when
    /// initialization completes.
    #[wasm_bindgen]
    pub async fn create(canvas: HtmlCanvasElement) -> Result<CropperHandle, JsValue> {
        #[cfg(debug_assertions)]
        {
            eframe::WebLogger::init(log::LevelFilter::Debug).ok();
        }
        #[cfg(not(debug_assertions))]
        {
            eframe::WebLogger::init(log::LevelFilter::Warn).ok();
        }

        let widget = Rc::new(RefCell::new(AvatarCropWidget::new()));
        let widget_for_app = widget.clone();

        let callbacks = Rc::new(RefCell::new(CropperCallbacks::default()));
        let callbacks_for_app = callbacks.clone();

        let capture_element: web_sys::Element = canvas.clone().into();

        let web_options = eframe::WebOptions::default();
        let runner = eframe::WebRunner::new();

        runner
            .start(
                canvas,
                web_options,
                Box::new(move |cc| {
                    Ok(Box::new(CropperApp::new(
                        cc,
                        widget_for_app.clone(),
                        callbacks_for_app.clone(),
                    )))
                }),
            )
            .await?;

        Ok(CropperHandle {
            widget,
            callbacks,
            capture_element,
            runner,
        })
    }

    /// Set the decoded source image as raw RGBA bytes.
    ///
    /// `buffer` must contain exactly `width * height * 4` bytes.
    #[wasm_bindgen(js_name = setImageData)]
    pub fn set_image_data(
        &self,
        buffer: &js_sys::ArrayBuffer,
        width: u32,
        height: u32,
    ) -> Result<(), JsValue> {
        let bytes = js_sys::Uint8Array::new(buffer).to_vec();

        let expected_len = (width as usize) * (height as usize) * 4;
        if bytes.len() != expected_len {
            return Err(JsValue::from_str(&format!(
                "Buffer size mismatch: expected {} bytes ({}x{} RGBA), got {}",
                expected_len,
                width,
                height,
                bytes.len()
            )));
        }

        let image = image::RgbaImage::from_raw(width, height, bytes)
            .ok_or_else(|| JsValue::from_str("Failed to construct image from buffer"))?;

        self.widget.borrow_mut().set_image(image);
        Ok(())
    }

    /// Signal that the editor opened or the source image identity changed;
    /// resets zoom/pan and discards any in-progress gesture. Returns the new
    /// source generation to pair with [`reportNaturalSize`].
    #[wasm_bindgen(js_name = notifySourceChanged)]
    pub fn notify_source_changed(&self) -> u64 {
        let mut capture = DomCapture(Some(&self.capture_element));
        self.widget.borrow_mut().notify_source_changed(&mut capture)
    }

    /// Report asynchronously-resolved intrinsic dimensions for the given
    /// source generation; stale generations are ignored.
    #[wasm_bindgen(js_name = reportNaturalSize)]
    pub fn report_natural_size(&self, generation: u64, width: f32, height: f32) {
        self.widget
            .borrow_mut()
            .report_natural_size(generation, width, height);
    }

    /// Apply a re-measured viewport edge length (from a ResizeObserver);
    /// sub-pixel changes are ignored.
    #[wasm_bindgen(js_name = setViewportSize)]
    pub fn set_viewport_size(&self, size: f32) {
        self.widget.borrow_mut().set_viewport_size(size);
    }

    /// Begin a drag gesture. Returns `false` when the gesture was ignored
    /// (pointer capture failed or another gesture is active).
    #[wasm_bindgen(js_name = handlePointerDown)]
    pub fn handle_pointer_down(&self, pointer_id: i32, x: f32, y: f32) -> bool {
        let mut capture = DomCapture(Some(&self.capture_element));
        self.widget
            .borrow_mut()
            .pointer_down(pointer_id, egui::pos2(x, y), &mut capture)
    }

    /// Advance the active drag gesture; events for other pointer ids and
    /// duplicate positions are ignored.
    #[wasm_bindgen(js_name = handlePointerMove)]
    pub fn handle_pointer_move(&self, pointer_id: i32, x: f32, y: f32) {
        self.widget
            .borrow_mut()
            .pointer_move(pointer_id, egui::pos2(x, y));
    }

    /// End the active drag gesture and release pointer capture
    #[wasm_bindgen(js_name = handlePointerUp)]
    pub fn handle_pointer_up(&self, pointer_id: i32) -> bool {
        let mut capture = DomCapture(Some(&self.capture_element));
        self.widget.borrow_mut().pointer_up(pointer_id, &mut capture)
    }

    /// Step zoom in by one increment (no-op at the bound)
    #[wasm_bindgen(js_name = zoomIn)]
    pub fn zoom_in(&self) -> bool {
        self.widget.borrow_mut().zoom_in()
    }

    /// Step zoom out by one increment (no-op at the bound)
    #[wasm_bindgen(js_name = zoomOut)]
    pub fn zoom_out(&self) -> bool {
        self.widget.borrow_mut().zoom_out()
    }

    #[wasm_bindgen(js_name = isZoomInDisabled)]
    pub fn is_zoom_in_disabled(&self) -> bool {
        self.widget.borrow().is_zoom_in_disabled()
    }

    #[wasm_bindgen(js_name = isZoomOutDisabled)]
    pub fn is_zoom_out_disabled(&self) -> bool {
        self.widget.borrow().is_zoom_out_disabled()
    }

    /// The current display transform as a CSS-style `matrix(...)` string
    #[wasm_bindgen(js_name = imageTransform)]
    pub fn image_transform(&self) -> String {
        self.widget.borrow().image_transform()
    }

    /// Get current zoom level (1.0 = fit to viewport)
    #[wasm_bindgen(js_name = getZoom)]
    pub fn get_zoom(&self) -> f32 {
        self.widget.borrow().view().zoom
    }

    /// Resolve the crop rectangle for the current view, render the final
    /// 512px avatar, and wrap it as `{ blob, previewUrl }`.
    ///
    /// Resolves to `null` when no crop can be derived right now; rejects on
    /// renderer or blob-construction failure. The caller owns revoking
    /// `previewUrl` once it is no longer displayed.
    #[wasm_bindgen]
    pub fn confirm(&self) -> Result<JsValue, JsValue> {
        let mut widget = self.widget.borrow_mut();
        widget.set_exporting(true);
        let result = widget.confirm();
        widget.set_exporting(false);
        drop(widget);

        let avatar = match result {
            Ok(Some(avatar)) => avatar,
            Ok(None) => return Ok(JsValue::NULL),
            Err(err) => {
                log::error!("avatar render failed: {err}");
                return Err(JsValue::from_str(&err.to_string()));
            }
        };

        let parts = js_sys::Array::new();
        parts.push(&js_sys::Uint8Array::from(avatar.png.as_slice()));
        let options = web_sys::BlobPropertyBag::new();
        options.set_type("image/png");
        let blob = web_sys::Blob::new_with_u8_array_sequence_and_options(&parts, &options)?;
        let preview_url = web_sys::Url::create_object_url_with_blob(&blob)?;

        let out = js_sys::Object::new();
        js_sys::Reflect::set(&out, &JsValue::from_str("blob"), &blob)?;
        js_sys::Reflect::set(
            &out,
            &JsValue::from_str("previewUrl"),
            &JsValue::from_str(&preview_url),
        )?;
        Ok(out.into())
    }

    /// Register a callback to be called when the view state changes.
    /// The callback receives an object with the current state:
    /// `{ zoom, transform, isZoomInDisabled, isZoomOutDisabled }`
    #[wasm_bindgen(js_name = onStateChange)]
    pub fn on_state_change(&self, callback: js_sys::Function) {
        self.callbacks.borrow_mut().on_state_change = Some(callback);
    }

    /// Clear all registered callbacks.
    #[wasm_bindgen(js_name = clearCallbacks)]
    pub fn clear_callbacks(&self) {
        self.callbacks.borrow_mut().on_state_change = None;
    }

    /// End event loop and release resources
    #[wasm_bindgen]
    pub fn destroy(&self) {
        self.runner.destroy();
    }
}
