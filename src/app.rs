//! Thin eframe App shell that hosts the crop widget
//!
//! All editor state lives in [`AvatarCropWidget`]; this shell owns the frame
//! loop, hands the widget its panel, and notifies JavaScript when the view
//! state changes so the host UI can mirror zoom-button state.

use std::cell::RefCell;
use std::rc::Rc;

use wasm_bindgen::JsValue;

use crate::widget::AvatarCropWidget;
use crate::CropperCallbacks;

/// The egui application for one crop editor instance
pub struct CropperApp {
    widget: Rc<RefCell<AvatarCropWidget>>,
    callbacks: Rc<RefCell<CropperCallbacks>>,
    /// Transform string from the last state-change notification
    last_emitted_transform: Option<String>,
}

impl CropperApp {
    pub fn new(
        _cc: &eframe::CreationContext<'_>,
        widget: Rc<RefCell<AvatarCropWidget>>,
        callbacks: Rc<RefCell<CropperCallbacks>>,
    ) -> Self {
        Self {
            widget,
            callbacks,
            last_emitted_transform: None,
        }
    }

    /// Fire the registered state-change callback when the view moved since
    /// the last frame
    fn emit_state_change(&mut self) {
        let widget = self.widget.borrow();
        let transform = widget.image_transform();
        if self.last_emitted_transform.as_deref() == Some(transform.as_str()) {
            return;
        }

        let state = js_sys::Object::new();
        let set = |key: &str, value: &JsValue| {
            let _ = js_sys::Reflect::set(&state, &JsValue::from_str(key), value);
        };
        set("zoom", &JsValue::from_f64(widget.view().zoom as f64));
        set("transform", &JsValue::from_str(&transform));
        set(
            "isZoomInDisabled",
            &JsValue::from_bool(widget.is_zoom_in_disabled()),
        );
        set(
            "isZoomOutDisabled",
            &JsValue::from_bool(widget.is_zoom_out_disabled()),
        );
        drop(widget);

        if let Some(callback) = self.callbacks.borrow().on_state_change.as_ref() {
            if let Err(err) = callback.call1(&JsValue::NULL, &state) {
                log::warn!("onStateChange callback failed: {err:?}");
            }
        }
        self.last_emitted_transform = Some(transform);
    }
}

impl eframe::App for CropperApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        egui::CentralPanel::default()
            .frame(egui::Frame::NONE)
            .show(ctx, |ui| {
                let available = ui.available_size();
                self.widget.borrow_mut().show(ui, available);
            });

        self.emit_state_change();
    }
}
