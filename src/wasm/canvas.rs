use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use wasm_bindgen::{closure::Closure, JsCast, JsValue};
use web_sys::{window, HtmlCanvasElement, PointerEvent, WebGl2RenderingContext as GL, Window};

use crate::canvas::{Canvas, LayoutBox, PointerSample};
use crate::scheduler::{FrameCallback, FrameHost, FrameRequestId};

struct PointerListeners {
    on_move: Closure<dyn FnMut(PointerEvent)>,
    on_leave: Closure<dyn FnMut(PointerEvent)>,
}

/// `<canvas>` element plus its pointer listeners.
pub struct WebCanvas {
    element: HtmlCanvasElement,
    pointer: Rc<RefCell<Option<PointerSample>>>,
    listeners: Option<PointerListeners>,
}

impl WebCanvas {
    pub fn new(element: HtmlCanvasElement) -> Self {
        Self {
            element,
            pointer: Rc::new(RefCell::new(None)),
            listeners: None,
        }
    }

    pub fn element(&self) -> &HtmlCanvasElement {
        &self.element
    }

    fn attach(&mut self) -> Result<(), JsValue> {
        let sink = self.pointer.clone();
        let on_move = Closure::<dyn FnMut(PointerEvent)>::new(move |event: PointerEvent| {
            *sink.borrow_mut() = Some(PointerSample::Move {
                client_x: event.client_x() as f64,
                client_y: event.client_y() as f64,
            });
        });
        let sink = self.pointer.clone();
        let on_leave = Closure::<dyn FnMut(PointerEvent)>::new(move |_event: PointerEvent| {
            *sink.borrow_mut() = Some(PointerSample::Leave);
        });
        self.element
            .add_event_listener_with_callback("pointermove", on_move.as_ref().unchecked_ref())?;
        self.element
            .add_event_listener_with_callback("pointerleave", on_leave.as_ref().unchecked_ref())?;
        self.listeners = Some(PointerListeners { on_move, on_leave });
        Ok(())
    }

    fn detach(&mut self) {
        if let Some(listeners) = self.listeners.take() {
            let _ = self.element.remove_event_listener_with_callback(
                "pointermove",
                listeners.on_move.as_ref().unchecked_ref(),
            );
            let _ = self.element.remove_event_listener_with_callback(
                "pointerleave",
                listeners.on_leave.as_ref().unchecked_ref(),
            );
        }
        self.pointer.borrow_mut().take();
    }
}

impl Canvas for WebCanvas {
    type Context = GL;

    fn acquire_context(&self) -> Option<GL> {
        self.element
            .get_context("webgl2")
            .ok()
            .flatten()?
            .dyn_into::<GL>()
            .ok()
    }

    fn layout_box(&self) -> LayoutBox {
        let rect = self.element.get_bounding_client_rect();
        LayoutBox {
            left: rect.left(),
            top: rect.top(),
            width: rect.width(),
            height: rect.height(),
        }
    }

    fn device_pixel_ratio(&self) -> f64 {
        window().map(|w| w.device_pixel_ratio()).unwrap_or(1.0)
    }

    fn backing_size(&self) -> (u32, u32) {
        (self.element.width(), self.element.height())
    }

    fn set_backing_size(&self, width: u32, height: u32) {
        self.element.set_width(width);
        self.element.set_height(height);
    }

    fn listen_pointer(&mut self, enabled: bool) {
        if enabled && self.listeners.is_none() {
            if let Err(err) = self.attach() {
                log::warn!("pointer listeners not attached: {err:?}");
            }
        } else if !enabled {
            self.detach();
        }
    }

    fn take_pointer(&mut self) -> Option<PointerSample> {
        self.pointer.borrow_mut().take()
    }
}

impl Drop for WebCanvas {
    fn drop(&mut self) {
        self.detach();
    }
}

type Slot = Rc<RefCell<Option<FrameCallback>>>;

/// `requestAnimationFrame` pacing.
///
/// Each request's callback sits in a slot keyed by its request id; cancelling
/// empties the slot so the surface it captured is released even though the
/// JS-side closure is never invoked.
pub struct WebFrameHost {
    window: Window,
    slots: Rc<RefCell<HashMap<i32, Slot>>>,
}

impl WebFrameHost {
    pub fn new() -> Result<Self, JsValue> {
        Ok(Self {
            window: window().ok_or("no window")?,
            slots: Rc::new(RefCell::new(HashMap::new())),
        })
    }
}

impl FrameHost for WebFrameHost {
    fn now(&self) -> f64 {
        self.window
            .performance()
            .map(|p| p.now())
            .unwrap_or_else(js_sys::Date::now)
    }

    fn request_frame(&self, callback: FrameCallback) -> Option<FrameRequestId> {
        let slot: Slot = Rc::new(RefCell::new(Some(callback)));
        let id_cell = Rc::new(Cell::new(-1));

        let slots = self.slots.clone();
        let fired_slot = slot.clone();
        let fired_id = id_cell.clone();
        let js = Closure::once_into_js(move |timestamp: f64| {
            slots.borrow_mut().remove(&fired_id.get());
            let callback = fired_slot.borrow_mut().take();
            if let Some(callback) = callback {
                callback(timestamp);
            }
        });

        match self.window.request_animation_frame(js.unchecked_ref()) {
            Ok(id) => {
                id_cell.set(id);
                self.slots.borrow_mut().insert(id, slot);
                Some(FrameRequestId(id))
            }
            Err(err) => {
                log::error!("requestAnimationFrame failed: {err:?}");
                None
            }
        }
    }

    fn cancel_frame(&self, id: FrameRequestId) {
        let _ = self.window.cancel_animation_frame(id.0);
        let slot = self.slots.borrow_mut().remove(&id.0);
        if let Some(slot) = slot {
            slot.borrow_mut().take();
        }
    }
}
