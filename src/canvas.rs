//! Canvas abstraction: layout, backing store, context and pointer input.

use std::cell::RefCell;
use std::rc::Rc;

use crate::gl::{GraphicsContext, HeadlessContext};

/// Canvas layout box in CSS pixels, relative to the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LayoutBox {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// Latest pointer activity over a canvas, in client (CSS) coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerSample {
    Move { client_x: f64, client_y: f64 },
    Leave,
}

/// Something a surface can render into.
pub trait Canvas {
    type Context: GraphicsContext;

    /// A fresh handle on the canvas' graphics context, or `None` when the
    /// platform cannot provide one.
    fn acquire_context(&self) -> Option<Self::Context>;

    fn layout_box(&self) -> LayoutBox;
    fn device_pixel_ratio(&self) -> f64;
    fn backing_size(&self) -> (u32, u32);
    fn set_backing_size(&self, width: u32, height: u32);

    /// Attaches or detaches pointer listeners.
    fn listen_pointer(&mut self, enabled: bool);
    /// Most recent pointer sample since the last call, if any.
    fn take_pointer(&mut self) -> Option<PointerSample>;
}

struct HeadlessState {
    context: Option<HeadlessContext>,
    layout: LayoutBox,
    dpr: f64,
    backing: (u32, u32),
    listening: bool,
    pointer: Option<PointerSample>,
}

/// Off-screen canvas for tests and headless runs. Clones share state.
#[derive(Clone)]
pub struct HeadlessCanvas {
    state: Rc<RefCell<HeadlessState>>,
}

impl HeadlessCanvas {
    pub fn new(width: f64, height: f64, dpr: f64) -> Self {
        Self {
            state: Rc::new(RefCell::new(HeadlessState {
                context: Some(HeadlessContext::new()),
                layout: LayoutBox {
                    left: 0.0,
                    top: 0.0,
                    width,
                    height,
                },
                dpr,
                backing: (300, 150),
                listening: false,
                pointer: None,
            })),
        }
    }

    /// A canvas whose context request always fails.
    pub fn without_context(width: f64, height: f64) -> Self {
        let canvas = Self::new(width, height, 1.0);
        canvas.state.borrow_mut().context = None;
        canvas
    }

    /// The shared context handed to surfaces, for inspection.
    pub fn context(&self) -> Option<HeadlessContext> {
        self.state.borrow().context.clone()
    }

    pub fn set_layout(&self, layout: LayoutBox) {
        self.state.borrow_mut().layout = layout;
    }

    pub fn set_device_pixel_ratio(&self, dpr: f64) {
        self.state.borrow_mut().dpr = dpr;
    }

    pub fn is_listening(&self) -> bool {
        self.state.borrow().listening
    }

    /// Simulates a pointer event. Dropped unless listeners are attached.
    pub fn dispatch_pointer(&self, sample: PointerSample) {
        let mut s = self.state.borrow_mut();
        if s.listening {
            s.pointer = Some(sample);
        }
    }
}

impl Canvas for HeadlessCanvas {
    type Context = HeadlessContext;

    fn acquire_context(&self) -> Option<HeadlessContext> {
        self.state.borrow().context.clone()
    }

    fn layout_box(&self) -> LayoutBox {
        self.state.borrow().layout
    }

    fn device_pixel_ratio(&self) -> f64 {
        self.state.borrow().dpr
    }

    fn backing_size(&self) -> (u32, u32) {
        self.state.borrow().backing
    }

    fn set_backing_size(&self, width: u32, height: u32) {
        self.state.borrow_mut().backing = (width, height);
    }

    fn listen_pointer(&mut self, enabled: bool) {
        let mut s = self.state.borrow_mut();
        s.listening = enabled;
        if !enabled {
            s.pointer = None;
        }
    }

    fn take_pointer(&mut self) -> Option<PointerSample> {
        self.state.borrow_mut().pointer.take()
    }
}
