use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use js_sys::Array;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{
    window, HtmlCanvasElement, IntersectionObserver, IntersectionObserverEntry,
    IntersectionObserverInit,
};

use super::canvas::{WebCanvas, WebFrameHost};
use crate::error::FxError;
use crate::params::{self, ParamsPatch};
use crate::particles::Distribution;
use crate::shaders;
use crate::surface::RenderSurface;
use crate::visibility::{SurfaceId, VisibilityGate};

type Gate = VisibilityGate<WebFrameHost, WebCanvas>;

struct Observer {
    observer: IntersectionObserver,
    _callback: Closure<dyn FnMut(Array)>,
}

/// Page-level handle the UI layer mounts surfaces through.
#[wasm_bindgen]
pub struct FxSession {
    gate: Rc<RefCell<Gate>>,
    observers: HashMap<u32, Observer>,
}

fn find_canvas(canvas_id: &str) -> Result<HtmlCanvasElement, FxError> {
    let document = window()
        .and_then(|w| w.document())
        .ok_or_else(|| FxError::surface_init("no document"))?;
    document
        .get_element_by_id(canvas_id)
        .ok_or_else(|| FxError::surface_init(format!("canvas #{canvas_id} not found")))?
        .dyn_into::<HtmlCanvasElement>()
        .map_err(|_| FxError::surface_init(format!("#{canvas_id} is not a canvas")))
}

fn parse_patch(json: Option<String>) -> Result<ParamsPatch, FxError> {
    match json {
        Some(json) if !json.trim().is_empty() => ParamsPatch::from_json(&json),
        _ => Ok(ParamsPatch::new()),
    }
}

#[wasm_bindgen]
impl FxSession {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Result<FxSession, JsValue> {
        let host = Rc::new(WebFrameHost::new()?);
        Ok(FxSession {
            gate: Rc::new(RefCell::new(VisibilityGate::new(host))),
            observers: HashMap::new(),
        })
    }

    /// Mounts the fluid-distortion effect, started while on screen.
    pub fn mount_fluid(
        &mut self,
        canvas_id: &str,
        params_json: Option<String>,
        threshold: f64,
    ) -> Result<u32, JsValue> {
        let element = find_canvas(canvas_id)?;
        let patch = parse_patch(params_json)?;
        let canvas = WebCanvas::new(element.clone());
        let mut surface = RenderSurface::create(canvas, &shaders::fluid(), &patch)
            .inspect_err(|err| log::error!("#{canvas_id}: {err}"))?;
        surface.track_mouse(true);
        let id = self
            .gate
            .borrow_mut()
            .observe(Rc::new(RefCell::new(surface)), threshold);
        if let Err(err) = self.watch(id, &element, threshold) {
            self.gate.borrow_mut().teardown(id);
            return Err(err);
        }
        Ok(id.0)
    }

    /// Mounts the particle effect, started while on screen.
    pub fn mount_particles(
        &mut self,
        canvas_id: &str,
        params_json: Option<String>,
        threshold: f64,
        seed: u32,
        spherical: bool,
    ) -> Result<u32, JsValue> {
        let element = find_canvas(canvas_id)?;
        let patch = parse_patch(params_json)?;
        let distribution = if spherical {
            Distribution::Spherical
        } else {
            Distribution::UniformCube
        };
        let surface = RenderSurface::create_particles(
            WebCanvas::new(element.clone()),
            &shaders::particles(),
            &patch,
            seed as u64,
            distribution,
        )
        .inspect_err(|err| log::error!("#{canvas_id}: {err}"))?;
        let id = self
            .gate
            .borrow_mut()
            .observe(Rc::new(RefCell::new(surface)), threshold);
        if let Err(err) = self.watch(id, &element, threshold) {
            self.gate.borrow_mut().teardown(id);
            return Err(err);
        }
        Ok(id.0)
    }

    /// Mounts an always-on background (hero) effect.
    pub fn mount_background(
        &mut self,
        canvas_id: &str,
        params_json: Option<String>,
    ) -> Result<u32, JsValue> {
        let element = find_canvas(canvas_id)?;
        let patch = parse_patch(params_json)?;
        let mut surface = RenderSurface::create(WebCanvas::new(element), &shaders::fluid(), &patch)
            .inspect_err(|err| log::error!("#{canvas_id}: {err}"))?;
        surface.track_mouse(true);
        let id = self
            .gate
            .borrow_mut()
            .mount_always_on(Rc::new(RefCell::new(surface)));
        Ok(id.0)
    }

    pub fn set_param(&self, id: u32, name: &str, value: f64) -> bool {
        self.with_surface(id, |s| s.set_param(name, value))
            .unwrap_or(false)
    }

    pub fn set_params(&self, id: u32, json: &str) -> Result<bool, JsValue> {
        let patch = ParamsPatch::from_json(json)?;
        Ok(self.with_surface(id, |s| s.set_params(&patch)).unwrap_or(false))
    }

    pub fn apply_preset(&self, id: u32, name: &str) -> bool {
        match params::preset(name) {
            Some(patch) => self
                .with_surface(id, |s| s.set_params(&patch))
                .unwrap_or(false),
            None => {
                log::debug!("unknown preset `{name}`");
                false
            }
        }
    }

    pub fn track_mouse(&self, id: u32, enabled: bool) {
        self.with_surface(id, |s| s.track_mouse(enabled));
    }

    /// Stops, disposes and forgets a surface. Call on section teardown.
    pub fn teardown(&mut self, id: u32) -> bool {
        if let Some(observer) = self.observers.remove(&id) {
            observer.observer.disconnect();
        }
        self.gate.borrow_mut().teardown(SurfaceId(id))
    }

    pub fn running_count(&self) -> u32 {
        self.gate.borrow().running_count() as u32
    }

    pub fn aggregate_fps(&self) -> f64 {
        self.gate.borrow().aggregate_fps()
    }
}

impl FxSession {
    fn with_surface<R>(
        &self,
        id: u32,
        f: impl FnOnce(&mut RenderSurface<WebCanvas>) -> R,
    ) -> Option<R> {
        let gate = self.gate.borrow();
        let surface = gate.surface(SurfaceId(id))?;
        let mut surface = surface.try_borrow_mut().ok()?;
        Some(f(&mut surface))
    }

    fn watch(
        &mut self,
        id: SurfaceId,
        element: &HtmlCanvasElement,
        threshold: f64,
    ) -> Result<(), JsValue> {
        let gate = Rc::downgrade(&self.gate);
        let callback = Closure::<dyn FnMut(Array)>::new(move |entries: Array| {
            let Some(gate) = gate.upgrade() else {
                return;
            };
            let Ok(mut gate) = gate.try_borrow_mut() else {
                return;
            };
            for entry in entries.iter() {
                let entry: IntersectionObserverEntry = entry.unchecked_into();
                gate.on_visibility(id, entry.intersection_ratio());
            }
        });

        let threshold = if threshold.is_finite() {
            threshold.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let thresholds = Array::of2(&JsValue::from_f64(0.0), &JsValue::from_f64(threshold));
        let init = IntersectionObserverInit::new();
        init.set_threshold(&thresholds);
        let observer =
            IntersectionObserver::new_with_options(callback.as_ref().unchecked_ref(), &init)?;
        observer.observe(element);
        self.observers.insert(
            id.0,
            Observer {
                observer,
                _callback: callback,
            },
        );
        Ok(())
    }
}

impl Drop for FxSession {
    fn drop(&mut self) {
        for observer in self.observers.values() {
            observer.observer.disconnect();
        }
        // Queued frame callbacks hold their own handles to the surfaces, so
        // loops keep going unless they are stopped here.
        match self.gate.try_borrow_mut() {
            Ok(mut gate) => {
                gate.teardown_all();
            }
            Err(_) => log::warn!("session dropped while its gate was busy"),
        }
    }
}
