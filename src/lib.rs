//! Procedural visual-effects engine for the demo pages: shader programs,
//! per-canvas render surfaces, visibility-gated frame loops and a CPU
//! particle integrator.
//!
//! The core is host-agnostic and runs under `cargo test`; the browser
//! bindings live in the wasm-only `wasm` module.

pub mod canvas;
pub mod error;
pub mod gl;
pub mod params;
pub mod particles;
pub mod scheduler;
pub mod shader;
pub mod shaders;
pub mod surface;
pub mod visibility;

pub use canvas::{Canvas, HeadlessCanvas, LayoutBox, PointerSample};
pub use error::{FxError, FxResult};
pub use params::{ParamName, ParameterBus, Params, ParamsPatch};
pub use particles::{ColorMode, Distribution, ParticleIntegrator};
pub use scheduler::{FrameHost, ManualFrameHost, RenderScheduler, SharedSurface};
pub use shader::{ShaderProgramBuilder, ShaderSource, ShaderStage};
pub use surface::{MousePosition, RenderSurface, SurfaceState};
pub use visibility::{GateMode, SurfaceId, VisibilityGate};

// Only compile wasm-specific code when targeting wasm32.

#[cfg(target_arch = "wasm32")]
mod wasm {
    use wasm_bindgen::prelude::*;

    mod canvas;
    mod session;

    pub use session::FxSession;

    #[wasm_bindgen(start)]
    pub fn main() -> Result<(), JsValue> {
        console_error_panic_hook::set_once();
        console_log::init_with_level(log::Level::Info).ok();
        log::info!("demo_fx loaded");
        Ok(())
    }
}

#[cfg(target_arch = "wasm32")]
pub use wasm::FxSession;
