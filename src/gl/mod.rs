//! The slice of WebGL2 the engine talks to.
//!
//! Everything above this module is written against [`GraphicsContext`] so the
//! same surface code runs on a real `WebGl2RenderingContext` in the browser and
//! on [`HeadlessContext`] in host tests.

mod headless;
#[cfg(target_arch = "wasm32")]
mod webgl;

pub use headless::{HeadlessContext, HeadlessUniform, ResourceCounts};

use crate::shader::ShaderStage;

/// A value written to a uniform slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Int(i32),
}

/// Primitive topology for a draw call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawMode {
    TriangleStrip,
    Points,
}

/// Upload hint for vertex buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    /// Written once at init (the full-screen quad).
    Static,
    /// Rewritten every frame (particle positions/colors).
    Dynamic,
}

/// Graphics API used by shader building and surfaces.
///
/// Handle types are opaque. `create_*` returns `None` when the driver refuses
/// (lost context, out of memory). Compile and link report the driver log on
/// failure.
pub trait GraphicsContext {
    type Shader;
    type Program;
    type Buffer;
    type UniformLocation;

    fn create_shader(&self, stage: ShaderStage) -> Option<Self::Shader>;
    fn compile_shader(&self, shader: &Self::Shader, source: &str) -> Result<(), String>;
    fn delete_shader(&self, shader: &Self::Shader);

    fn create_program(&self) -> Option<Self::Program>;
    /// Attaches both shaders, links, and detaches them again on success.
    fn link_program(
        &self,
        program: &Self::Program,
        vertex: &Self::Shader,
        fragment: &Self::Shader,
    ) -> Result<(), String>;
    fn delete_program(&self, program: &Self::Program);
    fn use_program(&self, program: &Self::Program);

    fn uniform_location(&self, program: &Self::Program, name: &str)
        -> Option<Self::UniformLocation>;
    fn attrib_location(&self, program: &Self::Program, name: &str) -> Option<u32>;
    fn set_uniform(&self, location: &Self::UniformLocation, value: UniformValue);

    fn create_buffer(&self) -> Option<Self::Buffer>;
    fn upload_buffer(&self, buffer: &Self::Buffer, data: &[f32], usage: BufferUsage);
    fn bind_attribute(&self, buffer: &Self::Buffer, location: u32, components: i32);
    fn delete_buffer(&self, buffer: &Self::Buffer);

    fn viewport(&self, width: u32, height: u32);
    fn clear(&self, rgba: [f32; 4]);
    fn draw(&self, mode: DrawMode, count: i32);
}
