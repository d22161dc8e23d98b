//! Shader compilation and program linking.

use std::collections::HashMap;
use std::fmt;

use crate::error::{FxError, FxResult};
use crate::gl::{GraphicsContext, UniformValue};

/// Pipeline stage of a shader object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        })
    }
}

/// Vertex/fragment source pair. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSource {
    pub vertex: String,
    pub fragment: String,
}

impl ShaderSource {
    pub fn new(vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            vertex: vertex.into(),
            fragment: fragment.into(),
        }
    }
}

/// Uniform names the engine writes. Anything the program does not declare
/// resolves to no location and is skipped on upload.
pub const UNIFORM_NAMES: &[&str] = &[
    "u_time",
    "u_resolution",
    "u_mouse",
    "u_mouseActive",
    "u_viscosity",
    "u_distortion",
    "u_speed",
    "u_colorShift",
    "u_particleSize",
    "u_bounds",
];

pub const ATTRIB_NAMES: &[&str] = &["a_position", "a_color"];

/// A linked program plus its resolved uniform and attribute locations.
///
/// Owned by exactly one surface. Dropping it without [`CompiledProgram::destroy`]
/// leaks the GPU object, so surfaces destroy it on dispose.
pub struct CompiledProgram<C: GraphicsContext> {
    handle: Option<C::Program>,
    uniforms: HashMap<&'static str, C::UniformLocation>,
    attributes: HashMap<&'static str, u32>,
}

impl<C: GraphicsContext> CompiledProgram<C> {
    pub fn handle(&self) -> Option<&C::Program> {
        self.handle.as_ref()
    }

    pub fn is_live(&self) -> bool {
        self.handle.is_some()
    }

    pub fn has_uniform(&self, name: &str) -> bool {
        self.uniforms.contains_key(name)
    }

    pub fn attribute(&self, name: &str) -> Option<u32> {
        self.attributes.get(name).copied()
    }

    pub fn bind(&self, gl: &C) {
        if let Some(program) = &self.handle {
            gl.use_program(program);
        }
    }

    /// Writes `value` if the program declares `name`. Returns whether it did.
    pub fn set(&self, gl: &C, name: &str, value: UniformValue) -> bool {
        match self.uniforms.get(name) {
            Some(location) => {
                gl.set_uniform(location, value);
                true
            }
            None => false,
        }
    }

    /// Releases the program. Safe to call more than once.
    pub fn destroy(&mut self, gl: &C) {
        if let Some(program) = self.handle.take() {
            gl.delete_program(&program);
            self.uniforms.clear();
            self.attributes.clear();
        }
    }
}

/// Compiles stages and links them into a [`CompiledProgram`].
///
/// Compilation is a pure function of the source text, so nothing here retries.
pub struct ShaderProgramBuilder<'a, C: GraphicsContext> {
    gl: &'a C,
}

impl<'a, C: GraphicsContext> ShaderProgramBuilder<'a, C> {
    pub fn new(gl: &'a C) -> Self {
        Self { gl }
    }

    /// Compiles one stage. A shader object that fails to compile is deleted
    /// before the error is returned.
    pub fn compile(&self, source: &str, stage: ShaderStage) -> FxResult<C::Shader> {
        let shader = self
            .gl
            .create_shader(stage)
            .ok_or_else(|| FxError::shader_compile(stage, "failed to create shader object"))?;
        match self.gl.compile_shader(&shader, source) {
            Ok(()) => Ok(shader),
            Err(log) => {
                self.gl.delete_shader(&shader);
                log::warn!("{stage} shader compile failed: {log}");
                Err(FxError::shader_compile(stage, log))
            }
        }
    }

    /// Links two compiled stages. Both shader objects are released whatever
    /// the outcome; the program is released too when linking fails.
    pub fn link(&self, vertex: C::Shader, fragment: C::Shader) -> FxResult<CompiledProgram<C>> {
        let result = self.link_inner(&vertex, &fragment);
        self.gl.delete_shader(&vertex);
        self.gl.delete_shader(&fragment);
        result
    }

    fn link_inner(&self, vertex: &C::Shader, fragment: &C::Shader) -> FxResult<CompiledProgram<C>> {
        let program = self
            .gl
            .create_program()
            .ok_or_else(|| FxError::program_link("failed to create program object"))?;
        if let Err(log) = self.gl.link_program(&program, vertex, fragment) {
            self.gl.delete_program(&program);
            log::warn!("program link failed: {log}");
            return Err(FxError::program_link(log));
        }

        let mut uniforms = HashMap::new();
        for &name in UNIFORM_NAMES {
            if let Some(location) = self.gl.uniform_location(&program, name) {
                uniforms.insert(name, location);
            }
        }
        let mut attributes = HashMap::new();
        for &name in ATTRIB_NAMES {
            if let Some(location) = self.gl.attrib_location(&program, name) {
                attributes.insert(name, location);
            }
        }
        log::debug!(
            "linked program: {} uniforms, {} attributes",
            uniforms.len(),
            attributes.len()
        );
        Ok(CompiledProgram {
            handle: Some(program),
            uniforms,
            attributes,
        })
    }

    /// Compiles both stages and links them. The fragment stage is never
    /// compiled when the vertex stage fails, and link is never attempted
    /// unless both compiled.
    pub fn build(&self, source: &ShaderSource) -> FxResult<CompiledProgram<C>> {
        let vertex = self.compile(&source.vertex, ShaderStage::Vertex)?;
        let fragment = match self.compile(&source.fragment, ShaderStage::Fragment) {
            Ok(shader) => shader,
            Err(err) => {
                self.gl.delete_shader(&vertex);
                return Err(err);
            }
        };
        self.link(vertex, fragment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gl::HeadlessContext;
    use crate::shaders;

    fn fluid_source() -> ShaderSource {
        ShaderSource::new(shaders::QUAD_VERTEX, shaders::FLUID_FRAGMENT)
    }

    #[test]
    fn build_releases_shaders_and_keeps_program() {
        let gl = HeadlessContext::new();
        let mut program = ShaderProgramBuilder::new(&gl).build(&fluid_source()).unwrap();
        let live = gl.live();
        assert_eq!(live.shaders, 0);
        assert_eq!(live.programs, 1);
        assert!(program.has_uniform("u_time"));
        assert_eq!(program.attribute("a_position"), Some(0));

        program.destroy(&gl);
        program.destroy(&gl);
        assert_eq!(gl.live().total(), 0);
        assert!(!program.is_live());
    }

    #[test]
    fn failed_compile_releases_the_shader_object() {
        let gl = HeadlessContext::new();
        gl.fail_compile(ShaderStage::Vertex, "ERROR: 0:3: 'vec5' : no such type");
        let err = ShaderProgramBuilder::new(&gl)
            .compile(shaders::QUAD_VERTEX, ShaderStage::Vertex)
            .err()
            .unwrap();
        assert_eq!(
            err,
            FxError::shader_compile(ShaderStage::Vertex, "ERROR: 0:3: 'vec5' : no such type")
        );
        assert_eq!(gl.live().shaders, 0);
    }

    #[test]
    fn fragment_failure_carries_fragment_log_and_leaks_nothing() {
        let gl = HeadlessContext::new();
        gl.fail_compile(ShaderStage::Fragment, "missing precision");
        let err = ShaderProgramBuilder::new(&gl)
            .build(&fluid_source())
            .err()
            .unwrap();
        match err {
            FxError::ShaderCompile { stage, log } => {
                assert_eq!(stage, ShaderStage::Fragment);
                assert_eq!(log, "missing precision");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(gl.live().total(), 0);
    }

    #[test]
    fn link_failure_releases_everything() {
        let gl = HeadlessContext::new();
        gl.fail_link("varying v_uv not written");
        let err = ShaderProgramBuilder::new(&gl)
            .build(&fluid_source())
            .err()
            .unwrap();
        assert_eq!(err, FxError::program_link("varying v_uv not written"));
        assert_eq!(gl.live().total(), 0);
    }

    #[test]
    fn missing_uniforms_are_skipped() {
        let gl = HeadlessContext::new();
        gl.restrict_uniforms(&["u_time"]);
        let program = ShaderProgramBuilder::new(&gl).build(&fluid_source()).unwrap();
        assert!(program.set(&gl, "u_time", UniformValue::Float(1.0)));
        assert!(!program.set(&gl, "u_viscosity", UniformValue::Float(0.2)));
        assert_eq!(gl.uniform("u_viscosity"), None);
    }
}
