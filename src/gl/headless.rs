use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use super::{BufferUsage, DrawMode, GraphicsContext, UniformValue};
use crate::shader::ShaderStage;

/// Live GPU objects held by a [`HeadlessContext`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceCounts {
    pub shaders: usize,
    pub programs: usize,
    pub buffers: usize,
}

impl ResourceCounts {
    pub fn total(&self) -> usize {
        self.shaders + self.programs + self.buffers
    }
}

#[derive(Default)]
struct State {
    next_id: u32,
    shaders: HashSet<u32>,
    programs: HashSet<u32>,
    buffers: HashSet<u32>,
    compile_failures: HashMap<ShaderStage, String>,
    shader_stages: HashMap<u32, ShaderStage>,
    link_failure: Option<String>,
    known_uniforms: Option<HashSet<String>>,
    uniforms: HashMap<String, UniformValue>,
    buffer_lengths: HashMap<u32, usize>,
    draws: Vec<(DrawMode, i32)>,
    viewport: (u32, u32),
    current_program: Option<u32>,
}

impl State {
    fn alloc(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory graphics context that records what the engine asks of it.
///
/// Clones share state, so a test can keep one handle while a canvas hands
/// another to the surface, then inspect resource accounting after dispose.
#[derive(Clone, Default)]
pub struct HeadlessContext {
    state: Rc<RefCell<State>>,
}

impl HeadlessContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later compile of `stage` fail with `log`.
    pub fn fail_compile(&self, stage: ShaderStage, log: impl Into<String>) {
        self.state
            .borrow_mut()
            .compile_failures
            .insert(stage, log.into());
    }

    /// Makes every later link fail with `log`.
    pub fn fail_link(&self, log: impl Into<String>) {
        self.state.borrow_mut().link_failure = Some(log.into());
    }

    /// Restricts resolvable uniforms to `names`, like a driver that optimized the rest out.
    pub fn restrict_uniforms(&self, names: &[&str]) {
        self.state.borrow_mut().known_uniforms =
            Some(names.iter().map(|n| n.to_string()).collect());
    }

    pub fn live(&self) -> ResourceCounts {
        let s = self.state.borrow();
        ResourceCounts {
            shaders: s.shaders.len(),
            programs: s.programs.len(),
            buffers: s.buffers.len(),
        }
    }

    /// Last value written to the uniform called `name`.
    pub fn uniform(&self, name: &str) -> Option<UniformValue> {
        self.state.borrow().uniforms.get(name).copied()
    }

    pub fn uniform_f32(&self, name: &str) -> Option<f32> {
        match self.uniform(name)? {
            UniformValue::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn draws(&self) -> Vec<(DrawMode, i32)> {
        self.state.borrow().draws.clone()
    }

    pub fn draw_count(&self) -> usize {
        self.state.borrow().draws.len()
    }

    pub fn viewport_size(&self) -> (u32, u32) {
        self.state.borrow().viewport
    }

    /// Float counts of every live buffer's last upload, largest first.
    pub fn buffer_lengths(&self) -> Vec<usize> {
        let s = self.state.borrow();
        let mut lengths: Vec<usize> = s
            .buffers
            .iter()
            .filter_map(|id| s.buffer_lengths.get(id).copied())
            .collect();
        lengths.sort_unstable_by(|a, b| b.cmp(a));
        lengths
    }
}

/// Uniform handles carry their name so uploads can be looked up by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlessUniform(String);

impl GraphicsContext for HeadlessContext {
    type Shader = u32;
    type Program = u32;
    type Buffer = u32;
    type UniformLocation = HeadlessUniform;

    fn create_shader(&self, stage: ShaderStage) -> Option<u32> {
        let mut s = self.state.borrow_mut();
        let id = s.alloc();
        s.shaders.insert(id);
        s.shader_stages.insert(id, stage);
        Some(id)
    }

    fn compile_shader(&self, shader: &u32, source: &str) -> Result<(), String> {
        let s = self.state.borrow();
        let stage = s.shader_stages.get(shader).copied();
        if let Some(log) = stage.and_then(|st| s.compile_failures.get(&st)) {
            return Err(log.clone());
        }
        if source.trim().is_empty() {
            return Err("ERROR: 0:1: empty shader source".to_string());
        }
        Ok(())
    }

    fn delete_shader(&self, shader: &u32) {
        let mut s = self.state.borrow_mut();
        s.shaders.remove(shader);
        s.shader_stages.remove(shader);
    }

    fn create_program(&self) -> Option<u32> {
        let mut s = self.state.borrow_mut();
        let id = s.alloc();
        s.programs.insert(id);
        Some(id)
    }

    fn link_program(&self, _program: &u32, _vertex: &u32, _fragment: &u32) -> Result<(), String> {
        match &self.state.borrow().link_failure {
            Some(log) => Err(log.clone()),
            None => Ok(()),
        }
    }

    fn delete_program(&self, program: &u32) {
        let mut s = self.state.borrow_mut();
        s.programs.remove(program);
        if s.current_program == Some(*program) {
            s.current_program = None;
        }
    }

    fn use_program(&self, program: &u32) {
        self.state.borrow_mut().current_program = Some(*program);
    }

    fn uniform_location(&self, _program: &u32, name: &str) -> Option<HeadlessUniform> {
        let s = self.state.borrow();
        match &s.known_uniforms {
            Some(known) if !known.contains(name) => None,
            _ => Some(HeadlessUniform(name.to_string())),
        }
    }

    fn attrib_location(&self, _program: &u32, name: &str) -> Option<u32> {
        match name {
            "a_position" => Some(0),
            "a_color" => Some(1),
            _ => None,
        }
    }

    fn set_uniform(&self, location: &HeadlessUniform, value: UniformValue) {
        self.state
            .borrow_mut()
            .uniforms
            .insert(location.0.clone(), value);
    }

    fn create_buffer(&self) -> Option<u32> {
        let mut s = self.state.borrow_mut();
        let id = s.alloc();
        s.buffers.insert(id);
        Some(id)
    }

    fn upload_buffer(&self, buffer: &u32, data: &[f32], _usage: BufferUsage) {
        self.state
            .borrow_mut()
            .buffer_lengths
            .insert(*buffer, data.len());
    }

    fn bind_attribute(&self, _buffer: &u32, _location: u32, _components: i32) {}

    fn delete_buffer(&self, buffer: &u32) {
        let mut s = self.state.borrow_mut();
        s.buffers.remove(buffer);
        s.buffer_lengths.remove(buffer);
    }

    fn viewport(&self, width: u32, height: u32) {
        self.state.borrow_mut().viewport = (width, height);
    }

    fn clear(&self, _rgba: [f32; 4]) {}

    fn draw(&self, mode: DrawMode, count: i32) {
        self.state.borrow_mut().draws.push((mode, count));
    }
}
