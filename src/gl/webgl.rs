use js_sys::Float32Array;
use web_sys::{
    WebGl2RenderingContext as GL, WebGlBuffer, WebGlProgram, WebGlShader, WebGlUniformLocation,
};

use super::{BufferUsage, DrawMode, GraphicsContext, UniformValue};
use crate::shader::ShaderStage;

impl GraphicsContext for GL {
    type Shader = WebGlShader;
    type Program = WebGlProgram;
    type Buffer = WebGlBuffer;
    type UniformLocation = WebGlUniformLocation;

    fn create_shader(&self, stage: ShaderStage) -> Option<WebGlShader> {
        let kind = match stage {
            ShaderStage::Vertex => GL::VERTEX_SHADER,
            ShaderStage::Fragment => GL::FRAGMENT_SHADER,
        };
        GL::create_shader(self, kind)
    }

    fn compile_shader(&self, shader: &WebGlShader, source: &str) -> Result<(), String> {
        self.shader_source(shader, source);
        GL::compile_shader(self, shader);
        if self
            .get_shader_parameter(shader, GL::COMPILE_STATUS)
            .as_bool()
            .unwrap_or(false)
        {
            Ok(())
        } else {
            Err(self
                .get_shader_info_log(shader)
                .unwrap_or_else(|| "unknown shader error".to_string()))
        }
    }

    fn delete_shader(&self, shader: &WebGlShader) {
        GL::delete_shader(self, Some(shader));
    }

    fn create_program(&self) -> Option<WebGlProgram> {
        GL::create_program(self)
    }

    fn link_program(
        &self,
        program: &WebGlProgram,
        vertex: &WebGlShader,
        fragment: &WebGlShader,
    ) -> Result<(), String> {
        self.attach_shader(program, vertex);
        self.attach_shader(program, fragment);
        GL::link_program(self, program);
        let linked = self
            .get_program_parameter(program, GL::LINK_STATUS)
            .as_bool()
            .unwrap_or(false);
        if linked {
            self.detach_shader(program, vertex);
            self.detach_shader(program, fragment);
            Ok(())
        } else {
            Err(self
                .get_program_info_log(program)
                .unwrap_or_else(|| "unknown program error".to_string()))
        }
    }

    fn delete_program(&self, program: &WebGlProgram) {
        GL::delete_program(self, Some(program));
    }

    fn use_program(&self, program: &WebGlProgram) {
        GL::use_program(self, Some(program));
    }

    fn uniform_location(&self, program: &WebGlProgram, name: &str) -> Option<WebGlUniformLocation> {
        self.get_uniform_location(program, name)
    }

    fn attrib_location(&self, program: &WebGlProgram, name: &str) -> Option<u32> {
        let loc = self.get_attrib_location(program, name);
        (loc >= 0).then_some(loc as u32)
    }

    fn set_uniform(&self, location: &WebGlUniformLocation, value: UniformValue) {
        match value {
            UniformValue::Float(v) => self.uniform1f(Some(location), v),
            UniformValue::Vec2([x, y]) => self.uniform2f(Some(location), x, y),
            UniformValue::Vec3([x, y, z]) => self.uniform3f(Some(location), x, y, z),
            UniformValue::Int(v) => self.uniform1i(Some(location), v),
        }
    }

    fn create_buffer(&self) -> Option<WebGlBuffer> {
        GL::create_buffer(self)
    }

    fn upload_buffer(&self, buffer: &WebGlBuffer, data: &[f32], usage: BufferUsage) {
        let hint = match usage {
            BufferUsage::Static => GL::STATIC_DRAW,
            BufferUsage::Dynamic => GL::DYNAMIC_DRAW,
        };
        self.bind_buffer(GL::ARRAY_BUFFER, Some(buffer));
        // SAFETY: `view` aliases wasm linear memory, which moves if memory
        // grows. Nothing between `view` and `buffer_data` may allocate.
        unsafe {
            let view = Float32Array::view(data);
            self.buffer_data_with_array_buffer_view(GL::ARRAY_BUFFER, &view, hint);
        }
    }

    fn bind_attribute(&self, buffer: &WebGlBuffer, location: u32, components: i32) {
        self.bind_buffer(GL::ARRAY_BUFFER, Some(buffer));
        self.vertex_attrib_pointer_with_i32(location, components, GL::FLOAT, false, 0, 0);
        self.enable_vertex_attrib_array(location);
    }

    fn delete_buffer(&self, buffer: &WebGlBuffer) {
        GL::delete_buffer(self, Some(buffer));
    }

    fn viewport(&self, width: u32, height: u32) {
        GL::viewport(self, 0, 0, width as i32, height as i32);
    }

    fn clear(&self, [r, g, b, a]: [f32; 4]) {
        self.clear_color(r, g, b, a);
        GL::clear(self, GL::COLOR_BUFFER_BIT);
    }

    fn draw(&self, mode: DrawMode, count: i32) {
        let mode = match mode {
            DrawMode::TriangleStrip => GL::TRIANGLE_STRIP,
            DrawMode::Points => GL::POINTS,
        };
        self.draw_arrays(mode, 0, count);
    }
}
