//! One canvas, its context, its program and its parameters.

use crate::canvas::{Canvas, PointerSample};
use crate::error::{FxError, FxResult};
use crate::gl::{BufferUsage, DrawMode, GraphicsContext, UniformValue};
use crate::params::{ParamName, ParameterBus, Params, ParamsPatch};
use crate::particles::{Distribution, ParticleIntegrator};
use crate::shader::{CompiledProgram, ShaderProgramBuilder, ShaderSource};
use crate::shaders::QUAD_VERTICES;

/// Length of one 60 Hz frame; particle steps are scaled against it.
pub const FRAME_MS: f64 = 1000.0 / 60.0;

/// Longest frame delta honoured. Longer gaps (a tab coming back from the
/// background) advance the effect by this much.
pub const MAX_FRAME_DELTA_MS: f64 = 250.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceState {
    Uninitialized,
    Ready,
    Running,
    Paused,
    Disposed,
}

/// Pointer position in backing-store pixels, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MousePosition {
    pub x: f32,
    pub y: f32,
}

/// Frame counter plus a smoothed frames-per-second estimate.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameStats {
    pub frames: u64,
    pub fps: f64,
}

impl FrameStats {
    fn record(&mut self, delta_ms: f64) {
        if delta_ms > 0.0 {
            let instant = 1000.0 / delta_ms;
            self.fps = if self.frames == 0 {
                instant
            } else {
                self.fps * 0.9 + instant * 0.1
            };
        }
        self.frames += 1;
    }
}

struct ParticleLayer<C: GraphicsContext> {
    integrator: ParticleIntegrator,
    positions: C::Buffer,
    colors: C::Buffer,
}

/// A single full-screen-quad (or point-cloud) effect bound to one canvas.
///
/// Creating a surface compiles its program once; parameter changes only touch
/// uniform values. [`RenderSurface::dispose`] releases every GPU object and is
/// also run on drop.
pub struct RenderSurface<V: Canvas> {
    canvas: V,
    gl: V::Context,
    program: CompiledProgram<V::Context>,
    quad: Option<<V::Context as GraphicsContext>::Buffer>,
    particles: Option<ParticleLayer<V::Context>>,
    bus: ParameterBus,
    time_ms: f64,
    mouse: Option<MousePosition>,
    tracking: bool,
    size: (u32, u32),
    state: SurfaceState,
    stats: FrameStats,
}

impl<V: Canvas> RenderSurface<V> {
    /// Builds a full-screen-quad surface. Fails with `SurfaceInit` when the
    /// canvas has no context; compile and link errors are passed through.
    pub fn create(canvas: V, source: &ShaderSource, initial: &ParamsPatch) -> FxResult<Self> {
        let gl = canvas
            .acquire_context()
            .ok_or_else(|| FxError::surface_init("no WebGL2 context available"))?;
        let mut program = ShaderProgramBuilder::new(&gl).build(source)?;

        let Some(quad) = gl.create_buffer() else {
            program.destroy(&gl);
            return Err(FxError::surface_init("failed to create quad buffer"));
        };
        gl.upload_buffer(&quad, &QUAD_VERTICES, BufferUsage::Static);

        let mut surface = Self::assemble(canvas, gl, program, ParameterBus::with_patch(initial));
        surface.quad = Some(quad);
        surface.resize();
        log::debug!("fluid surface ready at {:?}", surface.size);
        Ok(surface)
    }

    /// Builds a point-cloud surface driven by a seeded [`ParticleIntegrator`].
    pub fn create_particles(
        canvas: V,
        source: &ShaderSource,
        initial: &ParamsPatch,
        seed: u64,
        distribution: Distribution,
    ) -> FxResult<Self> {
        let gl = canvas
            .acquire_context()
            .ok_or_else(|| FxError::surface_init("no WebGL2 context available"))?;
        let mut program = ShaderProgramBuilder::new(&gl).build(source)?;

        let (positions, colors) = match (gl.create_buffer(), gl.create_buffer()) {
            (Some(p), Some(c)) => (p, c),
            (p, c) => {
                for buffer in p.iter().chain(c.iter()) {
                    gl.delete_buffer(buffer);
                }
                program.destroy(&gl);
                return Err(FxError::surface_init("failed to create particle buffers"));
            }
        };

        let bus = ParameterBus::with_patch(initial);
        let params = bus.params();
        let mut integrator = ParticleIntegrator::new(seed, params.bounds);
        integrator.initialize(params.particle_count as usize, distribution, params.color_mode);

        let mut surface = Self::assemble(canvas, gl, program, bus);
        surface.particles = Some(ParticleLayer {
            integrator,
            positions,
            colors,
        });
        surface.resize();
        log::debug!("particle surface ready at {:?}", surface.size);
        Ok(surface)
    }

    fn assemble(
        canvas: V,
        gl: V::Context,
        program: CompiledProgram<V::Context>,
        bus: ParameterBus,
    ) -> Self {
        Self {
            canvas,
            gl,
            program,
            quad: None,
            particles: None,
            bus,
            time_ms: 0.0,
            mouse: None,
            tracking: false,
            size: (0, 0),
            state: SurfaceState::Ready,
            stats: FrameStats::default(),
        }
    }

    pub fn state(&self) -> SurfaceState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SurfaceState::Running
    }

    pub fn params(&self) -> &Params {
        self.bus.params()
    }

    pub fn time_ms(&self) -> f64 {
        self.time_ms
    }

    pub fn mouse(&self) -> Option<MousePosition> {
        self.mouse
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Backing-store size from the last [`RenderSurface::resize`].
    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn particles(&self) -> Option<&ParticleIntegrator> {
        self.particles.as_ref().map(|layer| &layer.integrator)
    }

    pub fn canvas(&self) -> &V {
        &self.canvas
    }

    /// Scheduler hook for `Running`/`Paused`. Ignored once disposed.
    pub(crate) fn set_running(&mut self, running: bool) {
        if self.state == SurfaceState::Disposed {
            return;
        }
        let next = if running {
            SurfaceState::Running
        } else if self.state == SurfaceState::Running {
            SurfaceState::Paused
        } else {
            self.state
        };
        if next != self.state {
            log::debug!("surface {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    /// Matches the backing store to the layout box times device pixel ratio.
    pub fn resize(&mut self) {
        if self.state == SurfaceState::Disposed {
            return;
        }
        let layout = self.canvas.layout_box();
        let dpr = self.canvas.device_pixel_ratio().max(0.0);
        let width = ((layout.width * dpr).round() as u32).max(1);
        let height = ((layout.height * dpr).round() as u32).max(1);
        if self.canvas.backing_size() != (width, height) {
            self.canvas.set_backing_size(width, height);
        }
        self.size = (width, height);
    }

    /// Merges `patch` into the current parameters. Returns whether anything changed.
    pub fn set_params(&mut self, patch: &ParamsPatch) -> bool {
        if self.state == SurfaceState::Disposed {
            return false;
        }
        let changed = self.bus.apply(patch);
        self.sync_particles();
        changed
    }

    /// Single-field form of [`RenderSurface::set_params`]; unknown names are ignored.
    pub fn set_param(&mut self, name: &str, value: f64) -> bool {
        if self.state == SurfaceState::Disposed {
            return false;
        }
        let changed = self.bus.set_named(name, value);
        self.sync_particles();
        changed
    }

    fn sync_particles(&mut self) {
        let dirty = self.bus.take_dirty();
        let params = self.bus.params();
        if let Some(layer) = self.particles.as_mut() {
            let integrator = &mut layer.integrator;
            if dirty.contains(ParamName::Bounds) {
                integrator.set_spread(params.bounds);
            }
            if dirty.contains(ParamName::ParticleCount) {
                integrator.recreate_with(params.particle_count as usize, params.color_mode);
            } else if dirty.contains(ParamName::ColorMode) {
                integrator.recolor(params.color_mode);
            }
        }
    }

    pub fn track_mouse(&mut self, enabled: bool) {
        if self.state == SurfaceState::Disposed {
            return;
        }
        self.tracking = enabled;
        self.canvas.listen_pointer(enabled);
        if !enabled {
            self.mouse = None;
        }
    }

    /// Records a pointer at client coordinates, converted to backing pixels.
    pub fn pointer_moved(&mut self, client_x: f64, client_y: f64) {
        if !self.tracking {
            return;
        }
        let layout = self.canvas.layout_box();
        let dpr = self.canvas.device_pixel_ratio();
        let (width, height) = self.canvas.backing_size();
        let scale_x = if layout.width > 0.0 { width as f64 / layout.width } else { dpr };
        let scale_y = if layout.height > 0.0 { height as f64 / layout.height } else { dpr };
        self.mouse = Some(MousePosition {
            x: ((client_x - layout.left) * scale_x) as f32,
            y: ((client_y - layout.top) * scale_y) as f32,
        });
    }

    pub fn pointer_left(&mut self) {
        self.mouse = None;
    }

    fn drain_pointer(&mut self) {
        match self.canvas.take_pointer() {
            Some(PointerSample::Move { client_x, client_y }) => self.pointer_moved(client_x, client_y),
            Some(PointerSample::Leave) => self.pointer_left(),
            None => {}
        }
    }

    /// Advances time by `delta_ms * speed`, uploads uniforms and draws once.
    /// Steps the particle layer first when there is one. No-op once disposed.
    pub fn render_frame(&mut self, delta_ms: f64) {
        if self.state == SurfaceState::Disposed {
            return;
        }
        let delta = if delta_ms.is_finite() {
            delta_ms.clamp(0.0, MAX_FRAME_DELTA_MS)
        } else {
            0.0
        };

        self.drain_pointer();
        self.resize();

        let params = self.bus.params();
        self.time_ms += delta * params.speed as f64;

        let gl = &self.gl;
        let program = &self.program;
        let (width, height) = self.size;
        gl.viewport(width, height);
        program.bind(gl);

        let (mouse, active) = match self.mouse {
            Some(m) => ([m.x, m.y], 1.0),
            None => ([0.0, 0.0], 0.0),
        };
        let uniforms = [
            ("u_time", UniformValue::Float((self.time_ms / 1000.0) as f32)),
            ("u_resolution", UniformValue::Vec2([width as f32, height as f32])),
            ("u_mouse", UniformValue::Vec2(mouse)),
            ("u_mouseActive", UniformValue::Float(active)),
            ("u_viscosity", UniformValue::Float(params.viscosity)),
            ("u_distortion", UniformValue::Float(params.distortion)),
            ("u_speed", UniformValue::Float(params.speed)),
            ("u_colorShift", UniformValue::Float(params.color_shift)),
            ("u_particleSize", UniformValue::Float(params.particle_size)),
            ("u_bounds", UniformValue::Float(params.bounds)),
        ];
        for (name, value) in uniforms {
            program.set(gl, name, value);
        }

        if let Some(layer) = self.particles.as_mut() {
            let dt_scale = (delta / FRAME_MS) as f32;
            layer.integrator.step(dt_scale, params.gravity, params.bounds);
            let snapshot = layer.integrator.snapshot();
            gl.upload_buffer(&layer.positions, snapshot.positions, BufferUsage::Dynamic);
            gl.upload_buffer(&layer.colors, snapshot.colors, BufferUsage::Dynamic);
            if let Some(loc) = program.attribute("a_position") {
                gl.bind_attribute(&layer.positions, loc, 3);
            }
            if let Some(loc) = program.attribute("a_color") {
                gl.bind_attribute(&layer.colors, loc, 3);
            }
            gl.clear([0.0, 0.0, 0.0, 0.0]);
            gl.draw(DrawMode::Points, snapshot.count as i32);
        } else if let Some(quad) = &self.quad {
            if let Some(loc) = program.attribute("a_position") {
                gl.bind_attribute(quad, loc, 2);
            }
            gl.draw(DrawMode::TriangleStrip, 4);
        }

        self.stats.record(delta);
    }

    /// Releases GPU objects and pointer listeners. Idempotent.
    pub fn dispose(&mut self) {
        if self.state == SurfaceState::Disposed {
            return;
        }
        self.program.destroy(&self.gl);
        if let Some(quad) = self.quad.take() {
            self.gl.delete_buffer(&quad);
        }
        if let Some(layer) = self.particles.take() {
            self.gl.delete_buffer(&layer.positions);
            self.gl.delete_buffer(&layer.colors);
        }
        self.canvas.listen_pointer(false);
        self.tracking = false;
        self.mouse = None;
        self.state = SurfaceState::Disposed;
        log::debug!("surface disposed after {} frames", self.stats.frames);
    }
}

impl<V: Canvas> Drop for RenderSurface<V> {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{HeadlessCanvas, LayoutBox};
    use crate::particles::ColorMode;
    use crate::shaders;

    fn fluid(canvas: &HeadlessCanvas) -> RenderSurface<HeadlessCanvas> {
        RenderSurface::create(canvas.clone(), &shaders::fluid(), &ParamsPatch::new()).unwrap()
    }

    #[test]
    fn resize_scales_by_device_pixel_ratio() {
        let canvas = HeadlessCanvas::new(400.0, 300.0, 2.0);
        let mut surface = fluid(&canvas);
        assert_eq!(surface.size(), (800, 600));
        assert_eq!(canvas.backing_size(), (800, 600));
        canvas.set_device_pixel_ratio(1.5);
        surface.resize();
        surface.resize();
        assert_eq!(canvas.backing_size(), (600, 450));
    }

    #[test]
    fn render_frame_advances_time_by_speed() {
        let canvas = HeadlessCanvas::new(100.0, 100.0, 1.0);
        let gl = canvas.context().unwrap();
        let mut surface = fluid(&canvas);
        surface.set_param("speed", 2.0);
        surface.render_frame(16.0);
        surface.render_frame(16.0);
        assert_eq!(surface.time_ms(), 64.0);
        assert_eq!(gl.uniform_f32("u_time"), Some(0.064));
        assert_eq!(gl.uniform("u_resolution"), Some(UniformValue::Vec2([100.0, 100.0])));
        assert_eq!(gl.draws(), vec![(DrawMode::TriangleStrip, 4); 2]);
        assert_eq!(surface.stats().frames, 2);
    }

    #[test]
    fn huge_or_invalid_deltas_are_clamped() {
        let canvas = HeadlessCanvas::new(10.0, 10.0, 1.0);
        let mut surface = fluid(&canvas);
        surface.render_frame(10_000.0);
        assert_eq!(surface.time_ms(), MAX_FRAME_DELTA_MS);
        surface.render_frame(f64::NAN);
        surface.render_frame(-5.0);
        assert_eq!(surface.time_ms(), MAX_FRAME_DELTA_MS);
    }

    #[test]
    fn set_params_only_updates_state() {
        let canvas = HeadlessCanvas::new(10.0, 10.0, 1.0);
        let gl = canvas.context().unwrap();
        let mut surface = fluid(&canvas);
        assert!(surface.set_params(&ParamsPatch::new().with(ParamName::Distortion, 1.25)));
        assert_eq!(gl.draw_count(), 0);
        assert_eq!(surface.params().distortion, 1.25);
        surface.render_frame(16.0);
        assert_eq!(gl.uniform_f32("u_distortion"), Some(1.25));
    }

    #[test]
    fn mouse_maps_to_backing_pixels_and_clears_on_leave() {
        let canvas = HeadlessCanvas::new(200.0, 100.0, 2.0);
        canvas.set_layout(LayoutBox {
            left: 50.0,
            top: 20.0,
            width: 200.0,
            height: 100.0,
        });
        let gl = canvas.context().unwrap();
        let mut surface = fluid(&canvas);

        canvas.dispatch_pointer(PointerSample::Move {
            client_x: 60.0,
            client_y: 30.0,
        });
        surface.render_frame(16.0);
        assert_eq!(surface.mouse(), None);

        surface.track_mouse(true);
        canvas.dispatch_pointer(PointerSample::Move {
            client_x: 60.0,
            client_y: 30.0,
        });
        surface.render_frame(16.0);
        assert_eq!(surface.mouse(), Some(MousePosition { x: 20.0, y: 20.0 }));
        assert_eq!(gl.uniform("u_mouse"), Some(UniformValue::Vec2([20.0, 20.0])));
        assert_eq!(gl.uniform_f32("u_mouseActive"), Some(1.0));

        canvas.dispatch_pointer(PointerSample::Leave);
        surface.render_frame(16.0);
        assert_eq!(surface.mouse(), None);
        assert_eq!(gl.uniform("u_mouse"), Some(UniformValue::Vec2([0.0, 0.0])));
        assert_eq!(gl.uniform_f32("u_mouseActive"), Some(0.0));
    }

    #[test]
    fn dispose_is_idempotent_and_terminal() {
        let canvas = HeadlessCanvas::new(10.0, 10.0, 1.0);
        let gl = canvas.context().unwrap();
        let mut surface = fluid(&canvas);
        surface.track_mouse(true);
        assert_eq!(gl.live().programs, 1);
        assert_eq!(gl.live().buffers, 1);

        surface.dispose();
        surface.dispose();
        assert_eq!(surface.state(), SurfaceState::Disposed);
        assert_eq!(gl.live().total(), 0);
        assert!(!canvas.is_listening());

        surface.set_running(true);
        surface.render_frame(16.0);
        assert_eq!(surface.state(), SurfaceState::Disposed);
        assert_eq!(gl.draw_count(), 0);
    }

    #[test]
    fn missing_context_is_surface_init_error() {
        let canvas = HeadlessCanvas::without_context(10.0, 10.0);
        let err = RenderSurface::create(canvas, &shaders::fluid(), &ParamsPatch::new())
            .err()
            .unwrap();
        assert!(matches!(err, FxError::SurfaceInit(_)));
    }

    #[test]
    fn particle_surface_steps_and_uploads() {
        let canvas = HeadlessCanvas::new(100.0, 100.0, 1.0);
        let gl = canvas.context().unwrap();
        let initial = ParamsPatch::new()
            .with(ParamName::ParticleCount, 256.0)
            .with(ParamName::Gravity, 0.0);
        let mut surface = RenderSurface::create_particles(
            canvas.clone(),
            &shaders::particles(),
            &initial,
            7,
            Distribution::Spherical,
        )
        .unwrap();
        let before = surface.particles().unwrap().position(0);
        surface.render_frame(FRAME_MS);
        let after = surface.particles().unwrap().position(0);
        assert_ne!(before, after);
        assert_eq!(gl.draws(), vec![(DrawMode::Points, 256)]);
        assert_eq!(gl.buffer_lengths(), vec![768, 768]);

        surface.set_param("particleCount", 1000.0);
        assert_eq!(surface.particles().unwrap().count(), 1024);
        surface.set_param("colorMode", 2.0);
        assert_eq!(surface.particles().unwrap().color_mode(), ColorMode::Solid);
        assert_eq!(surface.particles().unwrap().count(), 1024);
    }

    fn particle_surface(count: f64) -> RenderSurface<HeadlessCanvas> {
        let canvas = HeadlessCanvas::new(100.0, 100.0, 1.0);
        let initial = ParamsPatch::new()
            .with(ParamName::ParticleCount, count)
            .with(ParamName::Bounds, 10.0);
        RenderSurface::create_particles(
            canvas,
            &shaders::particles(),
            &initial,
            3,
            Distribution::UniformCube,
        )
        .unwrap()
    }

    #[test]
    fn one_patch_resizes_and_recolors_the_cloud() {
        let mut surface = particle_surface(1024.0);
        let patch = ParamsPatch::from_json(r#"{"particleCount": 256, "colorMode": 2}"#).unwrap();
        assert!(surface.set_params(&patch));

        let particles = surface.particles().unwrap();
        assert_eq!(particles.count(), 256);
        assert_eq!(particles.color_mode(), ColorMode::Solid);
        let solid = ColorMode::Solid.color_at(0.0);
        let snapshot = particles.snapshot();
        assert!(snapshot.colors.chunks_exact(3).all(|c| c == &solid[..]));
    }

    #[test]
    fn bounds_change_widens_the_next_cloud() {
        let mut surface = particle_surface(1024.0);
        let extent = |s: &RenderSurface<HeadlessCanvas>| {
            s.particles()
                .unwrap()
                .snapshot()
                .positions
                .iter()
                .fold(0.0f32, |m, p| m.max(p.abs()))
        };
        assert!(extent(&surface) <= 10.0);

        let patch = ParamsPatch::new()
            .with(ParamName::Bounds, 100.0)
            .with(ParamName::ParticleCount, 2048.0);
        surface.set_params(&patch);
        assert_eq!(surface.particles().unwrap().count(), 2048);
        assert!(extent(&surface) > 50.0);
    }
}
