use std::cell::RefCell;
use std::rc::Rc;

use demo_fx::gl::DrawMode;
use demo_fx::{
    FxError, HeadlessCanvas, ManualFrameHost, ParamName, ParamsPatch, RenderScheduler,
    RenderSurface, ShaderSource, ShaderStage, SurfaceState, VisibilityGate,
};

fn fluid_source() -> ShaderSource {
    demo_fx::shaders::fluid()
}

#[test]
fn dispose_then_recreate_on_same_canvas_leaves_no_residue() {
    let canvas = HeadlessCanvas::new(320.0, 180.0, 2.0);
    let gl = canvas.context().expect("headless context");

    let mut first = RenderSurface::create(canvas.clone(), &fluid_source(), &ParamsPatch::new())
        .expect("first surface");
    first.render_frame(16.0);
    let with_one = gl.live();
    first.dispose();
    assert_eq!(gl.live().total(), 0);

    let second = RenderSurface::create(canvas.clone(), &fluid_source(), &ParamsPatch::new())
        .expect("second surface");
    assert_eq!(second.state(), SurfaceState::Ready);
    assert_eq!(gl.live(), with_one);
    assert_eq!(second.time_ms(), 0.0);
    drop(second);
    assert_eq!(gl.live().total(), 0);
}

#[test]
fn compile_failure_is_local_to_one_surface() {
    let good = HeadlessCanvas::new(100.0, 100.0, 1.0);
    let bad = HeadlessCanvas::new(100.0, 100.0, 1.0);
    let bad_gl = bad.context().unwrap();
    bad_gl.fail_compile(ShaderStage::Vertex, "ERROR: 0:2: 'in' : syntax error");

    let err = RenderSurface::create(bad, &fluid_source(), &ParamsPatch::new())
        .err()
        .expect("vertex stage must fail");
    match &err {
        FxError::ShaderCompile { stage, log } => {
            assert_eq!(*stage, ShaderStage::Vertex);
            assert!(log.contains("syntax error"));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(err.is_fatal());
    assert_eq!(bad_gl.live().total(), 0);

    let mut surface = RenderSurface::create(good.clone(), &fluid_source(), &ParamsPatch::new())
        .expect("other surface unaffected");
    surface.render_frame(16.0);
    assert_eq!(good.context().unwrap().draw_count(), 1);
}

#[test]
fn link_failure_surfaces_from_create() {
    let canvas = HeadlessCanvas::new(50.0, 50.0, 1.0);
    let gl = canvas.context().unwrap();
    gl.fail_link("Varyings must match");
    let err = RenderSurface::create(canvas, &fluid_source(), &ParamsPatch::new())
        .err()
        .unwrap();
    assert_eq!(
        err,
        FxError::ProgramLink {
            log: "Varyings must match".into()
        }
    );
    assert_eq!(gl.live().total(), 0);
}

#[test]
fn params_flow_from_bus_to_uniforms_through_the_loop() {
    let host = Rc::new(ManualFrameHost::new());
    let scheduler = RenderScheduler::new(host.clone());
    let canvas = HeadlessCanvas::new(200.0, 100.0, 1.0);
    let gl = canvas.context().unwrap();
    let initial = ParamsPatch::from_json(r#"{"viscosity": 0.25, "speed": 0.5}"#).unwrap();
    let surface = Rc::new(RefCell::new(
        RenderSurface::create(canvas, &fluid_source(), &initial).unwrap(),
    ));

    scheduler.start(&surface);
    host.advance(20.0);
    assert_eq!(gl.uniform_f32("u_viscosity"), Some(0.25));
    assert_eq!(gl.uniform_f32("u_time"), Some(0.01));

    surface
        .borrow_mut()
        .set_params(&ParamsPatch::new().with(ParamName::Viscosity, 7.0));
    host.advance(20.0);
    assert_eq!(gl.uniform_f32("u_viscosity"), Some(1.0));
    assert_eq!(gl.draws(), vec![(DrawMode::TriangleStrip, 4); 2]);

    scheduler.stop(&surface);
    host.advance(20.0);
    assert_eq!(gl.draw_count(), 2);
}

#[test]
fn gate_bounds_running_surfaces_to_visible_ones() {
    let host = Rc::new(ManualFrameHost::new());
    let mut gate = VisibilityGate::new(host.clone());
    let contexts: Vec<_> = (0..3)
        .map(|_| HeadlessCanvas::new(64.0, 64.0, 1.0))
        .collect();
    let ids: Vec<_> = contexts
        .iter()
        .map(|canvas| {
            let surface =
                RenderSurface::create(canvas.clone(), &fluid_source(), &ParamsPatch::new())
                    .unwrap();
            gate.observe(Rc::new(RefCell::new(surface)), 0.5)
        })
        .collect();

    gate.on_visibility(ids[0], 1.0);
    for _ in 0..5 {
        host.advance(16.0);
    }
    gate.on_visibility(ids[0], 0.2);
    gate.on_visibility(ids[2], 0.6);
    for _ in 0..3 {
        host.advance(16.0);
    }

    let draws: Vec<_> = contexts
        .iter()
        .map(|c| c.context().unwrap().draw_count())
        .collect();
    assert_eq!(draws, vec![5, 0, 3]);
    assert_eq!(gate.running_count(), 1);
}

#[test]
fn particle_loop_recreates_on_count_change() {
    let host = Rc::new(ManualFrameHost::new());
    let scheduler = RenderScheduler::new(host.clone());
    let canvas = HeadlessCanvas::new(100.0, 100.0, 1.0);
    let gl = canvas.context().unwrap();
    let surface = RenderSurface::create_particles(
        canvas,
        &demo_fx::shaders::particles(),
        &ParamsPatch::new().with(ParamName::ParticleCount, 128.0),
        99,
        demo_fx::Distribution::UniformCube,
    )
    .unwrap();
    let surface = Rc::new(RefCell::new(surface));
    scheduler.start(&surface);
    host.advance(16.0);
    surface.borrow_mut().set_param("particleCount", 512.0);
    host.advance(16.0);

    assert_eq!(gl.draws(), vec![(DrawMode::Points, 128), (DrawMode::Points, 512)]);
    assert_eq!(gl.buffer_lengths(), vec![1536, 1536]);
}
