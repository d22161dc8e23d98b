//! Per-surface frame loops on top of the host's frame-callback queue.
//!
//! Each running surface owns one [`FrameTask`]: a handle holding the running
//! flag and the id of the one outstanding frame request. A frame callback
//! renders, then asks for the next frame only if the task is still running,
//! so a surface never has two callbacks queued and never re-enters
//! `render_frame`.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use crate::canvas::Canvas;
use crate::surface::{RenderSurface, SurfaceState};

pub type SharedSurface<V> = Rc<RefCell<RenderSurface<V>>>;

/// Callback handed to the host; receives the frame timestamp in ms.
pub type FrameCallback = Box<dyn FnOnce(f64)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameRequestId(pub i32);

/// The host's frame pacing (`requestAnimationFrame` in a browser).
pub trait FrameHost {
    /// Current time in ms on the same clock frame timestamps use.
    fn now(&self) -> f64;
    /// Queues `callback` for the next frame. `None` if the host refused.
    fn request_frame(&self, callback: FrameCallback) -> Option<FrameRequestId>;
    fn cancel_frame(&self, id: FrameRequestId);
}

/// Cancellable handle for one surface's frame loop.
#[derive(Debug)]
pub struct FrameTask {
    running: Cell<bool>,
    pending: Cell<Option<FrameRequestId>>,
    last: Cell<f64>,
}

impl FrameTask {
    fn new(baseline: f64) -> Self {
        Self {
            running: Cell::new(true),
            pending: Cell::new(None),
            last: Cell::new(baseline),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.get()
    }

    /// The queued frame request, if one is outstanding.
    pub fn pending(&self) -> Option<FrameRequestId> {
        self.pending.get()
    }

    /// Clears the running flag and cancels the outstanding request.
    pub fn cancel(&self, host: &impl FrameHost) {
        self.running.set(false);
        if let Some(id) = self.pending.take() {
            host.cancel_frame(id);
        }
    }
}

fn key_of<V: Canvas>(surface: &SharedSurface<V>) -> usize {
    Rc::as_ptr(surface) as *const () as usize
}

/// Starts and stops surface loops. At most one loop per surface.
pub struct RenderScheduler<H: FrameHost> {
    host: Rc<H>,
    tasks: RefCell<HashMap<usize, Rc<FrameTask>>>,
}

impl<H: FrameHost + 'static> RenderScheduler<H> {
    pub fn new(host: Rc<H>) -> Self {
        Self {
            host,
            tasks: RefCell::new(HashMap::new()),
        }
    }

    pub fn host(&self) -> &Rc<H> {
        &self.host
    }

    /// Starts the loop for `surface`, or returns the live task if one exists.
    /// Disposed surfaces are not started.
    pub fn start<V: Canvas + 'static>(&self, surface: &SharedSurface<V>) -> Rc<FrameTask> {
        let key = key_of(surface);
        if let Some(task) = self.tasks.borrow().get(&key) {
            if task.is_running() {
                return task.clone();
            }
        }
        self.prune();

        let task = Rc::new(FrameTask::new(self.host.now()));
        match surface.try_borrow_mut() {
            Ok(mut s) if s.state() != SurfaceState::Disposed => s.set_running(true),
            Ok(_) => {
                log::debug!("not starting a disposed surface");
                task.running.set(false);
                return task;
            }
            Err(_) => {
                log::warn!("surface busy; start ignored");
                task.running.set(false);
                return task;
            }
        }

        schedule(&self.host, surface.clone(), task.clone());
        self.tasks.borrow_mut().insert(key, task.clone());
        task
    }

    /// Stops the loop for `surface`. Idempotent. When the surface is borrowed
    /// (a stop issued mid-frame), the in-flight callback settles its state and
    /// nothing is rescheduled.
    pub fn stop<V: Canvas>(&self, surface: &SharedSurface<V>) {
        let task = self.tasks.borrow_mut().remove(&key_of(surface));
        match surface.try_borrow_mut() {
            Ok(mut s) => {
                if let Some(task) = task {
                    task.cancel(self.host.as_ref());
                }
                s.set_running(false);
            }
            Err(_) => {
                if let Some(task) = task {
                    task.running.set(false);
                }
            }
        }
    }

    pub fn is_running<V: Canvas>(&self, surface: &SharedSurface<V>) -> bool {
        self.tasks
            .borrow()
            .get(&key_of(surface))
            .is_some_and(|task| task.is_running())
    }

    /// Loops currently running across all surfaces.
    pub fn active_loops(&self) -> usize {
        self.prune();
        self.tasks.borrow().len()
    }

    /// Forgets tasks whose loop ended on its own (surface disposed, host refused).
    fn prune(&self) {
        self.tasks.borrow_mut().retain(|_, task| task.is_running());
    }
}

fn schedule<H, V>(host: &Rc<H>, surface: SharedSurface<V>, task: Rc<FrameTask>)
where
    H: FrameHost + 'static,
    V: Canvas + 'static,
{
    let next_host = host.clone();
    let next_task = task.clone();
    let request = host.request_frame(Box::new(move |now| {
        tick(&next_host, surface, next_task, now);
    }));
    match request {
        Some(id) => task.pending.set(Some(id)),
        None => {
            log::error!("host refused a frame request; loop stopped");
            task.running.set(false);
        }
    }
}

fn tick<H, V>(host: &Rc<H>, surface: SharedSurface<V>, task: Rc<FrameTask>, now: f64)
where
    H: FrameHost + 'static,
    V: Canvas + 'static,
{
    task.pending.set(None);
    if !task.is_running() {
        if let Ok(mut s) = surface.try_borrow_mut() {
            s.set_running(false);
        }
        return;
    }
    let delta = (now - task.last.get()).max(0.0);
    task.last.set(now);

    {
        let Ok(mut s) = surface.try_borrow_mut() else {
            log::warn!("surface busy at frame time; skipping frame");
            schedule(host, surface.clone(), task);
            return;
        };
        // A stale callback from an earlier stop may have paused the surface.
        s.set_running(true);
        s.render_frame(delta);
        if s.state() == SurfaceState::Disposed {
            task.running.set(false);
            return;
        }
        if !task.is_running() {
            s.set_running(false);
            return;
        }
    }
    schedule(host, surface, task);
}

/// Frame host that only fires frames when told to. For tests and offline runs.
#[derive(Default)]
pub struct ManualFrameHost {
    now: Cell<f64>,
    next_id: Cell<i32>,
    queue: RefCell<Vec<(FrameRequestId, FrameCallback)>>,
}

impl ManualFrameHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances the clock by `dt_ms` and runs every callback queued before
    /// this call. Returns how many ran.
    pub fn advance(&self, dt_ms: f64) -> usize {
        self.now.set(self.now.get() + dt_ms);
        let due = std::mem::take(&mut *self.queue.borrow_mut());
        let ran = due.len();
        let now = self.now.get();
        for (_, callback) in due {
            callback(now);
        }
        ran
    }

    /// Outstanding frame requests.
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }
}

impl FrameHost for ManualFrameHost {
    fn now(&self) -> f64 {
        self.now.get()
    }

    fn request_frame(&self, callback: FrameCallback) -> Option<FrameRequestId> {
        let id = FrameRequestId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.queue.borrow_mut().push((id, callback));
        Some(id)
    }

    fn cancel_frame(&self, id: FrameRequestId) {
        self.queue.borrow_mut().retain(|(queued, _)| *queued != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::HeadlessCanvas;
    use crate::params::ParamsPatch;
    use crate::shaders;

    type Fixture = (
        Rc<ManualFrameHost>,
        RenderScheduler<ManualFrameHost>,
        SharedSurface<HeadlessCanvas>,
    );

    fn setup() -> Fixture {
        let host = Rc::new(ManualFrameHost::new());
        let scheduler = RenderScheduler::new(host.clone());
        let canvas = HeadlessCanvas::new(64.0, 64.0, 1.0);
        let surface =
            RenderSurface::create(canvas, &shaders::fluid(), &ParamsPatch::new()).unwrap();
        (host, scheduler, Rc::new(RefCell::new(surface)))
    }

    #[test]
    fn double_start_keeps_one_loop() {
        let (host, scheduler, surface) = setup();
        let a = scheduler.start(&surface);
        let b = scheduler.start(&surface);
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(host.pending(), 1);

        for _ in 0..10 {
            assert_eq!(host.advance(16.0), 1);
        }
        let s = surface.borrow();
        assert_eq!(s.stats().frames, 10);
        assert_eq!(s.time_ms(), 160.0);
        assert_eq!(s.state(), SurfaceState::Running);
    }

    #[test]
    fn stop_cancels_pending_frame() {
        let (host, scheduler, surface) = setup();
        let task = scheduler.start(&surface);
        host.advance(16.0);
        scheduler.stop(&surface);
        scheduler.stop(&surface);
        assert!(!task.is_running());
        assert_eq!(task.pending(), None);
        assert_eq!(host.pending(), 0);
        assert_eq!(surface.borrow().state(), SurfaceState::Paused);
        assert_eq!(host.advance(16.0), 0);
        assert_eq!(surface.borrow().stats().frames, 1);
    }

    #[test]
    fn restart_uses_fresh_baseline() {
        let (host, scheduler, surface) = setup();
        scheduler.start(&surface);
        host.advance(16.0);
        scheduler.stop(&surface);
        host.advance(5000.0);
        scheduler.start(&surface);
        host.advance(20.0);
        assert_eq!(surface.borrow().time_ms(), 36.0);
        assert_eq!(scheduler.active_loops(), 1);
    }

    #[test]
    fn stop_while_borrowed_settles_on_next_callback() {
        let (host, scheduler, surface) = setup();
        scheduler.start(&surface);
        let guard = surface.borrow_mut();
        scheduler.stop(&surface);
        drop(guard);
        assert!(!scheduler.is_running(&surface));
        assert_eq!(host.advance(16.0), 1);
        assert_eq!(host.pending(), 0);
        let s = surface.borrow();
        assert_eq!(s.state(), SurfaceState::Paused);
        assert_eq!(s.stats().frames, 0);
    }

    #[test]
    fn disposed_surface_ends_its_loop() {
        let (host, scheduler, surface) = setup();
        scheduler.start(&surface);
        surface.borrow_mut().dispose();
        assert_eq!(host.advance(16.0), 1);
        assert_eq!(host.pending(), 0);
        assert!(!scheduler.is_running(&surface));
        assert!(!scheduler.start(&surface).is_running());
    }

    #[test]
    fn ended_loops_are_forgotten() {
        let (host, scheduler, surface) = setup();
        scheduler.start(&surface);
        let canvas = HeadlessCanvas::new(8.0, 8.0, 1.0);
        let other = RenderSurface::create(canvas, &shaders::fluid(), &ParamsPatch::new()).unwrap();
        let other = Rc::new(RefCell::new(other));
        scheduler.start(&other);
        assert_eq!(scheduler.tasks.borrow().len(), 2);

        surface.borrow_mut().dispose();
        host.advance(16.0);
        assert_eq!(scheduler.tasks.borrow().len(), 2);
        assert_eq!(scheduler.active_loops(), 1);
        assert_eq!(scheduler.tasks.borrow().len(), 1);
        assert!(scheduler.is_running(&other));
    }
}
