//! Visibility-driven start/stop and the session's surface registry.

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::canvas::Canvas;
use crate::scheduler::{FrameHost, RenderScheduler, SharedSurface};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SurfaceId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateMode {
    /// Runs while at least `threshold` of the canvas is on screen.
    Gated { threshold: f64 },
    /// Runs for as long as it is mounted (hero backgrounds).
    AlwaysOn,
}

struct Entry<V: Canvas> {
    surface: SharedSurface<V>,
    mode: GateMode,
    visible: bool,
}

/// Owns the scheduler and every mounted surface of one page session.
///
/// Only gated surfaces that are on screen, plus always-on ones, have a
/// running loop. The registry is append/remove only.
pub struct VisibilityGate<H: FrameHost, V: Canvas> {
    scheduler: RenderScheduler<H>,
    entries: BTreeMap<SurfaceId, Entry<V>>,
    next_id: u32,
}

impl<H, V> VisibilityGate<H, V>
where
    H: FrameHost + 'static,
    V: Canvas + 'static,
{
    pub fn new(host: Rc<H>) -> Self {
        Self {
            scheduler: RenderScheduler::new(host),
            entries: BTreeMap::new(),
            next_id: 0,
        }
    }

    pub fn scheduler(&self) -> &RenderScheduler<H> {
        &self.scheduler
    }

    fn register(&mut self, surface: SharedSurface<V>, mode: GateMode) -> SurfaceId {
        let id = SurfaceId(self.next_id);
        self.next_id += 1;
        self.entries.insert(
            id,
            Entry {
                surface,
                mode,
                visible: false,
            },
        );
        id
    }

    /// Registers a gated surface. It stays idle until reported visible.
    pub fn observe(&mut self, surface: SharedSurface<V>, threshold: f64) -> SurfaceId {
        let threshold = if threshold.is_finite() {
            threshold.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let id = self.register(surface, GateMode::Gated { threshold });
        log::debug!("observing surface {id:?} at threshold {threshold}");
        id
    }

    /// Registers a surface that bypasses the gate and starts it right away.
    pub fn mount_always_on(&mut self, surface: SharedSurface<V>) -> SurfaceId {
        self.scheduler.start(&surface);
        let id = self.register(surface, GateMode::AlwaysOn);
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.visible = true;
        }
        id
    }

    /// Feeds an intersection ratio from the viewport observer. Starts or
    /// stops the loop on transitions only. Returns the new visibility, or
    /// `None` for unknown ids.
    pub fn on_visibility(&mut self, id: SurfaceId, ratio: f64) -> Option<bool> {
        let entry = self.entries.get_mut(&id)?;
        let threshold = match entry.mode {
            GateMode::AlwaysOn => return Some(true),
            GateMode::Gated { threshold } => threshold,
        };
        let visible = ratio > 0.0 && ratio >= threshold;
        if visible != entry.visible {
            entry.visible = visible;
            if visible {
                self.scheduler.start(&entry.surface);
            } else {
                self.scheduler.stop(&entry.surface);
            }
            log::debug!("surface {id:?} visible={visible}");
        }
        Some(visible)
    }

    /// Stops the surface and drops it from the registry, handing it back.
    pub fn unobserve(&mut self, id: SurfaceId) -> Option<SharedSurface<V>> {
        let entry = self.entries.remove(&id)?;
        self.scheduler.stop(&entry.surface);
        Some(entry.surface)
    }

    /// Stops, disposes and forgets the surface.
    pub fn teardown(&mut self, id: SurfaceId) -> bool {
        match self.unobserve(id) {
            Some(surface) => {
                if let Ok(mut s) = surface.try_borrow_mut() {
                    s.dispose();
                }
                true
            }
            None => false,
        }
    }

    /// Tears down every mounted surface. Returns how many were removed.
    pub fn teardown_all(&mut self) -> usize {
        let ids: Vec<_> = self.entries.keys().copied().collect();
        ids.into_iter().filter(|&id| self.teardown(id)).count()
    }

    pub fn surface(&self, id: SurfaceId) -> Option<&SharedSurface<V>> {
        self.entries.get(&id).map(|entry| &entry.surface)
    }

    pub fn mode(&self, id: SurfaceId) -> Option<GateMode> {
        self.entries.get(&id).map(|entry| entry.mode)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn running_count(&self) -> usize {
        self.entries
            .values()
            .filter(|entry| self.scheduler.is_running(&entry.surface))
            .count()
    }

    /// Sum of the smoothed FPS of every running surface, for debug overlays.
    pub fn aggregate_fps(&self) -> f64 {
        self.entries
            .values()
            .filter(|entry| self.scheduler.is_running(&entry.surface))
            .filter_map(|entry| entry.surface.try_borrow().ok().map(|s| s.stats().fps))
            .sum()
    }
}
