//! CPU particle integrator.
//!
//! Stands in for a compute-shader pass: positions, velocities and colors live
//! in three flat `xyz` arrays that are uploaded as dynamic vertex buffers every
//! frame.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Velocity kept (and inverted) on each boundary hit.
pub const RESTITUTION: f32 = 0.8;

/// Upper bound of the random initial speed per axis.
const INITIAL_SPEED: f32 = 0.05;

const GRADIENT_START: [f32; 3] = [0.2, 0.4, 1.0];
const GRADIENT_END: [f32; 3] = [1.0, 0.3, 0.6];
const SOLID: [f32; 3] = [0.4, 0.8, 1.0];

/// Initial placement of a fresh particle cloud.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distribution {
    UniformCube,
    Spherical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    Rainbow,
    Gradient,
    Solid,
}

impl ColorMode {
    pub fn index(self) -> u32 {
        match self {
            ColorMode::Rainbow => 0,
            ColorMode::Gradient => 1,
            ColorMode::Solid => 2,
        }
    }

    /// Out-of-range indices fall back to the last variant.
    pub fn from_index(index: u32) -> Self {
        match index {
            0 => ColorMode::Rainbow,
            1 => ColorMode::Gradient,
            _ => ColorMode::Solid,
        }
    }

    /// Color of the particle at normalized index `t` in `[0, 1)`.
    pub fn color_at(self, t: f32) -> [f32; 3] {
        match self {
            ColorMode::Rainbow => hsl_to_rgb(t, 1.0, 0.5),
            ColorMode::Gradient => {
                let mut rgb = [0.0; 3];
                for (c, (a, b)) in rgb.iter_mut().zip(GRADIENT_START.iter().zip(GRADIENT_END)) {
                    *c = a + (b - a) * t;
                }
                rgb
            }
            ColorMode::Solid => SOLID,
        }
    }
}

fn hsl_to_rgb(h: f32, s: f32, l: f32) -> [f32; 3] {
    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    let channel = |mut t: f32| {
        t = t.rem_euclid(1.0);
        if t < 1.0 / 6.0 {
            p + (q - p) * 6.0 * t
        } else if t < 0.5 {
            q
        } else if t < 2.0 / 3.0 {
            p + (q - p) * (2.0 / 3.0 - t) * 6.0
        } else {
            p
        }
    };
    [channel(h + 1.0 / 3.0), channel(h), channel(h - 1.0 / 3.0)]
}

/// Borrowed view of the live arrays for upload.
#[derive(Debug, Clone, Copy)]
pub struct ParticleSnapshot<'a> {
    pub positions: &'a [f32],
    pub colors: &'a [f32],
    pub count: usize,
}

/// Owns the particle arrays and advances them.
///
/// All three arrays always hold exactly `3 * count` floats. The count only
/// changes through [`ParticleIntegrator::recreate`], which throws the old
/// cloud away and seeds a new one.
pub struct ParticleIntegrator {
    positions: Vec<f32>,
    velocities: Vec<f32>,
    colors: Vec<f32>,
    count: usize,
    distribution: Distribution,
    color_mode: ColorMode,
    spread: f32,
    rng: ChaCha8Rng,
}

impl ParticleIntegrator {
    /// Empty integrator. `spread` is the half-extent the initial cloud fills.
    pub fn new(seed: u64, spread: f32) -> Self {
        Self {
            positions: Vec::new(),
            velocities: Vec::new(),
            colors: Vec::new(),
            count: 0,
            distribution: Distribution::UniformCube,
            color_mode: ColorMode::Rainbow,
            spread: spread.max(0.0),
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn initialize(&mut self, count: usize, distribution: Distribution, color_mode: ColorMode) {
        self.distribution = distribution;
        self.color_mode = color_mode;
        self.recreate(count);
    }

    /// Half-extent used by the next [`ParticleIntegrator::recreate`].
    pub fn set_spread(&mut self, spread: f32) {
        self.spread = spread.max(0.0);
    }

    pub fn spread(&self) -> f32 {
        self.spread
    }

    /// [`ParticleIntegrator::recreate`] with a new color mode for the fresh cloud.
    pub fn recreate_with(&mut self, count: usize, color_mode: ColorMode) {
        self.color_mode = color_mode;
        self.recreate(count);
    }

    /// Reallocates all arrays for `count` particles. Prior state is discarded.
    pub fn recreate(&mut self, count: usize) {
        self.count = count;
        self.positions = vec![0.0; count * 3];
        self.velocities = vec![0.0; count * 3];
        self.colors = vec![0.0; count * 3];

        for (p, v) in self
            .positions
            .chunks_exact_mut(3)
            .zip(self.velocities.chunks_exact_mut(3))
        {
            let point = match self.distribution {
                Distribution::UniformCube => [
                    self.rng.gen_range(-1.0..=1.0f32) * self.spread,
                    self.rng.gen_range(-1.0..=1.0f32) * self.spread,
                    self.rng.gen_range(-1.0..=1.0f32) * self.spread,
                ],
                Distribution::Spherical => {
                    let r = self.spread * self.rng.gen_range(0.0..=1.0f32).cbrt();
                    let theta = self.rng.gen_range(0.0..std::f32::consts::TAU);
                    let phi = self.rng.gen_range(-1.0..=1.0f32).acos();
                    [
                        r * phi.sin() * theta.cos(),
                        r * phi.sin() * theta.sin(),
                        r * phi.cos(),
                    ]
                }
            };
            p.copy_from_slice(&point);
            for axis in v.iter_mut() {
                *axis = self.rng.gen_range(-1.0..=1.0f32) * INITIAL_SPEED;
            }
        }
        self.recolor(self.color_mode);
        log::debug!("particle cloud recreated with {count} particles");
    }

    /// Rewrites colors in place for `mode`.
    pub fn recolor(&mut self, mode: ColorMode) {
        self.color_mode = mode;
        let n = self.count.max(1) as f32;
        for (i, c) in self.colors.chunks_exact_mut(3).enumerate() {
            c.copy_from_slice(&mode.color_at(i as f32 / n));
        }
    }

    /// Advances every particle by `dt_scale` frames under `gravity`, reflecting
    /// off the cube `[-bounds, bounds]^3`. No allocation.
    pub fn step(&mut self, dt_scale: f32, gravity: f32, bounds: f32) {
        for (p, v) in self
            .positions
            .chunks_exact_mut(3)
            .zip(self.velocities.chunks_exact_mut(3))
        {
            v[1] += gravity * dt_scale;
            for axis in 0..3 {
                p[axis] += v[axis] * dt_scale;
                if p[axis].abs() > bounds {
                    p[axis] = bounds.copysign(p[axis]);
                    v[axis] *= -RESTITUTION;
                }
            }
        }
    }

    pub fn snapshot(&self) -> ParticleSnapshot<'_> {
        ParticleSnapshot {
            positions: &self.positions,
            colors: &self.colors,
            count: self.count,
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn color_mode(&self) -> ColorMode {
        self.color_mode
    }

    pub fn velocities(&self) -> &[f32] {
        &self.velocities
    }

    pub fn position(&self, index: usize) -> [f32; 3] {
        let b = index * 3;
        [self.positions[b], self.positions[b + 1], self.positions[b + 2]]
    }

    pub fn velocity(&self, index: usize) -> [f32; 3] {
        let b = index * 3;
        [self.velocities[b], self.velocities[b + 1], self.velocities[b + 2]]
    }

    /// Overwrites one particle's position and velocity.
    pub fn set_particle(&mut self, index: usize, position: [f32; 3], velocity: [f32; 3]) {
        let b = index * 3;
        self.positions[b..b + 3].copy_from_slice(&position);
        self.velocities[b..b + 3].copy_from_slice(&velocity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reflects_and_damps_at_bounds() {
        let mut integrator = ParticleIntegrator::new(1, 1.0);
        integrator.initialize(1, Distribution::UniformCube, ColorMode::Solid);
        integrator.set_particle(0, [9.0, 0.0, 0.0], [20.0, 0.0, 0.0]);
        integrator.step(1.0, 0.0, 10.0);
        assert_eq!(integrator.position(0)[0], 10.0);
        assert_eq!(integrator.velocity(0)[0], -16.0);
    }

    #[test]
    fn negative_side_reflects_too() {
        let mut integrator = ParticleIntegrator::new(1, 1.0);
        integrator.initialize(1, Distribution::UniformCube, ColorMode::Solid);
        integrator.set_particle(0, [0.0, -9.5, 0.0], [0.0, -1.0, 0.0]);
        integrator.step(1.0, -0.5, 10.0);
        assert_eq!(integrator.position(0)[1], -10.0);
        assert!((integrator.velocity(0)[1] - 1.2).abs() < 1e-6);
    }

    #[test]
    fn recreate_with_uses_new_spread_and_mode() {
        let mut integrator = ParticleIntegrator::new(5, 1.0);
        integrator.initialize(64, Distribution::UniformCube, ColorMode::Rainbow);
        assert!(integrator.snapshot().positions.iter().all(|p| p.abs() <= 1.0));

        integrator.set_spread(-3.0);
        assert_eq!(integrator.spread(), 0.0);
        integrator.set_spread(40.0);
        integrator.recreate_with(128, ColorMode::Gradient);
        assert_eq!(integrator.color_mode(), ColorMode::Gradient);
        assert_eq!(integrator.count(), 128);
        assert!(integrator.snapshot().positions.iter().any(|p| p.abs() > 1.0));
    }

    #[test]
    fn gravity_only_touches_y() {
        let mut integrator = ParticleIntegrator::new(7, 1.0);
        integrator.initialize(1, Distribution::UniformCube, ColorMode::Solid);
        integrator.set_particle(0, [0.0; 3], [0.0; 3]);
        integrator.step(2.0, -0.25, 100.0);
        assert_eq!(integrator.velocity(0), [0.0, -0.5, 0.0]);
        assert_eq!(integrator.position(0), [0.0, -1.0, 0.0]);
    }

    #[test]
    fn identical_seeds_give_identical_trajectories() {
        let mut a = ParticleIntegrator::new(42, 10.0);
        let mut b = ParticleIntegrator::new(42, 10.0);
        a.initialize(512, Distribution::Spherical, ColorMode::Rainbow);
        b.initialize(512, Distribution::Spherical, ColorMode::Rainbow);
        for frame in 0..200 {
            let dt = 0.5 + (frame % 3) as f32 * 0.25;
            a.step(dt, -0.01, 10.0);
            b.step(dt, -0.01, 10.0);
        }
        let bits = |s: ParticleSnapshot<'_>| {
            s.positions.iter().map(|f| f.to_bits()).collect::<Vec<_>>()
        };
        assert_eq!(bits(a.snapshot()), bits(b.snapshot()));
        assert_eq!(a.velocities(), b.velocities());
    }

    #[test]
    fn recreate_sizes_all_arrays() {
        let mut integrator = ParticleIntegrator::new(3, 5.0);
        integrator.initialize(100, Distribution::UniformCube, ColorMode::Gradient);
        for count in [0, 1, 64, 1000] {
            integrator.recreate(count);
            let snap = integrator.snapshot();
            assert_eq!(snap.count, count);
            assert_eq!(snap.positions.len(), count * 3);
            assert_eq!(snap.colors.len(), count * 3);
            assert_eq!(integrator.velocities().len(), count * 3);
        }
    }

    #[test]
    fn distributions_stay_within_spread() {
        for distribution in [Distribution::UniformCube, Distribution::Spherical] {
            let mut integrator = ParticleIntegrator::new(9, 4.0);
            integrator.initialize(2000, distribution, ColorMode::Solid);
            for i in 0..integrator.count() {
                let [x, y, z] = integrator.position(i);
                assert!(x.abs() <= 4.0 && y.abs() <= 4.0 && z.abs() <= 4.0);
                if distribution == Distribution::Spherical {
                    assert!((x * x + y * y + z * z).sqrt() <= 4.0 + 1e-4);
                }
            }
        }
    }

    #[test]
    fn bounded_after_many_steps() {
        let mut integrator = ParticleIntegrator::new(11, 10.0);
        integrator.initialize(256, Distribution::UniformCube, ColorMode::Rainbow);
        for _ in 0..1000 {
            integrator.step(1.0, -0.05, 10.0);
        }
        assert!(integrator.snapshot().positions.iter().all(|p| p.abs() <= 10.0));
    }

    #[test]
    fn color_modes() {
        assert_eq!(ColorMode::Solid.color_at(0.7), SOLID);
        assert_eq!(ColorMode::Gradient.color_at(0.0), GRADIENT_START);
        let red = ColorMode::Rainbow.color_at(0.0);
        assert!((red[0] - 1.0).abs() < 1e-6 && red[1].abs() < 1e-6 && red[2].abs() < 1e-6);

        let mut integrator = ParticleIntegrator::new(5, 1.0);
        integrator.initialize(4, Distribution::UniformCube, ColorMode::Rainbow);
        integrator.recolor(ColorMode::Solid);
        assert!(integrator.snapshot().colors.chunks(3).all(|c| c == SOLID));
        assert_eq!(integrator.color_mode(), ColorMode::Solid);
    }
}
