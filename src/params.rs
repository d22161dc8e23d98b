//! User-facing numeric parameters.
//!
//! Every value enters through [`ParameterBus`], which clamps it into the field's
//! declared range (and snaps it where the field demands), so anything read back
//! out is already valid. Non-finite input and unknown names are dropped, not
//! raised; that policy is the same for every field.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{FxError, FxResult};
use crate::particles::ColorMode;

/// How a clamped value is quantized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Snap {
    None,
    Round,
    /// Nearest power of two, for counts that size a compute dispatch.
    PowerOfTwo,
}

/// Declared range and default for one field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub min: f64,
    pub max: f64,
    pub default: f64,
    pub snap: Snap,
}

impl ParamSpec {
    const fn new(min: f64, max: f64, default: f64) -> Self {
        Self {
            min,
            max,
            default,
            snap: Snap::None,
        }
    }

    const fn snapped(mut self, snap: Snap) -> Self {
        self.snap = snap;
        self
    }

    /// Clamps and snaps a finite `raw` into range.
    pub fn apply(&self, raw: f64) -> f64 {
        let clamped = raw.clamp(self.min, self.max);
        match self.snap {
            Snap::None => clamped,
            Snap::Round => clamped.round(),
            Snap::PowerOfTwo => nearest_power_of_two(clamped).clamp(self.min, self.max),
        }
    }
}

/// Nearest power of two to `v` (ties go up). Values below 1 map to 1.
pub fn nearest_power_of_two(v: f64) -> f64 {
    if v <= 1.0 {
        return 1.0;
    }
    let lower = 2f64.powi(v.log2().floor() as i32);
    let upper = lower * 2.0;
    if v - lower < upper - v {
        lower
    } else {
        upper
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamName {
    Viscosity,
    Distortion,
    Speed,
    ColorShift,
    ParticleCount,
    ParticleSize,
    Gravity,
    Bounds,
    ColorMode,
    Opacity,
    Blur,
    Saturation,
    Metalness,
    Roughness,
}

impl ParamName {
    pub const ALL: [ParamName; 14] = [
        ParamName::Viscosity,
        ParamName::Distortion,
        ParamName::Speed,
        ParamName::ColorShift,
        ParamName::ParticleCount,
        ParamName::ParticleSize,
        ParamName::Gravity,
        ParamName::Bounds,
        ParamName::ColorMode,
        ParamName::Opacity,
        ParamName::Blur,
        ParamName::Saturation,
        ParamName::Metalness,
        ParamName::Roughness,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ParamName::Viscosity => "viscosity",
            ParamName::Distortion => "distortion",
            ParamName::Speed => "speed",
            ParamName::ColorShift => "colorShift",
            ParamName::ParticleCount => "particleCount",
            ParamName::ParticleSize => "particleSize",
            ParamName::Gravity => "gravity",
            ParamName::Bounds => "bounds",
            ParamName::ColorMode => "colorMode",
            ParamName::Opacity => "opacity",
            ParamName::Blur => "blur",
            ParamName::Saturation => "saturation",
            ParamName::Metalness => "metalness",
            ParamName::Roughness => "roughness",
        }
    }

    pub fn spec(self) -> ParamSpec {
        match self {
            ParamName::Viscosity => ParamSpec::new(0.0, 1.0, 0.5),
            ParamName::Distortion => ParamSpec::new(0.0, 2.0, 0.5),
            ParamName::Speed => ParamSpec::new(0.0, 5.0, 1.0),
            ParamName::ColorShift => ParamSpec::new(0.0, 1.0, 0.0),
            ParamName::ParticleCount => {
                ParamSpec::new(64.0, 65536.0, 4096.0).snapped(Snap::PowerOfTwo)
            }
            ParamName::ParticleSize => ParamSpec::new(0.5, 20.0, 2.0),
            ParamName::Gravity => ParamSpec::new(-1.0, 1.0, -0.002),
            ParamName::Bounds => ParamSpec::new(1.0, 100.0, 10.0),
            ParamName::ColorMode => ParamSpec::new(0.0, 2.0, 0.0).snapped(Snap::Round),
            ParamName::Opacity => ParamSpec::new(0.0, 1.0, 1.0),
            ParamName::Blur => ParamSpec::new(0.0, 50.0, 0.0),
            ParamName::Saturation => ParamSpec::new(0.0, 300.0, 100.0),
            ParamName::Metalness => ParamSpec::new(0.0, 1.0, 0.5),
            ParamName::Roughness => ParamSpec::new(0.0, 1.0, 0.5),
        }
    }

    fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

impl fmt::Display for ParamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParamName {
    type Err = FxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ParamName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| FxError::param(format!("unknown parameter `{s}`")))
    }
}

/// Snapshot of every parameter, always within declared ranges.
///
/// Deserializes through [`ParamsPatch`], so missing keys take their defaults
/// and every value is clamped like a `set`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "ParamsPatch")]
pub struct Params {
    pub viscosity: f32,
    pub distortion: f32,
    pub speed: f32,
    pub color_shift: f32,
    pub particle_count: u32,
    pub particle_size: f32,
    pub gravity: f32,
    pub bounds: f32,
    #[serde(serialize_with = "color_mode_index")]
    pub color_mode: ColorMode,
    pub opacity: f32,
    pub blur: f32,
    pub saturation: f32,
    pub metalness: f32,
    pub roughness: f32,
}

fn color_mode_index<S: serde::Serializer>(mode: &ColorMode, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u32(mode.index())
}

impl From<ParamsPatch> for Params {
    fn from(patch: ParamsPatch) -> Self {
        ParameterBus::with_patch(&patch).params().clone()
    }
}

impl Default for Params {
    fn default() -> Self {
        let mut params = Params {
            viscosity: 0.0,
            distortion: 0.0,
            speed: 0.0,
            color_shift: 0.0,
            particle_count: 0,
            particle_size: 0.0,
            gravity: 0.0,
            bounds: 0.0,
            color_mode: ColorMode::Rainbow,
            opacity: 0.0,
            blur: 0.0,
            saturation: 0.0,
            metalness: 0.0,
            roughness: 0.0,
        };
        for name in ParamName::ALL {
            params.store(name, name.spec().default);
        }
        params
    }
}

impl Params {
    pub fn get(&self, name: ParamName) -> f64 {
        match name {
            ParamName::Viscosity => self.viscosity as f64,
            ParamName::Distortion => self.distortion as f64,
            ParamName::Speed => self.speed as f64,
            ParamName::ColorShift => self.color_shift as f64,
            ParamName::ParticleCount => self.particle_count as f64,
            ParamName::ParticleSize => self.particle_size as f64,
            ParamName::Gravity => self.gravity as f64,
            ParamName::Bounds => self.bounds as f64,
            ParamName::ColorMode => self.color_mode.index() as f64,
            ParamName::Opacity => self.opacity as f64,
            ParamName::Blur => self.blur as f64,
            ParamName::Saturation => self.saturation as f64,
            ParamName::Metalness => self.metalness as f64,
            ParamName::Roughness => self.roughness as f64,
        }
    }

    // Callers pass values that already went through `ParamSpec::apply`.
    fn store(&mut self, name: ParamName, v: f64) {
        match name {
            ParamName::Viscosity => self.viscosity = v as f32,
            ParamName::Distortion => self.distortion = v as f32,
            ParamName::Speed => self.speed = v as f32,
            ParamName::ColorShift => self.color_shift = v as f32,
            ParamName::ParticleCount => self.particle_count = v as u32,
            ParamName::ParticleSize => self.particle_size = v as f32,
            ParamName::Gravity => self.gravity = v as f32,
            ParamName::Bounds => self.bounds = v as f32,
            ParamName::ColorMode => self.color_mode = ColorMode::from_index(v as u32),
            ParamName::Opacity => self.opacity = v as f32,
            ParamName::Blur => self.blur = v as f32,
            ParamName::Saturation => self.saturation = v as f32,
            ParamName::Metalness => self.metalness = v as f32,
            ParamName::Roughness => self.roughness = v as f32,
        }
    }
}

/// Partial update as sent by sliders and preset buttons.
///
/// Keys are the camelCase parameter names; unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParamsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viscosity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distortion: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_shift: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub particle_count: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub particle_size: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gravity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_mode: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blur: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saturation: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metalness: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roughness: Option<f64>,
}

impl ParamsPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> FxResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with(mut self, name: ParamName, value: f64) -> Self {
        *self.slot(name) = Some(value);
        self
    }

    pub fn get(&self, name: ParamName) -> Option<f64> {
        match name {
            ParamName::Viscosity => self.viscosity,
            ParamName::Distortion => self.distortion,
            ParamName::Speed => self.speed,
            ParamName::ColorShift => self.color_shift,
            ParamName::ParticleCount => self.particle_count,
            ParamName::ParticleSize => self.particle_size,
            ParamName::Gravity => self.gravity,
            ParamName::Bounds => self.bounds,
            ParamName::ColorMode => self.color_mode,
            ParamName::Opacity => self.opacity,
            ParamName::Blur => self.blur,
            ParamName::Saturation => self.saturation,
            ParamName::Metalness => self.metalness,
            ParamName::Roughness => self.roughness,
        }
    }

    fn slot(&mut self, name: ParamName) -> &mut Option<f64> {
        match name {
            ParamName::Viscosity => &mut self.viscosity,
            ParamName::Distortion => &mut self.distortion,
            ParamName::Speed => &mut self.speed,
            ParamName::ColorShift => &mut self.color_shift,
            ParamName::ParticleCount => &mut self.particle_count,
            ParamName::ParticleSize => &mut self.particle_size,
            ParamName::Gravity => &mut self.gravity,
            ParamName::Bounds => &mut self.bounds,
            ParamName::ColorMode => &mut self.color_mode,
            ParamName::Opacity => &mut self.opacity,
            ParamName::Blur => &mut self.blur,
            ParamName::Saturation => &mut self.saturation,
            ParamName::Metalness => &mut self.metalness,
            ParamName::Roughness => &mut self.roughness,
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = (ParamName, f64)> + '_ {
        ParamName::ALL
            .into_iter()
            .filter_map(move |name| self.get(name).map(|v| (name, v)))
    }

    pub fn is_empty(&self) -> bool {
        self.entries().next().is_none()
    }
}

/// Built-in preset for the preset buttons, by name.
pub fn preset(name: &str) -> Option<ParamsPatch> {
    let patch = match name {
        "calm" => ParamsPatch::new()
            .with(ParamName::Viscosity, 0.8)
            .with(ParamName::Distortion, 0.2)
            .with(ParamName::Speed, 0.5)
            .with(ParamName::ColorShift, 0.55),
        "turbulent" => ParamsPatch::new()
            .with(ParamName::Viscosity, 0.1)
            .with(ParamName::Distortion, 1.6)
            .with(ParamName::Speed, 2.5)
            .with(ParamName::ColorShift, 0.1),
        "psychedelic" => ParamsPatch::new()
            .with(ParamName::Viscosity, 0.3)
            .with(ParamName::Distortion, 2.0)
            .with(ParamName::Speed, 1.5)
            .with(ParamName::ColorShift, 0.85)
            .with(ParamName::ColorMode, ColorMode::Rainbow.index() as f64),
        _ => return None,
    };
    Some(patch)
}

/// Set of fields changed since the last [`ParameterBus::take_dirty`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirtySet(u32);

impl DirtySet {
    pub fn contains(self, name: ParamName) -> bool {
        self.0 & name.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Validating front door for parameter changes.
#[derive(Debug, Clone, Default)]
pub struct ParameterBus {
    params: Params,
    dirty: DirtySet,
}

impl ParameterBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_patch(patch: &ParamsPatch) -> Self {
        let mut bus = Self::new();
        bus.apply(patch);
        bus.dirty = DirtySet::default();
        bus
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn get(&self, name: ParamName) -> f64 {
        self.params.get(name)
    }

    /// Clamps and stores `raw`. Returns whether the stored value changed.
    /// Non-finite values are ignored.
    pub fn set(&mut self, name: ParamName, raw: f64) -> bool {
        if !raw.is_finite() {
            log::debug!("ignoring non-finite value for {name}");
            return false;
        }
        let before = self.params.get(name);
        self.params.store(name, name.spec().apply(raw));
        if self.params.get(name) == before {
            return false;
        }
        self.dirty.0 |= name.bit();
        true
    }

    /// String-keyed entry point used by UI controls. Unknown names are ignored.
    pub fn set_named(&mut self, name: &str, raw: f64) -> bool {
        match name.parse::<ParamName>() {
            Ok(name) => self.set(name, raw),
            Err(err) => {
                log::debug!("{err}");
                false
            }
        }
    }

    /// Like [`ParameterBus::set_named`] but reports what the lenient path drops.
    pub fn try_set(&mut self, name: &str, raw: f64) -> FxResult<bool> {
        let name = name.parse::<ParamName>()?;
        if !raw.is_finite() {
            return Err(FxError::param(format!("{name} must be finite, got {raw}")));
        }
        Ok(self.set(name, raw))
    }

    /// Applies every field present in `patch`. Returns whether anything changed.
    pub fn apply(&mut self, patch: &ParamsPatch) -> bool {
        let mut changed = false;
        for (name, value) in patch.entries() {
            changed |= self.set(name, value);
        }
        changed
    }

    pub fn take_dirty(&mut self) -> DirtySet {
        std::mem::take(&mut self.dirty)
    }

    /// Workgroups needed to cover `particleCount`. A zero workgroup size counts as one.
    pub fn dispatch_count(&self, workgroup_size: u32) -> u32 {
        self.params.particle_count.div_ceil(workgroup_size.max(1))
    }
}
