//! Parameter registry: named, ranged and unit-typed control values.
//!
//! The registry is built once from a static declaration table and then
//! shared (behind an `Arc`) between the control surface and the render
//! thread. Every value is a single atomic `f32`, so reads and writes from
//! either side are torn-free and never block.
//!
//! Keys are resolved to a dense [`ParamAddress`] at registration time; the
//! render path only ever indexes the flat value array by address.

use std::collections::HashMap;
use std::sync::atomic::Ordering;

use atomic_float::AtomicF32;
use serde::Serialize;

use crate::error::{Error, Result};

/// Display/semantic unit of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Generic,
    Seconds,
    Hertz,
    Semitones,
    /// 0/1 toggle, displayed as "On"/"Off".
    Boolean,
    /// Integer-valued choice, displayed through a label table.
    Indexed,
}

/// Access flags for a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamFlags {
    pub readable: bool,
    pub writable: bool,
    pub can_ramp: bool,
}

impl ParamFlags {
    /// Readable, writable and automatable.
    pub const ALL: ParamFlags = ParamFlags {
        readable: true,
        writable: true,
        can_ramp: true,
    };

    /// Readable and writable, changes are applied as steps.
    pub const STEPPED: ParamFlags = ParamFlags {
        readable: true,
        writable: true,
        can_ramp: false,
    };

    /// Host-visible value the control surface cannot change.
    pub const READ_ONLY: ParamFlags = ParamFlags {
        readable: true,
        writable: false,
        can_ramp: false,
    };
}

/// Static declaration of one parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    /// Stable identifier used by presets and the control surface.
    pub key: &'static str,
    /// Human-readable name.
    pub name: &'static str,
    pub min: f32,
    pub max: f32,
    pub default: f32,
    pub unit: Unit,
    pub flags: ParamFlags,
    /// Labels for `Unit::Indexed` values, indexed by the rounded value.
    pub labels: &'static [&'static str],
}

impl ParamSpec {
    pub const fn new(
        key: &'static str,
        name: &'static str,
        min: f32,
        max: f32,
        default: f32,
        unit: Unit,
    ) -> Self {
        ParamSpec {
            key,
            name,
            min,
            max,
            default,
            unit,
            flags: ParamFlags::ALL,
            labels: &[],
        }
    }

    pub const fn indexed(
        key: &'static str,
        name: &'static str,
        max: f32,
        default: f32,
        labels: &'static [&'static str],
    ) -> Self {
        ParamSpec {
            key,
            name,
            min: 0.0,
            max,
            default,
            unit: Unit::Indexed,
            flags: ParamFlags::STEPPED,
            labels,
        }
    }

    pub const fn boolean(key: &'static str, name: &'static str, default: f32) -> Self {
        ParamSpec {
            key,
            name,
            min: 0.0,
            max: 1.0,
            default,
            unit: Unit::Boolean,
            flags: ParamFlags::STEPPED,
            labels: &[],
        }
    }

    /// Clamp a value into `[min, max]`. NaN maps to `min`.
    #[inline]
    pub fn clamp(&self, value: f32) -> f32 {
        if value.is_nan() {
            self.min
        } else {
            value.clamp(self.min, self.max)
        }
    }

    /// Format a value for display (non-real-time).
    pub fn display(&self, value: f32) -> String {
        match self.unit {
            Unit::Boolean => {
                if value > 0.5 {
                    "On".to_string()
                } else {
                    "Off".to_string()
                }
            }
            Unit::Indexed => {
                let index = value.round();
                if index >= 0.0 && (index as usize) < self.labels.len() {
                    self.labels[index as usize].to_string()
                } else {
                    format!("{value:.2}")
                }
            }
            _ => format!("{value:.2}"),
        }
    }
}

/// Dense numeric address of a registered parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamAddress(pub u32);

impl ParamAddress {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Labels for the filter type selector.
pub const FILTER_TYPE_LABELS: &[&str] = &["LP", "BP", "HP", "Notch"];

/// Labels for the envelope curve selectors.
pub const CURVE_LABELS: &[&str] = &["Linear", "Exp", "Log", "S-Curve"];

/// The sampler's parameter table, in address order.
pub const SAMPLER_PARAMETERS: [ParamSpec; 20] = [
    ParamSpec::new("masterVolume", "Master Volume", 0.0, 1.5, 0.8, Unit::Generic),
    ParamSpec::new("pitchBendRange", "Pitch Bend Range", 0.0, 24.0, 2.0, Unit::Semitones),
    ParamSpec::new("basePitch", "Base Pitch", 0.1, 4.0, 1.0, Unit::Generic),
    ParamSpec::new("envAttack", "Attack", 0.001, 5.0, 0.01, Unit::Seconds),
    ParamSpec::new("envHold", "Hold", 0.0, 5.0, 0.0, Unit::Seconds),
    ParamSpec::new("envDecay", "Decay", 0.001, 5.0, 0.1, Unit::Seconds),
    ParamSpec::new("envSustain", "Sustain", 0.0, 1.0, 0.7, Unit::Generic),
    ParamSpec::new("envRelease", "Release", 0.001, 5.0, 0.2, Unit::Seconds),
    ParamSpec::indexed("envAttackCurve", "Attack Curve", 3.0, 1.0, CURVE_LABELS),
    ParamSpec::indexed("envDecayCurve", "Decay Curve", 3.0, 1.0, CURVE_LABELS),
    ParamSpec::indexed("envReleaseCurve", "Release Curve", 3.0, 1.0, CURVE_LABELS),
    ParamSpec::new("filterCutoff", "Filter Cutoff", 20.0, 20000.0, 20000.0, Unit::Hertz),
    ParamSpec::new("filterResonance", "Filter Resonance", 0.0, 1.0, 0.0, Unit::Generic),
    ParamSpec::boolean("filterEnabled", "Filter Enabled", 0.0),
    ParamSpec::indexed("filterType", "Filter Type", 3.0, 0.0, FILTER_TYPE_LABELS),
    ParamSpec::new("reverbMix", "Reverb Mix", 0.0, 1.0, 0.0, Unit::Generic),
    ParamSpec::new("delayMix", "Delay Mix", 0.0, 1.0, 0.0, Unit::Generic),
    ParamSpec::new("drive", "Drive", 0.0, 1.0, 0.0, Unit::Generic),
    ParamSpec::new("structure", "Structure", 0.0, 1.0, 0.5, Unit::Generic),
    ParamSpec::new("stereoWidth", "Stereo Width", 0.0, 1.0, 0.5, Unit::Generic),
];

/// Typed view of [`SAMPLER_PARAMETERS`]; the discriminant is the address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SamplerParam {
    MasterVolume = 0,
    PitchBendRange,
    BasePitch,
    EnvAttack,
    EnvHold,
    EnvDecay,
    EnvSustain,
    EnvRelease,
    EnvAttackCurve,
    EnvDecayCurve,
    EnvReleaseCurve,
    FilterCutoff,
    FilterResonance,
    FilterEnabled,
    FilterType,
    ReverbMix,
    DelayMix,
    Drive,
    Structure,
    StereoWidth,
}

impl SamplerParam {
    pub const ALL: [SamplerParam; 20] = [
        SamplerParam::MasterVolume,
        SamplerParam::PitchBendRange,
        SamplerParam::BasePitch,
        SamplerParam::EnvAttack,
        SamplerParam::EnvHold,
        SamplerParam::EnvDecay,
        SamplerParam::EnvSustain,
        SamplerParam::EnvRelease,
        SamplerParam::EnvAttackCurve,
        SamplerParam::EnvDecayCurve,
        SamplerParam::EnvReleaseCurve,
        SamplerParam::FilterCutoff,
        SamplerParam::FilterResonance,
        SamplerParam::FilterEnabled,
        SamplerParam::FilterType,
        SamplerParam::ReverbMix,
        SamplerParam::DelayMix,
        SamplerParam::Drive,
        SamplerParam::Structure,
        SamplerParam::StereoWidth,
    ];

    #[inline]
    pub fn address(self) -> ParamAddress {
        ParamAddress(self as u32)
    }

    #[inline]
    pub fn from_address(address: ParamAddress) -> Option<SamplerParam> {
        Self::ALL.get(address.index()).copied()
    }

    pub fn spec(self) -> &'static ParamSpec {
        &SAMPLER_PARAMETERS[self as usize]
    }

    pub fn key(self) -> &'static str {
        self.spec().key
    }
}

/// Registry of parameters with lock-free value storage.
#[derive(Debug, Default)]
pub struct ParameterRegistry {
    specs: Vec<ParamSpec>,
    values: Vec<AtomicF32>,
    by_key: HashMap<&'static str, ParamAddress>,
}

impl ParameterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a declaration table, in table order.
    pub fn from_table(table: &[ParamSpec]) -> Result<Self> {
        let mut registry = Self::new();
        for spec in table {
            registry.register(*spec)?;
        }
        Ok(registry)
    }

    /// Registry holding the sampler's parameter table.
    pub fn sampler() -> Result<Self> {
        Self::from_table(&SAMPLER_PARAMETERS)
    }

    /// Register a parameter. Only valid before the registry is shared.
    pub fn register(&mut self, spec: ParamSpec) -> Result<ParamAddress> {
        if self.by_key.contains_key(spec.key) {
            return Err(Error::DuplicateParameter(spec.key.to_string()));
        }
        if !(spec.min <= spec.max) {
            return Err(Error::InvalidConfig(format!(
                "parameter '{}' has an empty range [{}, {}]",
                spec.key, spec.min, spec.max
            )));
        }
        let address = ParamAddress(self.specs.len() as u32);
        self.values.push(AtomicF32::new(spec.clamp(spec.default)));
        self.specs.push(spec);
        self.by_key.insert(spec.key, address);
        Ok(address)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Resolve a key to its address.
    pub fn address_of(&self, key: &str) -> Option<ParamAddress> {
        self.by_key.get(key).copied()
    }

    pub fn spec(&self, address: ParamAddress) -> Option<&ParamSpec> {
        self.specs.get(address.index())
    }

    /// All specs with their addresses, in address order.
    pub fn iter(&self) -> impl Iterator<Item = (ParamAddress, &ParamSpec)> {
        self.specs
            .iter()
            .enumerate()
            .map(|(i, spec)| (ParamAddress(i as u32), spec))
    }

    /// Current value by key. `None` for unknown or unreadable parameters.
    pub fn get(&self, key: &str) -> Option<f32> {
        let address = self.address_of(key)?;
        let readable = self.spec(address)?.flags.readable;
        readable.then(|| self.get_by_address(address))
    }

    /// Clamp and store a value by key. Returns the value now held.
    pub fn set(&self, key: &str, value: f32) -> Option<f32> {
        self.address_of(key).map(|a| self.set_by_address(a, value))
    }

    /// Current value by address. Unknown addresses read as 0.0.
    #[inline]
    pub fn get_by_address(&self, address: ParamAddress) -> f32 {
        match self.values.get(address.index()) {
            Some(v) => v.load(Ordering::Acquire),
            None => 0.0,
        }
    }

    /// Clamp and store a value by address. Returns the value now held;
    /// read-only parameters keep theirs.
    #[inline]
    pub fn set_by_address(&self, address: ParamAddress, value: f32) -> f32 {
        let index = address.index();
        match (self.specs.get(index), self.values.get(index)) {
            (Some(spec), Some(slot)) if !spec.flags.writable => slot.load(Ordering::Acquire),
            (Some(spec), Some(slot)) => {
                let clamped = spec.clamp(value);
                slot.store(clamped, Ordering::Release);
                clamped
            }
            _ => 0.0,
        }
    }

    /// Display string for `value` formatted per the parameter's unit.
    pub fn display_string(&self, key: &str, value: f32) -> Option<String> {
        let address = self.address_of(key)?;
        self.specs.get(address.index()).map(|s| s.display(value))
    }

    /// Restore every parameter to its declared default.
    pub fn reset_to_defaults(&self) {
        for (spec, slot) in self.specs.iter().zip(&self.values) {
            slot.store(spec.clamp(spec.default), Ordering::Release);
        }
    }

    /// Snapshot of every value keyed by parameter key (non-real-time).
    pub fn snapshot(&self) -> Vec<(&'static str, f32)> {
        self.specs
            .iter()
            .zip(&self.values)
            .map(|(spec, slot)| (spec.key, slot.load(Ordering::Acquire)))
            .collect()
    }
}
