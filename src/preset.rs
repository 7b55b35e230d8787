//! Preset blobs: the persisted state of an instrument.
//!
//! A blob is JSON holding every parameter value plus the instrument
//! selection:
//!
//! ```json
//! {"version": 1,
//!  "instrument": {"index": 2, "source": "/banks/keys.json"},
//!  "parameters": {"masterVolume": 0.8, "filterCutoff": 20000.0}}
//! ```
//!
//! Decoding never touches the registry. Callers validate the whole blob
//! first and only then apply it, so a rejected blob changes nothing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::PresetError;
use crate::params::ParameterRegistry;

/// Blob format version written by this crate.
pub const PRESET_VERSION: u32 = 1;

/// Which instrument a preset plays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentSelection {
    /// Index into the bank's instrument list.
    pub index: usize,
    /// Bank manifest path; absent for the built-in bank.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Decoded preset blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetState {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument: Option<InstrumentSelection>,
    #[serde(default)]
    pub parameters: BTreeMap<String, f32>,
}

impl PresetState {
    /// Snapshot every registry value together with a selection.
    pub fn capture(registry: &ParameterRegistry, instrument: Option<InstrumentSelection>) -> Self {
        PresetState {
            version: PRESET_VERSION,
            instrument,
            parameters: registry
                .snapshot()
                .into_iter()
                .map(|(key, value)| (key.to_string(), value))
                .collect(),
        }
    }

    /// Parse and validate a blob without applying it.
    pub fn from_json(blob: &str) -> Result<Self, PresetError> {
        let state: PresetState = serde_json::from_str(blob)?;
        state.validate()?;
        Ok(state)
    }

    pub fn to_json(&self) -> String {
        match serde_json::to_string(self) {
            Ok(json) => json,
            Err(e) => {
                log::error!("Preset encoding failed: {e}");
                String::new()
            }
        }
    }

    /// Reject unsupported versions and non-finite values.
    pub fn validate(&self) -> Result<(), PresetError> {
        if self.version != PRESET_VERSION {
            return Err(PresetError::UnsupportedVersion(self.version));
        }
        if let Some((key, _)) = self.parameters.iter().find(|(_, v)| !v.is_finite()) {
            return Err(PresetError::NonFiniteValue(key.clone()));
        }
        Ok(())
    }

    /// Write every known parameter (clamped). Unknown keys are skipped and
    /// missing keys keep their current values. Returns how many were applied.
    pub fn apply_parameters(&self, registry: &ParameterRegistry) -> usize {
        let mut applied = 0;
        for (key, &value) in &self.parameters {
            if registry.set(key, value).is_some() {
                applied += 1;
            } else {
                log::debug!("Preset parameter '{key}' is not registered; skipped");
            }
        }
        applied
    }
}

/// A named parameter set shipped with the instrument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FactoryPreset {
    pub name: &'static str,
    pub values: &'static [(&'static str, f32)],
}

impl FactoryPreset {
    /// As a preset state that keeps the current instrument.
    pub fn to_state(&self) -> PresetState {
        PresetState {
            version: PRESET_VERSION,
            instrument: None,
            parameters: self
                .values
                .iter()
                .map(|&(key, value)| (key.to_string(), value))
                .collect(),
        }
    }
}

macro_rules! factory {
    ($name:expr, [$($key:literal = $value:expr),* $(,)?]) => {
        FactoryPreset { name: $name, values: &[$(($key, $value)),*] }
    };
}

/// Built-in presets, in program order.
pub const FACTORY_PRESETS: [FactoryPreset; 10] = [
    factory!("Piano", [
        "masterVolume" = 1.1, "basePitch" = 1.0, "envAttack" = 0.01, "envHold" = 0.0,
        "envDecay" = 0.5, "envSustain" = 0.3, "envRelease" = 0.3, "filterCutoff" = 20000.0,
        "filterResonance" = 0.0, "filterType" = 0.0, "reverbMix" = 0.2, "delayMix" = 0.0,
        "drive" = 0.0, "structure" = 0.5, "stereoWidth" = 0.5,
    ]),
    factory!("Strings", [
        "masterVolume" = 1.0, "basePitch" = 1.0, "envAttack" = 0.3, "envHold" = 0.0,
        "envDecay" = 0.2, "envSustain" = 0.8, "envRelease" = 1.0, "filterCutoff" = 8000.0,
        "filterResonance" = 0.2, "filterType" = 0.0, "reverbMix" = 0.4, "delayMix" = 0.1,
        "drive" = 0.0, "structure" = 0.3, "stereoWidth" = 0.7,
    ]),
    factory!("Choir", [
        "masterVolume" = 1.0, "basePitch" = 1.0, "envAttack" = 0.2, "envHold" = 0.0,
        "envDecay" = 0.1, "envSustain" = 0.7, "envRelease" = 0.5, "filterCutoff" = 5000.0,
        "filterResonance" = 0.1, "filterType" = 0.0, "reverbMix" = 0.5, "delayMix" = 0.0,
        "drive" = 0.0, "structure" = 0.4, "stereoWidth" = 0.8,
    ]),
    factory!("Organ", [
        "masterVolume" = 1.0, "basePitch" = 1.0, "envAttack" = 0.01, "envHold" = 0.0,
        "envDecay" = 0.1, "envSustain" = 1.0, "envRelease" = 0.1, "filterCutoff" = 20000.0,
        "filterResonance" = 0.0, "filterType" = 0.0, "reverbMix" = 0.3, "delayMix" = 0.0,
        "drive" = 0.1, "structure" = 0.3, "stereoWidth" = 0.5,
    ]),
    factory!("Brass", [
        "masterVolume" = 1.0, "basePitch" = 1.0, "envAttack" = 0.1, "envHold" = 0.0,
        "envDecay" = 0.2, "envSustain" = 0.8, "envRelease" = 0.2, "filterCutoff" = 6000.0,
        "filterResonance" = 0.3, "filterType" = 0.0, "reverbMix" = 0.2, "delayMix" = 0.0,
        "drive" = 0.2, "structure" = 0.6, "stereoWidth" = 0.6,
    ]),
    factory!("Bass", [
        "masterVolume" = 1.2, "basePitch" = 1.0, "envAttack" = 0.01, "envHold" = 0.0,
        "envDecay" = 0.3, "envSustain" = 0.4, "envRelease" = 0.2, "filterCutoff" = 2000.0,
        "filterResonance" = 0.2, "filterType" = 0.0, "reverbMix" = 0.1, "delayMix" = 0.0,
        "drive" = 0.1, "structure" = 0.4, "stereoWidth" = 0.3,
    ]),
    factory!("Guitar", [
        "masterVolume" = 1.0, "basePitch" = 1.0, "envAttack" = 0.01, "envHold" = 0.0,
        "envDecay" = 0.4, "envSustain" = 0.5, "envRelease" = 0.3, "filterCutoff" = 8000.0,
        "filterResonance" = 0.1, "filterType" = 0.0, "reverbMix" = 0.3, "delayMix" = 0.15,
        "drive" = 0.1, "structure" = 0.5, "stereoWidth" = 0.6,
    ]),
    factory!("Synth Pad", [
        "masterVolume" = 1.0, "basePitch" = 1.0, "envAttack" = 0.4, "envHold" = 0.0,
        "envDecay" = 0.1, "envSustain" = 0.8, "envRelease" = 1.5, "filterCutoff" = 4000.0,
        "filterResonance" = 0.3, "filterType" = 0.0, "reverbMix" = 0.5, "delayMix" = 0.2,
        "drive" = 0.0, "structure" = 0.7, "stereoWidth" = 0.8,
    ]),
    factory!("Percussive", [
        "masterVolume" = 1.0, "basePitch" = 1.0, "envAttack" = 0.001, "envHold" = 0.0,
        "envDecay" = 0.2, "envSustain" = 0.0, "envRelease" = 0.1, "filterCutoff" = 12000.0,
        "filterResonance" = 0.0, "filterType" = 0.0, "reverbMix" = 0.2, "delayMix" = 0.0,
        "drive" = 0.0, "structure" = 0.2, "stereoWidth" = 0.4,
    ]),
    factory!("Ambient Texture", [
        "masterVolume" = 0.9, "basePitch" = 0.5, "envAttack" = 0.8, "envHold" = 0.0,
        "envDecay" = 0.5, "envSustain" = 0.6, "envRelease" = 3.0, "filterCutoff" = 3000.0,
        "filterResonance" = 0.4, "filterType" = 0.0, "reverbMix" = 0.7, "delayMix" = 0.4,
        "drive" = 0.05, "structure" = 0.8, "stereoWidth" = 1.0,
    ]),
];
