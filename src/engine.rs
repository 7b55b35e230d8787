//! The seam between the render path and a synthesis engine.
//!
//! The dispatcher and the instrument facade are generic over [`SynthEngine`];
//! [`crate::dsp::SamplerEngine`] is the production implementation.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{BankError, Error, PresetError, RenderError, Result};
use crate::params::{ParamAddress, ParameterRegistry};

/// Lowest accepted sample rate in Hz.
pub const MIN_SAMPLE_RATE: f64 = 8_000.0;
/// Highest accepted sample rate in Hz.
pub const MAX_SAMPLE_RATE: f64 = 384_000.0;
/// Largest render block accepted by `initialize`.
pub const MAX_BLOCK_FRAMES: usize = 16_384;

/// Static engine configuration. Sample rate and block size arrive through
/// [`SynthEngine::initialize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Size of the voice pool.
    pub max_voices: usize,
    /// Events the dispatcher can hold for one block.
    pub event_capacity: usize,
    /// Capacity of the control-surface preview note ring.
    pub preview_queue_capacity: usize,
    /// Frequency of A4 in Hz.
    pub tuning_pitch: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_voices: 16,
            event_capacity: 256,
            preview_queue_capacity: 64,
            tuning_pitch: 440.0,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_voices == 0 || self.max_voices > 256 {
            return Err(Error::InvalidConfig(format!(
                "max_voices must be in 1..=256, got {}",
                self.max_voices
            )));
        }
        if self.event_capacity == 0 {
            return Err(Error::InvalidConfig("event_capacity must be non-zero".into()));
        }
        if self.preview_queue_capacity == 0 {
            return Err(Error::InvalidConfig(
                "preview_queue_capacity must be non-zero".into(),
            ));
        }
        if !(self.tuning_pitch.is_finite() && self.tuning_pitch > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "tuning_pitch must be positive, got {}",
                self.tuning_pitch
            )));
        }
        Ok(())
    }

    /// Parse a JSON configuration; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

/// Check a sample rate / block size pair against the supported ranges.
pub fn validate_render_format(sample_rate: f64, max_frames: usize) -> Result<()> {
    if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&sample_rate) {
        return Err(Error::InvalidConfig(format!(
            "sample rate {sample_rate} Hz outside {MIN_SAMPLE_RATE}..={MAX_SAMPLE_RATE}"
        )));
    }
    if max_frames == 0 || max_frames > MAX_BLOCK_FRAMES {
        return Err(Error::InvalidConfig(format!(
            "max frames {max_frames} outside 1..={MAX_BLOCK_FRAMES}"
        )));
    }
    Ok(())
}

/// A synthesis engine driven by the event dispatcher.
///
/// Methods marked real-time must not allocate, lock or perform I/O. The
/// remaining methods run on the control context and need exclusive access,
/// so they can never overlap a render call on the same engine.
pub trait SynthEngine: Send {
    /// Allocate every buffer for the given format. Non-real-time.
    fn initialize(&mut self, sample_rate: f64, max_frames: usize) -> Result<()>;

    fn is_initialized(&self) -> bool;

    /// Largest block accepted by `render`; 0 before `initialize`.
    fn max_frames(&self) -> usize;

    fn sample_rate(&self) -> f64;

    /// The registry this engine reads its parameters from.
    fn registry(&self) -> &Arc<ParameterRegistry>;

    /// Write `frames` frames into `outputs[ch][offset..offset + frames]`.
    /// Real-time.
    fn render(
        &mut self,
        outputs: &mut [&mut [f32]],
        offset: usize,
        frames: usize,
        timestamp: u64,
    ) -> std::result::Result<(), RenderError>;

    /// Clamp and store a parameter value. Real-time.
    fn set_parameter(&mut self, address: ParamAddress, value: f32) {
        self.registry().set_by_address(address, value);
    }

    /// Real-time.
    fn get_parameter(&self, address: ParamAddress) -> f32 {
        self.registry().get_by_address(address)
    }

    /// Real-time.
    fn note_on(&mut self, note: u8, velocity: u8);

    /// Real-time.
    fn note_off(&mut self, note: u8);

    /// Normalized bend in [-1, 1]. Real-time.
    fn pitch_bend(&mut self, _bend: f32) {}

    /// Release every held voice. Real-time.
    fn all_notes_off(&mut self);

    /// Silence every voice immediately. Real-time.
    fn all_sound_off(&mut self);

    fn active_voice_count(&self) -> usize;

    fn instrument_count(&self) -> usize;

    fn instrument_name(&self, index: usize) -> Option<&str>;

    fn selected_instrument(&self) -> usize;

    /// Path of the loaded bank file, `None` for the built-in bank.
    fn bank_source(&self) -> Option<&Path>;

    /// Load a bank file and select its first instrument. On failure the
    /// previous bank stays active.
    fn try_load_instrument_bank(&mut self, path: &Path) -> std::result::Result<(), BankError>;

    fn load_instrument_bank(&mut self, path: &Path) -> bool {
        match self.try_load_instrument_bank(path) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Bank load from {} rejected: {e}", path.display());
                false
            }
        }
    }

    fn try_select_instrument(&mut self, index: usize) -> std::result::Result<(), PresetError>;

    fn select_instrument(&mut self, index: usize) -> bool {
        match self.try_select_instrument(index) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Instrument selection rejected: {e}");
                false
            }
        }
    }

    /// Encode the engine's state as a preset blob.
    fn serialize_state(&self) -> String;

    /// Apply a preset blob all-or-nothing.
    fn try_apply_state(&mut self, blob: &str) -> std::result::Result<(), PresetError>;

    fn apply_state(&mut self, blob: &str) -> bool {
        match self.try_apply_state(blob) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Preset rejected: {e}");
                false
            }
        }
    }
}
