//! Real-time control and render core for a sample-playback instrument.
//!
//! The host owns an [`Instrument`] and calls [`Instrument::render`] from its
//! audio callback with the block's MIDI and parameter events. A
//! [`ControlSurface`] created alongside it reads and writes parameters,
//! queues preview notes and performs bank, instrument and preset operations
//! between render calls.

pub mod bank;
pub mod bridge;
pub mod dispatch;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod event;
pub mod instrument;
pub mod params;
pub mod preset;
pub mod wasm;

pub use bridge::{ControlSurface, ParameterInfo};
pub use dispatch::{DispatchCounts, DispatchStats, Dispatcher};
pub use dsp::SamplerEngine;
pub use engine::{EngineConfig, SynthEngine};
pub use error::{BankError, Error, PresetError, RenderError, Result};
pub use event::{Event, EventKind, MidiAction, MidiMessage};
pub use instrument::Instrument;
pub use params::{ParamAddress, ParamSpec, ParameterRegistry, SAMPLER_PARAMETERS, SamplerParam, Unit};
pub use preset::{FACTORY_PRESETS, FactoryPreset, PresetState};

use wasm_bindgen::prelude::*;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the sampler_core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}
