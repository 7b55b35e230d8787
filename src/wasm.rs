//! WebAssembly binding for an AudioWorklet host.
//!
//! The worklet owns one [`WasmSampler`], queues note events as they arrive
//! from the main thread and has `render` fill its interleaved stereo block.
//! The event queue holds at most `event_capacity` entries between renders;
//! events past that are dropped and counted.

use std::path::Path;

use wasm_bindgen::prelude::*;

use crate::bank::{Bank, BankManifest};
use crate::bridge::ControlSurface;
use crate::engine::{EngineConfig, SynthEngine};
use crate::error::RenderError;
use crate::event::{Event, MidiMessage};
use crate::instrument::Instrument;

fn js_error(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&format!("{e}"))
}

/// A sampler instrument driven from JavaScript.
#[wasm_bindgen]
pub struct WasmSampler {
    instrument: Instrument,
    surface: ControlSurface,
    left: Vec<f32>,
    right: Vec<f32>,
    pending: Vec<Event>,
    event_capacity: usize,
    frames_rendered: u64,
}

#[wasm_bindgen]
impl WasmSampler {
    /// Create a sampler. `config_json` may override any `EngineConfig` field.
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: Option<String>) -> Result<WasmSampler, JsValue> {
        let config = match config_json {
            Some(json) => EngineConfig::from_json(&json).map_err(js_error)?,
            None => EngineConfig::default(),
        };
        let event_capacity = config.event_capacity;
        let (instrument, surface) = Instrument::new(config).map_err(js_error)?;
        Ok(WasmSampler {
            instrument,
            surface,
            left: Vec::new(),
            right: Vec::new(),
            pending: Vec::with_capacity(event_capacity),
            event_capacity,
            frames_rendered: 0,
        })
    }

    pub fn initialize(&mut self, sample_rate: f64, max_frames: usize) -> Result<(), JsValue> {
        self.instrument
            .initialize(sample_rate, max_frames)
            .map_err(js_error)?;
        self.left = vec![0.0; max_frames];
        self.right = vec![0.0; max_frames];
        Ok(())
    }

    /// Queue a note-on at `offset` frames into the next block. `false` when
    /// the queue is full.
    pub fn note_on(&mut self, note: u8, velocity: u8, offset: u32) -> bool {
        self.queue(Event::note_on(offset, note, velocity))
    }

    pub fn note_off(&mut self, note: u8, offset: u32) -> bool {
        self.queue(Event::note_off(offset, note))
    }

    /// Queue a raw MIDI message (up to three bytes).
    pub fn midi(&mut self, bytes: &[u8], offset: u32) -> bool {
        self.queue(Event::midi(offset, MidiMessage::from_bytes(bytes)))
    }

    /// Render `frames` frames into `out` as interleaved stereo. `out` must
    /// hold at least `2 * frames` samples.
    pub fn render(&mut self, frames: usize, out: &mut [f32]) -> Result<(), JsValue> {
        if out.len() < frames * 2 {
            self.pending.clear();
            return Err(js_error(RenderError::BufferTooShort {
                len: out.len() / 2,
                needed: frames,
            }));
        }
        let result = {
            let mut outs: [&mut [f32]; 2] = [&mut self.left, &mut self.right];
            self.instrument.render(
                frames,
                &mut outs,
                self.frames_rendered,
                self.pending.drain(..),
            )
        };
        self.frames_rendered = self.frames_rendered.wrapping_add(frames as u64);
        result.map_err(js_error)?;

        for (frame, (l, r)) in out
            .chunks_exact_mut(2)
            .zip(self.left[..frames].iter().zip(&self.right[..frames]))
        {
            frame[0] = *l;
            frame[1] = *r;
        }
        Ok(())
    }

    pub fn set_parameter(&self, key: &str, value: f32) -> Option<f32> {
        self.surface.set_parameter(key, value)
    }

    pub fn get_parameter(&self, key: &str) -> Option<f32> {
        self.surface.get_parameter(key)
    }

    pub fn display_string(&self, key: &str) -> Option<String> {
        self.surface.display_string(key)
    }

    /// Parameter listing as an array of objects.
    pub fn parameters(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&self.surface.parameters()).map_err(js_error)
    }

    pub fn instruments(&self) -> Vec<String> {
        self.surface.instruments(&self.instrument)
    }

    pub fn select_instrument(&mut self, index: usize) -> bool {
        self.surface.select_instrument(&mut self.instrument, index)
    }

    /// Install a bank from manifest JSON. Zones must use inline PCM audio.
    pub fn load_bank_json(&mut self, manifest_json: &str) -> Result<(), JsValue> {
        let manifest: BankManifest = serde_json::from_str(manifest_json).map_err(js_error)?;
        let bank = Bank::from_manifest(&manifest, Path::new("")).map_err(js_error)?;
        self.instrument
            .engine_mut()
            .install_bank(bank, 0)
            .map_err(js_error)
    }

    pub fn save_preset(&self) -> String {
        self.surface.save_preset(&self.instrument)
    }

    pub fn load_preset(&mut self, blob: &str) -> bool {
        self.surface.load_preset(&mut self.instrument, blob)
    }

    pub fn factory_preset_names(&self) -> Vec<String> {
        self.surface
            .factory_presets()
            .iter()
            .map(|p| p.name.to_string())
            .collect()
    }

    pub fn load_factory_preset(&mut self, index: usize) -> bool {
        self.surface.load_factory_preset(&mut self.instrument, index)
    }

    pub fn active_voices(&self) -> usize {
        self.instrument.engine().active_voice_count()
    }

    /// Drain real-time diagnostics into the log; returns how many anomalies
    /// were seen since the last call.
    pub fn report_diagnostics(&self) -> u64 {
        let c = self.surface.report_diagnostics();
        c.clamped_offsets + c.dropped_events + c.ignored_midi + c.failed_blocks
    }
}

impl WasmSampler {
    fn queue(&mut self, event: Event) -> bool {
        if self.pending.len() >= self.event_capacity {
            self.instrument.stats().record_dropped_event();
            return false;
        }
        self.pending.push(event);
        true
    }
}
