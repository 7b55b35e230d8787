//! Control-surface bridge: the non-real-time API used by an editor or UI.
//!
//! Parameter reads and writes go straight to the shared registry and may be
//! made from any thread. Preview notes travel through a lock-free ring to
//! the render thread. Operations that reshape the engine (bank loads,
//! instrument selection, presets) borrow the [`Instrument`] mutably, so the
//! host can only call them between render calls.

use std::path::Path;
use std::sync::Arc;

use ringbuf::HeapProd;
use ringbuf::traits::Producer;
use serde::Serialize;

use crate::dispatch::{DispatchCounts, DispatchStats};
use crate::engine::SynthEngine;
use crate::event::Event;
use crate::instrument::Instrument;
use crate::params::{ParamAddress, ParameterRegistry, Unit};
use crate::preset::{FACTORY_PRESETS, FactoryPreset};

/// One row of the parameter listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterInfo {
    pub address: u32,
    pub key: &'static str,
    pub name: &'static str,
    pub min: f32,
    pub max: f32,
    pub default: f32,
    pub value: f32,
    pub unit: Unit,
    /// Current value formatted for display.
    pub display: String,
    pub readable: bool,
    pub writable: bool,
    pub can_ramp: bool,
}

/// Handle held by the control surface. Never renders.
pub struct ControlSurface {
    registry: Arc<ParameterRegistry>,
    preview: HeapProd<Event>,
    stats: Arc<DispatchStats>,
}

impl ControlSurface {
    pub(crate) fn new(
        registry: Arc<ParameterRegistry>,
        preview: HeapProd<Event>,
        stats: Arc<DispatchStats>,
    ) -> Self {
        ControlSurface {
            registry,
            preview,
            stats,
        }
    }

    pub fn registry(&self) -> &Arc<ParameterRegistry> {
        &self.registry
    }

    /// Clamp and store a value. The engine picks it up at the start of its
    /// next render slice. Returns the stored value, `None` for unknown keys.
    pub fn set_parameter(&self, key: &str, value: f32) -> Option<f32> {
        let stored = self.registry.set(key, value);
        match stored {
            Some(v) => log::debug!("Parameter {key} = {v}"),
            None => log::debug!("Ignoring write to unknown parameter '{key}'"),
        }
        stored
    }

    pub fn get_parameter(&self, key: &str) -> Option<f32> {
        self.registry.get(key)
    }

    /// Current value of `key` formatted for display.
    pub fn display_string(&self, key: &str) -> Option<String> {
        let value = self.registry.get(key)?;
        self.registry.display_string(key, value)
    }

    pub fn parameters(&self) -> Vec<ParameterInfo> {
        self.registry
            .iter()
            .map(|(ParamAddress(address), spec)| {
                let value = self.registry.get_by_address(ParamAddress(address));
                ParameterInfo {
                    address,
                    key: spec.key,
                    name: spec.name,
                    min: spec.min,
                    max: spec.max,
                    default: spec.default,
                    value,
                    unit: spec.unit,
                    display: spec.display(value),
                    readable: spec.flags.readable,
                    writable: spec.flags.writable,
                    can_ramp: spec.flags.can_ramp,
                }
            })
            .collect()
    }

    /// Queue a note-on for the start of the next block. `false` when the
    /// queue is full.
    pub fn preview_note_on(&mut self, note: u8, velocity: u8) -> bool {
        self.preview.try_push(Event::note_on(0, note, velocity)).is_ok()
    }

    /// Queue a note-off for the start of the next block.
    pub fn preview_note_off(&mut self, note: u8) -> bool {
        self.preview.try_push(Event::note_off(0, note)).is_ok()
    }

    pub fn instrument_count<E: SynthEngine>(&self, instrument: &Instrument<E>) -> usize {
        instrument.engine().instrument_count()
    }

    pub fn instrument_name<'a, E: SynthEngine>(
        &self,
        instrument: &'a Instrument<E>,
        index: usize,
    ) -> Option<&'a str> {
        instrument.engine().instrument_name(index)
    }

    /// Names of every instrument in the loaded bank.
    pub fn instruments<E: SynthEngine>(&self, instrument: &Instrument<E>) -> Vec<String> {
        let engine = instrument.engine();
        (0..engine.instrument_count())
            .filter_map(|i| engine.instrument_name(i).map(str::to_string))
            .collect()
    }

    pub fn selected_instrument<E: SynthEngine>(&self, instrument: &Instrument<E>) -> usize {
        instrument.engine().selected_instrument()
    }

    pub fn select_instrument<E: SynthEngine>(
        &self,
        instrument: &mut Instrument<E>,
        index: usize,
    ) -> bool {
        instrument.engine_mut().select_instrument(index)
    }

    /// Load a bank manifest. On failure the previous bank stays active.
    pub fn load_instrument_bank<E: SynthEngine>(
        &self,
        instrument: &mut Instrument<E>,
        path: impl AsRef<Path>,
    ) -> bool {
        instrument.engine_mut().load_instrument_bank(path.as_ref())
    }

    pub fn save_preset<E: SynthEngine>(&self, instrument: &Instrument<E>) -> String {
        instrument.engine().serialize_state()
    }

    /// Apply a preset blob all-or-nothing.
    pub fn load_preset<E: SynthEngine>(&self, instrument: &mut Instrument<E>, blob: &str) -> bool {
        instrument.engine_mut().apply_state(blob)
    }

    pub fn factory_presets(&self) -> &'static [FactoryPreset] {
        &FACTORY_PRESETS
    }

    /// Apply a factory preset's values, keeping the current instrument.
    pub fn load_factory_preset<E: SynthEngine>(
        &self,
        instrument: &mut Instrument<E>,
        index: usize,
    ) -> bool {
        let Some(preset) = FACTORY_PRESETS.get(index) else {
            log::warn!("No factory preset at index {index}");
            return false;
        };
        log::debug!("Loading factory preset '{}'", preset.name);
        instrument.engine_mut().apply_state(&preset.to_state().to_json())
    }

    /// Drain the real-time anomaly counters into the log.
    pub fn report_diagnostics(&self) -> DispatchCounts {
        let counts = self.stats.take();
        if counts.clamped_offsets > 0 {
            log::warn!(
                "{} event(s) had offsets past the block end and were clamped",
                counts.clamped_offsets
            );
        }
        if counts.dropped_events > 0 {
            log::warn!(
                "{} event(s) dropped: block event capacity exceeded",
                counts.dropped_events
            );
        }
        if counts.ignored_midi > 0 {
            log::warn!("{} malformed or unsupported MIDI message(s) ignored", counts.ignored_midi);
        }
        if counts.failed_blocks > 0 {
            log::warn!("{} render block(s) failed and were silenced", counts.failed_blocks);
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;

    fn setup() -> (Instrument, ControlSurface) {
        let (mut inst, surface) = Instrument::new(EngineConfig::default()).unwrap();
        inst.initialize(48_000.0, 512).unwrap();
        (inst, surface)
    }

    #[test]
    fn writes_are_clamped_and_shared() {
        let (inst, surface) = setup();
        assert_eq!(surface.set_parameter("filterCutoff", 25_000.0), Some(20_000.0));
        assert_eq!(inst.engine().registry().get("filterCutoff"), Some(20_000.0));
        assert_eq!(surface.set_parameter("nope", 1.0), None);
    }

    #[test]
    fn display_uses_labels() {
        let (_inst, surface) = setup();
        surface.set_parameter("filterType", 3.0);
        assert_eq!(surface.display_string("filterType").as_deref(), Some("Notch"));
        surface.set_parameter("filterEnabled", 1.0);
        assert_eq!(surface.display_string("filterEnabled").as_deref(), Some("On"));
        assert_eq!(surface.display_string("drive").as_deref(), Some("0.00"));
    }

    #[test]
    fn listing_is_in_address_order() {
        let (_inst, surface) = setup();
        let params = surface.parameters();
        assert_eq!(params.len(), 20);
        assert_eq!(params[0].key, "masterVolume");
        assert!(params.iter().enumerate().all(|(i, p)| p.address == i as u32));
    }

    #[test]
    fn listing_reports_access_flags() {
        let (_inst, surface) = setup();
        let params = surface.parameters();
        let volume = &params[0];
        assert!(volume.readable && volume.writable && volume.can_ramp);
        let filter_type = params.iter().find(|p| p.key == "filterType").unwrap();
        assert!(filter_type.writable && !filter_type.can_ramp);

        let json = serde_json::to_value(volume).unwrap();
        assert_eq!(json["canRamp"], true);
        assert_eq!(json["unit"], "generic");
    }

    #[test]
    fn preview_queue_reports_full() {
        let config = EngineConfig {
            preview_queue_capacity: 2,
            ..EngineConfig::default()
        };
        let (_inst, mut surface) = Instrument::new(config).unwrap();
        assert!(surface.preview_note_on(60, 100));
        assert!(surface.preview_note_on(62, 100));
        assert!(!surface.preview_note_on(64, 100));
    }

    #[test]
    fn builtin_bank_listing() {
        let (mut inst, surface) = setup();
        assert_eq!(surface.instruments(&inst), vec!["Sine".to_string()]);
        assert!(surface.select_instrument(&mut inst, 0));
        assert!(!surface.select_instrument(&mut inst, 1));
        assert!(!surface.load_instrument_bank(&mut inst, "/nonexistent/bank.json"));
        assert_eq!(surface.instrument_name(&inst, 0), Some("Sine"));
    }

    #[test]
    fn factory_preset_applies_values() {
        let (mut inst, surface) = setup();
        let pad = surface
            .factory_presets()
            .iter()
            .position(|p| p.name == "Synth Pad")
            .unwrap();
        assert!(surface.load_factory_preset(&mut inst, pad));
        assert_eq!(surface.get_parameter("envRelease"), Some(1.5));
        assert_eq!(surface.get_parameter("filterCutoff"), Some(4000.0));
        assert!(!surface.load_factory_preset(&mut inst, 99));
    }

    #[test]
    fn diagnostics_drain_counters() {
        let (mut inst, surface) = setup();
        let mut l = vec![0.0; 64];
        let mut outs: [&mut [f32]; 1] = [&mut l];
        inst.render(64, &mut outs, 0, [Event::note_on(1000, 60, 100)])
            .unwrap();
        let counts = surface.report_diagnostics();
        assert_eq!(counts.clamped_offsets, 1);
        assert!(surface.report_diagnostics().is_clean());
    }

    #[test]
    fn preset_round_trip_through_surface() {
        let (mut inst, surface) = setup();
        surface.set_parameter("reverbMix", 0.35);
        let blob = surface.save_preset(&inst);
        surface.set_parameter("reverbMix", 0.9);
        assert!(surface.load_preset(&mut inst, &blob));
        assert_eq!(surface.get_parameter("reverbMix"), Some(0.35));
        assert!(!surface.load_preset(&mut inst, "not json"));
    }
}
