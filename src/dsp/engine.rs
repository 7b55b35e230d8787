//! Sampler engine: a fixed voice pool playing the selected bank instrument
//! through the master effect chain.
//!
//! The render path reads parameters from the shared registry at the start of
//! every slice, comparing each value with the last one applied, so writes
//! from the control surface take effect at the next slice boundary without
//! any locking.

use std::path::Path;
use std::sync::Arc;

use crate::bank::Bank;
use crate::engine::{EngineConfig, SynthEngine, validate_render_format};
use crate::error::{BankError, Error, PresetError, RenderError, Result};
use crate::params::{ParamAddress, ParameterRegistry, SAMPLER_PARAMETERS, SamplerParam};
use crate::preset::{InstrumentSelection, PresetState};

use super::delay::Delay;
use super::envelope::Curve;
use super::filter::{FilterType, resonance_to_q};
use super::mixer::Mixer;
use super::reverb::Reverb;
use super::sampler::SamplerVoice;

const DEFAULT_SAMPLE_RATE: f64 = 48_000.0;
const REVERB_ROOM_SIZE: f64 = 0.5;
const REVERB_DAMPING: f64 = 0.5;

/// Engine-side copy of the parameter values, in engine units.
#[derive(Debug, Clone)]
struct Settings {
    master_volume: f64,
    bend_range: f64,
    base_pitch: f64,
    attack: f64,
    hold: f64,
    decay: f64,
    sustain: f64,
    release: f64,
    attack_curve: Curve,
    decay_curve: Curve,
    release_curve: Curve,
    cutoff: f64,
    q: f64,
    filter_enabled: bool,
    filter_type: FilterType,
    drive: f64,
    structure: f64,
    width: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            master_volume: 0.8,
            bend_range: 2.0,
            base_pitch: 1.0,
            attack: 0.01,
            hold: 0.0,
            decay: 0.1,
            sustain: 0.7,
            release: 0.2,
            attack_curve: Curve::Exponential,
            decay_curve: Curve::Exponential,
            release_curve: Curve::Exponential,
            cutoff: 20_000.0,
            q: resonance_to_q(0.0),
            filter_enabled: false,
            filter_type: FilterType::Lowpass,
            drive: 0.0,
            structure: 0.5,
            width: 0.5,
        }
    }
}

impl Settings {
    /// Copy envelope and filter settings onto a voice.
    fn configure(&self, voice: &mut SamplerVoice) {
        let env = &mut voice.envelope;
        env.attack = self.attack;
        env.hold = self.hold;
        env.decay = self.decay;
        env.sustain = self.sustain;
        env.release = self.release;
        env.attack_curve = self.attack_curve;
        env.decay_curve = self.decay_curve;
        env.release_curve = self.release_curve;
        voice.filter.configure(self.filter_type, self.cutoff, self.q);
    }

    /// Gain for a MIDI velocity: `structure` 0 ignores velocity, 1 follows it
    /// fully.
    fn velocity_gain(&self, velocity: u8) -> f64 {
        let v = velocity.min(127) as f64 / 127.0;
        1.0 - self.structure * (1.0 - v)
    }

    /// Read-step multiplier from base pitch and the current bend.
    fn pitch_factor(&self, bend: f64) -> f64 {
        self.base_pitch * (2.0_f64).powf(bend * self.bend_range / 12.0)
    }
}

/// The production [`SynthEngine`]: multi-zone sample playback.
pub struct SamplerEngine {
    config: EngineConfig,
    registry: Arc<ParameterRegistry>,
    /// Last value applied per address.
    applied: Vec<f32>,
    settings: Settings,
    bank: Bank,
    selected: usize,
    voices: Vec<SamplerVoice>,
    next_serial: u64,
    /// Normalized pitch bend.
    bend: f64,
    mixer: Mixer,
    delay: Delay,
    reverb: Reverb,
    sample_rate: f64,
    max_frames: usize,
    initialized: bool,
}

impl SamplerEngine {
    /// Engine with its own sampler registry.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let registry = Arc::new(ParameterRegistry::sampler()?);
        Self::with_registry(config, registry)
    }

    /// Engine reading from an existing registry, which must hold the
    /// sampler's parameter table in declaration order.
    pub fn with_registry(config: EngineConfig, registry: Arc<ParameterRegistry>) -> Result<Self> {
        config.validate()?;
        let table_matches = registry.len() == SAMPLER_PARAMETERS.len()
            && registry
                .iter()
                .zip(SAMPLER_PARAMETERS.iter())
                .all(|((_, a), b)| a.key == b.key);
        if !table_matches {
            return Err(Error::InvalidConfig(
                "registry does not hold the sampler parameter table".into(),
            ));
        }

        let voices = (0..config.max_voices)
            .map(|_| SamplerVoice::new(DEFAULT_SAMPLE_RATE))
            .collect();
        let mut engine = SamplerEngine {
            applied: vec![f32::NAN; registry.len()],
            registry,
            settings: Settings::default(),
            bank: Bank::builtin(),
            selected: 0,
            voices,
            next_serial: 0,
            bend: 0.0,
            mixer: Mixer::new(),
            delay: Delay::master(DEFAULT_SAMPLE_RATE),
            reverb: Reverb::new(DEFAULT_SAMPLE_RATE, REVERB_ROOM_SIZE, REVERB_DAMPING),
            sample_rate: DEFAULT_SAMPLE_RATE,
            max_frames: 0,
            initialized: false,
            config,
        };
        engine.sync_parameters();
        Ok(engine)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn bank(&self) -> &Bank {
        &self.bank
    }

    /// Swap in a decoded bank and select `index`. Every voice is cut.
    pub fn install_bank(&mut self, bank: Bank, index: usize) -> std::result::Result<(), PresetError> {
        if index >= bank.len() {
            return Err(PresetError::InstrumentOutOfRange {
                index,
                count: bank.len(),
            });
        }
        self.all_sound_off();
        self.bank = bank;
        self.selected = index;
        Ok(())
    }

    /// Apply registry changes made since the last call. Real-time.
    fn sync_parameters(&mut self) {
        for i in 0..self.applied.len() {
            let address = ParamAddress(i as u32);
            let value = self.registry.get_by_address(address);
            // NaN sentinel forces the first application.
            if value.to_bits() != self.applied[i].to_bits() {
                self.applied[i] = value;
                self.apply_parameter(address, value);
            }
        }
    }

    fn apply_parameter(&mut self, address: ParamAddress, value: f32) {
        let Some(param) = SamplerParam::from_address(address) else {
            return;
        };
        let v = value as f64;
        let s = &mut self.settings;
        match param {
            SamplerParam::MasterVolume => s.master_volume = v,
            SamplerParam::PitchBendRange => s.bend_range = v,
            SamplerParam::BasePitch => s.base_pitch = v,
            SamplerParam::EnvAttack => s.attack = v,
            SamplerParam::EnvHold => s.hold = v,
            SamplerParam::EnvDecay => s.decay = v,
            SamplerParam::EnvSustain => s.sustain = v,
            SamplerParam::EnvRelease => s.release = v,
            SamplerParam::EnvAttackCurve => s.attack_curve = Curve::from_index(value),
            SamplerParam::EnvDecayCurve => s.decay_curve = Curve::from_index(value),
            SamplerParam::EnvReleaseCurve => s.release_curve = Curve::from_index(value),
            SamplerParam::FilterCutoff => s.cutoff = v,
            SamplerParam::FilterResonance => s.q = resonance_to_q(v),
            SamplerParam::FilterEnabled => s.filter_enabled = value > 0.5,
            SamplerParam::FilterType => s.filter_type = FilterType::from_index(value),
            SamplerParam::ReverbMix => self.reverb.mix = v,
            SamplerParam::DelayMix => self.delay.mix = v,
            SamplerParam::Drive => s.drive = v,
            SamplerParam::Structure => s.structure = v,
            SamplerParam::StereoWidth => s.width = v,
        }
        let retune_voices = matches!(
            param,
            SamplerParam::EnvAttack
                | SamplerParam::EnvHold
                | SamplerParam::EnvDecay
                | SamplerParam::EnvSustain
                | SamplerParam::EnvRelease
                | SamplerParam::EnvAttackCurve
                | SamplerParam::EnvDecayCurve
                | SamplerParam::EnvReleaseCurve
                | SamplerParam::FilterCutoff
                | SamplerParam::FilterResonance
                | SamplerParam::FilterType
        );
        if retune_voices {
            for voice in self.voices.iter_mut().filter(|v| v.is_active()) {
                self.settings.configure(voice);
            }
        }
    }

    /// Index of the voice to use for a new note: a free slot, else the
    /// oldest sounding voice.
    fn allocate_voice(&self) -> usize {
        if let Some(free) = self.voices.iter().position(|v| !v.is_active()) {
            return free;
        }
        self.voices
            .iter()
            .enumerate()
            .min_by_key(|(_, v)| v.serial())
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    fn selection(&self) -> InstrumentSelection {
        InstrumentSelection {
            index: self.selected,
            source: self.bank.source().map(|p| p.display().to_string()),
        }
    }
}

impl SynthEngine for SamplerEngine {
    fn initialize(&mut self, sample_rate: f64, max_frames: usize) -> Result<()> {
        validate_render_format(sample_rate, max_frames)?;

        self.mixer.allocate(max_frames);
        self.delay = Delay::master(sample_rate);
        self.reverb = Reverb::new(sample_rate, REVERB_ROOM_SIZE, REVERB_DAMPING);
        for voice in &mut self.voices {
            voice.kill();
            voice.envelope.set_sample_rate(sample_rate);
            voice.filter.set_sample_rate(sample_rate);
        }
        self.sample_rate = sample_rate;
        self.max_frames = max_frames;
        self.initialized = true;

        // Effects were rebuilt; re-apply everything.
        self.applied.fill(f32::NAN);
        self.sync_parameters();

        log::info!(
            "Sampler engine initialized: {sample_rate} Hz, {max_frames} frames, {} voices",
            self.voices.len()
        );
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn max_frames(&self) -> usize {
        self.max_frames
    }

    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn registry(&self) -> &Arc<ParameterRegistry> {
        &self.registry
    }

    fn render(
        &mut self,
        outputs: &mut [&mut [f32]],
        offset: usize,
        frames: usize,
        _timestamp: u64,
    ) -> std::result::Result<(), RenderError> {
        if !self.initialized {
            return Err(RenderError::NotInitialized);
        }
        if frames > self.max_frames {
            return Err(RenderError::TooManyFrames {
                requested: frames,
                max: self.max_frames,
            });
        }
        if outputs.is_empty() {
            return Err(RenderError::NoOutputChannels);
        }
        let needed = offset + frames;
        if let Some(short) = outputs.iter().find(|ch| ch.len() < needed) {
            return Err(RenderError::BufferTooShort {
                len: short.len(),
                needed,
            });
        }
        if frames == 0 {
            return Ok(());
        }

        self.sync_parameters();

        self.mixer.clear(frames);
        let pitch_factor = self.settings.pitch_factor(self.bend);
        let filtered = self.settings.filter_enabled;
        if let Some(instrument) = self.bank.instrument(self.selected) {
            for voice in self.voices.iter_mut().filter(|v| v.is_active()) {
                let Some(zone) = instrument.zones.get(voice.zone()) else {
                    voice.kill();
                    continue;
                };
                for i in 0..frames {
                    let sample = voice.next_sample(&zone.buffer, pitch_factor, filtered);
                    self.mixer.add(i, sample);
                }
            }
        }

        self.mixer.apply_drive(self.settings.drive, frames);
        {
            let (left, right) = self.mixer.channels_mut(frames);
            self.delay.process_block(left, right);
            self.reverb.process_block(left, right);
        }
        self.mixer.apply_width(self.settings.width, frames);
        self.mixer.master_gain = self.settings.master_volume;
        self.mixer.finish(frames);

        let left = self.mixer.left(frames);
        let right = self.mixer.right(frames);
        let range = offset..needed;
        match outputs {
            [mono] => {
                for ((out, l), r) in mono[range].iter_mut().zip(left).zip(right) {
                    *out = (l + r) * 0.5;
                }
            }
            [first, second, rest @ ..] => {
                first[range.clone()].copy_from_slice(left);
                second[range.clone()].copy_from_slice(right);
                for ch in rest {
                    ch[range.clone()].fill(0.0);
                }
            }
            [] => {}
        }
        Ok(())
    }

    fn set_parameter(&mut self, address: ParamAddress, value: f32) {
        let stored = self.registry.set_by_address(address, value);
        if let Some(slot) = self.applied.get_mut(address.index()) {
            *slot = stored;
            self.apply_parameter(address, stored);
        }
    }

    fn note_on(&mut self, note: u8, velocity: u8) {
        if velocity == 0 {
            self.note_off(note);
            return;
        }
        // Start the voice with settings written since the last slice.
        self.sync_parameters();
        let Some(instrument) = self.bank.instrument(self.selected) else {
            return;
        };
        let Some(zone_index) = instrument.find_zone(note, velocity) else {
            return;
        };
        let zone = &instrument.zones[zone_index];

        let slot = self.allocate_voice();
        let serial = self.next_serial;
        self.next_serial += 1;

        let voice = &mut self.voices[slot];
        voice.kill();
        self.settings.configure(voice);
        voice.start(
            zone_index,
            zone,
            note,
            self.settings.velocity_gain(velocity),
            serial,
            self.config.tuning_pitch,
            self.sample_rate,
        );
    }

    fn note_off(&mut self, note: u8) {
        for voice in &mut self.voices {
            if voice.is_active() && voice.note() == note {
                voice.release();
            }
        }
    }

    fn pitch_bend(&mut self, bend: f32) {
        self.bend = if bend.is_finite() {
            bend.clamp(-1.0, 1.0) as f64
        } else {
            0.0
        };
    }

    fn all_notes_off(&mut self) {
        for voice in &mut self.voices {
            voice.release();
        }
    }

    fn all_sound_off(&mut self) {
        for voice in &mut self.voices {
            voice.kill();
        }
        self.delay.clear();
        self.reverb.clear();
    }

    fn active_voice_count(&self) -> usize {
        self.voices.iter().filter(|v| v.is_active()).count()
    }

    fn instrument_count(&self) -> usize {
        self.bank.len()
    }

    fn instrument_name(&self, index: usize) -> Option<&str> {
        self.bank.instrument(index).map(|i| i.name.as_str())
    }

    fn selected_instrument(&self) -> usize {
        self.selected
    }

    fn bank_source(&self) -> Option<&Path> {
        self.bank.source()
    }

    fn try_load_instrument_bank(&mut self, path: &Path) -> std::result::Result<(), BankError> {
        let bank = Bank::load(path)?;
        log::info!(
            "Loaded bank '{}' from {} ({} instrument(s))",
            bank.name(),
            path.display(),
            bank.len()
        );
        // A loaded bank is never empty, so index 0 always exists.
        if self.install_bank(bank, 0).is_err() {
            return Err(BankError::Empty);
        }
        Ok(())
    }

    fn try_select_instrument(&mut self, index: usize) -> std::result::Result<(), PresetError> {
        if index >= self.bank.len() {
            return Err(PresetError::InstrumentOutOfRange {
                index,
                count: self.bank.len(),
            });
        }
        if index != self.selected {
            self.all_sound_off();
            self.selected = index;
        }
        Ok(())
    }

    fn serialize_state(&self) -> String {
        PresetState::capture(&self.registry, Some(self.selection())).to_json()
    }

    fn try_apply_state(&mut self, blob: &str) -> std::result::Result<(), PresetError> {
        let state = PresetState::from_json(blob)?;

        // Stage everything that can fail before touching live state.
        let mut staged = None;
        if let Some(selection) = &state.instrument {
            let current = self.bank.source().map(|p| p.display().to_string());
            let count = if selection.source == current {
                self.bank.len()
            } else {
                let bank = match &selection.source {
                    Some(path) => Bank::load(Path::new(path))?,
                    None => Bank::builtin(),
                };
                let count = bank.len();
                staged = Some(bank);
                count
            };
            if selection.index >= count {
                return Err(PresetError::InstrumentOutOfRange {
                    index: selection.index,
                    count,
                });
            }
        }

        if let Some(selection) = &state.instrument {
            match staged {
                Some(bank) => self.install_bank(bank, selection.index)?,
                None => self.try_select_instrument(selection.index)?,
            }
        }
        let applied = state.apply_parameters(&self.registry);
        self.sync_parameters();
        log::debug!("Preset applied ({applied} parameter(s))");
        Ok(())
    }
}
