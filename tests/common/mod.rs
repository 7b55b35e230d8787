//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sampler_core::bank::encode_inline_pcm;
use sampler_core::preset::PresetState;
use sampler_core::{
    BankError, ControlSurface, EngineConfig, Instrument, ParamAddress, ParameterRegistry,
    PresetError, RenderError, SynthEngine,
};

/// A call observed by [`RecordingEngine`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Render {
        offset: usize,
        frames: usize,
        timestamp: u64,
    },
    NoteOn(u8, u8),
    NoteOff(u8),
    Parameter(ParamAddress, f32),
    PitchBend(f32),
    AllNotesOff,
    AllSoundOff,
}

/// Engine that records every call and renders a constant level equal to the
/// number of note-ons received so far.
pub struct RecordingEngine {
    registry: Arc<ParameterRegistry>,
    pub calls: Vec<Call>,
    notes_seen: usize,
    max_frames: usize,
}

impl RecordingEngine {
    pub fn new(max_frames: usize) -> Self {
        RecordingEngine {
            registry: Arc::new(ParameterRegistry::sampler().unwrap()),
            calls: Vec::new(),
            notes_seen: 0,
            max_frames,
        }
    }

    /// `(offset, frames)` of every render call, in order.
    pub fn renders(&self) -> Vec<(usize, usize)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Render { offset, frames, .. } => Some((*offset, *frames)),
                _ => None,
            })
            .collect()
    }
}

impl SynthEngine for RecordingEngine {
    fn initialize(&mut self, _sample_rate: f64, max_frames: usize) -> sampler_core::Result<()> {
        self.max_frames = max_frames;
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.max_frames > 0
    }

    fn max_frames(&self) -> usize {
        self.max_frames
    }

    fn sample_rate(&self) -> f64 {
        48_000.0
    }

    fn registry(&self) -> &Arc<ParameterRegistry> {
        &self.registry
    }

    fn render(
        &mut self,
        outputs: &mut [&mut [f32]],
        offset: usize,
        frames: usize,
        timestamp: u64,
    ) -> Result<(), RenderError> {
        self.calls.push(Call::Render {
            offset,
            frames,
            timestamp,
        });
        for channel in outputs.iter_mut() {
            channel[offset..offset + frames].fill(self.notes_seen as f32);
        }
        Ok(())
    }

    fn set_parameter(&mut self, address: ParamAddress, value: f32) {
        self.registry.set_by_address(address, value);
        self.calls.push(Call::Parameter(address, value));
    }

    fn note_on(&mut self, note: u8, velocity: u8) {
        self.notes_seen += 1;
        self.calls.push(Call::NoteOn(note, velocity));
    }

    fn note_off(&mut self, note: u8) {
        self.calls.push(Call::NoteOff(note));
    }

    fn pitch_bend(&mut self, bend: f32) {
        self.calls.push(Call::PitchBend(bend));
    }

    fn all_notes_off(&mut self) {
        self.calls.push(Call::AllNotesOff);
    }

    fn all_sound_off(&mut self) {
        self.calls.push(Call::AllSoundOff);
    }

    fn active_voice_count(&self) -> usize {
        0
    }

    fn instrument_count(&self) -> usize {
        0
    }

    fn instrument_name(&self, _index: usize) -> Option<&str> {
        None
    }

    fn selected_instrument(&self) -> usize {
        0
    }

    fn bank_source(&self) -> Option<&Path> {
        None
    }

    fn try_load_instrument_bank(&mut self, _path: &Path) -> Result<(), BankError> {
        Err(BankError::Empty)
    }

    fn try_select_instrument(&mut self, index: usize) -> Result<(), PresetError> {
        Err(PresetError::InstrumentOutOfRange { index, count: 0 })
    }

    fn serialize_state(&self) -> String {
        PresetState::capture(&self.registry, None).to_json()
    }

    fn try_apply_state(&mut self, blob: &str) -> Result<(), PresetError> {
        let state = PresetState::from_json(blob)?;
        state.apply_parameters(&self.registry);
        Ok(())
    }
}

/// A sampler instrument initialized at 48 kHz with 512-frame blocks.
pub fn sampler() -> (Instrument, ControlSurface) {
    let (mut instrument, surface) = Instrument::new(EngineConfig::default()).unwrap();
    instrument.initialize(48_000.0, 512).unwrap();
    (instrument, surface)
}

/// Render one stereo block and return both channels.
pub fn render(
    instrument: &mut Instrument,
    frames: usize,
    events: Vec<sampler_core::Event>,
) -> (Vec<f32>, Vec<f32>) {
    let mut left = vec![0.0; frames];
    let mut right = vec![0.0; frames];
    {
        let mut outs: [&mut [f32]; 2] = [&mut left, &mut right];
        instrument.render(frames, &mut outs, 0, events).unwrap();
    }
    (left, right)
}

pub fn peak(buf: &[f32]) -> f32 {
    buf.iter().fold(0.0_f32, |m, s| m.max(s.abs()))
}

/// Half a second of a 16-bit sine at `freq` Hz, 44.1 kHz.
pub fn sine_pcm(freq: f64) -> Vec<i16> {
    (0..22_050)
        .map(|i| {
            let t = i as f64 / 44_100.0;
            ((2.0 * std::f64::consts::PI * freq * t).sin() * 12_000.0) as i16
        })
        .collect()
}

/// Write a two-instrument bank ("Keys", "Pad") with inline audio into
/// `dir` and return the manifest path.
pub fn write_bank(dir: &Path) -> PathBuf {
    let zone = |pcm: &[i16], root: u8| {
        format!(
            r#"{{"rootNote": {root}, "loop": {{"start": 1000, "end": 20000}}, "audio": {{"type": "inline-pcm", "data": "{}", "sampleRate": 44100}}}}"#,
            encode_inline_pcm(pcm)
        )
    };
    let json = format!(
        r#"{{"name": "Test Bank", "instruments": [
            {{"name": "Keys", "zones": [{}]}},
            {{"name": "Pad", "zones": [{}]}}
        ]}}"#,
        zone(&sine_pcm(261.63), 60),
        zone(&sine_pcm(440.0), 69),
    );
    let path = dir.join("bank.json");
    std::fs::write(&path, json).unwrap();
    path
}
