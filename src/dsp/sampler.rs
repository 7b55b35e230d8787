//! Sample playback: zone data and the voices that read it.
//!
//! Plays back audio samples with pitch-shifting via cubic interpolation
//! resampling. Supports multi-zone key splits, velocity layers, loop points
//! with a short crossfade at the seam, and tuning-aware playback rate
//! calculation.
//!
//! Voices never own audio. They hold the index of the zone they play and
//! borrow its buffer on every render call, so starting a note is free of
//! allocation.

use super::envelope::Envelope;
use super::filter::{BiquadFilter, FilterType};

/// Length of the loop-seam crossfade, in seconds of source audio.
const LOOP_CROSSFADE_SECONDS: f64 = 0.005;

/// Calculate the playback rate for a sample to sound at the target pitch.
///
/// # Arguments
/// * `target_midi_note` - The MIDI note being played (0-127)
/// * `root_note` - The MIDI note the sample was recorded at
/// * `fine_tune_cents` - Fine tune offset in cents
/// * `tuning_pitch` - A4 frequency (default 440.0)
///
/// # Returns
/// The playback rate multiplier. 1.0 = original speed, 2.0 = one octave up.
pub fn sample_playback_rate(
    target_midi_note: u8,
    root_note: u8,
    fine_tune_cents: f64,
    tuning_pitch: f64,
) -> f64 {
    let semitone_diff = target_midi_note as f64 - root_note as f64 - fine_tune_cents / 100.0;
    let base_rate = (2.0_f64).powf(semitone_diff / 12.0);

    // Tuning adjustment (ratio to standard 440 Hz)
    base_rate * (tuning_pitch / 440.0)
}

/// A single sample buffer loaded into memory.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    /// Mono f64 samples.
    pub data: Vec<f64>,
    /// Native sample rate of the audio.
    pub sample_rate: u32,
}

impl SampleBuffer {
    pub fn new(data: Vec<f64>, sample_rate: u32) -> Self {
        SampleBuffer { data, sample_rate }
    }

    /// Create from 16-bit signed PCM data.
    pub fn from_i16(pcm: &[i16], sample_rate: u32) -> Self {
        let data: Vec<f64> = pcm.iter().map(|&s| s as f64 / 32768.0).collect();
        SampleBuffer { data, sample_rate }
    }

    /// Create from f32 samples.
    pub fn from_f32(samples: &[f32], sample_rate: u32) -> Self {
        let data: Vec<f64> = samples.iter().map(|&s| s as f64).collect();
        SampleBuffer { data, sample_rate }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Read a sample with 4-point cubic interpolation at a fractional
    /// position. Taps past the buffer edges repeat the edge sample.
    #[inline]
    pub fn read_cubic(&self, position: f64) -> f64 {
        self.cubic(position, None)
    }

    /// Read inside a held loop `[start, end)`.
    ///
    /// Taps past `end` continue from `start`. Over the last few milliseconds
    /// before `end` the output fades into the audio leading up to `start`,
    /// so the jump back to `start` lands on the same signal.
    #[inline]
    pub fn read_looped(&self, position: f64, start: f64, end: f64) -> f64 {
        let wrap = Some((start as usize, end as usize));
        let fade = (LOOP_CROSSFADE_SECONDS * self.sample_rate as f64)
            .min((end - start) * 0.5)
            .min(start);
        let fade_from = end - fade;
        if fade >= 1.0 && position > fade_from {
            let amount = ((position - fade_from) / fade).min(1.0);
            let lead_in = start - fade + (position - fade_from);
            return self.cubic(position, wrap) * (1.0 - amount) + self.cubic(lead_in, wrap) * amount;
        }
        self.cubic(position, wrap)
    }

    fn cubic(&self, position: f64, wrap: Option<(usize, usize)>) -> f64 {
        if self.data.is_empty() || !(position >= 0.0) {
            return 0.0;
        }
        let last = self.data.len() - 1;
        let index = position as usize;
        if index > last {
            return 0.0;
        }
        let tap = |i: usize| {
            let i = match wrap {
                Some((start, end)) if end > start && i >= end => start + (i - end) % (end - start),
                _ => i,
            };
            self.data[i.min(last)]
        };
        let y0 = tap(index.saturating_sub(1));
        let y1 = tap(index);
        let y2 = tap(index + 1);
        let y3 = tap(index + 2);
        let t = position - index as f64;
        y1 + 0.5
            * t
            * (y2 - y0
                + t * (2.0 * y0 - 5.0 * y1 + 4.0 * y2 - y3 + t * (3.0 * (y1 - y2) + y3 - y0)))
    }
}

/// A loaded zone: mapping metadata plus its audio buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedZone {
    pub key_range_low: u8,
    pub key_range_high: u8,
    pub velocity_low: u8,
    pub velocity_high: u8,
    pub root_note: u8,
    pub fine_tune_cents: f64,
    /// Loop start/end in samples; only valid loops are kept.
    pub loop_points: Option<(u64, u64)>,
    pub buffer: SampleBuffer,
}

impl LoadedZone {
    /// A zone covering every key and velocity.
    pub fn full_range(root_note: u8, buffer: SampleBuffer) -> Self {
        LoadedZone {
            key_range_low: 0,
            key_range_high: 127,
            velocity_low: 0,
            velocity_high: 127,
            root_note,
            fine_tune_cents: 0.0,
            loop_points: None,
            buffer,
        }
    }

    /// Check if a MIDI note falls within this zone's key range.
    pub fn contains_note(&self, midi_note: u8) -> bool {
        midi_note >= self.key_range_low && midi_note <= self.key_range_high
    }

    pub fn contains_velocity(&self, velocity: u8) -> bool {
        velocity >= self.velocity_low && velocity <= self.velocity_high
    }
}

/// A playable instrument: a named set of zones.
#[derive(Debug, Clone, PartialEq)]
pub struct SampledInstrument {
    pub name: String,
    pub zones: Vec<LoadedZone>,
}

impl SampledInstrument {
    pub fn new(name: impl Into<String>, zones: Vec<LoadedZone>) -> Self {
        SampledInstrument {
            name: name.into(),
            zones,
        }
    }

    /// Index of the best zone for a note: the first zone matching key and
    /// velocity, else the first matching key alone.
    pub fn find_zone(&self, midi_note: u8, velocity: u8) -> Option<usize> {
        self.zones
            .iter()
            .position(|z| z.contains_note(midi_note) && z.contains_velocity(velocity))
            .or_else(|| self.zones.iter().position(|z| z.contains_note(midi_note)))
    }
}

/// A voice slot in the engine's fixed pool.
#[derive(Debug, Clone)]
pub struct SamplerVoice {
    active: bool,
    note: u8,
    /// Trigger order; lower is older.
    serial: u64,
    zone: usize,
    /// Current read position in the zone buffer (fractional).
    position: f64,
    /// Read step at the unbent pitch, including sample-rate conversion.
    base_step: f64,
    /// Velocity gain after sensitivity scaling.
    gain: f64,
    loop_points: Option<(f64, f64)>,
    released: bool,
    pub envelope: Envelope,
    pub filter: BiquadFilter,
}

impl SamplerVoice {
    /// An idle voice.
    pub fn new(sample_rate: f64) -> Self {
        SamplerVoice {
            active: false,
            note: 0,
            serial: 0,
            zone: 0,
            position: 0.0,
            base_step: 1.0,
            gain: 0.0,
            loop_points: None,
            released: false,
            envelope: Envelope::new(sample_rate),
            filter: BiquadFilter::new(FilterType::Lowpass, sample_rate),
        }
    }

    /// Begin playing `zone` (at index `zone_index` of the current instrument).
    /// The envelope and filter settings must already be applied.
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        &mut self,
        zone_index: usize,
        zone: &LoadedZone,
        midi_note: u8,
        gain: f64,
        serial: u64,
        tuning_pitch: f64,
        engine_sample_rate: f64,
    ) {
        let pitch_rate = sample_playback_rate(
            midi_note,
            zone.root_note,
            zone.fine_tune_cents,
            tuning_pitch,
        );
        let sr_ratio = zone.buffer.sample_rate as f64 / engine_sample_rate;

        self.active = true;
        self.note = midi_note;
        self.serial = serial;
        self.zone = zone_index;
        self.position = 0.0;
        self.base_step = pitch_rate * sr_ratio;
        self.gain = gain;
        self.loop_points = zone
            .loop_points
            .map(|(start, end)| (start as f64, end as f64));
        self.released = false;
        self.filter.reset();
        self.envelope.reset();
        self.envelope.gate_on();
    }

    /// Note off: enter the release stage.
    pub fn release(&mut self) {
        if self.active && !self.released {
            self.released = true;
            self.envelope.gate_off();
        }
    }

    /// Silence the voice immediately.
    pub fn kill(&mut self) {
        self.active = false;
        self.released = false;
        self.envelope.reset();
        self.filter.reset();
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn note(&self) -> u8 {
        self.note
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn zone(&self) -> usize {
        self.zone
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    /// Generate the next sample. `pitch_factor` scales the read step (base
    /// pitch and pitch bend).
    #[inline]
    pub fn next_sample(&mut self, buffer: &SampleBuffer, pitch_factor: f64, filtered: bool) -> f64 {
        if !self.active {
            return 0.0;
        }

        let sample = match self.loop_points {
            Some((start, end)) if !self.released => buffer.read_looped(self.position, start, end),
            _ => buffer.read_cubic(self.position),
        };
        self.position += self.base_step * pitch_factor;

        if let Some((loop_start, loop_end)) = self.loop_points {
            if !self.released && self.position >= loop_end {
                let loop_length = loop_end - loop_start;
                self.position = loop_start + (self.position - loop_end) % loop_length;
            }
        }

        if self.position >= buffer.len() as f64 {
            self.kill();
            return 0.0;
        }

        let env = self.envelope.next_sample();
        if self.envelope.is_finished() {
            self.kill();
            return 0.0;
        }

        let out = sample * env * self.gain;
        if filtered {
            self.filter.process(out)
        } else {
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test_buffer() -> SampleBuffer {
        // 440 Hz sine, 44.1 kHz, 1 second
        let sample_rate = 44100;
        let freq = 440.0;
        let data: Vec<f64> = (0..sample_rate)
            .map(|i| {
                let t = i as f64 / sample_rate as f64;
                (2.0 * std::f64::consts::PI * freq * t).sin()
            })
            .collect();

        SampleBuffer::new(data, sample_rate)
    }

    fn make_test_zone() -> LoadedZone {
        LoadedZone::full_range(69, make_test_buffer())
    }

    fn started_voice(zone: &LoadedZone, note: u8, gain: f64, tuning: f64) -> SamplerVoice {
        let mut voice = SamplerVoice::new(44100.0);
        voice.envelope.attack = 0.001;
        voice.envelope.sustain = 1.0;
        voice.start(0, zone, note, gain, 1, tuning, 44100.0);
        voice
    }

    #[test]
    fn playback_rate_basics() {
        assert!((sample_playback_rate(60, 60, 0.0, 440.0) - 1.0).abs() < 1e-4);
        assert!((sample_playback_rate(72, 60, 0.0, 440.0) - 2.0).abs() < 1e-4);
        assert!((sample_playback_rate(48, 60, 0.0, 440.0) - 0.5).abs() < 1e-4);
        let fine = sample_playback_rate(60, 60, -6.0, 440.0);
        assert!((fine - (2.0_f64).powf(6.0 / 1200.0)).abs() < 1e-4, "got {fine}");
    }

    #[test]
    fn cubic_read_hits_samples_and_follows_a_ramp() {
        let wave = SampleBuffer::new(vec![0.0, 1.0, 0.0, -1.0], 44100);
        assert_eq!(wave.read_cubic(1.0), 1.0);
        assert_eq!(wave.read_cubic(2.0), 0.0);
        assert_eq!(wave.read_cubic(10.0), 0.0);
        assert_eq!(wave.read_cubic(-1.0), 0.0);

        let ramp = SampleBuffer::new((0..8).map(f64::from).collect(), 44100);
        for position in [1.25, 2.5, 5.75] {
            assert!((ramp.read_cubic(position) - position).abs() < 1e-12);
        }
    }

    #[test]
    fn loop_seam_meets_the_loop_start() {
        let ramp = SampleBuffer::new((0..1000).map(f64::from).collect(), 44100);
        // Away from the seam the read is unchanged.
        assert!((ramp.read_looped(600.0, 500.0, 900.0) - 600.0).abs() < 1e-9);
        // Just before the end it has faded onto the audio at the loop start.
        let at_seam = ramp.read_looped(899.99, 500.0, 900.0);
        let at_start = ramp.read_looped(500.0, 500.0, 900.0);
        assert!((at_seam - at_start).abs() < 0.1, "{at_seam} vs {at_start}");
    }

    #[test]
    fn loop_from_zero_wraps_its_taps() {
        let data: Vec<f64> = (0..100).map(|i| if i < 99 { 0.25 } else { 0.75 }).collect();
        let buf = SampleBuffer::new(data, 44100);
        // The tap after the last frame comes from the loop start, not the edge.
        assert!((buf.read_looped(98.5, 0.0, 100.0) - 0.53125).abs() < 1e-12);
        assert!((buf.read_cubic(98.5) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn sample_buffer_from_i16() {
        let pcm: Vec<i16> = vec![0, 16384, -16384, 32767];
        let buf = SampleBuffer::from_i16(&pcm, 44100);

        assert_eq!(buf.len(), 4);
        assert!((buf.data[0]).abs() < 0.001);
        assert!((buf.data[1] - 0.5).abs() < 0.01);
        assert!((buf.data[2] + 0.5).abs() < 0.01);
    }

    #[test]
    fn find_zone_by_key_and_velocity() {
        let soft = LoadedZone {
            key_range_high: 60,
            velocity_high: 63,
            ..make_test_zone()
        };
        let hard = LoadedZone {
            key_range_high: 60,
            velocity_low: 64,
            ..make_test_zone()
        };
        let upper = LoadedZone {
            key_range_low: 61,
            ..make_test_zone()
        };
        let inst = SampledInstrument::new("Split", vec![soft, hard, upper]);

        assert_eq!(inst.find_zone(60, 20), Some(0));
        assert_eq!(inst.find_zone(60, 100), Some(1));
        assert_eq!(inst.find_zone(72, 100), Some(2));
    }

    #[test]
    fn find_zone_falls_back_to_key_match() {
        let zone = LoadedZone {
            velocity_low: 100,
            ..make_test_zone()
        };
        let inst = SampledInstrument::new("Layer", vec![zone]);
        assert_eq!(inst.find_zone(60, 10), Some(0));
    }

    #[test]
    fn voice_produces_sound() {
        let zone = make_test_zone();
        let mut voice = started_voice(&zone, 69, 1.0, 440.0);

        let mut max_val = 0.0_f64;
        for _ in 0..4410 {
            let s = voice.next_sample(&zone.buffer, 1.0, false);
            max_val = max_val.max(s.abs());
        }

        assert!(max_val > 0.1, "Voice should produce audible output, max={max_val}");
    }

    #[test]
    fn voice_at_root_pitch_and_octave_up() {
        let zone = make_test_zone();
        let mut root = started_voice(&zone, 69, 1.0, 440.0);
        let mut octave = started_voice(&zone, 81, 1.0, 440.0);

        for _ in 0..100 {
            root.next_sample(&zone.buffer, 1.0, false);
            octave.next_sample(&zone.buffer, 1.0, false);
        }

        assert!((root.position() - 100.0).abs() < 1e-6, "got {}", root.position());
        assert!((octave.position() - 200.0).abs() < 1e-6, "got {}", octave.position());
    }

    #[test]
    fn pitch_factor_scales_step() {
        let zone = make_test_zone();
        let mut voice = started_voice(&zone, 69, 1.0, 440.0);
        for _ in 0..100 {
            voice.next_sample(&zone.buffer, 1.5, false);
        }
        assert!((voice.position() - 150.0).abs() < 1e-6, "got {}", voice.position());
    }

    #[test]
    fn voice_finishes_at_buffer_end() {
        let zone = LoadedZone::full_range(69, SampleBuffer::new(vec![1.0; 100], 44100));
        let mut voice = started_voice(&zone, 69, 1.0, 440.0);

        for _ in 0..200 {
            voice.next_sample(&zone.buffer, 1.0, false);
        }

        assert!(!voice.is_active(), "Voice should finish after buffer ends");
    }

    #[test]
    fn voice_loops_while_held() {
        let zone = LoadedZone {
            loop_points: Some((500, 900)),
            ..LoadedZone::full_range(69, SampleBuffer::new(vec![0.5; 1000], 44100))
        };
        let mut voice = started_voice(&zone, 69, 1.0, 440.0);

        for _ in 0..5000 {
            voice.next_sample(&zone.buffer, 1.0, false);
        }
        assert!(voice.is_active(), "Looping voice should not finish while held");
        assert!(voice.position() >= 500.0 && voice.position() < 900.0);
    }

    #[test]
    fn voice_release_ends_playback() {
        let zone = LoadedZone {
            loop_points: Some((500, 9000)),
            ..LoadedZone::full_range(69, SampleBuffer::new(vec![0.5; 10000], 44100))
        };
        let mut voice = started_voice(&zone, 69, 1.0, 440.0);

        for _ in 0..500 {
            voice.next_sample(&zone.buffer, 1.0, false);
        }
        voice.release();
        assert!(voice.is_released());

        let mut finished = false;
        for _ in 0..50000 {
            voice.next_sample(&zone.buffer, 1.0, false);
            if !voice.is_active() {
                finished = true;
                break;
            }
        }
        assert!(finished, "Voice should finish after release");
    }

    #[test]
    fn voice_tuning_432() {
        let zone = make_test_zone();
        let mut voice = started_voice(&zone, 69, 1.0, 432.0);

        for _ in 0..1000 {
            voice.next_sample(&zone.buffer, 1.0, false);
        }

        let expected_pos = 432.0 / 440.0 * 1000.0;
        assert!(
            (voice.position() - expected_pos).abs() < 1e-6,
            "Position should be ~{expected_pos} at 432Hz tuning, got {}",
            voice.position()
        );
    }

    #[test]
    fn voice_gain_scaling() {
        let zone = LoadedZone::full_range(69, SampleBuffer::new(vec![0.8; 44100], 44100));
        let mut loud = started_voice(&zone, 69, 1.0, 440.0);
        let mut quiet = started_voice(&zone, 69, 0.5, 440.0);

        for _ in 0..500 {
            loud.next_sample(&zone.buffer, 1.0, false);
            quiet.next_sample(&zone.buffer, 1.0, false);
        }

        let ratio = quiet.next_sample(&zone.buffer, 1.0, false)
            / loud.next_sample(&zone.buffer, 1.0, false);
        assert!((ratio - 0.5).abs() < 1e-9, "Half gain should halve amplitude, ratio={ratio}");
    }

    #[test]
    fn kill_silences() {
        let zone = make_test_zone();
        let mut voice = started_voice(&zone, 69, 1.0, 440.0);
        voice.next_sample(&zone.buffer, 1.0, false);
        voice.kill();
        assert!(!voice.is_active());
        assert_eq!(voice.next_sample(&zone.buffer, 1.0, false), 0.0);
    }
}
