//! Instrument banks: a JSON manifest describing instruments and their zones.
//!
//! ```json
//! {"name": "Keys", "instruments": [{"name": "Piano", "zones": [
//!   {"keyRange": {"low": 0, "high": 127}, "rootNote": 60,
//!    "loop": {"start": 100, "end": 900},
//!    "audio": {"type": "wav", "path": "piano_c4.wav", "sha256": "..."}}]}]}
//! ```
//!
//! Zone audio is either a WAV file next to the manifest or inline base64
//! 16-bit PCM. Loading is all-or-nothing: the first bad zone fails the
//! whole bank.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use hound::{SampleFormat, WavReader};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::dsp::sampler::{LoadedZone, SampleBuffer, SampledInstrument};
use crate::error::BankError;

/// Top-level bank manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankManifest {
    #[serde(default)]
    pub name: String,
    pub instruments: Vec<InstrumentManifest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentManifest {
    pub name: String,
    #[serde(default)]
    pub zones: Vec<ZoneManifest>,
}

/// A single sample zone within an instrument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneManifest {
    /// MIDI key range this zone covers.
    #[serde(default, rename = "keyRange")]
    pub key_range: KeyRange,
    /// Optional velocity range for velocity layers.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "velocityRange")]
    pub velocity_range: Option<KeyRange>,
    /// The MIDI note the sample was recorded at (0-127).
    #[serde(default = "default_root_note", rename = "rootNote")]
    pub root_note: u8,
    /// Fine tune offset in cents.
    #[serde(default, rename = "fineTuneCents")]
    pub fine_tune_cents: f64,
    /// Loop points (sample offsets).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#loop: Option<LoopPoints>,
    pub audio: AudioSource,
}

fn default_root_note() -> u8 {
    60
}

/// Inclusive MIDI range, used for keys and velocities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRange {
    pub low: u8,
    pub high: u8,
}

impl Default for KeyRange {
    fn default() -> Self {
        KeyRange { low: 0, high: 127 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopPoints {
    pub start: u64,
    pub end: u64,
}

/// Where a zone's audio comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AudioSource {
    /// WAV file, relative to the manifest.
    Wav {
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sha256: Option<String>,
    },
    /// Raw little-endian 16-bit PCM, base64 encoded.
    InlinePcm {
        data: String,
        #[serde(rename = "sampleRate")]
        sample_rate: u32,
        #[serde(default = "default_channels")]
        channels: u16,
        #[serde(default = "default_bits", rename = "bitsPerSample")]
        bits_per_sample: u8,
    },
}

fn default_channels() -> u16 {
    1
}

fn default_bits() -> u8 {
    16
}

/// A decoded, playable bank.
#[derive(Debug, Clone, PartialEq)]
pub struct Bank {
    name: String,
    source: Option<PathBuf>,
    instruments: Vec<SampledInstrument>,
}

/// Name of the built-in bank.
pub const BUILTIN_BANK_NAME: &str = "Built-in";

impl Bank {
    /// The bank available before any file is loaded: one looped sine
    /// instrument covering the whole keyboard.
    pub fn builtin() -> Self {
        // 100-sample period at 44.1 kHz is 441 Hz; tune it down to A4.
        const RATE: u32 = 44_100;
        const PERIOD: usize = 100;
        const PERIODS: usize = 44;
        let data: Vec<f64> = (0..PERIOD * PERIODS)
            .map(|i| (2.0 * std::f64::consts::PI * i as f64 / PERIOD as f64).sin() * 0.5)
            .collect();
        let len = data.len() as u64;
        let zone = LoadedZone {
            fine_tune_cents: 1200.0 * (441.0_f64 / 440.0).log2(),
            loop_points: Some((0, len)),
            ..LoadedZone::full_range(69, SampleBuffer::new(data, RATE))
        };
        Bank {
            name: BUILTIN_BANK_NAME.to_string(),
            source: None,
            instruments: vec![SampledInstrument::new("Sine", vec![zone])],
        }
    }

    /// Read and decode a bank manifest from disk. Non-real-time.
    pub fn load(path: &Path) -> Result<Self, BankError> {
        let json = std::fs::read_to_string(path).map_err(|source| BankError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let manifest: BankManifest = serde_json::from_str(&json)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut bank = Self::from_manifest(&manifest, base_dir)?;
        bank.source = Some(path.to_path_buf());
        Ok(bank)
    }

    /// Decode a manifest, resolving WAV paths against `base_dir`.
    pub fn from_manifest(manifest: &BankManifest, base_dir: &Path) -> Result<Self, BankError> {
        if manifest.instruments.is_empty() {
            return Err(BankError::Empty);
        }
        let mut instruments = Vec::with_capacity(manifest.instruments.len());
        for inst in &manifest.instruments {
            if inst.zones.is_empty() {
                return Err(BankError::NoZones(inst.name.clone()));
            }
            let zones = inst
                .zones
                .iter()
                .map(|z| load_zone(&inst.name, z, base_dir))
                .collect::<Result<Vec<_>, _>>()?;
            instruments.push(SampledInstrument::new(inst.name.clone(), zones));
        }
        let name = if manifest.name.is_empty() {
            "Untitled".to_string()
        } else {
            manifest.name.clone()
        };
        log::debug!(
            "Decoded bank '{name}' with {} instrument(s)",
            instruments.len()
        );
        Ok(Bank {
            name,
            source: None,
            instruments,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the manifest this bank was loaded from.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn instruments(&self) -> &[SampledInstrument] {
        &self.instruments
    }

    pub fn instrument(&self, index: usize) -> Option<&SampledInstrument> {
        self.instruments.get(index)
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }
}

fn load_zone(instrument: &str, zone: &ZoneManifest, base_dir: &Path) -> Result<LoadedZone, BankError> {
    let invalid = |reason: String| BankError::InvalidZone {
        instrument: instrument.to_string(),
        reason,
    };

    let velocity = zone.velocity_range.unwrap_or_default();
    for (what, range) in [("key", zone.key_range), ("velocity", velocity)] {
        if range.low > range.high || range.high > 127 {
            return Err(invalid(format!(
                "{what} range {}..={} is not a valid MIDI range",
                range.low, range.high
            )));
        }
    }
    if zone.root_note > 127 {
        return Err(invalid(format!("root note {} out of range", zone.root_note)));
    }
    if !zone.fine_tune_cents.is_finite() {
        return Err(invalid("fine tune is not finite".to_string()));
    }

    let buffer = match &zone.audio {
        AudioSource::Wav { path, sha256 } => {
            let full = base_dir.join(path);
            read_wav(&full, sha256.as_deref())?
        }
        AudioSource::InlinePcm {
            data,
            sample_rate,
            channels,
            bits_per_sample,
        } => decode_inline_pcm(data, *sample_rate, *channels, *bits_per_sample)?,
    };
    if buffer.is_empty() || buffer.sample_rate == 0 {
        return Err(invalid("zone has no audio".to_string()));
    }

    let loop_points = match zone.r#loop {
        None => None,
        Some(LoopPoints { start, end }) => {
            if start >= end || end > buffer.len() as u64 {
                return Err(invalid(format!(
                    "loop {start}..{end} outside sample of {} frames",
                    buffer.len()
                )));
            }
            Some((start, end))
        }
    };

    Ok(LoadedZone {
        key_range_low: zone.key_range.low,
        key_range_high: zone.key_range.high,
        velocity_low: velocity.low,
        velocity_high: velocity.high,
        root_note: zone.root_note,
        fine_tune_cents: zone.fine_tune_cents,
        loop_points,
        buffer,
    })
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn read_wav(path: &Path, expected_sha256: Option<&str>) -> Result<SampleBuffer, BankError> {
    let display = path.display().to_string();
    let bytes = std::fs::read(path).map_err(|source| BankError::Io {
        path: display.clone(),
        source,
    })?;

    if let Some(expected) = expected_sha256 {
        let actual = sha256_hex(&bytes);
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(BankError::ChecksumMismatch {
                path: display,
                expected: expected.to_string(),
                actual,
            });
        }
    }

    let wav_err = |source| BankError::Wav {
        path: display.clone(),
        source,
    };
    let mut reader = WavReader::new(Cursor::new(bytes)).map_err(wav_err)?;
    let spec = reader.spec();

    let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(wav_err)?,
        (SampleFormat::Int, 8) => reader
            .samples::<i8>()
            .map(|s| s.map(|v| v as f32 / 128.0))
            .collect::<Result<Vec<_>, _>>()
            .map_err(wav_err)?,
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / 32768.0))
            .collect::<Result<Vec<_>, _>>()
            .map_err(wav_err)?,
        (SampleFormat::Int, 24 | 32) => {
            let denom = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / denom))
                .collect::<Result<Vec<_>, _>>()
                .map_err(wav_err)?
        }
        _ => {
            return Err(BankError::UnsupportedFormat(format!(
                "{display} ({}-bit {:?})",
                spec.bits_per_sample, spec.sample_format
            )));
        }
    };

    Ok(SampleBuffer::from_f32(
        &downmix(&samples, spec.channels as usize),
        spec.sample_rate,
    ))
}

fn decode_inline_pcm(
    data: &str,
    sample_rate: u32,
    channels: u16,
    bits_per_sample: u8,
) -> Result<SampleBuffer, BankError> {
    if bits_per_sample != 16 || channels == 0 {
        return Err(BankError::UnsupportedFormat(format!(
            "inline PCM ({bits_per_sample}-bit, {channels} channel(s))"
        )));
    }
    let bytes = STANDARD.decode(data.trim())?;
    if bytes.len() % 2 != 0 {
        return Err(BankError::UnsupportedFormat(
            "inline PCM with an odd byte count".to_string(),
        ));
    }
    let samples: Vec<f32> = bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0)
        .collect();
    Ok(SampleBuffer::from_f32(
        &downmix(&samples, channels as usize),
        sample_rate,
    ))
}

/// Average interleaved frames down to mono.
fn downmix(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Encode mono 16-bit PCM for an inline zone.
pub fn encode_inline_pcm(samples: &[i16]) -> String {
    let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    STANDARD.encode(bytes)
}
