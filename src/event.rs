//! Render-block events: raw MIDI and parameter changes.
//!
//! Events are plain `Copy` values so a block's batch can be moved into the
//! dispatcher's scratch buffer without touching the heap.

use crate::params::ParamAddress;

/// A short MIDI message held inline (status byte plus up to two data bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiMessage {
    bytes: [u8; 3],
    len: u8,
}

impl MidiMessage {
    /// Build from raw bytes. Anything past the third byte is discarded.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut bytes = [0u8; 3];
        let len = data.len().min(3);
        bytes[..len].copy_from_slice(&data[..len]);
        MidiMessage {
            bytes,
            len: len as u8,
        }
    }

    pub fn note_on(channel: u8, note: u8, velocity: u8) -> Self {
        Self::from_bytes(&[0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F])
    }

    pub fn note_off(channel: u8, note: u8) -> Self {
        Self::from_bytes(&[0x80 | (channel & 0x0F), note & 0x7F, 0])
    }

    /// Pitch bend from a 14-bit value (8192 = centre).
    pub fn pitch_bend(channel: u8, value: u16) -> Self {
        let value = value.min(0x3FFF);
        Self::from_bytes(&[
            0xE0 | (channel & 0x0F),
            (value & 0x7F) as u8,
            (value >> 7) as u8,
        ])
    }

    pub fn control_change(channel: u8, controller: u8, value: u8) -> Self {
        Self::from_bytes(&[0xB0 | (channel & 0x0F), controller & 0x7F, value & 0x7F])
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// Decode into an engine action. `None` for unsupported or truncated
    /// messages.
    pub fn decode(&self) -> Option<MidiAction> {
        let [status, d1, d2] = self.bytes;
        if self.len == 0 || status & 0x80 == 0 {
            return None;
        }
        // Every supported message carries two data bytes.
        if self.len < 3 || d1 & 0x80 != 0 || d2 & 0x80 != 0 {
            return None;
        }
        match status & 0xF0 {
            0x90 if d2 == 0 => Some(MidiAction::NoteOff { note: d1 }),
            0x90 => Some(MidiAction::NoteOn {
                note: d1,
                velocity: d2,
            }),
            0x80 => Some(MidiAction::NoteOff { note: d1 }),
            0xE0 => {
                let raw = ((d2 as i32) << 7) | d1 as i32;
                Some(MidiAction::PitchBend((raw - 8192) as f32 / 8192.0))
            }
            0xB0 => match d1 {
                120 => Some(MidiAction::AllSoundOff),
                123 => Some(MidiAction::AllNotesOff),
                _ => None,
            },
            _ => None,
        }
    }
}

/// What a decoded MIDI message asks the engine to do.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MidiAction {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8 },
    /// Normalized bend in [-1, 1).
    PitchBend(f32),
    AllSoundOff,
    AllNotesOff,
}

/// Event payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventKind {
    Midi(MidiMessage),
    Parameter { address: ParamAddress, value: f32 },
}

/// A timestamped event inside one render block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Event {
    /// Frame offset from the start of the block.
    pub offset: u32,
    pub kind: EventKind,
}

impl Event {
    pub fn midi(offset: u32, message: MidiMessage) -> Self {
        Event {
            offset,
            kind: EventKind::Midi(message),
        }
    }

    pub fn parameter(offset: u32, address: ParamAddress, value: f32) -> Self {
        Event {
            offset,
            kind: EventKind::Parameter { address, value },
        }
    }

    pub fn note_on(offset: u32, note: u8, velocity: u8) -> Self {
        Self::midi(offset, MidiMessage::note_on(0, note, velocity))
    }

    pub fn note_off(offset: u32, note: u8) -> Self {
        Self::midi(offset, MidiMessage::note_off(0, note))
    }
}
