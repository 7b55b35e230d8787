//! Sample-accurate event dispatch inside one render block.
//!
//! A block's events are copied into a scratch buffer sized once up front,
//! ordered by `(offset, arrival)`, and applied against the engine at their
//! frame offsets. The frames between two event offsets are rendered as one
//! slice, so an event only affects audio from its own offset onwards.
//!
//! Nothing here allocates, locks or logs. Anomalies are counted in
//! [`DispatchStats`] and reported later from the control context.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::engine::SynthEngine;
use crate::error::RenderError;
use crate::event::{Event, EventKind, MidiAction};

/// Real-time anomaly counters shared with the control surface.
#[derive(Debug, Default)]
pub struct DispatchStats {
    clamped_offsets: AtomicU64,
    dropped_events: AtomicU64,
    ignored_midi: AtomicU64,
    failed_blocks: AtomicU64,
}

/// Counter values taken from [`DispatchStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchCounts {
    /// Events whose offset lay past the block end.
    pub clamped_offsets: u64,
    /// Events that did not fit in the scratch buffer.
    pub dropped_events: u64,
    /// Malformed or unsupported MIDI messages.
    pub ignored_midi: u64,
    /// Blocks that failed and were replaced by silence.
    pub failed_blocks: u64,
}

impl DispatchCounts {
    pub fn is_clean(&self) -> bool {
        *self == DispatchCounts::default()
    }
}

impl DispatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn record_dropped_event(&self) {
        self.dropped_events.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_failed_block(&self) {
        self.failed_blocks.fetch_add(1, Ordering::Relaxed);
    }

    /// Current values without resetting.
    pub fn peek(&self) -> DispatchCounts {
        DispatchCounts {
            clamped_offsets: self.clamped_offsets.load(Ordering::Relaxed),
            dropped_events: self.dropped_events.load(Ordering::Relaxed),
            ignored_midi: self.ignored_midi.load(Ordering::Relaxed),
            failed_blocks: self.failed_blocks.load(Ordering::Relaxed),
        }
    }

    /// Read and reset every counter.
    pub fn take(&self) -> DispatchCounts {
        DispatchCounts {
            clamped_offsets: self.clamped_offsets.swap(0, Ordering::Relaxed),
            dropped_events: self.dropped_events.swap(0, Ordering::Relaxed),
            ignored_midi: self.ignored_midi.swap(0, Ordering::Relaxed),
            failed_blocks: self.failed_blocks.swap(0, Ordering::Relaxed),
        }
    }
}

/// A staged event: `(offset, arrival sequence, event)`.
type Staged = (u32, u32, Event);

/// Splits a render block at event offsets.
pub struct Dispatcher {
    scratch: Vec<Staged>,
    capacity: usize,
    stats: Arc<DispatchStats>,
}

impl Dispatcher {
    /// Dispatcher holding at most `capacity` events per block.
    pub fn new(capacity: usize, stats: Arc<DispatchStats>) -> Self {
        Dispatcher {
            scratch: Vec::with_capacity(capacity),
            capacity,
            stats,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> &Arc<DispatchStats> {
        &self.stats
    }

    /// Render `frame_count` frames into `outputs`, applying `events` at
    /// their offsets. Real-time.
    ///
    /// Events are consumed even when the block fails. With zero frames the
    /// events are applied in order and nothing is rendered.
    pub fn dispatch<E, I>(
        &mut self,
        engine: &mut E,
        outputs: &mut [&mut [f32]],
        frame_count: usize,
        timestamp: u64,
        events: I,
    ) -> Result<(), RenderError>
    where
        E: SynthEngine + ?Sized,
        I: IntoIterator<Item = Event>,
    {
        self.stage(events, frame_count);

        if !engine.is_initialized() {
            self.scratch.clear();
            return Err(RenderError::NotInitialized);
        }
        if frame_count > engine.max_frames() {
            self.scratch.clear();
            return Err(RenderError::TooManyFrames {
                requested: frame_count,
                max: engine.max_frames(),
            });
        }

        let result = self.run(engine, outputs, frame_count, timestamp);
        self.scratch.clear();
        result
    }

    /// Copy events into scratch, clamp their offsets and sort them.
    fn stage<I>(&mut self, events: I, frame_count: usize)
    where
        I: IntoIterator<Item = Event>,
    {
        self.scratch.clear();
        let last = frame_count.saturating_sub(1) as u32;
        let mut sequence = 0u32;
        for event in events {
            if self.scratch.len() >= self.capacity {
                self.stats.record_dropped_event();
                continue;
            }
            let mut offset = event.offset;
            if offset as usize >= frame_count && frame_count > 0 {
                self.stats.clamped_offsets.fetch_add(1, Ordering::Relaxed);
                offset = last;
            } else if frame_count == 0 {
                offset = 0;
            }
            self.scratch.push((offset, sequence, event));
            sequence = sequence.wrapping_add(1);
        }
        // The sequence makes every key unique, so the unstable sort keeps
        // arrival order within an offset.
        self.scratch.sort_unstable_by_key(|&(offset, seq, _)| (offset, seq));
    }

    fn run<E>(
        &mut self,
        engine: &mut E,
        outputs: &mut [&mut [f32]],
        frame_count: usize,
        timestamp: u64,
    ) -> Result<(), RenderError>
    where
        E: SynthEngine + ?Sized,
    {
        let mut cursor = 0usize;
        let mut i = 0;
        while i < self.scratch.len() {
            let offset = self.scratch[i].0 as usize;
            if offset > cursor {
                let at = timestamp.wrapping_add(cursor as u64);
                engine.render(outputs, cursor, offset - cursor, at)?;
                cursor = offset;
            }
            // Every event sharing this offset.
            while i < self.scratch.len() && self.scratch[i].0 as usize == offset {
                let (_, _, event) = self.scratch[i];
                apply_event(engine, &event.kind, &self.stats);
                i += 1;
            }
        }
        if cursor < frame_count {
            let at = timestamp.wrapping_add(cursor as u64);
            engine.render(outputs, cursor, frame_count - cursor, at)?;
        }
        Ok(())
    }
}

/// Apply one event to the engine. Real-time.
fn apply_event<E>(engine: &mut E, kind: &EventKind, stats: &DispatchStats)
where
    E: SynthEngine + ?Sized,
{
    match *kind {
        EventKind::Parameter { address, value } => engine.set_parameter(address, value),
        EventKind::Midi(message) => match message.decode() {
            Some(MidiAction::NoteOn { note, velocity }) => engine.note_on(note, velocity),
            Some(MidiAction::NoteOff { note }) => engine.note_off(note),
            Some(MidiAction::PitchBend(bend)) => engine.pitch_bend(bend),
            Some(MidiAction::AllSoundOff) => engine.all_sound_off(),
            Some(MidiAction::AllNotesOff) => engine.all_notes_off(),
            None => {
                stats.ignored_midi.fetch_add(1, Ordering::Relaxed);
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::SamplerEngine;
    use crate::engine::EngineConfig;
    use crate::event::MidiMessage;
    use crate::params::SamplerParam;

    fn setup(capacity: usize) -> (Dispatcher, SamplerEngine) {
        let mut engine = SamplerEngine::new(EngineConfig::default()).unwrap();
        engine.initialize(48_000.0, 512).unwrap();
        (Dispatcher::new(capacity, Arc::new(DispatchStats::new())), engine)
    }

    fn run_block(d: &mut Dispatcher, e: &mut SamplerEngine, events: Vec<Event>) -> Vec<f32> {
        let mut left = vec![0.0; 512];
        let mut right = vec![0.0; 512];
        {
            let mut outs: [&mut [f32]; 2] = [&mut left, &mut right];
            d.dispatch(e, &mut outs, 512, 0, events).unwrap();
        }
        left
    }

    #[test]
    fn note_is_silent_before_its_offset() {
        let (mut d, mut e) = setup(16);
        let left = run_block(&mut d, &mut e, vec![Event::note_on(256, 69, 127)]);
        assert!(left[..256].iter().all(|&s| s == 0.0));
        assert!(left[256..].iter().any(|&s| s != 0.0));
    }

    #[test]
    fn out_of_range_offsets_are_clamped_and_counted() {
        let (mut d, mut e) = setup(16);
        run_block(&mut d, &mut e, vec![Event::note_on(4096, 60, 100)]);
        assert_eq!(e.active_voice_count(), 1);
        assert_eq!(d.stats().take().clamped_offsets, 1);
        assert!(d.stats().peek().is_clean());
    }

    #[test]
    fn overflow_is_dropped_and_counted() {
        let (mut d, mut e) = setup(2);
        let events = vec![
            Event::note_on(0, 60, 100),
            Event::note_on(1, 62, 100),
            Event::note_on(2, 64, 100),
        ];
        run_block(&mut d, &mut e, events);
        assert_eq!(e.active_voice_count(), 2);
        assert_eq!(d.stats().peek().dropped_events, 1);
    }

    #[test]
    fn malformed_midi_is_ignored() {
        let (mut d, mut e) = setup(16);
        let events = vec![
            Event::midi(0, MidiMessage::from_bytes(&[0x90, 60])),
            Event::midi(0, MidiMessage::from_bytes(&[0x3C, 0x40, 0x40])),
            Event::midi(0, MidiMessage::control_change(0, 7, 100)),
        ];
        let left = run_block(&mut d, &mut e, events);
        assert!(left.iter().all(|&s| s == 0.0));
        assert_eq!(d.stats().peek().ignored_midi, 3);
    }

    #[test]
    fn same_offset_keeps_arrival_order() {
        let (mut d, mut e) = setup(16);
        let address = SamplerParam::Drive.address();
        let events = vec![
            Event::parameter(10, address, 0.9),
            Event::parameter(3, address, 0.1),
            Event::parameter(10, address, 0.4),
        ];
        run_block(&mut d, &mut e, events);
        assert_eq!(e.get_parameter(address), 0.4);
    }

    #[test]
    fn uninitialized_engine_fails_and_consumes_events() {
        let stats = Arc::new(DispatchStats::new());
        let mut d = Dispatcher::new(8, stats);
        let mut e = SamplerEngine::new(EngineConfig::default()).unwrap();
        let mut buf = vec![0.0; 64];
        let mut outs: [&mut [f32]; 1] = [&mut buf];
        let result = d.dispatch(&mut e, &mut outs, 64, 0, vec![Event::note_on(0, 60, 100)]);
        assert_eq!(result, Err(RenderError::NotInitialized));
        assert_eq!(e.active_voice_count(), 0);
        assert!(d.scratch.is_empty());
    }

    #[test]
    fn all_sound_off_controller() {
        let (mut d, mut e) = setup(16);
        let events = vec![
            Event::note_on(0, 60, 100),
            Event::midi(100, MidiMessage::control_change(0, 120, 0)),
        ];
        let left = run_block(&mut d, &mut e, events);
        assert_eq!(e.active_voice_count(), 0);
        assert!(left[100..].iter().all(|&s| s == 0.0));
    }
}
