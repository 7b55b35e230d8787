//! The host render boundary.
//!
//! An [`Instrument`] owns the engine, the dispatcher and the consumer side
//! of the preview note ring. The host calls [`Instrument::render`] once per
//! block from its audio callback; everything else goes through the
//! [`ControlSurface`] returned alongside it.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use ringbuf::traits::{Consumer, Split};
use ringbuf::{HeapCons, HeapRb};

use crate::bridge::ControlSurface;
use crate::dispatch::{DispatchStats, Dispatcher};
use crate::dsp::SamplerEngine;
use crate::engine::{EngineConfig, SynthEngine};
use crate::error::{RenderError, Result};
use crate::event::Event;

/// A synthesis engine wired to its event dispatcher.
pub struct Instrument<E: SynthEngine = SamplerEngine> {
    engine: E,
    dispatcher: Dispatcher,
    preview: HeapCons<Event>,
    stats: Arc<DispatchStats>,
}

impl Instrument<SamplerEngine> {
    /// A sampler instrument and its control surface.
    pub fn new(config: EngineConfig) -> Result<(Self, ControlSurface)> {
        let engine = SamplerEngine::new(config.clone())?;
        Self::with_engine(engine, &config)
    }
}

impl<E: SynthEngine> Instrument<E> {
    /// Wrap an existing engine. The control surface shares the engine's
    /// registry.
    pub fn with_engine(engine: E, config: &EngineConfig) -> Result<(Self, ControlSurface)> {
        config.validate()?;
        let stats = Arc::new(DispatchStats::new());
        let (producer, consumer) = HeapRb::<Event>::new(config.preview_queue_capacity).split();

        let surface = ControlSurface::new(engine.registry().clone(), producer, stats.clone());
        let instrument = Instrument {
            dispatcher: Dispatcher::new(config.event_capacity, stats.clone()),
            engine,
            preview: consumer,
            stats,
        };
        Ok((instrument, surface))
    }

    /// Prepare for rendering at `sample_rate` with blocks of up to
    /// `max_frames`. Non-real-time.
    pub fn initialize(&mut self, sample_rate: f64, max_frames: usize) -> Result<()> {
        self.engine.initialize(sample_rate, max_frames)
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn stats(&self) -> &Arc<DispatchStats> {
        &self.stats
    }

    /// Render one block. Real-time.
    ///
    /// Preview notes queued by the control surface are applied first, at
    /// offset 0. On error every requested frame of every channel is zeroed
    /// and the next call proceeds normally.
    pub fn render<I>(
        &mut self,
        frame_count: usize,
        outputs: &mut [&mut [f32]],
        timestamp: u64,
        events: I,
    ) -> std::result::Result<(), RenderError>
    where
        I: IntoIterator<Item = Event>,
    {
        let Instrument {
            engine,
            dispatcher,
            preview,
            ..
        } = self;

        let result = catch_unwind(AssertUnwindSafe(|| {
            if outputs.is_empty() {
                return Err(RenderError::NoOutputChannels);
            }
            let queued = std::iter::from_fn(|| preview.try_pop());
            dispatcher.dispatch(engine, outputs, frame_count, timestamp, queued.chain(events))
        }))
        .unwrap_or(Err(RenderError::Panicked));

        if result.is_err() {
            for channel in outputs.iter_mut() {
                let frames = frame_count.min(channel.len());
                channel[..frames].fill(0.0);
            }
            self.stats.record_failed_block();
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stereo(frames: usize) -> (Vec<f32>, Vec<f32>) {
        (vec![0.5; frames], vec![0.5; frames])
    }

    #[test]
    fn failed_block_is_silent_and_counted() {
        let (mut inst, _surface) = Instrument::new(EngineConfig::default()).unwrap();
        inst.initialize(48_000.0, 256).unwrap();
        let (mut l, mut r) = stereo(512);
        let result = {
            let mut outs: [&mut [f32]; 2] = [&mut l, &mut r];
            inst.render(512, &mut outs, 0, [])
        };
        assert!(matches!(result, Err(RenderError::TooManyFrames { .. })));
        assert!(l.iter().chain(&r).all(|&s| s == 0.0));
        assert_eq!(inst.stats().peek().failed_blocks, 1);

        let (mut l, mut r) = stereo(256);
        let mut outs: [&mut [f32]; 2] = [&mut l, &mut r];
        assert!(inst.render(256, &mut outs, 256, []).is_ok());
    }

    #[test]
    fn preview_notes_apply_at_block_start() {
        let (mut inst, mut surface) = Instrument::new(EngineConfig::default()).unwrap();
        inst.initialize(48_000.0, 512).unwrap();
        assert!(surface.preview_note_on(69, 100));
        let (mut l, mut r) = stereo(512);
        {
            let mut outs: [&mut [f32]; 2] = [&mut l, &mut r];
            inst.render(512, &mut outs, 0, []).unwrap();
        }
        assert_eq!(inst.engine().active_voice_count(), 1);
        assert!(l.iter().any(|&s| s != 0.0));

        assert!(surface.preview_note_off(69));
        let mut outs: [&mut [f32]; 2] = [&mut l, &mut r];
        inst.render(512, &mut outs, 512, []).unwrap();
        assert!(inst.engine().active_voice_count() <= 1);
    }

    #[test]
    fn renders_across_the_clock_wrap() {
        let (mut inst, _surface) = Instrument::new(EngineConfig::default()).unwrap();
        inst.initialize(48_000.0, 512).unwrap();
        let (mut l, mut r) = stereo(512);
        {
            let mut outs: [&mut [f32]; 2] = [&mut l, &mut r];
            inst.render(512, &mut outs, u64::MAX - 10, [Event::note_on(100, 60, 100)])
                .unwrap();
        }
        assert!(l[..100].iter().all(|&s| s == 0.0));
        assert!(l[100..].iter().any(|&s| s != 0.0));
        assert!(inst.stats().peek().is_clean());
    }

    #[test]
    fn no_channels_is_an_error() {
        let (mut inst, _surface) = Instrument::new(EngineConfig::default()).unwrap();
        inst.initialize(48_000.0, 64).unwrap();
        let mut outs: [&mut [f32]; 0] = [];
        assert_eq!(
            inst.render(64, &mut outs, 0, []),
            Err(RenderError::NoOutputChannels)
        );
    }

    #[test]
    fn invalid_config_rejected() {
        let config = EngineConfig {
            preview_queue_capacity: 0,
            ..EngineConfig::default()
        };
        assert!(Instrument::new(config).is_err());
    }
}
