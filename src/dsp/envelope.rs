//! AHDSR envelope generator with per-stage curve shapes.

use std::f64::consts::PI;

/// Shape applied to the normalized progress of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Curve {
    Linear,
    #[default]
    Exponential,
    Logarithmic,
    SCurve,
}

impl Curve {
    /// Map a parameter value (0..=3) to a curve. Rounds to the nearest index.
    pub fn from_index(value: f32) -> Self {
        match value.round() as i32 {
            i32::MIN..=0 => Curve::Linear,
            1 => Curve::Exponential,
            2 => Curve::Logarithmic,
            _ => Curve::SCurve,
        }
    }

    /// Shape `t` in [0, 1]; every curve maps 0 to 0 and 1 to 1.
    #[inline]
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Curve::Linear => t,
            Curve::Exponential => t * t,
            Curve::Logarithmic => t.sqrt(),
            Curve::SCurve => (1.0 - (PI * t).cos()) * 0.5,
        }
    }
}

/// Envelope stages.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Stage {
    Idle,
    Attack,
    Hold,
    Decay,
    Sustain,
    Release,
}

/// AHDSR envelope. Times are in seconds and take effect at the next stage
/// transition.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Attack time in seconds.
    pub attack: f64,
    /// Hold time at full level in seconds.
    pub hold: f64,
    /// Decay time in seconds.
    pub decay: f64,
    /// Sustain level [0, 1].
    pub sustain: f64,
    /// Release time in seconds.
    pub release: f64,
    pub attack_curve: Curve,
    pub decay_curve: Curve,
    pub release_curve: Curve,

    stage: Stage,
    level: f64,
    sample_rate: f64,
    /// Samples in the current stage.
    stage_samples: usize,
    stage_counter: usize,
    /// Level at the start of the current stage.
    start_level: f64,
}

impl Envelope {
    pub fn new(sample_rate: f64) -> Self {
        Envelope {
            attack: 0.01,
            hold: 0.0,
            decay: 0.1,
            sustain: 0.7,
            release: 0.2,
            attack_curve: Curve::Exponential,
            decay_curve: Curve::Exponential,
            release_curve: Curve::Exponential,
            stage: Stage::Idle,
            level: 0.0,
            sample_rate,
            stage_samples: 0,
            stage_counter: 0,
            start_level: 0.0,
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }

    /// Trigger the envelope (note on). Retriggers from the current level.
    pub fn gate_on(&mut self) {
        self.enter(Stage::Attack, self.attack);
        self.start_level = self.level;
    }

    /// Release the envelope (note off).
    pub fn gate_off(&mut self) {
        if matches!(self.stage, Stage::Idle | Stage::Release) {
            return;
        }
        self.enter(Stage::Release, self.release);
        self.start_level = self.level;
    }

    /// Drop to silence immediately.
    pub fn reset(&mut self) {
        self.stage = Stage::Idle;
        self.level = 0.0;
        self.stage_counter = 0;
        self.stage_samples = 0;
    }

    /// Generate the next envelope sample [0, 1].
    pub fn next_sample(&mut self) -> f64 {
        match self.stage {
            Stage::Idle => {
                self.level = 0.0;
            }
            Stage::Attack => {
                if let Some(t) = self.advance() {
                    let shaped = self.attack_curve.apply(t);
                    self.level = self.start_level + (1.0 - self.start_level) * shaped;
                } else {
                    self.level = 1.0;
                    self.enter(Stage::Hold, self.hold);
                }
            }
            Stage::Hold => {
                self.level = 1.0;
                if self.advance().is_none() {
                    self.enter(Stage::Decay, self.decay);
                }
            }
            Stage::Decay => {
                if let Some(t) = self.advance() {
                    let shaped = self.decay_curve.apply(t);
                    self.level = 1.0 - (1.0 - self.sustain) * shaped;
                } else {
                    self.level = self.sustain;
                    self.stage = Stage::Sustain;
                }
            }
            Stage::Sustain => {
                self.level = self.sustain;
            }
            Stage::Release => {
                if let Some(t) = self.advance() {
                    let shaped = self.release_curve.apply(t);
                    self.level = self.start_level * (1.0 - shaped);
                } else {
                    self.level = 0.0;
                    self.stage = Stage::Idle;
                }
            }
        }
        self.level
    }

    pub fn level(&self) -> f64 {
        self.level
    }

    /// True while the envelope is releasing or idle.
    pub fn is_released(&self) -> bool {
        matches!(self.stage, Stage::Release | Stage::Idle)
    }

    /// Returns true if the envelope has finished (idle after release).
    pub fn is_finished(&self) -> bool {
        self.stage == Stage::Idle
    }

    /// Progress of the current stage, or `None` once it has run its course.
    #[inline]
    fn advance(&mut self) -> Option<f64> {
        if self.stage_counter >= self.stage_samples {
            return None;
        }
        let t = self.stage_counter as f64 / self.stage_samples as f64;
        self.stage_counter += 1;
        Some(t)
    }

    fn enter(&mut self, stage: Stage, seconds: f64) {
        self.stage = stage;
        self.stage_samples = (seconds.max(0.0) * self.sample_rate) as usize;
        self.stage_counter = 0;
    }
}
