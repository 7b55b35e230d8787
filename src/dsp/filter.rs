//! Biquad filter for per-voice tone shaping.

use std::f64::consts::PI;

/// Filter type, in the order of the `filterType` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterType {
    #[default]
    Lowpass,
    Bandpass,
    Highpass,
    Notch,
}

impl FilterType {
    /// Map a `filterType` parameter value to a filter type.
    pub fn from_index(value: f32) -> Self {
        match value.round() as i32 {
            i32::MIN..=0 => FilterType::Lowpass,
            1 => FilterType::Bandpass,
            2 => FilterType::Highpass,
            _ => FilterType::Notch,
        }
    }
}

/// Lowest Q, reached at zero resonance.
pub const MIN_Q: f64 = 0.5;
/// Highest Q, reached at full resonance.
pub const MAX_Q: f64 = 16.0;

/// Map normalized resonance [0, 1] exponentially onto [`MIN_Q`, `MAX_Q`].
pub fn resonance_to_q(resonance: f64) -> f64 {
    MIN_Q * (MAX_Q / MIN_Q).powf(resonance.clamp(0.0, 1.0))
}

/// A biquad IIR filter (2nd order).
///
/// Implements the standard Direct Form II Transposed structure.
/// Coefficient formulas from the Audio EQ Cookbook (Robert Bristow-Johnson).
#[derive(Debug, Clone)]
pub struct BiquadFilter {
    filter_type: FilterType,
    frequency: f64,
    q: f64,

    // Coefficients
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,

    // State (Direct Form II Transposed)
    z1: f64,
    z2: f64,

    sample_rate: f64,
    dirty: bool,
}

impl BiquadFilter {
    pub fn new(filter_type: FilterType, sample_rate: f64) -> Self {
        let mut f = BiquadFilter {
            filter_type,
            frequency: 1000.0,
            q: 0.707, // Butterworth
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            z1: 0.0,
            z2: 0.0,
            sample_rate,
            dirty: true,
        };
        f.update_coefficients();
        f
    }

    pub fn filter_type(&self) -> FilterType {
        self.filter_type
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn q(&self) -> f64 {
        self.q
    }

    /// Set all tuning parameters. Coefficients are only recomputed when
    /// something actually changed.
    pub fn configure(&mut self, filter_type: FilterType, frequency: f64, q: f64) {
        if filter_type != self.filter_type || frequency != self.frequency || q != self.q {
            self.filter_type = filter_type;
            self.frequency = frequency;
            self.q = q;
            self.dirty = true;
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.dirty = true;
    }

    /// Recompute filter coefficients from current parameters.
    pub fn update_coefficients(&mut self) {
        // Keep the centre frequency below Nyquist.
        let frequency = self.frequency.clamp(10.0, self.sample_rate * 0.49);
        let w0 = 2.0 * PI * frequency / self.sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / (2.0 * self.q.max(0.01));

        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha;
        let (b0, b1, b2) = match self.filter_type {
            FilterType::Lowpass => {
                let b1 = 1.0 - cos_w0;
                (b1 / 2.0, b1, b1 / 2.0)
            }
            FilterType::Highpass => {
                let b0 = (1.0 + cos_w0) / 2.0;
                (b0, -(1.0 + cos_w0), b0)
            }
            FilterType::Bandpass => (alpha, 0.0, -alpha),
            FilterType::Notch => (1.0, -2.0 * cos_w0, 1.0),
        };

        // Normalize by a0
        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = a1 / a0;
        self.a2 = a2 / a0;
        self.dirty = false;
    }

    /// Process a single sample through the filter.
    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        if self.dirty {
            self.update_coefficients();
        }

        let output = self.b0 * input + self.z1;
        self.z1 = self.b1 * input - self.a1 * output + self.z2;
        self.z2 = self.b2 * input - self.a2 * output;
        output
    }

    /// Reset filter state.
    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}
