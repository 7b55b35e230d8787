//! Stereo delay line with feedback, mix and an optional ping-pong mode.

/// Delay time of the master bus delay in seconds.
pub const MASTER_DELAY_TIME: f64 = 0.25;
/// Feedback of the master bus delay.
pub const MASTER_DELAY_FEEDBACK: f64 = 0.35;

/// A stereo delay with configurable time, feedback, and dry/wet mix.
///
/// The delay buffer holds up to `max_delay_seconds` of audio and is
/// allocated at construction. With `ping_pong` set, each channel's feedback
/// is written into the opposite channel, so a mono input bounces between
/// left and right.
#[derive(Debug, Clone)]
pub struct Delay {
    buffer_l: Vec<f32>,
    buffer_r: Vec<f32>,
    write_pos: usize,
    sample_rate: f64,

    /// Delay time in seconds.
    pub delay_time: f64,
    /// Feedback amount (0.0 = no feedback, 0.99 max).
    pub feedback: f64,
    /// Dry/wet mix (0.0 = fully dry, 1.0 = fully wet).
    pub mix: f64,
    /// Cross the feedback paths.
    pub ping_pong: bool,
}

impl Delay {
    /// Create a new delay effect.
    ///
    /// # Arguments
    /// - `sample_rate`: Audio sample rate in Hz.
    /// - `max_delay_seconds`: Maximum supported delay time.
    pub fn new(sample_rate: f64, max_delay_seconds: f64) -> Self {
        let buffer_size = (sample_rate * max_delay_seconds) as usize + 1;
        Self {
            buffer_l: vec![0.0; buffer_size],
            buffer_r: vec![0.0; buffer_size],
            write_pos: 0,
            sample_rate,
            delay_time: 0.5,
            feedback: 0.3,
            mix: 0.0,
            ping_pong: false,
        }
    }

    /// Create a delay with specific parameters.
    pub fn with_params(
        sample_rate: f64,
        max_delay_seconds: f64,
        delay_time: f64,
        feedback: f64,
        mix: f64,
    ) -> Self {
        let mut d = Self::new(sample_rate, max_delay_seconds);
        d.delay_time = delay_time.clamp(0.0, max_delay_seconds);
        d.feedback = feedback.clamp(0.0, 0.99);
        d.mix = mix.clamp(0.0, 1.0);
        d
    }

    /// The master bus delay: 250 ms ping-pong, mix driven by `delayMix`.
    pub fn master(sample_rate: f64) -> Self {
        let mut d = Self::with_params(
            sample_rate,
            MASTER_DELAY_TIME,
            MASTER_DELAY_TIME,
            MASTER_DELAY_FEEDBACK,
            0.0,
        );
        d.ping_pong = true;
        d
    }

    /// Process a stereo sample pair, returning the processed output.
    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        let buffer_len = self.buffer_l.len();
        let delay_samples = ((self.delay_time * self.sample_rate) as usize).clamp(1, buffer_len - 1);

        let read_pos = if self.write_pos >= delay_samples {
            self.write_pos - delay_samples
        } else {
            buffer_len - (delay_samples - self.write_pos)
        };

        let delayed_l = self.buffer_l[read_pos];
        let delayed_r = self.buffer_r[read_pos];

        let fb = self.feedback as f32;
        let (fb_l, fb_r) = if self.ping_pong {
            (delayed_r * fb, delayed_l * fb)
        } else {
            (delayed_l * fb, delayed_r * fb)
        };
        if self.ping_pong {
            // Input enters on the left tap only, then bounces.
            self.buffer_l[self.write_pos] = (left + right) * 0.5 + fb_l;
            self.buffer_r[self.write_pos] = fb_r;
        } else {
            self.buffer_l[self.write_pos] = left + fb_l;
            self.buffer_r[self.write_pos] = right + fb_r;
        }

        self.write_pos += 1;
        if self.write_pos == buffer_len {
            self.write_pos = 0;
        }

        let mix = self.mix as f32;
        (
            left * (1.0 - mix) + delayed_l * mix,
            right * (1.0 - mix) + delayed_r * mix,
        )
    }

    /// Process a block of stereo audio in-place. A zero mix is bypassed.
    pub fn process_block(&mut self, left: &mut [f32], right: &mut [f32]) {
        if self.mix <= 0.0 {
            return;
        }
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let (out_l, out_r) = self.process(*l, *r);
            *l = out_l;
            *r = out_r;
        }
    }

    /// Clear the delay buffers.
    pub fn clear(&mut self) {
        self.buffer_l.fill(0.0);
        self.buffer_r.fill(0.0);
        self.write_pos = 0;
    }
}
