//! Master reverb: eight damped combs into four allpasses per side
//! (Schroeder/Freeverb topology).
//!
//! Line lengths are tuned for 44.1 kHz and scaled to the engine rate when
//! the reverb is built. The right side is offset by a few samples to
//! decorrelate it from the left. Processing never allocates.

const COMB_LENGTHS: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];
const ALLPASS_LENGTHS: [usize; 4] = [556, 441, 341, 225];
const RIGHT_OFFSET: usize = 23;
const TUNED_RATE: f64 = 44_100.0;
const INPUT_GAIN: f32 = 0.015;
const ALLPASS_FEEDBACK: f32 = 0.5;

/// Circular buffer with a single read/write head.
#[derive(Debug, Clone)]
struct Line {
    data: Vec<f32>,
    head: usize,
}

impl Line {
    fn new(len: usize) -> Self {
        Line {
            data: vec![0.0; len.max(1)],
            head: 0,
        }
    }

    /// Sample written `len` steps ago.
    #[inline]
    fn read(&self) -> f32 {
        self.data[self.head]
    }

    /// Overwrite the oldest sample and advance.
    #[inline]
    fn write(&mut self, value: f32) {
        self.data[self.head] = value;
        self.head = (self.head + 1) % self.data.len();
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn clear(&mut self) {
        self.data.fill(0.0);
    }
}

#[derive(Debug, Clone)]
struct Tank {
    combs: Vec<(Line, f32)>,
    allpasses: Vec<Line>,
}

impl Tank {
    fn new(scale: f64, offset: usize) -> Self {
        let len = |base: usize| (base as f64 * scale) as usize + offset;
        Tank {
            combs: COMB_LENGTHS.iter().map(|&b| (Line::new(len(b)), 0.0)).collect(),
            allpasses: ALLPASS_LENGTHS.iter().map(|&b| Line::new(len(b))).collect(),
        }
    }

    #[inline]
    fn process(&mut self, input: f32, feedback: f32, damp: f32) -> f32 {
        let mut sum = 0.0f32;
        for (line, lowpass) in &mut self.combs {
            let delayed = line.read();
            *lowpass = delayed + (*lowpass - delayed) * damp;
            line.write(input + *lowpass * feedback);
            sum += delayed;
        }
        for line in &mut self.allpasses {
            let delayed = line.read();
            line.write(sum + delayed * ALLPASS_FEEDBACK);
            sum = delayed - sum;
        }
        sum
    }

    fn clear(&mut self) {
        for (line, lowpass) in &mut self.combs {
            line.clear();
            *lowpass = 0.0;
        }
        self.allpasses.iter_mut().for_each(Line::clear);
    }
}

/// Stereo reverb on the master bus.
#[derive(Debug, Clone)]
pub struct Reverb {
    left: Tank,
    right: Tank,
    feedback: f32,
    damp: f32,
    /// Dry/wet balance, 0 = dry. A zero mix bypasses the tanks.
    pub mix: f64,
}

impl Reverb {
    /// Build the tanks for `sample_rate`. `room_size` and `damping` are in
    /// 0..1; the reverb starts fully dry.
    pub fn new(sample_rate: f64, room_size: f64, damping: f64) -> Self {
        let scale = sample_rate / TUNED_RATE;
        Reverb {
            left: Tank::new(scale, 0),
            right: Tank::new(scale, RIGHT_OFFSET),
            feedback: (0.7 + 0.28 * room_size.clamp(0.0, 1.0)) as f32,
            damp: damping.clamp(0.0, 1.0) as f32,
            mix: 0.0,
        }
    }

    /// One stereo frame.
    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        let input = (left + right) * INPUT_GAIN;
        let wet_l = self.left.process(input, self.feedback, self.damp);
        let wet_r = self.right.process(input, self.feedback, self.damp);
        let mix = self.mix as f32;
        (
            left + (wet_l - left) * mix,
            right + (wet_r - right) * mix,
        )
    }

    /// Process a block in place.
    pub fn process_block(&mut self, left: &mut [f32], right: &mut [f32]) {
        if self.mix <= 0.0 {
            return;
        }
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            (*l, *r) = self.process(*l, *r);
        }
    }

    /// Silence the tail.
    pub fn clear(&mut self) {
        self.left.clear();
        self.right.clear();
    }
}
