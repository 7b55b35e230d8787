//! Stereo summing bus with drive, width, master gain and soft clip.
//!
//! The bus is allocated once for the largest block and only ever cleared
//! afterwards, so mixing never touches the heap.

/// Stereo summing bus.
#[derive(Debug, Clone, Default)]
pub struct Mixer {
    pub master_gain: f64,
    left: Vec<f32>,
    right: Vec<f32>,
}

impl Mixer {
    pub fn new() -> Self {
        Mixer {
            master_gain: 0.8,
            left: Vec::new(),
            right: Vec::new(),
        }
    }

    /// Size the bus for blocks of up to `max_frames`. Non-real-time.
    pub fn allocate(&mut self, max_frames: usize) {
        self.left = vec![0.0; max_frames];
        self.right = vec![0.0; max_frames];
    }

    /// Frames the bus can hold.
    pub fn capacity(&self) -> usize {
        self.left.len()
    }

    /// Zero the first `frames` samples of both channels.
    pub fn clear(&mut self, frames: usize) {
        let n = frames.min(self.left.len());
        self.left[..n].fill(0.0);
        self.right[..n].fill(0.0);
    }

    /// Add a mono sample to both channels at the given index.
    #[inline]
    pub fn add(&mut self, index: usize, sample: f64) {
        if index < self.left.len() {
            self.left[index] += sample as f32;
            self.right[index] += sample as f32;
        }
    }

    /// Both channels, truncated to `frames`.
    pub fn channels_mut(&mut self, frames: usize) -> (&mut [f32], &mut [f32]) {
        let n = frames.min(self.left.len());
        (&mut self.left[..n], &mut self.right[..n])
    }

    pub fn left(&self, frames: usize) -> &[f32] {
        &self.left[..frames.min(self.left.len())]
    }

    pub fn right(&self, frames: usize) -> &[f32] {
        &self.right[..frames.min(self.right.len())]
    }

    /// Saturate with tanh; `drive` 0 is bypassed.
    pub fn apply_drive(&mut self, drive: f64, frames: usize) {
        if drive <= 0.0 {
            return;
        }
        let pre = (1.0 + drive * 9.0) as f32;
        // Full scale in, full scale out.
        let post = 1.0 / pre.tanh();
        let (left, right) = self.channels_mut(frames);
        for s in left.iter_mut().chain(right.iter_mut()) {
            *s = (*s * pre).tanh() * post;
        }
    }

    /// Mid/side width: 0 = mono, 0.5 = unchanged, 1 = doubled side.
    pub fn apply_width(&mut self, width: f64, frames: usize) {
        let side_gain = (width.clamp(0.0, 1.0) * 2.0) as f32;
        if side_gain == 1.0 {
            return;
        }
        let (left, right) = self.channels_mut(frames);
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let mid = (*l + *r) * 0.5;
            let side = (*l - *r) * 0.5 * side_gain;
            *l = mid + side;
            *r = mid - side;
        }
    }

    /// Apply master gain and soft clipping in place.
    pub fn finish(&mut self, frames: usize) {
        let gain = self.master_gain as f32;
        let (left, right) = self.channels_mut(frames);
        for s in left.iter_mut().chain(right.iter_mut()) {
            *s = soft_clip(*s * gain);
        }
    }
}

/// Soft clipper using tanh to prevent harsh digital clipping.
#[inline]
fn soft_clip(x: f32) -> f32 {
    x.tanh()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleared_bus_is_silent() {
        let mut m = Mixer::new();
        m.allocate(128);
        m.add(3, 0.5);
        m.clear(128);
        m.finish(128);
        assert!(m.left(128).iter().all(|&s| s == 0.0));
        assert!(m.right(128).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn accumulates_samples() {
        let mut m = Mixer::new();
        m.master_gain = 1.0;
        m.allocate(4);
        m.clear(4);
        m.add(0, 0.5);
        m.add(0, 0.3);
        m.add(1, 1.0);
        m.finish(4);
        let out = m.left(4);
        assert!((out[0] - soft_clip(0.8)).abs() < 1e-6);
        assert!((out[1] - soft_clip(1.0)).abs() < 1e-6);
        assert_eq!(out[2], 0.0);
    }

    #[test]
    fn soft_clip_prevents_overflow() {
        let mut m = Mixer::new();
        m.master_gain = 1.0;
        m.allocate(1);
        m.clear(1);
        m.add(0, 100.0);
        m.finish(1);
        let out = m.left(1)[0];
        assert!(out.abs() <= 1.0, "Soft clip should keep output <= 1.0, got {out}");
    }

    #[test]
    fn out_of_range_index_ignored() {
        let mut m = Mixer::new();
        m.allocate(2);
        m.clear(2);
        m.add(5, 1.0);
        assert_eq!(m.capacity(), 2);
        assert!(m.left(2).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn zero_width_collapses_to_mono() {
        let mut m = Mixer::new();
        m.allocate(1);
        let (l, r) = m.channels_mut(1);
        l[0] = 1.0;
        r[0] = 0.0;
        m.apply_width(0.0, 1);
        assert!((m.left(1)[0] - 0.5).abs() < 1e-6);
        assert!((m.right(1)[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn drive_bypassed_at_zero() {
        let mut m = Mixer::new();
        m.allocate(1);
        m.clear(1);
        m.add(0, 0.01);
        m.apply_drive(0.0, 1);
        assert!((m.left(1)[0] - 0.01).abs() < 1e-7);
        m.apply_drive(1.0, 1);
        let driven = m.left(1)[0];
        assert!(driven > 0.0 && driven.is_finite(), "driven {driven}");
    }
}
