//! Fixed-rate sample accumulation buffers shared with the flush boundary.
//!
//! The output injector writes per-tick sample *deltas* into [`OutputBuffer`];
//! at flush time `integrate` turns the consumed window into absolute samples
//! (mixing in the CD-audio side buffer) before the external resampler reads
//! it. The CD-audio layer accumulates into [`CddaBuffer`] on the same tick
//! timeline, partitioned by the caller so the two writers never overlap.

/// Ring size in sub-ticks; also the hard cap on a single flush window.
pub const RING_SLOTS: usize = 65536;

/// Delta-accumulation ring for one ear.
pub struct OutputBuffer {
    buf: Box<[i32]>,
    /// Running integrator carried across flush windows.
    integrator: i64,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self {
            buf: vec![0i32; RING_SLOTS].into_boxed_slice(),
            integrator: 0,
        }
    }

    /// Add `value` at `index`, wrapping modulo the ring size.
    #[inline]
    pub fn add(&mut self, index: usize, value: i32) {
        self.buf[index & (RING_SLOTS - 1)] += value;
    }

    /// Turn the first `count` delta slots into absolute samples, mixing in
    /// the time-aligned CD-audio side buffer.
    pub fn integrate(&mut self, count: usize, cdda: &CddaBuffer) {
        let count = count.min(RING_SLOTS);
        for i in 0..count {
            self.integrator += i64::from(self.buf[i]);
            self.buf[i] = self.integrator as i32 + cdda.buf[i];
        }
    }

    /// Window handed to the host-rate converter after [`Self::integrate`].
    pub fn window(&self, count: usize) -> &[i32] {
        &self.buf[..count.min(RING_SLOTS)]
    }

    /// Consume `count` slots: shift the remainder down and zero the tail.
    /// Also used to discard an unintegrated window when output is disabled;
    /// the integrator is untouched either way, so skipped deltas never leak
    /// into a later window.
    pub fn advance(&mut self, count: usize) {
        let count = count.min(RING_SLOTS);
        self.buf.copy_within(count.., 0);
        self.buf[RING_SLOTS - count..].fill(0);
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Side buffer the CD-audio layer accumulates into, one per ear, aligned to
/// the same sub-tick timeline as [`OutputBuffer`].
pub struct CddaBuffer {
    buf: Box<[i32]>,
}

impl CddaBuffer {
    pub fn new() -> Self {
        Self {
            buf: vec![0i32; RING_SLOTS].into_boxed_slice(),
        }
    }

    /// Add a CD-audio sample at `index`, wrapping modulo the ring size.
    #[inline]
    pub fn accumulate(&mut self, index: usize, value: i32) {
        self.buf[index & (RING_SLOTS - 1)] += value;
    }

    pub fn as_slice(&self) -> &[i32] {
        &self.buf
    }

    /// Consume `count` slots after a flush window.
    pub fn finish(&mut self, count: usize) {
        let count = count.min(RING_SLOTS);
        self.buf.copy_within(count.., 0);
        self.buf[RING_SLOTS - count..].fill(0);
    }
}

impl Default for CddaBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_wraps_modulo_ring_size() {
        let mut out = OutputBuffer::new();
        out.add(RING_SLOTS + 3, 7);
        assert_eq!(out.window(8)[3], 7);
    }

    #[test]
    fn integrate_prefix_sums_and_mixes_cdda() {
        let mut out = OutputBuffer::new();
        let mut cd = CddaBuffer::new();
        out.add(0, 5);
        out.add(1, -2);
        out.add(2, 1);
        cd.accumulate(1, 100);
        out.integrate(3, &cd);
        assert_eq!(out.window(3), &[5, 103, 4]);
    }

    #[test]
    fn integrator_carries_across_windows() {
        let mut out = OutputBuffer::new();
        let cd = CddaBuffer::new();
        out.add(0, 10);
        out.integrate(1, &cd);
        out.advance(1);
        // New window starts from the carried absolute level.
        out.add(0, -3);
        out.integrate(1, &cd);
        assert_eq!(out.window(1), &[7]);
    }

    #[test]
    fn advance_shifts_and_zeroes_tail() {
        let mut out = OutputBuffer::new();
        out.add(0, 1);
        out.add(4, 9);
        out.advance(4);
        assert_eq!(out.window(2), &[9, 0]);
        assert_eq!(out.window(RING_SLOTS)[RING_SLOTS - 1], 0);
    }

    #[test]
    fn cdda_finish_shifts_down() {
        let mut cd = CddaBuffer::new();
        cd.accumulate(5, 42);
        cd.finish(5);
        assert_eq!(cd.as_slice()[0], 42);
        assert_eq!(cd.as_slice()[5], 0);
    }
}
