//! Trait seams for the subsystems the SoundBox talks to but does not own.
//!
//! The emulated machine wires concrete implementations in; tests substitute
//! scripted doubles. All calls are synchronous and happen on the caller's
//! emulation timeline.

use crate::ring::OutputBuffer;

/// Supplies raw 16-bit ADPCM payloads from system memory (the KING memory
/// controller's role).
pub trait AdpcmSource {
    /// Next halfword for `channel` (0 or 1). Called only when the channel
    /// has exhausted its current halfword.
    fn fetch_half_word(&mut self, channel: usize) -> u16;
}

/// The companion tone/noise synthesizer. It runs on a /3 clock relative to
/// the master timestamps the SoundBox receives; every timestamp passed
/// through this trait is already divided down.
pub trait ToneNoiseSynth {
    /// Register write forwarded from the low half of the SoundBox bus window.
    fn write(&mut self, timestamp: u32, reg: u8, value: u16);

    /// Run synthesis up to `timestamp`, accumulating per-ear sample deltas
    /// into the shared rings the flush boundary integrates.
    fn synthesize(&mut self, timestamp: u32, out: &mut [OutputBuffer; 2]);

    /// Power-on reset at `timestamp`.
    fn power(&mut self, timestamp: u32);

    /// Rebase the synthesizer's notion of "now" after a flush.
    fn reset_timestamp(&mut self, base: u32);

    /// Master volume push, re-issued whenever output is (re-)enabled.
    fn set_volume(&mut self, volume: f64);
}

/// Receives the CD-audio volume mirror. Pushed on every CD-volume register
/// write and on reset/snapshot-restore; values are linear gains in [0, 0.5].
pub trait CddaVolumeSink {
    fn set_cdda_volume(&mut self, left: f64, right: f64);
}

/// Converts a window of the fixed-rate accumulation ring into host-rate
/// frames.
pub trait HostRateConverter {
    /// `left` and `right` each hold `tick_count` integrated samples.
    /// Returns the number of host-rate frames produced, which need not be
    /// proportional to `tick_count`.
    fn convert(&mut self, left: &[i32], right: &[i32], tick_count: usize) -> usize;
}
