//! The SoundBox proper: two ADPCM channels decoded and mixed into the
//! fixed-rate accumulation ring, driven lazily by master-clock timestamps.
//!
//! Nothing here runs on its own; [`SoundBox::catch_up`] replays exactly the
//! number of hardware sub-ticks that elapsed since the previous call, and
//! every state-visible register write funnels through it first so changes
//! land at the correct simulated instant.

use log::{debug, warn};

use crate::bus::{AdpcmSource, CddaVolumeSink, HostRateConverter, ToneNoiseSynth};
use crate::hardware::SoundBoxConfig;
use crate::ring::{CddaBuffer, OutputBuffer};
use crate::snapshot::SoundBoxSnapshot;
use crate::tables::{PHASE_FILTER, STEP_INDEX_DELTAS, STEP_INDEX_MAX, STEP_SIZES, volume_table};

#[cfg(feature = "sbox-trace")]
macro_rules! sbox_trace {
    ($($arg:tt)*) => {
        println!($($arg)*);
    };
}
#[cfg(not(feature = "sbox-trace"))]
macro_rules! sbox_trace {
    ($($arg:tt)*) => {};
}

const PREDICTOR_MIN: i32 = -0x4000;
const PREDICTOR_MAX: i32 = 0x3FFF;
const ANTI_CLICK_MIN: i64 = -(0x4000i64 << 32);
const ANTI_CLICK_MAX: i64 = 0x3FFFi64 << 32;

/// Master-clock-to-sub-tick divider reload. Together with the `* 2` in
/// `catch_up` this encodes the hardware clock ratio; do not re-derive.
const BIGDIV_RELOAD: i32 = 1365;

/// Single-pole low-pass for volume register smoothing (mkfilter, Butterworth,
/// -a 1.5888889125e-04): output gain and pole coefficient.
const VOLUME_FILTER_GAIN: f64 = 2.004348738e3;
const VOLUME_FILTER_POLE: f64 = 0.9990021696;

/// Fixed master volume pushed to the tone/noise synthesizer.
const PSG_MASTER_VOLUME: f64 = 0.681;

/// A flush consumes at most one full ring of sub-ticks.
const MAX_FLUSH_TICKS: u32 = 65536;

#[derive(Default, Clone, Copy)]
struct AdpcmChannel {
    predictor: i32,
    step_index: i32,
    delta: i32,
    /// Pending applications of `delta`; greater than 1 only when linear
    /// interpolation spreads one decode across several sub-ticks.
    have_delta: i32,
    which_nibble: u32,
    half_word: u16,
    have_half_word: bool,
    last_sample: [i32; 2],
    /// Fixed-point (32.32) decaying offset absorbing predictor resets.
    anti_click: i64,
}

#[derive(Default, Clone, Copy)]
struct VolumeFilter {
    xv: [f64; 2],
    yv: [f64; 2],
    output: f64,
}

impl VolumeFilter {
    fn run(&mut self, target: f64) {
        self.xv[0] = self.xv[1];
        self.xv[1] = target / VOLUME_FILTER_GAIN;
        self.yv[0] = self.yv[1];
        self.yv[1] = (self.xv[0] + self.xv[1]) + VOLUME_FILTER_POLE * self.yv[0];
        self.output = self.yv[1];
    }
}

/// Result of a flush window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlushResult {
    /// Host-rate frames produced by the converter (0 if output is disabled).
    pub frames: usize,
    /// `end_timestamp % 12`; the machine rebases all timelines to this via
    /// [`SoundBox::reset_timestamp`].
    pub new_base_timestamp: u32,
}

pub struct SoundBox {
    config: SoundBoxConfig,

    control: u16,
    adpcm_volume: [[u8; 2]; 2],
    cdda_volume: [u8; 2],
    bigdiv: i32,
    smalldiv: i32,
    channels: [AdpcmChannel; 2],
    volume_filters: [[VolumeFilter; 2]; 2],
    king_adpcm_control: u32,
    last_update_timestamp: u32,

    output_enabled: bool,
    vol_table: [f64; 0x40],
    out: [OutputBuffer; 2],
    cdda: [CddaBuffer; 2],
}

impl SoundBox {
    pub fn new(config: SoundBoxConfig) -> Self {
        Self {
            config,
            control: 0,
            adpcm_volume: [[0; 2]; 2],
            cdda_volume: [0; 2],
            bigdiv: 0,
            smalldiv: 0,
            channels: [AdpcmChannel::default(); 2],
            volume_filters: [[VolumeFilter::default(); 2]; 2],
            king_adpcm_control: 0,
            last_update_timestamp: 0,
            output_enabled: false,
            vol_table: volume_table(),
            out: [OutputBuffer::new(), OutputBuffer::new()],
            cdda: [CddaBuffer::new(), CddaBuffer::new()],
        }
    }

    pub fn config(&self) -> SoundBoxConfig {
        self.config
    }

    pub fn output_enabled(&self) -> bool {
        self.output_enabled
    }

    /// Enable or disable audio output. Disabled output still advances all
    /// decode state; only ring injection and resampling are skipped. The PSG
    /// master volume is re-pushed either way, mirroring a sound-rate change.
    pub fn set_output_enabled(&mut self, enabled: bool, psg: &mut dyn ToneNoiseSynth) {
        self.output_enabled = enabled;
        psg.set_volume(PSG_MASTER_VOLUME);
    }

    /// Mirror of the KING ADPCM control word: bits 0-1 enable the channels,
    /// bits 2-3 select the shared oversampling exponent. The caller is
    /// responsible for invoking [`Self::catch_up`] before changing it.
    pub fn set_king_adpcm_control(&mut self, value: u32) {
        self.king_adpcm_control = value;
    }

    pub fn king_adpcm_control(&self) -> u32 {
        self.king_adpcm_control
    }

    /// Side buffers the CD-audio layer accumulates into, `[left, right]`.
    pub fn cdda_buffers_mut(&mut self) -> &mut [CddaBuffer; 2] {
        &mut self.cdda
    }

    #[inline]
    fn oversample_shift(&self) -> u32 {
        (self.king_adpcm_control >> 2) & 0x3
    }

    /// Replay all hardware sub-ticks between the previous call and
    /// `timestamp`, returning the advisory timestamp of the next sub-tick.
    ///
    /// Timestamps must be non-decreasing. Calling twice with the same
    /// timestamp is a no-op on the second call.
    pub fn catch_up(&mut self, timestamp: u32, source: &mut dyn AdpcmSource) -> u32 {
        let run_time = timestamp.wrapping_sub(self.last_update_timestamp) as i32;
        self.last_update_timestamp = timestamp;

        self.bigdiv -= run_time * 2;

        while self.bigdiv <= 0 {
            self.smalldiv -= 1;
            while self.smalldiv <= 0 {
                self.smalldiv += 1 << self.oversample_shift();
                for ch in 0..2 {
                    self.channel_tick(ch, source);
                }
            }

            self.synthesis_tick(timestamp);

            for chan in &mut self.channels {
                chan.anti_click -= chan.anti_click >> 8;
            }

            for ch in 0..2 {
                for ear in 0..2 {
                    let target = self.vol_table[(self.adpcm_volume[ch][ear] & 0x3F) as usize];
                    self.volume_filters[ch][ear].run(target);
                }
            }

            self.bigdiv += BIGDIV_RELOAD;
        }

        timestamp.wrapping_add(((self.bigdiv + 1) / 2) as u32)
    }

    /// One decode step for one channel: halfword management plus the ADPCM
    /// nibble-to-delta algorithm.
    fn channel_tick(&mut self, ch: usize, source: &mut dyn AdpcmSource) {
        let shift = self.oversample_shift();
        let externally_enabled = self.king_adpcm_control & (1 << ch) != 0;
        let interpolate = self.control & (0x4 << ch) != 0;
        let held = self.control & (0x10 << ch) != 0;
        let buggy = self.config.codec.is_buggy();
        let chan = &mut self.channels[ch];

        // A channel keeps draining its pending halfword even if the KING
        // side disables it mid-stream.
        if !(chan.have_half_word || externally_enabled) {
            return;
        }

        if chan.which_nibble == 0 {
            chan.half_word = source.fetch_half_word(ch);
            chan.have_half_word = true;
            sbox_trace!("ch{ch} fetched halfword {:04X}", chan.half_word);
        }

        if held {
            // Reset bit set: predictor and step index are frozen, but the
            // nibble stream keeps advancing underneath.
            chan.delta = 0;
        } else {
            let nibble = ((chan.half_word >> chan.which_nibble) & 0xF) as usize;
            let mut base_step = STEP_SIZES[chan.step_index.clamp(0, STEP_INDEX_MAX) as usize];

            let mut delta = if buggy {
                // The official encoder's terminal step size was 1522, and its
                // deltas came out doubled.
                if base_step == 1552 {
                    base_step = 1522;
                }
                base_step * ((nibble as i32 & 0x7) + 1) * 2
            } else {
                base_step * ((nibble as i32 & 0x7) + 1)
            };

            if interpolate {
                delta >>= shift;
            }
            if nibble & 0x8 != 0 {
                delta = -delta;
            }

            chan.delta = delta;
            chan.step_index = (chan.step_index + STEP_INDEX_DELTAS[nibble]).clamp(0, STEP_INDEX_MAX);
        }

        // With interpolation the same delta is applied across 2^shift
        // sub-ticks instead of once.
        chan.have_delta = if interpolate { 1 << shift } else { 1 };

        chan.which_nibble = (chan.which_nibble + 4) & 0xF;
        if chan.which_nibble == 0 {
            chan.have_half_word = false;
        }
    }

    /// Apply pending deltas to the predictors and smear the per-ear sample
    /// changes across the ring through the phase filter.
    fn synthesis_tick(&mut self, timestamp: u32) {
        // Fixed clock-ratio conversion from the tick residue to a ring slot
        // plus an 8-way sub-sample phase; reproduce the rounding exactly.
        let synthtime42 = (timestamp << 1).wrapping_add(self.bigdiv as u32);
        let synthtime14 = synthtime42 / 3;
        let slot = (synthtime14 >> 3) as usize;
        let phase = (synthtime14 & 7) as usize;

        for chan in &mut self.channels {
            if chan.have_delta > 0 {
                chan.have_delta -= 1;
                chan.predictor = (chan.predictor + chan.delta).clamp(PREDICTOR_MIN, PREDICTOR_MAX);
            }
        }

        if !self.output_enabled {
            return;
        }

        let buggy = self.config.codec.is_buggy();
        let coeffs = &PHASE_FILTER[phase];

        for ch in 0..2 {
            let centered = {
                let chan = &self.channels[ch];
                if buggy {
                    i64::from(chan.predictor >> 1) + (chan.anti_click >> 33)
                } else {
                    i64::from(chan.predictor) + (chan.anti_click >> 32)
                }
            };
            let gains = [
                self.volume_filters[ch][0].output,
                self.volume_filters[ch][1].output,
            ];

            for ear in 0..2 {
                let samp = (centered as f64 * gains[ear]) as i32;
                let delta = samp - self.channels[ch].last_sample[ear];
                for (c, &coeff) in coeffs.iter().enumerate() {
                    self.out[ear].add(slot + c, delta * i32::from(coeff));
                }
                self.channels[ch].last_sample[ear] = samp;
            }
        }
    }

    /// Bus write into the 64-byte SoundBox window. Addresses below 0x20
    /// forward to the tone/noise synthesizer; the rest hit the ADPCM control
    /// and volume registers. Decode state is caught up first wherever the
    /// write is state-visible.
    pub fn write(
        &mut self,
        addr: u32,
        value: u16,
        timestamp: u32,
        source: &mut dyn AdpcmSource,
        psg: &mut dyn ToneNoiseSynth,
        cdda_sink: &mut dyn CddaVolumeSink,
    ) {
        let addr = addr & 0x3F;

        if addr < 0x20 {
            psg.write(timestamp / 3, (addr >> 1) as u8, value);
            return;
        }

        match addr {
            0x20 => {
                self.catch_up(timestamp, source);
                for ch in 0..2 {
                    let reset_bit = 0x10 << ch;
                    if self.control & reset_bit == 0 && value & reset_bit != 0 {
                        sbox_trace!("ch{ch} predictor reset via control write");
                        if self.config.reset_anti_click {
                            let chan = &mut self.channels[ch];
                            chan.anti_click = (chan.anti_click
                                + (i64::from(chan.predictor) << 32))
                                .clamp(ANTI_CLICK_MIN, ANTI_CLICK_MAX);
                        }
                        self.channels[ch].predictor = 0;
                        self.channels[ch].step_index = 0;
                    }
                }
                self.control = value;
            }

            0x22 => {
                self.catch_up(timestamp, source);
                self.adpcm_volume[0][0] = (value & 0x3F) as u8;
            }
            0x24 => {
                self.catch_up(timestamp, source);
                self.adpcm_volume[0][1] = (value & 0x3F) as u8;
            }
            0x26 => {
                self.catch_up(timestamp, source);
                self.adpcm_volume[1][0] = (value & 0x3F) as u8;
            }
            0x28 => {
                self.catch_up(timestamp, source);
                self.adpcm_volume[1][1] = (value & 0x3F) as u8;
            }

            // CD-audio volume does not affect ADPCM decode, so no catch-up.
            0x2A => {
                self.cdda_volume[0] = (value & 0x3F) as u8;
                self.push_cdda_volume(cdda_sink);
            }
            0x2C => {
                self.cdda_volume[1] = (value & 0x3F) as u8;
                self.push_cdda_volume(cdda_sink);
            }

            _ => {}
        }
    }

    fn push_cdda_volume(&self, sink: &mut dyn CddaVolumeSink) {
        sink.set_cdda_volume(
            0.5 * f64::from(self.cdda_volume[0]) / 63.0,
            0.5 * f64::from(self.cdda_volume[1]) / 63.0,
        );
    }

    /// Bound a catch-up window at `end_timestamp`, run the synthesizer, mix
    /// the CD-audio side buffers into the ring, and hand the window to the
    /// host-rate converter (or discard it when output is disabled).
    pub fn flush(
        &mut self,
        end_timestamp: u32,
        source: &mut dyn AdpcmSource,
        psg: &mut dyn ToneNoiseSynth,
        converter: &mut dyn HostRateConverter,
    ) -> FlushResult {
        self.catch_up(end_timestamp, source);

        let ticks = (end_timestamp / 12).min(MAX_FLUSH_TICKS) as usize;
        // The synthesizer shares the delta rings, so it must land its output
        // before the window is integrated.
        psg.synthesize(end_timestamp / 3, &mut self.out);

        let frames = if self.output_enabled {
            for ear in 0..2 {
                self.out[ear].integrate(ticks, &self.cdda[ear]);
            }
            let produced =
                converter.convert(self.out[0].window(ticks), self.out[1].window(ticks), ticks);
            for ear in 0..2 {
                self.out[ear].advance(ticks);
            }
            produced
        } else {
            // Window discarded without integration.
            for ear in 0..2 {
                self.out[ear].advance(ticks);
            }
            0
        };

        for ear in 0..2 {
            self.cdda[ear].finish(ticks);
        }

        FlushResult {
            frames,
            new_base_timestamp: end_timestamp % 12,
        }
    }

    /// Rebase the master-clock timeline after a flush. `base` is the
    /// `new_base_timestamp` the flush reported.
    pub fn reset_timestamp(&mut self, base: u32, psg: &mut dyn ToneNoiseSynth) {
        psg.reset_timestamp(base / 3);
        self.last_update_timestamp = base;
    }

    /// Hardware reset: catch up to the reset instant, power the synthesizer,
    /// and return all registers to their power-on values. Pending deltas and
    /// the anti-click accumulators are deliberately left to drain.
    pub fn reset(
        &mut self,
        timestamp: u32,
        source: &mut dyn AdpcmSource,
        psg: &mut dyn ToneNoiseSynth,
        cdda_sink: &mut dyn CddaVolumeSink,
    ) {
        self.catch_up(timestamp, source);
        psg.power(timestamp / 3);
        debug!("soundbox reset at timestamp {timestamp}");

        self.control = 0;
        self.adpcm_volume = [[0; 2]; 2];
        self.cdda_volume = [0; 2];
        self.volume_filters = [[VolumeFilter::default(); 2]; 2];

        for chan in &mut self.channels {
            chan.predictor = 0;
            chan.step_index = 0;
            chan.which_nibble = 0;
            chan.half_word = 0;
            chan.have_half_word = false;
        }

        self.push_cdda_volume(cdda_sink);

        // KING-to-SoundBox ADPCM sync: the first sub-tick lands almost
        // immediately after reset.
        self.bigdiv = 2;
        self.smalldiv = 0;
    }

    /// Capture the full mutable state as a named-field image.
    pub fn snapshot(&self) -> SoundBoxSnapshot {
        let mut snap = SoundBoxSnapshot {
            adpcm_control: self.control,
            adpcm_volume: self.adpcm_volume,
            cdda_volume: self.cdda_volume,
            bigdiv: self.bigdiv,
            smalldiv: self.smalldiv,
            king_adpcm_control: self.king_adpcm_control,
            last_update_timestamp: self.last_update_timestamp,
            ..Default::default()
        };
        for ch in 0..2 {
            let chan = &self.channels[ch];
            snap.reset_anti_click[ch] = chan.anti_click;
            snap.adpcm_delta[ch] = chan.delta;
            snap.adpcm_have_delta[ch] = chan.have_delta;
            snap.adpcm_predictor[ch] = chan.predictor;
            snap.step_size_index[ch] = chan.step_index;
            snap.adpcm_which_nibble[ch] = chan.which_nibble;
            snap.adpcm_half_word[ch] = chan.half_word;
            snap.adpcm_have_half_word[ch] = chan.have_half_word;
            snap.adpcm_last[ch] = chan.last_sample;
            for ear in 0..2 {
                let vf = &self.volume_filters[ch][ear];
                snap.vf_xv[ch][ear] = vf.xv;
                snap.vf_yv[ch][ear] = vf.yv;
                snap.volume_filtered[ch][ear] = vf.output;
            }
        }
        snap
    }

    /// Replace the mutable state wholesale from a snapshot, re-applying every
    /// range invariant and re-mirroring the CD-audio volume. Out-of-range
    /// values are coerced, never rejected.
    pub fn restore(&mut self, snap: &SoundBoxSnapshot, cdda_sink: &mut dyn CddaVolumeSink) {
        self.control = snap.adpcm_control;
        self.adpcm_volume = snap.adpcm_volume;
        self.cdda_volume = snap.cdda_volume;
        self.bigdiv = snap.bigdiv;
        self.smalldiv = snap.smalldiv;
        self.king_adpcm_control = snap.king_adpcm_control;
        self.last_update_timestamp = snap.last_update_timestamp;

        for ch in 0..2 {
            let chan = &mut self.channels[ch];
            chan.anti_click = snap.reset_anti_click[ch];
            chan.delta = snap.adpcm_delta[ch];
            chan.have_delta = snap.adpcm_have_delta[ch];
            chan.predictor = snap.adpcm_predictor[ch];
            chan.step_index = snap.step_size_index[ch];
            chan.which_nibble = snap.adpcm_which_nibble[ch];
            chan.half_word = snap.adpcm_half_word[ch];
            chan.have_half_word = snap.adpcm_have_half_word[ch];
            chan.last_sample = snap.adpcm_last[ch];
            for ear in 0..2 {
                let vf = &mut self.volume_filters[ch][ear];
                vf.xv = snap.vf_xv[ch][ear];
                vf.yv = snap.vf_yv[ch][ear];
                vf.output = snap.volume_filtered[ch][ear];
            }
        }

        self.apply_load_clamps();
        self.push_cdda_volume(cdda_sink);
    }

    fn apply_load_clamps(&mut self) {
        let mut clamped = false;

        clamp_i32(&mut self.bigdiv, 1, BIGDIV_RELOAD, &mut clamped);
        clamp_i32(&mut self.smalldiv, 1, 8, &mut clamped);

        let anti_click_enabled = self.config.reset_anti_click;
        for chan in &mut self.channels {
            clamp_i32(&mut chan.predictor, PREDICTOR_MIN, PREDICTOR_MAX, &mut clamped);
            clamp_i64(&mut chan.anti_click, ANTI_CLICK_MIN, ANTI_CLICK_MAX, &mut clamped);
            if !anti_click_enabled {
                // Policy, not corruption: click suppression is configured off.
                chan.anti_click = 0;
            }
            clamp_i32(&mut chan.step_index, 0, STEP_INDEX_MAX, &mut clamped);
            let masked = chan.which_nibble & 0xC;
            if masked != chan.which_nibble {
                chan.which_nibble = masked;
                clamped = true;
            }
        }

        for row in &mut self.adpcm_volume {
            for vol in row {
                if *vol & 0x3F != *vol {
                    *vol &= 0x3F;
                    clamped = true;
                }
            }
        }
        for vol in &mut self.cdda_volume {
            if *vol & 0x3F != *vol {
                *vol &= 0x3F;
                clamped = true;
            }
        }

        if clamped {
            warn!("snapshot restore coerced out-of-range state");
        }
    }
}

impl Default for SoundBox {
    fn default() -> Self {
        Self::new(SoundBoxConfig::default())
    }
}

fn clamp_i32(value: &mut i32, lo: i32, hi: i32, clamped: &mut bool) {
    let c = (*value).clamp(lo, hi);
    if c != *value {
        *value = c;
        *clamped = true;
    }
}

fn clamp_i64(value: &mut i64, lo: i64, hi: i64, clamped: &mut bool) {
    let c = (*value).clamp(lo, hi);
    if c != *value {
        *value = c;
        *clamped = true;
    }
}
