//! Cycle-accurate emulation core for the PC-FX "SoundBox" ADPCM subsystem.
//!
//! This crate contains the platform-agnostic decode-and-mix pipeline: two
//! adaptive-differential PCM channels, per-channel/per-ear volume smoothing,
//! click suppression across predictor resets, and polyphase-interpolated
//! injection into a fixed-rate accumulation ring. The core runs no thread of
//! its own; it is a pure function of the machine's master-clock timestamp,
//! replayed lazily on demand (see [`soundbox::SoundBox::catch_up`]).
//!
//! The surrounding machine (KING memory controller, tone/noise synthesizer,
//! CD-audio path, host-rate resampler) is reached only through the traits in
//! [`bus`].

/// External collaborator interfaces: ADPCM halfword source, tone/noise
/// synthesizer, CD-audio volume sink, host-rate converter.
pub mod bus;

/// Codec behavior variants and construction options.
pub mod hardware;

/// Fixed-rate accumulation ring buffer and CD-audio side buffer.
pub mod ring;

/// Named-field state snapshot with clamp-on-load restore.
pub mod snapshot;

/// The SoundBox itself: ADPCM decode, timing, synthesis, register dispatch.
pub mod soundbox;

/// Predictor step tables, polyphase filter coefficients, and volume table.
pub mod tables;
