//! Deterministic state image of the SoundBox.
//!
//! The snapshot is a plain named-field struct covering every mutable entry of
//! the data model; any outer serialization framework can persist it
//! field-for-field. Restoring goes through
//! [`crate::soundbox::SoundBox::restore`], which re-applies every range
//! invariant rather than rejecting out-of-range values.

/// Serialized image of a SoundBox's mutable state.
///
/// Per-channel arrays are indexed `[channel]`; per-ear arrays `[channel][ear]`
/// with ear 0 = left.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SoundBoxSnapshot {
    pub adpcm_control: u16,
    pub adpcm_volume: [[u8; 2]; 2],
    pub cdda_volume: [u8; 2],
    pub bigdiv: i32,
    pub smalldiv: i32,

    pub reset_anti_click: [i64; 2],
    pub volume_filtered: [[f64; 2]; 2],
    pub vf_xv: [[[f64; 2]; 2]; 2],
    pub vf_yv: [[[f64; 2]; 2]; 2],

    pub adpcm_delta: [i32; 2],
    pub adpcm_have_delta: [i32; 2],
    pub adpcm_predictor: [i32; 2],
    pub step_size_index: [i32; 2],

    pub adpcm_which_nibble: [u32; 2],
    pub adpcm_half_word: [u16; 2],
    pub adpcm_have_half_word: [bool; 2],
    pub adpcm_last: [[i32; 2]; 2],

    pub king_adpcm_control: u32,
    pub last_update_timestamp: u32,
}
