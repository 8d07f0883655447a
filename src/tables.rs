/// Adaptive predictor step sizes, indexed by a channel's step index.
pub const STEP_SIZES: [i32; 49] = [
    16, 17, 19, 21, 23, 25, 28, 31, 34, 37, 41, 45, 50, 55, 60, 66, 73, 80, 88, 97, 107, 118, 130,
    143, 157, 173, 190, 209, 230, 253, 279, 307, 337, 371, 408, 449, 494, 544, 598, 658, 724, 796,
    876, 963, 1060, 1166, 1282, 1411, 1552,
];

/// Signed step-index adjustment applied after decoding a nibble. The sign bit
/// (nibble & 8) does not affect adaptation, so the table repeats.
pub const STEP_INDEX_DELTAS: [i32; 16] = [-1, -1, -1, -1, 2, 4, 6, 8, -1, -1, -1, -1, 2, 4, 6, 8];

/// Step index saturates at the last entry of [`STEP_SIZES`].
pub const STEP_INDEX_MAX: i32 = 48;

/// 8-phase, 7-tap interpolation filter used by the output injector. Each row
/// sums to 2048; phase 7-n mirrors phase n.
pub const PHASE_FILTER: [[i16; 7]; 8] = [
    [40, 283, 654, 683, 331, 56, 1],
    [28, 238, 618, 706, 381, 75, 2],
    [19, 197, 577, 720, 432, 99, 4],
    [12, 160, 532, 726, 483, 128, 7],
    [7, 128, 483, 726, 532, 160, 12],
    [4, 99, 432, 720, 577, 197, 19],
    [2, 75, 381, 706, 618, 238, 28],
    [1, 56, 331, 683, 654, 283, 40],
];

/// Build the 64-entry logarithmic ADPCM volume table: 1.5 dB per step, with
/// register settings 0x00 through 0x1B resulting in silence.
pub fn volume_table() -> [f64; 0x40] {
    let mut table = [0.0f64; 0x40];
    for x in 0..0x40usize {
        let vti = 0x3F - x;
        if vti > 0x1B {
            table[vti] = 1.0 / 2.0f64.powf(x as f64 / 4.0);
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_filter_rows_sum_to_unity_gain() {
        for row in &PHASE_FILTER {
            let sum: i32 = row.iter().map(|&c| i32::from(c)).sum();
            assert_eq!(sum, 2048);
        }
    }

    #[test]
    fn phase_filter_is_symmetric() {
        for phase in 0..8 {
            let mut mirrored = PHASE_FILTER[7 - phase];
            mirrored.reverse();
            assert_eq!(PHASE_FILTER[phase], mirrored);
        }
    }

    #[test]
    fn step_sizes_strictly_increase() {
        for pair in STEP_SIZES.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        assert_eq!(STEP_SIZES[STEP_INDEX_MAX as usize], 1552);
    }

    #[test]
    fn volume_table_floor_and_ceiling() {
        let table = volume_table();
        for entry in &table[..=0x1B] {
            assert_eq!(*entry, 0.0);
        }
        assert_eq!(table[0x3F], 1.0);
        // 1.5 dB per step above the silence floor.
        for vti in 0x1D..=0x3F {
            assert!(table[vti] > table[vti - 1]);
            let ratio = table[vti] / table[vti - 1];
            assert!((ratio - 2.0f64.powf(0.25)).abs() < 1e-12);
        }
    }
}
