#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
/// ADPCM codec behavior variant.
///
/// `BuggyEncoder` reproduces the defective algorithm baked into an official
/// PC-FX ADPCM encoder (terminal step size 1522 instead of 1552, doubled
/// deltas, halved predictor at mix time) rather than how the hardware
/// actually decodes. Some commercial audio was mastered against the bug, so
/// both variants must stay bit-exact.
pub enum CodecMode {
    #[default]
    Hardware,
    BuggyEncoder,
}

impl CodecMode {
    #[inline]
    pub const fn is_buggy(self) -> bool {
        matches!(self, CodecMode::BuggyEncoder)
    }
}

#[derive(Clone, Copy, Debug)]
/// Construction options for [`crate::soundbox::SoundBox`], fixed for the
/// lifetime of the instance.
pub struct SoundBoxConfig {
    pub codec: CodecMode,
    /// Fold predictor resets into a decaying offset so mid-stream resets do
    /// not pop audibly.
    pub reset_anti_click: bool,
}

impl Default for SoundBoxConfig {
    fn default() -> Self {
        Self {
            codec: CodecMode::Hardware,
            reset_anti_click: true,
        }
    }
}
