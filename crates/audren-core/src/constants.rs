//! Renderer-wide limits and sentinel values.
//!
//! Guest parameter blocks use raw sentinels (`UNUSED_MIX_ID`,
//! `UNUSED_SPLITTER_ID`, `INVALID_PROCESSING_ORDER`) to mean "absent". They are
//! converted to `Option` at the boundary by [`mix_index`] and [`splitter_index`]
//! and never stored raw past that point.

/// Identifier of the final mix, the root every routed mix drains into.
pub const FINAL_MIX_ID: i32 = 0;

/// Mix id meaning "no mix".
pub const UNUSED_MIX_ID: i32 = i32::MAX;

/// Splitter id meaning "no splitter".
pub const UNUSED_SPLITTER_ID: u32 = u32::MAX;

/// Processing order meaning "not placed in any mix".
pub const INVALID_PROCESSING_ORDER: i32 = -1;

/// Maximum number of channels an effect or sink may address.
pub const CHANNEL_COUNT_MAX: usize = 6;

/// Maximum number of mix buffers a single mix can own.
pub const MIX_BUFFER_COUNT_MAX: usize = 24;

/// Internal processing rate. Device sinks running at any other rate need an upsampler.
pub const TARGET_SAMPLE_RATE: u32 = 48_000;

/// Size in bytes of one PCM16 sample as written by circular buffer sinks.
pub const TARGET_SAMPLE_SIZE: u32 = 2;

/// Maximum number of error infos reported back per update.
pub const MAX_ERROR_INFOS: usize = 10;

/// Square volume matrix: `volumes[source][destination]`.
pub type MixVolumeMatrix = [[f32; MIX_BUFFER_COUNT_MAX]; MIX_BUFFER_COUNT_MAX];

/// Converts a raw guest mix id into an index, mapping the sentinel and
/// negative ids to `None`.
#[inline]
pub fn mix_index(raw: i32) -> Option<usize> {
    if raw == UNUSED_MIX_ID || raw < 0 {
        None
    } else {
        Some(raw as usize)
    }
}

/// Converts a raw guest splitter id into an index.
#[inline]
pub fn splitter_index(raw: u32) -> Option<usize> {
    if raw == UNUSED_SPLITTER_ID {
        None
    } else {
        Some(raw as usize)
    }
}

/// Returns true for the channel counts the hardware mixer accepts (1, 2, 4, 6).
#[inline]
pub fn is_channel_count_valid(count: u32) -> bool {
    matches!(count, 1 | 2 | 4 | 6)
}
