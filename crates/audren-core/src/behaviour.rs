//! Revision-gated feature flags and the per-update error list.
//!
//! Guests announce the renderer revision they were built against as a magic
//! word (`"REV"` followed by an ASCII digit base, then the revision number).
//! Features are enabled for every revision at or above the one that
//! introduced them.

use crate::constants::MAX_ERROR_INFOS;
use crate::error::ErrorInfo;

/// Base magic for revision words: the bytes `"REV0"` read little-endian.
pub const REVISION_MAGIC: u32 = u32::from_le_bytes(*b"REV0");

/// Newest revision this renderer understands.
pub const LAST_REVISION: u32 = 12;

const REVISION_SPLITTER: u32 = 2;
const REVISION_SPLITTER_BUG_FIX: u32 = 5;
const REVISION_MIX_DIRTY_ONLY_UPDATE: u32 = 7;
const REVISION_EFFECT_INFO_V2: u32 = 9;
const REVISION_SPLITTER_BIQUAD: u32 = 12;

const FLAG_MEMORY_POOL_FORCE_MAPPING: u64 = 1;

/// Extracts the revision number from a magic word.
#[inline]
pub fn revision_from_magic(magic: u32) -> u32 {
    magic.wrapping_sub(REVISION_MAGIC)
}

/// Builds the magic word for a revision number.
#[inline]
pub fn magic_from_revision(revision: u32) -> u32 {
    REVISION_MAGIC.wrapping_add(revision)
}

/// Returns true when `revision` is one this renderer can serve.
#[inline]
pub fn is_valid_revision(revision: u32) -> bool {
    (1..=LAST_REVISION).contains(&revision)
}

/// Feature gates and error accumulation for one renderer instance.
#[derive(Debug, Clone)]
pub struct BehaviourContext {
    revision: u32,
    flags: u64,
    errors: Vec<ErrorInfo>,
}

impl BehaviourContext {
    /// Creates a context for `revision`.
    ///
    /// Revisions newer than [`LAST_REVISION`] are served as the last known one.
    pub fn new(revision: u32) -> Self {
        let clamped = revision.min(LAST_REVISION);
        #[cfg(feature = "tracing")]
        if clamped != revision {
            tracing::warn!(revision, served = clamped, "unknown renderer revision");
        }
        Self {
            revision: clamped,
            flags: 0,
            errors: Vec::with_capacity(MAX_ERROR_INFOS),
        }
    }

    /// Creates a context from a guest magic word.
    pub fn from_magic(magic: u32) -> Self {
        Self::new(revision_from_magic(magic))
    }

    /// The revision features are gated on.
    pub fn revision(&self) -> u32 {
        self.revision
    }

    /// Replaces the per-update behaviour flags.
    pub fn update_flags(&mut self, flags: u64) {
        self.flags = flags;
    }

    /// True when `revision` is at or above `introduced_in`.
    #[inline]
    pub fn check_feature_supported(revision: u32, introduced_in: u32) -> bool {
        revision >= introduced_in
    }

    /// Buffers outside every memory pool are accepted as identity mappings.
    pub fn is_memory_pool_force_mapping_enabled(&self) -> bool {
        self.flags & FLAG_MEMORY_POOL_FORCE_MAPPING != 0
    }

    /// Mixes may route through splitters, and ordering uses the edge matrix.
    pub fn is_splitter_supported(&self) -> bool {
        Self::check_feature_supported(self.revision, REVISION_SPLITTER)
    }

    /// Splitter destination counts are taken as-is rather than clamped to a
    /// per-splitter share.
    pub fn is_splitter_bug_fixed(&self) -> bool {
        Self::check_feature_supported(self.revision, REVISION_SPLITTER_BUG_FIX)
    }

    /// Mix parameters may be a dirty subset, each naming its own mix id.
    pub fn is_mix_in_parameter_dirty_only_update_supported(&self) -> bool {
        Self::check_feature_supported(self.revision, REVISION_MIX_DIRTY_ONLY_UPDATE)
    }

    /// Effect out statuses carry extended result state (limiter statistics).
    pub fn is_effect_info_version2_supported(&self) -> bool {
        Self::check_feature_supported(self.revision, REVISION_EFFECT_INFO_V2)
    }

    /// Splitter destinations carry biquad filter parameters.
    pub fn is_biquad_filter_parameter_for_splitter_enabled(&self) -> bool {
        Self::check_feature_supported(self.revision, REVISION_SPLITTER_BIQUAD)
    }

    /// Records an absorbed error. Errors past [`MAX_ERROR_INFOS`] are dropped.
    pub fn append_error(&mut self, info: ErrorInfo) {
        if self.errors.len() < MAX_ERROR_INFOS {
            self.errors.push(info);
        } else {
            #[cfg(feature = "tracing")]
            tracing::debug!(?info, "error info list full, dropping");
        }
    }

    /// Errors recorded since the last [`take_errors`](Self::take_errors).
    pub fn errors(&self) -> &[ErrorInfo] {
        &self.errors
    }

    /// Drains the recorded errors.
    pub fn take_errors(&mut self) -> Vec<ErrorInfo> {
        std::mem::take(&mut self.errors)
    }
}
