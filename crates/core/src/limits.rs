//! Tunable limits shared by the delta-base chooser and the commit pipeline.
//!
//! These mirror the `fs.*` configuration knobs of the original implementation
//! this core is modeled on; defaults match spec.md §4.3's worked examples.

/// Repository on-disk format version. Bumped when the proto-rev or revision
/// file layout changes in a way readers must know about.
pub const FORMAT_VERSION: u32 = 7;

/// Skip-delta policy and shard-layout knobs, collected into one struct so
/// [`fsfs_engine::config::RepoConfig`] can own a single copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DeltaLimits {
    /// Below this walk distance, skip-delta selection falls back to a pure
    /// linear chain near HEAD (spec.md §4.3).
    pub max_linear_deltification: u32,
    /// Walks longer than this abandon deltification and start a fresh rep.
    pub max_deltification_walk: u32,
}

impl Default for DeltaLimits {
    fn default() -> Self {
        DeltaLimits {
            max_linear_deltification: 4,
            max_deltification_walk: 1024,
        }
    }
}

impl DeltaLimits {
    /// Maximum allowed chain length once shared-rep bases are in play
    /// (spec.md §4.3, §8).
    pub fn max_shared_chain_len(&self) -> u32 {
        2 * self.max_linear_deltification + 2
    }
}
