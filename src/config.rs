//! `StoreConfig`: the configuration surface named in spec §6.

use serde::{Deserialize, Serialize};

use crate::checksum::ChecksumKind;
use crate::errors::StoreError;
use crate::shard::ShardMode;

/// Tunables for one engine instance. All fields have defaults matching the
/// values named throughout spec §3/§4/§6.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Segment byte budget before `SegmentWriter::is_overflow` trips.
    pub segment_max_bytes: u64,
    /// Checksum kind used for newly-created segments.
    pub checksum_kind: ChecksumKind,
    /// `PhaseSegmentGroup::should_compact` fires once a group holds more
    /// than this many segments...
    pub compaction_min_segments: usize,
    /// ...and their average fill ratio is below this threshold.
    pub compaction_fill_threshold: f64,
    /// Tolerance used by `PhaseShardSelector::relevant_shards` queries.
    pub shard_epsilon: f64,
    /// Whether the shard selector runs in explicit-range or hash-modulo mode.
    pub shard_mode: ShardMode,
    /// Number of buckets for `ShardMode::Hash`.
    pub hash_shard_count: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            segment_max_bytes: crate::segment::DEFAULT_TARGET_BYTES,
            checksum_kind: ChecksumKind::Crc32,
            compaction_min_segments: 4,
            compaction_fill_threshold: 0.35,
            shard_epsilon: 0.1,
            shard_mode: ShardMode::Explicit,
            hash_shard_count: 16,
        }
    }
}

impl StoreConfig {
    /// Parses a config from a TOML document (e.g. the contents of a
    /// `resonancedb.toml`).
    ///
    /// # Errors
    /// Returns `StoreError::InvalidArgument` if `s` is not valid TOML or
    /// doesn't match the expected shape.
    pub fn from_toml_str(s: &str) -> Result<Self, StoreError> {
        toml::from_str(s).map_err(|e| StoreError::InvalidArgument(format!("invalid config: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_documented_values() {
        let cfg = StoreConfig::default();
        assert_eq!(cfg.segment_max_bytes, 32 * 1024 * 1024);
        assert_eq!(cfg.compaction_min_segments, 4);
        assert!((cfg.compaction_fill_threshold - 0.35).abs() < 1e-12);
    }

    #[test]
    fn parses_partial_toml_with_defaults_filled_in() {
        let cfg = StoreConfig::from_toml_str("segment_max_bytes = 1048576\n").unwrap();
        assert_eq!(cfg.segment_max_bytes, 1_048_576);
        assert_eq!(cfg.compaction_min_segments, 4);
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(StoreConfig::from_toml_str("not = [valid").is_err());
    }
}
