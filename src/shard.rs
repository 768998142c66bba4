//! `PhaseShardSelector`: maps a pattern to candidate segment groups by mean phase.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use ordered_float::OrderedFloat;

use crate::errors::StoreError;
use crate::manifest::PatternLocation;
use crate::pattern::WavePattern;

/// Normalizes `x` into `(-pi, pi]` by repeated `2*pi` adjustment.
#[must_use]
pub fn normalize_phase(x: f64) -> f64 {
    let mut v = x;
    let two_pi = 2.0 * PI;
    while v <= -PI {
        v += two_pi;
    }
    while v > PI {
        v -= two_pi;
    }
    v
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardMode {
    Explicit,
    Hash,
}

/// Routes patterns to candidate segment base names via mean phase.
pub enum PhaseShardSelector {
    Explicit { map: BTreeMap<OrderedFloat<f64>, String>, epsilon: f64 },
    Hash { total_shards: u32 },
}

impl PhaseShardSelector {
    #[must_use]
    pub fn explicit(map: BTreeMap<OrderedFloat<f64>, String>, epsilon: f64) -> Self {
        Self::Explicit { map, epsilon }
    }

    /// # Errors
    /// Returns `StoreError::InvalidArgument` if `total_shards == 0`.
    pub fn hash(total_shards: u32) -> Result<Self, StoreError> {
        if total_shards == 0 {
            return Err(StoreError::InvalidArgument("total_shards must be > 0".into()));
        }
        Ok(Self::Hash { total_shards })
    }

    /// Builds an explicit-range selector from manifest locations: groups by
    /// segment base name (stripping the generation/extension suffix, so
    /// every generation of the same group contributes to one shard) and
    /// averages that group's `phase_center`s.
    #[must_use]
    pub fn from_manifest(locations: &[PatternLocation], epsilon: f64) -> Self {
        let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
        for loc in locations {
            let entry = sums.entry(segment_base_name(&loc.segment_name)).or_insert((0.0, 0));
            entry.0 += loc.phase_center;
            entry.1 += 1;
        }
        let mut map = BTreeMap::new();
        for (base, (sum, count)) in sums {
            let mean = normalize_phase(sum / count as f64);
            insert_disambiguated(&mut map, mean, base);
        }
        Self::Explicit { map, epsilon }
    }

    /// The single segment base name this pattern routes to for writes.
    #[must_use]
    pub fn select_shard(&self, pattern: &WavePattern) -> String {
        let mean = pattern.mean_phase();
        match self {
            Self::Explicit { map, .. } => {
                if map.is_empty() {
                    return hash_shard_name(mean, 1);
                }
                floor_entry(map, mean).map(|(_, v)| v.clone()).expect("checked non-empty above")
            }
            Self::Hash { total_shards } => hash_shard_name(mean, *total_shards),
        }
    }

    /// Segment base names worth scanning for a query within `eps` of `Q`'s
    /// mean phase, decomposing across the (-pi, pi] wraparound when needed.
    #[must_use]
    pub fn relevant_shards(&self, query: &WavePattern, eps: f64) -> Vec<String> {
        let mean = query.mean_phase();
        match self {
            Self::Explicit { map, .. } => {
                if map.is_empty() {
                    return Vec::new();
                }
                if eps >= PI {
                    return map.values().cloned().collect::<Vec<_>>().dedup_preserving_order();
                }
                let lo = mean - eps;
                let hi = mean + eps;
                let mut names: Vec<String> = Vec::new();
                if lo < -PI || hi > PI {
                    // Crosses the wraparound boundary: decompose into two ranges.
                    let (lo1, hi1) = (normalize_phase(lo), PI);
                    let (lo2, hi2) = (-PI, normalize_phase(hi));
                    collect_range(map, lo1, hi1, &mut names);
                    collect_range(map, lo2, hi2, &mut names);
                } else {
                    collect_range(map, lo, hi, &mut names);
                }
                if names.is_empty() {
                    return map.values().cloned().collect::<Vec<_>>().dedup_preserving_order();
                }
                names.dedup_preserving_order()
            }
            Self::Hash { total_shards } => vec![hash_shard_name(mean, *total_shards)],
        }
    }

    /// Placeholder hook for a future low-coherence fallback route.
    ///
    /// TODO: the source implementation returns `None` unconditionally here;
    /// intent appears to be a future hook for routing queries whose mean
    /// phase sits in a low-density region of the shard map. Left as a
    /// documented no-op rather than inventing semantics (spec §9).
    #[must_use]
    pub fn fallback_route_if_low_coherence(&self, _query: &WavePattern) -> Option<String> {
        None
    }
}

fn insert_disambiguated(map: &mut BTreeMap<OrderedFloat<f64>, String>, mut key: f64, value: String) {
    while map.contains_key(&OrderedFloat(key)) {
        key = next_up(key);
    }
    map.insert(OrderedFloat(key), value);
}

/// Smallest representable `f64` strictly greater than `x` (for disambiguating
/// duplicate phase-center keys while keeping the map strictly sorted).
fn next_up(x: f64) -> f64 {
    if x.is_nan() || x == f64::INFINITY {
        return x;
    }
    let bits = x.to_bits();
    let next_bits = if x >= 0.0 { bits + 1 } else { bits - 1 };
    f64::from_bits(next_bits)
}

fn floor_entry(map: &BTreeMap<OrderedFloat<f64>, String>, key: f64) -> Option<(f64, &String)> {
    map.range(..=OrderedFloat(key)).next_back().map(|(k, v)| (k.0, v)).or_else(|| {
        // Wrap to the first entry when key is below every key in the map.
        map.iter().next().map(|(k, v)| (k.0, v))
    })
}

fn collect_range(map: &BTreeMap<OrderedFloat<f64>, String>, lo: f64, hi: f64, out: &mut Vec<String>) {
    for (k, v) in map.range(OrderedFloat(lo)..=OrderedFloat(hi)) {
        let _ = k;
        out.push(v.clone());
    }
}

fn hash_shard_name(mean_phase: f64, total_shards: u32) -> String {
    let bucket = floor_mod_hash(mean_phase, total_shards);
    format!("phase-{bucket}")
}

/// Strips a segment file name's trailing `-<seq>` or `-merged-<ts>` suffix
/// and `.segment` extension, recovering the `PhaseSegmentGroup` base name it
/// belongs to.
#[must_use]
pub fn segment_base_name(segment_name: &str) -> String {
    let stem = segment_name.strip_suffix(".segment").unwrap_or(segment_name);
    if let Some(idx) = stem.rfind("-merged-") {
        return stem[..idx].to_string();
    }
    stem.rsplit_once('-').map_or_else(|| stem.to_string(), |(base, _seq)| base.to_string())
}

fn floor_mod_hash(mean_phase: f64, total_shards: u32) -> u32 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    mean_phase.to_bits().hash(&mut hasher);
    let h = hasher.finish();
    (h % u64::from(total_shards)) as u32
}

trait DedupPreservingOrder {
    fn dedup_preserving_order(self) -> Self;
}

impl DedupPreservingOrder for Vec<String> {
    fn dedup_preserving_order(self) -> Self {
        let mut seen = std::collections::HashSet::new();
        self.into_iter().filter(|s| seen.insert(s.clone())).collect()
    }
}
