//! `Engine`: the facade composing shard selector, manifest, segment groups,
//! and kernel into insert/search/delete/interference-map operations.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::warn;
use parking_lot::RwLock;
use serde_json::Value;

use crate::config::StoreConfig;
use crate::errors::StoreError;
use crate::kernel::{DefaultResonanceKernel, ResonanceKernel};
use crate::manifest::{ManifestIndex, PatternLocation};
use crate::meta::MetaStore;
use crate::pattern::{RecordId, WavePattern};
use crate::segment::{DefaultSegmentCompactor, PhaseSegmentGroup, SegmentReader};
use crate::shard::PhaseShardSelector;
use crate::zone::ResonanceZoneClassifier;

/// One scored candidate from `Engine::search`.
#[derive(Debug, Clone)]
pub struct ResonanceMatchDetailed {
    pub id: RecordId,
    pub energy: f64,
    pub phase_delta: f64,
    pub zone: crate::zone::ResonanceZone,
    pub zone_score: f64,
}

/// Composition root: owns the global lock, the per-shard segment groups, the
/// manifest, the metadata side-store, and a pluggable kernel.
///
/// Lock ordering: `global` is always acquired before a group's own mutex,
/// never the reverse.
pub struct Engine {
    root: PathBuf,
    config: StoreConfig,
    global: RwLock<()>,
    groups: RwLock<HashMap<String, PhaseSegmentGroup>>,
    manifest: RwLock<ManifestIndex>,
    meta: MetaStore,
    kernel: Box<dyn ResonanceKernel>,
    classifier: ResonanceZoneClassifier,
    compactor: DefaultSegmentCompactor,
}

impl Engine {
    /// Opens (creating if necessary) a store rooted at `root`.
    ///
    /// # Errors
    /// Returns `StoreError::SegmentIoError` if the directory structure can't
    /// be created, or `StoreError::Json` if an existing manifest/metadata
    /// file is malformed.
    pub fn open(root: impl AsRef<Path>, config: StoreConfig) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        let segments_dir = root.join("segments");
        std::fs::create_dir_all(&segments_dir)?;

        let manifest = ManifestIndex::load(root.join("manifest.json"))?;
        let meta = MetaStore::load(root.join("pattern-meta.json"))?;
        let groups = rebuild_groups(&manifest, &segments_dir, &config);
        let compactor = DefaultSegmentCompactor::new(config.checksum_kind, config.segment_max_bytes);

        Ok(Self {
            root,
            config,
            global: RwLock::new(()),
            groups: RwLock::new(groups),
            manifest: RwLock::new(manifest),
            meta,
            kernel: Box::new(DefaultResonanceKernel::new()),
            classifier: ResonanceZoneClassifier::new(),
            compactor,
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn segments_dir(&self) -> PathBuf {
        self.root.join("segments")
    }

    /// Inserts `pattern`, deriving its id from content. Re-inserting the
    /// same content behaves as a replace (last-writer-wins).
    ///
    /// # Errors
    /// Returns `StoreError::InvalidPattern` if `pattern` is malformed, or
    /// propagates I/O/manifest errors.
    pub fn insert(&self, pattern: &WavePattern, meta: Value) -> Result<RecordId, StoreError> {
        let id = pattern.derive_id();
        let mean_phase = pattern.mean_phase();

        let _global = self.global.write();
        let base_name = self.select_base_name(pattern);

        {
            let mut groups = self.groups.write();
            if !groups.contains_key(&base_name) {
                groups.insert(
                    base_name.clone(),
                    PhaseSegmentGroup::new(base_name.clone(), self.segments_dir(), self.config.checksum_kind, self.config.segment_max_bytes),
                );
            }
        }

        let groups = self.groups.read();
        let group = groups.get(&base_name).expect("just inserted above");
        let _group_lock = group.lock.lock();

        let (offset, segment_name) = group.with_writable(|writer| {
            let offset = writer.write(&id, pattern)?;
            writer.flush()?;
            Ok((offset, writer.segment_name()))
        })?;

        self.manifest.write().put(PatternLocation { id, segment_name, offset, phase_center: mean_phase });
        self.manifest.write().flush()?;
        self.meta.put(id, meta);
        self.meta.flush()?;

        if group.should_compact(self.config.compaction_min_segments, self.config.compaction_fill_threshold) {
            let mut manifest = self.manifest.write();
            if let Err(e) = self.compactor.compact(group, &mut manifest) {
                warn!("opportunistic compaction of {base_name} failed: {e}");
            }
        }

        Ok(id)
    }

    fn select_base_name(&self, pattern: &WavePattern) -> String {
        let manifest = self.manifest.read();
        let locations = manifest.all_locations();
        let selector = self.build_shard_selector(&locations);
        selector.select_shard(pattern)
    }

    fn build_shard_selector(&self, locations: &[PatternLocation]) -> PhaseShardSelector {
        match self.config.shard_mode {
            crate::shard::ShardMode::Explicit => {
                PhaseShardSelector::from_manifest(locations, self.config.shard_epsilon)
            }
            crate::shard::ShardMode::Hash => {
                PhaseShardSelector::hash(self.config.hash_shard_count).unwrap_or_else(|_| {
                    PhaseShardSelector::hash(1).expect("1 is always a valid shard count")
                })
            }
        }
    }

    /// Scores every record in the candidate shards within `eps` of `query`'s
    /// mean phase, returning the top `k` sorted by zone score (descending),
    /// ties by energy (descending), then by id (ascending).
    ///
    /// # Errors
    /// Returns `StoreError::CorruptSegment` only if every candidate segment
    /// failed to open; individual corrupt candidates are skipped with a
    /// logged warning.
    pub fn search(&self, query: &WavePattern, k: usize, eps: f64) -> Result<Vec<ResonanceMatchDetailed>, StoreError> {
        let _global = self.global.read();
        let manifest = self.manifest.read();
        let locations = manifest.all_locations();
        let selector = self.build_shard_selector(&locations);
        let candidate_segments = selector.relevant_shards(query, eps);

        let mut results = Vec::new();
        let mut opened_any = false;
        let mut last_err = None;

        for segment_name in &candidate_segments {
            let path = self.segments_dir().join(segment_name);
            if !path.exists() {
                continue;
            }
            match SegmentReader::open(&path) {
                Ok(mut reader) => {
                    opened_any = true;
                    for record in reader.read_all_with_id() {
                        let (id, offset, pattern) = match record {
                            Ok(v) => v,
                            Err(e) => {
                                warn!("search: skipping unreadable record in {segment_name}: {e}");
                                continue;
                            }
                        };
                        // Only score the manifest's live copy of this id.
                        if manifest.get(&id).is_none_or(|loc| loc.segment_name != *segment_name || loc.offset != offset) {
                            continue;
                        }
                        let (energy, phase_delta) = self.kernel.compare_with_phase_delta(query, &pattern)?;
                        let zone = self.classifier.classify(energy, phase_delta);
                        let zone_score = self.classifier.compute_score(energy, phase_delta.abs());
                        results.push(ResonanceMatchDetailed { id, energy, phase_delta, zone, zone_score });
                    }
                }
                Err(e) => {
                    warn!("search: skipping candidate segment {segment_name}: {e}");
                    last_err = Some(e);
                }
            }
        }

        if !opened_any && !candidate_segments.is_empty() {
            if let Some(e) = last_err {
                return Err(e);
            }
        }

        results.sort_by(|a, b| {
            b.zone_score
                .partial_cmp(&a.zone_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.energy.partial_cmp(&a.energy).unwrap_or(std::cmp::Ordering::Equal))
                .then_with(|| a.id.cmp(&b.id))
        });
        results.truncate(k);
        Ok(results)
    }

    /// Pairwise `kernel.compare` of `query` against each of `candidate_ids`
    /// (ids not present in the manifest are silently skipped).
    ///
    /// # Errors
    /// Propagates `StoreError` from opening segments or the kernel.
    pub fn interference_map(&self, query: &WavePattern, candidate_ids: &[RecordId]) -> Result<Vec<(RecordId, f64)>, StoreError> {
        let _global = self.global.read();
        let manifest = self.manifest.read();
        let mut results = Vec::with_capacity(candidate_ids.len());
        let mut reader_cache: HashMap<String, SegmentReader> = HashMap::new();

        for &id in candidate_ids {
            let Some(loc) = manifest.get(&id) else { continue };
            let path = self.segments_dir().join(&loc.segment_name);
            if !reader_cache.contains_key(&loc.segment_name) {
                reader_cache.insert(loc.segment_name.clone(), SegmentReader::open(&path)?);
            }
            let reader = reader_cache.get_mut(&loc.segment_name).expect("just inserted above");
            let (found_id, _offset, pattern) = reader.read_with_id(loc.offset)?;
            if found_id != id {
                continue;
            }
            let energy = self.kernel.compare(query, &pattern, crate::kernel::CompareOptions::default())?;
            results.push((id, energy));
        }
        Ok(results)
    }

    /// Removes `id` from the manifest and metadata store. The underlying
    /// bytes remain in their segment until the next compaction
    /// (tombstone-by-absence).
    ///
    /// # Errors
    /// Propagates I/O errors from persisting the manifest/metadata.
    pub fn delete(&self, id: &RecordId) -> Result<(), StoreError> {
        let _global = self.global.write();
        self.manifest.write().remove(id);
        self.manifest.write().flush()?;
        self.meta.remove(id);
        self.meta.flush()?;
        Ok(())
    }
}

fn rebuild_groups(manifest: &ManifestIndex, segments_dir: &Path, config: &StoreConfig) -> HashMap<String, PhaseSegmentGroup> {
    let mut by_base: HashMap<String, Vec<String>> = HashMap::new();
    for loc in manifest.all_locations() {
        let base = crate::shard::segment_base_name(&loc.segment_name);
        by_base.entry(base).or_default().push(loc.segment_name.clone());
    }
    let mut groups = HashMap::new();
    for (base, mut names) in by_base {
        names.sort();
        names.dedup();
        // Resume the generation counter past every suffix already on disk
        // so a freshly-opened writer never reuses a name.
        let generation = names
            .iter()
            .filter_map(|n| n.strip_prefix(&format!("{base}-")).and_then(|rest| rest.strip_suffix(".segment")))
            .filter_map(|g| g.parse::<u64>().ok())
            .max()
            .map_or(0, |max_gen| max_gen + 1);
        groups.insert(
            base.clone(),
            PhaseSegmentGroup::restore(base, segments_dir, config.checksum_kind, config.segment_max_bytes, names, generation),
        );
    }
    groups
}
