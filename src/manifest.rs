//! `ManifestIndex`: durable id -> segment location map, persisted as JSON.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::StoreError;
use crate::pattern::RecordId;

/// Where one pattern's record lives: which segment, at what byte offset, and
/// the mean phase it was written under (for shard-selector rebuilding).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternLocation {
    pub id: RecordId,
    pub segment_name: String,
    pub offset: u64,
    pub phase_center: f64,
}

#[derive(Default, Serialize, Deserialize)]
struct ManifestFile {
    entries: Vec<PatternLocation>,
}

/// In-memory id -> location map with atomic JSON persistence.
pub struct ManifestIndex {
    path: PathBuf,
    entries: HashMap<RecordId, PatternLocation>,
    dirty: bool,
}

impl ManifestIndex {
    /// Loads the manifest at `path`, or starts empty if it doesn't exist yet.
    ///
    /// # Errors
    /// Returns `StoreError::Json` on malformed manifest content and
    /// `StoreError::SegmentIoError` on I/O failure.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let raw = fs::read(&path)?;
            let file: ManifestFile = serde_json::from_slice(&raw)?;
            file.entries.into_iter().map(|e| (e.id, e)).collect()
        } else {
            HashMap::new()
        };
        Ok(Self { path, entries, dirty: false })
    }

    #[must_use]
    pub fn get(&self, id: &RecordId) -> Option<&PatternLocation> {
        self.entries.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &RecordId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn put(&mut self, location: PatternLocation) {
        self.entries.insert(location.id, location);
        self.dirty = true;
    }

    /// Removes `id`'s entry, returning it if present.
    pub fn remove(&mut self, id: &RecordId) -> Option<PatternLocation> {
        let prev = self.entries.remove(id);
        if prev.is_some() {
            self.dirty = true;
        }
        prev
    }

    /// Re-points `id` to a new location, but only if its current entry still
    /// matches `(old_segment_name, old_offset)` — a compare-and-swap used
    /// after compaction rewrites a record into a merged segment. If the
    /// current entry disagrees (removed, or already moved elsewhere by a
    /// racing writer), this is a no-op: the record is treated as already
    /// moved.
    pub fn replace(&mut self, id: RecordId, old_segment_name: &str, old_offset: u64, location: PatternLocation) {
        let Some(current) = self.entries.get(&id) else { return };
        if current.segment_name != old_segment_name || current.offset != old_offset {
            return;
        }
        self.entries.insert(id, location);
        self.dirty = true;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RecordId, &PatternLocation)> {
        self.entries.iter()
    }

    /// All locations currently pointing at `segment_name`.
    #[must_use]
    pub fn locations_in_segment(&self, segment_name: &str) -> Vec<PatternLocation> {
        self.entries.values().filter(|loc| loc.segment_name == segment_name).cloned().collect()
    }

    #[must_use]
    pub fn all_locations(&self) -> Vec<PatternLocation> {
        self.entries.values().cloned().collect()
    }

    /// Persists the manifest via write-temp-then-rename, matching the
    /// crash-safety discipline segments use for header commits.
    ///
    /// # Errors
    /// Returns `StoreError::SegmentIoError` on I/O failure and
    /// `StoreError::Json` if serialization fails.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        if !self.dirty {
            return Ok(());
        }
        let file = ManifestFile { entries: self.entries.values().cloned().collect() };
        let json = serde_json::to_vec_pretty(&file)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, &json)?;
        fs::rename(&tmp_path, &self.path)?;
        self.dirty = false;
        Ok(())
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::WavePattern;

    fn loc(id: RecordId, segment: &str, offset: u64, center: f64) -> PatternLocation {
        PatternLocation { id, segment_name: segment.to_string(), offset, phase_center: center }
    }

    #[test]
    fn put_get_remove_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        let mut m = ManifestIndex::load(&path).unwrap();
        let p = WavePattern::new(vec![1.0], vec![0.5]).unwrap();
        let id = p.derive_id();
        m.put(loc(id, "phase-0.segment", 32, 0.5));
        assert!(m.contains(&id));
        assert_eq!(m.get(&id).unwrap().offset, 32);
        m.remove(&id);
        assert!(!m.contains(&id));
    }

    #[test]
    fn flush_then_load_recovers_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        let p = WavePattern::new(vec![1.0], vec![0.5]).unwrap();
        let id = p.derive_id();
        {
            let mut m = ManifestIndex::load(&path).unwrap();
            m.put(loc(id, "phase-0.segment", 32, 0.5));
            m.flush().unwrap();
        }
        let reloaded = ManifestIndex::load(&path).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.get(&id).unwrap().segment_name, "phase-0.segment");
    }

    #[test]
    fn flush_without_changes_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        let mut m = ManifestIndex::load(&path).unwrap();
        assert!(!path.exists());
        m.flush().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn replace_is_a_no_op_when_current_location_disagrees() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        let mut m = ManifestIndex::load(&path).unwrap();
        let p = WavePattern::new(vec![1.0], vec![0.5]).unwrap();
        let id = p.derive_id();
        m.put(loc(id, "phase-0-0.segment", 32, 0.5));

        // Current entry has already moved elsewhere; the stale CAS is ignored.
        m.replace(id, "phase-0-0.segment", 999, loc(id, "phase-0-merged-1.segment", 0, 0.5));
        assert_eq!(m.get(&id).unwrap().segment_name, "phase-0-0.segment");

        m.replace(id, "phase-0-0.segment", 32, loc(id, "phase-0-merged-1.segment", 0, 0.5));
        assert_eq!(m.get(&id).unwrap().segment_name, "phase-0-merged-1.segment");
    }

    #[test]
    fn replace_is_a_no_op_when_entry_was_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        let mut m = ManifestIndex::load(&path).unwrap();
        let p = WavePattern::new(vec![1.0], vec![0.5]).unwrap();
        let id = p.derive_id();
        m.put(loc(id, "phase-0-0.segment", 32, 0.5));
        m.remove(&id);

        m.replace(id, "phase-0-0.segment", 32, loc(id, "phase-0-merged-1.segment", 0, 0.5));
        assert!(!m.contains(&id));
    }

    #[test]
    fn locations_in_segment_filters_correctly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        let mut m = ManifestIndex::load(&path).unwrap();
        let p1 = WavePattern::new(vec![1.0], vec![0.1]).unwrap();
        let p2 = WavePattern::new(vec![2.0], vec![0.2]).unwrap();
        m.put(loc(p1.derive_id(), "a.segment", 32, 0.1));
        m.put(loc(p2.derive_id(), "b.segment", 32, 0.2));
        let in_a = m.locations_in_segment("a.segment");
        assert_eq!(in_a.len(), 1);
        assert_eq!(in_a[0].id, p1.derive_id());
    }
}
