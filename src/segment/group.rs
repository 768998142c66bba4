//! `PhaseSegmentGroup`: the live writer plus sealed readers for one shard.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::checksum::ChecksumKind;
use crate::errors::StoreError;

use super::writer::SegmentWriter;

struct Inner {
    sealed: Vec<String>,
    generation: u64,
    active: Option<SegmentWriter>,
}

/// Owns the currently-writable segment for a shard, plus the names of sealed
/// (previously rolled-over) segments that still need scanning at query time.
///
/// Access is serialized by `lock`, a per-group mutex: callers take the
/// engine's global `RwLock` read/write guard first, then this group's mutex,
/// never the reverse (deadlock-avoidance ordering). `sealed`/`generation`/
/// `active` live behind their own mutex so a group can be mutated through a
/// shared reference while `groups` is only read-locked at the map level,
/// letting inserts into different groups proceed without blocking each other.
pub struct PhaseSegmentGroup {
    pub base_name: String,
    dir: PathBuf,
    checksum_kind: ChecksumKind,
    target_bytes: u64,
    pub lock: Mutex<()>,
    inner: Mutex<Inner>,
}

impl PhaseSegmentGroup {
    #[must_use]
    pub fn new(base_name: String, dir: impl AsRef<Path>, checksum_kind: ChecksumKind, target_bytes: u64) -> Self {
        Self {
            base_name,
            dir: dir.as_ref().to_path_buf(),
            checksum_kind,
            target_bytes,
            lock: Mutex::new(()),
            inner: Mutex::new(Inner { sealed: Vec::new(), generation: 0, active: None }),
        }
    }

    /// Restores a group with known sealed segments and generation counter
    /// (used when rebuilding groups from an existing manifest at startup).
    #[must_use]
    pub fn restore(
        base_name: String,
        dir: impl AsRef<Path>,
        checksum_kind: ChecksumKind,
        target_bytes: u64,
        sealed: Vec<String>,
        generation: u64,
    ) -> Self {
        Self {
            base_name,
            dir: dir.as_ref().to_path_buf(),
            checksum_kind,
            target_bytes,
            lock: Mutex::new(()),
            inner: Mutex::new(Inner { sealed, generation, active: None }),
        }
    }

    fn active_segment_name(&self, generation: u64) -> String {
        format!("{}-{}.segment", self.base_name, generation)
    }

    fn active_path(&self, generation: u64) -> PathBuf {
        self.dir.join(self.active_segment_name(generation))
    }

    /// Returns the writable segment: the active one, opening it on first
    /// use, or a freshly-rolled one if the active segment has crossed its
    /// byte-threshold overflow point. At most one new segment is created
    /// per overflow, serialized by the caller holding `lock`.
    ///
    /// # Errors
    /// Propagates `StoreError` from opening or rolling over the underlying
    /// segment file.
    pub fn with_writable<R>(&self, f: impl FnOnce(&mut SegmentWriter) -> Result<R, StoreError>) -> Result<R, StoreError> {
        let mut inner = self.inner.lock();
        let needs_fresh_segment = match inner.active.as_ref() {
            None => true,
            Some(w) => w.is_overflow(),
        };
        if needs_fresh_segment {
            if let Some(mut writer) = inner.active.take() {
                writer.flush()?;
                inner.sealed.push(writer.segment_name());
                inner.generation += 1;
            }
            let writer = SegmentWriter::open(self.active_path(inner.generation), self.checksum_kind, self.target_bytes)?;
            inner.active = Some(writer);
        }
        let writer = inner.active.as_mut().expect("just ensured Some");
        f(writer)
    }

    /// True once this group has accumulated more than `min_segments` and
    /// those segments average below `fill_threshold` full — many small,
    /// sparse segments worth folding into one.
    #[must_use]
    pub fn should_compact(&self, min_segments: usize, fill_threshold: f64) -> bool {
        let names = self.all_segment_names();
        if names.len() <= min_segments {
            return false;
        }
        let avg = names.iter().map(|n| self.segment_fill_ratio(n)).sum::<f64>() / names.len() as f64;
        avg < fill_threshold
    }

    fn segment_fill_ratio(&self, name: &str) -> f64 {
        let inner = self.inner.lock();
        if inner.active.as_ref().is_some_and(|w| w.segment_name() == name) {
            return inner.active.as_ref().expect("checked Some above").fill_ratio();
        }
        drop(inner);
        let size = std::fs::metadata(self.dir.join(name)).map(|m| m.len()).unwrap_or(0);
        size as f64 / self.target_bytes.max(1) as f64
    }

    /// All segment file names belonging to this group: sealed ones plus the
    /// active one, if it has ever been opened.
    #[must_use]
    pub fn all_segment_names(&self) -> Vec<String> {
        let inner = self.inner.lock();
        let mut names = inner.sealed.clone();
        if let Some(writer) = inner.active.as_ref() {
            names.push(writer.segment_name());
        }
        names
    }

    /// Seals the current active segment (flushing it) and starts a fresh one
    /// at the next generation, returning the sealed segment's name.
    ///
    /// # Errors
    /// Propagates `StoreError` from flushing the sealed segment.
    pub fn roll_over(&self) -> Result<Option<String>, StoreError> {
        let mut inner = self.inner.lock();
        let Some(mut writer) = inner.active.take() else {
            return Ok(None);
        };
        writer.flush()?;
        let sealed_name = writer.segment_name();
        inner.sealed.push(sealed_name.clone());
        inner.generation += 1;
        Ok(Some(sealed_name))
    }

    /// Replaces this group's sealed set with a single merged segment,
    /// discarding the old generation history (called after compaction).
    pub fn reset_to(&self, merged_segment_name: String, next_generation: u64) {
        let mut inner = self.inner.lock();
        inner.sealed = vec![merged_segment_name];
        inner.generation = next_generation;
        inner.active = None;
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }
}
