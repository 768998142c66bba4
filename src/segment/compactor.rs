//! `DefaultSegmentCompactor`: merges a group's sealed segments into one,
//! keeping only records the manifest still considers live.

use std::fs;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use log::{info, warn};

use crate::checksum::ChecksumKind;
use crate::errors::StoreError;
use crate::manifest::{ManifestIndex, PatternLocation};

use super::group::PhaseSegmentGroup;
use super::reader::SegmentReader;
use super::writer::SegmentWriter;

const MAX_RENAME_ATTEMPTS: u32 = 10;
const INITIAL_BACKOFF: Duration = Duration::from_millis(100);

/// Rewrites a group's segments into a single compacted file.
pub struct DefaultSegmentCompactor {
    checksum_kind: ChecksumKind,
    target_bytes: u64,
}

impl DefaultSegmentCompactor {
    #[must_use]
    pub fn new(checksum_kind: ChecksumKind, target_bytes: u64) -> Self {
        Self { checksum_kind, target_bytes }
    }

    /// Merges every segment currently owned by `group` into one file,
    /// dropping records the manifest no longer points at (tombstoned or
    /// superseded), then atomically installs the merge and repoints the
    /// manifest's live entries at it.
    ///
    /// # Errors
    /// Returns `StoreError::CompactionFailed` if the atomic rename can't
    /// land after retrying, and propagates I/O / corruption errors from
    /// reading the old segments.
    pub fn compact(&self, group: &PhaseSegmentGroup, manifest: &mut ManifestIndex) -> Result<(), StoreError> {
        let _held = group.lock.lock();

        if group.all_segment_names().len() <= 1 {
            return Ok(());
        }

        group.roll_over()?;
        let old_names = group.all_segment_names();

        // `gen0` is the generation number roll_over() just advanced to — an
        // unused slot, since nothing has written under it yet. The merged
        // file takes that slot; the next active segment (after `reset_to`
        // below) takes `gen0 + 1`, so the two never collide.
        let gen0 = group.generation();
        let dir = group.dir().to_path_buf();
        let tmp_name = format!("{}-tmp-merged-{gen0}.segment", group.base_name);
        let tmp_path = dir.join(&tmp_name);
        let final_name = format!("{}-merged-{gen0}.segment", group.base_name);
        let final_path = dir.join(&final_name);

        let mut writer = SegmentWriter::open(&tmp_path, self.checksum_kind, self.target_bytes)?;
        let mut relocations: Vec<(crate::pattern::RecordId, String, u64, PatternLocation)> = Vec::new();

        for name in &old_names {
            let path = dir.join(name);
            let mut reader = SegmentReader::open(&path)?;
            for record in reader.read_all_with_id() {
                let (id, offset, pattern) = record?;
                let live = manifest.get(&id).is_some_and(|loc| &loc.segment_name == name && loc.offset == offset);
                if !live {
                    continue;
                }
                let new_offset = writer.write(&id, &pattern)?;
                let phase_center = pattern.mean_phase();
                relocations.push((
                    id,
                    name.clone(),
                    offset,
                    PatternLocation { id, segment_name: final_name.clone(), offset: new_offset, phase_center },
                ));
            }
        }
        writer.flush()?;
        drop(writer);

        rename_with_retry(&tmp_path, &final_path)?;

        for (id, old_segment_name, old_offset, loc) in relocations {
            manifest.replace(id, &old_segment_name, old_offset, loc);
        }
        manifest.flush()?;

        let next_generation = group.generation() + 1;
        group.reset_to(final_name.clone(), next_generation);

        for name in &old_names {
            let path = dir.join(name);
            if let Err(e) = fs::remove_file(&path) {
                warn!("compaction: failed to remove stale segment {}: {e}", path.display());
            }
        }
        cleanup_stale_tmp_files(&dir, &group.base_name);

        info!("compacted {} segments into {}", old_names.len(), final_name);
        Ok(())
    }
}

fn rename_with_retry(from: &Path, to: &Path) -> Result<(), StoreError> {
    let mut backoff = INITIAL_BACKOFF;
    let mut last_err = None;
    for attempt in 1..=MAX_RENAME_ATTEMPTS {
        match fs::rename(from, to) {
            Ok(()) => return Ok(()),
            Err(e) => {
                last_err = Some(e);
                if attempt < MAX_RENAME_ATTEMPTS {
                    sleep(backoff);
                    backoff *= 2;
                }
            }
        }
    }
    Err(StoreError::CompactionFailed(format!(
        "failed to rename {} to {} after {MAX_RENAME_ATTEMPTS} attempts: {:?}",
        from.display(),
        to.display(),
        last_err
    )))
}

/// Removes leftover `<base>-tmp-merged-*.segment` files from a previously
/// interrupted compaction (crash between write and rename).
fn cleanup_stale_tmp_files(dir: &Path, base_name: &str) {
    let Ok(entries) = fs::read_dir(dir) else { return };
    let prefix = format!("{base_name}-tmp-merged-");
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(&prefix) && name.ends_with(".segment") {
            let _ = fs::remove_file(entry.path());
        }
    }
}
