use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::checksum::{ChecksumKind, RunningChecksum};
use crate::errors::StoreError;
use crate::pattern::{RecordId, WavePattern};

use super::codec;
use super::header::BinaryHeader;

/// Read-only accessor for one segment file.
pub struct SegmentReader {
    file: File,
    path: PathBuf,
    header: BinaryHeader,
}

impl SegmentReader {
    /// Opens `path`, validates the header's magic, and (for committed
    /// segments) recomputes the checksum over `[header_size, last_offset)`
    /// and compares it to the stored one.
    ///
    /// # Errors
    /// Returns `StoreError::CorruptSegment` on bad magic or a checksum
    /// mismatch, and `StoreError::SegmentIoError` on I/O failure.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;
        // Probe with the smaller header size first; `from_bytes` only needs
        // `version` to know the true size, so read generously then re-slice.
        let mut probe = vec![0u8; BinaryHeader::size_for(ChecksumKind::Xxh64)];
        let len = file.metadata()?.len();
        let probe_len = probe.len().min(len as usize);
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut probe[..probe_len])?;
        let header = BinaryHeader::from_bytes(&probe[..probe_len])?;

        if header.commit_flag {
            let data_start = header.size() as u64;
            let data_end = header.last_offset;
            if data_end < data_start || data_end > len {
                return Err(StoreError::CorruptSegment("last_offset out of file bounds".into()));
            }
            file.seek(SeekFrom::Start(data_start))?;
            let mut remaining = (data_end - data_start) as usize;
            let mut running = RunningChecksum::new(header.checksum_kind);
            let mut buf = [0u8; 8192];
            while remaining > 0 {
                let chunk = remaining.min(buf.len());
                file.read_exact(&mut buf[..chunk])?;
                running.update(&buf[..chunk]);
                remaining -= chunk;
            }
            if running.finalize() != header.checksum {
                return Err(StoreError::CorruptSegment(format!(
                    "checksum mismatch in {}",
                    path.display()
                )));
            }
        }

        Ok(Self { file, path, header })
    }

    #[must_use]
    pub fn header(&self) -> &BinaryHeader {
        &self.header
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the record starting at `offset`.
    ///
    /// # Errors
    /// Returns `StoreError::CorruptSegment` on a truncated record and
    /// `StoreError::SegmentIoError` on I/O failure.
    pub fn read_with_id(&mut self, offset: u64) -> Result<(RecordId, u64, WavePattern), StoreError> {
        self.file.seek(SeekFrom::Start(offset))?;
        // Read the 20-byte record header first to learn payload_len.
        let mut head = [0u8; 20];
        self.file.read_exact(&mut head)?;
        let payload_len = u32::from_le_bytes(head[16..20].try_into().unwrap()) as usize;
        let mut buf = vec![0u8; 20 + payload_len];
        buf[..20].copy_from_slice(&head);
        self.file.read_exact(&mut buf[20..])?;
        let (id, pattern, _used) = codec::decode(&buf)?;
        Ok((id, offset, pattern))
    }

    /// A single forward pass from `header_size` to `last_offset` (committed
    /// segments) or until an incomplete record is hit (open segments).
    #[must_use]
    pub fn read_all_with_id(&mut self) -> SegmentIter<'_> {
        SegmentIter {
            file: &mut self.file,
            offset: self.header.size() as u64,
            limit: self.header.last_offset,
            tolerant: !self.header.commit_flag,
            done: false,
        }
    }
}

/// Forward cursor over the data region of a segment.
pub struct SegmentIter<'a> {
    file: &'a mut File,
    offset: u64,
    limit: u64,
    tolerant: bool,
    done: bool,
}

impl Iterator for SegmentIter<'_> {
    type Item = Result<(RecordId, u64, WavePattern), StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.offset >= self.limit {
            return None;
        }
        let record_offset = self.offset;
        let result = (|| -> Result<(RecordId, WavePattern, usize), StoreError> {
            self.file.seek(SeekFrom::Start(record_offset))?;
            let mut head = [0u8; 20];
            self.file.read_exact(&mut head)?;
            let payload_len = u32::from_le_bytes(head[16..20].try_into().unwrap()) as usize;
            let total = 20 + payload_len;
            if record_offset + total as u64 > self.limit && !self.tolerant {
                return Err(StoreError::CorruptSegment("record extends past last_offset".into()));
            }
            let mut buf = vec![0u8; total];
            buf[..20].copy_from_slice(&head);
            self.file.read_exact(&mut buf[20..])?;
            let (id, pattern, used) = codec::decode(&buf)?;
            Ok((id, pattern, used))
        })();

        match result {
            Ok((id, pattern, used)) => {
                self.offset = record_offset + used as u64;
                Some(Ok((id, record_offset, pattern)))
            }
            Err(e) if self.tolerant => {
                // Open segment with a truncated/incomplete tail: stop cleanly.
                self.done = true;
                let _ = e;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::writer::SegmentWriter;

    fn pattern(n: usize, seed: f64) -> WavePattern {
        let amp: Vec<f64> = (0..n).map(|i| seed + i as f64 * 0.1).collect();
        let phase: Vec<f64> = (0..n).map(|i| (i as f64 * 0.3) - 1.0).collect();
        WavePattern::new(amp, phase).unwrap()
    }

    #[test]
    fn reads_back_written_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("phase-0-0.segment");
        let mut w = SegmentWriter::open(&path, ChecksumKind::Crc32, 1024 * 1024).unwrap();
        let p = pattern(5, 1.5);
        let id = p.derive_id();
        let offset = w.write(&id, &p).unwrap();
        w.flush().unwrap();

        let mut r = SegmentReader::open(&path).unwrap();
        let (read_id, read_offset, read_pattern) = r.read_with_id(offset).unwrap();
        assert_eq!(read_id, id);
        assert_eq!(read_offset, offset);
        assert_eq!(read_pattern.amp(), p.amp());
    }

    #[test]
    fn read_all_enumerates_every_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("phase-0-0.segment");
        let mut w = SegmentWriter::open(&path, ChecksumKind::Xxh64, 1024 * 1024).unwrap();
        let mut ids = Vec::new();
        for i in 0..5 {
            let p = pattern(3, i as f64);
            let id = p.derive_id();
            w.write(&id, &p).unwrap();
            ids.push(id);
        }
        w.flush().unwrap();

        let mut r = SegmentReader::open(&path).unwrap();
        let found: Vec<_> = r.read_all_with_id().collect::<Result<Vec<_>, _>>().unwrap();
        assert_eq!(found.len(), 5);
        for (id, _off, _pat) in &found {
            assert!(ids.contains(id));
        }
    }

    #[test]
    fn tolerates_truncated_tail_on_open_segment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("phase-0-0.segment");
        {
            let mut w = SegmentWriter::open(&path, ChecksumKind::Crc32, 1024 * 1024).unwrap();
            for i in 0..3 {
                let p = pattern(2, i as f64);
                let id = p.derive_id();
                w.write(&id, &p).unwrap();
            }
            // No flush: commit_flag stays false.
        }
        let mut r = SegmentReader::open(&path).unwrap();
        assert!(!r.header().commit_flag);
        let found: Vec<_> = r.read_all_with_id().collect::<Result<Vec<_>, _>>().unwrap();
        assert_eq!(found.len(), 3);
    }

    #[test]
    fn detects_checksum_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("phase-0-0.segment");
        let mut w = SegmentWriter::open(&path, ChecksumKind::Crc32, 1024 * 1024).unwrap();
        let p = pattern(4, 3.0);
        let id = p.derive_id();
        w.write(&id, &p).unwrap();
        w.flush().unwrap();
        drop(w);

        // Flip a byte in the data region.
        let mut bytes = std::fs::read(&path).unwrap();
        let data_start = BinaryHeader::size_for(ChecksumKind::Crc32);
        bytes[data_start] ^= 0xFF;
        std::fs::write(&path, bytes).unwrap();

        let err = SegmentReader::open(&path).unwrap_err();
        assert!(matches!(err, StoreError::CorruptSegment(_)));
    }
}
