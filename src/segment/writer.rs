use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::checksum::{ChecksumKind, RunningChecksum};
use crate::errors::StoreError;
use crate::pattern::{RecordId, WavePattern};

use super::codec;
use super::header::BinaryHeader;

/// Default segment byte budget (32 MiB), overridden by `StoreConfig::segment_max_bytes`.
pub const DEFAULT_TARGET_BYTES: u64 = 32 * 1024 * 1024;

/// Append-only writer for one segment file.
pub struct SegmentWriter {
    file: File,
    path: PathBuf,
    header: BinaryHeader,
    running_checksum: RunningChecksum,
    target_bytes: u64,
    dirty: bool,
}

impl SegmentWriter {
    /// Opens (or creates) the segment at `path`.
    ///
    /// If the file exists and is at least header-sized, the header is read
    /// and validated; an open (uncommitted) segment has its data region
    /// truncated to `last_offset` (crash recovery) and its checksum state
    /// rebuilt by rehashing the surviving bytes. A fresh file gets a new
    /// header with `commit_flag = false`.
    ///
    /// # Errors
    /// Returns `StoreError::CorruptSegment` if the header's magic doesn't
    /// match, or `StoreError::SegmentIoError` on I/O failure.
    pub fn open(path: impl AsRef<Path>, checksum_kind: ChecksumKind, target_bytes: u64) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new().read(true).write(true).create(true).truncate(false).open(&path)?;
        let len = file.metadata()?.len();

        let min_header_size = BinaryHeader::size_for(checksum_kind) as u64;
        let (header, running_checksum) = if len >= min_header_size {
            let mut head_buf = vec![0u8; min_header_size as usize];
            file.read_exact(&mut head_buf)?;
            let header = BinaryHeader::from_bytes(&head_buf)?;
            if !header.commit_flag {
                // Recovery: truncate to the last known-good offset and rehash.
                file.set_len(header.last_offset)?;
            }
            let mut running = RunningChecksum::new(header.checksum_kind);
            let data_start = header.size() as u64;
            let data_end = header.last_offset;
            if data_end > data_start {
                file.seek(SeekFrom::Start(data_start))?;
                let mut remaining = (data_end - data_start) as usize;
                let mut buf = [0u8; 8192];
                while remaining > 0 {
                    let chunk = remaining.min(buf.len());
                    file.read_exact(&mut buf[..chunk])?;
                    running.update(&buf[..chunk]);
                    remaining -= chunk;
                }
            }
            if header.commit_flag && running.finalize() != header.checksum {
                return Err(StoreError::CorruptSegment(format!("checksum mismatch reopening {}", path.display())));
            }
            (header, running)
        } else {
            let header = BinaryHeader::new(checksum_kind);
            file.set_len(0)?;
            file.write_all(&header.to_bytes())?;
            (header, RunningChecksum::new(checksum_kind))
        };

        file.seek(SeekFrom::End(0))?;
        Ok(Self { file, path, header, running_checksum, target_bytes, dirty: false })
    }

    /// Appends a record, returning the byte offset of its id field.
    ///
    /// # Errors
    /// Returns `StoreError::SegmentIoError` on I/O failure.
    pub fn write(&mut self, id: &RecordId, pattern: &WavePattern) -> Result<u64, StoreError> {
        let offset = self.header.last_offset;
        let bytes = codec::encode(id, pattern);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&bytes)?;
        self.running_checksum.update(&bytes);
        self.header.record_count += 1;
        self.header.last_offset = offset + bytes.len() as u64;
        self.header.commit_flag = false;
        self.dirty = true;
        // Rewrite the header (uncommitted) so a crash before an explicit
        // flush() still leaves `last_offset`/`record_count` trustworthy for
        // recovery; durability to stable storage is still flush()'s job.
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&self.header.to_bytes())?;
        self.file.seek(SeekFrom::Start(self.header.last_offset))?;
        Ok(offset)
    }

    /// Forces buffered bytes to the OS, rewrites the header as committed
    /// with the final checksum, and fsyncs.
    ///
    /// # Errors
    /// Returns `StoreError::SegmentIoError` on I/O failure.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        self.header.checksum = self.running_checksum.finalize();
        self.header.commit_flag = true;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&self.header.to_bytes())?;
        self.file.flush()?;
        self.file.sync_all()?;
        self.file.seek(SeekFrom::End(0))?;
        self.dirty = false;
        Ok(())
    }

    /// Like `flush`, but safe to call even when nothing has changed since
    /// the last flush (idempotent: flushing twice with no intervening
    /// writes produces byte-identical files).
    ///
    /// # Errors
    /// Returns `StoreError::SegmentIoError` on I/O failure.
    pub fn sync(&mut self) -> Result<(), StoreError> {
        self.flush()
    }

    /// # Errors
    /// Returns `StoreError::SegmentIoError` on I/O failure.
    pub fn close(mut self) -> Result<(), StoreError> {
        if self.dirty {
            self.flush()?;
        }
        Ok(())
    }

    #[must_use]
    pub fn approx_size(&self) -> u64 {
        self.header.last_offset
    }

    #[must_use]
    pub fn fill_ratio(&self) -> f64 {
        self.approx_size() as f64 / self.target_bytes.max(1) as f64
    }

    #[must_use]
    pub fn is_overflow(&self) -> bool {
        self.approx_size() >= self.target_bytes
    }

    #[must_use]
    pub fn segment_name(&self) -> String {
        self.path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn header(&self) -> &BinaryHeader {
        &self.header
    }
}
