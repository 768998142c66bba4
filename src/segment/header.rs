//! `BinaryHeader`: the fixed-layout little-endian prefix of every segment file.

use crate::checksum::ChecksumKind;
use crate::errors::StoreError;

pub const MAGIC: u32 = 0x5244_534E; // "RDSN"

/// Version 1 segments use a 4-byte CRC32 checksum; version 2 use an 8-byte
/// XXH64 checksum. The checksum kind is therefore self-describing via
/// `version` alone, with no extra reserved byte needed beyond spec's
/// documented layout (`magic version timestamp record_count last_offset
/// checksum commit_flag`, header size `align4(27 + checksum_len)`).
pub const VERSION_CRC32: u16 = 1;
pub const VERSION_XXH64: u16 = 2;

/// Fixed-layout header prefixing every segment. Field order on disk:
/// magic(4) version(2) timestamp(8) record_count(4) last_offset(8)
/// checksum(4 or 8) commit_flag(1) padding(..4-aligned).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinaryHeader {
    pub magic: u32,
    pub version: u16,
    pub timestamp: u64,
    pub record_count: u32,
    pub last_offset: u64,
    pub checksum: u64,
    pub commit_flag: bool,
    pub checksum_kind: ChecksumKind,
}

impl BinaryHeader {
    #[must_use]
    pub fn new(checksum_kind: ChecksumKind) -> Self {
        let version = version_for(checksum_kind);
        Self {
            magic: MAGIC,
            version,
            timestamp: now_millis(),
            record_count: 0,
            last_offset: Self::size_for(checksum_kind) as u64,
            checksum: 0,
            commit_flag: false,
            checksum_kind,
        }
    }

    /// `align4(27 + checksum_len)`.
    #[must_use]
    pub const fn size_for(kind: ChecksumKind) -> usize {
        let raw = 27 + kind.length();
        raw.div_ceil(4) * 4
    }

    #[must_use]
    pub fn size(&self) -> usize {
        Self::size_for(self.checksum_kind)
    }

    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let size = self.size();
        let mut buf = vec![0u8; size];
        buf[0..4].copy_from_slice(&self.magic.to_le_bytes());
        buf[4..6].copy_from_slice(&self.version.to_le_bytes());
        buf[6..14].copy_from_slice(&self.timestamp.to_le_bytes());
        buf[14..18].copy_from_slice(&self.record_count.to_le_bytes());
        buf[18..26].copy_from_slice(&self.last_offset.to_le_bytes());
        let clen = self.checksum_kind.length();
        buf[26..26 + clen].copy_from_slice(&self.checksum.to_le_bytes()[..clen]);
        buf[26 + clen] = u8::from(self.commit_flag);
        // remaining bytes (padding) stay zero
        buf
    }

    /// # Errors
    /// Returns `StoreError::CorruptSegment` if the magic is invalid, the
    /// buffer is too short, or `version` does not imply a known checksum
    /// kind.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, StoreError> {
        if buf.len() < 27 {
            return Err(StoreError::CorruptSegment("header shorter than minimum size".into()));
        }
        let magic = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        if magic != MAGIC {
            return Err(StoreError::CorruptSegment(format!("bad magic: {magic:#x}")));
        }
        let version = u16::from_le_bytes(buf[4..6].try_into().unwrap());
        let checksum_kind = kind_for_version(version)?;
        let clen = checksum_kind.length();
        let cs_end = 26 + clen;
        if buf.len() <= cs_end {
            return Err(StoreError::CorruptSegment("header too short for checksum length".into()));
        }
        let timestamp = u64::from_le_bytes(buf[6..14].try_into().unwrap());
        let record_count = u32::from_le_bytes(buf[14..18].try_into().unwrap());
        let last_offset = u64::from_le_bytes(buf[18..26].try_into().unwrap());
        let mut cs_bytes = [0u8; 8];
        cs_bytes[..clen].copy_from_slice(&buf[26..cs_end]);
        let checksum = u64::from_le_bytes(cs_bytes);
        let commit_flag = buf[cs_end] != 0;

        Ok(Self { magic, version, timestamp, record_count, last_offset, checksum, commit_flag, checksum_kind })
    }
}

#[must_use]
const fn version_for(kind: ChecksumKind) -> u16 {
    match kind {
        ChecksumKind::Crc32 => VERSION_CRC32,
        ChecksumKind::Xxh64 => VERSION_XXH64,
    }
}

fn kind_for_version(version: u16) -> Result<ChecksumKind, StoreError> {
    match version {
        VERSION_CRC32 => Ok(ChecksumKind::Crc32),
        VERSION_XXH64 => Ok(ChecksumKind::Xxh64),
        other => Err(StoreError::CorruptSegment(format!("unsupported segment version: {other}"))),
    }
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
