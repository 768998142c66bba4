//! CRC32 / XXH64 checksum kit, dispatched by the requested checksum length.

use serde::{Deserialize, Serialize};

use crate::errors::StoreError;

/// Seed used for XXH64 checksums, per the configuration contract in spec §6.
pub const XXH64_SEED: u64 = 0x9747_b28c;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecksumKind {
    Crc32,
    Xxh64,
}

impl ChecksumKind {
    #[must_use]
    pub const fn length(self) -> usize {
        match self {
            Self::Crc32 => 4,
            Self::Xxh64 => 8,
        }
    }

    /// # Errors
    /// Returns `StoreError::InvalidArgument` for any length other than 4 or 8.
    pub fn from_length(len: usize) -> Result<Self, StoreError> {
        match len {
            4 => Ok(Self::Crc32),
            8 => Ok(Self::Xxh64),
            other => Err(StoreError::InvalidArgument(format!(
                "unsupported checksum length: {other} (expected 4 or 8)"
            ))),
        }
    }
}

/// A running checksum accumulator, updated incrementally as bytes are appended.
pub enum RunningChecksum {
    Crc32(crc32fast::Hasher),
    Xxh64(xxhash_rust::xxh64::Xxh64),
}

impl RunningChecksum {
    #[must_use]
    pub fn new(kind: ChecksumKind) -> Self {
        match kind {
            ChecksumKind::Crc32 => Self::Crc32(crc32fast::Hasher::new()),
            ChecksumKind::Xxh64 => Self::Xxh64(xxhash_rust::xxh64::Xxh64::new(XXH64_SEED)),
        }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        match self {
            Self::Crc32(h) => h.update(bytes),
            Self::Xxh64(h) => h.update(bytes),
        }
    }

    /// Finalizes into an 8-byte little-endian-padded value (CRC32 occupies the
    /// low 4 bytes when `kind() == Crc32`).
    #[must_use]
    pub fn finalize(&self) -> u64 {
        match self {
            Self::Crc32(h) => u64::from(h.clone().finalize()),
            Self::Xxh64(h) => h.digest(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ChecksumKind {
        match self {
            Self::Crc32(_) => ChecksumKind::Crc32,
            Self::Xxh64(_) => ChecksumKind::Xxh64,
        }
    }
}

/// One-shot checksum over a full buffer.
#[must_use]
pub fn compute(kind: ChecksumKind, data: &[u8]) -> u64 {
    let mut running = RunningChecksum::new(kind);
    running.update(data);
    running.finalize()
}

/// Lowercase hex MD5 digest of arbitrary bytes, used for identifier derivation.
#[must_use]
pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(md5::compute(data).0)
}
