//! Serialization of a `SegmentRecord`: `[id:16][payload_len:u32 LE][amp][phase]`.

use crate::errors::StoreError;
use crate::pattern::{RecordId, WavePattern};

/// Encodes `(id, pattern)` as the on-disk `SegmentRecord` layout.
#[must_use]
pub fn encode(id: &RecordId, pattern: &WavePattern) -> Vec<u8> {
    let n = pattern.len();
    let payload_len = (16 * n) as u32;
    let mut buf = Vec::with_capacity(16 + 4 + 16 * n);
    buf.extend_from_slice(id.as_bytes());
    buf.extend_from_slice(&payload_len.to_le_bytes());
    for &a in pattern.amp() {
        buf.extend_from_slice(&a.to_le_bytes());
    }
    for &p in pattern.phase() {
        buf.extend_from_slice(&p.to_le_bytes());
    }
    buf
}

/// Decodes one record starting at `buf[0..]`, returning the record and the
/// number of bytes consumed.
///
/// # Errors
/// Returns `StoreError::CorruptSegment` if `buf` is too short to hold a
/// complete record at the declared `payload_len`.
pub fn decode(buf: &[u8]) -> Result<(RecordId, WavePattern, usize), StoreError> {
    if buf.len() < 20 {
        return Err(StoreError::CorruptSegment("truncated record header".into()));
    }
    let id = RecordId::from_raw(buf[0..16].try_into().unwrap());
    let payload_len = u32::from_le_bytes(buf[16..20].try_into().unwrap()) as usize;
    if payload_len % 16 != 0 {
        return Err(StoreError::CorruptSegment(format!("payload_len {payload_len} not a multiple of 16")));
    }
    let n = payload_len / 16;
    let total = 20 + payload_len;
    if buf.len() < total {
        return Err(StoreError::CorruptSegment("truncated record payload".into()));
    }
    let mut amp = Vec::with_capacity(n);
    let mut off = 20;
    for _ in 0..n {
        amp.push(f64::from_le_bytes(buf[off..off + 8].try_into().unwrap()));
        off += 8;
    }
    let mut phase = Vec::with_capacity(n);
    for _ in 0..n {
        phase.push(f64::from_le_bytes(buf[off..off + 8].try_into().unwrap()));
        off += 8;
    }
    let pattern = WavePattern::new(amp, phase)?;
    Ok((id, pattern, total))
}
