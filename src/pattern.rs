use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::complex::Complex;
use crate::errors::StoreError;

/// A 32-char lowercase-hex, content-derived record identifier.
///
/// Identity is content: the id is the MD5 digest of the pattern's canonical
/// byte encoding (amp\[i\], phase\[i\] interleaved, little-endian f64).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(#[serde(with = "record_id_hex")] pub [u8; 16]);

impl RecordId {
    #[must_use]
    pub fn from_raw(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for RecordId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 32 || !s.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()) {
            return Err(StoreError::InvalidArgument(format!(
                "record id must be 32 lowercase hex chars, got {s:?}"
            )));
        }
        let decoded = hex::decode(s)
            .map_err(|e| StoreError::InvalidArgument(format!("invalid record id hex: {e}")))?;
        let arr: [u8; 16] = decoded
            .try_into()
            .map_err(|_| StoreError::InvalidArgument("record id must decode to 16 bytes".into()))?;
        Ok(Self(arr))
    }
}

mod record_id_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 16], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 16], D::Error> {
        let s = String::deserialize(d)?;
        let decoded = hex::decode(&s).map_err(serde::de::Error::custom)?;
        decoded.try_into().map_err(|_| serde::de::Error::custom("expected 16 bytes"))
    }
}

/// A complex-valued signal vector: equal-length amplitude and phase arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WavePattern {
    amp: Vec<f64>,
    phase: Vec<f64>,
}

impl WavePattern {
    /// # Errors
    /// Returns `StoreError::InvalidPattern` if the arrays differ in length,
    /// are empty, or contain non-finite values.
    pub fn new(amp: Vec<f64>, phase: Vec<f64>) -> Result<Self, StoreError> {
        if amp.len() != phase.len() {
            return Err(StoreError::InvalidPattern(format!(
                "amp/phase length mismatch: {} vs {}",
                amp.len(),
                phase.len()
            )));
        }
        if amp.is_empty() {
            return Err(StoreError::InvalidPattern("pattern must have at least one sample".into()));
        }
        if amp.iter().chain(phase.iter()).any(|v| !v.is_finite()) {
            return Err(StoreError::InvalidPattern("pattern contains non-finite values".into()));
        }
        Ok(Self { amp, phase })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.amp.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.amp.is_empty()
    }

    #[must_use]
    pub fn amp(&self) -> &[f64] {
        &self.amp
    }

    #[must_use]
    pub fn phase(&self) -> &[f64] {
        &self.phase
    }

    /// Elementwise conversion to a complex sequence: `c[i] = amp[i] * e^{i*phase[i]}`.
    #[must_use]
    pub fn to_complex(&self) -> Vec<Complex> {
        self.amp
            .iter()
            .zip(self.phase.iter())
            .map(|(&a, &p)| Complex::new(a * p.cos(), a * p.sin()))
            .collect()
    }

    /// Mean of the phase array, normalized to (-pi, pi].
    #[must_use]
    pub fn mean_phase(&self) -> f64 {
        let n = self.phase.len() as f64;
        let sum: f64 = self.phase.iter().sum();
        crate::shard::normalize_phase(sum / n)
    }

    /// Canonical byte encoding for content-derived identity:
    /// amp\[0\], phase\[0\], amp\[1\], phase\[1\], ... each little-endian f64.
    #[must_use]
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.amp.len() * 16);
        for (&a, &p) in self.amp.iter().zip(self.phase.iter()) {
            buf.extend_from_slice(&a.to_le_bytes());
            buf.extend_from_slice(&p.to_le_bytes());
        }
        buf
    }

    /// Content-derived identifier: MD5 of `canonical_bytes()`.
    #[must_use]
    pub fn derive_id(&self) -> RecordId {
        let digest = md5::compute(self.canonical_bytes());
        RecordId(digest.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_length_mismatch() {
        let err = WavePattern::new(vec![1.0, 2.0], vec![0.0]).unwrap_err();
        assert!(matches!(err, StoreError::InvalidPattern(_)));
    }

    #[test]
    fn rejects_non_finite() {
        let err = WavePattern::new(vec![f64::NAN], vec![0.0]).unwrap_err();
        assert!(matches!(err, StoreError::InvalidPattern(_)));
    }

    #[test]
    fn rejects_empty() {
        let err = WavePattern::new(vec![], vec![]).unwrap_err();
        assert!(matches!(err, StoreError::InvalidPattern(_)));
    }

    #[test]
    fn derive_id_is_deterministic_and_content_addressed() {
        let p1 = WavePattern::new(vec![0.5, 0.25], vec![1.0, -1.0]).unwrap();
        let p2 = WavePattern::new(vec![0.5, 0.25], vec![1.0, -1.0]).unwrap();
        let p3 = WavePattern::new(vec![0.5, 0.26], vec![1.0, -1.0]).unwrap();
        assert_eq!(p1.derive_id(), p2.derive_id());
        assert_ne!(p1.derive_id(), p3.derive_id());
    }

    #[test]
    fn record_id_round_trips_through_hex() {
        let p = WavePattern::new(vec![1.0], vec![0.0]).unwrap();
        let id = p.derive_id();
        let s = id.to_hex();
        assert_eq!(s.len(), 32);
        let parsed: RecordId = s.parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn record_id_rejects_bad_hex() {
        assert!("not-hex".parse::<RecordId>().is_err());
        assert!("AA".repeat(16).parse::<RecordId>().is_err()); // uppercase rejected
        assert!("ab".repeat(15).parse::<RecordId>().is_err()); // wrong length
    }

    #[test]
    fn to_complex_matches_polar_form() {
        let p = WavePattern::new(vec![2.0], vec![std::f64::consts::FRAC_PI_2]).unwrap();
        let c = p.to_complex();
        assert!((c[0].real).abs() < 1e-9);
        assert!((c[0].imag - 2.0).abs() < 1e-9);
    }
}
