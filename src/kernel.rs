//! `ResonanceKernel`: pairwise interference scoring between two patterns.

use crate::complex::Complex;
use crate::errors::StoreError;
use crate::pattern::WavePattern;

/// Options for `ResonanceKernel::compare`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompareOptions {
    /// Collapse each sample to `(|c|, 0)` before scoring, ignoring phase.
    pub ignore_phase: bool,
}

/// Stateless pairwise scoring primitive. A trait object so an alternate
/// (e.g. SIMD) implementation can be swapped into `Engine`.
pub trait ResonanceKernel: Send + Sync {
    /// Interference-ratio/AM-GM energy score in `[0, 1]`.
    ///
    /// # Errors
    /// Returns `StoreError::PatternLengthMismatch` if `a` and `b` differ in
    /// length.
    fn compare(&self, a: &WavePattern, b: &WavePattern, options: CompareOptions) -> Result<f64, StoreError>;

    /// Like `compare` with `ignore_phase: false`, plus the mean signed phase
    /// delta wrapped to `(-pi, pi]`.
    ///
    /// # Errors
    /// Returns `StoreError::PatternLengthMismatch` if `a` and `b` differ in
    /// length.
    fn compare_with_phase_delta(&self, a: &WavePattern, b: &WavePattern) -> Result<(f64, f64), StoreError>;
}

/// Default, pure-`f64` implementation of `ResonanceKernel`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultResonanceKernel;

impl DefaultResonanceKernel {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

fn check_lengths(a: &WavePattern, b: &WavePattern) -> Result<(), StoreError> {
    if a.len() != b.len() {
        return Err(StoreError::PatternLengthMismatch { a: a.len(), b: b.len() });
    }
    Ok(())
}

fn to_complex_for_compare(p: &WavePattern, ignore_phase: bool) -> Vec<Complex> {
    let c = p.to_complex();
    if ignore_phase {
        c.into_iter().map(|z| Complex::new(z.abs(), 0.0)).collect()
    } else {
        c
    }
}

/// Wraps `delta` into `(-pi, pi]` via repeated +/- 2*pi adjustment.
#[must_use]
pub fn wrap_phase(delta: f64) -> f64 {
    crate::shard::normalize_phase(delta)
}

fn interference_energy(sa: &[Complex], sb: &[Complex]) -> (f64, f64, f64, f64) {
    let ea: f64 = sa.iter().map(|c| c.abs_squared()).sum();
    let eb: f64 = sb.iter().map(|c| c.abs_squared()).sum();
    let i: f64 = sa.iter().zip(sb.iter()).map(|(&x, &y)| (x + y).abs_squared()).sum();
    let interference_ratio = if ea + eb == 0.0 { 0.0 } else { 0.5 * i / (ea + eb) };
    (ea, eb, i, interference_ratio)
}

impl ResonanceKernel for DefaultResonanceKernel {
    fn compare(&self, a: &WavePattern, b: &WavePattern, options: CompareOptions) -> Result<f64, StoreError> {
        check_lengths(a, b)?;
        let sa = to_complex_for_compare(a, options.ignore_phase);
        let sb = to_complex_for_compare(b, options.ignore_phase);
        let (ea, eb, _i, interference_ratio) = interference_energy(&sa, &sb);
        if ea + eb == 0.0 {
            return Ok(0.0);
        }
        let am_gm = 2.0 * (ea * eb).sqrt() / (ea + eb);
        Ok(interference_ratio * am_gm)
    }

    fn compare_with_phase_delta(&self, a: &WavePattern, b: &WavePattern) -> Result<(f64, f64), StoreError> {
        check_lengths(a, b)?;
        let sa = a.to_complex();
        let sb = b.to_complex();
        let (_ea, _eb, _i, interference_ratio) = interference_energy(&sa, &sb);
        let n = a.len() as f64;
        let sum_wrapped: f64 = a.phase().iter().zip(b.phase().iter()).map(|(&pa, &pb)| wrap_phase(pb - pa)).sum();
        let avg_phase_delta = sum_wrapped / n;
        Ok((interference_ratio, avg_phase_delta))
    }
}
