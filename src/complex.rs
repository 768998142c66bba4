use std::ops::{Add, Mul};

/// An immutable complex number.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Complex {
    pub real: f64,
    pub imag: f64,
}

impl Complex {
    #[must_use]
    pub const fn new(real: f64, imag: f64) -> Self {
        Self { real, imag }
    }

    #[must_use]
    pub const fn zero() -> Self {
        Self { real: 0.0, imag: 0.0 }
    }

    #[must_use]
    pub fn conjugate(self) -> Self {
        Self { real: self.real, imag: -self.imag }
    }

    #[must_use]
    pub fn scale(self, factor: f64) -> Self {
        Self { real: self.real * factor, imag: self.imag * factor }
    }

    #[must_use]
    pub fn abs(self) -> f64 {
        self.real.hypot(self.imag)
    }

    #[must_use]
    pub fn abs_squared(self) -> f64 {
        self.real * self.real + self.imag * self.imag
    }

    #[must_use]
    pub fn phase(self) -> f64 {
        self.imag.atan2(self.real)
    }
}

impl Add for Complex {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self { real: self.real + rhs.real, imag: self.imag + rhs.imag }
    }
}

impl Mul for Complex {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self {
            real: self.real * rhs.real - self.imag * rhs.imag,
            imag: self.real * rhs.imag + self.imag * rhs.real,
        }
    }
}
