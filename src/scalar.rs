//! Generic element type for the four compiled precisions (spec §9:
//! "one algorithm parameterized by the element type and its conjugation
//! operation").

use num_complex::{Complex32, Complex64};
use num_traits::{Float, NumAssign, Zero};
use std::fmt::Debug;
use std::iter::Sum;

use crate::params::FloatKind;

/// A scalar the factorization kernels can operate on.
///
/// Implemented for `f32`, `f64`, `Complex32`, `Complex64` — the four
/// `FloatKind` variants of spec §3. Real kinds implement `conj` as the
/// identity; complex kinds conjugate.
pub trait Scalar:
    Copy + Clone + Debug + Default + NumAssign + Zero + Sum + Send + Sync + PartialEq + 'static
{
    /// `Self::Real` is the scalar's magnitude type (`f32`/`f64` for both the
    /// real and complex kinds of matching width).
    type Real: Float + Send + Sync + Debug + Default;

    const IS_COMPLEX: bool;

    /// Which of the four `FloatKind` variants this type monomorphizes
    /// (spec §3, SPEC_FULL §C.2) — lets `Handle::init` tag itself without
    /// the caller passing it redundantly.
    const FLOAT_KIND: FloatKind;

    fn conj(self) -> Self;
    fn modulus(self) -> Self::Real;
    fn sqrt_self(self) -> Self;
    fn from_real(r: Self::Real) -> Self;
    fn real_part(self) -> Self::Real;
    fn is_negative_real(self) -> bool;
}

impl Scalar for f32 {
    type Real = f32;
    const IS_COMPLEX: bool = false;
    const FLOAT_KIND: FloatKind = FloatKind::Real32;
    fn conj(self) -> Self {
        self
    }
    fn modulus(self) -> Self::Real {
        self.abs()
    }
    fn sqrt_self(self) -> Self {
        self.sqrt()
    }
    fn from_real(r: Self::Real) -> Self {
        r
    }
    fn real_part(self) -> Self::Real {
        self
    }
    fn is_negative_real(self) -> bool {
        self < 0.0
    }
}

impl Scalar for f64 {
    type Real = f64;
    const IS_COMPLEX: bool = false;
    const FLOAT_KIND: FloatKind = FloatKind::Real64;
    fn conj(self) -> Self {
        self
    }
    fn modulus(self) -> Self::Real {
        self.abs()
    }
    fn sqrt_self(self) -> Self {
        self.sqrt()
    }
    fn from_real(r: Self::Real) -> Self {
        r
    }
    fn real_part(self) -> Self::Real {
        self
    }
    fn is_negative_real(self) -> bool {
        self < 0.0
    }
}

impl Scalar for Complex32 {
    type Real = f32;
    const IS_COMPLEX: bool = true;
    const FLOAT_KIND: FloatKind = FloatKind::Complex32;
    fn conj(self) -> Self {
        Complex32::conj(&self)
    }
    fn modulus(self) -> Self::Real {
        Complex32::norm(self)
    }
    fn sqrt_self(self) -> Self {
        Complex32::sqrt(self)
    }
    fn from_real(r: Self::Real) -> Self {
        Complex32::new(r, 0.0)
    }
    fn real_part(self) -> Self::Real {
        self.re
    }
    fn is_negative_real(self) -> bool {
        self.im == 0.0 && self.re < 0.0
    }
}

impl Scalar for Complex64 {
    type Real = f64;
    const IS_COMPLEX: bool = true;
    const FLOAT_KIND: FloatKind = FloatKind::Complex64;
    fn conj(self) -> Self {
        Complex64::conj(&self)
    }
    fn modulus(self) -> Self::Real {
        Complex64::norm(self)
    }
    fn sqrt_self(self) -> Self {
        Complex64::sqrt(self)
    }
    fn from_real(r: Self::Real) -> Self {
        Complex64::new(r, 0.0)
    }
    fn real_part(self) -> Self::Real {
        self.re
    }
    fn is_negative_real(self) -> bool {
        self.im == 0.0 && self.re < 0.0
    }
}

/// `T::zero()` is already provided by `num_traits::Zero`; this helper keeps
/// call sites uniform with `Scalar::from_real`.
pub fn zero<T: Scalar>() -> T {
    T::zero()
}
