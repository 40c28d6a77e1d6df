//! C5 — dense block kernels and the numeric factorization engine (spec §4.4).

pub mod factor;
pub mod kernels;

pub use factor::{CscMatrix, FactorReport, Factors};
