//! Parameter arrays (spec §6) and the four scalar kinds the core is
//! monomorphized over (spec §3, §9).

use serde::{Deserialize, Serialize};

/// `FloatKind` — chosen once per solver instance (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FloatKind {
    Real32,
    Real64,
    Complex32,
    Complex64,
}

impl FloatKind {
    pub fn is_complex(self) -> bool {
        matches!(self, FloatKind::Complex32 | FloatKind::Complex64)
    }
}

/// Which triangular factorization to produce (spec §3, §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FactorizationKind {
    Lu,
    Llt,
    Ldlt,
    Ldlh,
}

/// Symmetry class of the input matrix (spec §6 `sym`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymKind {
    General,
    Symmetric,
    Hermitian,
}

/// Refinement driver (spec §4.6, §6 `refinement`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefinementKind {
    Gmres,
    Cg,
    BiCgStab,
    Simple,
}

/// Verbosity level (spec §6 `verbose`); mapped onto a `tracing::Level`
/// filter by `Handle::init` (SPEC_FULL §A.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Verbosity {
    Silent = 0,
    Summary = 1,
    Detailed = 2,
    Debug = 3,
}

/// Symbolic builder mode (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolMode {
    FaxGraph,
    Kass,
}

/// Optional diagonal scaling applied before the numeric scatter
/// (SPEC_FULL §B, grounded in `original_source/pastix/sopalin/scaling.c`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalingStrategy {
    None,
    Diagonal,
}

/// Integer parameter array (spec §6 table of integer options).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntParams {
    pub verbose: Verbosity,
    pub factorization: FactorizationKind,
    pub refinement: RefinementKind,
    pub thread_nbr: usize,
    pub itermax: usize,
    pub gmres_im: usize,
    pub amalg_cblk: usize,
    pub amalg_blas: usize,
    pub level_of_fill: i64,
    pub incomplete: bool,
    pub sym: SymKind,
    pub schur: bool,
    pub min_blocksize: usize,
    pub max_blocksize: usize,
    pub symbol_mode: SymbolMode,
    pub scaling: ScalingStrategy,
    pub pivot_limit: usize,
}

impl Default for IntParams {
    fn default() -> Self {
        Self {
            verbose: Verbosity::Silent,
            factorization: FactorizationKind::Lu,
            refinement: RefinementKind::Gmres,
            thread_nbr: 1,
            itermax: 250,
            gmres_im: 30,
            amalg_cblk: 8,
            amalg_blas: 8,
            level_of_fill: -1,
            incomplete: false,
            sym: SymKind::General,
            schur: false,
            min_blocksize: 60,
            max_blocksize: 4000,
            symbol_mode: SymbolMode::FaxGraph,
            scaling: ScalingStrategy::None,
            pivot_limit: usize::MAX,
        }
    }
}

/// Float parameter array (spec §6 table of float options).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FloatParams {
    pub eps_refinement: f64,
    pub eps_pivot: f64,
}

impl Default for FloatParams {
    fn default() -> Self {
        Self {
            eps_refinement: 1e-12,
            eps_pivot: 1e-12,
        }
    }
}

/// Back-end flags read once from the environment at `Handle::init`
/// (spec §6 "Environment variables").
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvOverrides {
    pub starpu_fanin: bool,
    pub starpu_nested_task: bool,
    pub starpu_separate_trsm: bool,
}

impl EnvOverrides {
    /// Reads the documented environment variables once. Also pins
    /// `VECLIB_MAXIMUM_THREADS` to `"1"` when unset, to prevent the BLAS
    /// back-end faer delegates to from over-subscribing threads underneath
    /// our own scheduler (spec §6).
    pub fn read() -> Self {
        fn flag(name: &str) -> bool {
            std::env::var(name).map(|v| v == "1").unwrap_or(false)
        }

        // SAFETY: called once, from `Handle::init`, before any worker
        // threads are spawned.
        if std::env::var("VECLIB_MAXIMUM_THREADS").is_err() {
            unsafe { std::env::set_var("VECLIB_MAXIMUM_THREADS", "1") };
        }

        Self {
            starpu_fanin: flag("PASTIX_STARPU_FANIN"),
            starpu_nested_task: flag("PASTIX_STARPU_NESTED_TASK"),
            starpu_separate_trsm: flag("PASTIX_STARPU_SEPARATE_TRSM"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let iparm = IntParams::default();
        assert_eq!(iparm.thread_nbr, 1);
        assert_eq!(iparm.level_of_fill, -1);
        assert!(!iparm.incomplete);
    }
}
