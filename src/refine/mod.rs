//! C7 — the refinement engine (spec §4.6): Krylov drivers (GMRES, CG,
//! BiCGStab) and a simple-iteration driver, all written once against a
//! `SolverInterface` so none of them depend on `numeric`/`solve` directly —
//! only on the abstracted vector ops + `apply_A` + `apply_M_inv` capability
//! set spec §4.6 names.

pub mod bicgstab;
pub mod cg;
pub mod gmres;
pub mod simple;

use num_traits::Float;

use crate::error::PastixError;
use crate::numeric::{CscMatrix, Factors};
use crate::params::FactorizationKind;
use crate::scalar::Scalar;
use crate::solve;
use crate::solver_matrix::SolverMatrix;
use crate::symbol::Symbol;

/// The capability set refinement drivers are polymorphic over (spec §4.6).
/// Every vector parameter has exactly `n()` elements.
pub trait SolverInterface<T: Scalar> {
    fn n(&self) -> usize;
    fn dot(&self, x: &[T], y: &[T]) -> T;
    fn norm2(&self, x: &[T]) -> T::Real;
    fn axpy(&self, alpha: T, x: &[T], y: &mut [T]) {
        for (yi, &xi) in y.iter_mut().zip(x.iter()) {
            *yi += alpha * xi;
        }
    }
    fn scal(&self, alpha: T, x: &mut [T]) {
        for xi in x.iter_mut() {
            *xi *= alpha;
        }
    }
    fn copy(&self, src: &[T], dst: &mut [T]) {
        dst.copy_from_slice(src);
    }
    /// `y <- A*x` (spec §4.6).
    fn apply_a(&self, x: &[T], y: &mut [T]);
    /// `y <- M^{-1}*x`: one `solve::solve` invocation (spec §4.6).
    fn apply_m_inv(&self, x: &[T], y: &mut [T]) -> Result<(), PastixError>;
}

/// Outcome of a refinement run (spec §4.6 "reports: iteration count, final
/// `‖r‖/‖b‖`, per-iteration timing"). Timing is left to the caller to stamp
/// (SPEC_FULL §A — `Date::now`/wall-clock reads happen at the API boundary,
/// not inside the core's pure numeric routines).
#[derive(Debug, Clone, Default)]
pub struct RefineReport {
    pub iterations: usize,
    pub final_relative_residual: f64,
}

/// Binds a factored system to the `SolverInterface` capability set by
/// delegating `apply_A` to the original CSC matrix and `apply_M_inv` to one
/// `solve::solve` call (spec §4.6: "each calling C6 as a preconditioner
/// through an abstracted solver interface").
pub struct FactoredSystem<'a, T: Scalar> {
    pub symbol: &'a Symbol,
    pub solver: &'a SolverMatrix,
    pub factors: &'a Factors<T>,
    pub matrix: &'a CscMatrix<T>,
    pub schur_cblk: Option<usize>,
}

impl<'a, T: Scalar> SolverInterface<T> for FactoredSystem<'a, T> {
    fn n(&self) -> usize {
        self.solver.n()
    }

    fn dot(&self, x: &[T], y: &[T]) -> T {
        x.iter().zip(y.iter()).map(|(&a, &b)| a.conj() * b).sum()
    }

    fn norm2(&self, x: &[T]) -> T::Real {
        let sum_sq: T = x.iter().map(|&v| v.conj() * v).sum();
        sum_sq.real_part().sqrt()
    }

    fn apply_a(&self, x: &[T], y: &mut [T]) {
        let kind = self.factors.kind();
        let symmetric = matches!(kind, FactorizationKind::Llt | FactorizationKind::Ldlt | FactorizationKind::Ldlh);
        let conjugate = kind == FactorizationKind::Ldlh;
        self.matrix.matvec(x, y, symmetric, conjugate);
    }

    fn apply_m_inv(&self, x: &[T], y: &mut [T]) -> Result<(), PastixError> {
        self.copy(x, y);
        solve::solve(self.symbol, self.solver, self.factors, y, 1, self.schur_cblk)
    }
}
