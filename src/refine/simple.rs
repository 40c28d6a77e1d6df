//! Simple iterative refinement (spec §4.6 "simple iteration": `x <- x +
//! M^{-1}(b - A x)` repeated until convergence or `itermax`). No Krylov
//! acceleration, no restart — the cheapest driver, used when the
//! preconditioner alone is already a good approximate inverse (e.g. a
//! factorization computed with a loosened pivot threshold, spec §9).

use num_traits::ToPrimitive;

use crate::error::PastixError;
use crate::refine::{RefineReport, SolverInterface};
use crate::scalar::Scalar;

pub fn simple<T: Scalar>(
    solver: &dyn SolverInterface<T>,
    b: &[T],
    x: &mut [T],
    itermax: usize,
    eps: f64,
) -> Result<RefineReport, PastixError> {
    let n = solver.n();
    let norm_b = solver.norm2(b).to_f64().unwrap_or(0.0).max(1e-300);

    let mut r = vec![T::zero(); n];
    let mut ax = vec![T::zero(); n];
    let mut correction = vec![T::zero(); n];

    let mut iter = 0usize;
    let mut relres;
    loop {
        solver.apply_a(x, &mut ax);
        for i in 0..n {
            r[i] = b[i] - ax[i];
        }
        relres = solver.norm2(&r).to_f64().unwrap_or(0.0) / norm_b;
        if relres <= eps || iter >= itermax {
            break;
        }

        solver.apply_m_inv(&r, &mut correction)?;
        for i in 0..n {
            x[i] += correction[i];
        }
        iter += 1;
    }

    Ok(RefineReport {
        iterations: iter,
        final_relative_residual: relres,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A preconditioner that is an exact inverse converges in one step.
    struct ExactPreconditioner {
        a: Vec<f64>,
        a_inv: Vec<f64>,
        n: usize,
    }

    impl SolverInterface<f64> for ExactPreconditioner {
        fn n(&self) -> usize {
            self.n
        }
        fn dot(&self, x: &[f64], y: &[f64]) -> f64 {
            x.iter().zip(y).map(|(a, b)| a * b).sum()
        }
        fn norm2(&self, x: &[f64]) -> f64 {
            self.dot(x, x).sqrt()
        }
        fn apply_a(&self, x: &[f64], y: &mut [f64]) {
            for i in 0..self.n {
                y[i] = (0..self.n).map(|j| self.a[i + j * self.n] * x[j]).sum();
            }
        }
        fn apply_m_inv(&self, x: &[f64], y: &mut [f64]) -> Result<(), PastixError> {
            for i in 0..self.n {
                y[i] = (0..self.n).map(|j| self.a_inv[i + j * self.n] * x[j]).sum();
            }
            Ok(())
        }
    }

    #[test]
    fn exact_preconditioner_converges_immediately() {
        // A = [[4,1],[1,3]], A^-1 = 1/11 * [[3,-1],[-1,4]].
        let solver = ExactPreconditioner {
            a: vec![4.0, 1.0, 1.0, 3.0],
            a_inv: vec![3.0 / 11.0, -1.0 / 11.0, -1.0 / 11.0, 4.0 / 11.0],
            n: 2,
        };
        let b = vec![5.0, 4.0];
        let mut x = vec![0.0, 0.0];
        let report = simple(&solver, &b, &mut x, 10, 1e-10).unwrap();
        assert_eq!(report.iterations, 1);
        assert!((x[0] - 1.0).abs() < 1e-9);
        assert!((x[1] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn already_converged_residual_is_a_no_op() {
        let solver = ExactPreconditioner {
            a: vec![4.0, 1.0, 1.0, 3.0],
            a_inv: vec![3.0 / 11.0, -1.0 / 11.0, -1.0 / 11.0, 4.0 / 11.0],
            n: 2,
        };
        let b = vec![5.0, 4.0];
        let mut x = vec![1.0, 1.0];
        let report = simple(&solver, &b, &mut x, 10, 1e-10).unwrap();
        assert_eq!(report.iterations, 0);
    }
}
