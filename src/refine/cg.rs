//! Preconditioned Conjugate Gradient (spec §4.6: "symmetric positive
//! definite only; preconditioned form"). Callers are responsible for only
//! selecting this driver for SPD systems — the core does not itself check
//! symmetry, matching how `numeric::factor` trusts `FactorizationKind`
//! rather than inspecting the CSC pattern for it.

use num_traits::ToPrimitive;

use crate::error::PastixError;
use crate::refine::{RefineReport, SolverInterface};
use crate::scalar::Scalar;

pub fn cg<T: Scalar>(
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
    solver.apply_a(x, &mut ax);
    for i in 0..n {
        r[i] = b[i] - ax[i];
    }

    let mut relres = solver.norm2(&r).to_f64().unwrap_or(0.0) / norm_b;
    let mut iter = 0usize;
    if relres <= eps {
        return Ok(RefineReport {
            iterations: 0,
            final_relative_residual: relres,
        });
    }

    let mut z = vec![T::zero(); n];
    solver.apply_m_inv(&r, &mut z)?;
    let mut p = z.clone();
    let mut rz_old = solver.dot(&r, &z);

    while iter < itermax {
        let mut ap = vec![T::zero(); n];
        solver.apply_a(&p, &mut ap);
        let pap = solver.dot(&p, &ap);
        let alpha = rz_old / pap;
        for i in 0..n {
            x[i] += alpha * p[i];
            r[i] -= alpha * ap[i];
        }
        iter += 1;
        relres = solver.norm2(&r).to_f64().unwrap_or(0.0) / norm_b;
        if relres <= eps {
            break;
        }

        solver.apply_m_inv(&r, &mut z)?;
        let rz_new = solver.dot(&r, &z);
        let beta = rz_new / rz_old;
        for i in 0..n {
            p[i] = z[i] + beta * p[i];
        }
        rz_old = rz_new;
    }

    Ok(RefineReport {
        iterations: iter,
        final_relative_residual: relres,
    })
}
