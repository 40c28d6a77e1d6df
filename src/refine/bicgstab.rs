//! Preconditioned BiCGStab (spec §4.6: "general; preconditioned form").

use num_traits::{NumCast, ToPrimitive};

use crate::error::PastixError;
use crate::refine::{RefineReport, SolverInterface};
use crate::scalar::Scalar;

fn to_real<T: Scalar>(v: f64) -> T::Real {
    <T::Real as NumCast>::from(v).unwrap_or_default()
}

pub fn bicgstab<T: Scalar>(
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
    let r0 = r.clone();

    let mut relres = solver.norm2(&r).to_f64().unwrap_or(0.0) / norm_b;
    let mut iter = 0usize;
    if relres <= eps {
        return Ok(RefineReport {
            iterations: 0,
            final_relative_residual: relres,
        });
    }

    let one = T::from_real(to_real::<T>(1.0));
    let mut rho_old = one;
    let mut alpha = one;
    let mut omega = one;
    let mut v = vec![T::zero(); n];
    let mut p = vec![T::zero(); n];

    while iter < itermax {
        let rho = solver.dot(&r0, &r);
        if rho == T::zero() {
            // Serious breakdown (spec §4.6 gives no restart rule for this);
            // report what has converged so far rather than looping forever.
            break;
        }
        let beta = (rho / rho_old) * (alpha / omega);
        for i in 0..n {
            p[i] = r[i] + beta * (p[i] - omega * v[i]);
        }

        let mut phat = vec![T::zero(); n];
        solver.apply_m_inv(&p, &mut phat)?;
        solver.apply_a(&phat, &mut v);
        let r0v = solver.dot(&r0, &v);
        if r0v == T::zero() {
            break;
        }
        alpha = rho / r0v;

        let mut s = vec![T::zero(); n];
        for i in 0..n {
            s[i] = r[i] - alpha * v[i];
        }
        let snorm = solver.norm2(&s).to_f64().unwrap_or(0.0);
        if snorm / norm_b <= eps {
            for i in 0..n {
                x[i] += alpha * phat[i];
            }
            relres = snorm / norm_b;
            iter += 1;
            break;
        }

        let mut shat = vec![T::zero(); n];
        solver.apply_m_inv(&s, &mut shat)?;
        let mut t = vec![T::zero(); n];
        solver.apply_a(&shat, &mut t);
        let tt = solver.dot(&t, &t);
        omega = if tt == T::zero() { T::zero() } else { solver.dot(&t, &s) / tt };

        for i in 0..n {
            x[i] += alpha * phat[i] + omega * shat[i];
            r[i] = s[i] - omega * t[i];
        }
        relres = solver.norm2(&r).to_f64().unwrap_or(0.0) / norm_b;
        rho_old = rho;
        iter += 1;
        if relres <= eps || omega == T::zero() {
            break;
        }
    }

    Ok(RefineReport {
        iterations: iter,
        final_relative_residual: relres,
    })
}
