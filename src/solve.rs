//! C6 — the block triangular solver (spec §4.5): applies the factors
//! produced by `numeric::factor` to one or more right-hand sides following
//! the same panel structure the numeric engine used, with no re-derivation
//! of the block layout.
//!
//! The right-hand side is a dense `n x nrhs` matrix, column-major, leading
//! dimension `n` (spec §3 "right-hand-side vectors... C6/C7 mutate them in
//! place").

use crate::error::PastixError;
use crate::numeric::factor::extract_block;
use crate::numeric::{factor, kernels};
use crate::numeric::{FactorReport, Factors};
use crate::params::FactorizationKind;
use crate::scalar::Scalar;
use crate::solver_matrix::SolverMatrix;
use crate::symbol::Symbol;

/// Runs forward substitution, the `LDL^T`/`LDL^H` diagonal scaling (when
/// applicable), and backward substitution in sequence (spec §4.5). `rhs` is
/// overwritten with the solution; `schur_cblk`, when set, must match the
/// value used at `task_numfact` time — panels at or beyond it hold no factor
/// and are left untouched (spec §9 "Schur complement mode").
pub fn solve<T: Scalar>(
    symbol: &Symbol,
    solver: &SolverMatrix,
    factors: &Factors<T>,
    rhs: &mut [T],
    nrhs: usize,
    schur_cblk: Option<usize>,
) -> Result<(), PastixError> {
    let n = solver.n();
    if nrhs == 0 {
        // spec §8 boundary behavior: "task_solve returns immediately".
        return Ok(());
    }
    if rhs.len() != n * nrhs {
        return Err(PastixError::Matrix {
            message: "right-hand side shape does not match the solver matrix".to_string(),
        });
    }
    let kind = factors.kind();
    let schur_start = schur_cblk.unwrap_or(solver.cblknbr());

    solve_forward(solver, factors, kind, rhs, nrhs, n, schur_start);
    if matches!(kind, FactorizationKind::Ldlt | FactorizationKind::Ldlh) {
        solve_diagonal(solver, factors, rhs, nrhs, n, schur_start);
    }
    solve_backward(symbol, solver, factors, kind, rhs, nrhs, n, schur_start);
    Ok(())
}

/// `L y = b` (spec §4.5 "forward"): panels are visited in increasing index
/// order, leaves before their ancestors, matching the order `numeric::factor`
/// eliminated them in.
fn solve_forward<T: Scalar>(
    solver: &SolverMatrix,
    factors: &Factors<T>,
    kind: FactorizationKind,
    rhs: &mut [T],
    nrhs: usize,
    n: usize,
    schur_start: usize,
) {
    let unit_diag = matches!(kind, FactorizationKind::Ldlt | FactorizationKind::Ldlh | FactorizationKind::Lu);

    for m in 0..schur_start {
        let cblk = solver.cblktab[m];
        let width = cblk.width();
        let stride = cblk.stride;
        let diag_start = cblk.coefind;

        kernels::trsm_forward_lower(
            &factors.lcoef[diag_start..],
            width,
            stride,
            &mut rhs[cblk.fcolnum..],
            nrhs,
            n,
            unit_diag,
        );

        let blocks = &solver.blocks_of(m)[1..];
        if blocks.iter().any(|b| b.fcblknm < schur_start) {
            // `rhs[blok.frownum..]` (dest) and `rhs[cblk.fcolnum..]` (source)
            // never overlap, but the borrow checker can't see that through a
            // single slice — copy the source panel out once, reused by every
            // off-diagonal block this panel updates.
            let x_k = extract_block(rhs, cblk.fcolnum, width, nrhs, n);
            for blok in blocks {
                if blok.fcblknm >= schur_start {
                    continue;
                }
                let height = blok.height();
                let a_off = diag_start + blok.coefind;
                kernels::gemm_update_notrans(
                    &mut rhs[blok.frownum..],
                    n,
                    &factors.lcoef[a_off..],
                    stride,
                    &x_k,
                    width,
                    height,
                    nrhs,
                    width,
                );
            }
        }
    }
}

/// Elementwise divide by the stored `D` (spec §4.5 "diagonal (for
/// `LDL^T`/`LDL^H`)").
fn solve_diagonal<T: Scalar>(solver: &SolverMatrix, factors: &Factors<T>, rhs: &mut [T], nrhs: usize, n: usize, schur_start: usize) {
    for m in 0..schur_start {
        let cblk = solver.cblktab[m];
        let width = cblk.width();
        let stride = cblk.stride;
        for j in 0..width {
            let d = factors.lcoef[cblk.coefind + j + j * stride];
            let row = cblk.fcolnum + j;
            for c in 0..nrhs {
                rhs[row + c * n] = rhs[row + c * n] / d;
            }
        }
    }
}

/// `L^T x = y` for the symmetric kinds, `U x = y` for `Lu` (spec §4.5
/// "backward"): panels are visited in decreasing index order, so every
/// facing panel a block might reference has already been solved.
fn solve_backward<T: Scalar>(
    symbol: &Symbol,
    solver: &SolverMatrix,
    factors: &Factors<T>,
    kind: FactorizationKind,
    rhs: &mut [T],
    nrhs: usize,
    n: usize,
    schur_start: usize,
) {
    let conjugate = kind == FactorizationKind::Ldlh;

    for m in (0..schur_start).rev() {
        let cblk = solver.cblktab[m];
        let width = cblk.width();
        let stride = cblk.stride;
        let diag_start = cblk.coefind;

        if kind == FactorizationKind::Lu {
            let Some(ucoef) = factors.ucoef.as_ref() else {
                continue;
            };
            let (ublock_offset, _) = factor::ucoef_layout(symbol, solver);
            for (local_idx, blok) in symbol.blocks_of(m).iter().enumerate().skip(1) {
                if blok.fcblknm >= schur_start {
                    continue;
                }
                let height = blok.height();
                let global_b = symbol.cblktab[m].bloknum + local_idx;
                let ubase = ublock_offset[global_b];
                let x_b = extract_block(rhs, blok.frownum, height, nrhs, n);
                kernels::gemm_update_notrans(
                    &mut rhs[cblk.fcolnum..],
                    n,
                    &ucoef[ubase..],
                    width,
                    &x_b,
                    height,
                    width,
                    nrhs,
                    height,
                );
            }
            kernels::trsm_backward_upper_left(&factors.lcoef[diag_start..], width, stride, &mut rhs[cblk.fcolnum..], nrhs, n);
        } else {
            for blok in &solver.blocks_of(m)[1..] {
                if blok.fcblknm >= schur_start {
                    continue;
                }
                let height = blok.height();
                let a_off = diag_start + blok.coefind;
                let x_b = extract_block(rhs, blok.frownum, height, nrhs, n);
                kernels::gemm_update_ta(
                    &mut rhs[cblk.fcolnum..],
                    n,
                    &factors.lcoef[a_off..],
                    stride,
                    &x_b,
                    height,
                    width,
                    nrhs,
                    height,
                    conjugate,
                );
            }
            let unit_diag = matches!(kind, FactorizationKind::Ldlt | FactorizationKind::Ldlh);
            kernels::trsm_backward_lower_transpose(
                &factors.lcoef[diag_start..],
                width,
                stride,
                &mut rhs[cblk.fcolnum..],
                nrhs,
                n,
                unit_diag,
                conjugate,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;
    use crate::numeric::factor::CscMatrix;
    use crate::order::Order;
    use crate::symbol::{analysis, fax};

    fn build(kind: FactorizationKind) -> (Symbol, SolverMatrix, Factors<f64>, FactorReport) {
        // Two singleton supernodes {0}, {1} joined by one off-diagonal block
        // (the minimal non-trivial layout; see numeric::factor's own tests).
        let n = 2;
        let colptr = vec![0usize, 1, 1];
        let rowind = vec![1usize];
        let g = Graph::from_csc_pattern(n, &colptr, &rowind).unwrap();
        let order = Order::identity(&g).unwrap();
        let symbol = fax::build(&g.permuted(order.permtab()), &order).unwrap();
        let symbol = analysis::analyze(symbol).unwrap();
        let mut solver = SolverMatrix::build(&symbol, kind).unwrap();

        let a = CscMatrix::new(2, vec![0, 2, 4], vec![0, 1, 0, 1], vec![4.0f64, 2.0, 2.0, 3.0]).unwrap();
        let (factors, report) = factor::factor(&symbol, &mut solver, &a, kind, 1e-12, None).unwrap();
        (symbol, solver, factors, report)
    }

    #[test]
    fn llt_solve_recovers_known_solution() {
        let (symbol, solver, factors, _report) = build(FactorizationKind::Llt);
        // A = [[4,2],[2,3]], want x = [1,1] => b = A*[1,1] = [6,5].
        let mut rhs = vec![6.0f64, 5.0];
        solve(&symbol, &solver, &factors, &mut rhs, 1, None).unwrap();
        assert!((rhs[0] - 1.0).abs() < 1e-9);
        assert!((rhs[1] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn ldlt_solve_recovers_known_solution() {
        let (symbol, solver, factors, _report) = build(FactorizationKind::Ldlt);
        let mut rhs = vec![6.0f64, 5.0];
        solve(&symbol, &solver, &factors, &mut rhs, 1, None).unwrap();
        assert!((rhs[0] - 1.0).abs() < 1e-9);
        assert!((rhs[1] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn lu_solve_recovers_known_solution() {
        let (symbol, solver, factors, _report) = build(FactorizationKind::Lu);
        let mut rhs = vec![6.0f64, 5.0];
        solve(&symbol, &solver, &factors, &mut rhs, 1, None).unwrap();
        assert!((rhs[0] - 1.0).abs() < 1e-9);
        assert!((rhs[1] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn empty_rhs_is_a_no_op() {
        let (symbol, solver, factors, _report) = build(FactorizationKind::Llt);
        let mut rhs: Vec<f64> = vec![];
        assert!(solve(&symbol, &solver, &factors, &mut rhs, 0, None).is_ok());
    }
}
