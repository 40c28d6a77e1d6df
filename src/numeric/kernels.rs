//! Dense block kernels shared by every `FactorizationKind` (spec §4.4):
//! unblocked diagonal-block factorizations, triangular solves, and the
//! rank-k update used by the off-diagonal `gemm`/`gemdm` scatter. Every
//! buffer here is a flat, column-major slice with an explicit leading
//! dimension — no dependency on any particular sparse-matrix crate's
//! internal block representation (spec §9: "one algorithm parameterized by
//! element type and conjugation").

use num_traits::{Float, NumCast, ToPrimitive};

use crate::error::PastixError;
use crate::scalar::Scalar;

#[inline]
fn at<T: Copy>(a: &[T], i: usize, j: usize, lda: usize) -> T {
    a[i + j * lda]
}

#[inline]
fn set<T: Copy>(a: &mut [T], i: usize, j: usize, lda: usize, v: T) {
    a[i + j * lda] = v;
}

/// Unblocked right-looking Cholesky of the `n x n` leading block of `a`
/// (spec §4.4 `potrf`). Produces `L` in the strictly-lower triangle plus
/// diagonal; the strictly-upper triangle is left untouched. Tiny or
/// non-positive diagonals are clamped to `eps_pivot` (spec §4.4 "static
/// pivoting") rather than failing outright; the number of clamps performed
/// is returned for `FactorReport`.
pub fn potrf<T: Scalar>(a: &mut [T], n: usize, lda: usize, eps_pivot: f64) -> Result<usize, PastixError> {
    let mut nbpivot = 0usize;
    for j in 0..n {
        let mut sum = T::Real::default();
        for k in 0..j {
            let ljk = at(a, j, k, lda);
            sum = sum + (ljk.conj() * ljk).real_part();
        }
        let mut d = at(a, j, j, lda).real_part() - sum;
        if d.to_f64().unwrap_or(0.0) < eps_pivot {
            d = <T::Real as NumCast>::from(eps_pivot).unwrap_or(d);
            nbpivot += 1;
        }
        let ljj = d.sqrt();
        set(a, j, j, lda, T::from_real(ljj));

        for i in (j + 1)..n {
            let mut s = T::zero();
            for k in 0..j {
                s = s + at(a, i, k, lda) * at(a, j, k, lda).conj();
            }
            let v = (at(a, i, j, lda) - s) / T::from_real(ljj);
            set(a, i, j, lda, v);
        }
    }
    Ok(nbpivot)
}

/// Unblocked `LDL^T`/`LDL^H` factorization (spec §4.4 `sytrf`/`hetrf`):
/// strictly-lower triangle of `a` holds `L` (unit diagonal implied), the
/// diagonal holds `D`. `conjugate = true` selects `LDL^H`.
pub fn ldlt_factor<T: Scalar>(
    a: &mut [T],
    n: usize,
    lda: usize,
    conjugate: bool,
    eps_pivot: f64,
) -> Result<usize, PastixError> {
    let mut nbpivot = 0usize;
    let mut d = vec![T::zero(); n];

    for j in 0..n {
        let mut djj = at(a, j, j, lda);
        for k in 0..j {
            let ljk = at(a, j, k, lda);
            let term = if conjugate { ljk * ljk.conj() } else { ljk * ljk };
            djj -= term * d[k];
        }
        if djj.modulus().to_f64().unwrap_or(0.0) < eps_pivot {
            djj = T::from_real(<T::Real as NumCast>::from(eps_pivot).unwrap_or(djj.modulus()));
            nbpivot += 1;
        }
        d[j] = djj;
        set(a, j, j, lda, djj);

        for i in (j + 1)..n {
            let mut sum = at(a, i, j, lda);
            for k in 0..j {
                let lik = at(a, i, k, lda);
                let ljk = if conjugate { at(a, j, k, lda).conj() } else { at(a, j, k, lda) };
                sum -= lik * ljk * d[k];
            }
            set(a, i, j, lda, sum / djj);
        }
    }
    Ok(nbpivot)
}

/// Unblocked, unpivoted `LU` of the `n x n` leading block of `a` (spec §4.4
/// `getrf`): supernodal direct factorization fixes row order from the
/// symbolic partition, so partial pivoting is replaced with the same static
/// pivot clamp used by `potrf`/`ldlt_factor`. Strictly-lower holds `L`
/// (unit diagonal implied), diagonal+upper holds `U`.
pub fn lu_factor<T: Scalar>(a: &mut [T], n: usize, lda: usize, eps_pivot: f64) -> Result<usize, PastixError> {
    let mut nbpivot = 0usize;
    for k in 0..n {
        let mut pivot = at(a, k, k, lda);
        if pivot.modulus().to_f64().unwrap_or(0.0) < eps_pivot {
            pivot = T::from_real(<T::Real as NumCast>::from(eps_pivot).unwrap_or(pivot.modulus()));
            set(a, k, k, lda, pivot);
            nbpivot += 1;
        }
        for i in (k + 1)..n {
            let v = at(a, i, k, lda) / pivot;
            set(a, i, k, lda, v);
        }
        for j in (k + 1)..n {
            let ukj = at(a, k, j, lda);
            for i in (k + 1)..n {
                let lik = at(a, i, k, lda);
                let v = at(a, i, j, lda) - lik * ukj;
                set(a, i, j, lda, v);
            }
        }
    }
    Ok(nbpivot)
}

/// Solves `r := r * tri^{-T}` (or `tri^{-H}` when `conjugate`), where `tri`
/// is the `n x n` lower-triangular factor (non-unit diagonal) at the top of
/// the just-factored diagonal block. Used to scale an off-diagonal block
/// of `m` rows against `Llt`/`Ldlt`'s `L` (spec §4.4, right-looking
/// off-diagonal update).
pub fn trsm_right_lower_transpose<T: Scalar>(
    tri: &[T],
    n: usize,
    ldt: usize,
    r: &mut [T],
    m: usize,
    ldr: usize,
    conjugate: bool,
    unit_diag: bool,
) {
    for j in 0..n {
        for i in 0..m {
            let mut sum = at(r, i, j, ldr);
            for k in 0..j {
                let tjk = if conjugate { at(tri, j, k, ldt).conj() } else { at(tri, j, k, ldt) };
                sum -= at(r, i, k, ldr) * tjk;
            }
            if !unit_diag {
                let tjj = at(tri, j, j, ldt);
                sum /= tjj;
            }
            set(r, i, j, ldr, sum);
        }
    }
}

/// Solves `tri * r := r_orig` where `tri` is `n x n` unit-lower-triangular
/// (used for `Lu`'s U off-diagonal block: `L_diag * U_offdiag = A_offdiag`).
pub fn trsm_left_lower_unit<T: Scalar>(tri: &[T], n: usize, ldt: usize, r: &mut [T], cols: usize, ldr: usize) {
    for c in 0..cols {
        for i in 0..n {
            let mut sum = at(r, i, c, ldr);
            for k in 0..i {
                sum -= at(tri, i, k, ldt) * at(r, k, c, ldr);
            }
            set(r, i, c, ldr, sum);
        }
    }
}

/// Solves `r * tri := r_orig` where `tri` is `n x n` upper-triangular
/// (non-unit diagonal), used for `Lu`'s L off-diagonal block:
/// `L_offdiag * U_diag = A_offdiag`.
pub fn trsm_right_upper_nonunit<T: Scalar>(tri: &[T], n: usize, ldt: usize, r: &mut [T], rows: usize, ldr: usize) {
    for j in 0..n {
        for i in 0..rows {
            let mut sum = at(r, i, j, ldr);
            for k in 0..j {
                sum -= at(r, i, k, ldr) * at(tri, k, j, ldt);
            }
            sum /= at(tri, j, j, ldt);
            set(r, i, j, ldr, sum);
        }
    }
}

/// Forward block substitution `rhs := tri^{-1} * rhs` where `tri` is `n x n`
/// lower-triangular (spec §4.5 "forward (L y = b)"): solves one column of
/// `rhs` at a time, in place.
pub fn trsm_forward_lower<T: Scalar>(
    tri: &[T],
    n: usize,
    ldt: usize,
    rhs: &mut [T],
    nrhs: usize,
    ldrhs: usize,
    unit_diag: bool,
) {
    for c in 0..nrhs {
        for i in 0..n {
            let mut sum = at(rhs, i, c, ldrhs);
            for k in 0..i {
                sum -= at(tri, i, k, ldt) * at(rhs, k, c, ldrhs);
            }
            if !unit_diag {
                sum /= at(tri, i, i, ldt);
            }
            set(rhs, i, c, ldrhs, sum);
        }
    }
}

/// Backward block substitution `rhs := tri^{-T} * rhs` (or `tri^{-H}` when
/// `conjugate`), `tri` is the same `n x n` lower-triangular factor as
/// [`trsm_forward_lower`] (spec §4.5 "backward (L^T x = y)").
pub fn trsm_backward_lower_transpose<T: Scalar>(
    tri: &[T],
    n: usize,
    ldt: usize,
    rhs: &mut [T],
    nrhs: usize,
    ldrhs: usize,
    unit_diag: bool,
    conjugate: bool,
) {
    for c in 0..nrhs {
        for ii in 0..n {
            let i = n - 1 - ii;
            let mut sum = at(rhs, i, c, ldrhs);
            for k in (i + 1)..n {
                let lki = if conjugate { at(tri, k, i, ldt).conj() } else { at(tri, k, i, ldt) };
                sum -= lki * at(rhs, k, c, ldrhs);
            }
            if !unit_diag {
                sum /= at(tri, i, i, ldt);
            }
            set(rhs, i, c, ldrhs, sum);
        }
    }
}

/// Backward block substitution `rhs := tri^{-1} * rhs` where `tri` is `n x n`
/// upper-triangular (non-unit diagonal); used by `Lu`'s backward pass
/// (spec §4.5 "for LU, the backward pass uses the separately stored U
/// panels").
pub fn trsm_backward_upper_left<T: Scalar>(tri: &[T], n: usize, ldt: usize, rhs: &mut [T], nrhs: usize, ldrhs: usize) {
    for c in 0..nrhs {
        for ii in 0..n {
            let i = n - 1 - ii;
            let mut sum = at(rhs, i, c, ldrhs);
            for k in (i + 1)..n {
                sum -= at(tri, i, k, ldt) * at(rhs, k, c, ldrhs);
            }
            sum /= at(tri, i, i, ldt);
            set(rhs, i, c, ldrhs, sum);
        }
    }
}

/// `c (m x n) -= a^T (m x k) * b (k x n)` (or `a^H` when `conjugate`), where
/// `a` is stored `k x m` with leading dimension `lda` — the same storage an
/// off-diagonal `L` block already has. Used by the backward solve's
/// off-diagonal contribution (spec §4.5: "subtract `L(b)^T * x(rows(b))`").
pub fn gemm_update_ta<T: Scalar>(
    c: &mut [T],
    ldc: usize,
    a: &[T],
    lda: usize,
    b: &[T],
    ldb: usize,
    m: usize,
    n: usize,
    k: usize,
    conjugate: bool,
) {
    for j in 0..n {
        for i in 0..m {
            let mut sum = T::zero();
            for kk in 0..k {
                let aki = if conjugate { at(a, kk, i, lda).conj() } else { at(a, kk, i, lda) };
                sum += aki * at(b, kk, j, ldb);
            }
            let v = at(c, i, j, ldc) - sum;
            set(c, i, j, ldc, v);
        }
    }
}

/// Rank-`k` update `c -= a * b^T` (or `b^H` when `conjugate`), `a` is
/// `m x k`, `b` is `n x k`, `c` is `m x n` (spec §4.4 `gemm`).
pub fn gemm_update<T: Scalar>(
    c: &mut [T],
    ldc: usize,
    a: &[T],
    lda: usize,
    b: &[T],
    ldb: usize,
    m: usize,
    n: usize,
    k: usize,
    conjugate: bool,
) {
    for j in 0..n {
        for kk in 0..k {
            let bjk = if conjugate { at(b, j, kk, ldb).conj() } else { at(b, j, kk, ldb) };
            if bjk == T::zero() {
                continue;
            }
            for i in 0..m {
                let contrib = at(a, i, kk, lda) * bjk;
                let v = at(c, i, j, ldc) - contrib;
                set(c, i, j, ldc, v);
            }
        }
    }
}

/// Rank-`k` update scaled by a diagonal `d` (spec §4.4 `gemdm`, used by
/// `Ldlt`/`Ldlh`'s off-diagonal update: `c -= a * diag(d) * b^T`).
pub fn gemdm_update<T: Scalar>(
    c: &mut [T],
    ldc: usize,
    a: &[T],
    lda: usize,
    d: &[T],
    b: &[T],
    ldb: usize,
    m: usize,
    n: usize,
    k: usize,
    conjugate: bool,
) {
    for j in 0..n {
        for kk in 0..k {
            let bjk = if conjugate { at(b, j, kk, ldb).conj() } else { at(b, j, kk, ldb) };
            let scaled = bjk * d[kk];
            if scaled == T::zero() {
                continue;
            }
            for i in 0..m {
                let contrib = at(a, i, kk, lda) * scaled;
                let v = at(c, i, j, ldc) - contrib;
                set(c, i, j, ldc, v);
            }
        }
    }
}

/// Plain (non-transposed) rank-`k` update `c -= a * b`, `a` is `m x k`,
/// `b` is `k x n`, `c` is `m x n`. Used by `Lu`'s cross update between an
/// `L`-side block and a `U`-side block (spec §4.4, general unsymmetric
/// case).
pub fn gemm_update_notrans<T: Scalar>(
    c: &mut [T],
    ldc: usize,
    a: &[T],
    lda: usize,
    b: &[T],
    ldb: usize,
    m: usize,
    n: usize,
    k: usize,
) {
    for j in 0..n {
        for kk in 0..k {
            let bkj = at(b, kk, j, ldb);
            if bkj == T::zero() {
                continue;
            }
            for i in 0..m {
                let contrib = at(a, i, kk, lda) * bkj;
                let v = at(c, i, j, ldc) - contrib;
                set(c, i, j, ldc, v);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn potrf_recovers_known_cholesky_factor() {
        // A = [[4,2],[2,3]] = L L^T with L = [[2,0],[1, sqrt(2)]]
        let mut a = vec![4.0f64, 2.0, 2.0, 3.0]; // column-major 2x2
        potrf(&mut a, 2, 2, 1e-12).unwrap();
        assert!((a[0] - 2.0).abs() < 1e-10);
        assert!((a[1] - 1.0).abs() < 1e-10);
        assert!((a[3] - 2f64.sqrt()).abs() < 1e-10);
    }

    #[test]
    fn ldlt_factor_matches_manual_2x2() {
        // A = [[4,2],[2,1]]; D0=4, L10=0.5, D1 = 1 - 0.5*0.5*4 = 0.
        // Use a non-singular example instead: A=[[4,2],[2,5]].
        let mut a = vec![4.0f64, 2.0, 2.0, 5.0];
        ldlt_factor(&mut a, 2, 2, false, 1e-12).unwrap();
        assert!((a[1] - 0.5).abs() < 1e-10);
        assert!((a[3] - (5.0 - 0.5 * 0.5 * 4.0)).abs() < 1e-10);
    }

    #[test]
    fn forward_backward_lower_round_trip_solves_spd_system() {
        // L = [[2,0],[1,sqrt(2)]], solve L y = b then L^T x = y for A x = b,
        // A = L L^T = [[4,2],[2,3]], b = A*[1,1] = [6,5] => x = [1,1].
        let l = vec![2.0f64, 1.0, 0.0, 2f64.sqrt()];
        let mut rhs = vec![6.0f64, 5.0];
        trsm_forward_lower(&l, 2, 2, &mut rhs, 1, 2, false);
        trsm_backward_lower_transpose(&l, 2, 2, &mut rhs, 1, 2, false, false);
        assert!((rhs[0] - 1.0).abs() < 1e-9);
        assert!((rhs[1] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn lu_factor_recovers_identity_like_case() {
        let mut a = vec![2.0f64, 4.0, 1.0, 3.0]; // col-major [[2,1],[4,3]]
        lu_factor(&mut a, 2, 2, 1e-12).unwrap();
        // L10 = 4/2 = 2, U11 = 3 - 2*1 = 1
        assert!((a[1] - 2.0).abs() < 1e-10);
        assert!((a[3] - 1.0).abs() < 1e-10);
    }
}
