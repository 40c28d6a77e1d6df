//! C5 — the numeric factorization engine: scatters a CSC matrix into the
//! `SolverMatrix`'s dense block layout and runs the block factorization
//! (spec §4.4). One right-looking sweep over panels in elimination order;
//! `FactorizationKind` selects which diagonal kernel and update rule apply.

use num_traits::ToPrimitive;

use crate::error::PastixError;
use crate::numeric::kernels;
use crate::params::FactorizationKind;
use crate::scalar::Scalar;
use crate::solver_matrix::SolverMatrix;
use crate::symbol::Symbol;

/// A (possibly unsymmetric) sparse matrix in CSC form, already expressed in
/// the *permuted* numbering the symbol matrix uses (spec §1: raw CSC/CSR/IJV
/// conversions and the permutation itself are external collaborators; this
/// type only carries the already-permuted values the scatter step needs).
#[derive(Debug, Clone)]
pub struct CscMatrix<T> {
    n: usize,
    colptr: Vec<usize>,
    rowind: Vec<usize>,
    values: Vec<T>,
}

impl<T: Scalar> CscMatrix<T> {
    pub fn new(n: usize, colptr: Vec<usize>, rowind: Vec<usize>, values: Vec<T>) -> Result<Self, PastixError> {
        if colptr.len() != n + 1 {
            return Err(PastixError::Matrix {
                message: "colptr length must be n+1".to_string(),
            });
        }
        if rowind.len() != values.len() {
            return Err(PastixError::Matrix {
                message: "rowind/values length mismatch".to_string(),
            });
        }
        Ok(Self {
            n,
            colptr,
            rowind,
            values,
        })
    }

    pub fn n(&self) -> usize {
        self.n
    }

    fn column(&self, c: usize) -> (&[usize], &[T]) {
        let start = self.colptr[c];
        let end = self.colptr[c + 1];
        (&self.rowind[start..end], &self.values[start..end])
    }

    /// `y := A * x` (spec §4.6 `apply_A`). When `symmetric_storage` is set,
    /// only the lower triangle is actually present (the convention the
    /// scatter step in [`factor`] expects for `Llt`/`Ldlt`/`Ldlh`), so the
    /// implied mirror contribution above the diagonal is added too;
    /// `conjugate` selects the Hermitian mirror (`Ldlh`).
    pub fn matvec(&self, x: &[T], y: &mut [T], symmetric_storage: bool, conjugate: bool) {
        for v in y.iter_mut() {
            *v = T::zero();
        }
        for c in 0..self.n {
            let (rows, values) = self.column(c);
            for (&row, &val) in rows.iter().zip(values.iter()) {
                y[row] += val * x[c];
                if symmetric_storage && row != c {
                    let mirrored = if conjugate { val.conj() } else { val };
                    y[c] += mirrored * x[row];
                }
            }
        }
    }
}

/// Outcome of one `task_numfact` run (spec §4.4, §9 "FactorReport"): the
/// number of diagonal entries that needed the static-pivoting clamp, whether
/// a Schur complement was left unfactored, and (SPEC_FULL §B, grounded in
/// `original_source/pastix/sopalin/sequential_zsytrf.c`'s pivot tracking)
/// the smallest diagonal pivot magnitude actually produced and, for
/// `Ldlt`/`Ldlh`, the (positive, negative, zero) inertia of `D`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FactorReport {
    pub nbpivot: usize,
    pub schur_cblk: Option<usize>,
    pub min_pivot_abs: f64,
    pub inertia: Option<(usize, usize, usize)>,
}

/// The factored coefficients: a single dense buffer for the symmetric
/// kinds, or an `(L, U)` pair for `Lu` (spec §9 "one algorithm
/// parameterized by the element type").
pub struct Factors<T> {
    pub lcoef: Vec<T>,
    pub ucoef: Option<Vec<T>>,
    kind: FactorizationKind,
}

impl<T: Scalar> Factors<T> {
    pub fn kind(&self) -> FactorizationKind {
        self.kind
    }
}

fn col2cblk(solver: &SolverMatrix) -> Vec<usize> {
    let n = solver.n();
    let mut map = vec![0usize; n];
    for k in 0..solver.cblknbr() {
        let cblk = solver.cblktab[k];
        for c in cblk.fcolnum..=cblk.lcolnum {
            map[c] = k;
        }
    }
    map
}

/// Finds the row offset of `row` inside panel `k`'s own dense buffer, or
/// `None` if `row` isn't part of `k`'s symbolic pattern (can only happen
/// under an incomplete, ILU(k)-truncated symbol — the update is then
/// silently dropped, matching the documented incomplete-factorization
/// policy).
fn locate_row(solver: &SolverMatrix, k: usize, row: usize) -> Option<usize> {
    solver
        .blocks_of(k)
        .iter()
        .find(|b| row >= b.frownum && row <= b.lrownum)
        .map(|b| b.coefind + (row - b.frownum))
}

/// Lays out one compact buffer per off-diagonal block for `Lu`'s `U`
/// coefficients: block `b`, owned by panel `k` facing some later panel,
/// gets a `width(k) x height(b)` compact (column-major, `ld = width(k)`)
/// slot.
pub(crate) fn ucoef_layout(symbol: &Symbol, solver: &SolverMatrix) -> (Vec<usize>, usize) {
    let mut offsets = vec![0usize; solver.bloknbr()];
    let mut total = 0usize;
    for k in 0..solver.cblknbr() {
        let width = solver.cblktab[k].width();
        for b in symbol.cblktab[k].bloknum..symbol.cblktab[k + 1].bloknum {
            let blok = symbol.blok(b);
            if blok.fcblknm == k {
                continue;
            }
            let height = blok.height();
            offsets[b] = total;
            total += width * height;
        }
    }
    (offsets, total)
}

/// Copies a `rows x cols` sub-matrix starting at `offset` (leading
/// dimension `ld`) out into a compact (`ld = rows`) owned buffer.
pub(crate) fn extract_block<T: Scalar>(buf: &[T], offset: usize, rows: usize, cols: usize, ld: usize) -> Vec<T> {
    let mut out = vec![T::zero(); rows * cols];
    for j in 0..cols {
        for i in 0..rows {
            out[i + j * rows] = buf[offset + i + j * ld];
        }
    }
    out
}

/// Inverse of [`extract_block`]: writes a compact (`ld = rows`) buffer back
/// into its strided home.
fn write_block<T: Scalar>(buf: &mut [T], offset: usize, rows: usize, cols: usize, ld: usize, data: &[T]) {
    for j in 0..cols {
        for i in 0..rows {
            buf[offset + i + j * ld] = data[i + j * rows];
        }
    }
}

/// Scatters `a` and runs the block factorization over `symbol`/`solver`
/// (spec §4.4). `schur_cblk`, when set, leaves panels `>= schur_cblk`
/// un-eliminated after every earlier panel's update has landed on them
/// (spec §9 "Schur complement mode").
pub fn factor<T: Scalar>(
    symbol: &Symbol,
    solver: &mut SolverMatrix,
    a: &CscMatrix<T>,
    kind: FactorizationKind,
    eps_pivot: f64,
    schur_cblk: Option<usize>,
) -> Result<(Factors<T>, FactorReport), PastixError> {
    if a.n() != symbol.n() {
        return Err(PastixError::Matrix {
            message: "matrix and symbol disagree on n".to_string(),
        });
    }
    let col2c = col2cblk(solver);
    let n = symbol.n();

    let mut lcoef = vec![T::zero(); solver.coefnbr()];
    let (ublock_offset, utotal) = ucoef_layout(symbol, solver);
    let mut ucoef = if kind == FactorizationKind::Lu {
        Some(vec![T::zero(); utotal])
    } else {
        None
    };

    let mut diag_touched = vec![false; n];

    for c in 0..n {
        let k = col2c[c];
        let cblk = solver.cblktab[k];
        let (rows, values) = a.column(c);
        for (&row, &val) in rows.iter().zip(values.iter()) {
            if row >= c {
                let Some(roff) = locate_row(solver, k, row) else {
                    continue;
                };
                let idx = cblk.coefind + (c - cblk.fcolnum) * cblk.stride + roff;
                lcoef[idx] = val;
                if row == c {
                    diag_touched[c] = true;
                }
            } else if let Some(ucoef) = ucoef.as_mut() {
                // Upper entry: `row` is a column of panel k_row; it must
                // land in one of that panel's own off-diagonal blocks
                // whose row-range contains `c`.
                let k_row = col2c[row];
                let width_row = solver.cblktab[k_row].width();
                if let Some((local_idx, blok)) = symbol
                    .blocks_of(k_row)
                    .iter()
                    .enumerate()
                    .find(|(_, blok)| blok.fcblknm != k_row && c >= blok.frownum && c <= blok.lrownum)
                {
                    let global_b = symbol.cblktab[k_row].bloknum + local_idx;
                    let base = ublock_offset[global_b];
                    let row_in_block = c - blok.frownum;
                    let col_in_block = row - symbol.cblktab[k_row].fcolnum;
                    ucoef[base + col_in_block + row_in_block * width_row] = val;
                }
            }
        }
    }

    for c in 0..n {
        if !diag_touched[c] {
            return Err(PastixError::FactorizationStructuralError { cblk: col2c[c] });
        }
    }

    let cblknbr = solver.cblknbr();
    let schur_start = schur_cblk.unwrap_or(cblknbr);
    let mut nbpivot = 0usize;
    let mut min_pivot_abs = f64::INFINITY;
    let mut inertia = (0usize, 0usize, 0usize);

    for m in 0..schur_start {
        let cblk = solver.cblktab[m];
        let width = cblk.width();
        let stride = cblk.stride;
        let diag_start = cblk.coefind;

        nbpivot += match kind {
            FactorizationKind::Llt => kernels::potrf(&mut lcoef[diag_start..], width, stride, eps_pivot)?,
            FactorizationKind::Ldlt => {
                kernels::ldlt_factor(&mut lcoef[diag_start..], width, stride, false, eps_pivot)?
            }
            FactorizationKind::Ldlh => {
                kernels::ldlt_factor(&mut lcoef[diag_start..], width, stride, true, eps_pivot)?
            }
            FactorizationKind::Lu => kernels::lu_factor(&mut lcoef[diag_start..], width, stride, eps_pivot)?,
        };

        let diag_copy = extract_block(&lcoef, diag_start, width, width, stride);
        let d_values: Vec<T> = if matches!(kind, FactorizationKind::Ldlt | FactorizationKind::Ldlh) {
            (0..width).map(|j| diag_copy[j + j * width]).collect()
        } else {
            Vec::new()
        };

        for j in 0..width {
            let pivot = diag_copy[j + j * width];
            let mag = pivot.modulus().to_f64().unwrap_or(f64::INFINITY);
            if mag < min_pivot_abs {
                min_pivot_abs = mag;
            }
            if matches!(kind, FactorizationKind::Ldlt | FactorizationKind::Ldlh) {
                if pivot.is_negative_real() {
                    inertia.1 += 1;
                } else if mag == 0.0 {
                    inertia.2 += 1;
                } else {
                    inertia.0 += 1;
                }
            }
        }

        let blocks = solver.blocks_of(m).to_vec();
        let symbol_blocks = symbol.blocks_of(m).to_vec();

        for (i, sb) in symbol_blocks.iter().enumerate().skip(1) {
            let height = sb.height();
            let off_abs = diag_start + blocks[i].coefind;

            match kind {
                FactorizationKind::Llt => {
                    kernels::trsm_right_lower_transpose(
                        &diag_copy,
                        width,
                        width,
                        &mut lcoef[off_abs..],
                        height,
                        stride,
                        false,
                        false,
                    );
                }
                FactorizationKind::Ldlt | FactorizationKind::Ldlh => {
                    let conj = kind == FactorizationKind::Ldlh;
                    kernels::trsm_right_lower_transpose(
                        &diag_copy,
                        width,
                        width,
                        &mut lcoef[off_abs..],
                        height,
                        stride,
                        conj,
                        true,
                    );
                }
                FactorizationKind::Lu => {
                    kernels::trsm_right_upper_nonunit(&diag_copy, width, width, &mut lcoef[off_abs..], height, stride);

                    if let Some(ucoef) = ucoef.as_mut() {
                        let global_b = symbol.cblktab[m].bloknum + i;
                        let ubase = ublock_offset[global_b];
                        kernels::trsm_left_lower_unit(&diag_copy, width, width, &mut ucoef[ubase..], height, width);
                    }
                }
            }
        }

        // Right-looking update: every ordered pair of m's off-diagonal
        // blocks contributes to the trailing matrix (spec §4.4). For the
        // symmetric kinds only j >= i is visited (the pair is symmetric);
        // `Lu` visits every ordered pair since L's and U's roles aren't
        // interchangeable. A pair's contribution lands inside whichever
        // panel owns the *smaller*-indexed facing panel, at the sub-block
        // offset given by how far each source block sits from that panel's
        // own column start — blocks rarely span a facing panel's full
        // width, so this offset is not generally zero.
        for i in 1..symbol_blocks.len() {
            let bi = symbol_blocks[i];
            let ki = bi.fcblknm;
            let height_i = bi.height();
            let base_i = diag_start + blocks[i].coefind;
            let row_in_ki = bi.frownum - solver.cblktab[ki].fcolnum;
            let a_bi: Vec<T> = extract_block(&lcoef, base_i, height_i, width, stride);

            for j in 1..symbol_blocks.len() {
                if kind != FactorizationKind::Lu && j < i {
                    continue;
                }
                let bj = symbol_blocks[j];
                let kj = bj.fcblknm;
                let height_j = bj.height();
                let base_j = diag_start + blocks[j].coefind;

                if kind == FactorizationKind::Lu {
                    let Some(ucoef_ref) = ucoef.as_ref() else { continue };
                    let global_bj = symbol.cblktab[m].bloknum + j;
                    let ubase_j = ublock_offset[global_bj];
                    let u_bj: Vec<T> = ucoef_ref[ubase_j..ubase_j + width * height_j].to_vec();

                    if ki == kj {
                        let target_cblk = solver.cblktab[ki];
                        let col_in_ki = bj.frownum - target_cblk.fcolnum;
                        let offset = target_cblk.coefind + row_in_ki + col_in_ki * target_cblk.stride;
                        let mut c_sub = extract_block(&lcoef, offset, height_i, height_j, target_cblk.stride);
                        kernels::gemm_update_notrans(
                            &mut c_sub, height_i, &a_bi, height_i, &u_bj, width, height_i, height_j, width,
                        );
                        write_block(&mut lcoef, offset, height_i, height_j, target_cblk.stride, &c_sub);
                    } else if ki < kj {
                        if let Some((idx, target_blok)) =
                            symbol.blocks_of(ki).iter().enumerate().find(|(_, b)| b.fcblknm == kj)
                        {
                            let width_ki = solver.cblktab[ki].width();
                            let global_tb = symbol.cblktab[ki].bloknum + idx;
                            let ubase_t = ublock_offset[global_tb];
                            let col_in_target = bj.frownum - target_blok.frownum;
                            let offset = ubase_t + row_in_ki + col_in_target * width_ki;
                            let ucoef_mut = ucoef.as_mut().expect("checked above");
                            let mut u_sub = extract_block(ucoef_mut, offset, height_i, height_j, width_ki);
                            kernels::gemm_update_notrans(
                                &mut u_sub, height_i, &a_bi, height_i, &u_bj, width, height_i, height_j, width,
                            );
                            write_block(ucoef_mut, offset, height_i, height_j, width_ki, &u_sub);
                        }
                    }
                } else {
                    // Symmetric kinds store only the lower triangle, so the
                    // contribution always lands with the *later* source
                    // block (bj, since j >= i means bj.frownum >= bi.frownum)
                    // supplying the row and the earlier one (bi) the column —
                    // `potrf`/`ldlt_factor` only ever read row >= col.
                    let conj = kind == FactorizationKind::Ldlh;
                    let b_bj: Vec<T> = extract_block(&lcoef, base_j, height_j, width, stride);

                    let (target_coefind, target_ld, row_off, col_off) = if ki == kj {
                        let target_cblk = solver.cblktab[ki];
                        let col_in_ki = bi.frownum - target_cblk.fcolnum;
                        (target_cblk.coefind, target_cblk.stride, bj.frownum - target_cblk.fcolnum, col_in_ki)
                    } else if ki < kj {
                        let Some((idx, target_blok)) =
                            symbol.blocks_of(ki).iter().enumerate().find(|(_, b)| b.fcblknm == kj)
                        else {
                            continue;
                        };
                        let target_cblk = solver.cblktab[ki];
                        let global_tb = symbol.cblktab[ki].bloknum + idx;
                        let target_coefind = target_cblk.coefind + solver.bloktab[global_tb].coefind;
                        (target_coefind, target_cblk.stride, bj.frownum - target_blok.frownum, row_in_ki)
                    } else {
                        continue;
                    };

                    let offset = target_coefind + row_off + col_off * target_ld;
                    let mut c_sub = extract_block(&lcoef, offset, height_j, height_i, target_ld);
                    if matches!(kind, FactorizationKind::Ldlt | FactorizationKind::Ldlh) {
                        kernels::gemdm_update(
                            &mut c_sub, height_j, &b_bj, height_j, &d_values, &a_bi, height_i, height_j, height_i,
                            width, conj,
                        );
                    } else {
                        kernels::gemm_update(
                            &mut c_sub, height_j, &b_bj, height_j, &a_bi, height_i, height_j, height_i, width, conj,
                        );
                    }
                    write_block(&mut lcoef, offset, height_j, height_i, target_ld, &c_sub);
                }
            }
        }
    }

    if nbpivot > 0 {
        tracing::debug!(nbpivot, "static pivoting clamped small diagonal entries");
    }

    let factors = Factors { lcoef, ucoef, kind };
    let report = FactorReport {
        nbpivot,
        schur_cblk,
        min_pivot_abs: if min_pivot_abs.is_finite() { min_pivot_abs } else { 0.0 },
        inertia: matches!(kind, FactorizationKind::Ldlt | FactorizationKind::Ldlh).then_some(inertia),
    };
    Ok((factors, report))
}
