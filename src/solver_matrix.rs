//! C4 — the solver matrix: lays the analyzed symbol matrix out as a flat
//! dense coefficient buffer per supernode, with the contribution counts
//! (`ctrbcnt`) the scheduler uses to know when a panel's incoming updates
//! have all landed, and theoretical/real flop accounting across the four
//! `FactorizationKind`s (spec §3 "SolverMatrix", §4.3).

use crate::error::PastixError;
use crate::params::FactorizationKind;
use crate::symbol::Symbol;

/// A block's offset within its owning panel's dense buffer.
#[derive(Debug, Clone, Copy)]
pub struct SolverBlok {
    pub frownum: usize,
    pub lrownum: usize,
    pub lcblknm: usize,
    pub fcblknm: usize,
    /// Row offset of this block's first row within the owning panel's
    /// column-major buffer.
    pub coefind: usize,
}

impl SolverBlok {
    pub fn height(&self) -> usize {
        self.lrownum - self.frownum + 1
    }
}

/// A supernode's dense coefficient layout: `width * stride` entries, stored
/// column-major, starting at `coefind` in the solver matrix's single flat
/// coefficient buffer.
#[derive(Debug, Clone, Copy)]
pub struct SolverCblk {
    pub fcolnum: usize,
    pub lcolnum: usize,
    pub bloknum: usize,
    /// Number of rows stacked in this panel's dense buffer (sum of its own
    /// blocks' heights, i.e. the diagonal block's width plus every
    /// off-diagonal block's height).
    pub stride: usize,
    /// Offset of this panel's buffer within the solver matrix's flat
    /// coefficient array.
    pub coefind: usize,
}

impl SolverCblk {
    pub fn width(&self) -> usize {
        self.lcolnum - self.fcolnum + 1
    }
}

/// Symbolic (structure-only) flop estimate for one `FactorizationKind`,
/// computed from block dimensions alone (spec §4.3 "theoretical flops").
#[derive(Debug, Clone, Copy, Default)]
pub struct FlopCounts {
    pub theoretical: f64,
    pub real: f64,
}

/// The dense block layout plus scheduling metadata derived from an analyzed
/// `Symbol` (spec §3 "SolverMatrix").
#[derive(Debug, Clone)]
pub struct SolverMatrix {
    pub cblktab: Vec<SolverCblk>,
    pub bloktab: Vec<SolverBlok>,
    pub browtab: Vec<usize>,
    n: usize,
    coefnbr: usize,
    /// Number of incoming off-diagonal contributions each panel must
    /// receive before it can be factored (spec §4.3's task table).
    ctrbcnt: Vec<usize>,
    flops: FlopCounts,
}

impl SolverMatrix {
    pub fn n(&self) -> usize {
        self.n
    }

    pub fn cblknbr(&self) -> usize {
        self.cblktab.len() - 1
    }

    pub fn bloknbr(&self) -> usize {
        self.bloktab.len() - 1
    }

    /// Total size of the flat coefficient buffer the numeric engine must
    /// allocate.
    pub fn coefnbr(&self) -> usize {
        self.coefnbr
    }

    pub fn ctrbcnt(&self, k: usize) -> usize {
        self.ctrbcnt[k]
    }

    pub fn blocks_of(&self, k: usize) -> &[SolverBlok] {
        let start = self.cblktab[k].bloknum;
        let end = self.cblktab[k + 1].bloknum;
        &self.bloktab[start..end]
    }

    pub fn brow_of(&self, k: usize, symbol: &Symbol) -> &[usize] {
        symbol.brow_of(k)
    }

    pub fn theoretical_flops(&self) -> f64 {
        self.flops.theoretical
    }

    pub fn real_flops(&self) -> f64 {
        self.flops.real
    }

    pub fn add_real_flops(&mut self, flops: f64) {
        self.flops.real += flops;
    }

    /// Builds the dense layout from an analyzed `Symbol` (panic-free: any
    /// structurally valid, analyzed symbol produces a valid `SolverMatrix`).
    pub fn build(symbol: &Symbol, kind: FactorizationKind) -> Result<Self, PastixError> {
        if !symbol.is_analyzed() {
            return Err(PastixError::StepOrder {
                message: "SolverMatrix::build requires an analyzed symbol",
            });
        }

        let cblknbr = symbol.cblknbr();
        let mut cblktab = Vec::with_capacity(cblknbr + 1);
        let mut bloktab = Vec::new();
        let mut coefnbr = 0usize;
        let mut ctrbcnt = vec![0usize; cblknbr];
        let mut theoretical = 0.0f64;

        for k in 0..cblknbr {
            let cblk = symbol.cblk(k);
            let width = cblk.lcolnum - cblk.fcolnum + 1;
            let blocks = symbol.blocks_of(k);

            let bloknum_start = bloktab.len();
            let mut row_offset = 0usize;
            for blok in blocks {
                bloktab.push(SolverBlok {
                    frownum: blok.frownum,
                    lrownum: blok.lrownum,
                    lcblknm: blok.lcblknm,
                    fcblknm: blok.fcblknm,
                    coefind: row_offset,
                });
                row_offset += blok.height();

                if blok.fcblknm != k {
                    ctrbcnt[blok.fcblknm] += 1;
                }
            }
            let stride = row_offset;

            cblktab.push(SolverCblk {
                fcolnum: cblk.fcolnum,
                lcolnum: cblk.lcolnum,
                bloknum: bloknum_start,
                stride,
                coefind: coefnbr,
            });
            coefnbr += width * stride;

            theoretical += panel_flops(kind, width, stride);
        }

        cblktab.push(SolverCblk {
            fcolnum: symbol.n(),
            lcolnum: symbol.n(),
            bloknum: bloktab.len(),
            stride: 0,
            coefind: coefnbr,
        });

        Ok(Self {
            cblktab,
            bloktab,
            browtab: symbol.browtab.clone(),
            n: symbol.n(),
            coefnbr,
            ctrbcnt,
            flops: FlopCounts {
                theoretical,
                real: 0.0,
            },
        })
    }
}

/// Symbolic flop estimate for one panel: its own factorization kernel
/// (`potrf`/`sytrf`/`getrf`, `width^3`-ish) plus the `trsm` applied to the
/// `stride - width` rows below it. Complex kinds (`Ldlh`) cost the same
/// operation count as their real analog; the constant-factor difference
/// between real and complex arithmetic is a BLAS implementation detail, not
/// part of this structural estimate.
fn panel_flops(kind: FactorizationKind, width: usize, stride: usize) -> f64 {
    let w = width as f64;
    let below = (stride - width) as f64;
    let factor_cost = match kind {
        FactorizationKind::Llt | FactorizationKind::Ldlt | FactorizationKind::Ldlh => w * w * w / 3.0,
        FactorizationKind::Lu => 2.0 * w * w * w / 3.0,
    };
    let trsm_cost = match kind {
        FactorizationKind::Llt | FactorizationKind::Ldlt | FactorizationKind::Ldlh => w * w * below,
        FactorizationKind::Lu => 2.0 * w * w * below,
    };
    factor_cost + trsm_cost
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;
    use crate::order::Order;
    use crate::symbol::{analysis, fax};

    #[test]
    fn layout_matches_symbol_shape() {
        let n = 4;
        let mut colptr = vec![0usize; n + 1];
        let mut rowind = Vec::new();
        for i in 0..n {
            if i + 1 < n {
                rowind.push(i + 1);
            }
            colptr[i + 1] = rowind.len();
        }
        let g = Graph::from_csc_pattern(n, &colptr, &rowind).unwrap();
        let order = Order::identity(&g).unwrap();
        let symbol = fax::build(&g.permuted(order.permtab()), &order).unwrap();
        let symbol = analysis::analyze(symbol).unwrap();

        let solver = SolverMatrix::build(&symbol, FactorizationKind::Llt).unwrap();
        assert_eq!(solver.cblknbr(), symbol.cblknbr());
        assert_eq!(solver.bloknbr(), symbol.bloknbr());
        assert!(solver.coefnbr() > 0);
        assert!(solver.theoretical_flops() > 0.0);
    }

    #[test]
    fn rejects_unanalyzed_symbol() {
        let n = 3;
        let colptr = vec![0usize; n + 1];
        let rowind: Vec<usize> = vec![];
        let g = Graph::from_csc_pattern(n, &colptr, &rowind).unwrap();
        let order = Order::identity(&g).unwrap();
        let symbol = fax::build(&g.permuted(order.permtab()), &order).unwrap();
        assert!(SolverMatrix::build(&symbol, FactorizationKind::Lu).is_err());
    }
}
