//! C2/C3 — the symbol matrix: the combinatorial description of the factor's
//! nonzero block pattern (spec §3, §4.1, §4.2).

pub mod analysis;
pub mod fax;
pub mod kass;
pub mod persist;

use crate::error::PastixError;

/// A supernode (column-block) descriptor (spec §3 "Symbol matrix").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cblk {
    pub fcolnum: usize,
    pub lcolnum: usize,
    pub bloknum: usize,
    pub brownum: usize,
}

/// A dense rectangular block of `L` inside one column-block (spec §3 "Blok").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Blok {
    pub frownum: usize,
    pub lrownum: usize,
    pub lcblknm: usize,
    pub fcblknm: usize,
}

impl Blok {
    pub fn height(&self) -> usize {
        self.lrownum - self.frownum + 1
    }
}

/// The combinatorial symbol matrix: `cblktab`/`bloktab` carry a sentinel
/// trailing entry holding end offsets (spec §3).
#[derive(Debug, Clone)]
pub struct Symbol {
    pub(crate) cblktab: Vec<Cblk>,
    pub(crate) bloktab: Vec<Blok>,
    pub(crate) browtab: Vec<usize>,
    n: usize,
    /// Set once C3's browtab/rustine passes have run; `check_invariants`
    /// skips the browtab-dependent checks until then.
    pub(crate) analyzed: bool,
}

impl Symbol {
    pub fn n(&self) -> usize {
        self.n
    }

    pub fn cblknbr(&self) -> usize {
        self.cblktab.len() - 1
    }

    pub fn bloknbr(&self) -> usize {
        self.bloktab.len() - 1
    }

    pub fn cblk(&self, k: usize) -> Cblk {
        self.cblktab[k]
    }

    pub fn cblks(&self) -> &[Cblk] {
        &self.cblktab[..self.cblktab.len() - 1]
    }

    pub fn blok(&self, b: usize) -> Blok {
        self.bloktab[b]
    }

    /// Blocks belonging to panel `k`: `[bloknum(k), bloknum(k+1))`.
    pub fn blocks_of(&self, k: usize) -> &[Blok] {
        let start = self.cblktab[k].bloknum;
        let end = self.cblktab[k + 1].bloknum;
        &self.bloktab[start..end]
    }

    /// Incoming off-diagonal blocks targeting panel `k` (only valid once
    /// `analyzed`; spec §3 "browtab").
    pub fn brow_of(&self, k: usize) -> &[usize] {
        let start = self.cblktab[k].brownum;
        let end = self.cblktab[k + 1].brownum;
        &self.browtab[start..end]
    }

    pub fn is_analyzed(&self) -> bool {
        self.analyzed
    }

    /// Checks every invariant of spec §3 that does not require `analyzed`
    /// (sortedness, disjointness, facing-block containment). The browtab
    /// edge-count and rustine invariants are checked separately in
    /// `analysis::check_analyzed_invariants` once C3 has run.
    pub fn check_structural_invariants(&self) -> Result<(), PastixError> {
        let cblknbr = self.cblknbr();

        if self.cblktab.last().map(|c| c.bloknum) != Some(self.bloktab.len() - 1) {
            return Err(PastixError::Matrix {
                message: "cblktab sentinel bloknum mismatch".to_string(),
            });
        }

        for k in 0..cblknbr {
            let blocks = self.blocks_of(k);
            if blocks.is_empty() {
                return Err(PastixError::Matrix {
                    message: format!("panel {k} has no diagonal block"),
                });
            }
            let diag = blocks[0];
            if diag.lcblknm != k || diag.fcblknm != k {
                return Err(PastixError::Matrix {
                    message: format!("panel {k}'s first block is not its diagonal block"),
                });
            }
            if diag.frownum != self.cblktab[k].fcolnum || diag.lrownum != self.cblktab[k].lcolnum
            {
                return Err(PastixError::Matrix {
                    message: format!("panel {k}'s diagonal block does not span its own columns"),
                });
            }

            let mut prev_last: Option<usize> = None;
            for blok in blocks {
                if blok.lcblknm != k {
                    return Err(PastixError::Matrix {
                        message: format!("block in panel {k} has wrong owning column-block"),
                    });
                }
                if blok.frownum > blok.lrownum {
                    return Err(PastixError::Matrix {
                        message: "block with frownum > lrownum".to_string(),
                    });
                }
                if let Some(last) = prev_last {
                    if blok.frownum <= last {
                        return Err(PastixError::Matrix {
                            message: format!(
                                "blocks in panel {k} are not sorted/disjoint by frownum"
                            ),
                        });
                    }
                }
                prev_last = Some(blok.lrownum);

                let face = self.cblktab[blok.fcblknm];
                if blok.frownum < face.fcolnum || blok.lrownum > face.lcolnum {
                    return Err(PastixError::Matrix {
                        message: format!(
                            "block [{},{}] is not contained in facing cblk {}'s column range",
                            blok.frownum, blok.lrownum, blok.fcblknm
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}
