//! C1 — permutation, supernode partition, and elimination tree.
//!
//! The fill-reducing ordering *algorithm* is an external collaborator (spec
//! §1); this module only defines the `Order` record the rest of the core
//! consumes, plus the minimal machinery to produce a default one: the
//! classic disjoint-set elimination-tree construction (Liu, "A Compact Row
//! Storage Scheme for Lower Triangular Factors", 1986) and a fundamental
//! supernode merge on top of it. `Handle::task_order` calls into this;
//! a caller may instead supply its own `Order` (e.g. from a METIS/Scotch
//! binding) as long as it satisfies the invariants below.

use faer::dyn_stack::{MemBuffer, MemStack};
use faer::sparse::SymbolicSparseColMat;
use faer::sparse::linalg::amd;

use crate::error::PastixError;
use crate::graph::Graph;

/// Permutation, supernode partition (`rangtab`), and elimination tree
/// (`treetab`), all in the *new* (permuted) numbering (spec §3 "Order").
#[derive(Debug, Clone)]
pub struct Order {
    permtab: Vec<usize>,
    peritab: Vec<usize>,
    rangtab: Vec<usize>,
    treetab: Vec<isize>,
}

impl Order {
    pub fn n(&self) -> usize {
        self.peritab.len()
    }

    pub fn cblknbr(&self) -> usize {
        self.rangtab.len() - 1
    }

    pub fn permtab(&self) -> &[usize] {
        &self.permtab
    }

    pub fn peritab(&self) -> &[usize] {
        &self.peritab
    }

    pub fn rangtab(&self) -> &[usize] {
        &self.rangtab
    }

    pub fn treetab(&self) -> &[isize] {
        &self.treetab
    }

    /// Builds an `Order` directly from already-computed tables, checking
    /// every invariant in spec §3.
    pub fn new(
        permtab: Vec<usize>,
        peritab: Vec<usize>,
        rangtab: Vec<usize>,
        treetab: Vec<isize>,
    ) -> Result<Self, PastixError> {
        let order = Self {
            permtab,
            peritab,
            rangtab,
            treetab,
        };
        order.check_invariants()?;
        Ok(order)
    }

    pub fn check_invariants(&self) -> Result<(), PastixError> {
        let n = self.peritab.len();
        if self.permtab.len() != n {
            return Err(PastixError::Matrix {
                message: "permtab/peritab length mismatch".to_string(),
            });
        }
        // permtab is a bijection over [0,n) and permtab[peritab[i]] == i.
        let mut seen = vec![false; n];
        for i in 0..n {
            let p = self.permtab[i];
            if p >= n || seen[p] {
                return Err(PastixError::Matrix {
                    message: "permtab is not a bijection".to_string(),
                });
            }
            seen[p] = true;
        }
        for i in 0..n {
            if self.permtab[self.peritab[i]] != i {
                return Err(PastixError::Matrix {
                    message: "permtab/peritab are not mutual inverses".to_string(),
                });
            }
        }
        if self.rangtab.first() != Some(&0) || self.rangtab.last() != Some(&n) {
            return Err(PastixError::Matrix {
                message: "rangtab must start at 0 and end at n".to_string(),
            });
        }
        if self.rangtab.windows(2).any(|w| w[0] >= w[1]) {
            return Err(PastixError::Matrix {
                message: "rangtab must be strictly increasing".to_string(),
            });
        }
        let cblknbr = self.rangtab.len() - 1;
        if self.treetab.len() != cblknbr {
            return Err(PastixError::Matrix {
                message: "treetab length must equal cblknbr".to_string(),
            });
        }
        for (k, &parent) in self.treetab.iter().enumerate() {
            if parent != -1 && (parent as usize) <= k {
                return Err(PastixError::Matrix {
                    message: "treetab parent must be -1 (root) or a later supernode".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Default ordering: AMD fill-reducing permutation (reusing faer's
    /// bundled AMD, as the teacher crate does for its Cholesky solver) with
    /// a trivial one-column-per-supernode partition. `symbol::kass` performs
    /// its own amalgamation on top of this; `symbol::fax` expects a
    /// pre-amalgamated partition such as the one `fundamental_supernodes`
    /// below produces.
    pub fn amd(graph: &Graph) -> Result<Self, PastixError> {
        let n = graph.n();
        let symbolic = unsafe {
            SymbolicSparseColMat::<usize>::new_unchecked(
                n,
                n,
                graph.colptr().to_vec(),
                None,
                graph.rowind().to_vec(),
            )
        };

        let mut permtab = vec![0usize; n];
        let mut peritab = vec![0usize; n];
        let mut mem = MemBuffer::new(amd::order_scratch::<usize>(n, graph.nnz()));
        amd::order(
            &mut permtab,
            &mut peritab,
            symbolic.as_ref(),
            amd::Control::default(),
            MemStack::new(&mut mem),
        )
        .map_err(|_| PastixError::Matrix {
            message: "AMD ordering failed".to_string(),
        })?;

        let treetab = elimination_tree(graph, &permtab, &peritab);
        let rangtab: Vec<usize> = (0..=n).collect();

        Self::new(permtab, peritab, rangtab, treetab)
    }

    /// AMD, constrained so every vertex in `trailing` receives a permuted
    /// index higher than every vertex not in `trailing` (spec §6 "Schur
    /// complement mode": `get_schur` needs the kept unknowns to land in one
    /// contiguous trailing block aligned to a supernode boundary, which a
    /// plain fill-reducing order has no reason to produce on its own).
    /// Relative order within each of the two groups is taken from the
    /// unconstrained AMD permutation, so fill-reduction quality is preserved
    /// except where it conflicts with the separation itself.
    pub fn amd_with_trailing(graph: &Graph, trailing: &[usize]) -> Result<Self, PastixError> {
        let n = graph.n();
        let mut is_trailing = vec![false; n];
        for &v in trailing {
            if v >= n {
                return Err(PastixError::BadParameter {
                    message: "schur unknown index out of bounds",
                });
            }
            is_trailing[v] = true;
        }

        let base = Self::amd(graph)?;
        let mut permtab = vec![0usize; n];
        let mut next = 0usize;
        for &orig in base.peritab() {
            if !is_trailing[orig] {
                permtab[orig] = next;
                next += 1;
            }
        }
        for &orig in base.peritab() {
            if is_trailing[orig] {
                permtab[orig] = next;
                next += 1;
            }
        }
        let mut peritab = vec![0usize; n];
        for (orig, &p) in permtab.iter().enumerate() {
            peritab[p] = orig;
        }

        let treetab = elimination_tree(graph, &permtab, &peritab);
        let rangtab: Vec<usize> = (0..=n).collect();
        Self::new(permtab, peritab, rangtab, treetab)
    }

    /// Identity ordering with a trivial per-column partition; useful for
    /// tests and for n=1 / diagonal boundary cases (spec §8).
    pub fn identity(graph: &Graph) -> Result<Self, PastixError> {
        let n = graph.n();
        let permtab: Vec<usize> = (0..n).collect();
        let peritab = permtab.clone();
        let treetab = elimination_tree(graph, &permtab, &peritab);
        let rangtab: Vec<usize> = (0..=n).collect();
        Self::new(permtab, peritab, rangtab, treetab)
    }

    /// Merges fundamental supernodes on top of a trivial (per-column)
    /// `Order`: column `c` merges into its parent `p = treetab[c]` when `p ==
    /// c+1`, `p` has exactly one child (`c`), and the row structure of `c`
    /// (excluding `c` itself) equals the row structure of `p` minus `p`
    /// itself (the classic fundamental-supernode test, e.g. Liu/Ng/Peyton).
    /// This is the "already-amalgamated supernode partition" `symbol::fax`
    /// expects.
    pub fn fundamental_supernodes(&self, graph: &Graph) -> Result<Self, PastixError> {
        let n = self.n();
        if self.cblknbr() != n {
            return Err(PastixError::Matrix {
                message: "fundamental_supernodes requires a trivial per-column Order".to_string(),
            });
        }

        let row_patterns = column_row_patterns(graph, &self.permtab, &self.peritab, &self.treetab);

        let mut child_count = vec![0usize; n];
        for &p in &self.treetab {
            if p >= 0 {
                child_count[p as usize] += 1;
            }
        }

        let mut merge_into_prev = vec![false; n];
        for c in 0..n.saturating_sub(1) {
            let p = self.treetab[c];
            if p == (c as isize + 1) && child_count[c + 1] == 1 {
                let mut pat_c: Vec<usize> =
                    row_patterns[c].iter().copied().filter(|&r| r != c).collect();
                let mut pat_p: Vec<usize> = row_patterns[c + 1]
                    .iter()
                    .copied()
                    .filter(|&r| r != c + 1)
                    .collect();
                pat_c.sort_unstable();
                pat_p.sort_unstable();
                if pat_c == pat_p {
                    merge_into_prev[c + 1] = true;
                }
            }
        }

        let mut rangtab = vec![0usize];
        let mut cur_start = 0usize;
        for c in 0..n {
            if c + 1 < n && merge_into_prev[c + 1] {
                continue;
            }
            rangtab.push(c + 1);
            cur_start = c + 1;
        }
        let _ = cur_start;

        // New treetab: parent of supernode k is the supernode containing
        // treetab[rangtab[k+1]-1] (the last original column's parent).
        let cblknbr = rangtab.len() - 1;
        let mut col_to_cblk = vec![0usize; n];
        for k in 0..cblknbr {
            for col in rangtab[k]..rangtab[k + 1] {
                col_to_cblk[col] = k;
            }
        }
        let mut treetab = vec![-1isize; cblknbr];
        for k in 0..cblknbr {
            let last_col = rangtab[k + 1] - 1;
            let parent_col = self.treetab[last_col];
            treetab[k] = if parent_col < 0 {
                -1
            } else {
                col_to_cblk[parent_col as usize] as isize
            };
        }

        Self::new(
            self.permtab.clone(),
            self.peritab.clone(),
            rangtab,
            treetab,
        )
    }
}

/// Classic disjoint-set elimination-tree construction on the permuted graph:
/// `treetab[j]` is the smallest `i > j` such that `i` and `j` share a row in
/// the factor, found via union-find path compression over already-processed
/// columns (Liu 1986).
fn elimination_tree(graph: &Graph, permtab: &[usize], peritab: &[usize]) -> Vec<isize> {
    let n = graph.n();
    let mut parent = vec![-1isize; n];
    let mut ancestor = vec![-1isize; n];

    for k in 0..n {
        let orig_k = peritab[k];
        for &orig_i in graph.neighbors(orig_k) {
            let mut i = permtab[orig_i];
            if i >= k {
                continue;
            }
            while ancestor[i] != -1 && ancestor[i] != k as isize {
                let next = ancestor[i];
                ancestor[i] = k as isize;
                i = next as usize;
            }
            if ancestor[i] == -1 {
                ancestor[i] = k as isize;
                parent[i] = k as isize;
            }
        }
    }
    parent
}

/// Direct (non-incremental) symbolic row pattern per column of `L`, used
/// only to decide fundamental-supernode merges above. For column `k` this is
/// the union of `A`'s structural row pattern restricted to rows `>= k` and
/// the row patterns of `k`'s children in the elimination tree, matching the
/// description of `symbol::fax`'s fill rule (spec §4.1) specialized to a
/// trivial one-column panel.
fn column_row_patterns(
    graph: &Graph,
    permtab: &[usize],
    peritab: &[usize],
    treetab: &[isize],
) -> Vec<Vec<usize>> {
    let n = graph.n();
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (c, &p) in treetab.iter().enumerate() {
        if p >= 0 {
            children[p as usize].push(c);
        }
    }

    let mut patterns: Vec<Vec<usize>> = vec![Vec::new(); n];
    for k in 0..n {
        let orig_k = peritab[k];
        let mut set: std::collections::BTreeSet<usize> = graph
            .neighbors(orig_k)
            .iter()
            .map(|&orig_i| permtab[orig_i])
            .filter(|&i| i >= k)
            .collect();
        set.insert(k);
        for &child in &children[k] {
            for &r in &patterns[child] {
                if r > k {
                    set.insert(r);
                }
            }
        }
        patterns[k] = set.into_iter().collect();
    }
    patterns
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path_graph(n: usize) -> Graph {
        let mut colptr = vec![0usize; n + 1];
        let mut rowind = Vec::new();
        for i in 0..n {
            if i > 0 {
                rowind.push(i - 1);
            }
            if i + 1 < n {
                rowind.push(i + 1);
            }
            colptr[i + 1] = rowind.len();
        }
        Graph::from_csc_pattern(n, &colptr, &rowind).unwrap()
    }

    #[test]
    fn identity_order_satisfies_invariants() {
        let g = path_graph(5);
        let order = Order::identity(&g).unwrap();
        order.check_invariants().unwrap();
        assert_eq!(order.cblknbr(), 5);
    }

    #[test]
    fn n_equals_one() {
        let colptr = vec![0, 0];
        let rowind: Vec<usize> = vec![];
        let g = Graph::from_csc_pattern(1, &colptr, &rowind).unwrap();
        let order = Order::identity(&g).unwrap();
        assert_eq!(order.cblknbr(), 1);
        assert_eq!(order.treetab(), &[-1]);
    }

    #[test]
    fn fundamental_supernodes_merge_path_tail() {
        // A path graph's elimination tree (natural order) is itself a path;
        // natural-order Cholesky of a tridiagonal matrix has no fill, so no
        // two adjacent columns share a row pattern beyond the tridiagonal
        // band and no merge should happen except possibly at the very end.
        let g = path_graph(4);
        let order = Order::identity(&g).unwrap();
        let merged = order.fundamental_supernodes(&g).unwrap();
        merged.check_invariants().unwrap();
        assert!(merged.cblknbr() <= order.cblknbr());
    }

    #[test]
    fn amd_with_trailing_separates_groups() {
        let g = path_graph(5);
        let trailing = vec![1, 3];
        let order = Order::amd_with_trailing(&g, &trailing).unwrap();
        order.check_invariants().unwrap();

        let permtab = order.permtab();
        let trailing_min = trailing.iter().map(|&v| permtab[v]).min().unwrap();
        for v in 0..g.n() {
            if !trailing.contains(&v) {
                assert!(permtab[v] < trailing_min);
            }
        }
    }

    #[test]
    fn amd_with_trailing_empty_set_matches_plain_amd() {
        let g = path_graph(4);
        let order = Order::amd_with_trailing(&g, &[]).unwrap();
        order.check_invariants().unwrap();
        assert_eq!(order.cblknbr(), 4);
    }
}
