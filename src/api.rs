//! The external boundary (spec §6): `Handle<T>` owns everything a solver
//! instance needs — parameter arrays, graph, order, symbol, solver matrix,
//! scheduler, and (once factored) the coefficients — and exposes the seven
//! ordered tasks plus the Schur and persisted-symbol side APIs. The step
//! state machine (SPEC_FULL §C.1) enforces spec §6's "calling an earlier
//! task implicitly restarts the chain from that point" rule.

use tracing::{debug, info, instrument};

use crate::error::PastixError;
use crate::graph::Graph;
use crate::numeric::{self, CscMatrix, FactorReport, Factors};
use crate::order::Order;
use crate::params::{EnvOverrides, FloatKind, FloatParams, IntParams, RefinementKind, SymKind, SymbolMode};
use crate::refine::{bicgstab, cg, gmres, simple, FactoredSystem, RefineReport, SolverInterface};
use crate::scalar::Scalar;
use crate::scheduler::{Scheduler, Sequential, ThreadPool};
use crate::solve;
use crate::solver_matrix::SolverMatrix;
use crate::symbol::kass::KassConfig;
use crate::symbol::{self, persist, Symbol};

/// Which ordered task last touched the chain; used only to compute which
/// bits `invalidate_from` clears (spec §6 "invalidates later [tasks] it
/// overlaps").
#[derive(Debug, Clone, Copy)]
enum Step {
    Order,
    SymbFact,
    Analyze,
    NumFact,
    Solve,
    Refine,
}

/// Tracks which of the six chained tasks have run since the last
/// invalidating call (spec §6 task list; SPEC_FULL §C.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct StepMask(u8);

impl StepMask {
    const ORDER: u8 = 1 << 0;
    const SYMBFACT: u8 = 1 << 1;
    const ANALYZE: u8 = 1 << 2;
    const NUMFACT: u8 = 1 << 3;
    const SOLVE: u8 = 1 << 4;
    const REFINE: u8 = 1 << 5;

    fn has(self, bit: u8) -> bool {
        self.0 & bit != 0
    }

    fn set(&mut self, bit: u8) {
        self.0 |= bit;
    }

    /// Clears `step` and every task downstream of it in the chain.
    fn invalidate_from(&mut self, step: Step) {
        let mask = match step {
            Step::Order => Self::ORDER | Self::SYMBFACT | Self::ANALYZE | Self::NUMFACT | Self::SOLVE | Self::REFINE,
            Step::SymbFact => Self::SYMBFACT | Self::ANALYZE | Self::NUMFACT | Self::SOLVE | Self::REFINE,
            Step::Analyze => Self::ANALYZE | Self::NUMFACT | Self::SOLVE | Self::REFINE,
            Step::NumFact => Self::NUMFACT | Self::SOLVE | Self::REFINE,
            Step::Solve => Self::SOLVE | Self::REFINE,
            Step::Refine => Self::REFINE,
        };
        self.0 &= !mask;
    }
}

fn step_order_error(message: &'static str) -> PastixError {
    PastixError::StepOrder { message }
}

/// The dense Schur complement block retrieved after `task_numfact` in Schur
/// mode (spec §6 `get_schur`, §8 scenario 5). Column-major, `ld = n`.
#[derive(Debug, Clone)]
pub struct SchurBlock<T> {
    pub data: Vec<T>,
    pub n: usize,
}

impl<T: Scalar> SchurBlock<T> {
    pub fn at(&self, i: usize, j: usize) -> T {
        self.data[i + j * self.n]
    }
}

/// One solver instance (spec §6 "Solver handle lifecycle"). Generic over the
/// element type rather than carrying a runtime `FloatKind` tag behind a
/// dynamic-dispatch enum — see DESIGN.md's Open Question log for why this
/// simplification was chosen over the four-monomorphized-instance design
/// SPEC_FULL §C.2 sketches.
pub struct Handle<T: Scalar> {
    pub iparm: IntParams,
    pub dparm: FloatParams,
    env: EnvOverrides,
    float_kind: FloatKind,
    completed: StepMask,
    scheduler: Box<dyn Scheduler>,

    schur_unknowns: Option<Vec<usize>>,
    graph: Option<Graph>,
    order: Option<Order>,
    symbol: Option<Symbol>,
    solver: Option<SolverMatrix>,
    matrix: Option<CscMatrix<T>>,
    factors: Option<Factors<T>>,
    factor_report: Option<FactorReport>,

    /// The original right-hand side, kept only when `nrhs == 1` so
    /// `task_refine` has a `b` to compute residuals against (spec §6
    /// `task_refine(H, b, x) -> x_refined`).
    rhs_b: Option<Vec<T>>,
    rhs_x: Option<Vec<T>>,
    nrhs: usize,
}

impl<T: Scalar> Handle<T> {
    /// `init(iparm_defaults, dparm_defaults) -> Handle` (spec §6). Reads the
    /// documented environment overrides once (SPEC_FULL §A.3) and rejects
    /// Hermitian mode for a real `FloatKind` (spec §3).
    pub fn init(iparm: IntParams, dparm: FloatParams) -> Result<Self, PastixError> {
        if iparm.sym == SymKind::Hermitian && !T::IS_COMPLEX {
            return Err(PastixError::BadParameter {
                message: "Hermitian mode requires a complex FloatKind",
            });
        }

        let env = EnvOverrides::read();
        let scheduler: Box<dyn Scheduler> = if iparm.thread_nbr > 1 {
            Box::new(ThreadPool::new(iparm.thread_nbr))
        } else {
            Box::new(Sequential)
        };

        info!(thread_nbr = iparm.thread_nbr, float_kind = ?T::FLOAT_KIND, "solver handle initialized");

        Ok(Self {
            iparm,
            dparm,
            env,
            float_kind: T::FLOAT_KIND,
            completed: StepMask::default(),
            scheduler,
            schur_unknowns: None,
            graph: None,
            order: None,
            symbol: None,
            solver: None,
            matrix: None,
            factors: None,
            factor_report: None,
            rhs_b: None,
            rhs_x: None,
            nrhs: 0,
        })
    }

    pub fn float_kind(&self) -> FloatKind {
        self.float_kind
    }

    pub fn env(&self) -> EnvOverrides {
        self.env
    }

    pub fn thread_count(&self) -> usize {
        self.scheduler.thread_count()
    }

    /// Releases every owned buffer (spec §6 `finalize`). `Drop` already does
    /// this; the method exists so the task lifecycle reads the way spec §6
    /// names it.
    pub fn finalize(self) {
        debug!("solver handle finalized");
    }

    /// `set_schur_unknowns(H, indices)` (spec §6): must run before
    /// `task_order`. `indices` are original (pre-permutation) row/column
    /// indices.
    pub fn set_schur_unknowns(&mut self, indices: Vec<usize>) -> Result<(), PastixError> {
        if self.completed.has(StepMask::ORDER) {
            return Err(step_order_error("set_schur_unknowns must be called before task_order"));
        }
        self.schur_unknowns = Some(indices);
        Ok(())
    }

    /// `task_order(H, graph) -> Order` (spec §6): computes the default AMD
    /// fill-reducing permutation (`Order::amd`); a caller wanting an
    /// external ordering library may instead build an `Order` directly and
    /// is responsible for feeding it back through a future `task_symbfact`
    /// overload — out of scope here since spec §1 keeps the ordering
    /// algorithm itself an external collaborator.
    #[instrument(skip_all)]
    pub fn task_order(&mut self, graph: Graph) -> Result<&Order, PastixError> {
        let order = match &self.schur_unknowns {
            Some(indices) => Order::amd_with_trailing(&graph, indices)?,
            None => Order::amd(&graph)?,
        };
        info!(n = graph.n(), "computed fill-reducing order");

        self.graph = Some(graph);
        self.order = Some(order);
        self.completed.invalidate_from(Step::Order);
        self.completed.set(StepMask::ORDER);
        Ok(self.order.as_ref().expect("just set"))
    }

    /// `task_symbfact(H, order) -> Symbol` (spec §6, §4.1): dispatches on
    /// `iparm.symbol_mode` between `FaxGraph` (fundamental-supernode merge
    /// then direct fill) and `Kass` (ILU(k) expansion + amalgamation from
    /// the trivial per-column order `task_order` produced).
    #[instrument(skip_all)]
    pub fn task_symbfact(&mut self) -> Result<&Symbol, PastixError> {
        if !self.completed.has(StepMask::ORDER) {
            return Err(step_order_error("task_symbfact requires task_order to have run"));
        }
        let graph = self.graph.as_ref().expect("ORDER bit implies graph is set");
        let order = self.order.as_ref().expect("ORDER bit implies order is set").clone();

        let (symbol, final_order) = match self.iparm.symbol_mode {
            SymbolMode::FaxGraph => {
                let supernoded = order.fundamental_supernodes(graph)?;
                let permuted = graph.permuted(supernoded.permtab());
                let symbol = symbol::fax::build(&permuted, &supernoded)?;
                (symbol, supernoded)
            }
            SymbolMode::Kass => {
                let config = KassConfig {
                    level: self.iparm.level_of_fill,
                    amalg_cblk: self.iparm.amalg_cblk,
                    amalg_blas: self.iparm.amalg_blas,
                };
                let permuted = graph.permuted(order.permtab());
                symbol::kass::build(&permuted, &order, config)?
            }
        };

        info!(cblknbr = symbol.cblknbr(), bloknbr = symbol.bloknbr(), "symbolic factorization complete");

        self.order = Some(final_order);
        self.symbol = Some(symbol);
        self.completed.invalidate_from(Step::SymbFact);
        self.completed.set(StepMask::SYMBFACT);
        Ok(self.symbol.as_ref().expect("just set"))
    }

    /// `task_analyze(H, symbol) -> SolverMatrix` (spec §6, §4.2, §4.3): runs
    /// C3 (browtab, rustine, in-panel reordering) then builds the C4 dense
    /// layout. Calling this twice on an already-analyzed symbol is a no-op
    /// on the tables themselves (spec §8 "idempotent reanalysis") — guarded
    /// here by simply never re-running C3 on a symbol already marked
    /// analyzed.
    #[instrument(skip_all)]
    pub fn task_analyze(&mut self) -> Result<&SolverMatrix, PastixError> {
        if !self.completed.has(StepMask::SYMBFACT) {
            return Err(step_order_error("task_analyze requires task_symbfact to have run"));
        }
        let symbol = self.symbol.take().expect("SYMBFACT bit implies symbol is set");
        let analyzed = if symbol.is_analyzed() {
            symbol
        } else {
            symbol::analysis::analyze(symbol)?
        };
        let solver = SolverMatrix::build(&analyzed, self.iparm.factorization)?;

        debug!(
            coefnbr = solver.coefnbr(),
            theoretical_flops = solver.theoretical_flops(),
            "block layout built"
        );

        self.symbol = Some(analyzed);
        self.solver = Some(solver);
        self.completed.invalidate_from(Step::Analyze);
        self.completed.set(StepMask::ANALYZE);
        Ok(self.solver.as_ref().expect("just set"))
    }

    /// Resolves `schur_unknowns` (original numbering) into a panel boundary
    /// in the current `solver`, or `None` if no Schur unknowns were set.
    fn resolve_schur_cblk(&self) -> Result<Option<usize>, PastixError> {
        let Some(indices) = self.schur_unknowns.as_ref() else {
            return Ok(None);
        };
        let order = self.order.as_ref().expect("resolve_schur_cblk called after task_order");
        let solver = self.solver.as_ref().expect("resolve_schur_cblk called after task_analyze");

        let perm = order.permtab();
        let mut permuted: Vec<usize> = indices.iter().map(|&i| perm[i]).collect();
        permuted.sort_unstable();
        let Some(&start) = permuted.first() else {
            return Ok(None);
        };

        solver
            .cblktab
            .iter()
            .position(|c| c.fcolnum == start)
            .map(Some)
            .ok_or(PastixError::BadParameter {
                message: "schur unknowns do not align to a supernode boundary after permutation",
            })
    }

    /// `task_numfact(H, csc_values) -> FactoredSolver` (spec §6, §4.4):
    /// scatters `csc` and runs the block factorization. `csc` must already
    /// be expressed in the permuted numbering `task_order`/`task_symbfact`
    /// settled on.
    #[instrument(skip_all)]
    pub fn task_numfact(&mut self, csc: CscMatrix<T>) -> Result<&FactorReport, PastixError> {
        if !self.completed.has(StepMask::ANALYZE) {
            return Err(step_order_error("task_numfact requires task_analyze to have run"));
        }
        let schur_cblk = self.resolve_schur_cblk()?;
        let symbol = self.symbol.as_ref().expect("ANALYZE bit implies symbol is set");
        let solver = self.solver.as_mut().expect("ANALYZE bit implies solver is set");

        let (factors, report) = numeric::factor::factor(
            symbol,
            solver,
            &csc,
            self.iparm.factorization,
            self.dparm.eps_pivot,
            schur_cblk,
        )?;

        if report.nbpivot > self.iparm.pivot_limit {
            return Err(PastixError::FactorizationPivotLimitExceeded {
                nbpivot: report.nbpivot,
                limit: self.iparm.pivot_limit,
            });
        }

        info!(
            nbpivot = report.nbpivot,
            min_pivot_abs = report.min_pivot_abs,
            schur = report.schur_cblk.is_some(),
            "numeric factorization complete"
        );

        self.matrix = Some(csc);
        self.factors = Some(factors);
        self.factor_report = Some(report);
        self.completed.invalidate_from(Step::NumFact);
        self.completed.set(StepMask::NUMFACT);
        Ok(self.factor_report.as_ref().expect("just set"))
    }

    /// `get_schur(H) -> dense block` (spec §6, §8 scenario 5): only valid
    /// once `task_numfact` has run in Schur mode. Assembles the dense,
    /// fully-symmetrized (or, for `Lu`, the raw lower-triangle-plus-diagonal)
    /// trailing block from the untouched panels' coefficient storage.
    pub fn get_schur(&self) -> Result<SchurBlock<T>, PastixError> {
        if !self.completed.has(StepMask::NUMFACT) {
            return Err(step_order_error("get_schur requires task_numfact to have run"));
        }
        let report = self.factor_report.as_ref().expect("NUMFACT bit implies factor_report is set");
        let schur_start = report.schur_cblk.ok_or(PastixError::BadParameter {
            message: "get_schur requires schur unknowns to have been set before task_order",
        })?;
        let solver = self.solver.as_ref().expect("NUMFACT bit implies solver is set");
        let factors = self.factors.as_ref().expect("NUMFACT bit implies factors is set");

        let offset = solver.cblktab[schur_start].fcolnum;
        let n = solver.n() - offset;
        let conjugate = factors.kind() == crate::params::FactorizationKind::Ldlh;
        let mut data = vec![T::zero(); n * n];

        for m in schur_start..solver.cblknbr() {
            let cblk = solver.cblktab[m];
            let stride = cblk.stride;
            let diag_start = cblk.coefind;
            let col_base = cblk.fcolnum - offset;

            for (idx, blok) in solver.blocks_of(m).iter().enumerate() {
                let height = blok.height();
                let width = cblk.width();
                let row_base = blok.frownum - offset;
                let src_off = diag_start + blok.coefind;

                if idx == 0 {
                    // Diagonal block: only the lower triangle (i >= j) is
                    // actually populated in `lcoef`. Write each stored entry
                    // once and mirror it into its upper twin directly, rather
                    // than also writing the unpopulated upper half from
                    // `lcoef` (which would later stomp the mirrored value).
                    for j in 0..width {
                        for i in j..height {
                            let val = factors.lcoef[src_off + i + j * stride];
                            data[(row_base + i) + (col_base + j) * n] = val;
                            if i > j {
                                let mirrored = if conjugate { val.conj() } else { val };
                                data[(col_base + j) + (row_base + i) * n] = mirrored;
                            }
                        }
                    }
                } else {
                    for j in 0..width {
                        for i in 0..height {
                            let val = factors.lcoef[src_off + i + j * stride];
                            data[(row_base + i) + (col_base + j) * n] = val;
                            let mirrored = if conjugate { val.conj() } else { val };
                            data[(col_base + j) + (row_base + i) * n] = mirrored;
                        }
                    }
                }
            }
        }

        Ok(SchurBlock { data, n })
    }

    /// `task_solve(H, b, nrhs) -> x` (spec §6, §4.5): mutates `b` in place
    /// into `x` (spec §3 "C6/C7 mutate them in place"). `b` is column-major,
    /// leading dimension `n`.
    #[instrument(skip(self, b))]
    pub fn task_solve(&mut self, b: Vec<T>, nrhs: usize) -> Result<&[T], PastixError> {
        if !self.completed.has(StepMask::NUMFACT) {
            return Err(step_order_error("task_solve requires task_numfact to have run"));
        }
        let symbol = self.symbol.as_ref().expect("NUMFACT bit implies symbol is set");
        let solver = self.solver.as_ref().expect("NUMFACT bit implies solver is set");
        let factors = self.factors.as_ref().expect("NUMFACT bit implies factors is set");
        let schur_cblk = self.factor_report.as_ref().expect("NUMFACT bit implies factor_report is set").schur_cblk;

        self.rhs_b = if nrhs == 1 { Some(b.clone()) } else { None };
        let mut x = b;
        solve::solve(symbol, solver, factors, &mut x, nrhs, schur_cblk)?;
        info!(nrhs, "triangular solve complete");

        self.rhs_x = Some(x);
        self.nrhs = nrhs;
        self.completed.invalidate_from(Step::Solve);
        self.completed.set(StepMask::SOLVE);
        Ok(self.rhs_x.as_ref().expect("just set"))
    }

    /// `task_refine(H, b, x) -> x_refined` (spec §6, §4.6): only supports a
    /// single right-hand side (`nrhs == 1`), since the Krylov drivers and the
    /// `SolverInterface` they're built against operate on one vector at a
    /// time (spec §4.6's capability set takes `x`/`y` slices, not matrices).
    #[instrument(skip_all)]
    pub fn task_refine(&mut self) -> Result<RefineReport, PastixError> {
        if !self.completed.has(StepMask::SOLVE) {
            return Err(step_order_error("task_refine requires task_solve to have run"));
        }
        let b = self.rhs_b.clone().ok_or(PastixError::BadParameter {
            message: "task_refine only supports a single right-hand side (nrhs = 1)",
        })?;
        let mut x = self.rhs_x.clone().expect("SOLVE bit implies rhs_x is set");

        let symbol = self.symbol.as_ref().expect("SOLVE bit implies symbol is set");
        let solver = self.solver.as_ref().expect("SOLVE bit implies solver is set");
        let factors = self.factors.as_ref().expect("SOLVE bit implies factors is set");
        let matrix = self.matrix.as_ref().expect("SOLVE bit implies matrix is set");
        let schur_cblk = self.factor_report.as_ref().expect("SOLVE bit implies factor_report is set").schur_cblk;
        let system = FactoredSystem {
            symbol,
            solver,
            factors,
            matrix,
            schur_cblk,
        };

        let report = match self.iparm.refinement {
            RefinementKind::Gmres => {
                gmres::gmres(&system, &b, &mut x, self.iparm.gmres_im, self.iparm.itermax, self.dparm.eps_refinement)?
            }
            RefinementKind::Cg => cg::cg(&system, &b, &mut x, self.iparm.itermax, self.dparm.eps_refinement)?,
            RefinementKind::BiCgStab => {
                bicgstab::bicgstab(&system, &b, &mut x, self.iparm.itermax, self.dparm.eps_refinement)?
            }
            RefinementKind::Simple => simple::simple(&system, &b, &mut x, self.iparm.itermax, self.dparm.eps_refinement)?,
        };

        info!(
            iterations = report.iterations,
            final_relative_residual = report.final_relative_residual,
            "refinement complete"
        );

        self.rhs_x = Some(x);
        self.completed.invalidate_from(Step::Refine);
        self.completed.set(StepMask::REFINE);
        Ok(report)
    }

    /// Current solution buffer (`x` after `task_solve`, possibly further
    /// improved by `task_refine`).
    pub fn solution(&self) -> Option<&[T]> {
        self.rhs_x.as_deref()
    }

    /// `task_clean(H)` (spec §6): releases every owned buffer and resets the
    /// step state machine; the parameter arrays and scheduler are kept.
    pub fn task_clean(&mut self) {
        self.schur_unknowns = None;
        self.graph = None;
        self.order = None;
        self.symbol = None;
        self.solver = None;
        self.matrix = None;
        self.factors = None;
        self.factor_report = None;
        self.rhs_b = None;
        self.rhs_x = None;
        self.nrhs = 0;
        self.completed = StepMask::default();
        debug!("solver state cleaned");
    }

    /// Dumps the current symbol to the plain-text format of spec §6
    /// "Persisted state".
    pub fn dump_symbol(&self) -> Result<String, PastixError> {
        let symbol = self.symbol.as_ref().ok_or(step_order_error("dump_symbol requires a symbol (run task_symbfact first)"))?;
        Ok(persist::dump(symbol))
    }

    /// Reloads a symbol dumped by [`Self::dump_symbol`], checking every
    /// invariant of spec §3 (spec §6 "The loader reconstructs the symbol and
    /// checks all §3 invariants"). A successful load advances the handle as
    /// if `task_symbfact` had produced this symbol directly, but leaves
    /// `task_order`'s bit unset since no `Order` accompanies a bare dump.
    pub fn load_symbol(&mut self, text: &str) -> Result<&Symbol, PastixError> {
        let symbol = persist::load(text)?;
        self.completed.invalidate_from(Step::SymbFact);
        self.symbol = Some(symbol);
        self.completed.set(StepMask::SYMBFACT);
        Ok(self.symbol.as_ref().expect("just set"))
    }
}
