//! Log-Linear Polytope Engine
//!
//! Decides feasibility of a case's validity region
//! `{x ∈ ℝ^m : U·x + ζ > 0}` (strict) or `≥ 0` (non-strict), optionally
//! intersected with a parameter slice, and enumerates the region's vertices.
//!
//! The engine requires only the [`LpSolver`] contract; any backend matching
//! it is substitutable. The shipped backend, [`DenseSimplex`], is a two-phase
//! primal simplex with Bland's rule over the dense matrix kernel. Strictness
//! is decided by maximizing a slack shared by every boundary row: the region
//! has an interior exactly when that optimum exceeds [`crate::EPS_STRICT`].

use crate::case::DsCase;
use crate::matrix::{Matrix, MatrixError};
use crate::pool::VariablePool;
use crate::{EPS_STRICT, EPS_ZERO};

/// Outcome of one linear program.
#[derive(Debug, Clone, PartialEq)]
pub enum LpOutcome {
    /// An optimal solution was found.
    Feasible(Vec<f64>),
    /// The constraint system is empty.
    Infeasible,
    /// The objective is unbounded over the feasible set.
    Unbounded,
}

/// Abstract LP backend: maximize `c·z` subject to `A·z ≤ b`, `z ≥ 0`.
pub trait LpSolver {
    /// Solve one program; `a` is dense `rows × cols`, `b.len() == rows`,
    /// `c.len() == cols`.
    fn maximize(&self, c: &[f64], a: &Matrix, b: &[f64]) -> LpOutcome;
}

/// Verdict of a validity query. Infeasibility is a verdict, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    /// The region is non-empty (under the requested strictness).
    Valid,
    /// The region is empty.
    Invalid,
}

/// Errors surfaced by polytope queries (bad inputs, never verdicts).
#[derive(Debug, thiserror::Error)]
pub enum PolytopeError {
    /// A slice bound is missing, non-positive, or inverted.
    #[error("slice bound for {name:?}: {reason}")]
    BadSlice {
        /// The variable at fault.
        name: String,
        /// What is wrong with its bounds.
        reason: &'static str,
    },
    /// A named variable is not an independent variable of the case.
    #[error("variable {0:?} is not an independent variable of this case")]
    UnknownVariable(String),
    /// Vertex enumeration requested on a singular case (no boundaries).
    #[error("case has no boundary matrices (singular S-system)")]
    NoBoundaries,
    /// Too many free dimensions for exhaustive vertex enumeration.
    #[error("vertex enumeration over {got} dimensions requires the high-dim-vertices feature")]
    TooManyDimensions {
        /// The requested dimension count.
        got: usize,
    },
    /// Underlying matrix failure.
    #[error(transparent)]
    Matrix(#[from] MatrixError),
    /// Underlying case failure (bad evaluation point, etc.).
    #[error(transparent)]
    Case(#[from] crate::case::CaseError),
}

// ============================================================================
// Dense two-phase simplex
// ============================================================================

/// The default LP backend: two-phase primal simplex, Bland's rule.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenseSimplex;

const PIVOT_TOL: f64 = 1e-9;
const MAX_ITERATIONS: usize = 50_000;

struct Tableau {
    rows: Vec<Vec<f64>>,
    rhs: Vec<f64>,
    basis: Vec<usize>,
    num_structural: usize,
    artificial_start: usize,
}

impl Tableau {
    fn new(a: &Matrix, b: &[f64]) -> Self {
        let m = a.rows();
        let n = a.cols();
        let mut artificial_rows = Vec::new();
        for (i, &bi) in b.iter().enumerate().take(m) {
            if bi < 0.0 {
                artificial_rows.push(i);
            }
        }
        let k = artificial_rows.len();
        let total = n + m + k;
        let mut rows = vec![vec![0.0; total]; m];
        let mut rhs = vec![0.0; m];
        let mut basis = vec![0usize; m];
        let mut art = 0;
        for i in 0..m {
            let flip = if b[i] < 0.0 { -1.0 } else { 1.0 };
            for j in 0..n {
                rows[i][j] = flip * a.at(i, j);
            }
            rows[i][n + i] = flip; // slack
            rhs[i] = flip * b[i];
            if flip < 0.0 {
                rows[i][n + m + art] = 1.0;
                basis[i] = n + m + art;
                art += 1;
            } else {
                basis[i] = n + i;
            }
        }
        Tableau { rows, rhs, basis, num_structural: n, artificial_start: n + m }
    }

    fn total_cols(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    /// Run simplex iterations for the given cost vector (padded over all
    /// columns). Returns `false` when the objective is unbounded.
    fn optimize(&mut self, cost: &[f64], allow_artificial: bool) -> bool {
        for _ in 0..MAX_ITERATIONS {
            // Reduced costs r_j = c_j − c_B·T_j, entering by Bland's rule.
            let mut entering = None;
            'cols: for j in 0..self.total_cols() {
                if !allow_artificial && j >= self.artificial_start {
                    break;
                }
                if self.basis.contains(&j) {
                    continue;
                }
                let mut r = cost[j];
                for (i, &bi) in self.basis.iter().enumerate() {
                    if cost[bi] != 0.0 {
                        r -= cost[bi] * self.rows[i][j];
                    }
                }
                if r > PIVOT_TOL {
                    entering = Some(j);
                    break 'cols;
                }
            }
            let entering = match entering {
                Some(j) => j,
                None => return true, // optimal
            };
            // Ratio test, Bland tie-break on basis index.
            let mut leaving: Option<usize> = None;
            let mut best = f64::INFINITY;
            for i in 0..self.rows.len() {
                let pivot = self.rows[i][entering];
                if pivot > PIVOT_TOL {
                    let ratio = self.rhs[i] / pivot;
                    let better = ratio < best - PIVOT_TOL
                        || (ratio < best + PIVOT_TOL
                            && leaving.is_some_and(|l| self.basis[i] < self.basis[l]));
                    if better {
                        best = ratio;
                        leaving = Some(i);
                    }
                }
            }
            let leaving = match leaving {
                Some(i) => i,
                None => return false, // unbounded direction
            };
            self.pivot(leaving, entering);
        }
        tracing::warn!("simplex iteration cap reached; treating as infeasible");
        false
    }

    fn pivot(&mut self, row: usize, col: usize) {
        let pivot = self.rows[row][col];
        for j in 0..self.total_cols() {
            self.rows[row][j] /= pivot;
        }
        self.rhs[row] /= pivot;
        for i in 0..self.rows.len() {
            if i == row {
                continue;
            }
            let factor = self.rows[i][col];
            if factor == 0.0 {
                continue;
            }
            for j in 0..self.total_cols() {
                self.rows[i][j] -= factor * self.rows[row][j];
            }
            self.rhs[i] -= factor * self.rhs[row];
        }
        self.basis[row] = col;
    }

    fn objective(&self, cost: &[f64]) -> f64 {
        self.basis
            .iter()
            .enumerate()
            .map(|(i, &j)| cost[j] * self.rhs[i])
            .sum()
    }

    fn solution(&self) -> Vec<f64> {
        let mut z = vec![0.0; self.num_structural];
        for (i, &j) in self.basis.iter().enumerate() {
            if j < self.num_structural {
                z[j] = self.rhs[i];
            }
        }
        z
    }
}

impl LpSolver for DenseSimplex {
    fn maximize(&self, c: &[f64], a: &Matrix, b: &[f64]) -> LpOutcome {
        debug_assert_eq!(c.len(), a.cols());
        debug_assert_eq!(b.len(), a.rows());
        let mut tableau = Tableau::new(a, b);
        let total = tableau.total_cols();

        // Phase 1: drive the artificials to zero.
        if tableau.artificial_start < total {
            let mut phase1 = vec![0.0; total];
            for item in phase1.iter_mut().skip(tableau.artificial_start) {
                *item = -1.0;
            }
            tableau.optimize(&phase1, true);
            if tableau.objective(&phase1) < -1e-7 {
                return LpOutcome::Infeasible;
            }
        }

        // Phase 2 on the real objective; artificial columns stay out.
        let mut cost = vec![0.0; total];
        cost[..c.len()].copy_from_slice(c);
        if !tableau.optimize(&cost, false) {
            return LpOutcome::Unbounded;
        }
        LpOutcome::Feasible(tableau.solution())
    }
}

// ============================================================================
// Case validity
// ============================================================================

/// A half-space system `rows·x + constants ≥ 0` in log-independent space.
#[derive(Debug, Clone)]
struct HalfSpaces {
    a: Matrix,
    c: Vec<f64>,
}

impl HalfSpaces {
    fn from_case(case: &DsCase) -> Option<Self> {
        let u = case.u()?;
        let zeta = case.zeta()?;
        Some(HalfSpaces { a: u.clone(), c: zeta.column_vec() })
    }

    /// Feasibility over conditions instead of boundaries: the joint system
    /// `C_d·y + C_i·x + Δ ≥ 0` over free `(y, x)`.
    fn from_case_conditions(case: &DsCase) -> Result<Self, PolytopeError> {
        let a = case.cd().hstack(case.ci())?;
        Ok(HalfSpaces { a, c: case.delta().column_vec() })
    }

    fn with_slice_rows(
        mut self,
        case: &DsCase,
        lower: &VariablePool,
        upper: &VariablePool,
    ) -> Result<Self, PolytopeError> {
        let bounds = log_slice_bounds(case, lower, upper)?;
        let m = self.a.cols();
        for (j, (lo, hi)) in bounds.iter().enumerate() {
            // x_j − lo ≥ 0 and hi − x_j ≥ 0.
            let mut low_row = Matrix::zeros(1, m);
            low_row.put(0, j, 1.0);
            self.a = self.a.vstack(&low_row)?;
            self.c.push(-lo);
            let mut high_row = Matrix::zeros(1, m);
            high_row.put(0, j, -1.0);
            self.a = self.a.vstack(&high_row)?;
            self.c.push(*hi);
        }
        Ok(self)
    }

    /// Decide feasibility with the shared-slack LP. The system `A·x + c ≥ s`
    /// is encoded as `−A·(p − q) + s·1 ≤ c` over non-negative `(p, q, s)`;
    /// strict validity requires the maximal `s` to exceed [`EPS_STRICT`].
    fn feasible(&self, solver: &dyn LpSolver, strict: bool) -> Validity {
        let rows = self.a.rows();
        if rows == 0 {
            return Validity::Valid;
        }
        let m = self.a.cols();
        let cols = 2 * m + 1;
        let mut a = Matrix::zeros(rows + 1, cols);
        let mut b = vec![0.0; rows + 1];
        for i in 0..rows {
            for j in 0..m {
                a.put(i, j, -self.a.at(i, j));
                a.put(i, m + j, self.a.at(i, j));
            }
            a.put(i, 2 * m, 1.0);
            b[i] = self.c[i];
        }
        // Cap the shared slack so the objective stays bounded.
        a.put(rows, 2 * m, 1.0);
        b[rows] = 1.0;
        let mut objective = vec![0.0; cols];
        objective[2 * m] = 1.0;
        match solver.maximize(&objective, &a, &b) {
            LpOutcome::Feasible(z) => {
                let slack = z[2 * m];
                let ok = if strict { slack > EPS_STRICT } else { slack >= 0.0 };
                if ok {
                    Validity::Valid
                } else {
                    Validity::Invalid
                }
            }
            LpOutcome::Infeasible => Validity::Invalid,
            LpOutcome::Unbounded => {
                tracing::warn!("LP reported unbounded on a slack-capped program; treating as infeasible");
                Validity::Invalid
            }
        }
    }
}

fn log_slice_bounds(
    case: &DsCase,
    lower: &VariablePool,
    upper: &VariablePool,
) -> Result<Vec<(f64, f64)>, PolytopeError> {
    let xi = case.ssystem().xi();
    let mut out = Vec::with_capacity(xi.len());
    for name in xi.names() {
        let lo = lower.value_of(name).map_err(|_| PolytopeError::BadSlice {
            name: name.to_string(),
            reason: "missing lower bound",
        })?;
        let hi = upper.value_of(name).map_err(|_| PolytopeError::BadSlice {
            name: name.to_string(),
            reason: "missing upper bound",
        })?;
        for value in [lo, hi] {
            if !(value.is_finite() && value > 0.0) {
                return Err(PolytopeError::BadSlice {
                    name: name.to_string(),
                    reason: "bounds must be strictly positive and finite",
                });
            }
        }
        if lo > hi {
            return Err(PolytopeError::BadSlice {
                name: name.to_string(),
                reason: "lower bound exceeds upper bound",
            });
        }
        out.push((lo.log10(), hi.log10()));
    }
    Ok(out)
}

/// Whether the case's validity region is non-empty. Singular cases have no
/// boundaries and are never valid here; they belong to the cyclical resolver.
pub fn is_valid(case: &DsCase, strict: bool) -> Validity {
    is_valid_with(case, strict, &DenseSimplex)
}

/// [`is_valid`] against a caller-supplied LP backend.
pub fn is_valid_with(case: &DsCase, strict: bool, solver: &dyn LpSolver) -> Validity {
    match HalfSpaces::from_case(case) {
        Some(system) => system.feasible(solver, strict),
        None => Validity::Invalid,
    }
}

/// Whether the case's raw dominance conditions admit any `(X_d, X_i)` point.
/// This is the gate the cyclical resolver uses on singular cases, where no
/// steady-state substitution is available.
pub fn conditions_are_feasible(case: &DsCase) -> Result<Validity, PolytopeError> {
    Ok(HalfSpaces::from_case_conditions(case)?.feasible(&DenseSimplex, true))
}

/// Substitute a linear-space point into the boundaries and check signs.
/// Singular cases have no boundaries and answer invalid; a malformed point
/// is an error, not a verdict.
pub fn is_valid_at_point(
    case: &DsCase,
    point: &VariablePool,
    strict: bool,
) -> Result<Validity, PolytopeError> {
    if !case.has_boundaries() {
        return Ok(Validity::Invalid);
    }
    let values = case.boundaries_at_point(point)?;
    for i in 0..values.rows() {
        let v = values.at(i, 0);
        let ok = if strict { v > 0.0 } else { v >= 0.0 };
        if !ok {
            return Ok(Validity::Invalid);
        }
    }
    Ok(Validity::Valid)
}

/// Feasibility restricted to a parameter slice (linear-space bounds on every
/// independent variable).
pub fn is_valid_for_slice(
    case: &DsCase,
    lower: &VariablePool,
    upper: &VariablePool,
    strict: bool,
) -> Result<Validity, PolytopeError> {
    let system = match HalfSpaces::from_case(case) {
        Some(system) => system,
        None => return Ok(Validity::Invalid),
    };
    Ok(system
        .with_slice_rows(case, lower, upper)?
        .feasible(&DenseSimplex, strict))
}

// ============================================================================
// Vertex enumeration
// ============================================================================

#[cfg(not(feature = "high-dim-vertices"))]
const MAX_VERTEX_DIMS: usize = 3;

/// Enumerate the vertices of the validity polytope restricted to a slice, in
/// the subspace of the named variables. Unnamed independent variables are
/// fixed at their slice midpoints in log space.
///
/// Two-dimensional results are ordered counter-clockwise starting from the
/// right-most vertex.
pub fn vertices_for_slice(
    case: &DsCase,
    lower: &VariablePool,
    upper: &VariablePool,
    variables: &[&str],
) -> Result<Vec<Vec<f64>>, PolytopeError> {
    let u = case.u().ok_or(PolytopeError::NoBoundaries)?;
    let zeta = case.zeta().ok_or(PolytopeError::NoBoundaries)?;
    let d = variables.len();
    #[cfg(not(feature = "high-dim-vertices"))]
    if d > MAX_VERTEX_DIMS {
        return Err(PolytopeError::TooManyDimensions { got: d });
    }

    let xi = case.ssystem().xi();
    let mut free_cols = Vec::with_capacity(d);
    for name in variables {
        free_cols.push(
            xi.index_of(name)
                .map_err(|_| PolytopeError::UnknownVariable(name.to_string()))?,
        );
    }
    let bounds = log_slice_bounds(case, lower, upper)?;

    // Project: fixed variables at slice midpoints fold into the constants.
    let mut rows: Vec<(Vec<f64>, f64)> = Vec::new();
    for i in 0..u.rows() {
        let mut coeff = vec![0.0; d];
        let mut constant = zeta.at(i, 0);
        for j in 0..u.cols() {
            match free_cols.iter().position(|&c| c == j) {
                Some(slot) => coeff[slot] = u.at(i, j),
                None => {
                    let (lo, hi) = bounds[j];
                    constant += u.at(i, j) * 0.5 * (lo + hi);
                }
            }
        }
        rows.push((coeff, constant));
    }
    // Slice box rows for the free variables.
    for (slot, &col) in free_cols.iter().enumerate() {
        let (lo, hi) = bounds[col];
        let mut low = vec![0.0; d];
        low[slot] = 1.0;
        rows.push((low, -lo));
        let mut high = vec![0.0; d];
        high[slot] = -1.0;
        rows.push((high, hi));
    }

    // Active-set sweep: every d-subset of rows proposes an intersection.
    let mut vertices: Vec<Vec<f64>> = Vec::new();
    let mut subset = vec![0usize; d];
    enumerate_subsets(rows.len(), d, &mut subset, 0, 0, &mut |chosen| {
        let a = Matrix::from_fn(d, d, |i, j| rows[chosen[i]].0[j]);
        let b = Matrix::from_fn(d, 1, |i, _| -rows[chosen[i]].1);
        let solution = match a.inverse() {
            Some(inv) => inv.mul(&b).expect("shapes agree"),
            None => return,
        };
        let point: Vec<f64> = (0..d).map(|i| solution.at(i, 0)).collect();
        let feasible = rows.iter().all(|(coeff, constant)| {
            let value: f64 =
                coeff.iter().zip(&point).map(|(c, x)| c * x).sum::<f64>() + constant;
            value >= -1e-9
        });
        if !feasible {
            return;
        }
        let duplicate = vertices.iter().any(|existing| {
            existing
                .iter()
                .zip(&point)
                .all(|(a, b)| (a - b).abs() < 1e-9)
        });
        if !duplicate {
            vertices.push(point);
        }
    });

    if d == 2 {
        order_counter_clockwise(&mut vertices);
    }
    Ok(vertices)
}

fn enumerate_subsets<F: FnMut(&[usize])>(
    n: usize,
    d: usize,
    subset: &mut Vec<usize>,
    depth: usize,
    start: usize,
    visit: &mut F,
) {
    if depth == d {
        visit(subset);
        return;
    }
    for i in start..n {
        subset[depth] = i;
        enumerate_subsets(n, d, subset, depth + 1, i + 1, visit);
    }
}

/// Order 2-D vertices counter-clockwise starting from the right-most one.
fn order_counter_clockwise(vertices: &mut [Vec<f64>]) {
    if vertices.len() < 2 {
        return;
    }
    let cx = vertices.iter().map(|v| v[0]).sum::<f64>() / vertices.len() as f64;
    let cy = vertices.iter().map(|v| v[1]).sum::<f64>() / vertices.len() as f64;
    vertices.sort_by(|a, b| {
        let aa = (a[1] - cy).atan2(a[0] - cx);
        let bb = (b[1] - cy).atan2(b[0] - cx);
        aa.partial_cmp(&bb).expect("finite angles")
    });
    // Rotate so the right-most vertex (ties: lowest) leads.
    let mut start = 0;
    for (i, v) in vertices.iter().enumerate() {
        let best = &vertices[start];
        if v[0] > best[0] + EPS_ZERO
            || ((v[0] - best[0]).abs() <= EPS_ZERO && v[1] < best[1])
        {
            start = i;
        }
    }
    vertices.rotate_left(start);
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::DsCase;
    use crate::gma::Gma;
    use crate::Endianness;

    fn loop_case(signature: &[usize]) -> DsCase {
        let gma =
            Gma::from_strings(&["x1. = a + b*x1*x2 - c*x1", "x2. = c*x1 - x2"]).unwrap();
        DsCase::from_gma(&gma, signature, None, Endianness::Big).unwrap()
    }

    #[test]
    fn simplex_solves_a_known_program() {
        // max x + y s.t. x ≤ 2, y ≤ 3, x + y ≤ 4 → optimum 4.
        let a = Matrix::from_rows(&[
            vec![1.0, 0.0],
            vec![0.0, 1.0],
            vec![1.0, 1.0],
        ])
        .unwrap();
        let b = [2.0, 3.0, 4.0];
        match DenseSimplex.maximize(&[1.0, 1.0], &a, &b) {
            LpOutcome::Feasible(z) => {
                assert!((z[0] + z[1] - 4.0).abs() < 1e-9);
            }
            other => panic!("expected feasible, got {other:?}"),
        }
    }

    #[test]
    fn simplex_detects_infeasibility() {
        // x ≤ −1 with x ≥ 0 is empty.
        let a = Matrix::from_rows(&[vec![1.0]]).unwrap();
        assert_eq!(DenseSimplex.maximize(&[0.0], &a, &[-1.0]), LpOutcome::Infeasible);
    }

    #[test]
    fn simplex_detects_unboundedness() {
        // max x s.t. −x ≤ 1.
        let a = Matrix::from_rows(&[vec![-1.0]]).unwrap();
        assert_eq!(DenseSimplex.maximize(&[1.0], &a, &[1.0]), LpOutcome::Unbounded);
    }

    #[test]
    fn negative_rhs_needs_phase_one() {
        // x ≥ 2 encoded as −x ≤ −2; max −x → optimum at x = 2.
        let a = Matrix::from_rows(&[vec![-1.0]]).unwrap();
        match DenseSimplex.maximize(&[-1.0], &a, &[-2.0]) {
            LpOutcome::Feasible(z) => assert!((z[0] - 2.0).abs() < 1e-9),
            other => panic!("expected feasible, got {other:?}"),
        }
    }

    #[test]
    fn dominant_constant_case_is_valid() {
        // Case (1,1,1,1): "a dominates b*x1*x2" is satisfiable (small b).
        let case = loop_case(&[1, 1, 1, 1]);
        assert_eq!(is_valid(&case, true), Validity::Valid);
        assert_eq!(is_valid(&case, false), Validity::Valid);
        // The backend hook accepts any solver matching the contract.
        assert_eq!(is_valid_with(&case, true, &DenseSimplex), Validity::Valid);
    }

    #[test]
    fn point_tests_agree_with_region() {
        let case = loop_case(&[1, 1, 1, 1]);
        let inside = VariablePool::from_pairs([("a", 1.0), ("b", 1e-4), ("c", 1.0)]).unwrap();
        let outside = VariablePool::from_pairs([("a", 1.0), ("b", 1e4), ("c", 1.0)]).unwrap();
        assert_eq!(is_valid_at_point(&case, &inside, true).unwrap(), Validity::Valid);
        assert_eq!(is_valid_at_point(&case, &outside, true).unwrap(), Validity::Invalid);
    }

    #[test]
    fn scenario_d_forced_empty_region() {
        // A constraint that contradicts itself empties the region: a > 10·a.
        let mut case = loop_case(&[1, 1, 1, 1]);
        case.add_constraints(&["a > 10*a"]).unwrap();
        assert_eq!(is_valid(&case, false), Validity::Invalid);
        assert_eq!(is_valid(&case, true), Validity::Invalid);
    }

    #[test]
    fn slice_restriction_can_invalidate() {
        let case = loop_case(&[1, 1, 1, 1]);
        // Inside the b-small region the case is valid...
        let lower = VariablePool::from_pairs([("a", 0.5), ("b", 1e-6), ("c", 0.5)]).unwrap();
        let upper = VariablePool::from_pairs([("a", 2.0), ("b", 1e-3), ("c", 2.0)]).unwrap();
        assert_eq!(
            is_valid_for_slice(&case, &lower, &upper, true).unwrap(),
            Validity::Valid
        );
        // ...but forcing b huge while pinning a and c kills it.
        let lower = VariablePool::from_pairs([("a", 1.0), ("b", 1e6), ("c", 1.0)]).unwrap();
        let upper = VariablePool::from_pairs([("a", 1.0), ("b", 1e9), ("c", 1.0)]).unwrap();
        assert_eq!(
            is_valid_for_slice(&case, &lower, &upper, true).unwrap(),
            Validity::Invalid
        );
    }

    #[test]
    fn bad_slices_are_rejected() {
        let case = loop_case(&[1, 1, 1, 1]);
        let lower = VariablePool::from_pairs([("a", 1.0), ("b", 1.0)]).unwrap();
        let upper = VariablePool::from_pairs([("a", 2.0), ("b", 2.0), ("c", 2.0)]).unwrap();
        assert!(matches!(
            is_valid_for_slice(&case, &lower, &upper, true),
            Err(PolytopeError::BadSlice { .. })
        ));
        let lower =
            VariablePool::from_pairs([("a", -1.0), ("b", 1.0), ("c", 1.0)]).unwrap();
        let upper = VariablePool::from_pairs([("a", 2.0), ("b", 2.0), ("c", 2.0)]).unwrap();
        assert!(matches!(
            is_valid_for_slice(&case, &lower, &upper, true),
            Err(PolytopeError::BadSlice { .. })
        ));
    }

    #[test]
    fn two_dimensional_vertices_are_ccw_from_rightmost() {
        let case = loop_case(&[1, 1, 1, 1]);
        // Slice: a, c free in [0.1, 10]; b pinned tiny so the dominance row
        // is slack everywhere and the region is the full box.
        let lower =
            VariablePool::from_pairs([("a", 0.1), ("b", 1e-8), ("c", 0.1)]).unwrap();
        let upper =
            VariablePool::from_pairs([("a", 10.0), ("b", 1e-8), ("c", 10.0)]).unwrap();
        let vertices = vertices_for_slice(&case, &lower, &upper, &["a", "c"]).unwrap();
        assert_eq!(vertices.len(), 4);
        // Right-most first (log10 coordinates: corners at ±1).
        assert!((vertices[0][0] - 1.0).abs() < 1e-6);
        // Counter-clockwise: signed area is positive.
        let mut area = 0.0;
        for i in 0..vertices.len() {
            let j = (i + 1) % vertices.len();
            area += vertices[i][0] * vertices[j][1] - vertices[j][0] * vertices[i][1];
        }
        assert!(area > 0.0);
    }

    #[test]
    fn singular_case_has_no_vertices_and_is_invalid() {
        let gma = Gma::from_strings(&[
            "x1. = k21*x2 - k12*x1",
            "x2. = k12*x1 - k21*x2",
        ])
        .unwrap();
        let case = DsCase::from_gma(&gma, &[1, 1, 1, 1], None, Endianness::Big).unwrap();
        assert!(case.is_singular());
        assert_eq!(is_valid(&case, false), Validity::Invalid);
        let lower = VariablePool::from_pairs([("k21", 0.1), ("k12", 0.1)]).unwrap();
        let upper = VariablePool::from_pairs([("k21", 10.0), ("k12", 10.0)]).unwrap();
        assert!(matches!(
            vertices_for_slice(&case, &lower, &upper, &["k21", "k12"]),
            Err(PolytopeError::NoBoundaries)
        ));
    }
}
