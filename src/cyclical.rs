//! Cyclical-Case Resolution
//!
//! A case whose chosen dominant terms form a closed cycle in the influence
//! graph has a singular `A_d`: the cycle's net flux cancels and the steady
//! state is determined only up to the cycle total. Such a case is not empty;
//! it is refined by a **child design space** built from a reduced, well-posed
//! equation set:
//!
//! 1. The left nullspace of `A_d` identifies the cycle equations; a nullspace
//!    column whose nonzero entries disagree is not a genuine cycle and the
//!    case is discarded.
//! 2. The left nullspace of the cycle-restricted term matrix `[G; H]` yields
//!    per-equation weights (*coefficients of interest*) that balance the
//!    reduced system; a zero weight means the cycle cannot be balanced and
//!    the case is empty.
//! 3. One cycle equation becomes **primary**: its rewritten ODE carries the
//!    weighted sum of every *non-chosen* flux in the cycle. The remaining
//!    **secondary** equations become algebraic, solved in closed form from
//!    the partitioned system (non-primary block inverted).
//! 4. The rewritten equations are lowered again and wrapped in a derived-mode
//!    design space that inherits the case's accumulated conditions; its own
//!    singular cases resolve recursively.

use rustc_hash::FxHashMap;

use crate::case::DsCase;
use crate::designspace::DesignSpace;
use crate::expr::{Expr, RelOp};
use crate::gma::TermSign;
use crate::matrix::Matrix;
use crate::pool::VariablePool;
use crate::{EPS_SINGULAR, EPS_ZERO, SIG_FIGURES};

/// A singular case together with the design space that resolves it.
#[derive(Debug, Clone)]
pub struct CyclicalCase {
    original: DsCase,
    internal: DesignSpace,
    cycle_fluxes: FxHashMap<String, String>,
}

impl CyclicalCase {
    /// Resolve a singular, condition-feasible case of `parent` into a child
    /// design space. Returns `None` when the case is not a genuine cycle or
    /// the cycle cannot be balanced (the case is then empty).
    pub(crate) fn resolve(parent: &DesignSpace, case: &DsCase) -> Option<CyclicalCase> {
        if !case.is_singular() {
            return None;
        }
        let cycles = problematic_equations(case)?;
        let weights = coefficients_of_interest(case, &problematic_terms(case, &cycles)?)?;
        let primaries: Vec<usize> = cycles.iter().map(|members| members[0]).collect();
        let solution = partitioned_solution(case, &primaries)?;

        // Rewrite the equation set: every non-cycle equation survives
        // verbatim, each cycle contributes one primary ODE and closed-form
        // secondary equations.
        let gma = parent.gma();
        let mut equations = gma.equations();
        let mut cycle_fluxes = FxHashMap::default();
        for (c, members) in cycles.iter().enumerate() {
            let primary = members[0];
            equations[primary] = primary_equation(parent, case, members, &weights[c])?;
            for &secondary in &members[1..] {
                equations[secondary] =
                    secondary_equation(case, secondary, &primaries, &solution)?;
                let secondary_name = gma.xd().name_at(secondary)?.to_string();
                let primary_name = gma.xd().name_at(primary)?.to_string();
                cycle_fluxes.insert(secondary_name, primary_name);
            }
        }

        let internal = DesignSpace::derived(
            equations,
            gma,
            (case.cd().clone(), case.ci().clone(), case.delta().clone()),
            case.identifier().to_string(),
            parent.depth() + 1,
        )
        .map_err(|err| {
            tracing::warn!(case = case.identifier(), %err, "cycle rewrite failed to lower");
            err
        })
        .ok()?;
        internal.calculate_cyclical_cases();

        Some(CyclicalCase {
            original: case.clone(),
            internal,
            cycle_fluxes,
        })
    }

    /// The singular case this resolution refines.
    pub fn original_case(&self) -> &DsCase {
        &self.original
    }

    /// The derived design space whose cases resolve the cycle.
    pub fn internal(&self) -> &DesignSpace {
        &self.internal
    }

    /// Map from each secondary cycle variable to its cycle's primary.
    pub fn cycle_fluxes(&self) -> &FxHashMap<String, String> {
        &self.cycle_fluxes
    }

    /// Number of subcases in the internal design space.
    pub fn number_of_subcases(&self) -> usize {
        self.internal.number_of_cases()
    }

    /// A cyclical case is valid when any of its subcases is.
    pub fn is_valid(&self, strict: bool) -> bool {
        !self.internal.valid_case_numbers(strict).is_empty()
    }

    /// Validity restricted to a parameter slice, resolving nested cycles.
    pub fn is_valid_for_slice(
        &self,
        lower: &VariablePool,
        upper: &VariablePool,
        strict: bool,
    ) -> bool {
        matches!(
            self.internal.valid_cases_for_slice(lower, upper, strict),
            Ok(cases) if !cases.is_empty()
        )
    }

    /// The valid subcases (strictly valid ones resolve the original regime).
    pub fn valid_subcases(&self, strict: bool) -> Vec<DsCase> {
        self.internal.valid_cases(strict)
    }
}

// ============================================================================
// Cycle identification
// ============================================================================

/// The cycles of a singular case: each is the ascending list of equation
/// indices whose left-nullspace entries are equal. `None` when `A_d` has no
/// left nullspace or a column mixes unequal weights (not a genuine cycle).
pub fn problematic_equations(case: &DsCase) -> Option<Vec<Vec<usize>>> {
    if !case.is_singular() {
        return None;
    }
    let a_d = case.ssystem().a_d();
    // Echelon-reduce the nullspace basis so each combination row is
    // deterministic; each row is one candidate cycle.
    let mut combos = a_d.left_nullspace()?.transpose().reduced_row_echelon();
    combos.round_to_significant_figures(SIG_FIGURES);
    let mut cycles = Vec::with_capacity(combos.rows());
    for row in 0..combos.rows() {
        let mut members = Vec::new();
        let mut first: Option<f64> = None;
        for col in 0..combos.cols() {
            let value = combos.at(row, col);
            if value.abs() < EPS_SINGULAR {
                continue;
            }
            members.push(col);
            match first {
                None => first = Some(value),
                Some(reference) => {
                    if (value - reference).abs() > 1e-9 * reference.abs().max(1.0) {
                        tracing::debug!(
                            case = case.identifier(),
                            "nullspace combination mixes unequal weights; not a genuine cycle"
                        );
                        return None;
                    }
                }
            }
        }
        if members.is_empty() {
            return None;
        }
        cycles.push(members);
    }
    Some(cycles)
}

/// Per-cycle coefficient matrices derived from the cycle-restricted term
/// matrix `[G; H]`: the rows that participate in a cancelling combination
/// pick up `+α` (source side) and `−β` (sink side).
fn problematic_terms(case: &DsCase, cycles: &[Vec<usize>]) -> Option<Vec<Matrix>> {
    let ssys = case.ssystem();
    let g = ssys.g_full();
    let h = ssys.h_full();
    let mut out = Vec::with_capacity(cycles.len());
    for members in cycles {
        let g_sub = g.select_rows(members).ok()?;
        let h_sub = h.select_rows(members).ok()?;
        let term_matrix = g_sub.vstack(&h_sub).ok()?;
        let combos = term_matrix.left_nullspace()?.transpose().reduced_row_echelon();
        let c = members.len();
        let mut coefficients = Matrix::zeros(c, combos.rows());
        for k in 0..combos.rows() {
            for j in 0..2 * c {
                if combos.at(k, j).abs() <= EPS_SINGULAR {
                    continue;
                }
                if j < c {
                    coefficients.put(j, k, ssys.alpha().at(members[j], 0));
                } else {
                    let row = j - c;
                    let value = coefficients.at(row, k) - ssys.beta().at(members[row], 0);
                    coefficients.put(row, k, value);
                }
            }
        }
        out.push(coefficients);
    }
    Some(out)
}

/// Per-cycle weight vectors (one weight per cycle equation, primary first).
/// `None` when any cycle row carries zero total weight: the cycle cannot be
/// balanced and the case is empty.
fn coefficients_of_interest(case: &DsCase, terms: &[Matrix]) -> Option<Vec<Matrix>> {
    let mut out = Vec::with_capacity(terms.len());
    for matrix in terms {
        let mut combos = matrix.left_nullspace()?.transpose().reduced_row_echelon();
        combos.round_to_significant_figures(SIG_FIGURES);
        // Normalize each combination by its smallest-magnitude entry.
        for k in 0..combos.rows() {
            let mut min = f64::INFINITY;
            for j in 0..combos.cols() {
                let value = combos.at(k, j);
                if value != 0.0 && value.abs() <= min.abs() {
                    min = value;
                }
            }
            if min.is_finite() {
                for j in 0..combos.cols() {
                    let value = combos.at(k, j);
                    if value != 0.0 {
                        combos.put(k, j, value / min);
                    }
                }
            }
        }
        let mut weights = Matrix::zeros(combos.cols(), 1);
        for j in 0..combos.cols() {
            let total: f64 = (0..combos.rows()).map(|k| combos.at(k, j).abs()).sum();
            if total == 0.0 {
                tracing::debug!(
                    case = case.identifier(),
                    "cycle cannot be balanced (zero weight row); case is empty"
                );
                return None;
            }
            weights.put(j, 0, total);
        }
        out.push(weights);
    }
    Some(out)
}

// ============================================================================
// Partitioned closed-form solution
// ============================================================================

struct PartitionedSolution {
    /// `M_n·A_In`: log-gains of the non-primary block wrt independents.
    li: Matrix,
    /// `M_n·A_Dc`: log-gains wrt the primary cycle variables.
    lc: Matrix,
    /// `M_n·B_n`: constant offsets.
    mbn: Matrix,
    /// Ascending equation indices of the non-primary block.
    non_primary: Vec<usize>,
}

/// Solve the non-primary block in closed form as a function of the primary
/// cycle variables: with rows/columns of the primaries removed,
/// `y_n = M_n·B_n − M_n·A_Dc·y_c − M_n·A_In·x`.
fn partitioned_solution(case: &DsCase, primaries: &[usize]) -> Option<PartitionedSolution> {
    let ssys = case.ssystem();
    let a_d = ssys.a_d();
    let a_dn = a_d.exclude_rows(primaries).ok()?.exclude_cols(primaries).ok()?;
    let a_dc = a_d.exclude_rows(primaries).ok()?.select_cols(primaries).ok()?;
    let a_in = ssys.a_i().exclude_rows(primaries).ok()?;
    let b_n = ssys.b().exclude_rows(primaries).ok()?;
    let m_n = match a_dn.inverse() {
        Some(inverse) => inverse,
        None => {
            tracing::debug!(
                case = case.identifier(),
                "non-primary block is itself singular; case discarded"
            );
            return None;
        }
    };
    let non_primary = (0..ssys.num_equations())
        .filter(|i| !primaries.contains(i))
        .collect();
    Some(PartitionedSolution {
        li: m_n.mul(&a_in).ok()?,
        lc: m_n.mul(&a_dc).ok()?,
        mbn: m_n.mul(&b_n).ok()?,
        non_primary,
    })
}

// ============================================================================
// Equation rewriting
// ============================================================================

/// The rewritten ODE for a cycle's primary variable: the chosen fluxes cancel
/// around the cycle, so the pool turns over through the weighted sum of every
/// non-chosen flux of every cycle member.
fn primary_equation(
    parent: &DesignSpace,
    case: &DsCase,
    members: &[usize],
    weights: &Matrix,
) -> Option<Expr> {
    let gma = parent.gma();
    let denominator = weights.at(0, 0);
    let mut rhs = Expr::Constant(0.0);
    let mut count = 0usize;
    for (row, &member) in members.iter().enumerate() {
        let ratio = weights.at(row, 0) / denominator;
        if ratio == 0.0 {
            continue;
        }
        for sign in [TermSign::Positive, TermSign::Negative] {
            let slot = 2 * member + sign.sig_offset();
            let chosen = case.signature()[slot];
            for term in 1..=gma.signature()[slot] {
                if term == chosen {
                    continue;
                }
                let flux = gma.signed_term_expr(sign, member, term - 1);
                rhs = Expr::add(rhs, Expr::mul(flux, Expr::Constant(ratio)));
                count += 1;
            }
        }
    }
    if count == 0 {
        tracing::debug!(
            case = case.identifier(),
            "cycle has no non-chosen fluxes; case discarded"
        );
        return None;
    }
    let primary_name = gma.xd().name_at(members[0])?;
    Some(Expr::relation(
        RelOp::Equal,
        Expr::time_derivative(Expr::var(primary_name)),
        rhs,
    ))
}

/// The closed-form algebraic equation for one secondary cycle variable:
/// `s = 10^(M_n·B_n) · Π X_i^(−L_I) · Π y_c^(−L_c)`.
fn secondary_equation(
    case: &DsCase,
    secondary: usize,
    primaries: &[usize],
    solution: &PartitionedSolution,
) -> Option<Expr> {
    let ssys = case.ssystem();
    let idx = solution.non_primary.iter().position(|&i| i == secondary)?;
    let mut rhs = Expr::Constant(10f64.powf(solution.mbn.at(idx, 0)));
    for (j, name) in ssys.xi().names().enumerate() {
        let exponent = -solution.li.at(idx, j);
        if exponent.abs() > EPS_ZERO {
            rhs = Expr::mul(rhs, Expr::pow(Expr::var(name), Expr::Constant(exponent)));
        }
    }
    for (j, &primary) in primaries.iter().enumerate() {
        let exponent = -solution.lc.at(idx, j);
        if exponent.abs() > EPS_ZERO {
            let name = ssys.xd().name_at(primary)?;
            rhs = Expr::mul(rhs, Expr::pow(Expr::var(name), Expr::Constant(exponent)));
        }
    }
    let name = ssys.xd().name_at(secondary)?;
    Some(Expr::relation(RelOp::Equal, Expr::var(name), rhs))
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange_loop() -> DesignSpace {
        // x1 ⇄ x2 with inflow a and outflow g·x2: choosing the exchange
        // fluxes as dominant closes a two-equation cycle.
        DesignSpace::from_strings(&[
            "x1. = a + k21*x2 - k12*x1",
            "x2. = k12*x1 - k21*x2 - g*x2",
        ])
        .unwrap()
    }

    #[test]
    fn cycle_detection_soundness() {
        let ds = exchange_loop();
        // Signature (2,1,1,1): x1 fed by k21*x2, drained by k12*x1; x2 fed by
        // k12*x1, drained by k21*x2. The exchange cancels: singular.
        let singular = ds.case_with_signature(&[2, 1, 1, 1]).unwrap();
        assert!(singular.is_singular());
        let cycles = problematic_equations(&singular).expect("genuine cycle");
        assert_eq!(cycles, vec![vec![0, 1]]);

        // A well-posed case yields no cycles.
        let regular = ds.case_with_signature(&[1, 1, 1, 2]).unwrap();
        assert!(!regular.is_singular());
        assert!(problematic_equations(&regular).is_none());
    }

    #[test]
    fn resolution_produces_well_posed_child() {
        let ds = exchange_loop();
        let singular = ds.case_with_signature(&[2, 1, 1, 1]).unwrap();
        let cyclical = CyclicalCase::resolve(&ds, &singular).expect("resolvable cycle");

        let internal = cyclical.internal();
        assert_eq!(internal.gma().num_equations(), 2);
        // x2 became the secondary algebraic variable.
        assert_eq!(cyclical.cycle_fluxes().get("x2").map(String::as_str), Some("x1"));
        assert!(internal.gma().xd_a().contains("x2"));
        // The child inherits the parent case's dominance conditions.
        let child_case = internal.case_with_case_number(1).unwrap();
        assert!(child_case.num_conditions() >= singular.num_conditions());
        // The resolved regime is non-empty: some subcase is valid.
        assert!(cyclical.is_valid(true));
    }

    #[test]
    fn resolved_subcases_have_steady_states() {
        let ds = exchange_loop();
        let singular = ds.case_with_signature(&[2, 1, 1, 1]).unwrap();
        let cyclical = CyclicalCase::resolve(&ds, &singular).unwrap();
        for subcase in cyclical.valid_subcases(true) {
            assert!(!subcase.is_singular());
            // In the cycle regime the total pool drains through g·x2: the
            // steady state of the primary variable is finite and positive.
            let xi0 = VariablePool::from_pairs([
                ("a", 1.0),
                ("k12", 10.0),
                ("k21", 10.0),
                ("g", 0.1),
            ])
            .unwrap();
            let y = subcase.ssystem().steady_state(&xi0);
            if let Ok(y) = y {
                for i in 0..y.rows() {
                    assert!(y.at(i, 0).is_finite() && y.at(i, 0) > 0.0);
                }
            }
        }
    }

    #[test]
    fn non_singular_case_is_not_resolvable() {
        let ds = exchange_loop();
        let regular = ds.case_with_signature(&[1, 1, 1, 2]).unwrap();
        assert!(CyclicalCase::resolve(&ds, &regular).is_none());
    }
}
