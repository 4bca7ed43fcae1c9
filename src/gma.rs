//! GMA Lowering
//!
//! Decomposes a set of parsed kinetic equations into the algebraic objects
//! the rest of the engine operates on: the coefficient matrices `α`, `β`,
//! the per-equation exponent tensors `G_d`, `G_i`, `H_d`, `H_i` partitioned
//! over (dependent, independent) variables, the four variable pools, and the
//! per-equation signature `σ` (positive-term count, negative-term count).
//!
//! ## Lowering pipeline
//!
//! 1. **LHS classification**: `v. = …` marks `v` dynamic (`X_d_t`); `v = …`
//!    marks `v` algebraic (`X_d_a`) and the equation is rewritten
//!    `0 = RHS − LHS` so the algebraic variable enters as a negative term.
//! 2. **Term extraction** walks the canonical RHS sum; each monomial's
//!    leading constant is its signed coefficient and every remaining factor
//!    must be `variable` or `variable ^ constant`.
//! 3. **X_i derivation**: every RHS variable not dependent, in first
//!    appearance order (or a caller-fixed pool for derived systems).
//! 4. **Tensor population** into slots `[equation][term][variable]`.
//! 5. **Identical-term collapse**: within one equation and sign, terms with
//!    elementwise-equal exponent rows merge by summing coefficients; zeroed
//!    slots swap to the tail and `σ` decrements. This guarantees downstream
//!    condition matrices contain no tautological zero rows.

use std::sync::Arc;

use crate::expr::{Expr, ExprError, RelOp};
use crate::matrix::Matrix;
use crate::parse::{parse_equation, ParseError};
use crate::pool::{PoolError, VariablePool};
use crate::EPS_ZERO;

/// Errors surfaced by GMA lowering.
#[derive(Debug, thiserror::Error)]
pub enum GmaError {
    /// Could not parse an input equation.
    #[error("equation {index}: {source}")]
    Parse {
        /// Zero-based equation index.
        index: usize,
        /// The parser's diagnosis.
        source: ParseError,
    },
    /// The equation set does not define one dependent variable per equation.
    #[error("{equations} equations define {dependents} dependent variables")]
    ShapeMismatch {
        /// Number of equations given.
        equations: usize,
        /// Number of distinct dependent variables found.
        dependents: usize,
    },
    /// An equation is not expressible as a signed sum of power-law monomials.
    #[error("equation {index} is not a GMA equation: {reason}")]
    NotGma {
        /// Zero-based equation index.
        index: usize,
        /// What went wrong.
        reason: String,
    },
    /// A right-hand-side variable is missing from a caller-fixed `X_i` pool.
    #[error("variable {0:?} is not dependent and not in the fixed independent pool")]
    UnknownVariable(String),
    /// Pool bookkeeping failure (duplicate dependent variable, etc.).
    #[error(transparent)]
    Pool(#[from] PoolError),
    /// Expression decomposition failure.
    #[error(transparent)]
    Expr(#[from] ExprError),
}

/// Selects the positive (source) or negative (sink) side of the term tensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermSign {
    /// Production terms: `α`, `G_d`, `G_i`.
    Positive,
    /// Consumption terms: `β`, `H_d`, `H_i`.
    Negative,
}

impl TermSign {
    /// Offset of this sign's entry within an equation's signature pair.
    #[inline]
    pub fn sig_offset(self) -> usize {
        match self {
            TermSign::Positive => 0,
            TermSign::Negative => 1,
        }
    }
}

/// Struct-of-arrays view over one sign's coefficient matrix and exponent
/// tensors. Dominance loops are written once against this view instead of
/// dispatching between `α/G` and `β/H` by hand.
#[derive(Debug, Clone, Copy)]
pub struct TermView<'a> {
    /// `α` or `β`: `n × max_terms` coefficients, zero in unused slots.
    pub coefficients: &'a Matrix,
    /// `G_d` or `H_d`: per-equation `max_terms × n` dependent exponents.
    pub dependent: &'a [Matrix],
    /// `G_i` or `H_i`: per-equation `max_terms × m` independent exponents.
    pub independent: &'a [Matrix],
}

/// A Generalized Mass Action system in matrix form.
#[derive(Debug, Clone)]
pub struct Gma {
    alpha: Matrix,
    beta: Matrix,
    gd: Vec<Matrix>,
    gi: Vec<Matrix>,
    hd: Vec<Matrix>,
    hi: Vec<Matrix>,
    xd: Arc<VariablePool>,
    xd_a: Arc<VariablePool>,
    xd_t: Arc<VariablePool>,
    xi: Arc<VariablePool>,
    signature: Vec<usize>,
}

/// One extracted monomial: signed coefficient plus (variable, exponent) pairs.
#[derive(Debug)]
struct RawTerm {
    coefficient: f64,
    factors: Vec<(String, f64)>,
}

impl Gma {
    // ------------------------- Construction -------------------------

    /// Lower a list of equation strings.
    pub fn from_strings(equations: &[&str]) -> Result<Self, GmaError> {
        let parsed = equations
            .iter()
            .enumerate()
            .map(|(index, s)| {
                parse_equation(s).map_err(|source| GmaError::Parse { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_equations(parsed)
    }

    /// Lower parsed equations.
    pub fn from_equations(equations: Vec<Expr>) -> Result<Self, GmaError> {
        Self::from_equations_with(equations, None, None)
    }

    /// Lower parsed equations with optional extra algebraic dependent names
    /// (for `0 = …` equations) and an optional fixed independent pool
    /// (derived systems inherit their parent's `X_i`).
    pub fn from_equations_with(
        equations: Vec<Expr>,
        algebraic_hint: Option<&VariablePool>,
        fixed_xi: Option<&VariablePool>,
    ) -> Result<Self, GmaError> {
        let n = equations.len();
        if n == 0 {
            return Err(GmaError::ShapeMismatch { equations: 0, dependents: 0 });
        }
        let mut xd = VariablePool::new();
        let mut xd_a = VariablePool::new();
        let mut xd_t = VariablePool::new();
        let mut rhs_list: Vec<Expr> = Vec::with_capacity(n);

        for (index, equation) in equations.iter().enumerate() {
            let (op, lhs, rhs) = match equation {
                Expr::Relation(op, lhs, rhs) => (op, lhs.as_ref(), rhs.as_ref()),
                _ => {
                    return Err(GmaError::NotGma {
                        index,
                        reason: "not an equation".to_string(),
                    })
                }
            };
            if *op != RelOp::Equal {
                return Err(GmaError::NotGma {
                    index,
                    reason: "inequalities cannot define a system".to_string(),
                });
            }
            match lhs {
                Expr::TimeDerivative(inner) => {
                    let name = match inner.as_ref() {
                        Expr::Variable(name) => name,
                        other => {
                            return Err(GmaError::NotGma {
                                index,
                                reason: format!(
                                    "time derivative of a non-variable ({other})"
                                ),
                            })
                        }
                    };
                    if !xd.contains(name) {
                        xd.add_with_value(name, index as f64)?;
                    }
                    if !xd_t.contains(name) {
                        xd_t.add(name)?;
                    }
                    rhs_list.push(rhs.clone());
                }
                Expr::Variable(name) => {
                    if !xd.contains(name) {
                        xd.add_with_value(name, index as f64)?;
                    }
                    if !xd_a.contains(name) {
                        xd_a.add(name)?;
                    }
                    // v = RHS becomes 0 = RHS − v.
                    rhs_list.push(Expr::sub(rhs.clone(), lhs.clone()));
                }
                Expr::Constant(c) if *c == 0.0 => {
                    // A bare constraint; its dependent variable must come
                    // from the algebraic hint.
                    rhs_list.push(rhs.clone());
                }
                other => {
                    let vars = other.variables();
                    if vars.len() == 1 {
                        // Single-variable algebraic left side, e.g. `2*v = …`.
                        let name = &vars[0];
                        if !xd.contains(name) {
                            xd.add_with_value(name, index as f64)?;
                        }
                        if !xd_a.contains(name) {
                            xd_a.add(name)?;
                        }
                        rhs_list.push(Expr::sub(rhs.clone(), lhs.clone()));
                    } else {
                        return Err(GmaError::NotGma {
                            index,
                            reason: format!(
                                "left-hand side must contain exactly one variable (got {})",
                                vars.len()
                            ),
                        });
                    }
                }
            }
        }

        if let Some(hint) = algebraic_hint {
            for name in hint.names() {
                if !xd.contains(name) {
                    xd.add(name)?;
                    xd_a.add(name)?;
                }
            }
        }
        if xd.len() != n {
            return Err(GmaError::ShapeMismatch { equations: n, dependents: xd.len() });
        }

        // Extract signed monomials per equation.
        let mut terms: Vec<(Vec<RawTerm>, Vec<RawTerm>)> = Vec::with_capacity(n);
        for (index, rhs) in rhs_list.iter().enumerate() {
            terms.push(extract_terms(rhs, index)?);
        }

        // Derive X_i (or verify against a fixed pool).
        let xi = match fixed_xi {
            Some(fixed) => {
                for (positive, negative) in &terms {
                    for term in positive.iter().chain(negative.iter()) {
                        for (name, _) in &term.factors {
                            if !xd.contains(name) && !fixed.contains(name) {
                                return Err(GmaError::UnknownVariable(name.clone()));
                            }
                        }
                    }
                }
                fixed.clone()
            }
            None => {
                let mut xi = VariablePool::new();
                for (positive, negative) in &terms {
                    for term in positive.iter().chain(negative.iter()) {
                        for (name, _) in &term.factors {
                            if !xd.contains(name) && !xi.contains(name) {
                                xi.add(name)?;
                            }
                        }
                    }
                }
                xi
            }
        };

        let m = xi.len();
        let max_p = terms.iter().map(|(p, _)| p.len()).max().unwrap_or(0);
        let max_q = terms.iter().map(|(_, q)| q.len()).max().unwrap_or(0);

        let mut gma = Gma {
            alpha: Matrix::zeros(n, max_p),
            beta: Matrix::zeros(n, max_q),
            gd: (0..n).map(|_| Matrix::zeros(max_p, n)).collect(),
            gi: (0..n).map(|_| Matrix::zeros(max_p, m)).collect(),
            hd: (0..n).map(|_| Matrix::zeros(max_q, n)).collect(),
            hi: (0..n).map(|_| Matrix::zeros(max_q, m)).collect(),
            xd: xd.into_shared(),
            xd_a: xd_a.into_shared(),
            xd_t: xd_t.into_shared(),
            xi: xi.into_shared(),
            signature: vec![0; 2 * n],
        };

        for (k, (positive, negative)) in terms.iter().enumerate() {
            gma.populate_terms(k, TermSign::Positive, positive)?;
            gma.populate_terms(k, TermSign::Negative, negative)?;
            let p = gma.collapse_identical_terms(k, TermSign::Positive, positive.len());
            let q = gma.collapse_identical_terms(k, TermSign::Negative, negative.len());
            gma.signature[2 * k] = p;
            gma.signature[2 * k + 1] = q;
        }
        Ok(gma)
    }

    /// Reassemble a GMA from decoded parts; shapes are the caller's contract.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        alpha: Matrix,
        beta: Matrix,
        gd: Vec<Matrix>,
        gi: Vec<Matrix>,
        hd: Vec<Matrix>,
        hi: Vec<Matrix>,
        xd: Arc<VariablePool>,
        xd_a: Arc<VariablePool>,
        xd_t: Arc<VariablePool>,
        xi: Arc<VariablePool>,
        signature: Vec<usize>,
    ) -> Self {
        Gma { alpha, beta, gd, gi, hd, hi, xd, xd_a, xd_t, xi, signature }
    }

    fn populate_terms(
        &mut self,
        equation: usize,
        sign: TermSign,
        terms: &[RawTerm],
    ) -> Result<(), GmaError> {
        for (j, term) in terms.iter().enumerate() {
            match sign {
                TermSign::Positive => self.alpha.put(equation, j, term.coefficient),
                TermSign::Negative => self.beta.put(equation, j, term.coefficient),
            }
            for (name, exponent) in &term.factors {
                if let Ok(col) = self.xd.index_of(name) {
                    let kd = match sign {
                        TermSign::Positive => &mut self.gd[equation],
                        TermSign::Negative => &mut self.hd[equation],
                    };
                    // Repeated bases accumulate (`x*x` is `x^2`).
                    let prev = kd.at(j, col);
                    kd.put(j, col, prev + exponent);
                } else {
                    let col = self.xi.index_of(name)?;
                    let ki = match sign {
                        TermSign::Positive => &mut self.gi[equation],
                        TermSign::Negative => &mut self.hi[equation],
                    };
                    let prev = ki.at(j, col);
                    ki.put(j, col, prev + exponent);
                }
            }
        }
        Ok(())
    }

    /// Merge duplicate exponent rows within one equation and sign; returns
    /// the surviving term count.
    fn collapse_identical_terms(
        &mut self,
        equation: usize,
        sign: TermSign,
        active: usize,
    ) -> usize {
        if active <= 1 {
            return active;
        }
        let (coeffs, kd, ki) = match sign {
            TermSign::Positive => (&mut self.alpha, &mut self.gd[equation], &mut self.gi[equation]),
            TermSign::Negative => (&mut self.beta, &mut self.hd[equation], &mut self.hi[equation]),
        };
        let combined = kd
            .hstack(ki)
            .expect("dependent/independent tensors share term rows");
        let active_rows: Vec<usize> = (0..active).collect();
        let window = combined
            .select_rows(&active_rows)
            .expect("active rows within tensor");
        let mut count = active;
        for group in window.identical_row_groups(EPS_ZERO) {
            let first = group[0];
            let mut total = coeffs.at(equation, first);
            for &dup in &group[1..] {
                total += coeffs.at(equation, dup);
                coeffs.put(equation, dup, 0.0);
                count -= 1;
            }
            coeffs.put(equation, first, total);
        }
        // Swap zeroed slots to the tail so the first `count` slots are the
        // live terms.
        for i in 0..active {
            if coeffs.at(equation, i) != 0.0 {
                continue;
            }
            let mut j = i + 1;
            while j < active && coeffs.at(equation, j) == 0.0 {
                j += 1;
            }
            if j == active {
                break;
            }
            coeffs.put(equation, i, coeffs.at(equation, j));
            coeffs.put(equation, j, 0.0);
            kd.swap_rows(i, j).expect("rows in range");
            ki.swap_rows(i, j).expect("rows in range");
            kd.clear_row(j).expect("row in range");
            ki.clear_row(j).expect("row in range");
        }
        count
    }

    // ------------------------- Accessors -------------------------

    /// Number of equations (`n = |X_d|`).
    pub fn num_equations(&self) -> usize {
        self.xd.len()
    }

    /// Number of independent variables (`m = |X_i|`).
    pub fn num_independent(&self) -> usize {
        self.xi.len()
    }

    /// Positive coefficients `α` (`n × max_p`).
    pub fn alpha(&self) -> &Matrix {
        &self.alpha
    }

    /// Negative coefficients `β` (`n × max_q`).
    pub fn beta(&self) -> &Matrix {
        &self.beta
    }

    /// Per-equation dependent exponents of positive terms.
    pub fn gd(&self) -> &[Matrix] {
        &self.gd
    }

    /// Per-equation independent exponents of positive terms.
    pub fn gi(&self) -> &[Matrix] {
        &self.gi
    }

    /// Per-equation dependent exponents of negative terms.
    pub fn hd(&self) -> &[Matrix] {
        &self.hd
    }

    /// Per-equation independent exponents of negative terms.
    pub fn hi(&self) -> &[Matrix] {
        &self.hi
    }

    /// The signature `σ`: interleaved (positive, negative) term counts.
    pub fn signature(&self) -> &[usize] {
        &self.signature
    }

    /// Dependent variable pool.
    pub fn xd(&self) -> &Arc<VariablePool> {
        &self.xd
    }

    /// Algebraic dependent variable pool.
    pub fn xd_a(&self) -> &Arc<VariablePool> {
        &self.xd_a
    }

    /// Dynamic dependent variable pool.
    pub fn xd_t(&self) -> &Arc<VariablePool> {
        &self.xd_t
    }

    /// Independent variable pool.
    pub fn xi(&self) -> &Arc<VariablePool> {
        &self.xi
    }

    /// Total number of cases: `Π σ[i]`.
    pub fn num_cases(&self) -> usize {
        self.signature.iter().product()
    }

    /// One sign's coefficient/tensor view.
    pub fn term_view(&self, sign: TermSign) -> TermView<'_> {
        match sign {
            TermSign::Positive => TermView {
                coefficients: &self.alpha,
                dependent: &self.gd,
                independent: &self.gi,
            },
            TermSign::Negative => TermView {
                coefficients: &self.beta,
                dependent: &self.hd,
                independent: &self.hi,
            },
        }
    }

    // ------------------------- Rendering -------------------------

    /// The unsigned monomial of one term as an expression.
    pub fn term_expr(&self, sign: TermSign, equation: usize, term: usize) -> Expr {
        let view = self.term_view(sign);
        let mut expr = Expr::Constant(view.coefficients.at(equation, term));
        for (col, name) in self.xd.names().enumerate() {
            let e = view.dependent[equation].at(term, col);
            if e != 0.0 {
                expr = Expr::mul(expr, Expr::pow(Expr::var(name), Expr::Constant(e)));
            }
        }
        for (col, name) in self.xi.names().enumerate() {
            let e = view.independent[equation].at(term, col);
            if e != 0.0 {
                expr = Expr::mul(expr, Expr::pow(Expr::var(name), Expr::Constant(e)));
            }
        }
        expr
    }

    /// One term with its sign applied (negative terms come out negated).
    pub fn signed_term_expr(&self, sign: TermSign, equation: usize, term: usize) -> Expr {
        let unsigned = self.term_expr(sign, equation, term);
        match sign {
            TermSign::Positive => unsigned,
            TermSign::Negative => Expr::neg(unsigned),
        }
    }

    /// The full right-hand side of one equation.
    pub fn rhs_expr(&self, equation: usize) -> Expr {
        let mut acc = Expr::Constant(0.0);
        for j in 0..self.signature[2 * equation] {
            acc = Expr::add(acc, self.signed_term_expr(TermSign::Positive, equation, j));
        }
        for j in 0..self.signature[2 * equation + 1] {
            acc = Expr::add(acc, self.signed_term_expr(TermSign::Negative, equation, j));
        }
        acc
    }

    /// One equation rendered back to an expression tree. Dynamic variables
    /// render as `v. = RHS`; an algebraic variable whose only negative term
    /// is the variable itself renders as `v = positive terms`, otherwise as
    /// `0 = RHS`.
    pub fn equation_expr(&self, equation: usize) -> Expr {
        let name = self.xd.name_at(equation).expect("equation indexes X_d");
        if self.xd_t.contains(name) {
            return Expr::relation(
                RelOp::Equal,
                Expr::time_derivative(Expr::var(name)),
                self.rhs_expr(equation),
            );
        }
        if self.negative_side_is_variable(equation, name) {
            let mut acc = Expr::Constant(0.0);
            for j in 0..self.signature[2 * equation] {
                acc = Expr::add(acc, self.signed_term_expr(TermSign::Positive, equation, j));
            }
            return Expr::relation(RelOp::Equal, Expr::var(name), acc);
        }
        Expr::relation(RelOp::Equal, Expr::Constant(0.0), self.rhs_expr(equation))
    }

    /// All equations rendered back to expression trees.
    pub fn equations(&self) -> Vec<Expr> {
        (0..self.num_equations()).map(|i| self.equation_expr(i)).collect()
    }

    fn negative_side_is_variable(&self, equation: usize, name: &str) -> bool {
        if self.signature[2 * equation + 1] != 1 {
            return false;
        }
        if (self.beta.at(equation, 0) - 1.0).abs() > EPS_ZERO {
            return false;
        }
        let var_col = self.xd.index_of(name).expect("name from X_d");
        for col in 0..self.num_equations() {
            let want = if col == var_col { 1.0 } else { 0.0 };
            if (self.hd[equation].at(0, col) - want).abs() > EPS_ZERO {
                return false;
            }
        }
        (0..self.num_independent()).all(|col| self.hi[equation].at(0, col).abs() <= EPS_ZERO)
    }

    /// Influence pattern between dependent pools: entry `(i, j)` sums the
    /// absolute dependent exponents of `X_d[j]` across equation `i`'s terms.
    pub fn connectivity(&self) -> Matrix {
        let n = self.num_equations();
        Matrix::from_fn(n, n, |i, j| {
            let mut total = 0.0;
            for t in 0..self.signature[2 * i] {
                total += self.gd[i].at(t, j).abs();
            }
            for t in 0..self.signature[2 * i + 1] {
                total += self.hd[i].at(t, j).abs();
            }
            total
        })
    }

    /// Stable digest of the lowered system (equations and signature), used in
    /// logs and the persisted header.
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"designspace.gma.v1");
        for equation in self.equations() {
            hasher.update(equation.to_string().as_bytes());
            hasher.update(b"\n");
        }
        for entry in &self.signature {
            hasher.update(&(*entry as u64).to_le_bytes());
        }
        *hasher.finalize().as_bytes()
    }
}

impl PartialEq for Gma {
    fn eq(&self, other: &Self) -> bool {
        self.signature == other.signature
            && self.alpha == other.alpha
            && self.beta == other.beta
            && self.gd == other.gd
            && self.gi == other.gi
            && self.hd == other.hd
            && self.hi == other.hi
            && self.xd.names().eq(other.xd.names())
            && self.xd_a.names().eq(other.xd_a.names())
            && self.xd_t.names().eq(other.xd_t.names())
            && self.xi.names().eq(other.xi.names())
    }
}

/// Split a canonical RHS into positive and negative monomials.
fn extract_terms(rhs: &Expr, index: usize) -> Result<(Vec<RawTerm>, Vec<RawTerm>), GmaError> {
    let children: Vec<&Expr> = match rhs {
        Expr::Sum(children) => children.iter().collect(),
        other => vec![other],
    };
    let mut positive = Vec::new();
    let mut negative = Vec::new();
    for child in children {
        let term = monomial(child, index)?;
        if term.coefficient > 0.0 {
            positive.push(term);
        } else if term.coefficient < 0.0 {
            negative.push(RawTerm {
                coefficient: -term.coefficient,
                factors: term.factors,
            });
        }
        // Zero-coefficient terms vanish.
    }
    Ok((positive, negative))
}

fn monomial(expr: &Expr, index: usize) -> Result<RawTerm, GmaError> {
    let mut term = RawTerm { coefficient: 1.0, factors: Vec::new() };
    accumulate_factor(expr, &mut term, index)?;
    Ok(term)
}

fn accumulate_factor(expr: &Expr, term: &mut RawTerm, index: usize) -> Result<(), GmaError> {
    match expr {
        Expr::Constant(c) => {
            term.coefficient *= c;
            Ok(())
        }
        Expr::Variable(name) => {
            term.factors.push((name.clone(), 1.0));
            Ok(())
        }
        Expr::Power(base, exponent) => match (base.as_ref(), exponent.as_ref()) {
            (Expr::Variable(name), Expr::Constant(e)) => {
                term.factors.push((name.clone(), *e));
                Ok(())
            }
            _ => Err(GmaError::NotGma {
                index,
                reason: format!("power {expr} is not variable^constant"),
            }),
        },
        Expr::Product(children) => {
            for child in children {
                accumulate_factor(child, term, index)?;
            }
            Ok(())
        }
        other => Err(GmaError::NotGma {
            index,
            reason: format!("{other} is not a power-law factor"),
        }),
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn two_variable_loop() -> Gma {
        Gma::from_strings(&["x1. = a + b*x1*x2 - c*x1", "x2. = c*x1 - x2"]).unwrap()
    }

    #[test]
    fn scenario_a_shapes() {
        let gma = two_variable_loop();
        assert_eq!(gma.num_equations(), 2);
        assert_eq!(gma.num_independent(), 3);
        let names: Vec<_> = gma.xi().names().collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(gma.signature(), &[2, 1, 1, 1]);
        assert_eq!(gma.num_cases(), 2);
        // Equation 0: α = (1, 1); first positive term is the constant `a`.
        assert_eq!(gma.alpha().at(0, 0), 1.0);
        assert_eq!(gma.gi()[0].at(0, 0), 1.0); // a^1
        assert_eq!(gma.gd()[0].at(0, 0), 0.0);
        // Second positive term is b*x1*x2.
        assert_eq!(gma.gd()[0].at(1, 0), 1.0);
        assert_eq!(gma.gd()[0].at(1, 1), 1.0);
        assert_eq!(gma.gi()[0].at(1, 1), 1.0); // b
        // Negative term of equation 1 is x2 with unit coefficient.
        assert_eq!(gma.beta().at(1, 0), 1.0);
        assert_eq!(gma.hd()[1].at(0, 1), 1.0);
    }

    #[test]
    fn dynamic_and_algebraic_partition() {
        let gma = Gma::from_strings(&[
            "x1. = a - x1*y",
            "y = k*x1 - y", // algebraic: y appears without the dot
        ])
        .unwrap();
        let xt: Vec<_> = gma.xd_t().names().collect();
        let xa: Vec<_> = gma.xd_a().names().collect();
        assert_eq!(xt, vec!["x1"]);
        assert_eq!(xa, vec!["y"]);
        // y = RHS is rewritten 0 = RHS − y; the rewrite's −y merges with the
        // RHS's own −y into a single negative term of coefficient 2.
        assert_eq!(gma.signature()[2], 1);
        assert_eq!(gma.signature()[3], 1);
        assert_eq!(gma.beta().at(1, 0), 2.0);
    }

    #[test]
    fn scenario_e_identical_terms_combine() {
        let gma = Gma::from_strings(&[
            "x1. = 2*a*x1 + 3*a*x1 - x1",
            "x2. = x1 - x2",
        ])
        .unwrap();
        // The two a*x1 terms collapse into one with coefficient 5.
        assert_eq!(gma.signature(), &[1, 1, 1, 1]);
        assert_eq!(gma.alpha().at(0, 0), 5.0);
        assert_eq!(gma.num_cases(), 1);
        // The vacated slot is zero.
        assert_eq!(gma.alpha().at(0, 1), 0.0);
        assert_eq!(gma.gd()[0].at(1, 0), 0.0);
    }

    #[test]
    fn shape_mismatch_detected() {
        // Both equations claim x1, so only one dependent variable exists.
        let err = Gma::from_strings(&["x1. = a - x1", "x1. = b - x1"]).unwrap_err();
        assert!(matches!(err, GmaError::ShapeMismatch { equations: 2, dependents: 1 }));
    }

    #[test]
    fn non_power_law_rejected() {
        let err = Gma::from_strings(&["x1. = a - log(x1)"]).unwrap_err();
        assert!(matches!(err, GmaError::NotGma { .. }));
    }

    #[test]
    fn repeated_bases_accumulate_exponents() {
        let gma = Gma::from_strings(&["x1. = a*x1*x1 - x1^3"]).unwrap();
        assert_eq!(gma.gd()[0].at(0, 0), 2.0);
        assert_eq!(gma.hd()[0].at(0, 0), 3.0);
    }

    #[test]
    fn equations_render_and_relower() {
        let gma = two_variable_loop();
        let rendered = gma.equations();
        let relowered = Gma::from_equations(rendered).unwrap();
        assert_eq!(gma, relowered);
    }

    #[test]
    fn fixed_xi_pool_is_respected() {
        let xi = VariablePool::from_pairs([("a", 0.0), ("b", 0.0), ("c", 0.0), ("d", 0.0)])
            .unwrap();
        let gma = Gma::from_equations_with(
            vec![parse_equation("x1. = a - c*x1").unwrap()],
            None,
            Some(&xi),
        )
        .unwrap();
        assert_eq!(gma.num_independent(), 4);
        let err = Gma::from_equations_with(
            vec![parse_equation("x1. = zz - x1").unwrap()],
            None,
            Some(&xi),
        )
        .unwrap_err();
        assert!(matches!(err, GmaError::UnknownVariable(_)));
    }

    #[test]
    fn connectivity_reflects_dependent_couplings() {
        let gma = two_variable_loop();
        let c = gma.connectivity();
        // Equation 0 touches x1 (twice: b*x1*x2 and c*x1) and x2 once.
        assert_eq!(c.at(0, 0), 2.0);
        assert_eq!(c.at(0, 1), 1.0);
        // Equation 1 touches x1 (source) and x2 (sink).
        assert_eq!(c.at(1, 0), 1.0);
        assert_eq!(c.at(1, 1), 1.0);
    }

    #[test]
    fn digest_is_stable_and_input_sensitive() {
        let a = two_variable_loop();
        let b = two_variable_loop();
        assert_eq!(a.digest(), b.digest());
        let c = Gma::from_strings(&["x1. = a + b*x1*x2 - c*x1", "x2. = c*x1 - 2*x2"]).unwrap();
        assert_ne!(a.digest(), c.digest());
    }
}
