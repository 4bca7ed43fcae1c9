//! S-Systems
//!
//! An S-system is a GMA with exactly one positive and one negative term per
//! equation. Its steady state is solvable in closed form in logarithmic
//! coordinates: with `A_d = G_d − H_d`, `A_i = G_i − H_i` and
//! `b = log10 β − log10 α`, a non-singular system has `M = A_d⁻¹` and
//!
//! ```text
//! y* = M·b − M·A_i·log10(X_i)
//! ```
//!
//! Singularity is a verdict, not an error: a singular S-system is still a
//! value (the cyclical-case resolver consumes it), it merely has no `M`.

use std::sync::Arc;

use crate::gma::{Gma, TermSign};
use crate::matrix::{Matrix, MatrixError};
use crate::pool::{PoolError, VariablePool};
use crate::{expr::Expr, expr::RelOp, EPS_ZERO};

/// Errors surfaced by S-system construction and queries.
#[derive(Debug, thiserror::Error)]
pub enum SSystemError {
    /// A term selector is outside the GMA's signature.
    #[error("term {term} out of range for equation {equation} (signature allows {max})")]
    OutOfBounds {
        /// Zero-based equation index.
        equation: usize,
        /// One-based selected term.
        term: usize,
        /// The signature bound the selector violated.
        max: usize,
    },
    /// The selector vector has the wrong length.
    #[error("term selector has length {got}, expected {expected}")]
    SelectorLength {
        /// Provided length.
        got: usize,
        /// Required length (2n).
        expected: usize,
    },
    /// Operation requires a non-singular system.
    #[error("S-system is singular; no steady-state map exists")]
    Singular,
    /// An independent-variable value is missing or non-positive.
    #[error("independent variable {name:?}: {reason}")]
    BadIndependentValue {
        /// The variable at fault.
        name: String,
        /// Missing, zero, negative, or non-finite.
        reason: &'static str,
    },
    /// A named variable is not part of this system.
    #[error("variable {0:?} is not part of this S-system")]
    UnknownVariable(String),
    /// Underlying matrix failure.
    #[error(transparent)]
    Matrix(#[from] MatrixError),
    /// Underlying pool failure.
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// An S-system: single-term tensors plus the (optional) steady-state map.
#[derive(Debug, Clone)]
pub struct SSystem {
    alpha: Matrix,
    beta: Matrix,
    gd: Matrix,
    gi: Matrix,
    hd: Matrix,
    hi: Matrix,
    m: Option<Matrix>,
    xd: Arc<VariablePool>,
    xd_a: Arc<VariablePool>,
    xd_t: Arc<VariablePool>,
    xi: Arc<VariablePool>,
}

impl SSystem {
    /// Build an S-system by selecting the `terms[2k]`-th positive and
    /// `terms[2k+1]`-th negative term (one-based) from each GMA equation.
    pub fn from_gma(gma: &Gma, terms: &[usize]) -> Result<Self, SSystemError> {
        let n = gma.num_equations();
        let m = gma.num_independent();
        if terms.len() != 2 * n {
            return Err(SSystemError::SelectorLength { got: terms.len(), expected: 2 * n });
        }
        for k in 0..n {
            for sign in [TermSign::Positive, TermSign::Negative] {
                let slot = 2 * k + sign.sig_offset();
                let chosen = terms[slot];
                let limit = gma.signature()[slot];
                if chosen == 0 || chosen > limit {
                    return Err(SSystemError::OutOfBounds {
                        equation: k,
                        term: chosen,
                        max: limit,
                    });
                }
            }
        }

        let mut alpha = Matrix::zeros(n, 1);
        let mut beta = Matrix::zeros(n, 1);
        let mut gd = Matrix::zeros(n, n);
        let mut gi = Matrix::zeros(n, m);
        let mut hd = Matrix::zeros(n, n);
        let mut hi = Matrix::zeros(n, m);
        for k in 0..n {
            let p = terms[2 * k] - 1;
            let q = terms[2 * k + 1] - 1;
            alpha.put(k, 0, gma.alpha().at(k, p));
            beta.put(k, 0, gma.beta().at(k, q));
            for j in 0..n {
                gd.put(k, j, gma.gd()[k].at(p, j));
                hd.put(k, j, gma.hd()[k].at(q, j));
            }
            for j in 0..m {
                gi.put(k, j, gma.gi()[k].at(p, j));
                hi.put(k, j, gma.hi()[k].at(q, j));
            }
        }

        let mut ssys = SSystem {
            alpha,
            beta,
            gd,
            gi,
            hd,
            hi,
            m: None,
            xd: Arc::clone(gma.xd()),
            xd_a: Arc::clone(gma.xd_a()),
            xd_t: Arc::clone(gma.xd_t()),
            xi: Arc::clone(gma.xi()),
        };
        ssys.solve();
        Ok(ssys)
    }

    /// Reassemble an S-system from decoded parts; the steady-state map is
    /// recomputed rather than trusted from the wire.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        alpha: Matrix,
        beta: Matrix,
        gd: Matrix,
        gi: Matrix,
        hd: Matrix,
        hi: Matrix,
        xd: Arc<VariablePool>,
        xd_a: Arc<VariablePool>,
        xd_t: Arc<VariablePool>,
        xi: Arc<VariablePool>,
    ) -> Self {
        let mut ssys = SSystem {
            alpha,
            beta,
            gd,
            gi,
            hd,
            hi,
            m: None,
            xd,
            xd_a,
            xd_t,
            xi,
        };
        ssys.solve();
        ssys
    }

    /// Recompute `M = A_d⁻¹`, marking the system singular on failure.
    fn solve(&mut self) {
        let a_d = self.a_d();
        self.m = a_d.inverse();
        if self.m.is_none() {
            tracing::debug!("S-system is singular (A_d rank {})", a_d.rank());
        }
    }

    // ------------------------- Derived matrices -------------------------

    /// `A_d = G_d − H_d` (n × n).
    pub fn a_d(&self) -> Matrix {
        self.gd.sub(&self.hd).expect("G_d and H_d share shape")
    }

    /// `A_i = G_i − H_i` (n × m).
    pub fn a_i(&self) -> Matrix {
        self.gi.sub(&self.hi).expect("G_i and H_i share shape")
    }

    /// `b = log10 β − log10 α` (n × 1).
    pub fn b(&self) -> Matrix {
        Matrix::from_fn(self.num_equations(), 1, |k, _| {
            self.beta.at(k, 0).log10() - self.alpha.at(k, 0).log10()
        })
    }

    /// Full dependent exponent difference `[G_d | G_i]` stacked as one
    /// matrix row per equation over all variables.
    pub fn g_full(&self) -> Matrix {
        self.gd.hstack(&self.gi).expect("row counts agree")
    }

    /// `[H_d | H_i]` over all variables.
    pub fn h_full(&self) -> Matrix {
        self.hd.hstack(&self.hi).expect("row counts agree")
    }

    /// The steady-state map `M = A_d⁻¹`, when it exists.
    pub fn m(&self) -> Option<&Matrix> {
        self.m.as_ref()
    }

    /// Whether `A_d` is rank-deficient.
    pub fn is_singular(&self) -> bool {
        self.m.is_none()
    }

    // ------------------------- Accessors -------------------------

    /// Number of equations.
    pub fn num_equations(&self) -> usize {
        self.xd.len()
    }

    /// Number of independent variables.
    pub fn num_independent(&self) -> usize {
        self.xi.len()
    }

    /// Positive coefficients (n × 1).
    pub fn alpha(&self) -> &Matrix {
        &self.alpha
    }

    /// Negative coefficients (n × 1).
    pub fn beta(&self) -> &Matrix {
        &self.beta
    }

    /// Dependent exponents of positive terms (n × n).
    pub fn gd(&self) -> &Matrix {
        &self.gd
    }

    /// Independent exponents of positive terms (n × m).
    pub fn gi(&self) -> &Matrix {
        &self.gi
    }

    /// Dependent exponents of negative terms (n × n).
    pub fn hd(&self) -> &Matrix {
        &self.hd
    }

    /// Independent exponents of negative terms (n × m).
    pub fn hi(&self) -> &Matrix {
        &self.hi
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

    // ------------------------- Steady state -------------------------

    /// `log10(X_i)` as a column vector, validating every value.
    fn log_independent(&self, xi0: &VariablePool) -> Result<Matrix, SSystemError> {
        let mut out = Matrix::zeros(self.num_independent(), 1);
        for (j, name) in self.xi.names().enumerate() {
            let value = xi0.value_of(name).map_err(|_| SSystemError::BadIndependentValue {
                name: name.to_string(),
                reason: "missing from the evaluation pool",
            })?;
            if !value.is_finite() {
                return Err(SSystemError::BadIndependentValue {
                    name: name.to_string(),
                    reason: "non-finite",
                });
            }
            if value <= 0.0 {
                return Err(SSystemError::BadIndependentValue {
                    name: name.to_string(),
                    reason: "must be strictly positive",
                });
            }
            out.put(j, 0, value.log10());
        }
        Ok(out)
    }

    /// Steady state in log10 coordinates: `y* = M·b − M·A_i·log10(X_i)`.
    pub fn logarithmic_steady_state(&self, xi0: &VariablePool) -> Result<Matrix, SSystemError> {
        let m = self.m.as_ref().ok_or(SSystemError::Singular)?;
        let x = self.log_independent(xi0)?;
        let mb = m.mul(&self.b())?;
        let mai = m.mul(&self.a_i())?;
        Ok(mb.sub(&mai.mul(&x)?)?)
    }

    /// Steady state in linear coordinates.
    pub fn steady_state(&self, xi0: &VariablePool) -> Result<Matrix, SSystemError> {
        Ok(self.logarithmic_steady_state(xi0)?.map(|y| 10f64.powf(y)))
    }

    /// log10 of the steady-state flux through each dependent pool (the sink
    /// term evaluated at the steady state).
    pub fn logarithmic_steady_state_flux(
        &self,
        xi0: &VariablePool,
    ) -> Result<Matrix, SSystemError> {
        let y = self.logarithmic_steady_state(xi0)?;
        let x = self.log_independent(xi0)?;
        let hd_y = self.hd.mul(&y)?;
        let hi_x = self.hi.mul(&x)?;
        Ok(Matrix::from_fn(self.num_equations(), 1, |k, _| {
            self.beta.at(k, 0).log10() + hd_y.at(k, 0) + hi_x.at(k, 0)
        }))
    }

    /// Logarithmic gain `∂ log10 X_d / ∂ log10 X_i`, the entry of `−M·A_i`.
    pub fn logarithmic_gain(&self, xd_name: &str, xi_name: &str) -> Result<f64, SSystemError> {
        let m = self.m.as_ref().ok_or(SSystemError::Singular)?;
        let row = self
            .xd
            .index_of(xd_name)
            .map_err(|_| SSystemError::UnknownVariable(xd_name.to_string()))?;
        let col = self
            .xi
            .index_of(xi_name)
            .map_err(|_| SSystemError::UnknownVariable(xi_name.to_string()))?;
        let gains = m.mul(&self.a_i())?.scale(-1.0);
        Ok(gains.at(row, col))
    }

    // ------------------------- Algebraic reduction -------------------------

    /// Eliminate the algebraic dependent variables, returning a reduced
    /// S-system over `X_d_t` alone whose steady state agrees with this one
    /// on the surviving variables.
    pub fn without_algebraic_constraints(&self) -> Result<SSystem, SSystemError> {
        if self.xd_a.is_empty() {
            return Ok(self.clone());
        }
        let n = self.num_equations();
        let mut diff_rows: Vec<usize> = Vec::new();
        let mut alg_rows: Vec<usize> = Vec::new();
        for (i, name) in self.xd.names().enumerate() {
            if self.xd_a.contains(name) {
                alg_rows.push(i);
            } else {
                diff_rows.push(i);
            }
        }
        debug_assert_eq!(diff_rows.len() + alg_rows.len(), n);

        let a_d = self.a_d();
        let a_i = self.a_i();
        let b = self.b();

        // Algebraic block: A_aa·y_a + A_ad·y_d + A_ai·x = b_a, solved as
        // y_a = S_b + S_d·y_d + S_i·x.
        let a_aa = a_d.select_rows(&alg_rows)?.select_cols(&alg_rows)?;
        let a_ad = a_d.select_rows(&alg_rows)?.select_cols(&diff_rows)?;
        let a_ai = a_i.select_rows(&alg_rows)?;
        let b_a = b.select_rows(&alg_rows)?;
        let inv_aa = a_aa.inverse().ok_or(SSystemError::Singular)?;
        let s_d = inv_aa.mul(&a_ad.scale(-1.0))?;
        let s_i = inv_aa.mul(&a_ai.scale(-1.0))?;
        let s_b = inv_aa.mul(&b_a)?;

        // Reduced tensors: keep differential rows, drop algebraic columns,
        // then fold each algebraic exponent through the closed-form solution.
        let mut gd = self.gd.select_rows(&diff_rows)?.select_cols(&diff_rows)?;
        let mut hd = self.hd.select_rows(&diff_rows)?.select_cols(&diff_rows)?;
        let mut gi = self.gi.select_rows(&diff_rows)?;
        let mut hi = self.hi.select_rows(&diff_rows)?;
        let mut alpha = self.alpha.select_rows(&diff_rows)?;
        let mut beta = self.beta.select_rows(&diff_rows)?;

        for (new_i, &orig_i) in diff_rows.iter().enumerate() {
            for (j, &alg_col) in alg_rows.iter().enumerate() {
                let g_factor = self.gd.at(orig_i, alg_col);
                if g_factor != 0.0 {
                    for k in 0..diff_rows.len() {
                        let v = gd.at(new_i, k) + g_factor * s_d.at(j, k);
                        gd.put(new_i, k, v);
                    }
                    for k in 0..self.num_independent() {
                        let v = gi.at(new_i, k) + g_factor * s_i.at(j, k);
                        gi.put(new_i, k, v);
                    }
                    // A substituted power law scales the coefficient by
                    // 10^(g·S_b).
                    let scaled = alpha.at(new_i, 0) * 10f64.powf(g_factor * s_b.at(j, 0));
                    alpha.put(new_i, 0, scaled);
                }
                let h_factor = self.hd.at(orig_i, alg_col);
                if h_factor != 0.0 {
                    for k in 0..diff_rows.len() {
                        let v = hd.at(new_i, k) + h_factor * s_d.at(j, k);
                        hd.put(new_i, k, v);
                    }
                    for k in 0..self.num_independent() {
                        let v = hi.at(new_i, k) + h_factor * s_i.at(j, k);
                        hi.put(new_i, k, v);
                    }
                    let scaled = beta.at(new_i, 0) * 10f64.powf(h_factor * s_b.at(j, 0));
                    beta.put(new_i, 0, scaled);
                }
            }
        }

        let mut new_xd = VariablePool::new();
        for &i in &diff_rows {
            new_xd.add(self.xd.name_at(i).expect("row indexes X_d"))?;
        }
        let new_xd = new_xd.into_shared();
        let mut reduced = SSystem {
            alpha,
            beta,
            gd,
            gi,
            hd,
            hi,
            m: None,
            xd: Arc::clone(&new_xd),
            xd_a: VariablePool::new().into_shared(),
            xd_t: new_xd,
            xi: Arc::clone(&self.xi),
        };
        reduced.solve();
        Ok(reduced)
    }

    // ------------------------- Rendering -------------------------

    /// The equations of this S-system as expression trees.
    pub fn equations(&self) -> Vec<Expr> {
        (0..self.num_equations())
            .map(|k| {
                let name = self.xd.name_at(k).expect("equation indexes X_d");
                let rhs = Expr::sub(self.term_expr(k, true), self.term_expr(k, false));
                let lhs = if self.xd_t.contains(name) {
                    Expr::time_derivative(Expr::var(name))
                } else {
                    Expr::Constant(0.0)
                };
                Expr::relation(RelOp::Equal, lhs, rhs)
            })
            .collect()
    }

    fn term_expr(&self, equation: usize, positive: bool) -> Expr {
        let (coeff, kd, ki) = if positive {
            (&self.alpha, &self.gd, &self.gi)
        } else {
            (&self.beta, &self.hd, &self.hi)
        };
        let mut expr = Expr::Constant(coeff.at(equation, 0));
        for (col, name) in self.xd.names().enumerate() {
            let e = kd.at(equation, col);
            if e.abs() > EPS_ZERO {
                expr = Expr::mul(expr, Expr::pow(Expr::var(name), Expr::Constant(e)));
            }
        }
        for (col, name) in self.xi.names().enumerate() {
            let e = ki.at(equation, col);
            if e.abs() > EPS_ZERO {
                expr = Expr::mul(expr, Expr::pow(Expr::var(name), Expr::Constant(e)));
            }
        }
        expr
    }

    /// Closed-form steady-state solution `X_d = 10^(M·b) · Π X_i^(−M·A_i)`.
    pub fn solution(&self) -> Result<Vec<Expr>, SSystemError> {
        let m = self.m.as_ref().ok_or(SSystemError::Singular)?;
        let mb = m.mul(&self.b())?;
        let gains = m.mul(&self.a_i())?.scale(-1.0);
        let mut out = Vec::with_capacity(self.num_equations());
        for (i, name) in self.xd.names().enumerate() {
            let mut rhs = Expr::Constant(10f64.powf(mb.at(i, 0)));
            for (j, xi_name) in self.xi.names().enumerate() {
                let e = gains.at(i, j);
                if e.abs() > EPS_ZERO {
                    rhs = Expr::mul(rhs, Expr::pow(Expr::var(xi_name), Expr::Constant(e)));
                }
            }
            out.push(Expr::relation(RelOp::Equal, Expr::var(name), rhs));
        }
        Ok(out)
    }

    /// Log-space solution `log10 X_d = M·b − M·A_i·log10 X_i` as expressions.
    pub fn logarithmic_solution(&self) -> Result<Vec<Expr>, SSystemError> {
        let m = self.m.as_ref().ok_or(SSystemError::Singular)?;
        let mb = m.mul(&self.b())?;
        let gains = m.mul(&self.a_i())?.scale(-1.0);
        let mut out = Vec::with_capacity(self.num_equations());
        for (i, name) in self.xd.names().enumerate() {
            let mut rhs = Expr::Constant(mb.at(i, 0));
            for (j, xi_name) in self.xi.names().enumerate() {
                let e = gains.at(i, j);
                if e.abs() > EPS_ZERO {
                    rhs = Expr::add(
                        rhs,
                        Expr::mul(
                            Expr::Constant(e),
                            Expr::function("log10", Expr::var(xi_name)),
                        ),
                    );
                }
            }
            out.push(Expr::relation(
                RelOp::Equal,
                Expr::function("log10", Expr::var(name)),
                rhs,
            ));
        }
        Ok(out)
    }
}

impl PartialEq for SSystem {
    fn eq(&self, other: &Self) -> bool {
        self.alpha == other.alpha
            && self.beta == other.beta
            && self.gd == other.gd
            && self.gi == other.gi
            && self.hd == other.hd
            && self.hi == other.hi
            && self.xd.names().eq(other.xd.names())
            && self.xi.names().eq(other.xi.names())
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn loop_gma() -> Gma {
        Gma::from_strings(&["x1. = a + b*x1*x2 - c*x1", "x2. = c*x1 - x2"]).unwrap()
    }

    #[test]
    fn scenario_a_case_one_solves() {
        let gma = loop_gma();
        let ssys = SSystem::from_gma(&gma, &[1, 1, 1, 1]).unwrap();
        assert!(!ssys.is_singular());
        assert_eq!(ssys.alpha().column_vec(), vec![1.0, 1.0]);
        // With a chosen for x1 and c*x1 for x2's source: A_d = [[-1,0],[1,-1]].
        let a_d = ssys.a_d();
        assert_eq!(a_d.at(0, 0), -1.0);
        assert_eq!(a_d.at(1, 0), 1.0);
        assert_eq!(a_d.at(1, 1), -1.0);

        // Steady state: x1 = a/c, x2 = x1*c = a.
        let xi0 = VariablePool::from_pairs([("a", 4.0), ("b", 1.0), ("c", 2.0)]).unwrap();
        let y = ssys.steady_state(&xi0).unwrap();
        assert!((y.at(0, 0) - 2.0).abs() < 1e-10);
        assert!((y.at(1, 0) - 4.0).abs() < 1e-10);
    }

    #[test]
    fn singular_dominance_is_detected() {
        // A closed exchange loop: the two chosen fluxes cancel around the
        // cycle, so A_d = [[-1, 1], [1, -1]] is rank one.
        let gma = Gma::from_strings(&[
            "x1. = k21*x2 - k12*x1",
            "x2. = k12*x1 - k21*x2",
        ])
        .unwrap();
        let ssys = SSystem::from_gma(&gma, &[1, 1, 1, 1]).unwrap();
        assert!(ssys.is_singular());
        assert!(ssys.m().is_none());
        assert_eq!(ssys.a_d().rank(), 1);
        assert!(matches!(
            ssys.logarithmic_steady_state(
                &VariablePool::from_pairs([("k12", 1.0), ("k21", 1.0)]).unwrap()
            ),
            Err(SSystemError::Singular)
        ));
    }

    #[test]
    fn selector_bounds_checked() {
        let gma = loop_gma();
        assert!(matches!(
            SSystem::from_gma(&gma, &[3, 1, 1, 1]),
            Err(SSystemError::OutOfBounds { equation: 0, term: 3, .. })
        ));
        assert!(matches!(
            SSystem::from_gma(&gma, &[1, 1, 1]),
            Err(SSystemError::SelectorLength { got: 3, expected: 4 })
        ));
    }

    #[test]
    fn steady_state_flux_matches_sink_term() {
        let gma = loop_gma();
        let ssys = SSystem::from_gma(&gma, &[1, 1, 1, 1]).unwrap();
        let xi0 = VariablePool::from_pairs([("a", 4.0), ("b", 1.0), ("c", 2.0)]).unwrap();
        // At steady state x1 = 2, so the sink flux c*x1 of equation 0 is 4,
        // and x2's sink flux is x2 = 4 as well.
        let flux = ssys.logarithmic_steady_state_flux(&xi0).unwrap();
        assert!((flux.at(0, 0) - 4f64.log10()).abs() < 1e-10);
        assert!((flux.at(1, 0) - 4f64.log10()).abs() < 1e-10);
    }

    #[test]
    fn logarithmic_solution_renders_log_linear_rows() {
        let gma = loop_gma();
        let ssys = SSystem::from_gma(&gma, &[1, 1, 1, 1]).unwrap();
        let rows = ssys.logarithmic_solution().unwrap();
        assert_eq!(rows.len(), 2);
        // x1 = a/c: log10(x1) = log10(a) - log10(c).
        let mut pool = VariablePool::from_pairs([("a", 100.0), ("b", 1.0), ("c", 10.0)]).unwrap();
        pool.add("x1").unwrap();
        let rhs = rows[0].rhs().unwrap().eval(&pool).unwrap();
        assert!((rhs - 1.0).abs() < 1e-10);
    }

    #[test]
    fn logarithmic_gain_matches_map() {
        let gma = loop_gma();
        let ssys = SSystem::from_gma(&gma, &[1, 1, 1, 1]).unwrap();
        // x1 = a/c: gain of x1 wrt a is +1, wrt c is −1, wrt b is 0.
        assert!((ssys.logarithmic_gain("x1", "a").unwrap() - 1.0).abs() < 1e-12);
        assert!((ssys.logarithmic_gain("x1", "c").unwrap() + 1.0).abs() < 1e-12);
        assert!(ssys.logarithmic_gain("x1", "b").unwrap().abs() < 1e-12);
    }

    #[test]
    fn scenario_f_algebraic_reduction_fidelity() {
        // One algebraic equation (y) feeding two dynamic pools.
        let gma = Gma::from_strings(&[
            "x1. = k1*y - g1*x1",
            "x2. = g1*x1 - g2*x2*y^0.5",
            "y = s*x2 - y",
        ])
        .unwrap();
        let full = SSystem::from_gma(&gma, &[1, 1, 1, 1, 1, 1]).unwrap();
        let reduced = full.without_algebraic_constraints().unwrap();
        assert_eq!(reduced.num_equations(), 2);
        assert!(reduced.xd_a().is_empty());

        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..10 {
            let xi0 = VariablePool::from_pairs([
                ("k1", 10f64.powf(rng.gen_range(-2.0..2.0))),
                ("g1", 10f64.powf(rng.gen_range(-2.0..2.0))),
                ("g2", 10f64.powf(rng.gen_range(-2.0..2.0))),
                ("s", 10f64.powf(rng.gen_range(-2.0..2.0))),
            ])
            .unwrap();
            let y_full = full.logarithmic_steady_state(&xi0).unwrap();
            let y_red = reduced.logarithmic_steady_state(&xi0).unwrap();
            for (new_i, name) in reduced.xd().names().enumerate() {
                let orig_i = full.xd().index_of(name).unwrap();
                let a = y_full.at(orig_i, 0);
                let b = y_red.at(new_i, 0);
                let rel = (a - b).abs() / a.abs().max(1.0);
                assert!(rel < 1e-10, "{name}: full {a} vs reduced {b}");
            }
        }
    }

    #[test]
    fn reduction_without_algebraic_block_is_identity() {
        let gma = loop_gma();
        let ssys = SSystem::from_gma(&gma, &[1, 1, 1, 1]).unwrap();
        let reduced = ssys.without_algebraic_constraints().unwrap();
        assert_eq!(ssys, reduced);
    }

    #[test]
    fn solution_expressions_evaluate_to_steady_state() {
        let gma = loop_gma();
        let ssys = SSystem::from_gma(&gma, &[1, 1, 1, 1]).unwrap();
        let xi0 = VariablePool::from_pairs([("a", 5.0), ("b", 0.5), ("c", 4.0)]).unwrap();
        let expect = ssys.steady_state(&xi0).unwrap();
        for (i, solution) in ssys.solution().unwrap().iter().enumerate() {
            let value = solution.rhs().unwrap().eval(&xi0).unwrap();
            assert!((value - expect.at(i, 0)).abs() < 1e-10);
        }
    }

    #[test]
    fn steady_state_rejects_bad_points() {
        let gma = loop_gma();
        let ssys = SSystem::from_gma(&gma, &[1, 1, 1, 1]).unwrap();
        let missing = VariablePool::from_pairs([("a", 1.0), ("b", 1.0)]).unwrap();
        assert!(matches!(
            ssys.steady_state(&missing),
            Err(SSystemError::BadIndependentValue { .. })
        ));
        let negative =
            VariablePool::from_pairs([("a", 1.0), ("b", 1.0), ("c", -2.0)]).unwrap();
        assert!(matches!(
            ssys.steady_state(&negative),
            Err(SSystemError::BadIndependentValue { .. })
        ));
    }
}
