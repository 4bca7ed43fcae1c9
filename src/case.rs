//! Cases
//!
//! A case fixes one dominant positive and one dominant negative term per
//! equation of a GMA. It owns the induced S-system and the dominance-condition
//! matrices `(C_d, C_i, Δ)`, one row per non-chosen term stating "the chosen
//! term dominates this one". When the S-system has a steady-state map, it also
//! owns the boundary matrices `(U, ζ)` obtained by substituting that map into
//! the conditions. The validity region in log-independent coordinates is
//! `{x : U·x + ζ > 0}`.
//!
//! Case numbering treats the GMA signature as a mixed-radix digit vector;
//! the digit order is the engine's endianness.

use std::sync::Arc;

use crate::expr::{Expr, RelOp};
use crate::gma::{Gma, TermSign};
use crate::matrix::{Matrix, MatrixError};
use crate::parse::{parse_equation, ParseError};
use crate::pool::VariablePool;
use crate::ssystem::{SSystem, SSystemError};
use crate::{Endianness, EPS_ZERO};

/// Errors surfaced by case construction and queries.
#[derive(Debug, thiserror::Error)]
pub enum CaseError {
    /// A case number outside `[1, Πσ]`.
    #[error("case number {number} out of range [1, {max}]")]
    NumberOutOfRange {
        /// Requested case number.
        number: usize,
        /// Total number of cases.
        max: usize,
    },
    /// A signature digit outside its σ bound.
    #[error("signature digit {digit} at slot {slot} exceeds bound {bound}")]
    SignatureOutOfRange {
        /// One-based digit value.
        digit: usize,
        /// Slot index into the signature.
        slot: usize,
        /// The σ entry that bounds it.
        bound: usize,
    },
    /// Signature length does not match the GMA.
    #[error("signature has length {got}, expected {expected}")]
    SignatureLength {
        /// Provided length.
        got: usize,
        /// Required length.
        expected: usize,
    },
    /// A constraint string could not be parsed.
    #[error("constraint {index}: {source}")]
    Constraint {
        /// Zero-based constraint index.
        index: usize,
        /// Parser diagnosis.
        source: ParseError,
    },
    /// A constraint is not a `<`/`>` inequality between power-law products.
    #[error("constraint {index} is not a log-linear inequality: {reason}")]
    NotLogLinear {
        /// Zero-based constraint index.
        index: usize,
        /// What went wrong.
        reason: String,
    },
    /// Underlying S-system failure.
    #[error(transparent)]
    SSystem(#[from] SSystemError),
    /// Underlying matrix failure.
    #[error(transparent)]
    Matrix(#[from] MatrixError),
}

/// A design-space case: S-system plus dominance conditions and boundaries.
#[derive(Debug, Clone)]
pub struct DsCase {
    ssystem: SSystem,
    signature: Vec<usize>,
    cd: Matrix,
    ci: Matrix,
    delta: Matrix,
    u: Option<Matrix>,
    zeta: Option<Matrix>,
    case_number: usize,
    identifier: String,
}

impl DsCase {
    /// Build the case selected by `signature` (one-based digits) from a GMA.
    pub fn from_gma(
        gma: &Gma,
        signature: &[usize],
        prefix: Option<&str>,
        endianness: Endianness,
    ) -> Result<Self, CaseError> {
        Self::from_gma_with_conditions(gma, signature, prefix, endianness, None)
    }

    /// Build a case, prepending design-space-level condition rows before the
    /// boundary matrices are derived.
    pub fn from_gma_with_conditions(
        gma: &Gma,
        signature: &[usize],
        prefix: Option<&str>,
        endianness: Endianness,
        extra: Option<(&Matrix, &Matrix, &Matrix)>,
    ) -> Result<Self, CaseError> {
        validate_signature(signature, gma.signature())?;
        let ssystem = SSystem::from_gma(gma, signature)?;
        let (cd, ci, delta) = condition_matrices(gma, signature)?;
        let (cd, ci, delta) = match extra {
            Some((xcd, xci, xdelta)) => {
                (xcd.vstack(&cd)?, xci.vstack(&ci)?, xdelta.vstack(&delta)?)
            }
            None => (cd, ci, delta),
        };
        let case_number = case_number_for_signature(signature, gma.signature(), endianness)?;
        let identifier = match prefix {
            Some(prefix) => format!("{prefix}_{case_number}"),
            None => case_number.to_string(),
        };
        let mut case = DsCase {
            ssystem,
            signature: signature.to_vec(),
            cd,
            ci,
            delta,
            u: None,
            zeta: None,
            case_number,
            identifier,
        };
        case.rebuild_boundaries()?;
        Ok(case)
    }

    /// Reassemble a case from decoded parts.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        ssystem: SSystem,
        signature: Vec<usize>,
        cd: Matrix,
        ci: Matrix,
        delta: Matrix,
        u: Option<Matrix>,
        zeta: Option<Matrix>,
        case_number: usize,
        identifier: String,
    ) -> Self {
        DsCase { ssystem, signature, cd, ci, delta, u, zeta, case_number, identifier }
    }

    /// Recompute `U`, `ζ` from the current conditions; absent when the
    /// S-system is singular.
    fn rebuild_boundaries(&mut self) -> Result<(), CaseError> {
        self.u = None;
        self.zeta = None;
        let m = match self.ssystem.m() {
            Some(m) => m,
            None => return Ok(()),
        };
        if self.cd.rows() == 0 {
            // No conditions at all: the case covers the whole space.
            self.u = Some(Matrix::zeros(0, self.ssystem.num_independent()));
            self.zeta = Some(Matrix::zeros(0, 1));
            return Ok(());
        }
        let w = self.cd.mul(m)?;
        let zeta = w.mul(&self.ssystem.b())?.add(&self.delta)?;
        let u = w.mul(&self.ssystem.a_i())?.sub(&self.ci)?.scale(-1.0);
        self.u = Some(u);
        self.zeta = Some(zeta);
        Ok(())
    }

    /// Append extra condition rows (already in matrix form) and rebuild the
    /// boundaries.
    pub fn add_conditions(
        &mut self,
        cd: &Matrix,
        ci: &Matrix,
        delta: &Matrix,
    ) -> Result<(), CaseError> {
        if cd.cols() != self.cd.cols()
            || ci.cols() != self.ci.cols()
            || cd.rows() != ci.rows()
            || cd.rows() != delta.rows()
        {
            return Err(CaseError::Matrix(MatrixError::Shape {
                lr: cd.rows(),
                lc: cd.cols(),
                rr: ci.rows(),
                rc: ci.cols(),
            }));
        }
        self.cd = self.cd.vstack(cd)?;
        self.ci = self.ci.vstack(ci)?;
        self.delta = self.delta.vstack(delta)?;
        self.rebuild_boundaries()
    }

    /// Parse inequality strings and append them as condition rows.
    pub fn add_constraints(&mut self, constraints: &[&str]) -> Result<(), CaseError> {
        let (cd, ci, delta) =
            parse_constraints(constraints, self.ssystem.xd(), self.ssystem.xi())?;
        self.add_conditions(&cd, &ci, &delta)
    }

    // ------------------------- Accessors -------------------------

    /// The case's S-system.
    pub fn ssystem(&self) -> &SSystem {
        &self.ssystem
    }

    /// The dominant-term signature (one-based digits).
    pub fn signature(&self) -> &[usize] {
        &self.signature
    }

    /// Condition rows over dependent variables (`c × n`).
    pub fn cd(&self) -> &Matrix {
        &self.cd
    }

    /// Condition rows over independent variables (`c × m`).
    pub fn ci(&self) -> &Matrix {
        &self.ci
    }

    /// Condition constants (`c × 1`, log10 coefficient ratios).
    pub fn delta(&self) -> &Matrix {
        &self.delta
    }

    /// Boundary matrix over log-independent coordinates, absent for
    /// singular cases.
    pub fn u(&self) -> Option<&Matrix> {
        self.u.as_ref()
    }

    /// Boundary constants, absent for singular cases.
    pub fn zeta(&self) -> Option<&Matrix> {
        self.zeta.as_ref()
    }

    /// Whether the case has boundary matrices (equivalently, a steady-state
    /// map).
    pub fn has_boundaries(&self) -> bool {
        self.u.is_some()
    }

    /// Whether the underlying S-system is singular.
    pub fn is_singular(&self) -> bool {
        self.ssystem.is_singular()
    }

    /// The case number under the engine endianness it was built with.
    pub fn case_number(&self) -> usize {
        self.case_number
    }

    /// The string identifier, `"<prefix>_<n>"` or `"<n>"`.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Number of condition rows.
    pub fn num_conditions(&self) -> usize {
        self.cd.rows()
    }

    /// Logarithmic gain of the case's S-system.
    pub fn logarithmic_gain(&self, xd_name: &str, xi_name: &str) -> Result<f64, CaseError> {
        Ok(self.ssystem.logarithmic_gain(xd_name, xi_name)?)
    }

    /// Evaluate `U·log10(point) + ζ` at a linear-space point.
    pub fn boundaries_at_point(&self, point: &VariablePool) -> Result<Matrix, CaseError> {
        let u = self.u.as_ref().ok_or(SSystemError::Singular)?;
        let zeta = self.zeta.as_ref().ok_or(SSystemError::Singular)?;
        let mut x = Matrix::zeros(self.ssystem.num_independent(), 1);
        for (j, name) in self.ssystem.xi().names().enumerate() {
            let value = point.value_of(name).map_err(|_| {
                SSystemError::BadIndependentValue {
                    name: name.to_string(),
                    reason: "missing from the evaluation pool",
                }
            })?;
            if !(value.is_finite() && value > 0.0) {
                return Err(CaseError::SSystem(SSystemError::BadIndependentValue {
                    name: name.to_string(),
                    reason: "must be strictly positive and finite",
                }));
            }
            x.put(j, 0, value.log10());
        }
        Ok(u.mul(&x)?.add(zeta)?)
    }

    // ------------------------- Rendering -------------------------

    /// The dominance conditions in cartesian form:
    /// `10^Δ · Π X_d^C_d · Π X_i^C_i > 1`.
    pub fn conditions(&self) -> Vec<Expr> {
        (0..self.cd.rows())
            .map(|row| {
                let mut lhs = Expr::Constant(10f64.powf(self.delta.at(row, 0)));
                for (col, name) in self.ssystem.xd().names().enumerate() {
                    let e = self.cd.at(row, col);
                    if e.abs() > EPS_ZERO {
                        lhs = Expr::mul(lhs, Expr::pow(Expr::var(name), Expr::Constant(e)));
                    }
                }
                for (col, name) in self.ssystem.xi().names().enumerate() {
                    let e = self.ci.at(row, col);
                    if e.abs() > EPS_ZERO {
                        lhs = Expr::mul(lhs, Expr::pow(Expr::var(name), Expr::Constant(e)));
                    }
                }
                Expr::relation(RelOp::Greater, lhs, Expr::Constant(1.0))
            })
            .collect()
    }

    /// The dominance conditions in logarithmic form:
    /// `Δ + Σ C_d·log10 X_d + Σ C_i·log10 X_i > 0`.
    pub fn logarithmic_conditions(&self) -> Vec<Expr> {
        (0..self.cd.rows())
            .map(|row| {
                let mut lhs = Expr::Constant(self.delta.at(row, 0));
                for (col, name) in self.ssystem.xd().names().enumerate() {
                    let e = self.cd.at(row, col);
                    if e.abs() > EPS_ZERO {
                        lhs = Expr::add(
                            lhs,
                            Expr::mul(
                                Expr::Constant(e),
                                Expr::function("log10", Expr::var(name)),
                            ),
                        );
                    }
                }
                for (col, name) in self.ssystem.xi().names().enumerate() {
                    let e = self.ci.at(row, col);
                    if e.abs() > EPS_ZERO {
                        lhs = Expr::add(
                            lhs,
                            Expr::mul(
                                Expr::Constant(e),
                                Expr::function("log10", Expr::var(name)),
                            ),
                        );
                    }
                }
                Expr::relation(RelOp::Greater, lhs, Expr::Constant(0.0))
            })
            .collect()
    }

    /// The validity boundaries in logarithmic form:
    /// `ζ + Σ U·log10 X_i > 0`; empty for singular cases.
    pub fn logarithmic_boundaries(&self) -> Vec<Expr> {
        let (u, zeta) = match (&self.u, &self.zeta) {
            (Some(u), Some(zeta)) => (u, zeta),
            _ => return Vec::new(),
        };
        (0..u.rows())
            .map(|row| {
                let mut lhs = Expr::Constant(zeta.at(row, 0));
                for (col, name) in self.ssystem.xi().names().enumerate() {
                    let e = u.at(row, col);
                    if e.abs() > EPS_ZERO {
                        lhs = Expr::add(
                            lhs,
                            Expr::mul(
                                Expr::Constant(e),
                                Expr::function("log10", Expr::var(name)),
                            ),
                        );
                    }
                }
                Expr::relation(RelOp::Greater, lhs, Expr::Constant(0.0))
            })
            .collect()
    }
}

impl PartialEq for DsCase {
    fn eq(&self, other: &Self) -> bool {
        self.identifier == other.identifier
            && self.case_number == other.case_number
            && self.signature == other.signature
            && self.ssystem == other.ssystem
            && self.cd == other.cd
            && self.ci == other.ci
            && self.delta == other.delta
            && self.u == other.u
            && self.zeta == other.zeta
    }
}

// -----------------------------------------------------------------------------
// Condition construction
// -----------------------------------------------------------------------------

fn validate_signature(signature: &[usize], sigma: &[usize]) -> Result<(), CaseError> {
    if signature.len() != sigma.len() {
        return Err(CaseError::SignatureLength {
            got: signature.len(),
            expected: sigma.len(),
        });
    }
    for (slot, (&digit, &bound)) in signature.iter().zip(sigma.iter()).enumerate() {
        if digit == 0 || digit > bound {
            return Err(CaseError::SignatureOutOfRange { digit, slot, bound });
        }
    }
    Ok(())
}

/// One condition row per non-chosen term: "chosen term dominates term j".
fn condition_matrices(
    gma: &Gma,
    signature: &[usize],
) -> Result<(Matrix, Matrix, Matrix), CaseError> {
    let n = gma.num_equations();
    let m = gma.num_independent();
    let rows: usize = gma.signature().iter().map(|s| s - 1).sum();
    let mut cd = Matrix::zeros(rows, n);
    let mut ci = Matrix::zeros(rows, m);
    let mut delta = Matrix::zeros(rows, 1);
    let mut row = 0;
    for slot in 0..2 * n {
        let equation = slot / 2;
        let sign = if slot % 2 == 0 { TermSign::Positive } else { TermSign::Negative };
        let view = gma.term_view(sign);
        let chosen = signature[slot] - 1;
        for j in 0..gma.signature()[slot] {
            if j == chosen {
                continue;
            }
            let ratio = view.coefficients.at(equation, chosen) / view.coefficients.at(equation, j);
            delta.put(row, 0, ratio.log10());
            for k in 0..n {
                let value =
                    view.dependent[equation].at(chosen, k) - view.dependent[equation].at(j, k);
                cd.put(row, k, value);
            }
            for k in 0..m {
                let value =
                    view.independent[equation].at(chosen, k) - view.independent[equation].at(j, k);
                ci.put(row, k, value);
            }
            row += 1;
        }
    }
    debug_assert_eq!(row, rows);
    Ok((cd, ci, delta))
}

/// Parse inequality strings into condition rows over `(X_d, X_i)`.
///
/// Each constraint is interpreted multiplicatively: every monomial on the
/// dominant side contributes its exponents positively, every monomial on the
/// other side negatively, and coefficient ratios accumulate into Δ.
pub fn parse_constraints(
    constraints: &[&str],
    xd: &Arc<VariablePool>,
    xi: &Arc<VariablePool>,
) -> Result<(Matrix, Matrix, Matrix), CaseError> {
    let mut cd = Matrix::zeros(constraints.len(), xd.len());
    let mut ci = Matrix::zeros(constraints.len(), xi.len());
    let mut delta = Matrix::zeros(constraints.len(), 1);
    for (index, text) in constraints.iter().enumerate() {
        let parsed =
            parse_equation(text).map_err(|source| CaseError::Constraint { index, source })?;
        let (op, lhs, rhs) = match &parsed {
            Expr::Relation(op, lhs, rhs) => (*op, lhs.as_ref(), rhs.as_ref()),
            _ => unreachable!("parse_equation yields relations"),
        };
        let flip = match op {
            RelOp::Greater => 1.0,
            RelOp::Less => -1.0,
            RelOp::Equal => {
                return Err(CaseError::NotLogLinear {
                    index,
                    reason: "'=' cannot bound a validity region".to_string(),
                })
            }
        };
        for (side, side_sign) in [(lhs, 1.0), (rhs, -1.0)] {
            let monomials: Vec<&Expr> = match side {
                Expr::Sum(children) => children.iter().collect(),
                other => vec![other],
            };
            for monomial in monomials {
                accumulate_constraint_row(
                    monomial,
                    flip * side_sign,
                    index,
                    xd,
                    xi,
                    &mut cd,
                    &mut ci,
                    &mut delta,
                )?;
            }
        }
    }
    Ok((cd, ci, delta))
}

#[allow(clippy::too_many_arguments)]
fn accumulate_constraint_row(
    monomial: &Expr,
    sign: f64,
    index: usize,
    xd: &Arc<VariablePool>,
    xi: &Arc<VariablePool>,
    cd: &mut Matrix,
    ci: &mut Matrix,
    delta: &mut Matrix,
) -> Result<(), CaseError> {
    let factors: Vec<&Expr> = match monomial {
        Expr::Product(children) => children.iter().collect(),
        other => vec![other],
    };
    for factor in factors {
        match factor {
            Expr::Constant(c) => {
                let magnitude = c.abs();
                if magnitude == 0.0 {
                    return Err(CaseError::NotLogLinear {
                        index,
                        reason: "zero coefficient".to_string(),
                    });
                }
                delta.put(index, 0, delta.at(index, 0) + sign * magnitude.log10());
            }
            Expr::Variable(name) => {
                add_exponent(name, sign, index, xd, xi, cd, ci)?;
            }
            Expr::Power(base, exponent) => match (base.as_ref(), exponent.as_ref()) {
                (Expr::Variable(name), Expr::Constant(e)) => {
                    add_exponent(name, sign * e, index, xd, xi, cd, ci)?;
                }
                _ => {
                    return Err(CaseError::NotLogLinear {
                        index,
                        reason: format!("{factor} is not variable^constant"),
                    })
                }
            },
            other => {
                return Err(CaseError::NotLogLinear {
                    index,
                    reason: format!("{other} is not a power-law factor"),
                })
            }
        }
    }
    Ok(())
}

fn add_exponent(
    name: &str,
    value: f64,
    index: usize,
    xd: &Arc<VariablePool>,
    xi: &Arc<VariablePool>,
    cd: &mut Matrix,
    ci: &mut Matrix,
) -> Result<(), CaseError> {
    if let Ok(col) = xd.index_of(name) {
        cd.put(index, col, cd.at(index, col) + value);
        Ok(())
    } else if let Ok(col) = xi.index_of(name) {
        ci.put(index, col, ci.at(index, col) + value);
        Ok(())
    } else {
        Err(CaseError::NotLogLinear {
            index,
            reason: format!("unknown variable {name:?}"),
        })
    }
}

// -----------------------------------------------------------------------------
// Signature ↔ case-number bijection
// -----------------------------------------------------------------------------

/// Decode a one-based case number into a one-based signature.
pub fn signature_for_case_number(
    number: usize,
    sigma: &[usize],
    endianness: Endianness,
) -> Result<Vec<usize>, CaseError> {
    let max: usize = sigma.iter().product();
    if number == 0 || number > max {
        return Err(CaseError::NumberOutOfRange { number, max });
    }
    let mut digits = vec![0usize; sigma.len()];
    let mut rest = number - 1;
    match endianness {
        Endianness::Little => {
            for i in 0..sigma.len() {
                digits[i] = rest % sigma[i] + 1;
                rest /= sigma[i];
            }
        }
        Endianness::Big => {
            for i in (0..sigma.len()).rev() {
                digits[i] = rest % sigma[i] + 1;
                rest /= sigma[i];
            }
        }
    }
    Ok(digits)
}

/// Encode a one-based signature into a one-based case number.
pub fn case_number_for_signature(
    signature: &[usize],
    sigma: &[usize],
    endianness: Endianness,
) -> Result<usize, CaseError> {
    validate_signature(signature, sigma)?;
    let mut number = 1usize;
    let mut weight = 1usize;
    match endianness {
        Endianness::Little => {
            for i in 0..sigma.len() {
                number += (signature[i] - 1) * weight;
                weight *= sigma[i];
            }
        }
        Endianness::Big => {
            for i in (0..sigma.len()).rev() {
                number += (signature[i] - 1) * weight;
                weight *= sigma[i];
            }
        }
    }
    Ok(number)
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::VariablePool;

    fn loop_gma() -> Gma {
        Gma::from_strings(&["x1. = a + b*x1*x2 - c*x1", "x2. = c*x1 - x2"]).unwrap()
    }

    #[test]
    fn condition_rows_count_and_content() {
        let gma = loop_gma();
        let case = DsCase::from_gma(&gma, &[1, 1, 1, 1], None, Endianness::Big).unwrap();
        // σ = (2,1,1,1): one non-chosen term total.
        assert_eq!(case.num_conditions(), 1);
        // Condition: a dominates b*x1*x2, so the row is G[chosen] − G[other]:
        // C_d = (−1, −1), C_i over (a, b, c) = (1, −1, 0), Δ = log10(1/1) = 0.
        assert_eq!(case.cd().at(0, 0), -1.0);
        assert_eq!(case.cd().at(0, 1), -1.0);
        assert_eq!(case.ci().at(0, 0), 1.0);
        assert_eq!(case.ci().at(0, 1), -1.0);
        assert_eq!(case.ci().at(0, 2), 0.0);
        assert_eq!(case.delta().at(0, 0), 0.0);
    }

    #[test]
    fn boundary_matrices_substitute_steady_state() {
        let gma = loop_gma();
        let case = DsCase::from_gma(&gma, &[1, 1, 1, 1], None, Endianness::Big).unwrap();
        assert!(case.has_boundaries());
        let u = case.u().unwrap();
        let zeta = case.zeta().unwrap();
        // Algebraic closure: at any x, U·x + ζ == C_d·y*(x) + C_i·x + Δ.
        let xi0 = VariablePool::from_pairs([("a", 3.0), ("b", 0.25), ("c", 2.0)]).unwrap();
        let y = case.ssystem().logarithmic_steady_state(&xi0).unwrap();
        let x = Matrix::from_fn(3, 1, |j, _| {
            xi0.value_at(j).unwrap().log10()
        });
        let direct = case
            .cd()
            .mul(&y)
            .unwrap()
            .add(&case.ci().mul(&x).unwrap())
            .unwrap()
            .add(case.delta())
            .unwrap();
        let via_boundaries = u.mul(&x).unwrap().add(zeta).unwrap();
        for row in 0..direct.rows() {
            assert!((direct.at(row, 0) - via_boundaries.at(row, 0)).abs() < 1e-10);
        }
    }

    #[test]
    fn condition_consistency_at_interior_point() {
        let gma = loop_gma();
        let case = DsCase::from_gma(&gma, &[1, 1, 1, 1], None, Endianness::Big).unwrap();
        // Pick a point where a dominates b*x1*x2: small b.
        let point = VariablePool::from_pairs([("a", 1.0), ("b", 1e-4), ("c", 1.0)]).unwrap();
        let values = case.boundaries_at_point(&point).unwrap();
        assert!(values.at(0, 0) > 0.0);
        // At steady state (x1=a/c=1, x2=a=1) the chosen source term a=1
        // exceeds the non-chosen b*x1*x2 = 1e-4.
        let y = case.ssystem().steady_state(&point).unwrap();
        let chosen = 1.0; // a
        let other = 1e-4 * y.at(0, 0) * y.at(1, 0);
        assert!(chosen > other);
    }

    #[test]
    fn scenario_c_bijection() {
        let sigma = [3, 2, 4, 3];
        assert_eq!(
            case_number_for_signature(&[1, 1, 1, 1], &sigma, Endianness::Big).unwrap(),
            1
        );
        assert_eq!(
            case_number_for_signature(&[3, 2, 4, 3], &sigma, Endianness::Big).unwrap(),
            72
        );
        assert_eq!(
            case_number_for_signature(&[2, 1, 3, 2], &sigma, Endianness::Big).unwrap(),
            32
        );
        // Round trip over the whole space, both conventions.
        for endianness in [Endianness::Big, Endianness::Little] {
            for n in 1..=72 {
                let sig = signature_for_case_number(n, &sigma, endianness).unwrap();
                let back = case_number_for_signature(&sig, &sigma, endianness).unwrap();
                assert_eq!(back, n);
            }
        }
    }

    #[test]
    fn mixed_radix_boundaries() {
        let sigma = [3, 2, 4, 3];
        for endianness in [Endianness::Big, Endianness::Little] {
            assert_eq!(
                signature_for_case_number(1, &sigma, endianness).unwrap(),
                vec![1, 1, 1, 1]
            );
            assert_eq!(
                signature_for_case_number(72, &sigma, endianness).unwrap(),
                vec![3, 2, 4, 3]
            );
            // Adjacent case numbers differ by incrementing digits with carry;
            // the least significant digit moves first.
            let a = signature_for_case_number(1, &sigma, endianness).unwrap();
            let b = signature_for_case_number(2, &sigma, endianness).unwrap();
            let differing: Vec<usize> =
                (0..4).filter(|&i| a[i] != b[i]).collect();
            assert_eq!(differing.len(), 1);
        }
        assert!(matches!(
            signature_for_case_number(0, &sigma, Endianness::Big),
            Err(CaseError::NumberOutOfRange { .. })
        ));
        assert!(matches!(
            signature_for_case_number(73, &sigma, Endianness::Big),
            Err(CaseError::NumberOutOfRange { .. })
        ));
    }

    #[test]
    fn signature_idempotence() {
        let gma = loop_gma();
        let case = DsCase::from_gma(&gma, &[2, 1, 1, 1], None, Endianness::Big).unwrap();
        assert_eq!(case.signature(), &[2, 1, 1, 1]);
        assert_eq!(case.case_number(), 2);
        assert_eq!(case.identifier(), "2");
        let prefixed =
            DsCase::from_gma(&gma, &[2, 1, 1, 1], Some("7"), Endianness::Big).unwrap();
        assert_eq!(prefixed.identifier(), "7_2");
    }

    #[test]
    fn out_of_range_signature_rejected() {
        let gma = loop_gma();
        assert!(matches!(
            DsCase::from_gma(&gma, &[3, 1, 1, 1], None, Endianness::Big),
            Err(CaseError::SignatureOutOfRange { .. })
        ));
    }

    #[test]
    fn constraints_append_boundary_rows() {
        let gma = loop_gma();
        let mut case = DsCase::from_gma(&gma, &[1, 1, 1, 1], None, Endianness::Big).unwrap();
        let before = case.num_conditions();
        case.add_constraints(&["10*a > c"]).unwrap();
        assert_eq!(case.num_conditions(), before + 1);
        let u = case.u().unwrap();
        assert_eq!(u.rows(), before + 1);
        // The appended row involves no dependent variable, so U keeps the
        // raw C_i and ζ the raw Δ: a − c in logs, shifted by 1.
        let row = before;
        assert_eq!(case.ci().at(row, 0), 1.0);
        assert_eq!(case.ci().at(row, 2), -1.0);
        assert!((case.delta().at(row, 0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn rejects_non_log_linear_constraints() {
        let gma = loop_gma();
        let mut case = DsCase::from_gma(&gma, &[1, 1, 1, 1], None, Endianness::Big).unwrap();
        assert!(matches!(
            case.add_constraints(&["a = c"]),
            Err(CaseError::NotLogLinear { .. })
        ));
        assert!(matches!(
            case.add_constraints(&["log(a) > c"]),
            Err(CaseError::NotLogLinear { .. })
        ));
    }

    #[test]
    fn conditions_render_both_forms() {
        let gma = loop_gma();
        let case = DsCase::from_gma(&gma, &[1, 1, 1, 1], None, Endianness::Big).unwrap();
        let cartesian = case.conditions();
        let logarithmic = case.logarithmic_conditions();
        assert_eq!(cartesian.len(), 1);
        assert_eq!(logarithmic.len(), 1);
        assert!(matches!(cartesian[0], Expr::Relation(RelOp::Greater, _, _)));
        // Boundaries render one row per condition for non-singular cases.
        assert_eq!(case.logarithmic_boundaries().len(), 1);
    }

    #[test]
    fn case_gain_delegates_to_ssystem() {
        let gma = loop_gma();
        let case = DsCase::from_gma(&gma, &[1, 1, 1, 1], None, Endianness::Big).unwrap();
        assert!((case.logarithmic_gain("x2", "a").unwrap() - 1.0).abs() < 1e-12);
        assert!(case.logarithmic_gain("x2", "c").unwrap().abs() < 1e-12);
    }
}
