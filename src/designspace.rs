//! Design Spaces
//!
//! The user-facing façade: owns a GMA, indexes cases by signature or case
//! number, memoizes validity verdicts and cyclical-case resolutions, and
//! exposes enumeration queries (all valid cases, validity on parameter
//! slices, vertex enumeration).
//!
//! Two modes exist. A **primary** design space is built directly from user
//! equations. A **derived** design space is produced by the cyclical-case
//! resolver: it pre-declares that its cases inherit the accumulated
//! dominance conditions of the singular case it refines, carries that case's
//! identifier as prefix, and resolves its own singular cases recursively.
//! Recursion depth is bounded; resolution past the bound is declared empty
//! rather than risked unbounded.

use std::sync::{Arc, Mutex};

use rustc_hash::FxHashMap;

use crate::case::{self, CaseError, DsCase};
use crate::cyclical::CyclicalCase;
use crate::expr::Expr;
use crate::gma::{Gma, GmaError};
use crate::matrix::{Matrix, MatrixError};
use crate::polytope::{self, PolytopeError, Validity};
use crate::pool::VariablePool;
use crate::{ConfigError, Endianness};

/// How a design space came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Built directly from user equations.
    Primary,
    /// Built by the cyclical-case resolver to refine a singular case.
    Derived,
}

/// Maximum derived-mode nesting; deeper cycles are declared empty.
const MAX_DERIVED_DEPTH: usize = 16;

/// Errors surfaced by design-space operations.
#[derive(Debug, thiserror::Error)]
pub enum DesignSpaceError {
    /// Equation lowering failed.
    #[error(transparent)]
    Gma(#[from] GmaError),
    /// Case construction failed.
    #[error(transparent)]
    Case(#[from] CaseError),
    /// A slice or vertex query failed.
    #[error(transparent)]
    Polytope(#[from] PolytopeError),
    /// Process-wide configuration conflict.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A matrix operation failed.
    #[error(transparent)]
    Matrix(#[from] MatrixError),
    /// Constraints were added after the validity memo was populated without
    /// opting into invalidation.
    #[error("validity queries already ran; use add_constraints to invalidate the memo")]
    ConstraintsAfterQueries,
}

/// A design space: a GMA plus memoized case analysis.
#[derive(Debug)]
pub struct DesignSpace {
    gma: Gma,
    endianness: Endianness,
    mode: Mode,
    prefix: Option<String>,
    depth: usize,
    extra: Option<(Matrix, Matrix, Matrix)>,
    valid_memo: Mutex<[Option<Vec<usize>>; 2]>,
    cyclical: Mutex<FxHashMap<usize, Arc<CyclicalCase>>>,
}

impl Clone for DesignSpace {
    fn clone(&self) -> Self {
        DesignSpace {
            gma: self.gma.clone(),
            endianness: self.endianness,
            mode: self.mode,
            prefix: self.prefix.clone(),
            depth: self.depth,
            extra: self.extra.clone(),
            valid_memo: Mutex::new(self.valid_memo.lock().expect("memo lock").clone()),
            cyclical: Mutex::new(self.cyclical.lock().expect("cyclical lock").clone()),
        }
    }
}

impl DesignSpace {
    // ------------------------- Construction -------------------------

    /// A primary design space over an already-lowered GMA, using the
    /// process-wide endianness.
    pub fn new(gma: Gma) -> Self {
        let endianness = crate::endianness();
        tracing::debug!(
            digest = %hex::encode(gma.digest()),
            cases = gma.num_cases(),
            "design space constructed"
        );
        DesignSpace {
            gma,
            endianness,
            mode: Mode::Primary,
            prefix: None,
            depth: 0,
            extra: None,
            valid_memo: Mutex::new([None, None]),
            cyclical: Mutex::new(FxHashMap::default()),
        }
    }

    /// A primary design space with an explicit endianness; fixes the
    /// process-wide convention and fails on a conflicting earlier choice.
    pub fn with_endianness(gma: Gma, endianness: Endianness) -> Result<Self, ConfigError> {
        crate::set_endianness(endianness)?;
        Ok(Self::new(gma))
    }

    /// Parse and lower equation strings into a primary design space.
    pub fn from_strings(equations: &[&str]) -> Result<Self, DesignSpaceError> {
        Ok(Self::new(Gma::from_strings(equations)?))
    }

    /// A derived design space over rewritten equations (cyclical resolver
    /// only). Inherited condition rows are remapped onto the child's
    /// dependent-variable order by name.
    pub(crate) fn derived(
        equations: Vec<Expr>,
        parent_gma: &Gma,
        conditions: (Matrix, Matrix, Matrix),
        prefix: String,
        depth: usize,
    ) -> Result<Self, DesignSpaceError> {
        let gma = Gma::from_equations_with(
            equations,
            Some(parent_gma.xd_a().as_ref()),
            Some(parent_gma.xi().as_ref()),
        )?;
        let (cd, ci, delta) = conditions;
        // The child lists the same dependent variables, possibly reordered.
        let mut remapped = Matrix::zeros(cd.rows(), gma.num_equations());
        for (old_col, name) in parent_gma.xd().names().enumerate() {
            if let Ok(new_col) = gma.xd().index_of(name) {
                for row in 0..cd.rows() {
                    remapped.put(row, new_col, cd.at(row, old_col));
                }
            }
        }
        Ok(DesignSpace {
            gma,
            endianness: crate::endianness(),
            mode: Mode::Derived,
            prefix: Some(prefix),
            depth,
            extra: Some((remapped, ci, delta)),
            valid_memo: Mutex::new([None, None]),
            cyclical: Mutex::new(FxHashMap::default()),
        })
    }

    /// Reassemble a design space from decoded parts (memos start empty).
    pub(crate) fn from_parts(
        gma: Gma,
        endianness: Endianness,
        mode: Mode,
        prefix: Option<String>,
        extra: Option<(Matrix, Matrix, Matrix)>,
    ) -> Self {
        DesignSpace {
            gma,
            endianness,
            mode,
            prefix,
            depth: 0,
            extra,
            valid_memo: Mutex::new([None, None]),
            cyclical: Mutex::new(FxHashMap::default()),
        }
    }

    // ------------------------- Accessors -------------------------

    /// The lowered system.
    pub fn gma(&self) -> &Gma {
        &self.gma
    }

    /// Primary or derived.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The digit convention of this design space's case numbering.
    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// The identifier prefix cases of this design space carry.
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Derived-mode nesting depth (0 for primary).
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Total number of signatures: `Π σ[i]`.
    pub fn number_of_cases(&self) -> usize {
        self.gma.num_cases()
    }

    // ------------------------- Case construction -------------------------

    /// Build the case with the given dominant-term signature.
    pub fn case_with_signature(&self, signature: &[usize]) -> Result<DsCase, CaseError> {
        DsCase::from_gma_with_conditions(
            &self.gma,
            signature,
            self.prefix.as_deref(),
            self.endianness,
            self.extra.as_ref().map(|(cd, ci, delta)| (cd, ci, delta)),
        )
    }

    /// Build the case with the given case number (1-based).
    pub fn case_with_case_number(&self, number: usize) -> Result<DsCase, CaseError> {
        let signature =
            case::signature_for_case_number(number, self.gma.signature(), self.endianness)?;
        self.case_with_signature(&signature)
    }

    // ------------------------- Validity enumeration -------------------------

    /// Case numbers of all valid cases, memoized per strictness, in
    /// case-number order. Singular cases are excluded (they belong to the
    /// cyclical dictionary).
    pub fn valid_case_numbers(&self, strict: bool) -> Vec<usize> {
        let slot = usize::from(strict);
        if let Some(memo) = &self.valid_memo.lock().expect("memo lock")[slot] {
            return memo.clone();
        }
        let mut numbers = Vec::new();
        for number in 1..=self.number_of_cases() {
            let case = match self.case_with_case_number(number) {
                Ok(case) => case,
                Err(err) => {
                    tracing::warn!(number, %err, "case construction failed during enumeration");
                    continue;
                }
            };
            if polytope::is_valid(&case, strict) == Validity::Valid {
                numbers.push(number);
            }
        }
        self.valid_memo.lock().expect("memo lock")[slot] = Some(numbers.clone());
        numbers
    }

    /// Number of strictly valid cases.
    pub fn number_of_valid_cases(&self) -> usize {
        self.valid_case_numbers(true).len()
    }

    /// All valid cases, built, in case-number order.
    pub fn valid_cases(&self, strict: bool) -> Vec<DsCase> {
        self.valid_case_numbers(strict)
            .into_iter()
            .filter_map(|number| self.case_with_case_number(number).ok())
            .collect()
    }

    /// Valid cases restricted to a parameter slice, including the subcases
    /// of resolved cyclical cases.
    pub fn valid_cases_for_slice(
        &self,
        lower: &VariablePool,
        upper: &VariablePool,
        strict: bool,
    ) -> Result<Vec<DsCase>, DesignSpaceError> {
        let mut out = Vec::new();
        for number in 1..=self.number_of_cases() {
            let case = match self.case_with_case_number(number) {
                Ok(case) => case,
                Err(_) => continue,
            };
            if case.has_boundaries()
                && polytope::is_valid_for_slice(&case, lower, upper, strict)? == Validity::Valid
            {
                out.push(case);
            }
        }
        for cyclical in self.cyclical.lock().expect("cyclical lock").values() {
            out.extend(cyclical.internal().valid_cases_for_slice(lower, upper, strict)?);
        }
        Ok(out)
    }

    // ------------------------- Constraints -------------------------

    /// Parse inequality strings and merge them into every subsequently
    /// built case. Invalidate the validity memo and the cyclical dictionary.
    pub fn add_constraints(&mut self, constraints: &[&str]) -> Result<(), DesignSpaceError> {
        let (cd, ci, delta) =
            case::parse_constraints(constraints, self.gma.xd(), self.gma.xi())?;
        self.extra = Some(match self.extra.take() {
            Some((ecd, eci, edelta)) => (
                ecd.vstack(&cd)?,
                eci.vstack(&ci)?,
                edelta.vstack(&delta)?,
            ),
            None => (cd, ci, delta),
        });
        *self.valid_memo.lock().expect("memo lock") = [None, None];
        self.cyclical.lock().expect("cyclical lock").clear();
        Ok(())
    }

    /// Like [`DesignSpace::add_constraints`], but refuse instead of
    /// invalidating a populated validity memo.
    pub fn try_add_constraints(&mut self, constraints: &[&str]) -> Result<(), DesignSpaceError> {
        let populated = self
            .valid_memo
            .lock()
            .expect("memo lock")
            .iter()
            .any(Option::is_some);
        if populated {
            return Err(DesignSpaceError::ConstraintsAfterQueries);
        }
        self.add_constraints(constraints)
    }

    // ------------------------- Cyclical cases -------------------------

    /// Resolve every singular, condition-feasible case into a child design
    /// space; returns the number of resolved cases. Results are memoized.
    pub fn calculate_cyclical_cases(&self) -> usize {
        if self.depth >= MAX_DERIVED_DEPTH {
            tracing::warn!(
                depth = self.depth,
                "cyclical recursion bound reached; remaining cycles declared empty"
            );
            return 0;
        }
        for number in 1..=self.number_of_cases() {
            if self.cyclical.lock().expect("cyclical lock").contains_key(&number) {
                continue;
            }
            let case = match self.case_with_case_number(number) {
                Ok(case) => case,
                Err(_) => continue,
            };
            if !case.is_singular() {
                continue;
            }
            match polytope::conditions_are_feasible(&case) {
                Ok(Validity::Valid) => {}
                _ => continue,
            }
            if let Some(resolved) = CyclicalCase::resolve(self, &case) {
                tracing::debug!(
                    case = case.identifier(),
                    subcases = resolved.number_of_subcases(),
                    "cyclical case resolved"
                );
                self.cyclical
                    .lock()
                    .expect("cyclical lock")
                    .insert(number, Arc::new(resolved));
            }
        }
        self.cyclical.lock().expect("cyclical lock").len()
    }

    /// The resolved cyclical case for a case number, if any.
    pub fn cyclical_case(&self, number: usize) -> Option<Arc<CyclicalCase>> {
        self.cyclical.lock().expect("cyclical lock").get(&number).cloned()
    }

    /// Case numbers with resolved cyclical children, ascending.
    pub fn cyclical_case_numbers(&self) -> Vec<usize> {
        let mut numbers: Vec<usize> =
            self.cyclical.lock().expect("cyclical lock").keys().copied().collect();
        numbers.sort_unstable();
        numbers
    }

    // ------------------------- Geometry -------------------------

    /// Vertex enumeration for one case on a slice; see
    /// [`polytope::vertices_for_slice`].
    pub fn vertices_for_slice(
        &self,
        case_number: usize,
        lower: &VariablePool,
        upper: &VariablePool,
        variables: &[&str],
    ) -> Result<Vec<Vec<f64>>, DesignSpaceError> {
        let case = self.case_with_case_number(case_number)?;
        Ok(polytope::vertices_for_slice(&case, lower, upper, variables)?)
    }

    /// Stable digest of the design space: the GMA digest mixed with any
    /// design-space-level condition rows.
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"designspace.ds.v1");
        hasher.update(&self.gma.digest());
        if let Some((cd, ci, delta)) = &self.extra {
            for matrix in [cd, ci, delta] {
                hasher.update(&(matrix.rows() as u64).to_le_bytes());
                for i in 0..matrix.rows() {
                    for j in 0..matrix.cols() {
                        hasher.update(&matrix.at(i, j).to_le_bytes());
                    }
                }
            }
        }
        *hasher.finalize().as_bytes()
    }

    /// The design-space-level condition rows, if any.
    pub fn conditions(&self) -> Option<(&Matrix, &Matrix, &Matrix)> {
        self.extra.as_ref().map(|(cd, ci, delta)| (cd, ci, delta))
    }
}

impl PartialEq for DesignSpace {
    fn eq(&self, other: &Self) -> bool {
        self.gma == other.gma
            && self.endianness == other.endianness
            && self.mode == other.mode
            && self.prefix == other.prefix
            && self.extra == other.extra
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn loop_space() -> DesignSpace {
        DesignSpace::from_strings(&["x1. = a + b*x1*x2 - c*x1", "x2. = c*x1 - x2"]).unwrap()
    }

    fn receptor_network() -> DesignSpace {
        DesignSpace::from_strings(&[
            "x1. = v1 + k21*x2 + k61*x6 + k71*x7 - k12*x1 - k16*x1 - k17*x1",
            "x2. = k12*x1 - k21*x2 - k23*x2*x7",
            "x3. = k23*x2*x7 + k563*x5*x6 - k34*x3 - k356*x3",
            "x4. = k34*x3 - k45*x4 - k4*x4",
            "x5. = k356*x3 + k45*x4 + k65*x6 - k563*x5*x6 - k56*x5",
            "x6. = k356*x3 + k16*x1 + k56*x5 + k76*x7 - k563*x5*x6 - k61*x6 - k65*x6 - k67*x6",
            "x7. = k17*x1 + k67*x6 - k23*x2*x7 - k76*x7 - k71*x7 - k7*x7",
        ])
        .unwrap()
    }

    #[test]
    fn scenario_a_enumeration() {
        let ds = loop_space();
        assert_eq!(ds.number_of_cases(), 2);
        let valid = ds.valid_case_numbers(true);
        // Case 1 (a dominates) is a valid regime; case 2 is well-posed and
        // also achievable with b large.
        assert!(valid.contains(&1));
        assert_eq!(ds.number_of_valid_cases(), valid.len());
        // Memo hit returns the same answer.
        assert_eq!(ds.valid_case_numbers(true), valid);
    }

    #[test]
    fn case_lookup_by_number_and_signature_agree() {
        let ds = loop_space();
        for number in 1..=ds.number_of_cases() {
            let by_number = ds.case_with_case_number(number).unwrap();
            let by_signature = ds.case_with_signature(by_number.signature()).unwrap();
            assert_eq!(by_number, by_signature);
            assert_eq!(by_number.case_number(), number);
        }
        assert!(matches!(
            ds.case_with_case_number(0),
            Err(CaseError::NumberOutOfRange { .. })
        ));
        assert!(matches!(
            ds.case_with_case_number(3),
            Err(CaseError::NumberOutOfRange { .. })
        ));
    }

    #[test]
    fn constraints_merge_into_new_cases() {
        let mut ds = loop_space();
        let before = ds.case_with_case_number(1).unwrap().num_conditions();
        ds.add_constraints(&["c > 10*a"]).unwrap();
        let case = ds.case_with_case_number(1).unwrap();
        assert_eq!(case.num_conditions(), before + 1);
        // The design-space rows are prepended, so row 0 is the constraint.
        assert!((case.delta().at(0, 0) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn constraint_gate_respects_populated_memo() {
        let mut ds = loop_space();
        ds.try_add_constraints(&["c > a"]).unwrap();
        let _ = ds.number_of_valid_cases();
        assert!(matches!(
            ds.try_add_constraints(&["a > c"]),
            Err(DesignSpaceError::ConstraintsAfterQueries)
        ));
        // The forcing variant invalidates and succeeds.
        ds.add_constraints(&["a > c"]).unwrap();
        let _ = ds.number_of_valid_cases();
    }

    #[test]
    fn cyclical_dictionary_memoizes() {
        let ds = DesignSpace::from_strings(&[
            "x1. = a + k21*x2 - k12*x1",
            "x2. = k12*x1 - k21*x2 - g*x2",
        ])
        .unwrap();
        // Two dominance choices close a cycle: the pure exchange (case 3)
        // and the exponent-degenerate variant draining through g (case 4).
        let resolved = ds.calculate_cyclical_cases();
        assert_eq!(resolved, 2);
        let numbers = ds.cyclical_case_numbers();
        assert_eq!(numbers, vec![3, 4]);
        let cyclical = ds.cyclical_case(numbers[0]).unwrap();
        assert!(cyclical.is_valid(true));
        // Re-running does not rebuild or grow the dictionary.
        assert_eq!(ds.calculate_cyclical_cases(), 2);
    }

    #[test]
    fn slice_enumeration_includes_cyclical_resolutions() {
        let ds = DesignSpace::from_strings(&[
            "x1. = a + k21*x2 - k12*x1",
            "x2. = k12*x1 - k21*x2 - g*x2",
        ])
        .unwrap();
        ds.calculate_cyclical_cases();
        // A slice deep in the exchange-dominated regime: k12, k21 huge,
        // inflow and outflow tiny.
        let lower = VariablePool::from_pairs([
            ("a", 1e-3),
            ("k12", 1e3),
            ("k21", 1e3),
            ("g", 1e-3),
        ])
        .unwrap();
        let upper = VariablePool::from_pairs([
            ("a", 1e-2),
            ("k12", 1e4),
            ("k21", 1e4),
            ("g", 1e-2),
        ])
        .unwrap();
        let cases = ds.valid_cases_for_slice(&lower, &upper, true).unwrap();
        assert!(!cases.is_empty());
        // At least one of the returned cases is a cyclical resolution,
        // identifiable by its prefixed identifier.
        assert!(cases.iter().any(|case| case.identifier().contains('_')));
    }

    #[test]
    fn scenario_b_construction_and_targeted_queries() {
        let ds = receptor_network();
        assert_eq!(ds.gma().num_equations(), 7);
        assert_eq!(ds.gma().signature(), &[4, 3, 1, 2, 2, 2, 1, 2, 3, 2, 4, 4, 2, 4]);
        assert_eq!(ds.number_of_cases(), 147_456);

        // The all-first-terms case must construct and carry the full
        // condition complement.
        let first = ds.case_with_case_number(1).unwrap();
        assert_eq!(first.signature(), &[1; 14]);
        let conditions: usize = ds.gma().signature().iter().map(|s| s - 1).sum();
        assert_eq!(first.num_conditions(), conditions);

        // Scan for the first valid case; the network has non-empty regimes.
        let mut found_valid = None;
        for number in 1..=ds.number_of_cases() {
            let case = match ds.case_with_case_number(number) {
                Ok(case) => case,
                Err(_) => continue,
            };
            if polytope::is_valid(&case, true) == Validity::Valid {
                found_valid = Some(number);
                break;
            }
        }
        assert!(found_valid.is_some(), "no valid case in the receptor network");

        // Scan for the first resolvable singular case and resolve it to a
        // fixpoint; the recursion must terminate.
        for number in 1..=ds.number_of_cases() {
            let case = match ds.case_with_case_number(number) {
                Ok(case) => case,
                Err(_) => continue,
            };
            if !case.is_singular() {
                continue;
            }
            if polytope::conditions_are_feasible(&case).ok() != Some(Validity::Valid) {
                continue;
            }
            if let Some(cyclical) = CyclicalCase::resolve(&ds, &case) {
                assert!(cyclical.number_of_subcases() >= 1);
                break;
            }
        }
    }

    #[test]
    #[ignore = "exhaustive enumeration of all 147456 receptor-network cases"]
    fn scenario_b_exhaustive() {
        let ds = receptor_network();
        assert!(ds.number_of_valid_cases() > 0);
        ds.calculate_cyclical_cases();
        for number in ds.cyclical_case_numbers() {
            let cyclical = ds.cyclical_case(number).unwrap();
            assert!(cyclical.number_of_subcases() >= 1);
        }
    }
}
