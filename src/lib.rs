//! Crate root: public surface, numeric policy, and process-wide configuration
//!
//! This module is the **single canonical entry-point** for downstream users of
//! the library. It centralizes the numeric tolerances shared by the matrix
//! kernel and the polytope engine, the process-wide endianness configuration
//! for the signature↔case-number bijection, and re-exports of the main types.
//!
//! ## Invariants
//!
//! - **Dominance algebra.** A GMA system lowered by [`gma`] satisfies, for
//!   every equation `k`, `signature[2k] ≥ 1` and `signature[2k+1] ≥ 1`, and
//!   all tensor slots beyond the signature are zero. Every case built from it
//!   selects exactly one positive and one negative term per equation.
//!
//! - **Steady-state map.** A non-singular S-system satisfies
//!   `y* = M·b − M·A_i·log10(X_i)` with `M = (G_d − H_d)⁻¹`; the boundary
//!   matrices of a case are the exact substitution of that map into its
//!   condition rows, so `U·x + ζ ≡ C_d·y* + C_i·x + Δ` pointwise.
//!
//! - **Numeric policy.** Magnitudes below [`EPS_ZERO`] are zero for rank,
//!   nullspace and identical-row decisions; determinants below
//!   [`EPS_SINGULAR`] mark an S-system singular; strict polytope feasibility
//!   requires slack above [`EPS_STRICT`]. These constants are the only
//!   tolerances in the crate.
//!
//! - **Endianness.** The first endianness chosen (explicitly via
//!   [`set_endianness`] or implicitly by the big-endian default) is immutable
//!   for the lifetime of the process; a later conflicting choice is a
//!   [`ConfigError::Conflict`], never a silent change of numbering.
//!
//! Domain verdicts are **typed values**, not errors: an S-system knows it is
//! singular, a case knows it lacks boundaries, a polytope query answers
//! infeasible. `Err` is reserved for contract violations (shape mismatches,
//! out-of-range indices, malformed input).

#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms)]

use std::sync::OnceLock;

/// Dense real matrix kernel (nalgebra-backed decompositions).
pub mod matrix;
/// Ordered, named, access-controlled variable pools.
pub mod pool;
/// Canonicalized algebraic expression trees and evaluation.
pub mod expr;
/// Tokenizer and recursive-descent grammar for equation strings.
pub mod parse;
/// GMA lowering: equations → (α, β, G, H) tensors and signature.
pub mod gma;
/// S-system construction, solution, and algebraic reduction.
pub mod ssystem;
/// Case builder: dominance conditions and boundary matrices.
pub mod case;
/// Log-linear polytope engine: feasibility, slices, vertices.
pub mod polytope;
/// Cyclical-case resolver for singular dominance structures.
pub mod cyclical;
/// Design space: case enumeration, memoized validity, cyclical dictionary.
pub mod designspace;
/// Length-prefixed binary persistence with integrity digest.
pub mod io;

// ============================================================================
// Numeric policy (single definition site)
// ============================================================================

/// Magnitudes below this are zero in rank, nullspace and identical-row
/// determinations.
pub const EPS_ZERO: f64 = 1e-13;

/// Determinant magnitude below which an S-system is marked singular.
pub const EPS_SINGULAR: f64 = 1e-14;

/// Minimal slack a strict polytope feasibility verdict requires.
pub const EPS_STRICT: f64 = 1e-14;

/// Significant figures used when rounding nullspace bases before sign and
/// balance decisions.
pub const SIG_FIGURES: u32 = 14;

// ============================================================================
// Process-wide configuration
// ============================================================================

/// Digit order of the mixed-radix signature↔case-number bijection.
///
/// Big-endian (the default, matching the reference numbering) treats the
/// first signature entry as the most significant digit; little-endian the
/// reverse. Exactly one convention is active per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Endianness {
    /// First signature entry is the most significant digit.
    Big,
    /// First signature entry is the least significant digit.
    Little,
}

/// Errors from process-wide configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The endianness was already fixed to a different value.
    #[error("endianness already fixed to {fixed:?}, cannot change to {requested:?}")]
    Conflict {
        /// The convention the process is committed to.
        fixed: Endianness,
        /// The conflicting convention that was requested.
        requested: Endianness,
    },
}

static ENDIANNESS: OnceLock<Endianness> = OnceLock::new();

/// Fix the process-wide endianness of the case-number bijection.
///
/// The first call wins and is idempotent; any later call with the other
/// convention fails. Reading [`endianness`] before any set commits the
/// process to [`Endianness::Big`].
pub fn set_endianness(requested: Endianness) -> Result<(), ConfigError> {
    let fixed = *ENDIANNESS.get_or_init(|| requested);
    if fixed == requested {
        Ok(())
    } else {
        Err(ConfigError::Conflict { fixed, requested })
    }
}

/// The endianness this process is committed to (big-endian until a
/// successful [`set_endianness`] call says otherwise).
pub fn endianness() -> Endianness {
    *ENDIANNESS.get_or_init(|| Endianness::Big)
}

// ============================================================================
// Canonical re-exports
// ============================================================================

pub use crate::case::DsCase;
pub use crate::cyclical::CyclicalCase;
pub use crate::designspace::{DesignSpace, Mode};
pub use crate::expr::Expr;
pub use crate::gma::{Gma, TermSign};
pub use crate::matrix::Matrix;
pub use crate::polytope::{LpOutcome, LpSolver, Validity};
pub use crate::pool::VariablePool;
pub use crate::ssystem::SSystem;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endianness_first_choice_wins() {
        // The default is committed on first read; a matching set is fine,
        // a conflicting one is rejected without changing the convention.
        let first = endianness();
        assert!(set_endianness(first).is_ok());
        let other = match first {
            Endianness::Big => Endianness::Little,
            Endianness::Little => Endianness::Big,
        };
        assert!(matches!(
            set_endianness(other),
            Err(ConfigError::Conflict { .. })
        ));
        assert_eq!(endianness(), first);
    }
}
