//! Expression Trees
//!
//! Canonicalized algebraic expressions. Only `+`, `*` and `^` survive
//! canonicalization: subtraction is addition of a `(−1)`-scaled product,
//! division is multiplication by a `(−1)`-power, and unary negation is
//! multiplication by `−1`. Constants fold when combined and constant factors
//! group to the front of sums and products, so the leading child of a
//! monomial is always its signed coefficient.
//!
//! Relations (`=`, `<`, `>`) and the time-derivative marker `.` appear only
//! at the top of equations. Evaluation is complex-valued internally, which
//! lets intermediates like `sqrt(-1)` flow through `real`/`imag`.

use num_complex::Complex64;

use crate::pool::VariablePool;

/// Reserved identifier for the imaginary unit in the input grammar.
pub const IMAGINARY_UNIT: &str = "&i";

/// Relational operators allowed at the root of an equation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelOp {
    /// `=`
    Equal,
    /// `<`
    Less,
    /// `>`
    Greater,
}

/// A canonicalized expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A real constant.
    Constant(f64),
    /// A named variable (or the reserved imaginary unit).
    Variable(String),
    /// A single-argument function application.
    Function(String, Box<Expr>),
    /// An n-ary sum; two or more children, constants folded and front-grouped.
    Sum(Vec<Expr>),
    /// An n-ary product; two or more children, constants folded and
    /// front-grouped.
    Product(Vec<Expr>),
    /// `base ^ exponent`.
    Power(Box<Expr>, Box<Expr>),
    /// A relation between two expressions.
    Relation(RelOp, Box<Expr>, Box<Expr>),
    /// The time derivative of the single child.
    TimeDerivative(Box<Expr>),
}

/// Errors surfaced by expression evaluation and decomposition.
#[derive(Debug, thiserror::Error)]
pub enum ExprError {
    /// A variable was not found in the evaluation pool.
    #[error("variable {0:?} is not in the evaluation pool")]
    UnknownVariable(String),
    /// A function name is not recognized.
    #[error("unknown function {0:?}")]
    UnknownFunction(String),
    /// A real-valued evaluation produced a residual imaginary part.
    #[error("evaluation produced a complex result ({0})")]
    ComplexResult(Complex64),
    /// LHS/RHS extraction on a node that is not a relation.
    #[error("expression is not a relation")]
    NotARelation,
}

impl Expr {
    // ------------------------- Constructors -------------------------

    /// A variable node.
    pub fn var(name: &str) -> Expr {
        Expr::Variable(name.to_string())
    }

    /// A constant node.
    pub fn constant(value: f64) -> Expr {
        Expr::Constant(value)
    }

    /// Canonical sum: flattens nested sums, folds constants, groups the
    /// folded constant to the front, drops a zero constant.
    pub fn add(lhs: Expr, rhs: Expr) -> Expr {
        let mut terms = Vec::new();
        let mut constant = 0.0;
        for side in [lhs, rhs] {
            match side {
                Expr::Constant(c) => constant += c,
                Expr::Sum(children) => {
                    for child in children {
                        match child {
                            Expr::Constant(c) => constant += c,
                            other => terms.push(other),
                        }
                    }
                }
                other => terms.push(other),
            }
        }
        if constant != 0.0 || terms.is_empty() {
            terms.insert(0, Expr::Constant(constant));
        }
        match terms.len() {
            1 => terms.pop().expect("one term"),
            _ => Expr::Sum(terms),
        }
    }

    /// Canonical product: flattens nested products, folds constants, groups
    /// the folded constant to the front, collapses on a zero factor.
    pub fn mul(lhs: Expr, rhs: Expr) -> Expr {
        let mut factors = Vec::new();
        let mut constant = 1.0;
        for side in [lhs, rhs] {
            match side {
                Expr::Constant(c) => constant *= c,
                Expr::Product(children) => {
                    for child in children {
                        match child {
                            Expr::Constant(c) => constant *= c,
                            other => factors.push(other),
                        }
                    }
                }
                other => factors.push(other),
            }
        }
        if constant == 0.0 {
            return Expr::Constant(0.0);
        }
        if constant != 1.0 || factors.is_empty() {
            factors.insert(0, Expr::Constant(constant));
        }
        match factors.len() {
            1 => factors.pop().expect("one factor"),
            _ => Expr::Product(factors),
        }
    }

    /// `lhs − rhs`, stored as `lhs + (−1)·rhs`.
    pub fn sub(lhs: Expr, rhs: Expr) -> Expr {
        Expr::add(lhs, Expr::neg(rhs))
    }

    /// `lhs / rhs`, stored as `lhs · rhs⁻¹`.
    pub fn div(lhs: Expr, rhs: Expr) -> Expr {
        Expr::mul(lhs, Expr::pow(rhs, Expr::Constant(-1.0)))
    }

    /// Negation, stored as multiplication by `−1`.
    pub fn neg(value: Expr) -> Expr {
        Expr::mul(Expr::Constant(-1.0), value)
    }

    /// `base ^ exponent`, folded when both sides are constant.
    pub fn pow(base: Expr, exponent: Expr) -> Expr {
        if let (Expr::Constant(b), Expr::Constant(e)) = (&base, &exponent) {
            return Expr::Constant(b.powf(*e));
        }
        if let Expr::Constant(e) = &exponent {
            if *e == 1.0 {
                return base;
            }
        }
        Expr::Power(Box::new(base), Box::new(exponent))
    }

    /// A function application.
    pub fn function(name: &str, arg: Expr) -> Expr {
        Expr::Function(name.to_string(), Box::new(arg))
    }

    /// A relation node.
    pub fn relation(op: RelOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Relation(op, Box::new(lhs), Box::new(rhs))
    }

    /// The time derivative of `value`.
    pub fn time_derivative(value: Expr) -> Expr {
        Expr::TimeDerivative(Box::new(value))
    }

    // ------------------------- Decomposition -------------------------

    /// The left-hand side of a relation.
    pub fn lhs(&self) -> Result<&Expr, ExprError> {
        match self {
            Expr::Relation(_, lhs, _) => Ok(lhs),
            _ => Err(ExprError::NotARelation),
        }
    }

    /// The right-hand side of a relation.
    pub fn rhs(&self) -> Result<&Expr, ExprError> {
        match self {
            Expr::Relation(_, _, rhs) => Ok(rhs),
            _ => Err(ExprError::NotARelation),
        }
    }

    /// Free variables in first-appearance order (excludes the imaginary
    /// unit).
    pub fn variables(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables(&self, out: &mut Vec<String>) {
        match self {
            Expr::Constant(_) => {}
            Expr::Variable(name) => {
                if name != IMAGINARY_UNIT && !out.iter().any(|n| n == name) {
                    out.push(name.clone());
                }
            }
            Expr::Function(_, arg) => arg.collect_variables(out),
            Expr::Sum(children) | Expr::Product(children) => {
                for child in children {
                    child.collect_variables(out);
                }
            }
            Expr::Power(base, exponent) => {
                base.collect_variables(out);
                exponent.collect_variables(out);
            }
            Expr::Relation(_, lhs, rhs) => {
                lhs.collect_variables(out);
                rhs.collect_variables(out);
            }
            Expr::TimeDerivative(child) => child.collect_variables(out),
        }
    }

    // ------------------------- Evaluation -------------------------

    /// Evaluate against a pool, complex-valued.
    pub fn eval_complex(&self, pool: &VariablePool) -> Result<Complex64, ExprError> {
        match self {
            Expr::Constant(c) => Ok(Complex64::new(*c, 0.0)),
            Expr::Variable(name) => {
                if name == IMAGINARY_UNIT {
                    return Ok(Complex64::new(0.0, 1.0));
                }
                pool.value_of(name)
                    .map(|v| Complex64::new(v, 0.0))
                    .map_err(|_| ExprError::UnknownVariable(name.clone()))
            }
            Expr::Function(name, arg) => {
                let x = arg.eval_complex(pool)?;
                match name.as_str() {
                    "sqrt" => Ok(x.sqrt()),
                    "log" => Ok(x.ln()),
                    "log10" => Ok(x.ln() / Complex64::new(std::f64::consts::LN_10, 0.0)),
                    "exp" => Ok(x.exp()),
                    "real" => Ok(Complex64::new(x.re, 0.0)),
                    "imag" => Ok(Complex64::new(x.im, 0.0)),
                    _ => Err(ExprError::UnknownFunction(name.clone())),
                }
            }
            Expr::Sum(children) => {
                let mut acc = Complex64::new(0.0, 0.0);
                for child in children {
                    acc += child.eval_complex(pool)?;
                }
                Ok(acc)
            }
            Expr::Product(children) => {
                let mut acc = Complex64::new(1.0, 0.0);
                for child in children {
                    acc *= child.eval_complex(pool)?;
                }
                Ok(acc)
            }
            Expr::Power(base, exponent) => {
                let b = base.eval_complex(pool)?;
                let e = exponent.eval_complex(pool)?;
                Ok(b.powc(e))
            }
            // Relations and derivatives evaluate their defining value: the
            // RHS for a relation, the child for a derivative marker.
            Expr::Relation(_, _, rhs) => rhs.eval_complex(pool),
            Expr::TimeDerivative(child) => child.eval_complex(pool),
        }
    }

    /// Evaluate against a pool, requiring a real result.
    pub fn eval(&self, pool: &VariablePool) -> Result<f64, ExprError> {
        let z = self.eval_complex(pool)?;
        if z.im.abs() > 1e-12 {
            return Err(ExprError::ComplexResult(z));
        }
        Ok(z.re)
    }
}

// ------------------------- Rendering -------------------------

// Precedence levels used only for parenthesization.
const PREC_RELATION: u8 = 0;
const PREC_SUM: u8 = 1;
const PREC_PRODUCT: u8 = 2;
const PREC_POWER: u8 = 3;
const PREC_ATOM: u8 = 4;

impl Expr {
    fn precedence(&self) -> u8 {
        match self {
            Expr::Relation(..) => PREC_RELATION,
            Expr::Sum(_) => PREC_SUM,
            Expr::Product(_) => PREC_PRODUCT,
            Expr::Power(..) => PREC_POWER,
            _ => PREC_ATOM,
        }
    }

    fn fmt_child(
        &self,
        f: &mut std::fmt::Formatter<'_>,
        parent_prec: u8,
    ) -> std::fmt::Result {
        if self.precedence() < parent_prec {
            write!(f, "({})", self)
        } else {
            write!(f, "{}", self)
        }
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Constant(c) => {
                if *c < 0.0 {
                    write!(f, "({})", fmt_constant(*c))
                } else {
                    write!(f, "{}", fmt_constant(*c))
                }
            }
            Expr::Variable(name) => write!(f, "{}", name),
            Expr::Function(name, arg) => write!(f, "{}({})", name, arg),
            Expr::Sum(children) => {
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, " + ")?;
                    }
                    child.fmt_child(f, PREC_SUM)?;
                }
                Ok(())
            }
            Expr::Product(children) => {
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, "*")?;
                    }
                    child.fmt_child(f, PREC_PRODUCT)?;
                }
                Ok(())
            }
            Expr::Power(base, exponent) => {
                base.fmt_child(f, PREC_ATOM)?;
                write!(f, "^")?;
                exponent.fmt_child(f, PREC_ATOM)
            }
            Expr::Relation(op, lhs, rhs) => {
                let symbol = match op {
                    RelOp::Equal => "=",
                    RelOp::Less => "<",
                    RelOp::Greater => ">",
                };
                write!(f, "{} {} {}", lhs, symbol, rhs)
            }
            Expr::TimeDerivative(child) => {
                child.fmt_child(f, PREC_ATOM)?;
                write!(f, ".")
            }
        }
    }
}

fn fmt_constant(value: f64) -> String {
    if value == value.trunc() && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_fold_and_group_to_front() {
        let e = Expr::mul(Expr::var("x"), Expr::Constant(3.0));
        let e = Expr::mul(Expr::Constant(2.0), e);
        match e {
            Expr::Product(children) => {
                assert_eq!(children[0], Expr::Constant(6.0));
                assert_eq!(children[1], Expr::var("x"));
            }
            other => panic!("expected product, got {other:?}"),
        }
    }

    #[test]
    fn subtraction_becomes_negative_product() {
        let e = Expr::sub(Expr::var("a"), Expr::var("b"));
        match &e {
            Expr::Sum(children) => {
                assert_eq!(children[0], Expr::var("a"));
                match &children[1] {
                    Expr::Product(factors) => {
                        assert_eq!(factors[0], Expr::Constant(-1.0));
                        assert_eq!(factors[1], Expr::var("b"));
                    }
                    other => panic!("expected scaled product, got {other:?}"),
                }
            }
            other => panic!("expected sum, got {other:?}"),
        }
    }

    #[test]
    fn zero_factor_collapses_product() {
        let e = Expr::mul(Expr::Constant(0.0), Expr::var("x"));
        assert_eq!(e, Expr::Constant(0.0));
    }

    #[test]
    fn evaluation_matches_hand_computation() {
        let pool = VariablePool::from_pairs([("x", 2.0), ("y", 3.0)]).unwrap();
        // 2*x*y^2 - x = 2*2*9 - 2 = 34
        let e = Expr::sub(
            Expr::mul(
                Expr::Constant(2.0),
                Expr::mul(Expr::var("x"), Expr::pow(Expr::var("y"), Expr::Constant(2.0))),
            ),
            Expr::var("x"),
        );
        assert!((e.eval(&pool).unwrap() - 34.0).abs() < 1e-12);
    }

    #[test]
    fn complex_intermediates_flow_through_real() {
        // real(sqrt(-1) + &i) = 0, imag = 2
        let pool = VariablePool::new();
        let inner = Expr::add(
            Expr::function("sqrt", Expr::Constant(-1.0)),
            Expr::var(IMAGINARY_UNIT),
        );
        let re = Expr::function("real", inner.clone());
        let im = Expr::function("imag", inner);
        assert!(re.eval(&pool).unwrap().abs() < 1e-12);
        assert!((im.eval(&pool).unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn unresolved_complex_result_is_an_error() {
        let pool = VariablePool::new();
        let e = Expr::function("sqrt", Expr::Constant(-4.0));
        assert!(matches!(e.eval(&pool), Err(ExprError::ComplexResult(_))));
    }

    #[test]
    fn variables_in_first_appearance_order() {
        let e = Expr::add(
            Expr::mul(Expr::var("b"), Expr::var("a")),
            Expr::var("b"),
        );
        assert_eq!(e.variables(), vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn display_round_trips_visually() {
        let e = Expr::sub(
            Expr::add(Expr::var("a"), Expr::mul(Expr::var("b"), Expr::var("x"))),
            Expr::var("c"),
        );
        assert_eq!(e.to_string(), "a + b*x + (-1)*c");
    }
}
