//! SMT-LIB2 Term Printing.
//!
//! Diagnostic rendering of terms in SMT-LIB2 surface syntax, used for the
//! valid-subset and counterexample output and in test failure messages.

use super::{TermId, TermKind, TermManager};
use num_traits::Signed;
use std::fmt;

/// Displayable view of a term.
pub struct TermDisplay<'a> {
    tm: &'a TermManager,
    term: TermId,
}

impl TermManager {
    /// SMT-LIB2 view of a term for `format!`-style use.
    #[must_use]
    pub fn display(&self, term: TermId) -> TermDisplay<'_> {
        TermDisplay { tm: self, term }
    }
}

impl fmt::Display for TermDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_term(f, self.tm, self.term)
    }
}

fn write_app(
    f: &mut fmt::Formatter<'_>,
    tm: &TermManager,
    op: &str,
    args: &[TermId],
) -> fmt::Result {
    write!(f, "({op}")?;
    for &a in args {
        write!(f, " ")?;
        write_term(f, tm, a)?;
    }
    write!(f, ")")
}

fn write_term(f: &mut fmt::Formatter<'_>, tm: &TermManager, t: TermId) -> fmt::Result {
    match tm.kind(t) {
        TermKind::True => write!(f, "true"),
        TermKind::False => write!(f, "false"),
        TermKind::Var(..) => write!(f, "{}", tm.var_name(t)),
        TermKind::IntConst(n) => {
            if n.is_negative() {
                write!(f, "(- {})", n.magnitude())
            } else {
                write!(f, "{n}")
            }
        }
        TermKind::RealConst(q) => {
            if q.is_integer() {
                let n = q.to_integer();
                if n.is_negative() {
                    write!(f, "(- {}.0)", n.magnitude())
                } else {
                    write!(f, "{n}.0")
                }
            } else if q.is_negative() {
                write!(f, "(- (/ {} {}))", q.numer().magnitude(), q.denom())
            } else {
                write!(f, "(/ {} {})", q.numer(), q.denom())
            }
        }
        TermKind::Not(a) => write_app(f, tm, "not", &[*a]),
        TermKind::And(args) => write_app(f, tm, "and", args),
        TermKind::Or(args) => write_app(f, tm, "or", args),
        TermKind::Ite(c, a, b) => write_app(f, tm, "ite", &[*c, *a, *b]),
        TermKind::Eq(a, b) => write_app(f, tm, "=", &[*a, *b]),
        TermKind::Ne(a, b) => {
            write!(f, "(not ")?;
            write_app(f, tm, "=", &[*a, *b])?;
            write!(f, ")")
        }
        TermKind::Lt(a, b) => write_app(f, tm, "<", &[*a, *b]),
        TermKind::Le(a, b) => write_app(f, tm, "<=", &[*a, *b]),
        TermKind::Gt(a, b) => write_app(f, tm, ">", &[*a, *b]),
        TermKind::Ge(a, b) => write_app(f, tm, ">=", &[*a, *b]),
        TermKind::Add(args) => write_app(f, tm, "+", args),
        TermKind::Sub(a, b) => write_app(f, tm, "-", &[*a, *b]),
        TermKind::Neg(a) => write_app(f, tm, "-", &[*a]),
        TermKind::Mul(a, b) => write_app(f, tm, "*", &[*a, *b]),
        TermKind::Div(a, b) => write_app(f, tm, "/", &[*a, *b]),
        TermKind::Idiv(a, b) => write_app(f, tm, "div", &[*a, *b]),
    }
}
