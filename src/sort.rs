//! Sort System.
//!
//! The engine works over the three sorts of linear arithmetic with
//! booleans. Sorts are plain values; the heavy lifting (hash-consing,
//! identity) lives in the term arena.

/// Sort of a term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Sort {
    /// Boolean sort.
    Bool,
    /// Mathematical (unbounded) integer sort.
    Int,
    /// Rational real sort.
    Real,
}

impl Sort {
    /// Whether this is a numeric sort.
    #[must_use]
    pub fn is_numeric(self) -> bool {
        matches!(self, Sort::Int | Sort::Real)
    }

    /// SMT-LIB2 name of the sort.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Sort::Bool => "Bool",
            Sort::Int => "Int",
            Sort::Real => "Real",
        }
    }
}

impl std::fmt::Display for Sort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_names() {
        assert_eq!(Sort::Bool.name(), "Bool");
        assert_eq!(Sort::Int.name(), "Int");
        assert_eq!(Sort::Real.name(), "Real");
        assert!(Sort::Int.is_numeric());
        assert!(!Sort::Bool.is_numeric());
    }
}
