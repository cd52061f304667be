//! The row predicate model: unbound predicates over column names, bound
//! predicates over field ids, and the evaluators that prune metadata with
//! them.

mod predicate;
mod term;
pub mod visitors;

pub use predicate::*;
pub use term::*;

use std::fmt;

use serde_derive::{Deserialize, Serialize};

/// Operators of unary, binary and set predicates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PredicateOperator {
    IsNull,
    NotNull,
    LessThan,
    LessThanOrEq,
    GreaterThan,
    GreaterThanOrEq,
    Eq,
    NotEq,
    In,
    NotIn,
}

impl PredicateOperator {
    /// The operator of the negated predicate.
    pub fn negate(self) -> PredicateOperator {
        match self {
            PredicateOperator::IsNull => PredicateOperator::NotNull,
            PredicateOperator::NotNull => PredicateOperator::IsNull,
            PredicateOperator::LessThan => PredicateOperator::GreaterThanOrEq,
            PredicateOperator::LessThanOrEq => PredicateOperator::GreaterThan,
            PredicateOperator::GreaterThan => PredicateOperator::LessThanOrEq,
            PredicateOperator::GreaterThanOrEq => PredicateOperator::LessThan,
            PredicateOperator::Eq => PredicateOperator::NotEq,
            PredicateOperator::NotEq => PredicateOperator::Eq,
            PredicateOperator::In => PredicateOperator::NotIn,
            PredicateOperator::NotIn => PredicateOperator::In,
        }
    }
}

impl fmt::Display for PredicateOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PredicateOperator::IsNull => "IS NULL",
            PredicateOperator::NotNull => "IS NOT NULL",
            PredicateOperator::LessThan => "<",
            PredicateOperator::LessThanOrEq => "<=",
            PredicateOperator::GreaterThan => ">",
            PredicateOperator::GreaterThanOrEq => ">=",
            PredicateOperator::Eq => "=",
            PredicateOperator::NotEq => "!=",
            PredicateOperator::In => "IN",
            PredicateOperator::NotIn => "NOT IN",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negation_is_an_involution() {
        let ops = [
            PredicateOperator::IsNull,
            PredicateOperator::NotNull,
            PredicateOperator::LessThan,
            PredicateOperator::LessThanOrEq,
            PredicateOperator::GreaterThan,
            PredicateOperator::GreaterThanOrEq,
            PredicateOperator::Eq,
            PredicateOperator::NotEq,
            PredicateOperator::In,
            PredicateOperator::NotIn,
        ];
        for op in ops {
            assert_eq!(op.negate().negate(), op);
        }
    }
}
