use std::fmt;

use serde_derive::{Deserialize, Serialize};

use crate::spec::{Literal, NestedFieldRef};

use super::{Predicate, PredicateOperator};

/// An unbound reference to a column by name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    name: String,
}

impl Reference {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_null(self) -> Predicate {
        Predicate::Unary {
            op: PredicateOperator::IsNull,
            term: self,
        }
    }

    pub fn is_not_null(self) -> Predicate {
        Predicate::Unary {
            op: PredicateOperator::NotNull,
            term: self,
        }
    }

    pub fn less_than(self, literal: Literal) -> Predicate {
        self.binary(PredicateOperator::LessThan, literal)
    }

    pub fn less_than_or_eq(self, literal: Literal) -> Predicate {
        self.binary(PredicateOperator::LessThanOrEq, literal)
    }

    pub fn greater_than(self, literal: Literal) -> Predicate {
        self.binary(PredicateOperator::GreaterThan, literal)
    }

    pub fn greater_than_or_eq(self, literal: Literal) -> Predicate {
        self.binary(PredicateOperator::GreaterThanOrEq, literal)
    }

    pub fn equal_to(self, literal: Literal) -> Predicate {
        self.binary(PredicateOperator::Eq, literal)
    }

    pub fn not_equal_to(self, literal: Literal) -> Predicate {
        self.binary(PredicateOperator::NotEq, literal)
    }

    pub fn is_in(self, literals: impl IntoIterator<Item = Literal>) -> Predicate {
        Predicate::Set {
            op: PredicateOperator::In,
            term: self,
            literals: literals.into_iter().collect(),
        }
    }

    pub fn not_in(self, literals: impl IntoIterator<Item = Literal>) -> Predicate {
        Predicate::Set {
            op: PredicateOperator::NotIn,
            term: self,
            literals: literals.into_iter().collect(),
        }
    }

    fn binary(self, op: PredicateOperator, literal: Literal) -> Predicate {
        Predicate::Binary {
            op,
            term: self,
            literal,
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A reference resolved against a schema.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoundReference {
    field: NestedFieldRef,
}

impl BoundReference {
    pub fn new(field: NestedFieldRef) -> Self {
        Self { field }
    }

    pub fn field(&self) -> &NestedFieldRef {
        &self.field
    }

    pub fn field_id(&self) -> i32 {
        self.field.id
    }

    pub fn name(&self) -> &str {
        &self.field.name
    }
}

impl fmt::Display for BoundReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.field.name)
    }
}
