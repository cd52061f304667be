use std::collections::HashSet;
use std::fmt;

use serde_derive::{Deserialize, Serialize};

use crate::error::Result;
use crate::spec::{Literal, Schema};
use crate::{Error, ErrorKind};

use super::{BoundReference, PredicateOperator, Reference};

/// A row predicate over column names. Built with the [`Reference`]
/// constructors and combined with [`Predicate::and`] / [`Predicate::or`] /
/// [`Predicate::negate`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    AlwaysTrue,
    AlwaysFalse,
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
    Unary {
        op: PredicateOperator,
        term: Reference,
    },
    Binary {
        op: PredicateOperator,
        term: Reference,
        literal: Literal,
    },
    Set {
        op: PredicateOperator,
        term: Reference,
        literals: Vec<Literal>,
    },
}

impl Predicate {
    /// Conjunction, simplifying against the constants.
    pub fn and(self, other: Predicate) -> Predicate {
        match (self, other) {
            (Predicate::AlwaysFalse, _) | (_, Predicate::AlwaysFalse) => Predicate::AlwaysFalse,
            (Predicate::AlwaysTrue, p) | (p, Predicate::AlwaysTrue) => p,
            (l, r) => Predicate::And(Box::new(l), Box::new(r)),
        }
    }

    /// Disjunction, simplifying against the constants.
    pub fn or(self, other: Predicate) -> Predicate {
        match (self, other) {
            (Predicate::AlwaysTrue, _) | (_, Predicate::AlwaysTrue) => Predicate::AlwaysTrue,
            (Predicate::AlwaysFalse, p) | (p, Predicate::AlwaysFalse) => p,
            (l, r) => Predicate::Or(Box::new(l), Box::new(r)),
        }
    }

    /// Structural negation: De Morgan on connectives, operator negation on
    /// leaves. Never introduces `Not`.
    pub fn negate(self) -> Predicate {
        match self {
            Predicate::AlwaysTrue => Predicate::AlwaysFalse,
            Predicate::AlwaysFalse => Predicate::AlwaysTrue,
            Predicate::And(l, r) => Predicate::Or(Box::new(l.negate()), Box::new(r.negate())),
            Predicate::Or(l, r) => Predicate::And(Box::new(l.negate()), Box::new(r.negate())),
            Predicate::Not(inner) => inner.rewrite_not(),
            Predicate::Unary { op, term } => Predicate::Unary {
                op: op.negate(),
                term,
            },
            Predicate::Binary { op, term, literal } => Predicate::Binary {
                op: op.negate(),
                term,
                literal,
            },
            Predicate::Set { op, term, literals } => Predicate::Set {
                op: op.negate(),
                term,
                literals,
            },
        }
    }

    /// Push every `Not` to the leaves. Evaluators only see the result of this
    /// rewrite, so they never handle negation structurally.
    pub fn rewrite_not(self) -> Predicate {
        match self {
            Predicate::Not(inner) => inner.negate(),
            Predicate::And(l, r) => {
                Predicate::And(Box::new(l.rewrite_not()), Box::new(r.rewrite_not()))
            }
            Predicate::Or(l, r) => {
                Predicate::Or(Box::new(l.rewrite_not()), Box::new(r.rewrite_not()))
            }
            p => p,
        }
    }

    /// Resolve every reference against `schema`, coercing literals to the
    /// referenced column types. `Not` is rewritten away first.
    pub fn bind(&self, schema: &Schema, case_sensitive: bool) -> Result<BoundPredicate> {
        self.clone().rewrite_not().bind_rewritten(schema, case_sensitive)
    }

    fn bind_rewritten(self, schema: &Schema, case_sensitive: bool) -> Result<BoundPredicate> {
        match self {
            Predicate::AlwaysTrue => Ok(BoundPredicate::AlwaysTrue),
            Predicate::AlwaysFalse => Ok(BoundPredicate::AlwaysFalse),
            Predicate::And(l, r) => Ok(BoundPredicate::And(
                Box::new(l.bind_rewritten(schema, case_sensitive)?),
                Box::new(r.bind_rewritten(schema, case_sensitive)?),
            )),
            Predicate::Or(l, r) => Ok(BoundPredicate::Or(
                Box::new(l.bind_rewritten(schema, case_sensitive)?),
                Box::new(r.bind_rewritten(schema, case_sensitive)?),
            )),
            Predicate::Not(_) => Err(Error::new(
                ErrorKind::Unexpected,
                "Not must be rewritten away before binding",
            )),
            Predicate::Unary { op, term } => {
                let field = schema.field_by_name(term.name(), case_sensitive)?;
                Ok(BoundPredicate::Unary {
                    op,
                    term: BoundReference::new(field),
                })
            }
            Predicate::Binary { op, term, literal } => {
                let field = schema.field_by_name(term.name(), case_sensitive)?;
                let literal = literal.to(&field.field_type)?;
                Ok(BoundPredicate::Binary {
                    op,
                    term: BoundReference::new(field),
                    literal,
                })
            }
            Predicate::Set { op, term, literals } => {
                let field = schema.field_by_name(term.name(), case_sensitive)?;
                let literals = literals
                    .into_iter()
                    .map(|l| l.to(&field.field_type))
                    .collect::<Result<Vec<_>>>()?;
                Ok(BoundPredicate::Set {
                    op,
                    term: BoundReference::new(field),
                    literals,
                })
            }
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::AlwaysTrue => f.write_str("true"),
            Predicate::AlwaysFalse => f.write_str("false"),
            Predicate::And(l, r) => write!(f, "({l} AND {r})"),
            Predicate::Or(l, r) => write!(f, "({l} OR {r})"),
            Predicate::Not(inner) => write!(f, "NOT ({inner})"),
            Predicate::Unary { op, term } => write!(f, "{term} {op}"),
            Predicate::Binary { op, term, literal } => write!(f, "{term} {op} {literal}"),
            Predicate::Set { op, term, literals } => {
                write!(f, "{term} {op} (")?;
                for (i, literal) in literals.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{literal}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// A predicate whose references are resolved to schema fields. Negation has
/// been rewritten to the leaves, so there is no `Not` variant.
#[derive(Clone, Debug, PartialEq)]
pub enum BoundPredicate {
    AlwaysTrue,
    AlwaysFalse,
    And(Box<BoundPredicate>, Box<BoundPredicate>),
    Or(Box<BoundPredicate>, Box<BoundPredicate>),
    Unary {
        op: PredicateOperator,
        term: BoundReference,
    },
    Binary {
        op: PredicateOperator,
        term: BoundReference,
        literal: Literal,
    },
    Set {
        op: PredicateOperator,
        term: BoundReference,
        literals: Vec<Literal>,
    },
}

impl BoundPredicate {
    /// Field ids referenced anywhere in the predicate.
    pub fn references(&self) -> HashSet<i32> {
        let mut ids = HashSet::new();
        self.collect_references(&mut ids);
        ids
    }

    fn collect_references(&self, ids: &mut HashSet<i32>) {
        match self {
            BoundPredicate::AlwaysTrue | BoundPredicate::AlwaysFalse => {}
            BoundPredicate::And(l, r) | BoundPredicate::Or(l, r) => {
                l.collect_references(ids);
                r.collect_references(ids);
            }
            BoundPredicate::Unary { term, .. }
            | BoundPredicate::Binary { term, .. }
            | BoundPredicate::Set { term, .. } => {
                ids.insert(term.field_id());
            }
        }
    }
}

impl fmt::Display for BoundPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundPredicate::AlwaysTrue => f.write_str("true"),
            BoundPredicate::AlwaysFalse => f.write_str("false"),
            BoundPredicate::And(l, r) => write!(f, "({l} AND {r})"),
            BoundPredicate::Or(l, r) => write!(f, "({l} OR {r})"),
            BoundPredicate::Unary { op, term } => write!(f, "{term} {op}"),
            BoundPredicate::Binary { op, term, literal } => write!(f, "{term} {op} {literal}"),
            BoundPredicate::Set { op, term, literals } => {
                write!(f, "{term} {op} ({} literals)", literals.len())
            }
        }
    }
}
