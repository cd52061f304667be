use std::cmp::Ordering;

use crate::error::Result;
use crate::expr::{BoundPredicate, Predicate, PredicateOperator, Reference};
use crate::spec::{Literal, PartitionSpecRef, Struct};
use crate::{Error, ErrorKind};

/// Computes the residual of a row filter for one data file: the part of the
/// filter a per-row reader must still apply after partition pruning.
///
/// Predicates on identity-partitioned columns are decided from the partition
/// tuple and collapse to constants; `and`/`or` simplify around them; every
/// other subtree survives unchanged. The result is sound: it never drops a
/// matching row, it only stops short of deciding.
pub struct ResidualEvaluator {
    spec: PartitionSpecRef,
}

impl ResidualEvaluator {
    pub fn new(spec: PartitionSpecRef) -> Self {
        Self { spec }
    }

    /// The residual predicate for a file with the given partition tuple,
    /// unbound over column names so it can travel with the task.
    ///
    /// `AlwaysFalse` means the file holds no matching row and must be
    /// skipped; `AlwaysTrue` means every row matches.
    pub fn residual_for(&self, filter: &BoundPredicate, partition: &Struct) -> Result<Predicate> {
        match filter {
            BoundPredicate::AlwaysTrue => Ok(Predicate::AlwaysTrue),
            BoundPredicate::AlwaysFalse => Ok(Predicate::AlwaysFalse),
            BoundPredicate::And(l, r) => Ok(self
                .residual_for(l, partition)?
                .and(self.residual_for(r, partition)?)),
            BoundPredicate::Or(l, r) => Ok(self
                .residual_for(l, partition)?
                .or(self.residual_for(r, partition)?)),
            BoundPredicate::Unary { op, term } => {
                match self.partition_value(term.field_id(), partition)? {
                    None => Ok(unbound_unary(*op, term.name())),
                    Some(value) => match op {
                        PredicateOperator::IsNull => Ok(constant(value.is_none())),
                        PredicateOperator::NotNull => Ok(constant(value.is_some())),
                        _ => Err(unexpected_op(*op)),
                    },
                }
            }
            BoundPredicate::Binary { op, term, literal } => {
                match self.partition_value(term.field_id(), partition)? {
                    None => Ok(unbound_binary(*op, term.name(), literal.clone())),
                    // A comparison with a null partition value holds for no row.
                    Some(None) => Ok(Predicate::AlwaysFalse),
                    Some(Some(value)) => match value.partial_cmp(literal) {
                        // Incomparable values stay in the residual.
                        None => Ok(unbound_binary(*op, term.name(), literal.clone())),
                        Some(ord) => {
                            let holds = match op {
                                PredicateOperator::LessThan => ord.is_lt(),
                                PredicateOperator::LessThanOrEq => ord.is_le(),
                                PredicateOperator::GreaterThan => ord.is_gt(),
                                PredicateOperator::GreaterThanOrEq => ord.is_ge(),
                                PredicateOperator::Eq => ord.is_eq(),
                                PredicateOperator::NotEq => ord.is_ne(),
                                _ => return Err(unexpected_op(*op)),
                            };
                            Ok(constant(holds))
                        }
                    },
                }
            }
            BoundPredicate::Set { op, term, literals } => {
                match self.partition_value(term.field_id(), partition)? {
                    None => Ok(unbound_set(*op, term.name(), literals.clone())),
                    // Membership of a null partition value holds for no row.
                    Some(None) => Ok(Predicate::AlwaysFalse),
                    Some(Some(value)) => {
                        let contained = literals
                            .iter()
                            .any(|l| value.partial_cmp(l) == Some(Ordering::Equal));
                        match op {
                            PredicateOperator::In => Ok(constant(contained)),
                            PredicateOperator::NotIn => Ok(constant(!contained)),
                            _ => Err(unexpected_op(*op)),
                        }
                    }
                }
            }
        }
    }

    /// `None` when the column is not identity-partitioned under this spec;
    /// otherwise the file's value for it (which itself may be null).
    fn partition_value<'a>(
        &self,
        source_id: i32,
        partition: &'a Struct,
    ) -> Result<Option<&'a Option<Literal>>> {
        let Some(pos) = self
            .spec
            .fields()
            .iter()
            .position(|pf| pf.source_id() == source_id && pf.transform().is_identity())
        else {
            return Ok(None);
        };
        partition
            .get(pos)
            .map(Some)
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::DataInvalid,
                    "partition tuple is shorter than the partition spec",
                )
                .with_context("position", pos.to_string())
            })
    }
}

fn constant(value: bool) -> Predicate {
    if value {
        Predicate::AlwaysTrue
    } else {
        Predicate::AlwaysFalse
    }
}

fn unbound_unary(op: PredicateOperator, name: &str) -> Predicate {
    Predicate::Unary {
        op,
        term: Reference::new(name),
    }
}

fn unbound_binary(op: PredicateOperator, name: &str, literal: Literal) -> Predicate {
    Predicate::Binary {
        op,
        term: Reference::new(name),
        literal,
    }
}

fn unbound_set(op: PredicateOperator, name: &str, literals: Vec<Literal>) -> Predicate {
    Predicate::Set {
        op,
        term: Reference::new(name),
        literals,
    }
}

fn unexpected_op(op: PredicateOperator) -> Error {
    Error::new(
        ErrorKind::Unexpected,
        "operator is not valid for this predicate shape",
    )
    .with_context("op", op.to_string())
}
