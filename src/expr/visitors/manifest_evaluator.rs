use std::cmp::Ordering;

use crate::error::Result;
use crate::expr::{BoundPredicate, BoundReference, PredicateOperator};
use crate::spec::{FieldSummary, Literal, ManifestFile, StructType};
use crate::{Error, ErrorKind};

/// Decides whether a manifest might contain rows matching a partition filter,
/// from the manifest's partition value summary alone.
///
/// The evaluation is inclusive: unknown always answers "might match", so the
/// evaluator never skips a manifest that holds a matching row.
pub struct ManifestEvaluator {
    partition_type: StructType,
    partition_filter: BoundPredicate,
}

impl ManifestEvaluator {
    /// `partition_filter` must be bound against the struct described by
    /// `partition_type` (see `InclusiveProjection`).
    pub fn new(partition_type: StructType, partition_filter: BoundPredicate) -> Self {
        Self {
            partition_type,
            partition_filter,
        }
    }

    pub fn eval(&self, manifest: &ManifestFile) -> Result<bool> {
        if manifest.partition_summary().is_empty() {
            return Ok(true);
        }
        self.visit(&self.partition_filter, manifest.partition_summary())
    }

    fn visit(&self, predicate: &BoundPredicate, summaries: &[FieldSummary]) -> Result<bool> {
        match predicate {
            BoundPredicate::AlwaysTrue => Ok(true),
            BoundPredicate::AlwaysFalse => Ok(false),
            BoundPredicate::And(l, r) => Ok(self.visit(l, summaries)? && self.visit(r, summaries)?),
            BoundPredicate::Or(l, r) => Ok(self.visit(l, summaries)? || self.visit(r, summaries)?),
            BoundPredicate::Unary { op, term } => {
                let summary = self.summary_for(term, summaries)?;
                match op {
                    PredicateOperator::IsNull => Ok(summary.contains_null),
                    // A missing lower bound means the manifest holds no
                    // non-null value for the column.
                    PredicateOperator::NotNull => Ok(summary.lower_bound.is_some()),
                    _ => Err(unexpected_op(*op)),
                }
            }
            BoundPredicate::Binary { op, term, literal } => {
                let summary = self.summary_for(term, summaries)?;
                let lower = self.decode(summary.lower_bound.as_ref(), term)?;
                let upper = self.decode(summary.upper_bound.as_ref(), term)?;
                match op {
                    PredicateOperator::LessThan => {
                        Ok(lower.is_some_and(|l| might(l.partial_cmp(literal), Ordering::is_lt)))
                    }
                    PredicateOperator::LessThanOrEq => {
                        Ok(lower.is_some_and(|l| might(l.partial_cmp(literal), Ordering::is_le)))
                    }
                    PredicateOperator::GreaterThan => {
                        Ok(upper.is_some_and(|u| might(u.partial_cmp(literal), Ordering::is_gt)))
                    }
                    PredicateOperator::GreaterThanOrEq => {
                        Ok(upper.is_some_and(|u| might(u.partial_cmp(literal), Ordering::is_ge)))
                    }
                    PredicateOperator::Eq => Ok(in_bounds(literal, &lower, &upper)),
                    PredicateOperator::NotEq => Ok(true),
                    _ => Err(unexpected_op(*op)),
                }
            }
            BoundPredicate::Set { op, term, literals } => {
                let summary = self.summary_for(term, summaries)?;
                let lower = self.decode(summary.lower_bound.as_ref(), term)?;
                let upper = self.decode(summary.upper_bound.as_ref(), term)?;
                match op {
                    PredicateOperator::In => {
                        Ok(literals.iter().any(|l| in_bounds(l, &lower, &upper)))
                    }
                    PredicateOperator::NotIn => Ok(true),
                    _ => Err(unexpected_op(*op)),
                }
            }
        }
    }

    fn summary_for<'a>(
        &self,
        term: &BoundReference,
        summaries: &'a [FieldSummary],
    ) -> Result<&'a FieldSummary> {
        self.partition_type
            .index_of(term.field_id())
            .and_then(|pos| summaries.get(pos))
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::Unexpected,
                    "partition filter references a field missing from the partition summary",
                )
                .with_context("field", term.name().to_string())
            })
    }

    fn decode(
        &self,
        bound: Option<&serde_bytes::ByteBuf>,
        term: &BoundReference,
    ) -> Result<Option<Literal>> {
        bound
            .map(|bytes| Literal::try_from_bytes(bytes, &term.field().field_type))
            .transpose()
    }
}

/// Incomparable operands answer "might match".
fn might(ord: Option<Ordering>, check: fn(Ordering) -> bool) -> bool {
    ord.map_or(true, check)
}

fn in_bounds(literal: &Literal, lower: &Option<Literal>, upper: &Option<Literal>) -> bool {
    match (lower, upper) {
        (Some(lower), Some(upper)) => {
            might(lower.partial_cmp(literal), Ordering::is_le)
                && might(upper.partial_cmp(literal), Ordering::is_ge)
        }
        // No non-null values in the manifest.
        _ => false,
    }
}

fn unexpected_op(op: PredicateOperator) -> Error {
    Error::new(
        ErrorKind::Unexpected,
        "operator is not valid for this predicate shape",
    )
    .with_context("op", op.to_string())
}

#[cfg(test)]
mod tests {
    use serde_bytes::ByteBuf;

    use super::*;
    use crate::expr::Reference;
    use crate::spec::{NestedField, PrimitiveType, Schema};

    fn partition_type() -> StructType {
        StructType::new(vec![NestedField::optional(
            1000,
            "date",
            PrimitiveType::String,
        )])
    }

    fn evaluator(filter: crate::expr::Predicate) -> ManifestEvaluator {
        let partition_schema = Schema::from_struct(0, partition_type().fields().to_vec());
        let bound = filter.bind(&partition_schema, true).unwrap();
        ManifestEvaluator::new(partition_type(), bound)
    }

    fn manifest(lower: Option<&str>, upper: Option<&str>, contains_null: bool) -> ManifestFile {
        ManifestFile::new(
            "m.avro",
            1,
            0,
            vec![FieldSummary {
                contains_null,
                lower_bound: lower.map(|s| ByteBuf::from(s.as_bytes().to_vec())),
                upper_bound: upper.map(|s| ByteBuf::from(s.as_bytes().to_vec())),
            }],
        )
    }

    #[test]
    fn eq_prunes_outside_bounds() {
        let eval = evaluator(Reference::new("date").equal_to(Literal::string("2024-01-01")));
        assert!(!eval
            .eval(&manifest(Some("2023-12-01"), Some("2023-12-31"), false))
            .unwrap());
        assert!(eval
            .eval(&manifest(Some("2024-01-01"), Some("2024-01-31"), false))
            .unwrap());
    }

    #[test]
    fn null_predicates_use_the_summary_flags() {
        let is_null = evaluator(Reference::new("date").is_null());
        assert!(!is_null.eval(&manifest(Some("a"), Some("b"), false)).unwrap());
        assert!(is_null.eval(&manifest(Some("a"), Some("b"), true)).unwrap());

        let not_null = evaluator(Reference::new("date").is_not_null());
        assert!(not_null.eval(&manifest(Some("a"), Some("b"), true)).unwrap());
        assert!(!not_null.eval(&manifest(None, None, true)).unwrap());
    }

    #[test]
    fn comparisons_against_all_null_summary_cannot_match() {
        let eval = evaluator(Reference::new("date").less_than(Literal::string("z")));
        assert!(!eval.eval(&manifest(None, None, true)).unwrap());
    }

    #[test]
    fn in_set_checks_each_literal_against_bounds() {
        let eval = evaluator(
            Reference::new("date").is_in([Literal::string("2023-06-15"), Literal::string("x")]),
        );
        assert!(!eval
            .eval(&manifest(Some("2024-01-01"), Some("2024-01-31"), false))
            .unwrap());
        let eval = evaluator(Reference::new("date").is_in([Literal::string("2024-01-15")]));
        assert!(eval
            .eval(&manifest(Some("2024-01-01"), Some("2024-01-31"), false))
            .unwrap());
    }

    #[test]
    fn empty_summary_always_matches() {
        let eval = evaluator(Reference::new("date").equal_to(Literal::string("x")));
        assert!(eval.eval(&ManifestFile::new("m.avro", 1, 0, vec![])).unwrap());
    }
}
