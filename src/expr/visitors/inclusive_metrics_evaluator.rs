use std::cmp::Ordering;

use crate::error::Result;
use crate::expr::{BoundPredicate, BoundReference, PredicateOperator};
use crate::spec::{DataFile, Literal};
use crate::{Error, ErrorKind};

/// Per data-file pruning from column statistics: value counts, null counts
/// and lower/upper bounds.
///
/// Inclusive like the manifest evaluator: missing statistics answer "might
/// match", so files without stats are always kept.
pub struct InclusiveMetricsEvaluator {
    filter: BoundPredicate,
}

impl InclusiveMetricsEvaluator {
    pub fn new(filter: BoundPredicate) -> Self {
        Self { filter }
    }

    pub fn eval(&self, data_file: &DataFile) -> Result<bool> {
        if data_file.record_count() == 0 {
            return Ok(false);
        }
        self.visit(&self.filter, data_file)
    }

    fn visit(&self, predicate: &BoundPredicate, file: &DataFile) -> Result<bool> {
        match predicate {
            BoundPredicate::AlwaysTrue => Ok(true),
            BoundPredicate::AlwaysFalse => Ok(false),
            BoundPredicate::And(l, r) => Ok(self.visit(l, file)? && self.visit(r, file)?),
            BoundPredicate::Or(l, r) => Ok(self.visit(l, file)? || self.visit(r, file)?),
            BoundPredicate::Unary { op, term } => match op {
                PredicateOperator::IsNull => {
                    Ok(file.null_value_count(term.field_id()) != Some(0))
                }
                PredicateOperator::NotNull => Ok(!contains_nulls_only(file, term)),
                _ => Err(unexpected_op(*op)),
            },
            BoundPredicate::Binary { op, term, literal } => {
                if contains_nulls_only(file, term) {
                    return Ok(false);
                }
                let lower = decode(file.lower_bound(term.field_id()), term)?;
                let upper = decode(file.upper_bound(term.field_id()), term)?;
                match op {
                    PredicateOperator::LessThan => {
                        Ok(lower.is_none_or(|l| might(l.partial_cmp(literal), Ordering::is_lt)))
                    }
                    PredicateOperator::LessThanOrEq => {
                        Ok(lower.is_none_or(|l| might(l.partial_cmp(literal), Ordering::is_le)))
                    }
                    PredicateOperator::GreaterThan => {
                        Ok(upper.is_none_or(|u| might(u.partial_cmp(literal), Ordering::is_gt)))
                    }
                    PredicateOperator::GreaterThanOrEq => {
                        Ok(upper.is_none_or(|u| might(u.partial_cmp(literal), Ordering::is_ge)))
                    }
                    PredicateOperator::Eq => Ok(literal_in_range(literal, &lower, &upper)),
                    PredicateOperator::NotEq => Ok(true),
                    _ => Err(unexpected_op(*op)),
                }
            }
            BoundPredicate::Set { op, term, literals } => {
                if contains_nulls_only(file, term) {
                    return Ok(false);
                }
                let lower = decode(file.lower_bound(term.field_id()), term)?;
                let upper = decode(file.upper_bound(term.field_id()), term)?;
                match op {
                    PredicateOperator::In => Ok(literals
                        .iter()
                        .any(|l| literal_in_range(l, &lower, &upper))),
                    PredicateOperator::NotIn => Ok(true),
                    _ => Err(unexpected_op(*op)),
                }
            }
        }
    }
}

/// Every tracked value of the column is null.
fn contains_nulls_only(file: &DataFile, term: &BoundReference) -> bool {
    match (
        file.value_count(term.field_id()),
        file.null_value_count(term.field_id()),
    ) {
        (Some(values), Some(nulls)) => values == nulls,
        _ => false,
    }
}

fn decode(bound: Option<&[u8]>, term: &BoundReference) -> Result<Option<Literal>> {
    bound
        .map(|bytes| Literal::try_from_bytes(bytes, &term.field().field_type))
        .transpose()
}

/// Incomparable operands answer "might match".
fn might(ord: Option<Ordering>, check: fn(Ordering) -> bool) -> bool {
    ord.map_or(true, check)
}

/// Missing bounds are unknown, unlike the manifest summary where a missing
/// bound proves the column all-null.
fn literal_in_range(literal: &Literal, lower: &Option<Literal>, upper: &Option<Literal>) -> bool {
    let above_lower = lower
        .as_ref()
        .is_none_or(|l| might(l.partial_cmp(literal), Ordering::is_le));
    let below_upper = upper
        .as_ref()
        .is_none_or(|u| might(u.partial_cmp(literal), Ordering::is_ge));
    above_lower && below_upper
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
    use std::collections::HashMap;

    use super::*;
    use crate::expr::Reference;
    use crate::spec::{DataFileFormat, NestedField, PrimitiveType, Schema, Struct};

    fn schema() -> Schema {
        Schema::new(
            0,
            vec![NestedField::optional(1, "id", PrimitiveType::Long)],
        )
    }

    fn file(
        bounds: Option<(i64, i64)>,
        value_count: i64,
        null_count: i64,
    ) -> DataFile {
        DataFile::builder()
            .file_path("data/f.parquet")
            .file_format(DataFileFormat::Parquet)
            .file_size_in_bytes(1)
            .record_count(value_count)
            .partition(Struct::empty())
            .value_counts(Some(HashMap::from([(1, value_count)])))
            .null_value_counts(Some(HashMap::from([(1, null_count)])))
            .lower_bounds(bounds.map(|(l, _)| HashMap::from([(1, Literal::long(l).to_bytes())])))
            .upper_bounds(bounds.map(|(_, u)| HashMap::from([(1, Literal::long(u).to_bytes())])))
            .build()
    }

    fn eval(predicate: crate::expr::Predicate, file: &DataFile) -> bool {
        let bound = predicate.bind(&schema(), true).unwrap();
        InclusiveMetricsEvaluator::new(bound).eval(file).unwrap()
    }

    #[test]
    fn comparison_truth_table() {
        let f = file(Some((10, 20)), 100, 0);
        assert!(!eval(Reference::new("id").less_than(Literal::long(10)), &f));
        assert!(eval(Reference::new("id").less_than(Literal::long(11)), &f));
        assert!(eval(Reference::new("id").less_than_or_eq(Literal::long(10)), &f));
        assert!(!eval(Reference::new("id").greater_than(Literal::long(20)), &f));
        assert!(eval(Reference::new("id").greater_than_or_eq(Literal::long(20)), &f));
        assert!(!eval(Reference::new("id").equal_to(Literal::long(9)), &f));
        assert!(eval(Reference::new("id").equal_to(Literal::long(15)), &f));
        assert!(eval(Reference::new("id").not_equal_to(Literal::long(15)), &f));
    }

    #[test]
    fn missing_stats_always_match() {
        let f = file(None, 100, 0);
        assert!(eval(Reference::new("id").equal_to(Literal::long(1)), &f));
        assert!(eval(Reference::new("id").less_than(Literal::long(-5)), &f));
    }

    #[test]
    fn null_count_drives_null_predicates() {
        let with_nulls = file(Some((10, 20)), 100, 3);
        let without_nulls = file(Some((10, 20)), 100, 0);
        assert!(eval(Reference::new("id").is_null(), &with_nulls));
        assert!(!eval(Reference::new("id").is_null(), &without_nulls));
        assert!(eval(Reference::new("id").is_not_null(), &with_nulls));

        let all_null = file(None, 100, 100);
        assert!(!eval(Reference::new("id").is_not_null(), &all_null));
        assert!(!eval(Reference::new("id").equal_to(Literal::long(1)), &all_null));
    }

    #[test]
    fn empty_file_never_matches() {
        let f = file(Some((10, 20)), 0, 0);
        assert!(!eval(crate::expr::Predicate::AlwaysTrue, &f));
    }

    #[test]
    fn in_set_prunes_when_no_literal_is_in_range() {
        let f = file(Some((10, 20)), 100, 0);
        assert!(!eval(
            Reference::new("id").is_in([Literal::long(1), Literal::long(30)]),
            &f
        ));
        assert!(eval(
            Reference::new("id").is_in([Literal::long(1), Literal::long(12)]),
            &f
        ));
        assert!(eval(Reference::new("id").not_in([Literal::long(12)]), &f));
    }
}
