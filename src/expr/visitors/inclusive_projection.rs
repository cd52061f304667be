use crate::error::Result;
use crate::expr::{BoundPredicate, Predicate, Reference};
use crate::spec::PartitionSpecRef;

/// Projects a bound row filter into the partition space of one spec.
///
/// Predicates on identity-partitioned columns are rewritten to reference the
/// partition field; anything else projects to `true`, so the projection is
/// inclusive: it may keep a manifest whose rows all fail the filter, never
/// the reverse.
pub struct InclusiveProjection {
    spec: PartitionSpecRef,
}

impl InclusiveProjection {
    pub fn new(spec: PartitionSpecRef) -> Self {
        Self { spec }
    }

    /// The projected predicate, unbound over partition field names.
    pub fn project(&self, predicate: &BoundPredicate) -> Result<Predicate> {
        Ok(match predicate {
            BoundPredicate::AlwaysTrue => Predicate::AlwaysTrue,
            BoundPredicate::AlwaysFalse => Predicate::AlwaysFalse,
            BoundPredicate::And(l, r) => self.project(l)?.and(self.project(r)?),
            BoundPredicate::Or(l, r) => self.project(l)?.or(self.project(r)?),
            BoundPredicate::Unary { op, term } => match self.identity_field(term.field_id()) {
                Some(name) => Predicate::Unary {
                    op: *op,
                    term: Reference::new(name),
                },
                None => Predicate::AlwaysTrue,
            },
            BoundPredicate::Binary { op, term, literal } => {
                match self.identity_field(term.field_id()) {
                    Some(name) => Predicate::Binary {
                        op: *op,
                        term: Reference::new(name),
                        literal: literal.clone(),
                    },
                    None => Predicate::AlwaysTrue,
                }
            }
            BoundPredicate::Set { op, term, literals } => {
                match self.identity_field(term.field_id()) {
                    Some(name) => Predicate::Set {
                        op: *op,
                        term: Reference::new(name),
                        literals: literals.clone(),
                    },
                    None => Predicate::AlwaysTrue,
                }
            }
        })
    }

    fn identity_field(&self, source_id: i32) -> Option<&str> {
        self.spec
            .fields()
            .iter()
            .find(|pf| pf.source_id() == source_id && pf.transform().is_identity())
            .map(|pf| pf.name())
    }
}
