use std::fmt;

use serde_derive::{Deserialize, Serialize};

use super::PrimitiveType;

/// How a partition field derives its value from its source column.
///
/// Only `identity` lets the planner move predicates between row space and
/// partition space; every other transform is handled conservatively.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transform {
    Identity,
    Void,
}

impl Transform {
    pub fn is_identity(&self) -> bool {
        matches!(self, Transform::Identity)
    }

    /// The partition field type produced from a source column type.
    pub fn result_type(&self, source: PrimitiveType) -> PrimitiveType {
        match self {
            Transform::Identity | Transform::Void => source,
        }
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transform::Identity => f.write_str("identity"),
            Transform::Void => f.write_str("void"),
        }
    }
}
