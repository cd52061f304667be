use std::sync::Arc;

use serde_derive::{Deserialize, Serialize};

use crate::error::Result;
use crate::{Error, ErrorKind};

use super::{NestedField, Schema, StructType, Transform};

/// One partition column: a source column and the transform applied to it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PartitionField {
    source_id: i32,
    field_id: i32,
    name: String,
    transform: Transform,
}

impl PartitionField {
    pub fn new(source_id: i32, field_id: i32, name: impl Into<String>, transform: Transform) -> Self {
        Self {
            source_id,
            field_id,
            name: name.into(),
            transform,
        }
    }

    pub fn source_id(&self) -> i32 {
        self.source_id
    }

    pub fn field_id(&self) -> i32 {
        self.field_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transform(&self) -> Transform {
        self.transform
    }
}

/// The mapping from table columns to partition columns, versioned by spec id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PartitionSpec {
    spec_id: i32,
    fields: Vec<PartitionField>,
}

pub type PartitionSpecRef = Arc<PartitionSpec>;

impl PartitionSpec {
    pub fn new(spec_id: i32, fields: Vec<PartitionField>) -> Self {
        Self { spec_id, fields }
    }

    pub fn unpartitioned(spec_id: i32) -> Self {
        Self {
            spec_id,
            fields: Vec::new(),
        }
    }

    pub fn spec_id(&self) -> i32 {
        self.spec_id
    }

    pub fn fields(&self) -> &[PartitionField] {
        &self.fields
    }

    pub fn is_unpartitioned(&self) -> bool {
        self.fields.is_empty()
    }

    /// The type of partition tuples written under this spec, resolved against
    /// the table schema.
    pub fn partition_type(&self, schema: &Schema) -> Result<StructType> {
        let fields = self
            .fields
            .iter()
            .map(|pf| {
                let source = schema.field_by_id(pf.source_id).ok_or_else(|| {
                    Error::new(
                        ErrorKind::DataInvalid,
                        "partition field source column is not in the schema",
                    )
                    .with_context("source_id", pf.source_id.to_string())
                    .with_context("partition_field", pf.name.clone())
                })?;
                Ok(NestedField::optional(
                    pf.field_id,
                    pf.name.clone(),
                    pf.transform.result_type(source.field_type),
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(StructType::new(fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::PrimitiveType;

    #[test]
    fn partition_type_resolves_source_columns() {
        let schema = Schema::new(
            0,
            vec![
                NestedField::required(1, "id", PrimitiveType::Long),
                NestedField::optional(2, "date", PrimitiveType::String),
            ],
        );
        let spec = PartitionSpec::new(
            0,
            vec![PartitionField::new(2, 1000, "date", Transform::Identity)],
        );
        let partition_type = spec.partition_type(&schema).unwrap();
        assert_eq!(partition_type.fields().len(), 1);
        assert_eq!(partition_type.fields()[0].id, 1000);
        assert_eq!(partition_type.fields()[0].field_type, PrimitiveType::String);
    }

    #[test]
    fn unknown_source_column_is_rejected() {
        let schema = Schema::new(0, vec![NestedField::required(1, "id", PrimitiveType::Long)]);
        let spec = PartitionSpec::new(
            0,
            vec![PartitionField::new(9, 1000, "x", Transform::Identity)],
        );
        let err = spec.partition_type(&schema).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataInvalid);
    }
}
