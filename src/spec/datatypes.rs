use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde_derive::{Deserialize, Serialize};

use crate::error::Result;
use crate::{Error, ErrorKind};

/// Primitive column types. Nested types are out of scope for planning; name
/// binding happens against the table's top-level struct.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveType {
    Boolean,
    Int,
    Long,
    Float,
    Double,
    Date,
    Timestamp,
    String,
    Binary,
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PrimitiveType::Boolean => "boolean",
            PrimitiveType::Int => "int",
            PrimitiveType::Long => "long",
            PrimitiveType::Float => "float",
            PrimitiveType::Double => "double",
            PrimitiveType::Date => "date",
            PrimitiveType::Timestamp => "timestamp",
            PrimitiveType::String => "string",
            PrimitiveType::Binary => "binary",
        };
        f.write_str(name)
    }
}

/// A named field with a stable id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NestedField {
    pub id: i32,
    pub name: String,
    pub required: bool,
    #[serde(rename = "type")]
    pub field_type: PrimitiveType,
}

impl NestedField {
    pub fn required(id: i32, name: impl Into<String>, field_type: PrimitiveType) -> Self {
        Self {
            id,
            name: name.into(),
            required: true,
            field_type,
        }
    }

    pub fn optional(id: i32, name: impl Into<String>, field_type: PrimitiveType) -> Self {
        Self {
            id,
            name: name.into(),
            required: false,
            field_type,
        }
    }
}

pub type NestedFieldRef = Arc<NestedField>;

/// An unnamed ordered collection of fields, e.g. the partition tuple type of
/// a partition spec.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructType {
    fields: Vec<NestedFieldRef>,
}

impl StructType {
    pub fn new(fields: Vec<NestedField>) -> Self {
        Self {
            fields: fields.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn fields(&self) -> &[NestedFieldRef] {
        &self.fields
    }

    pub fn field_by_id(&self, id: i32) -> Option<&NestedFieldRef> {
        self.fields.iter().find(|f| f.id == id)
    }

    /// Position of a field id within the struct.
    pub fn index_of(&self, id: i32) -> Option<usize> {
        self.fields.iter().position(|f| f.id == id)
    }
}

/// A table schema: a top-level struct with a schema id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Schema {
    schema_id: i32,
    fields: Vec<NestedFieldRef>,
}

pub type SchemaRef = Arc<Schema>;

impl Schema {
    pub fn new(schema_id: i32, fields: Vec<NestedField>) -> Self {
        Self {
            schema_id,
            fields: fields.into_iter().map(Arc::new).collect(),
        }
    }

    pub(crate) fn from_struct(schema_id: i32, fields: Vec<NestedFieldRef>) -> Self {
        Self { schema_id, fields }
    }

    pub fn schema_id(&self) -> i32 {
        self.schema_id
    }

    pub fn fields(&self) -> &[NestedFieldRef] {
        &self.fields
    }

    pub fn field_by_id(&self, id: i32) -> Option<&NestedFieldRef> {
        self.fields.iter().find(|f| f.id == id)
    }

    /// Resolve a column name to its field. A case-sensitive lookup is an
    /// exact match; a case-insensitive lookup must match exactly one field.
    pub fn field_by_name(&self, name: &str, case_sensitive: bool) -> Result<NestedFieldRef> {
        if case_sensitive {
            return self
                .fields
                .iter()
                .find(|f| f.name == name)
                .cloned()
                .ok_or_else(|| {
                    Error::new(ErrorKind::Validation, "column not found in schema")
                        .with_context("column", name.to_string())
                });
        }

        let mut matches = self
            .fields
            .iter()
            .filter(|f| f.name.eq_ignore_ascii_case(name));
        match (matches.next(), matches.next()) {
            (Some(field), None) => Ok(field.clone()),
            (Some(_), Some(_)) => Err(Error::new(
                ErrorKind::Validation,
                "column name is ambiguous under case-insensitive matching",
            )
            .with_context("column", name.to_string())),
            _ => Err(Error::new(ErrorKind::Validation, "column not found in schema")
                .with_context("column", name.to_string())),
        }
    }

    /// A schema containing only the given field ids, in this schema's field
    /// order.
    pub fn project(&self, field_ids: &HashSet<i32>) -> Schema {
        Schema {
            schema_id: self.schema_id,
            fields: self
                .fields
                .iter()
                .filter(|f| field_ids.contains(&f.id))
                .cloned()
                .collect(),
        }
    }
}
