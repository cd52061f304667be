use std::cmp::Ordering;
use std::fmt;

use ordered_float::OrderedFloat;
use serde_derive::{Deserialize, Serialize};

use crate::error::Result;
use crate::{Error, ErrorKind};

use super::PrimitiveType;

/// A single typed value: a predicate literal, a statistics bound, or a
/// partition tuple member.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type", content = "value")]
pub enum Literal {
    Boolean(bool),
    Int(i32),
    Long(i64),
    Float(OrderedFloat<f32>),
    Double(OrderedFloat<f64>),
    /// Days since the unix epoch.
    Date(i32),
    /// Microseconds since the unix epoch.
    Timestamp(i64),
    String(String),
    Binary(Vec<u8>),
}

impl Literal {
    pub fn bool(value: bool) -> Self {
        Literal::Boolean(value)
    }

    pub fn int(value: i32) -> Self {
        Literal::Int(value)
    }

    pub fn long(value: i64) -> Self {
        Literal::Long(value)
    }

    pub fn float(value: f32) -> Self {
        Literal::Float(OrderedFloat(value))
    }

    pub fn double(value: f64) -> Self {
        Literal::Double(OrderedFloat(value))
    }

    pub fn date(days: i32) -> Self {
        Literal::Date(days)
    }

    pub fn timestamp_micros(micros: i64) -> Self {
        Literal::Timestamp(micros)
    }

    pub fn string(value: impl Into<String>) -> Self {
        Literal::String(value.into())
    }

    pub fn binary(value: impl Into<Vec<u8>>) -> Self {
        Literal::Binary(value.into())
    }

    pub fn primitive_type(&self) -> PrimitiveType {
        match self {
            Literal::Boolean(_) => PrimitiveType::Boolean,
            Literal::Int(_) => PrimitiveType::Int,
            Literal::Long(_) => PrimitiveType::Long,
            Literal::Float(_) => PrimitiveType::Float,
            Literal::Double(_) => PrimitiveType::Double,
            Literal::Date(_) => PrimitiveType::Date,
            Literal::Timestamp(_) => PrimitiveType::Timestamp,
            Literal::String(_) => PrimitiveType::String,
            Literal::Binary(_) => PrimitiveType::Binary,
        }
    }

    /// Coerce this literal to the given type. Lossless widenings only:
    /// `int` to `long`, `float` to `double`.
    pub fn to(&self, target: &PrimitiveType) -> Result<Literal> {
        if self.primitive_type() == *target {
            return Ok(self.clone());
        }
        match (self, target) {
            (Literal::Int(v), PrimitiveType::Long) => Ok(Literal::Long(*v as i64)),
            (Literal::Float(v), PrimitiveType::Double) => {
                Ok(Literal::Double(OrderedFloat(v.into_inner() as f64)))
            }
            _ => Err(Error::new(
                ErrorKind::Validation,
                "literal is not compatible with the column type",
            )
            .with_context("literal", self.to_string())
            .with_context("type", target.to_string())),
        }
    }

    /// Single-value binary encoding: little-endian numerics, UTF-8 strings,
    /// one byte for booleans. Used for statistics bounds and partition
    /// tuples in manifests.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Literal::Boolean(v) => vec![u8::from(*v)],
            Literal::Int(v) | Literal::Date(v) => v.to_le_bytes().to_vec(),
            Literal::Long(v) | Literal::Timestamp(v) => v.to_le_bytes().to_vec(),
            Literal::Float(v) => v.into_inner().to_le_bytes().to_vec(),
            Literal::Double(v) => v.into_inner().to_le_bytes().to_vec(),
            Literal::String(v) => v.as_bytes().to_vec(),
            Literal::Binary(v) => v.clone(),
        }
    }

    /// Decode the single-value binary encoding for the given type.
    pub fn try_from_bytes(bytes: &[u8], target: &PrimitiveType) -> Result<Literal> {
        let invalid = || {
            Error::new(ErrorKind::DataInvalid, "invalid encoded value")
                .with_context("type", target.to_string())
                .with_context("len", bytes.len().to_string())
        };
        match target {
            PrimitiveType::Boolean => match bytes {
                [0] => Ok(Literal::Boolean(false)),
                [1] => Ok(Literal::Boolean(true)),
                _ => Err(invalid()),
            },
            PrimitiveType::Int => Ok(Literal::Int(i32::from_le_bytes(
                bytes.try_into().map_err(|_| invalid())?,
            ))),
            PrimitiveType::Date => Ok(Literal::Date(i32::from_le_bytes(
                bytes.try_into().map_err(|_| invalid())?,
            ))),
            PrimitiveType::Long => Ok(Literal::Long(i64::from_le_bytes(
                bytes.try_into().map_err(|_| invalid())?,
            ))),
            PrimitiveType::Timestamp => Ok(Literal::Timestamp(i64::from_le_bytes(
                bytes.try_into().map_err(|_| invalid())?,
            ))),
            PrimitiveType::Float => Ok(Literal::Float(OrderedFloat(f32::from_le_bytes(
                bytes.try_into().map_err(|_| invalid())?,
            )))),
            PrimitiveType::Double => Ok(Literal::Double(OrderedFloat(f64::from_le_bytes(
                bytes.try_into().map_err(|_| invalid())?,
            )))),
            PrimitiveType::String => Ok(Literal::String(
                std::str::from_utf8(bytes).map_err(|_| invalid())?.to_string(),
            )),
            PrimitiveType::Binary => Ok(Literal::Binary(bytes.to_vec())),
        }
    }
}

/// Values of the same type are totally ordered; values of different types do
/// not compare.
impl PartialOrd for Literal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Literal::Boolean(a), Literal::Boolean(b)) => Some(a.cmp(b)),
            (Literal::Int(a), Literal::Int(b)) => Some(a.cmp(b)),
            (Literal::Long(a), Literal::Long(b)) => Some(a.cmp(b)),
            (Literal::Float(a), Literal::Float(b)) => Some(a.cmp(b)),
            (Literal::Double(a), Literal::Double(b)) => Some(a.cmp(b)),
            (Literal::Date(a), Literal::Date(b)) => Some(a.cmp(b)),
            (Literal::Timestamp(a), Literal::Timestamp(b)) => Some(a.cmp(b)),
            (Literal::String(a), Literal::String(b)) => Some(a.cmp(b)),
            (Literal::Binary(a), Literal::Binary(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Boolean(v) => write!(f, "{v}"),
            Literal::Int(v) => write!(f, "{v}"),
            Literal::Long(v) => write!(f, "{v}"),
            Literal::Float(v) => write!(f, "{v}"),
            Literal::Double(v) => write!(f, "{v}"),
            Literal::Date(v) => write!(f, "date({v})"),
            Literal::Timestamp(v) => write!(f, "timestamp({v})"),
            Literal::String(v) => write!(f, "{v:?}"),
            Literal::Binary(v) => write!(f, "binary({} bytes)", v.len()),
        }
    }
}

/// A partition tuple: one optional value per partition field, in spec order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Struct {
    fields: Vec<Option<Literal>>,
}

impl Struct {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn fields(&self) -> &[Option<Literal>] {
        &self.fields
    }

    pub fn get(&self, pos: usize) -> Option<&Option<Literal>> {
        self.fields.get(pos)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<Option<Literal>> for Struct {
    fn from_iter<I: IntoIterator<Item = Option<Literal>>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}
