//! Metadata attached to exports, imports and parts.

use crate::contract::TypeRef;
use itertools::Itertools;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Import metadata carrying type arguments used to close an open generic part.
pub const GENERIC_PARAMETERS_METADATA_NAME: &str = "GenericParameters";

/// Export metadata carrying the type identity of the exported value.
pub const EXPORT_TYPE_IDENTITY_METADATA_NAME: &str = "ExportTypeIdentity";

/// Ordered metadata map.
pub type Metadata = BTreeMap<String, MetadataValue>;

#[derive(Clone, Debug, PartialEq)]
pub enum MetadataValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(Arc<str>),
    Type(TypeRef),
    Array(Vec<MetadataValue>),
}

/// Kind of a [MetadataValue], used by metadata views to describe expected shapes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MetadataValueKind {
    Null,
    Bool,
    Int,
    Float,
    String,
    Type,
    Array,
}

impl MetadataValue {
    pub fn kind(&self) -> MetadataValueKind {
        match self {
            MetadataValue::Null => MetadataValueKind::Null,
            MetadataValue::Bool(_) => MetadataValueKind::Bool,
            MetadataValue::Int(_) => MetadataValueKind::Int,
            MetadataValue::Float(_) => MetadataValueKind::Float,
            MetadataValue::String(_) => MetadataValueKind::String,
            MetadataValue::Type(_) => MetadataValueKind::Type,
            MetadataValue::Array(_) => MetadataValueKind::Array,
        }
    }

    /// Checks if this value can be read as given kind. Integers widen to floats and null is
    /// accepted everywhere.
    pub fn is_compatible_with(&self, kind: MetadataValueKind) -> bool {
        let own = self.kind();
        own == kind
            || own == MetadataValueKind::Null
            || (own == MetadataValueKind::Int && kind == MetadataValueKind::Float)
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetadataValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            MetadataValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    #[inline]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            MetadataValue::Float(value) => Some(*value),
            MetadataValue::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::String(value) => Some(&**value),
            _ => None,
        }
    }

    #[inline]
    pub fn as_type(&self) -> Option<&TypeRef> {
        match self {
            MetadataValue::Type(value) => Some(value),
            _ => None,
        }
    }

    #[inline]
    pub fn as_array(&self) -> Option<&[MetadataValue]> {
        match self {
            MetadataValue::Array(values) => Some(values.as_slice()),
            _ => None,
        }
    }
}

impl Display for MetadataValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            MetadataValue::Null => write!(f, "null"),
            MetadataValue::Bool(value) => write!(f, "{value}"),
            MetadataValue::Int(value) => write!(f, "{value}"),
            MetadataValue::Float(value) => write!(f, "{value}"),
            MetadataValue::String(value) => write!(f, "\"{value}\""),
            MetadataValue::Type(value) => write!(f, "{value}"),
            MetadataValue::Array(values) => write!(f, "[{}]", values.iter().join(", ")),
        }
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Int(value)
    }
}

impl From<i32> for MetadataValue {
    fn from(value: i32) -> Self {
        MetadataValue::Int(value.into())
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Float(value)
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::String(value.into())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::String(value.into())
    }
}

impl From<TypeRef> for MetadataValue {
    fn from(value: TypeRef) -> Self {
        MetadataValue::Type(value)
    }
}

impl From<Vec<MetadataValue>> for MetadataValue {
    fn from(value: Vec<MetadataValue>) -> Self {
        MetadataValue::Array(value)
    }
}

/// Reads generic type arguments stored under [GENERIC_PARAMETERS_METADATA_NAME]. Returns `None`
/// if missing or not an array of types.
pub fn generic_parameters(metadata: &Metadata) -> Option<Vec<TypeRef>> {
    metadata
        .get(GENERIC_PARAMETERS_METADATA_NAME)?
        .as_array()?
        .iter()
        .map(|value| value.as_type().cloned())
        .collect()
}

/// Stores generic type arguments under [GENERIC_PARAMETERS_METADATA_NAME].
pub fn set_generic_parameters(metadata: &mut Metadata, arguments: &[TypeRef]) {
    metadata.insert(
        GENERIC_PARAMETERS_METADATA_NAME.to_string(),
        MetadataValue::Array(arguments.iter().cloned().map(MetadataValue::Type).collect()),
    );
}
