//! Metadata views project export metadata onto a typed shape. A [MetadataViewSchema] lists named
//! properties with expected kinds and optional defaults; a [MetadataView] is the adapter reading
//! values by name, created only when the metadata fits the schema.

use crate::contract::TypeRef;
use crate::error::MetadataViewError;
use crate::metadata::{Metadata, MetadataValue, MetadataValueKind};
use crate::runtime::PartSurrogate;
use fxhash::FxHashMap;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq)]
pub struct MetadataViewProperty {
    name: String,
    kind: MetadataValueKind,
    default: Option<MetadataValue>,
}

impl MetadataViewProperty {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn kind(&self) -> MetadataValueKind {
        self.kind
    }

    #[inline]
    pub fn default_value(&self) -> Option<&MetadataValue> {
        self.default.as_ref()
    }
}

/// Shape of a metadata view - an ordered list of properties.
#[derive(Clone, Debug, PartialEq)]
pub struct MetadataViewSchema {
    type_ref: TypeRef,
    properties: Vec<MetadataViewProperty>,
}

impl MetadataViewSchema {
    pub fn new(type_ref: TypeRef) -> Self {
        Self {
            type_ref,
            properties: vec![],
        }
    }

    /// Adds a required property.
    pub fn with_property(mut self, name: &str, kind: MetadataValueKind) -> Self {
        self.properties.push(MetadataViewProperty {
            name: name.to_string(),
            kind,
            default: None,
        });
        self
    }

    /// Adds a property which falls back to given value when missing from metadata.
    pub fn with_optional_property(
        mut self,
        name: &str,
        kind: MetadataValueKind,
        default: impl Into<MetadataValue>,
    ) -> Self {
        self.properties.push(MetadataViewProperty {
            name: name.to_string(),
            kind,
            default: Some(default.into()),
        });
        self
    }

    /// Identity of the view.
    #[inline]
    pub fn type_ref(&self) -> &TypeRef {
        &self.type_ref
    }

    #[inline]
    pub fn properties(&self) -> &[MetadataViewProperty] {
        &self.properties
    }

    /// Checks if given metadata can be projected onto this view.
    #[inline]
    pub fn is_satisfied_by(&self, metadata: &Metadata) -> bool {
        self.validate(metadata).is_ok()
    }

    pub fn validate(&self, metadata: &Metadata) -> Result<(), MetadataViewError> {
        for property in &self.properties {
            match metadata.get(&property.name) {
                Some(value) if !value.is_compatible_with(property.kind) => {
                    return Err(MetadataViewError::KindMismatch {
                        view: self.type_ref.clone(),
                        name: property.name.clone(),
                        expected: property.kind,
                        actual: value.kind(),
                    });
                }
                None if property.default.is_none() => {
                    return Err(MetadataViewError::MissingMetadata {
                        view: self.type_ref.clone(),
                        name: property.name.clone(),
                    });
                }
                _ => {}
            }
        }

        Ok(())
    }
}

/// Metadata projected onto a [MetadataViewSchema].
#[derive(Clone, Debug, PartialEq)]
pub struct MetadataView {
    schema: Arc<MetadataViewSchema>,
    values: Arc<Metadata>,
}

impl MetadataView {
    /// Projects metadata onto given schema, filling missing values with defaults.
    pub fn new(
        schema: Arc<MetadataViewSchema>,
        metadata: &Metadata,
    ) -> Result<Self, MetadataViewError> {
        schema.validate(metadata)?;

        let values = schema
            .properties
            .iter()
            .filter_map(|property| {
                metadata
                    .get(&property.name)
                    .or(property.default.as_ref())
                    .map(|value| (property.name.clone(), value.clone()))
            })
            .collect();

        Ok(Self {
            schema,
            values: Arc::new(values),
        })
    }

    #[inline]
    pub fn schema(&self) -> &MetadataViewSchema {
        &self.schema
    }

    /// Returns the value of given property. Names outside the schema are not visible.
    #[inline]
    pub fn get(&self, name: &str) -> Option<&MetadataValue> {
        self.values.get(name)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(MetadataValue::as_bool)
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(MetadataValue::as_int)
    }

    pub fn get_float(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(MetadataValue::as_float)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(MetadataValue::as_str)
    }

    pub fn get_type(&self, name: &str) -> Option<&TypeRef> {
        self.get(name).and_then(MetadataValue::as_type)
    }
}

type ViewKey = (TypeRef, PartSurrogate, usize);

/// Cache of projected views, keyed by view identity and export.
#[derive(Debug, Default)]
pub struct MetadataViewCache {
    views: Mutex<FxHashMap<ViewKey, MetadataView>>,
}

impl MetadataViewCache {
    /// Returns a cached view for given export, projecting its metadata on first use.
    pub fn get_or_create(
        &self,
        schema: &Arc<MetadataViewSchema>,
        part: PartSurrogate,
        export_index: usize,
        metadata: &Metadata,
    ) -> Result<MetadataView, MetadataViewError> {
        let key = (schema.type_ref.clone(), part, export_index);

        let mut views = self.views.lock();
        if let Some(view) = views.get(&key) {
            return Ok(view.clone());
        }

        let view = MetadataView::new(schema.clone(), metadata)?;
        views.insert(key, view.clone());
        Ok(view)
    }

    pub fn len(&self) -> usize {
        self.views.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.lock().is_empty()
    }
}
