//! Values flowing in and out of parts: instances, exported values and the shapes in which
//! imports are handed over to constructors and importing members.

use crate::contract::TypeRef;
use crate::error::ExportProviderError;
use crate::export::{Export, ExportFactory, Lazy};
use std::any::{type_name, Any};
use std::error::Error;
use std::mem;
use std::sync::Arc;

pub type InstancePtr<T> = Arc<T>;

/// Type-erased value of an export.
pub type ExportedValue = InstancePtr<dyn Any + Send + Sync + 'static>;

/// Type-erased instance of a part.
pub type PartInstance = ExportedValue;

pub type ErrorPtr = Arc<dyn Error + Send + Sync + 'static>;

/// Converts a part instance to the value of a type-level export, e.g. wrapping a concrete
/// instance in a `dyn Trait` pointer.
pub type CastFunction =
    Arc<dyn Fn(PartInstance) -> Result<ExportedValue, ErrorPtr> + Send + Sync + 'static>;

/// Parts which need cleanup when their owning sharing scope goes away. Opt-in happens via
/// [PartDefinitionBuilder::disposable](crate::part_definition::PartDefinitionBuilder::disposable).
pub trait Disposable {
    fn dispose(&self);
}

/// Downcasts a type-erased value to a concrete type.
pub fn downcast_value<T: Any + Send + Sync>(
    value: ExportedValue,
) -> Result<InstancePtr<T>, ExportProviderError> {
    value
        .downcast::<T>()
        .map_err(|_| ExportProviderError::IncompatibleExport(type_name::<T>()))
}

/// Wraps a value as an [ExportedValue].
#[inline]
pub fn exported_value<T: Any + Send + Sync>(value: T) -> ExportedValue {
    InstancePtr::new(value) as ExportedValue
}

/// A single export as seen by an importing site.
#[derive(Clone, Debug)]
pub enum ImportedItem {
    /// Eagerly created value.
    Value(ExportedValue),
    /// Value created on first access.
    Lazy(Export),
    /// Factory creating new values on each invocation.
    Factory(ExportFactory),
}

impl ImportedItem {
    /// Returns the value, forcing lazy ones. Factories have no single value.
    pub fn value(&self) -> Result<ExportedValue, ExportProviderError> {
        match self {
            ImportedItem::Value(value) => Ok(value.clone()),
            ImportedItem::Lazy(export) => export.value(),
            ImportedItem::Factory(_) => Err(ExportProviderError::UnexpectedImportShape("value")),
        }
    }

    pub fn into_typed<T: Any + Send + Sync>(self) -> Result<InstancePtr<T>, ExportProviderError> {
        self.value().and_then(downcast_value)
    }

    pub fn into_lazy<T: Any + Send + Sync>(self) -> Result<Lazy<T>, ExportProviderError> {
        match self {
            ImportedItem::Lazy(export) => Ok(export.typed()),
            _ => Err(ExportProviderError::UnexpectedImportShape("lazy")),
        }
    }

    pub fn into_factory(self) -> Result<ExportFactory, ExportProviderError> {
        match self {
            ImportedItem::Factory(factory) => Ok(factory),
            _ => Err(ExportProviderError::UnexpectedImportShape("export factory")),
        }
    }
}

/// All exports satisfying a single import, shaped by the import cardinality.
#[derive(Clone, Debug, Default)]
pub enum ImportedValue {
    /// OneOrZero import without a matching export.
    #[default]
    None,
    /// ExactlyOne or OneOrZero import.
    Single(ImportedItem),
    /// ZeroOrMore import.
    Many(Vec<ImportedItem>),
}

impl ImportedValue {
    pub fn into_item(self) -> Result<ImportedItem, ExportProviderError> {
        match self {
            ImportedValue::Single(item) => Ok(item),
            _ => Err(ExportProviderError::UnexpectedImportShape("single export")),
        }
    }

    pub fn into_optional_item(self) -> Result<Option<ImportedItem>, ExportProviderError> {
        match self {
            ImportedValue::None => Ok(None),
            ImportedValue::Single(item) => Ok(Some(item)),
            ImportedValue::Many(_) => Err(ExportProviderError::UnexpectedImportShape(
                "optional export",
            )),
        }
    }

    /// Returns all items. Single values are returned as a one-element list.
    pub fn into_items(self) -> Vec<ImportedItem> {
        match self {
            ImportedValue::None => vec![],
            ImportedValue::Single(item) => vec![item],
            ImportedValue::Many(items) => items,
        }
    }

    pub fn into_single<T: Any + Send + Sync>(self) -> Result<InstancePtr<T>, ExportProviderError> {
        self.into_item()?.into_typed()
    }

    pub fn into_optional<T: Any + Send + Sync>(
        self,
    ) -> Result<Option<InstancePtr<T>>, ExportProviderError> {
        self.into_optional_item()?
            .map(ImportedItem::into_typed)
            .transpose()
    }

    pub fn into_many<T: Any + Send + Sync>(
        self,
    ) -> Result<Vec<InstancePtr<T>>, ExportProviderError> {
        self.into_items()
            .into_iter()
            .map(ImportedItem::into_typed)
            .collect()
    }

    pub fn into_lazy<T: Any + Send + Sync>(self) -> Result<Lazy<T>, ExportProviderError> {
        self.into_item()?.into_lazy()
    }

    pub fn into_factory(self) -> Result<ExportFactory, ExportProviderError> {
        self.into_item()?.into_factory()
    }
}

/// Arguments passed to an importing constructor.
#[derive(Clone, Debug, Default)]
pub struct PartArguments {
    type_arguments: Vec<TypeRef>,
    parameters: Vec<ImportedValue>,
}

impl PartArguments {
    pub fn new(type_arguments: Vec<TypeRef>, parameters: Vec<ImportedValue>) -> Self {
        Self {
            type_arguments,
            parameters,
        }
    }

    /// Type arguments used to close a generic part. Empty for non-generic parts.
    #[inline]
    pub fn type_arguments(&self) -> &[TypeRef] {
        &self.type_arguments
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Takes the value for parameter at given index, leaving [ImportedValue::None] in its place.
    pub fn take(&mut self, index: usize) -> ImportedValue {
        self.parameters
            .get_mut(index)
            .map(mem::take)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ExportProviderError;
    use crate::instance::{exported_value, ImportedItem, ImportedValue, PartArguments};

    #[test]
    fn should_downcast_single_value() {
        let value = ImportedValue::Single(ImportedItem::Value(exported_value(5_u8)));
        assert_eq!(*value.into_single::<u8>().unwrap(), 5);
    }

    #[test]
    fn should_reject_incompatible_value() {
        let value = ImportedValue::Single(ImportedItem::Value(exported_value(5_u8)));
        assert!(matches!(
            value.into_single::<i8>().unwrap_err(),
            ExportProviderError::IncompatibleExport(_)
        ));
    }

    #[test]
    fn should_return_missing_optional_value() {
        assert!(ImportedValue::None.into_optional::<u8>().unwrap().is_none());
        assert!(ImportedValue::Many(vec![])
            .into_optional::<u8>()
            .is_err());
    }

    #[test]
    fn should_take_parameters() {
        let mut arguments = PartArguments::new(
            vec![],
            vec![ImportedValue::Single(ImportedItem::Value(exported_value(1_i32)))],
        );

        assert_eq!(*arguments.take(0).into_single::<i32>().unwrap(), 1);
        assert!(matches!(arguments.take(0), ImportedValue::None));
        assert!(matches!(arguments.take(7), ImportedValue::None));
    }
}
