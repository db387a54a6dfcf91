//! Handles to exported values: [Export] and its typed counterpart [Lazy] evaluate the value at
//! most once, on first access; [ExportFactory] creates a new value on each invocation.

use crate::error::ExportProviderError;
use crate::export_definition::ExportDefinition;
use crate::instance::{downcast_value, ExportedValue, InstancePtr};
use crate::metadata::Metadata;
use crate::metadata_view::MetadataView;
use derivative::Derivative;
use parking_lot::ReentrantMutex;
use std::any::Any;
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};

pub type ValueFactory =
    Box<dyn Fn() -> Result<ExportedValue, ExportProviderError> + Send + Sync + 'static>;

struct LazyValue {
    value: OnceLock<ExportedValue>,
    guard: ReentrantMutex<()>,
    factory: ValueFactory,
}

impl LazyValue {
    fn get(&self) -> Result<ExportedValue, ExportProviderError> {
        if let Some(value) = self.value.get() {
            return Ok(value.clone());
        }

        let _guard = self.guard.lock();
        if let Some(value) = self.value.get() {
            return Ok(value.clone());
        }

        let value = (self.factory)()?;
        Ok(self.value.get_or_init(|| value).clone())
    }

    fn is_value_created(&self) -> bool {
        self.value.get().is_some()
    }
}

/// A lazily evaluated export. Clones share the same value.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct Export {
    definition: ExportDefinition,
    metadata_view: Option<MetadataView>,
    #[derivative(Debug = "ignore")]
    value: Arc<LazyValue>,
}

impl Export {
    pub fn new<F>(
        definition: ExportDefinition,
        metadata_view: Option<MetadataView>,
        factory: F,
    ) -> Self
    where
        F: Fn() -> Result<ExportedValue, ExportProviderError> + Send + Sync + 'static,
    {
        Self {
            definition,
            metadata_view,
            value: Arc::new(LazyValue {
                value: OnceLock::new(),
                guard: ReentrantMutex::new(()),
                factory: Box::new(factory),
            }),
        }
    }

    /// Creates an export with an already available value.
    pub fn from_value(definition: ExportDefinition, value: ExportedValue) -> Self {
        let export = Self::new(definition, None, || {
            Err(ExportProviderError::UnexpectedImportShape("initialized value"))
        });
        let _ = export.value.value.set(value);
        export
    }

    #[inline]
    pub fn definition(&self) -> &ExportDefinition {
        &self.definition
    }

    #[inline]
    pub fn metadata(&self) -> &Metadata {
        self.definition.metadata()
    }

    #[inline]
    pub fn metadata_view(&self) -> Option<&MetadataView> {
        self.metadata_view.as_ref()
    }

    /// Returns the value, creating it on first call. Failed creation can be retried.
    #[inline]
    pub fn value(&self) -> Result<ExportedValue, ExportProviderError> {
        self.value.get()
    }

    #[inline]
    pub fn is_value_created(&self) -> bool {
        self.value.is_value_created()
    }

    pub fn typed<T: Any + Send + Sync>(self) -> Lazy<T> {
        Lazy {
            export: self,
            _type: PhantomData,
        }
    }
}

/// Typed view of an [Export].
#[derive(Derivative)]
#[derivative(Debug(bound = ""), Clone(bound = ""))]
pub struct Lazy<T> {
    export: Export,
    #[derivative(Debug = "ignore")]
    _type: PhantomData<fn() -> InstancePtr<T>>,
}

impl<T: Any + Send + Sync> Lazy<T> {
    pub fn value(&self) -> Result<InstancePtr<T>, ExportProviderError> {
        self.export.value().and_then(downcast_value)
    }

    #[inline]
    pub fn export(&self) -> &Export {
        &self.export
    }

    #[inline]
    pub fn metadata(&self) -> &Metadata {
        self.export.metadata()
    }

    #[inline]
    pub fn metadata_view(&self) -> Option<&MetadataView> {
        self.export.metadata_view()
    }

    #[inline]
    pub fn is_value_created(&self) -> bool {
        self.export.is_value_created()
    }
}

/// Action disposing whatever an [ExportFactory] invocation created.
pub type DisposeAction = Box<dyn FnOnce() + Send + Sync + 'static>;

/// Value created by an [ExportFactory], along with its disposal. Dropping a lifetime does not
/// dispose the value.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct ExportLifetime {
    value: ExportedValue,
    #[derivative(Debug = "ignore")]
    dispose: Option<DisposeAction>,
}

impl ExportLifetime {
    pub fn new(value: ExportedValue, dispose: Option<DisposeAction>) -> Self {
        Self { value, dispose }
    }

    #[inline]
    pub fn value(&self) -> &ExportedValue {
        &self.value
    }

    pub fn typed_value<T: Any + Send + Sync>(
        &self,
    ) -> Result<InstancePtr<T>, ExportProviderError> {
        downcast_value(self.value.clone())
    }

    /// Disposes the created value, or the whole sharing scope created for it. Subsequent calls
    /// do nothing.
    pub fn dispose(&mut self) {
        if let Some(dispose) = self.dispose.take() {
            dispose();
        }
    }
}

pub type LifetimeFactory =
    Arc<dyn Fn() -> Result<ExportLifetime, ExportProviderError> + Send + Sync + 'static>;

/// Factory creating new exported values on each invocation.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct ExportFactory {
    definition: ExportDefinition,
    #[derivative(Debug = "ignore")]
    create: LifetimeFactory,
}

impl ExportFactory {
    pub fn new<F>(definition: ExportDefinition, create: F) -> Self
    where
        F: Fn() -> Result<ExportLifetime, ExportProviderError> + Send + Sync + 'static,
    {
        Self {
            definition,
            create: Arc::new(create),
        }
    }

    #[inline]
    pub fn definition(&self) -> &ExportDefinition {
        &self.definition
    }

    #[inline]
    pub fn metadata(&self) -> &Metadata {
        self.definition.metadata()
    }

    #[inline]
    pub fn create_export(&self) -> Result<ExportLifetime, ExportProviderError> {
        (self.create)()
    }
}

#[cfg(test)]
mod tests {
    use crate::contract::{CompositionContract, TypeRef};
    use crate::error::ExportProviderError;
    use crate::export::{Export, ExportFactory, ExportLifetime};
    use crate::export_definition::ExportDefinition;
    use crate::instance::exported_value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn definition() -> ExportDefinition {
        ExportDefinition::new(CompositionContract::of(TypeRef::named("Counter")))
    }

    #[test]
    fn should_evaluate_lazy_value_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let export = {
            let calls = calls.clone();
            Export::new(definition(), None, move || {
                Ok(exported_value(calls.fetch_add(1, Ordering::SeqCst)))
            })
        };

        assert!(!export.is_value_created());

        let first = export.clone().typed::<usize>();
        let second = export.typed::<usize>();

        assert!(Arc::ptr_eq(&first.value().unwrap(), &second.value().unwrap()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(first.is_value_created());
    }

    #[test]
    fn should_retry_failed_evaluation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let export = {
            let calls = calls.clone();
            Export::new(definition(), None, move || {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ExportProviderError::ScopeDisposed)
                } else {
                    Ok(exported_value(7_u8))
                }
            })
        };

        assert!(export.value().is_err());
        assert_eq!(*export.typed::<u8>().value().unwrap(), 7);
    }

    #[test]
    fn should_dispose_lifetime_once() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let factory = {
            let disposed = disposed.clone();
            ExportFactory::new(definition(), move || {
                let disposed = disposed.clone();
                Ok(ExportLifetime::new(
                    exported_value(1_i32),
                    Some(Box::new(move || {
                        disposed.fetch_add(1, Ordering::SeqCst);
                    })),
                ))
            })
        };

        let mut lifetime = factory.create_export().unwrap();
        assert_eq!(*lifetime.typed_value::<i32>().unwrap(), 1);

        lifetime.dispose();
        lifetime.dispose();
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
    }
}
