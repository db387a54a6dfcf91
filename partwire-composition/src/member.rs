//! Member accessors replace runtime reflection: every importing or exporting member of a part is
//! described once, at discovery time, by a [MemberAccessor] which knows how to read, write or
//! invoke that member on a type-erased [PartInstance].
//!
//! Since shared parts can be handed out before their importing members are set (to resolve
//! import cycles), setters receive shared references - parts use interior mutability for
//! importing members, e.g. `OnceLock` or `Mutex` fields.

use crate::error::ExportProviderError;
use crate::instance::{ErrorPtr, ExportedValue, ImportedValue, PartInstance};
use derivative::Derivative;
use std::any::{type_name, Any};
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub type MemberGetter = Arc<
    dyn Fn(&PartInstance) -> Result<Option<ExportedValue>, ErrorPtr> + Send + Sync + 'static,
>;

pub type MemberSetter =
    Arc<dyn Fn(&PartInstance, ImportedValue) -> Result<(), ErrorPtr> + Send + Sync + 'static>;

pub type MethodInvoker = Arc<
    dyn Fn(&PartInstance) -> Result<Option<ExportedValue>, ErrorPtr> + Send + Sync + 'static,
>;

/// Kind of member described by a [MemberAccessor].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum MemberKind {
    Field,
    Property,
    Method,
}

/// Accessor for a single member of a part.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub enum MemberAccessor {
    Field {
        name: Arc<str>,
        #[derivative(Debug = "ignore")]
        get: Option<MemberGetter>,
        #[derivative(Debug = "ignore")]
        set: Option<MemberSetter>,
    },
    Property {
        name: Arc<str>,
        #[derivative(Debug = "ignore")]
        get: Option<MemberGetter>,
        #[derivative(Debug = "ignore")]
        set: Option<MemberSetter>,
    },
    /// A method either producing a delegate value (for method exports) or invoked for side
    /// effects (for the imports satisfied callback).
    Method {
        name: Arc<str>,
        #[derivative(Debug = "ignore")]
        invoke: MethodInvoker,
    },
}

fn typed_instance<T: Any>(instance: &PartInstance) -> Result<&T, ErrorPtr> {
    (**instance)
        .downcast_ref::<T>()
        .ok_or_else(|| ExportProviderError::IncompatibleExport(type_name::<T>()).into())
}

impl MemberAccessor {
    /// Creates a field accessor without getter and setter.
    pub fn field(name: &str) -> Self {
        MemberAccessor::Field {
            name: name.into(),
            get: None,
            set: None,
        }
    }

    /// Creates a property accessor without getter and setter.
    pub fn property(name: &str) -> Self {
        MemberAccessor::Property {
            name: name.into(),
            get: None,
            set: None,
        }
    }

    pub fn method<F>(name: &str, invoke: F) -> Self
    where
        F: Fn(&PartInstance) -> Result<Option<ExportedValue>, ErrorPtr> + Send + Sync + 'static,
    {
        MemberAccessor::Method {
            name: name.into(),
            invoke: Arc::new(invoke),
        }
    }

    /// Typed version of [MemberAccessor::method], downcasting the instance to `T`.
    pub fn typed_method<T, F>(name: &str, invoke: F) -> Self
    where
        T: Any,
        F: Fn(&T) -> Result<Option<ExportedValue>, ErrorPtr> + Send + Sync + 'static,
    {
        Self::method(name, move |instance| invoke(typed_instance::<T>(instance)?))
    }

    /// Sets the getter. Has no effect on methods.
    pub fn with_getter<F>(mut self, getter: F) -> Self
    where
        F: Fn(&PartInstance) -> Result<Option<ExportedValue>, ErrorPtr> + Send + Sync + 'static,
    {
        if let MemberAccessor::Field { get, .. } | MemberAccessor::Property { get, .. } = &mut self
        {
            *get = Some(Arc::new(getter));
        }
        self
    }

    /// Sets the setter. Has no effect on methods.
    pub fn with_setter<F>(mut self, setter: F) -> Self
    where
        F: Fn(&PartInstance, ImportedValue) -> Result<(), ErrorPtr> + Send + Sync + 'static,
    {
        if let MemberAccessor::Field { set, .. } | MemberAccessor::Property { set, .. } = &mut self
        {
            *set = Some(Arc::new(setter));
        }
        self
    }

    /// Typed version of [MemberAccessor::with_getter], downcasting the instance to `T`.
    pub fn with_typed_getter<T, F>(self, getter: F) -> Self
    where
        T: Any,
        F: Fn(&T) -> Result<Option<ExportedValue>, ErrorPtr> + Send + Sync + 'static,
    {
        self.with_getter(move |instance| getter(typed_instance::<T>(instance)?))
    }

    /// Typed version of [MemberAccessor::with_setter], downcasting the instance to `T`.
    pub fn with_typed_setter<T, F>(self, setter: F) -> Self
    where
        T: Any,
        F: Fn(&T, ImportedValue) -> Result<(), ErrorPtr> + Send + Sync + 'static,
    {
        self.with_setter(move |instance, value| setter(typed_instance::<T>(instance)?, value))
    }

    pub fn name(&self) -> &str {
        match self {
            MemberAccessor::Field { name, .. }
            | MemberAccessor::Property { name, .. }
            | MemberAccessor::Method { name, .. } => &**name,
        }
    }

    pub fn kind(&self) -> MemberKind {
        match self {
            MemberAccessor::Field { .. } => MemberKind::Field,
            MemberAccessor::Property { .. } => MemberKind::Property,
            MemberAccessor::Method { .. } => MemberKind::Method,
        }
    }

    #[inline]
    pub fn is_readable(&self) -> bool {
        match self {
            MemberAccessor::Field { get, .. } | MemberAccessor::Property { get, .. } => {
                get.is_some()
            }
            MemberAccessor::Method { .. } => true,
        }
    }

    #[inline]
    pub fn is_settable(&self) -> bool {
        match self {
            MemberAccessor::Field { set, .. } | MemberAccessor::Property { set, .. } => {
                set.is_some()
            }
            MemberAccessor::Method { .. } => false,
        }
    }

    /// Reads the member value. For methods, this invokes the method and returns its result.
    pub fn get_value(
        &self,
        instance: &PartInstance,
    ) -> Result<Option<ExportedValue>, ExportProviderError> {
        let result = match self {
            MemberAccessor::Field { get, .. } | MemberAccessor::Property { get, .. } => {
                let get = get
                    .as_ref()
                    .ok_or_else(|| ExportProviderError::MemberNotReadable(self.to_string()))?;
                get(instance)
            }
            MemberAccessor::Method { invoke, .. } => invoke(instance),
        };

        result.map_err(|error| self.access_error(error))
    }

    /// Writes the member value.
    pub fn set_value(
        &self,
        instance: &PartInstance,
        value: ImportedValue,
    ) -> Result<(), ExportProviderError> {
        match self {
            MemberAccessor::Field { set: Some(set), .. }
            | MemberAccessor::Property { set: Some(set), .. } => {
                set(instance, value).map_err(|error| self.access_error(error))
            }
            _ => Err(ExportProviderError::MemberNotWritable(self.to_string())),
        }
    }

    /// Invokes a method member, discarding its result.
    pub fn invoke(&self, instance: &PartInstance) -> Result<(), ExportProviderError> {
        match self {
            MemberAccessor::Method { invoke, .. } => invoke(instance)
                .map(|_| ())
                .map_err(|error| self.access_error(error)),
            _ => Err(ExportProviderError::MemberNotReadable(self.to_string())),
        }
    }

    fn access_error(&self, error: ErrorPtr) -> ExportProviderError {
        ExportProviderError::MemberAccessFailed {
            member: self.to_string(),
            error,
        }
    }
}

impl Display for MemberAccessor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            MemberAccessor::Field { name, .. } => write!(f, "field {name}"),
            MemberAccessor::Property { name, .. } => write!(f, "property {name}"),
            MemberAccessor::Method { name, .. } => write!(f, "method {name}()"),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ExportProviderError;
    use crate::instance::{exported_value, ImportedItem, ImportedValue, PartInstance};
    use crate::member::{MemberAccessor, MemberKind};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct TestPart {
        value: Mutex<Option<Arc<u8>>>,
    }

    fn instance() -> PartInstance {
        exported_value(TestPart::default())
    }

    fn value_property() -> MemberAccessor {
        MemberAccessor::property("value")
            .with_typed_setter(|part: &TestPart, value: ImportedValue| {
                *part.value.lock().unwrap() = Some(value.into_single::<u8>()?);
                Ok(())
            })
            .with_typed_getter(|part: &TestPart| {
                Ok(part
                    .value
                    .lock()
                    .unwrap()
                    .clone()
                    .map(|value| value as PartInstance))
            })
    }

    #[test]
    fn should_set_and_get_property() {
        let instance = instance();
        let accessor = value_property();

        accessor
            .set_value(
                &instance,
                ImportedValue::Single(ImportedItem::Value(exported_value(3_u8))),
            )
            .unwrap();

        let value = accessor.get_value(&instance).unwrap().unwrap();
        assert_eq!(*value.downcast::<u8>().unwrap(), 3);
        assert_eq!(accessor.kind(), MemberKind::Property);
    }

    #[test]
    fn should_reject_missing_setter() {
        let accessor = MemberAccessor::field("value");

        assert!(!accessor.is_settable());
        assert!(matches!(
            accessor
                .set_value(&instance(), ImportedValue::None)
                .unwrap_err(),
            ExportProviderError::MemberNotWritable(_)
        ));
    }

    #[test]
    fn should_report_incompatible_instance() {
        let accessor = value_property();

        assert!(matches!(
            accessor.get_value(&exported_value(1_i32)).unwrap_err(),
            ExportProviderError::MemberAccessFailed { .. }
        ));
    }

    #[test]
    fn should_invoke_method() {
        let accessor = MemberAccessor::typed_method("answer", |_: &TestPart| {
            Ok(Some(exported_value(42_i32)))
        });

        let value = accessor.get_value(&instance()).unwrap().unwrap();
        assert_eq!(*value.downcast::<i32>().unwrap(), 42);
        accessor.invoke(&instance()).unwrap();
        assert_eq!(accessor.to_string(), "method answer()");
    }
}
