//! Runtime instantiation of composed parts. An [ExportProvider] is bound to a
//! [RuntimeComposition] and a [SharingScope], and hands out lazily evaluated [Export]s.
//!
//! Instances are created on first access to an export value:
//!
//! 1. constructor parameters are resolved recursively, then the importing constructor is
//!    invoked,
//! 2. a shared instance is registered as provisional before importing members are set, so shared
//!    parts importing each other resolve to the same instances,
//! 3. disposable instances are tracked by the scope which created them,
//! 4. importing members are set and the `OnImportsSatisfied` callback is invoked.
//!
//! Provisional instances are only visible within a single top-level creation - concurrent
//! creations are serialized by per-scope locks instead. Disposing a scope waits for creations
//! holding its lock.
//!
//! ```
//! use partwire_composition::catalog::ComposableCatalog;
//! use partwire_composition::configuration::CompositionConfiguration;
//! use partwire_composition::contract::{CompositionContract, TypeRef};
//! use partwire_composition::export_definition::ExportDefinition;
//! use partwire_composition::export_provider::TypedExportSource;
//! use partwire_composition::instance::exported_value;
//! use partwire_composition::part_definition::PartDefinitionBuilder;
//!
//! struct Greeter;
//!
//! let contract = CompositionContract::of(TypeRef::named("Greeter"));
//! let greeter = PartDefinitionBuilder::new(TypeRef::named("Greeter"))
//!     .export(ExportDefinition::new(contract.clone()))
//!     .importing_constructor(vec![], |_| Ok(exported_value(Greeter)))
//!     .build()
//!     .unwrap();
//!
//! let provider = CompositionConfiguration::create(ComposableCatalog::create([greeter]))
//!     .create_export_provider_factory()
//!     .create_export_provider();
//!
//! assert!(provider.get_exported_value::<Greeter>(&contract).is_ok());
//! ```

use crate::contract::{CompositionContract, TypeRef};
use crate::error::ExportProviderError;
use crate::export::{DisposeAction, Export, ExportFactory, ExportLifetime, Lazy};
use crate::import_definition::{
    CollectionAdapterPtr, ImportCardinality, ImportCollection, ImportConstraint,
    ImportDefinition, ImportSite, ImportWrapper,
};
use crate::instance::{
    exported_value, ExportedValue, ImportedItem, ImportedValue, InstancePtr, PartArguments,
    PartInstance,
};
use crate::member::MemberAccessor;
use crate::metadata::generic_parameters;
use crate::metadata_view::MetadataViewSchema;
use crate::runtime::{
    PartSurrogate, RuntimeComposition, RuntimeExport, RuntimeImport, RuntimePart,
};
use crate::scope::{
    InstanceKey, ScopeId, SharingScope, TrackedDisposable, ROOT_SHARING_BOUNDARY,
};
use fxhash::FxHashMap;
use itertools::Itertools;
#[cfg(test)]
use mockall::automock;
use std::any::Any;
use std::borrow::Cow;
use std::mem;
use std::sync::{Arc, Weak};
use tracing::trace;

/// Type name of the export provider contract.
pub const EXPORT_PROVIDER_TYPE_NAME: &str = "ExportProvider";

/// Contract under which parts can import the [ExportProvider] itself.
pub fn export_provider_contract() -> CompositionContract {
    CompositionContract::of(TypeRef::named(EXPORT_PROVIDER_TYPE_NAME))
}

/// Generic source of exports.
#[cfg_attr(test, automock)]
pub trait ExportSource {
    /// Returns lazily evaluated exports satisfying given import. Fails if the number of exports
    /// doesn't match import cardinality.
    fn get_exports(&self, import: &ImportDefinition) -> Result<Vec<Export>, ExportProviderError>;
}

/// Helper trait for [ExportSource] providing strongly-typed access.
pub trait TypedExportSource {
    /// Returns the value of the only export of given contract.
    fn get_exported_value<T: Any + Send + Sync>(
        &self,
        contract: &CompositionContract,
    ) -> Result<InstancePtr<T>, ExportProviderError>;

    /// Like [TypedExportSource::get_exported_value], but returns `None` if there's no export.
    fn get_exported_value_or_default<T: Any + Send + Sync>(
        &self,
        contract: &CompositionContract,
    ) -> Result<Option<InstancePtr<T>>, ExportProviderError>;

    /// Returns values of all exports of given contract, in catalog order.
    fn get_exported_values<T: Any + Send + Sync>(
        &self,
        contract: &CompositionContract,
    ) -> Result<Vec<InstancePtr<T>>, ExportProviderError>;

    /// Returns the only export of given contract, without creating its value.
    fn get_export<T: Any + Send + Sync>(
        &self,
        contract: &CompositionContract,
    ) -> Result<Lazy<T>, ExportProviderError>;
}

impl<S: ExportSource + ?Sized> TypedExportSource for S {
    fn get_exported_value<T: Any + Send + Sync>(
        &self,
        contract: &CompositionContract,
    ) -> Result<InstancePtr<T>, ExportProviderError> {
        self.get_export::<T>(contract)?.value()
    }

    fn get_exported_value_or_default<T: Any + Send + Sync>(
        &self,
        contract: &CompositionContract,
    ) -> Result<Option<InstancePtr<T>>, ExportProviderError> {
        single_export(self, ImportDefinition::one_or_zero(contract.clone()))?
            .map(|export| export.typed::<T>().value())
            .transpose()
    }

    fn get_exported_values<T: Any + Send + Sync>(
        &self,
        contract: &CompositionContract,
    ) -> Result<Vec<InstancePtr<T>>, ExportProviderError> {
        self.get_exports(&ImportDefinition::zero_or_more(contract.clone()))?
            .into_iter()
            .map(|export| export.typed::<T>().value())
            .try_collect()
    }

    fn get_export<T: Any + Send + Sync>(
        &self,
        contract: &CompositionContract,
    ) -> Result<Lazy<T>, ExportProviderError> {
        let import = ImportDefinition::exactly_one(contract.clone());
        single_export(self, import.clone())?
            .map(Export::typed)
            .ok_or_else(|| cardinality_mismatch(&import, 0))
    }
}

fn single_export<S: ExportSource + ?Sized>(
    source: &S,
    import: ImportDefinition,
) -> Result<Option<Export>, ExportProviderError> {
    let exports = source.get_exports(&import)?;
    check_cardinality(&import, exports.len())?;
    Ok(exports.into_iter().next())
}

fn cardinality_mismatch(import: &ImportDefinition, actual: usize) -> ExportProviderError {
    ExportProviderError::CardinalityMismatch {
        contract: import.contract().clone(),
        cardinality: import.cardinality(),
        actual,
    }
}

fn check_cardinality(import: &ImportDefinition, count: usize) -> Result<(), ExportProviderError> {
    if import.cardinality().is_satisfied_by_count(count) {
        Ok(())
    } else {
        Err(cardinality_mismatch(import, count))
    }
}

/// Creates [ExportProvider]s sharing the same [RuntimeComposition].
#[derive(Clone, Debug)]
pub struct ExportProviderFactory {
    composition: Arc<RuntimeComposition>,
}

impl ExportProviderFactory {
    pub fn new(composition: Arc<RuntimeComposition>) -> Self {
        Self { composition }
    }

    /// Creates a new provider with its own root sharing scope.
    pub fn create_export_provider(&self) -> ExportProvider {
        ExportProvider {
            composition: self.composition.clone(),
            scope: SharingScope::root(),
        }
    }

    #[inline]
    pub fn composition(&self) -> &Arc<RuntimeComposition> {
        &self.composition
    }
}

#[derive(Default)]
struct CreationContext {
    provisional: FxHashMap<(ScopeId, InstanceKey), PartInstance>,
    non_shared_chain: Vec<PartSurrogate>,
}

/// Provider used by deferred creation. Doesn't keep the scope alive.
#[derive(Clone)]
struct WeakExportProvider {
    composition: Arc<RuntimeComposition>,
    scope: Weak<SharingScope>,
}

impl WeakExportProvider {
    fn upgrade(&self) -> Result<ExportProvider, ExportProviderError> {
        self.scope
            .upgrade()
            .filter(|scope| !scope.is_disposed())
            .map(|scope| ExportProvider {
                composition: self.composition.clone(),
                scope,
            })
            .ok_or(ExportProviderError::ScopeDisposed)
    }
}

/// Source of exports of a composition, bound to a sharing scope. Clones share the same scope.
#[derive(Clone, Debug)]
pub struct ExportProvider {
    composition: Arc<RuntimeComposition>,
    scope: Arc<SharingScope>,
}

impl ExportSource for ExportProvider {
    fn get_exports(&self, import: &ImportDefinition) -> Result<Vec<Export>, ExportProviderError> {
        if self.scope.is_disposed() {
            return Err(ExportProviderError::ScopeDisposed);
        }

        let exports = self.composition.exports(import);
        check_cardinality(import, exports.len())?;

        trace!(
            contract = %import.contract(),
            exports = exports.len(),
            "Resolved exports."
        );

        let metadata_view = import
            .constraints()
            .iter()
            .find_map(|constraint| match constraint {
                ImportConstraint::MetadataView(schema) => Some(schema),
                _ => None,
            });

        exports
            .iter()
            .map(|export| {
                let non_shared =
                    import.is_non_shared_instance_required(export.part_definition(), false);
                self.lazy_export(export, import, non_shared, metadata_view)
            })
            .try_collect()
    }
}

impl ExportProvider {
    #[inline]
    pub fn scope(&self) -> &Arc<SharingScope> {
        &self.scope
    }

    #[inline]
    pub fn composition(&self) -> &Arc<RuntimeComposition> {
        &self.composition
    }

    /// Creates a provider bound to a new scope nested in this one, owning given boundaries.
    pub fn create_scope<I, S>(&self, boundaries: I) -> Result<ExportProvider, ExportProviderError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self {
            composition: self.composition.clone(),
            scope: self
                .scope
                .new_child(boundaries.into_iter().map(Into::into).collect())?,
        })
    }

    /// Disposes the scope along with all nested scopes and tracked instances. Subsequent calls do
    /// nothing.
    pub fn dispose(&self) {
        self.scope.dispose();
    }

    fn weak(&self) -> WeakExportProvider {
        WeakExportProvider {
            composition: self.composition.clone(),
            scope: Arc::downgrade(&self.scope),
        }
    }

    /// The provider exposed to parts importing it. Imports within the same scope get the same
    /// instance.
    fn export_provider_value(&self) -> ExportedValue {
        self.scope.export_provider_value(|| exported_value(self.clone()))
    }

    fn with_scope(&self, scope: Arc<SharingScope>) -> Self {
        Self {
            composition: self.composition.clone(),
            scope,
        }
    }

    fn lazy_export(
        &self,
        export: &RuntimeExport,
        import: &ImportDefinition,
        non_shared: bool,
        metadata_view: Option<&Arc<MetadataViewSchema>>,
    ) -> Result<Export, ExportProviderError> {
        let metadata_view = metadata_view
            .map(|schema| {
                self.composition.metadata_views().get_or_create(
                    schema,
                    export.surrogate(),
                    export.binding().index(),
                    export.binding().definition().metadata(),
                )
            })
            .transpose()?;

        let provider = self.weak();
        let runtime_export = export.clone();
        let import = import.clone();

        Ok(Export::new(
            export.binding().definition().clone(),
            metadata_view,
            move || {
                provider.upgrade()?.export_value(
                    &runtime_export,
                    &import,
                    non_shared,
                    &mut CreationContext::default(),
                )
            },
        ))
    }

    fn export_factory(
        &self,
        export: &RuntimeExport,
        import: &ImportDefinition,
    ) -> ExportFactory {
        let provider = self.weak();
        let runtime_export = export.clone();
        let import = import.clone();

        ExportFactory::new(export.binding().definition().clone(), move || {
            provider
                .upgrade()?
                .create_lifetime(&runtime_export, &import)
        })
    }

    fn create_lifetime(
        &self,
        export: &RuntimeExport,
        import: &ImportDefinition,
    ) -> Result<ExportLifetime, ExportProviderError> {
        let non_shared = import.is_non_shared_instance_required(export.part_definition(), true);
        let boundaries = import.export_factory_sharing_boundaries();

        if boundaries.is_empty() {
            if export.part_definition().is_export_provider() {
                return Ok(ExportLifetime::new(self.export_provider_value(), None));
            }

            let (instance, tracked) = self.create_export_part(
                export,
                import,
                non_shared,
                &mut CreationContext::default(),
            )?;
            let value = export.binding().export().value(&instance)?;

            let scope = Arc::downgrade(&self.scope);
            let dispose = tracked.map(|tracked| {
                Box::new(move || {
                    tracked.dispose();
                    if let Some(scope) = scope.upgrade() {
                        scope.release_disposable(&tracked);
                    }
                }) as DisposeAction
            });

            return Ok(ExportLifetime::new(value, dispose));
        }

        let scope = self.scope.new_child(boundaries.to_vec())?;
        let result = self.with_scope(scope.clone()).export_value(
            export,
            import,
            non_shared,
            &mut CreationContext::default(),
        );

        match result {
            Ok(value) => Ok(ExportLifetime::new(
                value,
                Some(Box::new(move || scope.dispose())),
            )),
            Err(error) => {
                scope.dispose();
                Err(error)
            }
        }
    }

    fn export_value(
        &self,
        export: &RuntimeExport,
        import: &ImportDefinition,
        non_shared: bool,
        context: &mut CreationContext,
    ) -> Result<ExportedValue, ExportProviderError> {
        if export.part_definition().is_export_provider() {
            return Ok(self.export_provider_value());
        }

        let (instance, _) = self.create_export_part(export, import, non_shared, context)?;
        export.binding().export().value(&instance)
    }

    fn create_export_part(
        &self,
        export: &RuntimeExport,
        import: &ImportDefinition,
        non_shared: bool,
        context: &mut CreationContext,
    ) -> Result<(PartInstance, Option<Arc<TrackedDisposable>>), ExportProviderError> {
        let part = self.composition.part(export.surrogate()).ok_or_else(|| {
            ExportProviderError::NotInstantiable(export.part_definition().type_ref().clone())
        })?;

        let type_arguments = type_arguments(part, import)?;
        self.create_part(part, type_arguments, non_shared, context)
    }

    fn create_part(
        &self,
        part: &RuntimePart,
        type_arguments: Vec<TypeRef>,
        non_shared: bool,
        context: &mut CreationContext,
    ) -> Result<(PartInstance, Option<Arc<TrackedDisposable>>), ExportProviderError> {
        if self.scope.is_disposed() {
            return Err(ExportProviderError::ScopeDisposed);
        }

        let owner = self.owner_scope(part)?;

        if part.definition().is_shared() && !non_shared {
            return self
                .with_scope(owner)
                .get_or_create_shared(part, type_arguments, context)
                .map(|instance| (instance, None));
        }

        if context.non_shared_chain.contains(&part.surrogate()) {
            return Err(ExportProviderError::DependencyCycle(part.type_ref().clone()));
        }

        let _guard = self.scope.lock_creation()?;

        context.non_shared_chain.push(part.surrogate());
        let result = self.instantiate(part, type_arguments, None, context);
        context.non_shared_chain.pop();

        result
    }

    /// Finds the scope which should own a shared instance of given part - the deepest of scopes
    /// owning the boundaries required by the part.
    fn owner_scope(&self, part: &RuntimePart) -> Result<Arc<SharingScope>, ExportProviderError> {
        let own_boundary = part
            .definition()
            .sharing_boundary()
            .filter(|_| part.definition().is_shared())
            .unwrap_or(ROOT_SHARING_BOUNDARY);

        let owners: Vec<Arc<SharingScope>> = std::iter::once(own_boundary)
            .chain(part.required_sharing_boundaries().iter().map(String::as_str))
            .map(|boundary| {
                self.scope.owner_of(boundary).ok_or_else(|| {
                    ExportProviderError::MissingSharingBoundary {
                        part: part.type_ref().clone(),
                        boundary: boundary.to_string(),
                    }
                })
            })
            .try_collect()?;

        owners
            .into_iter()
            .max_by_key(|scope| scope.depth())
            .ok_or_else(|| ExportProviderError::MissingSharingBoundary {
                part: part.type_ref().clone(),
                boundary: own_boundary.to_string(),
            })
    }

    fn get_or_create_shared(
        &self,
        part: &RuntimePart,
        type_arguments: Vec<TypeRef>,
        context: &mut CreationContext,
    ) -> Result<PartInstance, ExportProviderError> {
        let key = InstanceKey::new(part.surrogate(), type_arguments.clone());
        let provisional_key = (self.scope.id(), key.clone());

        let _guard = self.scope.lock_creation()?;

        if let Some(instance) = self.scope.shared_instance(&key) {
            return Ok(instance);
        }

        if let Some(instance) = context.provisional.get(&provisional_key) {
            return Ok(instance.clone());
        }

        if !self.scope.begin_construction(&key) {
            return Err(ExportProviderError::DependencyCycle(part.type_ref().clone()));
        }

        // shared instances break chains of non-shared ones
        let chain = mem::take(&mut context.non_shared_chain);
        let result = self.instantiate(part, type_arguments, Some(&provisional_key), context);
        context.non_shared_chain = chain;

        self.scope.end_construction(&key);
        context.provisional.remove(&provisional_key);

        let (instance, _) = result?;
        self.scope.store_shared_instance(key, instance.clone());

        Ok(instance)
    }

    fn instantiate(
        &self,
        part: &RuntimePart,
        type_arguments: Vec<TypeRef>,
        provisional_key: Option<&(ScopeId, InstanceKey)>,
        context: &mut CreationContext,
    ) -> Result<(PartInstance, Option<Arc<TrackedDisposable>>), ExportProviderError> {
        let definition = part.definition();
        let constructor = definition
            .importing_constructor()
            .ok_or_else(|| ExportProviderError::NotInstantiable(definition.type_ref().clone()))?;

        let parameters: Vec<ImportedValue> = part
            .constructor_imports()
            .iter()
            .map(|import| self.resolve_import(import, &type_arguments, context))
            .try_collect()?;

        let instance = constructor
            .construct(PartArguments::new(type_arguments.clone(), parameters))
            .map_err(|error| ExportProviderError::ConstructionFailed {
                part: definition.type_ref().clone(),
                error,
            })?;

        trace!(
            part = %definition.type_ref(),
            scope = self.scope.id(),
            "Created part instance."
        );

        if let Some(key) = provisional_key {
            context.provisional.insert(key.clone(), instance.clone());
        }

        let tracked = definition
            .disposer()
            .map(|disposer| self.scope.track_disposable(instance.clone(), disposer.clone()))
            .transpose()?;

        for import in part.member_imports() {
            self.satisfy_member(&instance, import, &type_arguments, context)?;
        }

        if let Some(callback) = definition.on_imports_satisfied() {
            callback.invoke(&instance)?;
        }

        Ok((instance, tracked))
    }

    fn resolve_import(
        &self,
        import: &RuntimeImport,
        type_arguments: &[TypeRef],
        context: &mut CreationContext,
    ) -> Result<ImportedValue, ExportProviderError> {
        let binding = import.binding();

        let (definition, exports) = if type_arguments.is_empty() {
            (
                Cow::Borrowed(binding.definition()),
                Cow::Borrowed(import.exports()),
            )
        } else {
            let definition = binding.definition().with_type_arguments(type_arguments);
            let exports = self.composition.exports(&definition);
            (Cow::Owned(definition), Cow::Owned(exports))
        };

        check_cardinality(&definition, exports.len())?;

        let items: Vec<ImportedItem> = exports
            .iter()
            .map(|export| match binding.wrapper() {
                ImportWrapper::Direct => self
                    .export_value(
                        export,
                        &definition,
                        binding.is_non_shared_instance_required(export.part_definition()),
                        context,
                    )
                    .map(ImportedItem::Value),
                ImportWrapper::Lazy { metadata_view } => self
                    .lazy_export(
                        export,
                        &definition,
                        binding.is_non_shared_instance_required(export.part_definition()),
                        metadata_view.as_ref(),
                    )
                    .map(ImportedItem::Lazy),
                ImportWrapper::ExportFactory => Ok(ImportedItem::Factory(
                    self.export_factory(export, &definition),
                )),
            })
            .try_collect()?;

        Ok(match definition.cardinality() {
            ImportCardinality::ZeroOrMore => ImportedValue::Many(items),
            _ => items
                .into_iter()
                .next()
                .map(ImportedValue::Single)
                .unwrap_or_default(),
        })
    }

    fn satisfy_member(
        &self,
        instance: &PartInstance,
        import: &RuntimeImport,
        type_arguments: &[TypeRef],
        context: &mut CreationContext,
    ) -> Result<(), ExportProviderError> {
        let ImportSite::Member(member) = import.binding().site() else {
            return Ok(());
        };

        let value = self.resolve_import(import, type_arguments, context)?;

        match import.binding().collection() {
            Some(ImportCollection::Custom {
                adapter: Some(adapter),
                ..
            }) => populate_collection(instance, member, adapter, value),
            _ => member.set_value(instance, value),
        }
    }
}

/// Fills a custom collection of an importing member. A pre-initialized collection is cleared
/// and reused, otherwise a new one is created and set.
fn populate_collection(
    instance: &PartInstance,
    member: &MemberAccessor,
    adapter: &CollectionAdapterPtr,
    value: ImportedValue,
) -> Result<(), ExportProviderError> {
    let access_error = |error| ExportProviderError::MemberAccessFailed {
        member: member.to_string(),
        error,
    };

    let existing = if member.is_readable() {
        member.get_value(instance)?
    } else {
        None
    };

    let (collection, created) = match existing {
        Some(collection) => {
            adapter.clear(&collection).map_err(access_error)?;
            (collection, false)
        }
        None => {
            let collection = adapter.create().ok_or_else(|| {
                ExportProviderError::CollectionNotConstructible(member.to_string())
            })?;
            (collection, true)
        }
    };

    for item in value.into_items() {
        adapter.add(&collection, item).map_err(access_error)?;
    }

    if created {
        member.set_value(
            instance,
            ImportedValue::Single(ImportedItem::Value(collection)),
        )?;
    }

    Ok(())
}

/// Determines type arguments closing a generic part, from `GenericParameters` import metadata or
/// the generic arguments of the requested contract.
fn type_arguments(
    part: &RuntimePart,
    import: &ImportDefinition,
) -> Result<Vec<TypeRef>, ExportProviderError> {
    let TypeRef::GenericDefinition { arity, .. } = part.type_ref() else {
        return Ok(vec![]);
    };

    generic_parameters(import.metadata())
        .or_else(|| {
            let arguments = import.contract().type_ref().generic_arguments();
            (!arguments.is_empty()).then(|| arguments.to_vec())
        })
        .filter(|arguments| {
            arguments.len() == *arity
                && !arguments
                    .iter()
                    .any(|argument| argument.contains_generic_parameters())
        })
        .ok_or_else(|| ExportProviderError::UnresolvableTypeArguments(part.type_ref().clone()))
}
