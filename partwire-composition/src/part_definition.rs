//! Definitions of composable parts. A [ComposablePartDefinition] is the abstract record produced by
//! discovery - it describes what a part exports and imports, and how to create and wire its
//! instances. Definitions are immutable once built.
//!
//! ```
//! use partwire_composition::contract::{CompositionContract, TypeRef};
//! use partwire_composition::export_definition::ExportDefinition;
//! use partwire_composition::import_definition::{ImportDefinition, ImportDefinitionBinding};
//! use partwire_composition::instance::{exported_value, InstancePtr};
//! use partwire_composition::part_definition::PartDefinitionBuilder;
//!
//! struct Logger;
//!
//! struct Service {
//!     logger: InstancePtr<Logger>,
//! }
//!
//! let logger = TypeRef::named("Logger");
//!
//! let service = PartDefinitionBuilder::new(TypeRef::named("Service"))
//!     .non_shared()
//!     .export(ExportDefinition::new(CompositionContract::of(TypeRef::named("Service"))))
//!     .importing_constructor(
//!         vec![ImportDefinitionBinding::new(
//!             ImportDefinition::exactly_one(CompositionContract::of(logger.clone())),
//!             logger,
//!         )],
//!         |mut arguments| {
//!             Ok(exported_value(Service {
//!                 logger: arguments.take(0).into_single()?,
//!             }))
//!         },
//!     )
//!     .build()
//!     .unwrap();
//!
//! assert!(service.is_instantiable());
//! assert_eq!(service.imports().count(), 1);
//! ```

use crate::contract::{CompositionContract, TypeRef};
use crate::error::PartDiscoveryError;
use crate::export_definition::{ExportDefinition, ExportSite, PartExport};
use crate::import_definition::{
    CreationPolicy, ImportCardinality, ImportCollection, ImportDefinitionBinding, ImportSite,
};
use crate::instance::{
    downcast_value, exported_value, Disposable, ErrorPtr, ExportedValue, PartArguments,
    PartInstance,
};
use crate::member::{MemberAccessor, MemberKind};
use crate::metadata::{Metadata, MetadataValue};
use derivative::Derivative;
use itertools::Itertools;
use std::any::Any;
use std::sync::Arc;

/// Type-erased constructor of part instances.
pub type PartConstructor =
    Arc<dyn Fn(PartArguments) -> Result<PartInstance, ErrorPtr> + Send + Sync + 'static>;

/// Disposes a part instance, if it's of the expected type.
pub type PartDisposer = Arc<dyn Fn(&PartInstance) + Send + Sync + 'static>;

/// Constructor used to instantiate a part, along with imports satisfying its parameters.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct ImportingConstructor {
    parameters: Vec<ImportDefinitionBinding>,
    #[derivative(Debug = "ignore")]
    construct: PartConstructor,
}

impl ImportingConstructor {
    #[inline]
    pub fn parameters(&self) -> &[ImportDefinitionBinding] {
        &self.parameters
    }

    #[inline]
    pub fn construct(&self, arguments: PartArguments) -> Result<PartInstance, ErrorPtr> {
        (self.construct)(arguments)
    }
}

/// Description of a discovered part.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct ComposablePartDefinition {
    type_ref: TypeRef,
    implemented_types: Vec<TypeRef>,
    metadata: Metadata,
    exports: Vec<PartExport>,
    import_members: Vec<ImportDefinitionBinding>,
    importing_constructor: Option<ImportingConstructor>,
    on_imports_satisfied: Option<MemberAccessor>,
    creation_policy: CreationPolicy,
    sharing_boundary: Option<String>,
    #[derivative(Debug = "ignore")]
    disposer: Option<PartDisposer>,
    is_export_provider: bool,
}

impl ComposablePartDefinition {
    /// Identity of the part type. Open generic parts are identified by generic definitions.
    #[inline]
    pub fn type_ref(&self) -> &TypeRef {
        &self.type_ref
    }

    /// Types the part type is assignable to.
    #[inline]
    pub fn implemented_types(&self) -> &[TypeRef] {
        &self.implemented_types
    }

    #[inline]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    #[inline]
    pub fn exports(&self) -> &[PartExport] {
        &self.exports
    }

    /// All imports - constructor parameters first, then importing members.
    pub fn imports(&self) -> impl Iterator<Item = &ImportDefinitionBinding> {
        self.constructor_imports()
            .iter()
            .chain(self.import_members.iter())
    }

    pub fn constructor_imports(&self) -> &[ImportDefinitionBinding] {
        self.importing_constructor
            .as_ref()
            .map(ImportingConstructor::parameters)
            .unwrap_or_default()
    }

    #[inline]
    pub fn import_members(&self) -> &[ImportDefinitionBinding] {
        &self.import_members
    }

    #[inline]
    pub fn importing_constructor(&self) -> Option<&ImportingConstructor> {
        self.importing_constructor.as_ref()
    }

    #[inline]
    pub fn on_imports_satisfied(&self) -> Option<&MemberAccessor> {
        self.on_imports_satisfied.as_ref()
    }

    #[inline]
    pub fn creation_policy(&self) -> CreationPolicy {
        self.creation_policy
    }

    /// Shared parts have a single instance per sharing scope, unless an import explicitly
    /// requires a new one.
    #[inline]
    pub fn is_shared(&self) -> bool {
        self.creation_policy != CreationPolicy::NonShared
    }

    /// Sharing boundary the part's shared instance lives in. `None` means the root scope.
    #[inline]
    pub fn sharing_boundary(&self) -> Option<&str> {
        self.sharing_boundary.as_deref()
    }

    #[inline]
    pub fn is_instantiable(&self) -> bool {
        self.importing_constructor.is_some()
    }

    #[inline]
    pub fn is_generic(&self) -> bool {
        self.type_ref.is_generic_type_definition()
    }

    /// Checks if this is the synthetic part exporting the export provider itself.
    #[inline]
    pub fn is_export_provider(&self) -> bool {
        self.is_export_provider
    }

    #[inline]
    pub fn is_disposable(&self) -> bool {
        self.disposer.is_some()
    }

    #[inline]
    pub(crate) fn disposer(&self) -> Option<&PartDisposer> {
        self.disposer.as_ref()
    }

    /// Creates the synthetic part exporting given contract, which the composition engine
    /// satisfies with the export provider itself.
    pub(crate) fn export_provider(contract: CompositionContract) -> Self {
        let value_type = contract.type_ref().clone();
        Self {
            type_ref: value_type.clone(),
            implemented_types: vec![],
            metadata: Default::default(),
            exports: vec![PartExport::new(
                ExportDefinition::new(contract),
                ExportSite::Type { cast: None },
                value_type,
            )],
            import_members: vec![],
            importing_constructor: None,
            on_imports_satisfied: None,
            creation_policy: CreationPolicy::Shared,
            sharing_boundary: None,
            disposer: None,
            is_export_provider: true,
        }
    }
}

/// Builder for [ComposablePartDefinition]s. Problems with declarations are collected and
/// returned from [PartDefinitionBuilder::build] all at once.
pub struct PartDefinitionBuilder {
    definition: ComposablePartDefinition,
    errors: Vec<PartDiscoveryError>,
}

impl PartDefinitionBuilder {
    pub fn new(type_ref: TypeRef) -> Self {
        Self {
            definition: ComposablePartDefinition {
                type_ref,
                implemented_types: vec![],
                metadata: Default::default(),
                exports: vec![],
                import_members: vec![],
                importing_constructor: None,
                on_imports_satisfied: None,
                creation_policy: CreationPolicy::Any,
                sharing_boundary: None,
                disposer: None,
                is_export_provider: false,
            },
            errors: vec![],
        }
    }

    /// Declares a type the part type is assignable to.
    pub fn implements(mut self, type_ref: TypeRef) -> Self {
        self.definition.implemented_types.push(type_ref);
        self
    }

    pub fn with_metadata(mut self, name: &str, value: impl Into<MetadataValue>) -> Self {
        self.definition
            .metadata
            .insert(name.to_string(), value.into());
        self
    }

    /// Exports the part instance itself.
    pub fn export(mut self, definition: ExportDefinition) -> Self {
        self.definition.exports.push(PartExport::new(
            definition,
            ExportSite::Type { cast: None },
            self.definition.type_ref.clone(),
        ));
        self
    }

    /// Exports the part instance converted by given function, e.g. to a trait object.
    pub fn export_as<F>(
        mut self,
        definition: ExportDefinition,
        value_type: TypeRef,
        cast: F,
    ) -> Self
    where
        F: Fn(PartInstance) -> Result<ExportedValue, ErrorPtr> + Send + Sync + 'static,
    {
        self.definition.exports.push(PartExport::new(
            definition,
            ExportSite::Type {
                cast: Some(Arc::new(cast)),
            },
            value_type,
        ));
        self
    }

    /// Typed version of [PartDefinitionBuilder::export_as], downcasting the instance to `T`.
    pub fn export_typed<T, R, F>(
        self,
        definition: ExportDefinition,
        value_type: TypeRef,
        cast: F,
    ) -> Self
    where
        T: Any + Send + Sync,
        R: Any + Send + Sync,
        F: Fn(Arc<T>) -> R + Send + Sync + 'static,
    {
        self.export_as(definition, value_type, move |instance| {
            Ok(exported_value(cast(downcast_value::<T>(instance)?)))
        })
    }

    /// Exports the value of a member.
    pub fn export_member(
        mut self,
        definition: ExportDefinition,
        member: MemberAccessor,
        value_type: TypeRef,
    ) -> Self {
        self.definition.exports.push(PartExport::new(
            definition,
            ExportSite::Member(member),
            value_type,
        ));
        self
    }

    /// Declares an importing member.
    pub fn import_member(
        mut self,
        member: MemberAccessor,
        binding: ImportDefinitionBinding,
    ) -> Self {
        self.definition
            .import_members
            .push(binding.with_site(ImportSite::Member(member)));
        self
    }

    /// Declares the constructor used to create instances. Zero-parameter constructors make a part
    /// instantiable too.
    pub fn importing_constructor<F>(
        mut self,
        parameters: Vec<ImportDefinitionBinding>,
        construct: F,
    ) -> Self
    where
        F: Fn(PartArguments) -> Result<PartInstance, ErrorPtr> + Send + Sync + 'static,
    {
        if self.definition.importing_constructor.is_some() {
            self.errors.push(PartDiscoveryError::MultipleImportingConstructors(
                self.definition.type_ref.clone(),
            ));
            return self;
        }

        let parameters = parameters
            .into_iter()
            .enumerate()
            .map(|(index, binding)| binding.with_site(ImportSite::ConstructorParameter { index }))
            .collect();

        self.definition.importing_constructor = Some(ImportingConstructor {
            parameters,
            construct: Arc::new(construct),
        });
        self
    }

    /// Declares a method invoked once all imports are satisfied.
    pub fn on_imports_satisfied(mut self, member: MemberAccessor) -> Self {
        self.definition.on_imports_satisfied = Some(member);
        self
    }

    pub fn creation_policy(mut self, policy: CreationPolicy) -> Self {
        self.definition.creation_policy = policy;
        self
    }

    #[inline]
    pub fn shared(self) -> Self {
        self.creation_policy(CreationPolicy::Shared)
    }

    #[inline]
    pub fn non_shared(self) -> Self {
        self.creation_policy(CreationPolicy::NonShared)
    }

    /// Places the shared instance in the nearest sharing scope with given boundary.
    pub fn sharing_boundary(mut self, boundary: &str) -> Self {
        self.definition.sharing_boundary = Some(boundary.to_string()).filter(|b| !b.is_empty());
        self
    }

    /// Tracks instances for disposal. Instances need to be of type `T`.
    pub fn disposable<T: Disposable + Any + Send + Sync>(mut self) -> Self {
        self.definition.disposer = Some(Arc::new(|instance: &PartInstance| {
            if let Some(instance) = (**instance).downcast_ref::<T>() {
                instance.dispose();
            }
        }));
        self
    }

    pub fn build(mut self) -> Result<ComposablePartDefinition, Vec<PartDiscoveryError>> {
        self.validate();

        let implemented_types = &self.definition.implemented_types;
        for export in &mut self.definition.exports {
            if matches!(export.site(), ExportSite::Type { cast: None }) {
                export.set_value_implements(implemented_types.clone());
            }
        }

        if self.errors.is_empty() {
            Ok(self.definition)
        } else {
            Err(self.errors)
        }
    }

    fn validate(&mut self) {
        let definition = &self.definition;
        let part = &definition.type_ref;

        let exported_members = definition
            .exports
            .iter()
            .filter_map(|export| match export.site() {
                ExportSite::Member(member) => Some(member.name()),
                ExportSite::Type { .. } => None,
            })
            .collect_vec();

        for binding in definition.imports() {
            if let ImportSite::Member(member) = binding.site() {
                if exported_members.contains(&member.name()) {
                    self.errors.push(PartDiscoveryError::MemberIsImportAndExport {
                        part: part.clone(),
                        member: member.name().to_string(),
                    });
                }

                let pre_initialized_collection = member.is_readable()
                    && matches!(
                        binding.declared_collection(),
                        Some(ImportCollection::Custom { .. })
                    );
                if !member.is_settable() && !pre_initialized_collection {
                    self.errors.push(PartDiscoveryError::ImportingMemberNotSettable {
                        part: part.clone(),
                        member: member.name().to_string(),
                    });
                }
            }

            if binding.declared_collection().is_some()
                && binding.definition().cardinality() != ImportCardinality::ZeroOrMore
            {
                self.errors.push(PartDiscoveryError::CollectionOnSingleImport {
                    part: part.clone(),
                    import: binding.site().to_string(),
                });
            }
        }

        if definition.sharing_boundary.is_some() && !definition.is_shared() {
            self.errors
                .push(PartDiscoveryError::SharingBoundaryOnNonSharedPart(part.clone()));
        }

        if let Some(member) = &definition.on_imports_satisfied {
            if member.kind() != MemberKind::Method {
                self.errors.push(PartDiscoveryError::InvalidOnImportsSatisfied {
                    part: part.clone(),
                    member: member.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::contract::{CompositionContract, TypeRef};
    use crate::error::PartDiscoveryError;
    use crate::export_definition::ExportDefinition;
    use crate::import_definition::{
        ImportCollection, ImportDefinition, ImportDefinitionBinding, ImportSite,
    };
    use crate::instance::exported_value;
    use crate::member::MemberAccessor;
    use crate::part_definition::PartDefinitionBuilder;

    fn logger_import() -> ImportDefinitionBinding {
        ImportDefinitionBinding::new(
            ImportDefinition::exactly_one(CompositionContract::of(TypeRef::named("Logger"))),
            TypeRef::named("Logger"),
        )
    }

    fn settable(name: &str) -> MemberAccessor {
        MemberAccessor::property(name).with_setter(|_, _| Ok(()))
    }

    #[test]
    fn should_number_constructor_parameters() {
        let part = PartDefinitionBuilder::new(TypeRef::named("Service"))
            .importing_constructor(vec![logger_import(), logger_import()], |_| {
                Ok(exported_value(()))
            })
            .import_member(settable("logger"), logger_import())
            .build()
            .unwrap();

        let sites = part.imports().map(|import| import.site().to_string()).collect::<Vec<_>>();
        assert_eq!(
            sites,
            vec![
                "constructor parameter #0",
                "constructor parameter #1",
                "property logger"
            ]
        );
        assert!(matches!(
            part.constructor_imports()[1].site(),
            ImportSite::ConstructorParameter { index: 1 }
        ));
    }

    #[test]
    fn should_collect_all_discovery_errors() {
        let errors = PartDefinitionBuilder::new(TypeRef::named("Broken"))
            .non_shared()
            .sharing_boundary("request")
            .export_member(
                ExportDefinition::new(CompositionContract::of(TypeRef::named("Logger"))),
                settable("logger"),
                TypeRef::named("Logger"),
            )
            .import_member(settable("logger"), logger_import())
            .import_member(MemberAccessor::field("readonly"), logger_import())
            .importing_constructor(vec![], |_| Ok(exported_value(())))
            .importing_constructor(vec![], |_| Ok(exported_value(())))
            .on_imports_satisfied(MemberAccessor::field("ready"))
            .build()
            .unwrap_err();

        let part = TypeRef::named("Broken");
        assert!(errors.contains(&PartDiscoveryError::MultipleImportingConstructors(
            part.clone()
        )));
        assert!(errors.contains(&PartDiscoveryError::MemberIsImportAndExport {
            part: part.clone(),
            member: "logger".to_string(),
        }));
        assert!(errors.contains(&PartDiscoveryError::ImportingMemberNotSettable {
            part: part.clone(),
            member: "readonly".to_string(),
        }));
        assert!(errors.contains(&PartDiscoveryError::SharingBoundaryOnNonSharedPart(
            part.clone()
        )));
        assert!(errors
            .iter()
            .any(|error| matches!(error, PartDiscoveryError::InvalidOnImportsSatisfied { .. })));
        assert_eq!(errors.len(), 5);
    }

    #[test]
    fn should_reject_collection_on_single_import() {
        let errors = PartDefinitionBuilder::new(TypeRef::named("Service"))
            .import_member(
                settable("loggers"),
                logger_import().with_collection(ImportCollection::Array),
            )
            .build()
            .unwrap_err();

        assert!(matches!(
            errors.as_slice(),
            [PartDiscoveryError::CollectionOnSingleImport { .. }]
        ));
    }

    #[test]
    fn should_accept_pre_initialized_collection() {
        let part = PartDefinitionBuilder::new(TypeRef::named("Service"))
            .import_member(
                MemberAccessor::field("loggers").with_getter(|_| Ok(None)),
                ImportDefinitionBinding::new(
                    ImportDefinition::zero_or_more(CompositionContract::of(TypeRef::named(
                        "Logger",
                    ))),
                    TypeRef::named("Logger"),
                )
                .with_collection(ImportCollection::Custom {
                    type_ref: TypeRef::generic("LoggerSet", vec![]),
                    adapter: None,
                }),
            )
            .build();

        assert!(part.is_ok());
        assert!(!part.unwrap().is_instantiable());
    }
}
