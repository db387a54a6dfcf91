//! Imports describe dependencies of parts: which contract is requested, how many exports are
//! expected, which exports are acceptable and how the satisfying values are handed over.

use crate::contract::{CompositionContract, TypeRef};
use crate::export_definition::ExportDefinitionBinding;
use crate::instance::{ErrorPtr, ExportedValue, ImportedItem};
use crate::member::MemberAccessor;
use crate::metadata::{Metadata, MetadataValue, EXPORT_TYPE_IDENTITY_METADATA_NAME};
use crate::metadata_view::MetadataViewSchema;
use crate::part_definition::ComposablePartDefinition;
use derivative::Derivative;
#[cfg(test)]
use mockall::automock;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Number of exports an import expects.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum ImportCardinality {
    #[default]
    ExactlyOne,
    OneOrZero,
    ZeroOrMore,
}

impl ImportCardinality {
    #[inline]
    pub fn is_satisfied_by_count(self, count: usize) -> bool {
        match self {
            ImportCardinality::ExactlyOne => count == 1,
            ImportCardinality::OneOrZero => count <= 1,
            ImportCardinality::ZeroOrMore => true,
        }
    }
}

impl Display for ImportCardinality {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ImportCardinality::ExactlyOne => write!(f, "exactly one"),
            ImportCardinality::OneOrZero => write!(f, "one or zero"),
            ImportCardinality::ZeroOrMore => write!(f, "zero or more"),
        }
    }
}

/// Creation policy of a part, or the policy required by an import.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum CreationPolicy {
    /// Shared unless an import explicitly requires a non-shared instance.
    #[default]
    Any,
    Shared,
    NonShared,
}

/// Predicate over candidate exports, which all need to pass for an export to satisfy an import.
#[derive(Clone, Debug, PartialEq)]
pub enum ImportConstraint {
    /// Export metadata needs to fit given metadata view.
    MetadataView(Arc<MetadataViewSchema>),
    /// Declaring part needs to be compatible with given creation policy.
    CreationPolicy(CreationPolicy),
    /// Export needs to have given type identity. A constructed generic identity accepts exports
    /// of the corresponding open definition.
    ExportTypeIdentity(TypeRef),
    /// Export metadata needs to contain given value.
    MetadataValue { name: String, value: MetadataValue },
}

impl ImportConstraint {
    pub fn is_satisfied_by(&self, export: &ExportDefinitionBinding) -> bool {
        match self {
            ImportConstraint::MetadataView(schema) => {
                schema.is_satisfied_by(export.definition().metadata())
            }
            ImportConstraint::CreationPolicy(required) => {
                match (required, export.part().creation_policy()) {
                    (CreationPolicy::Any, _) | (_, CreationPolicy::Any) => true,
                    (required, actual) => *required == actual,
                }
            }
            ImportConstraint::ExportTypeIdentity(expected) => {
                let identity = export
                    .definition()
                    .metadata()
                    .get(EXPORT_TYPE_IDENTITY_METADATA_NAME)
                    .and_then(MetadataValue::as_type)
                    .unwrap_or_else(|| export.definition().contract().type_ref());

                identity == expected
                    || (expected.is_constructed_generic()
                        && identity.is_generic_type_definition()
                        && *identity == expected.generic_type_definition())
            }
            ImportConstraint::MetadataValue { name, value } => {
                export.definition().metadata().get(name) == Some(value)
            }
        }
    }
}

/// Definition of a dependency, independent of the site where it's imported.
#[derive(Clone, Debug, PartialEq)]
pub struct ImportDefinition {
    contract: CompositionContract,
    cardinality: ImportCardinality,
    metadata: Metadata,
    constraints: Vec<ImportConstraint>,
    export_factory_sharing_boundaries: Vec<String>,
}

impl ImportDefinition {
    pub fn new(contract: CompositionContract, cardinality: ImportCardinality) -> Self {
        Self {
            contract,
            cardinality,
            metadata: Default::default(),
            constraints: vec![],
            export_factory_sharing_boundaries: vec![],
        }
    }

    /// Shortcut for an ExactlyOne import of given contract.
    #[inline]
    pub fn exactly_one(contract: CompositionContract) -> Self {
        Self::new(contract, ImportCardinality::ExactlyOne)
    }

    #[inline]
    pub fn one_or_zero(contract: CompositionContract) -> Self {
        Self::new(contract, ImportCardinality::OneOrZero)
    }

    #[inline]
    pub fn zero_or_more(contract: CompositionContract) -> Self {
        Self::new(contract, ImportCardinality::ZeroOrMore)
    }

    pub fn with_metadata(mut self, name: &str, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(name.to_string(), value.into());
        self
    }

    pub fn with_constraint(mut self, constraint: ImportConstraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Sets sharing boundaries for which an export factory import creates a new scope on each
    /// invocation.
    pub fn with_export_factory_sharing_boundaries<I, S>(mut self, boundaries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.export_factory_sharing_boundaries = boundaries.into_iter().map(Into::into).collect();
        self
    }

    /// Closes generic parameters of the contract and type identity constraints with given type
    /// arguments, as seen from within a closed generic part.
    pub fn with_type_arguments(&self, arguments: &[TypeRef]) -> Self {
        Self {
            contract: self.contract.substitute(arguments),
            constraints: self
                .constraints
                .iter()
                .map(|constraint| match constraint {
                    ImportConstraint::ExportTypeIdentity(type_ref) => {
                        ImportConstraint::ExportTypeIdentity(type_ref.substitute(arguments))
                    }
                    other => other.clone(),
                })
                .collect(),
            ..self.clone()
        }
    }

    #[inline]
    pub fn contract(&self) -> &CompositionContract {
        &self.contract
    }

    #[inline]
    pub fn cardinality(&self) -> ImportCardinality {
        self.cardinality
    }

    #[inline]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    #[inline]
    pub fn constraints(&self) -> &[ImportConstraint] {
        &self.constraints
    }

    #[inline]
    pub fn export_factory_sharing_boundaries(&self) -> &[String] {
        &self.export_factory_sharing_boundaries
    }

    /// Returns the most specific creation policy required by constraints.
    pub fn required_creation_policy(&self) -> CreationPolicy {
        self.constraints
            .iter()
            .find_map(|constraint| match constraint {
                ImportConstraint::CreationPolicy(policy) if *policy != CreationPolicy::Any => {
                    Some(*policy)
                }
                _ => None,
            })
            .unwrap_or_default()
    }

    /// Checks if given export can satisfy this import - the contract needs to match and all
    /// constraints need to pass.
    pub fn is_satisfied_by(&self, export: &ExportDefinitionBinding) -> bool {
        self.contract
            .matches_for_export(export.definition().contract())
            && self
                .constraints
                .iter()
                .all(|constraint| constraint.is_satisfied_by(export))
    }

    /// Checks if satisfying this import with an export of given part needs a fresh instance,
    /// rather than a shared one.
    pub fn is_non_shared_instance_required(
        &self,
        part: &ComposablePartDefinition,
        via_export_factory: bool,
    ) -> bool {
        match part.creation_policy() {
            CreationPolicy::NonShared => true,
            CreationPolicy::Shared => false,
            CreationPolicy::Any => {
                via_export_factory || self.required_creation_policy() == CreationPolicy::NonShared
            }
        }
    }
}

/// Where an import gets delivered.
#[derive(Clone, Debug)]
pub enum ImportSite {
    ConstructorParameter { index: usize },
    Member(MemberAccessor),
}

impl Display for ImportSite {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ImportSite::ConstructorParameter { index } => {
                write!(f, "constructor parameter #{index}")
            }
            ImportSite::Member(member) => write!(f, "{member}"),
        }
    }
}

/// How each satisfying export is wrapped when handed over.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum ImportWrapper {
    /// The value itself, created eagerly.
    #[default]
    Direct,
    /// A value created on first access, optionally with projected metadata.
    Lazy {
        metadata_view: Option<Arc<MetadataViewSchema>>,
    },
    /// A factory creating new values.
    ExportFactory,
}

/// Adapter for collection types, which the composition engine populates on importing members.
#[cfg_attr(test, automock)]
pub trait CollectionAdapter {
    /// Creates a new, empty collection. Returns `None` if the collection type isn't publicly
    /// constructible.
    fn create(&self) -> Option<ExportedValue>;

    fn clear(&self, collection: &ExportedValue) -> Result<(), ErrorPtr>;

    fn add(&self, collection: &ExportedValue, item: ImportedItem) -> Result<(), ErrorPtr>;
}

pub type CollectionAdapterPtr = Arc<dyn CollectionAdapter + Send + Sync>;

/// Collection type of a ZeroOrMore import site.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub enum ImportCollection {
    Array,
    Enumerable,
    Custom {
        type_ref: TypeRef,
        #[derivative(Debug = "ignore")]
        adapter: Option<CollectionAdapterPtr>,
    },
}

/// An [ImportDefinition] bound to its site within a part.
#[derive(Clone, Debug)]
pub struct ImportDefinitionBinding {
    definition: ImportDefinition,
    site: ImportSite,
    element_type: TypeRef,
    wrapper: ImportWrapper,
    collection: Option<ImportCollection>,
}

impl ImportDefinitionBinding {
    /// Creates a new binding for given import, where each satisfying export needs to be
    /// assignable to `element_type`. The site is assigned when the binding is added to a part.
    pub fn new(definition: ImportDefinition, element_type: TypeRef) -> Self {
        Self {
            definition,
            site: ImportSite::ConstructorParameter { index: 0 },
            element_type,
            wrapper: ImportWrapper::Direct,
            collection: None,
        }
    }

    pub fn lazy(mut self) -> Self {
        self.wrapper = ImportWrapper::Lazy {
            metadata_view: None,
        };
        self
    }

    /// Lazy import with metadata projected onto given view. Also constrains the satisfying
    /// exports to the ones fitting the view.
    pub fn lazy_with_metadata_view(mut self, schema: MetadataViewSchema) -> Self {
        let schema = Arc::new(schema);
        self.definition = self
            .definition
            .with_constraint(ImportConstraint::MetadataView(schema.clone()));
        self.wrapper = ImportWrapper::Lazy {
            metadata_view: Some(schema),
        };
        self
    }

    pub fn export_factory(mut self) -> Self {
        self.wrapper = ImportWrapper::ExportFactory;
        self
    }

    pub fn with_collection(mut self, collection: ImportCollection) -> Self {
        self.collection = Some(collection);
        self
    }

    pub(crate) fn with_site(mut self, site: ImportSite) -> Self {
        self.site = site;
        self
    }

    #[inline]
    pub fn definition(&self) -> &ImportDefinition {
        &self.definition
    }

    #[inline]
    pub fn site(&self) -> &ImportSite {
        &self.site
    }

    #[inline]
    pub fn element_type(&self) -> &TypeRef {
        &self.element_type
    }

    #[inline]
    pub fn wrapper(&self) -> &ImportWrapper {
        &self.wrapper
    }

    /// Collection kind of a ZeroOrMore import. Defaults to [ImportCollection::Enumerable] when
    /// not set explicitly.
    pub fn collection(&self) -> Option<&ImportCollection> {
        match (&self.collection, self.definition.cardinality()) {
            (Some(collection), _) => Some(collection),
            (None, ImportCardinality::ZeroOrMore) => Some(&ImportCollection::Enumerable),
            (None, _) => None,
        }
    }

    #[inline]
    pub(crate) fn declared_collection(&self) -> Option<&ImportCollection> {
        self.collection.as_ref()
    }

    #[inline]
    pub fn is_lazy(&self) -> bool {
        matches!(self.wrapper, ImportWrapper::Lazy { .. })
    }

    #[inline]
    pub fn is_export_factory(&self) -> bool {
        self.wrapper == ImportWrapper::ExportFactory
    }

    #[inline]
    pub fn is_constructor_parameter(&self) -> bool {
        matches!(self.site, ImportSite::ConstructorParameter { .. })
    }

    pub fn is_non_shared_instance_required(&self, part: &ComposablePartDefinition) -> bool {
        self.definition
            .is_non_shared_instance_required(part, self.is_export_factory())
    }
}
