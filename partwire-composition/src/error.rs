use crate::contract::{CompositionContract, TypeRef};
use crate::import_definition::ImportCardinality;
use crate::instance::ErrorPtr;
use crate::metadata::MetadataValueKind;
use itertools::Itertools;
use std::sync::Arc;
use thiserror::Error;

/// Malformed part declarations found during discovery. These are collected alongside discovered
/// parts, so a whole discovery pass can report all problems at once.
#[derive(Error, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub enum PartDiscoveryError {
    #[error("Member '{member}' of part '{part}' is declared both as an import and an export")]
    MemberIsImportAndExport { part: TypeRef, member: String },
    #[error("Part '{0}' declares multiple importing constructors")]
    MultipleImportingConstructors(TypeRef),
    #[error("Importing member '{member}' of part '{part}' cannot be set")]
    ImportingMemberNotSettable { part: TypeRef, member: String },
    #[error("Import '{import}' of part '{part}' declares a collection, but is not a ZeroOrMore import")]
    CollectionOnSingleImport { part: TypeRef, import: String },
    #[error("Part '{0}' declares a sharing boundary, but is not shared")]
    SharingBoundaryOnNonSharedPart(TypeRef),
    #[error("OnImportsSatisfied callback of part '{part}' must be a method, found: {member}")]
    InvalidOnImportsSatisfied { part: TypeRef, member: String },
}

/// Problems found while composing a catalog. A configuration carrying any of these is invalid,
/// but still fully constructed.
#[derive(Error, Clone, Eq, PartialEq, Debug)]
pub enum CompositionDiagnostic {
    #[error("Import '{import}' of part '{part}' expects {cardinality} export(s) of '{contract}', but found {actual}")]
    CardinalityMismatch {
        part: TypeRef,
        import: String,
        contract: CompositionContract,
        cardinality: ImportCardinality,
        actual: usize,
    },
    #[error("Export '{contract}' of part '{exporting_part}' is not assignable to '{expected}' required by import '{import}' of part '{part}'")]
    NotAssignable {
        part: TypeRef,
        import: String,
        exporting_part: TypeRef,
        contract: CompositionContract,
        expected: TypeRef,
    },
    #[error("Import '{import}' of part '{part}' uses unsupported collection type: {collection}")]
    UnsupportedImportCollection {
        part: TypeRef,
        import: String,
        collection: TypeRef,
    },
    #[error("Part '{part}' is in an import cycle which requires a non-shared part to import itself: {}", .cycle.iter().join(" -> "))]
    NonSharedCycle { part: TypeRef, cycle: Vec<TypeRef> },
    #[error("Part '{part}' is in an import cycle going through an importing constructor: {}", .cycle.iter().join(" -> "))]
    ConstructorCycle { part: TypeRef, cycle: Vec<TypeRef> },
}

impl CompositionDiagnostic {
    /// The part this diagnostic is attached to.
    pub fn part(&self) -> &TypeRef {
        match self {
            CompositionDiagnostic::CardinalityMismatch { part, .. }
            | CompositionDiagnostic::NotAssignable { part, .. }
            | CompositionDiagnostic::UnsupportedImportCollection { part, .. }
            | CompositionDiagnostic::NonSharedCycle { part, .. }
            | CompositionDiagnostic::ConstructorCycle { part, .. } => part,
        }
    }
}

/// Returned when a caller decides to treat composition diagnostics as fatal.
#[derive(Error, Clone, Eq, PartialEq, Debug)]
#[error("Composition is invalid, found {} error(s): {}", .0.len(), .0.iter().join("; "))]
pub struct InvalidCompositionError(pub Vec<CompositionDiagnostic>);

/// Errors related to projecting metadata onto metadata views.
#[derive(Error, Clone, Eq, PartialEq, Debug)]
pub enum MetadataViewError {
    #[error("Metadata view '{view}' requires missing metadata: {name}")]
    MissingMetadata { view: TypeRef, name: String },
    #[error("Metadata '{name}' of view '{view}' has kind {actual:?}, expected: {expected:?}")]
    KindMismatch {
        view: TypeRef,
        name: String,
        expected: MetadataValueKind,
        actual: MetadataValueKind,
    },
}

/// Errors raised while instantiating parts and retrieving exports. Variants describing an
/// unresolvable part mean composition failed - they point to a bug in the composed graph, not a
/// transient condition.
#[derive(Error, Clone, Debug)]
pub enum ExportProviderError {
    #[error("Composition failed: part '{0}' has no importing constructor and cannot be instantiated")]
    NotInstantiable(TypeRef),
    #[error("Composition failed: cannot determine type arguments for generic part: {0}")]
    UnresolvableTypeArguments(TypeRef),
    #[error("Composition failed: no sharing scope with boundary '{boundary}' is available for part: {part}")]
    MissingSharingBoundary { part: TypeRef, boundary: String },
    #[error("Composition failed: dependency cycle detected when creating part: {0}")]
    DependencyCycle(TypeRef),
    #[error("Expected {cardinality} export(s) of '{contract}', but found {actual}")]
    CardinalityMismatch {
        contract: CompositionContract,
        cardinality: ImportCardinality,
        actual: usize,
    },
    #[error("Tried to downcast export to incompatible type: {0}")]
    IncompatibleExport(&'static str),
    #[error("Imported value has an unexpected shape, expected: {0}")]
    UnexpectedImportShape(&'static str),
    #[error("Error constructing part '{part}': {error}")]
    ConstructionFailed { part: TypeRef, error: ErrorPtr },
    #[error("Error accessing member '{member}': {error}")]
    MemberAccessFailed { member: String, error: ErrorPtr },
    #[error("Member cannot be read: {0}")]
    MemberNotReadable(String),
    #[error("Member cannot be written: {0}")]
    MemberNotWritable(String),
    #[error("Exporting member returned no value: {0}")]
    EmptyMemberExport(String),
    #[error("Collection for member '{0}' is neither pre-initialized nor constructible")]
    CollectionNotConstructible(String),
    #[error("Sharing scope has been disposed")]
    ScopeDisposed,
    #[error(transparent)]
    MetadataView(#[from] MetadataViewError),
}

impl From<ExportProviderError> for ErrorPtr {
    fn from(error: ExportProviderError) -> Self {
        Arc::new(error) as ErrorPtr
    }
}
