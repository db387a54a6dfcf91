//! Exports describe capabilities offered by parts. An export is either declared on the part type
//! itself (the value is the part instance, optionally cast to another representation) or on one of
//! its members.

use crate::contract::{CompositionContract, TypeRef};
use crate::error::ExportProviderError;
use crate::instance::{CastFunction, ExportedValue, PartInstance};
use crate::member::MemberAccessor;
use crate::metadata::{Metadata, MetadataValue};
use crate::part_definition::ComposablePartDefinition;
use derivative::Derivative;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Contract and metadata of a single export.
#[derive(Clone, Debug, PartialEq)]
pub struct ExportDefinition {
    contract: CompositionContract,
    metadata: Metadata,
}

impl ExportDefinition {
    pub fn new(contract: CompositionContract) -> Self {
        Self {
            contract,
            metadata: Default::default(),
        }
    }

    pub fn with_metadata(mut self, name: &str, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(name.to_string(), value.into());
        self
    }

    #[inline]
    pub fn contract(&self) -> &CompositionContract {
        &self.contract
    }

    #[inline]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}

impl Display for ExportDefinition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.contract)
    }
}

/// Where the exported value comes from.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub enum ExportSite {
    /// The part instance itself, optionally converted by a cast function.
    Type {
        #[derivative(Debug = "ignore")]
        cast: Option<CastFunction>,
    },
    /// A member of the part instance.
    Member(MemberAccessor),
}

/// An [ExportDefinition] bound to its site within a part, along with type information used for
/// assignability checks.
#[derive(Clone, Debug)]
pub struct PartExport {
    definition: ExportDefinition,
    site: ExportSite,
    value_type: TypeRef,
    value_implements: Vec<TypeRef>,
}

impl PartExport {
    pub fn new(definition: ExportDefinition, site: ExportSite, value_type: TypeRef) -> Self {
        Self {
            definition,
            site,
            value_type,
            value_implements: vec![],
        }
    }

    pub fn with_value_implements(mut self, types: Vec<TypeRef>) -> Self {
        self.value_implements = types;
        self
    }

    pub(crate) fn set_value_implements(&mut self, types: Vec<TypeRef>) {
        self.value_implements = types;
    }

    #[inline]
    pub fn definition(&self) -> &ExportDefinition {
        &self.definition
    }

    #[inline]
    pub fn site(&self) -> &ExportSite {
        &self.site
    }

    /// Type of the exported value.
    #[inline]
    pub fn value_type(&self) -> &TypeRef {
        &self.value_type
    }

    /// Additional types the exported value is assignable to.
    #[inline]
    pub fn value_implements(&self) -> &[TypeRef] {
        &self.value_implements
    }

    /// Checks if the exported value can be handed over to an import site expecting `target`.
    /// Types depending on generic parameters are compared by their generic definitions, since
    /// they get closed only at instantiation time.
    pub fn is_assignable_to(&self, target: &TypeRef) -> bool {
        if target.is_object() {
            return true;
        }

        let target_definition = target.generic_type_definition();
        let target_is_open =
            target.contains_generic_parameters() || target.is_generic_type_definition();

        std::iter::once(&self.value_type)
            .chain(self.value_implements.iter())
            .any(|candidate| {
                if candidate == target {
                    return true;
                }

                (target_is_open
                    || candidate.contains_generic_parameters()
                    || candidate.is_generic_type_definition())
                    && candidate.generic_type_definition() == target_definition
            })
    }

    /// Extracts the exported value from a part instance.
    pub fn value(&self, instance: &PartInstance) -> Result<ExportedValue, ExportProviderError> {
        match &self.site {
            ExportSite::Type { cast: None } => Ok(instance.clone()),
            ExportSite::Type { cast: Some(cast) } => {
                cast(instance.clone()).map_err(|error| ExportProviderError::MemberAccessFailed {
                    member: format!("cast to {}", self.value_type),
                    error,
                })
            }
            ExportSite::Member(member) => member
                .get_value(instance)?
                .ok_or_else(|| ExportProviderError::EmptyMemberExport(member.to_string())),
        }
    }
}

/// Reference to a single export of a part.
#[derive(Clone, Debug)]
pub struct ExportDefinitionBinding {
    part: Arc<ComposablePartDefinition>,
    index: usize,
}

impl ExportDefinitionBinding {
    /// Creates a new binding. Returns `None` if there's no export at given index.
    pub fn new(part: Arc<ComposablePartDefinition>, index: usize) -> Option<Self> {
        if index < part.exports().len() {
            Some(Self { part, index })
        } else {
            None
        }
    }

    #[inline]
    pub fn part(&self) -> &Arc<ComposablePartDefinition> {
        &self.part
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn export(&self) -> &PartExport {
        &self.part.exports()[self.index]
    }

    #[inline]
    pub fn definition(&self) -> &ExportDefinition {
        self.export().definition()
    }
}

impl PartialEq for ExportDefinitionBinding {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
            && self.part.type_ref() == other.part.type_ref()
            && self.definition() == other.definition()
    }
}

impl Display for ExportDefinitionBinding {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} from {}", self.definition(), self.part.type_ref())
    }
}
