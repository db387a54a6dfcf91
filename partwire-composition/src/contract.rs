//! Contracts identify what an import asks for and what an export offers. A
//! [CompositionContract] is a pair of an optional name and a [TypeRef].
//!
//! Types are not Rust types - they are language-neutral identities produced by discovery. This
//! makes it possible to express open generic parts, which get closed at instantiation time using
//! type arguments taken from the requesting import:
//!
//! ```
//! use partwire_composition::contract::{CompositionContract, TypeRef};
//!
//! let open = CompositionContract::of(TypeRef::generic_definition("Repository", 1));
//! let closed = CompositionContract::of(TypeRef::generic(
//!     "Repository",
//!     vec![TypeRef::named("User")],
//! ));
//!
//! assert!(closed.matches_for_export(&open));
//! assert_eq!(closed.matching_contract(), open);
//! ```

use itertools::Itertools;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Name of the universal type, to which every exported value is assignable.
pub const OBJECT_TYPE_NAME: &str = "object";

/// Identity of a type known to the composition engine.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeRef {
    /// A plain type, or a constructed generic type when arguments are present. Arguments might
    /// contain generic parameters, when referenced from within a generic part definition.
    Named {
        name: Arc<str>,
        arguments: Vec<TypeRef>,
    },
    /// An open generic type definition with given number of type parameters.
    GenericDefinition { name: Arc<str>, arity: usize },
    /// A generic parameter of the enclosing generic part definition.
    Parameter { index: usize },
}

impl TypeRef {
    pub fn named(name: impl Into<Arc<str>>) -> Self {
        TypeRef::Named {
            name: name.into(),
            arguments: vec![],
        }
    }

    pub fn generic(name: impl Into<Arc<str>>, arguments: Vec<TypeRef>) -> Self {
        TypeRef::Named {
            name: name.into(),
            arguments,
        }
    }

    pub fn generic_definition(name: impl Into<Arc<str>>, arity: usize) -> Self {
        TypeRef::GenericDefinition {
            name: name.into(),
            arity,
        }
    }

    pub fn parameter(index: usize) -> Self {
        TypeRef::Parameter { index }
    }

    pub fn object() -> Self {
        Self::named(OBJECT_TYPE_NAME)
    }

    /// Returns the type name, unless this is a generic parameter.
    pub fn name(&self) -> Option<&str> {
        match self {
            TypeRef::Named { name, .. } | TypeRef::GenericDefinition { name, .. } => Some(&**name),
            TypeRef::Parameter { .. } => None,
        }
    }

    #[inline]
    pub fn generic_arguments(&self) -> &[TypeRef] {
        match self {
            TypeRef::Named { arguments, .. } => arguments,
            _ => &[],
        }
    }

    #[inline]
    pub fn is_object(&self) -> bool {
        matches!(
            self,
            TypeRef::Named { name, arguments }
                if arguments.is_empty() && &**name == OBJECT_TYPE_NAME
        )
    }

    #[inline]
    pub fn is_generic_type_definition(&self) -> bool {
        matches!(self, TypeRef::GenericDefinition { .. })
    }

    #[inline]
    pub fn is_constructed_generic(&self) -> bool {
        matches!(self, TypeRef::Named { arguments, .. } if !arguments.is_empty())
    }

    /// Checks if this type refers to generic parameters of an enclosing definition, therefore
    /// needing [TypeRef::substitute] before being used at runtime.
    pub fn contains_generic_parameters(&self) -> bool {
        match self {
            TypeRef::Named { arguments, .. } => {
                arguments.iter().any(TypeRef::contains_generic_parameters)
            }
            TypeRef::GenericDefinition { .. } => false,
            TypeRef::Parameter { .. } => true,
        }
    }

    /// Collapses a constructed generic type to its open definition. Other types are returned
    /// unchanged.
    pub fn generic_type_definition(&self) -> TypeRef {
        match self {
            TypeRef::Named { name, arguments } if !arguments.is_empty() => {
                TypeRef::GenericDefinition {
                    name: name.clone(),
                    arity: arguments.len(),
                }
            }
            _ => self.clone(),
        }
    }

    /// Closes a generic definition with given arguments. Returns `None` if this is not a generic
    /// definition or the number of arguments doesn't match its arity.
    pub fn make_generic(&self, arguments: &[TypeRef]) -> Option<TypeRef> {
        match self {
            TypeRef::GenericDefinition { name, arity } if *arity == arguments.len() => {
                Some(TypeRef::Named {
                    name: name.clone(),
                    arguments: arguments.to_vec(),
                })
            }
            _ => None,
        }
    }

    /// Replaces generic parameters with given arguments. Parameters without a corresponding
    /// argument are left untouched.
    pub fn substitute(&self, arguments: &[TypeRef]) -> TypeRef {
        match self {
            TypeRef::Named {
                name,
                arguments: own_arguments,
            } if !own_arguments.is_empty() => TypeRef::Named {
                name: name.clone(),
                arguments: own_arguments
                    .iter()
                    .map(|argument| argument.substitute(arguments))
                    .collect(),
            },
            TypeRef::Parameter { index } => arguments
                .get(*index)
                .cloned()
                .unwrap_or_else(|| self.clone()),
            _ => self.clone(),
        }
    }
}

impl Display for TypeRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeRef::Named { name, arguments } if arguments.is_empty() => write!(f, "{name}"),
            TypeRef::Named { name, arguments } => {
                write!(f, "{name}<{}>", arguments.iter().join(", "))
            }
            TypeRef::GenericDefinition { name, arity } => {
                write!(f, "{name}<{}>", ",".repeat(arity.saturating_sub(1)))
            }
            TypeRef::Parameter { index } => write!(f, "T{index}"),
        }
    }
}

/// Identifies a capability - an optional name and a type. Two contracts are equal if both name
/// and type are equal. Empty names are treated the same as missing ones.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompositionContract {
    name: Option<Arc<str>>,
    type_ref: TypeRef,
}

impl CompositionContract {
    pub fn new(name: Option<&str>, type_ref: TypeRef) -> Self {
        Self {
            name: name.filter(|name| !name.is_empty()).map(Arc::from),
            type_ref,
        }
    }

    /// Creates an unnamed contract for given type.
    #[inline]
    pub fn of(type_ref: TypeRef) -> Self {
        Self::new(None, type_ref)
    }

    #[inline]
    pub fn named(name: &str, type_ref: TypeRef) -> Self {
        Self::new(Some(name), type_ref)
    }

    #[inline]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[inline]
    pub fn type_ref(&self) -> &TypeRef {
        &self.type_ref
    }

    /// The form used for catalog lookups - constructed generic types are collapsed to their open
    /// definitions.
    pub fn matching_contract(&self) -> CompositionContract {
        Self {
            name: self.name.clone(),
            type_ref: self.type_ref.generic_type_definition(),
        }
    }

    /// Checks if an export declared with given contract can satisfy this (import) contract. Names
    /// are compared ordinally. A constructed generic contract matches an export declared against
    /// the corresponding open definition; a contract still containing generic parameters matches
    /// only such open exports.
    pub fn matches_for_export(&self, export: &CompositionContract) -> bool {
        if self.name != export.name {
            return false;
        }

        if self.type_ref.contains_generic_parameters() {
            return export.type_ref.is_generic_type_definition()
                && export.type_ref == self.type_ref.generic_type_definition();
        }

        if self.type_ref == export.type_ref {
            return true;
        }

        self.type_ref.is_constructed_generic()
            && export.type_ref.is_generic_type_definition()
            && export.type_ref == self.type_ref.generic_type_definition()
    }

    /// Substitutes generic parameters in the contract type.
    pub fn substitute(&self, arguments: &[TypeRef]) -> CompositionContract {
        if arguments.is_empty() || !self.type_ref.contains_generic_parameters() {
            return self.clone();
        }

        Self {
            name: self.name.clone(),
            type_ref: self.type_ref.substitute(arguments),
        }
    }
}

impl Display for CompositionContract {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} ({})", self.type_ref),
            None => write!(f, "{}", self.type_ref),
        }
    }
}
