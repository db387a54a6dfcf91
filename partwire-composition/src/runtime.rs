//! Flattened form of a [CompositionConfiguration], prepared for repeated instantiation. Parts are
//! addressed by [PartSurrogate]s and every import carries its pre-resolved exports, so creating
//! instances needs no catalog lookups.

use crate::configuration::CompositionConfiguration;
use crate::contract::{CompositionContract, TypeRef};
use crate::export_definition::ExportDefinitionBinding;
use crate::import_definition::{ImportDefinition, ImportDefinitionBinding};
use crate::metadata_view::MetadataViewCache;
use crate::part_definition::ComposablePartDefinition;
use fxhash::FxHashMap;
use itertools::Itertools;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use tracing::debug;

/// Index of a part within a [RuntimeComposition].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct PartSurrogate(u32);

impl PartSurrogate {
    #[inline]
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for PartSurrogate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An export along with the surrogate of its part.
#[derive(Clone, Debug)]
pub struct RuntimeExport {
    surrogate: PartSurrogate,
    binding: ExportDefinitionBinding,
}

impl RuntimeExport {
    #[inline]
    pub fn surrogate(&self) -> PartSurrogate {
        self.surrogate
    }

    #[inline]
    pub fn binding(&self) -> &ExportDefinitionBinding {
        &self.binding
    }

    #[inline]
    pub fn part_definition(&self) -> &Arc<ComposablePartDefinition> {
        self.binding.part()
    }
}

/// An import with its satisfying exports.
#[derive(Clone, Debug)]
pub struct RuntimeImport {
    binding: ImportDefinitionBinding,
    exports: Vec<RuntimeExport>,
}

impl RuntimeImport {
    #[inline]
    pub fn binding(&self) -> &ImportDefinitionBinding {
        &self.binding
    }

    #[inline]
    pub fn exports(&self) -> &[RuntimeExport] {
        &self.exports
    }
}

#[derive(Clone, Debug)]
pub struct RuntimePart {
    surrogate: PartSurrogate,
    definition: Arc<ComposablePartDefinition>,
    imports: Vec<RuntimeImport>,
    constructor_import_count: usize,
    required_sharing_boundaries: Vec<String>,
}

impl RuntimePart {
    #[inline]
    pub fn surrogate(&self) -> PartSurrogate {
        self.surrogate
    }

    #[inline]
    pub fn definition(&self) -> &Arc<ComposablePartDefinition> {
        &self.definition
    }

    #[inline]
    pub fn type_ref(&self) -> &TypeRef {
        self.definition.type_ref()
    }

    #[inline]
    pub fn constructor_imports(&self) -> &[RuntimeImport] {
        &self.imports[..self.constructor_import_count]
    }

    #[inline]
    pub fn member_imports(&self) -> &[RuntimeImport] {
        &self.imports[self.constructor_import_count..]
    }

    #[inline]
    pub fn required_sharing_boundaries(&self) -> &[String] {
        &self.required_sharing_boundaries
    }
}

/// Immutable runtime model shared by export providers created from the same configuration.
#[derive(Debug)]
pub struct RuntimeComposition {
    parts: Vec<RuntimePart>,
    surrogates: FxHashMap<TypeRef, PartSurrogate>,
    exports_by_contract: FxHashMap<CompositionContract, Vec<RuntimeExport>>,
    metadata_views: MetadataViewCache,
}

impl RuntimeComposition {
    pub fn create(configuration: &CompositionConfiguration) -> Self {
        let surrogates: FxHashMap<TypeRef, PartSurrogate> = configuration
            .parts()
            .iter()
            .enumerate()
            .map(|(index, part)| {
                (
                    part.definition().type_ref().clone(),
                    PartSurrogate::new(index as u32),
                )
            })
            .collect();

        let runtime_export = |binding: &ExportDefinitionBinding| {
            surrogates
                .get(binding.part().type_ref())
                .map(|surrogate| RuntimeExport {
                    surrogate: *surrogate,
                    binding: binding.clone(),
                })
        };

        let parts = configuration
            .parts()
            .iter()
            .enumerate()
            .map(|(index, part)| RuntimePart {
                surrogate: PartSurrogate::new(index as u32),
                definition: part.definition().clone(),
                imports: part
                    .satisfied_imports()
                    .iter()
                    .map(|satisfied| RuntimeImport {
                        binding: satisfied.import().clone(),
                        exports: satisfied
                            .exports()
                            .iter()
                            .filter_map(runtime_export)
                            .collect(),
                    })
                    .collect(),
                constructor_import_count: part.definition().constructor_imports().len(),
                required_sharing_boundaries: part
                    .required_sharing_boundaries()
                    .iter()
                    .cloned()
                    .collect(),
            })
            .collect_vec();

        let exports_by_contract = configuration
            .catalog()
            .exports_by_contract()
            .iter()
            .map(|(contract, exports)| {
                (
                    contract.clone(),
                    exports.iter().filter_map(runtime_export).collect(),
                )
            })
            .collect();

        debug!(parts = parts.len(), "Created runtime composition.");

        Self {
            parts,
            surrogates,
            exports_by_contract,
            metadata_views: Default::default(),
        }
    }

    #[inline]
    pub fn parts(&self) -> &[RuntimePart] {
        &self.parts
    }

    #[inline]
    pub fn part(&self, surrogate: PartSurrogate) -> Option<&RuntimePart> {
        self.parts.get(surrogate.index())
    }

    #[inline]
    pub fn surrogate_of(&self, type_ref: &TypeRef) -> Option<PartSurrogate> {
        self.surrogates.get(type_ref).copied()
    }

    /// Returns exports satisfying given import, in catalog order.
    pub fn exports(&self, import: &ImportDefinition) -> Vec<RuntimeExport> {
        self.exports_by_contract
            .get(&import.contract().matching_contract())
            .map(|exports| {
                exports
                    .iter()
                    .filter(|export| import.is_satisfied_by(&export.binding))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    #[inline]
    pub fn metadata_views(&self) -> &MetadataViewCache {
        &self.metadata_views
    }
}

#[cfg(test)]
mod tests {
    use crate::catalog::ComposableCatalog;
    use crate::configuration::CompositionConfiguration;
    use crate::contract::{CompositionContract, TypeRef};
    use crate::export_definition::ExportDefinition;
    use crate::import_definition::{ImportDefinition, ImportDefinitionBinding};
    use crate::instance::exported_value;
    use crate::part_definition::PartDefinitionBuilder;
    use crate::runtime::RuntimeComposition;

    #[test]
    fn should_flatten_configuration() {
        let logger = PartDefinitionBuilder::new(TypeRef::named("Logger"))
            .export(ExportDefinition::new(CompositionContract::of(
                TypeRef::named("Logger"),
            )))
            .importing_constructor(vec![], |_| Ok(exported_value(())))
            .build()
            .unwrap();

        let service = PartDefinitionBuilder::new(TypeRef::named("Service"))
            .export(ExportDefinition::new(CompositionContract::of(
                TypeRef::named("Service"),
            )))
            .importing_constructor(
                vec![ImportDefinitionBinding::new(
                    ImportDefinition::exactly_one(CompositionContract::of(TypeRef::named(
                        "Logger",
                    ))),
                    TypeRef::named("Logger"),
                )],
                |_| Ok(exported_value(())),
            )
            .build()
            .unwrap();

        let configuration =
            CompositionConfiguration::create(ComposableCatalog::create([logger, service]));
        let composition = RuntimeComposition::create(&configuration);

        let logger = composition.surrogate_of(&TypeRef::named("Logger")).unwrap();
        let service = composition
            .part(composition.surrogate_of(&TypeRef::named("Service")).unwrap())
            .unwrap();

        assert_eq!(composition.parts().len(), 3);
        assert_eq!(service.constructor_imports().len(), 1);
        assert!(service.member_imports().is_empty());
        assert_eq!(
            service.constructor_imports()[0].exports()[0].surrogate(),
            logger
        );
        assert_eq!(
            composition
                .exports(&ImportDefinition::zero_or_more(CompositionContract::of(
                    TypeRef::named("Service")
                )))
                .len(),
            1
        );
    }
}
