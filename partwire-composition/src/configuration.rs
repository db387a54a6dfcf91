//! Composition of a catalog into a validated graph. [CompositionConfiguration::create] matches
//! every import with satisfying exports and records all problems as [CompositionDiagnostic]s,
//! instead of failing on the first one. An invalid configuration is still fully constructed, so
//! callers can inspect it and decide whether to proceed.

mod validation;

use crate::catalog::ComposableCatalog;
use crate::contract::TypeRef;
use crate::error::{CompositionDiagnostic, InvalidCompositionError};
use crate::export_definition::ExportDefinitionBinding;
use crate::export_provider::{export_provider_contract, ExportProviderFactory};
use crate::import_definition::ImportDefinitionBinding;
use crate::part_definition::ComposablePartDefinition;
use crate::runtime::RuntimeComposition;
use itertools::Itertools;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// An import along with exports satisfying it.
#[derive(Clone, Debug)]
pub struct SatisfiedImport {
    import: ImportDefinitionBinding,
    exports: Vec<ExportDefinitionBinding>,
}

impl SatisfiedImport {
    #[inline]
    pub fn import(&self) -> &ImportDefinitionBinding {
        &self.import
    }

    /// Satisfying exports, in catalog order.
    #[inline]
    pub fn exports(&self) -> &[ExportDefinitionBinding] {
        &self.exports
    }
}

/// A part with all its imports matched.
#[derive(Clone, Debug)]
pub struct ComposedPart {
    definition: Arc<ComposablePartDefinition>,
    satisfied_imports: Vec<SatisfiedImport>,
    required_sharing_boundaries: BTreeSet<String>,
    diagnostics: Vec<CompositionDiagnostic>,
}

impl ComposedPart {
    fn new(definition: Arc<ComposablePartDefinition>, catalog: &ComposableCatalog) -> Self {
        let satisfied_imports = definition
            .imports()
            .map(|import| SatisfiedImport {
                exports: catalog.get_exports(import.definition()),
                import: import.clone(),
            })
            .collect_vec();

        let diagnostics = satisfied_imports
            .iter()
            .flat_map(|satisfied| validation::check_import(definition.type_ref(), satisfied))
            .collect();

        let required_sharing_boundaries = definition
            .sharing_boundary()
            .filter(|_| definition.is_shared())
            .map(|boundary| boundary.to_string())
            .into_iter()
            .collect();

        Self {
            definition,
            satisfied_imports,
            required_sharing_boundaries,
            diagnostics,
        }
    }

    #[inline]
    pub fn definition(&self) -> &Arc<ComposablePartDefinition> {
        &self.definition
    }

    /// One entry per import - constructor parameters first, then importing members.
    #[inline]
    pub fn satisfied_imports(&self) -> &[SatisfiedImport] {
        &self.satisfied_imports
    }

    /// Sharing boundaries which need to be available when instantiating this part.
    #[inline]
    pub fn required_sharing_boundaries(&self) -> &BTreeSet<String> {
        &self.required_sharing_boundaries
    }

    #[inline]
    pub fn diagnostics(&self) -> &[CompositionDiagnostic] {
        &self.diagnostics
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Result of composing a catalog.
#[derive(Clone, Debug)]
pub struct CompositionConfiguration {
    catalog: ComposableCatalog,
    parts: Vec<ComposedPart>,
    composition_errors: Vec<CompositionDiagnostic>,
}

impl CompositionConfiguration {
    /// Composes all parts in given catalog. The export provider itself is made available for
    /// import, unless the catalog already exports its contract.
    pub fn create(catalog: ComposableCatalog) -> Self {
        let catalog = catalog.with_part(ComposablePartDefinition::export_provider(
            export_provider_contract(),
        ));

        let mut parts = catalog
            .parts()
            .iter()
            .map(|part| ComposedPart::new(part.clone(), &catalog))
            .collect_vec();

        validation::propagate_sharing_boundaries(&mut parts);

        for (index, diagnostic) in validation::find_cycles(&parts) {
            parts[index].diagnostics.push(diagnostic);
        }

        let composition_errors = parts
            .iter()
            .flat_map(|part| part.diagnostics.iter().cloned())
            .collect_vec();

        debug!(
            parts = parts.len(),
            errors = composition_errors.len(),
            "Composed catalog."
        );

        for error in &composition_errors {
            warn!("{error}");
        }

        Self {
            catalog,
            parts,
            composition_errors,
        }
    }

    #[inline]
    pub fn catalog(&self) -> &ComposableCatalog {
        &self.catalog
    }

    #[inline]
    pub fn parts(&self) -> &[ComposedPart] {
        &self.parts
    }

    pub fn part(&self, type_ref: &TypeRef) -> Option<&ComposedPart> {
        self.parts
            .iter()
            .find(|part| part.definition.type_ref() == type_ref)
    }

    /// All diagnostics of all parts.
    #[inline]
    pub fn composition_errors(&self) -> &[CompositionDiagnostic] {
        &self.composition_errors
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.composition_errors.is_empty()
    }

    /// Returns self if valid, or all diagnostics as an error.
    pub fn throw_on_errors(&self) -> Result<&Self, InvalidCompositionError> {
        if self.is_valid() {
            Ok(self)
        } else {
            Err(InvalidCompositionError(self.composition_errors.clone()))
        }
    }

    /// Creates a factory for export providers. Invalid configurations are accepted on a best
    /// effort basis - parts with problems fail when instantiated.
    pub fn create_export_provider_factory(&self) -> ExportProviderFactory {
        ExportProviderFactory::new(Arc::new(RuntimeComposition::create(self)))
    }
}
