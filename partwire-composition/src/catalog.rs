//! Catalogs are immutable collections of [ComposablePartDefinition]s, indexed by export contracts.
//! Adding parts produces a new catalog. Exports for a given contract are ordered by part
//! insertion order, which is the order of values handed to ZeroOrMore imports.

pub mod discovery;

use crate::catalog::discovery::DiscoveredParts;
use crate::contract::{CompositionContract, TypeRef};
use crate::error::PartDiscoveryError;
use crate::export_definition::ExportDefinitionBinding;
use crate::import_definition::ImportDefinition;
use crate::part_definition::ComposablePartDefinition;
use fxhash::FxHashMap;
use std::sync::Arc;
use tracing::trace;

pub type ExportIndex = FxHashMap<CompositionContract, Vec<ExportDefinitionBinding>>;

#[derive(Clone, Debug, Default)]
pub struct ComposableCatalog {
    parts: Vec<Arc<ComposablePartDefinition>>,
    exports_by_contract: ExportIndex,
    discovery_errors: Vec<PartDiscoveryError>,
}

impl ComposableCatalog {
    pub fn create<I, P>(parts: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Arc<ComposablePartDefinition>>,
    {
        Self::default().with_parts(parts)
    }

    /// Adds a part. Parts without exports and parts already present (by type) are skipped.
    pub fn with_part(mut self, part: impl Into<Arc<ComposablePartDefinition>>) -> Self {
        self.add_part(part.into());
        self
    }

    pub fn with_parts<I, P>(mut self, parts: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Arc<ComposablePartDefinition>>,
    {
        for part in parts {
            self.add_part(part.into());
        }

        self
    }

    /// Adds discovered parts along with their discovery errors.
    pub fn with_discovered_parts(mut self, discovered: DiscoveredParts) -> Self {
        self.discovery_errors.extend(discovered.discovery_errors);
        self.with_parts(discovered.parts)
    }

    /// Merges another catalog into this one.
    pub fn with_catalog(mut self, other: &ComposableCatalog) -> Self {
        self.discovery_errors
            .extend(other.discovery_errors.iter().cloned());
        self.with_parts(other.parts.iter().cloned())
    }

    /// Returns exports satisfying given import, in insertion order.
    pub fn get_exports(&self, import: &ImportDefinition) -> Vec<ExportDefinitionBinding> {
        self.exports_by_contract
            .get(&import.contract().matching_contract())
            .map(|exports| {
                exports
                    .iter()
                    .filter(|export| import.is_satisfied_by(export))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    #[inline]
    pub fn parts(&self) -> &[Arc<ComposablePartDefinition>] {
        &self.parts
    }

    /// Index of exports by contract. Constructed generic contracts are indexed by their generic
    /// definitions.
    #[inline]
    pub fn exports_by_contract(&self) -> &ExportIndex {
        &self.exports_by_contract
    }

    #[inline]
    pub fn discovery_errors(&self) -> &[PartDiscoveryError] {
        &self.discovery_errors
    }

    pub fn contains_part(&self, type_ref: &TypeRef) -> bool {
        self.parts.iter().any(|part| part.type_ref() == type_ref)
    }

    fn add_part(&mut self, part: Arc<ComposablePartDefinition>) {
        if part.exports().is_empty() {
            trace!(part = %part.type_ref(), "Skipping part without exports.");
            return;
        }

        if self.contains_part(part.type_ref()) {
            trace!(part = %part.type_ref(), "Skipping duplicate part.");
            return;
        }

        for index in 0..part.exports().len() {
            let contract = part.exports()[index]
                .definition()
                .contract()
                .matching_contract();

            self.exports_by_contract
                .entry(contract)
                .or_default()
                .extend(ExportDefinitionBinding::new(part.clone(), index));
        }

        self.parts.push(part);
    }
}

impl PartialEq for ComposableCatalog {
    fn eq(&self, other: &Self) -> bool {
        self.exports_by_contract == other.exports_by_contract
    }
}
