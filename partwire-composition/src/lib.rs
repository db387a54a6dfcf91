//! Composition engine for decoupled applications.
//!
//! Parts declare what they export and what they import, by [contracts](contract). A
//! [catalog](catalog::ComposableCatalog) collects discovered
//! [part definitions](part_definition::ComposablePartDefinition), a
//! [configuration](configuration::CompositionConfiguration) matches every import with exports
//! and validates the resulting graph, and an [export provider](export_provider::ExportProvider)
//! creates and wires part instances on demand, sharing them within
//! [sharing scopes](scope::SharingScope).
//!
//! Composition problems never stop the process half-way: discovery and configuration collect
//! all of them, so they can be reported at once, and callers decide whether to proceed.

pub mod catalog;
pub mod configuration;
pub mod contract;
pub mod error;
pub mod export;
pub mod export_definition;
pub mod export_provider;
pub mod import_definition;
pub mod instance;
pub mod member;
pub mod metadata;
pub mod metadata_view;
pub mod part_definition;
pub mod runtime;
pub mod scope;
