//! Discovery turns part declarations into [ComposablePartDefinition]s. How declarations are read
//! is up to a given [PartDiscovery] - the catalog only consumes the results.
//!
//! [StaticPartDiscovery] collects registration functions submitted at link time, so parts can be
//! declared next to their types:
//!
//! ```ignore
//! fn logger_part() -> Result<ComposablePartDefinition, Vec<PartDiscoveryError>> {
//!     PartDefinitionBuilder::new(TypeRef::named("Logger"))
//!         // ...
//!         .build()
//! }
//!
//! partwire_composition::register_part!(logger_part);
//! ```

use crate::error::PartDiscoveryError;
use crate::part_definition::ComposablePartDefinition;
#[cfg(test)]
use mockall::automock;
use tracing::debug;

/// Function creating a single part definition.
pub type PartRegistration = fn() -> Result<ComposablePartDefinition, Vec<PartDiscoveryError>>;

/// Results of a discovery pass. Errors don't stop discovery, so all problems can be reported at
/// once.
#[derive(Clone, Debug, Default)]
pub struct DiscoveredParts {
    pub parts: Vec<ComposablePartDefinition>,
    pub discovery_errors: Vec<PartDiscoveryError>,
}

impl DiscoveredParts {
    /// Appends results of another discovery pass.
    pub fn merge(mut self, other: DiscoveredParts) -> Self {
        self.parts.extend(other.parts);
        self.discovery_errors.extend(other.discovery_errors);
        self
    }

    fn from_registrations<'a>(registrations: impl Iterator<Item = &'a PartRegistration>) -> Self {
        registrations.fold(Self::default(), |mut discovered, register| {
            match register() {
                Ok(part) => discovered.parts.push(part),
                Err(errors) => discovered.discovery_errors.extend(errors),
            }

            discovered
        })
    }
}

/// Source of part definitions.
#[cfg_attr(test, automock)]
pub trait PartDiscovery {
    fn create_parts(&self) -> DiscoveredParts;
}

/// Discovers parts registered with [register_part](crate::register_part).
#[derive(Clone, Copy, Debug, Default)]
pub struct StaticPartDiscovery;

impl PartDiscovery for StaticPartDiscovery {
    fn create_parts(&self) -> DiscoveredParts {
        let discovered = DiscoveredParts::from_registrations(
            inventory::iter::<internal::PartRegisterer>
                .into_iter()
                .map(|registerer| &registerer.register),
        );

        debug!(
            parts = discovered.parts.len(),
            errors = discovered.discovery_errors.len(),
            "Discovered statically registered parts."
        );

        discovered
    }
}

impl PartDiscovery for Vec<PartRegistration> {
    fn create_parts(&self) -> DiscoveredParts {
        DiscoveredParts::from_registrations(self.iter())
    }
}

impl PartDiscovery for [PartRegistration] {
    fn create_parts(&self) -> DiscoveredParts {
        DiscoveredParts::from_registrations(self.iter())
    }
}

impl<A: PartDiscovery, B: PartDiscovery> PartDiscovery for (A, B) {
    fn create_parts(&self) -> DiscoveredParts {
        self.0.create_parts().merge(self.1.create_parts())
    }
}

/// Registers a function returning a part definition for [StaticPartDiscovery].
#[macro_export]
macro_rules! register_part {
    ($register:expr) => {
        $crate::catalog::discovery::internal::submit! {
            $crate::catalog::discovery::internal::PartRegisterer { register: $register }
        }
    };
}

#[doc(hidden)]
pub mod internal {
    use crate::catalog::discovery::PartRegistration;
    use inventory::collect;
    pub use inventory::submit;

    pub struct PartRegisterer {
        pub register: PartRegistration,
    }

    collect!(PartRegisterer);
}
