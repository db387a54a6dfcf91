//! Runners executing actual application logic.

#[cfg(test)]
use mockall::automock;
use partwire_composition::contract::{CompositionContract, TypeRef};
use partwire_composition::export_definition::ExportDefinition;
pub use partwire_composition::instance::ErrorPtr;
use partwire_composition::instance::InstancePtr;
use partwire_composition::part_definition::PartDefinitionBuilder;
use std::any::Any;

/// Type name of the [ApplicationRunner] contract.
pub const APPLICATION_RUNNER_TYPE_NAME: &str = "ApplicationRunner";

pub type ApplicationRunnerPtr = dyn ApplicationRunner + Send + Sync;

/// Contract under which runners are exported.
pub fn application_runner_contract() -> CompositionContract {
    CompositionContract::of(TypeRef::named(APPLICATION_RUNNER_TYPE_NAME))
}

/// Runs application logic. Runners are run by the [Application](crate::application::Application)
/// and are discovered as exports of the [application_runner_contract].
#[cfg_attr(test, automock)]
pub trait ApplicationRunner {
    /// Runs any application code.
    fn run(&self) -> Result<(), ErrorPtr>;

    /// Returns the priority for this runner. Higher priorities get run first. Default 0.
    fn priority(&self) -> i8 {
        0
    }
}

/// Helper for declaring runner parts.
pub trait ApplicationRunnerExport {
    /// Exports the part instance, which needs to be of type `T`, as an [ApplicationRunner].
    fn export_application_runner<T: ApplicationRunner + Any + Send + Sync>(self) -> Self;
}

impl ApplicationRunnerExport for PartDefinitionBuilder {
    fn export_application_runner<T: ApplicationRunner + Any + Send + Sync>(self) -> Self {
        self.export_typed(
            ExportDefinition::new(application_runner_contract()),
            TypeRef::named(APPLICATION_RUNNER_TYPE_NAME),
            |runner: InstancePtr<T>| runner as InstancePtr<ApplicationRunnerPtr>,
        )
    }
}
