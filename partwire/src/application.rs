//! Core application framework functionality.

use crate::config::{
    application_config_provider_contract, with_default_config_provider,
    ApplicationConfigProviderPtr,
};
use crate::runner::{application_runner_contract, ApplicationRunnerPtr};
use derive_more::Constructor;
use itertools::Itertools;
use partwire_composition::catalog::discovery::{PartDiscovery, StaticPartDiscovery};
use partwire_composition::catalog::ComposableCatalog;
use partwire_composition::configuration::CompositionConfiguration;
use partwire_composition::error::{
    ExportProviderError, InvalidCompositionError, PartDiscoveryError,
};
use partwire_composition::export_provider::{ExportProvider, ExportSource, TypedExportSource};
use partwire_composition::instance::ErrorPtr;
use std::cmp::Reverse;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Error, Debug)]
pub enum ApplicationError {
    #[error("Error retrieving runners: {0}")]
    RunnerInjectionError(ExportProviderError),
    #[error("Runner error: {0}")]
    RunnerError(ErrorPtr),
    #[error("Error retrieving application config provider: {0}")]
    ConfigInjectionError(ExportProviderError),
    #[error("Error reading application config: {0}")]
    ConfigError(ErrorPtr),
    #[error("Invalid part declarations: {}", .0.iter().join("; "))]
    PartDiscovery(Vec<PartDiscoveryError>),
    #[error(transparent)]
    InvalidComposition(#[from] InvalidCompositionError),
}

/// Main entrypoint for the application. Bootstraps the composition and runs
/// [ApplicationRunners](crate::runner::ApplicationRunner).
#[derive(Constructor)]
pub struct Application<S: ExportSource> {
    export_source: S,
}

impl<S: ExportSource> Application<S> {
    /// Runs all exported runners, in descending priority. Runners with equal priority run in
    /// catalog order.
    pub fn run(&mut self) -> Result<(), ApplicationError> {
        info!("Searching for application runners...");

        let mut runners = self
            .export_source
            .get_exported_values::<Arc<ApplicationRunnerPtr>>(&application_runner_contract())
            .map_err(ApplicationError::RunnerInjectionError)?;

        runners.sort_by_key(|runner| Reverse(runner.priority()));

        info!("Running {} application runner(s)...", runners.len());

        for runner in &runners {
            runner.run().map_err(ApplicationError::RunnerError)?;
        }

        Ok(())
    }

    #[inline]
    pub fn export_source(&self) -> &S {
        &self.export_source
    }
}

impl Application<ExportProvider> {
    /// Creates an application from parts found by given discovery.
    pub fn bootstrap<D: PartDiscovery + ?Sized>(discovery: &D) -> Result<Self, ApplicationError> {
        let catalog = with_default_config_provider(
            ComposableCatalog::default().with_discovered_parts(discovery.create_parts()),
        );

        let configuration = CompositionConfiguration::create(catalog);
        let export_provider = configuration
            .create_export_provider_factory()
            .create_export_provider();

        let config_provider = export_provider
            .get_exported_value::<Arc<ApplicationConfigProviderPtr>>(
                &application_config_provider_contract(),
            )
            .map_err(ApplicationError::ConfigInjectionError)?;
        let config = config_provider
            .config()
            .map_err(ApplicationError::ConfigError)?;

        if config.install_tracing_logger {
            install_tracing_logger();
        }

        info!("Bootstrapping application...");

        let discovery_errors = configuration.catalog().discovery_errors();
        for error in discovery_errors {
            warn!("{error}");
        }

        if !configuration.is_valid() {
            // composing happened before the logger got installed
            for error in configuration.composition_errors() {
                warn!("{error}");
            }

            warn!(
                errors = configuration.composition_errors().len(),
                "Composition is invalid."
            );
        }

        if config.fail_on_composition_errors {
            if !discovery_errors.is_empty() {
                return Err(ApplicationError::PartDiscovery(discovery_errors.to_vec()));
            }

            configuration.throw_on_errors()?;
        }

        debug!(
            parts = configuration.parts().len(),
            "Application composition is ready."
        );

        Ok(Self::new(export_provider))
    }

    /// Creates an application from parts registered with
    /// [register_part](partwire_composition::register_part).
    pub fn bootstrap_registered() -> Result<Self, ApplicationError> {
        Self::bootstrap(&StaticPartDiscovery)
    }

    /// Disposes all shared instances.
    pub fn dispose(&self) {
        info!("Disposing application...");
        self.export_source.dispose();
    }
}

fn install_tracing_logger() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // another subscriber might already be installed by the host
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
