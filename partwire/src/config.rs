//! Framework configuration is based on importing an [ApplicationConfigProvider], which can later
//! be used to retrieve [ApplicationConfig]. [Application](crate::application::Application) uses
//! this config to configure itself, but it can also be imported by any other part.
//!
//! By default, the config is created with opinionated default values, which can then be overwritten
//! by environment variables prefixed with `PARTWIRE_` or `partwire.json` file. Declaring another
//! part exporting [application_config_provider_contract] replaces the default provider.

use config::{Config, ConfigError, Environment, File};
use partwire_composition::catalog::discovery::{PartDiscovery, PartRegistration};
use partwire_composition::catalog::ComposableCatalog;
use partwire_composition::contract::{CompositionContract, TypeRef};
use partwire_composition::error::PartDiscoveryError;
use partwire_composition::export_definition::ExportDefinition;
use partwire_composition::import_definition::ImportDefinition;
use partwire_composition::instance::{exported_value, ErrorPtr, InstancePtr};
use partwire_composition::part_definition::{ComposablePartDefinition, PartDefinitionBuilder};
use serde::Deserialize;
use std::any::Any;
use std::sync::Arc;
use tracing::debug;

const CONFIG_ENV_PREFIX: &str = "PARTWIRE";

/// Name of the default config file.
pub const CONFIG_FILE: &str = "partwire.json";

/// Type name of the [ApplicationConfigProvider] contract.
pub const APPLICATION_CONFIG_PROVIDER_TYPE_NAME: &str = "ApplicationConfigProvider";

pub type ApplicationConfigProviderPtr = dyn ApplicationConfigProvider + Send + Sync;

/// Contract under which config providers are exported.
pub fn application_config_provider_contract() -> CompositionContract {
    CompositionContract::of(TypeRef::named(APPLICATION_CONFIG_PROVIDER_TYPE_NAME))
}

/// Framework configuration which can be provided by an [ApplicationConfigProvider].
#[non_exhaustive]
#[derive(Clone, Debug)]
pub struct ApplicationConfig {
    /// Should a default tracing logger be installed in the scope of the application.
    pub install_tracing_logger: bool,
    /// Should bootstrapping fail, when composition reports errors.
    pub fail_on_composition_errors: bool,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            install_tracing_logger: true,
            fail_on_composition_errors: true,
        }
    }
}

impl From<OptionalApplicationConfig> for ApplicationConfig {
    fn from(value: OptionalApplicationConfig) -> Self {
        let default = Self::default();
        Self {
            install_tracing_logger: value
                .install_tracing_logger
                .unwrap_or(default.install_tracing_logger),
            fail_on_composition_errors: value
                .fail_on_composition_errors
                .unwrap_or(default.fail_on_composition_errors),
        }
    }
}

impl ApplicationConfig {
    fn init_from_environment() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix(CONFIG_ENV_PREFIX))
            .build()
            .and_then(|config| config.try_deserialize::<OptionalApplicationConfig>())
            .map(|config| config.into())
    }
}

/// Provider for [ApplicationConfig]. The only exported provider will be used to retrieve
/// application configuration.
pub trait ApplicationConfigProvider {
    fn config(&self) -> Result<&ApplicationConfig, ErrorPtr>;
}

/// Helper for declaring config provider parts.
pub trait ApplicationConfigProviderExport {
    /// Exports the part instance, which needs to be of type `T`, as an
    /// [ApplicationConfigProvider].
    fn export_application_config_provider<T: ApplicationConfigProvider + Any + Send + Sync>(
        self,
    ) -> Self;
}

impl ApplicationConfigProviderExport for PartDefinitionBuilder {
    fn export_application_config_provider<T: ApplicationConfigProvider + Any + Send + Sync>(
        self,
    ) -> Self {
        self.export_typed(
            ExportDefinition::new(application_config_provider_contract()),
            TypeRef::named(APPLICATION_CONFIG_PROVIDER_TYPE_NAME),
            |provider: InstancePtr<T>| provider as InstancePtr<ApplicationConfigProviderPtr>,
        )
    }
}

struct DefaultApplicationConfigProvider {
    // cached init result
    config: Result<ApplicationConfig, ErrorPtr>,
}

impl DefaultApplicationConfigProvider {
    fn new() -> Self {
        Self {
            config: ApplicationConfig::init_from_environment()
                .map_err(|error| Arc::new(error) as ErrorPtr),
        }
    }
}

impl ApplicationConfigProvider for DefaultApplicationConfigProvider {
    fn config(&self) -> Result<&ApplicationConfig, ErrorPtr> {
        match &self.config {
            Ok(config) => Ok(config),
            Err(error) => Err(error.clone()),
        }
    }
}

fn default_config_provider_part() -> Result<ComposablePartDefinition, Vec<PartDiscoveryError>> {
    PartDefinitionBuilder::new(TypeRef::named("DefaultApplicationConfigProvider"))
        .shared()
        .export_application_config_provider::<DefaultApplicationConfigProvider>()
        .importing_constructor(vec![], |_| {
            Ok(exported_value(DefaultApplicationConfigProvider::new()))
        })
        .build()
}

/// Adds the default config provider, unless the catalog already exports one.
pub fn with_default_config_provider(catalog: ComposableCatalog) -> ComposableCatalog {
    let import = ImportDefinition::zero_or_more(application_config_provider_contract());
    if !catalog.get_exports(&import).is_empty() {
        return catalog;
    }

    debug!("Adding default application config provider.");

    let registrations: Vec<PartRegistration> = vec![default_config_provider_part];
    catalog.with_discovered_parts(registrations.create_parts())
}

#[derive(Deserialize)]
struct OptionalApplicationConfig {
    install_tracing_logger: Option<bool>,
    fail_on_composition_errors: Option<bool>,
}
