use partwire_composition::catalog::discovery::{PartDiscovery, StaticPartDiscovery};
use partwire_composition::catalog::ComposableCatalog;
use partwire_composition::configuration::CompositionConfiguration;
use partwire_composition::contract::{CompositionContract, TypeRef};
use partwire_composition::error::{CompositionDiagnostic, ExportProviderError, PartDiscoveryError};
use partwire_composition::export::Lazy;
use partwire_composition::export_definition::ExportDefinition;
use partwire_composition::export_provider::{ExportProvider, TypedExportSource};
use partwire_composition::import_definition::{ImportDefinition, ImportDefinitionBinding};
use partwire_composition::instance::{exported_value, InstancePtr};
use partwire_composition::member::MemberAccessor;
use partwire_composition::part_definition::{ComposablePartDefinition, PartDefinitionBuilder};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

fn contract(name: &str) -> CompositionContract {
    CompositionContract::of(TypeRef::named(name))
}

fn import(name: &str) -> ImportDefinitionBinding {
    ImportDefinitionBinding::new(
        ImportDefinition::exactly_one(contract(name)),
        TypeRef::named(name),
    )
}

fn provider(parts: Vec<ComposablePartDefinition>) -> ExportProvider {
    let configuration = CompositionConfiguration::create(ComposableCatalog::create(parts));
    assert!(configuration.is_valid(), "{:?}", configuration.composition_errors());

    configuration
        .create_export_provider_factory()
        .create_export_provider()
}

trait Log {
    fn write(&self, message: &str) -> String;
}

type LogPtr = dyn Log + Send + Sync;

static LOGGERS_CREATED: AtomicUsize = AtomicUsize::new(0);

struct ConsoleLog;

impl Log for ConsoleLog {
    fn write(&self, message: &str) -> String {
        format!("[console] {message}")
    }
}

struct Service {
    log: InstancePtr<Arc<LogPtr>>,
}

fn console_log_part() -> ComposablePartDefinition {
    PartDefinitionBuilder::new(TypeRef::named("ConsoleLog"))
        .shared()
        .export_typed(
            ExportDefinition::new(contract("Log")),
            TypeRef::named("Log"),
            |log: InstancePtr<ConsoleLog>| log as Arc<LogPtr>,
        )
        .importing_constructor(vec![], |_| {
            LOGGERS_CREATED.fetch_add(1, Ordering::SeqCst);
            Ok(exported_value(ConsoleLog))
        })
        .build()
        .unwrap()
}

fn service_part() -> ComposablePartDefinition {
    PartDefinitionBuilder::new(TypeRef::named("Service"))
        .non_shared()
        .export(ExportDefinition::new(contract("Service")))
        .importing_constructor(vec![import("Log")], |mut arguments| {
            Ok(exported_value(Service {
                log: arguments.take(0).into_single::<Arc<LogPtr>>()?,
            }))
        })
        .build()
        .unwrap()
}

#[test]
fn should_share_logger_between_services() {
    let provider = provider(vec![console_log_part(), service_part()]);

    let first = provider
        .get_exported_value::<Service>(&contract("Service"))
        .unwrap();
    let second = provider
        .get_exported_value::<Service>(&contract("Service"))
        .unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(first.log.write("started"), "[console] started");
    assert_eq!(second.log.write("started"), "[console] started");
    assert_eq!(LOGGERS_CREATED.load(Ordering::SeqCst), 1);
}

#[test]
fn should_report_unsatisfied_import() {
    let configuration =
        CompositionConfiguration::create(ComposableCatalog::create([service_part()]));

    assert!(!configuration.is_valid());
    assert!(matches!(
        configuration.composition_errors(),
        [CompositionDiagnostic::CardinalityMismatch { part, actual: 0, .. }]
            if *part == TypeRef::named("Service")
    ));
    assert_eq!(
        configuration.throw_on_errors().unwrap_err().0.len(),
        1
    );
}

struct Left {
    right: OnceLock<InstancePtr<Right>>,
}

struct Right {
    left: OnceLock<InstancePtr<Left>>,
}

fn left_part() -> ComposablePartDefinition {
    PartDefinitionBuilder::new(TypeRef::named("Left"))
        .shared()
        .export(ExportDefinition::new(contract("Left")))
        .importing_constructor(vec![], |_| {
            Ok(exported_value(Left {
                right: OnceLock::new(),
            }))
        })
        .import_member(
            MemberAccessor::property("right").with_typed_setter(|left: &Left, value| {
                let _ = left.right.set(value.into_single::<Right>()?);
                Ok(())
            }),
            import("Right"),
        )
        .build()
        .unwrap()
}

fn right_part() -> ComposablePartDefinition {
    PartDefinitionBuilder::new(TypeRef::named("Right"))
        .shared()
        .export(ExportDefinition::new(contract("Right")))
        .importing_constructor(vec![], |_| {
            Ok(exported_value(Right {
                left: OnceLock::new(),
            }))
        })
        .import_member(
            MemberAccessor::property("left").with_typed_setter(|right: &Right, value| {
                let _ = right.left.set(value.into_single::<Left>()?);
                Ok(())
            }),
            import("Left"),
        )
        .build()
        .unwrap()
}

#[test]
fn should_resolve_member_cycle_of_shared_parts() {
    let provider = provider(vec![left_part(), right_part()]);

    let left = provider
        .get_exported_value::<Left>(&contract("Left"))
        .unwrap();
    let right = provider
        .get_exported_value::<Right>(&contract("Right"))
        .unwrap();

    assert!(Arc::ptr_eq(left.right.get().unwrap(), &right));
    assert!(Arc::ptr_eq(right.left.get().unwrap(), &left));
}

static HEAVY_CREATED: AtomicUsize = AtomicUsize::new(0);

struct Heavy;

struct Consumer {
    heavy: Lazy<Heavy>,
}

#[test]
fn should_create_lazy_import_on_first_access() {
    let heavy = PartDefinitionBuilder::new(TypeRef::named("Heavy"))
        .shared()
        .export(ExportDefinition::new(contract("Heavy")))
        .importing_constructor(vec![], |_| {
            HEAVY_CREATED.fetch_add(1, Ordering::SeqCst);
            Ok(exported_value(Heavy))
        })
        .build()
        .unwrap();

    let consumer = PartDefinitionBuilder::new(TypeRef::named("Consumer"))
        .export(ExportDefinition::new(contract("Consumer")))
        .importing_constructor(vec![import("Heavy").lazy()], |mut arguments| {
            Ok(exported_value(Consumer {
                heavy: arguments.take(0).into_lazy::<Heavy>()?,
            }))
        })
        .build()
        .unwrap();

    let provider = provider(vec![heavy, consumer]);
    let consumer = provider
        .get_exported_value::<Consumer>(&contract("Consumer"))
        .unwrap();

    assert_eq!(HEAVY_CREATED.load(Ordering::SeqCst), 0);

    let first = consumer.heavy.value().unwrap();
    let second = consumer.heavy.value().unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(HEAVY_CREATED.load(Ordering::SeqCst), 1);
}

#[test]
fn should_return_many_exports_in_catalog_order() {
    let plugin = |name: &'static str| {
        PartDefinitionBuilder::new(TypeRef::named(name))
            .export(ExportDefinition::new(contract("Plugin")))
            .importing_constructor(vec![], move |_| Ok(exported_value(name)))
            .build()
            .unwrap()
    };

    let provider = provider(vec![plugin("Audit"), plugin("Cache"), plugin("Metrics")]);

    let plugins = provider
        .get_exported_values::<&'static str>(&contract("Plugin"))
        .unwrap()
        .into_iter()
        .map(|plugin| *plugin)
        .collect::<Vec<_>>();

    assert_eq!(plugins, vec!["Audit", "Cache", "Metrics"]);
}

#[test]
fn should_ignore_duplicate_parts() {
    let catalog = ComposableCatalog::create([console_log_part()]);
    let duplicated = catalog.clone().with_part(console_log_part());

    assert_eq!(duplicated.parts().len(), 1);
    assert_eq!(catalog, duplicated);
}

fn registered_part() -> Result<ComposablePartDefinition, Vec<PartDiscoveryError>> {
    PartDefinitionBuilder::new(TypeRef::named("Registered"))
        .export(ExportDefinition::new(contract("Registered")))
        .importing_constructor(vec![], |_| Ok(exported_value(7_u8)))
        .build()
}

partwire_composition::register_part!(registered_part);

#[test]
fn should_discover_registered_parts() {
    let discovered = StaticPartDiscovery.create_parts();
    assert!(discovered
        .parts
        .iter()
        .any(|part| *part.type_ref() == TypeRef::named("Registered")));

    let provider = provider(discovered.parts);
    assert_eq!(
        *provider
            .get_exported_value::<u8>(&contract("Registered"))
            .unwrap(),
        7
    );
}

#[test]
fn should_fail_after_disposal() {
    let provider = provider(vec![console_log_part()]);
    provider.dispose();

    assert!(matches!(
        provider.get_exported_value::<Arc<LogPtr>>(&contract("Log")),
        Err(ExportProviderError::ScopeDisposed)
    ));
}
