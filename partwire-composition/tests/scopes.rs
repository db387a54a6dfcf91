use partwire_composition::catalog::ComposableCatalog;
use partwire_composition::configuration::CompositionConfiguration;
use partwire_composition::contract::{CompositionContract, TypeRef};
use partwire_composition::error::ExportProviderError;
use partwire_composition::export::ExportFactory;
use partwire_composition::export_definition::ExportDefinition;
use partwire_composition::export_provider::{ExportProvider, TypedExportSource};
use partwire_composition::import_definition::{ImportDefinition, ImportDefinitionBinding};
use partwire_composition::instance::{exported_value, Disposable, InstancePtr};
use partwire_composition::part_definition::{ComposablePartDefinition, PartDefinitionBuilder};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

const REQUEST: &str = "request";

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
    CompositionConfiguration::create(ComposableCatalog::create(parts))
        .throw_on_errors()
        .unwrap()
        .create_export_provider_factory()
        .create_export_provider()
}

struct Connection {
    disposed: Arc<AtomicUsize>,
}

impl Disposable for Connection {
    fn dispose(&self) {
        self.disposed.fetch_add(1, Ordering::SeqCst);
    }
}

fn connection_part(disposed: Arc<AtomicUsize>) -> ComposablePartDefinition {
    PartDefinitionBuilder::new(TypeRef::named("Connection"))
        .shared()
        .disposable::<Connection>()
        .export(ExportDefinition::new(contract("Connection")))
        .importing_constructor(vec![], move |_| {
            Ok(exported_value(Connection {
                disposed: disposed.clone(),
            }))
        })
        .build()
        .unwrap()
}

#[test]
fn should_dispose_shared_instances_once() {
    let disposed = Arc::new(AtomicUsize::new(0));
    let provider = provider(vec![connection_part(disposed.clone())]);

    provider
        .get_exported_value::<Connection>(&contract("Connection"))
        .unwrap();

    provider.dispose();
    provider.dispose();

    assert_eq!(disposed.load(Ordering::SeqCst), 1);
    assert!(matches!(
        provider.get_exported_value::<Connection>(&contract("Connection")),
        Err(ExportProviderError::ScopeDisposed)
    ));
}

static CONTEXTS_CREATED: AtomicUsize = AtomicUsize::new(0);

struct RequestContext {
    id: usize,
    disposed: Arc<AtomicUsize>,
}

impl Disposable for RequestContext {
    fn dispose(&self) {
        self.disposed.fetch_add(1, Ordering::SeqCst);
    }
}

struct RequestHandler {
    context: InstancePtr<RequestContext>,
}

struct Server {
    handlers: ExportFactory,
}

fn request_parts(disposed: Arc<AtomicUsize>) -> Vec<ComposablePartDefinition> {
    let context = PartDefinitionBuilder::new(TypeRef::named("RequestContext"))
        .shared()
        .sharing_boundary(REQUEST)
        .disposable::<RequestContext>()
        .export(ExportDefinition::new(contract("RequestContext")))
        .importing_constructor(vec![], move |_| {
            Ok(exported_value(RequestContext {
                id: CONTEXTS_CREATED.fetch_add(1, Ordering::SeqCst),
                disposed: disposed.clone(),
            }))
        })
        .build()
        .unwrap();

    let handler = PartDefinitionBuilder::new(TypeRef::named("RequestHandler"))
        .non_shared()
        .export(ExportDefinition::new(contract("RequestHandler")))
        .importing_constructor(vec![import("RequestContext")], |mut arguments| {
            Ok(exported_value(RequestHandler {
                context: arguments.take(0).into_single::<RequestContext>()?,
            }))
        })
        .build()
        .unwrap();

    let server = PartDefinitionBuilder::new(TypeRef::named("Server"))
        .shared()
        .export(ExportDefinition::new(contract("Server")))
        .importing_constructor(
            vec![ImportDefinitionBinding::new(
                ImportDefinition::exactly_one(contract("RequestHandler"))
                    .with_export_factory_sharing_boundaries([REQUEST]),
                TypeRef::named("RequestHandler"),
            )
            .export_factory()],
            |mut arguments| {
                Ok(exported_value(Server {
                    handlers: arguments.take(0).into_factory()?,
                }))
            },
        )
        .build()
        .unwrap();

    vec![context, handler, server]
}

#[test]
fn should_create_sharing_scope_per_export_factory_invocation() {
    let disposed = Arc::new(AtomicUsize::new(0));
    let provider = provider(request_parts(disposed.clone()));

    assert!(matches!(
        provider.get_exported_value::<RequestHandler>(&contract("RequestHandler")),
        Err(ExportProviderError::MissingSharingBoundary { boundary, .. }) if boundary == REQUEST
    ));

    let server = provider
        .get_exported_value::<Server>(&contract("Server"))
        .unwrap();

    let mut first = server.handlers.create_export().unwrap();
    let mut second = server.handlers.create_export().unwrap();

    let first_handler = first.typed_value::<RequestHandler>().unwrap();
    let second_handler = second.typed_value::<RequestHandler>().unwrap();
    assert_ne!(first_handler.context.id, second_handler.context.id);

    first.dispose();
    first.dispose();
    assert_eq!(disposed.load(Ordering::SeqCst), 1);

    provider.dispose();
    assert_eq!(disposed.load(Ordering::SeqCst), 2);

    second.dispose();
    assert_eq!(disposed.load(Ordering::SeqCst), 2);
}

#[test]
fn should_share_instances_within_explicit_scope() {
    let disposed = Arc::new(AtomicUsize::new(0));
    let provider = provider(request_parts(disposed.clone()));

    let request = provider.create_scope([REQUEST]).unwrap();
    let first = request
        .get_exported_value::<RequestHandler>(&contract("RequestHandler"))
        .unwrap();
    let second = request
        .get_exported_value::<RequestHandler>(&contract("RequestHandler"))
        .unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&first.context, &second.context));

    request.dispose();
    assert_eq!(disposed.load(Ordering::SeqCst), 1);
    assert!(!provider.scope().is_disposed());
}

struct Cache;

#[test]
fn should_create_one_shared_instance_for_concurrent_requests() {
    const THREADS: usize = 8;

    let created = Arc::new(AtomicUsize::new(0));
    let counter = created.clone();
    let cache = PartDefinitionBuilder::new(TypeRef::named("Cache"))
        .shared()
        .export(ExportDefinition::new(contract("Cache")))
        .importing_constructor(vec![], move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(20));
            Ok(exported_value(Cache))
        })
        .build()
        .unwrap();

    let provider = provider(vec![cache]);
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let provider = provider.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                provider
                    .get_exported_value::<Cache>(&contract("Cache"))
                    .unwrap()
            })
        })
        .collect();

    let caches: Vec<InstancePtr<Cache>> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert!(caches.iter().all(|cache| Arc::ptr_eq(cache, &caches[0])));
}

struct Session {
    disposed: Arc<AtomicUsize>,
}

impl Disposable for Session {
    fn dispose(&self) {
        self.disposed.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn should_wait_for_creation_in_progress_before_disposing() {
    let disposed = Arc::new(AtomicUsize::new(0));
    let constructing = Arc::new(Barrier::new(2));
    let dispose_returned = Arc::new(AtomicBool::new(false));
    let disposed_while_constructing = Arc::new(AtomicBool::new(false));

    let session = {
        let disposed = disposed.clone();
        let constructing = constructing.clone();
        let dispose_returned = dispose_returned.clone();
        let disposed_while_constructing = disposed_while_constructing.clone();

        PartDefinitionBuilder::new(TypeRef::named("Session"))
            .non_shared()
            .disposable::<Session>()
            .export(ExportDefinition::new(contract("Session")))
            .importing_constructor(vec![], move |_| {
                constructing.wait();
                thread::sleep(Duration::from_millis(100));
                disposed_while_constructing
                    .store(dispose_returned.load(Ordering::SeqCst), Ordering::SeqCst);

                Ok(exported_value(Session {
                    disposed: disposed.clone(),
                }))
            })
            .build()
            .unwrap()
    };

    let provider = provider(vec![session]);

    let creator = {
        let provider = provider.clone();
        thread::spawn(move || {
            provider
                .get_exported_value::<Session>(&contract("Session"))
                .is_ok()
        })
    };

    constructing.wait();
    provider.dispose();
    dispose_returned.store(true, Ordering::SeqCst);

    assert!(creator.join().unwrap());
    assert!(!disposed_while_constructing.load(Ordering::SeqCst));
    assert_eq!(disposed.load(Ordering::SeqCst), 1);
    assert!(matches!(
        provider.get_exported_value::<Session>(&contract("Session")),
        Err(ExportProviderError::ScopeDisposed)
    ));
}
