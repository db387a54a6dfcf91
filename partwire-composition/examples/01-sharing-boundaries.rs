// note: this example assumes you've analyzed the previous one

use partwire_composition::catalog::ComposableCatalog;
use partwire_composition::configuration::CompositionConfiguration;
use partwire_composition::contract::{CompositionContract, TypeRef};
use partwire_composition::export_definition::ExportDefinition;
use partwire_composition::export_provider::TypedExportSource;
use partwire_composition::instance::{exported_value, Disposable};
use partwire_composition::part_definition::PartDefinitionBuilder;
use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_REQUEST: AtomicUsize = AtomicUsize::new(0);

struct RequestContext {
    id: usize,
}

// disposable parts get notified when their sharing scope goes away
impl Disposable for RequestContext {
    fn dispose(&self) {
        println!("Request {} finished.", self.id);
    }
}

fn main() {
    let contract = CompositionContract::of(TypeRef::named("RequestContext"));

    // shared parts with a sharing boundary live in the nearest scope owning that boundary, so
    // every "request" scope gets its own context
    let context = PartDefinitionBuilder::new(TypeRef::named("RequestContext"))
        .shared()
        .sharing_boundary("request")
        .disposable::<RequestContext>()
        .export(ExportDefinition::new(contract.clone()))
        .importing_constructor(vec![], |_| {
            Ok(exported_value(RequestContext {
                id: NEXT_REQUEST.fetch_add(1, Ordering::SeqCst),
            }))
        })
        .build()
        .expect("invalid context declaration");

    let export_provider = CompositionConfiguration::create(ComposableCatalog::create([context]))
        .create_export_provider_factory()
        .create_export_provider();

    // the root scope doesn't own the "request" boundary, so this fails
    assert!(export_provider
        .get_exported_value::<RequestContext>(&contract)
        .is_err());

    for _ in 0..2 {
        let request = export_provider
            .create_scope(["request"])
            .expect("error creating request scope");

        let first = request
            .get_exported_value::<RequestContext>(&contract)
            .expect("error creating context");
        let second = request
            .get_exported_value::<RequestContext>(&contract)
            .expect("error creating context");

        // prints the same id twice
        println!("Handling request {} and {}.", first.id, second.id);

        // prints "Request N finished."
        request.dispose();
    }
}
