use partwire_composition::catalog::ComposableCatalog;
use partwire_composition::configuration::CompositionConfiguration;
use partwire_composition::contract::{CompositionContract, TypeRef};
use partwire_composition::export_definition::ExportDefinition;
use partwire_composition::export_provider::TypedExportSource;
use partwire_composition::import_definition::{ImportDefinition, ImportDefinitionBinding};
use partwire_composition::instance::{exported_value, InstancePtr};
use partwire_composition::part_definition::PartDefinitionBuilder;
use std::sync::Arc;

trait Greeter {
    fn greet(&self, name: &str) -> String;
}

type GreeterPtr = dyn Greeter + Send + Sync;

struct EnglishGreeter;

impl Greeter for EnglishGreeter {
    fn greet(&self, name: &str) -> String {
        format!("Hello {name}!")
    }
}

// a part which will get a greeter imported by its constructor
struct Reception {
    greeter: InstancePtr<Arc<GreeterPtr>>,
}

// note: for the sake of simplicity, errors are unwrapped, rather than gracefully handled
fn main() {
    let greeter_contract = CompositionContract::of(TypeRef::named("Greeter"));

    // parts declare what they export and what they import, by contracts; the greeter exports
    // itself as a trait object and is shared, so all importers get the same instance
    let greeter = PartDefinitionBuilder::new(TypeRef::named("EnglishGreeter"))
        .shared()
        .export_typed(
            ExportDefinition::new(greeter_contract.clone()),
            TypeRef::named("Greeter"),
            |greeter: InstancePtr<EnglishGreeter>| greeter as Arc<GreeterPtr>,
        )
        .importing_constructor(vec![], |_| Ok(exported_value(EnglishGreeter)))
        .build()
        .expect("invalid greeter declaration");

    let reception = PartDefinitionBuilder::new(TypeRef::named("Reception"))
        .export(ExportDefinition::new(CompositionContract::of(
            TypeRef::named("Reception"),
        )))
        .importing_constructor(
            vec![ImportDefinitionBinding::new(
                ImportDefinition::exactly_one(greeter_contract),
                TypeRef::named("Greeter"),
            )],
            |mut arguments| {
                Ok(exported_value(Reception {
                    greeter: arguments.take(0).into_single::<Arc<GreeterPtr>>()?,
                }))
            },
        )
        .build()
        .expect("invalid reception declaration");

    // composition matches all imports with exports and validates the whole graph up front
    let configuration = CompositionConfiguration::create(ComposableCatalog::create([
        greeter, reception,
    ]));
    configuration
        .throw_on_errors()
        .expect("composition is invalid");

    let export_provider = configuration
        .create_export_provider_factory()
        .create_export_provider();

    let reception = export_provider
        .get_exported_value::<Reception>(&CompositionContract::of(TypeRef::named("Reception")))
        .expect("error creating reception");

    // prints "Hello visitor!"
    println!("{}", reception.greeter.greet("visitor"));
}
