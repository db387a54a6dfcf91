use partwire::application::Application;
use partwire::runner::{ApplicationRunner, ApplicationRunnerExport, ErrorPtr};
use partwire_composition::contract::TypeRef;
use partwire_composition::error::PartDiscoveryError;
use partwire_composition::instance::exported_value;
use partwire_composition::part_definition::{ComposablePartDefinition, PartDefinitionBuilder};
use partwire_composition::register_part;

// this is an application runner, which will run when the application starts; the framework will
// automatically discover it, since it's exported under the runner contract
struct HelloWorldRunner;

impl ApplicationRunner for HelloWorldRunner {
    fn run(&self) -> Result<(), ErrorPtr> {
        println!("Hello world!");
        Ok(())
    }
}

fn hello_world_runner() -> Result<ComposablePartDefinition, Vec<PartDiscoveryError>> {
    PartDefinitionBuilder::new(TypeRef::named("HelloWorldRunner"))
        .export_application_runner::<HelloWorldRunner>()
        .importing_constructor(vec![], |_| Ok(exported_value(HelloWorldRunner)))
        .build()
}

// registered parts are discovered when the application bootstraps
register_part!(hello_world_runner);

// note: for the sake of simplicity, errors are unwrapped, rather than gracefully handled
fn main() {
    let mut application =
        Application::bootstrap_registered().expect("unable to bootstrap application");

    // prints "Hello world!"
    application.run().expect("error running application");
    application.dispose();
}
