//! Application framework based on [partwire_composition].
//!
//! With composition in place, application parts only declare what they export and import, and
//! the composition engine wires them together. This, in turn, requires an entrypoint which
//! discovers parts, composes them and runs the actual business logic of the application. This
//! crate provides such entrypoint in the form of [Application](application::Application), which
//! also configures supporting infrastructure, e.g. logging.
//!
//! ```no_run
//! use partwire::application::Application;
//!
//! let mut application = Application::bootstrap_registered().expect("invalid composition");
//! application.run().expect("error running application");
//! application.dispose();
//! ```

pub mod application;
pub mod config;
pub mod runner;
