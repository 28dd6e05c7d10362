//! # Fibre Inject
//!
//! A hierarchical, metadata-driven dependency injection container for Rust.
//!
//! Types are described once, up front, in a [`MetadataRegistry`]: their
//! constructor arguments, injected properties, lifecycle hooks and the
//! abstract types (trait objects) they can stand in for. [`Injector`]s then
//! resolve object graphs from those declarations.
//!
//! ## Core Concepts
//!
//! - **MetadataRegistry**: per-type declarations, shared between injectors
//!   as an `Arc`. Thread-safe, so declarations can happen anywhere at startup.
//! - **Injector**: a container of [`Mapping`]s. Sub-injectors read through to
//!   their parent but never mutate it.
//! - **Mapping**: binds one key to a provider strategy: a new instance per
//!   request, a singleton, a fixed value, an alias of another key, or a
//!   factory. Mappings can be sealed against change.
//! - **Lifecycle hooks**: post-construct hooks run once an instance is fully
//!   injected; pre-destroy hooks run when an injector lets go of a singleton.
//!   Pre-destroy hooks only run through `unmap` or `destroy`, never on drop.
//! - **InjectorRef**: a non-owning handle every injector maps to itself. A
//!   value that needs its injector holds one of these, so a singleton never
//!   keeps its own injector alive.
//!
//! ## Quick Start
//!
//! ```
//! use std::rc::Rc;
//! use std::sync::Arc;
//! use fibre_inject::{Injected, Injector, Interfaces, MetadataRegistry, TypeKey};
//!
//! trait Greeter {
//!   fn greet(&self) -> String;
//! }
//!
//! struct EnglishGreeter {
//!   name: Rc<String>,
//! }
//!
//! impl Greeter for EnglishGreeter {
//!   fn greet(&self) -> String {
//!     format!("Hello, {}!", self.name)
//!   }
//! }
//!
//! struct App {
//!   greeter: Injected<dyn Greeter>,
//! }
//!
//! fn main() -> fibre_inject::Result<()> {
//!   let registry = Arc::new(MetadataRegistry::new());
//!   registry
//!     .declare::<EnglishGreeter>()
//!     .constructor_arguments([TypeKey::of::<String>()])?
//!     .constructor(|args| Ok(EnglishGreeter { name: args.required::<String>()? }))?
//!     .interfaces(Interfaces::<EnglishGreeter>::new().with::<dyn Greeter>(|g| g as Rc<dyn Greeter>))?;
//!   registry
//!     .declare::<App>()
//!     .constructor(|_| Ok(App { greeter: Injected::new() }))?
//!     .property::<dyn Greeter>("greeter", |app| &app.greeter)?;
//!
//!   let injector = Injector::new(registry);
//!   injector.map::<String>()?.to_value(Rc::new(String::from("World")))?;
//!   injector.map::<dyn Greeter>()?.to_singleton::<EnglishGreeter>()?;
//!   injector.map::<App>()?;
//!
//!   let app = injector.get::<App>()?;
//!   assert_eq!(app.greeter.get().unwrap().greet(), "Hello, World!");
//!   Ok(())
//! }
//! ```

mod builder;
mod core;
mod descriptor;
mod error;
mod injector;
mod instance;
mod listener;
mod macros;
mod mapping;
mod metadata;
mod provider;
mod scheduler;

pub use builder::{InjectorBuilder, TeardownPolicy};
pub use crate::core::{SealKey, TypeKey};
pub use descriptor::{InjectionDescriptor, ModuleDescriptor};
pub use error::{Error, HookError, Result, Subject};
pub use injector::{Injector, InjectorRef, PostConstruct};
pub use instance::{Injected, Instance};
pub use listener::{MappingEvent, MappingListener};
pub use mapping::Mapping;
pub use metadata::{
  Arguments, ConstructorArg, InheritedMetadata, Interfaces, LifecycleHook, MetadataRegistry, PropertyInjection,
  TypeDeclaration, TypeMetadata,
};
pub use scheduler::{Scheduler, TickQueue};
