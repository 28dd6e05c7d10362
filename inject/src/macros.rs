//! Public macros for ergonomic resolution.

/// Resolves a dependency from an injector, panicking when it cannot be
/// produced.
///
/// Use it where a missing binding is a programming error. For the fallible
/// form call [`Injector::get`](crate::Injector::get) directly.
///
/// # Panics
///
/// Panics with the underlying error when resolution fails.
///
/// # Examples
///
/// ```
/// use std::rc::Rc;
/// use fibre_inject::{resolve, Injector};
///
/// let injector = Injector::builder().build();
/// injector.map::<String>().unwrap().to_value(Rc::new(String::from("hello"))).unwrap();
///
/// let message = resolve!(injector, String);
/// assert_eq!(*message, "hello");
/// ```
///
/// ```
/// use std::rc::Rc;
/// use fibre_inject::{resolve, Injector, Interfaces, MetadataRegistry};
///
/// trait Greeter { fn greet(&self) -> String; }
/// struct EnglishGreeter;
/// impl Greeter for EnglishGreeter { fn greet(&self) -> String { "Hello!".to_string() } }
///
/// let registry = std::sync::Arc::new(MetadataRegistry::new());
/// registry
///   .declare::<EnglishGreeter>()
///   .interfaces(Interfaces::<EnglishGreeter>::new().with::<dyn Greeter>(|g| g as Rc<dyn Greeter>))
///   .unwrap();
///
/// let injector = Injector::new(registry);
/// injector.map::<dyn Greeter>().unwrap().to_value(Rc::new(EnglishGreeter)).unwrap();
///
/// let greeter = resolve!(injector, trait Greeter);
/// assert_eq!(greeter.greet(), "Hello!");
/// ```
#[macro_export]
macro_rules! resolve {
  // The trait arm must come first; `trait X` does not parse as a type.
  ($injector:expr, trait $trait_ident:ident) => {
    match $injector.get::<dyn $trait_ident>() {
      Ok(value) => value,
      Err(err) => panic!(
        "Failed to resolve required trait service: {}: {}",
        std::any::type_name::<dyn $trait_ident>(),
        err
      ),
    }
  };

  ($injector:expr, $type:ty) => {
    match $injector.get::<$type>() {
      Ok(value) => value,
      Err(err) => panic!(
        "Failed to resolve required service: {}: {}",
        std::any::type_name::<$type>(),
        err
      ),
    }
  };
}

/// Resolves a dependency from an injector, returning `None` instead of an
/// error when it cannot be produced.
#[macro_export]
macro_rules! maybe_resolve {
  ($injector:expr, trait $trait_ident:ident) => {
    $injector.get::<dyn $trait_ident>().ok()
  };

  ($injector:expr, $type:ty) => {
    $injector.get::<$type>().ok()
  };
}
