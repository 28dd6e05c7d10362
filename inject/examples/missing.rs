use fibre_inject::{resolve, Error, Injector};
use std::panic;

struct UnregisteredService;

fn main() {
  let injector = Injector::builder().build();

  // --- Using the panicking `resolve!` macro ---
  println!("Attempting to resolve a service that was never mapped...");

  let result = panic::catch_unwind(|| {
    let injector = Injector::builder().build();
    // This line will panic!
    let _service = resolve!(injector, UnregisteredService);
  });

  assert!(result.is_err(), "resolve! should have panicked.");
  println!("Successfully caught the expected panic from resolve!.");

  // --- Using the fallible `get()` method ---
  println!("\nNow, attempting to resolve using the fallible `get()` method...");

  match injector.get::<UnregisteredService>() {
    Ok(_) => panic!("Should not have found the service!"),
    Err(err @ Error::UnknownMapping { .. }) => println!("Correctly received an error: {}", err),
    Err(err) => panic!("Unexpected error: {}", err),
  }
}
