//! Tests for the `resolve!` and `maybe_resolve!` macros.

use fibre_inject::{maybe_resolve, resolve, Injector, Interfaces, MetadataRegistry};
use std::rc::Rc;
use std::sync::Arc;

// --- Test Fixtures ---

struct MacroTestService {
  value: i32,
}

trait MacroTestTrait {
  fn value(&self) -> i32;
}

impl MacroTestTrait for MacroTestService {
  fn value(&self) -> i32 {
    self.value
  }
}

struct UnregisteredService;

fn injector() -> Injector {
  let registry = Arc::new(MetadataRegistry::new());
  registry
    .declare::<MacroTestService>()
    .interfaces(
      Interfaces::<MacroTestService>::new().with::<dyn MacroTestTrait>(|s| s as Rc<dyn MacroTestTrait>),
    )
    .unwrap();
  let injector = Injector::new(registry);
  injector
    .map::<MacroTestService>()
    .unwrap()
    .to_value(Rc::new(MacroTestService { value: 42 }))
    .unwrap();
  injector
    .map::<dyn MacroTestTrait>()
    .unwrap()
    .to_existing::<MacroTestService>()
    .unwrap();
  injector
}

// --- Macro Tests ---

#[test]
fn test_maybe_resolve() {
  // Arrange
  let injector = injector();

  // Act & Assert: Success cases
  assert_eq!(maybe_resolve!(injector, MacroTestService).unwrap().value, 42);
  assert_eq!(maybe_resolve!(injector, trait MacroTestTrait).unwrap().value(), 42);

  // Act & Assert: Failure case
  assert!(maybe_resolve!(injector, UnregisteredService).is_none());
}

#[test]
fn test_resolve_success() {
  let injector = injector();

  let service = resolve!(injector, MacroTestService);
  let via_trait = resolve!(injector, trait MacroTestTrait);

  assert_eq!(service.value, 42);
  assert_eq!(via_trait.value(), 42);
}

#[test]
#[should_panic(expected = "Failed to resolve required service")]
fn test_resolve_panics_on_missing_service() {
  let injector = injector();
  let _ = resolve!(injector, UnregisteredService);
}

#[test]
#[should_panic(expected = "Failed to resolve required trait service")]
fn test_resolve_panics_on_destroyed_injector() {
  let injector = injector();
  injector.destroy().unwrap();
  let _ = resolve!(injector, trait MacroTestTrait);
}
