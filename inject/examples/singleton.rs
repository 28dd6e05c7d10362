use fibre_inject::{resolve, Injector, MetadataRegistry, TypeKey};
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// A simple service that gets a unique ID upon creation.
struct RequestTracker {
  id: usize,
}

// A global counter to generate unique IDs.
static ID_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn main() -> fibre_inject::Result<()> {
  let registry = Arc::new(MetadataRegistry::new());
  registry.declare::<RequestTracker>().constructor(|_| {
    println!("Constructing RequestTracker...");
    Ok(RequestTracker {
      id: ID_COUNTER.fetch_add(1, Ordering::SeqCst),
    })
  })?;

  // --- Singleton Mapping ---
  // The constructor runs ONCE for this injector.
  let singletons = Injector::new(registry.clone());
  singletons.map::<RequestTracker>()?.as_singleton()?;

  println!("--- Resolving Singletons ---");
  let s1 = resolve!(singletons, RequestTracker);
  let s2 = resolve!(singletons, RequestTracker);
  println!("Singleton 1 ID: {}, Singleton 2 ID: {}", s1.id, s2.id);
  assert_eq!(s1.id, 0);
  assert!(Rc::ptr_eq(&s1, &s2), "Singleton instances should be identical");
  println!("Singleton instances are the same pointer, as expected.\n");

  // --- Default Mapping ---
  // Without `as_singleton` every request constructs a new instance.
  let per_request = Injector::new(registry.clone());
  per_request.map::<RequestTracker>()?;

  println!("--- Resolving Per Request ---");
  let t1 = resolve!(per_request, RequestTracker);
  let t2 = resolve!(per_request, RequestTracker);
  println!("Instance 1 ID: {}, Instance 2 ID: {}", t1.id, t2.id);
  assert_eq!(t1.id, 1);
  assert_eq!(t2.id, 2);
  assert!(!Rc::ptr_eq(&t1, &t2), "Instances should be different");

  // --- Sealing ---
  let key = singletons.get_mapping::<RequestTracker>()?.seal()?;
  assert!(singletons.map::<RequestTracker>().is_err());
  singletons.get_mapping::<RequestTracker>()?.unseal(&key)?;
  println!(
    "\nThe mapping of `{}` refused changes while sealed.",
    TypeKey::of::<RequestTracker>()
  );
  Ok(())
}
