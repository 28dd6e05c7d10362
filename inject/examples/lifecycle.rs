use fibre_inject::{Injector, MappingEvent, MetadataRegistry, TypeKey};
use std::cell::Cell;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

struct Pool {
  open: Cell<bool>,
}

fn main() -> fibre_inject::Result<()> {
  // Set RUST_LOG=fibre_inject=trace to watch resolution.
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .init();

  let registry = Arc::new(MetadataRegistry::new());
  registry
    .declare::<Pool>()
    .constructor(|_| Ok(Pool { open: Cell::new(false) }))?
    .post_construct("open", |pool| {
      println!("opening pool");
      pool.open.set(true);
      Ok(())
    })?
    .pre_destroy("close", |pool| {
      println!("closing pool");
      pool.open.set(false);
      Ok(())
    })?;

  let injector = Injector::builder()
    .registry(registry)
    .listener(|event: MappingEvent, mapping: &fibre_inject::Mapping| {
      println!("{}: {}", event, mapping.key());
    })
    .build();
  injector.map::<Pool>()?.as_singleton()?;

  // The deferred post-construct hook has run once `get` returns.
  let pool = injector.get::<Pool>()?;
  assert!(pool.open.get());

  injector.destroy()?;
  assert!(!pool.open.get());
  println!("`{}` was closed by the injector.", TypeKey::of::<Pool>());
  Ok(())
}
