use fibre_inject::{Injected, Injector, MetadataRegistry};
use std::rc::Rc;
use std::sync::Arc;

struct Config {
  environment: &'static str,
}

struct ReportService {
  config: Injected<Config>,
}

impl ReportService {
  fn render(&self) -> String {
    match self.config.get() {
      Some(config) => format!("report for {}", config.environment),
      None => "report without config".to_string(),
    }
  }
}

fn main() -> fibre_inject::Result<()> {
  let registry = Arc::new(MetadataRegistry::new());
  registry
    .declare::<ReportService>()
    .constructor(|_| {
      Ok(ReportService {
        config: Injected::new(),
      })
    })?
    .property::<Config>("config", |service| &service.config)?;

  // --- Root Injector ---
  let root = Injector::new(registry);
  root
    .map::<Config>()?
    .to_value(Rc::new(Config { environment: "production" }))?;
  root.map::<ReportService>()?;

  // --- Child Injector ---
  // The child shadows `Config`. `ReportService` is still read through the
  // root, and the root builds it from the root's own mappings.
  let child = root.create_sub_injector()?;
  child
    .map::<Config>()?
    .to_value(Rc::new(Config { environment: "staging" }))?;

  let from_root = root.get::<ReportService>()?.render();
  let through_child = child.get::<ReportService>()?.render();
  println!("root:          {}", from_root);
  println!("through child: {}", through_child);
  assert_eq!(from_root, "report for production");
  assert_eq!(through_child, "report for production");

  // Mapping the service in the child makes the child build it.
  child.map::<ReportService>()?;
  let from_child = child.get::<ReportService>()?.render();
  println!("from child:    {}", from_child);
  assert_eq!(from_child, "report for staging");

  // Tearing the child down leaves the root untouched.
  child.destroy()?;
  assert!(root.has_direct_mapping::<Config>()?);
  println!("\nThe child was destroyed; the root still maps Config.");
  Ok(())
}
