use fibre_inject::{
  Error, Injected, Injector, InjectorRef, MappingEvent, MetadataRegistry, Scheduler, Subject, TeardownPolicy,
  TypeKey,
};
use pretty_assertions::assert_eq;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

// --- Test Fixtures ---

#[derive(Default)]
struct Log {
  entries: RefCell<Vec<String>>,
}

impl Log {
  fn push(&self, entry: &str) {
    self.entries.borrow_mut().push(entry.to_string());
  }

  fn entries(&self) -> Vec<String> {
    self.entries.borrow().clone()
  }
}

struct Database {
  log: Rc<Log>,
}

struct Cache {
  log: Rc<Log>,
}

struct SelfAware {
  injector: Injected<InjectorRef>,
  saw_itself: Cell<bool>,
}

struct Holder {
  drops: Rc<Cell<u32>>,
  injector: Injected<InjectorRef>,
}

impl Drop for Holder {
  fn drop(&mut self) {
    self.drops.set(self.drops.get() + 1);
  }
}

struct OwningHolder {
  drops: Rc<Cell<u32>>,
  injector: Injected<Injector>,
}

impl Drop for OwningHolder {
  fn drop(&mut self) {
    self.drops.set(self.drops.get() + 1);
  }
}

fn registry() -> Arc<MetadataRegistry> {
  let registry = Arc::new(MetadataRegistry::new());
  registry
    .declare::<Database>()
    .constructor_arguments([TypeKey::of::<Log>()])
    .unwrap()
    .constructor(|args| Ok(Database { log: args.required::<Log>()? }))
    .unwrap()
    .post_construct("connect", |db| {
      db.log.push("database connect");
      Ok(())
    })
    .unwrap()
    .pre_destroy("close", |db| {
      db.log.push("database close");
      Ok(())
    })
    .unwrap();
  registry
    .declare::<Cache>()
    .constructor_arguments([TypeKey::of::<Log>()])
    .unwrap()
    .constructor(|args| Ok(Cache { log: args.required::<Log>()? }))
    .unwrap()
    .pre_destroy("flush", |cache| {
      cache.log.push("cache flush");
      Err("disk full".into())
    })
    .unwrap();
  registry
    .declare::<SelfAware>()
    .constructor(|_| {
      Ok(SelfAware {
        injector: Injected::new(),
        saw_itself: Cell::new(false),
      })
    })
    .unwrap()
    .property::<InjectorRef>("injector", |s| &s.injector)
    .unwrap()
    .post_construct("look_around", |s| {
      let injector = s.injector.get().ok_or("injector was not injected")?.upgrade()?;
      let me = injector.get::<SelfAware>()?;
      s.saw_itself.set(std::ptr::eq(&*me, s));
      Ok(())
    })
    .unwrap();
  registry
    .declare::<Holder>()
    .constructor_arguments([TypeKey::of::<Cell<u32>>()])
    .unwrap()
    .constructor(|args| {
      Ok(Holder {
        drops: args.required::<Cell<u32>>()?,
        injector: Injected::new(),
      })
    })
    .unwrap()
    .property::<InjectorRef>("injector", |h| &h.injector)
    .unwrap();
  registry
    .declare::<OwningHolder>()
    .constructor_arguments([TypeKey::of::<Cell<u32>>()])
    .unwrap()
    .constructor(|args| {
      Ok(OwningHolder {
        drops: args.required::<Cell<u32>>()?,
        injector: Injected::new(),
      })
    })
    .unwrap()
    .property::<Injector>("injector", |h| &h.injector)
    .unwrap();
  registry
}

fn injector_with_log(builder: fibre_inject::InjectorBuilder) -> (Injector, Rc<Log>) {
  let injector = builder.registry(registry()).build();
  let log = Rc::new(Log::default());
  injector.map::<Log>().unwrap().to_value(log.clone()).unwrap();
  (injector, log)
}

// --- Post-construct ---

#[test]
fn test_singleton_post_construct_runs_after_the_call() {
  // Arrange
  let (root, log) = injector_with_log(Injector::builder());
  root.map::<Database>().unwrap().as_singleton().unwrap();

  // Act
  let db = root.get::<Database>().unwrap();

  // Assert
  assert_eq!(log.entries(), vec!["database connect"]);
  assert!(Rc::ptr_eq(&db.log, &log));
}

#[test]
fn test_deferred_singleton_hook_sees_its_own_instance() {
  // Arrange
  let root = Injector::new(registry());
  root.map::<SelfAware>().unwrap().as_singleton().unwrap();

  // Act
  let instance = root.get::<SelfAware>().unwrap();

  // Assert
  assert!(instance.saw_itself.get());
}

#[test]
fn test_immediate_hook_asking_for_itself_is_circular() {
  let root = Injector::new(registry());
  root.map::<SelfAware>().unwrap();

  match root.get::<SelfAware>() {
    Err(Error::Hook { owner, method, .. }) => {
      assert_eq!(owner, TypeKey::of::<SelfAware>());
      assert_eq!(method, "look_around");
    }
    other => panic!("expected a hook failure, got {:?}", other.map(|_| ())),
  }
}

#[test]
fn test_custom_scheduler_controls_deferred_hooks() {
  #[derive(Default)]
  struct Manual {
    tasks: RefCell<Vec<Box<dyn FnOnce()>>>,
  }

  impl Scheduler for Manual {
    fn schedule(&self, task: Box<dyn FnOnce()>) {
      self.tasks.borrow_mut().push(task);
    }
  }

  // Arrange
  let manual = Rc::new(Manual::default());
  let (root, log) = injector_with_log(Injector::builder().scheduler(manual.clone() as Rc<dyn Scheduler>));
  root.map::<Database>().unwrap().as_singleton().unwrap();

  // Act
  root.get::<Database>().unwrap();

  // Assert
  assert!(log.entries().is_empty());
  let tasks: Vec<_> = manual.tasks.borrow_mut().drain(..).collect();
  assert_eq!(tasks.len(), 1);
  for task in tasks {
    task();
  }
  assert_eq!(log.entries(), vec!["database connect"]);
}

#[test]
fn test_instantiate_deferred_has_run_hooks_when_it_returns() {
  let (root, log) = injector_with_log(Injector::builder());

  let db = root.instantiate_deferred::<Database>().unwrap();

  assert_eq!(log.entries(), vec!["database connect"]);
  assert!(Rc::ptr_eq(&db.log, &log));
}

#[test]
fn test_instantiate_deferred_waits_for_custom_scheduler() {
  #[derive(Default)]
  struct Held {
    tasks: RefCell<Vec<Box<dyn FnOnce()>>>,
  }

  impl Scheduler for Held {
    fn schedule(&self, task: Box<dyn FnOnce()>) {
      self.tasks.borrow_mut().push(task);
    }
  }

  let held = Rc::new(Held::default());
  let (root, log) = injector_with_log(Injector::builder().scheduler(held.clone() as Rc<dyn Scheduler>));

  root.instantiate_deferred::<Database>().unwrap();

  assert!(log.entries().is_empty());
  assert_eq!(held.tasks.borrow().len(), 1);
}

// --- Destruction ---

#[test]
fn test_destroy_runs_pre_destroy_and_is_not_idempotent() {
  // Arrange
  let (root, log) = injector_with_log(Injector::builder());
  root.map::<Database>().unwrap().as_singleton().unwrap();
  root.get::<Database>().unwrap();

  // Act
  root.destroy().unwrap();

  // Assert
  assert_eq!(log.entries(), vec!["database connect", "database close"]);
  assert!(root.is_destroyed());
  assert!(matches!(
    root.get::<Database>(),
    Err(Error::AlreadyDestroyed(Subject::Injector))
  ));
  assert!(matches!(root.map::<Database>(), Err(Error::AlreadyDestroyed(_))));
  assert!(matches!(root.create_sub_injector(), Err(Error::AlreadyDestroyed(_))));
  assert!(matches!(root.destroy(), Err(Error::AlreadyDestroyed(_))));
}

#[test]
fn test_destroy_unseals_sealed_mappings() {
  let (root, log) = injector_with_log(Injector::builder());
  let _key = root.map::<Database>().unwrap().as_singleton().unwrap().seal().unwrap();
  root.get::<Database>().unwrap();

  root.destroy().unwrap();

  assert_eq!(log.entries(), vec!["database connect", "database close"]);
}

#[test]
fn test_unmapping_a_singleton_destroys_it() {
  let (root, log) = injector_with_log(Injector::builder());
  root.map::<Database>().unwrap().as_singleton().unwrap();
  root.get::<Database>().unwrap();

  root.unmap::<Database>().unwrap();

  assert_eq!(log.entries(), vec!["database connect", "database close"]);
}

#[test]
fn test_uninitialized_singleton_has_nothing_to_destroy() {
  let (root, log) = injector_with_log(Injector::builder());
  root.map::<Database>().unwrap().as_singleton().unwrap();

  root.destroy().unwrap();

  assert!(log.entries().is_empty());
}

#[test]
fn test_best_effort_teardown_continues_after_failure() {
  // Arrange
  let (root, log) = injector_with_log(Injector::builder());
  root.map::<Cache>().unwrap().as_singleton().unwrap();
  root.map::<Database>().unwrap().as_singleton().unwrap();
  root.get::<Cache>().unwrap();
  root.get::<Database>().unwrap();

  // Act
  let result = root.destroy();

  // Assert
  assert!(matches!(result, Err(Error::Hook { .. })));
  assert!(root.is_destroyed());
  assert_eq!(
    log.entries(),
    vec!["database connect", "cache flush", "database close"]
  );
}

#[test]
fn test_fail_fast_teardown_stops_at_first_failure() {
  // Arrange
  let (root, log) = injector_with_log(Injector::builder().teardown(TeardownPolicy::FailFast));
  root.map::<Cache>().unwrap().as_singleton().unwrap();
  root.map::<Database>().unwrap().as_singleton().unwrap();
  root.get::<Cache>().unwrap();
  root.get::<Database>().unwrap();

  // Act
  let result = root.destroy();

  // Assert
  assert!(matches!(result, Err(Error::Hook { .. })));
  assert!(!root.is_destroyed());
  assert!(!root.has_direct_mapping::<Cache>().unwrap());
  assert!(root.has_direct_mapping::<Database>().unwrap());
  assert_eq!(log.entries(), vec!["database connect", "cache flush"]);
}

#[test]
fn test_destroy_instance() {
  struct Plain;

  let (root, log) = injector_with_log(Injector::builder());
  let db = root.instantiate_instance::<Database>().unwrap();
  assert_eq!(log.entries(), vec!["database connect"]);

  root.destroy_instance(&db).unwrap();
  root.destroy_instance(&Rc::new(Plain)).unwrap();

  assert_eq!(log.entries(), vec!["database connect", "database close"]);
}

#[test]
fn test_map_over_singleton_with_failing_release_installs_new_mapping() {
  // Arrange
  let (root, log) = injector_with_log(Injector::builder());
  let old = root.map::<Cache>().unwrap();
  old.as_singleton().unwrap();
  root.get::<Cache>().unwrap();

  // Act
  let result = root.map::<Cache>();

  // Assert
  assert!(matches!(result, Err(Error::Hook { .. })));
  assert!(old.is_destroyed());
  let current = root.get_mapping::<Cache>().unwrap();
  assert!(!current.ptr_eq(&old));
  assert!(root.get::<Cache>().is_ok());
  assert_eq!(log.entries(), vec!["cache flush"]);
}

#[test]
fn test_unmap_of_singleton_with_failing_release_still_removes_it() {
  // Arrange
  let events: Rc<RefCell<Vec<MappingEvent>>> = Rc::default();
  let sink = events.clone();
  let builder = Injector::builder().listener(move |event: MappingEvent, mapping: &fibre_inject::Mapping| {
    if mapping.key() == TypeKey::of::<Cache>() {
      sink.borrow_mut().push(event);
    }
  });
  let (root, log) = injector_with_log(builder);
  let mapping = root.map::<Cache>().unwrap();
  mapping.as_singleton().unwrap();
  root.get::<Cache>().unwrap();

  // Act
  let result = root.unmap::<Cache>();

  // Assert
  assert!(matches!(result, Err(Error::Hook { .. })));
  assert!(mapping.is_destroyed());
  assert!(!root.has_direct_mapping::<Cache>().unwrap());
  assert_eq!(*events.borrow(), vec![MappingEvent::Created, MappingEvent::Destroyed]);
  assert_eq!(log.entries(), vec!["cache flush"]);
}

// --- Ownership ---

#[test]
fn test_dropping_root_releases_singleton_holding_injector_ref() {
  // Arrange
  let root = Injector::new(registry());
  let drops = Rc::new(Cell::new(0u32));
  root.map::<Cell<u32>>().unwrap().to_value(drops.clone()).unwrap();
  root.map::<Holder>().unwrap().as_singleton().unwrap();
  let holder = root.get::<Holder>().unwrap();
  let handle = holder.injector.get().unwrap();
  assert!(handle.upgrade().unwrap().ptr_eq(&root));
  drop(holder);

  // Act
  drop(root);

  // Assert
  assert_eq!(drops.get(), 1);
  assert!(matches!(handle.upgrade(), Err(Error::AlreadyDestroyed(Subject::Injector))));
}

#[test]
fn test_destroy_releases_singleton_holding_owning_injector() {
  // Arrange
  let root = Injector::new(registry());
  let drops = Rc::new(Cell::new(0u32));
  root.map::<Cell<u32>>().unwrap().to_value(drops.clone()).unwrap();
  root.map::<OwningHolder>().unwrap().as_singleton().unwrap();
  let holder = root.get::<OwningHolder>().unwrap();
  assert!(holder.injector.get().unwrap().ptr_eq(&root));
  drop(holder);

  // Act
  root.destroy().unwrap();
  drop(root);

  // Assert
  assert_eq!(drops.get(), 1);
}

#[test]
fn test_each_injector_resolves_a_weak_handle_to_itself() {
  let root = Injector::builder().build();
  let sub = root.create_sub_injector().unwrap();

  let handle = sub.get::<InjectorRef>().unwrap();

  assert!(handle.upgrade().unwrap().ptr_eq(&sub));
  assert!(root.weak().upgrade().unwrap().ptr_eq(&root));
  assert!(sub.get_mapping::<InjectorRef>().unwrap().is_sealed());
}

// --- Mapping Events ---

#[test]
fn test_mapping_events_are_reported() {
  // Arrange
  let events: Rc<RefCell<Vec<(MappingEvent, TypeKey)>>> = Rc::default();
  let sink = events.clone();
  let root = Injector::builder()
    .listener(move |event: MappingEvent, mapping: &fibre_inject::Mapping| {
      sink.borrow_mut().push((event, mapping.key()));
    })
    .build();
  let key = TypeKey::of::<Log>();

  // Act
  root.map::<Log>().unwrap();
  root.map::<Log>().unwrap();
  root.unmap::<Log>().unwrap();

  // Assert
  assert_eq!(
    *events.borrow(),
    vec![
      (MappingEvent::Created, key),
      (MappingEvent::Override, key),
      (MappingEvent::Destroyed, key),
      (MappingEvent::Created, key),
      (MappingEvent::Destroyed, key),
    ]
  );

  // Sub-injectors do not inherit listeners.
  let sub = root.create_sub_injector().unwrap();
  sub.map::<Log>().unwrap();
  assert_eq!(events.borrow().len(), 5);
}
