//! The hierarchical `Injector` and its resolution algorithm.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use tracing::{debug, error, trace, warn};

use crate::builder::{InjectorBuilder, TeardownPolicy};
use crate::core::{SealKey, TypeKey};
use crate::error::{Error, Result, Subject};
use crate::instance::Instance;
use crate::listener::{MappingEvent, MappingListener};
use crate::mapping::Mapping;
use crate::metadata::{Arguments, InheritedMetadata, LifecycleHook, MetadataRegistry, PropertyInjection, TypeMetadata};
use crate::provider::Provider;
use crate::scheduler::Scheduler;

/// When the post-construct hooks of a new instance run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PostConstruct {
  /// Before the call that created the instance returns.
  #[default]
  Immediate,
  /// Handed to the injector's [`Scheduler`]. With the default `TickQueue`
  /// the hooks run after the instance is cached by its mapping and before the
  /// outermost injector call returns. A custom scheduler may run them later.
  Deferred,
}

/// State shared by every injector of one tree.
pub(crate) struct Shared {
  registry: Arc<MetadataRegistry>,
  scheduler: Rc<dyn Scheduler>,
  teardown: TeardownPolicy,
  depth: Cell<usize>,
}

#[derive(Default)]
struct MappingTable {
  by_key: HashMap<TypeKey, Mapping>,
  order: Vec<TypeKey>,
}

impl MappingTable {
  fn get(&self, key: TypeKey) -> Option<Mapping> {
    self.by_key.get(&key).cloned()
  }

  fn insert(&mut self, key: TypeKey, mapping: Mapping) {
    if self.by_key.insert(key, mapping).is_none() {
      self.order.push(key);
    }
  }

  fn remove(&mut self, key: TypeKey) {
    if self.by_key.remove(&key).is_some() {
      self.order.retain(|existing| *existing != key);
    }
  }
}

pub(crate) struct InjectorInner {
  parent: Option<Injector>,
  mappings: RefCell<MappingTable>,
  listeners: RefCell<Vec<Rc<dyn MappingListener>>>,
  destroyed: Cell<bool>,
  master: SealKey,
  shared: Rc<Shared>,
}

/// A hierarchical dependency injection container.
///
/// An injector owns a table of [`Mapping`]s keyed by [`TypeKey`]. Lookups
/// that find no direct mapping fall through to the parent chain; mutations
/// only ever touch the injector they are called on.
///
/// `Injector` is a cheap, reference-counted handle. Clones refer to the same
/// container. It is single-threaded (`!Send`); the [`MetadataRegistry`] it
/// reads from can be shared across threads.
///
/// ```
/// use std::rc::Rc;
/// use fibre_inject::{Injector, MetadataRegistry};
///
/// #[derive(Default)]
/// struct Widget;
///
/// # fn main() -> fibre_inject::Result<()> {
/// let registry = std::sync::Arc::new(MetadataRegistry::new());
/// registry.declare::<Widget>().default_constructor()?;
///
/// let root = Injector::new(registry);
/// root.map::<Widget>()?.as_singleton()?;
///
/// let a = root.get::<Widget>()?;
/// let b = root.get::<Widget>()?;
/// assert!(Rc::ptr_eq(&a, &b));
///
/// let sub = root.create_sub_injector()?;
/// assert!(sub.has_mapping::<Widget>()?);
/// assert!(!sub.has_direct_mapping::<Widget>()?);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Injector {
  inner: Rc<InjectorInner>,
}

/// Marks an injector call in progress on a tree; the scheduler ticks when the
/// outermost one ends.
pub(crate) struct Operation {
  shared: Rc<Shared>,
}

impl Drop for Operation {
  fn drop(&mut self) {
    let depth = self.shared.depth.get().saturating_sub(1);
    self.shared.depth.set(depth);
    if depth == 0 {
      self.shared.scheduler.tick();
    }
  }
}

impl Injector {
  /// Creates a root injector with default configuration.
  pub fn new(registry: Arc<MetadataRegistry>) -> Self {
    InjectorBuilder::new().registry(registry).build()
  }

  pub fn builder() -> InjectorBuilder {
    InjectorBuilder::new()
  }

  pub(crate) fn create(
    registry: Arc<MetadataRegistry>,
    scheduler: Rc<dyn Scheduler>,
    teardown: TeardownPolicy,
    listeners: Vec<Rc<dyn MappingListener>>,
  ) -> Self {
    let shared = Rc::new(Shared {
      registry,
      scheduler,
      teardown,
      depth: Cell::new(0),
    });
    Self::with_shared(None, shared, listeners)
  }

  fn with_shared(parent: Option<Injector>, shared: Rc<Shared>, listeners: Vec<Rc<dyn MappingListener>>) -> Self {
    let injector = Injector {
      inner: Rc::new(InjectorInner {
        parent,
        mappings: RefCell::new(MappingTable::default()),
        listeners: RefCell::new(listeners),
        destroyed: Cell::new(false),
        master: SealKey::generate(),
        shared,
      }),
    };

    // Every injector resolves itself, both as an owning `Injector` and as a
    // non-owning `InjectorRef`. The factories receive the owner, so the
    // mappings never hold a strong reference back to it.
    let strong = Rc::new(|owner: &Injector| -> Result<Instance> { Ok(Instance::new(Rc::new(owner.clone()))) });
    let weak = Rc::new(|owner: &Injector| -> Result<Instance> { Ok(Instance::new(Rc::new(owner.weak()))) });
    injector.install_self_mapping(TypeKey::of::<Injector>(), Provider::factory(strong, false));
    injector.install_self_mapping(TypeKey::of::<InjectorRef>(), Provider::factory(weak, false));
    injector
  }

  fn install_self_mapping(&self, key: TypeKey, provider: Provider) {
    let mapping = Mapping::new_sealed(key, self, provider);
    self.inner.mappings.borrow_mut().insert(key, mapping);
  }

  pub(crate) fn from_inner(inner: Rc<InjectorInner>) -> Self {
    Self { inner }
  }

  pub(crate) fn downgrade(&self) -> Weak<InjectorInner> {
    Rc::downgrade(&self.inner)
  }

  /// A handle that does not keep this injector alive.
  pub fn weak(&self) -> InjectorRef {
    InjectorRef {
      inner: self.downgrade(),
    }
  }

  pub(crate) fn master_key(&self) -> &SealKey {
    &self.inner.master
  }

  pub(crate) fn begin(&self) -> Operation {
    let shared = self.inner.shared.clone();
    shared.depth.set(shared.depth.get() + 1);
    Operation { shared }
  }

  // --- ACCESSORS ---

  pub fn parent(&self) -> Option<&Injector> {
    self.inner.parent.as_ref()
  }

  pub fn registry(&self) -> &Arc<MetadataRegistry> {
    &self.inner.shared.registry
  }

  pub fn is_destroyed(&self) -> bool {
    self.inner.destroyed.get()
  }

  /// Whether both handles refer to the same injector.
  pub fn ptr_eq(&self, other: &Injector) -> bool {
    Rc::ptr_eq(&self.inner, &other.inner)
  }

  /// Registers a listener for mapping events of this injector only.
  pub fn add_listener<Listener>(&self, listener: Listener)
  where
    Listener: MappingListener + 'static,
  {
    self.inner.listeners.borrow_mut().push(Rc::new(listener));
  }

  // --- MAPPINGS ---

  /// Creates a mapping for `T`, replacing an unsealed existing one.
  ///
  /// When releasing the replaced mapping fails, the new mapping is still in
  /// place and the release error is returned.
  pub fn map<T: ?Sized + Any>(&self) -> Result<Mapping> {
    self.map_key(TypeKey::of::<T>())
  }

  pub fn map_key(&self, key: TypeKey) -> Result<Mapping> {
    self.check_live()?;

    let existing = self.inner.mappings.borrow().get(key);
    let mut released = Ok(());
    if let Some(existing) = existing {
      if existing.is_sealed() {
        return Err(Error::SealedOverride { key });
      }
      warn!(
        key = %key,
        "injector already has a mapping for this type and it is being overridden; unmap it first if this is intended"
      );
      self.notify(MappingEvent::Override, &existing);
      released = self.unmap_key(key);
    }

    // The new mapping is installed even when releasing the old one failed.
    let mapping = Mapping::new(key, self, Provider::class(key));
    self.inner.mappings.borrow_mut().insert(key, mapping.clone());
    debug!(key = %key, "mapping created");
    self.notify(MappingEvent::Created, &mapping);
    released.map(|()| mapping)
  }

  /// Removes and destroys the direct mapping of `T`.
  ///
  /// The mapping is removed even when its release fails; the failure of a
  /// pre-destroy hook is returned after the table is updated.
  pub fn unmap<T: ?Sized + Any>(&self) -> Result<()> {
    self.unmap_key(TypeKey::of::<T>())
  }

  pub fn unmap_key(&self, key: TypeKey) -> Result<()> {
    self.check_live()?;

    let mapping = self.inner.mappings.borrow().get(key).ok_or_else(|| Error::unknown(key))?;
    if mapping.is_sealed() {
      return Err(Error::SealedOverride { key });
    }

    self.inner.mappings.borrow_mut().remove(key);
    let result = if mapping.is_destroyed() {
      Ok(())
    } else {
      mapping.destroy()
    };
    debug!(key = %key, "mapping removed");
    self.notify(MappingEvent::Destroyed, &mapping);
    result
  }

  pub fn has_direct_mapping<T: ?Sized + Any>(&self) -> Result<bool> {
    self.has_direct_mapping_key(TypeKey::of::<T>())
  }

  pub fn has_direct_mapping_key(&self, key: TypeKey) -> Result<bool> {
    self.check_live()?;
    Ok(self.inner.mappings.borrow().by_key.contains_key(&key))
  }

  /// Whether this injector or any ancestor maps `T`.
  pub fn has_mapping<T: ?Sized + Any>(&self) -> Result<bool> {
    self.has_mapping_key(TypeKey::of::<T>())
  }

  pub fn has_mapping_key(&self, key: TypeKey) -> Result<bool> {
    Ok(self.find_mapping(key)?.is_some())
  }

  /// Returns the direct mapping of `T`; ancestors are not consulted.
  pub fn get_mapping<T: ?Sized + Any>(&self) -> Result<Mapping> {
    self.get_mapping_key(TypeKey::of::<T>())
  }

  pub fn get_mapping_key(&self, key: TypeKey) -> Result<Mapping> {
    self.check_live()?;
    self.inner.mappings.borrow().get(key).ok_or_else(|| Error::unknown(key))
  }

  // --- RESOLUTION ---

  /// Resolves `T` through this injector and its ancestors.
  pub fn get<T: ?Sized + Any>(&self) -> Result<Rc<T>> {
    let key = TypeKey::of::<T>();
    self
      .get_instance(key)?
      .downcast::<T>()
      .ok_or(Error::TypeMismatch { expected: key })
  }

  pub fn get_instance(&self, key: TypeKey) -> Result<Instance> {
    let _operation = self.begin();
    match self.find_mapping(key)? {
      Some(mapping) => {
        trace!(key = %key, "resolving");
        mapping.get_injected_value()
      }
      None => Err(Error::unknown(key)),
    }
  }

  /// Constructs a new, fully injected `T`, running its post-construct hooks
  /// before returning.
  pub fn instantiate_instance<T: Any>(&self) -> Result<Rc<T>> {
    self.instantiate_typed(PostConstruct::Immediate)
  }

  /// Like [`instantiate_instance`](Self::instantiate_instance), but the
  /// post-construct hooks are handed to the scheduler.
  ///
  /// With the default [`TickQueue`](crate::TickQueue) the hooks run when the
  /// outermost injector call returns. Called directly, that is this call, so
  /// the hooks have run by the time it returns. Nested inside another
  /// resolution (a singleton being produced), they run after the singleton is
  /// cached and before the outermost call returns.
  pub fn instantiate_deferred<T: Any>(&self) -> Result<Rc<T>> {
    self.instantiate_typed(PostConstruct::Deferred)
  }

  fn instantiate_typed<T: Any>(&self, post_construct: PostConstruct) -> Result<Rc<T>> {
    let key = TypeKey::of::<T>();
    self
      .instantiate_key(key, post_construct)?
      .downcast::<T>()
      .ok_or(Error::TypeMismatch { expected: key })
  }

  pub fn instantiate_key(&self, key: TypeKey, post_construct: PostConstruct) -> Result<Instance> {
    self.check_live()?;
    let _operation = self.begin();

    let registry = self.registry();
    let constructor = registry.constructor(key)?;
    let metadata = registry.type_descriptor(key)?;

    let mut values = Vec::with_capacity(metadata.constructor_arguments().len());
    for argument in metadata.constructor_arguments() {
      let value = match self.find_mapping(argument.key)? {
        Some(mapping) => Some(mapping.get_injected_value()?),
        None if argument.is_optional => None,
        None => {
          return Err(Error::UnknownMapping {
            key: argument.key,
            required_by: Some(key),
          })
        }
      };
      values.push((*argument, value));
    }

    let instance = constructor(&mut Arguments::new(key, values))?;
    trace!(key = %key, "instance constructed");
    self.inject_object(instance.object(), post_construct)?;
    Ok(instance)
  }

  /// Fills the declared property injections of `target` and runs its
  /// post-construct hooks.
  pub fn inject_into<T: Any>(&self, target: &Rc<T>) -> Result<()> {
    let object: Rc<dyn Any> = target.clone();
    self.inject_object(&object, PostConstruct::Immediate)
  }

  /// Like [`inject_into`](Self::inject_into), but the post-construct hooks are
  /// handed to the scheduler. See
  /// [`instantiate_deferred`](Self::instantiate_deferred) for when they run.
  pub fn inject_into_deferred<T: Any>(&self, target: &Rc<T>) -> Result<()> {
    let object: Rc<dyn Any> = target.clone();
    self.inject_object(&object, PostConstruct::Deferred)
  }

  pub fn inject_object(&self, target: &Rc<dyn Any>, post_construct: PostConstruct) -> Result<()> {
    self.check_live()?;
    let _operation = self.begin();

    let chain = self.registry().inherited_metadata((**target).type_id());
    let Some(runtime) = chain.last().map(|entry| entry.metadata().key()) else {
      return Ok(());
    };

    for (entry, injection) in merge_property_injections(&chain) {
      let part = project(entry, &**target)?;
      match self.find_mapping(injection.key())? {
        Some(mapping) => {
          let value = mapping.get_injected_value()?;
          injection.inject(part, &value)?;
        }
        None if injection.is_optional() => {}
        None => {
          return Err(Error::UnknownMapping {
            key: injection.key(),
            required_by: Some(runtime),
          })
        }
      }
    }

    let hooks = merge_hooks(&chain, TypeMetadata::post_construct_methods);
    if hooks.is_empty() {
      return Ok(());
    }
    match post_construct {
      PostConstruct::Immediate => invoke_hooks(&**target, &hooks),
      PostConstruct::Deferred => {
        let target = target.clone();
        self.inner.shared.scheduler.schedule(Box::new(move || {
          if let Err(err) = invoke_hooks(&*target, &hooks) {
            error!(key = %runtime, error = %err, "deferred post-construct hook failed");
          }
        }));
        Ok(())
      }
    }
  }

  /// Runs the pre-destroy hooks declared for `target` and its ancestors.
  ///
  /// A value without declared metadata is left untouched.
  pub fn destroy_instance<T: Any>(&self, target: &Rc<T>) -> Result<()> {
    self.destroy_object(&**target)
  }

  pub fn destroy_object(&self, target: &dyn Any) -> Result<()> {
    self.check_live()?;
    run_pre_destroy(self.registry(), target)
  }

  // --- HIERARCHY ---

  /// Creates a child injector whose unresolved lookups fall through to this one.
  pub fn create_sub_injector(&self) -> Result<Injector> {
    self.check_live()?;
    Ok(Self::with_shared(
      Some(self.clone()),
      self.inner.shared.clone(),
      Vec::new(),
    ))
  }

  /// Unmaps every direct mapping, unsealing them first, and marks the
  /// injector destroyed.
  ///
  /// Singletons held by the mappings get their pre-destroy hooks. How a
  /// failing mapping is handled depends on the [`TeardownPolicy`].
  pub fn destroy(&self) -> Result<()> {
    self.check_live()?;
    let _operation = self.begin();

    let keys = self.inner.mappings.borrow().order.clone();
    let mut first_error = None;
    for key in keys {
      if let Err(err) = self.teardown_mapping(key) {
        match self.inner.shared.teardown {
          TeardownPolicy::FailFast => return Err(err),
          TeardownPolicy::BestEffort => {
            warn!(key = %key, error = %err, "mapping teardown failed; continuing");
            first_error.get_or_insert(err);
          }
        }
      }
    }

    self.inner.destroyed.set(true);
    debug!("injector destroyed");
    match first_error {
      Some(err) => Err(err),
      None => Ok(()),
    }
  }

  // --- PRIVATE HELPERS ---

  fn check_live(&self) -> Result<()> {
    if self.inner.destroyed.get() {
      Err(Error::AlreadyDestroyed(Subject::Injector))
    } else {
      Ok(())
    }
  }

  /// First mapping of `key` along the parent chain.
  fn find_mapping(&self, key: TypeKey) -> Result<Option<Mapping>> {
    let mut injector = self;
    loop {
      injector.check_live()?;
      if let Some(mapping) = injector.inner.mappings.borrow().get(key) {
        return Ok(Some(mapping));
      }
      match &injector.inner.parent {
        Some(parent) => injector = parent,
        None => return Ok(None),
      }
    }
  }

  fn teardown_mapping(&self, key: TypeKey) -> Result<()> {
    let mapping = self.get_mapping_key(key)?;
    if mapping.is_sealed() {
      mapping.unseal(&self.inner.master)?;
    }
    self.unmap_key(key)
  }

  fn notify(&self, event: MappingEvent, mapping: &Mapping) {
    let listeners = self.inner.listeners.borrow().clone();
    for listener in listeners {
      listener.on_mapping_event(event, mapping);
    }
  }
}

impl fmt::Debug for Injector {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut depth = 0;
    let mut parent = self.parent();
    while let Some(injector) = parent {
      depth += 1;
      parent = injector.parent();
    }
    f.debug_struct("Injector")
      .field("depth", &depth)
      .field("mappings", &self.inner.mappings.borrow().order)
      .field("destroyed", &self.inner.destroyed.get())
      .finish_non_exhaustive()
  }
}

/// A non-owning handle to an [`Injector`].
///
/// Every injector maps `InjectorRef` to a handle of itself. Values that need
/// the injector which built them should hold this rather than an `Injector`:
/// a singleton holding an owning `Injector` keeps the whole tree alive until
/// [`Injector::destroy`] releases it.
#[derive(Clone)]
pub struct InjectorRef {
  inner: Weak<InjectorInner>,
}

impl InjectorRef {
  /// Returns the injector, or `AlreadyDestroyed` once every owning handle is
  /// gone.
  pub fn upgrade(&self) -> Result<Injector> {
    self
      .inner
      .upgrade()
      .map(Injector::from_inner)
      .ok_or(Error::AlreadyDestroyed(Subject::Injector))
  }
}

impl fmt::Debug for InjectorRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("InjectorRef")
      .field("alive", &(self.inner.strong_count() > 0))
      .finish()
  }
}

// --- LIFECYCLE HELPERS ---

fn project<'a>(entry: &InheritedMetadata, target: &'a dyn Any) -> Result<&'a dyn Any> {
  entry.project(target).ok_or(Error::TypeMismatch {
    expected: entry.metadata().key(),
  })
}

/// One property injection per name across the ancestor chain. A later
/// optional declaration replaces an earlier required one.
fn merge_property_injections(chain: &[InheritedMetadata]) -> Vec<(&InheritedMetadata, &PropertyInjection)> {
  let mut merged: Vec<(&InheritedMetadata, &PropertyInjection)> = Vec::new();
  for entry in chain {
    for injection in entry.metadata().property_injections() {
      let found = merged
        .iter()
        .position(|(_, existing)| existing.name() == injection.name());
      match found {
        None => merged.push((entry, injection)),
        Some(index) => {
          if !merged[index].1.is_optional() && injection.is_optional() {
            merged[index] = (entry, injection);
          }
        }
      }
    }
  }
  merged
}

/// Hooks de-duplicated by name. A name keeps the position of its first
/// declaration and runs the implementation of the most derived one.
fn merge_hooks(
  chain: &[InheritedMetadata],
  select: fn(&TypeMetadata) -> &[LifecycleHook],
) -> Vec<(InheritedMetadata, LifecycleHook)> {
  let mut merged: Vec<(InheritedMetadata, LifecycleHook)> = Vec::new();
  for entry in chain {
    for hook in select(&**entry.metadata()) {
      let found = merged
        .iter()
        .position(|(_, existing)| existing.name() == hook.name());
      match found {
        None => merged.push((entry.clone(), hook.clone())),
        Some(index) => merged[index] = (entry.clone(), hook.clone()),
      }
    }
  }
  merged
}

fn invoke_hooks(target: &dyn Any, hooks: &[(InheritedMetadata, LifecycleHook)]) -> Result<()> {
  for (entry, hook) in hooks {
    let part = project(entry, target)?;
    hook.invoke(part).map_err(|source| Error::Hook {
      owner: entry.metadata().key(),
      method: hook.name().to_owned(),
      source,
    })?;
  }
  Ok(())
}

pub(crate) fn run_pre_destroy(registry: &MetadataRegistry, target: &dyn Any) -> Result<()> {
  let chain = registry.inherited_metadata((*target).type_id());
  let hooks = merge_hooks(&chain, TypeMetadata::pre_destroy_methods);
  invoke_hooks(target, &hooks)
}
