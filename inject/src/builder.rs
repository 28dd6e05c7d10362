use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::injector::Injector;
use crate::listener::MappingListener;
use crate::metadata::MetadataRegistry;
use crate::scheduler::{Scheduler, TickQueue};

/// What `Injector::destroy` does when tearing down one mapping fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TeardownPolicy {
  /// Keep tearing down the remaining mappings, then report the first failure.
  /// The injector ends up destroyed either way.
  #[default]
  BestEffort,
  /// Stop at the first failure. The injector stays live, with the mappings
  /// that were already torn down removed.
  FailFast,
}

/// A builder for creating root [`Injector`] instances.
///
/// Sub-injectors created from the result share its registry, scheduler and
/// teardown policy. Listeners are not shared.
pub struct InjectorBuilder {
  registry: Option<Arc<MetadataRegistry>>,
  scheduler: Option<Rc<dyn Scheduler>>,
  teardown: TeardownPolicy,
  listeners: Vec<Rc<dyn MappingListener>>,
}

impl fmt::Debug for InjectorBuilder {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("InjectorBuilder")
      .field("has_registry", &self.registry.is_some())
      .field("has_scheduler", &self.scheduler.is_some())
      .field("teardown", &self.teardown)
      .field("listeners", &self.listeners.len())
      .finish_non_exhaustive()
  }
}

impl Default for InjectorBuilder {
  fn default() -> Self {
    Self::new()
  }
}

impl InjectorBuilder {
  pub fn new() -> Self {
    Self {
      registry: None,
      scheduler: None,
      teardown: TeardownPolicy::default(),
      listeners: Vec::new(),
    }
  }

  /// Sets the metadata registry. Defaults to a fresh, empty registry.
  pub fn registry(mut self, registry: Arc<MetadataRegistry>) -> Self {
    self.registry = Some(registry);
    self
  }

  /// Sets the scheduler receiving deferred post-construct hooks.
  ///
  /// Defaults to a [`TickQueue`] drained whenever the outermost injector call
  /// returns. With a custom scheduler, deferred hooks run whenever that
  /// scheduler decides to.
  pub fn scheduler(mut self, scheduler: Rc<dyn Scheduler>) -> Self {
    self.scheduler = Some(scheduler);
    self
  }

  pub fn teardown(mut self, policy: TeardownPolicy) -> Self {
    self.teardown = policy;
    self
  }

  /// Registers a listener for mapping events of the root injector.
  pub fn listener<Listener>(mut self, listener: Listener) -> Self
  where
    Listener: MappingListener + 'static,
  {
    self.listeners.push(Rc::new(listener));
    self
  }

  pub fn build(self) -> Injector {
    let registry = self
      .registry
      .unwrap_or_else(|| Arc::new(MetadataRegistry::new()));
    let scheduler = self
      .scheduler
      .unwrap_or_else(|| Rc::new(TickQueue::new()) as Rc<dyn Scheduler>);
    Injector::create(registry, scheduler, self.teardown, self.listeners)
  }
}
