//! Value provider strategies backing a [`Mapping`](crate::Mapping).

use std::fmt;
use std::rc::Rc;

use once_cell::unsync::OnceCell;

use crate::core::TypeKey;
use crate::error::Result;
use crate::injector::{Injector, PostConstruct};
use crate::instance::Instance;

/// A type-erased factory invoked with the injector owning the mapping.
pub(crate) type FactoryFn = Rc<dyn Fn(&Injector) -> Result<Instance>>;

/// The strategy a mapping uses to produce its value.
///
/// Providers never call back into an injector themselves. A mapping asks for
/// a [`Production`] plan, carries it out without holding any borrow of the
/// provider, then hands cacheable results back through [`Provider::store`].
pub(crate) enum Provider {
  /// A new instance of `target` for every request.
  Class { target: TypeKey },
  /// One lazily constructed instance of `target`, with deferred post-construct.
  Singleton {
    target: TypeKey,
    cell: OnceCell<Instance>,
  },
  /// A fixed value; `None` once released.
  Value { value: Option<Instance> },
  /// Forwards to whatever the owning injector resolves for `target`.
  Existing { target: TypeKey },
  /// Calls `factory` per request, or once when `singleton` is set.
  Factory {
    factory: FactoryFn,
    singleton: bool,
    cell: OnceCell<Instance>,
  },
}

/// What a mapping must do to obtain its next value.
pub(crate) enum Production {
  Ready(Instance),
  Construct {
    target: TypeKey,
    post_construct: PostConstruct,
  },
  Forward { target: TypeKey },
  Invoke { factory: FactoryFn },
}

impl Provider {
  pub(crate) fn class(target: TypeKey) -> Self {
    Provider::Class { target }
  }

  pub(crate) fn singleton(target: TypeKey) -> Self {
    Provider::Singleton {
      target,
      cell: OnceCell::new(),
    }
  }

  pub(crate) fn value(value: Instance) -> Self {
    Provider::Value { value: Some(value) }
  }

  pub(crate) fn existing(target: TypeKey) -> Self {
    Provider::Existing { target }
  }

  pub(crate) fn factory(factory: FactoryFn, singleton: bool) -> Self {
    Provider::Factory {
      factory,
      singleton,
      cell: OnceCell::new(),
    }
  }

  /// `None` means the provider was released and has nothing left to give.
  pub(crate) fn plan(&self) -> Option<Production> {
    let production = match self {
      Provider::Class { target } => Production::Construct {
        target: *target,
        post_construct: PostConstruct::Immediate,
      },
      Provider::Singleton { target, cell } => match cell.get() {
        Some(instance) => Production::Ready(instance.clone()),
        None => Production::Construct {
          target: *target,
          post_construct: PostConstruct::Deferred,
        },
      },
      Provider::Value { value } => Production::Ready(value.clone()?),
      Provider::Existing { target } => Production::Forward { target: *target },
      Provider::Factory {
        factory,
        singleton,
        cell,
      } => match cell.get() {
        Some(instance) if *singleton => Production::Ready(instance.clone()),
        _ => Production::Invoke {
          factory: factory.clone(),
        },
      },
    };
    Some(production)
  }

  /// Keeps a freshly produced value if this provider caches.
  pub(crate) fn store(&self, instance: &Instance) {
    match self {
      Provider::Singleton { cell, .. }
      | Provider::Factory {
        cell, singleton: true, ..
      } => {
        let _ = cell.set(instance.clone());
      }
      _ => {}
    }
  }

  /// Drops everything this provider holds.
  ///
  /// Returns the cached singleton, whose pre-destroy hooks are the caller's
  /// responsibility.
  pub(crate) fn release(&mut self) -> Option<Instance> {
    match self {
      Provider::Singleton { cell, .. } => cell.take(),
      Provider::Value { value } => {
        value.take();
        None
      }
      Provider::Factory { cell, .. } => {
        cell.take();
        None
      }
      Provider::Class { .. } | Provider::Existing { .. } => None,
    }
  }

  /// Whether this is the class provider a fresh mapping of `key` starts with.
  pub(crate) fn is_default_for(&self, key: TypeKey) -> bool {
    matches!(self, Provider::Class { target } if *target == key)
  }

  pub(crate) fn kind(&self) -> &'static str {
    match self {
      Provider::Class { .. } => "class",
      Provider::Singleton { .. } => "singleton",
      Provider::Value { .. } => "value",
      Provider::Existing { .. } => "existing",
      Provider::Factory { singleton: true, .. } => "singleton factory",
      Provider::Factory { .. } => "factory",
    }
  }
}

impl fmt::Debug for Provider {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Provider::Class { target } => f.debug_struct("Class").field("target", target).finish(),
      Provider::Singleton { target, cell } => f
        .debug_struct("Singleton")
        .field("target", target)
        .field("initialized", &cell.get().is_some())
        .finish(),
      Provider::Value { value } => f.debug_struct("Value").field("value", value).finish(),
      Provider::Existing { target } => f.debug_struct("Existing").field("target", target).finish(),
      Provider::Factory { singleton, cell, .. } => f
        .debug_struct("Factory")
        .field("singleton", singleton)
        .field("initialized", &cell.get().is_some())
        .finish_non_exhaustive(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  struct Thing;

  #[test]
  fn singleton_plans_construction_until_stored() {
    let key = TypeKey::of::<Thing>();
    let provider = Provider::singleton(key);
    assert!(matches!(
      provider.plan(),
      Some(Production::Construct {
        post_construct: PostConstruct::Deferred,
        ..
      })
    ));

    let instance = Instance::new(Rc::new(Thing));
    provider.store(&instance);
    match provider.plan() {
      Some(Production::Ready(ready)) => assert!(ready.same_object(&instance)),
      _ => panic!("expected the cached singleton"),
    }
  }

  #[test]
  fn class_provider_never_caches() {
    let key = TypeKey::of::<Thing>();
    let provider = Provider::class(key);
    provider.store(&Instance::new(Rc::new(Thing)));
    assert!(matches!(
      provider.plan(),
      Some(Production::Construct {
        post_construct: PostConstruct::Immediate,
        ..
      })
    ));
    assert!(provider.is_default_for(key));
  }

  #[test]
  fn released_value_is_gone() {
    let mut provider = Provider::value(Instance::new(Rc::new(Thing)));
    assert!(provider.release().is_none());
    assert!(provider.plan().is_none());
  }

  #[test]
  fn released_singleton_is_handed_back() {
    let mut provider = Provider::singleton(TypeKey::of::<Thing>());
    provider.store(&Instance::new(Rc::new(Thing)));
    assert!(provider.release().is_some());
    assert!(provider.release().is_none());
  }
}
