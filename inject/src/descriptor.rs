//! Declarative module configuration applied to an injector in one step.

use std::any::Any;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::core::TypeKey;
use crate::error::Result;
use crate::injector::Injector;
use crate::instance::Instance;

type ValueFn = Arc<dyn Fn() -> Instance + Send + Sync>;
type SharedFactoryFn = Arc<dyn Fn(&Injector) -> Result<Instance> + Send + Sync>;

#[derive(Clone)]
enum Strategy {
  /// Replace any direct mapping with a singleton of the key itself.
  Bare,
  /// The key's own type; singleton unless told otherwise.
  Own,
  Type(TypeKey),
  Existing(TypeKey),
  Value(ValueFn),
  Factory(SharedFactoryFn),
}

/// One mapping instruction of a [`ModuleDescriptor`].
///
/// Without a `use_*` strategy the key is mapped to itself. Type and factory
/// strategies produce singletons unless `as_singleton(false)` is given.
#[derive(Clone)]
pub struct InjectionDescriptor {
  key: TypeKey,
  strategy: Strategy,
  singleton: bool,
  instantiate: bool,
}

impl InjectionDescriptor {
  /// The bare form: drops any direct mapping of `T` and maps it as a
  /// singleton. Never instantiated eagerly.
  pub fn of<T: ?Sized + Any>() -> Self {
    Self::with_strategy(TypeKey::of::<T>(), Strategy::Bare)
  }

  /// An explicit instruction for the key `T`.
  pub fn map<T: ?Sized + Any>() -> Self {
    Self::map_key(TypeKey::of::<T>())
  }

  pub fn map_key(key: TypeKey) -> Self {
    Self::with_strategy(key, Strategy::Own)
  }

  fn with_strategy(key: TypeKey, strategy: Strategy) -> Self {
    Self {
      key,
      strategy,
      singleton: true,
      instantiate: false,
    }
  }

  pub fn key(&self) -> TypeKey {
    self.key
  }

  pub fn is_instantiated(&self) -> bool {
    self.instantiate
  }

  /// Provides instances of `U`.
  pub fn use_type<U: Any>(mut self) -> Self {
    self.strategy = Strategy::Type(TypeKey::of::<U>());
    self
  }

  /// Forwards to the mapping of `U`.
  pub fn use_existing<U: ?Sized + Any>(mut self) -> Self {
    self.strategy = Strategy::Existing(TypeKey::of::<U>());
    self
  }

  /// Provides a fixed value. `make` runs once each time the descriptor is
  /// applied.
  pub fn use_value<V, F>(mut self, make: F) -> Self
  where
    V: Any,
    F: Fn() -> V + Send + Sync + 'static,
  {
    self.strategy = Strategy::Value(Arc::new(move || -> Instance { Instance::new(Rc::new(make())) }));
    self
  }

  /// Provides values from `factory`, called with the owning injector.
  pub fn use_factory<V, F>(mut self, factory: F) -> Self
  where
    V: Any,
    F: Fn(&Injector) -> Result<Rc<V>> + Send + Sync + 'static,
  {
    self.strategy = Strategy::Factory(Arc::new(move |injector: &Injector| -> Result<Instance> {
      factory(injector).map(Instance::new)
    }));
    self
  }

  pub fn as_singleton(mut self, singleton: bool) -> Self {
    self.singleton = singleton;
    self
  }

  /// Requests eager instantiation once the owning module is applied.
  pub fn instantiate(mut self, instantiate: bool) -> Self {
    self.instantiate = instantiate;
    self
  }

  /// Writes this instruction into `injector`.
  ///
  /// Returns the key when it asked for eager instantiation.
  pub fn apply(&self, injector: &Injector) -> Result<Option<TypeKey>> {
    let key = self.key;
    if let Strategy::Bare = self.strategy {
      if injector.has_direct_mapping_key(key)? {
        injector.unmap_key(key)?;
      }
      injector.map_key(key)?.as_singleton()?;
      return Ok(None);
    }

    let mapping = injector.map_key(key)?;
    match &self.strategy {
      Strategy::Bare => {}
      Strategy::Own => {
        if self.singleton {
          mapping.as_singleton()?;
        }
      }
      Strategy::Type(target) => {
        if self.singleton {
          mapping.to_singleton_key(*target)?;
        } else {
          mapping.to_type_key(*target)?;
        }
      }
      Strategy::Existing(target) => {
        mapping.to_existing_key(*target)?;
      }
      Strategy::Value(make) => {
        mapping.to_instance(make())?;
      }
      Strategy::Factory(factory) => {
        let factory = factory.clone();
        let factory = Rc::new(move |injector: &Injector| -> Result<Instance> { factory(injector) });
        mapping.set_factory(factory, self.singleton)?;
      }
    }

    Ok(self.instantiate.then_some(key))
  }
}

impl fmt::Debug for InjectionDescriptor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let strategy = match &self.strategy {
      Strategy::Bare => "bare".to_owned(),
      Strategy::Own => "own".to_owned(),
      Strategy::Type(target) => format!("type({})", target),
      Strategy::Existing(target) => format!("existing({})", target),
      Strategy::Value(_) => "value".to_owned(),
      Strategy::Factory(_) => "factory".to_owned(),
    };
    f.debug_struct("InjectionDescriptor")
      .field("key", &self.key)
      .field("strategy", &strategy)
      .field("singleton", &self.singleton)
      .field("instantiate", &self.instantiate)
      .finish()
  }
}

/// Configuration of one module: the modules it depends on and the mappings
/// it contributes to an injector.
///
/// A descriptor can be attached to a type with `TypeDeclaration::module` and
/// read back from its [`TypeMetadata`](crate::TypeMetadata).
#[derive(Clone, Debug, Default)]
pub struct ModuleDescriptor {
  requires: Vec<TypeKey>,
  mappings: Vec<InjectionDescriptor>,
}

impl ModuleDescriptor {
  pub fn new() -> Self {
    Self::default()
  }

  /// Declares a dependency on the module type `M`.
  pub fn requires<M: Any>(mut self) -> Self {
    self.requires.push(TypeKey::of::<M>());
    self
  }

  pub fn mapping(mut self, mapping: InjectionDescriptor) -> Self {
    self.mappings.push(mapping);
    self
  }

  pub fn required_modules(&self) -> &[TypeKey] {
    &self.requires
  }

  pub fn mappings(&self) -> &[InjectionDescriptor] {
    &self.mappings
  }

  /// Applies every mapping in order.
  ///
  /// Returns the keys to instantiate before the injector is considered ready,
  /// without duplicates.
  pub fn apply(&self, injector: &Injector) -> Result<Vec<TypeKey>> {
    let mut to_instantiate = Vec::new();
    for mapping in &self.mappings {
      if let Some(key) = mapping.apply(injector)? {
        if !to_instantiate.contains(&key) {
          to_instantiate.push(key);
        }
      }
    }
    Ok(to_instantiate)
  }
}
