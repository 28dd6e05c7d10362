//! A single type-to-provider binding owned by one injector.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::mem;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use tracing::{trace, warn};

use crate::core::{ResolutionGuard, SealKey, TypeKey};
use crate::error::{Error, Result, Subject};
use crate::injector::{self, Injector, InjectorInner};
use crate::instance::Instance;
use crate::metadata::MetadataRegistry;
use crate::provider::{FactoryFn, Production, Provider};

/// A handle to one binding inside an [`Injector`].
///
/// Obtained from [`Injector::map`] or [`Injector::get_mapping`]. Handles are
/// cheap to clone and all clones refer to the same binding. Provider-changing
/// methods return `&Self` so a binding reads as one chain:
///
/// ```
/// # use fibre_inject::Injector;
/// # struct Config { name: &'static str }
/// # fn main() -> fibre_inject::Result<()> {
/// let injector = Injector::builder().build();
/// let key = injector
///   .map::<Config>()?
///   .to_value(std::rc::Rc::new(Config { name: "prod" }))?
///   .seal()?;
///
/// assert_eq!(injector.get::<Config>()?.name, "prod");
/// assert!(injector.unmap::<Config>().is_err());
///
/// injector.get_mapping::<Config>()?.unseal(&key)?;
/// injector.unmap::<Config>()?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Mapping {
  inner: Rc<MappingInner>,
}

struct MappingInner {
  key: TypeKey,
  owner: Weak<InjectorInner>,
  registry: Arc<MetadataRegistry>,
  master: u64,
  state: RefCell<MappingState>,
}

struct MappingState {
  provider: Provider,
  seal: Option<u64>,
  destroyed: bool,
}

impl Mapping {
  pub(crate) fn new(key: TypeKey, owner: &Injector, provider: Provider) -> Self {
    Self {
      inner: Rc::new(MappingInner {
        key,
        owner: owner.downgrade(),
        registry: owner.registry().clone(),
        master: owner.master_key().id(),
        state: RefCell::new(MappingState {
          provider,
          seal: None,
          destroyed: false,
        }),
      }),
    }
  }

  /// Creates a mapping sealed with a key nobody holds; only the owning
  /// injector's master key can unseal it.
  pub(crate) fn new_sealed(key: TypeKey, owner: &Injector, provider: Provider) -> Self {
    let mapping = Self::new(key, owner, provider);
    mapping.inner.state.borrow_mut().seal = Some(SealKey::generate().id());
    mapping
  }

  pub fn key(&self) -> TypeKey {
    self.inner.key
  }

  pub fn is_sealed(&self) -> bool {
    self.inner.state.borrow().seal.is_some()
  }

  pub fn is_destroyed(&self) -> bool {
    self.inner.state.borrow().destroyed
  }

  pub fn ptr_eq(&self, other: &Mapping) -> bool {
    Rc::ptr_eq(&self.inner, &other.inner)
  }

  // --- PROVIDER SELECTION ---

  /// Makes the mapping return one lazily constructed instance of its own type.
  pub fn as_singleton(&self) -> Result<&Self> {
    self.set_provider(Provider::singleton(self.inner.key))
  }

  /// Makes the mapping construct a new `U` for every request.
  pub fn to_type<U: Any>(&self) -> Result<&Self> {
    self.to_type_key(TypeKey::of::<U>())
  }

  pub fn to_type_key(&self, target: TypeKey) -> Result<&Self> {
    self.check_binding(target)?;
    self.set_provider(Provider::class(target))
  }

  /// Makes the mapping return one lazily constructed `U`.
  pub fn to_singleton<U: Any>(&self) -> Result<&Self> {
    self.to_singleton_key(TypeKey::of::<U>())
  }

  pub fn to_singleton_key(&self, target: TypeKey) -> Result<&Self> {
    self.check_binding(target)?;
    self.set_provider(Provider::singleton(target))
  }

  /// Makes the mapping return `value` for every request.
  pub fn to_value<V: Any>(&self, value: Rc<V>) -> Result<&Self> {
    self.to_instance(Instance::new(value))
  }

  pub fn to_instance(&self, value: Instance) -> Result<&Self> {
    let key = self.inner.key;
    let value = self
      .inner
      .registry
      .cast(&value, key)
      .ok_or(Error::IncompatibleBinding {
        key,
        target: value.key(),
      })?;
    self.set_provider(Provider::value(value))
  }

  /// Makes the mapping forward to whatever the owning injector resolves for `U`.
  pub fn to_existing<U: ?Sized + Any>(&self) -> Result<&Self> {
    self.to_existing_key(TypeKey::of::<U>())
  }

  pub fn to_existing_key(&self, target: TypeKey) -> Result<&Self> {
    self.set_provider(Provider::existing(target))
  }

  /// Makes the mapping call `factory` with the owning injector on every request.
  pub fn to_factory<V, F>(&self, factory: F) -> Result<&Self>
  where
    V: Any,
    F: Fn(&Injector) -> Result<Rc<V>> + 'static,
  {
    self.check_binding(TypeKey::of::<V>())?;
    self.set_factory(erase_factory(factory), false)
  }

  /// Like [`to_factory`](Self::to_factory), but the first result is kept.
  pub fn to_singleton_factory<V, F>(&self, factory: F) -> Result<&Self>
  where
    V: Any,
    F: Fn(&Injector) -> Result<Rc<V>> + 'static,
  {
    self.check_binding(TypeKey::of::<V>())?;
    self.set_factory(erase_factory(factory), true)
  }

  pub(crate) fn set_factory(&self, factory: FactoryFn, singleton: bool) -> Result<&Self> {
    self.set_provider(Provider::factory(factory, singleton))
  }

  // --- SEALING ---

  /// Seals the mapping against provider changes and removal.
  ///
  /// The returned key, or the owning injector's master key, unseals it.
  pub fn seal(&self) -> Result<SealKey> {
    let key = self.inner.key;
    let mut state = self.inner.state.borrow_mut();
    if state.destroyed {
      return Err(Error::AlreadyDestroyed(Subject::Mapping(key)));
    }
    if state.seal.is_some() {
      return Err(Error::SealedOverride { key });
    }
    let seal = SealKey::generate();
    state.seal = Some(seal.id());
    Ok(seal)
  }

  pub fn unseal(&self, seal: &SealKey) -> Result<&Self> {
    let key = self.inner.key;
    let mut state = self.inner.state.borrow_mut();
    let current = state.seal;
    match current {
      None => Err(Error::NotSealed { key }),
      Some(own) if own == seal.id() || self.inner.master == seal.id() => {
        state.seal = None;
        Ok(self)
      }
      Some(_) => Err(Error::InvalidUnsealKey { key }),
    }
  }

  // --- VALUE ---

  /// Produces the value of this mapping, viewed as the mapping's key.
  pub fn get_injected_value(&self) -> Result<Instance> {
    let key = self.inner.key;
    let owner = self.owner()?;
    let _operation = owner.begin();
    let _guard = ResolutionGuard::enter(Rc::as_ptr(&self.inner) as usize, key)?;

    let production = {
      let state = self.inner.state.borrow();
      if state.destroyed {
        return Err(Error::AlreadyDestroyed(Subject::Mapping(key)));
      }
      state
        .provider
        .plan()
        .ok_or(Error::AlreadyDestroyed(Subject::Mapping(key)))?
    };

    let produced = match production {
      Production::Ready(instance) => return Ok(instance),
      Production::Construct {
        target,
        post_construct,
      } => owner.instantiate_key(target, post_construct)?,
      Production::Forward { target } => owner.get_instance(target)?,
      Production::Invoke { factory } => factory(&owner)?,
    };

    let instance = self
      .inner
      .registry
      .cast(&produced, key)
      .ok_or(Error::IncompatibleBinding {
        key,
        target: produced.key(),
      })?;
    self.inner.state.borrow().provider.store(&instance);
    trace!(key = %key, "mapping produced a value");
    Ok(instance)
  }

  // --- TEARDOWN ---

  /// Releases the provider and marks the mapping destroyed.
  ///
  /// A cached singleton has its pre-destroy hooks run. Destroying twice, or
  /// destroying a sealed mapping, fails.
  pub fn destroy(&self) -> Result<()> {
    let key = self.inner.key;
    let released = {
      let mut state = self.inner.state.borrow_mut();
      if state.destroyed {
        return Err(Error::AlreadyDestroyed(Subject::Mapping(key)));
      }
      if state.seal.is_some() {
        return Err(Error::SealedOverride { key });
      }
      state.destroyed = true;
      state.provider.release()
    };
    match released {
      Some(instance) => injector::run_pre_destroy(&self.inner.registry, &**instance.object()),
      None => Ok(()),
    }
  }

  // --- PRIVATE HELPERS ---

  fn owner(&self) -> Result<Injector> {
    self
      .inner
      .owner
      .upgrade()
      .map(Injector::from_inner)
      .ok_or(Error::AlreadyDestroyed(Subject::Injector))
  }

  fn check_binding(&self, target: TypeKey) -> Result<()> {
    let key = self.inner.key;
    if self.inner.registry.can_cast(target, key) {
      Ok(())
    } else {
      Err(Error::IncompatibleBinding { key, target })
    }
  }

  fn set_provider(&self, provider: Provider) -> Result<&Self> {
    let key = self.inner.key;
    let released = {
      let mut state = self.inner.state.borrow_mut();
      if state.destroyed {
        return Err(Error::AlreadyDestroyed(Subject::Mapping(key)));
      }
      if state.seal.is_some() {
        return Err(Error::SealedOverride { key });
      }
      if !state.provider.is_default_for(key) {
        warn!(
          key = %key,
          previous = state.provider.kind(),
          next = provider.kind(),
          "provider of an existing mapping is being overridden; unmap it first if this is intended"
        );
      }
      let mut previous = mem::replace(&mut state.provider, provider);
      previous.release()
    };
    if let Some(instance) = released {
      injector::run_pre_destroy(&self.inner.registry, &**instance.object())?;
    }
    Ok(self)
  }
}

fn erase_factory<V, F>(factory: F) -> FactoryFn
where
  V: Any,
  F: Fn(&Injector) -> Result<Rc<V>> + 'static,
{
  Rc::new(move |injector: &Injector| -> Result<Instance> { factory(injector).map(Instance::new) })
}

impl fmt::Debug for Mapping {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = self.inner.state.borrow();
    f.debug_struct("Mapping")
      .field("key", &self.inner.key)
      .field("provider", &state.provider)
      .field("sealed", &state.seal.is_some())
      .field("destroyed", &state.destroyed)
      .finish()
  }
}
