//! Core data structures shared by injectors, mappings and the metadata registry.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Error, Result};

thread_local! {
  // Mappings currently producing a value on this thread, by address. A mapping
  // that re-enters its own production is part of a dependency cycle.
  static RESOLVING_STACK: RefCell<HashSet<usize>> = RefCell::new(HashSet::new());
}

/// An RAII guard that detects circular dependencies.
///
/// Entering registers a mapping as "producing" on the current thread. A second
/// entry for the same mapping before the first guard is dropped means the
/// object graph loops back on itself.
pub(crate) struct ResolutionGuard {
  slot: usize,
}

impl ResolutionGuard {
  pub(crate) fn enter(slot: usize, key: TypeKey) -> Result<Self> {
    let inserted = RESOLVING_STACK.with(|stack| stack.borrow_mut().insert(slot));
    if !inserted {
      return Err(Error::CircularDependency { key });
    }
    Ok(Self { slot })
  }
}

impl Drop for ResolutionGuard {
  fn drop(&mut self) {
    RESOLVING_STACK.with(|stack| {
      stack.borrow_mut().remove(&self.slot);
    });
  }
}

/// Opaque identifier of a declared concrete or abstract type.
///
/// Abstract types are trait objects, e.g. `TypeKey::of::<dyn Greeter>()`.
/// Equality and hashing only consider the underlying [`TypeId`]; the type name
/// is carried for diagnostics.
#[derive(Clone, Copy)]
pub struct TypeKey {
  id: TypeId,
  name: &'static str,
}

impl TypeKey {
  pub fn of<T: ?Sized + Any>() -> Self {
    Self {
      id: TypeId::of::<T>(),
      name: std::any::type_name::<T>(),
    }
  }

  pub fn id(&self) -> TypeId {
    self.id
  }

  pub fn name(&self) -> &'static str {
    self.name
  }
}

impl PartialEq for TypeKey {
  fn eq(&self, other: &Self) -> bool {
    self.id == other.id
  }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.id.hash(state);
  }
}

impl fmt::Debug for TypeKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "TypeKey({})", self.name)
  }
}

impl fmt::Display for TypeKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name)
  }
}

static NEXT_SEAL_KEY: AtomicU64 = AtomicU64::new(1);

/// Key returned by [`Mapping::seal`](crate::Mapping::seal).
///
/// Keys are unique for the lifetime of the process and cannot be cloned, so
/// only the holder of the key can unseal the mapping it was issued for.
#[derive(PartialEq, Eq)]
pub struct SealKey(u64);

impl SealKey {
  pub(crate) fn generate() -> Self {
    Self(NEXT_SEAL_KEY.fetch_add(1, Ordering::Relaxed))
  }

  pub(crate) fn id(&self) -> u64 {
    self.0
  }
}

impl fmt::Debug for SealKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("SealKey(..)")
  }
}
