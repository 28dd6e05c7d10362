//! Type-erased values produced by providers and the slots they are injected into.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::core::TypeKey;

/// A value handed out by an injector.
///
/// An instance carries two handles to the same allocation: the concrete
/// object (used for lifecycle hooks and property injection) and a view typed
/// as the mapping key it was requested under, which may be a trait object.
#[derive(Clone)]
pub struct Instance {
  object: Rc<dyn Any>,
  view: Rc<dyn Any>,
  key: TypeKey,
}

impl Instance {
  /// Wraps a concrete value; the view is the value's own type.
  pub fn new<T: Any>(value: Rc<T>) -> Self {
    Self {
      object: value.clone(),
      view: Rc::new(value),
      key: TypeKey::of::<T>(),
    }
  }

  /// Re-types this instance under another view of the same object.
  pub(crate) fn with_view<V: ?Sized + Any>(&self, view: Rc<V>) -> Self {
    Self {
      object: self.object.clone(),
      view: Rc::new(view),
      key: TypeKey::of::<V>(),
    }
  }

  /// The type this instance is currently viewed as.
  pub fn key(&self) -> TypeKey {
    self.key
  }

  /// The concrete object behind the view.
  pub fn object(&self) -> &Rc<dyn Any> {
    &self.object
  }

  /// The `TypeId` of the concrete object.
  pub fn runtime_type(&self) -> TypeId {
    (*self.object).type_id()
  }

  /// Returns the view as `Rc<T>` if `T` is the type this instance is viewed as.
  pub fn downcast<T: ?Sized + Any>(&self) -> Option<Rc<T>> {
    self.view.downcast_ref::<Rc<T>>().cloned()
  }

  /// Whether both instances share the same underlying object.
  pub fn same_object(&self, other: &Instance) -> bool {
    Rc::as_ptr(&self.object) as *const () == Rc::as_ptr(&other.object) as *const ()
  }
}

impl fmt::Debug for Instance {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Instance")
      .field("key", &self.key)
      .finish_non_exhaustive()
  }
}

/// A property slot filled by [`Injector::inject_into`](crate::Injector::inject_into).
///
/// Declared on a type with `TypeDeclaration::property`, the slot stays empty
/// until the owning instance passes through an injector.
pub struct Injected<T: ?Sized> {
  slot: RefCell<Option<Rc<T>>>,
}

impl<T: ?Sized> Injected<T> {
  pub fn new() -> Self {
    Self {
      slot: RefCell::new(None),
    }
  }

  pub fn get(&self) -> Option<Rc<T>> {
    self.slot.borrow().clone()
  }

  pub fn is_set(&self) -> bool {
    self.slot.borrow().is_some()
  }

  pub(crate) fn set(&self, value: Rc<T>) {
    *self.slot.borrow_mut() = Some(value);
  }
}

impl<T: ?Sized> Default for Injected<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T: ?Sized> fmt::Debug for Injected<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Injected")
      .field("is_set", &self.is_set())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  trait Named {
    fn name(&self) -> &str;
  }

  struct Widget;

  impl Named for Widget {
    fn name(&self) -> &str {
      "widget"
    }
  }

  #[test]
  fn views_share_the_object() {
    let instance = Instance::new(Rc::new(Widget));
    let widget = instance.downcast::<Widget>().unwrap();
    let named = instance.with_view(widget.clone() as Rc<dyn Named>);

    assert_eq!(named.key(), TypeKey::of::<dyn Named>());
    assert_eq!(named.downcast::<dyn Named>().unwrap().name(), "widget");
    assert!(named.downcast::<Widget>().is_none());
    assert!(named.same_object(&instance));
    assert_eq!(named.runtime_type(), TypeId::of::<Widget>());
  }

  #[test]
  fn injected_slot_starts_empty() {
    let slot: Injected<dyn Named> = Injected::default();
    assert!(!slot.is_set());
    slot.set(Rc::new(Widget));
    assert_eq!(slot.get().unwrap().name(), "widget");
  }
}
