//! Typed declaration surface used to describe how a type is injected.

use std::any::{type_name, Any};
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;

use super::data::{ConstructorArg, HookFn, LifecycleHook, Setter};
use super::{Ancestor, Caster, Constructor, MetadataRegistry, Projection};
use crate::core::TypeKey;
use crate::descriptor::ModuleDescriptor;
use crate::error::{Error, HookError, Result};
use crate::instance::{Injected, Instance};

/// Builder returned by [`MetadataRegistry::declare`].
///
/// Every step is written to the registry immediately. Declaring the same
/// field twice fails with [`Error::DuplicateRegistration`], so a declaration
/// reads as a chain of `?`-terminated calls:
///
/// ```
/// use fibre_inject::{Injected, MetadataRegistry, TypeKey};
///
/// struct Engine;
/// struct Radio;
/// struct Car {
///   engine: std::rc::Rc<Engine>,
///   radio: Option<std::rc::Rc<Radio>>,
///   plate: Injected<String>,
/// }
///
/// # fn main() -> fibre_inject::Result<()> {
/// let registry = MetadataRegistry::new();
/// registry
///   .declare::<Car>()
///   .constructor_arguments([TypeKey::of::<Engine>(), TypeKey::of::<Radio>()])?
///   .optional_constructor_argument(1)?
///   .constructor(|args| {
///     Ok(Car {
///       engine: args.required::<Engine>()?,
///       radio: args.optional::<Radio>()?,
///       plate: Injected::new(),
///     })
///   })?
///   .property::<String>("plate", |car| &car.plate)?;
///
/// let meta = registry.type_descriptor(TypeKey::of::<Car>())?;
/// assert_eq!(meta.constructor_arguments().len(), 2);
/// assert!(meta.constructor_arguments()[1].is_optional);
/// # Ok(())
/// # }
/// ```
pub struct TypeDeclaration<'r, T> {
  registry: &'r MetadataRegistry,
  key: TypeKey,
  _marker: PhantomData<fn() -> T>,
}

impl<'r, T: Any> TypeDeclaration<'r, T> {
  pub(crate) fn new(registry: &'r MetadataRegistry) -> Self {
    Self {
      registry,
      key: TypeKey::of::<T>(),
      _marker: PhantomData,
    }
  }

  pub fn key(&self) -> TypeKey {
    self.key
  }

  /// Declares the injectable constructor parameters, in order.
  pub fn constructor_arguments<I>(self, arguments: I) -> Result<Self>
  where
    I: IntoIterator<Item = TypeKey>,
  {
    let arguments: Vec<TypeKey> = arguments.into_iter().collect();
    self
      .registry
      .update(self.key, |record| record.set_constructor_arguments(arguments))?;
    Ok(self)
  }

  /// Marks the constructor parameter at `index` as optional.
  pub fn optional_constructor_argument(self, index: usize) -> Result<Self> {
    self
      .registry
      .update(self.key, |record| record.set_optional_constructor_argument(index))?;
    Ok(self)
  }

  /// Declares how an instance is built from its resolved constructor arguments.
  pub fn constructor<F>(self, constructor: F) -> Result<Self>
  where
    F: Fn(&mut Arguments) -> Result<T> + Send + Sync + 'static,
  {
    let constructor: Constructor = Arc::new(move |arguments: &mut Arguments| -> Result<Instance> {
      constructor(arguments).map(|value| Instance::new(Rc::new(value)))
    });
    self
      .registry
      .update(self.key, |record| record.set_constructor(constructor))?;
    Ok(self)
  }

  /// Declares a constructor without injected arguments.
  pub fn default_constructor(self) -> Result<Self>
  where
    T: Default,
  {
    self.constructor(|_| Ok(T::default()))
  }

  /// Declares a required property injection target.
  pub fn property<D: ?Sized + Any>(self, name: &str, accessor: fn(&T) -> &Injected<D>) -> Result<Self> {
    self.add_property(name, accessor, false)
  }

  /// Declares a property injection target that is left empty when unmapped.
  pub fn optional_property<D: ?Sized + Any>(
    self,
    name: &str,
    accessor: fn(&T) -> &Injected<D>,
  ) -> Result<Self> {
    self.add_property(name, accessor, true)
  }

  fn add_property<D: ?Sized + Any>(
    self,
    name: &str,
    accessor: fn(&T) -> &Injected<D>,
    optional: bool,
  ) -> Result<Self> {
    let setter: Setter = Arc::new(move |target: &dyn Any, value: &Instance| -> Result<()> {
      let target = target.downcast_ref::<T>().ok_or(Error::TypeMismatch {
        expected: TypeKey::of::<T>(),
      })?;
      let value = value.downcast::<D>().ok_or(Error::TypeMismatch {
        expected: TypeKey::of::<D>(),
      })?;
      accessor(target).set(value);
      Ok(())
    });
    let name = name.to_owned();
    self.registry.update(self.key, |record| {
      record.add_property_injection(name.clone(), TypeKey::of::<D>(), setter)?;
      if optional {
        record.set_optional_property_injection(name)?;
      }
      Ok(())
    })?;
    Ok(self)
  }

  /// Declares a method run once all injections of a new instance are filled.
  pub fn post_construct<F>(self, name: &str, hook: F) -> Result<Self>
  where
    F: Fn(&T) -> Result<(), HookError> + Send + Sync + 'static,
  {
    let hook = LifecycleHook::new(name.to_owned(), erase_hook(hook));
    self
      .registry
      .update(self.key, |record| record.add_post_construct_method(hook))?;
    Ok(self)
  }

  /// Declares a method run when an injector destroys the instance.
  pub fn pre_destroy<F>(self, name: &str, hook: F) -> Result<Self>
  where
    F: Fn(&T) -> Result<(), HookError> + Send + Sync + 'static,
  {
    let hook = LifecycleHook::new(name.to_owned(), erase_hook(hook));
    self
      .registry
      .update(self.key, |record| record.add_pre_destroy_method(hook))?;
    Ok(self)
  }

  /// Declares the abstract types this type can be provided as.
  pub fn interfaces(self, interfaces: Interfaces<T>) -> Result<Self> {
    self
      .registry
      .update(self.key, |record| record.set_mapped_interfaces(interfaces.entries))?;
    Ok(self)
  }

  /// Declares `B` as the ancestor of this type.
  ///
  /// `project` reaches the embedded `B` part of a `T`; property injections and
  /// lifecycle hooks declared for `B` are applied through it.
  pub fn extends<B: Any>(self, project: fn(&T) -> &B) -> Result<Self> {
    let ancestor = Ancestor {
      key: TypeKey::of::<B>(),
      project: projection(move |object| {
        object
          .downcast_ref::<T>()
          .map(|target| project(target) as &dyn Any)
      }),
    };
    self
      .registry
      .update(self.key, |record| record.set_parent(ancestor))?;
    Ok(self)
  }

  /// Attaches a module descriptor to the type.
  pub fn module(self, descriptor: ModuleDescriptor) -> Result<Self> {
    let descriptor = Arc::new(descriptor);
    self
      .registry
      .update(self.key, |record| record.set_module_descriptor(descriptor))?;
    Ok(self)
  }
}

fn projection<F>(project: F) -> Projection
where
  F: Fn(&dyn Any) -> Option<&dyn Any> + Send + Sync + 'static,
{
  Arc::new(project)
}

fn erase_hook<T: Any, F>(hook: F) -> HookFn
where
  F: Fn(&T) -> Result<(), HookError> + Send + Sync + 'static,
{
  Arc::new(move |target: &dyn Any| -> Result<(), HookError> {
    match target.downcast_ref::<T>() {
      Some(target) => hook(target),
      None => Err(format!("hook target is not a `{}`", type_name::<T>()).into()),
    }
  })
}

pub(crate) fn identity_caster<T: Any>() -> Caster {
  Arc::new(|instance: &Instance| -> Option<Instance> {
    let object = instance.object().clone().downcast::<T>().ok()?;
    Some(Instance::new(object))
  })
}

/// The closed set of abstract types a concrete `T` satisfies.
///
/// Each entry carries the unsizing conversion used when a `T` is provided
/// under the abstract key.
pub struct Interfaces<T> {
  entries: Vec<(TypeKey, Caster)>,
  _marker: PhantomData<fn() -> T>,
}

impl<T: Any> Interfaces<T> {
  pub fn new() -> Self {
    Self {
      entries: Vec::new(),
      _marker: PhantomData,
    }
  }

  pub fn with<I: ?Sized + Any>(mut self, convert: fn(Rc<T>) -> Rc<I>) -> Self {
    let caster: Caster = Arc::new(move |instance: &Instance| -> Option<Instance> {
      let object = instance.object().clone().downcast::<T>().ok()?;
      Some(instance.with_view(convert(object)))
    });
    self.entries.push((TypeKey::of::<I>(), caster));
    self
  }
}

impl<T: Any> Default for Interfaces<T> {
  fn default() -> Self {
    Self::new()
  }
}

/// Resolved constructor arguments, consumed in declaration order.
#[derive(Debug)]
pub struct Arguments {
  owner: TypeKey,
  values: std::vec::IntoIter<(ConstructorArg, Option<Instance>)>,
}

impl Arguments {
  pub(crate) fn new(owner: TypeKey, values: Vec<(ConstructorArg, Option<Instance>)>) -> Self {
    Self {
      owner,
      values: values.into_iter(),
    }
  }

  /// The type being constructed.
  pub fn owner(&self) -> TypeKey {
    self.owner
  }

  pub fn remaining(&self) -> usize {
    self.values.len()
  }

  /// Takes the next argument, which must be present.
  pub fn required<T: ?Sized + Any>(&mut self) -> Result<Rc<T>> {
    let key = TypeKey::of::<T>();
    self.next::<T>()?.ok_or(Error::UnknownMapping {
      key,
      required_by: Some(self.owner),
    })
  }

  /// Takes the next argument; `None` when it was optional and unmapped.
  pub fn optional<T: ?Sized + Any>(&mut self) -> Result<Option<Rc<T>>> {
    self.next::<T>()
  }

  fn next<T: ?Sized + Any>(&mut self) -> Result<Option<Rc<T>>> {
    let expected = TypeKey::of::<T>();
    let (argument, value) = self
      .values
      .next()
      .ok_or(Error::TypeMismatch { expected })?;
    if argument.key != expected {
      return Err(Error::TypeMismatch {
        expected: argument.key,
      });
    }
    match value {
      None => Ok(None),
      Some(instance) => instance
        .downcast::<T>()
        .map(Some)
        .ok_or(Error::TypeMismatch { expected }),
    }
  }
}
