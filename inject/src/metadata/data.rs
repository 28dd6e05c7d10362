//! Export views of declared type metadata.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::core::TypeKey;
use crate::descriptor::ModuleDescriptor;
use crate::error::{HookError, Result};
use crate::instance::Instance;

pub(crate) type Setter = Arc<dyn Fn(&dyn Any, &Instance) -> Result<()> + Send + Sync>;
pub(crate) type HookFn = Arc<dyn Fn(&dyn Any) -> Result<(), HookError> + Send + Sync>;

/// One injectable constructor parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstructorArg {
  pub index: usize,
  pub key: TypeKey,
  /// An optional argument receives `None` instead of failing when unmapped.
  pub is_optional: bool,
}

/// A property that receives its value from an injector.
#[derive(Clone)]
pub struct PropertyInjection {
  name: String,
  key: TypeKey,
  is_optional: bool,
  setter: Setter,
}

impl PropertyInjection {
  pub(crate) fn new(name: String, key: TypeKey, is_optional: bool, setter: Setter) -> Self {
    Self {
      name,
      key,
      is_optional,
      setter,
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn key(&self) -> TypeKey {
    self.key
  }

  pub fn is_optional(&self) -> bool {
    self.is_optional
  }

  pub(crate) fn inject(&self, target: &dyn Any, value: &Instance) -> Result<()> {
    (self.setter)(target, value)
  }
}

impl fmt::Debug for PropertyInjection {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("PropertyInjection")
      .field("name", &self.name)
      .field("key", &self.key)
      .field("is_optional", &self.is_optional)
      .finish_non_exhaustive()
  }
}

/// A named post-construct or pre-destroy method.
#[derive(Clone)]
pub struct LifecycleHook {
  name: String,
  call: HookFn,
}

impl LifecycleHook {
  pub(crate) fn new(name: String, call: HookFn) -> Self {
    Self { name, call }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub(crate) fn invoke(&self, target: &dyn Any) -> Result<(), HookError> {
    (self.call)(target)
  }
}

impl fmt::Debug for LifecycleHook {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("LifecycleHook").field(&self.name).finish()
  }
}

/// Immutable view of everything declared for one type.
///
/// Built lazily from the raw declarations by
/// [`MetadataRegistry::type_descriptor`](crate::MetadataRegistry::type_descriptor)
/// and memoized until the type is declared again.
#[derive(Clone)]
pub struct TypeMetadata {
  pub(crate) key: TypeKey,
  pub(crate) constructor_arguments: Vec<ConstructorArg>,
  pub(crate) property_injections: Vec<PropertyInjection>,
  pub(crate) post_construct_methods: Vec<LifecycleHook>,
  pub(crate) pre_destroy_methods: Vec<LifecycleHook>,
  pub(crate) mapped_interfaces: Vec<TypeKey>,
  pub(crate) module_descriptor: Option<Arc<ModuleDescriptor>>,
  pub(crate) constructible: bool,
}

impl TypeMetadata {
  pub fn key(&self) -> TypeKey {
    self.key
  }

  pub fn constructor_arguments(&self) -> &[ConstructorArg] {
    &self.constructor_arguments
  }

  pub fn property_injections(&self) -> &[PropertyInjection] {
    &self.property_injections
  }

  pub fn post_construct_methods(&self) -> &[LifecycleHook] {
    &self.post_construct_methods
  }

  pub fn pre_destroy_methods(&self) -> &[LifecycleHook] {
    &self.pre_destroy_methods
  }

  pub fn mapped_interfaces(&self) -> &[TypeKey] {
    &self.mapped_interfaces
  }

  pub fn module_descriptor(&self) -> Option<&ModuleDescriptor> {
    self.module_descriptor.as_deref()
  }

  /// Whether a constructor was declared for the type.
  pub fn is_constructible(&self) -> bool {
    self.constructible
  }
}

impl fmt::Debug for TypeMetadata {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("TypeMetadata")
      .field("key", &self.key)
      .field("constructor_arguments", &self.constructor_arguments)
      .field("property_injections", &self.property_injections)
      .field("post_construct_methods", &self.post_construct_methods)
      .field("pre_destroy_methods", &self.pre_destroy_methods)
      .field("mapped_interfaces", &self.mapped_interfaces)
      .field("has_module_descriptor", &self.module_descriptor.is_some())
      .finish()
  }
}
