//! The `MetadataRegistry`: per-type declarations driving construction,
//! property injection and lifecycle hooks.

mod data;
mod declare;

pub use data::{ConstructorArg, LifecycleHook, PropertyInjection, TypeMetadata};
pub use declare::{Arguments, Interfaces, TypeDeclaration};

use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

use crate::core::TypeKey;
use crate::descriptor::ModuleDescriptor;
use crate::error::{Error, Result};
use crate::instance::Instance;
use data::Setter;

pub(crate) type Constructor = Arc<dyn Fn(&mut Arguments) -> Result<Instance> + Send + Sync>;
pub(crate) type Caster = Arc<dyn Fn(&Instance) -> Option<Instance> + Send + Sync>;
pub(crate) type Projection = Arc<dyn Fn(&dyn Any) -> Option<&dyn Any> + Send + Sync>;

#[derive(Clone)]
pub(crate) struct Ancestor {
  pub(crate) key: TypeKey,
  pub(crate) project: Projection,
}

/// Raw declarations for one type, as written by a `TypeDeclaration`.
pub(crate) struct TypeRecord {
  key: TypeKey,
  constructor_arguments: Option<Vec<TypeKey>>,
  optional_constructor_arguments: Vec<usize>,
  property_injections: Vec<(String, TypeKey, Setter)>,
  optional_property_injections: Vec<String>,
  post_construct_methods: Vec<data::LifecycleHook>,
  pre_destroy_methods: Vec<data::LifecycleHook>,
  mapped_interfaces: Option<Vec<TypeKey>>,
  casts: HashMap<TypeId, Caster>,
  constructor: Option<Constructor>,
  parent: Option<Ancestor>,
  module_descriptor: Option<Arc<ModuleDescriptor>>,
}

impl TypeRecord {
  fn new(key: TypeKey, identity: Caster) -> Self {
    let mut casts = HashMap::new();
    casts.insert(key.id(), identity);
    Self {
      key,
      constructor_arguments: None,
      optional_constructor_arguments: Vec::new(),
      property_injections: Vec::new(),
      optional_property_injections: Vec::new(),
      post_construct_methods: Vec::new(),
      pre_destroy_methods: Vec::new(),
      mapped_interfaces: None,
      casts,
      constructor: None,
      parent: None,
      module_descriptor: None,
    }
  }

  pub(crate) fn set_constructor_arguments(&mut self, arguments: Vec<TypeKey>) -> Result<()> {
    if self.constructor_arguments.is_some() {
      return Err(Error::duplicate(self.key, "constructor arguments"));
    }
    self.constructor_arguments = Some(arguments);
    Ok(())
  }

  pub(crate) fn set_optional_constructor_argument(&mut self, index: usize) -> Result<()> {
    if self.optional_constructor_arguments.contains(&index) {
      return Err(Error::duplicate(
        self.key,
        format!("optional constructor argument {}", index),
      ));
    }
    self.optional_constructor_arguments.push(index);
    Ok(())
  }

  pub(crate) fn add_property_injection(&mut self, name: String, key: TypeKey, setter: Setter) -> Result<()> {
    if self.property_injections.iter().any(|(existing, ..)| *existing == name) {
      return Err(Error::duplicate(self.key, format!("property injection `{}`", name)));
    }
    self.property_injections.push((name, key, setter));
    Ok(())
  }

  pub(crate) fn set_optional_property_injection(&mut self, name: String) -> Result<()> {
    if self.optional_property_injections.contains(&name) {
      return Err(Error::duplicate(self.key, format!("optional property `{}`", name)));
    }
    self.optional_property_injections.push(name);
    Ok(())
  }

  pub(crate) fn add_post_construct_method(&mut self, hook: data::LifecycleHook) -> Result<()> {
    if self.post_construct_methods.iter().any(|h| h.name() == hook.name()) {
      return Err(Error::duplicate(
        self.key,
        format!("post-construct method `{}`", hook.name()),
      ));
    }
    self.post_construct_methods.push(hook);
    Ok(())
  }

  pub(crate) fn add_pre_destroy_method(&mut self, hook: data::LifecycleHook) -> Result<()> {
    if self.pre_destroy_methods.iter().any(|h| h.name() == hook.name()) {
      return Err(Error::duplicate(
        self.key,
        format!("pre-destroy method `{}`", hook.name()),
      ));
    }
    self.pre_destroy_methods.push(hook);
    Ok(())
  }

  pub(crate) fn set_mapped_interfaces(&mut self, interfaces: Vec<(TypeKey, Caster)>) -> Result<()> {
    if self.mapped_interfaces.is_some() {
      return Err(Error::duplicate(self.key, "mapped interfaces"));
    }
    let mut keys = Vec::with_capacity(interfaces.len());
    for (key, caster) in interfaces {
      if !keys.contains(&key) {
        keys.push(key);
      }
      self.casts.insert(key.id(), caster);
    }
    self.mapped_interfaces = Some(keys);
    Ok(())
  }

  pub(crate) fn set_constructor(&mut self, constructor: Constructor) -> Result<()> {
    if self.constructor.is_some() {
      return Err(Error::duplicate(self.key, "constructor"));
    }
    self.constructor = Some(constructor);
    Ok(())
  }

  pub(crate) fn set_parent(&mut self, parent: Ancestor) -> Result<()> {
    if self.parent.is_some() {
      return Err(Error::duplicate(self.key, "parent type"));
    }
    self.parent = Some(parent);
    Ok(())
  }

  pub(crate) fn set_module_descriptor(&mut self, descriptor: Arc<ModuleDescriptor>) -> Result<()> {
    if self.module_descriptor.is_some() {
      return Err(Error::duplicate(self.key, "module descriptor"));
    }
    self.module_descriptor = Some(descriptor);
    Ok(())
  }

  fn export(&self) -> TypeMetadata {
    let constructor_arguments = self
      .constructor_arguments
      .iter()
      .flatten()
      .enumerate()
      .map(|(index, key)| ConstructorArg {
        index,
        key: *key,
        is_optional: self.optional_constructor_arguments.contains(&index),
      })
      .collect();
    let property_injections = self
      .property_injections
      .iter()
      .map(|(name, key, setter)| {
        let is_optional = self.optional_property_injections.contains(name);
        PropertyInjection::new(name.clone(), *key, is_optional, setter.clone())
      })
      .collect();

    TypeMetadata {
      key: self.key,
      constructor_arguments,
      property_injections,
      post_construct_methods: self.post_construct_methods.clone(),
      pre_destroy_methods: self.pre_destroy_methods.clone(),
      mapped_interfaces: self.mapped_interfaces.clone().unwrap_or_default(),
      module_descriptor: self.module_descriptor.clone(),
      constructible: self.constructor.is_some(),
    }
  }
}

/// The metadata of one type an instance "is-a", together with the path that
/// reaches that type's part of the instance.
#[derive(Clone)]
pub struct InheritedMetadata {
  metadata: Arc<TypeMetadata>,
  path: Vec<Projection>,
}

impl InheritedMetadata {
  pub fn metadata(&self) -> &Arc<TypeMetadata> {
    &self.metadata
  }

  /// Steps from the runtime object down to the part declared by this entry.
  pub(crate) fn project<'a>(&self, object: &'a dyn Any) -> Option<&'a dyn Any> {
    let mut current = object;
    for step in &self.path {
      current = step(current)?;
    }
    Some(current)
  }
}

impl fmt::Debug for InheritedMetadata {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("InheritedMetadata")
      .field("key", &self.metadata.key())
      .field("depth", &self.path.len())
      .finish()
  }
}

/// Store of per-type declarations.
///
/// The registry is `Send + Sync` and is normally created once at startup,
/// wrapped in an `Arc` and handed to every [`Injector`](crate::Injector).
/// Declarations may be added from any thread; export views are built lazily
/// and memoized until the declared type changes again.
#[derive(Default)]
pub struct MetadataRegistry {
  records: DashMap<TypeId, TypeRecord>,
  exported: DashMap<TypeId, Arc<TypeMetadata>>,
  inherited: DashMap<TypeId, Arc<[InheritedMetadata]>>,
}

impl MetadataRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  // --- DECLARATION ---

  /// Starts (or continues) the declaration of `T`.
  pub fn declare<T: Any>(&self) -> TypeDeclaration<'_, T> {
    let key = TypeKey::of::<T>();
    self
      .records
      .entry(key.id())
      .or_insert_with(|| TypeRecord::new(key, declare::identity_caster::<T>()));
    self.invalidate();
    TypeDeclaration::new(self)
  }

  pub(crate) fn update<R>(&self, key: TypeKey, apply: impl FnOnce(&mut TypeRecord) -> Result<R>) -> Result<R> {
    let mut record = self
      .records
      .get_mut(&key.id())
      .ok_or(Error::UnregisteredMetadata { key })?;
    let result = apply(&mut record);
    drop(record);
    self.invalidate();
    result
  }

  fn invalidate(&self) {
    // Ancestor lists span several records, so any change drops every memo.
    self.exported.clear();
    self.inherited.clear();
  }

  /// Forgets every declaration.
  pub fn reset(&self) {
    self.records.clear();
    self.invalidate();
  }

  // --- LOOKUP ---

  pub fn has_metadata(&self, key: TypeKey) -> bool {
    self.records.contains_key(&key.id())
  }

  /// Returns the export view for `key`.
  pub fn type_descriptor(&self, key: TypeKey) -> Result<Arc<TypeMetadata>> {
    if let Some(found) = self.exported.get(&key.id()) {
      return Ok(found.clone());
    }
    let record = self
      .records
      .get(&key.id())
      .ok_or(Error::UnregisteredMetadata { key })?;
    let metadata = Arc::new(record.export());
    drop(record);
    self.exported.insert(key.id(), metadata.clone());
    Ok(metadata)
  }

  /// Every declared type a value of the runtime type `runtime` "is-a".
  ///
  /// The runtime type itself comes last, preceded by its declared ancestors
  /// with the root first. An undeclared runtime type has no entries.
  pub fn inherited_metadata(&self, runtime: TypeId) -> Arc<[InheritedMetadata]> {
    if let Some(found) = self.inherited.get(&runtime) {
      return found.clone();
    }

    let mut chain: Vec<InheritedMetadata> = Vec::new();
    let mut visited = HashSet::new();
    let mut path: Vec<Projection> = Vec::new();
    let mut current = Some(runtime);
    while let Some(id) = current.take() {
      if !visited.insert(id) {
        break;
      }
      let (key, parent) = match self.records.get(&id) {
        Some(record) => (record.key, record.parent.clone()),
        None => break,
      };
      let metadata = match self.type_descriptor(key) {
        Ok(metadata) => metadata,
        Err(_) => break,
      };
      chain.push(InheritedMetadata {
        metadata,
        path: path.clone(),
      });
      if let Some(parent) = parent {
        path.push(parent.project);
        current = Some(parent.key.id());
      }
    }
    chain.reverse();

    let chain: Arc<[InheritedMetadata]> = chain.into();
    self.inherited.insert(runtime, chain.clone());
    chain
  }

  /// Convenience form of [`inherited_metadata`](Self::inherited_metadata)
  /// for a live object.
  pub fn inherited_metadata_of(&self, object: &dyn Any) -> Arc<[InheritedMetadata]> {
    self.inherited_metadata((*object).type_id())
  }

  /// Whether `concrete` declared `interface` among its mapped interfaces.
  pub fn implements(&self, concrete: TypeKey, interface: TypeKey) -> bool {
    self
      .records
      .get(&concrete.id())
      .and_then(|record| {
        record
          .mapped_interfaces
          .as_ref()
          .map(|keys| keys.contains(&interface))
      })
      .unwrap_or(false)
  }

  // --- CRATE INTERNALS ---

  /// Re-views `instance` as `key`, if its concrete type allows it.
  pub(crate) fn cast(&self, instance: &Instance, key: TypeKey) -> Option<Instance> {
    if instance.key() == key {
      return Some(instance.clone());
    }
    let caster = self
      .records
      .get(&instance.runtime_type())
      .and_then(|record| record.casts.get(&key.id()).cloned())?;
    caster(instance)
  }

  /// Whether values of the concrete type `from` can be provided as `to`.
  pub(crate) fn can_cast(&self, from: TypeKey, to: TypeKey) -> bool {
    from == to
      || self
        .records
        .get(&from.id())
        .map(|record| record.casts.contains_key(&to.id()))
        .unwrap_or(false)
  }

  pub(crate) fn constructor(&self, key: TypeKey) -> Result<Constructor> {
    let record = self
      .records
      .get(&key.id())
      .ok_or(Error::UnregisteredMetadata { key })?;
    record
      .constructor
      .clone()
      .ok_or(Error::NotConstructible { key })
  }
}

impl fmt::Debug for MetadataRegistry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MetadataRegistry")
      .field("declared_types", &self.records.len())
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::instance::Injected;
  use std::rc::Rc;

  trait Shape {
    fn sides(&self) -> usize;
  }

  #[derive(Default)]
  struct Square;

  impl Shape for Square {
    fn sides(&self) -> usize {
      4
    }
  }

  #[derive(Default)]
  struct Base {
    label: Injected<String>,
  }

  #[derive(Default)]
  struct Derived {
    base: Base,
  }

  #[test]
  fn duplicate_fields_are_rejected() {
    let registry = MetadataRegistry::new();
    let declaration = registry
      .declare::<Square>()
      .constructor_arguments(Vec::new())
      .unwrap();
    assert!(matches!(
      declaration.constructor_arguments(Vec::new()),
      Err(Error::DuplicateRegistration { .. })
    ));
  }

  #[test]
  fn unknown_types_have_no_descriptor() {
    let registry = MetadataRegistry::new();
    assert!(!registry.has_metadata(TypeKey::of::<Square>()));
    assert!(matches!(
      registry.type_descriptor(TypeKey::of::<Square>()),
      Err(Error::UnregisteredMetadata { .. })
    ));
  }

  #[test]
  fn descriptors_are_memoized_until_redeclared() {
    let registry = MetadataRegistry::new();
    registry.declare::<Square>().default_constructor().unwrap();

    let first = registry.type_descriptor(TypeKey::of::<Square>()).unwrap();
    let second = registry.type_descriptor(TypeKey::of::<Square>()).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert!(first.is_constructible());

    registry
      .declare::<Square>()
      .interfaces(Interfaces::<Square>::new().with::<dyn Shape>(|s| s as Rc<dyn Shape>))
      .unwrap();
    let third = registry.type_descriptor(TypeKey::of::<Square>()).unwrap();
    assert!(!Arc::ptr_eq(&first, &third));
    assert_eq!(third.mapped_interfaces(), &[TypeKey::of::<dyn Shape>()]);
  }

  #[test]
  fn interfaces_drive_casts() {
    let registry = MetadataRegistry::new();
    registry
      .declare::<Square>()
      .interfaces(Interfaces::<Square>::new().with::<dyn Shape>(|s| s as Rc<dyn Shape>))
      .unwrap();

    assert!(registry.implements(TypeKey::of::<Square>(), TypeKey::of::<dyn Shape>()));
    assert!(registry.can_cast(TypeKey::of::<Square>(), TypeKey::of::<dyn Shape>()));
    assert!(!registry.can_cast(TypeKey::of::<dyn Shape>(), TypeKey::of::<Square>()));

    let instance = Instance::new(Rc::new(Square));
    let shape = registry.cast(&instance, TypeKey::of::<dyn Shape>()).unwrap();
    assert_eq!(shape.downcast::<dyn Shape>().unwrap().sides(), 4);
    assert!(shape.same_object(&instance));
  }

  #[test]
  fn inherited_metadata_lists_root_first() {
    let registry = MetadataRegistry::new();
    registry
      .declare::<Base>()
      .property::<String>("label", |base| &base.label)
      .unwrap();
    registry
      .declare::<Derived>()
      .extends::<Base>(|derived| &derived.base)
      .unwrap();

    let derived = Derived::default();
    let chain = registry.inherited_metadata_of(&derived);
    let keys: Vec<TypeKey> = chain.iter().map(|entry| entry.metadata().key()).collect();
    assert_eq!(keys, vec![TypeKey::of::<Base>(), TypeKey::of::<Derived>()]);

    let base_part = chain[0].project(&derived).unwrap();
    assert!(base_part.downcast_ref::<Base>().is_some());
  }

  #[test]
  fn reset_forgets_declarations() {
    let registry = MetadataRegistry::new();
    registry.declare::<Square>();
    assert!(registry.has_metadata(TypeKey::of::<Square>()));
    registry.reset();
    assert!(!registry.has_metadata(TypeKey::of::<Square>()));
  }

  #[test]
  fn missing_constructor_is_reported() {
    let registry = MetadataRegistry::new();
    registry.declare::<Base>();
    assert!(matches!(
      registry.constructor(TypeKey::of::<Base>()),
      Err(Error::NotConstructible { .. })
    ));
    assert!(matches!(
      registry.constructor(TypeKey::of::<Square>()),
      Err(Error::UnregisteredMetadata { .. })
    ));
  }
}
