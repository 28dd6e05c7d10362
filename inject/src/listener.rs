use std::fmt;

use crate::mapping::Mapping;

/// Describes a change to the mapping table of an injector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingEvent {
  /// A new mapping was added.
  Created,
  /// An existing, unsealed mapping is about to be replaced by `map`.
  Override,
  /// A mapping was removed and destroyed.
  Destroyed,
}

impl fmt::Display for MappingEvent {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      MappingEvent::Created => write!(f, "mapping created"),
      MappingEvent::Override => write!(f, "mapping overridden"),
      MappingEvent::Destroyed => write!(f, "mapping destroyed"),
    }
  }
}

/// A listener registered with an injector to observe its mapping table.
///
/// Notifications are delivered synchronously, after the table was updated
/// and before the triggering call returns. Listeners are per injector and are
/// not inherited by sub-injectors.
pub trait MappingListener {
  fn on_mapping_event(&self, event: MappingEvent, mapping: &Mapping);
}

impl<F> MappingListener for F
where
  F: Fn(MappingEvent, &Mapping),
{
  fn on_mapping_event(&self, event: MappingEvent, mapping: &Mapping) {
    self(event, mapping)
  }
}
