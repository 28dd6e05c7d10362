use std::fmt;

use thiserror::Error;

use crate::core::TypeKey;

/// Error type returned by a failing lifecycle hook.
pub type HookError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The object a destroyed-state violation was detected on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subject {
  Injector,
  Mapping(TypeKey),
}

impl fmt::Display for Subject {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Subject::Injector => write!(f, "injector"),
      Subject::Mapping(key) => write!(f, "mapping of `{}`", key),
    }
  }
}

/// The main error type for the `fibre_inject` library.
///
/// Every variant is raised at the point of violation and is never retried
/// internally. A misconfigured object graph fails at the first unresolved
/// dependency.
#[derive(Debug, Error)]
pub enum Error {
  #[error("{0} is already destroyed")]
  AlreadyDestroyed(Subject),

  #[error("sealed mapping of `{key}` cannot be overridden, changed or removed")]
  SealedOverride { key: TypeKey },

  #[error("no mapping could be located for `{key}`{}", required_by_suffix(.required_by))]
  UnknownMapping {
    key: TypeKey,
    required_by: Option<TypeKey>,
  },

  #[error("type metadata for `{key}` is not registered")]
  UnregisteredMetadata { key: TypeKey },

  #[error("double registration of {field} for `{key}`")]
  DuplicateRegistration { key: TypeKey, field: String },

  #[error("cannot unseal mapping of `{key}` without the correct key")]
  InvalidUnsealKey { key: TypeKey },

  #[error("cannot unseal mapping of `{key}` as it is not sealed")]
  NotSealed { key: TypeKey },

  #[error("`{key}` is declared but has no constructor")]
  NotConstructible { key: TypeKey },

  #[error("`{target}` cannot be provided as `{key}`; declare it as an interface of `{target}`")]
  IncompatibleBinding { key: TypeKey, target: TypeKey },

  #[error("value does not match the expected type `{expected}`")]
  TypeMismatch { expected: TypeKey },

  #[error("circular dependency detected while resolving `{key}`")]
  CircularDependency { key: TypeKey },

  #[error("lifecycle hook `{method}` of `{owner}` failed: {source}")]
  Hook {
    owner: TypeKey,
    method: String,
    #[source]
    source: HookError,
  },
}

fn required_by_suffix(required_by: &Option<TypeKey>) -> String {
  match required_by {
    Some(owner) => format!(" (required by `{}`)", owner),
    None => String::new(),
  }
}

impl Error {
  pub(crate) fn unknown(key: TypeKey) -> Self {
    Error::UnknownMapping {
      key,
      required_by: None,
    }
  }

  pub(crate) fn duplicate(key: TypeKey, field: impl Into<String>) -> Self {
    Error::DuplicateRegistration {
      key,
      field: field.into(),
    }
  }
}

/// A specialized `Result` type for `fibre_inject` operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
