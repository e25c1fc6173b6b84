//! Factory errors.

use wfactory_source::SourceError;

/// Errors returned by the workflow factory.
#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
  /// No description exists for the name, or no instance was ever
  /// recorded under it.
  #[error("template '{name}' not found")]
  NotFound { name: String },

  /// The description is malformed.
  #[error("failed to parse template '{name}': {message}")]
  Parse { name: String, message: String },

  /// The description could not be read.
  #[error("failed to read template '{name}': {message}")]
  Io { name: String, message: String },

  /// An instance was requested before the template was fetched, or after
  /// its last fetch failed.
  #[error("template '{name}' is not loaded")]
  TemplateNotLoaded { name: String },

  /// The slot is out of range or has never held an instance.
  #[error("no instance of '{name}' at slot {slot}")]
  IndexNotFound { name: String, slot: usize },

  /// Waiting for an in-flight load took longer than the configured bound.
  #[error("timed out after {timeout_ms}ms waiting for template '{name}'")]
  LoadTimeout { name: String, timeout_ms: u64 },

  /// The caller cancelled the operation.
  #[error("operation cancelled")]
  Cancelled,

  /// Configuration is unusable.
  #[error("invalid configuration: {message}")]
  InvalidConfig { message: String },
}

impl From<SourceError> for FactoryError {
  fn from(err: SourceError) -> Self {
    match err {
      SourceError::NotFound { name, .. } => FactoryError::NotFound { name },
      SourceError::Parse { name, message } => FactoryError::Parse { name, message },
      SourceError::Io { name, message } => FactoryError::Io { name, message },
    }
  }
}
