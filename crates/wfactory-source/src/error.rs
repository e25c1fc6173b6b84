use thiserror::Error;

/// Errors that can occur when loading a template.
///
/// Cloneable so that one load result can be handed to every caller waiting
/// on the same load.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
  /// No description exists for the name.
  #[error("template not found: {name} ({path})")]
  NotFound { name: String, path: String },

  /// The description exists but is malformed.
  #[error("failed to parse template '{name}': {message}")]
  Parse { name: String, message: String },

  /// The description could not be read.
  #[error("failed to read template '{name}': {message}")]
  Io { name: String, message: String },
}

impl SourceError {
  pub(crate) fn parse(name: &str, message: impl Into<String>) -> Self {
    SourceError::Parse {
      name: name.to_string(),
      message: message.into(),
    }
  }
}
