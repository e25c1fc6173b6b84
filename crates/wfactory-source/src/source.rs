use async_trait::async_trait;
use wfactory_template::Template;

use crate::error::SourceError;

/// Locates and parses workflow descriptions by name.
#[async_trait]
pub trait TemplateSource: Send + Sync {
  /// Load the template registered under `name`.
  ///
  /// Returns `SourceError::NotFound` when no description exists and
  /// `SourceError::Parse` when it cannot be parsed.
  async fn load(&self, name: &str) -> Result<Template, SourceError>;
}
