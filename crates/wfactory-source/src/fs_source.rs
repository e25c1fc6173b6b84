use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;
use wfactory_template::Template;

use crate::dax::parse_dax;
use crate::error::SourceError;
use crate::source::TemplateSource;

/// Filesystem-based template source.
///
/// Templates are stored as DAX files in a flat directory:
/// ```text
/// {root}/
/// ├── montage.xml
/// └── genome.xml
/// ```
/// The template name is the file stem.
pub struct FsTemplateSource {
  root: PathBuf,
}

impl FsTemplateSource {
  /// Create a new filesystem source at the given root path.
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  /// Path of the description for `name`, or `None` if the name could
  /// escape the root directory.
  fn path_for(&self, name: &str) -> Option<PathBuf> {
    let valid = !name.is_empty()
      && !name.starts_with('.')
      && !name.contains(['/', '\\'])
      && !name.contains("..");
    valid.then(|| self.root.join(format!("{name}.xml")))
  }

  /// List the names of all templates in the root directory, sorted.
  pub async fn list(&self) -> Result<Vec<String>, SourceError> {
    let mut names = Vec::new();

    if !self.root.exists() {
      return Ok(names);
    }

    let io_error = |e: std::io::Error| SourceError::Io {
      name: self.root.display().to_string(),
      message: e.to_string(),
    };

    let mut entries = fs::read_dir(&self.root).await.map_err(io_error)?;
    while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
      let path = entry.path();
      if path.extension().is_some_and(|ext| ext == "xml")
        && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
      {
        names.push(stem.to_string());
      }
    }

    names.sort();
    Ok(names)
  }
}

#[async_trait]
impl TemplateSource for FsTemplateSource {
  async fn load(&self, name: &str) -> Result<Template, SourceError> {
    let path = self.path_for(name).ok_or_else(|| SourceError::NotFound {
      name: name.to_string(),
      path: format!("invalid template name under {}", self.root.display()),
    })?;

    let bytes = fs::read(&path).await.map_err(|e| match e.kind() {
      ErrorKind::NotFound => SourceError::NotFound {
        name: name.to_string(),
        path: path.display().to_string(),
      },
      _ => SourceError::Io {
        name: name.to_string(),
        message: format!("{}: {e}", path.display()),
      },
    })?;

    let content = String::from_utf8(bytes).map_err(|e| {
      SourceError::parse(
        name,
        format!(
          "{}: not valid UTF-8 at byte {}",
          path.display(),
          e.utf8_error().valid_up_to()
        ),
      )
    })?;

    debug!(template = %name, path = %path.display(), bytes = content.len(), "parsing template");
    parse_dax(name, &content)
  }
}
