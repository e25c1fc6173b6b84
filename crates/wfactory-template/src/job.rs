use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Attributes;

/// Direction of a file usage relative to its job.
///
/// Only `Input` and `Output` take part in data lineage. `Inout` and `None`
/// are kept so that a parsed description round-trips without loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Link {
  Input,
  Output,
  Inout,
  None,
}

impl fmt::Display for Link {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Link::Input => write!(f, "input"),
      Link::Output => write!(f, "output"),
      Link::Inout => write!(f, "inout"),
      Link::None => write!(f, "none"),
    }
  }
}

impl FromStr for Link {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "input" => Ok(Link::Input),
      "output" => Ok(Link::Output),
      "inout" => Ok(Link::Inout),
      "none" => Ok(Link::None),
      other => Err(format!("unknown link direction '{other}'")),
    }
  }
}

/// A `<uses>` entry of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageDeclaration {
  pub file: String,
  /// Declared byte size. Not part of the file's identity.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub size: Option<u64>,
  pub link: Link,
  #[serde(default, skip_serializing_if = "Attributes::is_empty")]
  pub attributes: Attributes,
}

impl UsageDeclaration {
  pub fn new(file: impl Into<String>, size: Option<u64>, link: Link) -> Self {
    Self {
      file: file.into(),
      size,
      link,
      attributes: Attributes::new(),
    }
  }

  pub fn input(file: impl Into<String>, size: u64) -> Self {
    Self::new(file, Some(size), Link::Input)
  }

  pub fn output(file: impl Into<String>, size: u64) -> Self {
    Self::new(file, Some(size), Link::Output)
  }
}

/// A `<job>` entry of a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
  /// Template-level id, referenced by child and parent entries.
  pub id: String,
  pub name: String,
  #[serde(default, skip_serializing_if = "Attributes::is_empty")]
  pub attributes: Attributes,
  #[serde(default)]
  pub uses: Vec<UsageDeclaration>,
}

impl JobDescriptor {
  pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      name: name.into(),
      attributes: Attributes::new(),
      uses: Vec::new(),
    }
  }

  /// Builder-style helper to append a usage declaration.
  pub fn with_usage(mut self, usage: UsageDeclaration) -> Self {
    self.uses.push(usage);
    self
  }
}
