use serde::{Deserialize, Serialize};

/// Reference to a parent job by its template id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentRef {
  pub parent_ref: String,
}

impl ParentRef {
  pub fn new(parent_ref: impl Into<String>) -> Self {
    Self {
      parent_ref: parent_ref.into(),
    }
  }
}

/// A `<child>` entry: the job named by `child_ref` depends on every parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildDescriptor {
  pub child_ref: String,
  #[serde(default)]
  pub parents: Vec<ParentRef>,
}

impl ChildDescriptor {
  pub fn new<I, S>(child_ref: impl Into<String>, parents: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      child_ref: child_ref.into(),
      parents: parents.into_iter().map(ParentRef::new).collect(),
    }
  }
}
