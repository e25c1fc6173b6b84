use serde::{Deserialize, Serialize};

use crate::Attributes;
use crate::child::{ChildDescriptor, ParentRef};
use crate::job::JobDescriptor;

/// A parsed workflow description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
  /// Name the template was requested under.
  pub name: String,
  /// Root element attributes (`version`, `count`, `jobCount`, ...).
  #[serde(default, skip_serializing_if = "Attributes::is_empty")]
  pub attributes: Attributes,
  #[serde(default)]
  pub jobs: Vec<JobDescriptor>,
  #[serde(default)]
  pub children: Vec<ChildDescriptor>,
}

impl Template {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      attributes: Attributes::new(),
      jobs: Vec::new(),
      children: Vec::new(),
    }
  }

  /// An independent structural copy.
  ///
  /// Materialization consumes and rewrites its input, so every instance is
  /// built from a detached copy while the cached template stays untouched.
  pub fn detached(&self) -> Template {
    self.clone()
  }

  /// Parents declared for a job, from the last child entry naming it.
  ///
  /// `None` means no child entry exists for the job at all, which is how
  /// root jobs are recognised.
  pub fn parents_of(&self, job_id: &str) -> Option<&[ParentRef]> {
    self
      .children
      .iter()
      .rev()
      .find(|c| c.child_ref == job_id)
      .map(|c| c.parents.as_slice())
  }
}
