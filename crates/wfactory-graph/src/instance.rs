use serde::{Deserialize, Serialize};
use wfactory_template::{Attributes, Link, ParentRef, UsageDeclaration};

/// Overall status of a freshly materialized instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
  Ready,
}

/// Status of a freshly materialized job node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
  Waiting,
}

/// Status of a job's file usage before anything has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataStatus {
  NotReady,
}

/// Pointer from a data node to a job that produces or consumes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRef {
  pub job_name: String,
  pub job_id: usize,
  pub job_uri: String,
}

/// A job's file usage, stamped with the data node it resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageNode {
  pub file: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub size: Option<u64>,
  pub link: Link,
  pub status: DataStatus,
  /// Data node id, set during back-linking.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub id: Option<usize>,
  /// Data node uri, set during back-linking.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub uri: Option<String>,
  #[serde(default, skip_serializing_if = "Attributes::is_empty")]
  pub attributes: Attributes,
}

impl From<UsageDeclaration> for UsageNode {
  fn from(usage: UsageDeclaration) -> Self {
    Self {
      file: usage.file,
      size: usage.size,
      link: usage.link,
      status: DataStatus::NotReady,
      id: None,
      uri: None,
      attributes: usage.attributes,
    }
  }
}

/// A job of a materialized instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobNode {
  /// Template-level id.
  pub id: String,
  /// 1-based position in the template's job list.
  pub job_id: usize,
  pub name: String,
  pub status: JobStatus,
  pub uri: String,
  /// Parents from the template's child entry. `None` for jobs no child
  /// entry names; this is distinct from an empty list.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub parents: Option<Vec<ParentRef>>,
  #[serde(default, skip_serializing_if = "Attributes::is_empty")]
  pub attributes: Attributes,
  pub uses: Vec<UsageNode>,
}

impl JobNode {
  /// A reference to this job for data lineage lists.
  pub fn reference(&self) -> JobRef {
    JobRef {
      job_name: self.name.clone(),
      job_id: self.job_id,
      job_uri: self.uri.clone(),
    }
  }

  /// Whether this job has no recorded parents.
  pub fn is_root(&self) -> bool {
    self.parents.is_none()
  }
}

/// A data artifact of a materialized instance, identified by file name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataNode {
  /// 1-based, in discovery order.
  pub id: usize,
  pub uri: String,
  pub name: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub size: Option<u64>,
  /// Producers. Empty for files that pre-exist the workflow.
  pub from: Vec<JobRef>,
  /// Consumers.
  pub to: Vec<JobRef>,
}

/// A materialized, fully cross-referenced workflow graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
  /// Name of the template this instance was built from.
  pub template: String,
  pub uri: String,
  pub status: InstanceStatus,
  /// Jobs not yet finished.
  pub remaining_jobs: usize,
  pub jobs: Vec<JobNode>,
  pub data: Vec<DataNode>,
}

impl Instance {
  /// Get a job by its 1-based `job_id`.
  pub fn get_job(&self, job_id: usize) -> Option<&JobNode> {
    job_id.checked_sub(1).and_then(|i| self.jobs.get(i))
  }

  /// Get a data node by its 1-based id.
  pub fn get_data(&self, id: usize) -> Option<&DataNode> {
    id.checked_sub(1).and_then(|i| self.data.get(i))
  }

  /// Data nodes carrying the given file name, in discovery order.
  pub fn data_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a DataNode> + 'a {
    self.data.iter().filter(move |d| d.name == name)
  }

  /// Jobs with no recorded parents.
  pub fn root_jobs(&self) -> impl Iterator<Item = &JobNode> {
    self.jobs.iter().filter(|j| j.is_root())
  }
}
