//! Instance materialization.
//!
//! Turns a detached template into an [`Instance`] in five ordered passes:
//!
//! ```text
//! 1. jobs      job_id, status, uri, parents, usage status
//! 2. outputs   one data node per output usage (no de-duplication)
//! 3. inputs    attach consumers by file name, or create producer-less nodes
//! 4. ids       data node id/uri in discovery order
//! 5. links     stamp each usage with its data node id/uri
//! ```
//!
//! A data node's identity is its file name. Declared sizes are carried but
//! never compared for identity; a differing size is reported to the
//! notifier as [`MaterializeEvent::SizeMismatch`].

use tracing::debug;
use wfactory_template::{Link, ParentRef, Template};

use crate::events::{MaterializeEvent, MaterializeNotifier};
use crate::instance::{DataNode, Instance, InstanceStatus, JobNode, JobRef, JobStatus, UsageNode};

/// A data node before identifier assignment.
struct PendingData {
  name: String,
  size: Option<u64>,
  from: Vec<JobRef>,
  to: Vec<JobRef>,
}

/// Build an instance graph from a template copy.
///
/// `root_uri` is used verbatim as the instance uri and as the prefix of
/// every job and data uri.
pub fn materialize(
  mut template: Template,
  root_uri: &str,
  notifier: &dyn MaterializeNotifier,
) -> Instance {
  let mut jobs = enrich_jobs(&mut template, root_uri);
  let mut pending = discover_outputs(&jobs);
  resolve_inputs(&jobs, &mut pending, notifier);
  let data = assign_identifiers(pending, root_uri);
  link_usages(&mut jobs, &data);

  debug!(
    template = %template.name,
    uri = %root_uri,
    jobs = jobs.len(),
    data = data.len(),
    "instance materialized"
  );

  Instance {
    template: template.name,
    uri: root_uri.to_string(),
    status: InstanceStatus::Ready,
    remaining_jobs: jobs.len(),
    jobs,
    data,
  }
}

fn enrich_jobs(template: &mut Template, root_uri: &str) -> Vec<JobNode> {
  let descriptors = std::mem::take(&mut template.jobs);

  descriptors
    .into_iter()
    .enumerate()
    .map(|(index, job)| {
      let job_id = index + 1;
      let parents = template.parents_of(&job.id).map(<[ParentRef]>::to_vec);

      JobNode {
        id: job.id,
        job_id,
        name: job.name,
        status: JobStatus::Waiting,
        uri: format!("{root_uri}/task-{job_id}"),
        parents,
        attributes: job.attributes,
        uses: job.uses.into_iter().map(UsageNode::from).collect(),
      }
    })
    .collect()
}

fn discover_outputs(jobs: &[JobNode]) -> Vec<PendingData> {
  let mut pending = Vec::new();

  for job in jobs {
    for usage in job.uses.iter().filter(|u| u.link == Link::Output) {
      pending.push(PendingData {
        name: usage.file.clone(),
        size: usage.size,
        from: vec![job.reference()],
        to: Vec::new(),
      });
    }
  }

  pending
}

fn resolve_inputs(
  jobs: &[JobNode],
  pending: &mut Vec<PendingData>,
  notifier: &dyn MaterializeNotifier,
) {
  for job in jobs {
    for usage in job.uses.iter().filter(|u| u.link == Link::Input) {
      // Later discoveries shadow earlier ones with the same name.
      let index = match pending.iter().rposition(|d| d.name == usage.file) {
        Some(index) => {
          let recorded = pending[index].size;
          if let (Some(a), Some(b)) = (recorded, usage.size)
            && a != b
          {
            notifier.notify(MaterializeEvent::SizeMismatch {
              file: usage.file.clone(),
              recorded,
              declared: usage.size,
              job_id: job.job_id,
            });
          }
          index
        }
        None => {
          notifier.notify(MaterializeEvent::OrphanInput {
            file: usage.file.clone(),
            job_id: job.job_id,
          });
          pending.push(PendingData {
            name: usage.file.clone(),
            size: usage.size,
            from: Vec::new(),
            to: Vec::new(),
          });
          pending.len() - 1
        }
      };

      pending[index].to.push(job.reference());
    }
  }
}

fn assign_identifiers(pending: Vec<PendingData>, root_uri: &str) -> Vec<DataNode> {
  pending
    .into_iter()
    .enumerate()
    .map(|(index, data)| {
      let id = index + 1;
      DataNode {
        id,
        uri: format!("{root_uri}/data-{id}"),
        name: data.name,
        size: data.size,
        from: data.from,
        to: data.to,
      }
    })
    .collect()
}

fn link_usages(jobs: &mut [JobNode], data: &[DataNode]) {
  for node in data {
    for consumer in &node.to {
      stamp(jobs, consumer.job_id, Link::Input, node);
    }
    for producer in &node.from {
      stamp(jobs, producer.job_id, Link::Output, node);
    }
  }
}

fn stamp(jobs: &mut [JobNode], job_id: usize, link: Link, node: &DataNode) {
  let Some(job) = job_id.checked_sub(1).and_then(|i| jobs.get_mut(i)) else {
    return;
  };

  for usage in job
    .uses
    .iter_mut()
    .filter(|u| u.link == link && u.file == node.name)
  {
    usage.id = Some(node.id);
    usage.uri = Some(node.uri.clone());
  }
}
