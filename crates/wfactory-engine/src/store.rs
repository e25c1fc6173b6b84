//! Per-template cache entries.
//!
//! Each template name maps to one [`WorkflowEntry`]. The entry's mutex
//! guards both the load state and the instance ledger, so work on distinct
//! templates never contends. The map itself is only locked to look up or
//! insert entries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use futures::future::{BoxFuture, Shared};
use wfactory_source::SourceError;
use wfactory_template::Template;

use crate::ledger::InstanceLedger;

/// A load in progress, awaitable by any number of callers.
pub(crate) type PendingLoad = Shared<BoxFuture<'static, Result<Arc<Template>, SourceError>>>;

pub(crate) enum LoadState {
  Absent,
  /// `generation` identifies which load the future belongs to.
  Loading {
    generation: u64,
    pending: PendingLoad,
  },
  Ready(Arc<Template>),
  Failed(SourceError),
}

pub(crate) struct EntryState {
  pub load: LoadState,
  /// Number of loads started for this entry.
  pub generation: u64,
  /// Created on the first successful load.
  pub ledger: Option<InstanceLedger>,
}

pub(crate) struct WorkflowEntry {
  state: Mutex<EntryState>,
}

impl WorkflowEntry {
  fn new() -> Self {
    Self {
      state: Mutex::new(EntryState {
        load: LoadState::Absent,
        generation: 0,
        ledger: None,
      }),
    }
  }

  /// Lock the entry. Never hold the guard across an `.await`.
  pub fn lock(&self) -> MutexGuard<'_, EntryState> {
    self.state.lock().unwrap_or_else(|e| e.into_inner())
  }
}

#[derive(Default)]
pub(crate) struct TemplateStore {
  entries: RwLock<HashMap<String, Arc<WorkflowEntry>>>,
}

impl TemplateStore {
  pub fn get(&self, name: &str) -> Option<Arc<WorkflowEntry>> {
    let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
    entries.get(name).cloned()
  }

  /// Get the entry for `name`, inserting an absent one if needed.
  pub fn entry(&self, name: &str) -> Arc<WorkflowEntry> {
    if let Some(entry) = self.get(name) {
      return entry;
    }

    let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
    entries
      .entry(name.to_string())
      .or_insert_with(|| Arc::new(WorkflowEntry::new()))
      .clone()
  }

  /// Names with a cached template, sorted.
  pub fn ready_names(&self) -> Vec<String> {
    let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
    let mut names: Vec<String> = entries
      .iter()
      .filter(|(_, entry)| matches!(entry.lock().load, LoadState::Ready(_)))
      .map(|(name, _)| name.clone())
      .collect();
    names.sort();
    names
  }
}
