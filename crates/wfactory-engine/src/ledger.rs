//! Fixed-capacity ring of materialized instances, one per template.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use wfactory_graph::Instance;

/// A published instance together with its ledger bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceRecord {
  pub slot: usize,
  /// 1-based creation counter for the template; later creations have
  /// larger sequences.
  pub sequence: u64,
  pub created_at: DateTime<Utc>,
  #[serde(flatten)]
  pub instance: Instance,
}

/// A slot handed out to one creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Reservation {
  pub slot: usize,
  pub sequence: u64,
}

#[derive(Debug)]
pub(crate) struct InstanceLedger {
  current: usize,
  created: u64,
  slots: Vec<Option<Arc<InstanceRecord>>>,
}

impl InstanceLedger {
  pub fn new(capacity: usize) -> Self {
    Self {
      current: 0,
      created: 0,
      slots: vec![None; capacity],
    }
  }

  pub fn capacity(&self) -> usize {
    self.slots.len()
  }

  /// Advance the ring and claim the next slot.
  ///
  /// The first reservation lands on slot 0.
  pub fn reserve(&mut self) -> Reservation {
    if self.created > 0 {
      self.current = (self.current + 1) % self.capacity();
    }
    self.created += 1;
    Reservation {
      slot: self.current,
      sequence: self.created,
    }
  }

  /// Store a record in its slot unless a newer record already occupies it.
  pub fn publish(&mut self, record: Arc<InstanceRecord>) -> bool {
    let Some(slot) = self.slots.get_mut(record.slot) else {
      return false;
    };
    if let Some(existing) = slot
      && existing.sequence > record.sequence
    {
      return false;
    }
    *slot = Some(record);
    true
  }

  pub fn get(&self, slot: usize) -> Option<Arc<InstanceRecord>> {
    self.slots.get(slot).and_then(Clone::clone)
  }

  pub fn snapshot(&self, template: &str) -> LedgerSnapshot {
    LedgerSnapshot {
      template: template.to_string(),
      current: self.current,
      capacity: self.capacity(),
      created: self.created,
      slots: self.slots.clone(),
    }
  }
}

/// Point-in-time view of a template's ledger.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerSnapshot {
  pub template: String,
  /// Slot of the most recent reservation.
  pub current: usize,
  pub capacity: usize,
  /// Total creations so far, including overwritten ones.
  pub created: u64,
  pub slots: Vec<Option<Arc<InstanceRecord>>>,
}

impl LedgerSnapshot {
  /// Occupied slots in slot order.
  pub fn occupied(&self) -> impl Iterator<Item = &Arc<InstanceRecord>> {
    self.slots.iter().flatten()
  }
}
