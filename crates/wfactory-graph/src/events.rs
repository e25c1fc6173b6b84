//! Materialization events and notifiers.
//!
//! The materializer reports noteworthy but non-fatal observations through a
//! [`MaterializeNotifier`] so that callers can log, collect, or ignore them.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Events emitted while an instance graph is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MaterializeEvent {
  /// An input matched an existing data node by name, but the declared sizes
  /// differ. The two are still treated as the same artifact.
  SizeMismatch {
    file: String,
    recorded: Option<u64>,
    declared: Option<u64>,
    job_id: usize,
  },

  /// An input has no producer in the template (a pre-existing file).
  OrphanInput { file: String, job_id: usize },
}

/// Trait for receiving materialization events.
pub trait MaterializeNotifier: Send + Sync {
  /// Called for each event, synchronously, during materialization.
  fn notify(&self, event: MaterializeEvent);
}

/// A no-op notifier that discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl MaterializeNotifier for NoopNotifier {
  fn notify(&self, _event: MaterializeEvent) {}
}

/// Logs events through `tracing`: size mismatches as warnings, orphan
/// inputs at debug level.
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

impl MaterializeNotifier for TracingNotifier {
  fn notify(&self, event: MaterializeEvent) {
    match event {
      MaterializeEvent::SizeMismatch {
        file,
        recorded,
        declared,
        job_id,
      } => {
        warn!(
          file = %file,
          recorded = ?recorded,
          declared = ?declared,
          job_id,
          "file name reused with a different size, treating as the same artifact"
        );
      }
      MaterializeEvent::OrphanInput { file, job_id } => {
        debug!(file = %file, job_id, "input has no producer");
      }
    }
  }
}

/// A notifier that sends events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<MaterializeEvent>,
}

impl ChannelNotifier {
  /// Create a new channel notifier.
  pub fn new(sender: mpsc::UnboundedSender<MaterializeEvent>) -> Self {
    Self { sender }
  }
}

impl MaterializeNotifier for ChannelNotifier {
  fn notify(&self, event: MaterializeEvent) {
    // Receiver may have been dropped
    let _ = self.sender.send(event);
  }
}
