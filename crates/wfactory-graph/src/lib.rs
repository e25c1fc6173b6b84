//! wfactory Graph
//!
//! This crate provides the materialized instance representation for wfactory
//! and the algorithm that builds it from a template.
//!
//! Key differences from `wfactory-template`:
//! - Jobs carry sequential ids, uris, statuses, and resolved parent lists
//! - Files become data nodes with producer/consumer lineage
//! - Every usage is stamped with the id and uri of its data node
//! - Ready to be served or scheduled by a consumer

mod events;
mod instance;
mod materialize;

pub use events::{
  ChannelNotifier, MaterializeEvent, MaterializeNotifier, NoopNotifier, TracingNotifier,
};
pub use instance::{
  DataNode, DataStatus, Instance, InstanceStatus, JobNode, JobRef, JobStatus, UsageNode,
};
pub use materialize::materialize;
