//! wfactory Engine
//!
//! Caches parsed workflow templates and materializes instances of them
//! into fixed-size, per-template ledgers.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     WorkflowFactory                         │
//! │  - get_template(name)      load once, share, cache          │
//! │  - create_instance(name)   reserve slot, materialize        │
//! │  - get_instance(name, i)   read one slot                    │
//! │  - get_instance_list(name) snapshot the ledger              │
//! └─────────────────────────────────────────────────────────────┘
//!           │                                   │
//!           ▼                                   ▼
//! ┌───────────────────────────┐   ┌─────────────────────────────┐
//! │      TemplateSource       │   │        materialize          │
//! │  - DAX files on disk      │   │  - template copy → Instance │
//! └───────────────────────────┘   └─────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use wfactory_engine::{FactoryConfig, WorkflowFactory};
//! use wfactory_source::FsTemplateSource;
//!
//! let source = FsTemplateSource::new("/srv/templates");
//! let factory = WorkflowFactory::new(source, FactoryConfig::default())?;
//!
//! factory.get_template("montage").await?;
//! let slot = factory.create_instance("montage", "http://localhost:8080").await?;
//! let record = factory.get_instance("montage", slot)?;
//! ```

mod config;
mod error;
mod factory;
mod ledger;
mod store;

pub use config::FactoryConfig;
pub use error::FactoryError;
pub use factory::WorkflowFactory;
pub use ledger::{InstanceRecord, LedgerSnapshot};
