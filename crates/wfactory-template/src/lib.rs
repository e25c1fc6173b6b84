//! wfactory Template
//!
//! This crate contains the typed workflow template model for wfactory.
//! A template is the parsed form of a static workflow description (a Pegasus
//! DAX file): an ordered list of jobs with the files they use, and an ordered
//! list of child entries naming each job's parents.
//!
//! Templates are produced by a `TemplateSource` and are never mutated once
//! cached. Every instance is materialized from its own deep copy, obtained
//! with [`Template::detached`].

mod child;
mod job;
mod template;

pub use child::{ChildDescriptor, ParentRef};
pub use job::{JobDescriptor, Link, UsageDeclaration};
pub use template::Template;

/// Passthrough XML attributes that carry no meaning for materialization.
pub type Attributes = std::collections::BTreeMap<String, String>;
