//! wfactory Source
//!
//! Template sources locate a workflow description by name and parse it into
//! a [`Template`](wfactory_template::Template). The filesystem source reads
//! Pegasus DAX files (`{root}/{name}.xml`).
//!
//! Sources report a missing description and a malformed one as distinct
//! [`SourceError`] kinds; callers propagate them unchanged.

mod dax;
mod error;
mod fs_source;
mod source;

pub use dax::parse_dax;
pub use error::SourceError;
pub use fs_source::FsTemplateSource;
pub use source::TemplateSource;
