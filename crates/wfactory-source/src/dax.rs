//! Pegasus DAX parsing.
//!
//! Only the elements that shape the dependency graph are read:
//!
//! ```text
//! <adag ...>
//!   <job id="ID00000" name="mProject" ...>
//!     <argument>...</argument>          (skipped)
//!     <uses file="a.fits" link="input" size="4222080" .../>
//!   </job>
//!   <child ref="ID00001">
//!     <parent ref="ID00000"/>
//!   </child>
//! </adag>
//! ```
//!
//! Element and attribute names are matched by local name, so prefixed
//! documents parse the same way. DAX 3 `<uses name=...>` is accepted as an
//! alias of `file`.

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use wfactory_template::{
  Attributes, ChildDescriptor, JobDescriptor, Link, ParentRef, Template, UsageDeclaration,
};

use crate::error::SourceError;

/// Depth of `<adag>`, `<job>`/`<child>`, and `<uses>`/`<parent>`.
const ROOT_DEPTH: usize = 1;
const ENTRY_DEPTH: usize = 2;
const DETAIL_DEPTH: usize = 3;

/// Parse a DAX document into a template named `name`.
pub fn parse_dax(name: &str, xml: &str) -> Result<Template, SourceError> {
  let mut reader = Reader::from_str(xml);
  reader.config_mut().trim_text(true);

  let mut builder = DaxBuilder::new(name);
  let mut depth = 0usize;

  loop {
    let event = reader.read_event().map_err(|e| {
      SourceError::parse(
        name,
        format!("malformed xml near byte {}: {e}", reader.buffer_position()),
      )
    })?;

    match event {
      Event::Start(e) => {
        depth += 1;
        builder.open(&e, depth)?;
      }
      Event::Empty(e) => {
        builder.open(&e, depth + 1)?;
        builder.close(e.local_name().as_ref(), depth + 1);
      }
      Event::End(e) => {
        builder.close(e.local_name().as_ref(), depth);
        depth = depth.saturating_sub(1);
      }
      Event::Eof if depth > 0 => {
        return Err(SourceError::parse(name, "unexpected end of document"));
      }
      Event::Eof => break,
      _ => {}
    }
  }

  builder.finish()
}

/// Accumulates a template while walking the event stream.
struct DaxBuilder<'a> {
  name: &'a str,
  template: Template,
  seen_root: bool,
  job: Option<JobDescriptor>,
  child: Option<ChildDescriptor>,
}

impl<'a> DaxBuilder<'a> {
  fn new(name: &'a str) -> Self {
    Self {
      name,
      template: Template::new(name),
      seen_root: false,
      job: None,
      child: None,
    }
  }

  fn open(&mut self, element: &BytesStart<'_>, depth: usize) -> Result<(), SourceError> {
    let local = element.local_name();

    match (depth, local.as_ref()) {
      (ROOT_DEPTH, b"adag") if !self.seen_root => {
        self.seen_root = true;
        self.template.attributes = self.attributes(element)?;
      }
      (ROOT_DEPTH, other) => {
        return Err(SourceError::parse(
          self.name,
          format!(
            "expected a single <adag> root element, found <{}>",
            String::from_utf8_lossy(other)
          ),
        ));
      }
      (ENTRY_DEPTH, b"job") => {
        let mut attributes = self.attributes(element)?;
        let id = self.required(&mut attributes, "job", "id")?;
        let name = self.required(&mut attributes, "job", "name")?;
        self.job = Some(JobDescriptor {
          id,
          name,
          attributes,
          uses: Vec::new(),
        });
      }
      (ENTRY_DEPTH, b"child") => {
        let mut attributes = self.attributes(element)?;
        let child_ref = self.required(&mut attributes, "child", "ref")?;
        self.child = Some(ChildDescriptor {
          child_ref,
          parents: Vec::new(),
        });
      }
      (DETAIL_DEPTH, b"uses") if self.job.is_some() => {
        let usage = self.usage(element)?;
        if let Some(job) = self.job.as_mut() {
          job.uses.push(usage);
        }
      }
      (DETAIL_DEPTH, b"parent") if self.child.is_some() => {
        let mut attributes = self.attributes(element)?;
        let parent_ref = self.required(&mut attributes, "parent", "ref")?;
        if let Some(child) = self.child.as_mut() {
          child.parents.push(ParentRef { parent_ref });
        }
      }
      _ => {}
    }

    Ok(())
  }

  fn close(&mut self, local: &[u8], depth: usize) {
    if depth != ENTRY_DEPTH {
      return;
    }
    match local {
      b"job" => {
        if let Some(job) = self.job.take() {
          self.template.jobs.push(job);
        }
      }
      b"child" => {
        if let Some(child) = self.child.take() {
          self.template.children.push(child);
        }
      }
      _ => {}
    }
  }

  fn finish(self) -> Result<Template, SourceError> {
    if !self.seen_root {
      return Err(SourceError::parse(
        self.name,
        "document has no <adag> root element",
      ));
    }
    Ok(self.template)
  }

  fn usage(&self, element: &BytesStart<'_>) -> Result<UsageDeclaration, SourceError> {
    let mut attributes = self.attributes(element)?;

    let file = match attributes.remove("file") {
      Some(file) => file,
      None => self.required(&mut attributes, "uses", "name")?,
    };

    let link_value = self.required(&mut attributes, "uses", "link")?;
    let link = link_value
      .parse::<Link>()
      .map_err(|e| SourceError::parse(self.name, format!("<uses file=\"{file}\">: {e}")))?;

    let size = attributes
      .remove("size")
      .map(|s| {
        s.trim().parse::<u64>().map_err(|_| {
          SourceError::parse(
            self.name,
            format!("<uses file=\"{file}\">: invalid size '{s}'"),
          )
        })
      })
      .transpose()?;

    Ok(UsageDeclaration {
      file,
      size,
      link,
      attributes,
    })
  }

  /// Collect attributes by local name, skipping namespace declarations.
  fn attributes(&self, element: &BytesStart<'_>) -> Result<Attributes, SourceError> {
    let mut attributes = Attributes::new();

    for attr in element.attributes() {
      let attr = attr.map_err(|e| SourceError::parse(self.name, format!("bad attribute: {e}")))?;
      if attr.key.as_namespace_binding().is_some() {
        continue;
      }
      let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
      let value = attr
        .unescape_value()
        .map_err(|e| SourceError::parse(self.name, format!("bad value for '{key}': {e}")))?;
      attributes.insert(key, value.into_owned());
    }

    Ok(attributes)
  }

  fn required(
    &self,
    attributes: &mut Attributes,
    element: &str,
    key: &str,
  ) -> Result<String, SourceError> {
    attributes.remove(key).ok_or_else(|| {
      SourceError::parse(
        self.name,
        format!("<{element}> is missing required attribute '{key}'"),
      )
    })
  }
}
