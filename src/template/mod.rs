//! Template definitions, groups and instances
//!
//! A [`TemplateGroup`] holds named [`TemplateDefinition`]s and dictionaries
//! loaded from group files, template directories or strings. Rendering goes
//! through a [`TemplateInstance`], which binds attribute values to one
//! definition.
//!
//! # Example
//!
//! ```text
//! // users.stg
//! row(user) ::= "<user.name> (<user.id>)"
//! table(users) ::= <<
//! <users:row(); separator="\n">
//! >>
//! ```

mod definition;
mod instance;
mod manifest;
mod registry;

pub use definition::{FormalParam, TemplateDefinition};
pub use instance::TemplateInstance;
pub use manifest::{Manifest, MANIFEST_FILE};
pub use registry::{GroupBuilder, TemplateError, TemplateGroup};

pub(crate) use registry::application_overflow;
