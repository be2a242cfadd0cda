//! Stencil - a small StringTemplate-style text rendering engine
//!
//! Templates are plain text with expressions between delimiters. Attributes
//! are looked up dynamically through the chain of templates that included
//! the current one, so nested templates see their callers' attributes.
//!
//! # Example
//!
//! ```rust
//! use stencil::{TemplateGroup, Value};
//!
//! let group = TemplateGroup::from_group_str(r#"
//!     row(user) ::= "<user.name>"
//!     table(users) ::= "<users:row(); separator=\", \">"
//! "#).unwrap();
//!
//! let mut table = group.get_instance_of("table").unwrap();
//! table
//!     .bind_aggregate("users.{name, id}", [Value::from("Ter"), Value::from(1)])
//!     .unwrap()
//!     .bind_aggregate("users.{name, id}", [Value::from("Tom"), Value::from(2)])
//!     .unwrap();
//!
//! assert_eq!(table.render().unwrap(), "Ter, Tom");
//! ```

pub mod error;
mod format;
pub mod parser;
pub mod renderer;
pub mod template;
pub mod value;

pub use error::ParseError;
pub use format::format;
pub use parser::Delimiters;
pub use renderer::{RenderConfig, RenderError};
pub use template::{
    FormalParam, GroupBuilder, TemplateDefinition, TemplateError, TemplateGroup, TemplateInstance,
};
pub use value::{
    Aggregate, Dictionary, DictionaryDefault, ModelObject, PropertyAccessible, Value,
};

use thiserror::Error;

/// Errors from the one-shot helpers, which both load and render
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Render template text with the given attributes
///
/// ```rust
/// use stencil::render;
///
/// let out = render("Hello, <name>!", [("name", "World")]).unwrap();
/// assert_eq!(out, "Hello, World!");
/// ```
pub fn render<I, K, V>(source: &str, attributes: I) -> Result<String, Error>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    render_with_config(source, attributes, &RenderConfig::default())
}

/// Render template text with the given attributes and configuration
pub fn render_with_config<I, K, V>(
    source: &str,
    attributes: I,
    config: &RenderConfig,
) -> Result<String, Error>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    let mut instance = TemplateInstance::from_source(source)?;
    for (name, value) in attributes {
        instance.bind(name, value);
    }
    Ok(instance.render_with_config(config)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_simple() {
        assert_eq!(render("<a>-<b>", [("a", 1), ("b", 2)]).unwrap(), "1-2");
    }

    #[test]
    fn test_render_repeated_attribute() {
        let out = render("<name>", [("name", "parrt"), ("name", "tombu")]).unwrap();
        assert_eq!(out, "parrttombu");
    }

    #[test]
    fn test_render_parse_error() {
        let err = render("<if(x)>", Vec::<(&str, Value)>::new()).unwrap_err();
        assert!(matches!(err, Error::Template(TemplateError::Parse { .. })));
    }

    #[test]
    fn test_render_with_config() {
        let config = RenderConfig::new().with_max_depth(0);
        let err = render_with_config("x", [("a", 1)], &config).unwrap_err();
        assert!(matches!(err, Error::Render(RenderError::Cycle { .. })));
    }
}
