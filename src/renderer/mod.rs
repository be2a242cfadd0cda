//! Renderer for template instances
//!
//! Walks an instance's body against the dynamic scope chain and writes the
//! result into a column-tracking buffer that implements `separator`, `wrap`
//! and `anchor`.

pub mod config;
mod interpreter;
mod writer;

pub use config::RenderConfig;

use thiserror::Error;

use crate::template::TemplateInstance;
use interpreter::Interpreter;
use writer::Writer;

/// Errors that can occur while rendering
#[derive(Debug, Error)]
pub enum RenderError {
    /// Include or application of a name the group does not define
    #[error("template not found: {name}")]
    UnknownTemplate { name: String },

    /// More positional values than the target accepts
    #[error("{template} takes {expected} argument(s) but {found} were given")]
    Arity {
        template: String,
        expected: usize,
        found: usize,
    },

    /// Instance nesting passed `RenderConfig::max_depth`
    #[error("template recursion too deep: {}", chain.join(" -> "))]
    Cycle { chain: Vec<String> },
}

/// Render an instance; nothing is returned unless the whole render succeeds
pub(crate) fn render(
    instance: &TemplateInstance,
    config: &RenderConfig,
) -> Result<String, RenderError> {
    let mut writer = Writer::new(config.line_width);
    Interpreter::new(config).render_instance(instance, None, &mut writer)?;
    Ok(writer.finish())
}
