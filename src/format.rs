//! One-shot formatting with positional placeholders

use crate::renderer::RenderConfig;
use crate::template::TemplateInstance;
use crate::value::Value;
use crate::Error;

/// Render `template` with the n-th argument bound to `<n>` (1-based),
/// wrapping at `line_width` columns.
///
/// ```rust
/// use stencil::{format, Value};
///
/// let out = format(10, "<1; separator=\", \", wrap>", [Value::from(vec![1, 2, 3, 4, 5])]).unwrap();
/// assert_eq!(out, "1, 2, 3,\n4, 5");
/// ```
pub fn format<I, V>(line_width: usize, template: &str, args: I) -> Result<String, Error>
where
    I: IntoIterator<Item = V>,
    V: Into<Value>,
{
    let mut instance = TemplateInstance::from_source(template)?;
    for (index, arg) in args.into_iter().enumerate() {
        instance.bind((index + 1).to_string(), arg);
    }
    let config = RenderConfig::new().with_line_width(line_width);
    Ok(instance.render_with_config(&config)?)
}
