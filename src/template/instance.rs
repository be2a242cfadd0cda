//! Template instances: a definition bound to attribute values

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use crate::parser::Delimiters;
use crate::renderer::{self, RenderConfig, RenderError};
use crate::template::{TemplateDefinition, TemplateError, TemplateGroup};
use crate::value::{Aggregate, Value};

#[derive(Debug, Clone)]
enum Attribute {
    Single(Value),
    Multi(Vec<Value>),
}

impl Attribute {
    fn value(&self) -> Value {
        match self {
            Attribute::Single(value) => value.clone(),
            Attribute::Multi(values) => Value::List(values.clone()),
        }
    }

    fn push(&mut self, value: Value) {
        match self {
            Attribute::Single(first) => {
                let first = std::mem::take(first);
                *self = Attribute::Multi(vec![first, value]);
            }
            Attribute::Multi(values) => values.push(value),
        }
    }
}

/// A template definition together with the attributes bound to it
///
/// Binding takes `&mut self` and rendering `&self`, so attributes cannot
/// change while an instance renders.
#[derive(Debug, Clone)]
pub struct TemplateInstance {
    definition: Arc<TemplateDefinition>,
    group: TemplateGroup,
    attributes: HashMap<String, Attribute>,
}

impl TemplateInstance {
    pub fn new(definition: Arc<TemplateDefinition>, group: TemplateGroup) -> Self {
        Self {
            definition,
            group,
            attributes: HashMap::new(),
        }
    }

    /// Ad-hoc template outside any group, using `<` `>` delimiters
    pub fn from_source(source: &str) -> Result<Self, TemplateError> {
        Self::from_source_with_delimiters(source, Delimiters::default())
    }

    /// Ad-hoc template outside any group
    pub fn from_source_with_delimiters(
        source: &str,
        delimiters: Delimiters,
    ) -> Result<Self, TemplateError> {
        TemplateGroup::builder("anonymous")
            .with_delimiters(delimiters)
            .build()?
            .instance_from_source(source)
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &TemplateDefinition {
        &self.definition
    }

    pub fn group(&self) -> &TemplateGroup {
        &self.group
    }

    /// Bind a value. A second bind of the same name appends, turning the
    /// attribute into an ordered sequence.
    pub fn bind(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let name = name.into();
        let value = value.into();
        log::trace!("{}: bind {} ({})", self.definition.name, name, value.type_name());
        match self.attributes.entry(name) {
            Entry::Occupied(mut entry) => entry.get_mut().push(value),
            Entry::Vacant(entry) => {
                entry.insert(Attribute::Single(value));
            }
        }
        self
    }

    /// Append an aggregate built from a spec such as
    /// `"items.{firstName, lastName, id}"`, binding `values` positionally
    pub fn bind_aggregate<I, V>(&mut self, spec: &str, values: I) -> Result<&mut Self, TemplateError>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let (name, properties) = parse_aggregate_spec(spec)?;
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        if values.len() != properties.len() {
            return Err(TemplateError::Arity {
                template: spec.trim().to_string(),
                expected: properties.len(),
                found: values.len(),
            });
        }

        let mut aggregate = Aggregate::new();
        for (property, value) in properties.into_iter().zip(values) {
            aggregate.insert(property, value);
        }
        Ok(self.bind(name, aggregate))
    }

    /// Value bound directly to this instance; sequences come back as lists
    pub fn get(&self, name: &str) -> Option<Value> {
        self.attributes.get(name).map(Attribute::value)
    }

    pub fn attribute_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.attributes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Remove every binding of `name`
    pub fn unbind(&mut self, name: &str) -> &mut Self {
        self.attributes.remove(name);
        self
    }

    pub fn render(&self) -> Result<String, RenderError> {
        self.render_with_config(&RenderConfig::default())
    }

    /// Render with line wrapping at `width` columns
    pub fn render_with_width(&self, width: usize) -> Result<String, RenderError> {
        self.render_with_config(&RenderConfig::new().with_line_width(width))
    }

    pub fn render_with_config(&self, config: &RenderConfig) -> Result<String, RenderError> {
        renderer::render(self, config)
    }
}

/// Split `"name.{p1, p2}"` into the attribute name and property names
fn parse_aggregate_spec(spec: &str) -> Result<(String, Vec<String>), TemplateError> {
    let invalid = |reason: &str| TemplateError::InvalidAggregate {
        spec: spec.to_string(),
        reason: reason.to_string(),
    };

    let (name, rest) = spec
        .split_once('.')
        .ok_or_else(|| invalid("expected 'name.{p1, p2, ...}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(invalid("missing attribute name"));
    }

    let inner = rest
        .trim()
        .strip_prefix('{')
        .and_then(|r| r.strip_suffix('}'))
        .ok_or_else(|| invalid("properties must be enclosed in braces"))?;

    let properties: Vec<String> = inner.split(',').map(|p| p.trim().to_string()).collect();
    if properties.iter().any(String::is_empty) {
        return Err(invalid("empty property name"));
    }
    Ok((name.to_string(), properties))
}
