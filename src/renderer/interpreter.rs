//! Expression evaluation against the dynamic scope chain

use std::sync::Arc;

use crate::parser::{
    Applied, Body, Builtin, Expr, ExprOptions, IncludeTarget, Node, PropertyName, Spanned,
};
use crate::renderer::writer::Writer;
use crate::renderer::{RenderConfig, RenderError};
use crate::template::{application_overflow, TemplateDefinition, TemplateInstance};
use crate::value::Value;

/// One link of the invocation chain: an instance being rendered and the
/// instance that embedded it
pub(crate) struct Scope<'s> {
    instance: &'s TemplateInstance,
    parent: Option<&'s Scope<'s>>,
}

impl Scope<'_> {
    /// Dynamically scoped attribute lookup. A declared formal that is not
    /// bound resolves to its default (or nothing) without consulting callers.
    fn resolve(&self, name: &str) -> Value {
        let mut current = Some(self);
        while let Some(scope) = current {
            if let Some(value) = scope.instance.get(name) {
                return value;
            }
            let definition = scope.instance.definition();
            if definition.declares(name) {
                return definition
                    .param(name)
                    .and_then(|p| p.default.clone())
                    .map(Value::Str)
                    .unwrap_or_default();
            }
            current = scope.parent;
        }
        self.instance
            .group()
            .dictionary(name)
            .cloned()
            .map(Value::Map)
            .unwrap_or_default()
    }
}

/// Evaluated expression options
#[derive(Debug, Default)]
struct Options {
    separator: Option<String>,
    wrap: Option<String>,
    anchor: bool,
    null: Option<String>,
}

pub(crate) struct Interpreter<'c> {
    config: &'c RenderConfig,
    /// Names of the instances currently rendering, outermost first
    stack: Vec<String>,
}

impl<'c> Interpreter<'c> {
    pub fn new(config: &'c RenderConfig) -> Self {
        Self {
            config,
            stack: Vec::new(),
        }
    }

    pub fn render_instance(
        &mut self,
        instance: &TemplateInstance,
        parent: Option<&Scope<'_>>,
        w: &mut Writer,
    ) -> Result<(), RenderError> {
        self.enter(instance.name())?;
        log::trace!("rendering {} at depth {}", instance.name(), self.stack.len());
        let scope = Scope { instance, parent };
        let result = self.write_body(&instance.definition().body, &scope, w);
        self.stack.pop();
        result
    }

    fn enter(&mut self, name: &str) -> Result<(), RenderError> {
        if self.stack.len() >= self.config.max_depth {
            let start = self.stack.iter().rposition(|n| n == name).unwrap_or(0);
            let mut chain = self.stack[start..].to_vec();
            chain.push(name.to_string());
            return Err(RenderError::Cycle { chain });
        }
        self.stack.push(name.to_string());
        Ok(())
    }

    fn write_body(
        &mut self,
        body: &Body,
        scope: &Scope<'_>,
        w: &mut Writer,
    ) -> Result<(), RenderError> {
        for node in body {
            match &node.node {
                Node::Text(text) => w.write(text),
                Node::Expr { expr, options } => self.write_expr(expr, options, scope, w)?,
                Node::If {
                    branches,
                    otherwise,
                } => {
                    let mut taken = None;
                    for (condition, branch) in branches {
                        if self.eval(condition, scope)?.is_truthy() {
                            taken = Some(branch);
                            break;
                        }
                    }
                    if let Some(branch) = taken.or(otherwise.as_ref()) {
                        self.write_body(branch, scope, w)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn write_expr(
        &mut self,
        expr: &Spanned<Expr>,
        options: &ExprOptions,
        scope: &Scope<'_>,
        w: &mut Writer,
    ) -> Result<(), RenderError> {
        let value = self.eval(expr, scope)?;
        let options = self.eval_options(options, scope)?;

        if options.anchor {
            w.push_anchor();
        }
        let result = self.write_value(&value, &options, scope, w);
        if options.anchor {
            w.pop_anchor();
        }
        result
    }

    fn eval_options(
        &mut self,
        options: &ExprOptions,
        scope: &Scope<'_>,
    ) -> Result<Options, RenderError> {
        if options.is_empty() {
            return Ok(Options::default());
        }
        let mut text = |expr: &Option<Spanned<Expr>>| -> Result<Option<String>, RenderError> {
            match expr {
                Some(expr) => {
                    let value = self.eval(expr, scope)?;
                    self.to_text(&value, scope).map(Some)
                }
                None => Ok(None),
            }
        };
        Ok(Options {
            separator: text(&options.separator)?,
            wrap: text(&options.wrap)?,
            anchor: options.anchor,
            null: text(&options.null)?,
        })
    }

    fn write_value(
        &mut self,
        value: &Value,
        options: &Options,
        scope: &Scope<'_>,
        w: &mut Writer,
    ) -> Result<(), RenderError> {
        match value {
            Value::List(items) => self.write_sequence(items, options, scope, w),
            Value::Map(_) => {
                let keys = value.clone().into_items();
                self.write_sequence(&keys, options, scope, w)
            }
            Value::Template(instance) => self.render_instance(instance, Some(scope), w),
            Value::Null => {
                if let Some(null) = &options.null {
                    w.write(null);
                }
                Ok(())
            }
            scalar => {
                if let Some(text) = scalar.to_plain_string() {
                    w.write(&text);
                }
                Ok(())
            }
        }
    }

    /// Write elements with separator and wrapping. Null elements are
    /// dropped unless a `null` replacement is given.
    fn write_sequence(
        &mut self,
        items: &[Value],
        options: &Options,
        scope: &Scope<'_>,
        w: &mut Writer,
    ) -> Result<(), RenderError> {
        let keep = |item: &Value| !item.is_null() || options.null.is_some();
        let separator = options.separator.as_deref().unwrap_or("");
        let trimmed = separator.trim_end();
        let wrapping = options.wrap.is_some() && w.line_width().is_some();

        let mut remaining = items.iter().filter(|item| keep(item)).count();
        let mut first = true;
        for item in items.iter().filter(|item| keep(item)) {
            remaining -= 1;
            if first {
                first = false;
                self.write_value(item, options, scope, w)?;
                continue;
            }
            if !wrapping {
                w.write(separator);
                self.write_value(item, options, scope, w)?;
                continue;
            }

            let text = self.element_text(item, options, scope)?;
            let width = text.lines().next().map_or(0, |line| line.chars().count());
            let trailing = if remaining == 0 {
                0
            } else {
                trimmed.chars().count()
            };
            let needed = separator.chars().count() + width + trailing;
            if w.exceeds(needed) && !w.line_is_blank() {
                w.write(trimmed);
                w.write(options.wrap.as_deref().unwrap_or("\n"));
            } else {
                w.write(separator);
            }
            w.write(&text);
        }
        Ok(())
    }

    /// Render one sequence element on its own to measure it
    fn element_text(
        &mut self,
        item: &Value,
        options: &Options,
        scope: &Scope<'_>,
    ) -> Result<String, RenderError> {
        let mut scratch = Writer::new(None);
        let inner = Options {
            separator: options.separator.clone(),
            null: options.null.clone(),
            ..Options::default()
        };
        self.write_value(item, &inner, scope, &mut scratch)?;
        Ok(scratch.finish())
    }

    /// String form of a value in the current scope
    fn to_text(&mut self, value: &Value, scope: &Scope<'_>) -> Result<String, RenderError> {
        if let Some(text) = value.to_plain_string() {
            return Ok(text);
        }
        let mut scratch = Writer::new(None);
        self.write_value(value, &Options::default(), scope, &mut scratch)?;
        Ok(scratch.finish())
    }

    fn eval(&mut self, expr: &Spanned<Expr>, scope: &Scope<'_>) -> Result<Value, RenderError> {
        match &expr.node {
            Expr::Attribute(name) => Ok(scope.resolve(name)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::List(elements) => {
                let mut items = Vec::with_capacity(elements.len());
                for element in elements {
                    match self.eval(element, scope)? {
                        Value::List(nested) => items.extend(nested),
                        value => items.push(value),
                    }
                }
                Ok(Value::List(items))
            }
            Expr::Paren(inner) => {
                let value = self.eval(inner, scope)?;
                self.to_text(&value, scope).map(Value::Str)
            }
            Expr::Property { base, name } => {
                let base = self.eval(base, scope)?;
                let key = match name {
                    PropertyName::Static(name) => name.clone(),
                    PropertyName::Dynamic(key) => {
                        let key = self.eval(key, scope)?;
                        self.to_text(&key, scope)?
                    }
                };
                Ok(base.property(&key))
            }
            Expr::Include { target, args } => {
                let definition = self.lookup(target, scope)?;
                if args.len() > definition.params.len() {
                    return Err(RenderError::Arity {
                        template: definition.name.clone(),
                        expected: definition.params.len(),
                        found: args.len(),
                    });
                }
                let mut instance =
                    TemplateInstance::new(definition.clone(), scope.instance.group().clone());
                for (param, arg) in definition.params.iter().zip(args) {
                    let value = self.eval(arg, scope)?;
                    if !value.is_null() {
                        instance.bind(param.name.as_str(), value);
                    }
                }
                Ok(Value::Template(instance))
            }
            Expr::Function { func, arg } => {
                let value = self.eval(arg, scope)?;
                self.call(*func, value, scope)
            }
            Expr::Subtemplate(definition) => Ok(Value::Template(TemplateInstance::new(
                Arc::clone(definition),
                scope.instance.group().clone(),
            ))),
            Expr::Map { sources, templates } => self.apply(sources, templates, scope),
            Expr::Not(inner) => Ok(Value::Bool(!self.eval(inner, scope)?.is_truthy())),
            Expr::And(left, right) => {
                let value = self.eval(left, scope)?.is_truthy() && self.eval(right, scope)?.is_truthy();
                Ok(Value::Bool(value))
            }
            Expr::Or(left, right) => {
                let value = self.eval(left, scope)?.is_truthy() || self.eval(right, scope)?.is_truthy();
                Ok(Value::Bool(value))
            }
        }
    }

    fn lookup(
        &mut self,
        target: &IncludeTarget,
        scope: &Scope<'_>,
    ) -> Result<Arc<TemplateDefinition>, RenderError> {
        let name = match target {
            IncludeTarget::Named(name) => name.clone(),
            IncludeTarget::Indirect(expr) => {
                let value = self.eval(expr, scope)?;
                self.to_text(&value, scope)?
            }
        };
        scope
            .instance
            .group()
            .get(&name)
            .cloned()
            .ok_or(RenderError::UnknownTemplate { name })
    }

    /// Instantiate the applied templates once per element. The result is a
    /// list of instances that render with the applying instance as parent.
    fn apply(
        &mut self,
        sources: &[Spanned<Expr>],
        templates: &[Applied],
        scope: &Scope<'_>,
    ) -> Result<Value, RenderError> {
        let mut columns = Vec::with_capacity(sources.len());
        for source in sources {
            columns.push(self.eval(source, scope)?.into_items());
        }

        let mut targets = Vec::with_capacity(templates.len());
        for applied in templates {
            let (definition, args) = match applied {
                Applied::Template { target, args } => {
                    let definition = self.lookup(target, scope)?;
                    let mut values = Vec::with_capacity(args.len());
                    for arg in args {
                        values.push(self.eval(arg, scope)?);
                    }
                    (definition, values)
                }
                Applied::Anonymous(definition) => (Arc::clone(definition), Vec::new()),
            };
            if let Some(found) =
                application_overflow(sources.len(), definition.params.len(), args.len())
            {
                return Err(RenderError::Arity {
                    template: definition.name.clone(),
                    expected: definition.params.len().max(1),
                    found,
                });
            }
            targets.push((definition, args));
        }
        if targets.is_empty() {
            return Ok(Value::Null);
        }

        let rows = columns.iter().map(Vec::len).max().unwrap_or(0);
        let group = scope.instance.group();
        let mut results = Vec::with_capacity(rows);
        let mut applied = 0usize;
        for row in 0..rows {
            let elements: Vec<Value> = columns
                .iter()
                .map(|column| column.get(row).cloned().unwrap_or_default())
                .collect();
            if elements.iter().all(Value::is_null) {
                results.push(Value::Null);
                continue;
            }

            let (definition, args) = &targets[applied % targets.len()];
            let mut instance = TemplateInstance::new(Arc::clone(definition), group.clone());
            if definition.params.is_empty() {
                if let Some(element) = elements.into_iter().next() {
                    instance.bind("it", element);
                }
            } else {
                let positional = elements.into_iter().chain(args.iter().cloned());
                for (param, value) in definition.params.iter().zip(positional) {
                    if !value.is_null() {
                        instance.bind(param.name.as_str(), value);
                    }
                }
            }
            instance.bind("i", applied + 1).bind("i0", applied);
            results.push(Value::Template(instance));
            applied += 1;
        }
        Ok(Value::List(results))
    }

    fn call(&mut self, func: Builtin, value: Value, scope: &Scope<'_>) -> Result<Value, RenderError> {
        let result = match func {
            Builtin::First => value.into_items().into_iter().next().unwrap_or_default(),
            Builtin::Last => value.into_items().pop().unwrap_or_default(),
            Builtin::Rest => Value::List(value.into_items().into_iter().skip(1).collect()),
            Builtin::Reverse => {
                let mut items = value.into_items();
                items.reverse();
                Value::List(items)
            }
            Builtin::Length => Value::from(value.into_items().len()),
            Builtin::Strip => Value::List(
                value
                    .into_items()
                    .into_iter()
                    .filter(|item| !item.is_null())
                    .collect(),
            ),
            Builtin::Trunc => {
                let mut items = value.into_items();
                items.pop();
                Value::List(items)
            }
            Builtin::Trim => Value::Str(self.to_text(&value, scope)?.trim().to_string()),
            Builtin::Strlen => Value::from(self.to_text(&value, scope)?.chars().count()),
        };
        Ok(result)
    }
}
