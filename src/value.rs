//! Attribute values bound to template instances

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::template::TemplateInstance;

/// A value that can be bound to a template attribute
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    /// Group dictionaries and caller-supplied maps
    Map(Dictionary),
    /// Model object or aggregate with named properties
    Object(Arc<dyn PropertyAccessible>),
    /// Template instance rendered in the scope of the template embedding it
    Template(TemplateInstance),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Condition truthiness: false, null, empty strings and empty lists are false
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Int(_)
            | Value::Float(_)
            | Value::Map(_)
            | Value::Object(_)
            | Value::Template(_) => true,
        }
    }

    /// Resolve `self.name`; anything without properties yields `Null`
    pub fn property(&self, name: &str) -> Value {
        match self {
            Value::Map(dict) => dict.lookup(name),
            Value::Object(obj) => obj.property(name).unwrap_or_default(),
            _ => Value::Null,
        }
    }

    /// View the value as a sequence. Scalars are one-element sequences,
    /// `Null` is empty and a map yields its keys.
    pub fn into_items(self) -> Vec<Value> {
        match self {
            Value::Null => Vec::new(),
            Value::List(items) => items,
            Value::Map(dict) => dict.keys().map(|k| Value::Str(k.to_string())).collect(),
            other => vec![other],
        }
    }

    /// Render a value that needs no template context
    pub fn to_plain_string(&self) -> Option<String> {
        match self {
            Value::Null => Some(String::new()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(n) => Some(n.to_string()),
            Value::Float(n) => Some(n.to_string()),
            Value::Str(s) => Some(s.clone()),
            Value::Object(obj) => Some(obj.render()),
            Value::List(_) | Value::Map(_) | Value::Template(_) => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Object(_) => "object",
            Value::Template(_) => "template",
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n.into())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Int(n.into())
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Int(i64::try_from(n).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}

impl From<Dictionary> for Value {
    fn from(dict: Dictionary) -> Self {
        Value::Map(dict)
    }
}

impl From<ModelObject> for Value {
    fn from(obj: ModelObject) -> Self {
        Value::Object(Arc::new(obj))
    }
}

impl From<TemplateInstance> for Value {
    fn from(instance: TemplateInstance) -> Self {
        Value::Template(instance)
    }
}

/// Property lookup for caller model types
pub trait PropertyAccessible: fmt::Debug + Send + Sync {
    /// Value of the named property, or `None` when the object has none
    fn property(&self, name: &str) -> Option<Value>;

    /// Text emitted when the object itself is rendered
    fn render(&self) -> String;
}

/// What a map returns for keys it does not contain
#[derive(Debug, Clone, PartialEq)]
pub enum DictionaryDefault {
    Value(String),
    Bool(bool),
    /// The requested key itself
    Key,
}

/// Ordered string-keyed map
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    entries: IndexMap<String, Value>,
    default: Option<DictionaryDefault>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn with_default(mut self, default: DictionaryDefault) -> Self {
        self.default = Some(default);
        self
    }

    /// Insert or replace an entry, keeping the original position
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Entry for `key`, else the default, else `Null`
    pub fn lookup(&self, key: &str) -> Value {
        if let Some(value) = self.get(key) {
            return value.clone();
        }
        match &self.default {
            Some(DictionaryDefault::Value(s)) => Value::Str(s.clone()),
            Some(DictionaryDefault::Bool(b)) => Value::Bool(*b),
            Some(DictionaryDefault::Key) => Value::Str(key.to_string()),
            None => Value::Null,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Record built by `bind_aggregate`: named properties, rendered as a
/// single element rather than iterated like a map
#[derive(Debug, Clone, Default)]
pub struct Aggregate {
    properties: IndexMap<String, Value>,
}

impl Aggregate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(name.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

impl PropertyAccessible for Aggregate {
    fn property(&self, name: &str) -> Option<Value> {
        self.properties.get(name).cloned()
    }

    /// Property values in order, separated by `, `
    fn render(&self) -> String {
        self.properties
            .values()
            .filter_map(Value::to_plain_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl From<Aggregate> for Value {
    fn from(aggregate: Aggregate) -> Self {
        Value::Object(Arc::new(aggregate))
    }
}

type Accessor = Arc<dyn Fn() -> Value + Send + Sync>;

/// A ready-made [`PropertyAccessible`] with public fields and accessor
/// methods.
///
/// Fields win over accessors. A property `p` is then looked up through the
/// accessors `get<P>`, `Get<P>`, `is<P>`, `Is<P>`, `has<P>`, `Has<P>` and
/// finally an accessor named exactly `p`.
#[derive(Clone, Default)]
pub struct ModelObject {
    type_name: String,
    fields: IndexMap<String, Value>,
    accessors: Vec<(String, Accessor)>,
    display: Option<String>,
}

impl ModelObject {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ..Self::default()
        }
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn accessor<F>(mut self, name: impl Into<String>, accessor: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.accessors.push((name.into(), Arc::new(accessor)));
        self
    }

    /// Text used when the object itself is rendered
    pub fn display(mut self, text: impl Into<String>) -> Self {
        self.display = Some(text.into());
        self
    }

    fn call(&self, name: &str) -> Option<Value> {
        self.accessors
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, accessor)| accessor())
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl PropertyAccessible for ModelObject {
    fn property(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.fields.get(name) {
            return Some(value.clone());
        }
        let cap = capitalize(name);
        ["get", "Get", "is", "Is", "has", "Has"]
            .iter()
            .find_map(|prefix| self.call(&format!("{}{}", prefix, cap)))
            .or_else(|| self.call(name))
    }

    fn render(&self) -> String {
        self.display.clone().unwrap_or_else(|| self.type_name.clone())
    }
}

impl fmt::Debug for ModelObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let accessors: Vec<&str> = self.accessors.iter().map(|(n, _)| n.as_str()).collect();
        f.debug_struct("ModelObject")
            .field("type_name", &self.type_name)
            .field("fields", &self.fields)
            .field("accessors", &accessors)
            .finish()
    }
}
