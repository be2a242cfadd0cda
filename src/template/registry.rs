//! Template groups: named registries of definitions and dictionaries

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::error::ParseError;
use crate::parser::ast::{DictDecl, DictValue, GroupItem};
use crate::parser::{
    has_definition_header, parse_body, parse_group, walk_exprs, Applied, Delimiters, Expr,
    IncludeTarget,
};
use crate::template::manifest::Manifest;
use crate::template::{TemplateDefinition, TemplateInstance};
use crate::value::{Dictionary, DictionaryDefault};

/// Errors that can occur while loading templates or building instances
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Template not found in group
    #[error("template not found: {name}")]
    NotFound { name: String },

    /// More positional values than the target accepts
    #[error("{template} takes {expected} argument(s) but {found} were given")]
    Arity {
        template: String,
        expected: usize,
        found: usize,
    },

    /// Malformed aggregate spec such as `items.{a,`
    #[error("invalid aggregate spec {spec:?}: {reason}")]
    InvalidAggregate { spec: String, reason: String },

    /// Template or group text failed to parse
    #[error("{} parse error(s) in {origin}", errors.len())]
    Parse {
        origin: String,
        text: String,
        errors: Vec<ParseError>,
    },

    #[error("error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Invalid `group.toml`
    #[error("invalid manifest {path}: {message}")]
    Manifest { path: PathBuf, message: String },

    /// A template file declares a template other than its file stem
    #[error("{path} must define template '{expected}' but defines '{found}'")]
    NameMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },
}

impl TemplateError {
    /// Human-readable report; parse errors are rendered against their source
    pub fn report(&self) -> String {
        match self {
            TemplateError::Parse {
                origin,
                text,
                errors,
            } => errors
                .iter()
                .map(|e| e.format(text, origin))
                .collect::<Vec<_>>()
                .join("\n"),
            other => other.to_string(),
        }
    }
}

#[derive(Debug)]
struct GroupData {
    name: String,
    delimiters: Delimiters,
    templates: HashMap<String, Arc<TemplateDefinition>>,
    dictionaries: HashMap<String, Dictionary>,
}

/// An immutable, cheaply cloneable registry of templates
#[derive(Debug, Clone)]
pub struct TemplateGroup {
    inner: Arc<GroupData>,
}

impl TemplateGroup {
    pub fn builder(name: impl Into<String>) -> GroupBuilder {
        GroupBuilder::new(name)
    }

    /// Group from group-file text
    pub fn from_group_str(text: &str) -> Result<Self, TemplateError> {
        let mut builder = GroupBuilder::new("group");
        builder.load_group_str("<string>", text)?;
        builder.build()
    }

    /// Group from a `.stg` file, named after the file stem
    pub fn from_group_file(path: impl AsRef<Path>) -> Result<Self, TemplateError> {
        let path = path.as_ref();
        let mut builder = GroupBuilder::new(file_stem(path).unwrap_or("group"));
        builder.load_group_file(path)?;
        builder.build()
    }

    /// Group from a directory of `.st` files, named after the directory
    pub fn from_dir(path: impl AsRef<Path>) -> Result<Self, TemplateError> {
        let path = path.as_ref();
        let mut builder = GroupBuilder::new(file_stem(path).unwrap_or("group"));
        builder.load_dir(path)?;
        builder.build()
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn delimiters(&self) -> Delimiters {
        self.inner.delimiters
    }

    pub fn get(&self, name: &str) -> Option<&Arc<TemplateDefinition>> {
        self.inner.templates.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.templates.contains_key(name)
    }

    /// Template names, sorted
    pub fn template_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.inner.templates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn dictionary(&self, name: &str) -> Option<&Dictionary> {
        self.inner.dictionaries.get(name)
    }

    /// Fresh instance of a named template
    pub fn get_instance_of(&self, name: &str) -> Result<TemplateInstance, TemplateError> {
        let definition = self.get(name).ok_or_else(|| TemplateError::NotFound {
            name: name.to_string(),
        })?;
        Ok(TemplateInstance::new(Arc::clone(definition), self.clone()))
    }

    /// Ad-hoc template that can include this group's templates
    pub fn instance_from_source(&self, source: &str) -> Result<TemplateInstance, TemplateError> {
        self.instance_from_source_with_delimiters(source, self.delimiters())
    }

    /// Like [`Self::instance_from_source`], but `source` uses its own
    /// delimiters while still seeing this group's templates
    pub fn instance_from_source_with_delimiters(
        &self,
        source: &str,
        delimiters: Delimiters,
    ) -> Result<TemplateInstance, TemplateError> {
        let body = parse_body(source, 0, delimiters, false).map_err(|errors| {
            TemplateError::Parse {
                origin: "<template>".to_string(),
                text: source.to_string(),
                errors,
            }
        })?;
        let definition = TemplateDefinition::new("anonymous", Vec::new(), body);
        check_arity(&definition, |name| self.get(name).map(Arc::as_ref))?;
        Ok(TemplateInstance::new(Arc::new(definition), self.clone()))
    }
}

impl Default for TemplateGroup {
    fn default() -> Self {
        Self {
            inner: Arc::new(GroupData {
                name: "anonymous".to_string(),
                delimiters: Delimiters::default(),
                templates: HashMap::new(),
                dictionaries: HashMap::new(),
            }),
        }
    }
}

fn file_stem(path: &Path) -> Option<&str> {
    path.file_stem().and_then(|s| s.to_str())
}

enum Staged {
    Template(TemplateDefinition),
    Dictionary(String, Dictionary),
}

/// Collects definitions from several sources, then freezes them into a
/// [`TemplateGroup`]. A load that fails leaves the builder unchanged.
#[derive(Debug, Clone)]
pub struct GroupBuilder {
    name: String,
    delimiters: Delimiters,
    templates: HashMap<String, Arc<TemplateDefinition>>,
    dictionaries: HashMap<String, Dictionary>,
}

impl GroupBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            delimiters: Delimiters::default(),
            templates: HashMap::new(),
            dictionaries: HashMap::new(),
        }
    }

    /// Delimiters for templates loaded after this call
    pub fn with_delimiters(mut self, delimiters: Delimiters) -> Self {
        self.delimiters = delimiters;
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Load group-file text; `origin` names the text in error reports
    pub fn load_group_str(&mut self, origin: &str, text: &str) -> Result<(), TemplateError> {
        let (staged, delimiters) = self.stage_group(origin, text)?;
        if let Some(delimiters) = delimiters {
            self.delimiters = delimiters;
        }
        self.commit(origin, staged);
        Ok(())
    }

    pub fn load_group_file(&mut self, path: impl AsRef<Path>) -> Result<(), TemplateError> {
        let path = path.as_ref();
        let text = read(path)?;
        self.load_group_str(&path.display().to_string(), &text)
    }

    /// Load every `*.st` file of a directory, in file-name order.
    ///
    /// A file starting with a `name(params) ::=` header is a one-template
    /// group file whose name must match the file stem. Otherwise the whole
    /// file, less one final newline, is the body; parameters come from
    /// `group.toml` when it lists the template and are inferred from the
    /// body's attribute references otherwise.
    pub fn load_dir(&mut self, dir: impl AsRef<Path>) -> Result<(), TemplateError> {
        let dir = dir.as_ref();
        let manifest = Manifest::load(dir)?.unwrap_or_default();
        let delimiters = manifest.delimiters.unwrap_or(self.delimiters);

        let io_err = |source| TemplateError::Io {
            path: dir.to_path_buf(),
            source,
        };
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "st") {
                files.push(path);
            }
        }
        files.sort();

        let mut staged = Vec::new();
        for path in &files {
            let Some(stem) = file_stem(path) else {
                continue;
            };
            let text = read(path)?;
            let origin = path.display().to_string();

            if has_definition_header(&text) {
                let (items, _) = stage_group_with(&origin, &text, delimiters)?;
                for item in items {
                    if let Staged::Template(def) = &item {
                        if def.name != stem {
                            return Err(TemplateError::NameMismatch {
                                path: path.clone(),
                                expected: stem.to_string(),
                                found: def.name.clone(),
                            });
                        }
                    }
                    staged.push(item);
                }
                continue;
            }

            let body = parse_body(strip_final_newline(&text), 0, delimiters, false)
                .map_err(|errors| TemplateError::Parse {
                    origin: origin.clone(),
                    text: text.clone(),
                    errors,
                })?;
            let definition = match manifest.params(stem) {
                Some(params) => TemplateDefinition::new(stem, params, body),
                None => TemplateDefinition::with_inferred_params(stem, body),
            };
            log::debug!(
                "loaded {} with params {:?}{}",
                origin,
                definition.param_names(),
                if definition.inferred { " (inferred)" } else { "" }
            );
            staged.push(Staged::Template(definition));
        }

        if let Some(name) = manifest.name {
            self.name = name;
        }
        self.delimiters = delimiters;
        self.commit(&dir.display().to_string(), staged);
        Ok(())
    }

    /// Define a template from text using the builder's delimiters
    pub fn define(
        &mut self,
        name: &str,
        params: &[&str],
        source: &str,
    ) -> Result<(), TemplateError> {
        let params = params.iter().map(|p| super::FormalParam::new(*p)).collect();
        let definition = TemplateDefinition::parse(name, params, source, self.delimiters)
            .map_err(|errors| TemplateError::Parse {
                origin: name.to_string(),
                text: source.to_string(),
                errors,
            })?;
        self.commit(name, vec![Staged::Template(definition)]);
        Ok(())
    }

    pub fn define_dictionary(&mut self, name: impl Into<String>, dictionary: Dictionary) {
        let name = name.into();
        let origin = format!("dictionary {}", name);
        self.commit(&origin, vec![Staged::Dictionary(name, dictionary)]);
    }

    /// Validate include arities and freeze the group
    pub fn build(self) -> Result<TemplateGroup, TemplateError> {
        for definition in self.templates.values() {
            check_arity(definition, |name| self.templates.get(name).map(Arc::as_ref))?;
        }
        log::debug!(
            "built group '{}' with {} template(s) and {} dictionary(ies)",
            self.name,
            self.templates.len(),
            self.dictionaries.len()
        );
        Ok(TemplateGroup {
            inner: Arc::new(GroupData {
                name: self.name,
                delimiters: self.delimiters,
                templates: self.templates,
                dictionaries: self.dictionaries,
            }),
        })
    }

    fn stage_group(
        &self,
        origin: &str,
        text: &str,
    ) -> Result<(Vec<Staged>, Option<Delimiters>), TemplateError> {
        stage_group_with(origin, text, self.delimiters)
    }

    fn commit(&mut self, origin: &str, staged: Vec<Staged>) {
        for item in staged {
            match item {
                Staged::Template(definition) => {
                    if self.templates.contains_key(&definition.name) {
                        log::warn!("{}: redefinition of template '{}'", origin, definition.name);
                    }
                    self.templates
                        .insert(definition.name.clone(), Arc::new(definition));
                }
                Staged::Dictionary(name, dictionary) => {
                    if self.dictionaries.contains_key(&name) {
                        log::warn!("{}: redefinition of dictionary '{}'", origin, name);
                    }
                    self.dictionaries.insert(name, dictionary);
                }
            }
        }
    }
}

/// Template files conventionally end with a newline that is not output
fn strip_final_newline(text: &str) -> &str {
    text.strip_suffix('\n')
        .map(|t| t.strip_suffix('\r').unwrap_or(t))
        .unwrap_or(text)
}

fn read(path: &Path) -> Result<String, TemplateError> {
    std::fs::read_to_string(path).map_err(|source| TemplateError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse group text and every template body in it without touching any
/// builder. Returns the declared delimiters, if any.
fn stage_group_with(
    origin: &str,
    text: &str,
    default_delimiters: Delimiters,
) -> Result<(Vec<Staged>, Option<Delimiters>), TemplateError> {
    let parse_error = |errors| TemplateError::Parse {
        origin: origin.to_string(),
        text: text.to_string(),
        errors,
    };

    let file = parse_group(text).map_err(parse_error)?;
    let declared = file
        .delimiters
        .map(|(start, stop)| Delimiters::new(start, stop));
    let delimiters = declared.unwrap_or(default_delimiters);

    let mut staged = Vec::new();
    let mut errors = Vec::new();
    for item in file.items {
        match item.node {
            GroupItem::Template(decl) => {
                match parse_body(&decl.body, decl.body_offset, delimiters, false) {
                    Ok(body) => staged.push(Staged::Template(TemplateDefinition::new(
                        decl.name.node,
                        decl.params,
                        body,
                    ))),
                    Err(errs) => errors.extend(errs),
                }
            }
            GroupItem::Dictionary(decl) => {
                let name = decl.name.node.clone();
                staged.push(Staged::Dictionary(name, dictionary_from(decl)));
            }
        }
    }

    if !errors.is_empty() {
        return Err(parse_error(errors));
    }
    log::debug!("parsed {} definition(s) from {}", staged.len(), origin);
    Ok((staged, declared))
}

fn dictionary_from(decl: DictDecl) -> Dictionary {
    let mut dictionary = Dictionary::new();
    for (key, value) in decl.entries {
        match value {
            DictValue::Str(s) => dictionary.insert(key, s),
            DictValue::Bool(b) => dictionary.insert(key, b),
            DictValue::Key => {
                let value = key.clone();
                dictionary.insert(key, value)
            }
        }
    }
    match decl.default {
        Some(DictValue::Str(s)) => dictionary.with_default(DictionaryDefault::Value(s)),
        Some(DictValue::Bool(b)) => dictionary.with_default(DictionaryDefault::Bool(b)),
        Some(DictValue::Key) => dictionary.with_default(DictionaryDefault::Key),
        None => dictionary,
    }
}

/// Reject includes and applications that pass more positional values than
/// the target template accepts. Targets that cannot be resolved statically
/// are checked at render time.
fn check_arity<'g>(
    definition: &TemplateDefinition,
    lookup: impl Fn(&str) -> Option<&'g TemplateDefinition>,
) -> Result<(), TemplateError> {
    let mut failure = None;
    walk_exprs(&definition.body, &mut |expr| {
        if failure.is_some() {
            return;
        }
        match &expr.node {
            Expr::Include {
                target: IncludeTarget::Named(name),
                args,
            } => {
                if let Some(target) = lookup(name) {
                    if args.len() > target.params.len() {
                        failure = Some(TemplateError::Arity {
                            template: name.clone(),
                            expected: target.params.len(),
                            found: args.len(),
                        });
                    }
                }
            }
            Expr::Map { sources, templates } => {
                for applied in templates {
                    let (name, accepted, extra) = match applied {
                        Applied::Template {
                            target: IncludeTarget::Named(name),
                            args,
                        } => match lookup(name) {
                            Some(target) => (name.as_str(), target.params.len(), args.len()),
                            None => continue,
                        },
                        Applied::Template { .. } => continue,
                        Applied::Anonymous(def) => (def.name.as_str(), def.params.len(), 0),
                    };
                    if let Some(found) = application_overflow(sources.len(), accepted, extra) {
                        failure = Some(TemplateError::Arity {
                            template: name.to_string(),
                            expected: accepted.max(1),
                            found,
                        });
                        return;
                    }
                }
            }
            _ => {}
        }
    });
    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Number of positional values an application passes when that exceeds what
/// the template accepts. A template without formals takes one element as `it`.
pub(crate) fn application_overflow(sources: usize, accepted: usize, extra: usize) -> Option<usize> {
    let passed = sources + extra;
    let capacity = if accepted == 0 { 1 } else { accepted };
    (passed > capacity).then_some(passed)
}
