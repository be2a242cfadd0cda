//! Parsed template definitions

use std::collections::HashSet;

use crate::error::ParseError;
use crate::parser::{self, walk_exprs, Applied, Body, Delimiters, Expr};

/// A declared formal parameter, optionally with a literal default
#[derive(Debug, Clone, PartialEq)]
pub struct FormalParam {
    pub name: String,
    pub default: Option<String>,
}

impl FormalParam {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
        }
    }

    pub fn with_default(name: impl Into<String>, default: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: Some(default.into()),
        }
    }
}

/// A named template body with its formal parameters
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateDefinition {
    pub name: String,
    pub params: Vec<FormalParam>,
    pub body: Body,
    /// Parameters were derived from attribute references rather than
    /// declared; they are positional slots only and do not stop lookup
    pub inferred: bool,
}

/// Names bound by application itself
const IMPLICIT_ATTRIBUTES: &[&str] = &["it", "i", "i0"];

impl TemplateDefinition {
    pub fn new(name: impl Into<String>, params: Vec<FormalParam>, body: Body) -> Self {
        Self {
            name: name.into(),
            params,
            body,
            inferred: false,
        }
    }

    /// Definition of an anonymous `{x, y | ...}` template
    pub fn anonymous(name: impl Into<String>, params: Vec<String>, body: Body) -> Self {
        Self::new(name, params.into_iter().map(FormalParam::new).collect(), body)
    }

    /// Definition whose parameters are the body's free attribute references
    /// in order of first appearance
    pub fn with_inferred_params(name: impl Into<String>, body: Body) -> Self {
        let params = free_attributes(&body)
            .into_iter()
            .map(FormalParam::new)
            .collect();
        Self {
            name: name.into(),
            params,
            body,
            inferred: true,
        }
    }

    /// Parse template text into a definition with the given parameters
    pub fn parse(
        name: impl Into<String>,
        params: Vec<FormalParam>,
        source: &str,
        delims: Delimiters,
    ) -> Result<Self, Vec<ParseError>> {
        let body = parser::parse_template(source, delims)?;
        Ok(Self::new(name, params, body))
    }

    pub fn param(&self, name: &str) -> Option<&FormalParam> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Whether `name` is a declared formal; lookup of an unbound declared
    /// formal stops at this template
    pub fn declares(&self, name: &str) -> bool {
        !self.inferred && self.param(name).is_some()
    }

    pub fn param_names(&self) -> Vec<&str> {
        self.params.iter().map(|p| p.name.as_str()).collect()
    }
}

/// Attribute references that are not bound by an enclosing anonymous
/// template, in order of first appearance
fn free_attributes(body: &Body) -> Vec<String> {
    let mut lambda_params = HashSet::new();
    walk_exprs(body, &mut |expr| {
        let defs: Vec<&TemplateDefinition> = match &expr.node {
            Expr::Subtemplate(def) => vec![def.as_ref()],
            Expr::Map { templates, .. } => templates
                .iter()
                .filter_map(|applied| match applied {
                    Applied::Anonymous(def) => Some(def.as_ref()),
                    Applied::Template { .. } => None,
                })
                .collect(),
            _ => Vec::new(),
        };
        for def in defs {
            lambda_params.extend(def.params.iter().map(|p| p.name.clone()));
        }
    });

    let mut seen = HashSet::new();
    let mut names = Vec::new();
    walk_exprs(body, &mut |expr| {
        if let Expr::Attribute(name) = &expr.node {
            if !IMPLICIT_ATTRIBUTES.contains(&name.as_str())
                && !lambda_params.contains(name)
                && seen.insert(name.clone())
            {
                names.push(name.clone());
            }
        }
    });
    names
}
