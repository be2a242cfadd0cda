//! Abstract Syntax Tree types for templates and group files

use std::sync::Arc;

use crate::template::{FormalParam, TemplateDefinition};

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

/// AST node with source location
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }
}

/// A parsed template body: literal text, expressions and conditionals
pub type Body = Vec<Spanned<Node>>;

/// Structural element of a template body
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Literal output text, escapes already resolved
    Text(String),
    /// `<expr>` or `<expr; options>`
    Expr {
        expr: Spanned<Expr>,
        options: ExprOptions,
    },
    /// `<if(c)>...<elseif(c)>...<else>...<endif>`
    If {
        branches: Vec<(Spanned<Expr>, Body)>,
        otherwise: Option<Body>,
    },
}

/// Expression inside a delimiter pair
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Bare attribute reference, also the positional `<1>` placeholders
    Attribute(String),
    /// Quoted string literal
    Str(String),
    /// `true` / `false`
    Bool(bool),
    /// `[a, b, c]`
    List(Vec<Spanned<Expr>>),
    /// `(expr)`, evaluates to the string form of expr
    Paren(Box<Spanned<Expr>>),
    /// `expr.name` or `expr.(expr)`
    Property {
        base: Box<Spanned<Expr>>,
        name: PropertyName,
    },
    /// `name(args)` or `(expr)(args)`
    Include {
        target: IncludeTarget,
        args: Vec<Spanned<Expr>>,
    },
    /// Builtin function call such as `first(names)`
    Function {
        func: Builtin,
        arg: Box<Spanned<Expr>>,
    },
    /// Anonymous template used as a value: `{...}`
    Subtemplate(Arc<TemplateDefinition>),
    /// Template application: `a:t()`, `a:t1(),t2()`, `a, b:{x, y | ...}`
    Map {
        sources: Vec<Spanned<Expr>>,
        templates: Vec<Applied>,
    },
    Not(Box<Spanned<Expr>>),
    And(Box<Spanned<Expr>>, Box<Spanned<Expr>>),
    Or(Box<Spanned<Expr>>, Box<Spanned<Expr>>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyName {
    Static(String),
    Dynamic(Box<Spanned<Expr>>),
}

/// How an include or application names its template
#[derive(Debug, Clone, PartialEq)]
pub enum IncludeTarget {
    Named(String),
    /// `(expr)(args)`: the template name is computed at render time
    Indirect(Box<Spanned<Expr>>),
}

/// One template on the right-hand side of `:`
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    Template {
        target: IncludeTarget,
        args: Vec<Spanned<Expr>>,
    },
    Anonymous(Arc<TemplateDefinition>),
}

/// Builtin functions over attribute values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    First,
    Last,
    Rest,
    Reverse,
    Length,
    Strip,
    Trunc,
    Trim,
    Strlen,
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "first" => Some(Builtin::First),
            "last" => Some(Builtin::Last),
            "rest" => Some(Builtin::Rest),
            "reverse" => Some(Builtin::Reverse),
            "length" => Some(Builtin::Length),
            "strip" => Some(Builtin::Strip),
            "trunc" => Some(Builtin::Trunc),
            "trim" => Some(Builtin::Trim),
            "strlen" => Some(Builtin::Strlen),
            _ => None,
        }
    }
}

/// Options following `;` in an expression
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExprOptions {
    pub separator: Option<Spanned<Expr>>,
    /// Text emitted at a line break; plain `wrap` means a newline
    pub wrap: Option<Spanned<Expr>>,
    pub anchor: bool,
    /// Replacement for empty elements
    pub null: Option<Spanned<Expr>>,
}

impl ExprOptions {
    pub fn is_empty(&self) -> bool {
        self.separator.is_none() && self.wrap.is_none() && !self.anchor && self.null.is_none()
    }
}

// ==================== Group files ====================

/// Parsed group file before template bodies are compiled
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GroupFile {
    pub delimiters: Option<(char, char)>,
    pub items: Vec<Spanned<GroupItem>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GroupItem {
    Template(TemplateDecl),
    Dictionary(DictDecl),
}

/// `name(params) ::= "body"` with the body still as raw text
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateDecl {
    pub name: Spanned<String>,
    pub params: Vec<FormalParam>,
    pub body: String,
    /// Offset of the body's first byte in the group source
    pub body_offset: usize,
}

/// `name ::= [ "key":value, default:value ]`
#[derive(Debug, Clone, PartialEq)]
pub struct DictDecl {
    pub name: Spanned<String>,
    pub entries: Vec<(String, DictValue)>,
    pub default: Option<DictValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DictValue {
    Str(String),
    Bool(bool),
    /// The looked-up key itself
    Key,
}

/// Visit every expression in a body, descending into subexpressions and
/// anonymous template bodies
pub fn walk_exprs<'n>(nodes: &'n [Spanned<Node>], f: &mut dyn FnMut(&'n Spanned<Expr>)) {
    for node in nodes {
        match &node.node {
            Node::Text(_) => {}
            Node::Expr { expr, options } => {
                walk_expr(expr, f);
                for opt in [&options.separator, &options.wrap, &options.null]
                    .into_iter()
                    .flatten()
                {
                    walk_expr(opt, f);
                }
            }
            Node::If {
                branches,
                otherwise,
            } => {
                for (cond, body) in branches {
                    walk_expr(cond, f);
                    walk_exprs(body, f);
                }
                if let Some(body) = otherwise {
                    walk_exprs(body, f);
                }
            }
        }
    }
}

fn walk_expr<'n>(expr: &'n Spanned<Expr>, f: &mut dyn FnMut(&'n Spanned<Expr>)) {
    f(expr);
    match &expr.node {
        Expr::Attribute(_) | Expr::Str(_) | Expr::Bool(_) => {}
        Expr::List(items) => items.iter().for_each(|item| walk_expr(item, f)),
        Expr::Paren(inner) | Expr::Not(inner) => walk_expr(inner, f),
        Expr::Function { arg, .. } => walk_expr(arg, f),
        Expr::And(l, r) | Expr::Or(l, r) => {
            walk_expr(l, f);
            walk_expr(r, f);
        }
        Expr::Property { base, name } => {
            walk_expr(base, f);
            if let PropertyName::Dynamic(name) = name {
                walk_expr(name, f);
            }
        }
        Expr::Include { target, args } => {
            if let IncludeTarget::Indirect(name) = target {
                walk_expr(name, f);
            }
            args.iter().for_each(|arg| walk_expr(arg, f));
        }
        Expr::Subtemplate(def) => walk_exprs(&def.body, f),
        Expr::Map { sources, templates } => {
            sources.iter().for_each(|source| walk_expr(source, f));
            for applied in templates {
                match applied {
                    Applied::Template { target, args } => {
                        if let IncludeTarget::Indirect(name) = target {
                            walk_expr(name, f);
                        }
                        args.iter().for_each(|arg| walk_expr(arg, f));
                    }
                    Applied::Anonymous(def) => walk_exprs(&def.body, f),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spanned<T>(node: T) -> Spanned<T> {
        Spanned::new(node, 0..1)
    }

    #[test]
    fn test_builtin_names() {
        assert_eq!(Builtin::from_name("first"), Some(Builtin::First));
        assert_eq!(Builtin::from_name("strlen"), Some(Builtin::Strlen));
        assert_eq!(Builtin::from_name("bracket"), None);
    }

    #[test]
    fn test_walk_exprs_reaches_nested_expressions() {
        let body = vec![spanned(Node::If {
            branches: vec![(
                spanned(Expr::Attribute("flag".into())),
                vec![spanned(Node::Expr {
                    expr: spanned(Expr::Property {
                        base: Box::new(spanned(Expr::Attribute("user".into()))),
                        name: PropertyName::Static("name".into()),
                    }),
                    options: ExprOptions::default(),
                })],
            )],
            otherwise: None,
        })];

        let mut names = Vec::new();
        walk_exprs(&body, &mut |expr| {
            if let Expr::Attribute(name) = &expr.node {
                names.push(name.clone());
            }
        });
        assert_eq!(names, vec!["flag".to_string(), "user".to_string()]);
    }

    #[test]
    fn test_options_is_empty() {
        let mut options = ExprOptions::default();
        assert!(options.is_empty());
        options.anchor = true;
        assert!(!options.is_empty());
    }
}
