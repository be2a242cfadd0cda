//! Parser implementation using chumsky

use std::sync::Arc;

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;

use crate::error::ParseError;
use crate::parser::ast::*;
use crate::parser::lexer::{lex, lex_group, GroupToken, Token};
use crate::parser::scanner::{scan, Piece};
use crate::parser::Delimiters;
use crate::template::{FormalParam, TemplateDefinition};

type TokenErr<'a> = extra::Err<Rich<'a, Token>>;

/// Result of parsing one expression island
#[derive(Debug, Clone, PartialEq)]
enum Tag {
    Expr {
        expr: Spanned<Expr>,
        options: ExprOptions,
    },
    If(Spanned<Expr>),
    ElseIf(Spanned<Expr>),
    Else,
    EndIf,
}

impl Tag {
    fn is_conditional(&self) -> bool {
        !matches!(self, Tag::Expr { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Chunk {
    Text(String),
    Tag(Tag),
}

/// Parse template text into a body
pub fn parse_template(input: &str, delims: Delimiters) -> Result<Body, Vec<ParseError>> {
    parse_body(input, 0, delims, false)
}

/// Parse template text located at `base` inside a larger source
pub(crate) fn parse_body(
    input: &str,
    base: usize,
    delims: Delimiters,
    nested: bool,
) -> Result<Body, Vec<ParseError>> {
    let pieces = scan(input, delims, base, nested).map_err(|e| vec![e])?;

    let mut chunks = Vec::with_capacity(pieces.len());
    let mut errors = Vec::new();
    for (piece, span) in pieces {
        match piece {
            Piece::Text(text) => chunks.push((Chunk::Text(text), span)),
            Piece::Island { source, offset } => match parse_island(&source, offset, delims) {
                Ok(tag) => chunks.push((Chunk::Tag(tag), span)),
                Err(errs) => errors.extend(errs),
            },
        }
    }
    if !errors.is_empty() {
        return Err(errors);
    }

    trim_tag_lines(&mut chunks);
    assemble(chunks, delims).map_err(|e| vec![e])
}

/// Parse the body of `{...}` into an anonymous definition. `offset` is the
/// absolute position of the first byte after `{`.
fn parse_anonymous(
    body: &str,
    offset: usize,
    delims: Delimiters,
) -> Result<TemplateDefinition, ParseError> {
    let (params, consumed) = split_lambda_params(body);
    let nodes = parse_body(&body[consumed..], offset + consumed, delims, true).map_err(|errs| {
        errs.into_iter()
            .next()
            .unwrap_or_else(|| ParseError::syntax(offset..offset, "Invalid anonymous template"))
    })?;
    Ok(TemplateDefinition::anonymous(
        format!("_sub{}", offset),
        params,
        nodes,
    ))
}

/// Split `x, y | body` into its parameter names and the byte length of the
/// header. Bodies without a valid header have no parameters.
fn split_lambda_params(body: &str) -> (Vec<String>, usize) {
    let Some(bar) = body.find('|') else {
        return (Vec::new(), 0);
    };
    let names: Vec<&str> = body[..bar].split(',').map(str::trim).collect();
    if !names.iter().all(|name| is_identifier(name)) {
        return (Vec::new(), 0);
    }
    let rest = &body[bar + 1..];
    let padding = rest.len() - rest.trim_start_matches([' ', '\t']).len();
    (
        names.into_iter().map(String::from).collect(),
        bar + 1 + padding,
    )
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A conditional tag alone on its line swallows the line's indentation and
/// its newline
fn trim_tag_lines(chunks: &mut [(Chunk, Span)]) {
    for i in 0..chunks.len() {
        if !matches!(&chunks[i].0, Chunk::Tag(tag) if tag.is_conditional()) {
            continue;
        }

        let starts_line = match i.checked_sub(1).map(|p| &chunks[p].0) {
            None => true,
            Some(Chunk::Text(text)) => {
                let tail = text.rsplit('\n').next().unwrap_or("");
                tail.chars().all(|c| c == ' ' || c == '\t') && (text.contains('\n') || i == 1)
            }
            Some(Chunk::Tag(_)) => false,
        };
        let ends_line = match chunks.get(i + 1).map(|(c, _)| c) {
            None => true,
            Some(Chunk::Text(text)) => text.starts_with('\n') || text.starts_with("\r\n"),
            Some(Chunk::Tag(_)) => false,
        };
        if !(starts_line && ends_line) {
            continue;
        }

        if i > 0 {
            if let Chunk::Text(text) = &mut chunks[i - 1].0 {
                let keep = text.rfind('\n').map(|idx| idx + 1).unwrap_or(0);
                text.truncate(keep);
            }
        }
        if let Some((Chunk::Text(text), _)) = chunks.get_mut(i + 1) {
            let newline = if text.starts_with("\r\n") { 2 } else { 1 };
            text.drain(..newline);
        }
    }
}

struct OpenIf {
    span: Span,
    branches: Vec<(Spanned<Expr>, Body)>,
    condition: Option<Spanned<Expr>>,
    body: Body,
}

/// Build the nested body structure from a flat chunk sequence
fn assemble(chunks: Vec<(Chunk, Span)>, delims: Delimiters) -> Result<Body, ParseError> {
    let tag = |name: &str| format!("'{}{}{}'", delims.start, name, delims.stop);

    fn current<'b>(stack: &'b mut [OpenIf], root: &'b mut Body) -> &'b mut Body {
        match stack.last_mut() {
            Some(open) => &mut open.body,
            None => root,
        }
    }

    let mut root = Body::new();
    let mut stack: Vec<OpenIf> = Vec::new();

    for (chunk, span) in chunks {
        match chunk {
            Chunk::Text(text) if text.is_empty() => {}
            Chunk::Text(text) => {
                current(&mut stack, &mut root).push(Spanned::new(Node::Text(text), span))
            }
            Chunk::Tag(Tag::Expr { expr, options }) => current(&mut stack, &mut root)
                .push(Spanned::new(Node::Expr { expr, options }, span)),
            Chunk::Tag(Tag::If(condition)) => stack.push(OpenIf {
                span,
                branches: Vec::new(),
                condition: Some(condition),
                body: Body::new(),
            }),
            Chunk::Tag(Tag::ElseIf(condition)) => {
                let Some(open) = stack.last_mut() else {
                    return Err(ParseError::syntax(span, "elseif without matching if"));
                };
                let Some(previous) = open.condition.replace(condition) else {
                    return Err(ParseError::syntax(span, "elseif after else"));
                };
                let body = std::mem::take(&mut open.body);
                open.branches.push((previous, body));
            }
            Chunk::Tag(Tag::Else) => {
                let Some(open) = stack.last_mut() else {
                    return Err(ParseError::syntax(span, "else without matching if"));
                };
                let Some(previous) = open.condition.take() else {
                    return Err(ParseError::syntax(span, "duplicate else"));
                };
                let body = std::mem::take(&mut open.body);
                open.branches.push((previous, body));
            }
            Chunk::Tag(Tag::EndIf) => {
                let Some(mut open) = stack.pop() else {
                    return Err(ParseError::syntax(span, "endif without matching if"));
                };
                let otherwise = match open.condition.take() {
                    Some(condition) => {
                        open.branches.push((condition, open.body));
                        None
                    }
                    None => Some(open.body),
                };
                let node = Node::If {
                    branches: open.branches,
                    otherwise,
                };
                current(&mut stack, &mut root)
                    .push(Spanned::new(node, open.span.start..span.end));
            }
        }
    }

    match stack.pop() {
        Some(open) => Err(ParseError::expected(
            open.span,
            "if without matching endif",
            &[tag("endif").as_str()],
        )),
        None => Ok(root),
    }
}

/// Parse one expression island into a tag
fn parse_island(source: &str, offset: usize, delims: Delimiters) -> Result<Tag, Vec<ParseError>> {
    let tokens = lex(source, delims, offset).map_err(|e| vec![e])?;
    let end = offset + source.len();
    if tokens.is_empty() {
        return Err(vec![ParseError::syntax(
            offset.saturating_sub(1)..end + 1,
            "Empty expression",
        )]);
    }

    let token_iter = tokens
        .into_iter()
        .map(|(tok, span)| (tok, SimpleSpan::from(span)));
    let token_stream = Stream::from_iter(token_iter).map((end..end).into(), |(t, s): (_, _)| (t, s));

    tag_parser(delims)
        .parse(token_stream)
        .into_result()
        .map_err(|errs| errs.into_iter().map(|e| e.into()).collect())
}

/// Helper to extract span range from chumsky's MapExtra
fn span_range(e: &impl chumsky::span::Span<Offset = usize>) -> std::ops::Range<usize> {
    e.start()..e.end()
}

fn anonymous_parser<'a, I>(
    delims: Delimiters,
) -> impl Parser<'a, I, Arc<TemplateDefinition>, TokenErr<'a>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    select! { Token::Subtemplate(body) => body }.try_map(move |body, span: SimpleSpan| {
        parse_anonymous(&body, span.start + 1, delims)
            .map(Arc::new)
            .map_err(|err| Rich::custom(SimpleSpan::from(err.span().clone()), err.describe()))
    })
}

fn args_parser<'a, I, P>(expr: P) -> impl Parser<'a, I, Vec<Spanned<Expr>>, TokenErr<'a>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
    P: Parser<'a, I, Spanned<Expr>, TokenErr<'a>> + Clone,
{
    expr.separated_by(just(Token::Comma))
        .collect::<Vec<_>>()
        .delimited_by(just(Token::ParenOpen), just(Token::ParenClose))
}

/// Primary expressions followed by any number of property accesses
fn member_parser<'a, I, P>(
    expr: P,
    delims: Delimiters,
) -> impl Parser<'a, I, Spanned<Expr>, TokenErr<'a>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
    P: Parser<'a, I, Spanned<Expr>, TokenErr<'a>> + Clone,
{
    let ident = select! { Token::Ident(name) => name };
    let args = args_parser(expr.clone());
    let paren = expr
        .clone()
        .delimited_by(just(Token::ParenOpen), just(Token::ParenClose));

    // name(args): builtin function or template include
    let call = ident
        .clone()
        .then(args.clone())
        .try_map(|(name, mut args), span| match Builtin::from_name(&name) {
            Some(func) if args.len() == 1 => Ok(Expr::Function {
                func,
                arg: Box::new(args.remove(0)),
            }),
            Some(_) => Err(Rich::custom(
                span,
                format!("{}() takes exactly one argument", name),
            )),
            None => Ok(Expr::Include {
                target: IncludeTarget::Named(name),
                args,
            }),
        });

    // (expr) or (expr)(args)
    let parenthesized = paren
        .clone()
        .then(args.or_not())
        .map(|(inner, args)| match args {
            Some(args) => Expr::Include {
                target: IncludeTarget::Indirect(Box::new(inner)),
                args,
            },
            None => Expr::Paren(Box::new(inner)),
        });

    let list = expr
        .separated_by(just(Token::Comma))
        .allow_trailing()
        .collect::<Vec<_>>()
        .delimited_by(just(Token::BracketOpen), just(Token::BracketClose))
        .map(Expr::List);

    let literal = select! {
        Token::String(s) => Expr::Str(s),
        Token::True => Expr::Bool(true),
        Token::False => Expr::Bool(false),
        Token::Index(n) => Expr::Attribute(n),
    };

    let primary = choice((
        call,
        ident.clone().map(Expr::Attribute),
        literal,
        list,
        parenthesized,
        anonymous_parser(delims).map(Expr::Subtemplate),
    ))
    .map_with(|node, e| Spanned::new(node, span_range(&e.span())));

    let property = choice((
        ident.map(PropertyName::Static),
        paren.map(|name| PropertyName::Dynamic(Box::new(name))),
    ));

    primary
        .then(
            just(Token::Dot)
                .ignore_then(property)
                .map_with(|name, e| (name, span_range(&e.span())))
                .repeated()
                .collect::<Vec<_>>(),
        )
        .map(|(base, properties)| {
            properties.into_iter().fold(base, |base, (name, span)| {
                let span = base.span.start..span.end;
                Spanned::new(
                    Expr::Property {
                        base: Box::new(base),
                        name,
                    },
                    span,
                )
            })
        })
}

/// Templates on the right of `:`, comma-separated for round-robin
fn applied_list_parser<'a, I, P>(
    expr: P,
    delims: Delimiters,
) -> impl Parser<'a, I, Vec<Applied>, TokenErr<'a>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
    P: Parser<'a, I, Spanned<Expr>, TokenErr<'a>> + Clone,
{
    let args = args_parser(expr.clone());

    let named = select! { Token::Ident(name) => name }
        .then(args.clone())
        .map(|(name, args)| Applied::Template {
            target: IncludeTarget::Named(name),
            args,
        });

    let indirect = expr
        .delimited_by(just(Token::ParenOpen), just(Token::ParenClose))
        .then(args)
        .map(|(name, args)| Applied::Template {
            target: IncludeTarget::Indirect(Box::new(name)),
            args,
        });

    choice((
        named,
        indirect,
        anonymous_parser(delims).map(Applied::Anonymous),
    ))
    .separated_by(just(Token::Comma))
    .at_least(1)
    .collect::<Vec<_>>()
}

/// Fold `base:t1():t2()` into nested applications
fn chain_applications(
    base: Spanned<Expr>,
    sources_span_start: usize,
    chain: Vec<(Vec<Applied>, Span)>,
) -> Spanned<Expr> {
    chain
        .into_iter()
        .fold(base, |source, (templates, span)| {
            let span = sources_span_start..span.end;
            Spanned::new(
                Expr::Map {
                    sources: vec![source],
                    templates,
                },
                span,
            )
        })
}

/// Full expression: member access with optional chained application
fn expr_parser<'a, I>(delims: Delimiters) -> impl Parser<'a, I, Spanned<Expr>, TokenErr<'a>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    recursive(|expr| {
        let member = member_parser(expr.clone(), delims);
        let applied = applied_list_parser(expr, delims);

        member
            .then(
                just(Token::Colon)
                    .ignore_then(applied)
                    .map_with(|templates, e| (templates, span_range(&e.span())))
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .map(|(base, chain)| {
                let start = base.span.start;
                chain_applications(base, start, chain)
            })
            .boxed()
    })
}

fn build_options<'a>(
    options: Vec<(String, Option<Spanned<Expr>>, SimpleSpan)>,
) -> Result<ExprOptions, Rich<'a, Token>> {
    let mut built = ExprOptions::default();
    for (name, value, span) in options {
        match (name.as_str(), value) {
            ("separator", Some(value)) => built.separator = Some(value),
            ("null", Some(value)) => built.null = Some(value),
            ("wrap", value) => {
                built.wrap = Some(value.unwrap_or_else(|| {
                    Spanned::new(Expr::Str("\n".to_string()), span_range(&span))
                }))
            }
            ("anchor", None) => built.anchor = true,
            ("separator" | "null", None) => {
                return Err(Rich::custom(
                    span,
                    format!("Option '{}' requires a value", name),
                ))
            }
            ("anchor", Some(_)) => {
                return Err(Rich::custom(span, "Option 'anchor' takes no value"))
            }
            (other, _) => {
                return Err(Rich::custom(span, format!("Unknown option '{}'", other)))
            }
        }
    }
    Ok(built)
}

fn tag_parser<'a, I>(delims: Delimiters) -> impl Parser<'a, I, Tag, TokenErr<'a>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    let expr = expr_parser(delims);
    let member = member_parser(expr.clone(), delims);
    let applied = applied_list_parser(expr.clone(), delims);

    // a, b:{x, y | ...} walks several sources in step
    let parallel = member
        .separated_by(just(Token::Comma))
        .at_least(2)
        .collect::<Vec<_>>()
        .then_ignore(just(Token::Colon))
        .then(applied.clone())
        .then(
            just(Token::Colon)
                .ignore_then(applied)
                .map_with(|templates, e| (templates, span_range(&e.span())))
                .repeated()
                .collect::<Vec<_>>(),
        )
        .map_with(|((sources, templates), chain), e| {
            let span = span_range(&e.span());
            let start = span.start;
            let first = Spanned::new(Expr::Map { sources, templates }, span);
            chain_applications(first, start, chain)
        });

    let condition = recursive(|condition| {
        let unary = recursive(|unary| {
            choice((
                just(Token::Bang)
                    .ignore_then(unary)
                    .map_with(|inner, e| {
                        Spanned::new(Expr::Not(Box::new(inner)), span_range(&e.span()))
                    }),
                condition
                    .clone()
                    .delimited_by(just(Token::ParenOpen), just(Token::ParenClose)),
                expr.clone(),
            ))
        });

        let and = unary
            .clone()
            .then(just(Token::And).ignore_then(unary).repeated().collect::<Vec<_>>())
            .map(|(first, rest)| {
                rest.into_iter().fold(first, |left, right| {
                    let span = left.span.start..right.span.end;
                    Spanned::new(Expr::And(Box::new(left), Box::new(right)), span)
                })
            });

        and.clone()
            .then(just(Token::Or).ignore_then(and).repeated().collect::<Vec<_>>())
            .map(|(first, rest)| {
                rest.into_iter().fold(first, |left, right| {
                    let span = left.span.start..right.span.end;
                    Spanned::new(Expr::Or(Box::new(left), Box::new(right)), span)
                })
            })
            .boxed()
    });
    let condition = condition.delimited_by(just(Token::ParenOpen), just(Token::ParenClose));

    let option = select! { Token::Ident(name) => name }
        .then(just(Token::Equals).ignore_then(expr.clone()).or_not())
        .map_with(|(name, value), e| (name, value, e.span()));

    let options = just(Token::Semicolon)
        .ignore_then(
            option
                .separated_by(just(Token::Comma))
                .at_least(1)
                .collect::<Vec<_>>(),
        )
        .or_not()
        .try_map(|options, _span| build_options(options.unwrap_or_default()));

    let expression = choice((parallel, expr))
        .then(options)
        .map(|(expr, options)| Tag::Expr { expr, options });

    choice((
        just(Token::If).ignore_then(condition.clone()).map(Tag::If),
        just(Token::ElseIf).ignore_then(condition).map(Tag::ElseIf),
        just(Token::Else).to(Tag::Else),
        just(Token::EndIf).to(Tag::EndIf),
        expression,
    ))
    .then_ignore(end())
}

// ==================== Group files ====================

enum DictEntry {
    Pair(String, DictValue),
    Default(DictValue),
}

/// Parse a group file into declarations; template bodies stay raw
pub fn parse_group(input: &str) -> Result<GroupFile, Vec<ParseError>> {
    let len = input.len();
    let tokens = lex_group(input).map_err(|e| vec![e])?;

    let token_iter = tokens
        .into_iter()
        .map(|(tok, span)| (tok, SimpleSpan::from(span)));
    let token_stream = Stream::from_iter(token_iter).map((len..len).into(), |(t, s): (_, _)| (t, s));

    group_parser()
        .parse(token_stream)
        .into_result()
        .map_err(|errs| errs.into_iter().map(|e| e.into()).collect())
}

/// Whether the first line of `input` is a `name(params) ::=` header
pub(crate) fn has_definition_header(input: &str) -> bool {
    let first = input.lines().next().unwrap_or("");
    let Some(idx) = first.find("::=") else {
        return false;
    };
    match lex_group(&first[..idx + 3]) {
        Ok(tokens) => {
            matches!(tokens.first(), Some((GroupToken::Ident(_), _)))
                && matches!(tokens.get(1), Some((GroupToken::ParenOpen, _)))
                && matches!(tokens.last(), Some((GroupToken::Define, _)))
        }
        Err(_) => false,
    }
}

/// Strip the markers of a string or heredoc body and locate its first byte.
/// A heredoc drops one leading and one trailing newline.
fn template_body(raw: String, heredoc: bool, token_start: usize) -> (String, usize) {
    if !heredoc {
        return (raw, token_start + 1);
    }
    let mut offset = token_start + 2;
    let mut body = raw.as_str();
    if let Some(rest) = body.strip_prefix("\r\n") {
        body = rest;
        offset += 2;
    } else if let Some(rest) = body.strip_prefix('\n') {
        body = rest;
        offset += 1;
    }
    // the closing marker may sit on its own indented line
    let body = match body.rfind('\n') {
        Some(idx) if body[idx + 1..].chars().all(|c| c == ' ' || c == '\t') => {
            body[..idx].strip_suffix('\r').unwrap_or(&body[..idx])
        }
        _ => body,
    };
    (body.to_string(), offset)
}

fn group_parser<'a, I>() -> impl Parser<'a, I, GroupFile, extra::Err<Rich<'a, GroupToken>>> + Clone
where
    I: ValueInput<'a, Token = GroupToken, Span = SimpleSpan>,
{
    let identifier = select! { GroupToken::Ident(name) => name }
        .map_with(|name, e| Spanned::new(name, span_range(&e.span())));
    let string = select! { GroupToken::Str(s) => s };

    // delimiters "$", "$"
    let delimiters = just(GroupToken::Delimiters)
        .ignore_then(string.clone())
        .then_ignore(just(GroupToken::Comma))
        .then(string.clone())
        .try_map(|(start, stop), span| {
            let mut start = start.chars();
            let mut stop = stop.chars();
            match (start.next(), start.next(), stop.next(), stop.next()) {
                (Some(start), None, Some(stop), None) => Ok((start, stop)),
                _ => Err(Rich::custom(span, "Delimiters must be single characters")),
            }
        });

    let body = select! {
        GroupToken::Str(s) => (s, false),
        GroupToken::BigStr(s) => (s, true),
    }
    .map_with(|(raw, heredoc), e| {
        let span: SimpleSpan = e.span();
        template_body(raw, heredoc, span.start)
    });

    let param = select! { GroupToken::Ident(name) => name }
        .then(
            just(GroupToken::Equals)
                .ignore_then(select! {
                    GroupToken::Str(s) => s,
                    GroupToken::BigStr(s) => s,
                })
                .or_not(),
        )
        .map(|(name, default)| FormalParam { name, default });

    let params = param
        .separated_by(just(GroupToken::Comma))
        .allow_trailing()
        .collect::<Vec<_>>()
        .delimited_by(just(GroupToken::ParenOpen), just(GroupToken::ParenClose));

    let template = identifier
        .clone()
        .then(params)
        .then_ignore(just(GroupToken::Define))
        .then(body)
        .map(|((name, params), (body, body_offset))| {
            GroupItem::Template(TemplateDecl {
                name,
                params,
                body,
                body_offset,
            })
        });

    let dict_value = select! {
        GroupToken::Str(s) => DictValue::Str(s),
        GroupToken::BigStr(s) => DictValue::Str(s),
        GroupToken::True => DictValue::Bool(true),
        GroupToken::False => DictValue::Bool(false),
        GroupToken::Key => DictValue::Key,
    };

    let entry = choice((
        string
            .then_ignore(just(GroupToken::Colon))
            .then(dict_value.clone())
            .map(|(key, value)| DictEntry::Pair(key, value)),
        just(GroupToken::Default)
            .ignore_then(just(GroupToken::Colon))
            .ignore_then(dict_value)
            .map(DictEntry::Default),
    ));

    let dictionary = identifier
        .then_ignore(just(GroupToken::Define))
        .then(
            entry
                .separated_by(just(GroupToken::Comma))
                .allow_trailing()
                .collect::<Vec<_>>()
                .delimited_by(just(GroupToken::BracketOpen), just(GroupToken::BracketClose)),
        )
        .map(|(name, entries)| {
            let mut pairs = Vec::new();
            let mut default = None;
            for entry in entries {
                match entry {
                    DictEntry::Pair(key, value) => pairs.push((key, value)),
                    DictEntry::Default(value) => default = Some(value),
                }
            }
            GroupItem::Dictionary(DictDecl {
                name,
                entries: pairs,
                default,
            })
        });

    let item = choice((template, dictionary))
        .map_with(|item, e| Spanned::new(item, span_range(&e.span())));

    delimiters
        .or_not()
        .then(item.repeated().collect::<Vec<_>>())
        .then_ignore(end())
        .map(|(delimiters, items)| GroupFile { delimiters, items })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(input: &str) -> Body {
        parse_template(input, Delimiters::default()).expect("Should parse")
    }

    fn single_expr(input: &str) -> (Expr, ExprOptions) {
        let body = parse(input);
        assert_eq!(body.len(), 1, "expected one node in {:?}", body);
        match body.into_iter().next().map(|n| n.node) {
            Some(Node::Expr { expr, options }) => (expr.node, options),
            other => panic!("Expected expression, got {:?}", other),
        }
    }

    fn attr(name: &str) -> Expr {
        Expr::Attribute(name.to_string())
    }

    #[test]
    fn test_parse_text_only() {
        let body = parse("plain text");
        assert_eq!(body.len(), 1);
        assert_eq!(body[0].node, Node::Text("plain text".to_string()));
    }

    #[test]
    fn test_parse_attribute() {
        let (expr, options) = single_expr("<name>");
        assert_eq!(expr, attr("name"));
        assert!(options.is_empty());
    }

    #[test]
    fn test_parse_property_chain() {
        let (expr, _) = single_expr("<user.address.city>");
        let Expr::Property { base, name } = expr else {
            panic!("Expected property access");
        };
        assert_eq!(name, PropertyName::Static("city".to_string()));
        assert!(matches!(base.node, Expr::Property { .. }));
    }

    #[test]
    fn test_parse_dynamic_property() {
        let (expr, _) = single_expr("<user.(field)>");
        let Expr::Property { name, .. } = expr else {
            panic!("Expected property access");
        };
        assert!(matches!(name, PropertyName::Dynamic(inner) if inner.node == attr("field")));
    }

    #[test]
    fn test_parse_include_with_args() {
        let (expr, _) = single_expr(r#"<greet(name, "Dr")>"#);
        let Expr::Include { target, args } = expr else {
            panic!("Expected include");
        };
        assert_eq!(target, IncludeTarget::Named("greet".to_string()));
        assert_eq!(args.len(), 2);
        assert_eq!(args[1].node, Expr::Str("Dr".to_string()));
    }

    #[test]
    fn test_parse_indirect_include() {
        let (expr, _) = single_expr("<(which)(x)>");
        assert!(matches!(
            expr,
            Expr::Include {
                target: IncludeTarget::Indirect(_),
                ..
            }
        ));
    }

    #[test]
    fn test_parse_builtin() {
        let (expr, _) = single_expr("<first(names)>");
        assert!(matches!(
            expr,
            Expr::Function {
                func: Builtin::First,
                ..
            }
        ));
    }

    #[test]
    fn test_builtin_arity_error() {
        let errs = parse_template("<first(a, b)>", Delimiters::default()).unwrap_err();
        assert!(errs[0].message().contains("exactly one argument"));
    }

    #[test]
    fn test_parse_application_with_options() {
        let (expr, options) = single_expr(r#"<users:row(); separator=", ", wrap, anchor>"#);
        let Expr::Map { sources, templates } = expr else {
            panic!("Expected application");
        };
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].node, attr("users"));
        assert_eq!(templates.len(), 1);
        assert_eq!(
            options.separator.map(|s| s.node),
            Some(Expr::Str(", ".to_string()))
        );
        assert_eq!(
            options.wrap.map(|w| w.node),
            Some(Expr::Str("\n".to_string()))
        );
        assert!(options.anchor);
    }

    #[test]
    fn test_parse_chained_and_round_robin() {
        let (expr, _) = single_expr("<xs:a(), b():c()>");
        let Expr::Map { sources, templates } = expr else {
            panic!("Expected application");
        };
        assert_eq!(templates.len(), 1);
        let Expr::Map { templates: inner, .. } = &sources[0].node else {
            panic!("Expected nested application");
        };
        assert_eq!(inner.len(), 2);
    }

    #[test]
    fn test_parse_parallel_application() {
        let (expr, _) = single_expr("<names, phones:{n, p | <n>: <p>}>");
        let Expr::Map { sources, templates } = expr else {
            panic!("Expected application");
        };
        assert_eq!(sources.len(), 2);
        let Applied::Anonymous(def) = &templates[0] else {
            panic!("Expected anonymous template");
        };
        let names: Vec<_> = def.params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["n", "p"]);
    }

    #[test]
    fn test_parse_anonymous_template_body() {
        let (expr, _) = single_expr("<items:{x | [<x>]}>");
        let Expr::Map { templates, .. } = expr else {
            panic!("Expected application");
        };
        let Applied::Anonymous(def) = &templates[0] else {
            panic!("Expected anonymous template");
        };
        assert_eq!(def.body.len(), 3);
        assert_eq!(def.body[0].node, Node::Text("[".to_string()));
    }

    #[test]
    fn test_anonymous_without_params() {
        let (expr, _) = single_expr("<{hello <name>}>");
        let Expr::Subtemplate(def) = expr else {
            panic!("Expected subtemplate");
        };
        assert!(def.params.is_empty());
        assert_eq!(def.body[0].node, Node::Text("hello ".to_string()));
    }

    #[test]
    fn test_parse_list_literal() {
        let (expr, _) = single_expr(r#"<["a", b, []]>"#);
        let Expr::List(items) = expr else {
            panic!("Expected list");
        };
        assert_eq!(items.len(), 3);
        assert_eq!(items[2].node, Expr::List(vec![]));
    }

    #[test]
    fn test_parse_conditionals() {
        let body = parse("<if(a)>A<elseif(!b)>B<else>C<endif>");
        assert_eq!(body.len(), 1);
        let Node::If {
            branches,
            otherwise,
        } = &body[0].node
        else {
            panic!("Expected conditional");
        };
        assert_eq!(branches.len(), 2);
        assert!(matches!(branches[1].0.node, Expr::Not(_)));
        assert_eq!(
            otherwise.as_ref().map(|b| b[0].node.clone()),
            Some(Node::Text("C".to_string()))
        );
    }

    #[test]
    fn test_condition_operator_precedence() {
        let body = parse("<if(a || b && !c)>x<endif>");
        let Node::If { branches, .. } = &body[0].node else {
            panic!("Expected conditional");
        };
        let Expr::Or(_, right) = &branches[0].0.node else {
            panic!("Expected || at the top");
        };
        assert!(matches!(right.node, Expr::And(_, _)));
    }

    #[test]
    fn test_missing_endif() {
        let errs = parse_template("<if(a)>x", Delimiters::default()).unwrap_err();
        assert!(errs[0].message().contains("endif"));
        assert_eq!(errs[0].span(), &(0..7));
    }

    #[test]
    fn test_stray_else() {
        let errs = parse_template("x<else>y", Delimiters::default()).unwrap_err();
        assert!(errs[0].message().contains("else without matching if"));
    }

    #[test]
    fn test_unknown_option() {
        let errs = parse_template("<xs; bogus>", Delimiters::default()).unwrap_err();
        assert!(errs[0].message().contains("Unknown option 'bogus'"));
    }

    #[test]
    fn test_syntax_error_reports_offset() {
        let errs = parse_template("Hi <a b>", Delimiters::default()).unwrap_err();
        assert_eq!(errs[0].span().start, 6);
    }

    #[test]
    fn test_errors_from_several_islands() {
        let errs = parse_template("<a b> and <c d>", Delimiters::default()).unwrap_err();
        assert_eq!(errs.len(), 2);
    }

    #[test]
    fn test_empty_expression() {
        let errs = parse_template("a<>b", Delimiters::default()).unwrap_err();
        assert!(errs[0].message().contains("Empty expression"));
    }

    #[test]
    fn test_tag_lines_are_trimmed() {
        let body = parse("start\n  <if(a)>\n  yes\n  <endif>\nend");
        let texts: Vec<_> = body
            .iter()
            .map(|n| n.node.clone())
            .collect();
        assert_eq!(texts[0], Node::Text("start\n".to_string()));
        let Node::If { branches, .. } = &texts[1] else {
            panic!("Expected conditional");
        };
        assert_eq!(branches[0].1[0].node, Node::Text("  yes\n".to_string()));
        assert_eq!(texts[2], Node::Text("end".to_string()));
    }

    #[test]
    fn test_inline_tags_keep_text() {
        let body = parse("a <if(x)>b<endif> c");
        assert_eq!(body[0].node, Node::Text("a ".to_string()));
        assert_eq!(body[2].node, Node::Text(" c".to_string()));
    }

    #[test]
    fn test_dollar_delimiters() {
        let body = parse_template("Hi $name$ <b>", Delimiters::new('$', '$')).unwrap();
        assert_eq!(body.len(), 3);
        assert_eq!(body[1].node, Node::Expr {
            expr: Spanned::new(attr("name"), 4..8),
            options: ExprOptions::default(),
        });
        assert_eq!(body[2].node, Node::Text(" <b>".to_string()));
    }

    #[test]
    fn test_split_lambda_params() {
        assert_eq!(
            split_lambda_params("x, y | body"),
            (vec!["x".to_string(), "y".to_string()], 7)
        );
        assert_eq!(split_lambda_params("a <b||c>"), (vec![], 0));
        assert_eq!(split_lambda_params("no params"), (vec![], 0));
    }

    #[test]
    fn test_parse_group_file() {
        let group = parse_group(
            r##"
            // greeting templates
            greet(name, title="Dr") ::= "Hello <title> <name>"
            page(items) ::= <<
            <items; separator=", ">
            >>
            colors ::= [ "red":"#f00", "on":true, default: key ]
            "##,
        )
        .expect("Should parse");

        assert_eq!(group.delimiters, None);
        assert_eq!(group.items.len(), 3);

        let GroupItem::Template(greet) = &group.items[0].node else {
            panic!("Expected template");
        };
        assert_eq!(greet.name.node, "greet");
        assert_eq!(greet.params[1].default.as_deref(), Some("Dr"));
        assert_eq!(greet.body, "Hello <title> <name>");

        let GroupItem::Template(page) = &group.items[1].node else {
            panic!("Expected template");
        };
        assert_eq!(page.body, "            <items; separator=\", \">");

        let GroupItem::Dictionary(colors) = &group.items[2].node else {
            panic!("Expected dictionary");
        };
        assert_eq!(colors.entries.len(), 2);
        assert_eq!(colors.default, Some(DictValue::Key));
    }

    #[test]
    fn test_group_body_offset_points_into_source() {
        let source = r#"t() ::= "ab<x>""#;
        let group = parse_group(source).unwrap();
        let GroupItem::Template(t) = &group.items[0].node else {
            panic!("Expected template");
        };
        assert_eq!(&source[t.body_offset..t.body_offset + 2], "ab");
    }

    #[test]
    fn test_group_delimiters() {
        let group = parse_group(r#"delimiters "$", "$" t() ::= "$x$""#).unwrap();
        assert_eq!(group.delimiters, Some(('$', '$')));
    }

    #[test]
    fn test_group_syntax_error() {
        let errs = parse_group("t( ::= \"x\"").unwrap_err();
        assert!(!errs.is_empty());
    }

    #[test]
    fn test_definition_header_detection() {
        assert!(has_definition_header("row(user) ::= <<\n<user>\n>>"));
        assert!(has_definition_header("t() ::= \"x\""));
        assert!(!has_definition_header("Hello <name>"));
        assert!(!has_definition_header("a ::= b"));
    }
}
