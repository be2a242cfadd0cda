//! Lexers for template expressions and group files using logos

use logos::Logos;

use crate::error::{ParseError, TokenLabel};
use crate::parser::ast::Span;
use crate::parser::scanner::body_len;
use crate::parser::Delimiters;

/// Tokens inside an expression island
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(extras = Delimiters)]
#[logos(skip r"[ \t\n\r]+")]
pub enum Token {
    // Conditional keywords
    #[token("if")]
    If,
    #[token("elseif")]
    ElseIf,
    #[token("else")]
    Else,
    #[token("endif")]
    EndIf,

    #[token("true")]
    True,
    #[token("false")]
    False,

    // Delimiters
    #[token("(")]
    ParenOpen,
    #[token(")")]
    ParenClose,
    #[token("[")]
    BracketOpen,
    #[token("]")]
    BracketClose,
    #[token(".")]
    Dot,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(";")]
    Semicolon,
    #[token("=")]
    Equals,

    // Condition operators
    #[token("!")]
    Bang,
    #[token("&&")]
    And,
    #[token("||")]
    Or,

    /// Body of an anonymous template, braces excluded
    #[token("{", subtemplate)]
    Subtemplate(String),

    // Literals - identifiers must come after keywords
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string(), priority = 1)]
    Ident(String),

    /// Positional placeholder used by `format`: `<1>`, `<2>`, ...
    #[regex(r"[0-9]+", |lex| lex.slice().to_string())]
    Index(String),

    #[regex(r#""([^"\\]|\\.)*""#, |lex| {
        let s = lex.slice();
        unescape(&s[1..s.len()-1])
    })]
    String(String),
}

fn subtemplate(lex: &mut logos::Lexer<Token>) -> Option<String> {
    let len = body_len(lex.remainder(), lex.extras)?;
    let body = lex.remainder()[..len].to_string();
    lex.bump(len + 1);
    Some(body)
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

impl TokenLabel for Token {
    fn label(&self) -> String {
        match self {
            Token::If => "'if'".to_string(),
            Token::ElseIf => "'elseif'".to_string(),
            Token::Else => "'else'".to_string(),
            Token::EndIf => "'endif'".to_string(),
            Token::True => "'true'".to_string(),
            Token::False => "'false'".to_string(),
            Token::ParenOpen => "'('".to_string(),
            Token::ParenClose => "')'".to_string(),
            Token::BracketOpen => "'['".to_string(),
            Token::BracketClose => "']'".to_string(),
            Token::Dot => "'.'".to_string(),
            Token::Comma => "','".to_string(),
            Token::Colon => "':'".to_string(),
            Token::Semicolon => "';'".to_string(),
            Token::Equals => "'='".to_string(),
            Token::Bang => "'!'".to_string(),
            Token::And => "'&&'".to_string(),
            Token::Or => "'||'".to_string(),
            Token::Subtemplate(_) => "anonymous template".to_string(),
            Token::Ident(name) => format!("identifier '{}'", name),
            Token::Index(n) => format!("placeholder '{}'", n),
            Token::String(_) => "string".to_string(),
        }
    }
}

/// Lex an expression island. `offset` is the absolute position of `input`
/// so token spans point into the enclosing template.
pub fn lex(input: &str, delims: Delimiters, offset: usize) -> Result<Vec<(Token, Span)>, ParseError> {
    let mut lexer = Token::lexer_with_extras(input, delims);
    let mut tokens = Vec::new();
    while let Some(tok) = lexer.next() {
        let span = lexer.span();
        let abs = offset + span.start..offset + span.end;
        match tok {
            Ok(tok) => tokens.push((tok, abs)),
            Err(()) if lexer.slice().starts_with('{') => {
                return Err(ParseError::expected(
                    abs,
                    "Unterminated anonymous template",
                    &["'}'"],
                ))
            }
            Err(()) => {
                return Err(ParseError::syntax(
                    abs,
                    format!("Unexpected character '{}'", lexer.slice()),
                ))
            }
        }
    }
    Ok(tokens)
}

// ==================== Group files ====================

/// Tokens of a group file
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r]+")]
pub enum GroupToken {
    #[token("delimiters")]
    Delimiters,
    #[token("default")]
    Default,
    #[token("key")]
    Key,
    #[token("true")]
    True,
    #[token("false")]
    False,

    #[token("::=")]
    Define,
    #[token("(")]
    ParenOpen,
    #[token(")")]
    ParenClose,
    #[token("[")]
    BracketOpen,
    #[token("]")]
    BracketClose,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token("=")]
    Equals,

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string(), priority = 1)]
    Ident(String),

    /// Quoted string; only `\"` and the control escapes are resolved so
    /// template escapes survive for the template scanner
    #[regex(r#""([^"\\]|\\.)*""#, |lex| {
        let s = lex.slice();
        unescape_group_string(&s[1..s.len()-1])
    })]
    Str(String),

    /// `<<...>>` heredoc body, markers excluded
    #[token("<<", heredoc)]
    BigStr(String),

    // Comments (skip)
    #[regex(r"//[^\n]*", logos::skip)]
    LineComment,

    #[regex(r"/\*([^*]|\*[^/])*\*/", logos::skip)]
    BlockComment,
}

fn heredoc(lex: &mut logos::Lexer<GroupToken>) -> Option<String> {
    let rest = lex.remainder();
    let mut search = 0;
    loop {
        let idx = search + rest[search..].find(">>")?;
        if idx == 0 || !rest[..idx].ends_with('\\') {
            let body = rest[..idx].to_string();
            lex.bump(idx + 2);
            return Some(body);
        }
        search = idx + 2;
    }
}

fn unescape_group_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('"') => out.push('"'),
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            _ => {
                out.push('\\');
                continue;
            }
        }
        chars.next();
    }
    out
}

impl TokenLabel for GroupToken {
    fn label(&self) -> String {
        match self {
            GroupToken::Delimiters => "'delimiters'".to_string(),
            GroupToken::Default => "'default'".to_string(),
            GroupToken::Key => "'key'".to_string(),
            GroupToken::True => "'true'".to_string(),
            GroupToken::False => "'false'".to_string(),
            GroupToken::Define => "'::='".to_string(),
            GroupToken::ParenOpen => "'('".to_string(),
            GroupToken::ParenClose => "')'".to_string(),
            GroupToken::BracketOpen => "'['".to_string(),
            GroupToken::BracketClose => "']'".to_string(),
            GroupToken::Comma => "','".to_string(),
            GroupToken::Colon => "':'".to_string(),
            GroupToken::Equals => "'='".to_string(),
            GroupToken::Ident(name) => format!("identifier '{}'", name),
            GroupToken::Str(_) => "string".to_string(),
            GroupToken::BigStr(_) => "template body".to_string(),
            GroupToken::LineComment | GroupToken::BlockComment => "comment".to_string(),
        }
    }
}

/// Lex a group file
pub fn lex_group(input: &str) -> Result<Vec<(GroupToken, Span)>, ParseError> {
    let mut lexer = GroupToken::lexer(input);
    let mut tokens = Vec::new();
    while let Some(tok) = lexer.next() {
        let span = lexer.span();
        match tok {
            Ok(tok) => tokens.push((tok, span)),
            Err(()) if lexer.slice().starts_with("<<") => {
                return Err(ParseError::expected(
                    span,
                    "Unterminated template body",
                    &["'>>'"],
                ))
            }
            Err(()) => {
                return Err(ParseError::syntax(
                    span.clone(),
                    format!("Unexpected character '{}'", lexer.slice()),
                ))
            }
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tokens(input: &str) -> Vec<Token> {
        lex(input, Delimiters::default(), 0)
            .unwrap()
            .into_iter()
            .map(|(t, _)| t)
            .collect()
    }

    fn group_tokens(input: &str) -> Vec<GroupToken> {
        lex_group(input)
            .unwrap()
            .into_iter()
            .map(|(t, _)| t)
            .collect()
    }

    #[test]
    fn test_conditional_keywords() {
        assert_eq!(
            tokens("if elseif else endif"),
            vec![Token::If, Token::ElseIf, Token::Else, Token::EndIf]
        );
    }

    #[test]
    fn test_keyword_prefix_is_identifier() {
        assert_eq!(tokens("iffy"), vec![Token::Ident("iffy".to_string())]);
    }

    #[test]
    fn test_application_tokens() {
        assert_eq!(
            tokens("users:row(), alt(); separator=\", \""),
            vec![
                Token::Ident("users".to_string()),
                Token::Colon,
                Token::Ident("row".to_string()),
                Token::ParenOpen,
                Token::ParenClose,
                Token::Comma,
                Token::Ident("alt".to_string()),
                Token::ParenOpen,
                Token::ParenClose,
                Token::Semicolon,
                Token::Ident("separator".to_string()),
                Token::Equals,
                Token::String(", ".to_string()),
            ]
        );
    }

    #[test]
    fn test_condition_operators() {
        assert_eq!(
            tokens("!a && b || c"),
            vec![
                Token::Bang,
                Token::Ident("a".to_string()),
                Token::And,
                Token::Ident("b".to_string()),
                Token::Or,
                Token::Ident("c".to_string()),
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            tokens(r#""a\n\"b\"\\""#),
            vec![Token::String("a\n\"b\"\\".to_string())]
        );
    }

    #[test]
    fn test_subtemplate_is_one_token() {
        let lexed = lex("xs:{x | <x>}", Delimiters::default(), 5).unwrap();
        assert_eq!(lexed[2].0, Token::Subtemplate("x | <x>".to_string()));
        assert_eq!(lexed[2].1, 8..17);
    }

    #[test]
    fn test_index_placeholder() {
        assert_eq!(tokens("1"), vec![Token::Index("1".to_string())]);
    }

    #[test]
    fn test_spans_are_offset() {
        let lexed = lex("name", Delimiters::default(), 7).unwrap();
        assert_eq!(lexed[0].1, 7..11);
    }

    #[test]
    fn test_unexpected_character() {
        let err = lex("a # b", Delimiters::default(), 0).unwrap_err();
        assert_eq!(err.span(), &(2..3));
        assert!(err.message().contains('#'));
    }

    #[test]
    fn test_group_definition_tokens() {
        assert_eq!(
            group_tokens(r#"greet(name, title="Dr") ::= "Hi <name>""#),
            vec![
                GroupToken::Ident("greet".to_string()),
                GroupToken::ParenOpen,
                GroupToken::Ident("name".to_string()),
                GroupToken::Comma,
                GroupToken::Ident("title".to_string()),
                GroupToken::Equals,
                GroupToken::Str("Dr".to_string()),
                GroupToken::ParenClose,
                GroupToken::Define,
                GroupToken::Str("Hi <name>".to_string()),
            ]
        );
    }

    #[test]
    fn test_group_string_keeps_template_escapes() {
        assert_eq!(
            group_tokens(r#""say \"hi\" \<b\>""#),
            vec![GroupToken::Str(r#"say "hi" \<b\>"#.to_string())]
        );
    }

    #[test]
    fn test_heredoc() {
        assert_eq!(
            group_tokens("t() ::= <<\nline <x>\n>>"),
            vec![
                GroupToken::Ident("t".to_string()),
                GroupToken::ParenOpen,
                GroupToken::ParenClose,
                GroupToken::Define,
                GroupToken::BigStr("\nline <x>\n".to_string()),
            ]
        );
    }

    #[test]
    fn test_heredoc_escaped_end_marker() {
        assert_eq!(
            group_tokens(r"<<a \>> b>>"),
            vec![GroupToken::BigStr(r"a \>> b".to_string())]
        );
    }

    #[test]
    fn test_unterminated_heredoc() {
        let err = lex_group("t() ::= <<never").unwrap_err();
        assert!(err.message().contains("Unterminated template body"));
    }

    #[test]
    fn test_group_comments_skipped() {
        assert_eq!(
            group_tokens("// header\n/* block */ dict ::= [ default: key ]"),
            vec![
                GroupToken::Ident("dict".to_string()),
                GroupToken::Define,
                GroupToken::BracketOpen,
                GroupToken::Default,
                GroupToken::Colon,
                GroupToken::Key,
                GroupToken::BracketClose,
            ]
        );
    }

    #[test]
    fn test_delimiters_declaration() {
        assert_eq!(
            group_tokens(r#"delimiters "$", "$""#),
            vec![
                GroupToken::Delimiters,
                GroupToken::Str("$".to_string()),
                GroupToken::Comma,
                GroupToken::Str("$".to_string()),
            ]
        );
    }
}
