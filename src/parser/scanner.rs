//! Splits raw template text into literal text and expression islands

use crate::error::ParseError;
use crate::parser::ast::Span;
use crate::parser::Delimiters;

/// A piece of template text before expression parsing
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Piece {
    /// Literal text with escapes and character islands resolved
    Text(String),
    /// Source between a delimiter pair; `offset` is the absolute offset of
    /// its first byte
    Island { source: String, offset: usize },
}

/// Scan `src` into pieces. `base` is the absolute offset of `src` in the
/// enclosing file so spans point into the original text. `nested` enables
/// the `\{` / `\}` escapes of anonymous template bodies.
pub(crate) fn scan(
    src: &str,
    delims: Delimiters,
    base: usize,
    nested: bool,
) -> Result<Vec<(Piece, Span)>, ParseError> {
    let mut pieces = Vec::new();
    let mut text = String::new();
    let mut text_start = base;
    let mut pos = 0;

    while let Some(c) = src[pos..].chars().next() {
        if text.is_empty() {
            text_start = base + pos;
        }

        if c == '\\' {
            let next = src[pos + 1..].chars().next();
            match next {
                Some(n) if n == delims.start || n == delims.stop => {
                    text.push(n);
                    pos += 1 + n.len_utf8();
                }
                Some(n @ ('{' | '}')) if nested => {
                    text.push(n);
                    pos += 2;
                }
                Some('\n') => pos += 2,
                Some('\r') if src[pos + 1..].starts_with("\r\n") => pos += 3,
                Some(n) => {
                    text.push('\\');
                    text.push(n);
                    pos += 1 + n.len_utf8();
                }
                None => {
                    text.push('\\');
                    pos += 1;
                }
            }
            continue;
        }

        if c != delims.start {
            text.push(c);
            pos += c.len_utf8();
            continue;
        }

        let island_start = pos;
        let inner_start = pos + c.len_utf8();

        if src[inner_start..].starts_with('!') {
            let closing = format!("!{}", delims.stop);
            match src[inner_start + 1..].find(&closing) {
                Some(idx) => pos = inner_start + 1 + idx + closing.len(),
                None => {
                    return Err(ParseError::expected(
                        base + island_start..base + src.len(),
                        "Unterminated comment",
                        &[format!("'{}'", closing).as_str()],
                    ))
                }
            }
            continue;
        }

        let Some(len) = find_island_end(&src[inner_start..], delims) else {
            return Err(ParseError::expected(
                base + island_start..base + src.len(),
                "Unterminated expression",
                &[format!("'{}'", delims.stop).as_str()],
            ));
        };
        let inner = &src[inner_start..inner_start + len];
        pos = inner_start + len + delims.stop.len_utf8();
        let span = base + island_start..base + pos;

        if let Some(escape) = inner.strip_prefix('\\') {
            match char_island(escape) {
                Some(CharIsland::Char(ch)) => text.push(ch),
                Some(CharIsland::LineJoin) => pos = skip_line_break(src, pos),
                None => {
                    return Err(ParseError::syntax(
                        span,
                        format!("Invalid escape '{}'", inner),
                    ))
                }
            }
            continue;
        }

        if !text.is_empty() {
            pieces.push((
                Piece::Text(std::mem::take(&mut text)),
                text_start..base + island_start,
            ));
        }
        pieces.push((
            Piece::Island {
                source: inner.to_string(),
                offset: base + inner_start,
            },
            span,
        ));
    }

    if !text.is_empty() {
        pieces.push((Piece::Text(text), text_start..base + src.len()));
    }
    Ok(pieces)
}

enum CharIsland {
    Char(char),
    /// `\\`: swallow the next line break and the following indentation
    LineJoin,
}

fn char_island(escape: &str) -> Option<CharIsland> {
    match escape {
        "n" => Some(CharIsland::Char('\n')),
        "r" => Some(CharIsland::Char('\r')),
        "t" => Some(CharIsland::Char('\t')),
        " " => Some(CharIsland::Char(' ')),
        "\\" => Some(CharIsland::LineJoin),
        _ => {
            let hex = escape.strip_prefix('u')?;
            if hex.len() != 4 {
                return None;
            }
            let code = u32::from_str_radix(hex, 16).ok()?;
            char::from_u32(code).map(CharIsland::Char)
        }
    }
}

fn skip_line_break(src: &str, mut pos: usize) -> usize {
    if src[pos..].starts_with("\r\n") {
        pos += 2;
    } else if src[pos..].starts_with('\n') {
        pos += 1;
    } else {
        return pos;
    }
    let indent = src[pos..]
        .find(|c: char| c != ' ' && c != '\t')
        .unwrap_or(src.len() - pos);
    pos + indent
}

/// Byte length of an island body; `src` starts right after the start
/// delimiter. Strings and `{...}` bodies may contain the stop delimiter.
pub(crate) fn find_island_end(src: &str, delims: Delimiters) -> Option<usize> {
    let mut pos = 0;
    while let Some(c) = src[pos..].chars().next() {
        if c == delims.stop {
            return Some(pos);
        }
        pos += match c {
            '"' => 1 + string_len(&src[pos + 1..])? + 1,
            '{' => 1 + body_len(&src[pos + 1..], delims)? + 1,
            _ => c.len_utf8(),
        };
    }
    None
}

/// Byte length of an anonymous template body; `src` starts right after `{`
/// and the result is the offset of the matching `}`.
pub(crate) fn body_len(src: &str, delims: Delimiters) -> Option<usize> {
    let mut pos = 0;
    while let Some(c) = src[pos..].chars().next() {
        if c == '}' {
            return Some(pos);
        }
        if c == '\\' {
            pos += 1;
            if let Some(n) = src[pos..].chars().next() {
                pos += n.len_utf8();
            }
            continue;
        }
        if c == delims.start {
            let inner = pos + c.len_utf8();
            if src[inner..].starts_with('!') {
                let closing = format!("!{}", delims.stop);
                pos = inner + 1 + src[inner + 1..].find(&closing)? + closing.len();
            } else {
                pos = inner + find_island_end(&src[inner..], delims)? + delims.stop.len_utf8();
            }
            continue;
        }
        pos += c.len_utf8();
    }
    None
}

/// Offset of the closing quote; `src` starts right after the opening quote
fn string_len(src: &str) -> Option<usize> {
    let mut escaped = false;
    for (idx, c) in src.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => return Some(idx),
            _ => {}
        }
    }
    None
}
