//! Parser for templates and template group files

pub mod ast;
mod grammar;
pub mod lexer;
mod scanner;

pub use ast::*;
pub use grammar::{parse_group, parse_template};
pub(crate) use grammar::{has_definition_header, parse_body};

/// Start/stop characters that mark an expression island in template text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delimiters {
    pub start: char,
    pub stop: char,
}

impl Delimiters {
    pub fn new(start: char, stop: char) -> Self {
        Self { start, stop }
    }

    /// Parse a two-character pair such as `"$$"` or `"<>"`
    pub fn from_pair(pair: &str) -> Option<Self> {
        let mut chars = pair.chars();
        match (chars.next(), chars.next(), chars.next()) {
            (Some(start), Some(stop), None) => Some(Self::new(start, stop)),
            _ => None,
        }
    }
}

impl Default for Delimiters {
    fn default() -> Self {
        Self::new('<', '>')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_delimiters() {
        assert_eq!(Delimiters::default(), Delimiters::new('<', '>'));
    }

    #[test]
    fn test_delimiters_from_pair() {
        assert_eq!(Delimiters::from_pair("$$"), Some(Delimiters::new('$', '$')));
        assert_eq!(Delimiters::from_pair("$"), None);
        assert_eq!(Delimiters::from_pair("<<>"), None);
    }
}
