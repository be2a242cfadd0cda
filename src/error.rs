//! Error types for parsing templates and group files

use ariadne::{Color, Label, Report, ReportKind, Source};
use chumsky::error::{Rich, RichPattern, RichReason};
use thiserror::Error;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Parse error at {span:?}: {message}")]
    Syntax {
        span: Span,
        message: String,
        expected: Vec<String>,
    },
}

impl ParseError {
    /// Create a syntax error with no expectation list
    pub fn syntax(span: Span, message: impl Into<String>) -> Self {
        ParseError::Syntax {
            span,
            message: message.into(),
            expected: Vec::new(),
        }
    }

    /// Create a syntax error that names what the parser was looking for
    pub fn expected(span: Span, message: impl Into<String>, expected: &[&str]) -> Self {
        ParseError::Syntax {
            span,
            message: message.into(),
            expected: expected.iter().map(|e| e.to_string()).collect(),
        }
    }

    pub fn span(&self) -> &Span {
        match self {
            ParseError::Syntax { span, .. } => span,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ParseError::Syntax { message, .. } => message,
        }
    }

    pub fn expected_constructs(&self) -> &[String] {
        match self {
            ParseError::Syntax { expected, .. } => expected,
        }
    }

    /// One-line description including the expectation list
    pub fn describe(&self) -> String {
        let ParseError::Syntax {
            message, expected, ..
        } = self;
        if expected.is_empty() {
            message.clone()
        } else {
            format!("{} (expected {})", message, expected.join(", "))
        }
    }

    /// Format the error with source context using ariadne
    pub fn format(&self, source: &str, filename: &str) -> String {
        let mut buf = Vec::new();
        match self {
            ParseError::Syntax {
                span,
                message,
                expected,
            } => {
                let expected_str = if expected.is_empty() {
                    String::new()
                } else {
                    format!("\nExpected: {}", expected.join(", "))
                };

                // Spans can point one past the end for "unexpected end of input"
                let end = span.end.min(source.len());
                let start = span.start.min(end);

                let written = Report::build(ReportKind::Error, filename, start)
                    .with_message(message)
                    .with_label(
                        Label::new((filename, start..end))
                            .with_message(format!("{}{}", message, expected_str))
                            .with_color(Color::Red),
                    )
                    .finish()
                    .write((filename, Source::from(source)), &mut buf);
                if written.is_err() {
                    return self.to_string();
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// Human-readable name of a token, used in "unexpected"/"expected" messages
pub(crate) trait TokenLabel {
    fn label(&self) -> String;
}

impl<'a, T: TokenLabel> From<Rich<'a, T>> for ParseError {
    fn from(err: Rich<'a, T>) -> Self {
        let message = match err.reason() {
            RichReason::Custom(msg) => msg.to_string(),
            _ => match err.found() {
                Some(tok) => format!("Unexpected {}", tok.label()),
                None => "Unexpected end of input".to_string(),
            },
        };

        let mut expected: Vec<String> = Vec::new();
        for pattern in err.expected() {
            let described = match pattern {
                RichPattern::Token(tok) => Some(tok.label()),
                RichPattern::Label(label) => Some(label.to_string()),
                RichPattern::EndOfInput => Some("end of input".to_string()),
                _ => None,
            };
            if let Some(described) = described {
                if !expected.contains(&described) {
                    expected.push(described);
                }
            }
        }

        ParseError::Syntax {
            span: err.span().into_range(),
            message,
            expected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_contains_span_and_message() {
        let err = ParseError::syntax(3..5, "Unexpected ')'");
        let text = err.to_string();
        assert!(text.contains("3..5"));
        assert!(text.contains("Unexpected ')'"));
    }

    #[test]
    fn test_describe_lists_expected() {
        let err = ParseError::expected(0..1, "Unexpected end of input", &["'>'", "identifier"]);
        assert_eq!(
            err.describe(),
            "Unexpected end of input (expected '>', identifier)"
        );
    }

    #[test]
    fn test_format_with_ariadne() {
        let source = "Hello, <name";
        let err = ParseError::expected(7..12, "unterminated expression", &["'>'"]);
        let report = err.format(source, "hello.st");
        assert!(report.contains("unterminated expression"));
        assert!(report.contains("hello.st"));
    }

    #[test]
    fn test_format_clamps_span_past_end() {
        let err = ParseError::syntax(10..11, "Unexpected end of input");
        let report = err.format("abc", "short.st");
        assert!(report.contains("Unexpected end of input"));
    }
}
