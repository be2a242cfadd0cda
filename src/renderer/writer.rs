//! Column-tracking output buffer

/// Output buffer that knows the current column and indents continuation
/// lines to the innermost anchor
#[derive(Debug)]
pub(crate) struct Writer {
    out: String,
    line_width: Option<usize>,
    column: usize,
    /// Byte offset of the current line in `out`
    line_start: usize,
    anchors: Vec<usize>,
    indent_pending: bool,
}

impl Writer {
    pub fn new(line_width: Option<usize>) -> Self {
        Self {
            out: String::new(),
            line_width,
            column: 0,
            line_start: 0,
            anchors: Vec::new(),
            indent_pending: false,
        }
    }

    pub fn line_width(&self) -> Option<usize> {
        self.line_width
    }

    #[cfg(test)]
    pub fn column(&self) -> usize {
        self.column
    }

    /// Append text. The first character after a newline is preceded by
    /// padding up to the active anchor, if any.
    pub fn write(&mut self, text: &str) {
        for c in text.chars() {
            if c == '\n' {
                self.out.push('\n');
                self.column = 0;
                self.line_start = self.out.len();
                self.indent_pending = !self.anchors.is_empty();
                continue;
            }
            if self.indent_pending {
                self.indent_pending = false;
                self.pad_to_anchor();
            }
            self.out.push(c);
            self.column += 1;
        }
    }

    fn pad_to_anchor(&mut self) {
        if let Some(&anchor) = self.anchors.last() {
            while self.column < anchor {
                self.out.push(' ');
                self.column += 1;
            }
        }
    }

    /// Anchor continuation lines at the current column
    pub fn push_anchor(&mut self) {
        self.anchors.push(self.column);
    }

    pub fn pop_anchor(&mut self) {
        self.anchors.pop();
    }

    /// Whether the current line holds nothing but whitespace
    pub fn line_is_blank(&self) -> bool {
        self.out[self.line_start..].trim().is_empty()
    }

    /// Whether `extra` more columns would pass the line width
    pub fn exceeds(&self, extra: usize) -> bool {
        self.line_width
            .is_some_and(|width| self.column + extra > width)
    }

    pub fn finish(self) -> String {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_tracking() {
        let mut w = Writer::new(None);
        w.write("abc");
        assert_eq!(w.column(), 3);
        w.write("de\nf");
        assert_eq!(w.column(), 1);
        assert_eq!(w.finish(), "abcde\nf");
    }

    #[test]
    fn test_columns_count_chars() {
        let mut w = Writer::new(None);
        w.write("héé");
        assert_eq!(w.column(), 3);
    }

    #[test]
    fn test_anchor_indents_continuation_lines() {
        let mut w = Writer::new(None);
        w.write("x = ");
        w.push_anchor();
        w.write("1,\n2,\n3");
        w.pop_anchor();
        w.write("\nend");
        assert_eq!(w.finish(), "x = 1,\n    2,\n    3\nend");
    }

    #[test]
    fn test_pending_indent_is_blank() {
        let mut w = Writer::new(Some(10));
        w.write("  ");
        w.push_anchor();
        w.write("a\n");
        assert!(w.line_is_blank());
        w.write("b");
        assert!(!w.line_is_blank());
        assert_eq!(w.column(), 3);
    }

    #[test]
    fn test_exceeds() {
        let mut w = Writer::new(Some(5));
        w.write("abc");
        assert!(!w.exceeds(2));
        assert!(w.exceeds(3));
        assert!(!Writer::new(None).exceeds(1000));
    }
}
