//! Configuration for rendering

/// Default limit on nested template instances
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Options controlling a single render
#[derive(Debug, Clone, PartialEq)]
pub struct RenderConfig {
    /// Column limit for `wrap`; wrapping is off when `None`
    pub line_width: Option<usize>,

    /// Maximum nesting of template instances before the render fails
    pub max_depth: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            line_width: None,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl RenderConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap lines at `width` columns
    pub fn with_line_width(mut self, width: usize) -> Self {
        self.line_width = Some(width);
        self
    }

    /// Disable line wrapping
    pub fn without_line_width(mut self) -> Self {
        self.line_width = None;
        self
    }

    /// Set the nesting limit
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }
}
