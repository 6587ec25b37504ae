//! Cell-text delimiter configuration.
//!
//! The legacy tool kept these as process-wide mutable globals; here they are an
//! immutable value threaded through the cell parser and both emitters, so two
//! compilations with different delimiters can coexist.

/// Delimiters used when splitting raw cell text, plus the indentation unit for
/// the emitted data tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeparatorConfig {
    /// `key=value` separator inside map cells.
    pub map_sep: String,
    /// element separator inside array cells and between map pairs.
    pub array_sep: String,
    /// opening token of a nested array group.
    pub token_begin: String,
    /// closing token of a nested array group.
    pub token_end: String,
    /// one level of indentation in the emitted table literals.
    pub indent: String,
}

impl Default for SeparatorConfig {
    fn default() -> Self {
        Self {
            map_sep: "=".to_string(),
            array_sep: ",".to_string(),
            token_begin: "[".to_string(),
            token_end: "]".to_string(),
            indent: "\t".to_string(),
        }
    }
}

impl SeparatorConfig {
    /// Indentation prefix for `depth` nesting levels.
    pub fn indent_for(&self, depth: usize) -> String {
        self.indent.repeat(depth)
    }
}
