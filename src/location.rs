use std::fmt;

/// Indentation used for the source line and caret under a diagnostic.
const GUTTER: &str = "                ";

/// Where a token started: file, 1-based line and column, and the text of
/// that line for the caret display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: String,
    pub line: usize,
    pub column: usize,
    pub line_text: String,
}

impl SourceLocation {
    pub fn new(
        file: impl Into<String>,
        line: usize,
        column: usize,
        line_text: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            line,
            column,
            line_text: line_text.into(),
        }
    }
}

/// The full line starting at `line_start`, without its terminator.
pub(crate) fn line_text(source: &str, line_start: usize) -> &str {
    let rest = &source[line_start..];
    let line = match rest.find('\n') {
        Some(end) => &rest[..end],
        None => rest,
    };
    line.strip_suffix('\r').unwrap_or(line)
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}:{}:{})\n{GUTTER}{}\n{GUTTER}{}^",
            self.file,
            self.line,
            self.column,
            self.line_text,
            " ".repeat(self.column.saturating_sub(1))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caret_under_first_column() {
        let loc = SourceLocation::new("temp.txt.gel", 1, 1, "[[ name2 ]]");
        assert_eq!(
            loc.to_string(),
            "(temp.txt.gel:1:1)\n                [[ name2 ]]\n                ^"
        );
    }

    #[test]
    fn caret_follows_column() {
        let loc = SourceLocation::new("a.gel", 2, 4, "ab [[ x");
        assert_eq!(
            loc.to_string(),
            "(a.gel:2:4)\n                ab [[ x\n                   ^"
        );
    }
}
