//! positioned diagnostics
//!
//! Problems found in the documents are never returned as errors. They are collected as
//! [Diagnostic]s and processing continues; the caller decides if errors are fatal.
use crate::context::ContextId;
use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;
use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => f.write_str("Error"),
            Severity::Warning => f.write_str("Warning"),
        }
    }
}

/// Position in a source file. Lines and columns start at 1, bytes at 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, derive_new::new)]
pub struct Pos {
    pub line: usize,
    pub column: usize,
    pub byte: usize,
}

impl Pos {
    fn at(contents: &str, byte: usize) -> Self {
        let byte = floor_char_boundary(contents, byte);
        let before = &contents[..byte];
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
        let column = before[line_start..].chars().count() + 1;
        Pos::new(line, column, byte)
    }
}

fn floor_char_boundary(contents: &str, byte: usize) -> usize {
    let mut byte = byte.min(contents.len());
    while !contents.is_char_boundary(byte) {
        byte -= 1;
    }
    byte
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceRange {
    pub filename: String,
    pub start: Pos,
    pub end: Pos,
}

impl SourceRange {
    pub fn from_span(filename: impl Into<String>, contents: &str, span: Range<usize>) -> Self {
        Self {
            filename: filename.into(),
            start: Pos::at(contents, span.start),
            end: Pos::at(contents, span.end),
        }
    }

    pub fn bytes(&self) -> Range<usize> {
        self.start.byte..self.end.byte
    }
}

impl fmt::Display for SourceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{},{}-{},{}",
            self.filename, self.start.line, self.start.column, self.end.line, self.end.column
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub summary: String,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<SourceRange>,
    /// Scope the offending expression was evaluated in
    #[serde(skip)]
    pub eval_context: Option<ContextId>,
}

impl Diagnostic {
    pub fn error(summary: impl Into<String>) -> Self {
        Self::new(Severity::Error, summary)
    }

    pub fn warning(summary: impl Into<String>) -> Self {
        Self::new(Severity::Warning, summary)
    }

    fn new(severity: Severity, summary: impl Into<String>) -> Self {
        Self {
            severity,
            summary: summary.into(),
            detail: String::new(),
            subject: None,
            eval_context: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }

    pub fn with_subject(mut self, subject: impl Into<Option<SourceRange>>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn with_eval_context(mut self, id: ContextId) -> Self {
        self.eval_context = Some(id);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Renders the diagnostic with an excerpt of the offending source line
    ///
    /// `files` maps file names to their contents. Without a matching file only the location is
    /// printed.
    pub fn render(&self, files: &IndexMap<String, String>) -> String {
        let mut out = format!("{}: {}\n", self.severity, self.summary);

        if let Some(subject) = &self.subject {
            out.push_str(&format!(
                "\n  on {} line {}:\n",
                subject.filename, subject.start.line
            ));
            let line = files
                .get(&subject.filename)
                .and_then(|contents| contents.lines().nth(subject.start.line - 1));
            if let Some(line) = line {
                out.push_str(&format!("  {:>3}: {}\n", subject.start.line, line));
            }
        }

        if !self.detail.is_empty() {
            out.push('\n');
            out.push_str(&self.detail);
            out.push('\n');
        }

        out
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.summary)?;
        if let Some(subject) = &self.subject {
            write!(f, " ({subject})")?;
        }
        if !self.detail.is_empty() {
            write!(f, "; {}", self.detail)?;
        }
        Ok(())
    }
}

/// Ordered list of [Diagnostic]s
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        tracing::trace!(%diagnostic, "diagnostic");
        self.0.push(diagnostic);
    }

    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        for diagnostic in diagnostics {
            self.push(diagnostic);
        }
    }

    pub fn has_errors(&self) -> bool {
        self.0.iter().any(Diagnostic::is_error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter().filter(|d| d.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter().filter(|d| !d.is_error())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn render(&self, files: &IndexMap<String, String>) -> String {
        self.0
            .iter()
            .map(|d| d.render(files))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl From<Diagnostic> for Diagnostics {
    fn from(value: Diagnostic) -> Self {
        Self(vec![value])
    }
}

impl FromIterator<Diagnostic> for Diagnostics {
    fn from_iter<T: IntoIterator<Item = Diagnostic>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for diagnostic in &self.0 {
            writeln!(f, "{diagnostic}")?;
        }
        Ok(())
    }
}

/// Diagnostics raised while the pass loop is still running
///
/// Entries are keyed by block address and attribute. Recording the same key again replaces the
/// previous entry, so a problem seen on every pass is reported once.
#[derive(Debug, Default)]
pub struct PassDiagnostics {
    entries: IndexMap<(String, String), Diagnostic>,
}

impl PassDiagnostics {
    pub fn record(&mut self, address: &str, attribute: &str, diagnostic: Diagnostic) {
        self.entries
            .insert((address.to_string(), attribute.to_string()), diagnostic);
    }

    /// Drops an entry once the problem went away on a later pass
    pub fn resolve(&mut self, address: &str, attribute: &str) {
        self.entries
            .shift_remove(&(address.to_string(), attribute.to_string()));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_diagnostics(self) -> Diagnostics {
        self.entries.into_values().collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    const SOURCE: &str = "variable \"a\" {}\n\ndata \"coder_parameter\" \"région\" {\n  default = 1\n}\n";

    #[test]
    fn range_from_span() {
        let start = SOURCE.find("default").expect("present");
        let range = SourceRange::from_span("main.tf", SOURCE, start..start + 11);
        assert_eq!(range.start, Pos::new(4, 3, start));
        assert_eq!(range.end.line, 4);
        assert_eq!(range.to_string(), "main.tf:4,3-4,14");
    }

    #[test]
    fn columns_count_characters() {
        let start = SOURCE.find("{\n  default").expect("present");
        let range = SourceRange::from_span("main.tf", SOURCE, start..start + 1);
        assert_eq!(range.start.column, 33);
    }

    #[test]
    fn render_shows_source_line() {
        let start = SOURCE.find("default").expect("present");
        let diagnostic = Diagnostic::error("Invalid default")
            .with_detail("default must be a string")
            .with_subject(SourceRange::from_span("main.tf", SOURCE, start..start + 7));
        let files = IndexMap::from([("main.tf".to_string(), SOURCE.to_string())]);

        assert_eq!(
            diagnostic.render(&files),
            "Error: Invalid default\n\n  on main.tf line 4:\n    4:   default = 1\n\ndefault must be a string\n"
        );
    }

    #[test]
    fn pass_diagnostics_deduplicate() {
        let mut pass = PassDiagnostics::default();
        pass.record("data.coder_parameter.a", "default", Diagnostic::warning("first"));
        pass.record("data.coder_parameter.a", "default", Diagnostic::warning("second"));
        pass.record("data.coder_parameter.b", "default", Diagnostic::warning("other"));
        pass.resolve("data.coder_parameter.b", "default");

        let diagnostics = pass.into_diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics.iter().next().map(|d| d.summary.as_str()), Some("second"));
    }

    #[test]
    fn errors_and_warnings() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.push(Diagnostic::warning("w"));
        assert!(!diagnostics.has_errors());
        diagnostics.push(Diagnostic::error("e"));
        assert!(diagnostics.has_errors());
        assert_eq!(diagnostics.errors().count(), 1);
    }
}
