//! Issues reported against an input.

use std::collections::BTreeSet;
use std::fmt::{self, Display};

/// How serious an issue is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IssueKind {
    /// The input is not in the language.
    Error,
    /// The input was parsed, but something is worth pointing out.
    Warning,
}

/// Which stage of processing found the issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    /// Standalone scanning.
    Scan,
    /// Parsing.
    Parse,
}

/// A span of the input. `line` and `column` are 1-based and count chars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct InputLocation {
    /// Byte offset of the start.
    pub position: usize,
    /// Column of the start.
    pub column: usize,
    /// Line of the start.
    pub line: usize,
    /// Length in bytes.
    pub length: usize,
}

/// Converts byte offsets into line and column numbers.
#[derive(Debug, Clone)]
pub struct LineIndex<'a> {
    text: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    /// Index the line starts of `text`.
    pub fn new(text: &'a str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        LineIndex { text, line_starts }
    }

    /// The location of `length` bytes starting at `position`.
    pub fn location(&self, position: usize, length: usize) -> InputLocation {
        let line = match self.line_starts.binary_search(&position) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        let column = self.text[self.line_starts[line]..position].chars().count() + 1;
        InputLocation {
            position,
            column,
            line: line + 1,
            length,
        }
    }
}

/// Something wrong with, or noteworthy about, an input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageIssue {
    /// Error or warning.
    pub kind: IssueKind,
    /// Where it was found.
    pub phase: Phase,
    /// What part of the input it concerns.
    pub location: InputLocation,
    /// A human readable description.
    pub message: String,
    /// For syntax errors, the names of the terminals that would have been accepted.
    pub expected: BTreeSet<String>,
}

impl LanguageIssue {
    /// Whether this is an error.
    pub fn is_error(&self) -> bool {
        self.kind == IssueKind::Error
    }
}

impl Display for LanguageIssue {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        let kind = match self.kind {
            IssueKind::Error => "error",
            IssueKind::Warning => "warning",
        };
        write!(
            f,
            "{} ({:?}) at {}:{}: {}",
            kind, self.phase, self.location.line, self.location.column, self.message
        )
    }
}

/// A few characters either side of `position`, with `^` marking it.
pub(crate) fn context_at(text: &str, position: usize) -> String {
    const WIDTH: usize = 10;
    let before: String = {
        let chars: Vec<char> = text[..position].chars().rev().take(WIDTH).collect();
        chars.into_iter().rev().collect()
    };
    let after: String = text[position..].chars().take(WIDTH).collect();
    let prefix = if before.len() < position { "..." } else { "" };
    let suffix = if position + after.len() < text.len() { "..." } else { "" };
    format!("{}{}^{}{}", prefix, before, after, suffix)
}
