use crate::document::SourceDocument;
use crate::fuzzy::{self, NearMiss};
use serde::Deserialize;
use std::fmt;
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// One text-mutation instruction.
///
/// Content-anchored edits (`WholeTextReplace`) survive line-number drift from
/// earlier operations; position-anchored edits (`LineRangeReplace`) do not,
/// so prefer the former whenever the surrounding text is stable.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "PatchOperation does nothing until apply() is called"]
pub enum PatchOperation {
    /// Replace an exact substring.
    WholeTextReplace {
        search: String,
        replacement: String,
        occurrence: Occurrence,
    },
    /// Overwrite `count` lines starting at zero-based `start` with `lines`.
    ///
    /// `lines` are inserted literally and may differ in number from `count`,
    /// which shifts every later line index.
    LineRangeReplace {
        start: usize,
        count: usize,
        lines: Vec<String>,
        guard: Option<LineGuard>,
    },
}

/// Which occurrences of a search string a `WholeTextReplace` rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Occurrence {
    /// Only the first occurrence by position
    First,
    /// Every non-overlapping occurrence, scanned left to right
    #[default]
    All,
    /// Exactly one occurrence must exist; otherwise nothing changes
    Unique,
}

impl fmt::Display for Occurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Occurrence::First => write!(f, "first"),
            Occurrence::All => write!(f, "all"),
            Occurrence::Unique => write!(f, "unique"),
        }
    }
}

/// Content check on the lines a `LineRangeReplace` is about to overwrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineGuard {
    /// The line at `start` must contain this text
    Contains(String),
    /// The overwritten span must equal this text exactly
    Exact(String),
    /// xxh3 hash of the overwritten span
    Hash(u64),
}

impl LineGuard {
    /// Guard on the exact span text, hashing spans over 1KB.
    pub fn from_span(text: &str) -> Self {
        if text.len() > 1024 {
            LineGuard::Hash(xxh3_64(text.as_bytes()))
        } else {
            LineGuard::Exact(text.to_string())
        }
    }

    /// Guard pinning lines `[start, start + count)` of `doc` as they read now.
    pub fn for_lines(doc: &SourceDocument, start: usize, count: usize) -> Result<Self, PatchError> {
        let span = doc.line_span(start, count).ok_or(PatchError::Range {
            start,
            count,
            line_count: doc.line_count(),
        })?;
        Ok(Self::from_span(&doc.as_str()[span]))
    }

    /// Check the guard against the first guarded line and the whole span.
    pub fn matches(&self, first_line: Option<&str>, span: &str) -> bool {
        match self {
            LineGuard::Contains(needle) => first_line.is_some_and(|line| line.contains(needle)),
            LineGuard::Exact(expected) => span == expected,
            LineGuard::Hash(expected) => xxh3_64(span.as_bytes()) == *expected,
        }
    }
}

impl fmt::Display for LineGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineGuard::Contains(needle) => write!(f, "line containing {needle:?}"),
            LineGuard::Exact(expected) => {
                write!(f, "span {:?}", first_line_of(expected))
            }
            LineGuard::Hash(hash) => write!(f, "span with xxh3 {hash:#018x}"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    #[error("Line range out of bounds: start {start} + count {count} exceeds {line_count} lines")]
    Range {
        start: usize,
        count: usize,
        line_count: usize,
    },
}

/// Outcome of one operation that did not hit a fatal error.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "PatchResult should be checked, a no-op is not an error"]
pub enum PatchResult {
    /// The document changed (`replacements` spans were rewritten)
    Applied { replacements: usize },
    /// The search string does not occur in the document
    NotFound { hint: Option<NearMiss> },
    /// `Occurrence::Unique` found more than one match
    Ambiguous { count: usize },
    /// A `LineGuard` rejected the lines at the target position
    GuardMismatch { expected: String, found: String },
}

impl PatchResult {
    pub fn is_applied(&self) -> bool {
        matches!(self, PatchResult::Applied { .. })
    }
}

impl fmt::Display for PatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchResult::Applied { replacements: 1 } => write!(f, "Applied (1 replacement)"),
            PatchResult::Applied { replacements } => {
                write!(f, "Applied ({replacements} replacements)")
            }
            PatchResult::NotFound { hint: None } => write!(f, "Search text not found"),
            PatchResult::NotFound { hint: Some(hint) } => {
                write!(f, "Search text not found (closest: {hint})")
            }
            PatchResult::Ambiguous { count } => {
                write!(f, "Ambiguous: {count} matches, expected exactly 1")
            }
            PatchResult::GuardMismatch { expected, found } => {
                write!(f, "Guard mismatch: expected {expected}, found {found:?}")
            }
        }
    }
}

impl PatchOperation {
    /// Replace every occurrence of `search`.
    pub fn replace(search: impl Into<String>, replacement: impl Into<String>) -> Self {
        PatchOperation::WholeTextReplace {
            search: search.into(),
            replacement: replacement.into(),
            occurrence: Occurrence::All,
        }
    }

    /// Overwrite `count` lines at `start` with `lines`, unguarded.
    pub fn line_range<I, S>(start: usize, count: usize, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PatchOperation::LineRangeReplace {
            start,
            count,
            lines: lines.into_iter().map(Into::into).collect(),
            guard: None,
        }
    }

    /// Set the occurrence policy. No effect on line-range operations.
    pub fn with_occurrence(mut self, policy: Occurrence) -> Self {
        if let PatchOperation::WholeTextReplace { occurrence, .. } = &mut self {
            *occurrence = policy;
        }
        self
    }

    /// Attach a guard. No effect on substring operations.
    pub fn with_guard(mut self, line_guard: LineGuard) -> Self {
        if let PatchOperation::LineRangeReplace { guard, .. } = &mut self {
            *guard = Some(line_guard);
        }
        self
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PatchOperation::WholeTextReplace { .. } => "replace",
            PatchOperation::LineRangeReplace { .. } => "line-range",
        }
    }

    /// Apply to `doc` in place.
    ///
    /// Only an out-of-range line index is an error; every other outcome,
    /// including "nothing matched", comes back as a [`PatchResult`] with the
    /// document untouched.
    pub fn apply(&self, doc: &mut SourceDocument) -> Result<PatchResult, PatchError> {
        match self {
            PatchOperation::WholeTextReplace {
                search,
                replacement,
                occurrence,
            } => Ok(apply_whole_text_replace(
                doc,
                search,
                replacement,
                *occurrence,
            )),
            PatchOperation::LineRangeReplace {
                start,
                count,
                lines,
                guard,
            } => replace_line_range(doc, *start, *count, lines, guard.as_ref()),
        }
    }
}

/// Replace occurrences of `search` according to `occurrence`.
pub fn apply_whole_text_replace(
    doc: &mut SourceDocument,
    search: &str,
    replacement: &str,
    occurrence: Occurrence,
) -> PatchResult {
    let text = doc.as_str();
    if search.is_empty() || !text.contains(search) {
        return PatchResult::NotFound {
            hint: fuzzy::nearest_line(text, search),
        };
    }

    match occurrence {
        Occurrence::All => {
            let replacements = text.matches(search).count();
            let new_text = text.replace(search, replacement);
            doc.set_text(new_text);
            PatchResult::Applied { replacements }
        }
        Occurrence::First => {
            let Some(start) = text.find(search) else {
                return PatchResult::NotFound { hint: None };
            };
            doc.splice(start..start + search.len(), replacement);
            PatchResult::Applied { replacements: 1 }
        }
        Occurrence::Unique => {
            let mut matches = text.match_indices(search);
            let Some((start, _)) = matches.next() else {
                return PatchResult::NotFound { hint: None };
            };
            if matches.next().is_some() {
                return PatchResult::Ambiguous {
                    count: text.matches(search).count(),
                };
            }
            doc.splice(start..start + search.len(), replacement);
            PatchResult::Applied { replacements: 1 }
        }
    }
}

/// Overwrite `count` lines at `start` with `lines`.
///
/// `count == 0` inserts before line `start`; empty `lines` deletes.
/// `start == line_count` with `count == 0` appends at end of file.
pub fn apply_line_range_replace<S: AsRef<str>>(
    doc: &mut SourceDocument,
    start: usize,
    count: usize,
    lines: &[S],
) -> Result<PatchResult, PatchError> {
    replace_line_range(doc, start, count, lines, None)
}

fn replace_line_range<S: AsRef<str>>(
    doc: &mut SourceDocument,
    start: usize,
    count: usize,
    lines: &[S],
    guard: Option<&LineGuard>,
) -> Result<PatchResult, PatchError> {
    let span = doc.line_span(start, count).ok_or(PatchError::Range {
        start,
        count,
        line_count: doc.line_count(),
    })?;

    if let Some(guard) = guard {
        let text = doc.as_str();
        let first_line = text[span.start..].split_inclusive('\n').next();
        let current = &text[span.clone()];
        if !guard.matches(first_line, current) {
            let found = match guard {
                LineGuard::Contains(_) => first_line.map(first_line_of),
                _ => Some(first_line_of(current)),
            };
            return Ok(PatchResult::GuardMismatch {
                expected: guard.to_string(),
                found: found.unwrap_or("<end of file>").to_string(),
            });
        }
    }

    let replacement: String = lines.iter().map(|line| line.as_ref()).collect();
    doc.splice(span, &replacement);

    Ok(PatchResult::Applied { replacements: 1 })
}

fn first_line_of(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_all_occurrences() {
        let mut doc = SourceDocument::new("foo(bar);\nfoo(bar);\n");
        let result = apply_whole_text_replace(&mut doc, "foo(bar)", "foo(baz)", Occurrence::All);

        assert_eq!(result, PatchResult::Applied { replacements: 2 });
        assert_eq!(doc.as_str(), "foo(baz);\nfoo(baz);\n");
    }

    #[test]
    fn test_replace_first_occurrence() {
        let mut doc = SourceDocument::new("x = 1; x = 1;");
        let result = apply_whole_text_replace(&mut doc, "x = 1", "x = 2", Occurrence::First);

        assert!(result.is_applied());
        assert_eq!(doc.as_str(), "x = 2; x = 1;");
    }

    #[test]
    fn test_replace_unique_rejects_duplicates() {
        let mut doc = SourceDocument::new("a a a");
        let result = apply_whole_text_replace(&mut doc, "a", "b", Occurrence::Unique);

        assert_eq!(result, PatchResult::Ambiguous { count: 3 });
        assert_eq!(doc.as_str(), "a a a");
    }

    #[test]
    fn test_replace_unique_single_match() {
        let mut doc = SourceDocument::new("return _uploadedPhotos.isNotEmpty;");
        let result = apply_whole_text_replace(
            &mut doc,
            "_uploadedPhotos.isNotEmpty",
            "true",
            Occurrence::Unique,
        );

        assert!(result.is_applied());
        assert_eq!(doc.as_str(), "return true;");
    }

    #[test]
    fn test_replace_missing_is_noop() {
        let mut doc = SourceDocument::new("nothing to see\n");
        let result = apply_whole_text_replace(&mut doc, "missing", "x", Occurrence::All);

        assert!(matches!(result, PatchResult::NotFound { .. }));
        assert_eq!(doc.as_str(), "nothing to see\n");
    }

    #[test]
    fn test_replace_empty_search_is_noop() {
        let mut doc = SourceDocument::new("abc");
        let result = apply_whole_text_replace(&mut doc, "", "x", Occurrence::All);

        assert_eq!(result, PatchResult::NotFound { hint: None });
        assert_eq!(doc.as_str(), "abc");
    }

    #[test]
    fn test_line_range_scenario() {
        let mut doc = SourceDocument::from_lines(["A\n", "B\n", "C\n"]);
        let result = apply_line_range_replace(&mut doc, 1, 1, &["X\n", "Y\n"]).unwrap();

        assert!(result.is_applied());
        assert_eq!(doc.lines(), vec!["A\n", "X\n", "Y\n", "C\n"]);
    }

    #[test]
    fn test_line_range_append_at_end() {
        let mut doc = SourceDocument::new("A\nB\n");
        let result = apply_line_range_replace(&mut doc, 2, 0, &["C\n"]).unwrap();

        assert!(result.is_applied());
        assert_eq!(doc.as_str(), "A\nB\nC\n");
    }

    #[test]
    fn test_line_range_past_end_is_error() {
        let mut doc = SourceDocument::new("A\nB\n");
        let err = apply_line_range_replace(&mut doc, 2, 1, &["C\n"]).unwrap_err();

        assert_eq!(
            err,
            PatchError::Range {
                start: 2,
                count: 1,
                line_count: 2
            }
        );
        assert_eq!(doc.as_str(), "A\nB\n");
    }

    #[test]
    fn test_line_range_keeps_crlf_elsewhere() {
        let mut doc = SourceDocument::new("a\r\nb\r\nc\r\n");
        apply_line_range_replace(&mut doc, 1, 1, &["B\r\n"]).unwrap();
        assert_eq!(doc.as_str(), "a\r\nB\r\nc\r\n");
    }

    #[test]
    fn test_guard_contains_accepts() {
        let mut doc = SourceDocument::new("head\n  onPhotosChanged: (photos) {\n  },\n");
        let op = PatchOperation::line_range(1, 1, ["  onPhotosChanged: (photos) { log(); \n"])
            .with_guard(LineGuard::Contains("onPhotosChanged".to_string()));

        let result = op.apply(&mut doc).unwrap();
        assert!(result.is_applied());
        assert!(doc.as_str().contains("log();"));
    }

    #[test]
    fn test_guard_contains_rejects_drifted_line() {
        let mut doc = SourceDocument::new("head\nother\n  onPhotosChanged: (photos) {\n");
        let op = PatchOperation::line_range(1, 1, ["replaced\n"])
            .with_guard(LineGuard::Contains("onPhotosChanged".to_string()));

        let result = op.apply(&mut doc).unwrap();
        assert_eq!(
            result,
            PatchResult::GuardMismatch {
                expected: "line containing \"onPhotosChanged\"".to_string(),
                found: "other".to_string(),
            }
        );
        assert_eq!(doc.as_str(), "head\nother\n  onPhotosChanged: (photos) {\n");
    }

    #[test]
    fn test_guard_contains_at_end_of_file() {
        let mut doc = SourceDocument::new("only\n");
        let op = PatchOperation::line_range(1, 0, ["new\n"])
            .with_guard(LineGuard::Contains("x".to_string()));

        let result = op.apply(&mut doc).unwrap();
        assert!(matches!(
            result,
            PatchResult::GuardMismatch { ref found, .. } if found == "<end of file>"
        ));
    }

    #[test]
    fn test_guard_hash_matches_span() {
        let mut doc = SourceDocument::new("a\nb\nc\n");
        let op = PatchOperation::line_range(1, 2, ["z\n"])
            .with_guard(LineGuard::Hash(xxh3_64(b"b\nc\n")));

        assert!(op.apply(&mut doc).unwrap().is_applied());
        assert_eq!(doc.as_str(), "a\nz\n");
    }

    #[test]
    fn test_range_checked_before_guard() {
        let mut doc = SourceDocument::new("a\n");
        let op = PatchOperation::line_range(0, 5, Vec::<String>::new())
            .with_guard(LineGuard::Contains("a".to_string()));

        assert!(matches!(op.apply(&mut doc), Err(PatchError::Range { .. })));
    }

    #[test]
    fn test_guard_from_span_small_and_large() {
        assert!(matches!(LineGuard::from_span("small"), LineGuard::Exact(_)));
        let large = "x".repeat(2000);
        let guard = LineGuard::from_span(&large);
        assert!(matches!(guard, LineGuard::Hash(_)));
        assert!(guard.matches(None, &large));
    }

    #[test]
    fn test_guard_for_lines_pins_current_span() {
        let mut doc = SourceDocument::new("a\nb\nc\n");
        let guard = LineGuard::for_lines(&doc, 1, 2).unwrap();
        assert_eq!(guard, LineGuard::Exact("b\nc\n".to_string()));

        let result = PatchOperation::line_range(1, 2, ["B\n"])
            .with_guard(guard.clone())
            .apply(&mut doc)
            .unwrap();
        assert!(result.is_applied());

        // The pinned span is gone, so the same guard now refuses
        let mut doc_again = SourceDocument::new("a\nB\n");
        let result = PatchOperation::line_range(1, 1, ["x\n"])
            .with_guard(guard)
            .apply(&mut doc_again)
            .unwrap();
        assert!(matches!(result, PatchResult::GuardMismatch { .. }));
    }

    #[test]
    fn test_guard_for_lines_out_of_range() {
        let doc = SourceDocument::new("a\n");
        assert_eq!(
            LineGuard::for_lines(&doc, 1, 1),
            Err(PatchError::Range {
                start: 1,
                count: 1,
                line_count: 1,
            })
        );
    }

    #[test]
    fn test_builders_ignore_mismatched_variant() {
        let op = PatchOperation::replace("a", "b")
            .with_guard(LineGuard::Contains("a".to_string()))
            .with_occurrence(Occurrence::First);
        assert_eq!(
            op,
            PatchOperation::WholeTextReplace {
                search: "a".to_string(),
                replacement: "b".to_string(),
                occurrence: Occurrence::First,
            }
        );
        assert_eq!(op.kind(), "replace");
    }

    #[test]
    fn test_patch_result_display() {
        assert!(PatchResult::Applied { replacements: 2 }
            .to_string()
            .contains("2 replacements"));
        assert!(PatchResult::NotFound { hint: None }
            .to_string()
            .contains("not found"));
        assert!(PatchResult::Ambiguous { count: 3 }
            .to_string()
            .contains("3 matches"));
    }
}
