//! Near-miss lookup for search strings that did not match.
//!
//! A missing search string usually means the target drifted: whitespace
//! changed, a quote style flipped, an identifier was renamed. Pointing at the
//! most similar line turns a silent no-op into something a human can act on.

use std::fmt;

/// Minimum normalized Levenshtein similarity for a line to be reported.
pub const HINT_THRESHOLD: f64 = 0.6;

/// The document line closest to a search string's first non-blank line.
#[derive(Debug, Clone, PartialEq)]
pub struct NearMiss {
    /// 1-based line number
    pub line: usize,
    /// Line text without its terminator
    pub text: String,
    /// Similarity in `[0, 1]`
    pub similarity: f64,
}

impl fmt::Display for NearMiss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "line {} ({:.0}% similar): {:?}",
            self.line,
            self.similarity * 100.0,
            self.text.trim()
        )
    }
}

/// Find the line in `text` most similar to the first non-blank line of
/// `search`, comparing with surrounding whitespace trimmed.
///
/// Ties go to the earliest line.
pub fn nearest_line(text: &str, search: &str) -> Option<NearMiss> {
    let needle = search.lines().map(str::trim).find(|line| !line.is_empty())?;

    let mut best: Option<(usize, &str, f64)> = None;
    for (idx, line) in text.lines().enumerate() {
        let candidate = line.trim();
        if candidate.is_empty() {
            continue;
        }
        let similarity = strsim::normalized_levenshtein(needle, candidate);
        if similarity < HINT_THRESHOLD {
            continue;
        }
        if best.map_or(true, |(_, _, top)| similarity > top) {
            best = Some((idx, line, similarity));
        }
    }

    best.map(|(idx, line, similarity)| NearMiss {
        line: idx + 1,
        text: line.to_string(),
        similarity,
    })
}
