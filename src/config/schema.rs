use crate::document::{LineEnding, SourceDocument};
use crate::edit::{LineGuard, Occurrence, PatchOperation};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;

/// A patch-set file: metadata plus an ordered list of operations against one
/// target file.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct PatchSet {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub patches: Vec<PatchDefinition>,
}

impl PatchSet {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();
        let mut seen_ids = HashSet::new();

        if self.patches.is_empty() {
            issues.push(ValidationIssue::EmptyPatchList);
        }

        for patch in &self.patches {
            let patch_id = if patch.id.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    patch_id: None,
                    field: "id",
                });
                None
            } else {
                if !seen_ids.insert(patch.id.as_str()) {
                    issues.push(ValidationIssue::DuplicateId(patch.id.clone()));
                }
                Some(patch.id.clone())
            };

            match &patch.operation {
                Operation::Replace { search, .. } => {
                    if search.is_empty() {
                        issues.push(ValidationIssue::MissingField {
                            patch_id: patch_id.clone(),
                            field: "operation.search",
                        });
                    }
                    if patch.guard.is_some() {
                        issues.push(ValidationIssue::InvalidCombo {
                            patch_id: patch_id.clone(),
                            message: "guard is only supported on line-range operations"
                                .to_string(),
                        });
                    }
                }
                Operation::LineRange {
                    start, lines, text, ..
                } => {
                    if *start < 0 {
                        issues.push(ValidationIssue::InvalidCombo {
                            patch_id: patch_id.clone(),
                            message: format!("start must be non-negative (got {start})"),
                        });
                    }
                    if !lines.is_empty() && text.is_some() {
                        issues.push(ValidationIssue::InvalidCombo {
                            patch_id: patch_id.clone(),
                            message: "lines and text cannot both be set".to_string(),
                        });
                    }
                }
            }

            if let Some(Guard::Hash { expected, .. }) = &patch.guard {
                if parse_hash(expected).is_none() {
                    issues.push(ValidationIssue::InvalidCombo {
                        patch_id: patch_id.clone(),
                        message: format!("invalid hash value: {expected}"),
                    });
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Target file, relative to the patch-set file's directory
    #[serde(default)]
    pub target: Option<String>,
    /// Abort without writing if any operation does not apply
    #[serde(default)]
    pub strict: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PatchDefinition {
    pub id: String,
    pub operation: Operation,
    #[serde(default)]
    pub guard: Option<Guard>,
}

impl PatchDefinition {
    /// Lower this definition to a [`PatchOperation`] against `doc` as it
    /// currently reads.
    ///
    /// Bare `lines` entries get the document's line ending, except that the
    /// last entry stays bare when the range overwrites an unterminated final
    /// line.
    pub fn to_operation(&self, doc: &SourceDocument) -> Result<PatchOperation, ValidationIssue> {
        let invalid = |message: String| ValidationIssue::InvalidCombo {
            patch_id: Some(self.id.clone()),
            message,
        };

        match &self.operation {
            Operation::Replace {
                search,
                replacement,
                occurrence,
            } => Ok(PatchOperation::WholeTextReplace {
                search: search.clone(),
                replacement: replacement.clone(),
                occurrence: *occurrence,
            }),
            Operation::LineRange {
                start,
                count,
                lines,
                text,
            } => {
                let start = usize::try_from(*start)
                    .map_err(|_| invalid(format!("start must be non-negative (got {start})")))?;

                let lines = match text {
                    Some(text) => text.split_inclusive('\n').map(str::to_string).collect(),
                    None => {
                        let line_ending = doc.line_ending();
                        let bare_tail = overwrites_unterminated_tail(doc, start, *count);
                        let last = lines.len().saturating_sub(1);
                        lines
                            .iter()
                            .enumerate()
                            .map(|(idx, line)| {
                                if bare_tail && idx == last {
                                    line.clone()
                                } else {
                                    terminate(line, line_ending)
                                }
                            })
                            .collect()
                    }
                };

                let guard = match &self.guard {
                    None => None,
                    Some(Guard::Contains { text }) => Some(LineGuard::Contains(text.clone())),
                    Some(Guard::ExactMatch { expected_text }) => {
                        Some(LineGuard::Exact(expected_text.clone()))
                    }
                    Some(Guard::Hash {
                        algorithm,
                        expected,
                    }) => {
                        let hash = parse_hash(expected)
                            .ok_or_else(|| invalid(format!("invalid hash value: {expected}")))?;
                        match algorithm {
                            HashAlgorithm::Xxh3 => Some(LineGuard::Hash(hash)),
                        }
                    }
                };

                Ok(PatchOperation::LineRangeReplace {
                    start,
                    count: *count,
                    lines,
                    guard,
                })
            }
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Operation {
    /// Exact substring replacement
    Replace {
        search: String,
        #[serde(default)]
        replacement: String,
        #[serde(default)]
        occurrence: Occurrence,
    },
    /// Overwrite a zero-based line range
    LineRange {
        start: i64,
        #[serde(default)]
        count: usize,
        /// Replacement lines; a missing terminator is added
        #[serde(default)]
        lines: Vec<String>,
        /// Replacement block, split after each newline and used verbatim
        #[serde(default)]
        text: Option<String>,
    },
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Guard {
    Contains {
        text: String,
    },
    ExactMatch {
        expected_text: String,
    },
    Hash {
        #[serde(default)]
        algorithm: HashAlgorithm,
        expected: String,
    },
}

/// Hash used by `method = "hash"` guards. Only xxh3-64 is supported.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum HashAlgorithm {
    #[default]
    Xxh3,
}

fn parse_hash(expected: &str) -> Option<u64> {
    let hex = expected.trim();
    let hex = hex
        .strip_prefix("0x")
        .or_else(|| hex.strip_prefix("0X"))
        .unwrap_or(hex);
    u64::from_str_radix(hex, 16).ok()
}

/// True when lines `[start, start + count)` end at an unterminated last line.
fn overwrites_unterminated_tail(doc: &SourceDocument, start: usize, count: usize) -> bool {
    count > 0
        && start.checked_add(count) == Some(doc.line_count())
        && !doc.as_str().ends_with('\n')
}

fn terminate(line: &str, line_ending: LineEnding) -> String {
    if line.ends_with('\n') {
        line.to_string()
    } else {
        format!("{line}{}", line_ending.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    EmptyPatchList,
    DuplicateId(String),
    MissingField {
        patch_id: Option<String>,
        field: &'static str,
    },
    InvalidCombo {
        patch_id: Option<String>,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyPatchList => write!(f, "patch set contains no patches"),
            ValidationIssue::DuplicateId(id) => write!(f, "duplicate patch id '{id}'"),
            ValidationIssue::MissingField { patch_id, field } => match patch_id {
                Some(id) => write!(f, "patch '{id}' missing required field '{field}'"),
                None => write!(f, "patch missing required field '{field}'"),
            },
            ValidationIssue::InvalidCombo { patch_id, message } => match patch_id {
                Some(id) => write!(f, "patch '{id}' has invalid configuration: {message}"),
                None => write!(f, "invalid patch configuration: {message}"),
            },
        }
    }
}
