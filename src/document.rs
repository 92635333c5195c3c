use std::fs;
use std::io::{ErrorKind, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The full text of a target file.
///
/// The text is authoritative; the line view is derived on demand by splitting
/// after every `'\n'`, so each line keeps its own terminator (`"\n"` or
/// `"\r\n"`) and the last line may have none. Concatenating the lines gives
/// back the text byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceDocument {
    text: String,
}

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    #[error("{path} is not valid UTF-8 (first invalid byte at offset {offset})")]
    Encoding { path: PathBuf, offset: usize },

    #[error("File I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Line terminator style of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    #[default]
    Lf,
    CrLf,
}

impl LineEnding {
    /// Detect the style from the first terminator in `text`, defaulting to LF.
    pub fn detect(text: &str) -> Self {
        match text.find('\n') {
            Some(idx) if text[..idx].ends_with('\r') => LineEnding::CrLf,
            _ => LineEnding::Lf,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
        }
    }
}

impl SourceDocument {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Build a document from lines that already carry their terminators.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut text = String::new();
        for line in lines {
            text.push_str(line.as_ref());
        }
        Self { text }
    }

    /// Read the whole file at `path` as UTF-8.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DocumentError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| match source.kind() {
            ErrorKind::NotFound => DocumentError::NotFound(path.to_path_buf()),
            _ => DocumentError::Io {
                path: path.to_path_buf(),
                source,
            },
        })?;

        let text = String::from_utf8(bytes).map_err(|e| DocumentError::Encoding {
            path: path.to_path_buf(),
            offset: e.utf8_error().valid_up_to(),
        })?;

        Ok(Self { text })
    }

    /// Write the whole document to `path` atomically.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), DocumentError> {
        let path = path.as_ref();
        atomic_write(path, self.text.as_bytes()).map_err(|source| DocumentError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }

    pub fn lines(&self) -> Vec<&str> {
        self.text.split_inclusive('\n').collect()
    }

    pub fn line_count(&self) -> usize {
        self.text.split_inclusive('\n').count()
    }

    pub fn line_ending(&self) -> LineEnding {
        LineEnding::detect(&self.text)
    }

    /// Byte span covering lines `[start, start + count)`.
    ///
    /// `start == line_count()` with `count == 0` is the empty span at the end
    /// of the text. Returns `None` when the range runs past the last line.
    pub fn line_span(&self, start: usize, count: usize) -> Option<Range<usize>> {
        let end = start.checked_add(count)?;
        let bounds = self.line_bounds();
        if end >= bounds.len() {
            return None;
        }
        Some(bounds[start]..bounds[end])
    }

    /// Replace the bytes in `span` with `text`.
    ///
    /// Panics if `span` is out of bounds or not on char boundaries, like
    /// [`String::replace_range`]. Spans from [`Self::line_span`] and substring
    /// matches always satisfy this.
    pub fn splice(&mut self, span: Range<usize>, text: &str) {
        self.text.replace_range(span, text);
    }

    pub(crate) fn set_text(&mut self, text: String) {
        self.text = text;
    }

    /// Start offset of every line, followed by the text length.
    fn line_bounds(&self) -> Vec<usize> {
        let mut bounds = Vec::with_capacity(self.text.len() / 32 + 2);
        bounds.push(0);
        let mut offset = 0;
        for line in self.text.split_inclusive('\n') {
            offset += line.len();
            bounds.push(offset);
        }
        bounds
    }
}

impl From<String> for SourceDocument {
    fn from(text: String) -> Self {
        Self { text }
    }
}

impl From<&str> for SourceDocument {
    fn from(text: &str) -> Self {
        Self {
            text: text.to_string(),
        }
    }
}

/// Atomic file write: tempfile + fsync + rename.
///
/// Either the full write succeeds or the target is left untouched. An
/// existing target's permissions carry over to the new file.
fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    // Create tempfile in same directory to ensure same filesystem
    let parent = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;

    if let Ok(metadata) = fs::metadata(path) {
        temp.as_file().set_permissions(metadata.permissions())?;
    }

    temp.persist(path).map_err(|e| e.error)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_keep_terminators() {
        let doc = SourceDocument::new("a\r\nb\nc");
        assert_eq!(doc.lines(), vec!["a\r\n", "b\n", "c"]);
        assert_eq!(doc.line_count(), 3);
    }

    #[test]
    fn test_empty_document_has_no_lines() {
        let doc = SourceDocument::default();
        assert_eq!(doc.line_count(), 0);
        assert_eq!(doc.line_span(0, 0), Some(0..0));
        assert_eq!(doc.line_span(0, 1), None);
    }

    #[test]
    fn test_line_span_bounds() {
        let doc = SourceDocument::new("A\nB\nC\n");
        assert_eq!(doc.line_span(1, 1), Some(2..4));
        assert_eq!(doc.line_span(0, 3), Some(0..6));
        assert_eq!(doc.line_span(3, 0), Some(6..6));
        assert_eq!(doc.line_span(3, 1), None);
        assert_eq!(doc.line_span(usize::MAX, 2), None);
    }

    #[test]
    fn test_from_lines_concatenates() {
        let doc = SourceDocument::from_lines(["A\n", "B\n"]);
        assert_eq!(doc.as_str(), "A\nB\n");
    }

    #[test]
    fn test_line_ending_detection() {
        assert_eq!(LineEnding::detect("a\r\nb\n"), LineEnding::CrLf);
        assert_eq!(LineEnding::detect("a\nb\r\n"), LineEnding::Lf);
        assert_eq!(LineEnding::detect("no newline"), LineEnding::Lf);
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result = SourceDocument::load(temp_dir.path().join("missing.dart"));
        assert!(matches!(result, Err(DocumentError::NotFound(_))));
    }

    #[test]
    fn test_load_invalid_utf8() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("bad.txt");
        fs::write(&file_path, b"ok\n\xff\xfe").unwrap();

        let result = SourceDocument::load(&file_path);
        assert!(matches!(
            result,
            Err(DocumentError::Encoding { offset: 3, .. })
        ));
    }

    #[test]
    fn test_save_round_trip_preserves_bytes() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("page.dart");
        let original = "line one\r\nline two\n\n  trailing";
        fs::write(&file_path, original).unwrap();

        let doc = SourceDocument::load(&file_path).unwrap();
        doc.save(&file_path).unwrap();

        assert_eq!(fs::read(&file_path).unwrap(), original.as_bytes());
    }

    #[test]
    #[cfg(unix)]
    fn test_save_preserves_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("script.sh");
        fs::write(&file_path, "echo hi\n").unwrap();
        fs::set_permissions(&file_path, fs::Permissions::from_mode(0o755)).unwrap();

        SourceDocument::new("echo bye\n").save(&file_path).unwrap();

        let mode = fs::metadata(&file_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
        assert_eq!(fs::read_to_string(&file_path).unwrap(), "echo bye\n");
    }
}
