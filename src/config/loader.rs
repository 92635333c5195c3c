use crate::config::schema::{PatchSet, ValidationError};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Toml {
        path: Option<PathBuf>,
        source: toml_edit::de::Error,
    },
    Json {
        path: Option<PathBuf>,
        source: serde_json::Error,
    },
    Validation {
        path: Option<PathBuf>,
        source: ValidationError,
    },
}

impl ConfigError {
    /// The patch-set file this error came from, when known.
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigError::Io { path, .. } => Some(path),
            ConfigError::Toml { path, .. }
            | ConfigError::Json { path, .. }
            | ConfigError::Validation { path, .. } => path.as_deref(),
        }
    }

    fn with_path(mut self, file: &Path) -> Self {
        match &mut self {
            ConfigError::Io { .. } => {}
            ConfigError::Toml { path, .. }
            | ConfigError::Json { path, .. }
            | ConfigError::Validation { path, .. } => {
                path.get_or_insert_with(|| file.to_path_buf());
            }
        }
        self
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(path) = self.path() {
            write!(f, "{}: ", path.display())?;
        }
        match self {
            ConfigError::Io { source, .. } => write!(f, "cannot read patch set: {source}"),
            ConfigError::Toml { source, .. } => write!(f, "malformed TOML: {source}"),
            ConfigError::Json { source, .. } => write!(f, "malformed JSON: {source}"),
            ConfigError::Validation { source, .. } => write!(f, "patch set rejected: {source}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Toml { source, .. } => Some(source),
            ConfigError::Json { source, .. } => Some(source),
            ConfigError::Validation { source, .. } => Some(source),
        }
    }
}

/// Parse and validate a TOML patch set.
pub fn load_from_str(input: &str) -> Result<PatchSet, ConfigError> {
    let set: PatchSet = toml_edit::de::from_str(input)
        .map_err(|source| ConfigError::Toml { path: None, source })?;
    validated(set)
}

/// Parse and validate a JSON patch set.
pub fn load_from_json_str(input: &str) -> Result<PatchSet, ConfigError> {
    let set: PatchSet = serde_json::from_str(input)
        .map_err(|source| ConfigError::Json { path: None, source })?;
    validated(set)
}

/// Load a patch set from disk; `.json` files are read as JSON, anything else
/// as TOML.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<PatchSet, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let result = if is_json {
        load_from_json_str(&contents)
    } else {
        load_from_str(&contents)
    };
    result.map_err(|error| error.with_path(path))
}

fn validated(set: PatchSet) -> Result<PatchSet, ConfigError> {
    set.validate()
        .map_err(|source| ConfigError::Validation { path: None, source })?;
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{Guard, HashAlgorithm};

    #[test]
    fn test_load_toml_minimal() {
        let set = load_from_str(
            r#"
[meta]
name = "minimal"
target = "page.dart"

[[patches]]
id = "one"

[patches.operation]
type = "replace"
search = "a"
replacement = "b"
"#,
        )
        .unwrap();

        assert_eq!(set.meta.name, "minimal");
        assert_eq!(set.meta.target.as_deref(), Some("page.dart"));
        assert!(!set.meta.strict);
        assert_eq!(set.patches.len(), 1);
    }

    #[test]
    fn test_load_empty_is_validation_error() {
        let err = load_from_str("[meta]\nname = \"empty\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation { path: None, .. }));
        assert!(err.to_string().contains("no patches"));
    }

    #[test]
    fn test_load_unknown_operation_type() {
        let err = load_from_str(
            r#"
[[patches]]
id = "bad"
[patches.operation]
type = "regex"
pattern = "a+"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Toml { .. }));
    }

    #[test]
    fn test_load_json() {
        let set = load_from_json_str(
            r#"{
  "meta": { "target": "a.txt", "strict": true },
  "patches": [
    { "id": "ins", "operation": { "type": "line-range", "start": 0, "lines": ["x"] } }
  ]
}"#,
        )
        .unwrap();
        assert!(set.meta.strict);
        assert_eq!(set.patches[0].id, "ins");
    }

    #[test]
    fn test_load_from_path_attaches_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("broken.toml");
        fs::write(&path, "[[patches]\n").unwrap();

        let err = load_from_path(&path).unwrap_err();
        assert!(err.to_string().starts_with(&format!("{}: malformed TOML", path.display())));
        match err {
            ConfigError::Toml { path: Some(p), .. } => assert_eq!(p, path),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_hash_guard_algorithm() {
        let guarded = |algorithm: &str| {
            format!(
                r#"
[[patches]]
id = "pinned"
[patches.operation]
type = "line-range"
start = 0
count = 1
lines = ["x"]
[patches.guard]
method = "hash"
{algorithm}
expected = "0x2a"
"#
            )
        };

        let set = load_from_str(&guarded("")).unwrap();
        assert!(matches!(
            set.patches[0].guard,
            Some(Guard::Hash {
                algorithm: HashAlgorithm::Xxh3,
                ..
            })
        ));
        assert!(load_from_str(&guarded(r#"algorithm = "xxh3""#)).is_ok());

        let err = load_from_str(&guarded(r#"algorithm = "md5""#)).unwrap_err();
        assert!(matches!(err, ConfigError::Toml { .. }));
    }

    #[test]
    fn test_load_from_missing_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let err = load_from_path(temp_dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
