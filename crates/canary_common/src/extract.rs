//! State Extractor
//!
//! Reads the state artifact the installed software writes after it
//! registers, and decodes its first line into an [`InstallationState`].

use crate::error::DecodeError;
use crate::literal::parse_literal;
use crate::state::{InstallationState, TopLevelRejection};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Raw content kept in a decode diagnostic is capped at this many bytes
pub const MAX_REPORTED_CONTENT: usize = 4096;

/// Source of the decoded installation state
pub trait StateExtractor {
    fn read(&self) -> Result<InstallationState, DecodeError>;
}

/// Reads the state artifact from a file on disk
#[derive(Debug, Clone)]
pub struct FileStateExtractor {
    path: PathBuf,
}

impl FileStateExtractor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateExtractor for FileStateExtractor {
    fn read(&self) -> Result<InstallationState, DecodeError> {
        let content = fs::read_to_string(&self.path).map_err(|source| DecodeError::Unreadable {
            path: self.path.clone(),
            source,
        })?;

        let first_line = content.lines().next().unwrap_or("");
        if first_line.trim().is_empty() {
            return Err(DecodeError::Empty {
                path: self.path.clone(),
            });
        }

        debug!(
            "Read {} bytes from {}, decoding first line",
            content.len(),
            self.path.display()
        );
        decode_state(first_line)
    }
}

/// Decode one state record. Nothing outside the returned value is touched.
pub fn decode_state(record: &str) -> Result<InstallationState, DecodeError> {
    let literal = parse_literal(record).map_err(|e| DecodeError::Syntax {
        column: record[..e.offset.min(record.len())].chars().count() + 1,
        message: e.message,
        content: truncate_content(record),
    })?;

    InstallationState::from_literal(literal).map_err(|rejection| match rejection {
        TopLevelRejection::NotAMapping(found) => DecodeError::NotAMapping {
            found,
            content: truncate_content(record),
        },
        TopLevelRejection::NonStringKey(found) => DecodeError::NonStringKey {
            found,
            content: truncate_content(record),
        },
        TopLevelRejection::DuplicateUnit(name) => DecodeError::DuplicateUnit {
            name,
            content: truncate_content(record),
        },
    })
}

fn truncate_content(record: &str) -> String {
    if record.len() <= MAX_REPORTED_CONTENT {
        return record.to_string();
    }
    let mut end = MAX_REPORTED_CONTENT;
    while !record.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [{} bytes truncated]", &record[..end], record.len() - end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn artifact(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_reads_first_line_only() {
        let file = artifact("{'v1': {'userkeys': [{'e': 42}]}}\nthis line is ignored (\n");
        let state = FileStateExtractor::new(file.path()).read().unwrap();
        assert_eq!(state.len(), 1);
        assert!(state.unit("v1").is_some());
    }

    #[test]
    fn test_missing_file_is_unreadable() {
        let dir = TempDir::new().unwrap();
        let err = FileStateExtractor::new(dir.path().join("vesseldict"))
            .read()
            .unwrap_err();
        assert!(matches!(err, DecodeError::Unreadable { .. }));
    }

    #[test]
    fn test_empty_file_is_empty() {
        let file = artifact("");
        let err = FileStateExtractor::new(file.path()).read().unwrap_err();
        assert!(matches!(err, DecodeError::Empty { .. }));

        let blank = artifact("   \n{'v1': {}}\n");
        let err = FileStateExtractor::new(blank.path()).read().unwrap_err();
        assert!(matches!(err, DecodeError::Empty { .. }));
    }

    #[test]
    fn test_syntax_error_carries_column_and_content() {
        let err = decode_state("{'v1': {'userkeys': [}").unwrap_err();
        match &err {
            DecodeError::Syntax { column, content, .. } => {
                assert_eq!(*column, 22);
                assert_eq!(content, "{'v1': {'userkeys': [}");
            }
            other => panic!("expected syntax error, got {:?}", other),
        }
        assert!(err.raw_content().is_some());
    }

    #[test]
    fn test_rejects_non_mapping_record() {
        let err = decode_state("['v1']").unwrap_err();
        assert!(matches!(err, DecodeError::NotAMapping { found: "list", .. }));
    }

    #[test]
    fn test_rejects_expression_instead_of_evaluating() {
        let err = decode_state("open('/etc/passwd').read()").unwrap_err();
        assert!(matches!(err, DecodeError::Syntax { .. }));
    }

    #[test]
    fn test_long_content_is_truncated() {
        let long = format!("{{'v1': '{}'", "x".repeat(MAX_REPORTED_CONTENT * 2));
        let err = decode_state(&long).unwrap_err();
        let content = err.raw_content().unwrap();
        assert!(content.len() < long.len());
        assert!(content.ends_with("bytes truncated]"));
    }
}
