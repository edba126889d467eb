use thiserror::Error;

use crate::Path;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("empty segment in path {0:?}")]
    EmptySegment(String),
    #[error("path segment {0:?} contains '/'")]
    InvalidSegment(String),
}

/// Contract violations raised by store reads and reducers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("no store entry at {0}")]
    PathNotFound(Path),
    #[error("store entry at {path} is {found}, expected {expected}")]
    TypeMismatch {
        path: Path,
        expected: &'static str,
        found: &'static str,
    },
    #[error("index {index} out of range for {path} (len {len})")]
    IndexOutOfRange { path: Path, index: usize, len: usize },
}
