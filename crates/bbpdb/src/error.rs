use std::{io, path::PathBuf, result};

use thiserror::Error;

use crate::{Bat, Version};

pub type Result<T, E = Error> = result::Result<T, E>;

/// Error types for bbpdb operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    IO(#[from] io::Error),

    // Catalog errors
    #[error("Invalid BBP.dir (line {line}): {reason}")]
    Format { line: usize, reason: String },

    #[error("Catalog version {found} is newer than the newest supported version {supported}")]
    Version { found: Version, supported: Version },

    #[error("{0}")]
    MustRecover(String),

    // Lookup and access errors
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("BAT {0} is not a valid column")]
    InvalidColumn(Bat),

    #[error("BAT id {id} is beyond the buffer pool limit of {limit}")]
    LimitExceeded { id: usize, limit: usize },

    #[error("Element width {width} does not match value size {size}")]
    WidthMismatch { width: u16, size: usize },

    #[error("Column type `{atom}` cannot be viewed as {requested}")]
    TypeMismatch {
        atom: String,
        requested: &'static str,
    },

    #[error("Heap data is not aligned for {requested}")]
    Misaligned { requested: &'static str },

    // Heap errors
    #[error("Heap file {} of BAT {bat} holds {actual} bytes, need {needed}", path.display())]
    HeapTooShort {
        bat: Bat,
        path: PathBuf,
        needed: usize,
        actual: usize,
    },

    #[error("Offset {offset} at position {position} of BAT {bat} is outside its variable heap")]
    OffsetOutOfBounds {
        bat: Bat,
        position: usize,
        offset: usize,
    },

    #[error("View chain of BAT {0} does not end in a materializable heap")]
    UnresolvedView(Bat),

    #[error("String at position {position} of BAT {bat} is not valid UTF-8")]
    InvalidString { bat: Bat, position: usize },
}

impl Error {
    #[inline]
    pub(crate) fn format(line: usize, reason: impl Into<String>) -> Self {
        Self::Format {
            line,
            reason: reason.into(),
        }
    }

    /// Returns `true` for syntactic or semantic catalog violations.
    pub fn is_format(&self) -> bool {
        matches!(self, Self::Format { .. })
    }

    /// Returns the reason text of a format error.
    pub fn format_reason(&self) -> Option<&str> {
        match self {
            Self::Format { reason, .. } => Some(reason),
            _ => None,
        }
    }
}
