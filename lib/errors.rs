//! Filesystem error taxonomy and the mapping from backend failures onto it.

use thiserror::Error;
use tracing::debug;

use crate::backend::BackendError;

/// Messages the store uses for a missing object.
const NOT_FOUND_MESSAGES: &[&str] = &["file does not exist"];

/// Messages the store uses for a malformed path, e.g. one containing `//`.
const INVALID_PATH_MESSAGES: &[&str] = &["path must contain at least one component"];

#[cfg(target_os = "linux")]
const EREMOTEIO: i32 = libc::EREMOTEIO;
#[cfg(not(target_os = "linux"))]
const EREMOTEIO: i32 = libc::EIO;

/// Every failure a filesystem handler can reply with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FsError {
    /// The object does not exist.
    #[error("no such file or directory")]
    NotFound,

    /// The store rejected the path as malformed.
    #[error("invalid path")]
    InvalidPath,

    /// The operation is refused for this path, e.g. reading the synthetic root.
    #[error("operation not permitted")]
    NotPermitted,

    /// The mount is read-only.
    #[error("read-only file system")]
    ReadOnly,

    /// The operation has no equivalent on the store.
    #[error("operation not supported")]
    Unsupported,

    /// Catch-all for a store that failed or could not be reached.
    #[error("remote I/O error: {0}")]
    RemoteIo(String),

    /// A byte range did not line up with the data or buffer it described.
    #[error("inconsistent byte range")]
    BadSegment,

    /// Tried to remove a directory that still has entries.
    #[error("directory not empty")]
    NotEmpty,

    /// A raw error number, passed through unchanged.
    #[error("errno {0}")]
    Errno(i32),
}

impl FsError {
    /// The POSIX error number to reply with.
    #[must_use]
    pub fn errno(&self) -> i32 {
        match self {
            Self::NotFound => libc::ENOENT,
            Self::InvalidPath | Self::NotPermitted => libc::EPERM,
            Self::ReadOnly => libc::EROFS,
            Self::Unsupported => libc::ENOTSUP,
            Self::RemoteIo(_) => EREMOTEIO,
            Self::BadSegment => libc::EIO,
            Self::NotEmpty => libc::ENOTEMPTY,
            Self::Errno(code) => *code,
        }
    }
}

impl From<BackendError> for FsError {
    fn from(err: BackendError) -> Self {
        let mapped = match &err {
            BackendError::Errno(code) => Self::Errno(*code),
            BackendError::Remote { message, .. } if NOT_FOUND_MESSAGES.contains(&message.as_str()) => {
                Self::NotFound
            }
            BackendError::Remote { message, .. }
                if INVALID_PATH_MESSAGES.contains(&message.as_str()) =>
            {
                Self::InvalidPath
            }
            BackendError::Remote { .. } | BackendError::Transport(_) => {
                Self::RemoteIo(err.to_string())
            }
        };
        debug!(error = %err, ?mapped, "classified backend error");
        mapped
    }
}

/// Maps a backend failure straight to the error number a handler replies with.
#[must_use]
pub fn to_error_code(err: BackendError) -> i32 {
    FsError::from(err).errno()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_codes_pass_through() {
        assert_eq!(to_error_code(BackendError::Errno(libc::EACCES)), libc::EACCES);
        assert_eq!(to_error_code(BackendError::Errno(12345)), 12345);
    }

    #[test]
    fn message_must_match_exactly() {
        let err = BackendError::remote("file does not exist!");
        assert!(matches!(FsError::from(err), FsError::RemoteIo(_)));
    }
}
