/*!
 * UVFS Error Types
 * Structured, type-safe error handling for filesystem operations
 */

use miette::Diagnostic;
use nix::errno::Errno;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// UVFS operation result
///
/// # Must Use
/// Filesystem operations can fail and must be handled to prevent data loss
#[must_use = "UVFS operations can fail and must be handled"]
pub type UvfsResult<T> = Result<T, UvfsError>;

/// UVFS errors with structured, type-safe error handling
///
/// All error variants include context strings that should be non-empty.
/// Every variant maps onto a POSIX errno at the adapter boundary.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(rename_all = "snake_case", tag = "error", content = "details")]
pub enum UvfsError {
    #[error("Not found: {0}")]
    #[diagnostic(code(uvfs::not_found))]
    NotFound(#[serde(deserialize_with = "deserialize_nonempty_string")] String),

    #[error("Permission denied: {0}")]
    #[diagnostic(code(uvfs::permission_denied))]
    PermissionDenied(#[serde(deserialize_with = "deserialize_nonempty_string")] String),

    #[error("Invalid argument: {0}")]
    #[diagnostic(code(uvfs::invalid_argument))]
    InvalidArgument(#[serde(deserialize_with = "deserialize_nonempty_string")] String),

    #[error("Already exists: {0}")]
    #[diagnostic(code(uvfs::already_exists))]
    AlreadyExists(#[serde(deserialize_with = "deserialize_nonempty_string")] String),

    #[error("Bad file descriptor: {0}")]
    #[diagnostic(code(uvfs::bad_descriptor))]
    BadDescriptor(u64),

    #[error("Not supported: {0}")]
    #[diagnostic(code(uvfs::not_supported))]
    NotSupported(#[serde(deserialize_with = "deserialize_nonempty_string")] String),

    #[error("Upload failed: {0}")]
    #[diagnostic(
        code(uvfs::upload_failure),
        help("The local copy is kept; the next write and release of the file retries the commit.")
    )]
    UploadFailure(#[serde(deserialize_with = "deserialize_nonempty_string")] String),

    #[error("Stale cache entry: {0}")]
    #[diagnostic(code(uvfs::stale_cache))]
    StaleCache(#[serde(deserialize_with = "deserialize_nonempty_string")] String),

    #[error("Repository request failed: {0}")]
    #[diagnostic(
        code(uvfs::remote),
        help("Check that the repository is running and reachable from this host.")
    )]
    Remote(#[serde(deserialize_with = "deserialize_nonempty_string")] String),

    #[error("Malformed repository response: {0}")]
    #[diagnostic(code(uvfs::parse))]
    Parse(#[serde(deserialize_with = "deserialize_nonempty_string")] String),

    #[error("I/O error: {0}")]
    #[diagnostic(code(uvfs::io))]
    Io(#[serde(deserialize_with = "deserialize_nonempty_string")] String),
}

impl UvfsError {
    /// Map onto the errno reported to filesystem callers
    ///
    /// Transport and parse failures surface as ENOENT: the caller sees a
    /// missing entry rather than a crashed mount.
    #[must_use]
    pub const fn errno(&self) -> Errno {
        match self {
            UvfsError::NotFound(_)
            | UvfsError::StaleCache(_)
            | UvfsError::Remote(_)
            | UvfsError::Parse(_) => Errno::ENOENT,
            UvfsError::PermissionDenied(_) | UvfsError::UploadFailure(_) | UvfsError::Io(_) => {
                Errno::EACCES
            }
            UvfsError::InvalidArgument(_) => Errno::EINVAL,
            UvfsError::AlreadyExists(_) => Errno::EEXIST,
            UvfsError::BadDescriptor(_) => Errno::EBADF,
            UvfsError::NotSupported(_) => Errno::ENOTSUP,
        }
    }

    /// Whether the error originated on the repository side
    #[inline]
    #[must_use]
    pub const fn is_remote(&self) -> bool {
        matches!(
            self,
            UvfsError::Remote(_) | UvfsError::Parse(_) | UvfsError::UploadFailure(_)
        )
    }

    pub(crate) fn not_found(path: impl std::fmt::Display) -> Self {
        UvfsError::NotFound(path.to_string())
    }

    pub(crate) fn denied(what: impl std::fmt::Display) -> Self {
        UvfsError::PermissionDenied(what.to_string())
    }
}

impl From<std::io::Error> for UvfsError {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match e.kind() {
            ErrorKind::NotFound => UvfsError::NotFound(e.to_string()),
            ErrorKind::PermissionDenied => UvfsError::PermissionDenied(e.to_string()),
            ErrorKind::AlreadyExists => UvfsError::AlreadyExists(e.to_string()),
            ErrorKind::InvalidInput => UvfsError::InvalidArgument(e.to_string()),
            _ => UvfsError::Io(e.to_string()),
        }
    }
}

impl From<reqwest::Error> for UvfsError {
    fn from(e: reqwest::Error) -> Self {
        UvfsError::Remote(e.to_string())
    }
}

impl From<zip::result::ZipError> for UvfsError {
    fn from(e: zip::result::ZipError) -> Self {
        UvfsError::Parse(format!("bad archive: {}", e))
    }
}

impl From<UvfsError> for std::io::Error {
    fn from(e: UvfsError) -> Self {
        std::io::Error::from_raw_os_error(e.errno() as i32)
    }
}

/// Deserialize and validate non-empty string for error messages
pub(super) fn deserialize_nonempty_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    if s.is_empty() {
        return Err(serde::de::Error::custom("error message must not be empty"));
    }
    Ok(s)
}
