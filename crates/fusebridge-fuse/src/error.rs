//! Errors produced by adapter operations and their errno mapping.

/// Result type for adapter operations.
pub type FsResult<T> = Result<T, FsOpError>;

/// Errors that can occur in filesystem operations.
#[derive(Debug, thiserror::Error)]
pub enum FsOpError {
    /// File or directory not found.
    #[error("not found")]
    NotFound,
    /// Permission denied.
    #[error("permission denied")]
    PermissionDenied,
    /// Path is a directory (when file expected).
    #[error("is a directory")]
    IsDir,
    /// Path is not a directory (when directory expected).
    #[error("not a directory")]
    NotDir,
    /// Path already exists.
    #[error("already exists")]
    Exists,
    /// Directory not empty.
    #[error("directory not empty")]
    NotEmpty,
    /// A path component exceeds the maximum file name length.
    #[error("file name too long")]
    NameTooLong,
    /// Invalid argument (bad encoding, `..` component, negative offset).
    #[error("invalid argument")]
    InvalidArg,
    /// No open file or directory with this handle.
    #[error("bad file handle {0}")]
    BadHandle(u64),
    /// Not a symlink.
    #[error("not a symlink")]
    NotSymlink,
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(std::io::Error),
}

#[cfg(unix)]
impl FsOpError {
    /// Convert to a libc errno.
    pub fn to_errno(&self) -> i32 {
        match self {
            FsOpError::NotFound => libc::ENOENT,
            FsOpError::PermissionDenied => libc::EACCES,
            FsOpError::IsDir => libc::EISDIR,
            FsOpError::NotDir => libc::ENOTDIR,
            FsOpError::Exists => libc::EEXIST,
            FsOpError::NotEmpty => libc::ENOTEMPTY,
            FsOpError::NameTooLong => libc::ENAMETOOLONG,
            FsOpError::InvalidArg => libc::EINVAL,
            FsOpError::BadHandle(_) => libc::EBADF,
            FsOpError::NotSymlink => libc::EINVAL,
            FsOpError::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
        }
    }
}

impl From<std::io::Error> for FsOpError {
    fn from(e: std::io::Error) -> Self {
        #[cfg(unix)]
        {
            match e.raw_os_error() {
                Some(libc::ENOTDIR) => return FsOpError::NotDir,
                Some(libc::EISDIR) => return FsOpError::IsDir,
                Some(libc::ENOTEMPTY) => return FsOpError::NotEmpty,
                Some(libc::ENAMETOOLONG) => return FsOpError::NameTooLong,
                _ => {}
            }
        }
        match e.kind() {
            std::io::ErrorKind::NotFound => FsOpError::NotFound,
            std::io::ErrorKind::PermissionDenied => FsOpError::PermissionDenied,
            std::io::ErrorKind::AlreadyExists => FsOpError::Exists,
            _ => FsOpError::Io(e),
        }
    }
}
