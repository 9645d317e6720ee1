use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the file utility layer.
///
/// Environment primitives report plain `std::io::Error`s; the helpers in
/// `env_util` wrap them with the path and the step that failed so callers can
/// tell a failed `open` from a failed `delete` without string matching.
#[derive(Error, Debug)]
pub enum EnvUtilError {
    /// The caller passed a value outside the operation's contract.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An environment call failed.
    #[error("{context} `{}`: {source}", path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Disk-space admission control rejected the request.
    #[error(
        "insufficient disk space to allocate {requested} bytes under path `{}` \
         ({available} bytes available vs {reserved} bytes reserved)",
        path.display()
    )]
    NoSpace {
        path: PathBuf,
        requested: i64,
        available: i64,
        reserved: i64,
    },

    /// `read_fully` hit end-of-file before the requested length.
    #[error(
        "short read from `{}`: wanted {requested} bytes at offset {offset}, got {read}",
        path.display()
    )]
    ShortRead {
        path: PathBuf,
        offset: u64,
        requested: usize,
        read: usize,
    },

    /// Something other than a directory already occupies the path.
    #[error("path exists but is not a directory: `{}`", .0.display())]
    NotADirectory(PathBuf),
}

pub type Result<T> = std::result::Result<T, EnvUtilError>;

impl EnvUtilError {
    pub(crate) fn io(context: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        EnvUtilError::Io {
            context,
            path: path.into(),
            source,
        }
    }

    /// POSIX error number equivalent of this error, if one applies.
    pub fn errno(&self) -> Option<i32> {
        match self {
            EnvUtilError::NoSpace { .. } => Some(libc::ENOSPC),
            EnvUtilError::ShortRead { .. } => Some(libc::EIO),
            EnvUtilError::NotADirectory(_) => Some(libc::ENOTDIR),
            EnvUtilError::Io { source, .. } => source.raw_os_error(),
            EnvUtilError::InvalidArgument(_) => Some(libc::EINVAL),
        }
    }

    /// True for every failure that originated in (or stands in for) I/O,
    /// including the out-of-space and short-read specialisations.
    pub fn is_io_error(&self) -> bool {
        matches!(
            self,
            EnvUtilError::Io { .. } | EnvUtilError::NoSpace { .. } | EnvUtilError::ShortRead { .. }
        )
    }

    pub fn is_no_space(&self) -> bool {
        matches!(self, EnvUtilError::NoSpace { .. })
    }

    pub fn is_short_read(&self) -> bool {
        matches!(self, EnvUtilError::ShortRead { .. })
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, EnvUtilError::InvalidArgument(_))
    }
}
