//! The environment abstraction the utility layer is built on.
//!
//! An [`Env`] hands out capability-typed file handles and exposes the handful
//! of metadata/directory primitives the helpers in [`crate::env_util`] need.
//! Two implementations ship with the crate: [`posix::PosixEnv`] talks to the
//! operating system and [`mem::MemEnv`] keeps everything in memory for tests.
//!
//! Primitives return plain `std::io::Result`. They are allowed to be weak:
//! `RandomAccessFile::read_at` may return fewer bytes than asked for and
//! `Env::create_dir` fails with `AlreadyExists` instead of succeeding. The
//! utility layer turns those into the stronger contracts.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub mod mem;
pub mod posix;

/// How `Env::new_writable_file` treats an existing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreateMode {
    /// Create the file, truncating it if it already exists.
    #[default]
    CreateOrTruncate,
    /// Create the file; fail with `AlreadyExists` if it is already there.
    CreateNew,
    /// Open an existing file and append to it; fail if it is missing.
    OpenExisting,
}

/// Options passed through to `Env::new_writable_file`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WritableFileOptions {
    /// Call `sync` from `close`.
    pub sync_on_close: bool,
    pub mode: CreateMode,
}

/// Capacity and free space of the file system containing a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpaceInfo {
    pub capacity_bytes: u64,
    /// Bytes available to an unprivileged writer.
    pub free_bytes: u64,
}

/// A file opened for writing.
///
/// Methods take `&self` so a handle can sit behind an `Arc` and be shared;
/// implementations serialise access internally. The file is closed when the
/// last owner drops it if `close` was not called explicitly.
pub trait WritableFile: Send + Sync + fmt::Debug {
    fn append(&self, data: &[u8]) -> io::Result<()>;
    fn flush(&self) -> io::Result<()>;
    fn sync(&self) -> io::Result<()>;
    /// Flush (and sync when the file was opened with `sync_on_close`).
    /// Appending after `close` fails.
    fn close(&self) -> io::Result<()>;
    /// Bytes written so far, including any pre-existing content when
    /// appending.
    fn size(&self) -> u64;
    fn filename(&self) -> &Path;
}

/// A file opened for positional reads.
pub trait RandomAccessFile: Send + Sync + fmt::Debug {
    /// Read up to `scratch.len()` bytes at `offset` into `scratch`.
    ///
    /// Returns the number of bytes copied. Fewer than requested is legal;
    /// `0` means `offset` is at or past end-of-file.
    fn read_at(&self, offset: u64, scratch: &mut [u8]) -> io::Result<usize>;

    /// The whole file as a directly addressable region, if the
    /// implementation has one (e.g. a mapping). Readers may serve requests
    /// from it without copying.
    fn mapped(&self) -> Option<&[u8]> {
        None
    }

    fn size(&self) -> io::Result<u64>;
    fn filename(&self) -> &Path;
}

/// A file opened for front-to-back reads.
pub trait SequentialFile: Send + Sync + fmt::Debug {
    /// Read the next chunk into `scratch`, returning how many bytes were
    /// read. `Ok(0)` is end-of-stream.
    fn read(&self, scratch: &mut [u8]) -> io::Result<usize>;
    fn filename(&self) -> &Path;
}

/// Operating-system style file primitives.
pub trait Env: Send + Sync + fmt::Debug {
    fn new_writable_file(
        &self,
        opts: &WritableFileOptions,
        path: &Path,
    ) -> io::Result<Box<dyn WritableFile>>;
    fn new_random_access_file(&self, path: &Path) -> io::Result<Box<dyn RandomAccessFile>>;
    fn new_sequential_file(&self, path: &Path) -> io::Result<Box<dyn SequentialFile>>;

    fn file_exists(&self, path: &Path) -> bool;
    fn is_directory(&self, path: &Path) -> io::Result<bool>;
    fn file_size(&self, path: &Path) -> io::Result<u64>;
    fn modified_time(&self, path: &Path) -> io::Result<SystemTime>;
    fn space_info(&self, path: &Path) -> io::Result<SpaceInfo>;

    /// Create a single directory. Fails with `io::ErrorKind::AlreadyExists`
    /// if anything already exists at `path`.
    fn create_dir(&self, path: &Path) -> io::Result<()>;
    /// Names (not full paths) of the entries directly under `path`.
    fn children(&self, path: &Path) -> io::Result<Vec<String>>;
    /// Paths matching a shell-style glob pattern.
    fn glob(&self, pattern: &str) -> io::Result<Vec<PathBuf>>;

    fn delete_file(&self, path: &Path) -> io::Result<()>;
    /// Remove an empty directory.
    fn delete_dir(&self, path: &Path) -> io::Result<()>;
    /// Make a directory's entries durable.
    fn sync_dir(&self, path: &Path) -> io::Result<()>;
}
