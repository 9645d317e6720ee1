use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::env::Env;

/// Deletes a file or directory when dropped, unless cancelled.
///
/// Create one right after opening a temporary file; call [`cancel`] once
/// the file has been renamed into place or is otherwise meant to stay.
/// Every early return (including `?`) and unwind then removes the
/// leftover. A directory is only removed if it is empty by then. Failures
/// are logged and otherwise ignored.
///
/// [`cancel`]: ScopedFileDeleter::cancel
///
/// ```no_run
/// use storage_env::env::posix::PosixEnv;
/// use storage_env::env_util::{open_file_for_write, ScopedFileDeleter};
///
/// # fn main() -> storage_env::Result<()> {
/// let env = PosixEnv::new();
/// let mut guard = ScopedFileDeleter::new(&env, "/tmp/block.tmp");
/// let file = open_file_for_write(&env, "/tmp/block.tmp")?;
/// // ... write and rename; any `?` above removes the temp file.
/// # drop(file);
/// guard.cancel();
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
#[must_use = "the path is deleted as soon as the guard is dropped"]
pub struct ScopedFileDeleter<'a> {
    env: &'a dyn Env,
    path: PathBuf,
    should_delete: bool,
}

impl<'a> ScopedFileDeleter<'a> {
    pub fn new(env: &'a dyn Env, path: impl Into<PathBuf>) -> Self {
        Self {
            env,
            path: path.into(),
            should_delete: true,
        }
    }

    /// Keep the path when the guard goes out of scope. Calling it again has
    /// no further effect.
    pub fn cancel(&mut self) {
        self.should_delete = false;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_armed(&self) -> bool {
        self.should_delete
    }
}

impl Drop for ScopedFileDeleter<'_> {
    fn drop(&mut self) {
        if !self.should_delete {
            return;
        }
        self.should_delete = false;
        let result = match self.env.is_directory(&self.path) {
            Ok(true) => self.env.delete_dir(&self.path),
            Ok(false) => self.env.delete_file(&self.path),
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => debug!(path = %self.path.display(), "removed scoped path"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove scoped path"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::mem::MemEnv;

    #[test]
    fn deletes_file_on_drop() {
        let env = MemEnv::new();
        env.write_file(Path::new("/tmp.1"), b"x").unwrap();
        {
            let guard = ScopedFileDeleter::new(&env, "/tmp.1");
            assert!(guard.is_armed());
        }
        assert!(!env.file_exists(Path::new("/tmp.1")));
    }

    #[test]
    fn cancel_keeps_file() {
        let env = MemEnv::new();
        env.write_file(Path::new("/tmp.1"), b"x").unwrap();
        {
            let mut guard = ScopedFileDeleter::new(&env, "/tmp.1");
            guard.cancel();
            guard.cancel();
            assert!(!guard.is_armed());
        }
        assert_eq!(env.read_file(Path::new("/tmp.1")).unwrap(), b"x");
    }

    #[test]
    fn deletes_empty_directory() {
        let env = MemEnv::new();
        env.create_dir(Path::new("/scratch")).unwrap();
        drop(ScopedFileDeleter::new(&env, "/scratch"));
        assert!(!env.file_exists(Path::new("/scratch")));
    }

    #[test]
    fn leaves_non_empty_directory_alone() {
        let env = MemEnv::new();
        env.create_dir(Path::new("/data")).unwrap();
        env.create_dir(Path::new("/data/committed")).unwrap();
        env.write_file(Path::new("/data/committed/block"), b"x").unwrap();
        drop(ScopedFileDeleter::new(&env, "/data"));
        assert!(env.file_exists(Path::new("/data")));
        assert_eq!(env.read_file(Path::new("/data/committed/block")).unwrap(), b"x");
    }

    #[test]
    fn failures_are_swallowed() {
        let env = MemEnv::new();
        env.write_file(Path::new("/locked"), b"x").unwrap();
        env.fail_deletes_of("/locked");
        drop(ScopedFileDeleter::new(&env, "/locked"));
        drop(ScopedFileDeleter::new(&env, "/never-existed"));
        assert!(env.file_exists(Path::new("/locked")));
    }

    #[test]
    fn runs_on_error_path() {
        fn build(env: &MemEnv) -> crate::Result<()> {
            env.write_file(Path::new("/partial"), b"half").unwrap();
            let _guard = ScopedFileDeleter::new(env, "/partial");
            Err(crate::EnvUtilError::InvalidArgument("boom".into()))
        }
        let env = MemEnv::new();
        assert!(build(&env).is_err());
        assert!(!env.file_exists(Path::new("/partial")));
    }

    #[test]
    fn moved_guard_deletes_once() {
        let env = MemEnv::new();
        env.write_file(Path::new("/moved"), b"x").unwrap();
        let guard = ScopedFileDeleter::new(&env, "/moved");
        let holder = vec![guard];
        assert!(env.file_exists(Path::new("/moved")));
        drop(holder);
        assert!(!env.file_exists(Path::new("/moved")));
    }
}
