//! Open wrappers that hand back shared (`Arc`) handles.
//!
//! The environment returns boxed handles; converting them to `Arc` lets the
//! caller and any buffering layer hold the same handle. The underlying file
//! is closed when the last clone is dropped.

use std::path::Path;
use std::sync::Arc;

use crate::env::{Env, RandomAccessFile, SequentialFile, WritableFile, WritableFileOptions};
use crate::error::{EnvUtilError, Result};

/// Open `path` for writing with default options (create or truncate, no
/// sync on close).
pub fn open_file_for_write(env: &dyn Env, path: impl AsRef<Path>) -> Result<Arc<dyn WritableFile>> {
    open_file_for_write_with(&WritableFileOptions::default(), env, path)
}

/// Open `path` for writing. Creation and truncation follow `opts.mode`.
pub fn open_file_for_write_with(
    opts: &WritableFileOptions,
    env: &dyn Env,
    path: impl AsRef<Path>,
) -> Result<Arc<dyn WritableFile>> {
    let path = path.as_ref();
    let file = env
        .new_writable_file(opts, path)
        .map_err(|e| EnvUtilError::io("failed to open for write", path, e))?;
    Ok(Arc::from(file))
}

pub fn open_file_for_random(env: &dyn Env, path: impl AsRef<Path>) -> Result<Arc<dyn RandomAccessFile>> {
    let path = path.as_ref();
    let file = env
        .new_random_access_file(path)
        .map_err(|e| EnvUtilError::io("failed to open for random access", path, e))?;
    Ok(Arc::from(file))
}

pub fn open_file_for_sequential(env: &dyn Env, path: impl AsRef<Path>) -> Result<Arc<dyn SequentialFile>> {
    let path = path.as_ref();
    let file = env
        .new_sequential_file(path)
        .map_err(|e| EnvUtilError::io("failed to open for sequential read", path, e))?;
    Ok(Arc::from(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::mem::MemEnv;
    use crate::env::CreateMode;

    #[test]
    fn shared_write_handle_outlives_clone() {
        let env = MemEnv::new();
        let w = open_file_for_write(&env, "/log").unwrap();
        let other = Arc::clone(&w);
        other.append(b"abc").unwrap();
        drop(other);
        w.append(b"def").unwrap();
        w.close().unwrap();
        assert_eq!(env.read_file(Path::new("/log")).unwrap(), b"abcdef");
    }

    #[test]
    fn options_pass_through() {
        let env = MemEnv::new();
        env.write_file(Path::new("/f"), b"keep").unwrap();
        let opts = WritableFileOptions {
            mode: CreateMode::CreateNew,
            ..Default::default()
        };
        let err = open_file_for_write_with(&opts, &env, "/f").unwrap_err();
        assert!(err.is_io_error());
        assert_eq!(env.read_file(Path::new("/f")).unwrap(), b"keep");
    }

    #[test]
    fn missing_file_is_io_error() {
        let env = MemEnv::new();
        let err = open_file_for_random(&env, "/missing").unwrap_err();
        match err {
            EnvUtilError::Io { source, path, .. } => {
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
                assert_eq!(path, Path::new("/missing"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(open_file_for_sequential(&env, "/missing").is_err());
    }
}
