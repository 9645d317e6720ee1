use std::path::Path;

use tracing::debug;

use crate::env::{Env, WritableFileOptions};
use crate::error::{EnvUtilError, Result};

/// Chunk size used by [`copy_file`].
pub const DEFAULT_COPY_BUFFER_SIZE: usize = 1024 * 1024;

/// Copy the contents of `source` to `dest`, returning the bytes copied.
///
/// Not atomic: an error part way through leaves a partial `dest` behind
/// (pair with [`ScopedFileDeleter`](super::ScopedFileDeleter) to clean it
/// up). The parent directory of `dest` is not synced; see
/// [`sync_all_parent_dirs`](super::sync_all_parent_dirs).
pub fn copy_file(
    env: &dyn Env,
    source: impl AsRef<Path>,
    dest: impl AsRef<Path>,
    opts: &WritableFileOptions,
) -> Result<u64> {
    copy_file_with_buffer_size(env, source, dest, opts, DEFAULT_COPY_BUFFER_SIZE)
}

/// [`copy_file`] moving at most `buffer_size` bytes per read.
pub fn copy_file_with_buffer_size(
    env: &dyn Env,
    source: impl AsRef<Path>,
    dest: impl AsRef<Path>,
    opts: &WritableFileOptions,
    buffer_size: usize,
) -> Result<u64> {
    let (source, dest) = (source.as_ref(), dest.as_ref());
    if buffer_size == 0 {
        return Err(EnvUtilError::InvalidArgument(
            "copy buffer size must be > 0".to_string(),
        ));
    }

    let reader = env
        .new_sequential_file(source)
        .map_err(|e| EnvUtilError::io("failed to open copy source", source, e))?;
    let writer = env
        .new_writable_file(opts, dest)
        .map_err(|e| EnvUtilError::io("failed to open copy destination", dest, e))?;

    let mut scratch = vec![0u8; buffer_size];
    let mut copied = 0u64;
    loop {
        let n = reader
            .read(&mut scratch)
            .map_err(|e| EnvUtilError::io("failed to read", source, e))?;
        if n == 0 {
            break;
        }
        writer
            .append(&scratch[..n])
            .map_err(|e| EnvUtilError::io("failed to write", dest, e))?;
        copied += n as u64;
    }
    writer
        .close()
        .map_err(|e| EnvUtilError::io("failed to close", dest, e))?;

    debug!(source = %source.display(), dest = %dest.display(), bytes = copied, "copied file");
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::mem::MemEnv;
    use crate::env::CreateMode;

    #[test]
    fn copies_across_many_chunks() {
        let env = MemEnv::new();
        let data: Vec<u8> = (0..10_000u32).map(|i| (i * 7 % 251) as u8).collect();
        env.write_file(Path::new("/src"), &data).unwrap();
        env.set_max_read_chunk(Some(333));

        let n = copy_file_with_buffer_size(&env, "/src", "/dst", &WritableFileOptions::default(), 1000)
            .unwrap();
        assert_eq!(n, data.len() as u64);
        assert_eq!(env.read_file(Path::new("/dst")).unwrap(), data);
    }

    #[test]
    fn empty_source_gives_empty_dest() {
        let env = MemEnv::new();
        env.write_file(Path::new("/src"), b"").unwrap();
        env.write_file(Path::new("/dst"), b"stale").unwrap();
        assert_eq!(copy_file(&env, "/src", "/dst", &WritableFileOptions::default()).unwrap(), 0);
        assert!(env.read_file(Path::new("/dst")).unwrap().is_empty());
    }

    #[test]
    fn write_mode_is_honoured() {
        let env = MemEnv::new();
        env.write_file(Path::new("/src"), b"new").unwrap();
        env.write_file(Path::new("/dst"), b"old").unwrap();
        let opts = WritableFileOptions {
            mode: CreateMode::CreateNew,
            ..Default::default()
        };
        let err = copy_file(&env, "/src", "/dst", &opts).unwrap_err();
        assert!(err.is_io_error());
        assert_eq!(env.read_file(Path::new("/dst")).unwrap(), b"old");
    }

    #[test]
    fn missing_source_leaves_no_dest() {
        let env = MemEnv::new();
        let err = copy_file(&env, "/nope", "/dst", &WritableFileOptions::default()).unwrap_err();
        assert!(err.is_io_error());
        assert!(!env.file_exists(Path::new("/dst")));
    }

    #[test]
    fn read_failure_mid_copy_leaves_partial_dest() {
        let env = MemEnv::new();
        env.write_file(Path::new("/src"), &[7u8; 50]).unwrap();
        env.fail_reads_of("/src", 20);
        let err =
            copy_file_with_buffer_size(&env, "/src", "/dst", &WritableFileOptions::default(), 10)
                .unwrap_err();
        match &err {
            EnvUtilError::Io { context, path, source } => {
                assert_eq!(*context, "failed to read");
                assert_eq!(path, Path::new("/src"));
                assert_eq!(source.raw_os_error(), Some(libc::EIO));
            }
            other => panic!("expected Io, got {other:?}"),
        }
        assert_eq!(env.read_file(Path::new("/dst")).unwrap(), vec![7u8; 20]);
    }

    #[test]
    fn write_failure_mid_copy_leaves_partial_dest() {
        let env = MemEnv::new();
        env.write_file(Path::new("/src"), &[3u8; 50]).unwrap();
        env.fail_writes_after(25);
        let err =
            copy_file_with_buffer_size(&env, "/src", "/dst", &WritableFileOptions::default(), 10)
                .unwrap_err();
        match &err {
            EnvUtilError::Io { context, path, .. } => {
                assert_eq!(*context, "failed to write");
                assert_eq!(path, Path::new("/dst"));
            }
            other => panic!("expected Io, got {other:?}"),
        }
        assert_eq!(env.read_file(Path::new("/dst")).unwrap(), vec![3u8; 25]);
    }

    #[test]
    fn zero_buffer_is_rejected() {
        let env = MemEnv::new();
        env.write_file(Path::new("/src"), b"x").unwrap();
        let err =
            copy_file_with_buffer_size(&env, "/src", "/dst", &WritableFileOptions::default(), 0)
                .unwrap_err();
        assert!(err.is_invalid_argument());
    }
}
