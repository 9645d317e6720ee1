//! `Env` backed by the host operating system.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::SystemTime;

use filetime::{set_file_mtime, FileTime};
use nix::sys::statvfs::statvfs;
use tracing::warn;

use super::{
    CreateMode, Env, RandomAccessFile, SequentialFile, SpaceInfo, WritableFile,
    WritableFileOptions,
};

/// The real file system.
#[derive(Debug, Default, Clone, Copy)]
pub struct PosixEnv;

impl PosixEnv {
    pub fn new() -> Self {
        PosixEnv
    }

    /// Pin the modification time of `path`. Handy for retention tests.
    pub fn set_modified_time(&self, path: &Path, mtime: SystemTime) -> io::Result<()> {
        set_file_mtime(path, FileTime::from_system_time(mtime))
    }
}

fn closed_error(path: &Path) -> io::Error {
    io::Error::other(format!("file already closed: {}", path.display()))
}

// Treat a poisoned lock as a plain I/O failure rather than panicking in a
// caller that may be unwinding already.
fn poisoned<T>(_: std::sync::PoisonError<T>) -> io::Error {
    io::Error::other("file handle lock poisoned")
}

#[derive(Debug)]
struct PosixWritableFile {
    path: PathBuf,
    file: Mutex<Option<File>>,
    size: AtomicU64,
    sync_on_close: bool,
}

impl WritableFile for PosixWritableFile {
    fn append(&self, data: &[u8]) -> io::Result<()> {
        let mut guard = self.file.lock().map_err(poisoned)?;
        let file = guard.as_mut().ok_or_else(|| closed_error(&self.path))?;
        file.write_all(data)?;
        self.size.fetch_add(data.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    fn flush(&self) -> io::Result<()> {
        let mut guard = self.file.lock().map_err(poisoned)?;
        match guard.as_mut() {
            Some(file) => file.flush(),
            None => Err(closed_error(&self.path)),
        }
    }

    fn sync(&self) -> io::Result<()> {
        let guard = self.file.lock().map_err(poisoned)?;
        match guard.as_ref() {
            Some(file) => file.sync_data(),
            None => Err(closed_error(&self.path)),
        }
    }

    fn close(&self) -> io::Result<()> {
        let mut guard = self.file.lock().map_err(poisoned)?;
        if let Some(mut file) = guard.take() {
            file.flush()?;
            if self.sync_on_close {
                file.sync_all()?;
            }
        }
        Ok(())
    }

    fn size(&self) -> u64 {
        self.size.load(Ordering::Relaxed)
    }

    fn filename(&self) -> &Path {
        &self.path
    }
}

// The last owner closes the file, honouring `sync_on_close` even when
// nobody called `close`.
impl Drop for PosixWritableFile {
    fn drop(&mut self) {
        if let Err(e) = WritableFile::close(self) {
            warn!(path = %self.path.display(), error = %e, "failed to close file on drop");
        }
    }
}

#[derive(Debug)]
struct PosixRandomAccessFile {
    path: PathBuf,
    file: File,
}

impl RandomAccessFile for PosixRandomAccessFile {
    fn read_at(&self, offset: u64, scratch: &mut [u8]) -> io::Result<usize> {
        // pread rejects offsets that do not fit in off_t; no file reaches them.
        if offset > i64::MAX as u64 {
            return Ok(0);
        }
        loop {
            match self.file.read_at(scratch, offset) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => return other,
            }
        }
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn filename(&self) -> &Path {
        &self.path
    }
}

#[derive(Debug)]
struct PosixSequentialFile {
    path: PathBuf,
    file: Mutex<File>,
}

impl SequentialFile for PosixSequentialFile {
    fn read(&self, scratch: &mut [u8]) -> io::Result<usize> {
        let mut file = self.file.lock().map_err(poisoned)?;
        loop {
            match file.read(scratch) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => return other,
            }
        }
    }

    fn filename(&self) -> &Path {
        &self.path
    }
}

impl Env for PosixEnv {
    fn new_writable_file(
        &self,
        opts: &WritableFileOptions,
        path: &Path,
    ) -> io::Result<Box<dyn WritableFile>> {
        let mut oo = OpenOptions::new();
        match opts.mode {
            CreateMode::CreateOrTruncate => oo.write(true).create(true).truncate(true),
            CreateMode::CreateNew => oo.write(true).create_new(true),
            CreateMode::OpenExisting => oo.append(true),
        };
        let file = oo.open(path)?;
        let size = match opts.mode {
            CreateMode::OpenExisting => file.metadata()?.len(),
            _ => 0,
        };
        Ok(Box::new(PosixWritableFile {
            path: path.to_path_buf(),
            file: Mutex::new(Some(file)),
            size: AtomicU64::new(size),
            sync_on_close: opts.sync_on_close,
        }))
    }

    fn new_random_access_file(&self, path: &Path) -> io::Result<Box<dyn RandomAccessFile>> {
        let file = File::open(path)?;
        Ok(Box::new(PosixRandomAccessFile {
            path: path.to_path_buf(),
            file,
        }))
    }

    fn new_sequential_file(&self, path: &Path) -> io::Result<Box<dyn SequentialFile>> {
        let file = File::open(path)?;
        Ok(Box::new(PosixSequentialFile {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        }))
    }

    fn file_exists(&self, path: &Path) -> bool {
        fs::symlink_metadata(path).is_ok()
    }

    fn is_directory(&self, path: &Path) -> io::Result<bool> {
        Ok(fs::metadata(path)?.is_dir())
    }

    fn file_size(&self, path: &Path) -> io::Result<u64> {
        Ok(fs::metadata(path)?.len())
    }

    fn modified_time(&self, path: &Path) -> io::Result<SystemTime> {
        fs::metadata(path)?.modified()
    }

    fn space_info(&self, path: &Path) -> io::Result<SpaceInfo> {
        let st = statvfs(path)?;
        let frsize = st.fragment_size() as u64;
        Ok(SpaceInfo {
            capacity_bytes: st.blocks() as u64 * frsize,
            free_bytes: st.blocks_available() as u64 * frsize,
        })
    }

    fn create_dir(&self, path: &Path) -> io::Result<()> {
        fs::create_dir(path)
    }

    fn children(&self, path: &Path) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(path)? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }

    fn glob(&self, pattern: &str) -> io::Result<Vec<PathBuf>> {
        let paths = glob::glob(pattern)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let mut out = Vec::new();
        for entry in paths {
            out.push(entry.map_err(|e| e.into_error())?);
        }
        Ok(out)
    }

    fn delete_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn delete_dir(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir(path)
    }

    fn sync_dir(&self, path: &Path) -> io::Result<()> {
        File::open(path)?.sync_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writable_modes() {
        let td = tempdir().unwrap();
        let p = td.path().join("f");
        let env = PosixEnv::new();

        let w = env.new_writable_file(&WritableFileOptions::default(), &p).unwrap();
        w.append(b"abc").unwrap();
        w.close().unwrap();
        assert!(w.append(b"x").is_err(), "append after close must fail");

        let opts = WritableFileOptions {
            mode: CreateMode::CreateNew,
            ..Default::default()
        };
        let err = env.new_writable_file(&opts, &p).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);

        let opts = WritableFileOptions {
            mode: CreateMode::OpenExisting,
            sync_on_close: true,
        };
        let w = env.new_writable_file(&opts, &p).unwrap();
        assert_eq!(w.size(), 3);
        w.append(b"def").unwrap();
        w.close().unwrap();
        assert_eq!(fs::read(&p).unwrap(), b"abcdef");
    }

    #[test]
    fn offset_beyond_off_t_reads_as_eof() {
        let td = tempdir().unwrap();
        let p = td.path().join("f");
        fs::write(&p, b"abc").unwrap();
        let f = PosixEnv::new().new_random_access_file(&p).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(f.read_at(1u64 << 63, &mut buf).unwrap(), 0);
        assert_eq!(f.read_at(u64::MAX, &mut buf).unwrap(), 0);
        assert_eq!(f.read_at(1, &mut buf).unwrap(), 2);
    }

    #[test]
    fn last_shared_owner_closes_on_drop() {
        let td = tempdir().unwrap();
        let p = td.path().join("f");
        let opts = WritableFileOptions {
            sync_on_close: true,
            ..Default::default()
        };
        let w: std::sync::Arc<dyn WritableFile> =
            std::sync::Arc::from(PosixEnv::new().new_writable_file(&opts, &p).unwrap());
        let other = std::sync::Arc::clone(&w);
        other.append(b"abc").unwrap();
        drop(other);
        // Still open for the remaining owner.
        w.append(b"def").unwrap();
        drop(w);
        assert_eq!(fs::read(&p).unwrap(), b"abcdef");
    }

    #[test]
    fn space_info_reports_nonzero_capacity() {
        let td = tempdir().unwrap();
        let info = PosixEnv::new().space_info(td.path()).unwrap();
        assert!(info.capacity_bytes > 0);
        assert!(info.free_bytes <= info.capacity_bytes);
    }

    #[test]
    fn glob_matches_files() {
        let td = tempdir().unwrap();
        for name in ["a.log", "b.log", "c.txt"] {
            fs::write(td.path().join(name), b"x").unwrap();
        }
        let pattern = format!("{}/*.log", td.path().display());
        let mut got = PosixEnv::new().glob(&pattern).unwrap();
        got.sort();
        assert_eq!(got, vec![td.path().join("a.log"), td.path().join("b.log")]);
    }

    #[test]
    fn create_dir_reports_already_exists() {
        let td = tempdir().unwrap();
        let err = PosixEnv::new().create_dir(td.path()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }
}
