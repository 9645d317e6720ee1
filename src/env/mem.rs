//! In-memory `Env` for tests.
//!
//! `MemEnv` is a cheap handle around shared state, so clones see the same
//! files. Besides the ordinary primitives it has knobs to provoke the edge
//! cases the utility layer exists for: short reads, zero-copy mapped reads,
//! a fixed disk-space report, and reads, writes or deletions that fail.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::SystemTime;

use glob::{MatchOptions, Pattern};

use super::{
    CreateMode, Env, RandomAccessFile, SequentialFile, SpaceInfo, WritableFile,
    WritableFileOptions,
};

const DEFAULT_CAPACITY: u64 = 1 << 30;

#[derive(Debug)]
struct FileData {
    bytes: Vec<u8>,
    mtime: SystemTime,
}

type SharedData = Arc<RwLock<FileData>>;

#[derive(Debug, Clone)]
enum Node {
    File(SharedData),
    Dir { mtime: SystemTime },
}

#[derive(Debug, Default)]
struct MemState {
    nodes: BTreeMap<PathBuf, Node>,
    max_read_chunk: Option<usize>,
    mapped_reads: bool,
    space: Option<SpaceInfo>,
    failing_deletes: HashSet<PathBuf>,
    failing_reads: HashMap<PathBuf, u64>,
    write_limit: Option<u64>,
}

/// The in-memory environment.
#[derive(Debug, Clone, Default)]
pub struct MemEnv {
    inner: Arc<RwLock<MemState>>,
}

fn poisoned<T>(_: PoisonError<T>) -> io::Error {
    io::Error::other("in-memory env lock poisoned")
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no such file or directory: {}", path.display()),
    )
}

fn is_root(path: &Path) -> bool {
    path.as_os_str().is_empty() || path == Path::new("/")
}

impl MemState {
    fn is_dir(&self, path: &Path) -> bool {
        is_root(path) || matches!(self.nodes.get(path), Some(Node::Dir { .. }))
    }

    fn exists(&self, path: &Path) -> bool {
        is_root(path) || self.nodes.contains_key(path)
    }

    fn check_parent(&self, path: &Path) -> io::Result<()> {
        match path.parent() {
            None => Ok(()),
            Some(parent) if self.is_dir(parent) => Ok(()),
            Some(parent) if self.exists(parent) => Err(io::Error::from_raw_os_error(libc::ENOTDIR)),
            Some(parent) => Err(not_found(parent)),
        }
    }

    fn file(&self, path: &Path) -> io::Result<SharedData> {
        match self.nodes.get(path) {
            Some(Node::File(data)) => Ok(Arc::clone(data)),
            Some(Node::Dir { .. }) => Err(io::Error::from_raw_os_error(libc::EISDIR)),
            None if is_root(path) => Err(io::Error::from_raw_os_error(libc::EISDIR)),
            None => Err(not_found(path)),
        }
    }

    fn read_failure_offset(&self, path: &Path) -> Option<u64> {
        self.failing_reads.get(path).copied()
    }

    fn check_delete(&self, path: &Path) -> io::Result<()> {
        if self.failing_deletes.contains(path) {
            return Err(io::Error::from_raw_os_error(libc::EACCES));
        }
        Ok(())
    }

    fn has_children(&self, path: &Path) -> bool {
        self.nodes.keys().any(|p| p.parent() == Some(path))
    }

    fn used_bytes(&self) -> io::Result<u64> {
        let mut used = 0u64;
        for node in self.nodes.values() {
            if let Node::File(data) = node {
                used += data.read().map_err(poisoned)?.bytes.len() as u64;
            }
        }
        Ok(used)
    }
}

impl MemEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap every `read_at` to at most `chunk` bytes so callers see short
    /// reads. `None` removes the cap.
    pub fn set_max_read_chunk(&self, chunk: Option<usize>) {
        if let Ok(mut s) = self.inner.write() {
            s.max_read_chunk = chunk;
        }
    }

    /// Serve random-access reads from a snapshot exposed through
    /// `RandomAccessFile::mapped`, like an mmap of an immutable file.
    pub fn set_mapped_reads(&self, mapped: bool) {
        if let Ok(mut s) = self.inner.write() {
            s.mapped_reads = mapped;
        }
    }

    /// Report `info` from `space_info` instead of deriving it from the
    /// bytes stored.
    pub fn set_space_info(&self, info: SpaceInfo) {
        if let Ok(mut s) = self.inner.write() {
            s.space = Some(info);
        }
    }

    /// Make every deletion of `path` fail with `EACCES`.
    pub fn fail_deletes_of(&self, path: impl Into<PathBuf>) {
        if let Ok(mut s) = self.inner.write() {
            s.failing_deletes.insert(path.into());
        }
    }

    /// Make reads of `path` fail with `EIO` once they reach byte `from`.
    /// Reads before that offset stop short of it. Applies to handles opened
    /// afterwards.
    pub fn fail_reads_of(&self, path: impl Into<PathBuf>, from: u64) {
        if let Ok(mut s) = self.inner.write() {
            s.failing_reads.insert(path.into(), from);
        }
    }

    /// Let every writable file opened afterwards hold at most `bytes`
    /// bytes. An append crossing the limit writes what fits, then fails with
    /// `EIO`.
    pub fn fail_writes_after(&self, bytes: u64) {
        if let Ok(mut s) = self.inner.write() {
            s.write_limit = Some(bytes);
        }
    }

    pub fn set_modified_time(&self, path: &Path, mtime: SystemTime) -> io::Result<()> {
        let mut s = self.inner.write().map_err(poisoned)?;
        match s.nodes.get_mut(path) {
            Some(Node::File(data)) => data.write().map_err(poisoned)?.mtime = mtime,
            Some(Node::Dir { mtime: m }) => *m = mtime,
            None => return Err(not_found(path)),
        }
        Ok(())
    }

    /// Create (or replace) a file holding `contents`.
    pub fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let mut s = self.inner.write().map_err(poisoned)?;
        s.check_parent(path)?;
        if s.is_dir(path) {
            return Err(io::Error::from_raw_os_error(libc::EISDIR));
        }
        let data = FileData {
            bytes: contents.to_vec(),
            mtime: SystemTime::now(),
        };
        s.nodes.insert(path.to_path_buf(), Node::File(Arc::new(RwLock::new(data))));
        Ok(())
    }

    /// Full contents of the file at `path`.
    pub fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        let data = self.inner.read().map_err(poisoned)?.file(path)?;
        let bytes = data.read().map_err(poisoned)?.bytes.clone();
        Ok(bytes)
    }
}

#[derive(Debug)]
struct MemWritableFile {
    path: PathBuf,
    data: SharedData,
    closed: AtomicBool,
    write_limit: Option<u64>,
}

impl MemWritableFile {
    fn check_open(&self) -> io::Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(io::Error::other(format!(
                "file already closed: {}",
                self.path.display()
            )));
        }
        Ok(())
    }
}

impl WritableFile for MemWritableFile {
    fn append(&self, data: &[u8]) -> io::Result<()> {
        self.check_open()?;
        let mut d = self.data.write().map_err(poisoned)?;
        d.mtime = SystemTime::now();
        let room = match self.write_limit {
            Some(limit) => {
                usize::try_from(limit.saturating_sub(d.bytes.len() as u64)).unwrap_or(usize::MAX)
            }
            None => usize::MAX,
        };
        if data.len() > room {
            d.bytes.extend_from_slice(&data[..room]);
            return Err(io::Error::from_raw_os_error(libc::EIO));
        }
        d.bytes.extend_from_slice(data);
        Ok(())
    }

    fn flush(&self) -> io::Result<()> {
        self.check_open()
    }

    fn sync(&self) -> io::Result<()> {
        self.check_open()
    }

    fn close(&self) -> io::Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn size(&self) -> u64 {
        self.data
            .read()
            .map(|d| d.bytes.len() as u64)
            .unwrap_or_default()
    }

    fn filename(&self) -> &Path {
        &self.path
    }
}

#[derive(Debug)]
enum ReadSource {
    Live(SharedData),
    Mapped(Vec<u8>),
}

#[derive(Debug)]
struct MemRandomAccessFile {
    path: PathBuf,
    source: ReadSource,
    max_read_chunk: Option<usize>,
    fail_from: Option<u64>,
}

// Trim `scratch` so a read at `offset` stops before `fail_from`, or fail if
// it starts at or beyond it.
fn guard_read(offset: u64, scratch: &mut [u8], fail_from: Option<u64>) -> io::Result<&mut [u8]> {
    match fail_from {
        Some(from) if offset >= from => Err(io::Error::from_raw_os_error(libc::EIO)),
        Some(from) => {
            let room = usize::try_from(from - offset).unwrap_or(usize::MAX).min(scratch.len());
            Ok(&mut scratch[..room])
        }
        None => Ok(scratch),
    }
}

fn copy_at(bytes: &[u8], offset: u64, scratch: &mut [u8], cap: Option<usize>) -> usize {
    let start = match usize::try_from(offset) {
        Ok(start) if start < bytes.len() => start,
        _ => return 0,
    };
    let mut n = scratch.len().min(bytes.len() - start);
    if let Some(cap) = cap {
        n = n.min(cap.max(1));
    }
    scratch[..n].copy_from_slice(&bytes[start..start + n]);
    n
}

impl RandomAccessFile for MemRandomAccessFile {
    fn read_at(&self, offset: u64, scratch: &mut [u8]) -> io::Result<usize> {
        let scratch = guard_read(offset, scratch, self.fail_from)?;
        match &self.source {
            ReadSource::Live(data) => {
                let d = data.read().map_err(poisoned)?;
                Ok(copy_at(&d.bytes, offset, scratch, self.max_read_chunk))
            }
            ReadSource::Mapped(bytes) => Ok(copy_at(bytes, offset, scratch, self.max_read_chunk)),
        }
    }

    fn mapped(&self) -> Option<&[u8]> {
        if self.fail_from.is_some() {
            return None;
        }
        match &self.source {
            ReadSource::Mapped(bytes) => Some(bytes.as_slice()),
            ReadSource::Live(_) => None,
        }
    }

    fn size(&self) -> io::Result<u64> {
        match &self.source {
            ReadSource::Live(data) => Ok(data.read().map_err(poisoned)?.bytes.len() as u64),
            ReadSource::Mapped(bytes) => Ok(bytes.len() as u64),
        }
    }

    fn filename(&self) -> &Path {
        &self.path
    }
}

#[derive(Debug)]
struct MemSequentialFile {
    path: PathBuf,
    data: SharedData,
    pos: Mutex<u64>,
    max_read_chunk: Option<usize>,
    fail_from: Option<u64>,
}

impl SequentialFile for MemSequentialFile {
    fn read(&self, scratch: &mut [u8]) -> io::Result<usize> {
        let mut pos = self.pos.lock().map_err(poisoned)?;
        let scratch = guard_read(*pos, scratch, self.fail_from)?;
        let d = self.data.read().map_err(poisoned)?;
        let n = copy_at(&d.bytes, *pos, scratch, self.max_read_chunk);
        *pos += n as u64;
        Ok(n)
    }

    fn filename(&self) -> &Path {
        &self.path
    }
}

impl Env for MemEnv {
    fn new_writable_file(
        &self,
        opts: &WritableFileOptions,
        path: &Path,
    ) -> io::Result<Box<dyn WritableFile>> {
        let mut s = self.inner.write().map_err(poisoned)?;
        s.check_parent(path)?;
        let existing = match s.nodes.get(path) {
            Some(Node::File(data)) => Some(Arc::clone(data)),
            Some(Node::Dir { .. }) => return Err(io::Error::from_raw_os_error(libc::EISDIR)),
            None => None,
        };
        let data = match (opts.mode, existing) {
            (CreateMode::CreateNew, Some(_)) => {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("file exists: {}", path.display()),
                ))
            }
            (CreateMode::OpenExisting, None) => return Err(not_found(path)),
            (CreateMode::OpenExisting, Some(data)) => data,
            (CreateMode::CreateOrTruncate, Some(data)) => {
                {
                    let mut d = data.write().map_err(poisoned)?;
                    d.bytes.clear();
                    d.mtime = SystemTime::now();
                }
                data
            }
            (_, None) => {
                let data = Arc::new(RwLock::new(FileData {
                    bytes: Vec::new(),
                    mtime: SystemTime::now(),
                }));
                s.nodes.insert(path.to_path_buf(), Node::File(Arc::clone(&data)));
                data
            }
        };
        Ok(Box::new(MemWritableFile {
            path: path.to_path_buf(),
            data,
            closed: AtomicBool::new(false),
            write_limit: s.write_limit,
        }))
    }

    fn new_random_access_file(&self, path: &Path) -> io::Result<Box<dyn RandomAccessFile>> {
        let s = self.inner.read().map_err(poisoned)?;
        let data = s.file(path)?;
        let source = if s.mapped_reads {
            let snapshot = data.read().map_err(poisoned)?.bytes.clone();
            ReadSource::Mapped(snapshot)
        } else {
            ReadSource::Live(data)
        };
        Ok(Box::new(MemRandomAccessFile {
            path: path.to_path_buf(),
            source,
            max_read_chunk: s.max_read_chunk,
            fail_from: s.read_failure_offset(path),
        }))
    }

    fn new_sequential_file(&self, path: &Path) -> io::Result<Box<dyn SequentialFile>> {
        let s = self.inner.read().map_err(poisoned)?;
        Ok(Box::new(MemSequentialFile {
            path: path.to_path_buf(),
            data: s.file(path)?,
            pos: Mutex::new(0),
            max_read_chunk: s.max_read_chunk,
            fail_from: s.read_failure_offset(path),
        }))
    }

    fn file_exists(&self, path: &Path) -> bool {
        self.inner.read().map(|s| s.exists(path)).unwrap_or(false)
    }

    fn is_directory(&self, path: &Path) -> io::Result<bool> {
        let s = self.inner.read().map_err(poisoned)?;
        if !s.exists(path) {
            return Err(not_found(path));
        }
        Ok(s.is_dir(path))
    }

    fn file_size(&self, path: &Path) -> io::Result<u64> {
        let data = self.inner.read().map_err(poisoned)?.file(path)?;
        let len = data.read().map_err(poisoned)?.bytes.len() as u64;
        Ok(len)
    }

    fn modified_time(&self, path: &Path) -> io::Result<SystemTime> {
        let s = self.inner.read().map_err(poisoned)?;
        match s.nodes.get(path) {
            Some(Node::File(data)) => Ok(data.read().map_err(poisoned)?.mtime),
            Some(Node::Dir { mtime }) => Ok(*mtime),
            None => Err(not_found(path)),
        }
    }

    fn space_info(&self, path: &Path) -> io::Result<SpaceInfo> {
        let s = self.inner.read().map_err(poisoned)?;
        if !s.exists(path) {
            return Err(not_found(path));
        }
        if let Some(info) = s.space {
            return Ok(info);
        }
        Ok(SpaceInfo {
            capacity_bytes: DEFAULT_CAPACITY,
            free_bytes: DEFAULT_CAPACITY.saturating_sub(s.used_bytes()?),
        })
    }

    fn create_dir(&self, path: &Path) -> io::Result<()> {
        let mut s = self.inner.write().map_err(poisoned)?;
        if s.exists(path) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("file exists: {}", path.display()),
            ));
        }
        s.check_parent(path)?;
        s.nodes.insert(
            path.to_path_buf(),
            Node::Dir {
                mtime: SystemTime::now(),
            },
        );
        Ok(())
    }

    fn children(&self, path: &Path) -> io::Result<Vec<String>> {
        let s = self.inner.read().map_err(poisoned)?;
        if !s.exists(path) {
            return Err(not_found(path));
        }
        if !s.is_dir(path) {
            return Err(io::Error::from_raw_os_error(libc::ENOTDIR));
        }
        let parent = if is_root(path) { Path::new("/") } else { path };
        Ok(s.nodes
            .keys()
            .filter(|p| p.parent() == Some(parent))
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect())
    }

    fn glob(&self, pattern: &str) -> io::Result<Vec<PathBuf>> {
        let pattern = Pattern::new(pattern)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let options = MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: false,
        };
        let s = self.inner.read().map_err(poisoned)?;
        Ok(s.nodes
            .keys()
            .filter(|p| pattern.matches_path_with(p, options))
            .cloned()
            .collect())
    }

    fn delete_file(&self, path: &Path) -> io::Result<()> {
        let mut s = self.inner.write().map_err(poisoned)?;
        s.check_delete(path)?;
        match s.nodes.get(path) {
            Some(Node::File(_)) => {
                s.nodes.remove(path);
                Ok(())
            }
            Some(Node::Dir { .. }) => Err(io::Error::from_raw_os_error(libc::EISDIR)),
            None => Err(not_found(path)),
        }
    }

    fn delete_dir(&self, path: &Path) -> io::Result<()> {
        let mut s = self.inner.write().map_err(poisoned)?;
        s.check_delete(path)?;
        match s.nodes.get(path) {
            Some(Node::Dir { .. }) if s.has_children(path) => {
                Err(io::Error::from_raw_os_error(libc::ENOTEMPTY))
            }
            Some(Node::Dir { .. }) => {
                s.nodes.remove(path);
                Ok(())
            }
            Some(Node::File(_)) => Err(io::Error::from_raw_os_error(libc::ENOTDIR)),
            None => Err(not_found(path)),
        }
    }

    fn sync_dir(&self, path: &Path) -> io::Result<()> {
        if self.is_directory(path)? {
            Ok(())
        } else {
            Err(io::Error::from_raw_os_error(libc::ENOTDIR))
        }
    }
}
