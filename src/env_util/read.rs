use std::path::Path;

use tracing::debug;

use crate::env::RandomAccessFile;
use crate::error::{EnvUtilError, Result};

/// Read exactly `n` bytes at `offset`.
///
/// `RandomAccessFile::read_at` may return fewer bytes than asked for; this
/// keeps reading until `n` bytes are in hand and fails with
/// [`EnvUtilError::ShortRead`] if end-of-file comes first.
///
/// The returned slice is either `&scratch[..n]` or, when the file exposes a
/// mapped region, a view straight into that region. In the latter case
/// `scratch` is left untouched. After an error `scratch` may hold partial
/// data.
///
/// # Panics
///
/// Panics if `scratch` is shorter than `n`.
pub fn read_fully<'a, F>(file: &'a F, offset: u64, n: usize, scratch: &'a mut [u8]) -> Result<&'a [u8]>
where
    F: RandomAccessFile + ?Sized,
{
    assert!(
        scratch.len() >= n,
        "scratch buffer of {} bytes cannot hold {n} bytes",
        scratch.len()
    );

    if let Some(region) = file.mapped() {
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(region.len());
        let available = region.len() - start;
        if available < n {
            return Err(short_read(file.filename(), offset, n, available));
        }
        return Ok(&region[start..start + n]);
    }

    let mut done = 0;
    while done < n {
        let read = file
            .read_at(offset + done as u64, &mut scratch[done..n])
            .map_err(|e| EnvUtilError::io("failed to read", file.filename(), e))?;
        if read == 0 {
            return Err(short_read(file.filename(), offset, n, done));
        }
        done += read;
    }
    Ok(&scratch[..n])
}

fn short_read(path: &Path, offset: u64, requested: usize, read: usize) -> EnvUtilError {
    debug!(path = %path.display(), offset, requested, read, "hit EOF during exact read");
    EnvUtilError::ShortRead {
        path: path.to_path_buf(),
        offset,
        requested,
        read,
    }
}
