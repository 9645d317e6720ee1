use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{info, warn};

use crate::env::Env;
use crate::error::{EnvUtilError, Result};

/// Delete the oldest files matching `pattern` until at most `max_matches`
/// remain.
///
/// Age is the last-modified time; ties are broken arbitrarily. A failed
/// deletion does not stop the others from being attempted, but the first
/// failure is returned once all have been tried. Files already deleted stay
/// deleted.
pub fn delete_excess_files_by_pattern(env: &dyn Env, pattern: &str, max_matches: i64) -> Result<()> {
    let keep = usize::try_from(max_matches).map_err(|_| {
        EnvUtilError::InvalidArgument(format!("max_matches must be >= 0, got {max_matches}"))
    })?;

    let matches = env
        .glob(pattern)
        .map_err(|e| EnvUtilError::io("failed to glob", pattern, e))?;
    if matches.len() <= keep {
        return Ok(());
    }

    let mut by_age: Vec<(SystemTime, PathBuf)> = Vec::with_capacity(matches.len());
    for path in matches {
        let mtime = env
            .modified_time(&path)
            .map_err(|e| EnvUtilError::io("failed to stat", &path, e))?;
        by_age.push((mtime, path));
    }
    by_age.sort_by_key(|(mtime, _)| *mtime);
    let excess = by_age.len() - keep;

    let mut first_err = None;
    for (_, path) in by_age.into_iter().take(excess) {
        info!(path = %path.display(), pattern, "deleting excess file");
        if let Err(e) = env.delete_file(&path) {
            warn!(path = %path.display(), error = %e, "failed to delete excess file");
            first_err.get_or_insert(EnvUtilError::io("failed to delete", path, e));
        }
    }
    first_err.map_or(Ok(()), Err)
}

/// Walk `root` and delete every regular file whose name contains `infix`.
///
/// Meant for start-up cleanup of temporary files a crash left behind.
/// Directories that cannot be listed and files that cannot be deleted are
/// logged and skipped; the first such failure is returned after the walk.
/// Returns the number of files deleted.
pub fn delete_tmp_files_recursively(env: &dyn Env, root: impl AsRef<Path>, infix: &str) -> Result<usize> {
    if infix.is_empty() {
        return Err(EnvUtilError::InvalidArgument(
            "temporary file infix must not be empty".to_string(),
        ));
    }
    let mut deleted = 0;
    let mut first_err = None;
    let mut pending = vec![root.as_ref().to_path_buf()];
    while let Some(dir) = pending.pop() {
        let children = match env.children(&dir) {
            Ok(children) => children,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "failed to list directory");
                first_err.get_or_insert(EnvUtilError::io("failed to list directory", dir, e));
                continue;
            }
        };
        for name in children {
            if name == "." || name == ".." {
                continue;
            }
            let path = dir.join(&name);
            match env.is_directory(&path) {
                Ok(true) => pending.push(path),
                Ok(false) if name.contains(infix) => {
                    info!(path = %path.display(), "deleting temporary file");
                    match env.delete_file(&path) {
                        Ok(()) => deleted += 1,
                        Err(e) => {
                            warn!(path = %path.display(), error = %e, "failed to delete temporary file");
                            first_err.get_or_insert(EnvUtilError::io("failed to delete", path, e));
                        }
                    }
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to stat");
                    first_err.get_or_insert(EnvUtilError::io("failed to stat", path, e));
                }
            }
        }
    }
    first_err.map_or(Ok(deleted), Err)
}
