use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::env::Env;
use crate::error::{EnvUtilError, Result};

/// Create the directory at `path` unless one is already there.
///
/// Returns `true` if this call created it. Fails with
/// [`EnvUtilError::NotADirectory`] if something other than a directory
/// occupies the path.
pub fn create_dir_if_missing(env: &dyn Env, path: impl AsRef<Path>) -> Result<bool> {
    let path = path.as_ref();
    match env.create_dir(path) {
        Ok(()) => {
            debug!(path = %path.display(), "created directory");
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            let is_dir = env
                .is_directory(path)
                .map_err(|e| EnvUtilError::io("failed to stat", path, e))?;
            if is_dir {
                Ok(false)
            } else {
                Err(EnvUtilError::NotADirectory(path.to_path_buf()))
            }
        }
        Err(e) => Err(EnvUtilError::io("failed to create directory", path, e)),
    }
}

/// `mkdir -p`: create `path` and any missing ancestors.
///
/// Succeeds when the whole path already exists. On failure, ancestors
/// created before the error are left in place.
pub fn create_dirs_recursively(env: &dyn Env, path: impl AsRef<Path>) -> Result<()> {
    let mut prefix = PathBuf::new();
    for component in path.as_ref().components() {
        prefix.push(component);
        if !prefix.as_os_str().is_empty() && prefix.parent().is_some() {
            create_dir_if_missing(env, &prefix)?;
        }
    }
    Ok(())
}

/// True when the directory at `path` has no entries.
pub fn is_directory_empty(env: &dyn Env, path: impl AsRef<Path>) -> Result<bool> {
    let path = path.as_ref();
    let children = env
        .children(path)
        .map_err(|e| EnvUtilError::io("failed to list directory", path, e))?;
    Ok(children.iter().all(|c| c == "." || c == ".."))
}

/// Sync the parent directory of every path in `paths`, each distinct
/// parent once. Use after creating or renaming files whose directory
/// entries must survive a crash.
pub fn sync_all_parent_dirs<P: AsRef<Path>>(env: &dyn Env, paths: &[P]) -> Result<()> {
    let parents: BTreeSet<&Path> = paths
        .iter()
        .filter_map(|p| p.as_ref().parent())
        .map(|p| if p.as_os_str().is_empty() { Path::new(".") } else { p })
        .collect();
    for dir in parents {
        env.sync_dir(dir)
            .map_err(|e| EnvUtilError::io("failed to sync directory", dir, e))?;
    }
    Ok(())
}
