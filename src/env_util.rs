//! File utilities layered on [`Env`](crate::env::Env).
//!
//! Each helper composes environment primitives into a stronger guarantee:
//! exact-length reads, disk-space admission control, idempotent and
//! recursive directory creation, retention-based pruning and scoped cleanup
//! of temporary paths. None of them are transactional; partial effects on
//! failure are documented per function.

pub mod copy;
pub mod deleter;
pub mod dirs;
pub mod open;
pub mod prune;
pub mod read;
pub mod space;

pub use copy::{copy_file, copy_file_with_buffer_size, DEFAULT_COPY_BUFFER_SIZE};
pub use deleter::ScopedFileDeleter;
pub use dirs::{create_dir_if_missing, create_dirs_recursively, is_directory_empty, sync_all_parent_dirs};
pub use open::{open_file_for_random, open_file_for_sequential, open_file_for_write, open_file_for_write_with};
pub use prune::{delete_excess_files_by_pattern, delete_tmp_files_recursively};
pub use read::read_fully;
pub use space::{verify_sufficient_disk_space, RESERVE_ONE_PERCENT};
