//! File-system utilities for storage engines, built on a pluggable
//! environment.
//!
//! [`env`] defines the environment interface plus an OS-backed and an
//! in-memory implementation. [`env_util`] adds the guarantees raw OS calls
//! lack: exact reads, disk-space admission, `mkdir -p`, pruning by age and
//! scoped cleanup of temporary paths.

pub mod env;
pub mod env_util;
pub mod error;
pub mod logging;
pub mod settings;

pub use crate::env::mem::MemEnv;
pub use crate::env::posix::PosixEnv;
pub use crate::env::{Env, WritableFileOptions};
pub use crate::error::{EnvUtilError, Result};
pub use crate::settings::Settings;
