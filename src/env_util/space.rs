use std::path::Path;

use tracing::{debug, warn};

use crate::env::Env;
use crate::error::{EnvUtilError, Result};

/// `reserved_bytes` value meaning "keep 1% of capacity free".
pub const RESERVE_ONE_PERCENT: i64 = -1;

/// Check that writing `requested_bytes` more to the file system holding
/// `path` would still leave `reserved_bytes` free.
///
/// `reserved_bytes == -1` reserves 1% of capacity (rounded up, so the check
/// is exactly `available - requested >= capacity / 100`). A negative
/// `requested_bytes` or a `reserved_bytes` below -1 is rejected with
/// [`EnvUtilError::InvalidArgument`] before the environment is queried.
/// Returns [`EnvUtilError::NoSpace`] (errno `ENOSPC`) when the write would
/// eat into the reservation.
///
/// The check is advisory: nothing stops another writer from consuming the
/// space between this call and the caller's write.
pub fn verify_sufficient_disk_space(
    env: &dyn Env,
    path: impl AsRef<Path>,
    requested_bytes: i64,
    reserved_bytes: i64,
) -> Result<()> {
    let path = path.as_ref();
    if requested_bytes < 0 {
        return Err(EnvUtilError::InvalidArgument(format!(
            "requested_bytes must be >= 0, got {requested_bytes}"
        )));
    }
    if reserved_bytes < RESERVE_ONE_PERCENT {
        return Err(EnvUtilError::InvalidArgument(format!(
            "reserved_bytes must be >= -1, got {reserved_bytes}"
        )));
    }

    let info = env
        .space_info(path)
        .map_err(|e| EnvUtilError::io("failed to query space info for", path, e))?;
    let available = i64::try_from(info.free_bytes).unwrap_or(i64::MAX);
    let reserved = if reserved_bytes == RESERVE_ONE_PERCENT {
        i64::try_from(info.capacity_bytes.div_ceil(100)).unwrap_or(i64::MAX)
    } else {
        reserved_bytes
    };

    if available.saturating_sub(requested_bytes) < reserved {
        warn!(
            path = %path.display(),
            requested = requested_bytes,
            available,
            reserved,
            "rejecting write: insufficient disk space"
        );
        return Err(EnvUtilError::NoSpace {
            path: path.to_path_buf(),
            requested: requested_bytes,
            available,
            reserved,
        });
    }
    debug!(path = %path.display(), requested = requested_bytes, available, reserved, "disk space ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::mem::MemEnv;
    use crate::env::SpaceInfo;

    fn env_with(capacity: u64, free: u64) -> MemEnv {
        let env = MemEnv::new();
        env.set_space_info(SpaceInfo {
            capacity_bytes: capacity,
            free_bytes: free,
        });
        env
    }

    #[test]
    fn explicit_reservation_boundary() {
        let env = env_with(1000, 500);
        verify_sufficient_disk_space(&env, "/", 400, 100).unwrap();
        let err = verify_sufficient_disk_space(&env, "/", 401, 100).unwrap_err();
        assert!(err.is_no_space());
        assert_eq!(err.errno(), Some(libc::ENOSPC));
    }

    #[test]
    fn one_percent_reservation_matches_real_division() {
        // capacity 150 -> 1% is 1.5 bytes, so 1 spare byte is not enough.
        let env = env_with(150, 11);
        verify_sufficient_disk_space(&env, "/", 9, -1).unwrap();
        assert!(verify_sufficient_disk_space(&env, "/", 10, -1).unwrap_err().is_no_space());

        for free in 0..300u64 {
            let env = env_with(250, free);
            for requested in 0..20i64 {
                let ok = verify_sufficient_disk_space(&env, "/", requested, -1).is_ok();
                let expected = free as f64 - requested as f64 >= 0.01 * 250.0;
                assert_eq!(ok, expected, "free={free} requested={requested}");
            }
        }
    }

    #[test]
    fn other_negative_reservations_are_invalid() {
        // Plenty of space: the argument check must still win.
        let env = env_with(1 << 40, 1 << 40);
        for reserved in [-2, -100, i64::MIN] {
            let err = verify_sufficient_disk_space(&env, "/", 0, reserved).unwrap_err();
            assert!(err.is_invalid_argument(), "reserved={reserved}");
        }
    }

    #[test]
    fn negative_request_is_invalid_before_query() {
        // "/nope" does not exist, so reaching space_info would give Io.
        let env = MemEnv::new();
        let err = verify_sufficient_disk_space(&env, "/nope", -1, 0).unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn zero_request_with_zero_reserve_always_fits() {
        let env = env_with(100, 0);
        verify_sufficient_disk_space(&env, "/", 0, 0).unwrap();
    }

    #[test]
    fn missing_path_is_io_error() {
        let env = MemEnv::new();
        let err = verify_sufficient_disk_space(&env, "/nope", 0, 0).unwrap_err();
        assert!(matches!(err, EnvUtilError::Io { .. }));
    }
}
