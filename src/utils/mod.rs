//! Timing and file helpers

use std::path::Path;

use crate::error::Result;

/// Monotonic clock in nanoseconds
///
/// Only differences between two readings are meaningful.
pub fn get_time_ns() -> i64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // CLOCK_MONOTONIC cannot fail with a valid timespec pointer
    unsafe {
        libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
    }
    ts.tv_sec as i64 * 1_000_000_000 + ts.tv_nsec as i64
}

/// File size in bytes
pub fn get_file_size(path: impl AsRef<Path>) -> Result<u64> {
    Ok(std::fs::metadata(path.as_ref())?.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_time_is_monotonic() {
        let a = get_time_ns();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = get_time_ns();
        assert!(b - a >= 1_000_000);
    }

    #[test]
    fn test_file_size() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0u8; 1234]).unwrap();
        file.flush().unwrap();
        assert_eq!(get_file_size(file.path()).unwrap(), 1234);
        assert!(get_file_size("/nonexistent/nv12-mjpeg").is_err());
    }
}
