//! NV12 frame buffers and raw `.yuv` file I/O
//!
//! A raw NV12 file is headerless: exactly `width * height * 3 / 2` bytes,
//! the Y plane followed by the interleaved UV plane.

use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::path::Path;

use tracing::{debug, error};

use crate::error::{CodecError, Result};
use crate::video::format::Resolution;

/// Allocate a zeroed NV12 frame buffer
///
/// Allocation failure is reported instead of aborting the process.
pub fn alloc_nv12_buffer(resolution: Resolution) -> Result<Vec<u8>> {
    let size = resolution.nv12_size();
    let mut buffer = Vec::new();
    buffer.try_reserve_exact(size).map_err(|_| {
        error!("Failed to allocate NV12 buffer ({} bytes)", size);
        CodecError::AllocFailed(format!("NV12 buffer of {} bytes", size))
    })?;
    buffer.resize(size, 0);
    Ok(buffer)
}

/// Read a single NV12 frame from the start of a raw YUV file
pub fn read_nv12_from_file(path: impl AsRef<Path>, buffer: &mut [u8], resolution: Resolution) -> Result<()> {
    let path = path.as_ref();
    let frame_size = resolution.nv12_size();
    if buffer.len() < frame_size {
        return Err(CodecError::BufferTooSmall {
            required: frame_size,
        });
    }

    let mut file = File::open(path).map_err(|e| {
        error!("Failed to open input file {}: {}", path.display(), e);
        e
    })?;

    let dst = &mut buffer[..frame_size];
    let mut filled = 0;
    while filled < frame_size {
        match file.read(&mut dst[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    if filled != frame_size {
        error!(
            "Failed to read complete frame: expected {} bytes, got {} bytes",
            frame_size, filled
        );
        return Err(CodecError::ShortTransfer {
            expected: frame_size,
            actual: filled,
        });
    }

    debug!("Read {} bytes of NV12 from {}", frame_size, path.display());
    Ok(())
}

/// Write a single NV12 frame, creating or truncating the file
pub fn write_nv12_to_file(path: impl AsRef<Path>, buffer: &[u8], resolution: Resolution) -> Result<()> {
    let path = path.as_ref();
    let frame_size = resolution.nv12_size();
    if buffer.len() < frame_size {
        error!(
            "Failed to write complete frame: expected {} bytes, have {} bytes",
            frame_size,
            buffer.len()
        );
        return Err(CodecError::ShortTransfer {
            expected: frame_size,
            actual: buffer.len(),
        });
    }

    let mut file = File::create(path).map_err(|e| {
        error!("Failed to open output file {}: {}", path.display(), e);
        e
    })?;
    file.write_all(&buffer[..frame_size])?;
    file.flush()?;

    debug!("Wrote {} bytes of NV12 to {}", frame_size, path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_exact_size() {
        let buf = alloc_nv12_buffer(Resolution::new(64, 48)).unwrap();
        assert_eq!(buf.len(), 64 * 48 * 3 / 2);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.yuv");
        let res = Resolution::new(16, 8);

        let frame: Vec<u8> = (0..res.nv12_size()).map(|i| (i % 251) as u8).collect();
        write_nv12_to_file(&path, &frame, res).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len() as usize, res.nv12_size());

        let mut back = alloc_nv12_buffer(res).unwrap();
        read_nv12_from_file(&path, &mut back, res).unwrap();
        assert_eq!(back, frame);
    }

    #[test]
    fn test_read_truncated_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.yuv");
        std::fs::write(&path, [0u8; 100]).unwrap();

        let res = Resolution::new(16, 8);
        let mut buf = alloc_nv12_buffer(res).unwrap();
        match read_nv12_from_file(&path, &mut buf, res) {
            Err(CodecError::ShortTransfer { expected, actual }) => {
                assert_eq!(expected, 192);
                assert_eq!(actual, 100);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_read_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let res = Resolution::new(16, 8);
        let mut buf = alloc_nv12_buffer(res).unwrap();
        let err = read_nv12_from_file(dir.path().join("nope.yuv"), &mut buf, res).unwrap_err();
        assert!(matches!(err, CodecError::Io(_)));
    }

    #[test]
    fn test_write_short_buffer_fails() {
        let dir = tempfile::tempdir().unwrap();
        let res = Resolution::new(16, 8);
        let err = write_nv12_to_file(dir.path().join("out.yuv"), &[0u8; 10], res).unwrap_err();
        assert!(matches!(err, CodecError::ShortTransfer { .. }));
    }
}
