//! Synthetic NV12 frames for tests and benchmarks

use crate::error::{CodecError, Result};
use crate::video::format::Resolution;

/// Fill a packed NV12 buffer with a single Y/U/V value
pub fn fill_solid(buffer: &mut [u8], resolution: Resolution, y: u8, u: u8, v: u8) -> Result<()> {
    let y_size = resolution.pixels() as usize;
    let total = resolution.nv12_size();
    if buffer.len() < total {
        return Err(CodecError::BufferTooSmall { required: total });
    }
    buffer[..y_size].fill(y);
    for uv in buffer[y_size..total].chunks_exact_mut(2) {
        uv[0] = u;
        uv[1] = v;
    }
    Ok(())
}

/// Allocate a solid NV12 frame
pub fn solid(resolution: Resolution, y: u8, u: u8, v: u8) -> Vec<u8> {
    let mut frame = vec![0u8; resolution.nv12_size()];
    // Sized above, cannot fail
    let _ = fill_solid(&mut frame, resolution, y, u, v);
    frame
}

/// Moving diagonal gradient
///
/// Y = (x + y + 2n) mod 256, U = (x/2 + n) mod 256 across, V = (y/2 + n)
/// mod 256 down, where n is the frame number.
pub fn fill_gradient(buffer: &mut [u8], resolution: Resolution, frame_num: u32) -> Result<()> {
    let width = resolution.width as usize;
    let height = resolution.height as usize;
    let total = resolution.nv12_size();
    if buffer.len() < total {
        return Err(CodecError::BufferTooSmall { required: total });
    }
    let n = frame_num as usize;

    let (y_plane, uv_plane) = buffer[..total].split_at_mut(width * height);
    for (row, line) in y_plane.chunks_exact_mut(width).enumerate() {
        for (col, px) in line.iter_mut().enumerate() {
            *px = ((col + row + n * 2) % 256) as u8;
        }
    }
    for (row, line) in uv_plane.chunks_exact_mut(width).enumerate().take(height / 2) {
        for (col, uv) in line.chunks_exact_mut(2).enumerate() {
            uv[0] = ((col + n) % 256) as u8;
            uv[1] = ((row + n) % 256) as u8;
        }
    }
    Ok(())
}

/// Allocate a gradient NV12 frame
pub fn gradient(resolution: Resolution, frame_num: u32) -> Vec<u8> {
    let mut frame = vec![0u8; resolution.nv12_size()];
    let _ = fill_gradient(&mut frame, resolution, frame_num);
    frame
}

/// Largest absolute per-byte difference between two frames
pub fn max_abs_diff(a: &[u8], b: &[u8]) -> u8 {
    a.iter()
        .zip(b)
        .map(|(x, y)| x.abs_diff(*y))
        .max()
        .unwrap_or(0)
}

/// Mean absolute per-byte difference between two frames
pub fn mean_abs_diff(a: &[u8], b: &[u8]) -> f64 {
    let len = a.len().min(b.len());
    if len == 0 {
        return 0.0;
    }
    let sum: u64 = a.iter().zip(b).map(|(x, y)| x.abs_diff(*y) as u64).sum();
    sum as f64 / len as f64
}
