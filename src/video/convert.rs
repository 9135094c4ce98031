//! Plane copy and chroma layout conversion utilities
//!
//! Codec frames carry per-plane row strides (linesize) that are often padded
//! past the visible width. Callers always exchange tightly packed NV12, so
//! every transfer in or out of a codec goes through the strided copies here.

use crate::error::{CodecError, Result};
use crate::video::format::Resolution;

/// A borrowed plane of codec memory
#[derive(Debug, Clone, Copy)]
pub struct Plane<'a> {
    pub data: &'a [u8],
    /// Bytes per row, including padding
    pub stride: usize,
}

impl<'a> Plane<'a> {
    pub fn new(data: &'a [u8], stride: usize) -> Self {
        Self { data, stride }
    }

    /// Check the plane holds `rows` rows of `width` visible bytes
    fn ensure_covers(&self, width: usize, rows: usize) -> Result<()> {
        if rows == 0 {
            return Ok(());
        }
        let needed = (rows - 1) * self.stride + width;
        if self.stride < width || self.data.len() < needed {
            return Err(CodecError::InvalidParameter(format!(
                "plane too small: {} bytes, stride {}, need {}x{}",
                self.data.len(),
                self.stride,
                width,
                rows
            )));
        }
        Ok(())
    }
}

/// Copy a strided plane into a tightly packed destination
///
/// Falls back to one bulk copy when the stride equals the width.
pub fn copy_plane_to_packed(src: Plane<'_>, width: usize, rows: usize, dst: &mut [u8]) -> Result<()> {
    src.ensure_covers(width, rows)?;
    let size = width * rows;
    if dst.len() < size {
        return Err(CodecError::BufferTooSmall { required: size });
    }

    if src.stride == width {
        dst[..size].copy_from_slice(&src.data[..size]);
    } else {
        for row in 0..rows {
            let src_offset = row * src.stride;
            let dst_offset = row * width;
            dst[dst_offset..dst_offset + width]
                .copy_from_slice(&src.data[src_offset..src_offset + width]);
        }
    }
    Ok(())
}

/// Copy a tightly packed plane into a strided destination
pub fn copy_plane_from_packed(
    src: &[u8],
    width: usize,
    rows: usize,
    dst: &mut [u8],
    dst_stride: usize,
) -> Result<()> {
    let size = width * rows;
    if src.len() < size {
        return Err(CodecError::InvalidParameter(format!(
            "source plane too small: {} < {}",
            src.len(),
            size
        )));
    }
    if rows > 0 && (dst_stride < width || dst.len() < (rows - 1) * dst_stride + width) {
        return Err(CodecError::InvalidParameter(format!(
            "destination plane too small: {} bytes, stride {}",
            dst.len(),
            dst_stride
        )));
    }

    if dst_stride == width {
        dst[..size].copy_from_slice(&src[..size]);
    } else {
        for row in 0..rows {
            let src_offset = row * width;
            let dst_offset = row * dst_stride;
            dst[dst_offset..dst_offset + width]
                .copy_from_slice(&src[src_offset..src_offset + width]);
        }
    }
    Ok(())
}

/// Split an NV12 frame into I420 planes (Y copied, UV deinterleaved)
pub fn nv12_to_i420(src: &[u8], dst: &mut [u8], resolution: Resolution) -> Result<()> {
    let width = resolution.width as usize;
    let height = resolution.height as usize;
    let y_size = width * height;
    let uv_size = y_size / 4;
    let total = y_size + uv_size * 2;

    if src.len() < total {
        return Err(CodecError::InvalidParameter(format!(
            "NV12 data too small: {} < {}",
            src.len(),
            total
        )));
    }
    if dst.len() < total {
        return Err(CodecError::BufferTooSmall { required: total });
    }

    dst[..y_size].copy_from_slice(&src[..y_size]);
    let (u_plane, v_plane) = dst[y_size..total].split_at_mut(uv_size);
    for (i, uv) in src[y_size..total].chunks_exact(2).enumerate() {
        u_plane[i] = uv[0];
        v_plane[i] = uv[1];
    }
    Ok(())
}

/// Interleave separate U and V planes into an NV12 UV plane
pub fn interleave_uv(u_plane: &[u8], v_plane: &[u8], uv_plane: &mut [u8]) -> Result<()> {
    if u_plane.len() != v_plane.len() || uv_plane.len() < u_plane.len() * 2 {
        return Err(CodecError::InvalidParameter(format!(
            "chroma plane mismatch: u={} v={} uv={}",
            u_plane.len(),
            v_plane.len(),
            uv_plane.len()
        )));
    }
    for ((uv, u), v) in uv_plane.chunks_exact_mut(2).zip(u_plane).zip(v_plane) {
        uv[0] = *u;
        uv[1] = *v;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_plane_strips_padding() {
        // 4x2 visible, stride 6
        let src = [1, 2, 3, 4, 0, 0, 5, 6, 7, 8, 0, 0];
        let mut dst = [0u8; 8];
        copy_plane_to_packed(Plane::new(&src, 6), 4, 2, &mut dst).unwrap();
        assert_eq!(dst, [1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_copy_plane_adds_padding() {
        let src = [1, 2, 3, 4, 5, 6, 7, 8];
        let mut dst = [9u8; 12];
        copy_plane_from_packed(&src, 4, 2, &mut dst, 6).unwrap();
        assert_eq!(dst, [1, 2, 3, 4, 9, 9, 5, 6, 7, 8, 9, 9]);
    }

    #[test]
    fn test_copy_plane_rejects_short_source() {
        let src = [0u8; 5];
        let mut dst = [0u8; 8];
        assert!(copy_plane_to_packed(Plane::new(&src, 4), 4, 2, &mut dst).is_err());
        let src = [0u8; 8];
        let mut small = [0u8; 4];
        assert!(matches!(
            copy_plane_to_packed(Plane::new(&src, 4), 4, 2, &mut small),
            Err(CodecError::BufferTooSmall { required: 8 })
        ));
    }

    #[test]
    fn test_nv12_i420_split() {
        let res = Resolution::new(4, 2);
        // Y (8) + UV interleaved (4)
        let nv12 = [10, 11, 12, 13, 14, 15, 16, 17, 100, 200, 101, 201];
        let mut i420 = [0u8; 12];
        nv12_to_i420(&nv12, &mut i420, res).unwrap();
        assert_eq!(&i420[8..], &[100, 101, 200, 201]);

        let mut uv = [0u8; 4];
        interleave_uv(&i420[8..10], &i420[10..], &mut uv).unwrap();
        assert_eq!(&uv[..], &nv12[8..]);
        assert!(interleave_uv(&i420[8..10], &i420[10..11], &mut uv).is_err());
    }
}
