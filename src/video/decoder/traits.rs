//! Decoder traits and common types

use crate::error::Result;
use crate::video::convert::{copy_plane_to_packed, Plane};
use crate::video::format::{PixelFormat, Resolution};

/// A decoded frame borrowed from the backend's reusable storage
#[derive(Debug, Clone, Copy)]
pub struct DecodedFrame<'a> {
    /// Actual dimensions from the bitstream
    pub resolution: Resolution,
    /// Layout of the planes below
    pub format: PixelFormat,
    pub y: Plane<'a>,
    /// Interleaved UV for NV12, otherwise the codec's second plane
    pub uv: Plane<'a>,
}

impl DecodedFrame<'_> {
    pub fn is_nv12(&self) -> bool {
        self.format == PixelFormat::Nv12
    }

    /// Copy Y and UV into a tightly packed NV12 buffer
    ///
    /// Only the buffer size is checked; the planes are copied as NV12
    /// whatever the reported format is.
    pub fn copy_to_packed_nv12(&self, dst: &mut [u8]) -> Result<usize> {
        let width = self.resolution.width as usize;
        let height = self.resolution.height as usize;
        let y_size = width * height;
        let total_size = self.resolution.nv12_size();
        if dst.len() < total_size {
            return Err(crate::error::CodecError::BufferTooSmall {
                required: total_size,
            });
        }

        let (y_dst, uv_dst) = dst[..total_size].split_at_mut(y_size);
        copy_plane_to_packed(self.y, width, height, y_dst)?;
        copy_plane_to_packed(self.uv, width, height / 2, uv_dst)?;
        Ok(total_size)
    }

    /// Like [`DecodedFrame::copy_to_packed_nv12`], but a second plane that
    /// is not NV12 is copied raw: each row takes what the plane's stride
    /// holds and the rest stays zero. Chroma is meaningless in that case.
    pub fn copy_to_packed_lenient(&self, dst: &mut [u8]) -> Result<usize> {
        if self.is_nv12() {
            return self.copy_to_packed_nv12(dst);
        }

        let width = self.resolution.width as usize;
        let height = self.resolution.height as usize;
        let y_size = width * height;
        let total_size = self.resolution.nv12_size();
        if dst.len() < total_size {
            return Err(crate::error::CodecError::BufferTooSmall {
                required: total_size,
            });
        }

        let (y_dst, uv_dst) = dst[..total_size].split_at_mut(y_size);
        copy_plane_to_packed(self.y, width, height, y_dst)?;
        uv_dst.fill(0);
        let row_bytes = self.uv.stride.min(width);
        for (row, chunk) in uv_dst.chunks_exact_mut(width).enumerate() {
            let start = row * self.uv.stride;
            let Some(src) = self.uv.data.get(start..start + row_bytes) else {
                break;
            };
            chunk[..row_bytes].copy_from_slice(src);
        }
        Ok(total_size)
    }
}

/// A codec implementation owned by one decoder context
pub trait DecoderBackend: Send {
    fn name(&self) -> &str;

    /// Decode exactly one frame from one complete JPEG image
    ///
    /// The input is only borrowed for the duration of the call.
    fn decode(&mut self, mjpeg: &[u8]) -> Result<DecodedFrame<'_>>;

    /// Drop the reference to the last decoded frame
    fn release_frame(&mut self);
}
