//! JPEG encoder using TurboJPEG (software)
//!
//! Encoding pipeline:
//! ```text
//! NV12 ──deinterleave──> I420 ──turbojpeg──> JPEG
//! ```
//! turbojpeg compresses the 4:2:0 planes directly, skipping any RGB
//! colour conversion.

use tracing::trace;

use super::traits::{EncoderBackend, EncoderParams};
use crate::error::{CodecError, Result, ERR_EXTERNAL};
use crate::video::convert::nv12_to_i420;

pub const BACKEND_NAME: &str = "mjpeg_turbo";

pub(crate) fn turbo_error(what: &str, e: turbojpeg::Error) -> CodecError {
    CodecError::codec(ERR_EXTERNAL, format!("turbojpeg {}: {}", what, e))
}

/// libjpeg-turbo backend
///
/// Note: turbojpeg handles are not thread-safe; the owning context is
/// used from one thread at a time.
pub struct TurboEncoder {
    params: EncoderParams,
    compressor: turbojpeg::Compressor,
    /// I420 staging buffer (Y + U + V planes)
    i420: Vec<u8>,
    packet: Vec<u8>,
}

impl TurboEncoder {
    pub fn new(params: EncoderParams) -> Result<Self> {
        params.resolution.ensure_even()?;

        let mut compressor = turbojpeg::Compressor::new()
            .map_err(|e| turbo_error("compressor init", e))?;
        compressor
            .set_quality(params.quality.jpeg_percent())
            .map_err(|e| turbo_error("set quality", e))?;

        Ok(Self {
            params,
            compressor,
            i420: vec![0u8; params.resolution.nv12_size()],
            packet: Vec::new(),
        })
    }
}

impl EncoderBackend for TurboEncoder {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    fn encode(&mut self, nv12: &[u8], pts: i64) -> Result<usize> {
        let resolution = self.params.resolution;
        nv12_to_i420(nv12, &mut self.i420, resolution)?;

        let image = turbojpeg::YuvImage {
            pixels: self.i420.as_slice(),
            width: resolution.width as usize,
            align: 1,
            height: resolution.height as usize,
            subsamp: turbojpeg::Subsamp::Sub2x2,
        };
        self.packet = self
            .compressor
            .compress_yuv_to_vec(image)
            .map_err(|e| turbo_error("compress", e))?;

        trace!("turbojpeg encoded pts {} -> {} bytes", pts, self.packet.len());
        Ok(self.packet.len())
    }

    fn packet(&self) -> &[u8] {
        &self.packet
    }

    fn release_packet(&mut self) {
        self.packet.clear();
    }
}
