//! MJPEG decoder using TurboJPEG (software) -> NV12
//!
//! turbojpeg decompresses into the image's native planar subsampling
//! (I420, I422, I444, I440 or greyscale). The chroma planes are then
//! resampled onto the 4:2:0 grid and interleaved, so callers always get
//! NV12 regardless of how the JPEG was subsampled.

use tracing::debug;
use turbojpeg::{Decompressor, Subsamp, YuvImage};

use super::traits::{DecodedFrame, DecoderBackend};
use crate::error::{CodecError, Result};
use crate::video::convert::{interleave_uv, Plane};
use crate::video::encoder::turbo::turbo_error;
use crate::video::format::{PixelFormat, Resolution};

pub const BACKEND_NAME: &str = "mjpeg_turbo";

/// Neutral chroma for greyscale input
const NEUTRAL_CHROMA: u8 = 128;

pub struct TurboDecoder {
    decompressor: Decompressor,
    /// Native planar output of the last frame
    yuv: Vec<u8>,
    /// NV12 conversion of the last frame
    nv12: Vec<u8>,
    resolution: Resolution,
    last_subsamp: Option<Subsamp>,
}

impl TurboDecoder {
    pub fn new() -> Result<Self> {
        let decompressor =
            Decompressor::new().map_err(|e| turbo_error("decompressor init", e))?;
        Ok(Self {
            decompressor,
            yuv: Vec::new(),
            nv12: Vec::new(),
            resolution: Resolution::new(0, 0),
            last_subsamp: None,
        })
    }
}

/// Chroma plane dimensions for a subsampling mode
fn chroma_size(subsamp: Subsamp, width: usize, height: usize) -> Result<(usize, usize)> {
    match subsamp {
        Subsamp::Sub2x2 => Ok((width.div_ceil(2), height.div_ceil(2))),
        Subsamp::Sub2x1 => Ok((width.div_ceil(2), height)),
        Subsamp::Sub1x2 => Ok((width, height.div_ceil(2))),
        Subsamp::Sub4x1 => Ok((width.div_ceil(4), height)),
        Subsamp::None => Ok((width, height)),
        Subsamp::Gray => Ok((0, 0)),
        other => Err(CodecError::InvalidParameter(format!(
            "unsupported JPEG subsampling {:?}",
            other
        ))),
    }
}

fn source_format(subsamp: Subsamp) -> PixelFormat {
    match subsamp {
        Subsamp::Sub2x2 => PixelFormat::Yuv420,
        Subsamp::Sub2x1 => PixelFormat::Yuv422,
        Subsamp::Sub1x2 => PixelFormat::Yuv440,
        Subsamp::Sub4x1 => PixelFormat::Yuv411,
        Subsamp::None => PixelFormat::Yuv444,
        Subsamp::Gray => PixelFormat::Grey,
        _ => PixelFormat::Unknown,
    }
}

/// Point-sample `(cw, ch)` U/V planes onto an interleaved 4:2:0 UV plane
fn resample_chroma(u: &[u8], v: &[u8], cw: usize, ch: usize, width: usize, height: usize, uv: &mut [u8]) {
    let half_w = width / 2;
    let half_h = height / 2;
    for row in 0..half_h {
        let sy = row * ch / half_h;
        let dst_row = &mut uv[row * width..row * width + half_w * 2];
        for (col, pair) in dst_row.chunks_exact_mut(2).enumerate() {
            let sx = col * cw / half_w;
            pair[0] = u[sy * cw + sx];
            pair[1] = v[sy * cw + sx];
        }
    }
}

impl DecoderBackend for TurboDecoder {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    fn decode(&mut self, mjpeg: &[u8]) -> Result<DecodedFrame<'_>> {
        let header = self
            .decompressor
            .read_header(mjpeg)
            .map_err(|e| turbo_error("read_header", e))?;

        let width = header.width;
        let height = header.height;
        let resolution = Resolution::new(width as u32, height as u32);
        resolution.ensure_even()?;

        let len = turbojpeg::yuv_pixels_len(width, 1, height, header.subsamp)
            .map_err(|e| turbo_error("yuv size", e))?;
        self.yuv.resize(len, 0);
        let image = YuvImage {
            pixels: &mut self.yuv[..],
            width,
            align: 1,
            height,
            subsamp: header.subsamp,
        };
        self.decompressor
            .decompress_to_yuv(mjpeg, image)
            .map_err(|e| turbo_error("decompress", e))?;

        if self.last_subsamp != Some(header.subsamp) || self.resolution != resolution {
            debug!(
                "turbojpeg stream now {} {}",
                resolution,
                source_format(header.subsamp)
            );
            self.last_subsamp = Some(header.subsamp);
            self.resolution = resolution;
        }

        let (cw, ch) = chroma_size(header.subsamp, width, height)?;
        let y_size = width * height;
        let c_size = cw * ch;
        self.nv12.resize(resolution.nv12_size(), 0);
        let (y_dst, uv_dst) = self.nv12.split_at_mut(y_size);
        y_dst.copy_from_slice(&self.yuv[..y_size]);

        let u = &self.yuv[y_size..y_size + c_size];
        let v = &self.yuv[y_size + c_size..y_size + 2 * c_size];
        match header.subsamp {
            Subsamp::Sub2x2 => interleave_uv(u, v, uv_dst)?,
            Subsamp::Gray => uv_dst.fill(NEUTRAL_CHROMA),
            _ => resample_chroma(u, v, cw, ch, width, height, uv_dst),
        }

        let (y, uv) = self.nv12.split_at(y_size);
        Ok(DecodedFrame {
            resolution,
            format: PixelFormat::Nv12,
            y: Plane::new(y, width),
            uv: Plane::new(uv, width),
        })
    }

    fn release_frame(&mut self) {
        // Buffers are reused by the next decode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jpeg_with(res: Resolution, y: u8, subsamp: Subsamp) -> Vec<u8> {
        let pixels = vec![y; res.width as usize * res.height as usize * 3];
        let image = turbojpeg::Image {
            pixels: pixels.as_slice(),
            width: res.width as usize,
            pitch: res.width as usize * 3,
            height: res.height as usize,
            format: turbojpeg::PixelFormat::RGB,
        };
        turbojpeg::compress(image, 95, subsamp).unwrap().to_vec()
    }

    #[test]
    fn test_decode_420_to_nv12() {
        let res = Resolution::new(32, 16);
        let jpeg = jpeg_with(res, 100, Subsamp::Sub2x2);
        let mut decoder = TurboDecoder::new().unwrap();
        let frame = decoder.decode(&jpeg).unwrap();
        assert_eq!(frame.resolution, res);
        assert!(frame.is_nv12());

        let mut out = vec![0u8; res.nv12_size()];
        frame.copy_to_packed_nv12(&mut out).unwrap();
        // Grey RGB has neutral chroma
        let uv = &out[res.width as usize * res.height as usize..];
        assert!(uv.iter().all(|&c| (c as i32 - 128).abs() <= 2));
    }

    #[test]
    fn test_decode_other_subsampling_to_nv12() {
        let res = Resolution::new(16, 16);
        let mut decoder = TurboDecoder::new().unwrap();
        for subsamp in [
            Subsamp::None,
            Subsamp::Sub2x1,
            Subsamp::Sub1x2,
            Subsamp::Sub4x1,
            Subsamp::Gray,
        ] {
            let jpeg = jpeg_with(res, 60, subsamp);
            let frame = decoder.decode(&jpeg).unwrap();
            let mut out = vec![0u8; res.nv12_size()];
            assert_eq!(frame.copy_to_packed_nv12(&mut out).unwrap(), res.nv12_size());
            let uv = &out[256..];
            assert!(uv.iter().all(|&c| (c as i32 - 128).abs() <= 2), "{:?}", subsamp);
        }
    }

    #[test]
    fn test_odd_dimensions_rejected() {
        let jpeg = jpeg_with(Resolution::new(15, 16), 50, Subsamp::None);
        let mut decoder = TurboDecoder::new().unwrap();
        assert!(matches!(
            decoder.decode(&jpeg),
            Err(CodecError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_garbage_input() {
        let mut decoder = TurboDecoder::new().unwrap();
        assert!(decoder.decode(&[0u8; 64]).is_err());
        assert!(decoder.decode(&[]).is_err());
        // Still usable afterwards
        let res = Resolution::new(16, 16);
        assert!(decoder.decode(&jpeg_with(res, 10, Subsamp::Sub2x2)).is_ok());
    }
}
