//! Pixel format, resolution and quality definitions

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CodecError, Result};

/// Pixel layouts a decoder can hand back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PixelFormat {
    /// NV12 semi-planar format (Y plane + interleaved UV)
    Nv12,
    /// NV16 semi-planar format (4:2:2)
    Nv16,
    /// YUV420 planar format (I420)
    Yuv420,
    /// YUV422 planar format
    Yuv422,
    /// YUV440 planar format (vertical-only chroma subsampling)
    Yuv440,
    /// YUV411 planar format
    Yuv411,
    /// YUV444 planar format
    Yuv444,
    /// Grayscale format
    Grey,
    /// Opaque hardware surface (DRM PRIME)
    DrmPrime,
    /// Anything else reported by the codec library
    Unknown,
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelFormat::Nv12 => "NV12",
            PixelFormat::Nv16 => "NV16",
            PixelFormat::Yuv420 => "YUV420",
            PixelFormat::Yuv422 => "YUV422",
            PixelFormat::Yuv440 => "YUV440",
            PixelFormat::Yuv411 => "YUV411",
            PixelFormat::Yuv444 => "YUV444",
            PixelFormat::Grey => "GREY",
            PixelFormat::DrmPrime => "DRM_PRIME",
            PixelFormat::Unknown => "UNKNOWN",
        };
        write!(f, "{}", name)
    }
}

/// Resolution (width x height)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Validate signed dimensions coming from the C API
    pub fn from_signed(width: i32, height: i32) -> Result<Self> {
        if width <= 0 || height <= 0 {
            return Err(CodecError::InvalidParameter(format!(
                "invalid dimensions {}x{}",
                width, height
            )));
        }
        Ok(Self::new(width as u32, height as u32))
    }

    /// 4:2:0 chroma needs both dimensions non-zero and even
    pub fn ensure_even(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 || self.width % 2 == 1 || self.height % 2 == 1 {
            return Err(CodecError::InvalidParameter(format!(
                "NV12 requires even dimensions, got {}",
                self
            )));
        }
        Ok(())
    }

    /// Get total pixels
    pub fn pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Size in bytes of one tightly packed NV12 frame
    pub fn nv12_size(&self) -> usize {
        nv12_frame_size(self.width as usize, self.height as usize)
    }

    /// Default frame size of the CLI
    pub const UXGA: Resolution = Resolution {
        width: 1600,
        height: 1200,
    };
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// NV12 frame size in bytes: `width * height * 3 / 2`
#[inline]
pub fn nv12_frame_size(width: usize, height: usize) -> usize {
    width * height * 3 / 2
}

/// MJPEG quantizer, 1 (best) to 31 (worst)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub struct Quality(u8);

impl Quality {
    pub const MIN: i32 = 1;
    pub const MAX: i32 = 31;
    /// Recommended for industrial/medical captures
    pub const HIGH: Quality = Quality(2);

    pub fn new(value: i32) -> Result<Self> {
        if !(Self::MIN..=Self::MAX).contains(&value) {
            return Err(CodecError::InvalidQuality(value));
        }
        Ok(Self(value as u8))
    }

    /// Quantizer value handed to FFmpeg (qmin/qmax/qp_init)
    pub fn qp(&self) -> i32 {
        self.0 as i32
    }

    /// Linear mapping onto libjpeg's 1-100 percentage: 1 -> 100, 31 -> 10
    pub fn jpeg_percent(&self) -> i32 {
        100 - (self.0 as i32 - 1) * 3
    }
}

impl TryFrom<i32> for Quality {
    type Error = CodecError;

    fn try_from(value: i32) -> Result<Self> {
        Quality::new(value)
    }
}

impl From<Quality> for i32 {
    fn from(q: Quality) -> i32 {
        q.qp()
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q{}", self.0)
    }
}
