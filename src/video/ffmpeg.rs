//! FFmpeg glue shared by the RKMPP encoder and decoder

use std::env;
use std::ffi::CString;
use std::ptr;
use std::sync::OnceLock;

use ffmpeg_next as ffmpeg;
use ffmpeg::ffi;
use ffmpeg::format::Pixel;
use ffmpeg::util::error::EAGAIN;
use tracing::{debug, warn};

use crate::error::{CodecError, Result};
use crate::video::format::PixelFormat;

/// Hardware MJPEG codec name (encoder and decoder)
pub const RKMPP_CODEC_NAME: &str = "mjpeg_rkmpp";

/// FFmpeg log level override, e.g. `NV12_MJPEG_FFMPEG_LOG=debug`
pub const ENV_FFMPEG_LOG: &str = "NV12_MJPEG_FFMPEG_LOG";

pub(crate) fn init_ffmpeg() -> Result<()> {
    static INIT: OnceLock<std::result::Result<(), ffmpeg::Error>> = OnceLock::new();
    let result = *INIT.get_or_init(|| {
        let result = ffmpeg::init();
        unsafe {
            ffi::av_log_set_level(parse_ffmpeg_log_level());
        }
        debug!("FFmpeg initialized");
        result
    });
    result.map_err(CodecError::from)
}

fn parse_ffmpeg_log_level() -> i32 {
    let raw = match env::var(ENV_FFMPEG_LOG) {
        Ok(value) => value,
        Err(_) => return ffi::AV_LOG_ERROR as i32,
    };

    let value = raw.trim().to_ascii_lowercase();
    if value.is_empty() {
        return ffi::AV_LOG_ERROR as i32;
    }

    if let Ok(level) = value.parse::<i32>() {
        return level;
    }

    match value.as_str() {
        "quiet" => ffi::AV_LOG_QUIET as i32,
        "panic" => ffi::AV_LOG_PANIC as i32,
        "fatal" => ffi::AV_LOG_FATAL as i32,
        "error" => ffi::AV_LOG_ERROR as i32,
        "warn" | "warning" => ffi::AV_LOG_WARNING as i32,
        "info" => ffi::AV_LOG_INFO as i32,
        "verbose" => ffi::AV_LOG_VERBOSE as i32,
        "debug" => ffi::AV_LOG_DEBUG as i32,
        "trace" => ffi::AV_LOG_TRACE as i32,
        _ => ffi::AV_LOG_ERROR as i32,
    }
}

/// The "try again" signal of the send/receive API
pub(crate) fn is_again(err: &ffmpeg::Error) -> bool {
    matches!(err, ffmpeg::Error::Other { errno } if *errno == EAGAIN)
}

pub(crate) fn pixel_format(pixel: Pixel) -> PixelFormat {
    match pixel {
        Pixel::NV12 => PixelFormat::Nv12,
        Pixel::NV16 => PixelFormat::Nv16,
        Pixel::YUV420P | Pixel::YUVJ420P => PixelFormat::Yuv420,
        Pixel::YUV422P | Pixel::YUVJ422P => PixelFormat::Yuv422,
        Pixel::YUV444P | Pixel::YUVJ444P => PixelFormat::Yuv444,
        Pixel::YUV440P | Pixel::YUVJ440P => PixelFormat::Yuv440,
        Pixel::YUV411P | Pixel::YUVJ411P => PixelFormat::Yuv411,
        Pixel::GRAY8 => PixelFormat::Grey,
        Pixel::DRM_PRIME => PixelFormat::DrmPrime,
        _ => PixelFormat::Unknown,
    }
}

/// Whether this FFmpeg build registers the RKMPP MJPEG codecs
pub fn rkmpp_available() -> bool {
    if init_ffmpeg().is_err() {
        return false;
    }
    ffmpeg::encoder::find_by_name(RKMPP_CODEC_NAME).is_some()
        && ffmpeg::decoder::find_by_name(RKMPP_CODEC_NAME).is_some()
}

/// Owned reference to an FFmpeg hardware device context
pub(crate) struct HwDevice {
    ctx: *mut ffi::AVBufferRef,
}

impl HwDevice {
    /// Open the RKMPP device; None when this FFmpeg has no such device type
    pub(crate) fn open_rkmpp() -> Option<Self> {
        let name = CString::new("rkmpp").ok()?;
        unsafe {
            let kind = ffi::av_hwdevice_find_type_by_name(name.as_ptr());
            if kind == ffi::AVHWDeviceType::AV_HWDEVICE_TYPE_NONE {
                debug!("FFmpeg has no rkmpp hwdevice type");
                return None;
            }
            let mut ctx: *mut ffi::AVBufferRef = ptr::null_mut();
            let ret = ffi::av_hwdevice_ctx_create(&mut ctx, kind, ptr::null(), ptr::null_mut(), 0);
            if ret < 0 || ctx.is_null() {
                warn!("Failed to create rkmpp hwdevice context: {}", ffmpeg::Error::from(ret));
                return None;
            }
            Some(Self { ctx })
        }
    }

    /// New reference for a codec context; the codec owns and frees it
    pub(crate) fn new_ref(&self) -> *mut ffi::AVBufferRef {
        unsafe { ffi::av_buffer_ref(self.ctx) }
    }
}

impl Drop for HwDevice {
    fn drop(&mut self) {
        unsafe {
            ffi::av_buffer_unref(&mut self.ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_again_maps_to_codec_error() {
        let again = ffmpeg::Error::Other { errno: EAGAIN };
        assert!(is_again(&again));
        assert!(!is_again(&ffmpeg::Error::Eof));

        let err = CodecError::from(again);
        assert!(matches!(err, CodecError::Codec { .. }));
        assert_eq!(err.code(), -11);
    }

    #[test]
    fn test_pixel_format_mapping() {
        assert_eq!(pixel_format(Pixel::NV12), PixelFormat::Nv12);
        assert_eq!(pixel_format(Pixel::YUVJ420P), PixelFormat::Yuv420);
        assert_eq!(pixel_format(Pixel::RGB24), PixelFormat::Unknown);
    }
}
