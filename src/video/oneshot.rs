//! One-shot encode/decode: open a codec, process one frame, tear it down
//!
//! With the software backend the file is a raw MJPEG stream (JPEG images
//! back to back). With RKMPP, FFmpeg's muxer picks the container from the
//! file extension.

use std::path::Path;
use std::time::Instant;

use tracing::{debug, error, warn};

use crate::config::{BackendKind, CodecConfig};
use crate::error::{CodecError, Result};
use crate::video::decoder::{DecodedFrame, DecoderBackend, TurboDecoder};
use crate::video::encoder::{EncoderBackend, EncoderParams, TurboEncoder};
use crate::video::format::{Quality, Resolution};
use crate::video::mjpeg_file;

fn hardware_present() -> bool {
    #[cfg(feature = "rkmpp")]
    {
        crate::video::ffmpeg::rkmpp_available()
    }
    #[cfg(not(feature = "rkmpp"))]
    {
        false
    }
}

/// Backend for a one-shot call; the only place software fallback happens
fn resolve_backend(config: &CodecConfig) -> BackendKind {
    let kind = config.backend;
    if kind.is_hardware() && config.software_fallback && !hardware_present() {
        warn!("Hardware MJPEG codec unavailable, falling back to software");
        return BackendKind::Turbo;
    }
    kind
}

/// Encode one NV12 frame into an MJPEG file
///
/// Returns the compressed size. Quality is validated before anything else.
pub fn encode_nv12_to_mjpeg(
    nv12: &[u8],
    resolution: Resolution,
    path: impl AsRef<Path>,
    quality: i32,
    config: &CodecConfig,
) -> Result<usize> {
    let path = path.as_ref();
    let quality = Quality::new(quality).inspect_err(|_| {
        error!("Invalid quality {}, must be {}-{}", quality, Quality::MIN, Quality::MAX);
    })?;
    resolution.ensure_even().inspect_err(|e| error!("{}", e))?;
    if nv12.len() < resolution.nv12_size() {
        error!(
            "NV12 input too small for {}: {} < {}",
            resolution,
            nv12.len(),
            resolution.nv12_size()
        );
        return Err(CodecError::InvalidParameter(format!(
            "NV12 input of {} bytes for {}",
            nv12.len(),
            resolution
        )));
    }

    let start = Instant::now();
    let params = EncoderParams::new(resolution, quality).with_config(config);
    let size = match resolve_backend(config) {
        BackendKind::Turbo => {
            let mut encoder = TurboEncoder::new(params).inspect_err(|e| {
                error!("Failed to create software encoder: {}", e);
            })?;
            let size = encoder.encode(nv12, 0).inspect_err(|e| {
                error!("Error encoding frame: {}", e);
            })?;
            std::fs::write(path, encoder.packet()).map_err(|e| {
                error!("Failed to write output file {}: {}", path.display(), e);
                CodecError::from(e)
            })?;
            size
        }
        #[cfg(feature = "rkmpp")]
        BackendKind::Rkmpp => crate::video::encoder::rkmpp::encode_to_file(nv12, params, path)
            .inspect_err(|e| error!("Hardware encode failed: {}", e))?,
        #[cfg(not(feature = "rkmpp"))]
        BackendKind::Rkmpp => {
            error!("Hardware MJPEG encoder not available in this build");
            return Err(CodecError::Unavailable(
                "built without the rkmpp feature".to_string(),
            ));
        }
    };

    debug!(
        "Encoded {} {} -> {} ({} bytes) in {:?}",
        resolution,
        quality,
        path.display(),
        size,
        start.elapsed()
    );
    Ok(size)
}

/// Copy a decoded frame into the buffer the sink hands out
fn deliver<'b>(
    frame: DecodedFrame<'_>,
    sink: impl FnOnce(Resolution) -> Result<&'b mut [u8]>,
) -> Result<Resolution> {
    if !frame.is_nv12() {
        warn!(
            "Decoded pixel format is {}, not NV12; chroma will be garbage",
            frame.format
        );
    }
    let out = sink(frame.resolution)?;
    frame.copy_to_packed_lenient(out)?;
    Ok(frame.resolution)
}

/// Decode the first frame of an MJPEG file into a caller buffer
///
/// `out` must hold the NV12 frame of the decoded (not the expected)
/// resolution; otherwise the call fails with the required size.
pub fn decode_mjpeg_to_nv12(
    path: impl AsRef<Path>,
    out: &mut [u8],
    config: &CodecConfig,
) -> Result<Resolution> {
    decode_mjpeg_to_nv12_with(path, config, move |resolution| {
        let required = resolution.nv12_size();
        if out.len() < required {
            error!(
                "Output buffer too small for {}: {} < {}",
                resolution,
                out.len(),
                required
            );
            return Err(CodecError::BufferTooSmall { required });
        }
        Ok(out)
    })
}

/// Decode the first frame of an MJPEG file, asking `sink` for the output
/// buffer once the dimensions are known
///
/// The buffer returned by `sink` must hold `w * h * 3 / 2` bytes.
pub fn decode_mjpeg_to_nv12_with<'b>(
    path: impl AsRef<Path>,
    config: &CodecConfig,
    sink: impl FnOnce(Resolution) -> Result<&'b mut [u8]>,
) -> Result<Resolution> {
    let path = path.as_ref();
    let start = Instant::now();

    let resolution = match resolve_backend(config) {
        BackendKind::Turbo => {
            let data = std::fs::read(path).map_err(|e| {
                error!("Failed to open input file {}: {}", path.display(), e);
                CodecError::from(e)
            })?;
            let jpeg = mjpeg_file::first_frame(&data).ok_or_else(|| {
                error!("No complete JPEG frame in {}", path.display());
                CodecError::NotFound("no decodable frame".to_string())
            })?;

            let mut decoder = TurboDecoder::new()?;
            let frame = decoder.decode(jpeg).inspect_err(|e| {
                error!("Error decoding frame: {}", e);
            })?;
            deliver(frame, sink)?
        }
        #[cfg(feature = "rkmpp")]
        BackendKind::Rkmpp => {
            crate::video::decoder::rkmpp::decode_first_frame(path, config, |frame| deliver(frame, sink))?
        }
        #[cfg(not(feature = "rkmpp"))]
        BackendKind::Rkmpp => {
            error!("Hardware MJPEG decoder not available in this build");
            return Err(CodecError::Unavailable(
                "built without the rkmpp feature".to_string(),
            ));
        }
    };

    debug!(
        "Decoded {} from {} in {:?}",
        resolution,
        path.display(),
        start.elapsed()
    );
    Ok(resolution)
}
