//! NV12 → MJPEG encoders
//!
//! - `traits`: backend trait and shared types
//! - `turbo`: libjpeg-turbo (software)
//! - `rkmpp`: Rockchip MPP through FFmpeg (feature `rkmpp`)
//!
//! [`Encoder`] is the persistent context: codec state, staging frame and
//! packet are allocated once and reused for every frame.

pub mod traits;
pub mod turbo;

#[cfg(feature = "rkmpp")]
pub mod rkmpp;

use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace};

pub use traits::{EncodedFrame, EncoderBackend, EncoderParams};
pub use turbo::TurboEncoder;

use crate::config::{BackendKind, CodecConfig};
use crate::error::{CodecError, Result};
use crate::video::format::{Quality, Resolution};
use crate::video::metrics::{CodecObserver, FrameStats};

/// Upper bound of one JPEG frame for the given resolution
///
/// Worst case of a baseline 4:2:0 JPEG: every 16x16 MCU padded and three
/// bytes per pixel, plus headers.
pub fn max_output_size(resolution: Resolution) -> usize {
    let pad = |v: u32| (v as usize + 15) & !15;
    pad(resolution.width) * pad(resolution.height) * 3 + 2048
}

/// Open the codec implementation for `kind`
pub fn open_backend(kind: BackendKind, params: EncoderParams) -> Result<Box<dyn EncoderBackend>> {
    match kind {
        BackendKind::Turbo => Ok(Box::new(TurboEncoder::new(params)?)),
        #[cfg(feature = "rkmpp")]
        BackendKind::Rkmpp => Ok(Box::new(rkmpp::RkmppEncoder::new(params)?)),
        #[cfg(not(feature = "rkmpp"))]
        BackendKind::Rkmpp => Err(CodecError::Unavailable(
            "built without the rkmpp feature".to_string(),
        )),
    }
}

/// Persistent MJPEG encoder bound to one resolution and quality
pub struct Encoder {
    backend: Box<dyn EncoderBackend>,
    params: EncoderParams,
    /// Frames delivered to the caller; also the next pts
    frame_count: i64,
    /// Input size of a packet that did not fit the caller's buffer
    pending: Option<usize>,
    observer: Option<Arc<dyn CodecObserver>>,
}

impl Encoder {
    /// Create an encoder; `quality` must be 1..=31
    ///
    /// The configured backend is used as is. Persistent contexts never fall
    /// back to software.
    pub fn new(resolution: Resolution, quality: i32, config: &CodecConfig) -> Result<Self> {
        let quality = Quality::new(quality)?;
        let params = EncoderParams::new(resolution, quality).with_config(config);
        Self::with_params(params, config.backend)
    }

    pub fn with_params(params: EncoderParams, kind: BackendKind) -> Result<Self> {
        params.resolution.ensure_even()?;
        let backend = open_backend(kind, params)?;
        debug!(
            "Created {} encoder {} {} @ {}fps",
            backend.name(),
            params.resolution,
            params.quality,
            params.frame_rate
        );
        Ok(Self {
            backend,
            params,
            frame_count: 0,
            pending: None,
            observer: None,
        })
    }

    pub fn set_observer(&mut self, observer: Arc<dyn CodecObserver>) {
        self.observer = Some(observer);
    }

    pub fn params(&self) -> &EncoderParams {
        &self.params
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Frames delivered so far
    pub fn frame_count(&self) -> i64 {
        self.frame_count
    }

    /// Buffer size that always fits one output frame
    pub fn max_output_size(&self) -> usize {
        max_output_size(self.params.resolution)
    }

    /// Run the codec on one frame; the packet is left in the backend
    fn encode_frame(&mut self, nv12: &[u8]) -> Result<(usize, i64, Instant)> {
        let expected = self.params.resolution.nv12_size();
        if nv12.len() < expected {
            return Err(CodecError::InvalidParameter(format!(
                "NV12 input too small: {} < {} for {}",
                nv12.len(),
                expected,
                self.params.resolution
            )));
        }

        // A packet left from an undersized buffer is dropped here
        self.pending = None;
        self.backend.release_packet();

        let start = Instant::now();
        let pts = self.frame_count;
        let size = self.backend.encode(&nv12[..expected], pts)?;
        Ok((size, pts, start))
    }

    /// Account for a packet handed to the caller
    fn deliver(&mut self, input_bytes: usize, output_bytes: usize, start: Instant) -> i64 {
        let pts = self.frame_count;
        self.frame_count += 1;
        self.backend.release_packet();
        if let Some(observer) = &self.observer {
            observer.on_encode(&FrameStats {
                sequence: pts as u64,
                input_bytes,
                output_bytes,
                elapsed: start.elapsed(),
            });
        }
        pts
    }

    /// Encode one frame into `out`, returning the JPEG size
    ///
    /// When `out` is too small the error carries the required size and the
    /// packet is kept for [`Encoder::take_pending`]. The frame counter only
    /// advances once a packet is delivered.
    pub fn encode_to_buffer(&mut self, nv12: &[u8], out: &mut [u8]) -> Result<usize> {
        let (size, pts, start) = self.encode_frame(nv12)?;

        if size > out.len() {
            debug!(
                "Output buffer too small for pts {}: {} < {}",
                pts,
                out.len(),
                size
            );
            self.pending = Some(nv12.len());
            return Err(CodecError::BufferTooSmall { required: size });
        }

        out[..size].copy_from_slice(self.backend.packet());
        self.deliver(nv12.len(), size, start);
        trace!("Encoded pts {} -> {} bytes", pts, size);
        Ok(size)
    }

    /// Copy out a packet that previously did not fit
    pub fn take_pending(&mut self, out: &mut [u8]) -> Result<usize> {
        let input_bytes = self
            .pending
            .ok_or_else(|| CodecError::NotFound("no pending packet".to_string()))?;
        let start = Instant::now();
        let packet = self.backend.packet();
        if packet.len() > out.len() {
            return Err(CodecError::BufferTooSmall {
                required: packet.len(),
            });
        }
        let size = packet.len();
        out[..size].copy_from_slice(packet);
        self.pending = None;
        let pts = self.deliver(input_bytes, size, start);
        trace!("Delivered pending pts {} -> {} bytes", pts, size);
        Ok(size)
    }

    /// Encode one frame into an owned [`EncodedFrame`]
    pub fn encode(&mut self, nv12: &[u8]) -> Result<EncodedFrame> {
        let (size, _, start) = self.encode_frame(nv12)?;
        let data = Bytes::copy_from_slice(self.backend.packet());
        let pts = self.deliver(nv12.len(), size, start);
        Ok(EncodedFrame::jpeg(data, self.params.resolution, pts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ERR_INVALID_QUALITY, ERR_NO_MEMORY};
    use crate::video::metrics::StatsCollector;
    use crate::video::pattern;

    fn software() -> CodecConfig {
        CodecConfig::software()
    }

    #[test]
    fn test_quality_bounds() {
        let res = Resolution::new(64, 48);
        for q in [0, 32, -1] {
            let err = Encoder::new(res, q, &software()).err().unwrap();
            assert_eq!(err.code(), ERR_INVALID_QUALITY);
        }
        assert!(Encoder::new(res, 1, &software()).is_ok());
        assert!(Encoder::new(res, 31, &software()).is_ok());
    }

    #[test]
    fn test_invalid_dimensions() {
        assert!(Encoder::new(Resolution::new(0, 48), 2, &software()).is_err());
        assert!(Encoder::new(Resolution::new(65, 48), 2, &software()).is_err());
    }

    #[test]
    fn test_max_output_size() {
        assert_eq!(max_output_size(Resolution::new(16, 16)), 16 * 16 * 3 + 2048);
        assert_eq!(max_output_size(Resolution::new(17, 2)), 32 * 16 * 3 + 2048);
    }

    #[test]
    fn test_encode_sequence() {
        let res = Resolution::new(64, 48);
        let mut encoder = Encoder::new(res, 2, &software()).unwrap();
        let mut out = vec![0u8; encoder.max_output_size()];

        for n in 0..5 {
            let frame = pattern::gradient(res, n);
            let size = encoder.encode_to_buffer(&frame, &mut out).unwrap();
            assert!(size > 0 && size <= out.len());
            assert_eq!(&out[..2], &[0xFF, 0xD8]);
        }
        assert_eq!(encoder.frame_count(), 5);
    }

    #[test]
    fn test_small_buffer_reports_required() {
        let res = Resolution::new(64, 48);
        let mut encoder = Encoder::new(res, 2, &software()).unwrap();
        let frame = pattern::gradient(res, 0);

        let mut tiny = [0u8; 16];
        let err = encoder.encode_to_buffer(&frame, &mut tiny).unwrap_err();
        assert_eq!(err.code(), ERR_NO_MEMORY);
        let required = match err {
            CodecError::BufferTooSmall { required } => required,
            other => panic!("unexpected error: {}", other),
        };
        assert!(required > tiny.len());
        assert_eq!(encoder.frame_count(), 0);

        let mut out = vec![0u8; required];
        assert_eq!(encoder.take_pending(&mut out).unwrap(), required);
        assert_eq!(&out[..2], &[0xFF, 0xD8]);
        assert_eq!(encoder.frame_count(), 1);
        assert!(encoder.take_pending(&mut out).is_err());
    }

    #[test]
    fn test_failed_encode_keeps_pts() {
        let res = Resolution::new(64, 48);
        let mut encoder = Encoder::new(res, 2, &software()).unwrap();
        let frame = pattern::gradient(res, 3);

        let mut tiny = [0u8; 8];
        assert!(encoder.encode_to_buffer(&frame, &mut tiny).is_err());
        assert_eq!(encoder.frame_count(), 0);

        // Retrying with a new encode drops the undelivered packet
        let encoded = encoder.encode(&frame).unwrap();
        assert_eq!(encoded.pts, 0);
        assert_eq!(encoder.frame_count(), 1);
        assert!(encoder.take_pending(&mut tiny).is_err());
    }

    #[test]
    fn test_short_input_rejected() {
        let res = Resolution::new(64, 48);
        let mut encoder = Encoder::new(res, 2, &software()).unwrap();
        let mut out = vec![0u8; encoder.max_output_size()];
        let short = vec![0u8; res.nv12_size() - 1];
        assert!(matches!(
            encoder.encode_to_buffer(&short, &mut out),
            Err(CodecError::InvalidParameter(_))
        ));
        assert_eq!(encoder.frame_count(), 0);
    }

    #[test]
    fn test_encoded_frame_pts_and_observer() {
        let res = Resolution::new(32, 32);
        let mut encoder = Encoder::new(res, 10, &software()).unwrap();
        let stats = Arc::new(StatsCollector::new());
        encoder.set_observer(stats.clone());

        let frame = pattern::solid(res, 128, 128, 128);
        let first = encoder.encode(&frame).unwrap();
        let second = encoder.encode(&frame).unwrap();
        assert_eq!(first.pts, 0);
        assert_eq!(second.pts, 1);
        assert_eq!(first.resolution, res);
        assert!(!second.is_empty());

        let summary = stats.encode_summary();
        assert_eq!(summary.frames, 2);
        assert_eq!(summary.output_bytes, (first.len() + second.len()) as u64);
    }

    #[cfg(not(feature = "rkmpp"))]
    #[test]
    fn test_rkmpp_unavailable_without_feature() {
        let config = CodecConfig::default().with_backend(BackendKind::Rkmpp);
        let err = Encoder::new(Resolution::new(64, 48), 2, &config).err().unwrap();
        assert!(matches!(err, CodecError::Unavailable(_)));
    }
}
