//! MJPEG → NV12 decoders
//!
//! - `traits`: backend trait and borrowed frame type
//! - `turbo`: libjpeg-turbo (software), resamples any subsampling to NV12
//! - `rkmpp`: Rockchip MPP through FFmpeg (feature `rkmpp`)
//!
//! [`Decoder`] is the persistent context. It is not bound to a resolution:
//! each call reports the dimensions found in the bitstream.

pub mod traits;
pub mod turbo;

#[cfg(feature = "rkmpp")]
pub mod rkmpp;

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace};

pub use traits::{DecodedFrame, DecoderBackend};
pub use turbo::TurboDecoder;

use crate::config::{BackendKind, CodecConfig};
use crate::error::{CodecError, Result};
use crate::video::format::Resolution;
use crate::video::metrics::{CodecObserver, FrameStats};
use crate::video::mjpeg_file;

/// Decoded frame data in tightly packed NV12
#[derive(Debug, Clone)]
pub struct DecodedNv12Frame {
    /// Y plane followed by interleaved UV
    pub data: Vec<u8>,
    pub resolution: Resolution,
}

/// Open the codec implementation for `kind`
pub fn open_backend(kind: BackendKind, config: &CodecConfig) -> Result<Box<dyn DecoderBackend>> {
    match kind {
        BackendKind::Turbo => Ok(Box::new(TurboDecoder::new()?)),
        #[cfg(feature = "rkmpp")]
        BackendKind::Rkmpp => Ok(Box::new(rkmpp::RkmppDecoder::new(config)?)),
        #[cfg(not(feature = "rkmpp"))]
        BackendKind::Rkmpp => {
            let _ = config;
            Err(CodecError::Unavailable(
                "built without the rkmpp feature".to_string(),
            ))
        }
    }
}

/// Persistent MJPEG decoder
pub struct Decoder {
    backend: Box<dyn DecoderBackend>,
    last_resolution: Option<Resolution>,
    frame_count: u64,
    observer: Option<Arc<dyn CodecObserver>>,
}

impl Decoder {
    pub fn new(config: &CodecConfig) -> Result<Self> {
        let backend = open_backend(config.backend, config)?;
        debug!("Created {} decoder", backend.name());
        Ok(Self {
            backend,
            last_resolution: None,
            frame_count: 0,
            observer: None,
        })
    }

    pub fn set_observer(&mut self, observer: Arc<dyn CodecObserver>) {
        self.observer = Some(observer);
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Dimensions of the most recent decoded frame, also set when the
    /// output buffer turned out too small
    pub fn last_resolution(&self) -> Option<Resolution> {
        self.last_resolution
    }

    /// Frames successfully copied out so far
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Decode one JPEG image into `out` as packed NV12
    ///
    /// Returns the decoded dimensions. `out` must hold `w * h * 3 / 2`
    /// bytes of the *decoded* size; when it doesn't, the error carries that
    /// size and [`Decoder::last_resolution`] reports the dimensions. A
    /// failed decode clears [`Decoder::last_resolution`].
    pub fn decode_to_buffer(&mut self, mjpeg: &[u8], out: &mut [u8]) -> Result<Resolution> {
        self.last_resolution = None;
        if mjpeg.is_empty() {
            return Err(CodecError::InvalidParameter("empty MJPEG input".to_string()));
        }

        let start = Instant::now();
        let frame = self.backend.decode(mjpeg)?;
        let resolution = frame.resolution;
        let format = frame.format;
        self.last_resolution = Some(resolution);

        let required = resolution.nv12_size();
        let result = if out.len() < required {
            debug!(
                "Output buffer too small for {}: {} < {}",
                resolution,
                out.len(),
                required
            );
            Err(CodecError::BufferTooSmall { required })
        } else if !frame.is_nv12() {
            debug!("Decoder produced {} instead of NV12", format);
            Err(CodecError::InvalidParameter(format!(
                "decoded pixel format {} is not NV12",
                format
            )))
        } else {
            frame.copy_to_packed_nv12(out)
        };
        self.backend.release_frame();
        let size = result?;

        self.frame_count += 1;
        if let Some(observer) = &self.observer {
            observer.on_decode(&FrameStats {
                sequence: self.frame_count - 1,
                input_bytes: mjpeg.len(),
                output_bytes: size,
                elapsed: start.elapsed(),
            });
        }
        trace!("Decoded {} bytes -> {}", mjpeg.len(), resolution);
        Ok(resolution)
    }

    /// Decode one JPEG image into an owned NV12 frame
    pub fn decode(&mut self, mjpeg: &[u8]) -> Result<DecodedNv12Frame> {
        // Presize from the frame header; retry once with the reported size
        // when the header could not be read
        let presize = mjpeg_file::probe_resolution(mjpeg).map_or(0, |r| r.nv12_size());
        let mut data = vec![0u8; presize];
        let resolution = match self.decode_to_buffer(mjpeg, &mut data) {
            Ok(resolution) => resolution,
            Err(CodecError::BufferTooSmall { required }) => {
                data.resize(required, 0);
                self.decode_to_buffer(mjpeg, &mut data)?
            }
            Err(e) => return Err(e),
        };
        data.truncate(resolution.nv12_size());
        Ok(DecodedNv12Frame { data, resolution })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ERR_INVALID_PARAMETER, ERR_NO_MEMORY};
    use crate::video::encoder::Encoder;
    use crate::video::buffer::alloc_nv12_buffer;
    use crate::video::metrics::StatsCollector;
    use crate::video::pattern;

    fn encode(res: Resolution, nv12: &[u8], quality: i32) -> Vec<u8> {
        let mut encoder = Encoder::new(res, quality, &CodecConfig::software()).unwrap();
        encoder.encode(nv12).unwrap().data.to_vec()
    }

    #[test]
    fn test_roundtrip_solid() {
        let res = Resolution::new(64, 48);
        let frame = pattern::solid(res, 128, 128, 128);
        let jpeg = encode(res, &frame, 2);

        let mut decoder = Decoder::new(&CodecConfig::software()).unwrap();
        let mut out = vec![0u8; res.nv12_size()];
        assert_eq!(decoder.decode_to_buffer(&jpeg, &mut out).unwrap(), res);
        assert!(pattern::max_abs_diff(&frame, &out) <= 2);
    }

    #[test]
    fn test_roundtrip_gradient_quality() {
        let res = Resolution::new(64, 48);
        let frame = pattern::gradient(res, 3);
        let mut decoder = Decoder::new(&CodecConfig::software()).unwrap();

        let best = decoder.decode(&encode(res, &frame, 1)).unwrap();
        let worst = decoder.decode(&encode(res, &frame, 31)).unwrap();
        let best_err = pattern::mean_abs_diff(&frame, &best.data);
        let worst_err = pattern::mean_abs_diff(&frame, &worst.data);
        assert!(best_err < 3.0, "q1 mean error {}", best_err);
        assert!(best_err <= worst_err);
    }

    #[test]
    fn test_resolution_follows_bitstream() {
        let mut decoder = Decoder::new(&CodecConfig::software()).unwrap();
        let mut out = vec![0u8; Resolution::new(640, 480).nv12_size()];

        for res in [Resolution::new(64, 48), Resolution::new(320, 240)] {
            let jpeg = encode(res, &pattern::gradient(res, 0), 5);
            assert_eq!(decoder.decode_to_buffer(&jpeg, &mut out).unwrap(), res);
            assert_eq!(decoder.last_resolution(), Some(res));
        }
        assert_eq!(decoder.frame_count(), 2);
    }

    #[test]
    fn test_small_buffer_reports_dimensions() {
        let res = Resolution::new(64, 48);
        let jpeg = encode(res, &pattern::gradient(res, 0), 5);
        let mut decoder = Decoder::new(&CodecConfig::software()).unwrap();

        let mut out = vec![0u8; res.nv12_size() - 1];
        let err = decoder.decode_to_buffer(&jpeg, &mut out).unwrap_err();
        assert_eq!(err.code(), ERR_NO_MEMORY);
        assert_eq!(decoder.last_resolution(), Some(res));
        assert_eq!(decoder.frame_count(), 0);

        // Context stays usable
        let frame = decoder.decode(&jpeg).unwrap();
        assert_eq!(frame.resolution, res);
        assert_eq!(frame.data.len(), res.nv12_size());
    }

    #[test]
    fn test_failed_decode_clears_resolution() {
        let res = Resolution::new(64, 48);
        let jpeg = encode(res, &pattern::gradient(res, 0), 5);
        let mut decoder = Decoder::new(&CodecConfig::software()).unwrap();
        let mut out = vec![0u8; res.nv12_size()];

        decoder.decode_to_buffer(&jpeg, &mut out).unwrap();
        assert_eq!(decoder.last_resolution(), Some(res));

        assert!(decoder.decode_to_buffer(b"not a jpeg at all", &mut out).is_err());
        assert_eq!(decoder.last_resolution(), None);
        assert!(decoder.decode_to_buffer(&[], &mut out).is_err());
        assert_eq!(decoder.last_resolution(), None);
    }

    #[test]
    fn test_mid_grey_frame_at_quality_five() {
        let res = Resolution::new(64, 48);
        let mut frame = alloc_nv12_buffer(res).unwrap();
        frame.fill(128);
        let jpeg = encode(res, &frame, 5);

        let mut decoder = Decoder::new(&CodecConfig::software()).unwrap();
        let mut out = vec![0u8; res.nv12_size()];
        let decoded = decoder.decode_to_buffer(&jpeg, &mut out).unwrap();
        assert_eq!(decoded.width, 64);
        assert_eq!(decoded.height, 48);
        assert!(out.iter().all(|&v| v.abs_diff(128) <= 3));
    }

    #[test]
    fn test_invalid_input() {
        let mut decoder = Decoder::new(&CodecConfig::software()).unwrap();
        let mut out = vec![0u8; 1024];
        let err = decoder.decode_to_buffer(&[], &mut out).unwrap_err();
        assert_eq!(err.code(), ERR_INVALID_PARAMETER);
        assert!(decoder.decode_to_buffer(b"not a jpeg at all", &mut out).is_err());
    }

    #[test]
    fn test_observer_counts_decodes() {
        let res = Resolution::new(32, 32);
        let jpeg = encode(res, &pattern::solid(res, 50, 100, 150), 4);
        let mut decoder = Decoder::new(&CodecConfig::software()).unwrap();
        let stats = Arc::new(StatsCollector::new());
        decoder.set_observer(stats.clone());

        for _ in 0..3 {
            decoder.decode(&jpeg).unwrap();
        }
        let summary = stats.decode_summary();
        assert_eq!(summary.frames, 3);
        assert_eq!(summary.output_bytes, 3 * res.nv12_size() as u64);
    }
}
