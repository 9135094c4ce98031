//! Encoder traits and common types

use bytes::Bytes;

use crate::config::CodecConfig;
use crate::error::Result;
use crate::video::format::{Quality, Resolution};

/// Parameters an encoder context is bound to for its whole lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderParams {
    /// Frame resolution (both dimensions even)
    pub resolution: Resolution,
    /// Fixed quantizer
    pub quality: Quality,
    /// Nominal frame rate for the codec time base
    pub frame_rate: u32,
    /// Codec worker threads
    pub thread_count: u32,
}

impl EncoderParams {
    pub fn new(resolution: Resolution, quality: Quality) -> Self {
        Self {
            resolution,
            quality,
            frame_rate: 30,
            thread_count: 1,
        }
    }

    /// Take frame rate and threading from a configuration
    pub fn with_config(mut self, config: &CodecConfig) -> Self {
        self.frame_rate = config.frame_rate.max(1);
        self.thread_count = config.thread_count.max(1);
        self
    }
}

/// Encoded frame output
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    /// JPEG bitstream
    pub data: Bytes,
    pub resolution: Resolution,
    /// Presentation timestamp in frame units
    pub pts: i64,
}

impl EncodedFrame {
    pub fn jpeg(data: Bytes, resolution: Resolution, pts: i64) -> Self {
        Self {
            data,
            resolution,
            pts,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A codec implementation owned by one encoder context
///
/// Staging frame/packet storage lives in the backend and is reused across
/// calls. Not Sync: one context per thread.
pub trait EncoderBackend: Send {
    /// Backend name (codec name for FFmpeg backends)
    fn name(&self) -> &str;

    /// Encode one tightly packed NV12 frame into the internal packet
    ///
    /// Returns the packet size. The packet stays readable through
    /// [`EncoderBackend::packet`] until [`EncoderBackend::release_packet`]
    /// or the next `encode`.
    fn encode(&mut self, nv12: &[u8], pts: i64) -> Result<usize>;

    /// Current packet, empty if none is held
    fn packet(&self) -> &[u8];

    /// Return the packet storage for reuse
    fn release_packet(&mut self);
}
