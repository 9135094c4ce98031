//! NV12 / MJPEG video codec module
//!
//! One-shot file helpers, persistent encoder/decoder contexts, and the
//! buffer and plane utilities they share.

pub mod buffer;
pub mod convert;
pub mod decoder;
pub mod encoder;
#[cfg(feature = "rkmpp")]
pub mod ffmpeg;
pub mod format;
pub mod metrics;
pub mod mjpeg_file;
pub mod oneshot;
pub mod pattern;

pub use buffer::{alloc_nv12_buffer, read_nv12_from_file, write_nv12_to_file};
pub use decoder::{DecodedNv12Frame, Decoder};
pub use encoder::{max_output_size, EncodedFrame, Encoder, EncoderParams};
pub use format::{nv12_frame_size, PixelFormat, Quality, Resolution};
pub use metrics::{CodecObserver, FrameStats, StatsCollector, StatsSummary};
pub use oneshot::{decode_mjpeg_to_nv12, decode_mjpeg_to_nv12_with, encode_nv12_to_mjpeg};
