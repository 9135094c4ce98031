//! nv12-mjpeg - NV12 ⇄ MJPEG codec wrapper
//!
//! Encodes raw NV12 frames to MJPEG and back, on Rockchip MPP hardware
//! through FFmpeg (`rkmpp` feature) or on libjpeg-turbo in software.
//! Usable from Rust and, through [`ffi`], from C.

pub mod config;
pub mod error;
pub mod ffi;
pub mod utils;
pub mod video;

pub use config::{BackendKind, CodecConfig};
pub use error::{CodecError, Result};
pub use video::{
    decode_mjpeg_to_nv12, encode_nv12_to_mjpeg, Decoder, Encoder, PixelFormat, Quality,
    Resolution,
};
