//! MJPEG decoder using RKMPP via FFmpeg (`mjpeg_rkmpp`)
//!
//! The codec is opened without a fixed pixel format; the hardware picks the
//! output layout from the bitstream and reports it on each frame.

use std::path::Path;

use ffmpeg_next as ffmpeg;
use ffmpeg::{codec, decoder, ffi, format, frame, media, packet};
use tracing::{debug, error, trace, warn};

use super::traits::{DecodedFrame, DecoderBackend};
use crate::config::CodecConfig;
use crate::error::{CodecError, Result};
use crate::video::convert::Plane;
use crate::video::ffmpeg::{init_ffmpeg, is_again, pixel_format, HwDevice, RKMPP_CODEC_NAME};
use crate::video::format::Resolution;

/// Field order is drop order: frame, codec context, then the device it uses.
pub struct RkmppDecoder {
    frame: frame::Video,
    decoder: decoder::Video,
    _hw_device: Option<HwDevice>,
}

// Safety: see RkmppEncoder; the raw device reference is only released on drop.
unsafe impl Send for RkmppDecoder {}

fn find_decoder() -> Result<ffmpeg::Codec> {
    decoder::find_by_name(RKMPP_CODEC_NAME).ok_or_else(|| {
        CodecError::NotFound(format!(
            "hardware MJPEG decoder ({}) not found",
            RKMPP_CODEC_NAME
        ))
    })
}

impl RkmppDecoder {
    pub fn new(config: &CodecConfig) -> Result<Self> {
        init_ffmpeg()?;
        let codec = find_decoder()?;
        Self::open(codec, codec::context::Context::new_with_codec(codec), config)
    }

    fn open(
        codec: ffmpeg::Codec,
        mut ctx: codec::context::Context,
        config: &CodecConfig,
    ) -> Result<Self> {
        let hw_device = if config.attach_hw_device {
            HwDevice::open_rkmpp()
        } else {
            None
        };
        if let Some(device) = &hw_device {
            // The codec context takes ownership of this reference
            unsafe {
                (*ctx.as_mut_ptr()).hw_device_ctx = device.new_ref();
            }
            debug!("Attached rkmpp hwdevice to {}", RKMPP_CODEC_NAME);
        }
        if config.thread_count > 1 {
            ctx.set_threading(codec::threading::Config {
                kind: codec::threading::Type::Frame,
                count: config.thread_count as usize,
                ..Default::default()
            });
        }

        let decoder = ctx.decoder().open_as(codec)?.video()?;
        debug!("Opened {} decoder", RKMPP_CODEC_NAME);

        Ok(Self {
            frame: frame::Video::empty(),
            decoder,
            _hw_device: hw_device,
        })
    }

    /// Receive the frame for the packet just sent
    ///
    /// A codec that holds the frame back fails the call with its
    /// try-again code; nothing is resent.
    fn receive(&mut self) -> Result<()> {
        self.decoder.receive_frame(&mut self.frame).map_err(|e| {
            if is_again(&e) {
                trace!("{} returned no frame for the packet", RKMPP_CODEC_NAME);
            }
            CodecError::from(e)
        })
    }

    fn current_frame(&self) -> DecodedFrame<'_> {
        let frame = &self.frame;
        // Hardware (DRM_PRIME) frames expose no CPU planes
        let plane = |index: usize| {
            if frame.planes() > index {
                Plane::new(frame.data(index), frame.stride(index))
            } else {
                Plane::new(&[], 0)
            }
        };
        DecodedFrame {
            resolution: Resolution::new(frame.width(), frame.height()),
            format: pixel_format(frame.format()),
            y: plane(0),
            uv: plane(1),
        }
    }
}

impl DecoderBackend for RkmppDecoder {
    fn name(&self) -> &str {
        RKMPP_CODEC_NAME
    }

    fn decode(&mut self, mjpeg: &[u8]) -> Result<DecodedFrame<'_>> {
        {
            // Wraps the caller's bytes without copying; dropped before return
            let packet = packet::Borrow::new(mjpeg);
            self.decoder.send_packet(&packet)?;
        }
        self.receive()?;
        Ok(self.current_frame())
    }

    fn release_frame(&mut self) {
        unsafe {
            ffi::av_frame_unref(self.frame.as_mut_ptr());
        }
    }
}

/// Demux a container file and hand its first decodable frame to `sink`
///
/// Later packets are never read.
pub fn decode_first_frame<R>(
    path: &Path,
    config: &CodecConfig,
    sink: impl FnOnce(DecodedFrame<'_>) -> Result<R>,
) -> Result<R> {
    init_ffmpeg()?;

    let mut ictx = format::input(&path).map_err(|e| {
        error!("Failed to open input file {}: {}", path.display(), e);
        CodecError::from(e)
    })?;

    let (stream_index, parameters) = {
        let stream = ictx.streams().best(media::Type::Video).ok_or_else(|| {
            error!("Failed to find video stream in {}", path.display());
            CodecError::NotFound("video stream".to_string())
        })?;
        (stream.index(), stream.parameters())
    };

    let codec = find_decoder().inspect_err(|_| error!("Hardware MJPEG decoder not found"))?;
    let ctx = codec::context::Context::from_parameters(parameters)?;
    let mut dec = RkmppDecoder::open(codec, ctx, config).inspect_err(|e| {
        error!("Failed to open decoder: {}", e);
    })?;

    let mut decoded = false;
    for (stream, packet) in ictx.packets() {
        if stream.index() != stream_index {
            continue;
        }
        if let Err(e) = dec.decoder.send_packet(&packet) {
            warn!("Error sending packet to decoder: {}", e);
            continue;
        }
        match dec.decoder.receive_frame(&mut dec.frame) {
            Ok(()) => {
                decoded = true;
                break;
            }
            Err(e) if is_again(&e) => continue,
            Err(e) => {
                error!("Error receiving frame from decoder: {}", e);
                break;
            }
        }
    }

    if !decoded {
        error!("Failed to decode any frame from {}", path.display());
        return Err(CodecError::NotFound("no decodable frame".to_string()));
    }

    let result = sink(dec.current_frame());
    dec.release_frame();
    result
}
